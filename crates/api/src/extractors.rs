// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Custom extractors for improved error handling
//!
//! [`JsonExtractor`] replaces `axum::Json` so that malformed bodies come back
//! as [`ServerError::JsonError`] with a hint instead of a plain-text rejection.

use axum::{
    extract::{FromRequest, Request},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;

use crate::error::ServerError;

mod error_hints {
    pub const MISSING_COMMA: &str =
        "check for missing or extra commas between object properties or array elements";
    pub const MISSING_BRACE: &str = "check for missing closing brace '}' for JSON object";
    pub const MISSING_BRACKET: &str = "check for missing closing bracket ']' for JSON array";
    pub const MISSING_QUOTES: &str =
        "check for missing or improperly escaped quotes around string values";
    pub const MISSING_COLON: &str = "check for a missing colon between a property name and its value";
    pub const CONTROL_CHARS: &str = "JSON contains invalid control characters that must be escaped";
    pub const EXPECTED_VALUE: &str =
        "expected a valid JSON value (string, number, boolean, null, object, or array)";
    pub const DEFAULT_SYNTAX: &str = "check JSON formatting and structure";
    pub const EMPTY_BODY: &str = "request body is empty, expected valid JSON";
    pub const TRUNCATED_JSON: &str =
        "unexpected end of JSON input, request appears to be truncated";
}

// Requests carry coordinates and flags only
const MAX_JSON_PAYLOAD_SIZE: usize = 64 * 1024;

/// Custom JSON extractor that provides detailed error messages for parsing failures
#[derive(Debug)]
pub struct JsonExtractor<T>(pub T);

impl<T, S> FromRequest<S> for JsonExtractor<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(content_type) = req.headers().get("content-type")
            && let Ok(content_type_str) = content_type.to_str()
            && !content_type_str.starts_with("application/json")
        {
            return Err(ServerError::JsonError {
                message: format!(
                    "invalid content-type: expected 'application/json', got '{content_type_str}'"
                ),
            });
        }

        let bytes = axum::body::Bytes::from_request(req, state)
            .await
            .map_err(|rejection| ServerError::JsonError {
                message: format!("failed to read request body: {rejection}"),
            })?;

        if bytes.len() > MAX_JSON_PAYLOAD_SIZE {
            return Err(ServerError::JsonError {
                message: format!(
                    "request body too large: {} bytes (max: {} bytes)",
                    bytes.len(),
                    MAX_JSON_PAYLOAD_SIZE
                ),
            });
        }

        if bytes.is_empty() {
            return Err(ServerError::JsonError {
                message: error_hints::EMPTY_BODY.to_string(),
            });
        }

        serde_json::from_slice::<T>(&bytes)
            .map(JsonExtractor)
            .map_err(|err| ServerError::JsonError {
                message: describe(&err, &bytes),
            })
    }
}

impl<T> IntoResponse for JsonExtractor<T>
where
    T: IntoResponse,
{
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

fn describe(err: &serde_json::Error, body: &[u8]) -> String {
    if err.is_syntax() {
        format!(
            "invalid JSON syntax at line {}, column {}: {}",
            err.line(),
            err.column(),
            syntax_hint(err, body)
        )
    } else if err.is_data() {
        format!("JSON data validation failed: {}", data_hint(err))
    } else if err.is_eof() {
        error_hints::TRUNCATED_JSON.to_string()
    } else {
        format!("JSON parsing error: {err}")
    }
}

/// Byte the parser stopped at; serde_json lines and columns are 1-based
fn offending_byte(err: &serde_json::Error, body: &[u8]) -> Option<u8> {
    let line = body.split(|b| *b == b'\n').nth(err.line().checked_sub(1)?)?;
    line.get(err.column().checked_sub(1)?).copied()
}

fn syntax_hint(err: &serde_json::Error, body: &[u8]) -> &'static str {
    let err_msg = err.to_string();

    if err_msg.contains("expected `,` or `}`") {
        match offending_byte(err, body) {
            Some(b']') => error_hints::MISSING_BRACE,
            _ => error_hints::MISSING_COMMA,
        }
    } else if err_msg.contains("expected `,` or `]`") {
        match offending_byte(err, body) {
            Some(b'}') => error_hints::MISSING_BRACKET,
            _ => error_hints::MISSING_COMMA,
        }
    } else if err_msg.contains("trailing comma") {
        error_hints::MISSING_COMMA
    } else if err_msg.contains("key must be a string") {
        error_hints::MISSING_QUOTES
    } else if err_msg.contains("expected `:`") {
        error_hints::MISSING_COLON
    } else if err_msg.contains("control character") {
        error_hints::CONTROL_CHARS
    } else if err_msg.contains("expected value") || err_msg.contains("expected ident") {
        error_hints::EXPECTED_VALUE
    } else {
        error_hints::DEFAULT_SYNTAX
    }
}

fn data_hint(err: &serde_json::Error) -> String {
    let err_msg = err.to_string();

    if err_msg.contains("invalid type") {
        if err_msg.contains("expected f64") || err_msg.contains("expected a number") {
            "expected a numeric value, but received a different data type".to_string()
        } else if err_msg.contains("expected a boolean") {
            "expected a boolean value (true or false), but received a different data type"
                .to_string()
        } else if err_msg.contains("expected struct") || err_msg.contains("expected a map") {
            "expected a JSON object, but received a different data type".to_string()
        } else {
            format!("data type mismatch: {err_msg}")
        }
    } else if err_msg.contains("missing field") {
        format!("required field is missing: {err_msg}")
    } else if err_msg.contains("unknown field") {
        format!("unrecognized field found: {err_msg}")
    } else {
        err_msg
    }
}

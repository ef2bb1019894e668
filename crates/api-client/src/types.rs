// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Response unwrapping helpers

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A dotted path into a nested JSON document
///
/// Segments name object keys; purely numeric segments index into arrays. The
/// empty path resolves to the document itself.
///
/// ```rust
/// use api_client::ResponsePath;
/// use serde_json::json;
///
/// let body = json!({"response": {"venues": [{"id": "v1"}]}});
/// let path = ResponsePath::parse("response.venues.0.id");
/// assert_eq!(path.resolve(&body), Some(&json!("v1")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponsePath {
    segments: Vec<String>,
}

impl ResponsePath {
    /// Parse a dotted path; empty segments are ignored
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('.')
                .filter(|segment| !segment.is_empty())
                .map(ToString::to_string)
                .collect(),
        }
    }

    /// The path that resolves to the whole document
    pub fn root() -> Self {
        Self::default()
    }

    /// Whether this path resolves to the whole document
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Follow the path, returning `None` as soon as a segment is missing
    pub fn resolve<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(value, |current, segment| match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| items.get(index)),
                _ => None,
            })
    }

    /// Follow the path and require an array at the end
    pub fn resolve_array<'a>(&self, value: &'a Value) -> Option<&'a Vec<Value>> {
        self.resolve(value).and_then(Value::as_array)
    }

    /// Follow the path and require an object at the end
    pub fn resolve_object<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.resolve(value).filter(|found| found.is_object())
    }

    /// Follow the path and read a string (numbers are rendered)
    pub fn resolve_string(&self, value: &Value) -> Option<String> {
        match self.resolve(value)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Follow the path and read a number (numeric strings are parsed)
    pub fn resolve_f64(&self, value: &Value) -> Option<f64> {
        match self.resolve(value)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for ResponsePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl Serialize for ResponsePath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ResponsePath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let path = String::deserialize(deserializer)?;
        Ok(Self::parse(&path))
    }
}

// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! User-facing notifications
//!
//! Failures are reported here rather than returned to whoever triggered the
//! call, since most calls are fired in the background. Each kind carries its
//! own dismissal rule.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared_types::Service;
use tokio::sync::broadcast;
use tracing::{debug, info};

const CHANNEL_CAPACITY: usize = 64;

/// What went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Network failure, timeout or error status
    TransportFailure,
    /// The response could not be interpreted
    UnreadableResponse,
    /// No record on the service matched the venue
    NoMatch,
    /// The map provider found nothing in the area
    ZeroResults,
    /// The map provider or a service throttled us
    RateLimited,
}

/// How a notification goes away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dismissal {
    /// Only when the user dismisses it
    Manual,
    /// After the verbose lifetime
    AutoExpire,
    /// Once new venues arrive
    OnNewEntities,
}

impl NotificationKind {
    /// Dismissal rule of this kind
    pub const fn dismissal(self) -> Dismissal {
        match self {
            Self::TransportFailure | Self::UnreadableResponse | Self::RateLimited => {
                Dismissal::Manual
            }
            Self::NoMatch => Dismissal::AutoExpire,
            Self::ZeroResults => Dismissal::OnNewEntities,
        }
    }

    /// Whether a second identical notification would only add noise
    const fn deduplicated(self) -> bool {
        matches!(self, Self::ZeroResults | Self::RateLimited)
    }
}

/// One notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Identifier used for dismissal
    pub id: u64,
    /// What went wrong
    pub kind: NotificationKind,
    /// Service involved, if any
    pub service: Option<Service>,
    /// Display copy
    pub message: String,
    /// When it was raised
    pub created_at: DateTime<Utc>,
    /// When it disappears on its own
    pub expires_at: Option<DateTime<Utc>>,
}

impl Notification {
    fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires| expires > now)
    }
}

/// Collects notifications and fans them out to subscribers
#[derive(Debug)]
pub struct NotificationCenter {
    active: Mutex<Vec<Notification>>,
    next_id: AtomicU64,
    verbose_ttl: TimeDelta,
    sender: broadcast::Sender<Notification>,
}

impl NotificationCenter {
    /// Center whose verbose notifications live for `verbose_ttl`
    pub fn new(verbose_ttl: Duration) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            active: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            verbose_ttl: TimeDelta::from_std(verbose_ttl).unwrap_or(TimeDelta::MAX),
            sender,
        }
    }

    /// Raise a notification at `now`
    ///
    /// Returns `None` when an identical deduplicated notification is still live.
    pub fn raise_at(
        &self,
        kind: NotificationKind,
        service: Option<Service>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Option<Notification> {
        let mut active = self.active.lock();
        active.retain(|notification| notification.is_live_at(now));

        if kind.deduplicated()
            && active
                .iter()
                .any(|existing| existing.kind == kind && existing.service == service)
        {
            return None;
        }

        let expires_at = match kind.dismissal() {
            Dismissal::AutoExpire => now.checked_add_signed(self.verbose_ttl),
            Dismissal::Manual | Dismissal::OnNewEntities => None,
        };
        let notification = Notification {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            service,
            message: message.into(),
            created_at: now,
            expires_at,
        };
        active.push(notification.clone());
        drop(active);

        info!(
            id = notification.id,
            ?kind,
            service = ?service,
            message = notification.message,
            "notification raised"
        );
        // No subscribers is fine
        let _ = self.sender.send(notification.clone());
        Some(notification)
    }

    /// Raise a notification now
    pub fn raise(
        &self,
        kind: NotificationKind,
        service: Option<Service>,
        message: impl Into<String>,
    ) -> Option<Notification> {
        self.raise_at(kind, service, message, Utc::now())
    }

    /// A service could not be reached for a venue
    pub fn transport_failure(&self, service: Service, venue: &str) -> Option<Notification> {
        self.raise(
            NotificationKind::TransportFailure,
            Some(service),
            format!(
                "{} could not be reached for {venue}. Please try again later.",
                service.display_name()
            ),
        )
    }

    /// A service answered with something unexpected
    pub fn unreadable_response(&self, service: Service, venue: &str) -> Option<Notification> {
        self.raise(
            NotificationKind::UnreadableResponse,
            Some(service),
            format!(
                "Could not interpret results from {} for {venue}.",
                service.display_name()
            ),
        )
    }

    /// No record on a service matched a venue
    pub fn no_match(&self, service: Service, venue: &str) -> Option<Notification> {
        self.raise(
            NotificationKind::NoMatch,
            Some(service),
            format!("{venue} was not found on {}.", service.display_name()),
        )
    }

    /// The map provider found nothing
    pub fn zero_results(&self) -> Option<Notification> {
        self.raise(
            NotificationKind::ZeroResults,
            Some(Service::Google),
            "No restaurants found in this area. Try moving the map or zooming out.",
        )
    }

    /// A provider throttled us
    pub fn rate_limited(&self, service: Service) -> Option<Notification> {
        self.raise(
            NotificationKind::RateLimited,
            Some(service),
            format!(
                "Too many requests to {}. Please wait a moment before searching again.",
                service.display_name()
            ),
        )
    }

    /// Live notifications at `now`, oldest first
    pub fn active_at(&self, now: DateTime<Utc>) -> Vec<Notification> {
        let mut active = self.active.lock();
        active.retain(|notification| notification.is_live_at(now));
        active.clone()
    }

    /// Live notifications, oldest first
    pub fn active(&self) -> Vec<Notification> {
        self.active_at(Utc::now())
    }

    /// Dismiss by id; returns whether it was live
    pub fn dismiss(&self, id: u64) -> bool {
        let mut active = self.active.lock();
        let before = active.len();
        active.retain(|notification| notification.id != id);
        before != active.len()
    }

    /// Dismiss everything
    pub fn clear(&self) -> usize {
        let mut active = self.active.lock();
        let cleared = active.len();
        active.clear();
        cleared
    }

    /// New venues arrived; drop the notifications that said there were none
    pub fn entities_populated(&self) -> usize {
        let mut active = self.active.lock();
        let before = active.len();
        active.retain(|notification| notification.kind.dismissal() != Dismissal::OnNewEntities);
        let dismissed = before - active.len();
        if dismissed > 0 {
            debug!(dismissed, "zero-results notifications dismissed");
        }
        dismissed
    }

    /// Receive every notification raised from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

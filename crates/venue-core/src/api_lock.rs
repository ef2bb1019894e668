// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! In-flight call tracking
//!
//! [`ApiLock`] records which (service, call type, venue) calls are running so
//! that no call is issued twice, and holds detailed requests that arrived
//! before their prerequisite basic call resolved. Venues are compared by
//! identity, so a venue re-created after eviction never inherits the records
//! of its disposed predecessor.

use std::sync::Arc;

use parking_lot::Mutex;
use shared_types::{CallType, Service};
use tracing::trace;

use crate::entity::{Entity, ProviderId};

/// A call that is running, or queued for replay
#[derive(Debug, Clone)]
pub struct CallRecord {
    /// Target service
    pub service: Service,
    /// Call type
    pub call_type: CallType,
    /// Target venue
    pub entity: Arc<Entity>,
}

/// A request deferred until the basic call on the same service completes
pub type InterceptedCall = CallRecord;

impl CallRecord {
    fn matches(&self, service: Service, entity: &Arc<Entity>) -> bool {
        self.service == service && Arc::ptr_eq(&self.entity, entity)
    }
}

#[derive(Debug, Default)]
struct Bucket {
    active_basic: Vec<Arc<Entity>>,
    active_detailed: Vec<Arc<Entity>>,
}

impl Bucket {
    fn list(&self, call_type: CallType) -> &Vec<Arc<Entity>> {
        match call_type {
            CallType::Basic => &self.active_basic,
            CallType::Detailed => &self.active_detailed,
        }
    }

    fn list_mut(&mut self, call_type: CallType) -> &mut Vec<Arc<Entity>> {
        match call_type {
            CallType::Basic => &mut self.active_basic,
            CallType::Detailed => &mut self.active_detailed,
        }
    }

    fn position(&self, call_type: CallType, entity: &Arc<Entity>) -> Option<usize> {
        self.list(call_type)
            .iter()
            .position(|active| Arc::ptr_eq(active, entity))
    }
}

#[derive(Debug, Default)]
struct LockInner {
    buckets: [Bucket; Service::COUNT],
    intercepts: Vec<InterceptedCall>,
}

/// Snapshot entry describing one tracked call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSummary {
    /// Target service
    pub service: Service,
    /// Call type
    pub call_type: CallType,
    /// Target venue
    pub provider_id: ProviderId,
}

impl From<&CallRecord> for CallSummary {
    fn from(record: &CallRecord) -> Self {
        Self {
            service: record.service,
            call_type: record.call_type,
            provider_id: record.entity.provider_id().clone(),
        }
    }
}

/// Tracker of active calls and intercepted requests
#[derive(Debug, Default)]
pub struct ApiLock {
    inner: Mutex<LockInner>,
}

impl ApiLock {
    /// Empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Position of the active call in its list, if running
    pub fn find_active(
        &self,
        service: Service,
        call_type: CallType,
        entity: &Arc<Entity>,
    ) -> Option<usize> {
        self.inner.lock().buckets[service.index()].position(call_type, entity)
    }

    /// Whether the call is running
    pub fn is_active(&self, service: Service, call_type: CallType, entity: &Arc<Entity>) -> bool {
        self.find_active(service, call_type, entity).is_some()
    }

    /// Record a call as running and raise the venue's loading indicator
    ///
    /// Marking a running call again is a caller bug.
    pub fn mark_active(&self, service: Service, call_type: CallType, entity: &Arc<Entity>) {
        let mut inner = self.inner.lock();
        let bucket = &mut inner.buckets[service.index()];
        debug_assert!(
            bucket.position(call_type, entity).is_none(),
            "{service} {call_type} call for {} marked active twice",
            entity.provider_id()
        );
        bucket.list_mut(call_type).push(Arc::clone(entity));
        entity.set_loading(service, true);
        trace!(%service, %call_type, provider_id = %entity.provider_id(), "call active");
    }

    /// Record a call as running unless it already is; returns whether it was recorded
    pub fn try_mark_active(
        &self,
        service: Service,
        call_type: CallType,
        entity: &Arc<Entity>,
    ) -> bool {
        let mut inner = self.inner.lock();
        let bucket = &mut inner.buckets[service.index()];
        if bucket.position(call_type, entity).is_some() {
            return false;
        }
        bucket.list_mut(call_type).push(Arc::clone(entity));
        entity.set_loading(service, true);
        trace!(%service, %call_type, provider_id = %entity.provider_id(), "call active");
        true
    }

    /// Remove a running call and hand back the requests queued behind it
    ///
    /// The loading indicator stays raised while the other call type is still
    /// running for the same venue and service.
    pub fn mark_complete(
        &self,
        service: Service,
        call_type: CallType,
        entity: &Arc<Entity>,
    ) -> Vec<InterceptedCall> {
        let mut inner = self.inner.lock();
        let bucket = &mut inner.buckets[service.index()];
        if let Some(position) = bucket.position(call_type, entity) {
            bucket.list_mut(call_type).remove(position);
        }

        let other = match call_type {
            CallType::Basic => CallType::Detailed,
            CallType::Detailed => CallType::Basic,
        };
        if bucket.position(other, entity).is_none() {
            entity.set_loading(service, false);
        }

        let (replay, keep) = std::mem::take(&mut inner.intercepts)
            .into_iter()
            .partition(|intercept| intercept.matches(service, entity));
        inner.intercepts = keep;

        trace!(
            %service,
            %call_type,
            provider_id = %entity.provider_id(),
            replays = replay.len(),
            "call complete"
        );
        replay
    }

    /// Queue a request for replay; returns `false` if one was already queued
    /// for this venue and service
    ///
    /// The same venue may hold one queued request on each service.
    pub fn enqueue_intercept(
        &self,
        service: Service,
        call_type: CallType,
        entity: &Arc<Entity>,
    ) -> bool {
        let mut inner = self.inner.lock();
        if inner
            .intercepts
            .iter()
            .any(|intercept| intercept.matches(service, entity))
        {
            return false;
        }
        inner.intercepts.push(CallRecord {
            service,
            call_type,
            entity: Arc::clone(entity),
        });
        true
    }

    /// Take the queued requests for this venue and service without completing a call
    pub fn take_intercepts(&self, service: Service, entity: &Arc<Entity>) -> Vec<InterceptedCall> {
        let mut inner = self.inner.lock();
        let (taken, keep) = std::mem::take(&mut inner.intercepts)
            .into_iter()
            .partition(|intercept| intercept.matches(service, entity));
        inner.intercepts = keep;
        taken
    }

    /// Discard the queued requests for this venue and service; returns how many
    pub fn dequeue_intercept(&self, service: Service, entity: &Arc<Entity>) -> usize {
        self.take_intercepts(service, entity).len()
    }

    /// Running calls
    pub fn active_calls(&self) -> Vec<CallSummary> {
        let inner = self.inner.lock();
        let mut calls = Vec::new();
        for &service in Service::all() {
            let bucket = &inner.buckets[service.index()];
            for call_type in [CallType::Basic, CallType::Detailed] {
                calls.extend(bucket.list(call_type).iter().map(|entity| CallSummary {
                    service,
                    call_type,
                    provider_id: entity.provider_id().clone(),
                }));
            }
        }
        calls
    }

    /// Queued requests
    pub fn queued_intercepts(&self) -> Vec<CallSummary> {
        self.inner
            .lock()
            .intercepts
            .iter()
            .map(CallSummary::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use shared_types::Coordinates;

    use super::*;
    use crate::{entity::TracingCallbacks, mapping::FieldSchema};

    fn venue(id: &str) -> Arc<Entity> {
        Arc::new(Entity::new(
            ProviderId::new(id),
            0,
            Coordinates::new(0.0, 0.0),
            id,
            &FieldSchema::standard(),
            Arc::new(TracingCallbacks),
        ))
    }

    #[test]
    fn one_active_call_per_key() {
        let lock = ApiLock::new();
        let a = venue("a");

        assert!(lock.try_mark_active(Service::Yelp, CallType::Basic, &a));
        assert!(!lock.try_mark_active(Service::Yelp, CallType::Basic, &a));
        assert!(lock.try_mark_active(Service::Yelp, CallType::Detailed, &a));
        assert!(lock.try_mark_active(Service::Locu, CallType::Basic, &a));
        assert_eq!(lock.find_active(Service::Yelp, CallType::Basic, &a), Some(0));
        assert_eq!(lock.active_calls().len(), 3);
    }

    #[test]
    fn loading_tracks_both_call_types() {
        let lock = ApiLock::new();
        let a = venue("a");

        lock.mark_active(Service::Yelp, CallType::Basic, &a);
        lock.mark_active(Service::Yelp, CallType::Detailed, &a);
        assert!(a.is_loading(Service::Yelp));

        lock.mark_complete(Service::Yelp, CallType::Basic, &a);
        assert!(a.is_loading(Service::Yelp));
        lock.mark_complete(Service::Yelp, CallType::Detailed, &a);
        assert!(!a.is_loading(Service::Yelp));
        assert!(lock.find_active(Service::Yelp, CallType::Basic, &a).is_none());
    }

    #[test]
    fn intercepts_coalesce_per_venue_and_service() {
        let lock = ApiLock::new();
        let a = venue("a");
        let b = venue("b");

        assert!(lock.enqueue_intercept(Service::Yelp, CallType::Detailed, &a));
        assert!(!lock.enqueue_intercept(Service::Yelp, CallType::Detailed, &a));
        assert!(lock.enqueue_intercept(Service::Locu, CallType::Detailed, &a));
        assert!(lock.enqueue_intercept(Service::Yelp, CallType::Detailed, &b));
        assert_eq!(lock.queued_intercepts().len(), 3);
    }

    #[test]
    fn completion_replays_only_matching_intercepts() {
        let lock = ApiLock::new();
        let a = venue("a");
        let b = venue("b");

        lock.mark_active(Service::Yelp, CallType::Basic, &a);
        lock.enqueue_intercept(Service::Yelp, CallType::Detailed, &a);
        lock.enqueue_intercept(Service::Locu, CallType::Detailed, &a);
        lock.enqueue_intercept(Service::Yelp, CallType::Detailed, &b);

        let replay = lock.mark_complete(Service::Yelp, CallType::Basic, &a);
        assert_eq!(replay.len(), 1);
        assert_eq!(replay[0].service, Service::Yelp);
        assert_eq!(replay[0].call_type, CallType::Detailed);
        assert!(Arc::ptr_eq(&replay[0].entity, &a));
        assert_eq!(lock.queued_intercepts().len(), 2);
    }

    #[test]
    fn dequeue_discards_pending_replays() {
        let lock = ApiLock::new();
        let a = venue("a");

        lock.mark_active(Service::Foursquare, CallType::Basic, &a);
        lock.enqueue_intercept(Service::Foursquare, CallType::Detailed, &a);
        assert_eq!(lock.dequeue_intercept(Service::Foursquare, &a), 1);
        assert!(
            lock.mark_complete(Service::Foursquare, CallType::Basic, &a)
                .is_empty()
        );
    }

    #[test]
    fn recreated_venue_does_not_share_records() {
        let lock = ApiLock::new();
        let old = venue("a");
        let new = venue("a");

        lock.mark_active(Service::Yelp, CallType::Basic, &old);
        assert!(!lock.is_active(Service::Yelp, CallType::Basic, &new));
    }
}

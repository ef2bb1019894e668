// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Registry of known venues
//!
//! Keeps venues in arrival order with a provider-id index, and bounds its size
//! by disposing the oldest non-favorite venues in bulk.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::RwLock;
use shared_types::Bounds;
use tracing::{debug, info, warn};

use crate::entity::{Entity, ProviderId};

#[derive(Debug, Default)]
struct RegistryInner {
    order: Vec<Arc<Entity>>,
    by_id: HashMap<ProviderId, Arc<Entity>>,
}

/// Venues known to the session
#[derive(Debug)]
pub struct EntityRegistry {
    inner: RwLock<RegistryInner>,
    next_sequence: AtomicU64,
    eviction_cap: usize,
    eviction_bulk: usize,
}

impl EntityRegistry {
    /// Empty registry evicting `eviction_bulk` venues once it exceeds `eviction_cap`
    pub fn new(eviction_cap: usize, eviction_bulk: usize) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            next_sequence: AtomicU64::new(0),
            eviction_cap,
            eviction_bulk,
        }
    }

    /// Next sequence number for a new venue
    pub fn allocate_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Venue by provider id
    pub fn find_by_provider_id(&self, id: &ProviderId) -> Option<Arc<Entity>> {
        self.inner.read().by_id.get(id).cloned()
    }

    /// Append venues in order, then evict if over capacity
    ///
    /// Venues whose provider id is already registered are skipped. Returns the
    /// ids of evicted venues.
    pub fn insert_many(&self, entities: Vec<Arc<Entity>>) -> Vec<ProviderId> {
        {
            let mut inner = self.inner.write();
            for entity in entities {
                let id = entity.provider_id().clone();
                if inner.by_id.contains_key(&id) {
                    warn!(provider_id = %id, "venue already registered, skipping");
                    continue;
                }
                inner.by_id.insert(id, Arc::clone(&entity));
                inner.order.push(entity);
            }
        }

        self.evict_oldest_excess(self.eviction_cap, self.eviction_bulk)
    }

    /// Dispose the `bulk` oldest non-favorite venues if there are more than `cap`
    ///
    /// Favorites are never evicted; the relative order of survivors is kept.
    pub fn evict_oldest_excess(&self, cap: usize, bulk: usize) -> Vec<ProviderId> {
        let victims = {
            let mut inner = self.inner.write();
            if inner.order.len() <= cap {
                return Vec::new();
            }

            let mut candidates: Vec<&Arc<Entity>> = inner
                .order
                .iter()
                .filter(|entity| !entity.is_favorite())
                .collect();
            candidates.sort_by_key(|entity| entity.sequence_number());

            let victims: Vec<Arc<Entity>> =
                candidates.into_iter().take(bulk).cloned().collect();

            inner
                .order
                .retain(|entity| !victims.iter().any(|victim| Arc::ptr_eq(victim, entity)));
            for victim in &victims {
                inner.by_id.remove(victim.provider_id());
            }
            victims
        };

        for victim in &victims {
            victim.dispose();
        }

        if !victims.is_empty() {
            info!(evicted = victims.len(), cap, "evicted oldest venues");
        }

        victims
            .iter()
            .map(|victim| victim.provider_id().clone())
            .collect()
    }

    /// All venues in arrival order
    pub fn all(&self) -> Vec<Arc<Entity>> {
        self.inner.read().order.clone()
    }

    /// Listed venues in arrival order
    pub fn listed(&self) -> Vec<Arc<Entity>> {
        self.filtered(|entity| entity.flags().is_listed)
    }

    /// Favorite venues in arrival order
    pub fn favorites(&self) -> Vec<Arc<Entity>> {
        self.filtered(Entity::is_favorite)
    }

    /// The selected venue, if any
    pub fn selected(&self) -> Option<Arc<Entity>> {
        self.inner
            .read()
            .order
            .iter()
            .find(|entity| entity.flags().is_selected)
            .cloned()
    }

    fn filtered(&self, keep: impl Fn(&Entity) -> bool) -> Vec<Arc<Entity>> {
        self.inner
            .read()
            .order
            .iter()
            .filter(|entity| keep(entity))
            .cloned()
            .collect()
    }

    /// Number of registered venues
    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    /// Whether no venue is registered
    pub fn is_empty(&self) -> bool {
        self.inner.read().order.is_empty()
    }

    /// Refresh `is_in_view_on_map` against the viewport; returns how many are in view
    pub fn update_view(&self, bounds: &Bounds) -> usize {
        let entities = self.all();
        let mut in_view = 0;
        for entity in &entities {
            let visible = bounds.contains(&entity.coordinates());
            entity.update_flags(|flags| flags.is_in_view_on_map = visible);
            if visible {
                in_view += 1;
            }
        }
        debug!(in_view, total = entities.len(), "viewport updated");
        in_view
    }
}

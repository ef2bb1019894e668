// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Session persistence
//!
//! Favorites and the last map view survive restarts as one JSON document.
//! Writes are throttled: a save requested too soon after the previous one is
//! held back and written once the interval has passed, keeping only the
//! latest snapshot.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared_types::Coordinates;
use tokio::{fs, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    error::{CoreError, CoreResult},
    mapping::EntityBlueprint,
};

/// Last map viewport
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    /// Viewport centre
    pub center: Coordinates,
    /// Map zoom level
    pub zoom: u8,
}

/// Everything restored at startup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Pinned venues
    #[serde(default)]
    pub favorites: Vec<EntityBlueprint>,
    /// Last viewport
    #[serde(default)]
    pub map_view: Option<MapView>,
}

/// JSON file holding the snapshot
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    /// Store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot; a missing file is an empty session
    pub async fn load(&self) -> CoreResult<Option<SessionSnapshot>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no session snapshot");
                return Ok(None);
            }
            Err(e) => {
                return Err(CoreError::persistence(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };

        let snapshot: SessionSnapshot = serde_json::from_str(&content).map_err(|e| {
            CoreError::json(format!("Failed to parse {}: {e}", self.path.display()))
        })?;
        info!(
            favorites = snapshot.favorites.len(),
            path = %self.path.display(),
            "loaded session snapshot"
        );
        Ok(Some(snapshot))
    }

    /// Replace the snapshot atomically
    pub async fn save(&self, snapshot: &SessionSnapshot) -> CoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_vec_pretty(snapshot)?;
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, content).await?;
        fs::rename(&staging, &self.path).await?;
        debug!(
            favorites = snapshot.favorites.len(),
            path = %self.path.display(),
            "saved session snapshot"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct WriterState {
    last_write: Option<Instant>,
    pending: Option<SessionSnapshot>,
    flush_scheduled: bool,
}

/// What a save does once the writer state is released
enum WritePlan {
    Now(SessionSnapshot),
    Later(Duration),
}

/// Throttled front of a [`FileSnapshotStore`]
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    store: FileSnapshotStore,
    min_interval: Duration,
    state: Arc<Mutex<WriterState>>,
}

impl SnapshotWriter {
    /// Writer allowing at most one write per `min_interval`
    pub fn new(store: FileSnapshotStore, min_interval: Duration) -> Self {
        Self {
            store,
            min_interval,
            state: Arc::new(Mutex::new(WriterState::default())),
        }
    }

    /// Underlying store
    pub fn store(&self) -> &FileSnapshotStore {
        &self.store
    }

    /// Save now if allowed, otherwise schedule a deferred write
    ///
    /// Returns whether the snapshot was written immediately.
    pub async fn save(&self, snapshot: SessionSnapshot) -> CoreResult<bool> {
        let plan = {
            let mut state = self.state.lock();
            let now = Instant::now();
            match state.last_write {
                Some(last) if now.duration_since(last) < self.min_interval => {
                    state.pending = Some(snapshot);
                    if state.flush_scheduled {
                        return Ok(false);
                    }
                    state.flush_scheduled = true;
                    WritePlan::Later(self.min_interval - now.duration_since(last))
                }
                _ => {
                    state.last_write = Some(now);
                    state.pending = None;
                    WritePlan::Now(snapshot)
                }
            }
        };

        match plan {
            WritePlan::Now(snapshot) => {
                self.store.save(&snapshot).await?;
                Ok(true)
            }
            WritePlan::Later(delay) => {
                let writer = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = writer.flush().await {
                        warn!(error = %e, "deferred snapshot write failed");
                    }
                });
                Ok(false)
            }
        }
    }

    /// Write any held-back snapshot immediately
    ///
    /// Returns whether something was written.
    pub async fn flush(&self) -> CoreResult<bool> {
        let pending = {
            let mut state = self.state.lock();
            state.flush_scheduled = false;
            let pending = state.pending.take();
            if pending.is_some() {
                state.last_write = Some(Instant::now());
            }
            pending
        };

        match pending {
            Some(snapshot) => {
                self.store.save(&snapshot).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(zoom: u8) -> SessionSnapshot {
        SessionSnapshot {
            favorites: Vec::new(),
            map_view: Some(MapView {
                center: Coordinates::new(40.73, -73.99),
                zoom,
            }),
        }
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("session.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("nested/session.json"));
        store.save(&view(14)).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(view(14)));
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();
        let result = FileSnapshotStore::new(path).load().await;
        assert!(matches!(result, Err(CoreError::Json { .. })));
    }

    #[tokio::test]
    async fn writes_are_throttled_and_latest_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("session.json"));
        let writer = SnapshotWriter::new(store.clone(), Duration::from_millis(200));

        assert!(writer.save(view(10)).await.unwrap());
        assert!(!writer.save(view(11)).await.unwrap());
        assert!(!writer.save(view(12)).await.unwrap());
        assert_eq!(store.load().await.unwrap(), Some(view(10)));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(store.load().await.unwrap(), Some(view(12)));
    }

    #[tokio::test]
    async fn flush_writes_pending_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("session.json"));
        let writer = SnapshotWriter::new(store.clone(), Duration::from_secs(60));

        writer.save(view(10)).await.unwrap();
        writer.save(view(13)).await.unwrap();
        assert!(writer.flush().await.unwrap());
        assert!(!writer.flush().await.unwrap());
        assert_eq!(store.load().await.unwrap(), Some(view(13)));
    }

    #[tokio::test]
    async fn write_after_interval_goes_straight_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("session.json"));
        let writer = SnapshotWriter::new(store.clone(), Duration::from_millis(50));

        assert!(writer.save(view(10)).await.unwrap());
        assert_eq!(store.load().await.unwrap(), Some(view(10)));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(writer.save(view(15)).await.unwrap());
        assert_eq!(store.load().await.unwrap(), Some(view(15)));
        assert!(!writer.flush().await.unwrap());
    }
}

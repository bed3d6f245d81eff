//! Checkpoint persistence port and the in-memory store.
//!
//! A [`Checkpoint`] is everything needed to resume a run: its phase (which
//! carries the pending interrupt when suspended) and its session state.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tabsplit_core::RunId;

use crate::errors::Result;
use crate::pipeline::RunPhase;
use crate::state::SessionState;

/// Persisted snapshot of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Run identity.
    pub run_id: RunId,
    /// Where the run is.
    pub phase: RunPhase,
    /// What the run knows.
    pub state: SessionState,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// New checkpoint at `phase`, stamped now.
    pub fn new(run_id: RunId, phase: RunPhase, state: SessionState) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            phase,
            state,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `phase` and bump `updated_at`.
    pub fn transition(&mut self, phase: RunPhase) {
        self.phase = phase;
        self.updated_at = Utc::now();
    }
}

/// Where checkpoints live between suspensions.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Fetch a checkpoint.
    async fn load(&self, run_id: &RunId) -> Result<Option<Checkpoint>>;
    /// Insert or replace a checkpoint.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;
    /// Delete a checkpoint; returns whether one existed.
    async fn remove(&self, run_id: &RunId) -> Result<bool>;
    /// All stored checkpoints.
    async fn list(&self) -> Result<Vec<Checkpoint>>;
}

/// Process-local [`CheckpointStore`].
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: RwLock<HashMap<RunId, Checkpoint>>,
}

impl InMemoryCheckpointStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored checkpoints.
    pub fn len(&self) -> usize {
        self.checkpoints.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.checkpoints.read().is_empty()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, run_id: &RunId) -> Result<Option<Checkpoint>> {
        Ok(self.checkpoints.read().get(run_id).cloned())
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let _ = self
            .checkpoints
            .write()
            .insert(checkpoint.run_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn remove(&self, run_id: &RunId) -> Result<bool> {
        Ok(self.checkpoints.write().remove(run_id).is_some())
    }

    async fn list(&self) -> Result<Vec<Checkpoint>> {
        Ok(self.checkpoints.read().values().cloned().collect())
    }
}

//! Run lifecycle events and the broadcast emitter that carries them.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tabsplit_core::RunId;
use tokio::sync::broadcast;

use crate::interrupt::Interrupt;
use crate::stages::Stage;

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 1024;

/// Something that happened to a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A new run was created.
    RunStarted {
        /// Run.
        run_id: RunId,
    },
    /// A suspended run received input.
    RunResumed {
        /// Run.
        run_id: RunId,
    },
    /// A stage began executing.
    StageStarted {
        /// Run.
        run_id: RunId,
        /// Stage.
        stage: Stage,
    },
    /// A stage finished without error.
    StageCompleted {
        /// Run.
        run_id: RunId,
        /// Stage.
        stage: Stage,
        /// Wall time in milliseconds.
        duration_ms: u64,
    },
    /// The run is waiting for input.
    RunSuspended {
        /// Run.
        run_id: RunId,
        /// What it waits for.
        interrupt: Interrupt,
    },
    /// The run produced its itemization.
    RunCompleted {
        /// Run.
        run_id: RunId,
        /// Sum of every person's final total.
        grand_total: f64,
    },
    /// A stage failed and the run was aborted.
    RunFailed {
        /// Run.
        run_id: RunId,
        /// Failing stage.
        stage: Stage,
        /// Error category.
        category: String,
        /// Error message.
        message: String,
    },
    /// The run was cancelled on request.
    RunAborted {
        /// Run.
        run_id: RunId,
    },
    /// An idle run was dropped after its time-to-live.
    RunExpired {
        /// Run.
        run_id: RunId,
    },
}

impl PipelineEvent {
    /// The run this event concerns.
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::RunStarted { run_id }
            | Self::RunResumed { run_id }
            | Self::StageStarted { run_id, .. }
            | Self::StageCompleted { run_id, .. }
            | Self::RunSuspended { run_id, .. }
            | Self::RunCompleted { run_id, .. }
            | Self::RunFailed { run_id, .. }
            | Self::RunAborted { run_id }
            | Self::RunExpired { run_id } => run_id,
        }
    }

    /// Stable event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::RunResumed { .. } => "run_resumed",
            Self::StageStarted { .. } => "stage_started",
            Self::StageCompleted { .. } => "stage_completed",
            Self::RunSuspended { .. } => "run_suspended",
            Self::RunCompleted { .. } => "run_completed",
            Self::RunFailed { .. } => "run_failed",
            Self::RunAborted { .. } => "run_aborted",
            Self::RunExpired { .. } => "run_expired",
        }
    }
}

/// Broadcast-based event emitter.
///
/// `emit` never awaits. Slow receivers lag and drop events rather than
/// blocking the pipeline.
pub struct EventEmitter {
    tx: broadcast::Sender<PipelineEvent>,
    emit_count: AtomicU64,
}

impl EventEmitter {
    /// Emitter with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Emitter with a custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            emit_count: AtomicU64::new(0),
        }
    }

    /// Emit to all subscribers; returns how many received it.
    pub fn emit(&self, event: PipelineEvent) -> usize {
        let _ = self.emit_count.fetch_add(1, Ordering::Relaxed);
        self.tx.send(event).unwrap_or(0)
    }

    /// Receive every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Total events emitted.
    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

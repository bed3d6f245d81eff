//! Orchestrator: owns checkpoints and serializes access to each run.
//!
//! Only one caller may advance a given run at a time, and at most
//! `max_concurrent_runs` runs execute stages at once. Suspended runs hold
//! no permit; they live in the [`CheckpointStore`] until resumed, aborted,
//! or pruned.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::gauge;
use parking_lot::Mutex;
use serde::Serialize;
use tabsplit_core::{Message, RunId};
use tabsplit_settings::PipelineSettings;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::errors::{Result, RuntimeError};
use crate::events::{EventEmitter, PipelineEvent};
use crate::interrupt::ResumeInput;
use crate::pipeline::{ReceiptPipeline, RunFailure, RunPhase, RunStatus, Transition};
use crate::stages::Stage;

/// A run some caller is currently working on.
struct ActiveRun {
    cancel: CancellationToken,
    /// Fired once the claim is released and any transition is saved.
    done: CancellationToken,
    /// Held while stages execute. Bookkeeping claims (abort, prune) take none.
    _permit: Option<OwnedSemaphorePermit>,
}

type ActiveRuns = Mutex<HashMap<RunId, ActiveRun>>;

/// Removes the run from `active_runs` when dropped.
struct ExecutionGuard<'a> {
    runs: &'a ActiveRuns,
    run_id: RunId,
    cancel: CancellationToken,
    done: CancellationToken,
}

impl ExecutionGuard<'_> {
    fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        let mut runs = self.runs.lock();
        let _ = runs.remove(&self.run_id);
        #[allow(clippy::cast_precision_loss)]
        gauge!("pipeline_runs_active").set(runs.len() as f64);
        drop(runs);
        self.done.cancel();
    }
}

/// Identity and status of a run after a call.
#[derive(Clone, Debug, Serialize)]
pub struct RunOutcome {
    /// Run.
    pub run_id: RunId,
    /// Where it ended up.
    pub status: RunStatus,
}

/// Multi-run coordinator.
pub struct Orchestrator {
    pipeline: ReceiptPipeline,
    store: Arc<dyn CheckpointStore>,
    max_concurrent_runs: usize,
    run_semaphore: Arc<Semaphore>,
    active_runs: ActiveRuns,
    /// Idle runs older than this are pruned. `None` keeps them forever.
    run_ttl: Option<Duration>,
}

impl Orchestrator {
    /// Create an orchestrator with no run expiry.
    pub fn new(
        pipeline: ReceiptPipeline,
        store: Arc<dyn CheckpointStore>,
        max_concurrent_runs: usize,
    ) -> Self {
        Self {
            pipeline,
            store,
            max_concurrent_runs,
            run_semaphore: Arc::new(Semaphore::new(max_concurrent_runs)),
            active_runs: Mutex::new(HashMap::new()),
            run_ttl: None,
        }
    }

    /// Create an orchestrator with limits and expiry from settings.
    pub fn from_settings(
        pipeline: ReceiptPipeline,
        store: Arc<dyn CheckpointStore>,
        settings: &PipelineSettings,
    ) -> Self {
        Self::new(pipeline, store, settings.max_concurrent_runs)
            .with_run_ttl(Duration::from_millis(settings.suspended_run_ttl_ms))
    }

    /// Expire idle runs after `ttl`. Zero disables expiry.
    #[must_use]
    pub fn with_run_ttl(mut self, ttl: Duration) -> Self {
        self.run_ttl = (!ttl.is_zero()).then_some(ttl);
        self
    }

    /// Broadcast emitter shared with the pipeline.
    pub fn events(&self) -> &Arc<EventEmitter> {
        self.pipeline.events()
    }

    /// Subscribe to run events.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.pipeline.events().subscribe()
    }

    /// Maximum concurrently executing runs.
    pub fn max_concurrent_runs(&self) -> usize {
        self.max_concurrent_runs
    }

    /// Number of runs currently claimed by a caller.
    pub fn active_run_count(&self) -> usize {
        self.active_runs.lock().len()
    }

    /// Whether a caller is currently working on `run_id`.
    pub fn is_executing(&self, run_id: &RunId) -> bool {
        self.active_runs.lock().contains_key(run_id)
    }

    /// Claim `run_id` for execution, taking a concurrency permit.
    fn begin_execution(&self, run_id: &RunId) -> Result<ExecutionGuard<'_>> {
        let mut runs = self.active_runs.lock();
        if runs.contains_key(run_id) {
            return Err(RuntimeError::RunBusy(run_id.to_string()));
        }
        let permit = Arc::clone(&self.run_semaphore)
            .try_acquire_owned()
            .map_err(|_| RuntimeError::ServerBusy {
                current: runs.len(),
                max: self.max_concurrent_runs,
            })?;
        Ok(self.insert_claim(&mut runs, run_id, Some(permit)))
    }

    /// Claim `run_id` without a permit, for store-only bookkeeping.
    fn begin_bookkeeping(&self, run_id: &RunId) -> Option<ExecutionGuard<'_>> {
        let mut runs = self.active_runs.lock();
        if runs.contains_key(run_id) {
            return None;
        }
        Some(self.insert_claim(&mut runs, run_id, None))
    }

    fn insert_claim(
        &self,
        runs: &mut HashMap<RunId, ActiveRun>,
        run_id: &RunId,
        permit: Option<OwnedSemaphorePermit>,
    ) -> ExecutionGuard<'_> {
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        let _ = runs.insert(
            run_id.clone(),
            ActiveRun {
                cancel: cancel.clone(),
                done: done.clone(),
                _permit: permit,
            },
        );
        #[allow(clippy::cast_precision_loss)]
        gauge!("pipeline_runs_active").set(runs.len() as f64);
        ExecutionGuard {
            runs: &self.active_runs,
            run_id: run_id.clone(),
            cancel,
            done,
        }
    }

    /// Persist a transition and report it.
    async fn commit(&self, transition: Transition, cancelled: bool) -> Result<RunOutcome> {
        self.store.save(&transition.checkpoint).await?;
        let run_id = transition.checkpoint.run_id;
        if cancelled && matches!(transition.status, RunStatus::Failed(_)) {
            let _ = self.events().emit(PipelineEvent::RunAborted {
                run_id: run_id.clone(),
            });
        }
        Ok(RunOutcome {
            run_id,
            status: transition.status,
        })
    }

    /// Start a new run and drive it to its first suspension point.
    #[instrument(skip_all)]
    pub async fn start_run(&self, messages: Vec<Message>) -> Result<RunOutcome> {
        let run_id = RunId::new();
        let guard = self.begin_execution(&run_id)?;
        let transition = self
            .pipeline
            .start(run_id, messages, guard.cancel())
            .await?;
        let cancelled = guard.cancel().is_cancelled();
        let outcome = self.commit(transition, cancelled).await;
        drop(guard);
        outcome
    }

    /// Answer a suspended run's interrupt.
    ///
    /// The stored checkpoint is untouched when the input is rejected with
    /// an error.
    #[instrument(skip(self, input), fields(run_id = %run_id))]
    pub async fn resume_run(&self, run_id: &RunId, input: ResumeInput) -> Result<RunOutcome> {
        let guard = self.begin_execution(run_id)?;
        let checkpoint = self.load(run_id).await?;
        let transition = self
            .pipeline
            .resume(checkpoint, input, guard.cancel())
            .await?;
        let cancelled = guard.cancel().is_cancelled();
        let outcome = self.commit(transition, cancelled).await;
        drop(guard);
        outcome
    }

    /// Current status of a run that is not executing.
    pub async fn status(&self, run_id: &RunId) -> Result<RunStatus> {
        if self.is_executing(run_id) {
            return Err(RuntimeError::RunBusy(run_id.to_string()));
        }
        let checkpoint = self.load(run_id).await?;
        RunStatus::from_checkpoint(&checkpoint).ok_or_else(|| {
            RuntimeError::Internal(format!(
                "run {run_id} stored in phase {}",
                checkpoint.phase.name()
            ))
        })
    }

    /// Stored checkpoint of a run.
    pub async fn checkpoint(&self, run_id: &RunId) -> Result<Option<Checkpoint>> {
        self.store.load(run_id).await
    }

    async fn load(&self, run_id: &RunId) -> Result<Checkpoint> {
        self.store
            .load(run_id)
            .await?
            .ok_or_else(|| RuntimeError::RunNotFound(run_id.to_string()))
    }

    /// Abort a run.
    ///
    /// An executing run has its cancellation token fired; the call then waits
    /// for that execution to commit and reports whether it ended cancelled.
    /// A run already past its last cancellation check may still complete,
    /// in which case this returns `false`. A suspended run is moved to failed
    /// directly. Returns `false` when the run had already finished.
    #[instrument(skip(self), fields(run_id = %run_id))]
    pub async fn abort(&self, run_id: &RunId) -> Result<bool> {
        let executing = self
            .active_runs
            .lock()
            .get(run_id)
            .map(|run| (run.cancel.clone(), run.done.clone()));
        if let Some((cancel, done)) = executing {
            warn!("abort requested for executing run");
            cancel.cancel();
            done.cancelled().await;
            let aborted = self.store.load(run_id).await?.is_some_and(|checkpoint| {
                matches!(
                    checkpoint.phase,
                    RunPhase::Failed { ref failure } if failure.category == "cancelled"
                )
            });
            if !aborted {
                info!("run finished before cancellation took effect");
            }
            return Ok(aborted);
        }

        let Some(guard) = self.begin_bookkeeping(run_id) else {
            return Err(RuntimeError::RunBusy(run_id.to_string()));
        };

        let mut checkpoint = self.load(run_id).await?;
        let stage = match &checkpoint.phase {
            RunPhase::AwaitingParticipants { .. } => Stage::RequestSplit,
            RunPhase::AwaitingInstructions { .. } => Stage::CollectInstructions,
            RunPhase::Ready { stage } => *stage,
            RunPhase::Completed | RunPhase::Failed { .. } => {
                debug!(phase = checkpoint.phase.name(), "abort of finished run ignored");
                return Ok(false);
            }
        };
        checkpoint.transition(RunPhase::Failed {
            failure: RunFailure::new(stage, &RuntimeError::Cancelled),
        });
        self.store.save(&checkpoint).await?;
        drop(guard);

        info!(stage = %stage, "suspended run aborted");
        let _ = self.events().emit(PipelineEvent::RunAborted {
            run_id: run_id.clone(),
        });
        Ok(true)
    }

    /// Drop idle runs whose last transition is older than the TTL.
    ///
    /// Returns the number of runs removed.
    #[instrument(skip(self))]
    pub async fn prune_expired(&self) -> Result<usize> {
        let Some(ttl) = self.run_ttl else {
            return Ok(0);
        };
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| RuntimeError::Internal(format!("run ttl out of range: {e}")))?;
        let cutoff = Utc::now() - ttl;

        let mut pruned = 0;
        for checkpoint in self.store.list().await? {
            if checkpoint.updated_at >= cutoff {
                continue;
            }
            let Some(guard) = self.begin_bookkeeping(&checkpoint.run_id) else {
                continue;
            };
            // The listing may predate a transition committed since.
            let still_stale = self
                .store
                .load(&checkpoint.run_id)
                .await?
                .is_some_and(|current| current.updated_at < cutoff);
            if still_stale && self.store.remove(&checkpoint.run_id).await? {
                pruned += 1;
                debug!(run_id = %checkpoint.run_id, phase = checkpoint.phase.name(), "run expired");
                let _ = self.events().emit(PipelineEvent::RunExpired {
                    run_id: checkpoint.run_id.clone(),
                });
            }
            drop(guard);
        }
        if pruned > 0 {
            info!(pruned, "expired runs pruned");
        }
        Ok(pruned)
    }

    /// Cancel every executing run.
    #[instrument(skip(self))]
    pub fn shutdown(&self) {
        let runs = self.active_runs.lock();
        info!(active = runs.len(), "orchestrator shutdown initiated");
        for run in runs.values() {
            run.cancel.cancel();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

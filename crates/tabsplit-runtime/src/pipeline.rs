//! The receipt pipeline as a suspendable state machine.
//!
//! A run moves through the five [`Stage`]s in order. At each suspension point
//! the run stops, records an [`Interrupt`] in its [`RunPhase`] and hands back
//! a [`Checkpoint`]. [`ReceiptPipeline::resume`] takes that checkpoint and
//! the caller's input and runs forward again until the next suspension point
//! or the end.
//!
//! Stage errors never escape as `Err`: they move the run to
//! [`RunPhase::Failed`]. `Err` is reserved for calls that are invalid for the
//! checkpoint they were given, in which case nothing changes.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tabsplit_core::{Itemization, Message, RunId};
use tabsplit_llm::{ReceiptExtractor, SplitReasoner};
use tabsplit_settings::{DEFAULT_IMAGE_MIME_TYPE, PipelineSettings};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::checkpoint::Checkpoint;
use crate::errors::{Result, RuntimeError};
use crate::events::{EventEmitter, PipelineEvent};
use crate::interrupt::{Interrupt, ResumeInput};
use crate::stages::analyzer::analyze_receipt;
use crate::stages::image_loader::load_image;
use crate::stages::instructions::{accept_instructions, instructions_prompt};
use crate::stages::itemization::calculate_itemization;
use crate::stages::split_request::{apply_participants, parse_participants, participants_form};
use crate::stages::Stage;
use crate::state::{SessionState, StateUpdate};

/// Where a run is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunPhase {
    /// About to execute `stage`.
    Ready {
        /// Next stage to run.
        stage: Stage,
    },
    /// Suspended on the participants form.
    AwaitingParticipants {
        /// Pending form.
        interrupt: Interrupt,
    },
    /// Suspended on the split instructions prompt.
    AwaitingInstructions {
        /// Pending prompt.
        interrupt: Interrupt,
    },
    /// Finished with an itemization.
    Completed,
    /// Aborted by a stage error.
    Failed {
        /// What went wrong.
        failure: RunFailure,
    },
}

impl RunPhase {
    /// Pending interrupt, when suspended.
    pub fn interrupt(&self) -> Option<&Interrupt> {
        match self {
            Self::AwaitingParticipants { interrupt } | Self::AwaitingInstructions { interrupt } => {
                Some(interrupt)
            }
            Self::Ready { .. } | Self::Completed | Self::Failed { .. } => None,
        }
    }

    /// Whether the run is waiting for input.
    pub fn is_suspended(&self) -> bool {
        self.interrupt().is_some()
    }

    /// Whether the run can no longer move.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::AwaitingParticipants { .. } => "awaiting_participants",
            Self::AwaitingInstructions { .. } => "awaiting_instructions",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Why a run failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// Stage that raised the error.
    pub stage: Stage,
    /// Error category.
    pub category: String,
    /// Error message.
    pub message: String,
    /// Whether starting a new run with the same input could succeed.
    pub recoverable: bool,
}

impl RunFailure {
    /// Describe `error` raised at `stage`.
    pub fn new(stage: Stage, error: &RuntimeError) -> Self {
        Self {
            stage,
            category: error.category().to_string(),
            message: error.to_string(),
            recoverable: error.is_recoverable(),
        }
    }
}

/// What the caller sees after a transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RunStatus {
    /// Suspended; answer the interrupt to continue.
    AwaitingInput(Interrupt),
    /// Finished.
    Completed(Itemization),
    /// Failed.
    Failed(RunFailure),
}

impl RunStatus {
    /// Derive the status a checkpoint is in, if it is not mid-execution.
    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Option<Self> {
        match &checkpoint.phase {
            RunPhase::AwaitingParticipants { interrupt } | RunPhase::AwaitingInstructions { interrupt } => {
                Some(Self::AwaitingInput(interrupt.clone()))
            }
            RunPhase::Completed => checkpoint.state.itemization.clone().map(Self::Completed),
            RunPhase::Failed { failure } => Some(Self::Failed(failure.clone())),
            RunPhase::Ready { .. } => None,
        }
    }
}

/// Result of [`ReceiptPipeline::start`] or [`ReceiptPipeline::resume`].
#[derive(Clone, Debug)]
pub struct Transition {
    /// Checkpoint to persist.
    pub checkpoint: Checkpoint,
    /// Outcome to report.
    pub status: RunStatus,
}

/// Behavior knobs.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// MIME type used when the image block has none.
    pub default_mime_type: String,
    /// Reject participant input whose count differs from the number of names.
    pub enforce_participant_count: bool,
}

impl PipelineConfig {
    /// Read the relevant settings.
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            default_mime_type: settings.image_mime_type.clone(),
            enforce_participant_count: settings.enforce_participant_count,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_mime_type: DEFAULT_IMAGE_MIME_TYPE.to_string(),
            enforce_participant_count: false,
        }
    }
}

/// Runs the stages and their transitions.
pub struct ReceiptPipeline {
    extractor: Arc<dyn ReceiptExtractor>,
    reasoner: Arc<dyn SplitReasoner>,
    config: PipelineConfig,
    events: Arc<EventEmitter>,
}

impl ReceiptPipeline {
    /// Pipeline with its own event emitter.
    pub fn new(
        extractor: Arc<dyn ReceiptExtractor>,
        reasoner: Arc<dyn SplitReasoner>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            extractor,
            reasoner,
            config,
            events: Arc::new(EventEmitter::new()),
        }
    }

    /// Emit events on a shared emitter.
    #[must_use]
    pub fn with_events(mut self, events: Arc<EventEmitter>) -> Self {
        self.events = events;
        self
    }

    /// The emitter events go to.
    pub fn events(&self) -> &Arc<EventEmitter> {
        &self.events
    }

    /// Configuration in use.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Begin a run from inbound messages.
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn start(
        &self,
        run_id: RunId,
        messages: Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<Transition> {
        info!(messages = messages.len(), "run started");
        let _ = self.events.emit(PipelineEvent::RunStarted {
            run_id: run_id.clone(),
        });
        let checkpoint = Checkpoint::new(
            run_id,
            RunPhase::Ready {
                stage: Stage::LoadImage,
            },
            SessionState::with_messages(messages),
        );
        Ok(self.advance(checkpoint, Stage::LoadImage, cancel).await)
    }

    /// Answer the pending interrupt and continue.
    ///
    /// Fails without touching the checkpoint when the run is not suspended
    /// or `input` is the wrong kind. Input of the right kind that does not
    /// validate re-suspends with the interrupt's `error` set.
    #[instrument(skip_all, fields(run_id = %checkpoint.run_id, phase = checkpoint.phase.name()))]
    pub async fn resume(
        &self,
        mut checkpoint: Checkpoint,
        input: ResumeInput,
        cancel: &CancellationToken,
    ) -> Result<Transition> {
        let run_id = checkpoint.run_id.as_str().to_string();
        let (stage, interrupt) = match &checkpoint.phase {
            RunPhase::AwaitingParticipants { interrupt } => (Stage::RequestSplit, interrupt.clone()),
            RunPhase::AwaitingInstructions { interrupt } => {
                (Stage::CollectInstructions, interrupt.clone())
            }
            RunPhase::Ready { .. } => return Err(RuntimeError::NotAwaitingInput(run_id)),
            RunPhase::Completed => {
                return Err(RuntimeError::RunFinished {
                    run_id,
                    outcome: "completed",
                });
            }
            RunPhase::Failed { .. } => {
                return Err(RuntimeError::RunFinished {
                    run_id,
                    outcome: "failed",
                });
            }
        };

        let expected = interrupt.expects();
        if input.kind() != expected {
            return Err(RuntimeError::UnexpectedInput {
                expected,
                got: input.kind(),
            });
        }

        let accepted = match input {
            ResumeInput::Form(form) => {
                parse_participants(&form, self.config.enforce_participant_count)
                    .map(apply_participants)
            }
            ResumeInput::Text(text) => accept_instructions(text),
        };

        match accepted {
            Ok(update) => {
                let waited_ms = elapsed_ms(&checkpoint);
                let _ = self.events.emit(PipelineEvent::RunResumed {
                    run_id: checkpoint.run_id.clone(),
                });
                self.complete_stage(&mut checkpoint, stage, update, waited_ms);
                match stage.next() {
                    Some(next) => Ok(self.advance(checkpoint, next, cancel).await),
                    None => Ok(self.finish(checkpoint, stage)),
                }
            }
            Err(reason) => {
                debug!(stage = %stage, reason = %reason, "input rejected");
                counter!("pipeline_input_rejected_total", "stage" => stage.as_str()).increment(1);
                Ok(self.suspend(checkpoint, stage, interrupt.with_error(reason)))
            }
        }
    }

    /// Run from `stage` until a suspension point, the end, or an error.
    async fn advance(
        &self,
        mut checkpoint: Checkpoint,
        mut stage: Stage,
        cancel: &CancellationToken,
    ) -> Transition {
        loop {
            if cancel.is_cancelled() {
                return self.fail(checkpoint, stage, &RuntimeError::Cancelled);
            }
            checkpoint.transition(RunPhase::Ready { stage });
            let _ = self.events.emit(PipelineEvent::StageStarted {
                run_id: checkpoint.run_id.clone(),
                stage,
            });

            if stage.is_suspension_point() {
                return match suspension_interrupt(stage, &checkpoint.state) {
                    Ok(interrupt) => self.suspend(checkpoint, stage, interrupt),
                    Err(e) => self.fail(checkpoint, stage, &e),
                };
            }

            let started = Instant::now();
            let outcome = self.run_stage(stage, &checkpoint.state, cancel).await;
            match outcome {
                Ok(update) => {
                    let elapsed = started.elapsed();
                    let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                    histogram!("pipeline_stage_duration_seconds", "stage" => stage.as_str())
                        .record(elapsed.as_secs_f64());
                    self.complete_stage(&mut checkpoint, stage, update, duration_ms);
                }
                Err(e) => return self.fail(checkpoint, stage, &e),
            }

            match stage.next() {
                Some(next) => stage = next,
                None => return self.finish(checkpoint, stage),
            }
        }
    }

    async fn run_stage(
        &self,
        stage: Stage,
        state: &SessionState,
        cancel: &CancellationToken,
    ) -> Result<StateUpdate> {
        match stage {
            Stage::LoadImage => Ok(load_image(state)),
            Stage::AnalyzeReceipt => {
                analyze_receipt(
                    state,
                    self.extractor.as_ref(),
                    &self.config.default_mime_type,
                    cancel,
                )
                .await
            }
            Stage::CalculateItemization => {
                calculate_itemization(state, self.reasoner.as_ref(), cancel).await
            }
            Stage::RequestSplit | Stage::CollectInstructions => Err(RuntimeError::Internal(
                format!("{stage} waits for input and cannot run directly"),
            )),
        }
    }

    fn complete_stage(
        &self,
        checkpoint: &mut Checkpoint,
        stage: Stage,
        update: StateUpdate,
        duration_ms: u64,
    ) {
        checkpoint.state.apply(update);
        counter!("pipeline_stage_total", "stage" => stage.as_str(), "outcome" => "ok").increment(1);
        debug!(stage = %stage, duration_ms, "stage completed");
        let _ = self.events.emit(PipelineEvent::StageCompleted {
            run_id: checkpoint.run_id.clone(),
            stage,
            duration_ms,
        });
    }

    fn suspend(&self, mut checkpoint: Checkpoint, stage: Stage, interrupt: Interrupt) -> Transition {
        let phase = if stage == Stage::RequestSplit {
            RunPhase::AwaitingParticipants {
                interrupt: interrupt.clone(),
            }
        } else {
            RunPhase::AwaitingInstructions {
                interrupt: interrupt.clone(),
            }
        };
        checkpoint.transition(phase);
        info!(stage = %stage, expects = %interrupt.expects(), "run suspended");
        let _ = self.events.emit(PipelineEvent::RunSuspended {
            run_id: checkpoint.run_id.clone(),
            interrupt: interrupt.clone(),
        });
        Transition {
            checkpoint,
            status: RunStatus::AwaitingInput(interrupt),
        }
    }

    fn finish(&self, mut checkpoint: Checkpoint, last: Stage) -> Transition {
        let Some(itemization) = checkpoint.state.itemization.clone() else {
            let err = RuntimeError::MissingState {
                stage: last,
                field: "itemization",
            };
            return self.fail(checkpoint, last, &err);
        };
        checkpoint.transition(RunPhase::Completed);
        info!(
            people = itemization.person_totals.len(),
            grand_total = itemization.grand_total(),
            "run completed"
        );
        let _ = self.events.emit(PipelineEvent::RunCompleted {
            run_id: checkpoint.run_id.clone(),
            grand_total: itemization.grand_total(),
        });
        Transition {
            checkpoint,
            status: RunStatus::Completed(itemization),
        }
    }

    fn fail(&self, mut checkpoint: Checkpoint, stage: Stage, error: &RuntimeError) -> Transition {
        let failure = RunFailure::new(stage, error);
        counter!("pipeline_stage_total", "stage" => stage.as_str(), "outcome" => "error").increment(1);
        warn!(
            stage = %stage,
            category = %failure.category,
            recoverable = failure.recoverable,
            error = %failure.message,
            "run failed"
        );
        checkpoint.transition(RunPhase::Failed {
            failure: failure.clone(),
        });
        let _ = self.events.emit(PipelineEvent::RunFailed {
            run_id: checkpoint.run_id.clone(),
            stage,
            category: failure.category.clone(),
            message: failure.message.clone(),
        });
        Transition {
            checkpoint,
            status: RunStatus::Failed(failure),
        }
    }
}

fn suspension_interrupt(stage: Stage, state: &SessionState) -> Result<Interrupt> {
    match stage {
        Stage::RequestSplit => Ok(participants_form(None)),
        Stage::CollectInstructions => {
            let items = state.require_items(stage)?;
            let people = state.require_people(stage)?;
            Ok(instructions_prompt(items, people, None))
        }
        _ => Err(RuntimeError::Internal(format!("{stage} does not wait for input"))),
    }
}

/// Time spent suspended, measured from the last transition.
fn elapsed_ms(checkpoint: &Checkpoint) -> u64 {
    let elapsed = chrono::Utc::now() - checkpoint.updated_at;
    u64::try_from(elapsed.num_milliseconds()).unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

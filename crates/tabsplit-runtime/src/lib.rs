//! # tabsplit-runtime
//!
//! Turns a receipt photo into a per-person split through five stages:
//!
//! 1. **load image**: decode the image from the latest message
//! 2. **analyze receipt**: extract items and tax via the extraction service
//! 3. **request split**: suspend on a participants form
//! 4. **collect instructions**: suspend on a free-text prompt
//! 5. **calculate itemization**: reason about the split, then apportion tax
//!
//! [`ReceiptPipeline`] is the pure transition layer: checkpoint in,
//! checkpoint out. [`Orchestrator`] adds persistence, per-run exclusivity,
//! concurrency limits, cancellation and expiry on top.

#![deny(unsafe_code)]

pub mod checkpoint;
pub mod errors;
pub mod events;
pub mod interrupt;
pub mod orchestrator;
pub mod pipeline;
pub mod stages;
pub mod state;

pub use checkpoint::{Checkpoint, CheckpointStore, InMemoryCheckpointStore};
pub use errors::{Result, RuntimeError};
pub use events::{EventEmitter, PipelineEvent};
pub use interrupt::{FieldType, FormField, FormRequest, InputKind, Interrupt, ResumeInput};
pub use orchestrator::{Orchestrator, RunOutcome};
pub use pipeline::{PipelineConfig, ReceiptPipeline, RunFailure, RunPhase, RunStatus, Transition};
pub use stages::Stage;
pub use state::{SessionState, StateUpdate};

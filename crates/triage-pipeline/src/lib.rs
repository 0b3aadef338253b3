//! Orchestration of a single transcript run: snapshot, extraction,
//! validation, resolution, normalization, QA gate, prioritization and
//! exactly-once persistence.

pub mod cancel;
pub mod runner;

pub use cancel::CancellationToken;
pub use runner::{PipelineError, PipelineRunner, PipelineState, RunOutcome};

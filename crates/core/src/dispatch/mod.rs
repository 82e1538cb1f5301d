//! Dispatch engine: builds instructions for pending catalog records, runs
//! them on a bounded worker pool and reconciles the results.

mod execute;
mod queue;
mod reconcile;
mod runner;
mod types;

pub use execute::{
    execute_batch, execute_instruction, execute_one, ExecutionContext, ExecutionFailure,
    ExecutionOutcome, FailureKind,
};
pub use queue::{file_queues, FileQueues};
pub use reconcile::Reconciler;
pub use runner::ConversionRunner;
pub use types::{
    ArchiveLayout, CommitPolicy, RunError, RunOptions, RunSummary, Stage, UnknownStage,
};

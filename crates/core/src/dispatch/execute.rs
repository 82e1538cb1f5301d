//! Runs instructions and packages every result, success or failure, as an
//! [`ExecutionOutcome`] for the controlling loop.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info};

use crate::catalog::{ConversionEvent, ConvertOptions, ConvertedFile, EventRecord, FileCatalog};
use crate::converter::{remove_outputs, ConverterContext, ConverterError, TimeoutPolicy};
use crate::instruction::ConvertInstruction;

/// Settings shared by every execution in a run.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Command name recorded in event operations.
    pub command: String,
    /// Directory source paths resolve against.
    pub source_root: PathBuf,
    /// Destination directory; output paths are recorded relative to it.
    pub output_dir: PathBuf,
    pub capture_output: bool,
    pub timeout: TimeoutPolicy,
    /// Handed to converters that run serially.
    pub catalog: Option<Arc<dyn FileCatalog>>,
    /// Run-wide converter options; the instruction's own options win.
    pub default_options: ConvertOptions,
}

impl ExecutionContext {
    fn converter_context(&self, instruction: &ConvertInstruction) -> ConverterContext {
        let mut options = self.default_options.clone();
        options.extend(instruction.options.clone());
        let mut context = ConverterContext::new()
            .with_options(options)
            .with_timeout(self.timeout);
        context.capture_output = self.capture_output;
        match &self.catalog {
            Some(catalog) if !instruction.converter.parallel_safe() => {
                context.with_catalog(Arc::clone(catalog))
            }
            _ => context,
        }
    }
}

/// Broad category of a failed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Environment,
    Timeout,
    /// Output directory or target problems.
    Output,
    Conversion,
    /// I/O errors and panics: likely a converter bug.
    Unexpected,
}

/// Why an instruction produced nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    /// Stable error name, e.g. `ConvertTimeoutError`.
    pub error: String,
    pub message: String,
    /// Captured process output or diagnostic detail.
    pub detail: Option<String>,
}

impl ExecutionFailure {
    pub fn from_error(err: &ConverterError, capture_output: bool) -> Self {
        let kind = match err {
            ConverterError::Environment(_) => FailureKind::Environment,
            ConverterError::Timeout { .. } => FailureKind::Timeout,
            ConverterError::OutputDir { .. } | ConverterError::OutputTarget { .. } => {
                FailureKind::Output
            }
            ConverterError::ConversionFailed { .. } | ConverterError::BadOption { .. } => {
                FailureKind::Conversion
            }
            ConverterError::Io(_) => FailureKind::Unexpected,
        };
        let detail = match kind {
            FailureKind::Conversion if capture_output => err.process().and_then(|p| p.streams()),
            FailureKind::Unexpected => Some(format!("{err:?}")),
            _ => None,
        };
        Self {
            kind,
            error: err.name().to_string(),
            message: err.to_string(),
            detail,
        }
    }

    fn from_join_error(err: JoinError) -> Self {
        if err.is_panic() {
            let message = panic_message(err.into_panic());
            Self {
                kind: FailureKind::Unexpected,
                error: "Panic".to_string(),
                detail: Some(message.clone()),
                message,
            }
        } else {
            Self {
                kind: FailureKind::Unexpected,
                error: "Cancelled".to_string(),
                message: err.to_string(),
                detail: None,
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "converter panicked".to_string()
    }
}

/// Result of one instruction: outputs on success, a failure otherwise.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub instruction: ConvertInstruction,
    pub outputs: Vec<ConvertedFile>,
    /// `run` and `out` events to persist.
    pub events: Vec<EventRecord>,
    pub failure: Option<ExecutionFailure>,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    fn failed(instruction: ConvertInstruction, events: Vec<EventRecord>, failure: ExecutionFailure) -> Self {
        Self {
            instruction,
            outputs: Vec::new(),
            events,
            failure: Some(failure),
        }
    }
}

/// `tool:output` label used in run logs.
fn label(instruction: &ConvertInstruction) -> String {
    format!("{}:{}", instruction.tool, instruction.output)
}

/// Converts one instruction. Never fails: errors are folded into the outcome
/// after any produced outputs are removed.
pub async fn execute_instruction(
    instruction: ConvertInstruction,
    context: &ExecutionContext,
) -> ExecutionOutcome {
    let mut events = Vec::new();
    let mut produced = Vec::new();

    match convert(&instruction, context, &mut events, &mut produced).await {
        Ok(outputs) => ExecutionOutcome {
            instruction,
            outputs,
            events,
            failure: None,
        },
        Err(err) => {
            remove_outputs(&produced).await;
            let failure = ExecutionFailure::from_error(&err, context.capture_output);
            log_failure(&instruction, &failure);
            ExecutionOutcome::failed(instruction, events, failure)
        }
    }
}

async fn convert(
    instruction: &ConvertInstruction,
    context: &ExecutionContext,
    events: &mut Vec<EventRecord>,
    produced: &mut Vec<PathBuf>,
) -> Result<Vec<ConvertedFile>, ConverterError> {
    let file = &instruction.file;
    let converter = instruction.converter.build(
        file.clone(),
        Some(&context.source_root),
        context.converter_context(instruction),
    )?;

    let label = label(instruction);
    let name = file.name();
    info!(uuid = %file.uuid, converter = %label, name = %name, "run");
    events.push(EventRecord::new(
        &context.command,
        Some(file.uuid),
        ConversionEvent::Run {
            converter: label.clone(),
            name: name.clone(),
        },
    ));

    let paths = converter
        .convert(&context.output_dir, &instruction.output, true)
        .await?;
    produced.extend(paths.iter().cloned());

    let output = instruction
        .converter
        .descriptor()
        .normalize_output(&instruction.output)
        .unwrap_or(instruction.output.as_str());
    let puid = converter.output_puid(output).map(String::from);

    let mut outputs = Vec::with_capacity(paths.len());
    for (sequence, path) in paths.iter().enumerate() {
        let converted = ConvertedFile::from_file(
            path,
            &context.output_dir,
            file.uuid,
            sequence as u32,
            puid.clone(),
        )
        .await?;
        let out_name = output_name(&converted.relative_path);
        info!(uuid = %converted.uuid, converter = %label, original = %name, name = %out_name, "out");
        events.push(EventRecord::new(
            &context.command,
            Some(converted.uuid),
            ConversionEvent::Out {
                converter: label.clone(),
                original: name.clone(),
                name: out_name,
            },
        ));
        outputs.push(converted);
    }

    Ok(outputs)
}

fn output_name(relative_path: &Path) -> String {
    relative_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn log_failure(instruction: &ConvertInstruction, failure: &ExecutionFailure) {
    let uuid = instruction.file.uuid;
    let converter = label(instruction);
    match failure.kind {
        FailureKind::Unexpected => error!(
            uuid = %uuid,
            converter = %converter,
            error = %failure.error,
            detail = failure.detail.as_deref().unwrap_or_default(),
            "Unexpected error: {}",
            failure.message
        ),
        _ => error!(
            uuid = %uuid,
            converter = %converter,
            error = %failure.error,
            reason = %failure.message,
            "error"
        ),
    }
    if let Some(detail) = failure.detail.as_deref().filter(|_| failure.kind == FailureKind::Conversion) {
        debug!(uuid = %uuid, "process output:\n{}", detail);
    }
}

/// A spawned execution, aborted if dropped before it finishes.
struct ExecutionTask {
    instruction: ConvertInstruction,
    handle: JoinHandle<ExecutionOutcome>,
}

impl ExecutionTask {
    fn spawn(instruction: ConvertInstruction, context: Arc<ExecutionContext>) -> Self {
        let task_instruction = instruction.clone();
        let handle =
            tokio::spawn(async move { execute_instruction(task_instruction, &context).await });
        Self {
            instruction,
            handle,
        }
    }

    async fn join(mut self) -> ExecutionOutcome {
        match (&mut self.handle).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let failure = ExecutionFailure::from_join_error(err);
                log_failure(&self.instruction, &failure);
                ExecutionOutcome::failed(self.instruction.clone(), Vec::new(), failure)
            }
        }
    }
}

impl Drop for ExecutionTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Runs one instruction on its own task, so a panic becomes a failed outcome.
pub async fn execute_one(
    instruction: ConvertInstruction,
    context: Arc<ExecutionContext>,
) -> ExecutionOutcome {
    ExecutionTask::spawn(instruction, context).join().await
}

/// Runs a batch concurrently and waits for all of it. Outcomes keep the batch order.
pub async fn execute_batch(
    instructions: Vec<ConvertInstruction>,
    context: Arc<ExecutionContext>,
) -> Vec<ExecutionOutcome> {
    let tasks: Vec<ExecutionTask> = instructions
        .into_iter()
        .map(|instruction| ExecutionTask::spawn(instruction, Arc::clone(&context)))
        .collect();

    let mut outcomes = Vec::with_capacity(tasks.len());
    for task in tasks {
        outcomes.push(task.join().await);
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ProcessOutput;
    use std::time::Duration;

    #[test]
    fn test_failure_classification() {
        let timeout = ExecutionFailure::from_error(
            &ConverterError::Timeout {
                timeout: Duration::from_secs(5),
            },
            true,
        );
        assert_eq!(timeout.kind, FailureKind::Timeout);
        assert_eq!(timeout.error, "ConvertTimeoutError");
        assert!(timeout.message.contains("5s"));

        let target = ExecutionFailure::from_error(
            &ConverterError::OutputTarget {
                output: "docx".into(),
            },
            true,
        );
        assert_eq!(target.kind, FailureKind::Output);

        let io = ExecutionFailure::from_error(
            &ConverterError::Io(std::io::Error::other("disk gone")),
            false,
        );
        assert_eq!(io.kind, FailureKind::Unexpected);
        assert!(io.detail.is_some());
    }

    #[test]
    fn test_process_output_only_when_captured() {
        let err = ConverterError::process_failed(ProcessOutput {
            code: Some(2),
            stdout: String::new(),
            stderr: "bad header".into(),
        });
        let captured = ExecutionFailure::from_error(&err, true);
        assert_eq!(captured.kind, FailureKind::Conversion);
        assert!(captured.detail.unwrap().contains("bad header"));

        let passthrough = ExecutionFailure::from_error(&err, false);
        assert_eq!(passthrough.detail, None);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(7)), "converter panicked");
    }
}

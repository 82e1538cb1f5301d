//! Records execution outcomes in the catalog.
//!
//! The reconciler is the only writer during a run. Workers hand their
//! outcomes back and every insert, status update and commit happens here.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::execute::ExecutionOutcome;
use super::types::{CommitPolicy, RunOptions, RunSummary, Stage};
use crate::catalog::{
    path_to_db, CatalogError, ConversionEvent, ConvertAction, EventRecord, FileCatalog, OnConflict,
    SourceFile,
};
use crate::instruction::{ConvertInstruction, InstructionError};

pub struct Reconciler {
    catalog: Arc<dyn FileCatalog>,
    stage: Stage,
    command: String,
    commit: CommitPolicy,
    dry_run: bool,
    /// Files recorded since the run started, converted or failed.
    processed: usize,
    summary: RunSummary,
}

impl Reconciler {
    pub fn new(catalog: Arc<dyn FileCatalog>, stage: Stage, options: &RunOptions) -> Self {
        Self {
            catalog,
            stage,
            command: options.command.clone(),
            commit: options.commit,
            dry_run: options.dry_run,
            processed: 0,
            summary: RunSummary::default(),
        }
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    fn event(&self, file: &SourceFile, data: ConversionEvent) -> EventRecord {
        EventRecord::new(&self.command, Some(file.uuid), data)
    }

    /// Records the start of the run.
    pub fn start(&mut self) -> Result<(), CatalogError> {
        info!(stage = %self.stage, dry_run = self.dry_run, "Starting conversion run");
        if self.dry_run {
            return Ok(());
        }
        self.catalog.begin()?;
        self.catalog.insert_event(&EventRecord::new(
            &self.command,
            None,
            ConversionEvent::RunStarted {
                version: env!("CARGO_PKG_VERSION").to_string(),
                stage: self.stage.to_string(),
                dry_run: self.dry_run,
            },
        ))?;
        Ok(())
    }

    /// A file excluded by the tool filters.
    pub fn filtered(&mut self, file: &SourceFile, tool: &str) {
        debug!(uuid = %file.uuid, tool = %tool, "Skipping filtered tool");
        self.summary.skipped += 1;
    }

    /// A file no instruction could be built for. It stays pending.
    pub fn instruction_error(
        &mut self,
        file: &SourceFile,
        action: Option<&ConvertAction>,
        err: &InstructionError,
    ) -> Result<(), CatalogError> {
        warn!(
            uuid = %file.uuid,
            path = %path_to_db(&file.relative_path),
            tool = action.map(|a| a.tool.as_str()).unwrap_or_default(),
            output = action.map(|a| a.output.as_str()).unwrap_or_default(),
            error = err.name(),
            "{}",
            err
        );
        self.summary.skipped += 1;
        if self.dry_run {
            return Ok(());
        }
        self.catalog.begin()?;
        self.catalog.insert_event(&self.event(
            file,
            ConversionEvent::InstructionError {
                tool: action.map(|a| a.tool.clone()),
                output: action.map(|a| a.output.clone()),
                error: err.to_string(),
            },
        ))?;
        Ok(())
    }

    /// Dry-run: log what would be converted.
    pub fn would_convert(&mut self, instruction: &ConvertInstruction) {
        info!(
            uuid = %instruction.file.uuid,
            path = %path_to_db(&instruction.file.relative_path),
            tool = %instruction.tool,
            output = %instruction.output,
            converter = instruction.converter.name(),
            "would convert"
        );
        self.summary.would_convert += 1;
    }

    /// Stores a finished execution: outputs and status on success, an error
    /// event otherwise.
    pub fn record(&mut self, outcome: ExecutionOutcome) -> Result<(), CatalogError> {
        let ExecutionOutcome {
            instruction,
            outputs,
            events,
            failure,
        } = outcome;

        self.catalog.begin()?;
        for event in &events {
            self.catalog.insert_event(event)?;
        }

        let converter = instruction.converter.name().to_string();
        match failure {
            None => {
                let destination = instruction.destination;
                for output in &outputs {
                    self.catalog
                        .insert_converted(destination, output, OnConflict::Replace)?;
                }
                let mut file = instruction.file.clone();
                file.processed = file.processed.with(destination);
                self.catalog.update_source(&file)?;
                self.catalog.insert_event(&self.event(
                    &file,
                    ConversionEvent::Converted {
                        tool: instruction.tool.clone(),
                        output: instruction.output.clone(),
                        converter,
                        files: outputs
                            .iter()
                            .map(|o| path_to_db(&o.relative_path))
                            .collect(),
                    },
                ))?;
                info!(
                    uuid = %file.uuid,
                    tool = %instruction.tool,
                    output = %instruction.output,
                    files = outputs.len(),
                    "converted"
                );
                self.summary.converted += 1;
            }
            Some(failure) => {
                self.catalog.insert_event(&self.event(
                    &instruction.file,
                    ConversionEvent::Error {
                        tool: instruction.tool.clone(),
                        output: instruction.output.clone(),
                        converter,
                        error: failure.error,
                        message: failure.message,
                        detail: failure.detail,
                    },
                ))?;
                self.summary.failed += 1;
            }
        }

        self.processed += 1;
        if self.commit.should_commit(self.processed) {
            self.catalog.commit()?;
        }
        Ok(())
    }

    /// Records the end of the run and commits what was reconciled.
    pub fn finish(&mut self, cancelled: bool) -> Result<RunSummary, CatalogError> {
        let summary = self.summary;
        if !self.dry_run {
            self.catalog.begin()?;
            self.catalog.insert_event(&EventRecord::new(
                &self.command,
                None,
                ConversionEvent::RunEnded {
                    converted: summary.converted,
                    failed: summary.failed,
                    skipped: summary.skipped,
                    cancelled,
                },
            ))?;
            self.catalog.commit()?;
        }
        info!(
            converted = summary.converted,
            failed = summary.failed,
            skipped = summary.skipped,
            would_convert = summary.would_convert,
            cancelled,
            "Conversion run ended"
        );
        Ok(summary)
    }

    /// Drops uncommitted writes after a catalog failure.
    pub fn abort(&mut self) {
        if let Err(e) = self.catalog.rollback() {
            warn!("Failed to roll back catalog transaction: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        ConvertedFile, Destination, EventFilter, SourceKind, SourceQuery, SqliteFileCatalog,
    };
    use crate::converter::builtin::COPY;
    use crate::dispatch::execute::{ExecutionFailure, FailureKind};
    use std::path::PathBuf;
    use uuid::Uuid;

    fn setup(options: &RunOptions) -> (Arc<SqliteFileCatalog>, Reconciler, SourceFile) {
        let catalog = Arc::new(SqliteFileCatalog::in_memory().unwrap());
        let file = SourceFile::original("docs/a.txt")
            .with_convert(ConvertAction::new("copy", "copy"));
        catalog.insert_source(&file, OnConflict::Fail).unwrap();
        let reconciler = Reconciler::new(catalog.clone(), Stage::OriginalToMaster, options);
        (catalog, reconciler, file)
    }

    fn instruction(file: &SourceFile) -> ConvertInstruction {
        ConvertInstruction {
            file: file.clone(),
            destination: Destination::Master,
            converter: COPY,
            tool: "copy".into(),
            output: "copy".into(),
            options: Default::default(),
        }
    }

    fn output(file: &SourceFile) -> ConvertedFile {
        ConvertedFile {
            uuid: Uuid::new_v4(),
            original_uuid: file.uuid,
            sequence: 0,
            relative_path: PathBuf::from("docs/a.txt"),
            checksum: "abc".into(),
            size: 3,
            puid: None,
        }
    }

    fn pending(catalog: &SqliteFileCatalog) -> usize {
        catalog
            .select_sources(&SourceQuery::pending(SourceKind::Original, Destination::Master))
            .unwrap()
            .len()
    }

    #[test]
    fn test_success_sets_status_and_stores_outputs() {
        let (catalog, mut reconciler, file) = setup(&RunOptions::default());
        reconciler.start().unwrap();
        reconciler
            .record(ExecutionOutcome {
                instruction: instruction(&file),
                outputs: vec![output(&file)],
                events: Vec::new(),
                failure: None,
            })
            .unwrap();
        let summary = reconciler.finish(false).unwrap();

        assert_eq!(summary.converted, 1);
        assert_eq!(pending(&catalog), 0);
        let stored = catalog.converted_files(Destination::Master, file.uuid).unwrap();
        assert_eq!(stored.len(), 1);
        let converted = catalog
            .events(&EventFilter::new().with_event_type("converted"))
            .unwrap();
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].uuid, Some(file.uuid));
    }

    #[test]
    fn test_failure_leaves_file_pending() {
        let (catalog, mut reconciler, file) = setup(&RunOptions::default());
        reconciler.start().unwrap();
        reconciler
            .record(ExecutionOutcome {
                instruction: instruction(&file),
                outputs: Vec::new(),
                events: Vec::new(),
                failure: Some(ExecutionFailure {
                    kind: FailureKind::Conversion,
                    error: "ConvertError".into(),
                    message: "broken".into(),
                    detail: None,
                }),
            })
            .unwrap();
        let summary = reconciler.finish(false).unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(pending(&catalog), 1);
        let errors = catalog
            .events(&EventFilter::new().with_event_type("error"))
            .unwrap();
        assert_eq!(errors.len(), 1);
        match &errors[0].data {
            ConversionEvent::Error { error, message, .. } => {
                assert_eq!(error, "ConvertError");
                assert_eq!(message, "broken");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let options = RunOptions {
            dry_run: true,
            ..Default::default()
        };
        let (catalog, mut reconciler, file) = setup(&options);
        reconciler.start().unwrap();
        reconciler.would_convert(&instruction(&file));
        let summary = reconciler.finish(false).unwrap();

        assert_eq!(summary.would_convert, 1);
        assert_eq!(pending(&catalog), 1);
        assert!(catalog.events(&EventFilter::new()).unwrap().is_empty());
    }

    #[test]
    fn test_instruction_error_is_logged() {
        let (catalog, mut reconciler, file) = setup(&RunOptions::default());
        reconciler.start().unwrap();
        let action = ConvertAction::new("nope", "pdf");
        let err = InstructionError::ConverterNotFound {
            tool: "nope".into(),
            output: "pdf".into(),
        };
        reconciler
            .instruction_error(&file, Some(&action), &err)
            .unwrap();
        let summary = reconciler.finish(false).unwrap();

        assert_eq!(summary.skipped, 1);
        let events = catalog
            .events(&EventFilter::new().with_uuid(file.uuid))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "instruction_error");
    }
}

//! The conversion loop: page through pending records, execute, reconcile.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use super::execute::{execute_batch, execute_one, ExecutionContext, ExecutionOutcome};
use super::queue::file_queues;
use super::reconcile::Reconciler;
use super::types::{ArchiveLayout, RunError, RunOptions, RunSummary, Stage};
use crate::catalog::{path_to_db, FileCatalog, PageCursor, SourceFile, SourceQuery};
use crate::converter::Registry;
use crate::instruction::{
    master_file_instruction, original_file_instruction, requested_action, ConvertInstruction,
};

/// Converts every pending record of a stage.
///
/// Pages are processed in catalog order and fully reconciled before the next
/// page is read. Parallel-safe instructions run in batches of `threads`,
/// the rest one at a time.
pub struct ConversionRunner {
    catalog: Arc<dyn FileCatalog>,
    registry: Registry,
    layout: ArchiveLayout,
    options: RunOptions,
    shutdown: Option<watch::Receiver<bool>>,
}

impl ConversionRunner {
    pub fn new(
        catalog: Arc<dyn FileCatalog>,
        registry: Registry,
        layout: ArchiveLayout,
        options: RunOptions,
    ) -> Self {
        Self {
            catalog,
            registry,
            layout,
            options,
            shutdown: None,
        }
    }

    /// Stops the run once `true` is sent. Reconciled work stays committed.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub async fn run(&self, stage: Stage) -> Result<RunSummary, RunError> {
        if let Some(filter) = &self.options.filter {
            filter.to_sql(stage.source(), 1)?;
        }
        let mut reconciler = Reconciler::new(Arc::clone(&self.catalog), stage, &self.options);
        let result = self.run_pages(stage, &mut reconciler).await;

        match result {
            Ok(()) => Ok(reconciler.finish(false)?),
            Err(RunError::Cancelled) => {
                warn!(stage = %stage, "Conversion run cancelled");
                reconciler.finish(true)?;
                Err(RunError::Cancelled)
            }
            Err(err) => {
                reconciler.abort();
                Err(err)
            }
        }
    }

    async fn run_pages(&self, stage: Stage, reconciler: &mut Reconciler) -> Result<(), RunError> {
        let output_dir = self.layout.destination_root(stage.destination());
        if !self.options.dry_run {
            tokio::fs::create_dir_all(&output_dir).await?;
        }
        let context = Arc::new(ExecutionContext {
            command: self.options.command.clone(),
            source_root: self.layout.source_root(stage.source()),
            output_dir,
            capture_output: self.options.capture_output,
            timeout: self.options.timeout,
            catalog: Some(Arc::clone(&self.catalog)),
            default_options: self.options.converter_options.clone(),
        });

        reconciler.start()?;
        let mut shutdown = self.shutdown.clone();
        let mut cursor: Option<PageCursor> = None;

        loop {
            if shutdown.as_ref().is_some_and(|rx| *rx.borrow()) {
                return Err(RunError::Cancelled);
            }

            let query = SourceQuery::pending(stage.source(), stage.destination())
                .with_limit(self.options.page_size)
                .with_filter(self.options.filter.clone())
                .after(cursor.take());
            let page = self.catalog.select_sources(&query)?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(PageCursor::after(last));
            info!(stage = %stage, files = page.len(), "Processing page");

            let instructions = self.instructions(stage, page, reconciler)?;
            if self.options.dry_run {
                for instruction in &instructions {
                    reconciler.would_convert(instruction);
                }
                continue;
            }

            let queues = file_queues(instructions, self.options.threads);
            for batch in queues.async_queues {
                let outcomes = tokio::select! {
                    outcomes = execute_batch(batch, Arc::clone(&context)) => outcomes,
                    _ = shutdown_requested(&mut shutdown) => return Err(RunError::Cancelled),
                };
                reconcile(reconciler, outcomes)?;
            }
            for instruction in queues.sync_queue {
                let outcome = tokio::select! {
                    outcome = execute_one(instruction, Arc::clone(&context)) => outcome,
                    _ = shutdown_requested(&mut shutdown) => return Err(RunError::Cancelled),
                };
                reconcile(reconciler, vec![outcome])?;
            }
        }

        Ok(())
    }

    /// Builds the page's instructions. Filtered files and recoverable
    /// instruction errors are recorded and dropped.
    fn instructions(
        &self,
        stage: Stage,
        page: Vec<SourceFile>,
        reconciler: &mut Reconciler,
    ) -> Result<Vec<ConvertInstruction>, RunError> {
        let mut instructions = Vec::with_capacity(page.len());
        for file in page {
            let action = requested_action(&file, stage.destination()).ok();
            if let Some(action) = &action {
                if !self.options.tool_allowed(&action.tool) {
                    reconciler.filtered(&file, &action.tool);
                    continue;
                }
            }

            let built = match stage {
                Stage::OriginalToMaster => original_file_instruction(file.clone(), &self.registry),
                Stage::MasterToAccess | Stage::MasterToStatutory => {
                    master_file_instruction(file.clone(), stage.destination(), &self.registry)
                }
            };
            match built {
                Ok(instruction) => instructions.push(instruction),
                Err(err) if err.is_fatal() => {
                    return Err(RunError::Instruction {
                        path: path_to_db(&file.relative_path),
                        source: err,
                    });
                }
                Err(err) => reconciler.instruction_error(&file, action.as_ref(), &err)?,
            }
        }
        Ok(instructions)
    }
}

fn reconcile(reconciler: &mut Reconciler, outcomes: Vec<ExecutionOutcome>) -> Result<(), RunError> {
    for outcome in outcomes {
        reconciler.record(outcome)?;
    }
    Ok(())
}

/// Resolves once shutdown is requested; never without a shutdown channel.
async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = shutdown {
        if rx.wait_for(|stop| *stop).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}

//! `digiarch`: convert the pending files of an archive catalog.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use clap::Args;
use tokio::sync::watch;
use tracing::{info, warn};

use convertool_core::catalog::FileFilter;
use convertool_core::config::{load_config, validate_config, RunConfig};
use convertool_core::dispatch::{ArchiveLayout, ConversionRunner, RunError, RunOptions, Stage};
use convertool_core::{Registry, SqliteFileCatalog};

/// Configuration file looked up in the archive when `--config` is not given.
const ARCHIVE_CONFIG: &str = "_metadata/convertool.toml";

#[derive(Args, Debug)]
pub struct DigiarchCommand {
    /// Archive root directory
    #[arg(value_name = "ROOT")]
    root: PathBuf,

    /// original:master, master:access or master:statutory
    #[arg(value_name = "STAGE")]
    stage: Stage,

    /// Only convert files matching this query, e.g. "puid=fmt/18 relative_path:docs/%"
    #[arg(value_name = "QUERY")]
    query: Option<String>,

    /// Skip files using this tool (repeatable)
    #[arg(long = "tool-ignore", value_name = "TOOL")]
    tool_ignore: Vec<String>,

    /// Only convert files using this tool (repeatable)
    #[arg(long = "tool-include", value_name = "TOOL")]
    tool_include: Vec<String>,

    /// Override converter timeouts, 0 disables them
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Number of parallel conversions
    #[arg(long)]
    threads: Option<usize>,

    /// Commit every N files, 0 commits only at the end
    #[arg(long, value_name = "N")]
    commit: Option<usize>,

    /// Show what would be converted without converting
    #[arg(long)]
    dry_run: bool,

    /// Copy the catalog database before converting
    #[arg(long)]
    backup: bool,

    /// Configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl DigiarchCommand {
    /// Command-line values win over the configuration file.
    fn apply_overrides(&self, run: &mut RunConfig) {
        if let Some(threads) = self.threads {
            run.threads = threads;
        }
        if let Some(commit) = self.commit {
            run.commit = commit;
        }
        if self.timeout.is_some() {
            run.timeout_secs = self.timeout;
        }
        if !self.tool_ignore.is_empty() {
            run.tool_ignore = self.tool_ignore.clone();
        }
        if !self.tool_include.is_empty() {
            run.tool_include = self.tool_include.clone();
        }
    }

    fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(|| {
            let path = self.root.join(ARCHIVE_CONFIG);
            path.is_file().then_some(path)
        })
    }

    fn filter(&self) -> Result<Option<FileFilter>> {
        self.query
            .as_deref()
            .map(FileFilter::parse)
            .transpose()
            .context("Invalid query")
    }

    pub async fn execute(self, verbose: bool) -> Result<()> {
        let filter = self.filter()?;
        let config_path = self.config_path();
        let mut config = load_config(config_path.as_deref())
            .with_context(|| format!("Failed to load config from {:?}", config_path))?;
        self.apply_overrides(&mut config.run);
        validate_config(&config).context("Configuration validation failed")?;

        let layout = ArchiveLayout::new(&self.root, config.archive.clone());
        if !layout.is_archive() {
            bail!("{} is not an archive", self.root.display());
        }
        let database = layout.database();
        if !database.is_file() {
            bail!("Catalog database {} not found", database.display());
        }
        if self.backup && !self.dry_run {
            let backup = backup_database(&database)?;
            info!("Backed up catalog to {}", backup.display());
        }

        let catalog = Arc::new(
            SqliteFileCatalog::new(&database)
                .with_context(|| format!("Failed to open catalog {}", database.display()))?,
        );

        let options = RunOptions {
            dry_run: self.dry_run,
            capture_output: !verbose,
            filter,
            ..RunOptions::from_config(&config.run)
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current conversions");
                let _ = shutdown_tx.send(true);
            }
        });

        let runner = ConversionRunner::new(catalog, Registry::builtin(), layout, options)
            .with_shutdown(shutdown_rx);
        match runner.run(self.stage).await {
            Ok(summary) => {
                info!(
                    "Converted {}, failed {}, skipped {}",
                    summary.converted, summary.failed, summary.skipped
                );
                Ok(())
            }
            Err(RunError::Cancelled) => bail!("Conversion cancelled"),
            Err(e) => Err(e).context("Conversion run failed"),
        }
    }
}

/// Copies `database` next to itself as `<YYYYmmddHHMMSS>-<name>`.
fn backup_database(database: &Path) -> Result<PathBuf> {
    let name = database
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
    let backup = database.with_file_name(format!("{stamp}-{name}"));
    std::fs::copy(database, &backup)
        .with_context(|| format!("Failed to back up catalog to {}", backup.display()))?;
    Ok(backup)
}

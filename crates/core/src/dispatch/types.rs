//! Types for the dispatch engine.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{CatalogError, ConvertOptions, Destination, FileFilter, SourceKind};
use crate::config::{ArchiveConfig, RunConfig};
use crate::converter::TimeoutPolicy;
use crate::instruction::InstructionError;

/// Which records are converted and where the results go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    OriginalToMaster,
    MasterToAccess,
    MasterToStatutory,
}

impl Stage {
    pub fn source(&self) -> SourceKind {
        match self {
            Self::OriginalToMaster => SourceKind::Original,
            Self::MasterToAccess | Self::MasterToStatutory => SourceKind::Master,
        }
    }

    pub fn destination(&self) -> Destination {
        match self {
            Self::OriginalToMaster => Destination::Master,
            Self::MasterToAccess => Destination::Access,
            Self::MasterToStatutory => Destination::Statutory,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OriginalToMaster => "original:master",
            Self::MasterToAccess => "master:access",
            Self::MasterToStatutory => "master:statutory",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown stage {0:?}, expected original:master, master:access or master:statutory")]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original:master" => Ok(Self::OriginalToMaster),
            "master:access" => Ok(Self::MasterToAccess),
            "master:statutory" => Ok(Self::MasterToStatutory),
            other => Err(UnknownStage(other.to_string())),
        }
    }
}

/// Directories of an archive on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    root: PathBuf,
    config: ArchiveConfig,
}

impl ArchiveLayout {
    pub fn new(root: impl Into<PathBuf>, config: ArchiveConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory the relative paths of `kind` records resolve against.
    pub fn source_root(&self, kind: SourceKind) -> PathBuf {
        match kind {
            SourceKind::Original => self.root.join(&self.config.original_documents),
            SourceKind::Master => self.root.join(&self.config.master_documents),
        }
    }

    /// Directory outputs for `destination` are written to.
    pub fn destination_root(&self, destination: Destination) -> PathBuf {
        match destination {
            Destination::Master => self.root.join(&self.config.master_documents),
            Destination::Access => self.root.join(&self.config.access_documents),
            Destination::Statutory => self.root.join(&self.config.statutory_documents),
        }
    }

    pub fn database(&self) -> PathBuf {
        self.config.database_path(&self.root)
    }

    /// Whether `root` looks like an archive: it has original or statutory documents.
    pub fn is_archive(&self) -> bool {
        self.source_root(SourceKind::Original).is_dir()
            || self.destination_root(Destination::Statutory).is_dir()
    }
}

/// When reconciled results are committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitPolicy {
    EveryFile,
    /// After every n converted files.
    Every(usize),
    /// Once, when the run ends.
    AtEnd,
}

impl CommitPolicy {
    /// 0 commits at the end, 1 after every file.
    pub fn from_count(count: usize) -> Self {
        match count {
            0 => Self::AtEnd,
            1 => Self::EveryFile,
            n => Self::Every(n),
        }
    }

    /// Whether to commit after the `converted`-th converted file.
    pub fn should_commit(&self, converted: usize) -> bool {
        match self {
            Self::EveryFile => true,
            Self::Every(n) => converted % n == 0,
            Self::AtEnd => false,
        }
    }
}

/// Settings of one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub threads: usize,
    pub page_size: usize,
    pub commit: CommitPolicy,
    /// Log what would be converted without converting or writing anything.
    pub dry_run: bool,
    /// Capture converter output instead of passing it through.
    pub capture_output: bool,
    pub timeout: TimeoutPolicy,
    pub tool_ignore: Vec<String>,
    pub tool_include: Vec<String>,
    /// Command name recorded in event operations.
    pub command: String,
    /// Defaults merged under each instruction's own options.
    pub converter_options: ConvertOptions,
    /// Restricts which source records are selected.
    pub filter: Option<FileFilter>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            threads: 4,
            page_size: 100,
            commit: CommitPolicy::EveryFile,
            dry_run: false,
            capture_output: true,
            timeout: TimeoutPolicy::Declared,
            tool_ignore: Vec::new(),
            tool_include: Vec::new(),
            command: "digiarch".to_string(),
            converter_options: ConvertOptions::new(),
            filter: None,
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            threads: config.threads,
            page_size: config.page_size,
            commit: CommitPolicy::from_count(config.commit),
            timeout: TimeoutPolicy::from_secs(config.timeout_secs),
            tool_ignore: config.tool_ignore.clone(),
            tool_include: config.tool_include.clone(),
            converter_options: config.converter_options.clone(),
            ..Default::default()
        }
    }

    /// Whether files using `tool` are converted in this run.
    pub fn tool_allowed(&self, tool: &str) -> bool {
        !self.tool_ignore.iter().any(|t| t == tool)
            && (self.tool_include.is_empty() || self.tool_include.iter().any(|t| t == tool))
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub converted: usize,
    pub failed: usize,
    /// Files filtered out or without a usable instruction.
    pub skipped: usize,
    pub would_convert: usize,
}

/// Conditions that stop a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("cannot build instruction for {path}: {source}")]
    Instruction {
        path: String,
        #[source]
        source: InstructionError,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_parsing() {
        for stage in [
            Stage::OriginalToMaster,
            Stage::MasterToAccess,
            Stage::MasterToStatutory,
        ] {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
        assert_eq!(
            "original:access".parse::<Stage>(),
            Err(UnknownStage("original:access".to_string()))
        );
        assert_eq!(Stage::MasterToStatutory.source(), SourceKind::Master);
        assert_eq!(Stage::MasterToStatutory.destination(), Destination::Statutory);
    }

    #[test]
    fn test_layout() {
        let layout = ArchiveLayout::new("/avid", ArchiveConfig::default());
        assert_eq!(
            layout.source_root(SourceKind::Original),
            PathBuf::from("/avid/OriginalDocuments")
        );
        assert_eq!(
            layout.destination_root(Destination::Statutory),
            PathBuf::from("/avid/Documents")
        );
        assert_eq!(layout.database(), PathBuf::from("/avid/_metadata/avid.db"));
    }

    #[test]
    fn test_commit_policy() {
        assert_eq!(CommitPolicy::from_count(0), CommitPolicy::AtEnd);
        assert_eq!(CommitPolicy::from_count(1), CommitPolicy::EveryFile);
        let every_three = CommitPolicy::from_count(3);
        let commits: Vec<_> = (1..=6).filter(|n| every_three.should_commit(*n)).collect();
        assert_eq!(commits, vec![3, 6]);
        assert!(!CommitPolicy::AtEnd.should_commit(10));
    }

    #[test]
    fn test_tool_filters() {
        let options = RunOptions {
            tool_ignore: vec!["cad".into()],
            ..Default::default()
        };
        assert!(options.tool_allowed("image"));
        assert!(!options.tool_allowed("cad"));

        let options = RunOptions {
            tool_include: vec!["image".into(), "cad".into()],
            tool_ignore: vec!["cad".into()],
            ..Default::default()
        };
        assert!(options.tool_allowed("image"));
        assert!(!options.tool_allowed("cad"));
        assert!(!options.tool_allowed("audio"));
    }

    #[test]
    fn test_options_from_config() {
        let config = RunConfig {
            threads: 2,
            commit: 0,
            timeout_secs: Some(0),
            ..Default::default()
        };
        let options = RunOptions::from_config(&config);
        assert_eq!(options.threads, 2);
        assert_eq!(options.commit, CommitPolicy::AtEnd);
        assert_eq!(options.timeout, TimeoutPolicy::Disabled);
        assert!(options.capture_output);
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConvertoolConfig {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// Batch run settings. Command-line flags override these.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RunConfig {
    /// Parallel conversions for converters that allow it
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Files between commits, 0 commits only at the end
    #[serde(default = "default_commit")]
    pub commit: usize,
    /// Overrides every converter's timeout, 0 disables timeouts
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Catalog rows fetched per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Tools whose files are skipped
    #[serde(default)]
    pub tool_ignore: Vec<String>,
    /// When not empty, only these tools are run
    #[serde(default)]
    pub tool_include: Vec<String>,
    /// Options every converter sees unless the file's own action sets them
    #[serde(default)]
    pub converter_options: BTreeMap<String, String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            commit: default_commit(),
            timeout_secs: None,
            page_size: default_page_size(),
            tool_ignore: Vec::new(),
            tool_include: Vec::new(),
            converter_options: BTreeMap::new(),
        }
    }
}

fn default_threads() -> usize {
    4
}

fn default_commit() -> usize {
    1
}

fn default_page_size() -> usize {
    100
}

/// Directory layout of an archive, relative to its root.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_original_documents")]
    pub original_documents: PathBuf,
    #[serde(default = "default_master_documents")]
    pub master_documents: PathBuf,
    #[serde(default = "default_access_documents")]
    pub access_documents: PathBuf,
    #[serde(default = "default_statutory_documents")]
    pub statutory_documents: PathBuf,
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            original_documents: default_original_documents(),
            master_documents: default_master_documents(),
            access_documents: default_access_documents(),
            statutory_documents: default_statutory_documents(),
            database: default_database(),
        }
    }
}

impl ArchiveConfig {
    /// Catalog database path for the archive at `root`.
    pub fn database_path(&self, root: &Path) -> PathBuf {
        root.join(&self.database)
    }
}

fn default_original_documents() -> PathBuf {
    PathBuf::from("OriginalDocuments")
}

fn default_master_documents() -> PathBuf {
    PathBuf::from("MasterDocuments")
}

fn default_access_documents() -> PathBuf {
    PathBuf::from("AccessDocuments")
}

fn default_statutory_documents() -> PathBuf {
    PathBuf::from("Documents")
}

fn default_database() -> PathBuf {
    PathBuf::from("_metadata/avid.db")
}

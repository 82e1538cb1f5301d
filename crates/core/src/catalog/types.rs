//! Types for the file catalog.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use uuid::Uuid;

use super::FileFilter;

/// Free-form converter options, keyed by option name.
pub type ConvertOptions = BTreeMap<String, String>;

/// Which catalog table a source record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Original,
    Master,
}

impl SourceKind {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Original => "original_files",
            Self::Master => "master_files",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Master => "master",
        }
    }
}

/// Which catalog table a conversion output lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Master,
    Access,
    Statutory,
}

impl Destination {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Master => "master_files",
            Self::Access => "access_files",
            Self::Statutory => "statutory_files",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Access => "access",
            Self::Statutory => "statutory",
        }
    }

    /// Status bit recorded on the source record once this destination is produced.
    ///
    /// Originals only ever produce masters, so master and access share bit 0.
    pub fn status_bit(&self) -> u8 {
        match self {
            Self::Master | Self::Access => 0b01,
            Self::Statutory => 0b10,
        }
    }
}

/// Per-record bitmask of the destinations already produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessingStatus(u8);

impl ProcessingStatus {
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0b11)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_set(&self, destination: Destination) -> bool {
        self.0 & destination.status_bit() != 0
    }

    #[must_use]
    pub fn with(self, destination: Destination) -> Self {
        Self(self.0 | destination.status_bit())
    }
}

/// Conversion instructions attached to a record by the upstream identification step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertAction {
    pub tool: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ConvertOptions>,
}

impl ConvertAction {
    pub fn new(tool: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            output: output.into(),
            options: None,
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options
            .get_or_insert_with(ConvertOptions::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Instructions for files that are replaced by an explanatory template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreAction {
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl IgnoreAction {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Data for each possible action. Only the entry matching the record's action is read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert: Option<ConvertAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore: Option<IgnoreAction>,
}

/// Character encoding detected for a text file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingHint {
    /// WHATWG encoding label (e.g. "windows-1252", "utf-8").
    pub encoding: String,
}

/// A catalog record that can be handed to a converter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    pub uuid: Uuid,
    pub kind: SourceKind,
    /// Path relative to `root`.
    pub relative_path: PathBuf,
    /// Directory `relative_path` resolves against. Filled in by the converter when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    pub checksum: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<EncodingHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub puid: Option<String>,
    /// Declared action tag ("convert", "ignore", ...). Originals only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub action_data: ActionData,
    /// Master files only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert_access: Option<ConvertAction>,
    /// Master files only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert_statutory: Option<ConvertAction>,
    #[serde(default)]
    pub processed: ProcessingStatus,
    /// Archive the original was extracted from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Uuid>,
    /// Master files only: the original this master was produced from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_uuid: Option<Uuid>,
    #[serde(default)]
    pub sequence: u32,
}

impl SourceFile {
    /// Creates an original record with no action.
    pub fn original(relative_path: impl Into<PathBuf>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            kind: SourceKind::Original,
            relative_path: relative_path.into(),
            root: None,
            checksum: String::new(),
            size: 0,
            encoding: None,
            puid: None,
            action: None,
            action_data: ActionData::default(),
            convert_access: None,
            convert_statutory: None,
            processed: ProcessingStatus::default(),
            parent: None,
            original_uuid: None,
            sequence: 0,
        }
    }

    /// Creates a master record produced from `original_uuid`.
    pub fn master(relative_path: impl Into<PathBuf>, original_uuid: Uuid, sequence: u32) -> Self {
        Self {
            kind: SourceKind::Master,
            original_uuid: Some(original_uuid),
            sequence,
            ..Self::original(relative_path)
        }
    }

    /// A record for an intermediate file, used when one converter feeds another.
    pub fn synthetic(path: &Path, root: &Path) -> Self {
        let relative_path = path
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(path.file_name().unwrap_or_default()));
        Self {
            root: Some(root.to_path_buf()),
            ..Self::original(relative_path)
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_convert(mut self, action: ConvertAction) -> Self {
        self.action = Some("convert".to_string());
        self.action_data.convert = Some(action);
        self
    }

    pub fn with_ignore(mut self, action: IgnoreAction) -> Self {
        self.action = Some("ignore".to_string());
        self.action_data.ignore = Some(action);
        self
    }

    /// File name including every suffix.
    pub fn name(&self) -> String {
        self.relative_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name with its extension chain removed ("report.tar.gz" -> "report").
    ///
    /// A suffix belongs to the chain when it is short, alphanumeric and contains a
    /// letter, so dotted dates and version numbers stay part of the stem.
    pub fn stem(&self) -> String {
        strip_suffix_chain(&self.name()).to_string()
    }

    pub fn absolute_path(&self) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join(&self.relative_path))
    }
}

fn strip_suffix_chain(name: &str) -> &str {
    let mut stem = name;
    while let Some(idx) = stem.rfind('.') {
        let suffix = &stem[idx + 1..];
        let is_extension = idx > 0
            && !suffix.is_empty()
            && suffix.len() <= 8
            && suffix.chars().all(|c| c.is_ascii_alphanumeric())
            && suffix.chars().any(|c| c.is_ascii_alphabetic());
        if !is_extension {
            break;
        }
        stem = &stem[..idx];
    }
    stem
}

/// An output file produced by a conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertedFile {
    pub uuid: Uuid,
    pub original_uuid: Uuid,
    /// Disambiguates several outputs from one input.
    pub sequence: u32,
    pub relative_path: PathBuf,
    pub checksum: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub puid: Option<String>,
}

impl ConvertedFile {
    /// Builds a record for a file on disk, hashing its content.
    pub async fn from_file(
        path: &Path,
        root: &Path,
        original_uuid: Uuid,
        sequence: u32,
        puid: Option<String>,
    ) -> std::io::Result<Self> {
        let relative_path = path
            .strip_prefix(root)
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{} is not inside {}", path.display(), root.display()),
                )
            })?
            .to_path_buf();

        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 64 * 1024];
        let mut size = 0u64;
        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
            size += read as u64;
        }

        Ok(Self {
            uuid: Uuid::new_v4(),
            original_uuid,
            sequence,
            relative_path,
            checksum: format!("{:x}", hasher.finalize()),
            size,
            puid,
        })
    }
}

/// Conflict behaviour for inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    /// Overwrite the existing row with the same key.
    Replace,
    /// Fail with [`CatalogError::AlreadyExists`].
    Fail,
}

/// Keyset position for paging through sources ordered by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    /// ASCII-lowercased relative path, matching SQLite's `lower()`.
    pub path_key: String,
    pub uuid: Uuid,
}

impl PageCursor {
    pub fn after(file: &SourceFile) -> Self {
        Self {
            path_key: path_to_db(&file.relative_path).to_ascii_lowercase(),
            uuid: file.uuid,
        }
    }
}

/// Query for source records still waiting for a destination.
#[derive(Debug, Clone)]
pub struct SourceQuery {
    pub kind: SourceKind,
    pub destination: Destination,
    pub after: Option<PageCursor>,
    pub limit: usize,
    pub filter: Option<FileFilter>,
}

impl SourceQuery {
    pub fn pending(kind: SourceKind, destination: Destination) -> Self {
        Self {
            kind,
            destination,
            after: None,
            limit: 100,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: Option<FileFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn after(mut self, cursor: Option<PageCursor>) -> Self {
        self.after = cursor;
        self
    }
}

/// Filter for querying stored events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub uuid: Option<Uuid>,
    pub event_type: Option<String>,
    pub limit: i64,
}

impl EventFilter {
    pub fn new() -> Self {
        Self {
            limit: 1000,
            ..Default::default()
        }
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

/// Errors for catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Renders a relative path with forward slashes, as stored in the catalog.
pub fn path_to_db(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_bits_are_independent() {
        let status = ProcessingStatus::default().with(Destination::Access);
        assert!(status.is_set(Destination::Access));
        assert!(!status.is_set(Destination::Statutory));

        let status = ProcessingStatus::default().with(Destination::Statutory);
        assert!(status.is_set(Destination::Statutory));
        assert!(!status.is_set(Destination::Access));

        let both = ProcessingStatus::default()
            .with(Destination::Statutory)
            .with(Destination::Access);
        assert_eq!(both.bits(), 0b11);
        assert_eq!(
            both,
            ProcessingStatus::default()
                .with(Destination::Access)
                .with(Destination::Statutory)
        );
    }

    #[test]
    fn test_stem_strips_extension_chain() {
        assert_eq!(SourceFile::original("a/report.docx").stem(), "report");
        assert_eq!(SourceFile::original("backup.tar.gz").stem(), "backup");
        assert_eq!(
            SourceFile::original("Scan 12.03.2020.pdf").stem(),
            "Scan 12.03.2020"
        );
        assert_eq!(SourceFile::original(".hidden").stem(), ".hidden");
        assert_eq!(SourceFile::original("noext").stem(), "noext");
    }

    #[test]
    fn test_synthetic_file_is_relative_to_root() {
        let file = SourceFile::synthetic(Path::new("/tmp/x/sub/doc.pdf"), Path::new("/tmp/x"));
        assert_eq!(file.relative_path, PathBuf::from("sub/doc.pdf"));
        assert_eq!(file.absolute_path(), Some(PathBuf::from("/tmp/x/sub/doc.pdf")));
    }

    #[test]
    fn test_path_to_db_uses_forward_slashes() {
        let path: PathBuf = ["a", "b", "c.txt"].iter().collect();
        assert_eq!(path_to_db(&path), "a/b/c.txt");
    }

    #[test]
    fn test_action_data_serialization() {
        let data = ActionData {
            convert: Some(ConvertAction::new("document", "pdf").with_option("filter", "x")),
            ignore: None,
        };
        let json = serde_json::to_string(&data).unwrap();
        assert!(!json.contains("ignore"));
        let parsed: ActionData = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, data);
    }

    #[tokio::test]
    async fn test_converted_file_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sub").join("out.txt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"hello").unwrap();

        let original = Uuid::new_v4();
        let file = ConvertedFile::from_file(&path, dir.path(), original, 2, None)
            .await
            .unwrap();

        assert_eq!(file.relative_path, PathBuf::from("sub/out.txt"));
        assert_eq!(file.size, 5);
        assert_eq!(file.sequence, 2);
        assert_eq!(
            file.checksum,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}

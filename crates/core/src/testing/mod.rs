//! Testing utilities: mock converters and on-disk archive fixtures.
//!
//! # Example
//!
//! ```rust,ignore
//! use convertool_core::testing::{fixtures::ArchiveFixture, mock_registry};
//!
//! let archive = ArchiveFixture::new();
//! archive.add_original("docs/a.txt", b"abc", ConvertAction::new("mock", "txt"));
//!
//! let runner = ConversionRunner::new(archive.catalog(), mock_registry(), archive.layout(), options);
//! let summary = runner.run(Stage::OriginalToMaster).await?;
//! ```

mod mock_converter;

pub use mock_converter::{
    mock_registry, MockConverter, FAIL_OPTION, MOCK, MOCK_CHAIN, MOCK_SERIAL, MOCK_UNSUPPORTED,
    OUTPUTS_OPTION, PANIC_OPTION, SLEEP_OPTION,
};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use sha2::{Digest, Sha256};
    use tempfile::TempDir;
    use uuid::Uuid;

    use crate::catalog::{
        ConvertAction, FileCatalog, IgnoreAction, OnConflict, SourceFile, SourceKind,
        SqliteFileCatalog,
    };
    use crate::config::ArchiveConfig;
    use crate::dispatch::ArchiveLayout;

    /// An archive in a temporary directory with an in-memory catalog.
    pub struct ArchiveFixture {
        dir: TempDir,
        layout: ArchiveLayout,
        catalog: Arc<SqliteFileCatalog>,
    }

    impl Default for ArchiveFixture {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ArchiveFixture {
        /// Panics if the directory or catalog cannot be created.
        pub fn new() -> Self {
            let dir = TempDir::new().expect("create archive directory");
            let layout = ArchiveLayout::new(dir.path(), ArchiveConfig::default());
            std::fs::create_dir_all(layout.source_root(SourceKind::Original))
                .expect("create original documents");
            let catalog = Arc::new(SqliteFileCatalog::in_memory().expect("open catalog"));
            Self {
                dir,
                layout,
                catalog,
            }
        }

        pub fn root(&self) -> &Path {
            self.dir.path()
        }

        pub fn layout(&self) -> ArchiveLayout {
            self.layout.clone()
        }

        pub fn catalog(&self) -> Arc<SqliteFileCatalog> {
            Arc::clone(&self.catalog)
        }

        fn write(&self, kind: SourceKind, relative_path: &str, content: &[u8]) -> SourceFile {
            let path = self.layout.source_root(kind).join(relative_path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("create source directory");
            }
            std::fs::write(&path, content).expect("write source file");
            let mut file = SourceFile::original(relative_path);
            file.kind = kind;
            file.checksum = checksum(content);
            file.size = content.len() as u64;
            file
        }

        fn insert(&self, file: SourceFile) -> SourceFile {
            self.catalog
                .insert_source(&file, OnConflict::Fail)
                .expect("insert source");
            file
        }

        /// Writes an original and records it with a convert action.
        pub fn add_original(
            &self,
            relative_path: &str,
            content: &[u8],
            action: ConvertAction,
        ) -> SourceFile {
            let file = self
                .write(SourceKind::Original, relative_path, content)
                .with_convert(action);
            self.insert(file)
        }

        /// Writes an original and records it with an ignore action.
        pub fn add_ignored(
            &self,
            relative_path: &str,
            content: &[u8],
            action: IgnoreAction,
        ) -> SourceFile {
            let file = self
                .write(SourceKind::Original, relative_path, content)
                .with_ignore(action);
            self.insert(file)
        }

        /// Writes a master file and records it with its access and statutory actions.
        pub fn add_master(
            &self,
            relative_path: &str,
            content: &[u8],
            access: Option<ConvertAction>,
            statutory: Option<ConvertAction>,
        ) -> SourceFile {
            let mut file = self.write(SourceKind::Master, relative_path, content);
            file.original_uuid = Some(Uuid::new_v4());
            file.convert_access = access;
            file.convert_statutory = statutory;
            self.insert(file)
        }

        /// Files under `dir`, relative to it and sorted.
        pub fn files_in(&self, dir: &Path) -> Vec<PathBuf> {
            list_tree(dir)
        }
    }

    /// SHA-256 of `content`, hex encoded.
    pub fn checksum(content: &[u8]) -> String {
        format!("{:x}", Sha256::digest(content))
    }

    /// Every file below `dir`, relative to it and sorted. Empty if `dir` is missing.
    pub fn list_tree(dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            let Ok(entries) = std::fs::read_dir(&current) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(dir) {
                    files.push(relative.to_path_buf());
                }
            }
        }
        files.sort();
        files
    }
}

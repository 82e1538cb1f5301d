//! File catalog - the archive database of original, master and derived files.
//!
//! The catalog is owned by the dispatch controller. Conversion workers never
//! write to it; they hand their results back and the controller records them.

mod events;
mod filter;
mod sqlite;
mod types;

pub use events::{ConversionEvent, EventRecord};
pub use filter::FileFilter;
pub use sqlite::SqliteFileCatalog;
pub use types::*;

use std::path::PathBuf;
use uuid::Uuid;

/// Trait for file catalog storage.
pub trait FileCatalog: Send + Sync {
    /// Insert a source record. Used when seeding a catalog.
    fn insert_source(&self, file: &SourceFile, on_conflict: OnConflict)
        -> Result<(), CatalogError>;

    /// Source records still missing the query's destination, ordered by
    /// lowercased relative path and then uuid.
    fn select_sources(&self, query: &SourceQuery) -> Result<Vec<SourceFile>, CatalogError>;

    /// Get a specific source record.
    fn get_source(&self, kind: SourceKind, uuid: Uuid) -> Result<SourceFile, CatalogError>;

    /// Persist the mutable fields of a source record (processed status and actions).
    fn update_source(&self, file: &SourceFile) -> Result<(), CatalogError>;

    /// Insert an output record. With [`OnConflict::Replace`], an existing row for
    /// the same (original, sequence) is overwritten in place.
    fn insert_converted(
        &self,
        destination: Destination,
        file: &ConvertedFile,
        on_conflict: OnConflict,
    ) -> Result<(), CatalogError>;

    /// Outputs recorded for an original in the given destination, by sequence.
    fn converted_files(
        &self,
        destination: Destination,
        original_uuid: Uuid,
    ) -> Result<Vec<ConvertedFile>, CatalogError>;

    /// First original with this checksum whose action is not "ignore".
    fn find_duplicate(&self, checksum: &str) -> Result<Option<SourceFile>, CatalogError>;

    /// Relative paths of originals extracted from `parent`, sorted.
    fn children(&self, parent: Uuid) -> Result<Vec<PathBuf>, CatalogError>;

    /// Append an event. Returns its id.
    fn insert_event(&self, event: &EventRecord) -> Result<i64, CatalogError>;

    /// Query events, newest first.
    fn events(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, CatalogError>;

    /// Open a transaction if none is open.
    fn begin(&self) -> Result<(), CatalogError>;

    /// Commit the open transaction, if any.
    fn commit(&self) -> Result<(), CatalogError>;

    /// Roll back the open transaction, if any.
    fn rollback(&self) -> Result<(), CatalogError>;
}

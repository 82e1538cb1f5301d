pub mod catalog;
pub mod config;
pub mod converter;
pub mod dispatch;
pub mod instruction;
pub mod testing;

pub use catalog::{
    CatalogError, ConversionEvent, ConvertAction, ConvertedFile, Destination, EventRecord,
    FileCatalog, IgnoreAction, OnConflict, ProcessingStatus, SourceFile, SourceKind,
    SqliteFileCatalog,
};
pub use config::{
    load_config, load_config_from_str, validate_config, ArchiveConfig, ConfigError,
    ConvertoolConfig, RunConfig,
};
pub use converter::{Converter, ConverterContext, ConverterError, ConverterType, Registry};
pub use dispatch::{ArchiveLayout, ConversionRunner, RunError, RunOptions, RunSummary, Stage};
pub use instruction::{ConvertInstruction, InstructionError};

//! Converters wrapping external programs, and the registry that picks one
//! for a tool/output pair.
//!
//! Every converter writes into a private scratch directory under the
//! destination and moves finished files into place only after the wrapped
//! program succeeded.
//!
//! # Example
//!
//! ```ignore
//! use convertool_core::converter::{ConverterContext, Registry};
//!
//! let registry = Registry::builtin();
//! let converter_type = registry.find("image", "jpeg").expect("image converter");
//! let converter = converter_type.build(file, Some(root), ConverterContext::new())?;
//! let outputs = converter.convert(&output_dir, "jpeg", true).await?;
//! ```

mod base;
pub mod builtin;
mod descriptor;
mod environment;
mod error;
mod placement;
mod process;
mod registry;
mod traits;

pub use base::{path_arg, ConverterBase, ConverterContext, TimeoutPolicy, TEMP_DIR_PREFIX};
pub use descriptor::{ConverterDescriptor, Dependency, Platforms};
pub use environment::{check_environment, current_platform, ResolvedDependencies};
pub use error::{ConverterError, EnvironmentError};
pub use placement::{list_files, place_all, place_file, remove_outputs};
pub use process::{run_process, ProcessOptions, ProcessOutput, COMMAND_NOT_FOUND};
pub use registry::{ConverterType, Registry};
pub use traits::Converter;

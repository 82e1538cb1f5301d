//! Trait definitions for the converter module.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::descriptor::ConverterDescriptor;
use super::error::ConverterError;

/// A converter bound to one source file.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Static metadata of this converter type.
    fn descriptor(&self) -> &'static ConverterDescriptor;

    /// Converts the file to `output`, writing results under `output_dir`.
    ///
    /// With `keep_relative_path`, results land in the source's relative directory
    /// beneath `output_dir`. Either every returned path is a complete file or an
    /// error is returned and nothing new is left in the destination.
    async fn convert(
        &self,
        output_dir: &Path,
        output: &str,
        keep_relative_path: bool,
    ) -> Result<Vec<PathBuf>, ConverterError>;

    /// PRONOM identifier of the files produced for `output`, when known.
    fn output_puid(&self, _output: &str) -> Option<&'static str> {
        None
    }
}

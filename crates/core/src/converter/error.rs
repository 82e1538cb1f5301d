//! Error types for the converter module.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::process::ProcessOutput;

/// The converter cannot run on this host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentError {
    /// Host platform is not one the converter supports.
    #[error("Converter {converter} does not support platform {platform} (supported: {supported})")]
    UnsupportedPlatform {
        converter: String,
        platform: String,
        supported: String,
    },

    /// None of the candidate executables for a dependency is installed.
    #[error("Converter {converter} is missing dependency {name} (tried: {candidates})")]
    MissingDependency {
        converter: String,
        name: String,
        candidates: String,
    },
}

/// Errors that can occur during conversion.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// Host platform or dependencies are unsuitable.
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    /// The conversion tool failed.
    #[error("{reason}")]
    ConversionFailed {
        reason: String,
        process: Option<ProcessOutput>,
    },

    /// The conversion tool exceeded its time limit.
    #[error("The process timed out after {}s", timeout.as_secs())]
    Timeout { timeout: Duration },

    /// The output directory exists but is not a directory.
    #[error("Output directory {} is not a directory", path.display())]
    OutputDir { path: PathBuf },

    /// The requested output is not supported by the converter.
    #[error("Unsupported output {output:?}")]
    OutputTarget { output: String },

    /// A converter option is missing or invalid.
    #[error("Invalid option {option:?}: {reason}")]
    BadOption { option: String, reason: String },

    /// I/O error during conversion.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConverterError {
    /// Creates a new conversion failed error without process output.
    pub fn conversion_failed(reason: impl Into<String>) -> Self {
        Self::ConversionFailed {
            reason: reason.into(),
            process: None,
        }
    }

    /// Creates a new conversion failed error from a finished process.
    pub fn process_failed(process: ProcessOutput) -> Self {
        Self::ConversionFailed {
            reason: process.message(),
            process: Some(process),
        }
    }

    pub fn bad_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadOption {
            option: option.into(),
            reason: reason.into(),
        }
    }

    /// Stable name of the error category, as recorded in events.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Environment(EnvironmentError::UnsupportedPlatform { .. }) => {
                "UnsupportedPlatform"
            }
            Self::Environment(EnvironmentError::MissingDependency { .. }) => "MissingDependency",
            Self::ConversionFailed { .. } => "ConvertError",
            Self::Timeout { .. } => "ConvertTimeoutError",
            Self::OutputDir { .. } => "OutputDirError",
            Self::OutputTarget { .. } => "OutputTargetError",
            Self::BadOption { .. } => "BadOptionError",
            Self::Io(_) => "IOError",
        }
    }

    /// Output captured from the failing process, if any.
    pub fn process(&self) -> Option<&ProcessOutput> {
        match self {
            Self::ConversionFailed { process, .. } => process.as_ref(),
            _ => None,
        }
    }
}

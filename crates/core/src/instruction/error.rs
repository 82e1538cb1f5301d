use thiserror::Error;

use crate::converter::EnvironmentError;

/// Why no instruction could be built for a file.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InstructionError {
    #[error("No converter found for tool {tool:?} and output {output:?}")]
    ConverterNotFound { tool: String, output: String },

    #[error("Missing data for action {action:?}")]
    MissingActionData { action: String },

    #[error("Unsupported action {0:?}")]
    UnsupportedAction(Option<String>),

    #[error("{kind} files cannot be converted to {destination}")]
    InvalidStage {
        kind: &'static str,
        destination: &'static str,
    },

    #[error(transparent)]
    Environment(#[from] EnvironmentError),
}

impl InstructionError {
    /// Fatal errors abort the run. The rest skip the file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UnsupportedAction(_) | Self::InvalidStage { .. })
    }

    /// Short name stored in events.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConverterNotFound { .. } => "ConverterNotFound",
            Self::MissingActionData { .. } => "MissingActionData",
            Self::UnsupportedAction(_) => "UnsupportedAction",
            Self::InvalidStage { .. } => "InvalidStage",
            Self::Environment(EnvironmentError::UnsupportedPlatform { .. }) => {
                "UnsupportedPlatform"
            }
            Self::Environment(EnvironmentError::MissingDependency { .. }) => "MissingDependency",
        }
    }
}

use super::{types::ConvertoolConfig, ConfigError};

/// Validate configuration
/// Currently validates:
/// - At least one worker thread
/// - Non-empty catalog pages
pub fn validate_config(config: &ConvertoolConfig) -> Result<(), ConfigError> {
    if config.run.threads == 0 {
        return Err(ConfigError::ValidationError(
            "run.threads cannot be 0".to_string(),
        ));
    }

    if config.run.page_size == 0 {
        return Err(ConfigError::ValidationError(
            "run.page_size cannot be 0".to_string(),
        ));
    }

    Ok(())
}

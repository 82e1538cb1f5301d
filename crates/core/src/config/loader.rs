use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use super::{types::ConvertoolConfig, ConfigError};

/// Load configuration from an optional file with environment variable overrides
///
/// Nested keys use a double underscore, e.g. `CONVERTOOL_RUN__THREADS=8`.
pub fn load_config(path: Option<&Path>) -> Result<ConvertoolConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(ConvertoolConfig::default()));

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        figment = figment.merge(Toml::file(path));
    }

    figment
        .merge(Env::prefixed("CONVERTOOL_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<ConvertoolConfig, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

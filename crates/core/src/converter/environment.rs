//! Host checks for converters: platform support and installed dependencies.
//!
//! Checks run at most once per converter per process. Later calls reuse the
//! first result, so the outcome is fixed for the lifetime of a run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::Lazy;
use tracing::debug;

use super::descriptor::ConverterDescriptor;
use super::error::EnvironmentError;

type CheckResult = Result<Arc<ResolvedDependencies>, EnvironmentError>;

static CHECKS: Lazy<Mutex<HashMap<&'static str, CheckResult>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Name of the host platform, as used in converter descriptors.
pub fn current_platform() -> &'static str {
    std::env::consts::OS
}

/// Executables found for a converter's dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedDependencies {
    executables: HashMap<&'static str, PathBuf>,
}

impl ResolvedDependencies {
    /// Path of the installed candidate for `dependency`.
    pub fn executable(&self, dependency: &str) -> Option<&Path> {
        self.executables.get(dependency).map(PathBuf::as_path)
    }
}

/// Checks that `descriptor` can run on this host, resolving its dependencies.
///
/// The first call for a converter name does the work under a lock; concurrent
/// and later callers get the stored result.
pub fn check_environment(descriptor: &ConverterDescriptor) -> CheckResult {
    let mut checks = CHECKS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(result) = checks.get(descriptor.name) {
        return result.clone();
    }

    let result = check_platform(descriptor)
        .and_then(|_| resolve_dependencies(descriptor))
        .map(Arc::new);
    debug!(
        converter = descriptor.name,
        ok = result.is_ok(),
        "Checked converter environment"
    );
    checks.insert(descriptor.name, result.clone());
    result
}

fn check_platform(descriptor: &ConverterDescriptor) -> Result<(), EnvironmentError> {
    let platform = current_platform();
    if descriptor.platforms.supports(platform) {
        Ok(())
    } else {
        Err(EnvironmentError::UnsupportedPlatform {
            converter: descriptor.name.to_string(),
            platform: platform.to_string(),
            supported: descriptor.platforms.describe(),
        })
    }
}

fn resolve_dependencies(
    descriptor: &ConverterDescriptor,
) -> Result<ResolvedDependencies, EnvironmentError> {
    let mut resolved = ResolvedDependencies::default();
    for dependency in &descriptor.dependencies {
        let found = dependency
            .candidates
            .iter()
            .find_map(|candidate| which::which(candidate).ok());
        match found {
            Some(path) => {
                resolved.executables.insert(dependency.name, path);
            }
            None => {
                return Err(EnvironmentError::MissingDependency {
                    converter: descriptor.name.to_string(),
                    name: dependency.name.to_string(),
                    candidates: dependency.candidates.join(", "),
                })
            }
        }
    }
    Ok(resolved)
}

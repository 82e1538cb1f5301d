//! State and helpers shared by every converter.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use super::descriptor::ConverterDescriptor;
use super::environment::{check_environment, ResolvedDependencies};
use super::error::ConverterError;
use super::process::{run_process, ProcessOptions, ProcessOutput};
use crate::catalog::{ConvertOptions, FileCatalog, SourceFile};

/// Prefix of the scratch directories converters create inside the destination.
pub const TEMP_DIR_PREFIX: &str = ".tmp_convertool_";

/// How the per-invocation time limit is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Use the converter's declared timeout.
    #[default]
    Declared,
    /// Use this limit for every converter.
    Override(Duration),
    /// Wait indefinitely.
    Disabled,
}

impl TimeoutPolicy {
    /// `None` keeps the declared timeouts and zero disables them.
    pub fn from_secs(secs: Option<u64>) -> Self {
        match secs {
            None => Self::Declared,
            Some(0) => Self::Disabled,
            Some(secs) => Self::Override(Duration::from_secs(secs)),
        }
    }

    pub fn resolve(&self, declared: Option<Duration>) -> Option<Duration> {
        match self {
            Self::Declared => declared,
            Self::Override(limit) => Some(*limit),
            Self::Disabled => None,
        }
    }
}

/// Everything a converter gets besides its source file.
#[derive(Clone, Default)]
pub struct ConverterContext {
    /// Read access to the catalog, for converters that consult other records.
    pub catalog: Option<Arc<dyn FileCatalog>>,
    pub options: ConvertOptions,
    pub capture_output: bool,
    pub timeout: TimeoutPolicy,
}

impl ConverterContext {
    pub fn new() -> Self {
        Self {
            capture_output: true,
            ..Default::default()
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn FileCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_options(mut self, options: ConvertOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_timeout(mut self, timeout: TimeoutPolicy) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A converter's source file, metadata and resolved environment.
pub struct ConverterBase {
    pub file: SourceFile,
    pub descriptor: &'static ConverterDescriptor,
    pub context: ConverterContext,
    dependencies: Arc<ResolvedDependencies>,
}

impl ConverterBase {
    /// Binds `descriptor` to `file`. Fails before anything touches the filesystem
    /// when the host cannot run the converter.
    pub fn new(
        mut file: SourceFile,
        descriptor: &'static ConverterDescriptor,
        root: Option<&Path>,
        context: ConverterContext,
    ) -> Result<Self, ConverterError> {
        let dependencies = check_environment(descriptor)?;
        if file.root.is_none() {
            file.root = root.map(Path::to_path_buf);
        }
        Ok(Self {
            file,
            descriptor,
            context,
            dependencies,
        })
    }

    /// Builds the base for one stage of a composite converter.
    pub fn part(
        &self,
        file: SourceFile,
        descriptor: &'static ConverterDescriptor,
    ) -> Result<Self, ConverterError> {
        Self::new(file, descriptor, None, self.context.clone())
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// Absolute path of the source file.
    pub fn input_path(&self) -> Result<PathBuf, ConverterError> {
        self.file.absolute_path().ok_or_else(|| {
            ConverterError::conversion_failed(format!(
                "No root directory for {}",
                self.file.relative_path.display()
            ))
        })
    }

    /// Normalizes `requested` to a declared output.
    pub fn output(&self, requested: &str) -> Result<&'static str, ConverterError> {
        self.descriptor
            .normalize_output(requested)
            .ok_or_else(|| ConverterError::OutputTarget {
                output: requested.to_string(),
            })
    }

    /// Directory results go to. Not created here.
    pub fn output_dir(&self, base: &Path, keep_relative_path: bool) -> Result<PathBuf, ConverterError> {
        let dir = match self.file.relative_path.parent() {
            Some(parent) if keep_relative_path => base.join(parent),
            _ => base.to_path_buf(),
        };
        if dir.exists() && !dir.is_dir() {
            return Err(ConverterError::OutputDir { path: dir });
        }
        Ok(dir)
    }

    /// `dir/<stem>.<extension>`, replacing the source's extension chain.
    pub fn output_file(&self, dir: &Path, extension: &str) -> PathBuf {
        dir.join(format!("{}.{}", self.file.stem(), extension))
    }

    /// `dir/<name>.<extension>`, keeping the source's full name.
    pub fn output_file_appended(&self, dir: &Path, extension: &str) -> PathBuf {
        dir.join(format!("{}.{}", self.file.name(), extension))
    }

    /// Private scratch directory inside `parent`, removed when dropped.
    pub fn temp_dir(&self, parent: &Path) -> Result<TempDir, ConverterError> {
        std::fs::create_dir_all(parent)?;
        Ok(tempfile::Builder::new()
            .prefix(TEMP_DIR_PREFIX)
            .tempdir_in(parent)?)
    }

    /// Installed executable for a declared dependency.
    pub fn executable(&self, dependency: &str) -> Result<PathBuf, ConverterError> {
        self.dependencies
            .executable(dependency)
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                ConverterError::conversion_failed(format!(
                    "{} does not declare dependency {}",
                    self.name(),
                    dependency
                ))
            })
    }

    /// Effective time limit for one invocation.
    pub fn timeout(&self) -> Option<Duration> {
        self.context.timeout.resolve(self.descriptor.process_timeout)
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.context.options.get(key).map(String::as_str)
    }

    pub fn require_option(&self, key: &str) -> Result<&str, ConverterError> {
        self.option(key)
            .ok_or_else(|| ConverterError::bad_option(key, "option is required"))
    }

    /// Runs the executable resolved for `dependency`.
    pub async fn run(
        &self,
        dependency: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<ProcessOutput, ConverterError> {
        let program = self.executable(dependency)?;
        self.run_program(&program, args, cwd).await
    }

    /// Like [`Self::run`], but always captures output. For tools whose stdout is the result.
    pub async fn run_captured(
        &self,
        dependency: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<ProcessOutput, ConverterError> {
        let program = self.executable(dependency)?;
        self.run_with(&program, args, cwd, true).await
    }

    /// Runs `program` under this converter's timeout and output settings.
    pub async fn run_program(
        &self,
        program: &Path,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<ProcessOutput, ConverterError> {
        self.run_with(program, args, cwd, self.context.capture_output)
            .await
    }

    /// Runs `program` under this converter's timeout, choosing whether to capture output.
    pub async fn run_with(
        &self,
        program: &Path,
        args: &[String],
        cwd: Option<&Path>,
        capture_output: bool,
    ) -> Result<ProcessOutput, ConverterError> {
        let options = ProcessOptions {
            cwd: cwd.map(Path::to_path_buf),
            capture_output,
            timeout: self.timeout(),
        };
        run_process(program, args, &options).await
    }
}

/// Lossy string form of a path, for tool arguments.
pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

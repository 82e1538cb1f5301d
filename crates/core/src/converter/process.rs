//! Running external conversion tools.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::error::ConverterError;

/// Exit code reported when the program could not be found.
pub const COMMAND_NOT_FOUND: i32 = 127;

/// What a finished process left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Human-readable failure message: stderr, else stdout, else the exit code.
    pub fn message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("An unknown error occurred. Return code {}", code),
            None => "An unknown error occurred. Process terminated by signal".to_string(),
        }
    }

    /// Captured streams, for logging with a failure.
    pub fn streams(&self) -> Option<String> {
        let mut parts = Vec::new();
        if !self.stdout.trim().is_empty() {
            parts.push(format!("stdout:\n{}", self.stdout.trim_end()));
        }
        if !self.stderr.trim().is_empty() {
            parts.push(format!("stderr:\n{}", self.stderr.trim_end()));
        }
        (!parts.is_empty()).then(|| parts.join("\n"))
    }
}

/// How to run a single tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    pub cwd: Option<PathBuf>,
    /// Capture stdout and stderr instead of passing them through to the terminal.
    pub capture_output: bool,
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

/// Runs `program` with `args` and waits for it.
///
/// A non-zero exit is a [`ConverterError::ConversionFailed`] carrying the process
/// output. On timeout the process is killed.
pub async fn run_process(
    program: &Path,
    args: &[String],
    options: &ProcessOptions,
) -> Result<ProcessOutput, ConverterError> {
    debug!(program = %program.display(), ?args, "Running process");

    let (stdout_mode, stderr_mode) = if options.capture_output {
        (Stdio::piped(), Stdio::piped())
    } else {
        (Stdio::inherit(), Stdio::inherit())
    };

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(stdout_mode)
        .stderr(stderr_mode)
        .kill_on_drop(true);
    if let Some(cwd) = &options.cwd {
        command.current_dir(cwd);
    }

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConverterError::ConversionFailed {
                reason: format!("Command not found {}", program.display()),
                process: Some(ProcessOutput {
                    code: Some(COMMAND_NOT_FOUND),
                    ..Default::default()
                }),
            }
        } else {
            ConverterError::Io(e)
        }
    })?;

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    let wait = async {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let read_stdout = async {
            if let Some(pipe) = stdout_pipe.as_mut() {
                pipe.read_to_end(&mut stdout).await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let read_stderr = async {
            if let Some(pipe) = stderr_pipe.as_mut() {
                pipe.read_to_end(&mut stderr).await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let (out, err) = tokio::join!(read_stdout, read_stderr);
        out?;
        err?;
        let status = child.wait().await?;
        Ok::<_, std::io::Error>((status, stdout, stderr))
    };

    let result = match options.timeout {
        Some(limit) => match timeout(limit, wait).await {
            Ok(result) => result,
            Err(_) => {
                // Kill the process on timeout
                let _ = child.kill().await;
                return Err(ConverterError::Timeout { timeout: limit });
            }
        },
        None => wait.await,
    };

    let (status, stdout, stderr) = result?;
    let output = ProcessOutput {
        code: status.code(),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    };

    if !status.success() {
        return Err(ConverterError::process_failed(output));
    }

    Ok(output)
}

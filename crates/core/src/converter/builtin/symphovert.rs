//! Lotus Symphony documents saved as OpenDocument by driving the Symphony
//! window with keystrokes. Windows only, one file at a time.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::converter::base::{path_arg, ConverterBase};
use crate::converter::descriptor::ConverterDescriptor;
use crate::converter::error::ConverterError;
use crate::converter::placement::place_file;
use crate::converter::registry::ConverterType;
use crate::converter::traits::Converter;

static DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::new("symphovert", &["symphovert"], &["odt", "ods", "odp"])
        .platforms(&["windows"])
        .dependency("symphony", &["symphony"])
        .dependency("powershell", &["powershell", "pwsh"])
        .timeout_secs(120)
        .not_parallel_safe()
});

fn descriptor() -> &'static ConverterDescriptor {
    &DESCRIPTOR
}

fn build(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(SymphovertConverter { base })
}

pub const SYMPHOVERT: ConverterType = ConverterType::new(descriptor, build);

pub struct SymphovertConverter {
    base: ConverterBase,
}

/// Single-quoted PowerShell string literal.
fn ps_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Text typed as-is by `WScript.Shell.SendKeys`.
fn send_keys_literal(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '+' | '^' | '%' | '~' | '(' | ')' | '{' | '}' | '[' | ']' => {
                escaped.push('{');
                escaped.push(c);
                escaped.push('}');
            }
            c => escaped.push(c),
        }
    }
    escaped
}

/// Output name with only the last suffix replaced, `a.b.sym` becoming `a.b.odt`.
fn output_name(relative_path: &Path, output: &str) -> String {
    relative_path
        .with_extension(output)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Executable name without directory or extension, for either path separator.
fn process_name(executable: &str) -> &str {
    let name = executable.rsplit(['/', '\\']).next().unwrap_or(executable);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

impl SymphovertConverter {
    /// Starts Symphony, opens `source`, saves it as `destination` and closes
    /// every Symphony process. Symphony opens an extra menu after ctrl+o,
    /// escape closes it.
    fn script(symphony: &Path, source: &Path, destination: &Path) -> String {
        let executable = path_arg(symphony);
        let process = process_name(&executable);
        let keys = |text: &str| ps_quote(&format!("{}~", send_keys_literal(text)));
        [
            format!("Start-Process -FilePath {}", ps_quote(&executable)),
            "Start-Sleep -Seconds 2".to_string(),
            "$shell = New-Object -ComObject WScript.Shell".to_string(),
            "$shell.SendKeys('^o')".to_string(),
            "Start-Sleep -Milliseconds 1500".to_string(),
            format!("$shell.SendKeys({})", keys(&path_arg(source))),
            "Start-Sleep -Milliseconds 500".to_string(),
            "$shell.SendKeys('{ESC}')".to_string(),
            "Start-Sleep -Seconds 2".to_string(),
            "$shell.SendKeys('^+s')".to_string(),
            "Start-Sleep -Seconds 1".to_string(),
            format!("$shell.SendKeys({})", keys(&path_arg(destination))),
            "Start-Sleep -Seconds 2".to_string(),
            format!(
                "Stop-Process -Name {} -Force -ErrorAction SilentlyContinue",
                ps_quote(&format!("{process}*"))
            ),
        ]
        .join("\n")
    }

    fn arguments(script: String) -> Vec<String> {
        vec![
            "-NoProfile".to_string(),
            "-NonInteractive".to_string(),
            "-Command".to_string(),
            script,
        ]
    }
}

#[async_trait]
impl Converter for SymphovertConverter {
    fn descriptor(&self) -> &'static ConverterDescriptor {
        self.base.descriptor
    }

    async fn convert(
        &self,
        output_dir: &Path,
        output: &str,
        keep_relative_path: bool,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let output = self.base.output(output)?;
        let dest_dir = self.base.output_dir(output_dir, keep_relative_path)?;
        let dest_file = dest_dir.join(output_name(&self.base.file.relative_path, output));

        // Left over from an earlier run that saved but was not recorded.
        if dest_file.is_file() {
            debug!(path = %dest_file.display(), "Output already saved");
            return Ok(vec![dest_file]);
        }

        let tmp_dir = self.base.temp_dir(output_dir)?;
        let staged = tmp_dir.path().join(output_name(&self.base.file.relative_path, output));
        let script = Self::script(
            &self.base.executable("symphony")?,
            &self.base.input_path()?,
            &staged,
        );
        self.base
            .run("powershell", &Self::arguments(script), Some(tmp_dir.path()))
            .await?;

        if !staged.is_file() {
            return Err(ConverterError::conversion_failed("Output file was not saved"));
        }
        Ok(vec![place_file(&staged, &dest_file).await?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor() {
        let d = descriptor();
        assert!(d.matches("symphovert", "odt"));
        assert!(d.matches("symphovert", "ods"));
        assert!(d.matches("symphovert", "odp"));
        assert!(!d.matches("symphovert", "pdf"));
        assert!(!d.parallel_safe);
        assert!(d.platforms.supports("windows"));
        assert!(!d.platforms.supports("linux"));
        let names: Vec<_> = d.dependencies.iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["symphony", "powershell"]);
    }

    #[test]
    fn test_output_name_replaces_last_suffix() {
        assert_eq!(output_name(Path::new("docs/budget.1990.sym"), "ods"), "budget.1990.ods");
        assert_eq!(output_name(Path::new("letter"), "odt"), "letter.odt");
    }

    #[test]
    fn test_send_keys_escaping() {
        assert_eq!(send_keys_literal(r"C:\a\b.sym"), r"C:\a\b.sym");
        assert_eq!(send_keys_literal("a+b(1)~{x}"), "a{+}b{(}1{)}{~}{{}x{}}");
        assert_eq!(send_keys_literal("50%^[2]"), "50{%}{^}{[}2{]}");
    }

    #[test]
    fn test_process_name() {
        assert_eq!(process_name(r"C:\Program Files\Symphony\symphony.exe"), "symphony");
        assert_eq!(process_name("/opt/symphony/symphony"), "symphony");
        assert_eq!(process_name("symphony"), "symphony");
    }

    #[test]
    fn test_ps_quote() {
        assert_eq!(ps_quote("plain"), "'plain'");
        assert_eq!(ps_quote("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn test_script() {
        let script = SymphovertConverter::script(
            Path::new(r"C:\Symphony\symphony.exe"),
            Path::new(r"C:\archive\it's (1).sym"),
            Path::new(r"C:\out\x.odt"),
        );
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(lines[0], r"Start-Process -FilePath 'C:\Symphony\symphony.exe'");
        assert!(lines.contains(&r"$shell.SendKeys('C:\archive\it''s {(}1{)}.sym~')"));
        assert!(lines.contains(&r"$shell.SendKeys('C:\out\x.odt~')"));
        assert_eq!(
            lines.last().copied(),
            Some("Stop-Process -Name 'symphony*' -Force -ErrorAction SilentlyContinue")
        );
        let open = lines.iter().position(|l| *l == "$shell.SendKeys('^o')").unwrap();
        let save = lines.iter().position(|l| *l == "$shell.SendKeys('^+s')").unwrap();
        assert!(open < save);
    }

    #[test]
    fn test_arguments() {
        let args = SymphovertConverter::arguments("Start-Sleep 1".to_string());
        assert_eq!(args, vec!["-NoProfile", "-NonInteractive", "-Command", "Start-Sleep 1"]);
    }
}

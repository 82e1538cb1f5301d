//! `standalone`: convert files directly, without a catalog.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use clap::Args;
use tracing::{error, info};

use convertool_core::catalog::{ConvertAction, ConvertOptions, SourceFile};
use convertool_core::converter::{ConverterContext, TimeoutPolicy};
use convertool_core::instruction::{original_file_instruction, ConvertInstruction};
use convertool_core::Registry;

#[derive(Args, Debug)]
pub struct StandaloneCommand {
    /// Conversion tool
    tool: String,

    /// Output format
    output: String,

    /// Directory converted files are written to
    destination: PathBuf,

    /// Files to convert
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Converter option (repeatable)
    #[arg(long = "option", short = 'o', num_args = 2, value_names = ["KEY", "VALUE"])]
    options: Vec<String>,

    /// Override converter timeouts, 0 disables them
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Common parent of the files; their paths below it are kept in the output
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,
}

impl StandaloneCommand {
    fn convert_options(&self) -> ConvertOptions {
        self.options
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect()
    }

    /// Source record for `path`: relative to `root` when given, else just its name.
    fn source_file(&self, path: &Path, root: Option<&Path>) -> Result<SourceFile> {
        let (relative_path, file_root) = match root {
            Some(root) => {
                let relative = path
                    .strip_prefix(root)
                    .with_context(|| {
                        format!("{} is not a parent of {}", root.display(), path.display())
                    })?
                    .to_path_buf();
                (relative, root.to_path_buf())
            }
            None => {
                let name = path
                    .file_name()
                    .with_context(|| format!("{} is not a file", path.display()))?;
                let parent = path.parent().unwrap_or_else(|| Path::new("."));
                (PathBuf::from(name), parent.to_path_buf())
            }
        };

        let mut action = ConvertAction::new(&self.tool, &self.output);
        let options = self.convert_options();
        if !options.is_empty() {
            action.options = Some(options);
        }
        Ok(SourceFile::original(relative_path)
            .with_root(file_root)
            .with_convert(action))
    }

    fn instructions(&self, registry: &Registry) -> Result<Vec<ConvertInstruction>> {
        let root = self
            .root
            .as_deref()
            .map(std::path::absolute)
            .transpose()
            .context("Invalid root")?;

        let mut instructions = Vec::with_capacity(self.files.len());
        for path in &self.files {
            let path = std::path::absolute(path)
                .with_context(|| format!("Invalid path {}", path.display()))?;
            if !path.is_file() {
                bail!("{} is not a file", path.display());
            }
            let file = self.source_file(&path, root.as_deref())?;
            instructions.push(original_file_instruction(file, registry)?);
        }
        Ok(instructions)
    }

    pub async fn execute(self, verbose: bool) -> Result<()> {
        let registry = Registry::builtin();
        let instructions = self.instructions(&registry)?;

        std::fs::create_dir_all(&self.destination).with_context(|| {
            format!("Failed to create destination {}", self.destination.display())
        })?;
        let destination = std::path::absolute(&self.destination)?;

        let mut failed = 0;
        for instruction in instructions {
            let file = instruction.file;
            let relative = file.relative_path.clone();
            let mut context = ConverterContext::new()
                .with_options(instruction.options)
                .with_timeout(TimeoutPolicy::from_secs(self.timeout));
            context.capture_output = !verbose;

            info!("<-- {}", relative.display());
            let converter = instruction.converter.build(file, None, context)?;
            match converter
                .convert(&destination, &instruction.output, true)
                .await
            {
                Ok(outputs) => {
                    for output in outputs {
                        let shown = output.strip_prefix(&destination).unwrap_or(&output);
                        info!("--> {}", shown.display());
                        println!("{}", shown.display());
                    }
                }
                Err(e) => {
                    failed += 1;
                    error!(error = e.name(), "{}: {}", relative.display(), e);
                    if let Some(streams) = e.process().and_then(|p| p.streams()) {
                        error!("{}", streams);
                    }
                }
            }
        }

        if failed > 0 {
            bail!("{} file(s) failed to convert", failed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        command: StandaloneCommand,
    }

    fn parse(args: &[&str]) -> StandaloneCommand {
        let mut argv = vec!["standalone"];
        argv.extend_from_slice(args);
        Wrapper::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn test_parse_options_as_pairs() {
        let cmd = parse(&[
            "zipfile", "zip", "out", "a.zip", "--option", "path", "docs/x.txt", "-o", "k", "v",
        ]);
        let options = cmd.convert_options();
        assert_eq!(options.get("path").map(String::as_str), Some("docs/x.txt"));
        assert_eq!(options.get("k").map(String::as_str), Some("v"));
    }

    #[test]
    fn test_files_are_required() {
        let result = Wrapper::try_parse_from(["standalone", "copy", "copy", "out"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_source_file_relative_to_root() {
        let cmd = parse(&["copy", "copy", "out", "x"]);
        let file = cmd
            .source_file(Path::new("/data/scans/a/b.tif"), Some(Path::new("/data/scans")))
            .unwrap();
        assert_eq!(file.relative_path, PathBuf::from("a/b.tif"));
        assert_eq!(file.root, Some(PathBuf::from("/data/scans")));

        let file = cmd.source_file(Path::new("/data/scans/a/b.tif"), None).unwrap();
        assert_eq!(file.relative_path, PathBuf::from("b.tif"));
        assert_eq!(file.root, Some(PathBuf::from("/data/scans/a")));

        assert!(cmd
            .source_file(Path::new("/elsewhere/b.tif"), Some(Path::new("/data/scans")))
            .is_err());
    }

    #[tokio::test]
    async fn test_copy_keeps_relative_path() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        std::fs::create_dir_all(src.path().join("sub")).unwrap();
        std::fs::write(src.path().join("sub/a.txt"), b"abc").unwrap();

        let cmd = parse(&[
            "copy",
            "copy",
            dst.path().to_str().unwrap(),
            src.path().join("sub/a.txt").to_str().unwrap(),
            "--root",
            src.path().to_str().unwrap(),
        ]);
        cmd.execute(false).await.unwrap();
        assert_eq!(std::fs::read(dst.path().join("sub/a.txt")).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_unknown_converter_fails() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        std::fs::write(src.path().join("a.txt"), b"abc").unwrap();

        let cmd = parse(&[
            "nope",
            "pdf",
            dst.path().to_str().unwrap(),
            src.path().join("a.txt").to_str().unwrap(),
        ]);
        assert!(cmd.execute(false).await.is_err());
    }
}

//! Extracts a single member from a ZIP archive.

use std::fs::File;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::converter::base::ConverterBase;
use crate::converter::descriptor::ConverterDescriptor;
use crate::converter::error::ConverterError;
use crate::converter::placement::place_file;
use crate::converter::registry::ConverterType;
use crate::converter::traits::Converter;

static DESCRIPTOR: Lazy<ConverterDescriptor> =
    Lazy::new(|| ConverterDescriptor::new("zipfile", &["zipfile"], &[]).any_output());

fn descriptor() -> &'static ConverterDescriptor {
    &DESCRIPTOR
}

fn build(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(ZipFileConverter { base })
}

pub const ZIPFILE: ConverterType = ConverterType::new(descriptor, build);

/// Option naming the member to extract.
pub const PATH_OPTION: &str = "path";

pub struct ZipFileConverter {
    base: ConverterBase,
}

/// Validates a member path: relative, without `..` or root components.
fn member_path(raw: &str) -> Result<PathBuf, ConverterError> {
    let path = PathBuf::from(raw.replace('\\', "/"));
    if path.is_absolute() || raw.starts_with('/') {
        return Err(ConverterError::bad_option(
            PATH_OPTION,
            "Absolute paths are not supported.",
        ));
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(ConverterError::bad_option(
                    PATH_OPTION,
                    "Paths outside the archive are not supported.",
                ))
            }
        }
    }
    if path.file_name().is_none() {
        return Err(ConverterError::bad_option(PATH_OPTION, "Path names no file."));
    }
    Ok(path)
}

fn extract_member(archive: &Path, member: &Path, destination: &Path) -> Result<(), ConverterError> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| ConverterError::conversion_failed(format!("Cannot read ZIP file: {e}")))?;

    let name = member.to_string_lossy().replace('\\', "/");
    let mut entry = zip.by_name(&name).map_err(|e| match e {
        zip::result::ZipError::FileNotFound => {
            ConverterError::conversion_failed(format!("{name} is not in ZIP file."))
        }
        other => ConverterError::conversion_failed(format!("Cannot read {name}: {other}")),
    })?;
    if entry.is_dir() {
        return Err(ConverterError::conversion_failed(format!(
            "{name} is a directory."
        )));
    }

    let mut out = File::create(destination)?;
    std::io::copy(&mut entry, &mut out)?;
    Ok(())
}

#[async_trait]
impl Converter for ZipFileConverter {
    fn descriptor(&self) -> &'static ConverterDescriptor {
        self.base.descriptor
    }

    async fn convert(
        &self,
        output_dir: &Path,
        _output: &str,
        keep_relative_path: bool,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let member = member_path(self.base.require_option(PATH_OPTION)?)?;
        let file_name = member.file_name().map(PathBuf::from).unwrap_or_default();
        let dest_dir = self.base.output_dir(output_dir, keep_relative_path)?;
        let dest_file = dest_dir.join(&file_name);

        let tmp_dir = self.base.temp_dir(output_dir)?;
        let staged = tmp_dir.path().join(&file_name);
        let archive = self.base.input_path()?;
        let target = staged.clone();
        tokio::task::spawn_blocking(move || extract_member(&archive, &member, &target))
            .await
            .map_err(|e| ConverterError::conversion_failed(format!("Extraction failed: {e}")))??;

        Ok(vec![place_file(&staged, &dest_file).await?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SourceFile;
    use crate::converter::base::ConverterContext;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("inner/readme.txt", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"inside").unwrap();
        zip.finish().unwrap();
    }

    fn context(path: Option<&str>) -> ConverterContext {
        let mut context = ConverterContext::new();
        if let Some(path) = path {
            context.options.insert(PATH_OPTION.to_string(), path.to_string());
        }
        context
    }

    #[test]
    fn test_member_path_validation() {
        assert!(member_path("a/b.txt").is_ok());
        assert!(member_path("/etc/passwd").is_err());
        assert!(member_path("../escape.txt").is_err());
        assert!(member_path("a/../../b").is_err());
    }

    #[tokio::test]
    async fn test_extracts_member() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write_zip(&src.path().join("bundle.zip"));

        let converter = ZIPFILE
            .build(
                SourceFile::original("bundle.zip"),
                Some(src.path()),
                context(Some("inner/readme.txt")),
            )
            .unwrap();
        let outputs = converter.convert(dst.path(), "any", true).await.unwrap();

        assert_eq!(outputs, vec![dst.path().join("readme.txt")]);
        assert_eq!(std::fs::read(&outputs[0]).unwrap(), b"inside");
    }

    #[tokio::test]
    async fn test_missing_member_and_option() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write_zip(&src.path().join("bundle.zip"));

        let converter = ZIPFILE
            .build(
                SourceFile::original("bundle.zip"),
                Some(src.path()),
                context(Some("nope.txt")),
            )
            .unwrap();
        let err = converter.convert(dst.path(), "any", true).await.unwrap_err();
        assert_eq!(err.to_string(), "nope.txt is not in ZIP file.");

        let converter = ZIPFILE
            .build(SourceFile::original("bundle.zip"), Some(src.path()), context(None))
            .unwrap();
        let err = converter.convert(dst.path(), "any", true).await.unwrap_err();
        assert!(matches!(err, ConverterError::BadOption { .. }));

        assert_eq!(std::fs::read_dir(dst.path()).unwrap().count(), 0);
    }
}

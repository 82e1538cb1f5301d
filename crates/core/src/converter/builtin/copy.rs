//! Copies the source file unchanged.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::converter::base::ConverterBase;
use crate::converter::descriptor::ConverterDescriptor;
use crate::converter::error::ConverterError;
use crate::converter::placement::place_file;
use crate::converter::registry::ConverterType;
use crate::converter::traits::Converter;

static DESCRIPTOR: Lazy<ConverterDescriptor> =
    Lazy::new(|| ConverterDescriptor::new("copy", &["copy"], &["copy"]));

fn descriptor() -> &'static ConverterDescriptor {
    &DESCRIPTOR
}

fn build(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(CopyConverter { base })
}

pub const COPY: ConverterType = ConverterType::new(descriptor, build);

pub struct CopyConverter {
    base: ConverterBase,
}

#[async_trait]
impl Converter for CopyConverter {
    fn descriptor(&self) -> &'static ConverterDescriptor {
        self.base.descriptor
    }

    async fn convert(
        &self,
        output_dir: &Path,
        output: &str,
        keep_relative_path: bool,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        self.base.output(output)?;
        let dest_dir = self.base.output_dir(output_dir, keep_relative_path)?;
        let dest_file = dest_dir.join(self.base.file.name());

        let tmp_dir = self.base.temp_dir(output_dir)?;
        let staged = tmp_dir.path().join(self.base.file.name());
        tokio::fs::copy(self.base.input_path()?, &staged).await?;

        Ok(vec![place_file(&staged, &dest_file).await?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SourceFile;
    use crate::converter::base::ConverterContext;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_copy_keeps_name_and_relative_path() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        std::fs::create_dir_all(src.path().join("a/b")).unwrap();
        std::fs::write(src.path().join("a/b/data.bin"), b"payload").unwrap();

        let converter = COPY
            .build(
                SourceFile::original("a/b/data.bin"),
                Some(src.path()),
                ConverterContext::new(),
            )
            .unwrap();
        let outputs = converter.convert(dst.path(), "copy", true).await.unwrap();

        let expected = dst.path().join("a/b/data.bin");
        assert_eq!(outputs, vec![expected.clone()]);
        assert_eq!(std::fs::read(expected).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_copy_leaves_no_scratch_directory() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        std::fs::write(src.path().join("x.txt"), b"x").unwrap();

        let converter = COPY
            .build(
                SourceFile::original("x.txt"),
                Some(src.path()),
                ConverterContext::new(),
            )
            .unwrap();
        converter.convert(dst.path(), "copy", false).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dst.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("x.txt")]);
    }
}

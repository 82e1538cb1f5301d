//! CAD drawings exported with ABViewer. Windows only.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::converter::base::{path_arg, ConverterBase};
use crate::converter::descriptor::ConverterDescriptor;
use crate::converter::error::ConverterError;
use crate::converter::placement::{list_files, place_all};
use crate::converter::registry::ConverterType;
use crate::converter::traits::Converter;

static DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::new("cad", &["cad"], &["dxf", "pdf", "svg"])
        .platforms(&["windows"])
        .dependency("abviewer", &["ABViewer"])
        .timeout_secs(120)
        .not_parallel_safe()
});

fn descriptor() -> &'static ConverterDescriptor {
    &DESCRIPTOR
}

fn build(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(CadConverter { base })
}

pub const CAD: ConverterType = ConverterType::new(descriptor, build);

pub struct CadConverter {
    base: ConverterBase,
}

impl CadConverter {
    fn arguments(output: &str, tmp_dir: &Path, input: &Path) -> Vec<String> {
        vec![
            "/c".to_string(),
            output.to_string(),
            format!("dir={}", path_arg(tmp_dir)),
            path_arg(input),
        ]
    }
}

#[async_trait]
impl Converter for CadConverter {
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

        let tmp_dir = self.base.temp_dir(output_dir)?;
        let args = Self::arguments(output, tmp_dir.path(), &self.base.input_path()?);
        let process = self.base.run("abviewer", &args, None).await?;

        if list_files(tmp_dir.path()).await?.is_empty() {
            return Err(ConverterError::process_failed(process));
        }
        place_all(tmp_dir.path(), &dest_dir).await
    }
}

//! Microsoft Document Imaging files converted with mdi2tif. Windows only.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tracing::warn;

use super::chain::ChainConverter;
use super::image::{image_descriptor, image_puid, IMAGE};
use crate::converter::base::{path_arg, ConverterBase};
use crate::converter::descriptor::ConverterDescriptor;
use crate::converter::error::ConverterError;
use crate::converter::placement::place_file;
use crate::converter::registry::ConverterType;
use crate::converter::traits::Converter;

static MDI_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::new("mdi", &["mdi"], &["tif"])
        .platforms(&["windows"])
        .dependency("mdi2tif", &["mdi2tif"])
        .timeout_secs(120)
});

static MDI_TO_PDF_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::composite(
        "mdi-to-pdf",
        &["mdi"],
        &["pdf"],
        &[mdi_descriptor(), image_descriptor()],
    )
});

fn mdi_descriptor() -> &'static ConverterDescriptor {
    &MDI_DESCRIPTOR
}

fn mdi_to_pdf_descriptor() -> &'static ConverterDescriptor {
    &MDI_TO_PDF_DESCRIPTOR
}

fn build_mdi(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(MdiConverter { base })
}

fn build_mdi_to_pdf(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(ChainConverter::new(base, MDI, "tif", IMAGE, image_puid))
}

pub const MDI: ConverterType = ConverterType::new(mdi_descriptor, build_mdi);
pub const MDI_TO_PDF: ConverterType = ConverterType::new(mdi_to_pdf_descriptor, build_mdi_to_pdf);

pub struct MdiConverter {
    base: ConverterBase,
}

impl MdiConverter {
    fn arguments(input: &Path, tmp_file: &Path, log: &Path) -> Vec<String> {
        vec![
            "--source".to_string(),
            path_arg(input),
            "--dest".to_string(),
            path_arg(tmp_file),
            "--log".to_string(),
            path_arg(log),
        ]
    }
}

#[async_trait]
impl Converter for MdiConverter {
    fn descriptor(&self) -> &'static ConverterDescriptor {
        self.base.descriptor
    }

    fn output_puid(&self, output: &str) -> Option<&'static str> {
        image_puid(output)
    }

    async fn convert(
        &self,
        output_dir: &Path,
        output: &str,
        keep_relative_path: bool,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let output = self.base.output(output)?;
        let dest_dir = self.base.output_dir(output_dir, keep_relative_path)?;
        let dest_file = self.base.output_file(&dest_dir, output);

        let tmp_dir = self.base.temp_dir(output_dir)?;
        let tmp_file = tmp_dir.path().join(dest_file.file_name().unwrap_or_default());
        let log = tmp_dir.path().join("log.txt");
        let args = Self::arguments(&self.base.input_path()?, &tmp_file, &log);
        self.base.run("mdi2tif", &args, None).await?;

        if !self.base.context.capture_output {
            if let Ok(text) = tokio::fs::read_to_string(&log).await {
                let text = text.trim();
                if !text.is_empty() {
                    warn!(converter = self.base.name(), log = text, "mdi2tif log");
                }
            }
        }

        if !tmp_file.is_file() {
            return Err(ConverterError::conversion_failed("Could not convert file."));
        }
        Ok(vec![place_file(&tmp_file, &dest_file).await?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments() {
        let args = MdiConverter::arguments(
            Path::new("C:/in/scan.mdi"),
            Path::new("C:/t/scan.tif"),
            Path::new("C:/t/log.txt"),
        );
        assert_eq!(
            args,
            vec!["--source", "C:/in/scan.mdi", "--dest", "C:/t/scan.tif", "--log", "C:/t/log.txt"]
        );
    }

    #[test]
    fn test_tiff_alias_and_pdf_composite() {
        assert!(MDI.matches("mdi", "tiff"));
        assert!(!MDI.matches("mdi", "pdf"));
        assert!(MDI_TO_PDF.matches("mdi", "pdf"));

        let d = mdi_to_pdf_descriptor();
        assert!(d.platforms.supports("windows"));
        assert!(!d.platforms.supports("linux"));
        let names: Vec<_> = d.dependencies.iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["mdi2tif", "imagemagick"]);
        assert_eq!(d.process_timeout, Some(std::time::Duration::from_secs(180)));
    }
}

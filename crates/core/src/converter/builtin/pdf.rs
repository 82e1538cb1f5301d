//! PDF to PDF/A with Ghostscript.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::converter::base::{path_arg, ConverterBase};
use crate::converter::descriptor::ConverterDescriptor;
use crate::converter::error::ConverterError;
use crate::converter::placement::place_file;
use crate::converter::registry::ConverterType;
use crate::converter::traits::Converter;

static DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::new("pdf", &["pdf"], &["pdfa-1", "pdfa-2", "pdfa-3"])
        .dependency("ghostscript", &["gs", "gswin64c", "gswin32c"])
        .timeout_secs(600)
});

fn descriptor() -> &'static ConverterDescriptor {
    &DESCRIPTOR
}

fn build(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(PdfConverter { base })
}

pub const PDF: ConverterType = ConverterType::new(descriptor, build);

pub struct PdfConverter {
    base: ConverterBase,
}

impl PdfConverter {
    /// PDF/A conformance level for an output name.
    fn pdfa_level(output: &str) -> Option<u8> {
        match output {
            "pdfa-1" => Some(1),
            "pdfa-2" => Some(2),
            "pdfa-3" => Some(3),
            _ => None,
        }
    }

    /// Ghostscript arguments writing `dest_name` in the working directory.
    pub fn arguments(output: &str, dest_name: &str, input: &Path) -> Vec<String> {
        let mut args = vec![
            "-dNOSAFER".to_string(),
            "-dNOPAUSE".to_string(),
            "-dBATCH".to_string(),
            "-sDEVICE=pdfwrite".to_string(),
            "-sColorConversionStrategy=UseDeviceIndependentColor".to_string(),
            format!("-sOutputFile={dest_name}"),
        ];
        if let Some(level) = Self::pdfa_level(output) {
            args.push(format!("-dPDFA={level}"));
            args.push("-dPDFACompatibilityPolicy=1".to_string());
        }
        args.push(path_arg(input));
        args
    }
}

#[async_trait]
impl Converter for PdfConverter {
    fn descriptor(&self) -> &'static ConverterDescriptor {
        self.base.descriptor
    }

    fn output_puid(&self, output: &str) -> Option<&'static str> {
        match output {
            "pdfa-1" => Some("fmt/354"),
            "pdfa-2" => Some("fmt/477"),
            "pdfa-3" => Some("fmt/480"),
            _ => None,
        }
    }

    async fn convert(
        &self,
        output_dir: &Path,
        output: &str,
        keep_relative_path: bool,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let output = self.base.output(output)?;
        let dest_dir = self.base.output_dir(output_dir, keep_relative_path)?;
        let dest_file = self.base.output_file(&dest_dir, "pdf");
        let dest_name = dest_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let args = Self::arguments(output, &dest_name, &self.base.input_path()?);
        let tmp_dir = self.base.temp_dir(output_dir)?;
        self.base
            .run("ghostscript", &args, Some(tmp_dir.path()))
            .await?;

        Ok(vec![
            place_file(&tmp_dir.path().join(&dest_name), &dest_file).await?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdfa_flags_for_every_level() {
        for (output, flag) in [
            ("pdfa-1", "-dPDFA=1"),
            ("pdfa-2", "-dPDFA=2"),
            ("pdfa-3", "-dPDFA=3"),
        ] {
            let args = PdfConverter::arguments(output, "x.pdf", Path::new("/in/x.pdf"));
            assert!(args.contains(&flag.to_string()), "{output}: {args:?}");
            assert!(args.contains(&"-dPDFACompatibilityPolicy=1".to_string()));
            assert_eq!(args.last().unwrap(), "/in/x.pdf");
        }
    }

    #[test]
    fn test_output_file_argument() {
        let args = PdfConverter::arguments("pdfa-2", "report.pdf", Path::new("report.pdf"));
        assert!(args.contains(&"-sOutputFile=report.pdf".to_string()));
        assert!(args.contains(&"-sDEVICE=pdfwrite".to_string()));
    }
}

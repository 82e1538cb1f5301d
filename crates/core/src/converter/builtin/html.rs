//! HTML pages printed to PDF with a headless Chromium.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use super::chain::ChainConverter;
use super::image::{image_puid, pdf_to_image_descriptor, PDF_TO_IMAGE, RASTER_OUTPUTS};
use crate::converter::base::{path_arg, ConverterBase};
use crate::converter::descriptor::ConverterDescriptor;
use crate::converter::error::ConverterError;
use crate::converter::placement::place_file;
use crate::converter::registry::ConverterType;
use crate::converter::traits::Converter;

static HTML_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::new("html", &["html", "browser"], &["pdf"])
        .dependency(
            "chromium",
            &["chromium", "chromium-browser", "google-chrome", "chrome"],
        )
        .timeout_secs(60)
});

static HTML_TO_IMAGE_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::composite(
        "html-to-image",
        &["html", "browser"],
        RASTER_OUTPUTS,
        &[html_descriptor(), pdf_to_image_descriptor()],
    )
});

pub(crate) fn html_descriptor() -> &'static ConverterDescriptor {
    &HTML_DESCRIPTOR
}

pub(crate) fn html_to_image_descriptor() -> &'static ConverterDescriptor {
    &HTML_TO_IMAGE_DESCRIPTOR
}

fn build_html(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(HtmlConverter { base })
}

fn build_html_to_image(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(ChainConverter::new(base, HTML, "pdf", PDF_TO_IMAGE, image_puid))
}

pub const HTML: ConverterType = ConverterType::new(html_descriptor, build_html);
pub const HTML_TO_IMAGE: ConverterType =
    ConverterType::new(html_to_image_descriptor, build_html_to_image);

pub struct HtmlConverter {
    base: ConverterBase,
}

impl HtmlConverter {
    fn arguments(pdf: &Path, input: &Path) -> Vec<String> {
        vec![
            "--headless".to_string(),
            "--no-sandbox".to_string(),
            format!("--print-to-pdf={}", path_arg(pdf)),
            "--no-pdf-header-footer".to_string(),
            path_arg(input),
        ]
    }
}

#[async_trait]
impl Converter for HtmlConverter {
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
        let dest_file = self.base.output_file(&dest_dir, output);

        let tmp_dir = self.base.temp_dir(output_dir)?;
        let tmp_file = tmp_dir.path().join("output.pdf");
        let args = Self::arguments(&tmp_file, &self.base.input_path()?);
        self.base
            .run("chromium", &args, Some(tmp_dir.path()))
            .await?;

        if !tmp_file.is_file() {
            return Err(ConverterError::conversion_failed(
                "Browser did not produce a PDF",
            ));
        }
        Ok(vec![place_file(&tmp_file, &dest_file).await?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments() {
        let args = HtmlConverter::arguments(Path::new("/t/output.pdf"), Path::new("/a/p.html"));
        assert_eq!(args[2], "--print-to-pdf=/t/output.pdf");
        assert_eq!(args.last().unwrap(), "/a/p.html");
    }

    #[test]
    fn test_html_to_image_shares_requirements() {
        let d = html_to_image_descriptor();
        let names: Vec<_> = d.dependencies.iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["chromium", "imagemagick"]);
        assert_eq!(d.process_timeout, Some(std::time::Duration::from_secs(180)));
        assert!(!d.matches("html", "pdf"));
    }
}

//! Office documents, presentations and spreadsheets converted with LibreOffice.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use super::chain::ChainConverter;
use super::image::{image_puid, pdf_to_image_descriptor, PDF_TO_IMAGE, RASTER_OUTPUTS};
use crate::converter::base::{path_arg, ConverterBase};
use crate::converter::descriptor::ConverterDescriptor;
use crate::converter::error::ConverterError;
use crate::converter::placement::{list_files, place_all};
use crate::converter::registry::ConverterType;
use crate::converter::traits::Converter;

const LIBREOFFICE: &[&str] = &["libreoffice", "soffice"];

static DOCUMENT_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::new("document", &["document"], &["odt", "pdf", "html"])
        .dependency("libreoffice", LIBREOFFICE)
        .timeout_secs(60)
});

static PRESENTATION_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::new("presentation", &["presentation"], &["odp", "pdf"])
        .dependency("libreoffice", LIBREOFFICE)
        .timeout_secs(60)
});

static SPREADSHEET_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::new("spreadsheet", &["spreadsheet"], &["ods", "pdf", "html"])
        .dependency("libreoffice", LIBREOFFICE)
        .timeout_secs(60)
});

static DOCUMENT_TO_IMAGE_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::composite(
        "document-to-image",
        &["document"],
        RASTER_OUTPUTS,
        &[document_descriptor(), pdf_to_image_descriptor()],
    )
});

static PRESENTATION_TO_IMAGE_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::composite(
        "presentation-to-image",
        &["presentation"],
        RASTER_OUTPUTS,
        &[presentation_descriptor(), pdf_to_image_descriptor()],
    )
});

static SPREADSHEET_TO_IMAGE_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::composite(
        "spreadsheet-to-image",
        &["spreadsheet"],
        RASTER_OUTPUTS,
        &[spreadsheet_descriptor(), pdf_to_image_descriptor()],
    )
});

fn document_descriptor() -> &'static ConverterDescriptor {
    &DOCUMENT_DESCRIPTOR
}

fn presentation_descriptor() -> &'static ConverterDescriptor {
    &PRESENTATION_DESCRIPTOR
}

fn spreadsheet_descriptor() -> &'static ConverterDescriptor {
    &SPREADSHEET_DESCRIPTOR
}

fn document_to_image_descriptor() -> &'static ConverterDescriptor {
    &DOCUMENT_TO_IMAGE_DESCRIPTOR
}

fn presentation_to_image_descriptor() -> &'static ConverterDescriptor {
    &PRESENTATION_TO_IMAGE_DESCRIPTOR
}

fn spreadsheet_to_image_descriptor() -> &'static ConverterDescriptor {
    &SPREADSHEET_TO_IMAGE_DESCRIPTOR
}

fn build_libreoffice(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(LibreOfficeConverter { base })
}

fn build_document_to_image(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(ChainConverter::new(base, DOCUMENT, "pdf", PDF_TO_IMAGE, image_puid))
}

fn build_presentation_to_image(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(ChainConverter::new(
        base,
        PRESENTATION,
        "pdf",
        PDF_TO_IMAGE,
        image_puid,
    ))
}

fn build_spreadsheet_to_image(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(ChainConverter::new(
        base,
        SPREADSHEET,
        "pdf",
        PDF_TO_IMAGE,
        image_puid,
    ))
}

pub const DOCUMENT: ConverterType = ConverterType::new(document_descriptor, build_libreoffice);
pub const PRESENTATION: ConverterType =
    ConverterType::new(presentation_descriptor, build_libreoffice);
pub const SPREADSHEET: ConverterType =
    ConverterType::new(spreadsheet_descriptor, build_libreoffice);
pub const DOCUMENT_TO_IMAGE: ConverterType =
    ConverterType::new(document_to_image_descriptor, build_document_to_image);
pub const PRESENTATION_TO_IMAGE: ConverterType =
    ConverterType::new(presentation_to_image_descriptor, build_presentation_to_image);
pub const SPREADSHEET_TO_IMAGE: ConverterType =
    ConverterType::new(spreadsheet_to_image_descriptor, build_spreadsheet_to_image);

/// `file://` URL for a local path, as LibreOffice expects for `-env:` settings.
fn file_url(path: &Path) -> String {
    let text = path_arg(path).replace('\\', "/").replace(' ', "%20");
    if text.starts_with('/') {
        format!("file://{text}")
    } else {
        format!("file:///{text}")
    }
}

/// Runs `soffice --convert-to` with a private user profile, so several
/// conversions can run side by side.
pub struct LibreOfficeConverter {
    base: ConverterBase,
}

impl LibreOfficeConverter {
    fn arguments(profile: &Path, output: &str, out_dir: &Path, input: &Path) -> Vec<String> {
        vec![
            format!("-env:UserInstallation={}", file_url(profile)),
            "--headless".to_string(),
            "--convert-to".to_string(),
            output.to_string(),
            "--outdir".to_string(),
            path_arg(out_dir),
            path_arg(input),
        ]
    }
}

#[async_trait]
impl Converter for LibreOfficeConverter {
    fn descriptor(&self) -> &'static ConverterDescriptor {
        self.base.descriptor
    }

    fn output_puid(&self, output: &str) -> Option<&'static str> {
        match output {
            "html" => Some("fmt/471"),
            "odt" => Some("fmt/290"),
            "odp" => Some("fmt/293"),
            "ods" => Some("fmt/295"),
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

        let tmp_dir = self.base.temp_dir(output_dir)?;
        let out_dir = tmp_dir.path().join("out");
        tokio::fs::create_dir_all(&out_dir).await?;
        let args = Self::arguments(
            &tmp_dir.path().join("profile"),
            output,
            &out_dir,
            &self.base.input_path()?,
        );
        let process = self.base.run("libreoffice", &args, None).await?;

        // LibreOffice exits successfully even when it cannot load the file.
        if list_files(&out_dir).await?.is_empty() {
            return Err(ConverterError::process_failed(process));
        }
        place_all(&out_dir, &dest_dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments() {
        let args = LibreOfficeConverter::arguments(
            Path::new("/tmp/x/profile"),
            "pdf",
            Path::new("/tmp/x/out"),
            Path::new("/a/My Report.docx"),
        );
        assert_eq!(args[0], "-env:UserInstallation=file:///tmp/x/profile");
        assert_eq!(
            &args[1..],
            &[
                "--headless",
                "--convert-to",
                "pdf",
                "--outdir",
                "/tmp/x/out",
                "/a/My Report.docx"
            ]
        );
    }

    #[test]
    fn test_file_url_escapes_spaces() {
        assert_eq!(file_url(Path::new("/a b/c")), "file:///a%20b/c");
    }

    #[test]
    fn test_image_composites_do_not_shadow_pdf() {
        assert!(DOCUMENT.matches("document", "pdf"));
        assert!(!DOCUMENT_TO_IMAGE.matches("document", "pdf"));
        assert!(DOCUMENT_TO_IMAGE.matches("document", "png"));
        assert!(SPREADSHEET_TO_IMAGE.matches("spreadsheet", "jpeg"));
    }
}

//! XSLT transformation of XML files with xmlstarlet, and MedCom messages
//! rendered through their viewer stylesheet. Both can continue through the
//! browser to PDF or images.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use super::chain::ChainConverter;
use super::html::{html_descriptor, html_to_image_descriptor, HTML, HTML_TO_IMAGE};
use super::image::{image_puid, RASTER_OUTPUTS};
use crate::converter::base::{path_arg, ConverterBase};
use crate::converter::descriptor::ConverterDescriptor;
use crate::converter::error::ConverterError;
use crate::converter::placement::place_file;
use crate::converter::registry::ConverterType;
use crate::converter::traits::Converter;

static XSLT_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::new("xslt", &["xslt"], &["html", "xml"])
        .dependency("xmlstarlet", &["xmlstarlet", "xml"])
        .timeout_secs(10)
});

static XSLT_TO_PDF_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::composite(
        "xslt-to-pdf",
        &["xslt"],
        &["pdf"],
        &[xslt_descriptor(), html_descriptor()],
    )
});

static XSLT_TO_IMAGE_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::composite(
        "xslt-to-image",
        &["xslt"],
        RASTER_OUTPUTS,
        &[xslt_descriptor(), html_to_image_descriptor()],
    )
});

static MEDCOM_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::new("medcom", &["medcom"], &["html"])
        .dependency("xmlstarlet", &["xmlstarlet", "xml"])
        .timeout_secs(10)
});

static MEDCOM_TO_PDF_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::composite(
        "medcom-to-pdf",
        &["medcom"],
        &["pdf"],
        &[medcom_descriptor(), html_descriptor()],
    )
});

static MEDCOM_TO_IMAGE_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::composite(
        "medcom-to-image",
        &["medcom"],
        RASTER_OUTPUTS,
        &[medcom_descriptor(), html_to_image_descriptor()],
    )
});

fn xslt_descriptor() -> &'static ConverterDescriptor {
    &XSLT_DESCRIPTOR
}

fn xslt_to_pdf_descriptor() -> &'static ConverterDescriptor {
    &XSLT_TO_PDF_DESCRIPTOR
}

fn xslt_to_image_descriptor() -> &'static ConverterDescriptor {
    &XSLT_TO_IMAGE_DESCRIPTOR
}

fn medcom_descriptor() -> &'static ConverterDescriptor {
    &MEDCOM_DESCRIPTOR
}

fn medcom_to_pdf_descriptor() -> &'static ConverterDescriptor {
    &MEDCOM_TO_PDF_DESCRIPTOR
}

fn medcom_to_image_descriptor() -> &'static ConverterDescriptor {
    &MEDCOM_TO_IMAGE_DESCRIPTOR
}

fn build_xslt(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(XslConverter {
        base,
        stylesheet: Stylesheet::Option(XSL_OPTION),
    })
}

fn build_medcom(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(XslConverter {
        base,
        stylesheet: Stylesheet::Required(MEDCOM_STYLESHEET_OPTION),
    })
}

fn build_xslt_to_pdf(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(ChainConverter::new(base, XSLT, "html", HTML, |_| None))
}

fn build_xslt_to_image(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(ChainConverter::new(base, XSLT, "html", HTML_TO_IMAGE, image_puid))
}

fn build_medcom_to_pdf(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(ChainConverter::new(base, MEDCOM, "html", HTML, |_| None))
}

fn build_medcom_to_image(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(ChainConverter::new(base, MEDCOM, "html", HTML_TO_IMAGE, image_puid))
}

pub const XSLT: ConverterType = ConverterType::new(xslt_descriptor, build_xslt);
pub const XSLT_TO_PDF: ConverterType = ConverterType::new(xslt_to_pdf_descriptor, build_xslt_to_pdf);
pub const XSLT_TO_IMAGE: ConverterType =
    ConverterType::new(xslt_to_image_descriptor, build_xslt_to_image);
pub const MEDCOM: ConverterType = ConverterType::new(medcom_descriptor, build_medcom);
pub const MEDCOM_TO_PDF: ConverterType =
    ConverterType::new(medcom_to_pdf_descriptor, build_medcom_to_pdf);
pub const MEDCOM_TO_IMAGE: ConverterType =
    ConverterType::new(medcom_to_image_descriptor, build_medcom_to_image);

/// Option naming the stylesheet. Without it the document's embedded stylesheet is used.
pub const XSL_OPTION: &str = "xsl";

/// Option naming the MedCom viewer stylesheet (`viewEmessage.xslt`).
pub const MEDCOM_STYLESHEET_OPTION: &str = "medcom.stylesheet";

const EMPTY_STYLESHEET: &str = r#"<?xml version="1.0" encoding="UTF-8"?><xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform" version="1.0"></xsl:stylesheet>"#;

/// Where the stylesheet comes from.
enum Stylesheet {
    /// Named by this option, else embedded in the document.
    Option(&'static str),
    /// Named by this option, which must be set.
    Required(&'static str),
}

pub struct XslConverter {
    base: ConverterBase,
    stylesheet: Stylesheet,
}

impl XslConverter {
    fn arguments(stylesheet: &Path, embedded: bool, input: &Path) -> Vec<String> {
        let mut args = vec!["tr".to_string()];
        if embedded {
            args.push("--embed".to_string());
        }
        args.push(path_arg(stylesheet));
        args.push(path_arg(input));
        args
    }
}

#[async_trait]
impl Converter for XslConverter {
    fn descriptor(&self) -> &'static ConverterDescriptor {
        self.base.descriptor
    }

    fn output_puid(&self, output: &str) -> Option<&'static str> {
        match output {
            "html" => Some("fmt/471"),
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
        let stylesheet = match self.stylesheet {
            Stylesheet::Option(key) => self.base.option(key),
            Stylesheet::Required(key) => {
                let path = self.base.require_option(key)?;
                if !Path::new(path).is_file() {
                    return Err(ConverterError::bad_option(key, "stylesheet not found"));
                }
                Some(path)
            }
        };
        let dest_dir = self.base.output_dir(output_dir, keep_relative_path)?;
        let dest_file = self.base.output_file(&dest_dir, output);
        let input = self.base.input_path()?;

        let tmp_dir = self.base.temp_dir(output_dir)?;
        let args = match stylesheet {
            Some(xsl) => Self::arguments(Path::new(xsl), false, &input),
            None => {
                let stylesheet = tmp_dir.path().join("embedded.xsl");
                tokio::fs::write(&stylesheet, EMPTY_STYLESHEET).await?;
                Self::arguments(&stylesheet, true, &input)
            }
        };

        let process = self.base.run_captured("xmlstarlet", &args, None).await?;
        let staged = tmp_dir.path().join(format!("result.{output}"));
        tokio::fs::write(&staged, process.stdout).await?;

        Ok(vec![place_file(&staged, &dest_file).await?])
    }
}

//! Converters shipped with convertool.

mod cad;
mod chain;
mod copy;
mod document;
mod gis;
mod html;
mod image;
mod mdi;
mod media;
mod msoffice;
mod pdf;
mod sas;
mod symphovert;
mod template;
mod xsl;
mod zipfile;

pub use cad::CAD;
pub use chain::ChainConverter;
pub use copy::COPY;
pub use document::{
    DOCUMENT, DOCUMENT_TO_IMAGE, PRESENTATION, PRESENTATION_TO_IMAGE, SPREADSHEET,
    SPREADSHEET_TO_IMAGE,
};
pub use gis::GIS;
pub use html::{HTML, HTML_TO_IMAGE};
pub use image::{
    image_puid, IMAGE, IMAGE_OUTPUTS, PDF_LARGE_TO_IMAGE, PDF_TO_IMAGE, RASTER_OUTPUTS,
    TEXT_TO_IMAGE,
};
pub use mdi::{MDI, MDI_TO_PDF};
pub use media::{AudioFormat, VideoFormat, AUDIO, VIDEO};
pub use msoffice::{OfficeApp, MSEXCEL, MSPOWERPOINT, MSWORD};
pub use pdf::{PdfConverter, PDF};
pub use sas::SAS;
pub use symphovert::SYMPHOVERT;
pub use template::TEMPLATE;
pub use xsl::{
    MEDCOM, MEDCOM_STYLESHEET_OPTION, MEDCOM_TO_IMAGE, MEDCOM_TO_PDF, XSLT, XSLT_TO_IMAGE,
    XSLT_TO_PDF, XSL_OPTION,
};
pub use zipfile::{PATH_OPTION, ZIPFILE};

use super::registry::ConverterType;

/// Every builtin converter, most specific first.
pub fn builtin_types() -> Vec<ConverterType> {
    vec![
        COPY,
        TEMPLATE,
        SYMPHOVERT,
        GIS,
        HTML,
        HTML_TO_IMAGE,
        CAD,
        MEDCOM,
        MEDCOM_TO_IMAGE,
        MEDCOM_TO_PDF,
        MSEXCEL,
        MSPOWERPOINT,
        MSWORD,
        MDI,
        MDI_TO_PDF,
        DOCUMENT,
        DOCUMENT_TO_IMAGE,
        PRESENTATION,
        PRESENTATION_TO_IMAGE,
        SPREADSHEET,
        SPREADSHEET_TO_IMAGE,
        SAS,
        PDF_TO_IMAGE,
        PDF_LARGE_TO_IMAGE,
        TEXT_TO_IMAGE,
        IMAGE,
        AUDIO,
        VIDEO,
        PDF,
        XSLT,
        XSLT_TO_IMAGE,
        XSLT_TO_PDF,
        ZIPFILE,
    ]
}

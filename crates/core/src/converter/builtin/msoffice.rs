//! Microsoft Office documents exported through docto. Windows only.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::converter::base::{path_arg, ConverterBase};
use crate::converter::descriptor::ConverterDescriptor;
use crate::converter::error::ConverterError;
use crate::converter::placement::place_file;
use crate::converter::registry::ConverterType;
use crate::converter::traits::Converter;

/// Office application driven by docto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfficeApp {
    Word,
    Excel,
    PowerPoint,
}

/// Export format, file extension and extra arguments for one docto export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub format: &'static str,
    pub extension: &'static str,
    pub extra: &'static [&'static str],
}

impl OfficeApp {
    fn flag(self) -> &'static str {
        match self {
            Self::Word => "-WD",
            Self::Excel => "-XL",
            Self::PowerPoint => "-PP",
        }
    }

    pub fn export(self, output: &str) -> Option<Export> {
        const NONE: &[&str] = &[];
        const PDFA: &[&str] = &["--use-ISO190051"];
        let (format, extension, extra) = match (self, output) {
            (Self::Word, "pdf") => ("wdFormatPDF", "pdf", NONE),
            (Self::Word, "pdfa") => ("wdFormatPDF", "pdf", PDFA),
            (Self::Word, "odt") => ("wdFormatOpenDocumentText", "odt", NONE),
            (Self::Excel, "pdf") => ("xlPDF", "pdf", NONE),
            (Self::Excel, "ods") => ("xlOpenDocumentSpreadsheet", "ods", NONE),
            (Self::Excel, "html") => ("xlHtml", "html", NONE),
            (Self::PowerPoint, "pdf") => ("ppSaveAsPDF", "pdf", NONE),
            (Self::PowerPoint, "odp") => ("ppSaveAsOpenDocumentPresentation", "odp", NONE),
            _ => return None,
        };
        Some(Export {
            format,
            extension,
            extra,
        })
    }
}

fn docto(name: &'static str, tool: &'static str, outputs: &'static [&'static str]) -> ConverterDescriptor {
    ConverterDescriptor::new(name, &[tool], outputs)
        .platforms(&["windows"])
        .dependency("docto", &["docto"])
        .not_parallel_safe()
}

static MSWORD_DESCRIPTOR: Lazy<ConverterDescriptor> =
    Lazy::new(|| docto("msword", "msword", &["pdf", "pdfa", "odt"]));
static MSEXCEL_DESCRIPTOR: Lazy<ConverterDescriptor> =
    Lazy::new(|| docto("msexcel", "msexcel", &["pdf", "ods", "html"]));
static MSPOWERPOINT_DESCRIPTOR: Lazy<ConverterDescriptor> =
    Lazy::new(|| docto("mspowerpoint", "mspowerpoint", &["pdf", "odp"]));

fn msword_descriptor() -> &'static ConverterDescriptor {
    &MSWORD_DESCRIPTOR
}

fn msexcel_descriptor() -> &'static ConverterDescriptor {
    &MSEXCEL_DESCRIPTOR
}

fn mspowerpoint_descriptor() -> &'static ConverterDescriptor {
    &MSPOWERPOINT_DESCRIPTOR
}

fn build_msword(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(MsOfficeConverter {
        base,
        app: OfficeApp::Word,
    })
}

fn build_msexcel(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(MsOfficeConverter {
        base,
        app: OfficeApp::Excel,
    })
}

fn build_mspowerpoint(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(MsOfficeConverter {
        base,
        app: OfficeApp::PowerPoint,
    })
}

pub const MSWORD: ConverterType = ConverterType::new(msword_descriptor, build_msword);
pub const MSEXCEL: ConverterType = ConverterType::new(msexcel_descriptor, build_msexcel);
pub const MSPOWERPOINT: ConverterType =
    ConverterType::new(mspowerpoint_descriptor, build_mspowerpoint);

pub struct MsOfficeConverter {
    base: ConverterBase,
    app: OfficeApp,
}

impl MsOfficeConverter {
    fn arguments(app: OfficeApp, export: &Export, input: &Path, tmp_file: &Path) -> Vec<String> {
        let mut args = vec![
            app.flag().to_string(),
            "-f".to_string(),
            path_arg(input),
            "-T".to_string(),
            export.format.to_string(),
            "-O".to_string(),
            path_arg(tmp_file),
        ];
        args.extend(export.extra.iter().map(|a| a.to_string()));
        args
    }
}

#[async_trait]
impl Converter for MsOfficeConverter {
    fn descriptor(&self) -> &'static ConverterDescriptor {
        self.base.descriptor
    }

    fn output_puid(&self, output: &str) -> Option<&'static str> {
        match output {
            "html" => Some("fmt/471"),
            "odt" => Some("fmt/290"),
            "ods" => Some("fmt/295"),
            "odp" => Some("fmt/293"),
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
        let export = self
            .app
            .export(output)
            .ok_or_else(|| ConverterError::OutputTarget {
                output: output.to_string(),
            })?;
        let dest_dir = self.base.output_dir(output_dir, keep_relative_path)?;
        let dest_file = self.base.output_file(&dest_dir, export.extension);

        let tmp_dir = self.base.temp_dir(output_dir)?;
        let tmp_file = tmp_dir.path().join(dest_file.file_name().unwrap_or_default());
        let args = Self::arguments(self.app, &export, &self.base.input_path()?, &tmp_file);
        self.base.run("docto", &args, None).await?;

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
    fn test_every_declared_output_has_an_export() {
        for (app, descriptor) in [
            (OfficeApp::Word, msword_descriptor()),
            (OfficeApp::Excel, msexcel_descriptor()),
            (OfficeApp::PowerPoint, mspowerpoint_descriptor()),
        ] {
            for output in &descriptor.outputs {
                assert!(app.export(output).is_some(), "{app:?} {output}");
            }
        }
    }

    #[test]
    fn test_pdfa_uses_iso_flag() {
        let export = OfficeApp::Word.export("pdfa").unwrap();
        let args = MsOfficeConverter::arguments(
            OfficeApp::Word,
            &export,
            Path::new("C:/in/a.doc"),
            Path::new("C:/tmp/a.pdf"),
        );
        assert_eq!(
            args,
            vec!["-WD", "-f", "C:/in/a.doc", "-T", "wdFormatPDF", "-O", "C:/tmp/a.pdf", "--use-ISO190051"]
        );
    }

    #[test]
    fn test_docto_is_serial_and_windows_only() {
        let d = msexcel_descriptor();
        assert!(!d.parallel_safe);
        assert!(d.platforms.supports("windows"));
        assert!(!d.platforms.supports("linux"));
    }
}

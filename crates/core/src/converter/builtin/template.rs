//! Replaces files that are not kept with a short text explaining why.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::catalog::SourceKind;
use crate::converter::base::ConverterBase;
use crate::converter::descriptor::ConverterDescriptor;
use crate::converter::error::ConverterError;
use crate::converter::placement::place_file;
use crate::converter::registry::ConverterType;
use crate::converter::traits::Converter;

static DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::new(
        "template",
        &["template"],
        &[
            "text",
            "empty",
            "password-protected",
            "corrupted",
            "duplicate",
            "not-preservable",
            "not-convertable",
            "extracted-archive",
            "temporary-file",
        ],
    )
    // Reads the catalog, which is only safe from the controller.
    .not_parallel_safe()
});

fn descriptor() -> &'static ConverterDescriptor {
    &DESCRIPTOR
}

fn build(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(TemplateConverter { base })
}

pub const TEMPLATE: ConverterType = ConverterType::new(descriptor, build);

pub struct TemplateConverter {
    base: ConverterBase,
}

impl TemplateConverter {
    fn requires_catalog(output: &str) -> ConverterError {
        ConverterError::conversion_failed(format!("{output:?} template requires a database"))
    }

    /// Text of the template for `output`, after normalization.
    fn render(&self, output: &str) -> Result<String, ConverterError> {
        let file = &self.base.file;
        let text = match output {
            "text" => file
                .action_data
                .ignore
                .as_ref()
                .and_then(|ignore| ignore.reason.clone())
                .filter(|reason| !reason.trim().is_empty())
                .ok_or_else(|| {
                    ConverterError::conversion_failed(format!(
                        "{output:?} template requires a reason"
                    ))
                })?,
            "empty" => "Den originale fil var tom.".to_string(),
            "password-protected" => "Den originale fil var kodeordsbeskyttet.".to_string(),
            "corrupted" => "Den originale fil var korrumperet og kunne ikke åbnes.".to_string(),
            "duplicate" => {
                let catalog = self
                    .base
                    .context
                    .catalog
                    .as_ref()
                    .ok_or_else(|| Self::requires_catalog(output))?;
                if file.kind != SourceKind::Original {
                    return Err(ConverterError::conversion_failed(format!(
                        "{output:?} template requires an original file"
                    )));
                }
                let original = catalog
                    .find_duplicate(&file.checksum)
                    .map_err(|e| ConverterError::conversion_failed(e.to_string()))?
                    .ok_or_else(|| {
                        ConverterError::conversion_failed(format!(
                            "{output:?} template requires a non-ignored duplicate"
                        ))
                    })?;
                format!(
                    "Den originale fil var en kopi af {}.",
                    original.relative_path.display()
                )
            }
            "not-preservable" => "Den originale fil var ikke bevaringsværdig.".to_string(),
            "not-convertable" => {
                "Den originale fil kunne ikke konverteres til et gyldigt arkivformat.".to_string()
            }
            "extracted-archive" => {
                let catalog = self
                    .base
                    .context
                    .catalog
                    .as_ref()
                    .ok_or_else(|| Self::requires_catalog(output))?;
                let children = catalog
                    .children(file.uuid)
                    .map_err(|e| ConverterError::conversion_failed(e.to_string()))?;
                let mut text =
                    "Den originale fil er udpakket, og indeholdt følgende filer:\n".to_string();
                text.push_str(
                    &children
                        .iter()
                        .map(|p| format!("* {}", p.display()))
                        .collect::<Vec<_>>()
                        .join("\n"),
                );
                text
            }
            other => {
                return Err(ConverterError::OutputTarget {
                    output: other.to_string(),
                })
            }
        };
        Ok(text)
    }
}

#[async_trait]
impl Converter for TemplateConverter {
    fn descriptor(&self) -> &'static ConverterDescriptor {
        self.base.descriptor
    }

    fn output_puid(&self, _output: &str) -> Option<&'static str> {
        Some("x-fmt/111")
    }

    async fn convert(
        &self,
        output_dir: &Path,
        output: &str,
        keep_relative_path: bool,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let output = self.base.output(output)?;
        if output == "temporary-file" {
            return Ok(Vec::new());
        }

        let dest_dir = self.base.output_dir(output_dir, keep_relative_path)?;
        let dest_file = self.base.output_file_appended(&dest_dir, "txt");
        let text = self.render(output)?;

        let tmp_dir = self.base.temp_dir(output_dir)?;
        let staged = tmp_dir.path().join("template.txt");
        tokio::fs::write(&staged, text).await?;

        Ok(vec![place_file(&staged, &dest_file).await?])
    }
}

//! SAS datasets exported as delimited text with ReadStat.

use std::fs::File;
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
    ConverterDescriptor::new("sas", &["sas"], &["csv", "tsv"])
        .dependency("readstat", &["readstat"])
        .timeout_secs(300)
});

fn descriptor() -> &'static ConverterDescriptor {
    &DESCRIPTOR
}

fn build(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(SasConverter { base })
}

pub const SAS: ConverterType = ConverterType::new(descriptor, build);

pub struct SasConverter {
    base: ConverterBase,
}

impl SasConverter {
    fn arguments(input: &Path, csv: &Path) -> Vec<String> {
        vec![path_arg(input), path_arg(csv)]
    }
}

/// Rewrites the comma-separated `source` with `delimiter`, row for row.
fn redelimit(source: &Path, destination: &Path, delimiter: u8) -> Result<(), ConverterError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(File::open(source)?);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_writer(File::create(destination)?);

    for record in reader.records() {
        let record = record
            .map_err(|e| ConverterError::conversion_failed(format!("Cannot read CSV: {e}")))?;
        writer
            .write_record(&record)
            .map_err(|e| ConverterError::conversion_failed(format!("Cannot write TSV: {e}")))?;
    }
    writer.flush()?;
    Ok(())
}

#[async_trait]
impl Converter for SasConverter {
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
        let csv_file = tmp_dir.path().join("sas.csv");
        let args = Self::arguments(&self.base.input_path()?, &csv_file);
        self.base.run("readstat", &args, Some(tmp_dir.path())).await?;

        if !csv_file.is_file() {
            return Err(ConverterError::conversion_failed(
                "ReadStat did not write a CSV file",
            ));
        }

        let staged = match output {
            "tsv" => {
                let tsv_file = tmp_dir.path().join("sas.tsv");
                let (source, target) = (csv_file.clone(), tsv_file.clone());
                tokio::task::spawn_blocking(move || redelimit(&source, &target, b'\t'))
                    .await
                    .map_err(|e| ConverterError::conversion_failed(format!("Export failed: {e}")))??;
                tsv_file
            }
            _ => csv_file,
        };

        Ok(vec![place_file(&staged, &dest_file).await?])
    }
}

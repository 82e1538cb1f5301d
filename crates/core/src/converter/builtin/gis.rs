//! Geodata converted to GML with GDAL's ogr2ogr.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::converter::base::{path_arg, ConverterBase};
use crate::converter::descriptor::ConverterDescriptor;
use crate::converter::error::ConverterError;
use crate::converter::placement::place_all;
use crate::converter::registry::ConverterType;
use crate::converter::traits::Converter;

static DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::new("gis", &["gis"], &["gml"])
        .platforms(&["linux"])
        .dependency("ogr2ogr", &["ogr2ogr"])
        .timeout_secs(120)
});

fn descriptor() -> &'static ConverterDescriptor {
    &DESCRIPTOR
}

fn build(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(GisConverter { base })
}

pub const GIS: ConverterType = ConverterType::new(descriptor, build);

/// Writes GML 3 next to its schema file, both moved to the destination.
pub struct GisConverter {
    base: ConverterBase,
}

impl GisConverter {
    fn arguments(dest_name: &str, input: &Path) -> Vec<String> {
        vec![
            "-of".to_string(),
            "GML".to_string(),
            "-dsco".to_string(),
            "FORMAT=GML3".to_string(),
            dest_name.to_string(),
            path_arg(input),
        ]
    }
}

#[async_trait]
impl Converter for GisConverter {
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
        let dest_name = format!("{}.{}", self.base.file.stem(), output);

        let tmp_dir = self.base.temp_dir(output_dir)?;
        let args = Self::arguments(&dest_name, &self.base.input_path()?);
        self.base
            .run("ogr2ogr", &args, Some(tmp_dir.path()))
            .await?;

        place_all(tmp_dir.path(), &dest_dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments() {
        let args = GisConverter::arguments("roads.gml", Path::new("/a/roads.shp"));
        assert_eq!(
            args,
            vec!["-of", "GML", "-dsco", "FORMAT=GML3", "roads.gml", "/a/roads.shp"]
        );
    }

    #[test]
    fn test_linux_only() {
        assert!(descriptor().platforms.supports("linux"));
        assert!(!descriptor().platforms.supports("windows"));
    }
}

//! Two-stage converters: the first stage produces an intermediate file in a
//! scratch directory, the second converts it to the requested output.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::catalog::SourceFile;
use crate::converter::base::ConverterBase;
use crate::converter::descriptor::ConverterDescriptor;
use crate::converter::error::ConverterError;
use crate::converter::registry::ConverterType;
use crate::converter::traits::Converter;

pub struct ChainConverter {
    base: ConverterBase,
    first: ConverterType,
    intermediate: &'static str,
    second: ConverterType,
    puid: fn(&str) -> Option<&'static str>,
}

impl ChainConverter {
    pub fn new(
        base: ConverterBase,
        first: ConverterType,
        intermediate: &'static str,
        second: ConverterType,
        puid: fn(&str) -> Option<&'static str>,
    ) -> Self {
        Self {
            base,
            first,
            intermediate,
            second,
            puid,
        }
    }
}

#[async_trait]
impl Converter for ChainConverter {
    fn descriptor(&self) -> &'static ConverterDescriptor {
        self.base.descriptor
    }

    fn output_puid(&self, output: &str) -> Option<&'static str> {
        (self.puid)(output)
    }

    async fn convert(
        &self,
        output_dir: &Path,
        output: &str,
        keep_relative_path: bool,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let output = self.base.output(output)?;
        self.base.output_dir(output_dir, keep_relative_path)?;

        let tmp_dir = self.base.temp_dir(output_dir)?;
        let first = self.first.build_part(&self.base, self.base.file.clone())?;
        let intermediates = first
            .convert(tmp_dir.path(), self.intermediate, true)
            .await?;
        let Some(intermediate) = intermediates.first() else {
            return Err(ConverterError::conversion_failed("Could not convert file."));
        };

        let file = SourceFile::synthetic(intermediate, tmp_dir.path());
        let second = self.second.build_part(&self.base, file)?;
        let outputs = second
            .convert(output_dir, output, keep_relative_path)
            .await?;
        if outputs.is_empty() {
            return Err(ConverterError::conversion_failed("Could not convert file."));
        }
        Ok(outputs)
    }
}

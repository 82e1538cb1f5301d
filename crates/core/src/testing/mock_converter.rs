//! Scriptable converters for dispatch tests.
//!
//! Behavior is driven by the instruction's options, so one registered type
//! covers success, failure, panics and slow conversions:
//!
//! - `mock.outputs`: number of files to produce (default 1)
//! - `mock.fail`: fail with this message after writing a partial file
//! - `mock.panic`: panic with this message
//! - `mock.sleep_ms`: wait before converting

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::converter::builtin::ChainConverter;
use crate::converter::{
    place_all, Converter, ConverterBase, ConverterDescriptor, ConverterError, ConverterType,
    Registry,
};

pub const OUTPUTS_OPTION: &str = "mock.outputs";
pub const FAIL_OPTION: &str = "mock.fail";
pub const PANIC_OPTION: &str = "mock.panic";
pub const SLEEP_OPTION: &str = "mock.sleep_ms";

static MOCK_DESCRIPTOR: Lazy<ConverterDescriptor> =
    Lazy::new(|| ConverterDescriptor::new("mock", &["mock"], &[]).any_output());

static MOCK_SERIAL_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::new("mock-serial", &["mock-serial"], &[])
        .any_output()
        .not_parallel_safe()
});

static MOCK_UNSUPPORTED_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::new("mock-unsupported", &["mock-unsupported"], &[])
        .any_output()
        .platforms(&["plan9"])
});

static MOCK_CHAIN_DESCRIPTOR: Lazy<ConverterDescriptor> = Lazy::new(|| {
    ConverterDescriptor::composite(
        "mock-chain",
        &["mock-chain"],
        &["tif"],
        &[mock_descriptor(), mock_descriptor()],
    )
});

fn mock_descriptor() -> &'static ConverterDescriptor {
    &MOCK_DESCRIPTOR
}

fn mock_serial_descriptor() -> &'static ConverterDescriptor {
    &MOCK_SERIAL_DESCRIPTOR
}

fn mock_unsupported_descriptor() -> &'static ConverterDescriptor {
    &MOCK_UNSUPPORTED_DESCRIPTOR
}

fn mock_chain_descriptor() -> &'static ConverterDescriptor {
    &MOCK_CHAIN_DESCRIPTOR
}

fn build(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(MockConverter { base })
}

fn build_chain(base: ConverterBase) -> Box<dyn Converter> {
    Box::new(ChainConverter::new(base, MOCK, "tmp", MOCK, |_| None))
}

/// Parallel-safe mock, tool `mock`.
pub const MOCK: ConverterType = ConverterType::new(mock_descriptor, build);
/// Serial mock, tool `mock-serial`.
pub const MOCK_SERIAL: ConverterType = ConverterType::new(mock_serial_descriptor, build);
/// Mock that only runs on a platform no test host has, tool `mock-unsupported`.
pub const MOCK_UNSUPPORTED: ConverterType =
    ConverterType::new(mock_unsupported_descriptor, build);
/// Two mock stages chained through an intermediate `tmp` file, tool `mock-chain`.
/// Both stages see the instruction's options.
pub const MOCK_CHAIN: ConverterType = ConverterType::new(mock_chain_descriptor, build_chain);

/// The builtin registry followed by the mocks.
pub fn mock_registry() -> Registry {
    Registry::builtin()
        .with(MOCK)
        .with(MOCK_SERIAL)
        .with(MOCK_UNSUPPORTED)
        .with(MOCK_CHAIN)
}

/// Writes `<stem>.<output>` files containing the source bytes followed by
/// the output name.
pub struct MockConverter {
    base: ConverterBase,
}

impl MockConverter {
    fn output_count(&self) -> Result<usize, ConverterError> {
        match self.base.option(OUTPUTS_OPTION) {
            None => Ok(1),
            Some(value) => value
                .parse()
                .map_err(|_| ConverterError::bad_option(OUTPUTS_OPTION, "expected a number")),
        }
    }

    fn output_name(&self, index: usize, output: &str) -> String {
        match index {
            0 => format!("{}.{}", self.base.file.stem(), output),
            n => format!("{}-{}.{}", self.base.file.stem(), n, output),
        }
    }
}

#[async_trait]
impl Converter for MockConverter {
    fn descriptor(&self) -> &'static ConverterDescriptor {
        self.base.descriptor
    }

    fn output_puid(&self, output: &str) -> Option<&'static str> {
        (output == "txt").then_some("x-fmt/111")
    }

    async fn convert(
        &self,
        output_dir: &Path,
        output: &str,
        keep_relative_path: bool,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        if let Some(ms) = self.base.option(SLEEP_OPTION) {
            let ms = ms
                .parse()
                .map_err(|_| ConverterError::bad_option(SLEEP_OPTION, "expected milliseconds"))?;
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if let Some(message) = self.base.option(PANIC_OPTION) {
            panic!("{}", message);
        }

        let count = self.output_count()?;
        let dest_dir = self.base.output_dir(output_dir, keep_relative_path)?;
        let content = tokio::fs::read(self.base.input_path()?).await?;

        let tmp_dir = self.base.temp_dir(output_dir)?;
        for index in 0..count {
            let mut data = content.clone();
            data.extend_from_slice(output.as_bytes());
            tokio::fs::write(tmp_dir.path().join(self.output_name(index, output)), data).await?;
        }

        if let Some(message) = self.base.option(FAIL_OPTION) {
            return Err(ConverterError::conversion_failed(message));
        }
        place_all(tmp_dir.path(), &dest_dir).await
    }
}

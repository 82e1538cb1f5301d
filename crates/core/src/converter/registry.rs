//! Converter types and the ordered registry that resolves a tool/output pair
//! to exactly one of them.

use std::fmt;
use std::path::Path;

use super::base::{ConverterBase, ConverterContext};
use super::builtin::builtin_types;
use super::descriptor::ConverterDescriptor;
use super::environment::check_environment;
use super::error::{ConverterError, EnvironmentError};
use super::traits::Converter;
use crate::catalog::SourceFile;

/// A converter type: static metadata plus a constructor.
#[derive(Clone, Copy)]
pub struct ConverterType {
    descriptor: fn() -> &'static ConverterDescriptor,
    factory: fn(ConverterBase) -> Box<dyn Converter>,
}

impl ConverterType {
    pub const fn new(
        descriptor: fn() -> &'static ConverterDescriptor,
        factory: fn(ConverterBase) -> Box<dyn Converter>,
    ) -> Self {
        Self {
            descriptor,
            factory,
        }
    }

    pub fn descriptor(&self) -> &'static ConverterDescriptor {
        (self.descriptor)()
    }

    pub fn name(&self) -> &'static str {
        self.descriptor().name
    }

    pub fn matches(&self, tool: &str, output: &str) -> bool {
        self.descriptor().matches(tool, output)
    }

    pub fn parallel_safe(&self) -> bool {
        self.descriptor().parallel_safe
    }

    /// Platform and dependency check, memoized per converter name.
    pub fn check_environment(&self) -> Result<(), EnvironmentError> {
        check_environment(self.descriptor()).map(|_| ())
    }

    /// Binds the converter to `file`.
    ///
    /// Environment checks run first, so an unsupported converter fails before
    /// any file is touched.
    pub fn build(
        &self,
        file: SourceFile,
        root: Option<&Path>,
        context: ConverterContext,
    ) -> Result<Box<dyn Converter>, ConverterError> {
        let base = ConverterBase::new(file, self.descriptor(), root, context)?;
        Ok((self.factory)(base))
    }

    /// Builds this converter as one stage of `parent`, sharing its context.
    pub fn build_part(
        &self,
        parent: &ConverterBase,
        file: SourceFile,
    ) -> Result<Box<dyn Converter>, ConverterError> {
        let base = parent.part(file, self.descriptor())?;
        Ok((self.factory)(base))
    }
}

impl fmt::Debug for ConverterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConverterType").field(&self.name()).finish()
    }
}

impl PartialEq for ConverterType {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for ConverterType {}

/// Ordered list of converter types. The first match wins.
#[derive(Debug, Clone)]
pub struct Registry {
    types: Vec<ConverterType>,
}

impl Registry {
    /// Registry of the builtin converters.
    pub fn builtin() -> Self {
        Self::new(builtin_types())
    }

    pub fn new(types: Vec<ConverterType>) -> Self {
        Self { types }
    }

    /// Appends a converter type after the existing ones.
    pub fn with(mut self, converter: ConverterType) -> Self {
        self.types.push(converter);
        self
    }

    /// First converter type handling `tool` and `output`.
    pub fn find(&self, tool: &str, output: &str) -> Option<ConverterType> {
        self.types.iter().copied().find(|t| t.matches(tool, output))
    }

    pub fn types(&self) -> &[ConverterType] {
        &self.types
    }

    /// Every tool name, in registry order without repeats.
    pub fn tools(&self) -> Vec<&'static str> {
        let mut tools = Vec::new();
        for converter in &self.types {
            for tool in &converter.descriptor().tool_names {
                if !tools.contains(tool) {
                    tools.push(*tool);
                }
            }
        }
        tools
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::builtin::{
        COPY, DOCUMENT, DOCUMENT_TO_IMAGE, HTML, IMAGE, MDI_TO_PDF, MEDCOM, MEDCOM_TO_IMAGE,
        MEDCOM_TO_PDF, PDF, PDF_TO_IMAGE, SAS, SYMPHOVERT, TEMPLATE, XSLT, XSLT_TO_IMAGE,
        XSLT_TO_PDF, ZIPFILE,
    };
    use once_cell::sync::Lazy;

    static WIDE: Lazy<ConverterDescriptor> =
        Lazy::new(|| ConverterDescriptor::new("registry-wide", &["overlap"], &["a", "b"]));
    static NARROW: Lazy<ConverterDescriptor> =
        Lazy::new(|| ConverterDescriptor::new("registry-narrow", &["overlap"], &["a"]));

    fn wide() -> &'static ConverterDescriptor {
        &WIDE
    }

    fn narrow() -> &'static ConverterDescriptor {
        &NARROW
    }

    fn unused(_: ConverterBase) -> Box<dyn Converter> {
        unreachable!("registry tests never build converters")
    }

    const WIDE_TYPE: ConverterType = ConverterType::new(wide, unused);
    const NARROW_TYPE: ConverterType = ConverterType::new(narrow, unused);

    #[test]
    fn test_builtin_resolution() {
        let registry = Registry::builtin();
        let cases = [
            ("copy", "copy", COPY),
            ("template", "empty", TEMPLATE),
            ("html", "pdf", HTML),
            ("browser", "pdf", HTML),
            ("document", "pdf", DOCUMENT),
            ("document", "png", DOCUMENT_TO_IMAGE),
            ("pdf", "pdfa-2", PDF),
            ("pdf", "jpg", PDF_TO_IMAGE),
            ("image", "TIFF", IMAGE),
            ("mdi", "pdf", MDI_TO_PDF),
            ("symphovert", "odt", SYMPHOVERT),
            ("sas", "tsv", SAS),
            ("medcom", "html", MEDCOM),
            ("medcom", "pdf", MEDCOM_TO_PDF),
            ("medcom", "jpeg", MEDCOM_TO_IMAGE),
            ("xslt", "xml", XSLT),
            ("xslt", "pdf", XSLT_TO_PDF),
            ("xslt", "tif", XSLT_TO_IMAGE),
            ("zipfile", "whatever", ZIPFILE),
        ];
        for (tool, output, expected) in cases {
            assert_eq!(registry.find(tool, output), Some(expected), "{tool}:{output}");
        }
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let registry = Registry::builtin();
        for tool in registry.tools() {
            for converter in registry.types() {
                for output in &converter.descriptor().outputs {
                    assert_eq!(registry.find(tool, output), registry.find(tool, output));
                }
            }
        }
    }

    #[test]
    fn test_earlier_type_wins_overlap() {
        let registry = Registry::new(vec![NARROW_TYPE, WIDE_TYPE]);
        assert_eq!(registry.find("overlap", "a"), Some(NARROW_TYPE));
        assert_eq!(registry.find("overlap", "b"), Some(WIDE_TYPE));

        let reversed = Registry::new(vec![WIDE_TYPE, NARROW_TYPE]);
        assert_eq!(reversed.find("overlap", "a"), Some(WIDE_TYPE));
    }

    #[test]
    fn test_unknown_pair() {
        let registry = Registry::builtin();
        assert_eq!(registry.find("image", "docx"), None);
        assert_eq!(registry.find("nope", "pdf"), None);
    }

    #[test]
    fn test_no_pair_is_claimed_twice() {
        let registry = Registry::builtin();
        for (i, a) in registry.types().iter().enumerate() {
            for b in &registry.types()[i + 1..] {
                for tool in &a.descriptor().tool_names {
                    for output in &a.descriptor().outputs {
                        assert!(
                            !b.matches(tool, output),
                            "{} and {} both match {tool}:{output}",
                            a.name(),
                            b.name()
                        );
                    }
                }
            }
        }
    }
}

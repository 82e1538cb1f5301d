//! Turns catalog records into conversion instructions.
//!
//! Originals follow their declared action: `convert` names the tool directly
//! and `ignore` becomes a template conversion. Masters carry one convert
//! record per destination.

mod error;

pub use error::InstructionError;

use crate::catalog::{ConvertAction, ConvertOptions, Destination, SourceFile, SourceKind};
use crate::converter::{ConverterType, Registry};

/// Tool name of the template converter used for ignored files.
pub const TEMPLATE_TOOL: &str = "template";

/// A file bound to the converter that will produce `output` for `destination`.
#[derive(Debug, Clone)]
pub struct ConvertInstruction {
    pub file: SourceFile,
    pub destination: Destination,
    pub converter: ConverterType,
    pub tool: String,
    pub output: String,
    pub options: ConvertOptions,
}

/// The conversion a record asks for, before any converter is looked up.
pub fn requested_action(
    file: &SourceFile,
    destination: Destination,
) -> Result<ConvertAction, InstructionError> {
    match (file.kind, destination) {
        (SourceKind::Original, Destination::Master) => original_action(file),
        (SourceKind::Master, Destination::Access) => file
            .convert_access
            .clone()
            .ok_or_else(|| missing("convert_access")),
        (SourceKind::Master, Destination::Statutory) => file
            .convert_statutory
            .clone()
            .ok_or_else(|| missing("convert_statutory")),
        (kind, destination) => Err(InstructionError::InvalidStage {
            kind: kind.as_str(),
            destination: destination.as_str(),
        }),
    }
}

fn original_action(file: &SourceFile) -> Result<ConvertAction, InstructionError> {
    match file.action.as_deref() {
        Some("convert") => file
            .action_data
            .convert
            .clone()
            .ok_or_else(|| missing("convert")),
        Some("ignore") => file
            .action_data
            .ignore
            .as_ref()
            .map(|ignore| ConvertAction::new(TEMPLATE_TOOL, ignore.template.clone()))
            .ok_or_else(|| missing("ignore")),
        other => Err(InstructionError::UnsupportedAction(other.map(String::from))),
    }
}

fn missing(action: &str) -> InstructionError {
    InstructionError::MissingActionData {
        action: action.to_string(),
    }
}

/// Resolves `action` for `file` against `registry`, checking that the
/// converter can run here.
fn resolve(
    file: SourceFile,
    destination: Destination,
    action: ConvertAction,
    registry: &Registry,
) -> Result<ConvertInstruction, InstructionError> {
    let converter = registry.find(&action.tool, &action.output).ok_or_else(|| {
        InstructionError::ConverterNotFound {
            tool: action.tool.clone(),
            output: action.output.clone(),
        }
    })?;
    converter.check_environment()?;

    Ok(ConvertInstruction {
        file,
        destination,
        converter,
        tool: action.tool,
        output: action.output,
        options: action.options.unwrap_or_default(),
    })
}

/// Instruction producing the master copy of an original file.
pub fn original_file_instruction(
    file: SourceFile,
    registry: &Registry,
) -> Result<ConvertInstruction, InstructionError> {
    let action = requested_action(&file, Destination::Master)?;
    resolve(file, Destination::Master, action, registry)
}

/// Instruction producing the access or statutory copy of a master file.
pub fn master_file_instruction(
    file: SourceFile,
    destination: Destination,
    registry: &Registry,
) -> Result<ConvertInstruction, InstructionError> {
    let action = requested_action(&file, destination)?;
    resolve(file, destination, action, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IgnoreAction;
    use crate::converter::builtin::{COPY, TEMPLATE};
    use uuid::Uuid;

    #[test]
    fn test_convert_action() {
        let file = SourceFile::original("a/b.txt")
            .with_convert(ConvertAction::new("copy", "copy").with_option("k", "v"));
        let instruction = original_file_instruction(file, &Registry::builtin()).unwrap();
        assert_eq!(instruction.converter, COPY);
        assert_eq!(instruction.destination, Destination::Master);
        assert_eq!(instruction.options.get("k").map(String::as_str), Some("v"));
    }

    #[test]
    fn test_ignore_becomes_template() {
        let file = SourceFile::original("a/b.bin").with_ignore(IgnoreAction::new("empty"));
        let instruction = original_file_instruction(file, &Registry::builtin()).unwrap();
        assert_eq!(instruction.converter, TEMPLATE);
        assert_eq!(instruction.tool, "template");
        assert_eq!(instruction.output, "empty");
        assert!(instruction.options.is_empty());
    }

    #[test]
    fn test_unsupported_action_is_fatal() {
        let mut file = SourceFile::original("a.txt");
        file.action = Some("extract".to_string());
        let err = original_file_instruction(file, &Registry::builtin()).unwrap_err();
        assert_eq!(err, InstructionError::UnsupportedAction(Some("extract".into())));
        assert!(err.is_fatal());

        let err = original_file_instruction(SourceFile::original("b.txt"), &Registry::builtin())
            .unwrap_err();
        assert_eq!(err, InstructionError::UnsupportedAction(None));
    }

    #[test]
    fn test_missing_action_data() {
        let mut file = SourceFile::original("a.txt");
        file.action = Some("convert".to_string());
        let err = original_file_instruction(file, &Registry::builtin()).unwrap_err();
        assert!(matches!(err, InstructionError::MissingActionData { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_converter_not_found() {
        let file =
            SourceFile::original("a.txt").with_convert(ConvertAction::new("teleport", "pdf"));
        let err = original_file_instruction(file, &Registry::builtin()).unwrap_err();
        assert_eq!(
            err,
            InstructionError::ConverterNotFound {
                tool: "teleport".into(),
                output: "pdf".into()
            }
        );
        assert_eq!(err.name(), "ConverterNotFound");
    }

    #[test]
    fn test_master_destinations() {
        let mut file = SourceFile::master("m/a.txt", Uuid::new_v4(), 0);
        file.convert_access = Some(ConvertAction::new("copy", "copy"));
        let registry = Registry::builtin();

        let access = master_file_instruction(file.clone(), Destination::Access, &registry).unwrap();
        assert_eq!(access.destination, Destination::Access);

        let err = master_file_instruction(file.clone(), Destination::Statutory, &registry)
            .unwrap_err();
        assert!(matches!(err, InstructionError::MissingActionData { .. }));

        let err = master_file_instruction(file, Destination::Master, &registry).unwrap_err();
        assert!(err.is_fatal());
    }
}

//! Events recorded in the catalog's log table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Conversion event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversionEvent {
    RunStarted {
        version: String,
        stage: String,
        dry_run: bool,
    },
    RunEnded {
        converted: usize,
        failed: usize,
        skipped: usize,
        cancelled: bool,
    },

    /// A converter started on a file.
    Run { converter: String, name: String },
    /// A converter produced an output.
    Out {
        converter: String,
        original: String,
        name: String,
    },
    /// All outputs were stored and the source marked processed.
    Converted {
        tool: String,
        output: String,
        converter: String,
        files: Vec<String>,
    },
    /// The conversion failed and nothing was stored.
    Error {
        tool: String,
        output: String,
        converter: String,
        error: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    /// No instruction could be built for the file.
    InstructionError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        error: String,
    },
    /// Dry-run: the file would have been converted.
    WouldConvert {
        tool: String,
        output: String,
        converter: String,
    },
}

impl ConversionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "start",
            Self::RunEnded { .. } => "end",
            Self::Run { .. } => "run",
            Self::Out { .. } => "out",
            Self::Converted { .. } => "converted",
            Self::Error { .. } => "error",
            Self::InstructionError { .. } => "instruction_error",
            Self::WouldConvert { .. } => "would_convert",
        }
    }
}

/// A stored event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Row id, zero until stored.
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    /// The file the event concerns, if any.
    pub uuid: Option<Uuid>,
    /// "<program>.<command>:<event_type>"
    pub operation: String,
    pub data: ConversionEvent,
}

impl EventRecord {
    pub fn new(command: &str, uuid: Option<Uuid>, data: ConversionEvent) -> Self {
        Self {
            id: 0,
            timestamp: Utc::now(),
            uuid,
            operation: format!("convertool.{}:{}", command, data.event_type()),
            data,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.data.event_type()
    }
}

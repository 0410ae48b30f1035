//! Protocol diagnostics and conversion from engine diagnostics.

use serde::{Deserialize, Serialize};

use crate::engine::{DiagnosticCategory, EngineDiagnostic};
use crate::position::Range;
use crate::project::SourceFile;

const DIAGNOSTIC_SOURCE: &str = "ts";

/// Diagnostic severity level (matches LSP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl From<DiagnosticSeverity> for u8 {
    fn from(severity: DiagnosticSeverity) -> u8 {
        severity as u8
    }
}

impl TryFrom<u8> for DiagnosticSeverity {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, <DiagnosticSeverity as TryFrom<u8>>::Error> {
        match value {
            1 => Ok(Self::Error),
            2 => Ok(Self::Warning),
            3 => Ok(Self::Information),
            4 => Ok(Self::Hint),
            _ => Err("invalid diagnostic severity"),
        }
    }
}

/// Diagnostic payload published to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub range: Range,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<DiagnosticSeverity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub message: String,
}

/// Convert an engine diagnostic to a protocol diagnostic.
///
/// The caller has already filtered out diagnostics without a file — those
/// cannot be represented to the client, which requires a range and URI.
pub fn convert_diagnostic(diagnostic: &EngineDiagnostic, source: &SourceFile) -> Diagnostic {
    let severity = match diagnostic.category {
        DiagnosticCategory::Error => DiagnosticSeverity::Error,
        DiagnosticCategory::Warning => DiagnosticSeverity::Warning,
        DiagnosticCategory::Suggestion => DiagnosticSeverity::Hint,
        DiagnosticCategory::Message => DiagnosticSeverity::Information,
    };
    Diagnostic {
        range: source.range_of(
            diagnostic.start,
            diagnostic.start.saturating_add(diagnostic.length),
        ),
        severity: Some(severity),
        code: Some(diagnostic.code),
        source: Some(DIAGNOSTIC_SOURCE.to_string()),
        message: diagnostic.message.clone(),
    }
}

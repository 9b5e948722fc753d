//! Error and diagnostic types for the lineage engine
//!
//! Two tiers:
//! - [`LineageError`] - hard failures that abort the caller's operation
//!   (unreadable input, unreadable or invalid configuration).
//! - [`Diagnostic`] - recoverable problems found while building a graph.
//!   They never abort a build; they are collected in [`Diagnostics`] and
//!   surfaced to the user next to the result.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::types::MappingKey;

/// Result alias for operations that can hard-fail
pub type Result<T> = std::result::Result<T, LineageError>;

/// Build-wide failures that must propagate to the caller
#[derive(Error, Debug)]
pub enum LineageError {
    #[error("Unreadable mapping input: {0}")]
    UnreadableInput(#[from] serde_json::Error),

    #[error("Unreadable configuration: {0}")]
    UnreadableConfig(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {field} {message}")]
    InvalidConfig { field: &'static str, message: String },
}

/// How much attention a diagnostic deserves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
}

/// Recoverable problem found while building a graph from mapping records
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Diagnostic {
    /// A required column was missing or blank; a default was substituted.
    #[error("Row {row}: missing {column}, substituted '{substituted}'")]
    MalformedRecord {
        row: usize,
        column: String,
        substituted: String,
    },

    /// A mapping endpoint was never declared by the schema source.
    #[error("Row {row}: {table}.{field} is not declared in the schema, placeholder created")]
    DanglingReference {
        row: usize,
        table: String,
        field: String,
    },

    /// Two rows share the same identity key; the later row wins.
    #[error("Row {overriding_row}: duplicate mapping {key} replaces row {replaced_row}")]
    DuplicateIdentity {
        key: MappingKey,
        replaced_row: usize,
        overriding_row: usize,
    },

    /// The mapping kind label could not be classified.
    #[error("Row {row}: unknown mapping kind '{label}', treated as TRANSFORM")]
    UnknownMappingKind { row: usize, label: String },
}

impl Diagnostic {
    /// Stable code for this diagnostic
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedRecord { .. } => "MALFORMED_RECORD",
            Self::DanglingReference { .. } => "DANGLING_REFERENCE",
            Self::DuplicateIdentity { .. } => "DUPLICATE_IDENTITY",
            Self::UnknownMappingKind { .. } => "UNKNOWN_MAPPING_KIND",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::DanglingReference { .. } => Severity::Info,
            _ => Severity::Warning,
        }
    }

    /// Input row the diagnostic refers to
    pub fn row(&self) -> usize {
        match self {
            Self::MalformedRecord { row, .. }
            | Self::DanglingReference { row, .. }
            | Self::UnknownMappingKind { row, .. } => *row,
            Self::DuplicateIdentity { overriding_row, .. } => *overriding_row,
        }
    }
}

/// Accumulated diagnostics of one build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Count of diagnostics carrying the given code
    pub fn count(&self, code: &str) -> usize {
        self.entries.iter().filter(|d| d.code() == code).count()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity() == Severity::Warning)
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_codes() {
        let malformed = Diagnostic::MalformedRecord {
            row: 3,
            column: "source_table".to_string(),
            substituted: "UNNAMED".to_string(),
        };
        assert_eq!(malformed.code(), "MALFORMED_RECORD");
        assert_eq!(malformed.severity(), Severity::Warning);
        assert_eq!(malformed.row(), 3);
        assert_eq!(
            malformed.to_string(),
            "Row 3: missing source_table, substituted 'UNNAMED'"
        );

        let dangling = Diagnostic::DanglingReference {
            row: 0,
            table: "A".to_string(),
            field: "ID".to_string(),
        };
        assert_eq!(dangling.severity(), Severity::Info);
    }

    #[test]
    fn test_diagnostics_counts() {
        let mut diagnostics = Diagnostics::new();
        assert!(diagnostics.is_empty());

        diagnostics.push(Diagnostic::UnknownMappingKind {
            row: 1,
            label: "PIVOT".to_string(),
        });
        diagnostics.push(Diagnostic::UnknownMappingKind {
            row: 2,
            label: "UNPIVOT".to_string(),
        });

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.count("UNKNOWN_MAPPING_KIND"), 2);
        assert_eq!(diagnostics.count("DUPLICATE_IDENTITY"), 0);
        assert_eq!(diagnostics.warnings().count(), 2);
    }
}

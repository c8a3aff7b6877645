//! Error types and handling for `packbox`.
//!
//! Validation-phase errors are always recoverable locally (no store mutation
//! has occurred). Commit-phase errors carry partial-success context because
//! rollback of already-committed batches is not attempted. Nothing here is
//! fatal to the process; every failure is reported through the typed result
//! or the progress stream and handled by the caller.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::{EntityCounts, EntityKind};

/// Primary error type for `packbox` operations.
#[derive(Error, Debug)]
pub enum PackboxError {
    // === Archive read errors ===
    /// The file is not a readable ZIP container.
    #[error("Unreadable archive '{}': {reason}", path.display())]
    UnreadableArchive { path: PathBuf, reason: String },

    /// The ZIP opened but matches neither the CSV-table nor the
    /// snapshot signature.
    #[error("Unsupported archive format: '{}'", path.display())]
    UnsupportedFormat { path: PathBuf },

    /// The archive contains no entity tables and no snapshot.
    #[error("Archive is empty: '{}'", path.display())]
    EmptyArchive { path: PathBuf },

    /// A table required by the import configuration is absent.
    #[error("Archive is missing required table '{table}'")]
    MissingTable { table: String },

    /// A required column is absent from a table header.
    #[error("Table '{table}' is missing required column '{column}'")]
    MissingColumn { table: String, column: String },

    /// A row failed to parse.
    #[error("Malformed row in '{table}' at line {line}: {reason}")]
    MalformedTable {
        table: String,
        line: usize,
        reason: String,
    },

    // === Archive write errors ===
    /// Export could not write the archive (disk full, permissions, ...).
    /// The partial file has already been removed.
    #[error("Failed to write archive '{}': {reason}", path.display())]
    ArchiveWrite { path: PathBuf, reason: String },

    // === Snapshot errors ===
    /// Snapshot payload does not match the manifest checksum.
    #[error("Snapshot checksum mismatch: expected {expected}, found {found}")]
    SnapshotChecksum { expected: String, found: String },

    /// Snapshot manifest declares a schema version this build cannot restore.
    #[error("Snapshot schema version {found} is not supported (expected <= {supported})")]
    SnapshotVersion { found: i32, supported: i32 },

    // === Operation lifecycle ===
    /// The operation was cancelled cooperatively. A distinct terminal
    /// state, never mapped to a generic error by callers.
    #[error("Operation cancelled")]
    Cancelled,

    /// Commit failed partway. Reports what was already durable so the
    /// caller can inform the user precisely.
    #[error("Import failed after committing {counts}: {reason}")]
    PartialCommit { counts: EntityCounts, reason: String },

    // === Store errors ===
    /// No inventory store at the given path (run `pbx init` first).
    #[error("No packbox workspace found from '{}'; run 'pbx init' first", path.display())]
    StoreNotFound { path: PathBuf },

    /// `SQLite` error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Named entity lookup failed (CLI reference by name).
    #[error("{kind} not found: '{name}'")]
    NotFound { kind: EntityKind, name: String },

    // === Validation ===
    /// Field validation failed.
    #[error("Validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    // === Configuration ===
    /// Workspace configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    // === I/O and serialization ===
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parse error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PackboxError {
    #[must_use]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True for errors raised before any store mutation, meaning the
    /// caller may simply retry with a different file.
    #[must_use]
    pub const fn is_validation_phase(&self) -> bool {
        matches!(
            self,
            Self::UnreadableArchive { .. }
                | Self::UnsupportedFormat { .. }
                | Self::EmptyArchive { .. }
                | Self::MissingTable { .. }
                | Self::MissingColumn { .. }
                | Self::MalformedTable { .. }
        )
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type using `PackboxError`.
pub type Result<T> = std::result::Result<T, PackboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_phase_classification() {
        let err = PackboxError::MissingTable {
            table: "items.csv".to_string(),
        };
        assert!(err.is_validation_phase());

        let err = PackboxError::PartialCommit {
            counts: EntityCounts::default(),
            reason: "disk full".to_string(),
        };
        assert!(!err.is_validation_phase());
    }

    #[test]
    fn test_cancelled_is_distinct() {
        assert!(PackboxError::Cancelled.is_cancelled());
        assert!(!PackboxError::EmptyArchive {
            path: PathBuf::from("a.zip")
        }
        .is_cancelled());
    }

    #[test]
    fn test_display_messages() {
        let err = PackboxError::MissingColumn {
            table: "items.csv".to_string(),
            column: "id".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Table 'items.csv' is missing required column 'id'"
        );
    }
}

//! Error types for fleetdesk.
//!
//! This module defines all error types used throughout the fleetdesk crate.
//! Workflow errors are recoverable at the request boundary: the caller shows the
//! message and lets the user try again. Storage errors abort the operation after
//! any partial writes have been rolled back.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for fleetdesk operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Workflow Errors ===
    /// Malformed or missing input.
    #[error("invalid input: {message}")]
    Validation {
        /// What was wrong with the input.
        message: String,
    },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Kind of entity that was looked up.
        entity: &'static str,
        /// The key that was looked up.
        key: String,
    },

    /// The operation is not legal in the entity's current lifecycle state.
    #[error("operation not allowed: {message}")]
    InvalidState {
        /// Why the transition was refused.
        message: String,
    },

    /// The acting user lacks authority for the operation.
    #[error("permission denied: {message}")]
    Permission {
        /// Why the actor was refused.
        message: String,
    },

    /// Another operation holds the vehicle's lock.
    #[error("vehicle {plate} is busy with another operation, try again")]
    PlateBusy {
        /// The contended plate.
        plate: String,
    },

    /// A record was modified by another writer between being read and being
    /// written back.
    #[error("{entity} {key} was changed by another operation, try again")]
    Conflict {
        /// Kind of entity that changed.
        entity: &'static str,
        /// Its key.
        key: String,
    },

    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// A worksheet is missing a column or holds an unreadable cell.
    #[error("worksheet '{sheet}' is malformed: {message}")]
    SheetFormat {
        /// Name of the worksheet.
        sheet: String,
        /// Description of the problem.
        message: String,
    },

    /// Undoing a partially applied change failed; the store may be inconsistent.
    #[error("rollback incomplete: {message}")]
    RollbackIncomplete {
        /// The original failure and the undo failures.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for fleetdesk operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], used by front ends to decide how to
/// present it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// User-correctable input problem; shown inline next to the form.
    Validation,
    /// Referenced entity absent; shown as a notice.
    NotFound,
    /// Lifecycle rule violated.
    InvalidState,
    /// Actor lacks authority.
    Permission,
    /// Lost a race for a vehicle or record; the caller should re-issue.
    Conflict,
    /// The record store failed.
    Storage,
    /// Configuration could not be loaded or is invalid.
    Config,
    /// A bug.
    Internal,
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not-found error for the given entity kind and key.
    #[must_use]
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Create an invalid-state error.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a permission error.
    #[must_use]
    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission {
            message: message.into(),
        }
    }

    /// Create a worksheet format error.
    #[must_use]
    pub fn sheet_format(sheet: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SheetFormat {
            sheet: sheet.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Permission { .. } => ErrorKind::Permission,
            Self::PlateBusy { .. } | Self::Conflict { .. } => ErrorKind::Conflict,
            Self::DatabaseOpen { .. }
            | Self::DatabaseQuery(_)
            | Self::DatabaseMigration { .. }
            | Self::SheetFormat { .. }
            | Self::RollbackIncomplete { .. }
            | Self::Io(_)
            | Self::DirectoryCreate { .. }
            | Self::Json(_) => ErrorKind::Storage,
            Self::ConfigLoad(_) | Self::ConfigValidation { .. } => ErrorKind::Config,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error came from the record store.
    #[must_use]
    pub fn is_storage_error(&self) -> bool {
        self.kind() == ErrorKind::Storage
    }

    /// Check if the caller can fix this error by changing its input or retrying.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation
                | ErrorKind::NotFound
                | ErrorKind::InvalidState
                | ErrorKind::Permission
                | ErrorKind::Conflict
        )
    }
}

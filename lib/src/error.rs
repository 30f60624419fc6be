use crate::models::NodeId;
use std::fmt;

/// Error type for the bookmark core
///
/// Model and adapter errors surface to the caller unaltered; nothing in the
/// library recovers from them silently.
#[derive(Debug, thiserror::Error)]
pub enum BmError {
    /// Referenced node is absent from the tree
    #[error("Node {0} not found")]
    NotFound(NodeId),

    /// Operation applied to a node of the wrong kind
    #[error("Node {id} is a {actual}, expected a {expected}")]
    InvalidKind {
        id: NodeId,
        expected: &'static str,
        actual: &'static str,
    },

    /// Malformed field value or argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Move would make a node its own ancestor
    #[error("Moving node {node} under {target} would create a cycle")]
    CycleDetected { node: NodeId, target: NodeId },

    /// Source does not parse per its declared format
    #[error("Format error{}: {message}", location_suffix(.location))]
    Format {
        location: Option<String>,
        message: String,
    },

    /// Write attempted to a read-only format
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// I/O errors (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database-related errors (SQLite) outside of schema parsing
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

fn location_suffix(location: &Option<String>) -> String {
    match location {
        Some(loc) => format!(" at {}", loc),
        None => String::new(),
    }
}

/// Result type alias using BmError
pub type Result<T> = std::result::Result<T, BmError>;

/// Coarse error taxonomy, used by front ends for reporting and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidKind,
    InvalidInput,
    CycleDetected,
    Format,
    UnsupportedOperation,
    Io,
    Database,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::InvalidKind => "InvalidKind",
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::CycleDetected => "CycleDetected",
            ErrorKind::Format => "FormatError",
            ErrorKind::UnsupportedOperation => "UnsupportedOperation",
            ErrorKind::Io => "Io",
            ErrorKind::Database => "Database",
            ErrorKind::Config => "Config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BmError::NotFound(_) => ErrorKind::NotFound,
            BmError::InvalidKind { .. } => ErrorKind::InvalidKind,
            BmError::InvalidInput(_) => ErrorKind::InvalidInput,
            BmError::CycleDetected { .. } => ErrorKind::CycleDetected,
            BmError::Format { .. } => ErrorKind::Format,
            BmError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            BmError::Io(_) => ErrorKind::Io,
            BmError::Database(_) => ErrorKind::Database,
            BmError::Config(_) => ErrorKind::Config,
        }
    }

    /// Build a format error, with or without a location
    pub fn format(location: Option<String>, message: impl Into<String>) -> Self {
        BmError::Format {
            location,
            message: message.into(),
        }
    }

    /// Build a format error pointing at a known location
    pub fn format_at(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::format(Some(location.into()), message)
    }
}

impl From<serde_json::Error> for BmError {
    fn from(err: serde_json::Error) -> Self {
        // line 0 means serde_json had no position to report
        let location = (err.line() > 0).then(|| format!("line {}, column {}", err.line(), err.column()));
        BmError::Format {
            location,
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for BmError {
    fn from(err: serde_yaml::Error) -> Self {
        BmError::Config(err.to_string())
    }
}

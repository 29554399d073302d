//! Error taxonomy for the geometry / hstore data-access layer
//! Provides structured error handling using thiserror for better error reporting

use thiserror::Error;

/// Main error type for reads, writes and hstore accessors
#[derive(Error, Debug)]
pub enum DbError {
    /// Database connection related errors
    #[error("Database connection error: {message}")]
    Connection { message: String },

    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A read was requested with something other than a single SELECT
    #[error("Query error: {message}")]
    Query { message: String },

    /// A named column is missing, ambiguous or not parseable as its expected type
    #[error("Decode error{}: {message}", fmt_location(.column, .row))]
    Decode {
        message: String,
        column: Option<String>,
        row: Option<usize>,
    },

    /// A write column is absent from the source record set or the target table
    #[error("Column '{column}' does not exist in the {location}")]
    ColumnMismatch {
        column: String,
        location: ColumnLocation,
    },

    /// A column was given a role it cannot play (e.g. geometry as id column)
    #[error("Invalid column role for '{column}': {message}")]
    InvalidColumnRole { column: String, message: String },

    /// Errors reported by the server or by libpq, propagated unchanged
    #[error("Database error: {message}")]
    Database { message: String },

    /// Positional access past the end of a column
    #[error("Row index {index} out of bounds for {len} rows")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Value vector does not line up with the selected rows
    #[error("Length mismatch: expected {expected} values, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// C string conversion errors
    #[error("C string conversion error")]
    CStringConversion(#[from] std::ffi::NulError),
}

/// Which side of a write a column was looked up on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnLocation {
    Source,
    Target,
}

impl std::fmt::Display for ColumnLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnLocation::Source => write!(f, "source record set"),
            ColumnLocation::Target => write!(f, "target table"),
        }
    }
}

fn fmt_location(column: &Option<String>, row: &Option<usize>) -> String {
    match (column, row) {
        (Some(column), Some(row)) => format!(" in column '{}' at row {}", column, row),
        (Some(column), None) => format!(" in column '{}'", column),
        (None, Some(row)) => format!(" at row {}", row),
        (None, None) => String::new(),
    }
}

/// Result type alias for convenience
pub type DbResult<T> = std::result::Result<T, DbError>;

impl DbError {
    /// Create a connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a query error
    pub fn query<S: Into<String>>(message: S) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Create a decode error without location
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode {
            message: message.into(),
            column: None,
            row: None,
        }
    }

    /// Create a decode error pointing at a column
    pub fn decode_column<S: Into<String>, C: Into<String>>(message: S, column: C) -> Self {
        Self::Decode {
            message: message.into(),
            column: Some(column.into()),
            row: None,
        }
    }

    /// Create a decode error pointing at a single cell
    pub fn decode_cell<S: Into<String>, C: Into<String>>(message: S, column: C, row: usize) -> Self {
        Self::Decode {
            message: message.into(),
            column: Some(column.into()),
            row: Some(row),
        }
    }

    /// Create a column mismatch error
    pub fn column_mismatch<C: Into<String>>(column: C, location: ColumnLocation) -> Self {
        Self::ColumnMismatch {
            column: column.into(),
            location,
        }
    }

    /// Create an invalid column role error
    pub fn column_role<C: Into<String>, S: Into<String>>(column: C, message: S) -> Self {
        Self::InvalidColumnRole {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a database error
    pub fn database<S: Into<String>>(message: S) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Attach a row index to a decode error raised without one
    pub(crate) fn at_cell(self, column: &str, row: usize) -> Self {
        match self {
            Self::Decode { message, .. } => Self::Decode {
                message,
                column: Some(column.to_string()),
                row: Some(row),
            },
            other => other,
        }
    }
}

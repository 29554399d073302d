//! Core module containing fundamental types and configurations
//!
//! Configuration management and the error taxonomy shared by the reader,
//! the writer and the hstore accessors.

pub mod config;
pub mod errors;

// Re-export for convenience
pub use config::ConnectionConfig;
pub use errors::{ColumnLocation, DbError, DbResult};

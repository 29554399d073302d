//! Utility functions for talking to PostgreSQL
//!
//! This module provides utility functions organized by category:
//! - PostgreSQL connection handling
//! - SQL identifier and literal quoting

pub mod connection;
pub mod quote;

// Re-export for convenience
pub use connection::{Connection, PGConnection, PGResult, QueryResult, ResultColumn};
pub use quote::{TableName, quote_ident, quote_literal};

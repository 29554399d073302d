//! PostgreSQL connection handling utilities
//!
//! Provides the [`Connection`] seam the reader and writer talk to, plus a
//! safe wrapper around PostgreSQL's C library (libpq) implementing it.
//! The connection is owned and sequenced by the caller; nothing here pools,
//! retries or wraps statements in transactions.

use crate::core::errors::{DbError, DbResult};
use libpq_sys::*;
use std::ffi::{CStr, CString};
use tracing::debug;

/// Column metadata of a query result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultColumn {
    pub name: String,
    pub type_oid: Oid,
}

/// Fully materialized query result in PostgreSQL text format
///
/// Values are kept as the server's text representation; `None` is SQL NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<ResultColumn>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryResult {
    /// Build a result from column `(name, type oid)` pairs and text rows
    pub fn new(columns: &[(&str, Oid)], rows: Vec<Vec<Option<&str>>>) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|(name, type_oid)| ResultColumn {
                    name: name.to_string(),
                    type_oid: *type_oid,
                })
                .collect(),
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(|v| v.map(str::to_string)).collect())
                .collect(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Positions of every output column carrying `name`
    pub fn column_positions(&self, name: &str) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.name == name)
            .map(|(i, _)| i)
            .collect()
    }

    /// Text value at `(row, col)`, `None` for NULL or out of range
    pub fn value(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|v| v.as_deref())
    }
}

/// The caller-owned database connection, seen through the two calls we need
pub trait Connection {
    /// Run a statement returning rows
    fn query(&self, sql: &str) -> DbResult<QueryResult>;

    /// Run a statement returning no rows; yields the affected row count
    fn execute(&self, sql: &str) -> DbResult<u64>;
}

/// Safe wrapper for PostgreSQL connection using libpq
pub struct PGConnection {
    conn: *mut PGconn,
}

impl PGConnection {
    /// Establishes a connection to PostgreSQL using the provided connection info.
    ///
    /// # Arguments
    /// * `conninfo` - A string containing connection parameters (e.g., "host=localhost port=5432 dbname=test")
    pub fn connect(conninfo: &str) -> DbResult<Self> {
        let c_conninfo = CString::new(conninfo)?;
        let conn = unsafe { PQconnectdb(c_conninfo.as_ptr()) };

        if conn.is_null() {
            return Err(DbError::connection("Failed to allocate connection object"));
        }

        let status = unsafe { PQstatus(conn) };
        if status != ConnStatusType::CONNECTION_OK {
            let error_msg = get_error_message(conn).unwrap_or("Unknown error".to_string());
            unsafe { PQfinish(conn) };
            return Err(DbError::connection(format!(
                "Connection failed: {}",
                error_msg.trim_end()
            )));
        }

        Ok(Self { conn })
    }

    /// Connects using a validated [`ConnectionConfig`](crate::core::ConnectionConfig)
    pub fn connect_with(config: &crate::core::ConnectionConfig) -> DbResult<Self> {
        Self::connect(&config.conninfo())
    }

    /// Executes a query on the PostgreSQL connection.
    ///
    /// Server-side failures are turned into [`DbError::Database`] carrying
    /// the server's message unchanged.
    pub fn exec(&self, query: &str) -> DbResult<PGResult> {
        let c_query = CString::new(query)?;
        let result = unsafe { PQexec(self.conn, c_query.as_ptr()) };

        if result.is_null() {
            let error_msg = get_error_message(self.conn).unwrap_or("Unknown error".to_string());

            return Err(DbError::database(format!(
                "Query execution failed: {}",
                error_msg.trim_end()
            )));
        }

        let result = PGResult { result };
        if !result.is_ok() {
            let error_msg = result
                .error_message()
                .or_else(|| get_error_message(self.conn))
                .unwrap_or("Unknown error".to_string());
            return Err(DbError::database(error_msg.trim_end()));
        }

        Ok(result)
    }
}

impl Connection for PGConnection {
    fn query(&self, sql: &str) -> DbResult<QueryResult> {
        debug!("query: {}", sql);
        let result = self.exec(sql)?;
        Ok(result.materialize())
    }

    fn execute(&self, sql: &str) -> DbResult<u64> {
        debug!("execute: {}", sql);
        let result = self.exec(sql)?;
        Ok(result.cmd_tuples())
    }
}

impl Drop for PGConnection {
    fn drop(&mut self) {
        if !self.conn.is_null() {
            unsafe { PQfinish(self.conn) };
        }
    }
}

fn get_error_message(conn: *const PGconn) -> Option<String> {
    unsafe {
        let error_ptr = PQerrorMessage(conn);
        if error_ptr.is_null() {
            None
        } else {
            Some(CStr::from_ptr(error_ptr).to_string_lossy().into_owned())
        }
    }
}

/// Safe wrapper for PostgreSQL result.
///
/// This struct provides a safe interface to PostgreSQL query results using libpq.
/// It handles access to result metadata and data values.
pub struct PGResult {
    result: *mut PGresult,
}

impl PGResult {
    /// Gets the status of the PostgreSQL result.
    pub fn status(&self) -> ExecStatusType {
        unsafe { PQresultStatus(self.result) }
    }

    /// Checks if the PostgreSQL result is successful.
    ///
    /// Returns true for PGRES_TUPLES_OK and PGRES_COMMAND_OK status codes.
    pub fn is_ok(&self) -> bool {
        matches!(
            self.status(),
            ExecStatusType::PGRES_TUPLES_OK | ExecStatusType::PGRES_COMMAND_OK
        )
    }

    /// Error message attached to a failed result
    pub fn error_message(&self) -> Option<String> {
        let msg_ptr = unsafe { PQresultErrorMessage(self.result) };
        if msg_ptr.is_null() {
            return None;
        }
        let msg = unsafe { CStr::from_ptr(msg_ptr).to_string_lossy().into_owned() };
        if msg.is_empty() { None } else { Some(msg) }
    }

    /// Gets the number of tuples (rows) in the result.
    pub fn ntuples(&self) -> i32 {
        unsafe { PQntuples(self.result) }
    }

    /// Gets the number of fields (columns) in the result.
    pub fn nfields(&self) -> i32 {
        unsafe { PQnfields(self.result) }
    }

    /// Name of the column at `col`
    pub fn fname(&self, col: i32) -> String {
        let name_ptr = unsafe { PQfname(self.result, col) };
        if name_ptr.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(name_ptr).to_string_lossy().into_owned() }
        }
    }

    /// Type OID of the column at `col`
    pub fn ftype(&self, col: i32) -> Oid {
        unsafe { PQftype(self.result, col) }
    }

    /// Whether the value at `(row, col)` is SQL NULL
    pub fn getisnull(&self, row: i32, col: i32) -> bool {
        unsafe { PQgetisnull(self.result, row, col) == 1 }
    }

    /// Gets a value from the result by row and column index.
    ///
    /// libpq reports NULL as an empty string, so NULL is checked first.
    pub fn getvalue(&self, row: i32, col: i32) -> Option<String> {
        if self.getisnull(row, col) {
            return None;
        }
        let value_ptr = unsafe { PQgetvalue(self.result, row, col) };
        if value_ptr.is_null() {
            None
        } else {
            unsafe { Some(CStr::from_ptr(value_ptr).to_string_lossy().into_owned()) }
        }
    }

    /// Number of rows affected by an INSERT / UPDATE / DELETE
    pub fn cmd_tuples(&self) -> u64 {
        let count_ptr = unsafe { PQcmdTuples(self.result) };
        if count_ptr.is_null() {
            return 0;
        }
        let count = unsafe { CStr::from_ptr(count_ptr).to_string_lossy().into_owned() };
        count.parse().unwrap_or(0)
    }

    /// Copy every column and value out of libpq memory
    pub fn materialize(&self) -> QueryResult {
        let nfields = self.nfields();
        let ntuples = self.ntuples();

        let columns = (0..nfields)
            .map(|col| ResultColumn {
                name: self.fname(col),
                type_oid: self.ftype(col),
            })
            .collect();

        let rows = (0..ntuples)
            .map(|row| (0..nfields).map(|col| self.getvalue(row, col)).collect())
            .collect();

        QueryResult { columns, rows }
    }
}

impl Drop for PGResult {
    fn drop(&mut self) {
        if !self.result.is_null() {
            unsafe { PQclear(self.result) };
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeConnection;
    use super::*;

    #[test]
    fn test_query_result_positions_and_values() {
        let result = QueryResult::new(
            &[("id", 23), ("name", 25), ("id", 23)],
            vec![vec![Some("1"), None, Some("1")]],
        );

        assert_eq!(result.row_count(), 1);
        assert_eq!(result.column_positions("id"), vec![0, 2]);
        assert!(result.column_positions("missing").is_empty());
        assert_eq!(result.value(0, 0), Some("1"));
        assert_eq!(result.value(0, 1), None);
        assert_eq!(result.value(5, 0), None);
    }

    #[test]
    fn test_fake_connection_records_statements() {
        let conn = FakeConnection::new()
            .with_result(QueryResult::default())
            .with_affected(2);

        assert!(conn.query("SELECT 1").is_ok());
        assert!(conn.query("SELECT 2").is_err());
        assert_eq!(conn.execute("UPDATE t SET a = 1").unwrap(), 2);
        assert_eq!(conn.statements().len(), 3);
        assert_eq!(conn.last_statement(), "UPDATE t SET a = 1");
    }
}

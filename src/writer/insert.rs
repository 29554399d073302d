//! Multi-row INSERT

use super::{SourceColumn, SpecialNames, TargetSchema, render_rows, resolve_source};
use crate::core::errors::DbResult;
use crate::types::RecordSet;
use crate::utils::connection::Connection;
use crate::utils::quote::quote_ident;
use tracing::{debug, info, instrument};

/// Which columns an insert writes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertOptions {
    /// Defaults to every column of the record set
    pub write_cols: Option<Vec<String>>,
    /// Defaults to the record set's geometry column name
    pub geom_name: Option<String>,
    /// Defaults to the record set's hstore column name
    pub hstore_name: Option<String>,
}

impl InsertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_cols<I, S>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.write_cols = Some(cols.into_iter().map(Into::into).collect());
        self
    }

    pub fn geom_name(mut self, name: impl Into<String>) -> Self {
        self.geom_name = Some(name.into());
        self
    }

    pub fn hstore_name(mut self, name: impl Into<String>) -> Self {
        self.hstore_name = Some(name.into());
        self
    }
}

/// Append every row of `records` to `table` in one statement
///
/// Returns the number of rows the server reports as inserted. An empty
/// record set is still checked against `table` but writes nothing and returns 0.
///
/// # Errors
/// - [`DbError::ColumnMismatch`](crate::DbError::ColumnMismatch) if a write
///   column is missing from `records` or from `table`
/// - [`DbError::Database`](crate::DbError::Database) for anything the server rejects
#[instrument(level = "debug", skip_all, fields(table = %table))]
pub fn insert<C>(conn: &C, records: &RecordSet, table: &str, options: &InsertOptions) -> DbResult<u64>
where
    C: Connection + ?Sized,
{
    let names = SpecialNames::resolve(
        records,
        options.geom_name.as_deref(),
        options.hstore_name.as_deref(),
    )?;

    let write_cols: Vec<String> = match &options.write_cols {
        Some(cols) => cols.clone(),
        None => records.column_names().into_iter().map(str::to_string).collect(),
    };

    let sources = write_cols
        .iter()
        .map(|col| resolve_source(records, &names, col))
        .collect::<DbResult<Vec<SourceColumn>>>()?;

    let schema = TargetSchema::load(conn, table)?;
    let casts = write_cols
        .iter()
        .map(|col| schema.require(col).map(|c| c.cast()))
        .collect::<DbResult<Vec<String>>>()?;

    if records.is_empty() {
        debug!("nothing to insert into {}", schema.table);
        return Ok(0);
    }

    let sql = build_insert(&schema, records, &write_cols, sources.into_iter().zip(casts).collect());
    debug!("insert statement: {}", sql);

    let inserted = conn.execute(&sql)?;
    info!("inserted {} rows into {}", inserted, schema.table);
    Ok(inserted)
}

fn build_insert(
    schema: &TargetSchema,
    records: &RecordSet,
    write_cols: &[String],
    sources: Vec<(SourceColumn, String)>,
) -> String {
    let columns: Vec<String> = write_cols.iter().map(|c| quote_ident(c)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        schema.table.quoted(),
        columns.join(", "),
        render_rows(records, &sources).join(", ")
    )
}

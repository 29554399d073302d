//! Table writer
//!
//! Builds one INSERT or UPDATE statement from a [`RecordSet`] and runs it on
//! the caller's connection. Every value is written as a quoted literal cast
//! to the target column's type, so geometries go in as EWKT and hstore cells
//! as hstore text. The record set is never modified.

pub mod insert;
pub mod schema;
pub mod update;

pub use insert::{InsertOptions, insert};
pub use schema::{TargetColumn, TargetSchema};
pub use update::{UpdateOptions, update};

use crate::core::errors::{ColumnLocation, DbError, DbResult};
use crate::types::RecordSet;
use crate::utils::quote::quote_literal;

/// Where a written column's values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceColumn {
    Scalar(usize),
    Geometry,
    Hstore,
}

/// Names the special columns are written under
struct SpecialNames<'a> {
    geom: Option<&'a str>,
    hstore: Option<&'a str>,
}

impl<'a> SpecialNames<'a> {
    /// Resolve the writer's `geom_name` / `hstore_name` against the record set
    fn resolve(
        records: &'a RecordSet,
        geom_name: Option<&'a str>,
        hstore_name: Option<&'a str>,
    ) -> DbResult<Self> {
        let geom = match (geom_name, records.spatial()) {
            (Some(name), Some(spatial)) if spatial.name() == name => Some(name),
            (Some(name), _) => {
                return Err(DbError::column_mismatch(name, ColumnLocation::Source));
            }
            (None, spatial) => spatial.map(|s| s.name()),
        };

        let hstore = match (hstore_name, records.hstore()) {
            (Some(name), Some(hstore)) if hstore.name() == name => Some(name),
            (Some(name), _) => {
                return Err(DbError::column_mismatch(name, ColumnLocation::Source));
            }
            (None, hstore) => hstore.map(|h| h.name()),
        };

        Ok(Self { geom, hstore })
    }

    fn role_of(&self, column: &str) -> Option<SourceColumn> {
        if self.geom == Some(column) {
            Some(SourceColumn::Geometry)
        } else if self.hstore == Some(column) {
            Some(SourceColumn::Hstore)
        } else {
            None
        }
    }
}

fn resolve_source(
    records: &RecordSet,
    names: &SpecialNames<'_>,
    column: &str,
) -> DbResult<SourceColumn> {
    if let Some(role) = names.role_of(column) {
        return Ok(role);
    }
    records
        .column_index(column)
        .map(SourceColumn::Scalar)
        .ok_or_else(|| DbError::column_mismatch(column, ColumnLocation::Source))
}

/// Literal for one cell, cast to the target column type
fn render_value(records: &RecordSet, row: usize, source: SourceColumn, cast: &str) -> String {
    let text = match source {
        SourceColumn::Scalar(col) => records.rows()[row][col].to_text(),
        SourceColumn::Geometry => records.spatial().and_then(|s| s.to_ewkt(row)),
        SourceColumn::Hstore => records
            .hstore()
            .and_then(|h| h.cell(row))
            .map(|cell| cell.to_text()),
    };

    match text {
        Some(text) => format!("{}::{}", quote_literal(&text), cast),
        None => format!("NULL::{}", cast),
    }
}

/// `(v1, v2, ...)` tuples for every row
fn render_rows(records: &RecordSet, sources: &[(SourceColumn, String)]) -> Vec<String> {
    (0..records.len())
        .map(|row| {
            let values: Vec<String> = sources
                .iter()
                .map(|(source, cast)| render_value(records, row, *source, cast))
                .collect();
            format!("({})", values.join(", "))
        })
        .collect()
}

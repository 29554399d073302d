//! Target table column lookup through `information_schema`

use crate::core::errors::{ColumnLocation, DbError, DbResult};
use crate::utils::connection::Connection;
use crate::utils::quote::{TableName, quote_ident};
use tracing::{debug, warn};

/// A column of the target table and the type its values are cast to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetColumn {
    pub name: String,
    pub udt_schema: String,
    pub udt_name: String,
}

impl TargetColumn {
    /// Quoted, schema-qualified type name for a `::` cast
    pub fn cast(&self) -> String {
        format!("{}.{}", quote_ident(&self.udt_schema), quote_ident(&self.udt_name))
    }
}

/// Columns of the table a write goes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSchema {
    pub table: TableName,
    pub columns: Vec<TargetColumn>,
}

impl TargetSchema {
    /// Read the column list of `table`
    ///
    /// A table that does not exist yields an empty column list, so every
    /// write column is then reported as missing from the target.
    pub fn load<C>(conn: &C, table: &str) -> DbResult<Self>
    where
        C: Connection + ?Sized,
    {
        let table = TableName::parse(table);
        let sql = format!(
            "SELECT column_name, udt_schema, udt_name FROM information_schema.columns WHERE {} ORDER BY ordinal_position",
            table.schema_predicate()
        );
        let result = conn.query(&sql)?;

        let columns: Vec<TargetColumn> = result
            .rows
            .iter()
            .filter_map(|row| match row.as_slice() {
                [Some(name), Some(udt_schema), Some(udt_name)] => Some(TargetColumn {
                    name: name.clone(),
                    udt_schema: udt_schema.clone(),
                    udt_name: udt_name.clone(),
                }),
                _ => None,
            })
            .collect();

        if columns.is_empty() {
            warn!("table {} has no visible columns", table);
        } else {
            debug!("table {} has {} columns", table, columns.len());
        }

        Ok(Self { table, columns })
    }

    pub fn column(&self, name: &str) -> Option<&TargetColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The named column, or a target-side column mismatch
    pub fn require(&self, name: &str) -> DbResult<&TargetColumn> {
        self.column(name)
            .ok_or_else(|| DbError::column_mismatch(name, ColumnLocation::Target))
    }
}

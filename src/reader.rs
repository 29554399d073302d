//! Query reader
//!
//! Runs a caller-supplied SELECT once and decodes the optional geometry and
//! hstore output columns into a [`RecordSet`]. Every other output column is
//! decoded as a scalar by its type OID.

use crate::core::errors::{DbError, DbResult};
use crate::geometry::SpatialColumn;
use crate::hstore::HstoreColumn;
use crate::types::{ColumnValue, RecordSet};
use crate::utils::connection::{Connection, QueryResult};
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::collections::HashSet;
use tracing::{debug, info, instrument};

/// Which output columns carry the special encodings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub geom_name: Option<String>,
    pub hstore_name: Option<String>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
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

/// Run `statement` and decode its result
///
/// # Errors
/// - [`DbError::Query`] if `statement` is not a single SELECT
/// - [`DbError::Decode`] if a named column is missing, ambiguous or malformed
/// - [`DbError::Database`] for anything the server rejects
#[instrument(level = "debug", skip_all)]
pub fn get_query<C>(conn: &C, statement: &str, options: &ReadOptions) -> DbResult<RecordSet>
where
    C: Connection + ?Sized,
{
    check_read_statement(statement)?;

    if let (Some(geom), Some(hstore)) = (&options.geom_name, &options.hstore_name) {
        if geom == hstore {
            return Err(DbError::decode_column(
                "geometry and hstore columns cannot share a name",
                geom.as_str(),
            ));
        }
    }

    let result = conn.query(statement)?;
    debug!(
        "query returned {} rows, {} columns",
        result.row_count(),
        result.columns.len()
    );

    let geom_pos = options
        .geom_name
        .as_deref()
        .map(|name| locate_column(&result, name))
        .transpose()?;
    let hstore_pos = options
        .hstore_name
        .as_deref()
        .map(|name| locate_column(&result, name))
        .transpose()?;

    let spatial = match (geom_pos, options.geom_name.as_deref()) {
        (Some(pos), Some(name)) => Some(SpatialColumn::decode(name, &column_values(&result, pos))?),
        _ => None,
    };
    let hstore = match (hstore_pos, options.hstore_name.as_deref()) {
        (Some(pos), Some(name)) => Some(HstoreColumn::decode(name, &column_values(&result, pos))?),
        _ => None,
    };

    let scalar_positions: Vec<usize> = (0..result.columns.len())
        .filter(|pos| Some(*pos) != geom_pos && Some(*pos) != hstore_pos)
        .collect();

    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(scalar_positions.len());
    for &pos in &scalar_positions {
        let name = &result.columns[pos].name;
        if !seen.insert(name.as_str()) {
            return Err(DbError::decode_column("duplicate output column", name.as_str()));
        }
        columns.push(name.clone());
    }

    let rows = result
        .rows
        .iter()
        .map(|row| {
            scalar_positions
                .iter()
                .map(|&pos| ColumnValue::decode(result.columns[pos].type_oid, row[pos].as_deref()))
                .collect()
        })
        .collect();

    let mut records = RecordSet::new(columns, rows)?;
    if let Some(spatial) = spatial {
        debug!(
            "decoded geometry column {} as {:?} (SRID {})",
            spatial.name(),
            spatial.kind(),
            spatial.srid()
        );
        records = records.with_spatial(spatial)?;
    }
    if let Some(hstore) = hstore {
        records = records.with_hstore(hstore)?;
    }

    info!("read {} rows", records.len());
    Ok(records)
}

/// Position of the single output column called `name`
fn locate_column(result: &QueryResult, name: &str) -> DbResult<usize> {
    match result.column_positions(name).as_slice() {
        [pos] => Ok(*pos),
        [] => Err(DbError::decode_column("column not found in query result", name)),
        _ => Err(DbError::decode_column(
            "column name is ambiguous in query result",
            name,
        )),
    }
}

fn column_values(result: &QueryResult, pos: usize) -> Vec<Option<&str>> {
    result.rows.iter().map(|row| row[pos].as_deref()).collect()
}

/// Accept only a single read-only query
///
/// The statement is parsed with the PostgreSQL dialect. It must be exactly
/// one query whose every branch (set operations, CTEs, nested queries) is a
/// SELECT or TABLE without `INTO`.
pub fn check_read_statement(statement: &str) -> DbResult<()> {
    let dialect = PostgreSqlDialect {};
    let statements = Parser::parse_sql(&dialect, statement)
        .map_err(|e| DbError::query(format!("statement could not be parsed: {}", e)))?;

    match statements.as_slice() {
        [Statement::Query(query)] => check_read_query(query),
        [] => Err(DbError::query("empty statement")),
        [other] => Err(DbError::query(format!(
            "only SELECT statements are supported, got '{}'",
            other
        ))),
        _ => Err(DbError::query(format!(
            "multiple statements are not supported (got {})",
            statements.len()
        ))),
    }
}

fn check_read_query(query: &Query) -> DbResult<()> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            check_read_query(&cte.query)?;
        }
    }
    check_read_body(&query.body)
}

fn check_read_body(body: &SetExpr) -> DbResult<()> {
    match body {
        SetExpr::Select(select) if select.into.is_some() => Err(DbError::query(
            "SELECT ... INTO writes a table and is not supported",
        )),
        SetExpr::Select(_) | SetExpr::Table(_) => Ok(()),
        SetExpr::Query(query) => check_read_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            check_read_body(left)?;
            check_read_body(right)
        }
        _ => Err(DbError::query("only SELECT statements are supported")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeometryKind;
    use crate::utils::connection::testing::FakeConnection;

    const INT4: u32 = 23;
    const TEXT: u32 = 25;
    // Extension types get OIDs at install time
    const GEOMETRY: u32 = 16390;
    const HSTORE: u32 = 16500;

    fn country_result() -> QueryResult {
        QueryResult::new(
            &[("id", INT4), ("name", TEXT), ("geom", GEOMETRY), ("translations", HSTORE)],
            vec![
                vec![
                    Some("1"),
                    Some("Spain"),
                    Some("SRID=4326;POLYGON((0 0,1 0,1 1,0 0))"),
                    Some(r#""en"=>"Spain", "es"=>"España""#),
                ],
                vec![
                    Some("2"),
                    Some("France"),
                    Some("SRID=4326;POLYGON((2 2,3 2,3 3,2 2))"),
                    None,
                ],
            ],
        )
    }

    #[test]
    fn test_check_read_statement() {
        assert!(check_read_statement("SELECT 1").is_ok());
        assert!(check_read_statement("  select * from t;  ").is_ok());
        assert!(check_read_statement("-- leading\n(SELECT 1)").is_ok());
        assert!(check_read_statement("SELECT ';' AS semi, \"a;b\" FROM t").is_ok());
        assert!(check_read_statement("SELECT 1; -- done").is_ok());
        assert!(check_read_statement("SELECT $$;x$$ AS semi").is_ok());
        assert!(
            check_read_statement("WITH c AS (SELECT 1 AS a) SELECT a FROM c UNION SELECT 2")
                .is_ok()
        );
        assert!(
            check_read_statement("SELECT id, ST_AsText(geom) AS geom, tags FROM country WHERE id > 1 ORDER BY id")
                .is_ok()
        );

        assert!(matches!(
            check_read_statement("DELETE FROM t"),
            Err(DbError::Query { .. })
        ));
        assert!(matches!(
            check_read_statement("SELECT 1; DROP TABLE t"),
            Err(DbError::Query { .. })
        ));
        assert!(check_read_statement("").is_err());
        assert!(check_read_statement("selection").is_err());
    }

    #[test]
    fn test_quoting_cannot_hide_a_second_statement() {
        assert!(matches!(
            check_read_statement(r"SELECT E'\'' ; DROP TABLE t; --"),
            Err(DbError::Query { .. })
        ));
        assert!(matches!(
            check_read_statement("SELECT $a$'$a$; DROP TABLE t; --"),
            Err(DbError::Query { .. })
        ));
    }

    #[test]
    fn test_select_into_is_rejected() {
        assert!(matches!(
            check_read_statement("SELECT * INTO copy FROM t"),
            Err(DbError::Query { .. })
        ));
        assert!(check_read_statement("SELECT 1 UNION (SELECT * INTO copy FROM t)").is_err());
    }

    #[test]
    fn test_non_select_never_reaches_connection() {
        let conn = FakeConnection::new().with_result(country_result());
        let result = get_query(&conn, "UPDATE country SET name = 'x'", &ReadOptions::new());
        assert!(matches!(result, Err(DbError::Query { .. })));
        assert!(conn.statements().is_empty());
    }

    #[test]
    fn test_plain_read() {
        let conn = FakeConnection::new().with_result(country_result());
        let records = get_query(&conn, "SELECT * FROM country", &ReadOptions::new()).unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.spatial().is_none());
        assert!(records.hstore().is_none());
        assert_eq!(records.value(0, "id"), Some(&ColumnValue::Int(1)));
        // Unknown extension OIDs stay text
        assert!(matches!(records.value(0, "geom"), Some(ColumnValue::Text(_))));
        assert_eq!(conn.last_statement(), "SELECT * FROM country");
    }

    #[test]
    fn test_read_with_geometry_and_hstore() {
        let conn = FakeConnection::new().with_result(country_result());
        let options = ReadOptions::new()
            .geom_name("geom")
            .hstore_name("translations");
        let records = get_query(&conn, "SELECT * FROM country", &options).unwrap();

        assert_eq!(records.columns(), &["id".to_string(), "name".to_string()]);

        let spatial = records.spatial().unwrap();
        assert_eq!(spatial.srid(), 4326);
        assert_eq!(spatial.kind(), Some(GeometryKind::Polygon));
        assert_eq!(spatial.len(), 2);

        let hstore = records.hstore().unwrap();
        assert_eq!(hstore.get("es"), vec![Some("España"), None]);
        assert_eq!(hstore.get("fr"), vec![None, None]);
    }

    #[test]
    fn test_missing_named_column() {
        let conn = FakeConnection::new().with_result(country_result());
        let options = ReadOptions::new().geom_name("the_geom");
        let err = get_query(&conn, "SELECT * FROM country", &options).unwrap_err();
        assert!(matches!(err, DbError::Decode { column: Some(ref c), .. } if c == "the_geom"));
    }

    #[test]
    fn test_colliding_names_are_rejected() {
        let result = QueryResult::new(
            &[("geom", GEOMETRY), ("geom", TEXT)],
            vec![vec![Some("POINT(0 0)"), Some("x")]],
        );
        let conn = FakeConnection::new().with_result(result);
        let err = get_query(&conn, "SELECT a.geom, b.geom FROM a, b", &ReadOptions::new().geom_name("geom"))
            .unwrap_err();
        assert!(err.to_string().contains("ambiguous"));

        let conn = FakeConnection::new();
        let options = ReadOptions::new().geom_name("x").hstore_name("x");
        assert!(matches!(
            get_query(&conn, "SELECT 1", &options),
            Err(DbError::Decode { .. })
        ));
    }

    #[test]
    fn test_malformed_values_report_row() {
        let result = QueryResult::new(
            &[("id", INT4), ("tags", HSTORE)],
            vec![vec![Some("1"), Some("a=>1")], vec![Some("2"), Some("a=>")]],
        );
        let conn = FakeConnection::new().with_result(result);
        let err = get_query(&conn, "SELECT * FROM t", &ReadOptions::new().hstore_name("tags"))
            .unwrap_err();
        assert!(matches!(err, DbError::Decode { row: Some(1), .. }));

        let result = QueryResult::new(&[("geom", GEOMETRY)], vec![vec![Some("POLYGON((")]]);
        let conn = FakeConnection::new().with_result(result);
        let err = get_query(&conn, "SELECT * FROM t", &ReadOptions::new().geom_name("geom"))
            .unwrap_err();
        assert!(matches!(err, DbError::Decode { row: Some(0), .. }));
    }

    #[test]
    fn test_server_error_propagates() {
        let conn = FakeConnection::new();
        let err = get_query(&conn, "SELECT * FROM missing", &ReadOptions::new()).unwrap_err();
        assert!(matches!(err, DbError::Database { .. }));
    }
}

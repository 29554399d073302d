//! UPDATE ... FROM (VALUES ...) keyed on identifying columns

use super::{SourceColumn, SpecialNames, TargetSchema, render_rows, resolve_source};
use crate::core::errors::{DbError, DbResult};
use crate::hstore::HstoreUpdateMode;
use crate::types::RecordSet;
use crate::utils::connection::Connection;
use crate::utils::quote::quote_ident;
use tracing::{debug, info, instrument};

const TARGET_ALIAS: &str = "target";
const SOURCE_ALIAS: &str = "new_data";

/// Which columns identify rows and which get overwritten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOptions {
    pub id_cols: Vec<String>,
    pub update_cols: Vec<String>,
    /// Defaults to the record set's geometry column name
    pub geom_name: Option<String>,
    /// Defaults to the record set's hstore column name
    pub hstore_name: Option<String>,
    /// Merge hstore cells into the target (true) or replace them (false)
    pub hstore_concat: bool,
}

impl UpdateOptions {
    pub fn new<I, J, S, T>(id_cols: I, update_cols: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            id_cols: id_cols.into_iter().map(Into::into).collect(),
            update_cols: update_cols.into_iter().map(Into::into).collect(),
            geom_name: None,
            hstore_name: None,
            hstore_concat: true,
        }
    }

    pub fn geom_name(mut self, name: impl Into<String>) -> Self {
        self.geom_name = Some(name.into());
        self
    }

    pub fn hstore_name(mut self, name: impl Into<String>) -> Self {
        self.hstore_name = Some(name.into());
        self
    }

    pub fn hstore_concat(mut self, concat: bool) -> Self {
        self.hstore_concat = concat;
        self
    }

    pub fn hstore_mode(&self) -> HstoreUpdateMode {
        HstoreUpdateMode::from_concat_flag(self.hstore_concat)
    }
}

/// Overwrite `update_cols` of the rows of `table` matching `records` on `id_cols`
///
/// Returns the number of rows the server reports as updated. An empty
/// record set is still checked against `table` but writes nothing and returns 0.
///
/// # Errors
/// - [`DbError::InvalidColumnRole`] for empty column sets, a column in both
///   sets, or the geometry / hstore column used as an id column
/// - [`DbError::ColumnMismatch`] if a column is missing from `records` or `table`
/// - [`DbError::Database`] for anything the server rejects
#[instrument(level = "debug", skip_all, fields(table = %table))]
pub fn update<C>(conn: &C, records: &RecordSet, table: &str, options: &UpdateOptions) -> DbResult<u64>
where
    C: Connection + ?Sized,
{
    check_roles(records, options)?;

    let names = SpecialNames::resolve(
        records,
        options.geom_name.as_deref(),
        options.hstore_name.as_deref(),
    )?;

    let all_cols: Vec<&String> = options.id_cols.iter().chain(&options.update_cols).collect();
    let sources = all_cols
        .iter()
        .map(|col| resolve_source(records, &names, col))
        .collect::<DbResult<Vec<SourceColumn>>>()?;

    let schema = TargetSchema::load(conn, table)?;
    let casts = all_cols
        .iter()
        .map(|col| schema.require(col).map(|c| c.cast()))
        .collect::<DbResult<Vec<String>>>()?;

    if records.is_empty() {
        debug!("nothing to update in {}", schema.table);
        return Ok(0);
    }

    let hstore_cast = all_cols
        .iter()
        .zip(&sources)
        .zip(&casts)
        .find(|((_, source), _)| **source == SourceColumn::Hstore)
        .map(|(_, cast)| cast.clone());

    let sql = build_update(
        &schema,
        records,
        options,
        &all_cols,
        sources.into_iter().zip(casts).collect(),
        hstore_cast.as_deref(),
        names.hstore,
    );
    debug!("update statement: {}", sql);

    let updated = conn.execute(&sql)?;
    info!("updated {} rows in {}", updated, schema.table);
    Ok(updated)
}

fn check_roles(records: &RecordSet, options: &UpdateOptions) -> DbResult<()> {
    if options.id_cols.is_empty() {
        return Err(DbError::column_role("id_cols", "at least one id column is required"));
    }
    if options.update_cols.is_empty() {
        return Err(DbError::column_role(
            "update_cols",
            "at least one column to update is required",
        ));
    }

    let geom_name = options
        .geom_name
        .as_deref()
        .or_else(|| records.spatial().map(|s| s.name()));
    let hstore_name = options
        .hstore_name
        .as_deref()
        .or_else(|| records.hstore().map(|h| h.name()));

    for id in &options.id_cols {
        if Some(id.as_str()) == geom_name {
            return Err(DbError::column_role(
                id.as_str(),
                "the geometry column cannot be an id column",
            ));
        }
        if Some(id.as_str()) == hstore_name {
            return Err(DbError::column_role(
                id.as_str(),
                "the hstore column cannot be an id column",
            ));
        }
        if options.update_cols.contains(id) {
            return Err(DbError::column_role(
                id.as_str(),
                "a column cannot be both an id column and an update column",
            ));
        }
    }

    Ok(())
}

fn build_update(
    schema: &TargetSchema,
    records: &RecordSet,
    options: &UpdateOptions,
    all_cols: &[&String],
    sources: Vec<(SourceColumn, String)>,
    hstore_cast: Option<&str>,
    hstore_name: Option<&str>,
) -> String {
    let target = quote_ident(TARGET_ALIAS);
    let source = quote_ident(SOURCE_ALIAS);

    let assignments: Vec<String> = options
        .update_cols
        .iter()
        .map(|col| {
            let column = quote_ident(col);
            match (hstore_name, hstore_cast, options.hstore_mode()) {
                (Some(name), Some(cast), HstoreUpdateMode::Concat) if name == col.as_str() => format!(
                    "{col} = COALESCE({target}.{col}, ''::{cast}) || {source}.{col}",
                    col = column,
                    target = target,
                    source = source,
                    cast = cast
                ),
                _ => format!("{} = {}.{}", column, source, column),
            }
        })
        .collect();

    let conditions: Vec<String> = options
        .id_cols
        .iter()
        .map(|col| {
            let column = quote_ident(col);
            format!("{}.{} = {}.{}", target, column, source, column)
        })
        .collect();

    let aliases: Vec<String> = all_cols.iter().map(|c| quote_ident(c)).collect();

    format!(
        "UPDATE {} AS {} SET {} FROM (VALUES {}) AS {} ({}) WHERE {}",
        schema.table.quoted(),
        target,
        assignments.join(", "),
        render_rows(records, &sources).join(", "),
        source,
        aliases.join(", "),
        conditions.join(" AND ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ColumnLocation;
    use crate::geometry::SpatialColumn;
    use crate::hstore::{HstoreCell, HstoreColumn};
    use crate::types::ColumnValue;
    use crate::utils::connection::testing::FakeConnection;
    use crate::writer::schema::tests::schema_result;

    fn country_schema() -> crate::utils::connection::QueryResult {
        schema_result(&[
            ("id", "pg_catalog", "int4"),
            ("name", "pg_catalog", "text"),
            ("geom", "public", "geometry"),
            ("translations", "public", "hstore"),
        ])
    }

    fn countries() -> RecordSet {
        RecordSet::new(
            vec!["id".into(), "name".into()],
            vec![vec![ColumnValue::Int(7), "Spain".into()]],
        )
        .unwrap()
        .with_spatial(SpatialColumn::decode("geom", &[Some("POINT(1 2)")]).unwrap())
        .unwrap()
        .with_hstore(HstoreColumn::new(
            "translations",
            vec![HstoreCell::from_iter([("es", "bonjour"), ("fr", "oui")])],
        ))
        .unwrap()
    }

    #[test]
    fn test_update_concat_mode() {
        let conn = FakeConnection::new()
            .with_result(country_schema())
            .with_affected(1);

        let options = UpdateOptions::new(["id"], ["name", "translations"]);
        assert!(options.hstore_concat);
        let updated = update(&conn, &countries(), "country", &options).unwrap();
        assert_eq!(updated, 1);

        assert_eq!(
            conn.last_statement(),
            concat!(
                r#"UPDATE "country" AS "target" SET "name" = "new_data"."name", "#,
                r#""translations" = COALESCE("target"."translations", ''::"public"."hstore") || "new_data"."translations" "#,
                r#"FROM (VALUES ('7'::"pg_catalog"."int4", 'Spain'::"pg_catalog"."text", "#,
                r#"'"es"=>"bonjour", "fr"=>"oui"'::"public"."hstore")) "#,
                r#"AS "new_data" ("id", "name", "translations") "#,
                r#"WHERE "target"."id" = "new_data"."id""#
            )
        );
    }

    #[test]
    fn test_update_replace_mode() {
        let conn = FakeConnection::new().with_result(country_schema());

        let options = UpdateOptions::new(["id"], ["translations"]).hstore_concat(false);
        update(&conn, &countries(), "country", &options).unwrap();

        let sql = conn.last_statement();
        assert!(sql.contains(r#"SET "translations" = "new_data"."translations" FROM"#));
        assert!(!sql.contains("COALESCE"));
    }

    #[test]
    fn test_update_geometry_column() {
        let conn = FakeConnection::new().with_result(country_schema());

        let options = UpdateOptions::new(["id", "name"], ["geom"]);
        update(&conn, &countries(), "country", &options).unwrap();

        let sql = conn.last_statement();
        assert!(sql.contains(r#"'POINT(1 2)'::"public"."geometry""#));
        assert!(sql.contains(r#"WHERE "target"."id" = "new_data"."id" AND "target"."name" = "new_data"."name""#));
    }

    #[test]
    fn test_update_rejects_special_id_columns() {
        let conn = FakeConnection::new();

        let options = UpdateOptions::new(["geom"], ["name"]);
        let err = update(&conn, &countries(), "country", &options).unwrap_err();
        assert!(matches!(err, DbError::InvalidColumnRole { ref column, .. } if column == "geom"));

        let options = UpdateOptions::new(["id", "translations"], ["name"]);
        let err = update(&conn, &countries(), "country", &options).unwrap_err();
        assert!(matches!(err, DbError::InvalidColumnRole { .. }));

        // Explicit names count even without a matching attribute
        let plain = RecordSet::new(vec!["shape".into()], vec![vec!["x".into()]]).unwrap();
        let options = UpdateOptions::new(["shape"], ["other"]).geom_name("shape");
        assert!(matches!(
            update(&conn, &plain, "country", &options),
            Err(DbError::InvalidColumnRole { .. })
        ));

        assert!(conn.statements().is_empty());
    }

    #[test]
    fn test_update_rejects_bad_role_sets() {
        let conn = FakeConnection::new();
        let empty: [&str; 0] = [];

        let options = UpdateOptions::new(empty, ["name"]);
        assert!(matches!(
            update(&conn, &countries(), "country", &options),
            Err(DbError::InvalidColumnRole { .. })
        ));

        let options = UpdateOptions::new(["id"], empty);
        assert!(update(&conn, &countries(), "country", &options).is_err());

        let options = UpdateOptions::new(["id"], ["id", "name"]);
        assert!(update(&conn, &countries(), "country", &options).is_err());
    }

    #[test]
    fn test_update_rejects_unknown_columns() {
        let conn = FakeConnection::new().with_result(schema_result(&[
            ("id", "pg_catalog", "int4"),
            ("translations", "public", "hstore"),
        ]));

        let options = UpdateOptions::new(["id"], ["name"]);
        let err = update(&conn, &countries(), "country", &options).unwrap_err();
        assert!(matches!(
            err,
            DbError::ColumnMismatch { location: ColumnLocation::Target, .. }
        ));

        let options = UpdateOptions::new(["id"], ["population"]);
        let err = update(&conn, &countries(), "country", &options).unwrap_err();
        assert!(matches!(
            err,
            DbError::ColumnMismatch { location: ColumnLocation::Source, .. }
        ));
    }

    #[test]
    fn test_update_empty_record_set_writes_nothing() {
        let conn = FakeConnection::new().with_result(country_schema());
        let empty = countries().subset(&[]).unwrap();

        let options = UpdateOptions::new(["id"], ["translations"]);
        assert_eq!(update(&conn, &empty, "country", &options).unwrap(), 0);
        assert_eq!(conn.statements().len(), 1);
        assert!(!conn.last_statement().starts_with("UPDATE"));
    }

    #[test]
    fn test_update_empty_record_set_still_checks_target_columns() {
        let conn = FakeConnection::new().with_result(schema_result(&[
            ("id", "pg_catalog", "int4"),
            ("translations", "public", "hstore"),
        ]));
        let empty = countries().subset(&[]).unwrap();

        let options = UpdateOptions::new(["id"], ["name"]);
        let err = update(&conn, &empty, "country", &options).unwrap_err();
        assert!(matches!(
            err,
            DbError::ColumnMismatch { location: ColumnLocation::Target, .. }
        ));
    }
}

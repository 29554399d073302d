//! SQL quoting helpers
//!
//! Every identifier and literal we splice into generated SQL passes through
//! here. Literals follow `standard_conforming_strings = on`; values holding a
//! backslash are written in the `E'...'` form so they survive either setting.

/// Quote an identifier, doubling embedded double quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a string literal
pub fn quote_literal(value: &str) -> String {
    let escaped = value.replace('\'', "''");
    if value.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{}'", escaped)
    }
}

/// A possibly schema-qualified table name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    /// Split `schema.table` (or a bare `table`) on the first dot
    pub fn parse(table: &str) -> Self {
        match table.split_once('.') {
            Some((schema, name)) => Self {
                schema: Some(schema.to_string()),
                name: name.to_string(),
            },
            None => Self {
                schema: None,
                name: table.to_string(),
            },
        }
    }

    /// Quoted form for use in a FROM / INTO / UPDATE clause
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }

    /// Predicate selecting this table's rows from `information_schema.columns`
    pub fn schema_predicate(&self) -> String {
        let schema = match &self.schema {
            Some(schema) => quote_literal(schema),
            None => "current_schema()".to_string(),
        };
        format!(
            "table_schema = {} AND table_name = {}",
            schema,
            quote_literal(&self.name)
        )
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("name"), "\"name\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_literal(r#""k"=>"a\"b""#), r#"E'"k"=>"a\\"b"'"#);
    }

    #[test]
    fn test_table_name_parse() {
        let table = TableName::parse("public.country");
        assert_eq!(table.schema.as_deref(), Some("public"));
        assert_eq!(table.quoted(), "\"public\".\"country\"");
        assert_eq!(
            table.schema_predicate(),
            "table_schema = 'public' AND table_name = 'country'"
        );

        let table = TableName::parse("country");
        assert_eq!(table.schema, None);
        assert_eq!(
            table.schema_predicate(),
            "table_schema = current_schema() AND table_name = 'country'"
        );
        assert_eq!(table.to_string(), "country");
    }
}

//! Data structures shared by the reader and the writer
//! Contains the type OID table, scalar column values and the record set

use crate::core::errors::{DbError, DbResult};
use crate::geometry::SpatialColumn;
use crate::hstore::HstoreColumn;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use libpq_sys::Oid;
use serde::Serialize;
use std::collections::HashSet;
use tracing::warn;
use uuid::Uuid;

/// Built-in types with a fixed OID that scalar decoding distinguishes
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgType {
    Bool = 16,
    Char = 18,
    Name = 19,
    Int8 = 20,
    Int2 = 21,
    Int4 = 23,
    Text = 25,
    Oid = 26,
    Json = 114,
    Float4 = 700,
    Float8 = 701,
    Unknown = 705,
    Bpchar = 1042,
    Varchar = 1043,
    Date = 1082,
    Timestamp = 1114,
    Timestamptz = 1184,
    Numeric = 1700,
    Uuid = 2950,
    Jsonb = 3802,
}

impl TryFrom<u32> for PgType {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            16 => Ok(PgType::Bool),
            18 => Ok(PgType::Char),
            19 => Ok(PgType::Name),
            20 => Ok(PgType::Int8),
            21 => Ok(PgType::Int2),
            23 => Ok(PgType::Int4),
            25 => Ok(PgType::Text),
            26 => Ok(PgType::Oid),
            114 => Ok(PgType::Json),
            700 => Ok(PgType::Float4),
            701 => Ok(PgType::Float8),
            705 => Ok(PgType::Unknown),
            1042 => Ok(PgType::Bpchar),
            1043 => Ok(PgType::Varchar),
            1082 => Ok(PgType::Date),
            1114 => Ok(PgType::Timestamp),
            1184 => Ok(PgType::Timestamptz),
            1700 => Ok(PgType::Numeric),
            2950 => Ok(PgType::Uuid),
            3802 => Ok(PgType::Jsonb),
            _ => Err(()),
        }
    }
}

/// One scalar cell of a record set
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Kept as text so no precision is lost
    Numeric(String),
    Text(String),
    Json(serde_json::Value),
    Uuid(Uuid),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub(crate) fn parse_timestamptz(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    // Servers print offsets as +00 or +05:30
    DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z").map(|x| x.to_utc())
}

impl ColumnValue {
    /// Decode a text-format value of the given type OID
    ///
    /// Text that does not parse as its declared type is kept as `Text`.
    pub fn decode(type_oid: Oid, text: Option<&str>) -> ColumnValue {
        let Some(data) = text else {
            return ColumnValue::Null;
        };

        let Ok(pg_type) = PgType::try_from(type_oid) else {
            return ColumnValue::Text(data.to_string());
        };

        let decoded = match pg_type {
            PgType::Bool => match data {
                "t" | "true" => Some(ColumnValue::Bool(true)),
                "f" | "false" => Some(ColumnValue::Bool(false)),
                _ => None,
            },
            PgType::Int2 | PgType::Int4 | PgType::Int8 | PgType::Oid => {
                data.parse::<i64>().ok().map(ColumnValue::Int)
            }
            PgType::Float4 | PgType::Float8 => data.parse::<f64>().ok().map(ColumnValue::Float),
            PgType::Numeric => Some(ColumnValue::Numeric(data.to_string())),
            PgType::Json | PgType::Jsonb => serde_json::from_str(data).ok().map(ColumnValue::Json),
            PgType::Uuid => Uuid::try_parse(data).ok().map(ColumnValue::Uuid),
            PgType::Date => data.parse::<NaiveDate>().ok().map(ColumnValue::Date),
            PgType::Timestamp => NaiveDateTime::parse_from_str(data, TIMESTAMP_FORMAT)
                .ok()
                .map(ColumnValue::Timestamp),
            PgType::Timestamptz => parse_timestamptz(data).ok().map(ColumnValue::TimestampTz),
            PgType::Char
            | PgType::Name
            | PgType::Text
            | PgType::Unknown
            | PgType::Bpchar
            | PgType::Varchar => Some(ColumnValue::Text(data.to_string())),
        };

        decoded.unwrap_or_else(|| {
            warn!("{:?} column parsing failed for '{}', kept as text", pg_type, data);
            ColumnValue::Text(data.to_string())
        })
    }

    /// PostgreSQL text form, `None` for NULL
    pub fn to_text(&self) -> Option<String> {
        Some(match self {
            ColumnValue::Null => return None,
            ColumnValue::Bool(value) => value.to_string(),
            ColumnValue::Int(value) => value.to_string(),
            ColumnValue::Float(value) => {
                if value.is_nan() {
                    "NaN".to_string()
                } else if value.is_infinite() {
                    (if *value > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
                } else {
                    value.to_string()
                }
            }
            ColumnValue::Numeric(value) => value.clone(),
            ColumnValue::Text(value) => value.clone(),
            ColumnValue::Json(value) => value.to_string(),
            ColumnValue::Uuid(value) => value.to_string(),
            ColumnValue::Date(value) => value.format("%Y-%m-%d").to_string(),
            ColumnValue::Timestamp(value) => value.format(TIMESTAMP_FORMAT).to_string(),
            ColumnValue::TimestampTz(value) => value.to_rfc3339(),
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        ColumnValue::Text(value.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        ColumnValue::Text(value)
    }
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        ColumnValue::Int(value)
    }
}

impl From<i32> for ColumnValue {
    fn from(value: i32) -> Self {
        ColumnValue::Int(value as i64)
    }
}

impl From<f64> for ColumnValue {
    fn from(value: f64) -> Self {
        ColumnValue::Float(value)
    }
}

impl From<bool> for ColumnValue {
    fn from(value: bool) -> Self {
        ColumnValue::Bool(value)
    }
}

impl<T: Into<ColumnValue>> From<Option<T>> for ColumnValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ColumnValue::Null)
    }
}

/// Rows of scalar columns plus an optional spatial and hstore attribute
///
/// All three parts are index-aligned; constructors reject anything else.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordSet {
    columns: Vec<String>,
    rows: Vec<Vec<ColumnValue>>,
    spatial: Option<SpatialColumn>,
    hstore: Option<HstoreColumn>,
}

impl RecordSet {
    /// Build a plain tabular record set
    pub fn new(columns: Vec<String>, rows: Vec<Vec<ColumnValue>>) -> DbResult<Self> {
        let mut seen = HashSet::new();
        if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(DbError::column_role(dup.as_str(), "duplicate column name"));
        }

        if let Some(row) = rows.iter().find(|row| row.len() != columns.len()) {
            return Err(DbError::LengthMismatch {
                expected: columns.len(),
                actual: row.len(),
            });
        }

        Ok(Self {
            columns,
            rows,
            spatial: None,
            hstore: None,
        })
    }

    /// Attach the spatial attribute
    pub fn with_spatial(mut self, spatial: SpatialColumn) -> DbResult<Self> {
        self.check_attachment(spatial.name(), spatial.len())?;
        self.spatial = Some(spatial);
        Ok(self)
    }

    /// Attach the hstore column
    pub fn with_hstore(mut self, hstore: HstoreColumn) -> DbResult<Self> {
        self.check_attachment(hstore.name(), hstore.len())?;
        self.hstore = Some(hstore);
        Ok(self)
    }

    fn check_attachment(&self, name: &str, len: usize) -> DbResult<()> {
        // The first attachment to a set without scalar data sets the length
        let unsized_set = self.columns.is_empty()
            && self.rows.is_empty()
            && self.spatial.is_none()
            && self.hstore.is_none();
        if !unsized_set && len != self.len() {
            return Err(DbError::LengthMismatch {
                expected: self.len(),
                actual: len,
            });
        }
        let taken = self.columns.iter().any(|c| c == name)
            || self.spatial.as_ref().is_some_and(|s| s.name() == name)
            || self.hstore.as_ref().is_some_and(|h| h.name() == name);
        if taken {
            return Err(DbError::column_role(name, "duplicate column name"));
        }
        Ok(())
    }

    /// Number of rows
    ///
    /// A record set with no scalar columns takes its length from its
    /// attached columns.
    pub fn len(&self) -> usize {
        if !self.columns.is_empty() || !self.rows.is_empty() {
            return self.rows.len();
        }
        self.spatial
            .as_ref()
            .map(|s| s.len())
            .or_else(|| self.hstore.as_ref().map(|h| h.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scalar column names in order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<ColumnValue>] {
        &self.rows
    }

    /// Every column name: scalars, then geometry, then hstore
    pub fn column_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        if let Some(spatial) = &self.spatial {
            names.push(spatial.name());
        }
        if let Some(hstore) = &self.hstore {
            names.push(hstore.name());
        }
        names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_names().contains(&name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Scalar value at `row` in column `name`
    pub fn value(&self, row: usize, name: &str) -> Option<&ColumnValue> {
        let col = self.column_index(name)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    pub fn spatial(&self) -> Option<&SpatialColumn> {
        self.spatial.as_ref()
    }

    pub fn hstore(&self) -> Option<&HstoreColumn> {
        self.hstore.as_ref()
    }

    /// Mutable hstore column, for key assignment / deletion
    pub fn hstore_mut(&mut self) -> Option<&mut HstoreColumn> {
        self.hstore.as_mut()
    }

    /// Rows at the given positions with every part kept aligned
    pub fn subset(&self, rows: &[usize]) -> DbResult<Self> {
        let len = self.len();
        if let Some(&index) = rows.iter().find(|&&row| row >= len) {
            return Err(DbError::IndexOutOfBounds { index, len });
        }

        let scalar_rows = if self.columns.is_empty() && self.rows.is_empty() {
            Vec::new()
        } else {
            rows.iter().map(|&row| self.rows[row].clone()).collect()
        };

        Ok(Self {
            columns: self.columns.clone(),
            rows: scalar_rows,
            spatial: self.spatial.as_ref().map(|s| s.subset(rows)).transpose()?,
            hstore: self.hstore.as_ref().map(|h| h.subset(rows)).transpose()?,
        })
    }
}

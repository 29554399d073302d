//! Spatial attribute of a record set
//!
//! Geometry values arrive as hex-encoded EWKB (PostGIS' default text output),
//! as `\x`-prefixed bytea hex (e.g. `ST_AsBinary`), or as (E)WKT (e.g.
//! `ST_AsText`, `ST_AsEWKT`). They are written back as EWKT, which the
//! `geometry` input function accepts directly.

pub mod ewkb;

use crate::core::errors::{DbError, DbResult};
use geo_types::{Geometry, MultiLineString, MultiPoint, MultiPolygon};
use serde::Serialize;
use tracing::debug;
use wkt::{ToWkt, TryFromWkt};

/// Geometry subtypes a spatial column may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GeometryKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
}

impl GeometryKind {
    /// Subtype of a geometry, or an error for kinds a column cannot carry
    pub fn of(geometry: &Geometry<f64>) -> DbResult<Self> {
        match geometry {
            Geometry::Point(_) => Ok(GeometryKind::Point),
            Geometry::MultiPoint(_) => Ok(GeometryKind::MultiPoint),
            Geometry::LineString(_) => Ok(GeometryKind::LineString),
            Geometry::MultiLineString(_) => Ok(GeometryKind::MultiLineString),
            Geometry::Polygon(_) => Ok(GeometryKind::Polygon),
            Geometry::MultiPolygon(_) => Ok(GeometryKind::MultiPolygon),
            Geometry::GeometryCollection(_) => {
                Err(DbError::decode("GEOMETRYCOLLECTION is not supported"))
            }
            Geometry::Line(_) | Geometry::Rect(_) | Geometry::Triangle(_) => Err(
                DbError::decode("only point, line string and polygon geometries are supported"),
            ),
        }
    }

    /// The multi counterpart of a single kind (multi kinds map to themselves)
    pub fn promoted(self) -> Self {
        match self {
            GeometryKind::Point | GeometryKind::MultiPoint => GeometryKind::MultiPoint,
            GeometryKind::LineString | GeometryKind::MultiLineString => {
                GeometryKind::MultiLineString
            }
            GeometryKind::Polygon | GeometryKind::MultiPolygon => GeometryKind::MultiPolygon,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Point => "POINT",
            GeometryKind::MultiPoint => "MULTIPOINT",
            GeometryKind::LineString => "LINESTRING",
            GeometryKind::MultiLineString => "MULTILINESTRING",
            GeometryKind::Polygon => "POLYGON",
            GeometryKind::MultiPolygon => "MULTIPOLYGON",
        }
    }
}

impl std::fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geometry values of a record set, one per row, sharing SRID and subtype
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialColumn {
    name: String,
    srid: i32,
    kind: Option<GeometryKind>,
    geometries: Vec<Geometry<f64>>,
}

impl SpatialColumn {
    /// Build a column, promoting single geometries when mixed with their multi kind
    ///
    /// `srid` 0 means unknown. `kind` is `None` only for an empty column.
    pub fn new(
        name: impl Into<String>,
        srid: i32,
        geometries: Vec<Geometry<f64>>,
    ) -> DbResult<Self> {
        let name = name.into();
        let kinds = geometries
            .iter()
            .enumerate()
            .map(|(row, g)| GeometryKind::of(g).map_err(|e| e.at_cell(&name, row)))
            .collect::<DbResult<Vec<_>>>()?;

        let kind = match kinds.first() {
            None => None,
            Some(first) if kinds.iter().all(|k| k == first) => Some(*first),
            Some(first) if kinds.iter().all(|k| k.promoted() == first.promoted()) => {
                Some(first.promoted())
            }
            Some(first) => {
                let other = kinds.iter().find(|k| k.promoted() != first.promoted());
                return Err(DbError::decode_column(
                    format!(
                        "mixed geometry types {} and {}",
                        first,
                        other.map(|k| k.as_str()).unwrap_or("?")
                    ),
                    name,
                ));
            }
        };

        let geometries = match kind {
            Some(kind) if kinds.iter().any(|k| *k != kind) => {
                debug!("promoting geometries in column {} to {}", name, kind);
                geometries.into_iter().map(promote).collect()
            }
            _ => geometries,
        };

        Ok(Self {
            name,
            srid,
            kind,
            geometries,
        })
    }

    /// Decode text values of a result column into a spatial column
    pub fn decode(name: impl Into<String>, values: &[Option<&str>]) -> DbResult<Self> {
        let name = name.into();
        let mut srid: Option<i32> = None;
        let mut geometries = Vec::with_capacity(values.len());

        for (row, value) in values.iter().enumerate() {
            let text = value
                .ok_or_else(|| DbError::decode_cell("NULL geometry", name.clone(), row))?;
            let (row_srid, geometry) =
                decode_geometry(text).map_err(|e| e.at_cell(&name, row))?;
            let row_srid = row_srid.unwrap_or(0);

            match srid {
                None => srid = Some(row_srid),
                Some(existing) if existing != row_srid => {
                    return Err(DbError::decode_cell(
                        format!("mixed SRIDs {} and {}", existing, row_srid),
                        name,
                        row,
                    ));
                }
                Some(_) => {}
            }
            geometries.push(geometry);
        }

        Self::new(name, srid.unwrap_or(0), geometries)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn srid(&self) -> i32 {
        self.srid
    }

    pub fn kind(&self) -> Option<GeometryKind> {
        self.kind
    }

    pub fn geometries(&self) -> &[Geometry<f64>] {
        &self.geometries
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<&Geometry<f64>> {
        self.geometries.get(row)
    }

    /// EWKT text of the geometry at `row`
    pub fn to_ewkt(&self, row: usize) -> Option<String> {
        self.get(row).map(|g| encode_ewkt(g, self.srid))
    }

    /// Same column under another name
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Rows at the given positions, in the given order
    pub fn subset(&self, rows: &[usize]) -> DbResult<Self> {
        let geometries = rows
            .iter()
            .map(|&row| {
                self.geometries
                    .get(row)
                    .cloned()
                    .ok_or(DbError::IndexOutOfBounds {
                        index: row,
                        len: self.geometries.len(),
                    })
            })
            .collect::<DbResult<Vec<_>>>()?;

        Ok(Self {
            name: self.name.clone(),
            srid: self.srid,
            kind: if geometries.is_empty() { None } else { self.kind },
            geometries,
        })
    }
}

fn promote(geometry: Geometry<f64>) -> Geometry<f64> {
    match geometry {
        Geometry::Point(p) => Geometry::MultiPoint(MultiPoint::new(vec![p])),
        Geometry::LineString(l) => Geometry::MultiLineString(MultiLineString::new(vec![l])),
        Geometry::Polygon(p) => Geometry::MultiPolygon(MultiPolygon::new(vec![p])),
        other => other,
    }
}

/// Decode one geometry value from its text form
///
/// Returns the SRID when the encoding carries one (EWKB flag or `SRID=n;`).
pub fn decode_geometry(text: &str) -> DbResult<(Option<i32>, Geometry<f64>)> {
    let text = text.trim();

    if let Some(hex) = text.strip_prefix("\\x") {
        return ewkb::parse_ewkb(&ewkb::decode_hex(hex)?);
    }

    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return ewkb::parse_ewkb(&ewkb::decode_hex(text)?);
    }

    let (srid, wkt_text) = split_srid(text)?;
    let geometry = Geometry::<f64>::try_from_wkt_str(wkt_text)
        .map_err(|e| DbError::decode(format!("invalid WKT: {}", e)))?;
    Ok((srid, geometry))
}

fn split_srid(text: &str) -> DbResult<(Option<i32>, &str)> {
    let upper_prefix = text.get(..5).map(|p| p.to_ascii_uppercase());
    if upper_prefix.as_deref() != Some("SRID=") {
        return Ok((None, text));
    }

    let (srid, rest) = text[5..]
        .split_once(';')
        .ok_or_else(|| DbError::decode("EWKT SRID prefix is missing ';'"))?;
    let srid = srid
        .trim()
        .parse::<i32>()
        .map_err(|_| DbError::decode(format!("invalid SRID '{}'", srid)))?;
    Ok((Some(srid), rest.trim()))
}

/// EWKT text for a geometry; plain WKT when the SRID is unknown (0)
pub fn encode_ewkt(geometry: &Geometry<f64>, srid: i32) -> String {
    let wkt = geometry.wkt_string();
    if srid == 0 {
        wkt
    } else {
        format!("SRID={};{}", srid, wkt)
    }
}

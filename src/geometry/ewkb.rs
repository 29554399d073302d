//! (E)WKB decoder
//!
//! PostGIS renders `geometry` values in text results as hex-encoded EWKB:
//! plain OGC WKB plus flag bits in the type word for Z, M and an embedded
//! SRID. ISO WKB dimension offsets (1000/2000/3000) are accepted too.
//! Decoding into geo-types goes through geozero; this module only reads the
//! SRID and checks the layout first, so every element count is bounded by
//! the bytes actually present and collections cannot nest.

use crate::core::errors::{DbError, DbResult};
use geo_types::Geometry;
use geozero::ToGeo;
use geozero::wkb::{Ewkb, Wkb};

const EWKB_Z_FLAG: u32 = 0x8000_0000;
const EWKB_M_FLAG: u32 = 0x4000_0000;
const EWKB_SRID_FLAG: u32 = 0x2000_0000;
const EWKB_FLAGS: u32 = EWKB_Z_FLAG | EWKB_M_FLAG | EWKB_SRID_FLAG;

const WKB_POINT: u32 = 1;
const WKB_LINESTRING: u32 = 2;
const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOINT: u32 = 4;
const WKB_MULTILINESTRING: u32 = 5;
const WKB_MULTIPOLYGON: u32 = 6;
const WKB_GEOMETRYCOLLECTION: u32 = 7;

/// Decode a hex string into bytes
pub fn decode_hex(hex: &str) -> DbResult<Vec<u8>> {
    hex::decode(hex).map_err(|e| DbError::decode(format!("invalid hex-encoded WKB: {}", e)))
}

/// Parse one (E)WKB geometry, returning its SRID when the EWKB flag carries one
pub fn parse_ewkb(bytes: &[u8]) -> DbResult<(Option<i32>, Geometry<f64>)> {
    let header = WkbLayout::new(bytes).check()?;

    let geometry = if header.iso_dims {
        Wkb(bytes.to_vec()).to_geo()
    } else {
        Ewkb(bytes.to_vec()).to_geo()
    }
    .map_err(|e| DbError::decode(format!("invalid WKB: {}", e)))?;

    // Empty points are encoded as NaN coordinates
    if let Geometry::Point(point) = &geometry {
        if point.x().is_nan() && point.y().is_nan() {
            return Err(DbError::decode("empty POINT is not supported"));
        }
    }

    Ok((header.srid, geometry))
}

/// Header of one WKB geometry
#[derive(Debug, Clone, Copy)]
struct WkbHeader {
    base_type: u32,
    dims: usize,
    srid: Option<i32>,
    /// Dimensions were given as ISO type offsets rather than EWKB flags
    iso_dims: bool,
}

/// Walks the byte layout of a geometry without building it
struct WkbLayout<'a> {
    buffer: &'a [u8],
    position: usize,
    little_endian: bool,
}

impl<'a> WkbLayout<'a> {
    fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
            little_endian: true,
        }
    }

    fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    fn skip(&mut self, len: usize) -> DbResult<()> {
        if self.remaining() < len {
            return Err(DbError::decode(format!(
                "WKB truncated at byte {} (needed {} more)",
                self.position, len
            )));
        }
        self.position += len;
        Ok(())
    }

    fn read_word(&mut self) -> DbResult<[u8; 4]> {
        let start = self.position;
        self.skip(4)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.buffer[start..start + 4]);
        Ok(word)
    }

    fn read_u32(&mut self) -> DbResult<u32> {
        let word = self.read_word()?;
        Ok(if self.little_endian {
            u32::from_le_bytes(word)
        } else {
            u32::from_be_bytes(word)
        })
    }

    fn read_i32(&mut self) -> DbResult<i32> {
        let word = self.read_word()?;
        Ok(if self.little_endian {
            i32::from_le_bytes(word)
        } else {
            i32::from_be_bytes(word)
        })
    }

    /// Element count, bounded by what the buffer could possibly hold
    fn read_count(&mut self, min_element_size: usize) -> DbResult<usize> {
        let count = self.read_u32()? as usize;
        if count.saturating_mul(min_element_size) > self.remaining() {
            return Err(DbError::decode(format!(
                "WKB declares {} elements but only {} bytes remain",
                count,
                self.remaining()
            )));
        }
        Ok(count)
    }

    fn read_header(&mut self) -> DbResult<WkbHeader> {
        let start = self.position;
        self.skip(1)?;
        self.little_endian = match self.buffer[start] {
            0 => false,
            1 => true,
            other => {
                return Err(DbError::decode(format!(
                    "invalid WKB byte order marker {}",
                    other
                )));
            }
        };

        let raw_type = self.read_u32()?;
        let flags = raw_type & EWKB_FLAGS;
        let iso_type = raw_type & !EWKB_FLAGS;

        let (base_type, iso_z, iso_m) = match iso_type / 1000 {
            0 => (iso_type, false, false),
            1 => (iso_type - 1000, true, false),
            2 => (iso_type - 2000, false, true),
            3 => (iso_type - 3000, true, true),
            _ => {
                return Err(DbError::decode(format!(
                    "unknown WKB geometry type {}",
                    raw_type
                )));
            }
        };

        let srid = if flags & EWKB_SRID_FLAG != 0 {
            Some(self.read_i32()?)
        } else {
            None
        };

        let has_z = iso_z || flags & EWKB_Z_FLAG != 0;
        let has_m = iso_m || flags & EWKB_M_FLAG != 0;

        Ok(WkbHeader {
            base_type,
            dims: 2 + has_z as usize + has_m as usize,
            srid,
            iso_dims: iso_z || iso_m,
        })
    }

    fn skip_coords(&mut self, dims: usize) -> DbResult<()> {
        let count = self.read_count(dims * 8)?;
        self.skip(count * dims * 8)
    }

    fn skip_rings(&mut self, dims: usize) -> DbResult<()> {
        let rings = self.read_count(4)?;
        for _ in 0..rings {
            self.skip_coords(dims)?;
        }
        Ok(())
    }

    fn skip_simple(&mut self, base_type: u32, dims: usize) -> DbResult<()> {
        match base_type {
            WKB_POINT => self.skip(dims * 8),
            WKB_LINESTRING => self.skip_coords(dims),
            _ => self.skip_rings(dims),
        }
    }

    /// Check the whole buffer holds exactly one supported geometry
    fn check(mut self) -> DbResult<WkbHeader> {
        let header = self.read_header()?;

        match header.base_type {
            WKB_POINT | WKB_LINESTRING | WKB_POLYGON => {
                self.skip_simple(header.base_type, header.dims)?;
            }
            WKB_MULTIPOINT | WKB_MULTILINESTRING | WKB_MULTIPOLYGON => {
                let member_type = header.base_type - 3;
                // smallest member: byte order, type word, one count
                let count = self.read_count(9)?;
                for _ in 0..count {
                    let member = self.read_header()?;
                    if member.base_type != member_type {
                        return Err(DbError::decode(format!(
                            "WKB multi-geometry of type {} holds a member of type {}",
                            header.base_type, member.base_type
                        )));
                    }
                    self.skip_simple(member.base_type, member.dims)?;
                }
            }
            WKB_GEOMETRYCOLLECTION => {
                return Err(DbError::decode("GEOMETRYCOLLECTION is not supported"));
            }
            other => {
                return Err(DbError::decode(format!(
                    "unsupported WKB geometry type {}",
                    other
                )));
            }
        }

        if self.remaining() != 0 {
            return Err(DbError::decode(format!(
                "{} trailing bytes after WKB geometry",
                self.remaining()
            )));
        }

        Ok(header)
    }
}

//! PostGIS geometry and hstore helpers over a PostgreSQL connection
//!
//! Three pieces, all thin conversions around SQL the server executes:
//!
//! - [`reader::get_query`] runs a SELECT and decodes a geometry column
//!   (hex EWKB or (E)WKT) and an hstore column into a [`RecordSet`].
//! - [`hstore`] gives keyed get / set access to hstore cells; assigning
//!   `None` deletes a key.
//! - [`writer::insert`] and [`writer::update`] encode a record set back into
//!   one INSERT or UPDATE, with concat-or-replace semantics for hstore
//!   updates.
//!
//! ```no_run
//! use pg_geo_hstore::{ConnectionConfig, PGConnection, ReadOptions, UpdateOptions};
//!
//! let config = ConnectionConfig::from_env()?;
//! let conn = PGConnection::connect_with(&config)?;
//!
//! let options = ReadOptions::new().geom_name("geom").hstore_name("translations");
//! let mut countries = pg_geo_hstore::get_query(&conn, "SELECT * FROM country", &options)?;
//!
//! if let Some(translations) = countries.hstore_mut() {
//!     translations.set("fr", Some("pays"));
//!     translations.set("obsolete", None);
//! }
//!
//! let update = UpdateOptions::new(["id"], ["translations"]);
//! pg_geo_hstore::update(&conn, &countries, "country", &update)?;
//! # Ok::<(), pg_geo_hstore::DbError>(())
//! ```

pub mod core;
pub mod geometry;
pub mod hstore;
pub mod logging;
pub mod reader;
pub mod types;
pub mod utils;
pub mod writer;

pub use crate::core::{ColumnLocation, ConnectionConfig, DbError, DbResult};
pub use geometry::{GeometryKind, SpatialColumn};
pub use hstore::{HstoreCell, HstoreColumn, HstoreUpdateMode};
pub use reader::{ReadOptions, get_query};
pub use types::{ColumnValue, PgType, RecordSet};
pub use utils::{Connection, PGConnection, QueryResult};
pub use writer::{InsertOptions, UpdateOptions, insert, update};

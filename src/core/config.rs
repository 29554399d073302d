//! Connection configuration
//!
//! Settings can be loaded from environment variables or built explicitly.
//! Everything is validated up front so a bad value fails before libpq is
//! ever called.

use super::{DbError, DbResult};
use std::env;
use url::form_urlencoded;

pub const DEFAULT_APPLICATION_NAME: &str = "pg_geo_hstore";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// PostgreSQL identifier length limit, which also bounds application_name
const MAX_APPLICATION_NAME_LEN: usize = 63;

/// Validated connection settings
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub connection_string: String,
    pub application_name: String,
    pub connect_timeout_secs: u64,
}

impl ConnectionConfig {
    /// Load configuration from environment variables
    ///
    /// # Environment Variables
    ///
    /// Required:
    /// - `DATABASE_URL`: PostgreSQL connection string (keyword or URI form)
    ///
    /// Optional (with defaults):
    /// - `PG_APPLICATION_NAME`: reported to the server (default: "pg_geo_hstore")
    /// - `PG_CONNECT_TIMEOUT`: connect timeout in seconds (default: 10)
    pub fn from_env() -> DbResult<Self> {
        let connection_string = env::var("DATABASE_URL").map_err(|_| {
            DbError::config("Missing required DATABASE_URL environment variable")
        })?;

        let application_name = env::var("PG_APPLICATION_NAME")
            .unwrap_or_else(|_| DEFAULT_APPLICATION_NAME.to_string());

        let connect_timeout_secs = match env::var("PG_CONNECT_TIMEOUT") {
            Ok(raw) => raw.trim().parse::<u64>().map_err(|_| {
                DbError::config(format!(
                    "PG_CONNECT_TIMEOUT must be a whole number of seconds, got '{}'",
                    raw
                ))
            })?,
            Err(_) => DEFAULT_CONNECT_TIMEOUT_SECS,
        };

        Self::new(connection_string, application_name, connect_timeout_secs)
    }

    /// Create a configuration with validation
    pub fn new(
        connection_string: impl Into<String>,
        application_name: impl Into<String>,
        connect_timeout_secs: u64,
    ) -> DbResult<Self> {
        let connection_string = connection_string.into();
        let application_name = application_name.into();

        if connection_string.trim().is_empty() {
            return Err(DbError::config("DATABASE_URL cannot be empty"));
        }

        if application_name.trim().is_empty() {
            return Err(DbError::config("Application name cannot be empty"));
        }

        if !application_name
            .chars()
            .all(|c| c.is_ascii_graphic() || c == ' ')
        {
            return Err(DbError::config(
                "Application name can only contain printable ASCII characters",
            ));
        }

        if application_name.len() > MAX_APPLICATION_NAME_LEN {
            return Err(DbError::config(
                "Application name cannot be longer than 63 characters",
            ));
        }

        if connect_timeout_secs == 0 {
            return Err(DbError::config("Connect timeout must be at least 1 second"));
        }

        Ok(Self {
            connection_string,
            application_name,
            connect_timeout_secs,
        })
    }

    /// Shortcut for a connection string with default settings
    pub fn with_defaults(connection_string: impl Into<String>) -> DbResult<Self> {
        Self::new(
            connection_string,
            DEFAULT_APPLICATION_NAME,
            DEFAULT_CONNECT_TIMEOUT_SECS,
        )
    }

    /// Connection string handed to libpq, with our settings appended
    pub fn conninfo(&self) -> String {
        let base = self.connection_string.trim();

        if is_uri(base) {
            let separator = if base.contains('?') { '&' } else { '?' };
            format!(
                "{}{}application_name={}&connect_timeout={}",
                base,
                separator,
                percent_encode(&self.application_name),
                self.connect_timeout_secs
            )
        } else {
            format!(
                "{} application_name='{}' connect_timeout={}",
                base,
                self.application_name.replace('\\', "\\\\").replace('\'', "\\'"),
                self.connect_timeout_secs
            )
        }
    }
}

/// Percent-encode a URI query value; libpq does not read `+` as a space
fn percent_encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn is_uri(conninfo: &str) -> bool {
    conninfo.starts_with("postgresql://") || conninfo.starts_with("postgres://")
}

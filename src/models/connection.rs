//! Connection-related data models.
//!
//! This module resolves a [`Setup`] into the backend and URL the driver
//! connects to.

use crate::config::Setup;
use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use url::Url;

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Resolve the `driver` tag of a setup.
    pub fn from_driver_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" | "psycopg2" => Some(Self::PostgreSQL),
            "mysql" | "mariadb" => Some(Self::MySQL),
            "sqlite" | "sqlite3" => Some(Self::SQLite),
            _ => None,
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::SQLite => None,
        }
    }

    fn scheme(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgres",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Where and how to connect, resolved from a [`Setup`].
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub db_type: DatabaseType,
    /// Contains the password - never log, use [`masked_url`](Self::masked_url)
    pub url: String,
    /// Host for log lines; the file path for SQLite
    pub host: String,
}

impl ConnectionSettings {
    /// Build connection settings from a setup map.
    ///
    /// A missing `driver` key means PostgreSQL.
    pub fn from_setup(setup: &Setup) -> DbResult<Self> {
        let db_type = match setup.get("driver") {
            Some(tag) => DatabaseType::from_driver_tag(tag).ok_or_else(|| {
                DbError::configuration(
                    format!("Unsupported driver '{}'", tag),
                    "Use one of: postgresql, mysql, sqlite",
                )
            })?,
            None => DatabaseType::PostgreSQL,
        };

        if db_type == DatabaseType::SQLite {
            let path = required(setup, "sdi")?;
            return Ok(Self {
                db_type,
                url: format!("sqlite:{}", path),
                host: path.to_string(),
            });
        }

        let host = required(setup, "host")?;
        let port = match setup.get("port") {
            Some(p) => p.trim().parse::<u16>().map_err(|_| {
                DbError::configuration(
                    format!("Invalid port '{}'", p),
                    "The port must be a number between 1 and 65535",
                )
            })?,
            None => db_type.default_port().unwrap_or_default(),
        };
        let database = required(setup, "sdi")?;

        let mut url = Url::parse(&format!("{}://{}", db_type.scheme(), host)).map_err(|e| {
            DbError::configuration(
                format!("Invalid host '{}': {}", host, e),
                "The host must be a hostname or IP address",
            )
        })?;
        // set_port/set_username/set_password only fail for cannot-be-a-base URLs,
        // which a scheme://host URL never is.
        let _ = url.set_port(Some(port));
        if let Some(user) = setup.get("user") {
            let _ = url.set_username(user);
        }
        if let Some(password) = setup.get("password") {
            let _ = url.set_password(Some(password));
        }
        url.set_path(database);

        Ok(Self {
            db_type,
            url: url.to_string(),
            host: host.to_string(),
        })
    }

    /// Get a display-safe version of the connection URL (credentials masked).
    pub fn masked_url(&self) -> String {
        match Url::parse(&self.url) {
            Ok(mut url) if url.password().is_some() => {
                let _ = url.set_password(Some("****"));
                url.to_string()
            }
            _ => self.url.clone(),
        }
    }
}

fn required<'a>(setup: &'a Setup, key: &str) -> DbResult<&'a str> {
    setup.get(key).ok_or_else(|| {
        DbError::configuration(
            format!("Missing '{}' in setup", key),
            format!("Add the '{}' key to the setup map", key),
        )
    })
}

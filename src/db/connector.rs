//! Single-connection source.
//!
//! [`DirectConnector`] opens a brand new driver connection on every
//! acquisition. The session closes it when released.

use crate::config::Setup;
use crate::db::session::{ConnectionSource, DbConnection, Link, SqlSession};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionSettings, DatabaseType};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use std::str::FromStr;
use tracing::{debug, error};

#[derive(Debug, Clone)]
pub struct DirectConnector {
    settings: ConnectionSettings,
}

impl DirectConnector {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings }
    }

    /// Resolve a setup into a connector.
    pub fn from_setup(setup: &Setup) -> DbResult<Self> {
        ConnectionSettings::from_setup(setup).map(Self::new)
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    async fn open(&self) -> DbResult<DbConnection> {
        let url = &self.settings.url;
        let conn = match self.settings.db_type {
            DatabaseType::MySQL => {
                let options = MySqlConnectOptions::from_str(url)
                    .map_err(|e| invalid_url(DatabaseType::MySQL, e))?
                    .charset("utf8mb4");
                DbConnection::MySql(Link::Direct(
                    MySqlConnection::connect_with(&options)
                        .await
                        .map_err(|e| connect_error(&self.settings, e))?,
                ))
            }
            DatabaseType::PostgreSQL => {
                let options = PgConnectOptions::from_str(url)
                    .map_err(|e| invalid_url(DatabaseType::PostgreSQL, e))?;
                DbConnection::Postgres(Link::Direct(
                    PgConnection::connect_with(&options)
                        .await
                        .map_err(|e| connect_error(&self.settings, e))?,
                ))
            }
            DatabaseType::SQLite => {
                let options = SqliteConnectOptions::from_str(url)
                    .map_err(|e| invalid_url(DatabaseType::SQLite, e))?
                    .create_if_missing(true);
                DbConnection::SQLite(Link::Direct(
                    options
                        .connect()
                        .await
                        .map_err(|e| connect_error(&self.settings, e))?,
                ))
            }
        };
        Ok(conn)
    }
}

#[async_trait]
impl ConnectionSource for DirectConnector {
    type Session = SqlSession;

    async fn acquire(&self) -> DbResult<SqlSession> {
        let conn = self.open().await?;
        debug!(
            host = %self.settings.host,
            db_type = %self.settings.db_type,
            "Connection established"
        );
        Ok(SqlSession::new(conn))
    }
}

pub(crate) fn invalid_url(db_type: DatabaseType, err: sqlx::Error) -> DbError {
    DbError::configuration(
        format!("Invalid {} connection settings: {}", db_type, err),
        "Check host, port, sdi, user and password in the setup",
    )
}

/// Turn a driver connect failure into a connection error with a suggestion.
pub(crate) fn connect_error(settings: &ConnectionSettings, err: sqlx::Error) -> DbError {
    error!(
        url = %settings.masked_url(),
        error = %err,
        "Failed to connect"
    );
    DbError::connection(
        format!("Failed to connect: {}", err),
        connection_suggestion(settings.db_type, &err),
    )
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(db_type: DatabaseType, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!(
            "Check that the {} server is running and accessible",
            db_type
        );
    }

    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify the user and password in the setup".to_string();
    }

    if error_str.contains("does not exist") || error_str.contains("unknown database") {
        return "Check that the database named by 'sdi' exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    match db_type {
        DatabaseType::PostgreSQL => {
            "Verify host and port point at a PostgreSQL server (default port 5432)".to_string()
        }
        DatabaseType::MySQL => {
            "Verify host and port point at a MySQL server (default port 3306)".to_string()
        }
        DatabaseType::SQLite => {
            "Verify the 'sdi' file path is accessible".to_string()
        }
    }
}

//! Connection pool management.
//!
//! [`DbPool`] is a fixed-size database-specific pool (MySqlPool, PgPool,
//! SqlitePool). [`PoolRegistry`] guarantees that at most one pool is built
//! per registry, no matter how many clients are constructed or how
//! concurrently.

use crate::config::Setup;
use crate::db::connector::{connect_error, invalid_url};
use crate::db::session::{ConnectionSource, DbConnection, Link, SqlSession};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionSettings, DatabaseType};
use async_trait::async_trait;
use sqlx::{
    MySqlPool, PgPool, SqlitePool, mysql::MySqlConnectOptions, mysql::MySqlPoolOptions,
    postgres::PgConnectOptions, postgres::PgPoolOptions, sqlite::SqliteConnectOptions,
    sqlite::SqlitePoolOptions,
};
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Open a pool holding exactly `pool_size` connections.
    pub async fn connect(settings: &ConnectionSettings, pool_size: u32) -> DbResult<Self> {
        if pool_size == 0 {
            return Err(DbError::configuration(
                "Pool size must be at least 1",
                "Set pool_size to a positive number of connections",
            ));
        }
        let url = &settings.url;

        let pool = match settings.db_type {
            DatabaseType::MySQL => {
                let options = MySqlConnectOptions::from_str(url)
                    .map_err(|e| invalid_url(DatabaseType::MySQL, e))?
                    .charset("utf8mb4");

                DbPool::MySql(
                    MySqlPoolOptions::new()
                        .min_connections(pool_size)
                        .max_connections(pool_size)
                        .connect_with(options)
                        .await
                        .map_err(|e| connect_error(settings, e))?,
                )
            }
            DatabaseType::PostgreSQL => {
                let options = PgConnectOptions::from_str(url)
                    .map_err(|e| invalid_url(DatabaseType::PostgreSQL, e))?;

                DbPool::Postgres(
                    PgPoolOptions::new()
                        .min_connections(pool_size)
                        .max_connections(pool_size)
                        .connect_with(options)
                        .await
                        .map_err(|e| connect_error(settings, e))?,
                )
            }
            DatabaseType::SQLite => {
                let options = SqliteConnectOptions::from_str(url)
                    .map_err(|e| invalid_url(DatabaseType::SQLite, e))?
                    .create_if_missing(true);

                DbPool::SQLite(
                    SqlitePoolOptions::new()
                        .min_connections(pool_size)
                        .max_connections(pool_size)
                        .connect_with(options)
                        .await
                        .map_err(|e| connect_error(settings, e))?,
                )
            }
        };

        info!(
            host = %settings.host,
            db_type = %settings.db_type,
            pool_size,
            "Connection pool created"
        );
        Ok(pool)
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        impl_db_dispatch!(self, {
            MySql(p) => p.close().await,
            Postgres(p) => p.close().await,
            SQLite(p) => p.close().await,
        })
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::MySql(_) => DatabaseType::MySQL,
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Connections currently held by the pool, idle or checked out.
    pub fn size(&self) -> u32 {
        impl_db_dispatch!(self, {
            MySql(p) => p.size(),
            Postgres(p) => p.size(),
            SQLite(p) => p.size(),
        })
    }

    pub fn num_idle(&self) -> usize {
        impl_db_dispatch!(self, {
            MySql(p) => p.num_idle(),
            Postgres(p) => p.num_idle(),
            SQLite(p) => p.num_idle(),
        })
    }
}

#[async_trait]
impl ConnectionSource for DbPool {
    type Session = SqlSession;

    async fn acquire(&self) -> DbResult<SqlSession> {
        let conn = match self {
            DbPool::MySql(p) => DbConnection::MySql(Link::Pooled(p.acquire().await?)),
            DbPool::Postgres(p) => DbConnection::Postgres(Link::Pooled(p.acquire().await?)),
            DbPool::SQLite(p) => DbConnection::SQLite(Link::Pooled(p.acquire().await?)),
        };
        debug!(db_type = %self.db_type(), "Connection checked out of pool");
        Ok(SqlSession::new(conn))
    }
}

/// What a registry holds once initialized: the pool, if creation
/// succeeded, and the configuration it was built from.
#[derive(Debug)]
pub struct PoolShared<P = DbPool> {
    pool: Option<P>,
    setup: Setup,
    pool_size: u32,
}

impl<P> PoolShared<P> {
    pub fn pool(&self) -> Option<&P> {
        self.pool.as_ref()
    }

    /// The pool, or [`DbError::PoolUnavailable`] if creation failed.
    pub fn available(&self) -> DbResult<&P> {
        self.pool.as_ref().ok_or(DbError::PoolUnavailable)
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }

    pub fn setup(&self) -> &Setup {
        &self.setup
    }

    pub fn pool_size(&self) -> u32 {
        self.pool_size
    }
}

/// One-time pool initialization.
///
/// The first caller builds the pool; concurrent first callers wait for that
/// build and share its result. Every later caller gets the same pool
/// regardless of the configuration it passes.
#[derive(Debug)]
pub struct PoolRegistry<P = DbPool> {
    cell: OnceCell<Arc<PoolShared<P>>>,
}

impl<P> Default for PoolRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> PoolRegistry<P> {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// The shared state, if a pool build has already run.
    pub fn get(&self) -> Option<Arc<PoolShared<P>>> {
        self.cell.get().cloned()
    }

    /// Return the registry's pool, building it with `create` on first use.
    ///
    /// A failed build is logged and recorded; it is not retried.
    pub async fn get_or_init_with<F, Fut>(
        &self,
        setup: &Setup,
        pool_size: u32,
        create: F,
    ) -> Arc<PoolShared<P>>
    where
        F: FnOnce(Setup, u32) -> Fut,
        Fut: Future<Output = DbResult<P>>,
    {
        let mut built = false;
        let built_flag = &mut built;
        let shared = self
            .cell
            .get_or_init(move || async move {
                *built_flag = true;
                let pool = match create(setup.clone(), pool_size).await {
                    Ok(pool) => Some(pool),
                    Err(e) => {
                        error!(
                            error = %e,
                            pool_size,
                            "Connection pool creation failed; pooled operations will be unavailable"
                        );
                        None
                    }
                };
                Arc::new(PoolShared {
                    pool,
                    setup: setup.clone(),
                    pool_size,
                })
            })
            .await;

        if !built && (shared.setup != *setup || shared.pool_size != pool_size) {
            debug!(
                requested = ?setup,
                requested_pool_size = pool_size,
                active = ?shared.setup,
                active_pool_size = shared.pool_size,
                "Pool already initialized, ignoring new configuration"
            );
        }

        Arc::clone(shared)
    }
}

impl PoolRegistry<DbPool> {
    /// Process-wide registry.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<PoolRegistry> = OnceLock::new();
        GLOBAL.get_or_init(PoolRegistry::new)
    }

    /// Return the registry's pool, connecting with sqlx on first use.
    ///
    /// `pool_size` overrides the setup's `pool_size` key. An override of 0
    /// is ignored with a warning, like an invalid `pool_size` key.
    pub async fn get_or_connect(
        &self,
        setup: &Setup,
        pool_size: Option<u32>,
    ) -> Arc<PoolShared<DbPool>> {
        let pool_size = match pool_size {
            Some(0) => {
                let fallback = setup.pool_size();
                warn!(
                    pool_size = 0,
                    fallback, "Pool size must be at least 1, using the setup's pool size"
                );
                fallback
            }
            Some(size) => size,
            None => setup.pool_size(),
        };
        self.get_or_init_with(setup, pool_size, |setup, size| async move {
            let settings = ConnectionSettings::from_setup(&setup)?;
            DbPool::connect(&settings, size).await
        })
        .await
    }
}

//! Driver capability surface.
//!
//! [`ConnectionSource`] hands out [`Session`]s; a session is one database
//! connection checked out for the duration of a single client call. The
//! executor only talks to these two traits, so pooled and single-connection
//! clients share one code path and tests can substitute a fake driver.
//!
//! [`SqlSession`] is the sqlx implementation. It wraps either a pooled
//! connection, which goes back to its pool when the session is released, or
//! a dedicated connection, which is closed.

use crate::db::params::{bind_mysql, bind_postgres, bind_sqlite};
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryParam, RowSet};
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{Connection, Database, MySql, Postgres, Sqlite};
use std::ops::{Deref, DerefMut};
use tracing::{debug, warn};

/// One checked-out connection.
#[async_trait]
pub trait Session: Send {
    /// Open a transaction.
    async fn begin(&mut self) -> DbResult<()>;

    /// Run a query and collect every row.
    async fn fetch_all(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<RowSet>;

    /// Run a statement and return the number of rows it affected.
    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64>;

    /// Prepare a statement so repeated [`execute`](Self::execute) calls reuse it.
    async fn prepare(&mut self, sql: &str) -> DbResult<()>;

    async fn commit(&mut self) -> DbResult<()>;

    async fn rollback(&mut self) -> DbResult<()>;

    /// Give the connection back: return it to its pool or close it.
    ///
    /// Dropping a session without calling this must release it as well.
    async fn close(self);
}

/// Something that hands out sessions: a pool or a connector.
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    type Session: Session;

    async fn acquire(&self) -> DbResult<Self::Session>;
}

/// A connection either borrowed from a pool or owned outright.
pub enum Link<DB: Database> {
    Pooled(PoolConnection<DB>),
    Direct(DB::Connection),
}

impl<DB: Database> Deref for Link<DB> {
    type Target = DB::Connection;

    fn deref(&self) -> &Self::Target {
        match self {
            Link::Pooled(conn) => conn,
            Link::Direct(conn) => conn,
        }
    }
}

impl<DB: Database> DerefMut for Link<DB> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Link::Pooled(conn) => conn,
            Link::Direct(conn) => conn,
        }
    }
}

impl<DB: Database> Link<DB> {
    fn is_pooled(&self) -> bool {
        matches!(self, Link::Pooled(_))
    }

    /// Return a pooled connection, or close a direct one.
    async fn release(self) -> Result<(), sqlx::Error> {
        match self {
            Link::Pooled(conn) => {
                drop(conn);
                Ok(())
            }
            Link::Direct(conn) => conn.close().await,
        }
    }

    /// Drop without handing the connection back to its pool.
    fn discard(self) {
        match self {
            Link::Pooled(conn) => drop(conn.detach()),
            Link::Direct(conn) => drop(conn),
        }
    }
}

/// Database-specific connection.
pub enum DbConnection {
    MySql(Link<MySql>),
    Postgres(Link<Postgres>),
    SQLite(Link<Sqlite>),
}

impl DbConnection {
    /// Get the database type for this connection.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbConnection::MySql(_) => DatabaseType::MySQL,
            DbConnection::Postgres(_) => DatabaseType::PostgreSQL,
            DbConnection::SQLite(_) => DatabaseType::SQLite,
        }
    }

    fn is_pooled(&self) -> bool {
        impl_conn_dispatch!(self, {
            MySql(c) => c.is_pooled(),
            Postgres(c) => c.is_pooled(),
            SQLite(c) => c.is_pooled(),
        })
    }
}

/// sqlx-backed [`Session`].
pub struct SqlSession {
    conn: Option<DbConnection>,
    in_transaction: bool,
}

impl SqlSession {
    pub fn new(conn: DbConnection) -> Self {
        Self {
            conn: Some(conn),
            in_transaction: false,
        }
    }

    pub fn db_type(&self) -> Option<DatabaseType> {
        self.conn.as_ref().map(DbConnection::db_type)
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn conn(&mut self) -> DbResult<&mut DbConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::internal("Session used after release"))
    }

    async fn control(&mut self, statement: &'static str) -> DbResult<()> {
        impl_conn_dispatch!(self.conn()?, {
            MySql(c) => mysql::run(c, statement).await,
            Postgres(c) => postgres::run(c, statement).await,
            SQLite(c) => sqlite::run(c, statement).await,
        })
    }
}

#[async_trait]
impl Session for SqlSession {
    async fn begin(&mut self) -> DbResult<()> {
        self.control("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn fetch_all(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<RowSet> {
        impl_conn_dispatch!(self.conn()?, {
            MySql(c) => mysql::fetch_all(c, sql, params).await,
            Postgres(c) => postgres::fetch_all(c, sql, params).await,
            SQLite(c) => sqlite::fetch_all(c, sql, params).await,
        })
    }

    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        impl_conn_dispatch!(self.conn()?, {
            MySql(c) => mysql::execute(c, sql, params).await,
            Postgres(c) => postgres::execute(c, sql, params).await,
            SQLite(c) => sqlite::execute(c, sql, params).await,
        })
    }

    async fn prepare(&mut self, sql: &str) -> DbResult<()> {
        impl_conn_dispatch!(self.conn()?, {
            MySql(c) => mysql::prepare(c, sql).await,
            Postgres(c) => postgres::prepare(c, sql).await,
            SQLite(c) => sqlite::prepare(c, sql).await,
        })
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.control("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        if !self.in_transaction {
            return Ok(());
        }
        // A failed ROLLBACK leaves the transaction state unknown; keep the
        // flag set so the connection is discarded rather than reused.
        self.control("ROLLBACK").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn close(mut self) {
        if self.in_transaction {
            if let Err(e) = self.rollback().await {
                warn!(error = %e, "Rollback before release failed");
            }
        }
        if self.in_transaction {
            // Drop impl discards it
            return;
        }
        let Some(conn) = self.conn.take() else {
            return;
        };
        let pooled = conn.is_pooled();
        let result = impl_conn_dispatch!(conn, {
            MySql(c) => c.release().await,
            Postgres(c) => c.release().await,
            SQLite(c) => c.release().await,
        });
        match result {
            Ok(()) if pooled => debug!("Connection returned to pool"),
            Ok(()) => debug!("Connection closed"),
            Err(e) => warn!(error = %e, "Error while closing connection"),
        }
    }
}

impl Drop for SqlSession {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if !self.in_transaction {
            // Pooled connections go back to the pool, direct ones are closed
            drop(conn);
            return;
        }
        warn!("Discarding connection released with an open transaction");
        impl_conn_dispatch!(conn, {
            MySql(c) => c.discard(),
            Postgres(c) => c.discard(),
            SQLite(c) => c.discard(),
        });
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// When there are no parameters the SQL is sent unprepared, since some
// statements (DDL, CREATE PROCEDURE) cannot be prepared.

fn collect_rows<R: RowToJson>(rows: Vec<R>) -> RowSet {
    let columns = rows.first().map(R::column_names).unwrap_or_default();
    let rows = rows.iter().map(R::to_json_values).collect();
    RowSet::new(columns, rows)
}

mod mysql {
    use super::*;
    use sqlx::{Executor, MySqlConnection};

    pub async fn run(conn: &mut MySqlConnection, statement: &'static str) -> DbResult<()> {
        conn.execute(statement).await?;
        Ok(())
    }

    pub async fn fetch_all(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<RowSet> {
        let rows = if params.is_empty() {
            conn.fetch_all(sql).await?
        } else {
            bind_mysql(sqlx::query(sql), params).fetch_all(conn).await?
        };
        Ok(collect_rows(rows))
    }

    pub async fn execute(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let result = if params.is_empty() {
            conn.execute(sql).await?
        } else {
            bind_mysql(sqlx::query(sql), params).execute(conn).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn prepare(conn: &mut MySqlConnection, sql: &str) -> DbResult<()> {
        conn.prepare(sql).await?;
        Ok(())
    }
}

mod postgres {
    use super::*;
    use sqlx::{Executor, PgConnection};

    pub async fn run(conn: &mut PgConnection, statement: &'static str) -> DbResult<()> {
        conn.execute(statement).await?;
        Ok(())
    }

    pub async fn fetch_all(
        conn: &mut PgConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<RowSet> {
        let rows = if params.is_empty() {
            conn.fetch_all(sql).await?
        } else {
            bind_postgres(sqlx::query(sql), params)
                .fetch_all(conn)
                .await?
        };
        Ok(collect_rows(rows))
    }

    pub async fn execute(
        conn: &mut PgConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let result = if params.is_empty() {
            conn.execute(sql).await?
        } else {
            bind_postgres(sqlx::query(sql), params)
                .execute(conn)
                .await?
        };
        Ok(result.rows_affected())
    }

    pub async fn prepare(conn: &mut PgConnection, sql: &str) -> DbResult<()> {
        conn.prepare(sql).await?;
        Ok(())
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Executor, SqliteConnection};

    pub async fn run(conn: &mut SqliteConnection, statement: &'static str) -> DbResult<()> {
        conn.execute(statement).await?;
        Ok(())
    }

    pub async fn fetch_all(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<RowSet> {
        let rows = if params.is_empty() {
            conn.fetch_all(sql).await?
        } else {
            bind_sqlite(sqlx::query(sql), params).fetch_all(conn).await?
        };
        Ok(collect_rows(rows))
    }

    pub async fn execute(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let result = if params.is_empty() {
            conn.execute(sql).await?
        } else {
            bind_sqlite(sqlx::query(sql), params).execute(conn).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn prepare(conn: &mut SqliteConnection, sql: &str) -> DbResult<()> {
        conn.prepare(sql).await?;
        Ok(())
    }
}

//! Pooled client.
//!
//! A [`PoolDb`] is a cheap handle onto the pool held by a [`PoolRegistry`].
//! Constructing any number of handles against one registry builds the pool
//! once; handles built later with a different setup still share it.

use crate::config::{Setup, validate_setup};
use crate::db::QueryExecutor;
use crate::db::executor::parse_datatype;
use crate::db::pool::{DbPool, PoolRegistry, PoolShared};
use crate::db::session::ConnectionSource;
use crate::error::DbResult;
use crate::models::{DataType, QueryData, QueryParam};
use std::future::Future;
use std::sync::Arc;
use tracing::error;

#[derive(Debug)]
pub struct PoolDb<P = DbPool> {
    shared: Arc<PoolShared<P>>,
}

impl<P> Clone for PoolDb<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl PoolDb<DbPool> {
    /// Get a handle to `registry`'s pool, connecting on first use.
    ///
    /// `pool_size` overrides the setup's `pool_size` key. A pool that fails
    /// to build is logged; every call on the handle then returns
    /// [`PoolUnavailable`](crate::DbError::PoolUnavailable).
    pub async fn new(registry: &PoolRegistry, setup: Setup, pool_size: Option<u32>) -> Self {
        validate_setup(&setup);
        Self {
            shared: registry.get_or_connect(&setup, pool_size).await,
        }
    }

    /// Handle to the process-wide pool.
    pub async fn global(setup: Setup, pool_size: Option<u32>) -> Self {
        Self::new(PoolRegistry::global(), setup, pool_size).await
    }
}

impl<P: ConnectionSource> PoolDb<P> {
    /// Get a handle to `registry`'s pool, building it with `create` on first use.
    pub async fn with_factory<F, Fut>(
        registry: &PoolRegistry<P>,
        setup: Setup,
        pool_size: u32,
        create: F,
    ) -> Self
    where
        F: FnOnce(Setup, u32) -> Fut,
        Fut: Future<Output = DbResult<P>>,
    {
        validate_setup(&setup);
        Self {
            shared: registry.get_or_init_with(&setup, pool_size, create).await,
        }
    }

    /// Setup the pool was built from.
    pub fn setup(&self) -> &Setup {
        self.shared.setup()
    }

    pub fn pool_size(&self) -> u32 {
        self.shared.pool_size()
    }

    /// Whether pool creation succeeded.
    pub fn is_available(&self) -> bool {
        self.shared.is_available()
    }

    pub fn pool(&self) -> Option<&P> {
        self.shared.pool()
    }

    pub async fn read_data(
        &self,
        query: &str,
        params: &[QueryParam],
        datatype: &str,
    ) -> DbResult<QueryData> {
        let data_type = parse_datatype(datatype)?;
        self.read(query, params, data_type).await
    }

    pub async fn read(
        &self,
        query: &str,
        params: &[QueryParam],
        data_type: DataType,
    ) -> DbResult<QueryData> {
        QueryExecutor::new(self.source()?)
            .read(query, params, data_type)
            .await
    }

    pub async fn execute_query(&self, query: &str, params: &[QueryParam]) -> DbResult<u64> {
        QueryExecutor::new(self.source()?)
            .execute(query, params)
            .await
    }

    pub async fn execute_many(&self, query: &str, values: &[Vec<QueryParam>]) -> DbResult<u64> {
        QueryExecutor::new(self.source()?)
            .execute_many(query, values)
            .await
    }

    fn source(&self) -> DbResult<&P> {
        self.shared.available().inspect_err(|_| {
            error!("No connection pool available; pool creation failed earlier");
        })
    }
}

//! Blocking single-connection client.

use crate::client::AsyncDb;
use crate::config::Setup;
use crate::error::{DbError, DbResult};
use crate::models::{DataType, QueryData, QueryParam};
use tokio::runtime::{Builder, Runtime};

/// Blocking counterpart of [`AsyncDb`].
///
/// Each call blocks the current thread until the statement finishes. It owns
/// a current-thread runtime, so it must not be used from inside an async
/// context.
#[derive(Debug)]
pub struct ConnectionDb {
    runtime: Runtime,
    inner: AsyncDb,
}

impl ConnectionDb {
    pub fn new(setup: Setup) -> DbResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DbError::internal(format!("Failed to start runtime: {}", e)))?;
        Ok(Self {
            runtime,
            inner: AsyncDb::new(setup),
        })
    }

    pub fn setup(&self) -> &Setup {
        self.inner.setup()
    }

    pub fn read_data(
        &self,
        query: &str,
        params: &[QueryParam],
        datatype: &str,
    ) -> DbResult<QueryData> {
        self.runtime
            .block_on(self.inner.read_data(query, params, datatype))
    }

    pub fn read(
        &self,
        query: &str,
        params: &[QueryParam],
        data_type: DataType,
    ) -> DbResult<QueryData> {
        self.runtime
            .block_on(self.inner.read(query, params, data_type))
    }

    pub fn execute_query(&self, query: &str, params: &[QueryParam]) -> DbResult<u64> {
        self.runtime.block_on(self.inner.execute_query(query, params))
    }

    pub fn execute_many(&self, query: &str, values: &[Vec<QueryParam>]) -> DbResult<u64> {
        self.runtime.block_on(self.inner.execute_many(query, values))
    }
}

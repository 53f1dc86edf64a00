//! Async single-connection client.

use crate::config::{Setup, validate_setup};
use crate::db::QueryExecutor;
use crate::db::connector::DirectConnector;
use crate::db::executor::parse_datatype;
use crate::error::DbResult;
use crate::models::{DataType, QueryData, QueryParam};
use tracing::error;

/// Opens a new connection for every call and closes it afterwards.
///
/// Construction never fails; an unusable setup surfaces as a configuration
/// error from the first call.
#[derive(Debug, Clone)]
pub struct AsyncDb {
    setup: Setup,
}

impl AsyncDb {
    pub fn new(setup: Setup) -> Self {
        validate_setup(&setup);
        Self { setup }
    }

    pub fn setup(&self) -> &Setup {
        &self.setup
    }

    /// Read with the result shape given by name: `"dict"` or `"list"`.
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
        let connector = self.connector()?;
        QueryExecutor::new(&connector)
            .read(query, params, data_type)
            .await
    }

    /// Run one write in its own transaction. Returns the rows affected.
    pub async fn execute_query(&self, query: &str, params: &[QueryParam]) -> DbResult<u64> {
        let connector = self.connector()?;
        QueryExecutor::new(&connector).execute(query, params).await
    }

    /// Run `query` once per parameter tuple in a single transaction.
    pub async fn execute_many(&self, query: &str, values: &[Vec<QueryParam>]) -> DbResult<u64> {
        let connector = self.connector()?;
        QueryExecutor::new(&connector)
            .execute_many(query, values)
            .await
    }

    fn connector(&self) -> DbResult<DirectConnector> {
        DirectConnector::from_setup(&self.setup).inspect_err(|e| {
            error!(error = %e, "Cannot resolve connection settings");
        })
    }
}

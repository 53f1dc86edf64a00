//! Query execution engine.
//!
//! Every operation follows the same lifecycle: acquire one session from the
//! [`ConnectionSource`], open a transaction, run the statement(s), commit
//! (or roll back on failure), release the session, and shape the result.
//! The session is released on every path, including errors.

use crate::db::session::{ConnectionSource, Session};
use crate::error::DbResult;
use crate::models::{DataType, QueryData, QueryParam, RowSet};
use serde_json::{Map, Value as JsonValue};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Runs reads and writes against a connection source.
pub struct QueryExecutor<'a, S> {
    source: &'a S,
}

impl<'a, S: ConnectionSource> QueryExecutor<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Read with the result shape given by name (`"dict"` or `"list"`,
    /// case-insensitive).
    ///
    /// An unknown shape is rejected before any connection is taken.
    pub async fn read_data(
        &self,
        query: &str,
        params: &[QueryParam],
        datatype: &str,
    ) -> DbResult<QueryData> {
        let data_type = parse_datatype(datatype)?;
        self.read(query, params, data_type).await
    }

    /// Run a query inside a transaction and shape the rows.
    pub async fn read(
        &self,
        query: &str,
        params: &[QueryParam],
        data_type: DataType,
    ) -> DbResult<QueryData> {
        let start = Instant::now();
        debug!(sql = %query, params = params.len(), datatype = %data_type, "Executing read");

        let mut session = self.acquire(query).await?;
        let result: DbResult<RowSet> = async {
            session.begin().await?;
            session.fetch_all(query, params).await
        }
        .await;
        let result = finish(&mut session, result).await;
        session.close().await;

        match result {
            Ok(rows) => {
                let data = shape(rows, data_type);
                info!(
                    rows = data.len(),
                    datatype = %data_type,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Read completed"
                );
                Ok(data)
            }
            Err(e) => {
                error!(sql = %query, error = %e, "Read failed");
                Err(e)
            }
        }
    }

    /// Run a single write and commit it. Returns the rows affected.
    pub async fn execute(&self, query: &str, params: &[QueryParam]) -> DbResult<u64> {
        let start = Instant::now();
        debug!(sql = %query, params = params.len(), "Executing write");

        let mut session = self.acquire(query).await?;
        let result: DbResult<u64> = async {
            session.begin().await?;
            session.execute(query, params).await
        }
        .await;
        let result = finish(&mut session, result).await;
        session.close().await;

        match result {
            Ok(rows_affected) => {
                info!(
                    rows_affected,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Write committed"
                );
                Ok(rows_affected)
            }
            Err(e) => {
                error!(sql = %query, error = %e, "Write failed");
                Err(e)
            }
        }
    }

    /// Prepare `query` once and run it for each parameter tuple, all in one
    /// transaction on one connection. Returns the total rows affected.
    pub async fn execute_many(&self, query: &str, values: &[Vec<QueryParam>]) -> DbResult<u64> {
        let start = Instant::now();
        debug!(sql = %query, batches = values.len(), "Executing batch write");

        let mut session = self.acquire(query).await?;
        let result: DbResult<u64> = async {
            session.begin().await?;
            session.prepare(query).await?;
            let mut total = 0;
            for params in values {
                total += session.execute(query, params).await?;
            }
            Ok(total)
        }
        .await;
        let result = finish(&mut session, result).await;
        session.close().await;

        match result {
            Ok(rows_affected) => {
                info!(
                    rows_affected,
                    batches = values.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Batch write committed"
                );
                Ok(rows_affected)
            }
            Err(e) => {
                error!(sql = %query, batches = values.len(), error = %e, "Batch write failed");
                Err(e)
            }
        }
    }

    async fn acquire(&self, query: &str) -> DbResult<S::Session> {
        self.source.acquire().await.inspect_err(|e| {
            error!(sql = %query, error = %e, "Failed to acquire connection");
        })
    }
}

/// Parse a result shape name, logging a warning when it is not recognised.
pub fn parse_datatype(datatype: &str) -> DbResult<DataType> {
    datatype.parse::<DataType>().inspect_err(|e| {
        warn!(datatype = %datatype, error = %e, "Invalid datatype requested");
    })
}

/// Commit on success, roll back on failure.
async fn finish<S: Session, T>(session: &mut S, result: DbResult<T>) -> DbResult<T> {
    let error = match result {
        Ok(value) => match session.commit().await {
            Ok(()) => return Ok(value),
            Err(e) => e,
        },
        Err(e) => e,
    };
    if let Err(rollback_err) = session.rollback().await {
        warn!(error = %rollback_err, "Rollback failed");
    }
    Err(error)
}

/// Upper-case the column names and build the requested shape.
fn shape(rows: RowSet, data_type: DataType) -> QueryData {
    let columns: Vec<String> = rows.columns.iter().map(|c| c.to_uppercase()).collect();

    match data_type {
        DataType::Dict => QueryData::Dict(
            rows.rows
                .into_iter()
                .map(|row| {
                    columns
                        .iter()
                        .cloned()
                        .zip(row)
                        .collect::<Map<String, JsonValue>>()
                })
                .collect(),
        ),
        DataType::List => QueryData::List(columns, rows.rows),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> RowSet {
        RowSet::new(
            vec!["id".into(), "Name".into()],
            vec![vec![json!(1), json!("a")], vec![json!(2), json!(null)]],
        )
    }

    #[test]
    fn test_shape_dict_uppercases_keys() {
        let QueryData::Dict(rows) = shape(sample(), DataType::Dict) else {
            panic!("expected dict");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["ID"], json!(1));
        assert_eq!(rows[0]["NAME"], json!("a"));
        assert_eq!(rows[1]["NAME"], JsonValue::Null);
    }

    #[test]
    fn test_shape_list_keeps_row_order() {
        let QueryData::List(columns, rows) = shape(sample(), DataType::List) else {
            panic!("expected list");
        };
        assert_eq!(columns, vec!["ID", "NAME"]);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.len() == columns.len()));
    }

    #[test]
    fn test_shape_empty() {
        let empty = RowSet::new(vec![], vec![]);
        assert_eq!(shape(empty.clone(), DataType::Dict), QueryData::Dict(vec![]));
        assert_eq!(
            shape(empty, DataType::List),
            QueryData::List(vec![], vec![])
        );
    }
}

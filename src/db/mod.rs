//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Session and connection-source traits the executor runs against
//! - Fixed-size connection pools and the one-time pool registry
//! - Single-connection sources
//! - Query execution with transaction handling
//! - Parameter binding and type mappings
//! - Database dispatch macros for reducing code duplication

#[macro_use]
pub mod macros;
pub mod connector;
pub mod executor;
pub mod params;
pub mod pool;
pub mod session;
pub mod types;

pub use connector::DirectConnector;
pub use executor::QueryExecutor;
pub use pool::{DbPool, PoolRegistry, PoolShared};
pub use session::{ConnectionSource, DbConnection, Link, Session, SqlSession};

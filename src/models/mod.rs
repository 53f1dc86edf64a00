//! Data models for dbcnx.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;

pub use connection::{ConnectionSettings, DatabaseType};
pub use query::{DataType, QueryData, QueryParam, RowSet};

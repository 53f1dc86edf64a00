//! dbcnx
//!
//! Thin convenience clients over sqlx for PostgreSQL, MySQL and SQLite:
//! a blocking single-connection client, an async single-connection client
//! and a pooled client backed by a one-time pool registry. Each runs reads
//! and writes inside a transaction and hands connections back on every path.

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use client::{AsyncDb, ConnectionDb, PoolDb};
pub use config::{Config, Setup, validate_setup};
pub use db::PoolRegistry;
pub use error::{DbError, DbResult, ErrorKind};
pub use models::{DataType, QueryData, QueryParam};

//! Client-facing providers.
//!
//! All three expose the same surface (`read_data`, `read`, `execute_query`,
//! `execute_many`) and differ only in where connections come from:
//!
//! - [`ConnectionDb`]: blocking, one fresh connection per call
//! - [`AsyncDb`]: async, one fresh connection per call
//! - [`PoolDb`]: async, connections borrowed from a registry-owned pool

pub mod blocking;
pub mod pooled;
pub mod single;

pub use blocking::ConnectionDb;
pub use pooled::PoolDb;
pub use single::AsyncDb;

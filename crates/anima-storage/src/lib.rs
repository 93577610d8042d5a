//! # anima-storage
//!
//! Postgres persistence layer for the anima engine: the connection pool
//! wrapper, schema bootstrap, parameterised batch helpers, and row →
//! model mapping. Every other crate reads and writes through this one.

pub mod batch;
pub mod error;
pub mod pool;
pub mod retry;
pub mod rows;
pub mod schema;

pub use error::map_sqlx;
pub use pool::{StoragePool, StoragePoolOptions};
pub use retry::retry_once;
pub use schema::ensure_schema;

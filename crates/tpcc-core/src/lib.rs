//! TPC-C Core - Core abstractions for the TPC-C connector
//!
//! This crate provides the types and traits shared by the driver and the
//! service layer:
//!
//! - `DatabaseDriver` - Trait for database driver implementations
//! - `Connection` / `Transaction` - Session and explicit transaction traits
//! - `StatementBatch` - Ordered statements executed as one unit of work
//! - `Value` (parameters) and `Scalar` (normalized result cells)
//! - `ConnectionConfig` - Explicit configuration built from the environment

mod connection;
mod driver;
mod error;
pub mod health;
pub mod security;
mod statement;
pub mod transaction;
mod types;

#[cfg(test)]
mod test_support;

pub use connection::*;
pub use driver::*;
pub use error::*;
pub use security::*;
pub use statement::*;
pub use transaction::*;
pub use types::*;

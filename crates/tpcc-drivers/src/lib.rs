//! TPC-C Drivers - Database driver implementations
//!
//! Concrete implementations of the driver traits defined in `tpcc-core`,
//! plus the registry that selects one from the configured provider.

#[cfg(feature = "cockroach")]
pub use tpcc_driver_cockroach as cockroach;

mod registry;

pub use registry::{DriverRegistry, connect_from_env, driver_from_config};

/// Re-export commonly used types from tpcc-core
pub use tpcc_core::{
    Connection, ConnectionConfig, DatabaseDriver, DbProvider, Result, ResultSet, Row, Scalar,
    StatementBatch, TpccError, Transaction, Value,
};

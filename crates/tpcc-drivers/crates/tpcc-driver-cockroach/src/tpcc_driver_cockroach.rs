//! CockroachDB driver implementation

mod connection;
mod driver;
mod tls;
mod values;

pub use connection::{CockroachConnection, CockroachTransaction};
pub use driver::CockroachDriver;
pub use tls::{CockroachTlsConnector, TlsError, negotiation_mode};

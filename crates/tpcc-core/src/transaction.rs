//! Transactional batch execution
//!
//! The [`Connection`](crate::Connection) trait provides `execute_batch` on top
//! of `begin_transaction`; the state machine driving it lives here.

mod batch;

pub use batch::*;

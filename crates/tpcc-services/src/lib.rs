//! TPC-C Services Layer
//!
//! Assembles the TPC-C transaction profiles, dashboard queries, schema check
//! and ACID probes on top of a [`tpcc_core::Connection`].
//!
//! # Architecture
//!
//! ```text
//! CLI (tpcc-cli)
//!     ↓
//! Service Layer (tpcc-services) ← This crate
//!     ↓
//! Infrastructure Layer (tpcc-core)
//! ```
//!
//! # Services
//!
//! - [`TpccService`] - New Order, Payment, Delivery and Stock Level
//! - [`AnalyticsService`] - Dashboard counts and browsing queries
//! - [`SchemaCheck`] - Presence and size of the TPC-C tables
//! - [`AcidSuite`] - Atomicity, consistency, isolation and durability probes

mod acid;
mod analytics_service;
mod error;
mod profiles;
mod schema_check;
mod view_models;

pub use acid::{
    AcidProperty, AcidReport, AcidSuite, AcidSummary, AcidTestResult, CheckResult, TestStatus,
};
pub use analytics_service::{AnalyticsService, LOW_STOCK_QUANTITY};
pub use error::{ServiceError, ServiceResult};
pub use profiles::{DISTRICTS_PER_WAREHOUSE, ProfileOutcome, TpccService};
pub use schema_check::{SchemaCheck, TPCC_TABLES};
pub use view_models::{
    ColumnInfo, ConnectionStatus, DashboardMetrics, DashboardSnapshot, DeliveredOrder,
    DeliveryReport, DistrictDelivery, NewOrderReceipt, OrderItem, OrderLineDetail,
    PaymentReceipt, SchemaReport, SkipReason, StockLevelReport, TableCount,
};

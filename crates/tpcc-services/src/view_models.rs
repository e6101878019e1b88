//! View models returned by the services
//!
//! These are plain data carriers for the CLI (and any other front end); they
//! never hold a connection.

use rust_decimal::Decimal;
use serde::Serialize;

/// One line requested in a New Order transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderItem {
    pub item_id: i32,
    /// Supplying warehouse; defaults to the ordering warehouse
    pub supply_warehouse_id: Option<i32>,
    pub quantity: i32,
}

impl OrderItem {
    pub fn new(item_id: i32, quantity: i32) -> Self {
        Self {
            item_id,
            supply_warehouse_id: None,
            quantity,
        }
    }

    pub fn supplied_by(mut self, warehouse_id: i32) -> Self {
        self.supply_warehouse_id = Some(warehouse_id);
        self
    }
}

/// A placed order line with its price and the stock level after the update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderLineDetail {
    pub line_number: i32,
    pub item_id: i32,
    pub item_name: String,
    pub supply_warehouse_id: i32,
    pub quantity: i32,
    pub amount: Decimal,
    pub stock_quantity: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewOrderReceipt {
    pub order_id: i64,
    pub warehouse_id: i32,
    pub district_id: i32,
    pub customer_id: i32,
    pub total_amount: Decimal,
    pub all_local: bool,
    pub entry_date: String,
    pub order_lines: Vec<OrderLineDetail>,
}

/// Result of a Payment transaction.
///
/// Street addresses of the warehouse and district are never returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentReceipt {
    pub warehouse_id: i32,
    pub district_id: i32,
    pub customer_id: i32,
    pub amount: Decimal,
    pub payment_date: String,
    pub warehouse_name: Option<String>,
    pub district_name: Option<String>,
    pub customer_name: Option<String>,
    pub customer_credit: Option<String>,
    pub customer_balance: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveredOrder {
    pub district_id: i32,
    pub order_id: i64,
    pub customer_id: Option<i64>,
    pub total_amount: Decimal,
}

/// Why a district produced no delivery
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    NoPendingOrder,
    Failed(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoPendingOrder => write!(f, "no pending order"),
            SkipReason::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Per-district outcome of a Delivery transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DistrictDelivery {
    Delivered(DeliveredOrder),
    Skipped { district_id: i32, reason: SkipReason },
}

impl DistrictDelivery {
    pub fn district_id(&self) -> i32 {
        match self {
            DistrictDelivery::Delivered(order) => order.district_id,
            DistrictDelivery::Skipped { district_id, .. } => *district_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReport {
    pub warehouse_id: i32,
    pub carrier_id: i32,
    pub delivery_date: String,
    pub districts: Vec<DistrictDelivery>,
}

impl DeliveryReport {
    pub fn delivered(&self) -> impl Iterator<Item = &DeliveredOrder> {
        self.districts.iter().filter_map(|d| match d {
            DistrictDelivery::Delivered(order) => Some(order),
            DistrictDelivery::Skipped { .. } => None,
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = (i32, &SkipReason)> {
        self.districts.iter().filter_map(|d| match d {
            DistrictDelivery::Skipped {
                district_id,
                reason,
            } => Some((*district_id, reason)),
            DistrictDelivery::Delivered(_) => None,
        })
    }

    pub fn orders_delivered(&self) -> usize {
        self.delivered().count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockLevelReport {
    pub warehouse_id: i32,
    pub district_id: i32,
    pub threshold: i32,
    pub low_stock_count: i64,
}

/// Outcome of a connection probe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub success: bool,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Counts shown on the dashboard; every field falls back to zero
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardMetrics {
    pub total_warehouses: i64,
    pub total_customers: i64,
    pub total_orders: i64,
    pub total_items: i64,
    pub new_orders: i64,
    pub low_stock_items: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub provider: String,
    pub metrics: DashboardMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DashboardSnapshot {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: String,
    /// Row count, or the error message when counting failed
    pub count: Result<i64, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    pub tables: Vec<String>,
    pub row_counts: Vec<TableCount>,
    pub item_columns: Vec<ColumnInfo>,
}

impl SchemaReport {
    /// TPC-C tables whose count failed, usually because they do not exist
    pub fn missing_tables(&self) -> Vec<&str> {
        self.row_counts
            .iter()
            .filter(|c| c.count.is_err())
            .map(|c| c.table.as_str())
            .collect()
    }
}

//! Dashboard metrics and browsing queries

use std::sync::Arc;
use tpcc_core::{Connection, Row, TpccError, Value};

use crate::error::{ServiceError, ServiceResult};
use crate::view_models::{ConnectionStatus, DashboardMetrics, DashboardSnapshot};

/// Stock quantity below which an item counts as low
pub const LOW_STOCK_QUANTITY: i64 = 50;

const RECENT_ORDERS: &str = r#"
    SELECT o_id, o_w_id, o_d_id, o_c_id, o_entry_d, o_ol_cnt, o_all_local
    FROM "order"
    ORDER BY o_entry_d DESC
    LIMIT $1"#;

const LOW_STOCK_INVENTORY: &str = "
    SELECT s.s_i_id, i.i_name, s.s_w_id, s.s_quantity, i.i_price
    FROM stock s
    JOIN item i ON s.s_i_id = i.i_id
    WHERE s.s_quantity < $1
    ORDER BY s.s_quantity ASC
    LIMIT $2";

const WAREHOUSES: &str = "SELECT w_id, w_name, w_city, w_state FROM warehouse ORDER BY w_id";

/// Read-only queries backing the dashboard
pub struct AnalyticsService {
    conn: Arc<dyn Connection>,
}

impl AnalyticsService {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        tracing::info!(provider = conn.driver_name(), "analytics service initialized");
        Self { conn }
    }

    pub fn provider(&self) -> &str {
        self.conn.driver_name()
    }

    pub async fn test_connection(&self) -> ConnectionStatus {
        let success = self.conn.test_connection().await;
        ConnectionStatus {
            success,
            provider: self.provider().to_string(),
            message: Some(if success { "Connection successful" } else { "Connection failed" }.to_string()),
            error: (!success).then(|| "Database connection failed".to_string()),
        }
    }

    /// Collect the dashboard counts.
    ///
    /// Each count is best effort: a failing query contributes zero. When the
    /// connection test fails the snapshot carries all-zero metrics and an error.
    #[tracing::instrument(skip(self))]
    pub async fn dashboard_metrics(&self) -> DashboardSnapshot {
        let provider = self.provider().to_string();
        if !self.conn.test_connection().await {
            return DashboardSnapshot {
                provider,
                metrics: DashboardMetrics::default(),
                error: Some("Database connection failed".to_string()),
            };
        }

        let metrics = DashboardMetrics {
            total_warehouses: self.count("warehouse", "SELECT COUNT(*) AS count FROM warehouse", &[]).await,
            total_customers: self.count("customer", "SELECT COUNT(*) AS count FROM customer", &[]).await,
            total_orders: self.count("order", r#"SELECT COUNT(*) AS count FROM "order""#, &[]).await,
            total_items: self.count("item", "SELECT COUNT(*) AS count FROM item", &[]).await,
            new_orders: self.count("new_order", "SELECT COUNT(*) AS count FROM new_order", &[]).await,
            low_stock_items: self
                .count(
                    "low_stock",
                    "SELECT COUNT(*) AS count FROM stock WHERE s_quantity < $1",
                    &[Value::Int64(LOW_STOCK_QUANTITY)],
                )
                .await,
        };

        DashboardSnapshot {
            provider,
            metrics,
            error: None,
        }
    }

    async fn count(&self, metric: &str, sql: &str, params: &[Value]) -> i64 {
        match self.conn.execute(sql, params).await {
            Ok(result) => result.first().and_then(|r| r.get_i64("count")).unwrap_or(0),
            Err(e) => {
                tracing::warn!(metric, error = %e, "failed to get count");
                0
            }
        }
    }

    /// Most recent orders by entry date
    pub async fn recent_orders(&self, limit: i64) -> ServiceResult<Vec<Row>> {
        self.browse("recent orders", RECENT_ORDERS, &[Value::Int64(limit)]).await
    }

    /// Stock rows below the low-stock quantity, lowest first, joined with their item
    pub async fn low_stock_inventory(&self, limit: i64) -> ServiceResult<Vec<Row>> {
        self.browse(
            "inventory",
            LOW_STOCK_INVENTORY,
            &[Value::Int64(LOW_STOCK_QUANTITY), Value::Int64(limit)],
        )
        .await
    }

    pub async fn warehouses(&self) -> ServiceResult<Vec<Row>> {
        self.browse("warehouses", WAREHOUSES, &[]).await
    }

    async fn browse(&self, what: &str, sql: &str, params: &[Value]) -> ServiceResult<Vec<Row>> {
        if !self.conn.test_connection().await {
            return Err(ServiceError::Database(TpccError::Connection(
                "Database connection failed".to_string(),
            )));
        }
        match self.conn.execute(sql, params).await {
            Ok(result) => Ok(result.rows),
            Err(e) => {
                tracing::error!(error = %e, "failed to get {}", what);
                Err(e.into())
            }
        }
    }

    /// Close the underlying connection; failures are logged, not returned
    pub async fn close(&self) {
        match self.conn.close().await {
            Ok(()) => tracing::info!("analytics service connection closed"),
            Err(e) => tracing::error!(error = %e, "error closing connection"),
        }
    }
}

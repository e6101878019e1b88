use std::time::Instant;
use tpcc_core::Value;

use super::{ProfileOutcome, TpccService, finish, required_i64};
use crate::error::{ServiceError, ServiceResult};
use crate::view_models::StockLevelReport;

/// Number of most recent orders examined
const RECENT_ORDERS: i64 = 20;

const NEXT_ORDER_ID: &str = "SELECT d_next_o_id FROM district WHERE d_w_id = $1 AND d_id = $2";

const COUNT_LOW_STOCK: &str = "
    SELECT COUNT(DISTINCT s.s_i_id) AS low_stock_count
    FROM stock s
    JOIN order_line ol ON s.s_i_id = ol.ol_i_id AND s.s_w_id = ol.ol_supply_w_id
    WHERE ol.ol_w_id = $1
      AND ol.ol_d_id = $2
      AND ol.ol_o_id >= $3
      AND ol.ol_o_id < $4
      AND s.s_quantity < $5";

impl TpccService {
    /// Count distinct items from the district's last 20 orders whose stock
    /// is below `threshold`. Read only.
    #[tracing::instrument(skip(self))]
    pub async fn stock_level(
        &self,
        warehouse_id: i32,
        district_id: i32,
        threshold: i32,
    ) -> ProfileOutcome<StockLevelReport> {
        let started = Instant::now();
        let result = self.try_stock_level(warehouse_id, district_id, threshold).await;
        finish("stock_level", started, result)
    }

    async fn try_stock_level(
        &self,
        warehouse_id: i32,
        district_id: i32,
        threshold: i32,
    ) -> ServiceResult<StockLevelReport> {
        let district = self
            .conn
            .execute(
                NEXT_ORDER_ID,
                &[Value::Int32(warehouse_id), Value::Int32(district_id)],
            )
            .await?
            .into_first()
            .ok_or_else(|| {
                ServiceError::NotFound(format!("District {} of warehouse {}", district_id, warehouse_id))
            })?;
        let next_order_id = required_i64(&district, "d_next_o_id")?;

        let counted = self
            .conn
            .execute(
                COUNT_LOW_STOCK,
                &[
                    Value::Int32(warehouse_id),
                    Value::Int32(district_id),
                    Value::Int64(next_order_id - RECENT_ORDERS),
                    Value::Int64(next_order_id),
                    Value::Int32(threshold),
                ],
            )
            .await?;
        let low_stock_count = counted
            .first()
            .and_then(|r| r.get_i64("low_stock_count"))
            .unwrap_or(0);

        tracing::info!(low_stock_count, "items below threshold");
        Ok(StockLevelReport {
            warehouse_id,
            district_id,
            threshold,
            low_stock_count,
        })
    }
}

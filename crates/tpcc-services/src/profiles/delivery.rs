use rust_decimal::Decimal;
use std::time::Instant;
use tpcc_core::{StatementBatch, Value};

use super::{DISTRICTS_PER_WAREHOUSE, ProfileOutcome, TpccService, finish, timestamp_now};
use crate::error::ServiceResult;
use crate::view_models::{DeliveredOrder, DeliveryReport, DistrictDelivery, SkipReason};

const OLDEST_NEW_ORDER: &str = "
    SELECT no_o_id
    FROM new_order
    WHERE no_w_id = $1 AND no_d_id = $2
    ORDER BY no_o_id
    LIMIT 1";

const DELETE_NEW_ORDER: &str =
    "DELETE FROM new_order WHERE no_w_id = $1 AND no_d_id = $2 AND no_o_id = $3";

const SET_CARRIER: &str = r#"
    UPDATE "order"
    SET o_carrier_id = $1
    WHERE o_w_id = $2 AND o_d_id = $3 AND o_id = $4
    RETURNING o_c_id"#;

const SET_DELIVERY_DATE: &str = "
    UPDATE order_line
    SET ol_delivery_d = $1
    WHERE ol_w_id = $2 AND ol_d_id = $3 AND ol_o_id = $4
    RETURNING ol_amount";

const CREDIT_CUSTOMER: &str = "
    UPDATE customer
    SET c_balance = c_balance + $1,
        c_delivery_cnt = c_delivery_cnt + 1
    WHERE c_w_id = $2 AND c_d_id = $3 AND c_id = $4";

impl TpccService {
    /// Deliver the oldest pending order of every district in the warehouse.
    ///
    /// Districts are processed independently; a district without pending
    /// orders or with a failing statement is reported as skipped.
    #[tracing::instrument(skip(self))]
    pub async fn delivery(&self, warehouse_id: i32, carrier_id: i32) -> ProfileOutcome<DeliveryReport> {
        let started = Instant::now();
        let delivery_date = timestamp_now();

        let mut districts = Vec::with_capacity(DISTRICTS_PER_WAREHOUSE as usize);
        for district_id in 1..=DISTRICTS_PER_WAREHOUSE {
            let outcome = match self
                .deliver_district(warehouse_id, district_id, carrier_id, delivery_date)
                .await
            {
                Ok(Some(order)) => DistrictDelivery::Delivered(order),
                Ok(None) => DistrictDelivery::Skipped {
                    district_id,
                    reason: SkipReason::NoPendingOrder,
                },
                Err(e) => {
                    tracing::warn!(district_id, error = %e, "failed to deliver order in district");
                    DistrictDelivery::Skipped {
                        district_id,
                        reason: SkipReason::Failed(e.to_string()),
                    }
                }
            };
            districts.push(outcome);
        }

        let report = DeliveryReport {
            warehouse_id,
            carrier_id,
            delivery_date: tpcc_core::Scalar::from(Value::DateTime(delivery_date)).to_string(),
            districts,
        };
        tracing::info!(orders_delivered = report.orders_delivered(), "delivery finished");
        finish("delivery", started, Ok(report))
    }

    async fn deliver_district(
        &self,
        warehouse_id: i32,
        district_id: i32,
        carrier_id: i32,
        delivery_date: chrono::NaiveDateTime,
    ) -> ServiceResult<Option<DeliveredOrder>> {
        let pending = self
            .conn
            .execute(
                OLDEST_NEW_ORDER,
                &[Value::Int32(warehouse_id), Value::Int32(district_id)],
            )
            .await?;
        let Some(order_id) = pending.first().and_then(|r| r.get_i64("no_o_id")) else {
            tracing::debug!(district_id, "no pending order");
            return Ok(None);
        };

        let key = [
            Value::Int32(warehouse_id),
            Value::Int32(district_id),
            Value::Int64(order_id),
        ];
        let batch = StatementBatch::new()
            .push(DELETE_NEW_ORDER, key.to_vec())
            .push(
                SET_CARRIER,
                std::iter::once(Value::Int32(carrier_id))
                    .chain(key.iter().cloned())
                    .collect(),
            )
            .push(
                SET_DELIVERY_DATE,
                std::iter::once(Value::DateTime(delivery_date))
                    .chain(key.iter().cloned())
                    .collect(),
            );

        let results = self.conn.execute_batch(&batch).await?;

        let customer_id = results
            .get(1)
            .and_then(|r| r.first())
            .and_then(|r| r.get_i64("o_c_id"));
        let total_amount: Decimal = results
            .get(2)
            .map(|r| r.rows.iter().filter_map(|row| row.get_decimal("ol_amount")).sum())
            .unwrap_or_default();

        if let Some(customer_id) = customer_id
            && total_amount > Decimal::ZERO
        {
            self.conn
                .execute(
                    CREDIT_CUSTOMER,
                    &[
                        Value::Decimal(total_amount),
                        Value::Int32(warehouse_id),
                        Value::Int32(district_id),
                        Value::Int64(customer_id),
                    ],
                )
                .await?;
        }

        Ok(Some(DeliveredOrder {
            district_id,
            order_id,
            customer_id,
            total_amount,
        }))
    }
}

use rust_decimal::Decimal;
use std::time::Instant;
use tpcc_core::{ResultSet, Row, StatementBatch, Value};

use super::{ProfileOutcome, TpccService, finish, timestamp_now};
use crate::error::{ServiceError, ServiceResult};
use crate::view_models::PaymentReceipt;

const SELECT_CUSTOMER: &str =
    "SELECT c_id FROM customer WHERE c_w_id = $1 AND c_d_id = $2 AND c_id = $3";

const UPDATE_WAREHOUSE: &str = "
    UPDATE warehouse
    SET w_ytd = w_ytd + $1
    WHERE w_id = $2
    RETURNING w_name";

const UPDATE_DISTRICT: &str = "
    UPDATE district
    SET d_ytd = d_ytd + $1
    WHERE d_w_id = $2 AND d_id = $3
    RETURNING d_name";

const UPDATE_CUSTOMER: &str = "
    UPDATE customer
    SET c_balance = c_balance - $1,
        c_ytd_payment = c_ytd_payment + $1,
        c_payment_cnt = c_payment_cnt + 1
    WHERE c_w_id = $2 AND c_d_id = $3 AND c_id = $4
    RETURNING c_first, c_middle, c_last, c_balance, c_credit";

const INSERT_HISTORY: &str = "
    INSERT INTO history (h_c_id, h_c_d_id, h_c_w_id, h_d_id, h_w_id, h_date, h_amount, h_data)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";

impl TpccService {
    /// Record a customer payment against warehouse, district and customer totals
    #[tracing::instrument(skip(self))]
    pub async fn payment(
        &self,
        warehouse_id: i32,
        district_id: i32,
        customer_id: i32,
        amount: Decimal,
    ) -> ProfileOutcome<PaymentReceipt> {
        let started = Instant::now();
        let result = self
            .try_payment(warehouse_id, district_id, customer_id, amount)
            .await;
        finish("payment", started, result)
    }

    async fn try_payment(
        &self,
        warehouse_id: i32,
        district_id: i32,
        customer_id: i32,
        amount: Decimal,
    ) -> ServiceResult<PaymentReceipt> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(format!(
                "payment amount must be positive, got {}",
                amount
            )));
        }

        // Unknown customers fail before any write
        self.conn
            .execute(
                SELECT_CUSTOMER,
                &[
                    Value::Int32(warehouse_id),
                    Value::Int32(district_id),
                    Value::Int32(customer_id),
                ],
            )
            .await?
            .first()
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Customer {} of district {} warehouse {}",
                    customer_id, district_id, warehouse_id
                ))
            })?;

        let payment_date = timestamp_now();
        let batch = StatementBatch::new()
            .push(
                UPDATE_WAREHOUSE,
                vec![Value::Decimal(amount), Value::Int32(warehouse_id)],
            )
            .push(
                UPDATE_DISTRICT,
                vec![
                    Value::Decimal(amount),
                    Value::Int32(warehouse_id),
                    Value::Int32(district_id),
                ],
            )
            .push(
                UPDATE_CUSTOMER,
                vec![
                    Value::Decimal(amount),
                    Value::Int32(warehouse_id),
                    Value::Int32(district_id),
                    Value::Int32(customer_id),
                ],
            )
            .push(
                INSERT_HISTORY,
                vec![
                    Value::Int32(customer_id),
                    Value::Int32(district_id),
                    Value::Int32(warehouse_id),
                    Value::Int32(district_id),
                    Value::Int32(warehouse_id),
                    Value::DateTime(payment_date),
                    Value::Decimal(amount),
                    Value::String(format!(
                        "Payment W:{} D:{} C:{}",
                        warehouse_id, district_id, customer_id
                    )),
                ],
            );

        let results = self.conn.execute_batch(&batch).await?;

        let warehouse = first_row(&results, 0);
        let district = first_row(&results, 1);
        let customer = first_row(&results, 2);
        if customer.is_none() {
            tracing::warn!(customer_id, "customer row vanished during payment");
        }

        Ok(PaymentReceipt {
            warehouse_id,
            district_id,
            customer_id,
            amount,
            payment_date: tpcc_core::Scalar::from(Value::DateTime(payment_date)).to_string(),
            warehouse_name: warehouse.and_then(|r| r.get_str("w_name")).map(str::to_string),
            district_name: district.and_then(|r| r.get_str("d_name")).map(str::to_string),
            customer_name: customer.map(customer_name),
            customer_credit: customer.and_then(|r| r.get_str("c_credit")).map(str::to_string),
            customer_balance: customer.and_then(|r| r.get_decimal("c_balance")),
        })
    }
}

fn first_row(results: &[ResultSet], index: usize) -> Option<&Row> {
    results.get(index).and_then(ResultSet::first)
}

fn customer_name(row: &Row) -> String {
    ["c_first", "c_middle", "c_last"]
        .iter()
        .filter_map(|c| row.get_str(c))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

use rust_decimal::Decimal;
use std::time::Instant;
use tpcc_core::{StatementBatch, Value};

use super::{ProfileOutcome, TpccService, finish, required_i64, timestamp_now};
use crate::error::{ServiceError, ServiceResult};
use crate::view_models::{NewOrderReceipt, OrderItem, OrderLineDetail};

/// TPC-C bounds for the quantity of a single order line
const QUANTITY_RANGE: std::ops::RangeInclusive<i32> = 1..=10;

const ALLOCATE_ORDER_ID: &str = "
    UPDATE district
    SET d_next_o_id = d_next_o_id + 1
    WHERE d_w_id = $1 AND d_id = $2
    RETURNING d_next_o_id - 1 AS order_id";

const SELECT_ITEM: &str = "SELECT i_price, i_name, i_data FROM item WHERE i_id = $1";

const INSERT_ORDER: &str = r#"
    INSERT INTO "order" (o_id, o_d_id, o_w_id, o_c_id, o_entry_d, o_ol_cnt, o_all_local)
    VALUES ($1, $2, $3, $4, $5, $6, $7)"#;

const INSERT_NEW_ORDER: &str =
    "INSERT INTO new_order (no_o_id, no_d_id, no_w_id) VALUES ($1, $2, $3)";

const UPDATE_STOCK: &str = "
    UPDATE stock
    SET s_quantity = CASE
            WHEN s_quantity >= $1 THEN s_quantity - $1
            ELSE s_quantity + 91 - $1
        END,
        s_ytd = s_ytd + $1,
        s_order_cnt = s_order_cnt + 1
    WHERE s_i_id = $2 AND s_w_id = $3
    RETURNING s_quantity";

const INSERT_ORDER_LINE: &str = "
    INSERT INTO order_line
        (ol_o_id, ol_d_id, ol_w_id, ol_number, ol_i_id, ol_supply_w_id, ol_quantity, ol_amount, ol_dist_info)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)";

struct PricedItem {
    item: OrderItem,
    supply_warehouse_id: i32,
    name: String,
    price: Decimal,
}

impl TpccService {
    /// Place an order.
    ///
    /// The order id is taken from the district counter before the batch runs
    /// and is not handed back if the batch fails.
    #[tracing::instrument(skip(self, items), fields(items = items.len()))]
    pub async fn new_order(
        &self,
        warehouse_id: i32,
        district_id: i32,
        customer_id: i32,
        items: &[OrderItem],
    ) -> ProfileOutcome<NewOrderReceipt> {
        let started = Instant::now();
        let result = self
            .try_new_order(warehouse_id, district_id, customer_id, items)
            .await;
        if let Ok(receipt) = &result {
            tracing::info!(
                order_id = receipt.order_id,
                total = %receipt.total_amount,
                "order placed"
            );
        }
        finish("new_order", started, result)
    }

    async fn try_new_order(
        &self,
        warehouse_id: i32,
        district_id: i32,
        customer_id: i32,
        items: &[OrderItem],
    ) -> ServiceResult<NewOrderReceipt> {
        validate_items(items)?;

        let mut priced = Vec::with_capacity(items.len());
        for item in items {
            let row = self
                .conn
                .execute(SELECT_ITEM, &[Value::Int32(item.item_id)])
                .await?
                .into_first()
                .ok_or_else(|| ServiceError::NotFound(format!("Item {}", item.item_id)))?;
            let price = row.get_decimal("i_price").ok_or_else(|| {
                ServiceError::InvalidInput(format!("item {} has no price", item.item_id))
            })?;
            priced.push(PricedItem {
                item: *item,
                supply_warehouse_id: item.supply_warehouse_id.unwrap_or(warehouse_id),
                name: row.get_str("i_name").unwrap_or_default().to_string(),
                price,
            });
        }

        let allocated = self
            .conn
            .execute(
                ALLOCATE_ORDER_ID,
                &[Value::Int32(warehouse_id), Value::Int32(district_id)],
            )
            .await?
            .into_first()
            .ok_or_else(|| {
                ServiceError::NotFound(format!("District {} of warehouse {}", district_id, warehouse_id))
            })?;
        let order_id = required_i64(&allocated, "order_id")?;

        let entry_date = timestamp_now();
        let all_local = priced.iter().all(|p| p.supply_warehouse_id == warehouse_id);

        let mut batch = StatementBatch::new()
            .push(
                INSERT_ORDER,
                vec![
                    Value::Int64(order_id),
                    Value::Int32(district_id),
                    Value::Int32(warehouse_id),
                    Value::Int32(customer_id),
                    Value::DateTime(entry_date),
                    Value::Int32(priced.len() as i32),
                    Value::Int32(i32::from(all_local)),
                ],
            )
            .push(
                INSERT_NEW_ORDER,
                vec![
                    Value::Int64(order_id),
                    Value::Int32(district_id),
                    Value::Int32(warehouse_id),
                ],
            );

        let mut order_lines = Vec::with_capacity(priced.len());
        for (index, p) in priced.iter().enumerate() {
            let line_number = index as i32 + 1;
            let amount = Decimal::from(p.item.quantity) * p.price;

            batch.add(
                UPDATE_STOCK,
                vec![
                    Value::Int32(p.item.quantity),
                    Value::Int32(p.item.item_id),
                    Value::Int32(p.supply_warehouse_id),
                ],
            );
            batch.add(
                INSERT_ORDER_LINE,
                vec![
                    Value::Int64(order_id),
                    Value::Int32(district_id),
                    Value::Int32(warehouse_id),
                    Value::Int32(line_number),
                    Value::Int32(p.item.item_id),
                    Value::Int32(p.supply_warehouse_id),
                    Value::Int32(p.item.quantity),
                    Value::Decimal(amount),
                    Value::String(format!("dist_info_{}", line_number)),
                ],
            );

            order_lines.push(OrderLineDetail {
                line_number,
                item_id: p.item.item_id,
                item_name: p.name.clone(),
                supply_warehouse_id: p.supply_warehouse_id,
                quantity: p.item.quantity,
                amount,
                stock_quantity: None,
            });
        }

        let results = self.conn.execute_batch(&batch).await?;

        // Results: order, new_order, then (stock, order_line) per line
        for (line, pair) in order_lines.iter_mut().zip(results.get(2..).unwrap_or(&[]).chunks(2)) {
            line.stock_quantity = pair[0].first().and_then(|r| r.get_i64("s_quantity"));
            if line.stock_quantity.is_none() {
                tracing::warn!(
                    item_id = line.item_id,
                    supply_warehouse_id = line.supply_warehouse_id,
                    "no stock row updated for order line"
                );
            }
        }

        Ok(NewOrderReceipt {
            order_id,
            warehouse_id,
            district_id,
            customer_id,
            total_amount: order_lines.iter().map(|l| l.amount).sum(),
            all_local,
            entry_date: tpcc_core::Scalar::from(Value::DateTime(entry_date)).to_string(),
            order_lines,
        })
    }
}

fn validate_items(items: &[OrderItem]) -> ServiceResult<()> {
    if items.is_empty() {
        return Err(ServiceError::InvalidInput(
            "an order needs at least one item".to_string(),
        ));
    }
    if let Some(item) = items.iter().find(|i| !QUANTITY_RANGE.contains(&i.quantity)) {
        return Err(ServiceError::InvalidInput(format!(
            "quantity {} for item {} is outside {}..={}",
            item.quantity,
            item.item_id,
            QUANTITY_RANGE.start(),
            QUANTITY_RANGE.end()
        )));
    }
    Ok(())
}

//! TPC-C transaction profiles against the seeded dataset
//!
//! New Order writes to the new-order warehouse (and the supplier warehouse
//! for remote lines), Payment to the payment warehouse, Delivery to the
//! delivery warehouse. Stock Level only reads the read-only warehouse.

use crate::fixtures::{Warehouse, query_decimal, query_i64, test_connection};
use crate::test_containers::{FIRST_PENDING_ORDER, ORDERS_PER_DISTRICT};
use anyhow::Result;
use pretty_assertions::assert_eq;
use rstest::rstest;
use rust_decimal::Decimal;
use std::str::FromStr;
use tpcc_core::Value;
use tpcc_services::{DistrictDelivery, OrderItem, ServiceError, SkipReason, TpccService};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).expect("decimal literal")
}

fn key(w: i32, d: i32) -> Vec<Value> {
    vec![Value::Int32(w), Value::Int32(d)]
}

// ============ New Order ============

#[rstest]
#[tokio::test]
async fn test_new_order_places_order() -> Result<()> {
    let conn = test_connection().await?;
    let w = Warehouse::NewOrder.id();
    let service = TpccService::new(conn.clone());

    let receipt = service
        .new_order(w, 1, 1, &[OrderItem::new(1, 2), OrderItem::new(2, 3)])
        .await
        .into_result()?;

    assert_eq!(receipt.order_id, (ORDERS_PER_DISTRICT + 1) as i64);
    assert!(receipt.all_local);
    // 2 x 1.50 + 3 x 2.00
    assert_eq!(receipt.total_amount, dec("9.00"));
    assert_eq!(receipt.order_lines.len(), 2);
    assert_eq!(receipt.order_lines[0].item_name, "Item 1");
    assert_eq!(receipt.order_lines[0].stock_quantity, Some(49));
    assert_eq!(receipt.order_lines[1].stock_quantity, Some(49));

    let next = query_i64(
        &conn,
        "SELECT d_next_o_id FROM district WHERE d_w_id = $1 AND d_id = $2",
        &key(w, 1),
        "d_next_o_id",
    )
    .await?;
    assert_eq!(next, (ORDERS_PER_DISTRICT + 2) as i64);

    let mut params = key(w, 1);
    params.push(Value::Int64(receipt.order_id));
    let lines = query_i64(
        &conn,
        "SELECT COUNT(*) AS count FROM order_line WHERE ol_w_id = $1 AND ol_d_id = $2 AND ol_o_id = $3",
        &params,
        "count",
    )
    .await?;
    assert_eq!(lines, 2);

    let pending = query_i64(
        &conn,
        "SELECT COUNT(*) AS count FROM new_order WHERE no_w_id = $1 AND no_d_id = $2 AND no_o_id = $3",
        &params,
        "count",
    )
    .await?;
    assert_eq!(pending, 1);

    let all_local = query_i64(
        &conn,
        r#"SELECT o_all_local FROM "order" WHERE o_w_id = $1 AND o_d_id = $2 AND o_id = $3"#,
        &params,
        "o_all_local",
    )
    .await?;
    assert_eq!(all_local, 1);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_new_order_remote_supplier() -> Result<()> {
    let conn = test_connection().await?;
    let w = Warehouse::NewOrder.id();
    let supplier = Warehouse::Supplier.id();

    let receipt = TpccService::new(conn.clone())
        .new_order(w, 2, 2, &[OrderItem::new(5, 1).supplied_by(supplier)])
        .await
        .into_result()?;

    assert!(!receipt.all_local);
    assert_eq!(receipt.order_lines[0].supply_warehouse_id, supplier);

    let quantity = query_i64(
        &conn,
        "SELECT s_quantity FROM stock WHERE s_w_id = $1 AND s_i_id = $2",
        &[Value::Int32(supplier), Value::Int32(5)],
        "s_quantity",
    )
    .await?;
    assert_eq!(quantity, 54);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_new_order_restocks_short_item() -> Result<()> {
    let conn = test_connection().await?;
    let w = Warehouse::NewOrder.id();

    // Item 10 starts with 5 units: 5 + 91 - 7
    let receipt = TpccService::new(conn)
        .new_order(w, 4, 4, &[OrderItem::new(10, 7)])
        .await
        .into_result()?;
    assert_eq!(receipt.order_lines[0].stock_quantity, Some(89));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_new_order_unknown_item_keeps_counter() -> Result<()> {
    let conn = test_connection().await?;
    let w = Warehouse::NewOrder.id();

    let outcome = TpccService::new(conn.clone())
        .new_order(w, 3, 3, &[OrderItem::new(1, 1), OrderItem::new(999_999, 1)])
        .await;

    let err = outcome.error().expect("unknown item fails");
    assert!(err.is_not_found(), "{:?}", err);

    let next = query_i64(
        &conn,
        "SELECT d_next_o_id FROM district WHERE d_w_id = $1 AND d_id = $2",
        &key(w, 3),
        "d_next_o_id",
    )
    .await?;
    assert_eq!(next, (ORDERS_PER_DISTRICT + 1) as i64);
    Ok(())
}

#[rstest]
#[case::zero(0)]
#[case::above_limit(11)]
#[tokio::test]
async fn test_new_order_rejects_quantity(#[case] quantity: i32) -> Result<()> {
    let conn = test_connection().await?;
    let outcome = TpccService::new(conn)
        .new_order(Warehouse::NewOrder.id(), 5, 5, &[OrderItem::new(1, quantity)])
        .await;
    assert!(matches!(outcome.error(), Some(ServiceError::InvalidInput(_))));
    Ok(())
}

// ============ Payment ============

#[rstest]
#[tokio::test]
async fn test_payment_updates_balances_and_history() -> Result<()> {
    let conn = test_connection().await?;
    let w = Warehouse::Payment.id();
    let w_ytd_before = query_decimal(
        &conn,
        "SELECT w_ytd FROM warehouse WHERE w_id = $1",
        &[Value::Int32(w)],
        "w_ytd",
    )
    .await?;

    let receipt = TpccService::new(conn.clone())
        .payment(w, 1, 1, dec("25.00"))
        .await
        .into_result()?;

    assert_eq!(receipt.customer_balance, Some(dec("-35.00")));
    assert_eq!(receipt.customer_name.as_deref(), Some("First1 OE Last1"));
    assert_eq!(receipt.customer_credit.as_deref(), Some("GC"));
    assert_eq!(receipt.warehouse_name.as_deref(), Some("W2"));
    assert_eq!(receipt.district_name.as_deref(), Some("D1"));

    let w_ytd_after = query_decimal(
        &conn,
        "SELECT w_ytd FROM warehouse WHERE w_id = $1",
        &[Value::Int32(w)],
        "w_ytd",
    )
    .await?;
    assert_eq!(w_ytd_after - w_ytd_before, dec("25.00"));

    let customer = conn
        .execute(
            "SELECT c_ytd_payment, c_payment_cnt FROM customer WHERE c_w_id = $1 AND c_d_id = $2 AND c_id = $3",
            &[Value::Int32(w), Value::Int32(1), Value::Int32(1)],
        )
        .await?;
    let row = customer.first().expect("customer row");
    assert_eq!(row.get_decimal("c_ytd_payment"), Some(dec("35.00")));
    assert_eq!(row.get_i64("c_payment_cnt"), Some(2));

    let history = query_i64(
        &conn,
        "SELECT COUNT(*) AS count FROM history WHERE h_w_id = $1 AND h_data = $2",
        &[Value::Int32(w), Value::String("Payment W:2 D:1 C:1".to_string())],
        "count",
    )
    .await?;
    assert_eq!(history, 1);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_payment_rejects_non_positive_amount() -> Result<()> {
    let conn = test_connection().await?;
    let outcome = TpccService::new(conn)
        .payment(Warehouse::Payment.id(), 2, 2, Decimal::ZERO)
        .await;
    assert!(matches!(outcome.error(), Some(ServiceError::InvalidInput(_))));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_payment_unknown_customer_changes_nothing() -> Result<()> {
    let conn = test_connection().await?;
    let w = Warehouse::Payment.id();
    let d_ytd = "SELECT d_ytd FROM district WHERE d_w_id = $1 AND d_id = $2";
    let before = query_decimal(&conn, d_ytd, &key(w, 3), "d_ytd").await?;

    let outcome = TpccService::new(conn.clone())
        .payment(w, 3, 9_999, dec("12.00"))
        .await;
    assert!(outcome.error().is_some_and(ServiceError::is_not_found));

    assert_eq!(query_decimal(&conn, d_ytd, &key(w, 3), "d_ytd").await?, before);
    let history = query_i64(
        &conn,
        "SELECT COUNT(*) AS count FROM history WHERE h_w_id = $1 AND h_c_id = 9999",
        &[Value::Int32(w)],
        "count",
    )
    .await?;
    assert_eq!(history, 0);
    Ok(())
}

// ============ Delivery ============

#[rstest]
#[tokio::test]
async fn test_delivery_round() -> Result<()> {
    let conn = test_connection().await?;
    let w = Warehouse::Delivery.id();

    // Drain district 10 so it has nothing to deliver
    conn.execute(
        "DELETE FROM new_order WHERE no_w_id = $1 AND no_d_id = 10",
        &[Value::Int32(w)],
    )
    .await?;

    let service = TpccService::new(conn.clone());
    let report = service.delivery(w, 7).await.into_result()?;

    assert_eq!(report.districts.len(), 10);
    assert_eq!(report.orders_delivered(), 9);
    assert_eq!(
        report.skipped().collect::<Vec<_>>(),
        vec![(10, &SkipReason::NoPendingOrder)]
    );

    let first = FIRST_PENDING_ORDER as i64;
    for order in report.delivered() {
        assert_eq!(order.order_id, first);
        assert_eq!(order.customer_id, Some(first));
        // 5 lines of 10.00
        assert_eq!(order.total_amount, dec("50.00"));
    }

    let customer = conn
        .execute(
            "SELECT c_balance, c_delivery_cnt FROM customer WHERE c_w_id = $1 AND c_d_id = 1 AND c_id = $2",
            &[Value::Int32(w), Value::Int32(FIRST_PENDING_ORDER)],
        )
        .await?;
    let row = customer.first().expect("customer row");
    assert_eq!(row.get_decimal("c_balance"), Some(dec("40.00")));
    assert_eq!(row.get_i64("c_delivery_cnt"), Some(1));

    let carrier = query_i64(
        &conn,
        r#"SELECT o_carrier_id FROM "order" WHERE o_w_id = $1 AND o_d_id = 1 AND o_id = $2"#,
        &[Value::Int32(w), Value::Int32(FIRST_PENDING_ORDER)],
        "o_carrier_id",
    )
    .await?;
    assert_eq!(carrier, 7);

    let undelivered_lines = query_i64(
        &conn,
        "SELECT COUNT(*) AS count FROM order_line WHERE ol_w_id = $1 AND ol_d_id = 1 AND ol_o_id = $2 AND ol_delivery_d IS NULL",
        &[Value::Int32(w), Value::Int32(FIRST_PENDING_ORDER)],
        "count",
    )
    .await?;
    assert_eq!(undelivered_lines, 0);

    // The next round picks up the following order
    let second = service.delivery(w, 8).await.into_result()?;
    match &second.districts[0] {
        DistrictDelivery::Delivered(order) => assert_eq!(order.order_id, first + 1),
        other => panic!("expected a delivery, got {:?}", other),
    }
    Ok(())
}

// ============ Stock Level ============

#[rstest]
#[case::below_restocked_items(10, 10)]
#[case::includes_lower_band(60, 28)]
#[case::nothing_below(1, 0)]
#[tokio::test]
async fn test_stock_level_counts(#[case] threshold: i32, #[case] expected: i64) -> Result<()> {
    let conn = test_connection().await?;
    let report = TpccService::new(conn)
        .stock_level(Warehouse::ReadOnly.id(), 1, threshold)
        .await
        .into_result()?;

    assert_eq!(report.low_stock_count, expected);
    assert_eq!(report.threshold, threshold);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_stock_level_counts_repeated_item_once() -> Result<()> {
    let conn = test_connection().await?;
    let w = Warehouse::ReadOnly.id();
    let latest = ORDERS_PER_DISTRICT;

    // A second line for item 10 (5 units in stock) on the district's latest order
    conn.execute(
        "INSERT INTO order_line (ol_o_id, ol_d_id, ol_w_id, ol_number, ol_i_id, ol_supply_w_id,
                                 ol_quantity, ol_amount, ol_dist_info)
         VALUES ($1, 2, $2, 6, 10, $2, 1, 1.50, 'dist_info')
         ON CONFLICT DO NOTHING",
        &[Value::Int32(latest), Value::Int32(w)],
    )
    .await?;

    let lines = query_i64(
        &conn,
        "SELECT COUNT(*) AS count
         FROM order_line ol JOIN stock s ON s.s_i_id = ol.ol_i_id AND s.s_w_id = ol.ol_supply_w_id
         WHERE ol.ol_w_id = $1 AND ol.ol_d_id = 2 AND ol.ol_o_id >= $2 AND s.s_quantity < 10",
        &[Value::Int32(w), Value::Int32(latest - 19)],
        "count",
    )
    .await?;
    assert_eq!(lines, 11, "item 10 appears on two recent lines");

    let report = TpccService::new(conn)
        .stock_level(w, 2, 10)
        .await
        .into_result()?;
    assert_eq!(report.low_stock_count, 10);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_stock_level_unknown_district() -> Result<()> {
    let conn = test_connection().await?;
    let outcome = TpccService::new(conn)
        .stock_level(Warehouse::ReadOnly.id(), 99, 10)
        .await;
    assert!(outcome.error().is_some_and(ServiceError::is_not_found));
    Ok(())
}

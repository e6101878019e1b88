//! Transaction Tests
//!
//! Atomic batches, explicit transactions and autocommit handling. All writes
//! touch district rows of the batch warehouse only.

use crate::fixtures::{Warehouse, query_decimal, test_connection};
use anyhow::Result;
use pretty_assertions::assert_eq;
use rstest::rstest;
use rust_decimal::Decimal;
use std::sync::Arc;
use tpcc_core::{Connection, StatementBatch, Value};

const DISTRICT_YTD: &str = "SELECT d_ytd FROM district WHERE d_w_id = $1 AND d_id = $2";
const BUMP_YTD: &str = "UPDATE district SET d_ytd = d_ytd + $1 WHERE d_w_id = $2 AND d_id = $3";

async fn district_ytd(conn: &Arc<dyn Connection>, district: i32) -> Result<Decimal> {
    query_decimal(
        conn,
        DISTRICT_YTD,
        &[Value::Int32(Warehouse::Batch.id()), Value::Int32(district)],
        "d_ytd",
    )
    .await
}

fn bump(district: i32, amount: i64) -> (String, Vec<Value>) {
    (
        BUMP_YTD.to_string(),
        vec![
            Value::Int64(amount),
            Value::Int32(Warehouse::Batch.id()),
            Value::Int32(district),
        ],
    )
}

#[rstest]
#[tokio::test]
async fn test_batch_commits_every_statement() -> Result<()> {
    let conn = test_connection().await?;
    let before = (district_ytd(&conn, 1).await?, district_ytd(&conn, 2).await?);

    let (sql1, params1) = bump(1, 5);
    let (sql2, params2) = bump(2, 7);
    let batch = StatementBatch::new()
        .push(sql1, params1)
        .push(sql2, params2)
        .push(
            "SELECT d_next_o_id FROM district WHERE d_w_id = $1 AND d_id = 1",
            vec![Value::Int32(Warehouse::Batch.id())],
        );

    let results = conn.execute_batch(&batch).await?;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].affected_rows, 1);
    assert!(results[2].has_rows());
    assert!(conn.autocommit());

    // Visible from another session once committed
    let other = test_connection().await?;
    assert_eq!(district_ytd(&other, 1).await?, before.0 + Decimal::from(5));
    assert_eq!(district_ytd(&other, 2).await?, before.1 + Decimal::from(7));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_failing_batch_leaves_no_writes() -> Result<()> {
    let conn = test_connection().await?;
    let before = district_ytd(&conn, 3).await?;

    let (sql, params) = bump(3, 100);
    let batch = StatementBatch::new().push(sql, params).push(
        // Duplicate primary key
        "INSERT INTO district (d_id, d_w_id) VALUES ($1, $2)",
        vec![Value::Int32(3), Value::Int32(Warehouse::Batch.id())],
    );

    let err = conn.execute_batch(&batch).await.unwrap_err();
    assert!(err.statement().is_some_and(|s| s.starts_with("INSERT INTO district")));

    assert_eq!(district_ytd(&conn, 3).await?, before);
    assert!(conn.autocommit(), "autocommit restored after failure");
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_batch_restores_manual_mode() -> Result<()> {
    let conn = test_connection().await?;
    conn.set_autocommit(false).await?;

    let (sql, params) = bump(4, 1);
    conn.execute_batch(&StatementBatch::new().push(sql, params))
        .await?;
    assert!(!conn.autocommit());

    conn.set_autocommit(true).await?;
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_empty_batch_does_nothing() -> Result<()> {
    let conn = test_connection().await?;
    let results = conn.execute_batch(&StatementBatch::new()).await?;
    assert!(results.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_manual_mode_rollback_discards() -> Result<()> {
    let conn = test_connection().await?;
    let before = district_ytd(&conn, 5).await?;

    conn.set_autocommit(false).await?;
    let (sql, params) = bump(5, 50);
    conn.execute(&sql, &params).await?;
    assert_eq!(district_ytd(&conn, 5).await?, before + Decimal::from(50));

    // Autocommit cannot be switched back on with the implicit transaction open
    assert!(conn.set_autocommit(true).await.is_err());

    conn.rollback().await?;
    conn.set_autocommit(true).await?;
    assert_eq!(district_ytd(&conn, 5).await?, before);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_manual_mode_commit_persists() -> Result<()> {
    let conn = test_connection().await?;
    let before = district_ytd(&conn, 6).await?;

    conn.set_autocommit(false).await?;
    let (sql, params) = bump(6, 3);
    conn.execute(&sql, &params).await?;
    conn.commit().await?;
    conn.set_autocommit(true).await?;

    let other = test_connection().await?;
    assert_eq!(district_ytd(&other, 6).await?, before + Decimal::from(3));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_explicit_transaction_rollback() -> Result<()> {
    let conn = test_connection().await?;
    let before = district_ytd(&conn, 7).await?;

    let tx = conn.begin_transaction().await?;
    let (sql, params) = bump(7, 9);
    tx.execute(&sql, &params).await?;
    tx.rollback().await?;

    assert_eq!(district_ytd(&conn, 7).await?, before);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_close_discards_open_work() -> Result<()> {
    let conn = test_connection().await?;
    let before = district_ytd(&conn, 8).await?;

    conn.set_autocommit(false).await?;
    let (sql, params) = bump(8, 11);
    conn.execute(&sql, &params).await?;
    conn.close().await?;

    let other = test_connection().await?;
    assert_eq!(district_ytd(&other, 8).await?, before);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_batch_refused_inside_implicit_transaction() -> Result<()> {
    let conn = test_connection().await?;
    let before = district_ytd(&conn, 9).await?;

    conn.set_autocommit(false).await?;
    let (sql, params) = bump(9, 2);
    conn.execute(&sql, &params).await?;

    let (sql, params) = bump(9, 40);
    let err = conn
        .execute_batch(&StatementBatch::new().push(sql, params))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("implicit transaction"), "{}", err);
    assert!(!conn.autocommit());

    // The implicit transaction is still open and still holds only the first bump
    assert_eq!(district_ytd(&conn, 9).await?, before + Decimal::from(2));
    conn.commit().await?;
    conn.set_autocommit(true).await?;
    Ok(())
}

//! Terminal rendering of service results

use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use serde::Serialize;
use tpcc_core::Row;
use tpcc_services::{
    AcidReport, DashboardSnapshot, DeliveryReport, DistrictDelivery, NewOrderReceipt,
    PaymentReceipt, SchemaReport, StockLevelReport,
};

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(T::to_string).unwrap_or_else(|| "-".to_string())
}

/// Two-column field/value table
pub fn fields(pairs: Vec<(&str, String)>) -> Table {
    let mut t = table();
    t.set_header(vec!["Field", "Value"]);
    for (field, value) in pairs {
        t.add_row(vec![field.to_string(), value]);
    }
    t
}

/// Rows rendered with an explicit column order; missing cells show as `-`
pub fn rows(columns: &[&str], rows: &[Row]) -> Table {
    let mut t = table();
    t.set_header(columns.to_vec());
    for row in rows {
        t.add_row(
            columns
                .iter()
                .map(|c| row.get(c).map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()))
                .collect::<Vec<_>>(),
        );
    }
    t
}

pub fn new_order(receipt: &NewOrderReceipt) -> String {
    let summary = fields(vec![
        ("Order", receipt.order_id.to_string()),
        ("Warehouse", receipt.warehouse_id.to_string()),
        ("District", receipt.district_id.to_string()),
        ("Customer", receipt.customer_id.to_string()),
        ("Entry date", receipt.entry_date.clone()),
        ("All local", receipt.all_local.to_string()),
        ("Total", receipt.total_amount.to_string()),
    ]);

    let mut lines = table();
    lines.set_header(vec!["#", "Item", "Name", "Supply W", "Qty", "Amount", "Stock"]);
    for line in &receipt.order_lines {
        lines.add_row(vec![
            line.line_number.to_string(),
            line.item_id.to_string(),
            line.item_name.clone(),
            line.supply_warehouse_id.to_string(),
            line.quantity.to_string(),
            line.amount.to_string(),
            opt(&line.stock_quantity),
        ]);
    }
    format!("{summary}\n{lines}")
}

pub fn payment(receipt: &PaymentReceipt) -> String {
    fields(vec![
        ("Warehouse", format!("{} ({})", receipt.warehouse_id, opt(&receipt.warehouse_name))),
        ("District", format!("{} ({})", receipt.district_id, opt(&receipt.district_name))),
        ("Customer", format!("{} ({})", receipt.customer_id, opt(&receipt.customer_name))),
        ("Credit", opt(&receipt.customer_credit)),
        ("Amount", receipt.amount.to_string()),
        ("Balance", opt(&receipt.customer_balance)),
        ("Date", receipt.payment_date.clone()),
    ])
    .to_string()
}

pub fn delivery(report: &DeliveryReport) -> String {
    let mut t = table();
    t.set_header(vec!["District", "Outcome", "Order", "Customer", "Amount"]);
    for district in &report.districts {
        match district {
            DistrictDelivery::Delivered(order) => t.add_row(vec![
                order.district_id.to_string(),
                "delivered".to_string(),
                order.order_id.to_string(),
                opt(&order.customer_id),
                order.total_amount.to_string(),
            ]),
            DistrictDelivery::Skipped { district_id, reason } => t.add_row(vec![
                district_id.to_string(),
                format!("skipped: {}", reason),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
            ]),
        };
    }
    format!(
        "Warehouse {} carrier {} at {}: {} orders delivered\n{}",
        report.warehouse_id,
        report.carrier_id,
        report.delivery_date,
        report.orders_delivered(),
        t
    )
}

pub fn stock_level(report: &StockLevelReport) -> String {
    fields(vec![
        ("Warehouse", report.warehouse_id.to_string()),
        ("District", report.district_id.to_string()),
        ("Threshold", report.threshold.to_string()),
        ("Low stock items", report.low_stock_count.to_string()),
    ])
    .to_string()
}

pub fn dashboard(snapshot: &DashboardSnapshot) -> String {
    let m = &snapshot.metrics;
    let mut out = fields(vec![
        ("Provider", snapshot.provider.clone()),
        ("Warehouses", m.total_warehouses.to_string()),
        ("Customers", m.total_customers.to_string()),
        ("Orders", m.total_orders.to_string()),
        ("Items", m.total_items.to_string()),
        ("Pending new orders", m.new_orders.to_string()),
        ("Low stock items", m.low_stock_items.to_string()),
    ])
    .to_string();
    if let Some(error) = &snapshot.error {
        out.push_str(&format!("\nerror: {}", error));
    }
    out
}

pub fn schema(report: &SchemaReport) -> String {
    let mut counts = table();
    counts.set_header(vec!["Table", "Rows"]);
    for count in &report.row_counts {
        counts.add_row(vec![
            count.table.clone(),
            match &count.count {
                Ok(n) => n.to_string(),
                Err(e) => format!("error: {}", e),
            },
        ]);
    }

    let mut columns = table();
    columns.set_header(vec!["Item column", "Type"]);
    for column in &report.item_columns {
        columns.add_row(vec![column.name.clone(), column.data_type.clone()]);
    }

    format!(
        "Public tables: {}\n{}\n{}",
        if report.tables.is_empty() {
            "none".to_string()
        } else {
            report.tables.join(", ")
        },
        counts,
        columns
    )
}

pub fn acid(report: &AcidReport) -> String {
    let mut t = table();
    t.set_header(vec!["Test", "Status", "Duration (ms)", "Checks", "Error"]);
    for test in &report.tests {
        let checks = test
            .checks
            .iter()
            .map(|c| format!("{} {}", if c.passed { "ok" } else { "FAIL" }, c.name))
            .collect::<Vec<_>>()
            .join("\n");
        t.add_row(vec![
            test.property.to_string(),
            format!("{:?}", test.status).to_uppercase(),
            test.duration_ms.to_string(),
            checks,
            test.error.clone().unwrap_or_default(),
        ]);
    }
    let s = &report.summary;
    format!(
        "{} (session {})\n{}\n{}/{} passed ({:.1}%) in {} ms",
        report.provider, report.session_id, t, s.passed_tests, s.total_tests, s.success_rate, s.duration_ms
    )
}

pub fn json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

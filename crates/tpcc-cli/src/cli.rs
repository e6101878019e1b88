//! `tpcc` - run TPC-C transaction profiles and ACID probes from the shell

mod logging;
mod output;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use std::sync::Arc;
use tpcc_core::{
    CONNECT_TIMEOUT_VAR, CONNECTION_STRING_VAR, Connection, ConnectionConfig, PROVIDER_VAR,
};
use tpcc_drivers::DriverRegistry;
use tpcc_services::{
    AcidProperty, AcidSuite, AnalyticsService, OrderItem, ProfileOutcome, SchemaCheck, TpccService,
};

use logging::{LogFormat, LoggingConfig};

#[derive(Debug, Parser)]
#[command(name = "tpcc", version, about = "TPC-C transactions against CockroachDB")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    /// Debug level logging for the tpcc crates
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct ConnectionArgs {
    /// Backend family: cockroach | cockroachdb
    #[arg(long, env = PROVIDER_VAR, global = true)]
    provider: Option<String>,

    /// libpq URL or key/value connection string
    #[arg(long, env = CONNECTION_STRING_VAR, global = true, hide_env_values = true)]
    connection_string: Option<String>,

    /// Seconds to wait for the server before giving up
    #[arg(long, env = CONNECT_TIMEOUT_VAR, global = true)]
    connect_timeout: Option<String>,
}

impl ConnectionArgs {
    fn config(&self) -> tpcc_core::Result<ConnectionConfig> {
        ConnectionConfig::from_lookup(|key| match key {
            PROVIDER_VAR => self.provider.clone(),
            CONNECTION_STRING_VAR => self.connection_string.clone(),
            CONNECT_TIMEOUT_VAR => self.connect_timeout.clone(),
            _ => None,
        })
        .map(|config| config.with_application_name("tpcc"))
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the sentinel query and report latency
    TestConnection,
    /// List tables and count rows of the TPC-C schema
    SchemaCheck,
    /// Show table counts, recent orders and low stock
    Dashboard {
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Place an order
    NewOrder {
        #[command(flatten)]
        district: DistrictArgs,
        #[arg(short, long)]
        customer: i32,
        /// ITEM:QTY or ITEM:QTY@SUPPLY_WAREHOUSE, repeatable
        #[arg(short, long = "item", value_parser = parse_item, required = true)]
        items: Vec<OrderItem>,
    },
    /// Record a customer payment
    Payment {
        #[command(flatten)]
        district: DistrictArgs,
        #[arg(short, long)]
        customer: i32,
        #[arg(short, long)]
        amount: Decimal,
    },
    /// Deliver the oldest pending order of every district
    Delivery {
        #[arg(short, long)]
        warehouse: i32,
        #[arg(long)]
        carrier: i32,
    },
    /// Count recently ordered items below a stock threshold
    StockLevel {
        #[command(flatten)]
        district: DistrictArgs,
        #[arg(short, long)]
        threshold: i32,
    },
    /// Probe atomicity, consistency, isolation and durability
    Acid {
        #[arg(long, value_enum, default_value_t = AcidSelection::All)]
        test: AcidSelection,
    },
}

#[derive(Debug, Args)]
struct DistrictArgs {
    #[arg(short, long)]
    warehouse: i32,
    #[arg(short, long)]
    district: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AcidSelection {
    All,
    Atomicity,
    Consistency,
    Isolation,
    Durability,
}

impl AcidSelection {
    fn property(self) -> Option<AcidProperty> {
        match self {
            AcidSelection::All => None,
            AcidSelection::Atomicity => Some(AcidProperty::Atomicity),
            AcidSelection::Consistency => Some(AcidProperty::Consistency),
            AcidSelection::Isolation => Some(AcidProperty::Isolation),
            AcidSelection::Durability => Some(AcidProperty::Durability),
        }
    }
}

fn parse_item(s: &str) -> Result<OrderItem, String> {
    let (item, rest) = s
        .split_once(':')
        .ok_or_else(|| format!("expected ITEM:QTY, got '{}'", s))?;
    let (quantity, supply) = match rest.split_once('@') {
        Some((quantity, supply)) => (quantity, Some(supply)),
        None => (rest, None),
    };

    let parse = |what: &str, v: &str| {
        v.trim()
            .parse::<i32>()
            .map_err(|e| format!("invalid {} '{}': {}", what, v, e))
    };

    let mut order_item = OrderItem::new(parse("item id", item)?, parse("quantity", quantity)?);
    if let Some(supply) = supply {
        order_item = order_item.supplied_by(parse("supply warehouse", supply)?);
    }
    Ok(order_item)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(
        LoggingConfig {
            format: cli.log_format,
            ..LoggingConfig::default()
        }
        .verbose(cli.verbose),
    )?;

    let config = cli.connection.config()?;
    tracing::info!(
        provider = %config.provider,
        target = %config.masked_connection_string(),
        "configuration loaded"
    );

    let driver = DriverRegistry::with_defaults().driver_for(config.provider)?;

    if let Command::Acid { test } = &cli.command {
        let suite = AcidSuite::new(driver, config);
        let report = match test.property() {
            None => suite.run_all().await,
            Some(property) => suite.run_selected(&[property]).await,
        };
        print(cli.json, &report, output::acid)?;
        if report.summary.failed_tests > 0 {
            bail!("{} ACID test(s) failed", report.summary.failed_tests);
        }
        return Ok(());
    }

    let conn = driver
        .connect(&config)
        .await
        .context("failed to connect")?;
    let result = run(&cli, conn.clone()).await;
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "failed to close connection");
    }
    result
}

async fn run(cli: &Cli, conn: Arc<dyn Connection>) -> anyhow::Result<()> {
    let profiles = TpccService::new(conn.clone());

    match &cli.command {
        Command::TestConnection => {
            let status = AnalyticsService::new(conn).test_connection().await;
            print(cli.json, &status, |s| {
                output::fields(vec![
                    ("Provider", s.provider.clone()),
                    ("Success", s.success.to_string()),
                    ("Message", s.message.clone().unwrap_or_default()),
                ])
                .to_string()
            })?;
            if !status.success {
                bail!("connection test failed");
            }
        }
        Command::SchemaCheck => {
            let report = SchemaCheck::new(conn).run().await?;
            print(cli.json, &report, output::schema)?;
        }
        Command::Dashboard { limit } => {
            let analytics = AnalyticsService::new(conn);
            let snapshot = analytics.dashboard_metrics().await;
            print(cli.json, &snapshot, output::dashboard)?;
            if !cli.json && snapshot.is_success() {
                let orders = analytics.recent_orders(*limit).await?;
                println!(
                    "Recent orders\n{}",
                    output::rows(
                        &["o_id", "o_w_id", "o_d_id", "o_c_id", "o_entry_d", "o_ol_cnt"],
                        &orders
                    )
                );
                let stock = analytics.low_stock_inventory(*limit).await?;
                println!(
                    "Low stock\n{}",
                    output::rows(&["s_i_id", "i_name", "s_w_id", "s_quantity", "i_price"], &stock)
                );
            }
        }
        Command::NewOrder {
            district,
            customer,
            items,
        } => {
            let outcome = profiles
                .new_order(district.warehouse, district.district, *customer, items)
                .await;
            report(cli.json, outcome, output::new_order)?;
        }
        Command::Payment {
            district,
            customer,
            amount,
        } => {
            let outcome = profiles
                .payment(district.warehouse, district.district, *customer, *amount)
                .await;
            report(cli.json, outcome, output::payment)?;
        }
        Command::Delivery { warehouse, carrier } => {
            let outcome = profiles.delivery(*warehouse, *carrier).await;
            report(cli.json, outcome, output::delivery)?;
        }
        Command::StockLevel {
            district,
            threshold,
        } => {
            let outcome = profiles
                .stock_level(district.warehouse, district.district, *threshold)
                .await;
            report(cli.json, outcome, output::stock_level)?;
        }
        Command::Acid { .. } => unreachable!("handled before connecting"),
    }
    Ok(())
}

fn print<T: serde::Serialize>(
    json: bool,
    value: &T,
    render: impl Fn(&T) -> String,
) -> anyhow::Result<()> {
    if json {
        println!("{}", output::json(value)?);
    } else {
        println!("{}", render(value));
    }
    Ok(())
}

fn report<T: serde::Serialize>(
    json: bool,
    outcome: ProfileOutcome<T>,
    render: impl Fn(&T) -> String,
) -> anyhow::Result<()> {
    let value = outcome.into_result()?;
    print(json, &value, render)
}

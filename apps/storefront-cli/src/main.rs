//! # Storefront CLI
//!
//! Operator tool for the coupon store and order placement.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        storefront (binary)                              │
//! │                                                                         │
//! │  RUST_LOG ──► tracing-subscriber (stderr)                              │
//! │  STOREFRONT_* ──► StorefrontConfig ──► DbConfig / PricingConfig        │
//! │                                                                         │
//! │  argv ──► clap ──► commands::run ──► storefront-db ──► SQLite          │
//! │                          │                                              │
//! │                          └──► storefront-core (pricing, coupons)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Examples
//! ```text
//! storefront seed
//! storefront price 49.99
//! storefront validate save20 150
//! storefront checkout --item "Linen Shirt:79.00:2" --coupon SAVE20
//! ```

mod commands;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use storefront_db::migrations::migration_status;
use storefront_db::Database;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::StorefrontConfig;

#[derive(Debug, Parser)]
#[command(name = "storefront", about = "Storefront pricing and coupon CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = StorefrontConfig::load()?;
    info!(
        path = %config.database_path.display(),
        tax_bps = config.pricing.tax_rate.bps(),
        free_shipping_over = %config.pricing.free_shipping_threshold,
        "Configuration loaded"
    );

    let db = Database::new(config.db_config())
        .await
        .context("failed to open database")?;

    let (total, applied) = migration_status(db.pool()).await?;
    debug!(total, applied, "Migration status");

    let result = commands::run(cli.command, &db, &config.pricing).await;

    db.close().await;
    result
}

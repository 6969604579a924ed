//! Storefront configuration module.
//!
//! Configuration is loaded from environment variables with fallback to defaults.
//!
//! | Variable                             | Default           |
//! |--------------------------------------|-------------------|
//! | `STOREFRONT_DATABASE_PATH`           | `./storefront.db` |
//! | `STOREFRONT_FREE_SHIPPING_THRESHOLD` | `100`             |
//! | `STOREFRONT_SHIPPING_PRICE`          | `10`              |
//! | `STOREFRONT_TAX_RATE_BPS`            | `1000`            |
//! | `STOREFRONT_DB_MAX_CONNECTIONS`      | `5`               |

use std::env;
use std::path::PathBuf;

use storefront_core::validation::{validate_price, validate_tax_rate_bps};
use storefront_core::{Money, PricingConfig, TaxRate};
use storefront_db::DbConfig;

const DATABASE_PATH: &str = "STOREFRONT_DATABASE_PATH";
const FREE_SHIPPING_THRESHOLD: &str = "STOREFRONT_FREE_SHIPPING_THRESHOLD";
const SHIPPING_PRICE: &str = "STOREFRONT_SHIPPING_PRICE";
const TAX_RATE_BPS: &str = "STOREFRONT_TAX_RATE_BPS";
const DB_MAX_CONNECTIONS: &str = "STOREFRONT_DB_MAX_CONNECTIONS";

/// Storefront configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StorefrontConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Shipping threshold, flat shipping and tax rate
    pub pricing: PricingConfig,

    /// Pool size for the SQLite connection pool
    pub db_max_connections: u32,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value
    /// or `None` when unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = PricingConfig::default();

        let database_path = lookup(DATABASE_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./storefront.db"));

        let free_shipping_threshold = match lookup(FREE_SHIPPING_THRESHOLD) {
            Some(raw) => parse_money(FREE_SHIPPING_THRESHOLD, &raw)?,
            None => defaults.free_shipping_threshold,
        };

        let shipping_price = match lookup(SHIPPING_PRICE) {
            Some(raw) => parse_money(SHIPPING_PRICE, &raw)?,
            None => defaults.shipping_price,
        };

        let tax_rate = match lookup(TAX_RATE_BPS) {
            Some(raw) => {
                let bps: u32 = raw
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(TAX_RATE_BPS.to_string()))?;
                validate_tax_rate_bps(bps)
                    .map_err(|_| ConfigError::InvalidValue(TAX_RATE_BPS.to_string()))?;
                TaxRate::from_bps(bps)
            }
            None => defaults.tax_rate,
        };

        let db_max_connections: u32 = lookup(DB_MAX_CONNECTIONS)
            .unwrap_or_else(|| "5".to_string())
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(DB_MAX_CONNECTIONS.to_string()))?;

        if db_max_connections == 0 {
            return Err(ConfigError::InvalidValue(DB_MAX_CONNECTIONS.to_string()));
        }

        Ok(StorefrontConfig {
            database_path,
            pricing: PricingConfig::new(free_shipping_threshold, shipping_price, tax_rate),
            db_max_connections,
        })
    }

    /// Pool configuration for this database.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database_path).max_connections(self.db_max_connections)
    }
}

fn parse_money(name: &str, raw: &str) -> Result<Money, ConfigError> {
    let amount: Money = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))?;
    validate_price(amount).map_err(|_| ConfigError::InvalidValue(name.to_string()))?;
    Ok(amount)
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}

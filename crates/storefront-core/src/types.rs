//! # Domain Types
//!
//! Tax rate, the process-wide pricing configuration, and placed orders.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         PricingConfig                                   │
//! │                                                                         │
//! │  free_shipping_threshold   Money    subtotal must EXCEED this           │
//! │  shipping_price            Money    flat charge otherwise               │
//! │  tax_rate                  TaxRate  basis points on the subtotal        │
//! │                                                                         │
//! │  Loaded once at startup, never mutated afterwards.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Also holds the order snapshot types written by storefront-db.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1000 bps = 10%, 825 bps = 8.25%
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        f64::from(self.0) / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Pricing Configuration
// =============================================================================

/// Default free-shipping threshold: $100.00.
pub const DEFAULT_FREE_SHIPPING_THRESHOLD: Money = Money::from_cents(10_000);

/// Default flat shipping charge: $10.00.
pub const DEFAULT_SHIPPING_PRICE: Money = Money::from_cents(1_000);

/// Default tax rate: 10%.
pub const DEFAULT_TAX_RATE: TaxRate = TaxRate::from_bps(1_000);

/// Constants that drive cart pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PricingConfig {
    /// Subtotals strictly above this ship for free.
    pub free_shipping_threshold: Money,

    /// Flat shipping charge for everything else.
    pub shipping_price: Money,

    /// Tax applied to the items subtotal.
    pub tax_rate: TaxRate,
}

impl PricingConfig {
    pub const fn new(
        free_shipping_threshold: Money,
        shipping_price: Money,
        tax_rate: TaxRate,
    ) -> Self {
        PricingConfig {
            free_shipping_threshold,
            shipping_price,
            tax_rate,
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        PricingConfig::new(
            DEFAULT_FREE_SHIPPING_THRESHOLD,
            DEFAULT_SHIPPING_PRICE,
            DEFAULT_TAX_RATE,
        )
    }
}

// =============================================================================
// Order
// =============================================================================

/// A placed order.
/// Uses the snapshot pattern: the breakdown is frozen at placement time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    /// Human-readable number shown in order history.
    pub order_number: String,
    pub items_price_cents: i64,
    pub shipping_price_cents: i64,
    pub tax_price_cents: i64,
    pub discount_cents: i64,
    pub total_price_cents: i64,
    /// Code of the coupon redeemed by this order.
    pub coupon_code: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn items_price(&self) -> Money {
        Money::from_cents(self.items_price_cents)
    }

    #[inline]
    pub fn discount(&self) -> Money {
        Money::from_cents(self.discount_cents)
    }

    #[inline]
    pub fn total_price(&self) -> Money {
        Money::from_cents(self.total_price_cents)
    }
}

/// A line of a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    /// Product name at time of order (frozen).
    pub name_snapshot: String,
    /// Unit price in cents at time of order (frozen).
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub line_total_cents: i64,
}

/// One successful application of a coupon to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct CouponRedemption {
    pub coupon_id: String,
    pub order_id: String,
    pub redeemed_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_from_bps() {
        let rate = TaxRate::from_bps(825);
        assert_eq!(rate.bps(), 825);
        assert!((rate.percentage() - 8.25).abs() < 0.001);
    }

    #[test]
    fn test_tax_rate_default_is_zero() {
        assert!(TaxRate::default().is_zero());
    }

    #[test]
    fn test_pricing_config_defaults() {
        let config = PricingConfig::default();
        assert_eq!(config.free_shipping_threshold, Money::from_major(100));
        assert_eq!(config.shipping_price, Money::from_major(10));
        assert_eq!(config.tax_rate.bps(), 1000);
    }
}

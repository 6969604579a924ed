//! # Cart Pricing
//!
//! Turns an items subtotal into shipping, tax and total, and folds an
//! applied coupon's discount into a full breakdown.
//!
//! ## Computation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  items_price ──┬── > threshold? ──► shipping = 0                        │
//! │                │   (== threshold still pays shipping)                   │
//! │                │                   else shipping = SHIPPING_PRICE       │
//! │                │                                                        │
//! │                ├── × tax_rate ────► tax                                 │
//! │                │                                                        │
//! │                └── coupon? ───────► discount                            │
//! │                                                                         │
//! │  total = max(items + shipping + tax - discount, 0)                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tax is charged on the undiscounted subtotal; the discount comes off the
//! grand total.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::coupon::{calculate_discount, Coupon};
use crate::money::Money;
use crate::types::PricingConfig;

/// Shipping, tax and total for a subtotal, before any discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartPrices {
    pub items_price: Money,
    pub shipping_price: Money,
    pub tax_price: Money,
    pub total_price: Money,
}

/// Full price breakdown of a cart, discount included.
///
/// Derived from the cart every time it is read; orders keep a snapshot of
/// these numbers but the breakdown itself is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartPriceBreakdown {
    pub items_price: Money,
    pub shipping_price: Money,
    pub tax_price: Money,
    pub discount_amount: Money,
    pub total_price: Money,
    /// Code of the coupon that produced `discount_amount`, if any.
    pub coupon_code: Option<String>,
}

/// Computes shipping, tax and total for an items subtotal.
///
/// ## Free Shipping Boundary
/// Shipping is waived only when the subtotal is strictly greater than the
/// threshold. A subtotal exactly equal to the threshold pays shipping.
///
/// ```rust
/// use storefront_core::{calculate_cart_prices, Money, PricingConfig};
///
/// let config = PricingConfig::default();
///
/// let prices = calculate_cart_prices(Money::from_major(150), &config);
/// assert!(prices.shipping_price.is_zero());
/// assert_eq!(prices.total_price, Money::from_major(165));
///
/// let at_threshold = calculate_cart_prices(Money::from_major(100), &config);
/// assert_eq!(at_threshold.shipping_price, Money::from_major(10));
/// ```
pub fn calculate_cart_prices(items_price: Money, config: &PricingConfig) -> CartPrices {
    let shipping_price = if items_price > config.free_shipping_threshold {
        Money::zero()
    } else {
        config.shipping_price
    };
    let tax_price = items_price.calculate_tax(config.tax_rate);

    CartPrices {
        items_price,
        shipping_price,
        tax_price,
        total_price: items_price + shipping_price + tax_price,
    }
}

/// Computes the full breakdown, applying `coupon` when present.
///
/// The coupon is assumed to have been validated already; this only does
/// the arithmetic.
pub fn calculate_cart_breakdown(
    items_price: Money,
    coupon: Option<&Coupon>,
    config: &PricingConfig,
) -> CartPriceBreakdown {
    let prices = calculate_cart_prices(items_price, config);
    let discount_amount = coupon
        .map(|c| calculate_discount(c, items_price))
        .unwrap_or_default();

    CartPriceBreakdown {
        items_price: prices.items_price,
        shipping_price: prices.shipping_price,
        tax_price: prices.tax_price,
        discount_amount,
        total_price: prices.total_price.saturating_sub_to_zero(discount_amount),
        coupon_code: coupon.map(|c| c.code.clone()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

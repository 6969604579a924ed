//! # storefront-core: Pricing & Coupon Rules
//!
//! This crate holds the storefront's only self-contained rule set: how a
//! cart is priced and how discount coupons are validated and applied. Every
//! function is pure; the clock and the coupon source are passed in.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Storefront Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Cart / Checkout pages (front end)                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ JSON                                   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            ★ storefront-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌────────────┐    │   │
//! │  │   │  money   │  │ pricing  │  │  coupon  │  │    cart    │    │   │
//! │  │   │  Money   │  │ shipping │  │ validate │  │ CartItem   │    │   │
//! │  │   │ TaxRate  │  │ tax/total│  │ discount │  │ breakdown  │    │   │
//! │  │   └──────────┘  └──────────┘  └──────────┘  └────────────┘    │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK READS • PURE FUNCTIONS        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        storefront-db (coupon store, order placement)            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`types`] - Tax rate, pricing configuration, order snapshots
//! - [`pricing`] - Shipping, tax and total computation
//! - [`coupon`] - Coupon model, validation order, discount arithmetic
//! - [`catalog`] - Coupon lookup seam and the in-memory catalog
//! - [`cart`] - Cart line items with an optional applied coupon
//! - [`validation`] - Boundary input checks
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use storefront_core::{calculate_cart_prices, Money, PricingConfig};
//!
//! let config = PricingConfig::default(); // $100 threshold, $10 shipping, 10% tax
//! let prices = calculate_cart_prices(Money::from_major(50), &config);
//!
//! assert_eq!(prices.shipping_price, Money::from_major(10));
//! assert_eq!(prices.tax_price, Money::from_major(5));
//! assert_eq!(prices.total_price, Money::from_major(65));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod catalog;
pub mod coupon;
pub mod error;
pub mod money;
pub mod pricing;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, CartItem};
pub use catalog::{CouponCatalog, InMemoryCatalog};
pub use coupon::{
    calculate_discount, validate_coupon, Coupon, CouponCheck, CouponRejection, DiscountType,
    COUPON_APPLIED_MESSAGE,
};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use pricing::{calculate_cart_breakdown, calculate_cart_prices, CartPriceBreakdown, CartPrices};
pub use types::{CouponRedemption, Order, OrderItem, PricingConfig, TaxRate};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line.
///
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Largest single amount (unit price or subtotal) accepted at the boundary:
/// $100,000,000.00.
///
/// A full cart of lines at this price stays far inside `i64` cents, so cart
/// sums and tax never overflow.
pub const MAX_AMOUNT_CENTS: i64 = 10_000_000_000;

/// Maximum length of a coupon code.
pub const MAX_COUPON_CODE_LEN: usize = 32;

/// Basis points in 100%.
pub const BPS_SCALE: i64 = 10_000;

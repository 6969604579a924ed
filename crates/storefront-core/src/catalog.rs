//! # Coupon Catalog
//!
//! The lookup seam between the coupon rules and wherever coupons live.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate_coupon ──► CouponCatalog::find_by_code                        │
//! │                           │                                             │
//! │            ┌──────────────┴──────────────┐                              │
//! │            ▼                             ▼                              │
//! │    InMemoryCatalog               storefront-db CouponRepository         │
//! │    (static list, tests,          (async; looks up, then calls           │
//! │     CLI dry runs)                 Coupon::check_eligibility)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};

use crate::coupon::Coupon;
use crate::money::Money;

/// Read-only, case-insensitive lookup of coupons by code.
pub trait CouponCatalog {
    /// Returns the coupon whose code equals `code` ignoring ASCII case.
    fn find_by_code(&self, code: &str) -> Option<&Coupon>;
}

/// A fixed list of coupons held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    coupons: Vec<Coupon>,
}

// 2024-01-01T00:00:00Z .. 2030-12-31T23:59:59Z
const DEFAULT_VALID_FROM_SECS: i64 = 1_704_067_200;
const DEFAULT_VALID_UNTIL_SECS: i64 = 1_924_991_999;

impl InMemoryCatalog {
    pub fn new(coupons: Vec<Coupon>) -> Self {
        InMemoryCatalog { coupons }
    }

    /// The storefront's launch coupons.
    ///
    /// | Code | Effect | Minimum |
    /// |---|---|---|
    /// | `SAVE20` | 20% off, capped at $50 | $100 |
    /// | `WELCOME10` | 10% off | none |
    /// | `FLAT5` | $5 off | none |
    /// | `BIGSPENDER` | $25 off, 100 uses | $200 |
    pub fn with_defaults() -> Self {
        InMemoryCatalog::new(default_coupons())
    }

    pub fn coupons(&self) -> &[Coupon] {
        &self.coupons
    }

    pub fn len(&self) -> usize {
        self.coupons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coupons.is_empty()
    }
}

impl CouponCatalog for InMemoryCatalog {
    fn find_by_code(&self, code: &str) -> Option<&Coupon> {
        self.coupons.iter().find(|c| c.matches_code(code))
    }
}

/// Builds the launch coupon set. Also used to seed the database.
pub fn default_coupons() -> Vec<Coupon> {
    let from = DateTime::<Utc>::from_timestamp(DEFAULT_VALID_FROM_SECS, 0).unwrap_or_default();
    let until = DateTime::<Utc>::from_timestamp(DEFAULT_VALID_UNTIL_SECS, 0).unwrap_or_default();

    vec![
        Coupon::percentage("SAVE20", "20% off orders over $100", 2000, from, until)
            .with_min_purchase(Money::from_major(100))
            .with_max_discount(Money::from_major(50)),
        Coupon::percentage("WELCOME10", "10% off your first order", 1000, from, until),
        Coupon::fixed("FLAT5", "$5 off any order", Money::from_major(5), from, until),
        Coupon::fixed("BIGSPENDER", "$25 off orders over $200", Money::from_major(25), from, until)
            .with_min_purchase(Money::from_major(200))
            .with_usage_limit(100),
    ]
}

//! # Repository Module
//!
//! Database repository implementations for the storefront.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CLI command                                                           │
//! │       │  db.coupons().validate("save20", subtotal, now)                │
//! │       ▼                                                                 │
//! │  CouponRepository                      OrderRepository                 │
//! │  ├── insert / delete                   ├── place_order                 │
//! │  ├── get_by_code / list / count        ├── get_by_id                   │
//! │  ├── validate                          └── get_items                   │
//! │  └── redeem / redemptions                    │                          │
//! │       │                                      │ shares claim_in /        │
//! │       │                                      │ record_redemption_in     │
//! │       ▼                                      ▼                          │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`coupon::CouponRepository`] - Coupon store and redemption tracking
//! - [`order::OrderRepository`] - Transactional order placement

pub mod coupon;
pub mod order;

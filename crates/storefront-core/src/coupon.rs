//! # Coupons
//!
//! The coupon model, the ordered validation rules and the discount
//! arithmetic.
//!
//! ## Validation Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate_coupon(catalog, "save20", subtotal, now)                      │
//! │       │                                                                 │
//! │       ├── 1. lookup (case-insensitive) ── miss ──► InvalidCode          │
//! │       ├── 2. now in [valid_from, valid_until]? ──► Expired              │
//! │       ├── 3. used_count < usage_limit? ──────────► UsageLimitReached    │
//! │       ├── 4. subtotal >= min_purchase? ──────────► MinimumPurchase      │
//! │       │                                                                 │
//! │       └── Ok(coupon)  "Coupon applied successfully"                     │
//! │                                                                         │
//! │  First failing check wins: the customer sees the most relevant reason.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validation never mutates `used_count`. Redemption is recorded when the
//! order is placed, by the persistence layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use crate::catalog::CouponCatalog;
use crate::error::ValidationError;
use crate::money::Money;
use crate::validation::{normalize_coupon_code, validate_coupon_code};
use crate::BPS_SCALE;

/// Message returned alongside a successfully validated coupon.
pub const COUPON_APPLIED_MESSAGE: &str = "Coupon applied successfully";

// =============================================================================
// Discount Type
// =============================================================================

/// How a coupon's `value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// `value` is basis points of the subtotal (2000 = 20%).
    Percentage,
    /// `value` is an amount in cents.
    Fixed,
}

// =============================================================================
// Coupon
// =============================================================================

/// A discount rule with eligibility constraints.
///
/// Immutable apart from `used_count`, which the coupon store increments once
/// per redeemed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Customer-facing code, stored uppercase. Matched case-insensitively.
    pub code: String,

    pub description: String,

    pub discount_type: DiscountType,

    /// Basis points for percentage coupons, cents for fixed coupons.
    pub value: i64,

    /// Subtotal required to qualify, in cents.
    pub min_purchase_cents: i64,

    /// Cap on the absolute discount. Percentage coupons only.
    pub max_discount_cents: Option<i64>,

    /// Start of the validity window (inclusive).
    #[ts(as = "String")]
    pub valid_from: DateTime<Utc>,

    /// End of the validity window (inclusive).
    #[ts(as = "String")]
    pub valid_until: DateTime<Utc>,

    /// Maximum number of redemptions; `None` means unlimited.
    pub usage_limit: Option<i64>,

    /// Redemptions so far.
    pub used_count: i64,
}

impl Coupon {
    fn new(
        code: &str,
        description: impl Into<String>,
        discount_type: DiscountType,
        value: i64,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> Self {
        Coupon {
            id: Uuid::new_v4().to_string(),
            code: normalize_coupon_code(code),
            description: description.into(),
            discount_type,
            value,
            min_purchase_cents: 0,
            max_discount_cents: None,
            valid_from,
            valid_until,
            usage_limit: None,
            used_count: 0,
        }
    }

    /// Creates a percentage coupon. `bps` is basis points (2000 = 20%).
    ///
    /// ```rust
    /// use chrono::{TimeZone, Utc};
    /// use storefront_core::{Coupon, Money};
    ///
    /// let from = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    /// let until = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
    ///
    /// let coupon = Coupon::percentage("save20", "20% off", 2000, from, until)
    ///     .with_min_purchase(Money::from_major(100))
    ///     .with_max_discount(Money::from_major(50));
    ///
    /// assert_eq!(coupon.code, "SAVE20");
    /// assert!(coupon.validate().is_ok());
    /// ```
    pub fn percentage(
        code: &str,
        description: impl Into<String>,
        bps: i64,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> Self {
        Coupon::new(code, description, DiscountType::Percentage, bps, valid_from, valid_until)
    }

    /// Creates a fixed-amount coupon.
    pub fn fixed(
        code: &str,
        description: impl Into<String>,
        amount: Money,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> Self {
        Coupon::new(
            code,
            description,
            DiscountType::Fixed,
            amount.cents(),
            valid_from,
            valid_until,
        )
    }

    pub fn with_min_purchase(mut self, min_purchase: Money) -> Self {
        self.min_purchase_cents = min_purchase.cents();
        self
    }

    pub fn with_max_discount(mut self, max_discount: Money) -> Self {
        self.max_discount_cents = Some(max_discount.cents());
        self
    }

    pub fn with_usage_limit(mut self, limit: i64) -> Self {
        self.usage_limit = Some(limit);
        self
    }

    #[inline]
    pub fn min_purchase(&self) -> Money {
        Money::from_cents(self.min_purchase_cents)
    }

    #[inline]
    pub fn max_discount(&self) -> Option<Money> {
        self.max_discount_cents.map(Money::from_cents)
    }

    /// True when `code` names this coupon, ignoring case and surrounding
    /// whitespace.
    pub fn matches_code(&self, code: &str) -> bool {
        self.code.eq_ignore_ascii_case(code.trim())
    }

    /// True when `now` falls inside the inclusive validity window.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && now <= self.valid_until
    }

    /// True when a usage limit exists and has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.usage_limit.is_some_and(|limit| self.used_count >= limit)
    }

    /// Redemptions left, or `None` when unlimited.
    pub fn remaining_uses(&self) -> Option<i64> {
        self.usage_limit.map(|limit| (limit - self.used_count).max(0))
    }

    /// Runs validation checks 2-4 against an already looked-up coupon.
    ///
    /// The coupon store calls this after its own case-insensitive lookup so
    /// both the in-memory and the persistent path share one rule set.
    pub fn check_eligibility(
        &self,
        subtotal: Money,
        now: DateTime<Utc>,
    ) -> Result<(), CouponRejection> {
        if !self.is_active_at(now) {
            return Err(CouponRejection::Expired);
        }

        if self.is_exhausted() {
            return Err(CouponRejection::UsageLimitReached);
        }

        if subtotal < self.min_purchase() {
            return Err(CouponRejection::MinimumPurchase {
                min_purchase: self.min_purchase(),
            });
        }

        Ok(())
    }

    /// Checks the coupon's structural invariants.
    ///
    /// ## Rules
    /// - Code: 1-32 letters, digits, `-` or `_`
    /// - `valid_from <= valid_until`
    /// - `value > 0`; percentage coupons at most 100% (10000 bps)
    /// - Minimum purchase not negative
    /// - Max discount positive, and only on percentage coupons
    /// - Usage limit positive; used count not negative
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_coupon_code(&self.code)?;

        if self.valid_from > self.valid_until {
            return Err(ValidationError::InvalidFormat {
                field: "valid_until".to_string(),
                reason: "must not be earlier than valid_from".to_string(),
            });
        }

        if self.value <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "value".to_string(),
            });
        }

        if self.discount_type == DiscountType::Percentage && self.value > BPS_SCALE {
            return Err(ValidationError::OutOfRange {
                field: "value".to_string(),
                min: 1,
                max: BPS_SCALE,
            });
        }

        if self.min_purchase_cents < 0 {
            return Err(ValidationError::OutOfRange {
                field: "min_purchase".to_string(),
                min: 0,
                max: i64::MAX,
            });
        }

        match (self.discount_type, self.max_discount_cents) {
            (DiscountType::Fixed, Some(_)) => {
                return Err(ValidationError::NotAllowed {
                    field: "max_discount".to_string(),
                    allowed: vec!["percentage coupons".to_string()],
                });
            }
            (DiscountType::Percentage, Some(cap)) if cap <= 0 => {
                return Err(ValidationError::MustBePositive {
                    field: "max_discount".to_string(),
                });
            }
            _ => {}
        }

        if self.usage_limit.is_some_and(|limit| limit <= 0) {
            return Err(ValidationError::MustBePositive {
                field: "usage_limit".to_string(),
            });
        }

        if self.used_count < 0 {
            return Err(ValidationError::OutOfRange {
                field: "used_count".to_string(),
                min: 0,
                max: i64::MAX,
            });
        }

        Ok(())
    }
}

// =============================================================================
// Validation Outcome
// =============================================================================

/// Why a coupon cannot be applied.
///
/// This is an expected business outcome, not a fault: the message is shown
/// to the customer as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CouponRejection {
    #[error("Invalid coupon code")]
    InvalidCode,

    #[error("Coupon has expired")]
    Expired,

    #[error("Coupon usage limit reached")]
    UsageLimitReached,

    #[error("Minimum purchase of {} required", .min_purchase.to_plain_string())]
    MinimumPurchase { min_purchase: Money },
}

/// Validates `code` against `catalog` for a cart worth `subtotal` at `now`.
///
/// Pure and idempotent: the catalog is only read.
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use storefront_core::{validate_coupon, CouponRejection, InMemoryCatalog, Money};
///
/// let catalog = InMemoryCatalog::with_defaults();
/// let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
///
/// let rejected = validate_coupon(&catalog, "SAVE20", Money::from_major(50), now);
/// assert_eq!(rejected.unwrap_err().to_string(), "Minimum purchase of 100 required");
///
/// let coupon = validate_coupon(&catalog, "save20", Money::from_major(150), now).unwrap();
/// assert_eq!(coupon.code, "SAVE20");
///
/// let unknown = validate_coupon(&catalog, "NOPE", Money::from_major(150), now);
/// assert_eq!(unknown, Err(CouponRejection::InvalidCode));
/// ```
pub fn validate_coupon<C>(
    catalog: &C,
    code: &str,
    subtotal: Money,
    now: DateTime<Utc>,
) -> Result<Coupon, CouponRejection>
where
    C: CouponCatalog + ?Sized,
{
    let coupon = catalog
        .find_by_code(code.trim())
        .ok_or(CouponRejection::InvalidCode)?;

    coupon.check_eligibility(subtotal, now)?;

    Ok(coupon.clone())
}

/// Computes the discount `coupon` grants on `subtotal`.
///
/// ## Rules
/// - Percentage: `subtotal × value / 10000`, capped at `max_discount`
/// - Fixed: `min(value, subtotal)`
///
/// The result is never negative and never larger than the subtotal.
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use storefront_core::{calculate_discount, Coupon, Money};
///
/// let from = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
/// let until = Utc.with_ymd_and_hms(2025, 12, 31, 0, 0, 0).unwrap();
///
/// let flat = Coupon::fixed("FLAT5", "$5 off", Money::from_major(5), from, until);
/// assert_eq!(calculate_discount(&flat, Money::from_major(3)), Money::from_major(3));
/// ```
pub fn calculate_discount(coupon: &Coupon, subtotal: Money) -> Money {
    let discount = match coupon.discount_type {
        DiscountType::Percentage => {
            let discount = subtotal.portion_bps(coupon.value);
            match coupon.max_discount() {
                Some(cap) => discount.min(cap),
                None => discount,
            }
        }
        DiscountType::Fixed => Money::from_cents(coupon.value).min(subtotal),
    };

    discount.clamp(Money::zero(), subtotal.max(Money::zero()))
}

// =============================================================================
// Wire Shape
// =============================================================================

/// The `{ valid, message, coupon? }` object the cart page renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CouponCheck {
    pub valid: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub coupon: Option<Coupon>,
}

impl From<Result<Coupon, CouponRejection>> for CouponCheck {
    fn from(result: Result<Coupon, CouponRejection>) -> Self {
        match result {
            Ok(coupon) => CouponCheck {
                valid: true,
                message: COUPON_APPLIED_MESSAGE.to_string(),
                coupon: Some(coupon),
            },
            Err(rejection) => CouponCheck {
                valid: false,
                message: rejection.to_string(),
                coupon: None,
            },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use chrono::{Duration, TimeZone};

    pub(crate) fn window_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    pub(crate) fn window_end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap()
    }

    pub(crate) fn test_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    pub(crate) fn percentage_coupon(
        code: &str,
        bps: i64,
        max_discount_cents: Option<i64>,
        min_purchase_cents: i64,
    ) -> Coupon {
        let mut coupon =
            Coupon::percentage(code, "percentage test coupon", bps, window_start(), window_end())
                .with_min_purchase(Money::from_cents(min_purchase_cents));
        coupon.max_discount_cents = max_discount_cents;
        coupon
    }

    pub(crate) fn fixed_coupon(code: &str, amount_cents: i64, min_purchase_cents: i64) -> Coupon {
        Coupon::fixed(
            code,
            "fixed test coupon",
            Money::from_cents(amount_cents),
            window_start(),
            window_end(),
        )
        .with_min_purchase(Money::from_cents(min_purchase_cents))
    }

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new(vec![
            percentage_coupon("SAVE20", 2000, Some(5000), 10_000),
            fixed_coupon("FLAT5", 500, 0),
            fixed_coupon("LIMITED", 1000, 0).with_usage_limit(3),
        ])
    }

    // -------------------------------------------------------------------------
    // validate_coupon
    // -------------------------------------------------------------------------

    #[test]
    fn test_unknown_code_is_invalid() {
        let result = validate_coupon(&catalog(), "BOGUS", Money::from_major(500), test_now());
        assert_eq!(result, Err(CouponRejection::InvalidCode));
        assert_eq!(result.unwrap_err().to_string(), "Invalid coupon code");
    }

    #[test]
    fn test_minimum_purchase_message() {
        let result = validate_coupon(&catalog(), "SAVE20", Money::from_major(50), test_now());
        assert_eq!(
            result,
            Err(CouponRejection::MinimumPurchase {
                min_purchase: Money::from_major(100)
            })
        );
        assert_eq!(
            result.unwrap_err().to_string(),
            "Minimum purchase of 100 required"
        );
    }

    #[test]
    fn test_lowercase_code_matches() {
        let coupon = validate_coupon(&catalog(), "save20", Money::from_major(150), test_now())
            .expect("lowercase code should match");
        assert_eq!(coupon.code, "SAVE20");
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        assert!(validate_coupon(&catalog(), "  flat5 ", Money::from_major(1), test_now()).is_ok());
    }

    #[test]
    fn test_minimum_purchase_is_inclusive() {
        let result = validate_coupon(&catalog(), "SAVE20", Money::from_major(100), test_now());
        assert!(result.is_ok());
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let catalog = catalog();
        assert!(validate_coupon(&catalog, "FLAT5", Money::from_major(1), window_start()).is_ok());
        assert!(validate_coupon(&catalog, "FLAT5", Money::from_major(1), window_end()).is_ok());

        let before = window_start() - Duration::seconds(1);
        let after = window_end() + Duration::seconds(1);
        assert_eq!(
            validate_coupon(&catalog, "FLAT5", Money::from_major(1), before),
            Err(CouponRejection::Expired)
        );
        assert_eq!(
            validate_coupon(&catalog, "FLAT5", Money::from_major(1), after),
            Err(CouponRejection::Expired)
        );
    }

    #[test]
    fn test_usage_limit_reached() {
        let mut coupon = fixed_coupon("LIMITED", 1000, 0).with_usage_limit(3);
        coupon.used_count = 3;
        let catalog = InMemoryCatalog::new(vec![coupon]);

        let result = validate_coupon(&catalog, "LIMITED", Money::from_major(20), test_now());
        assert_eq!(result, Err(CouponRejection::UsageLimitReached));
        assert_eq!(result.unwrap_err().to_string(), "Coupon usage limit reached");
    }

    #[test]
    fn test_expiry_reported_before_usage_and_minimum() {
        let mut coupon = percentage_coupon("OLD", 1000, None, 100_000).with_usage_limit(1);
        coupon.used_count = 1;
        let catalog = InMemoryCatalog::new(vec![coupon]);

        let later = window_end() + Duration::days(1);
        assert_eq!(
            validate_coupon(&catalog, "OLD", Money::zero(), later),
            Err(CouponRejection::Expired)
        );
        // Inside the window the usage limit wins over the minimum purchase
        assert_eq!(
            validate_coupon(&catalog, "OLD", Money::zero(), test_now()),
            Err(CouponRejection::UsageLimitReached)
        );
    }

    #[test]
    fn test_validation_is_idempotent() {
        let catalog = catalog();
        let first = validate_coupon(&catalog, "SAVE20", Money::from_major(150), test_now());
        let second = validate_coupon(&catalog, "SAVE20", Money::from_major(150), test_now());
        assert_eq!(first, second);
        assert_eq!(catalog.find_by_code("SAVE20").map(|c| c.used_count), Some(0));
    }

    // -------------------------------------------------------------------------
    // calculate_discount
    // -------------------------------------------------------------------------

    #[test]
    fn test_percentage_discount_under_cap() {
        let coupon = percentage_coupon("SAVE20", 2000, Some(5000), 0);
        assert_eq!(calculate_discount(&coupon, Money::from_major(150)), Money::from_major(30));
    }

    #[test]
    fn test_percentage_discount_capped() {
        let coupon = percentage_coupon("SAVE20", 2000, Some(5000), 0);
        assert_eq!(calculate_discount(&coupon, Money::from_major(1000)), Money::from_major(50));
    }

    #[test]
    fn test_percentage_discount_uncapped() {
        let coupon = percentage_coupon("HALF", 5000, None, 0);
        assert_eq!(calculate_discount(&coupon, Money::from_major(1000)), Money::from_major(500));
    }

    #[test]
    fn test_fixed_discount_limited_to_subtotal() {
        let coupon = fixed_coupon("FLAT5", 500, 0);
        assert_eq!(calculate_discount(&coupon, Money::from_major(3)), Money::from_major(3));
        assert_eq!(calculate_discount(&coupon, Money::from_major(30)), Money::from_major(5));
    }

    #[test]
    fn test_discount_bounds_hold_across_subtotals() {
        let fixed = fixed_coupon("FLAT5", 500, 0);
        let capped = percentage_coupon("SAVE20", 2000, Some(5000), 0);

        for cents in (0..100_000).step_by(777) {
            let subtotal = Money::from_cents(cents);
            let d = calculate_discount(&fixed, subtotal);
            assert!(d <= subtotal && !d.is_negative());

            let d = calculate_discount(&capped, subtotal);
            assert!(d <= Money::from_major(50) && d <= subtotal);
        }
    }

    #[test]
    fn test_negative_subtotal_yields_no_discount() {
        let coupon = fixed_coupon("FLAT5", 500, 0);
        assert!(calculate_discount(&coupon, Money::from_cents(-100)).is_zero());
    }

    // -------------------------------------------------------------------------
    // Coupon::validate
    // -------------------------------------------------------------------------

    #[test]
    fn test_valid_coupons_pass_invariants() {
        assert!(percentage_coupon("SAVE20", 2000, Some(5000), 10_000).validate().is_ok());
        assert!(fixed_coupon("FLAT5", 500, 0).validate().is_ok());
    }

    #[test]
    fn test_percentage_above_hundred_rejected() {
        let coupon = percentage_coupon("TOOMUCH", 10_001, None, 0);
        assert!(matches!(
            coupon.validate(),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(percentage_coupon("ALL", 10_000, None, 0).validate().is_ok());
    }

    #[test]
    fn test_inverted_window_rejected() {
        let coupon =
            Coupon::fixed("BACKWARDS", "", Money::from_major(1), window_end(), window_start());
        assert!(coupon.validate().is_err());
    }

    #[test]
    fn test_non_positive_value_rejected() {
        assert!(fixed_coupon("ZERO", 0, 0).validate().is_err());
        assert!(percentage_coupon("NEG", -5, None, 0).validate().is_err());
    }

    #[test]
    fn test_max_discount_only_on_percentage() {
        let mut coupon = fixed_coupon("FLAT5", 500, 0);
        coupon.max_discount_cents = Some(100);
        assert!(matches!(
            coupon.validate(),
            Err(ValidationError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_usage_limit_must_be_positive() {
        let coupon = fixed_coupon("FLAT5", 500, 0).with_usage_limit(0);
        assert!(coupon.validate().is_err());
    }

    #[test]
    fn test_remaining_uses() {
        let mut coupon = fixed_coupon("LIMITED", 1000, 0).with_usage_limit(3);
        assert_eq!(coupon.remaining_uses(), Some(3));
        coupon.used_count = 2;
        assert_eq!(coupon.remaining_uses(), Some(1));
        assert_eq!(fixed_coupon("FLAT5", 500, 0).remaining_uses(), None);
    }

    // -------------------------------------------------------------------------
    // CouponCheck
    // -------------------------------------------------------------------------

    #[test]
    fn test_coupon_check_from_success() {
        let check = CouponCheck::from(validate_coupon(
            &catalog(),
            "save20",
            Money::from_major(150),
            test_now(),
        ));
        assert!(check.valid);
        assert_eq!(check.message, COUPON_APPLIED_MESSAGE);
        assert_eq!(check.coupon.map(|c| c.code), Some("SAVE20".to_string()));
    }

    #[test]
    fn test_coupon_check_serializes_without_coupon_on_failure() {
        let check = CouponCheck::from(validate_coupon(
            &catalog(),
            "SAVE20",
            Money::from_major(50),
            test_now(),
        ));
        let json = serde_json::to_value(&check).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "valid": false,
                "message": "Minimum purchase of 100 required"
            })
        );
    }

    #[test]
    fn test_coupon_check_binding_marks_coupon_optional() {
        let decl = CouponCheck::decl();
        assert!(decl.contains("coupon?: Coupon"), "{decl}");
        assert!(!decl.contains("null"), "{decl}");
    }
}

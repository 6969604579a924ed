//! # Coupon Repository
//!
//! The persistent coupon store and redemption tracking.
//!
//! ## Redemption
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    redeem(code, order_id)                               │
//! │                                                                         │
//! │  BEGIN                                                                 │
//! │   │                                                                     │
//! │   ├── UPDATE coupons SET used_count = used_count + 1                   │
//! │   │   WHERE code = ? AND (usage_limit IS NULL                          │
//! │   │                       OR used_count < usage_limit)                 │
//! │   │       │                                                             │
//! │   │       ├── 0 rows ──► NotFound / CouponExhausted, ROLLBACK          │
//! │   │       └── 1 row  ──► write lock held until COMMIT                  │
//! │   │                                                                     │
//! │   ├── INSERT INTO coupon_redemptions (coupon_id, order_id)             │
//! │   │       └── PK clash ──► AlreadyRedeemed, ROLLBACK                   │
//! │   │                                                                     │
//! │  COMMIT                                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The UPDATE is the first statement of the transaction, so two checkouts
//! racing for the last use are serialized by SQLite's write lock and the
//! loser sees zero rows affected.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use storefront_core::validation::normalize_coupon_code;
use storefront_core::{Coupon, CouponRedemption, CouponRejection, Money};

const COUPON_COLUMNS: &str = "id, code, description, discount_type, value, \
     min_purchase_cents, max_discount_cents, valid_from, valid_until, \
     usage_limit, used_count";

/// Repository for coupon database operations.
#[derive(Debug, Clone)]
pub struct CouponRepository {
    pool: SqlitePool,
}

impl CouponRepository {
    /// Creates a new CouponRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CouponRepository { pool }
    }

    /// Stores a new coupon.
    ///
    /// The code is stored uppercase. Returns the coupon as stored.
    ///
    /// ## Errors
    /// - `Validation` when the coupon breaks an invariant
    /// - `UniqueViolation` when the code exists in any letter case
    pub async fn insert(&self, coupon: &Coupon) -> DbResult<Coupon> {
        let mut stored = coupon.clone();
        stored.code = normalize_coupon_code(&coupon.code);
        stored.validate()?;

        debug!(code = %stored.code, id = %stored.id, "Inserting coupon");

        let result = sqlx::query(
            r#"
            INSERT INTO coupons (
                id, code, description, discount_type, value,
                min_purchase_cents, max_discount_cents,
                valid_from, valid_until, usage_limit, used_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&stored.id)
        .bind(&stored.code)
        .bind(&stored.description)
        .bind(stored.discount_type)
        .bind(stored.value)
        .bind(stored.min_purchase_cents)
        .bind(stored.max_discount_cents)
        .bind(stored.valid_from)
        .bind(stored.valid_until)
        .bind(stored.usage_limit)
        .bind(stored.used_count)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(stored),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(DbError::duplicate("coupon code", stored.code))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Looks up a coupon by code, ignoring case and surrounding whitespace.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Coupon>> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_code(&mut *conn, code).await
    }

    /// Lists coupons ordered by code.
    pub async fn list(&self, limit: u32) -> DbResult<Vec<Coupon>> {
        let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons ORDER BY code LIMIT ?1");

        let coupons = sqlx::query_as::<_, Coupon>(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(coupons)
    }

    /// Deletes a coupon.
    ///
    /// ## Errors
    /// - `NotFound` when no coupon has this code
    /// - `ForeignKeyViolation` when the coupon has been redeemed
    pub async fn delete(&self, code: &str) -> DbResult<()> {
        let code = normalize_coupon_code(code);

        let result = sqlx::query("DELETE FROM coupons WHERE code = ?1")
            .bind(&code)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Coupon", code));
        }

        info!(code = %code, "Coupon deleted");
        Ok(())
    }

    /// Number of stored coupons.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM coupons")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Validates `code` for a cart worth `subtotal` at `now`.
    ///
    /// Same rule order as `storefront_core::validate_coupon`; the outer
    /// `DbResult` only fails on database errors.
    pub async fn validate(
        &self,
        code: &str,
        subtotal: Money,
        now: DateTime<Utc>,
    ) -> DbResult<Result<Coupon, CouponRejection>> {
        let Some(coupon) = self.get_by_code(code).await? else {
            debug!(code = %code, "Coupon lookup missed");
            return Ok(Err(CouponRejection::InvalidCode));
        };

        let outcome = coupon.check_eligibility(subtotal, now).map(|()| coupon);
        if let Err(rejection) = &outcome {
            debug!(code = %code, %rejection, "Coupon rejected");
        }

        Ok(outcome)
    }

    /// Redeems `code` once for `order_id`.
    ///
    /// Only the usage limit is enforced here; eligibility (window, minimum
    /// purchase) is the caller's concern. See `OrderRepository::place_order`.
    ///
    /// ## Errors
    /// - `NotFound` when no coupon has this code
    /// - `CouponExhausted` when the usage limit is reached
    /// - `AlreadyRedeemed` when this order already used the coupon
    pub async fn redeem(
        &self,
        code: &str,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<CouponRedemption> {
        let mut tx = self.pool.begin().await?;

        let coupon = claim_in(&mut *tx, code).await?;
        let redemption = record_redemption_in(&mut *tx, &coupon, order_id, now).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(code = %coupon.code, order_id = %order_id, "Coupon redeemed");
        Ok(redemption)
    }

    /// Redemptions recorded for `code`, oldest first.
    pub async fn redemptions(&self, code: &str) -> DbResult<Vec<CouponRedemption>> {
        let redemptions = sqlx::query_as::<_, CouponRedemption>(
            r#"
            SELECT r.coupon_id, r.order_id, r.redeemed_at
            FROM coupon_redemptions r
            JOIN coupons c ON c.id = r.coupon_id
            WHERE c.code = ?1
            ORDER BY r.redeemed_at, r.order_id
            "#,
        )
        .bind(normalize_coupon_code(code))
        .fetch_all(&self.pool)
        .await?;

        Ok(redemptions)
    }
}

// =============================================================================
// Connection-level helpers (shared with order placement)
// =============================================================================

pub(crate) async fn fetch_by_code(
    conn: &mut SqliteConnection,
    code: &str,
) -> DbResult<Option<Coupon>> {
    let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE code = ?1");

    let coupon = sqlx::query_as::<_, Coupon>(&sql)
        .bind(normalize_coupon_code(code))
        .fetch_optional(&mut *conn)
        .await?;

    Ok(coupon)
}

/// Atomically takes one use of `code`.
///
/// Returns the coupon as it was *before* the claim, so callers can run
/// `check_eligibility` on it unchanged.
pub(crate) async fn claim_in(conn: &mut SqliteConnection, code: &str) -> DbResult<Coupon> {
    let code = normalize_coupon_code(code);

    let claimed = sqlx::query_as::<_, Coupon>(
        r#"
        UPDATE coupons
        SET used_count = used_count + 1
        WHERE code = ?1
          AND (usage_limit IS NULL OR used_count < usage_limit)
        RETURNING id, code, description, discount_type, value,
                  min_purchase_cents, max_discount_cents,
                  valid_from, valid_until, usage_limit,
                  used_count - 1 AS used_count
        "#,
    )
    .bind(&code)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(coupon) = claimed {
        return Ok(coupon);
    }

    // Zero rows: tell a missing coupon from an exhausted one
    match fetch_by_code(conn, &code).await? {
        None => Err(DbError::not_found("Coupon", code)),
        Some(coupon) => {
            warn!(
                code = %coupon.code,
                used_count = coupon.used_count,
                usage_limit = ?coupon.usage_limit,
                "Coupon usage limit reached"
            );
            Err(DbError::CouponExhausted { code })
        }
    }
}

/// Records that `coupon` was redeemed by `order_id`.
pub(crate) async fn record_redemption_in(
    conn: &mut SqliteConnection,
    coupon: &Coupon,
    order_id: &str,
    now: DateTime<Utc>,
) -> DbResult<CouponRedemption> {
    let redemption = CouponRedemption {
        coupon_id: coupon.id.clone(),
        order_id: order_id.to_string(),
        redeemed_at: now,
    };

    let result = sqlx::query(
        "INSERT INTO coupon_redemptions (coupon_id, order_id, redeemed_at) VALUES (?1, ?2, ?3)",
    )
    .bind(&redemption.coupon_id)
    .bind(&redemption.order_id)
    .bind(redemption.redeemed_at)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(redemption),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            warn!(code = %coupon.code, order_id = %order_id, "Duplicate redemption");
            Err(DbError::AlreadyRedeemed {
                code: coupon.code.clone(),
                order_id: order_id.to_string(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::TimeZone;
    use storefront_core::catalog::default_coupons;
    use storefront_core::DiscountType;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    async fn seeded_db() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        for coupon in default_coupons() {
            db.coupons().insert(&coupon).await.unwrap();
        }
        db
    }

    fn limited_coupon(code: &str, limit: i64) -> Coupon {
        let from = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let until = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        Coupon::fixed(code, "limited", Money::from_major(5), from, until).with_usage_limit(limit)
    }

    #[tokio::test]
    async fn test_insert_and_get_by_code_ignores_case() {
        let db = seeded_db().await;
        let repo = db.coupons();

        let coupon = repo.get_by_code("save20").await.unwrap().unwrap();
        assert_eq!(coupon.code, "SAVE20");
        assert_eq!(coupon.discount_type, DiscountType::Percentage);
        assert_eq!(coupon.value, 2000);
        assert_eq!(coupon.max_discount_cents, Some(5_000));
        assert_eq!(coupon.min_purchase_cents, 10_000);

        assert!(repo.get_by_code("  Flat5 ").await.unwrap().is_some());
        assert!(repo.get_by_code("NOPE").await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_insert_normalizes_code() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut coupon = limited_coupon("spring", 10);
        coupon.code = "spring".to_string();
        let stored = db.coupons().insert(&coupon).await.unwrap();

        assert_eq!(stored.code, "SPRING");
        let fetched = db.coupons().get_by_code("SPRING").await.unwrap().unwrap();
        assert_eq!(fetched, stored);
    }

    #[tokio::test]
    async fn test_duplicate_code_is_rejected_in_any_case() {
        let db = seeded_db().await;

        let mut dup = limited_coupon("x", 1);
        dup.code = "save20".to_string();
        let err = db.coupons().insert(&dup).await.unwrap_err();

        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid_coupon() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut coupon = limited_coupon("BROKEN", 1);
        coupon.value = 0;
        let err = db.coupons().insert(&coupon).await.unwrap_err();

        assert!(matches!(err, DbError::Validation(_)));
        assert_eq!(db.coupons().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_orders_by_code() {
        let db = seeded_db().await;

        let codes: Vec<String> = db
            .coupons()
            .list(10)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.code)
            .collect();
        assert_eq!(codes, ["BIGSPENDER", "FLAT5", "SAVE20", "WELCOME10"]);

        assert_eq!(db.coupons().list(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_validate_follows_rule_order() {
        let db = seeded_db().await;
        let repo = db.coupons();

        let outcome = repo.validate("NOPE", Money::from_major(500), now()).await.unwrap();
        assert_eq!(outcome, Err(CouponRejection::InvalidCode));

        let outcome = repo.validate("SAVE20", Money::from_major(50), now()).await.unwrap();
        assert_eq!(outcome.unwrap_err().to_string(), "Minimum purchase of 100 required");

        let outcome = repo.validate("save20", Money::from_major(150), now()).await.unwrap();
        assert_eq!(outcome.unwrap().code, "SAVE20");

        let later = Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap();
        let outcome = repo.validate("SAVE20", Money::from_major(150), later).await.unwrap();
        assert_eq!(outcome, Err(CouponRejection::Expired));
    }

    #[tokio::test]
    async fn test_validate_reports_usage_limit() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.coupons().insert(&limited_coupon("ONCE", 1)).await.unwrap();
        db.coupons().redeem("ONCE", "order-1", now()).await.unwrap();

        let outcome = db
            .coupons()
            .validate("ONCE", Money::from_major(20), now())
            .await
            .unwrap();
        assert_eq!(outcome, Err(CouponRejection::UsageLimitReached));
    }

    #[tokio::test]
    async fn test_redeem_increments_and_records() {
        let db = seeded_db().await;
        let repo = db.coupons();

        let redemption = repo.redeem("bigspender", "order-1", now()).await.unwrap();
        assert_eq!(redemption.order_id, "order-1");

        let coupon = repo.get_by_code("BIGSPENDER").await.unwrap().unwrap();
        assert_eq!(coupon.used_count, 1);
        assert_eq!(coupon.id, redemption.coupon_id);

        let recorded = repo.redemptions("BIGSPENDER").await.unwrap();
        assert_eq!(recorded, vec![redemption]);
    }

    #[tokio::test]
    async fn test_redeem_beyond_limit_fails() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.coupons();
        repo.insert(&limited_coupon("TWICE", 2)).await.unwrap();

        repo.redeem("TWICE", "order-1", now()).await.unwrap();
        repo.redeem("TWICE", "order-2", now()).await.unwrap();
        let err = repo.redeem("TWICE", "order-3", now()).await.unwrap_err();

        assert!(matches!(err, DbError::CouponExhausted { ref code } if code == "TWICE"));
        let coupon = repo.get_by_code("TWICE").await.unwrap().unwrap();
        assert_eq!(coupon.used_count, 2);
    }

    #[tokio::test]
    async fn test_redeem_twice_for_same_order_rolls_back() {
        let db = seeded_db().await;
        let repo = db.coupons();

        repo.redeem("FLAT5", "order-1", now()).await.unwrap();
        let err = repo.redeem("FLAT5", "order-1", now()).await.unwrap_err();

        assert!(matches!(err, DbError::AlreadyRedeemed { .. }));
        let coupon = repo.get_by_code("FLAT5").await.unwrap().unwrap();
        assert_eq!(coupon.used_count, 1);
        assert_eq!(repo.redemptions("FLAT5").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_redeem_unknown_code() {
        let db = seeded_db().await;

        let err = db.coupons().redeem("NOPE", "order-1", now()).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_spawned_redemptions_stop_at_limit() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.coupons().insert(&limited_coupon("RUSH", 3)).await.unwrap();

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let repo = db.coupons();
                tokio::spawn(async move { repo.redeem("RUSH", &format!("order-{i}"), now()).await })
            })
            .collect();

        let mut succeeded = 0;
        let mut exhausted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(DbError::CouponExhausted { .. }) => exhausted += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(succeeded, 3);
        assert_eq!(exhausted, 7);
        let coupon = db.coupons().get_by_code("RUSH").await.unwrap().unwrap();
        assert_eq!(coupon.used_count, 3);
    }

    #[tokio::test]
    async fn test_delete() {
        let db = seeded_db().await;
        let repo = db.coupons();

        repo.delete("welcome10").await.unwrap();
        assert!(repo.get_by_code("WELCOME10").await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 3);

        let err = repo.delete("WELCOME10").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_redeemed_coupon_is_blocked() {
        let db = seeded_db().await;
        let repo = db.coupons();
        repo.redeem("FLAT5", "order-1", now()).await.unwrap();

        let err = repo.delete("FLAT5").await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }
}

//! # Order Repository
//!
//! Turns a priced cart into a stored order, redeeming its coupon on the way.
//!
//! ## Placement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    place_order(cart, config, now)                       │
//! │                                                                         │
//! │  cart empty? ──► CoreError::EmptyCart                                  │
//! │                                                                         │
//! │  BEGIN                                                                 │
//! │   ├── coupon applied?                                                  │
//! │   │     ├── claim one use (conditional UPDATE)                         │
//! │   │     │     └── none left? expired wins over exhausted             │
//! │   │     └── re-check window + minimum against the STORED row           │
//! │   ├── price the cart with the stored coupon                            │
//! │   ├── INSERT orders (frozen breakdown)                                 │
//! │   ├── INSERT order_items (snapshots)                                   │
//! │   └── INSERT coupon_redemptions                                        │
//! │  COMMIT                                                                │
//! │                                                                         │
//! │  Any error drops the transaction: no order, used_count unchanged.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::coupon::{claim_in, fetch_by_code, record_redemption_in};
use storefront_core::{
    calculate_cart_breakdown, Cart, CoreError, Coupon, CouponRejection, Money, Order, OrderItem,
    PricingConfig,
};

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Places an order for `cart`.
    ///
    /// The cart's coupon is looked up again and must still be eligible at
    /// `now`; the stored row wins over the copy held by the cart.
    ///
    /// ## Errors
    /// - `Domain(EmptyCart)` for an empty cart
    /// - `CouponRejected` when the coupon is gone or no longer eligible
    /// - `CouponExhausted` when its last use was taken by another checkout
    pub async fn place_order(
        &self,
        cart: &Cart,
        config: &PricingConfig,
        now: DateTime<Utc>,
    ) -> DbResult<Order> {
        if cart.is_empty() {
            return Err(CoreError::EmptyCart.into());
        }

        let uuid = Uuid::new_v4();
        let order_id = uuid.to_string();
        let order_number = generate_order_number(&uuid, now);
        let items_price = cart.items_price();

        debug!(order_id = %order_id, lines = cart.item_count(), "Placing order");

        let mut tx = self.pool.begin().await?;

        let coupon = match cart.coupon() {
            Some(applied) => {
                Some(claim_for_checkout(&mut *tx, &applied.code, items_price, now).await?)
            }
            None => None,
        };

        let breakdown = calculate_cart_breakdown(items_price, coupon.as_ref(), config);

        let order = Order {
            id: order_id,
            order_number,
            items_price_cents: breakdown.items_price.cents(),
            shipping_price_cents: breakdown.shipping_price.cents(),
            tax_price_cents: breakdown.tax_price.cents(),
            discount_cents: breakdown.discount_amount.cents(),
            total_price_cents: breakdown.total_price.cents(),
            coupon_code: breakdown.coupon_code,
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number,
                items_price_cents, shipping_price_cents, tax_price_cents,
                discount_cents, total_price_cents,
                coupon_code, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&order.id)
        .bind(&order.order_number)
        .bind(order.items_price_cents)
        .bind(order.shipping_price_cents)
        .bind(order.tax_price_cents)
        .bind(order.discount_cents)
        .bind(order.total_price_cents)
        .bind(&order.coupon_code)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        // Snapshot pattern: name and price are frozen on the line
        for line in cart.items() {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, product_id, name_snapshot,
                    unit_price_cents, quantity, line_total_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&order.id)
            .bind(&line.product_id)
            .bind(&line.name)
            .bind(line.unit_price.cents())
            .bind(line.quantity)
            .bind(line.line_total().cents())
            .execute(&mut *tx)
            .await?;
        }

        if let Some(coupon) = &coupon {
            record_redemption_in(&mut *tx, coupon, &order.id, now).await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            order_number = %order.order_number,
            total = %order.total_price(),
            discount = %order.discount(),
            coupon = ?order.coupon_code,
            "Order placed"
        );

        Ok(order)
    }

    /// Gets an order by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT
                id, order_number,
                items_price_cents, shipping_price_cents, tax_price_cents,
                discount_cents, total_price_cents,
                coupon_code, created_at
            FROM orders
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// Gets all lines of an order, in cart order.
    pub async fn get_items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT
                id, order_id, product_id, name_snapshot,
                unit_price_cents, quantity, line_total_cents
            FROM order_items
            WHERE order_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Number of placed orders.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Claims one use of `code` and re-checks the stored coupon at `now`.
///
/// The claim runs first so the transaction takes the write lock before it
/// reads. When no use is left, an expired coupon still reports `Expired`,
/// matching the rejection order of `validate`.
async fn claim_for_checkout(
    conn: &mut SqliteConnection,
    code: &str,
    subtotal: Money,
    now: DateTime<Utc>,
) -> DbResult<Coupon> {
    let stored = match claim_in(&mut *conn, code).await {
        Ok(stored) => stored,
        Err(DbError::NotFound { .. }) => return Err(CouponRejection::InvalidCode.into()),
        Err(exhausted @ DbError::CouponExhausted { .. }) => {
            return match fetch_by_code(&mut *conn, code).await? {
                Some(stored) if !stored.is_active_at(now) => Err(CouponRejection::Expired.into()),
                _ => Err(exhausted),
            };
        }
        Err(other) => return Err(other),
    };

    stored.check_eligibility(subtotal, now)?;
    Ok(stored)
}

/// Generates an order number in format: SF-YYYYMMDD-XXXXXXXX
///
/// The suffix is the first 8 hex digits of the order's UUID.
fn generate_order_number(id: &Uuid, now: DateTime<Utc>) -> String {
    let hex = id.simple().to_string().to_ascii_uppercase();
    let suffix = hex.get(..8).unwrap_or(&hex);
    format!("SF-{}-{}", now.format("%Y%m%d"), suffix)
}

// =============================================================================
// Unit Tests
// =============================================================================

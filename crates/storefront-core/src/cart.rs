//! # Cart
//!
//! Line items plus at most one applied coupon. The price breakdown is never
//! stored: it is recomputed from the lines and coupon on every read.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Shopper Action           Cart Method              State Change         │
//! │  ──────────────           ───────────              ────────────         │
//! │                                                                         │
//! │  Add to cart ───────────► add_item() ────────────► push / qty += n     │
//! │  Change quantity ───────► update_quantity() ─────► qty = n (0 removes) │
//! │  Remove line ───────────► remove_item() ─────────► retain              │
//! │  Enter coupon ──────────► apply_coupon() ────────► coupon = Some       │
//! │  Remove coupon ─────────► remove_coupon() ───────► coupon = None       │
//! │  View cart ─────────────► price_breakdown() ─────► (read only)         │
//! │                                                                         │
//! │  After every line change the coupon's minimum purchase is re-checked;   │
//! │  a coupon the new subtotal no longer qualifies for is detached.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::CouponCatalog;
use crate::coupon::{validate_coupon, Coupon, CouponRejection};
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::pricing::{calculate_cart_breakdown, CartPriceBreakdown};
use crate::types::PricingConfig;
use crate::validation::{
    validate_cart_size, validate_price, validate_product_name, validate_quantity,
};
use crate::MAX_ITEM_QUANTITY;

/// A line in the cart.
///
/// The unit price is frozen when the line is added, so the cart keeps
/// showing the price the shopper saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: i64,
}

impl CartItem {
    pub fn new(
        product_id: impl Into<String>,
        name: impl Into<String>,
        unit_price: Money,
        quantity: i64,
    ) -> Self {
        CartItem {
            product_id: product_id.into(),
            name: name.into(),
            unit_price,
            quantity,
        }
    }

    /// Unit price × quantity.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

/// The shopping cart.
///
/// ## Invariants
/// - Lines are unique by `product_id` (re-adding increases quantity)
/// - Quantity is 1..=999
/// - At most 100 lines
/// - An attached coupon always meets its minimum purchase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    items: Vec<CartItem>,
    coupon: Option<Coupon>,
}

impl Cart {
    pub fn new() -> Self {
        Cart::default()
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn coupon(&self) -> Option<&Coupon> {
        self.coupon.as_ref()
    }

    /// Adds a product or increases the quantity of an existing line.
    pub fn add_item(&mut self, item: CartItem) -> CoreResult<()> {
        validate_quantity(item.quantity)?;
        validate_price(item.unit_price)?;
        validate_product_name(&item.name)?;

        if let Some(line) = self
            .items
            .iter_mut()
            .find(|line| line.product_id == item.product_id)
        {
            let new_qty = line.quantity + item.quantity;
            if new_qty > MAX_ITEM_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: new_qty,
                    max: MAX_ITEM_QUANTITY,
                });
            }
            line.quantity = new_qty;
        } else {
            validate_cart_size(self.items.len()).map_err(|_| CoreError::CartTooLarge {
                max: crate::MAX_CART_ITEMS,
            })?;
            self.items.push(item);
        }

        self.drop_ineligible_coupon();
        Ok(())
    }

    /// Sets a line's quantity. Zero removes the line.
    pub fn update_quantity(&mut self, product_id: &str, quantity: i64) -> CoreResult<()> {
        if quantity == 0 {
            return self.remove_item(product_id);
        }

        if quantity > MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: quantity,
                max: MAX_ITEM_QUANTITY,
            });
        }
        validate_quantity(quantity)?;

        let line = self
            .items
            .iter_mut()
            .find(|line| line.product_id == product_id)
            .ok_or_else(|| CoreError::ItemNotInCart(product_id.to_string()))?;
        line.quantity = quantity;

        self.drop_ineligible_coupon();
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: &str) -> CoreResult<()> {
        let initial_len = self.items.len();
        self.items.retain(|line| line.product_id != product_id);

        if self.items.len() == initial_len {
            return Err(CoreError::ItemNotInCart(product_id.to_string()));
        }

        self.drop_ineligible_coupon();
        Ok(())
    }

    /// Empties the cart and detaches any coupon.
    pub fn clear(&mut self) {
        self.items.clear();
        self.coupon = None;
    }

    /// Validates `code` against `catalog` for the current subtotal and
    /// attaches it on success, replacing any previous coupon.
    ///
    /// On rejection the cart is left unchanged.
    pub fn apply_coupon<C>(
        &mut self,
        catalog: &C,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<&Coupon, CouponRejection>
    where
        C: CouponCatalog + ?Sized,
    {
        let coupon = validate_coupon(catalog, code, self.items_price(), now)?;
        let applied = self.coupon.insert(coupon);
        Ok(&*applied)
    }

    /// Attaches a coupon that was looked up elsewhere (e.g. the coupon
    /// store), re-running the eligibility checks against this cart.
    pub fn attach_coupon(
        &mut self,
        coupon: Coupon,
        now: DateTime<Utc>,
    ) -> Result<(), CouponRejection> {
        coupon.check_eligibility(self.items_price(), now)?;
        self.coupon = Some(coupon);
        Ok(())
    }

    pub fn remove_coupon(&mut self) -> Option<Coupon> {
        self.coupon.take()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|line| line.quantity).sum()
    }

    /// Sum of line totals before shipping, tax or discount.
    pub fn items_price(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Recomputes the full breakdown for the cart as it is now.
    pub fn price_breakdown(&self, config: &PricingConfig) -> CartPriceBreakdown {
        calculate_cart_breakdown(self.items_price(), self.coupon.as_ref(), config)
    }

    fn drop_ineligible_coupon(&mut self) {
        let subtotal = self.items_price();
        if self
            .coupon
            .as_ref()
            .is_some_and(|coupon| subtotal < coupon.min_purchase())
        {
            self.coupon = None;
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::coupon::tests::{fixed_coupon, percentage_coupon, test_now};
    use crate::error::ValidationError;

    fn shirt(qty: i64) -> CartItem {
        CartItem::new("prod-shirt", "Linen Shirt", Money::from_major(40), qty)
    }

    fn mug(qty: i64) -> CartItem {
        CartItem::new("prod-mug", "Stoneware Mug", Money::from_cents(1250), qty)
    }

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new(vec![
            percentage_coupon("SAVE20", 2000, Some(5000), 10_000),
            fixed_coupon("FLAT5", 500, 0),
        ])
    }

    #[test]
    fn test_add_merges_same_product() {
        let mut cart = Cart::new();
        cart.add_item(shirt(1)).unwrap();
        cart.add_item(shirt(2)).unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total_quantity(), 3);
        assert_eq!(cart.items_price(), Money::from_major(120));
    }

    #[test]
    fn test_add_rejects_quantity_overflow() {
        let mut cart = Cart::new();
        cart.add_item(shirt(990)).unwrap();
        let err = cart.add_item(shirt(10)).unwrap_err();
        assert!(matches!(err, CoreError::QuantityTooLarge { requested: 1000, .. }));
    }

    #[test]
    fn test_add_rejects_invalid_lines() {
        let mut cart = Cart::new();
        assert!(cart.add_item(shirt(0)).is_err());
        assert!(cart
            .add_item(CartItem::new("p", "Broken", Money::from_cents(-1), 1))
            .is_err());
        assert!(cart.is_empty());
    }

    #[test]
    fn test_add_rejects_price_that_would_overflow() {
        let mut cart = Cart::new();
        let huge: Money = "92233720368547758".parse().unwrap();

        let err = cart.add_item(CartItem::new("p", "Big", huge, 2)).unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::OutOfRange { .. })));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_full_cart_at_price_ceiling_sums_without_overflow() {
        let mut cart = Cart::new();
        let top = Money::from_cents(crate::MAX_AMOUNT_CENTS);
        for i in 0..crate::MAX_CART_ITEMS {
            cart.add_item(CartItem::new(format!("p{i}"), "Item", top, MAX_ITEM_QUANTITY))
                .unwrap();
        }

        let expected = crate::MAX_AMOUNT_CENTS * MAX_ITEM_QUANTITY * crate::MAX_CART_ITEMS as i64;
        assert_eq!(cart.items_price(), Money::from_cents(expected));
        assert!(cart.price_breakdown(&PricingConfig::default()).total_price.is_positive());
    }

    #[test]
    fn test_cart_size_limit() {
        let mut cart = Cart::new();
        for i in 0..crate::MAX_CART_ITEMS {
            cart.add_item(CartItem::new(format!("p{i}"), "Item", Money::from_cents(100), 1))
                .unwrap();
        }
        let err = cart
            .add_item(CartItem::new("one-more", "Item", Money::from_cents(100), 1))
            .unwrap_err();
        assert!(matches!(err, CoreError::CartTooLarge { .. }));
    }

    #[test]
    fn test_update_and_remove() {
        let mut cart = Cart::new();
        cart.add_item(shirt(1)).unwrap();
        cart.add_item(mug(2)).unwrap();

        cart.update_quantity("prod-mug", 4).unwrap();
        assert_eq!(cart.items_price(), Money::from_major(90));

        cart.update_quantity("prod-mug", 0).unwrap();
        assert_eq!(cart.item_count(), 1);

        assert!(matches!(
            cart.remove_item("prod-mug"),
            Err(CoreError::ItemNotInCart(_))
        ));
    }

    #[test]
    fn test_apply_coupon_and_breakdown() {
        let mut cart = Cart::new();
        cart.add_item(shirt(4)).unwrap(); // $160

        let coupon = cart.apply_coupon(&catalog(), "save20", test_now()).unwrap();
        assert_eq!(coupon.code, "SAVE20");

        let breakdown = cart.price_breakdown(&PricingConfig::default());
        assert_eq!(breakdown.items_price, Money::from_major(160));
        assert!(breakdown.shipping_price.is_zero());
        assert_eq!(breakdown.tax_price, Money::from_major(16));
        assert_eq!(breakdown.discount_amount, Money::from_major(32));
        assert_eq!(breakdown.total_price, Money::from_major(144));
    }

    #[test]
    fn test_rejected_coupon_leaves_cart_unchanged() {
        let mut cart = Cart::new();
        cart.add_item(shirt(1)).unwrap();
        cart.apply_coupon(&catalog(), "FLAT5", test_now()).unwrap();

        let err = cart.apply_coupon(&catalog(), "SAVE20", test_now()).unwrap_err();
        assert_eq!(err.to_string(), "Minimum purchase of 100 required");
        assert_eq!(cart.coupon().map(|c| c.code.as_str()), Some("FLAT5"));
    }

    #[test]
    fn test_coupon_dropped_when_subtotal_falls_below_minimum() {
        let mut cart = Cart::new();
        cart.add_item(shirt(3)).unwrap(); // $120
        cart.apply_coupon(&catalog(), "SAVE20", test_now()).unwrap();

        cart.update_quantity("prod-shirt", 2).unwrap(); // $80
        assert!(cart.coupon().is_none());

        let breakdown = cart.price_breakdown(&PricingConfig::default());
        assert!(breakdown.discount_amount.is_zero());
        assert_eq!(breakdown.coupon_code, None);
    }

    #[test]
    fn test_attach_coupon_rechecks_eligibility() {
        let mut cart = Cart::new();
        cart.add_item(mug(1)).unwrap();

        let coupon = percentage_coupon("SAVE20", 2000, Some(5000), 10_000);
        assert!(cart.attach_coupon(coupon, test_now()).is_err());
        assert!(cart.coupon().is_none());

        assert!(cart.attach_coupon(fixed_coupon("FLAT5", 500, 0), test_now()).is_ok());
        assert!(cart.remove_coupon().is_some());
        assert!(cart.coupon().is_none());
    }

    #[test]
    fn test_clear_detaches_coupon() {
        let mut cart = Cart::new();
        cart.add_item(shirt(1)).unwrap();
        cart.apply_coupon(&catalog(), "FLAT5", test_now()).unwrap();

        cart.clear();
        assert!(cart.is_empty());
        assert!(cart.coupon().is_none());
    }
}

//! Subcommand implementations.

use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};
use storefront_core::catalog::default_coupons;
use storefront_core::validation::validate_subtotal;
use storefront_core::{
    calculate_cart_breakdown, calculate_cart_prices, Cart, CartItem, CartPriceBreakdown, Coupon,
    CouponCheck, Money, PricingConfig,
};
use storefront_db::{Database, DbError};
use tracing::{info, warn};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Insert the launch coupons (existing codes are skipped)
    Seed,

    /// Show shipping, tax and total for an items subtotal
    Price(PriceArgs),

    /// Check whether a coupon applies to a subtotal
    Validate(ValidateArgs),

    /// List stored coupons
    Coupons(CouponsArgs),

    /// Place an order
    Checkout(CheckoutArgs),
}

#[derive(Debug, Args)]
pub struct PriceArgs {
    /// Items subtotal, e.g. 49.99
    amount: Money,

    /// Coupon to apply to the breakdown
    #[arg(long)]
    coupon: Option<String>,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    code: String,

    /// Items subtotal, e.g. 150
    subtotal: Money,
}

#[derive(Debug, Args)]
pub struct CouponsArgs {
    #[arg(long, default_value_t = 50)]
    limit: u32,
}

#[derive(Debug, Args)]
pub struct CheckoutArgs {
    /// Cart line as name:price:qty (repeatable)
    #[arg(long = "item", required = true)]
    items: Vec<ItemSpec>,

    #[arg(long)]
    coupon: Option<String>,
}

/// A cart line given on the command line as `name:price:qty`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSpec {
    pub name: String,
    pub unit_price: Money,
    pub quantity: i64,
}

impl FromStr for ItemSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Split from the right so names may contain ':'
        let mut parts = s.rsplitn(3, ':');
        let (Some(qty), Some(price), Some(name)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("expected name:price:qty, got '{s}'"));
        };

        let unit_price = price
            .parse::<Money>()
            .map_err(|e| format!("bad price '{price}': {e}"))?;
        let quantity = qty
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("bad quantity '{qty}'"))?;

        Ok(ItemSpec {
            name: name.trim().to_string(),
            unit_price,
            quantity,
        })
    }
}

impl ItemSpec {
    fn product_id(&self) -> String {
        self.name
            .to_ascii_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
    }
}

pub async fn run(command: Command, db: &Database, pricing: &PricingConfig) -> Result<()> {
    match command {
        Command::Seed => seed(db).await,
        Command::Price(args) => price(args, db, pricing).await,
        Command::Validate(args) => validate(args, db).await,
        Command::Coupons(args) => list_coupons(args, db).await,
        Command::Checkout(args) => checkout(args, db, pricing).await,
    }
}

async fn seed(db: &Database) -> Result<()> {
    let mut inserted = 0;

    for coupon in default_coupons() {
        match db.coupons().insert(&coupon).await {
            Ok(stored) => {
                info!(code = %stored.code, "Seeded coupon");
                inserted += 1;
            }
            Err(DbError::UniqueViolation { .. }) => {
                warn!(code = %coupon.code, "Coupon already exists, skipping");
            }
            Err(e) => return Err(e).context("failed to seed coupons"),
        }
    }

    println!("seeded {inserted} coupon(s)");
    Ok(())
}

async fn price(args: PriceArgs, db: &Database, pricing: &PricingConfig) -> Result<()> {
    validate_subtotal(args.amount)?;

    let Some(code) = args.coupon else {
        let prices = calculate_cart_prices(args.amount, pricing);
        println!("items:    {}", prices.items_price);
        println!("shipping: {}", prices.shipping_price);
        println!("tax:      {}", prices.tax_price);
        println!("total:    {}", prices.total_price);
        return Ok(());
    };

    let coupon = match db.coupons().validate(&code, args.amount, Utc::now()).await? {
        Ok(coupon) => Some(coupon),
        Err(rejection) => {
            println!("coupon not applied: {rejection}");
            None
        }
    };

    print_breakdown(&calculate_cart_breakdown(args.amount, coupon.as_ref(), pricing));
    Ok(())
}

async fn validate(args: ValidateArgs, db: &Database) -> Result<()> {
    validate_subtotal(args.subtotal)?;

    let outcome = db
        .coupons()
        .validate(&args.code, args.subtotal, Utc::now())
        .await?;
    let check = CouponCheck::from(outcome);

    println!("{}", serde_json::to_string_pretty(&check)?);
    Ok(())
}

async fn list_coupons(args: CouponsArgs, db: &Database) -> Result<()> {
    let coupons = db.coupons().list(args.limit).await?;

    if coupons.is_empty() {
        println!("no coupons found; run `storefront seed` first");
        return Ok(());
    }

    for coupon in coupons {
        println!(
            "{:<12} {:<40} min {:<8} until {}  {}",
            coupon.code,
            coupon.description,
            coupon.min_purchase().to_plain_string(),
            coupon.valid_until.format("%Y-%m-%d"),
            usage_summary(&coupon)
        );
    }

    Ok(())
}

/// Builds a cart from `--item` lines.
///
/// Lines naming the same product merge their quantities; a second price for
/// the same product is an error.
fn build_cart(items: &[ItemSpec]) -> Result<Cart> {
    let mut cart = Cart::new();

    for item in items {
        let product_id = item.product_id();
        if let Some(line) = cart.items().iter().find(|l| l.product_id == product_id) {
            if line.unit_price != item.unit_price {
                bail!(
                    "'{}' is listed at both {} and {}",
                    item.name,
                    line.unit_price,
                    item.unit_price
                );
            }
        }

        cart.add_item(CartItem::new(
            product_id,
            item.name.clone(),
            item.unit_price,
            item.quantity,
        ))
        .with_context(|| format!("cannot add '{}'", item.name))?;
    }

    Ok(cart)
}

fn usage_summary(coupon: &Coupon) -> String {
    match coupon.remaining_uses() {
        Some(left) => format!("{} used, {left} left", coupon.used_count),
        None => format!("{} used", coupon.used_count),
    }
}

async fn checkout(args: CheckoutArgs, db: &Database, pricing: &PricingConfig) -> Result<()> {
    let now = Utc::now();
    let mut cart = build_cart(&args.items)?;

    if let Some(code) = &args.coupon {
        match db.coupons().validate(code, cart.items_price(), now).await? {
            Ok(coupon) => cart.attach_coupon(coupon, now)?,
            Err(rejection) => bail!("coupon {code} not applied: {rejection}"),
        }
    }

    print_breakdown(&cart.price_breakdown(pricing));

    let order = db.orders().place_order(&cart, pricing, now).await?;
    println!("order:    {}", order.order_number);
    println!("{}", serde_json::to_string_pretty(&order)?);

    Ok(())
}

fn print_breakdown(breakdown: &CartPriceBreakdown) {
    println!("items:    {}", breakdown.items_price);
    println!("shipping: {}", breakdown.shipping_price);
    println!("tax:      {}", breakdown.tax_price);
    if let Some(code) = &breakdown.coupon_code {
        println!("discount: -{} ({code})", breakdown.discount_amount);
    }
    println!("total:    {}", breakdown.total_price);
}

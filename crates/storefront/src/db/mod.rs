//! Persistence for the storefront.
//!
//! # Database: `boutique`
//!
//! All tables live in the `shop` schema:
//!
//! - `category`, `product` - Catalog and stock
//! - `cart`, `cart_item` - Carts owned by a user or a session key
//! - `coupon`, `coupon_category`, `coupon_product` - Discount codes and their restrictions
//! - `coupon_redemption` - Single-use coupons consumed per user
//! - `customer_order`, `order_item` - Committed orders with frozen prices
//! - `product_review` - One review per (user, product)
//! - `favorite` - Favorite products per user
//!
//! # Backends
//!
//! Services only see the [`Store`] and [`StoreTx`] traits. [`PgStore`] runs
//! every transaction on `PostgreSQL` with row locks; [`MemoryStore`] keeps
//! everything in process and is used by tests.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p boutique-cli -- migrate
//! ```

use std::time::Duration;

use async_trait::async_trait;
use boutique_core::cart::CartLine;
use boutique_core::coupon::Coupon;
use boutique_core::{
    CartId, CategoryId, CouponId, Money, OrderId, OrderStatus, ProductId, ReviewId, UserId,
};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use crate::models::{
    Cart, CartOwner, Category, Favorite, NewCategory, NewOrder, NewProduct, Order, OrderItem,
    Product, RatingSummary, Review, ReviewDraft,
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate slug).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// A transactional data store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Start a transaction. Nothing it writes is visible to others until
    /// [`StoreTx::commit`].
    async fn begin(&self) -> Result<Box<dyn StoreTx>, RepositoryError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Operations available inside a transaction.
///
/// Methods named `lock_*` take a row lock held until the transaction ends.
/// Guarded updates return `false` when their condition did not hold and
/// nothing was written.
#[async_trait]
pub trait StoreTx: Send {
    // ---- catalog ----------------------------------------------------------

    async fn upsert_category(&mut self, category: &NewCategory)
    -> Result<Category, RepositoryError>;

    async fn upsert_product(&mut self, product: &NewProduct) -> Result<Product, RepositoryError>;

    async fn category_by_slug(&mut self, slug: &str)
    -> Result<Option<Category>, RepositoryError>;

    /// Available products, newest first, optionally restricted to one
    /// category.
    async fn available_products(
        &mut self,
        category: Option<CategoryId>,
    ) -> Result<Vec<Product>, RepositoryError>;

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// `stock -= quantity` only if `stock >= quantity`; marks the product
    /// unavailable when stock reaches zero.
    async fn decrement_stock(
        &mut self,
        id: ProductId,
        quantity: i32,
    ) -> Result<bool, RepositoryError>;

    /// `stock += quantity`; makes the product available again if it had run out.
    async fn restock(&mut self, id: ProductId, quantity: i32) -> Result<(), RepositoryError>;

    // ---- carts ------------------------------------------------------------

    async fn cart_for_owner(
        &mut self,
        owner: &CartOwner,
        now: DateTime<Utc>,
    ) -> Result<Cart, RepositoryError>;

    async fn cart(&mut self, id: CartId) -> Result<Option<Cart>, RepositoryError>;

    /// The owner's cart, without creating one.
    async fn find_cart(&mut self, owner: &CartOwner) -> Result<Option<Cart>, RepositoryError>;

    /// Delete a cart and its lines.
    async fn delete_cart(&mut self, id: CartId) -> Result<(), RepositoryError>;

    /// Cart lines joined with the current product price and category,
    /// ordered by product id.
    async fn cart_lines(&mut self, id: CartId) -> Result<Vec<CartLine>, RepositoryError>;

    async fn cart_quantity(
        &mut self,
        cart: CartId,
        product: ProductId,
    ) -> Result<Option<i32>, RepositoryError>;

    /// Insert or replace the quantity of a line.
    async fn set_cart_quantity(
        &mut self,
        cart: CartId,
        product: ProductId,
        quantity: i32,
    ) -> Result<(), RepositoryError>;

    async fn remove_cart_item(
        &mut self,
        cart: CartId,
        product: ProductId,
    ) -> Result<bool, RepositoryError>;

    async fn clear_cart(&mut self, cart: CartId) -> Result<(), RepositoryError>;

    // ---- coupons ----------------------------------------------------------

    /// Insert or replace a coupon by its canonical code. `id` is ignored;
    /// `used_count` is only taken on insert.
    async fn upsert_coupon(&mut self, coupon: &Coupon) -> Result<Coupon, RepositoryError>;

    /// Look up a coupon by its canonical code.
    async fn coupon_by_code(&mut self, code: &str) -> Result<Option<Coupon>, RepositoryError>;

    async fn lock_coupon_by_code(&mut self, code: &str)
    -> Result<Option<Coupon>, RepositoryError>;

    async fn coupon(&mut self, id: CouponId) -> Result<Option<Coupon>, RepositoryError>;

    async fn has_redeemed(
        &mut self,
        coupon: CouponId,
        user: UserId,
    ) -> Result<bool, RepositoryError>;

    /// `used_count += 1` only while under `max_usage` (or unlimited).
    async fn increment_coupon_usage(&mut self, coupon: CouponId) -> Result<bool, RepositoryError>;

    /// `used_count -= 1`, never below zero.
    async fn release_coupon_usage(&mut self, coupon: CouponId) -> Result<(), RepositoryError>;

    /// Record a single-use redemption; `false` if the user already has one.
    async fn record_redemption(
        &mut self,
        coupon: CouponId,
        user: UserId,
        order: OrderId,
    ) -> Result<bool, RepositoryError>;

    async fn delete_redemption(
        &mut self,
        coupon: CouponId,
        user: UserId,
    ) -> Result<(), RepositoryError>;

    // ---- orders -----------------------------------------------------------

    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, RepositoryError>;

    async fn insert_order_item(
        &mut self,
        order: OrderId,
        product: ProductId,
        price: Money,
        quantity: i32,
    ) -> Result<OrderItem, RepositoryError>;

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Orders placed by the user, newest first.
    async fn orders_for_user(&mut self, user: UserId) -> Result<Vec<Order>, RepositoryError>;

    async fn order_items(&mut self, order: OrderId) -> Result<Vec<OrderItem>, RepositoryError>;

    async fn set_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<(), RepositoryError>;

    /// Whether the user has a non-cancelled order containing the product.
    async fn has_purchased(
        &mut self,
        user: UserId,
        product: ProductId,
    ) -> Result<bool, RepositoryError>;

    // ---- reviews ----------------------------------------------------------

    /// Serialize the review submissions of one user until the transaction
    /// ends, so the rate limit counts cannot be raced.
    async fn lock_reviewer(&mut self, user: UserId) -> Result<(), RepositoryError>;

    async fn review(&mut self, id: ReviewId) -> Result<Option<Review>, RepositoryError>;

    async fn count_reviews_by(&mut self, user: UserId) -> Result<u32, RepositoryError>;

    async fn count_reviews_since(
        &mut self,
        user: UserId,
        since: DateTime<Utc>,
    ) -> Result<u32, RepositoryError>;

    /// Insert the review, or overwrite the existing one of the same
    /// (user, product) pair.
    async fn upsert_review(
        &mut self,
        draft: &ReviewDraft,
        now: DateTime<Utc>,
    ) -> Result<Review, RepositoryError>;

    /// Persist moderation fields (`approved`, `reported`, `report_reason`,
    /// `moderator_notes`) of an existing review.
    async fn update_review_moderation(
        &mut self,
        review: &Review,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn delete_review(&mut self, id: ReviewId) -> Result<bool, RepositoryError>;

    async fn rating_summary(&mut self, product: ProductId)
    -> Result<RatingSummary, RepositoryError>;

    // ---- favorites --------------------------------------------------------

    /// Add the favorite if absent, remove it otherwise. Returns whether the
    /// product is now a favorite.
    async fn toggle_favorite(
        &mut self,
        user: UserId,
        product: ProductId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn favorites(&mut self, user: UserId) -> Result<Vec<Favorite>, RepositoryError>;

    // ---- lifecycle --------------------------------------------------------

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// Commit `tx` if `result` is `Ok`, roll it back otherwise.
///
/// A failed rollback is logged; the original error is returned.
///
/// # Errors
///
/// Returns the error of `result`, or the commit failure.
pub async fn finish<T, E>(tx: Box<dyn StoreTx>, result: Result<T, E>) -> Result<T, E>
where
    E: From<RepositoryError>,
{
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(error = %rollback_err, "Transaction rollback failed");
            }
            Err(err)
        }
    }
}

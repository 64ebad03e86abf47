//! `PostgreSQL` store.
//!
//! Every [`StoreTx`] wraps one database transaction. Locks are taken with
//! `SELECT ... FOR UPDATE`; stock and coupon usage use guarded `UPDATE`s so
//! a lost race shows up as zero affected rows instead of a bad value.

use std::collections::BTreeSet;

use async_trait::async_trait;
use boutique_core::cart::CartLine;
use boutique_core::checkout::ShippingInfo;
use boutique_core::coupon::{Coupon, CouponScope};
use boutique_core::{
    CartId, CategoryId, CouponId, DiscountType, Money, OrderId, OrderItemId, OrderStatus,
    ProductId, ReviewId, UserId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use super::{RepositoryError, Store, StoreTx};
use crate::models::{
    Cart, CartOwner, Category, Favorite, NewCategory, NewOrder, NewProduct, Order, OrderItem,
    Product, RatingSummary, Review, ReviewDraft,
};

/// Store backed by a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, RepositoryError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// A running `PostgreSQL` transaction.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

// =============================================================================
// Internal Row Types
// =============================================================================

const PRODUCT_COLUMNS: &str = "id, category_id, name, slug, price, stock, available";

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    id: i32,
    name: String,
    slug: String,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: CategoryId::new(row.id),
            name: row.name,
            slug: row.slug,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i32,
    category_id: i32,
    name: String,
    slug: String,
    price: Decimal,
    stock: i32,
    available: bool,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId::new(row.id),
            category_id: CategoryId::new(row.category_id),
            name: row.name,
            slug: row.slug,
            price: Money::new(row.price),
            stock: row.stock,
            available: row.available,
        }
    }
}

const CART_COLUMNS: &str = "id, user_id, session_key, created_at";

#[derive(Debug, sqlx::FromRow)]
struct CartRow {
    id: i32,
    user_id: Option<i32>,
    session_key: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CartRow> for Cart {
    type Error = RepositoryError;

    fn try_from(row: CartRow) -> Result<Self, Self::Error> {
        let owner = match (row.user_id, row.session_key) {
            (Some(user), None) => CartOwner::User(UserId::new(user)),
            (None, Some(key)) => CartOwner::Session(key),
            _ => {
                return Err(RepositoryError::DataCorruption(format!(
                    "cart {} must have exactly one owner",
                    row.id
                )));
            }
        };

        Ok(Self {
            id: CartId::new(row.id),
            owner,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    product_id: i32,
    category_id: i32,
    quantity: i32,
    price: Decimal,
}

impl From<CartLineRow> for CartLine {
    fn from(row: CartLineRow) -> Self {
        Self {
            product_id: ProductId::new(row.product_id),
            category_id: CategoryId::new(row.category_id),
            quantity: row.quantity,
            unit_price: Money::new(row.price),
        }
    }
}

const COUPON_COLUMNS: &str = "id, code, description, discount_type, discount_value, \
     minimum_amount, valid_from, valid_to, max_usage, used_count, active, single_use_per_user";

#[derive(Debug, sqlx::FromRow)]
struct CouponRow {
    id: i32,
    code: String,
    description: String,
    discount_type: String,
    discount_value: Decimal,
    minimum_amount: Decimal,
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
    max_usage: i32,
    used_count: i32,
    active: bool,
    single_use_per_user: bool,
}

impl CouponRow {
    fn into_coupon(self, scope: CouponScope) -> Result<Coupon, RepositoryError> {
        let discount_type = self.discount_type.parse::<DiscountType>().map_err(|e| {
            RepositoryError::DataCorruption(format!("coupon {}: {e}", self.code))
        })?;

        Ok(Coupon {
            id: CouponId::new(self.id),
            code: self.code,
            description: self.description,
            discount_type,
            discount_value: self.discount_value,
            minimum_amount: Money::new(self.minimum_amount),
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            max_usage: self.max_usage,
            used_count: self.used_count,
            active: self.active,
            single_use_per_user: self.single_use_per_user,
            scope,
        })
    }
}

const ORDER_COLUMNS: &str = "id, user_id, first_name, last_name, email, address, postal_code, \
     city, subtotal, discount_amount, shipping_cost, total, coupon_id, status, paid, created_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    user_id: Option<i32>,
    first_name: String,
    last_name: String,
    email: String,
    address: String,
    postal_code: String,
    city: String,
    subtotal: Decimal,
    discount_amount: Decimal,
    shipping_cost: Decimal,
    total: Decimal,
    coupon_id: Option<i32>,
    status: String,
    paid: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<OrderStatus>()
            .map_err(|e| RepositoryError::DataCorruption(format!("order {}: {e}", row.id)))?;

        Ok(Self {
            id: OrderId::new(row.id),
            user_id: row.user_id.map(UserId::new),
            shipping: ShippingInfo {
                first_name: row.first_name,
                last_name: row.last_name,
                email: row.email,
                address: row.address,
                postal_code: row.postal_code,
                city: row.city,
            },
            subtotal: Money::new(row.subtotal),
            discount_amount: Money::new(row.discount_amount),
            shipping_cost: Money::new(row.shipping_cost),
            total: Money::new(row.total),
            coupon_id: row.coupon_id.map(CouponId::new),
            status,
            paid: row.paid,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: i32,
    order_id: i32,
    product_id: i32,
    price: Decimal,
    quantity: i32,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: OrderItemId::new(row.id),
            order_id: OrderId::new(row.order_id),
            product_id: ProductId::new(row.product_id),
            price: Money::new(row.price),
            quantity: row.quantity,
        }
    }
}

const REVIEW_COLUMNS: &str = "id, user_id, product_id, rating, title, comment, approved, \
     reported, report_reason, moderator_notes, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    id: i32,
    user_id: i32,
    product_id: i32,
    rating: i16,
    title: String,
    comment: String,
    approved: bool,
    reported: bool,
    report_reason: Option<String>,
    moderator_notes: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = RepositoryError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let rating = u8::try_from(row.rating).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "review {} has invalid rating {}",
                row.id, row.rating
            ))
        })?;

        Ok(Self {
            id: ReviewId::new(row.id),
            user_id: UserId::new(row.user_id),
            product_id: ProductId::new(row.product_id),
            rating,
            title: row.title,
            comment: row.comment,
            approved: row.approved,
            reported: row.reported,
            report_reason: row.report_reason,
            moderator_notes: row.moderator_notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RatingRow {
    rating_sum: i64,
    rating_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct FavoriteRow {
    user_id: i32,
    product_id: i32,
    created_at: DateTime<Utc>,
}

impl From<FavoriteRow> for Favorite {
    fn from(row: FavoriteRow) -> Self {
        Self {
            user_id: UserId::new(row.user_id),
            product_id: ProductId::new(row.product_id),
            created_at: row.created_at,
        }
    }
}

/// Map unique violations to `Conflict`, everything else to `Database`.
fn conflict_or_database(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}

fn count_to_u32(count: i64) -> Result<u32, RepositoryError> {
    u32::try_from(count)
        .map_err(|_| RepositoryError::DataCorruption(format!("count out of range: {count}")))
}

impl PgTx {
    async fn coupon_scope(&mut self, id: i32) -> Result<CouponScope, RepositoryError> {
        let categories = sqlx::query_scalar::<_, i32>(
            "SELECT category_id FROM shop.coupon_category WHERE coupon_id = $1",
        )
        .bind(id)
        .fetch_all(&mut *self.tx)
        .await?;

        let products = sqlx::query_scalar::<_, i32>(
            "SELECT product_id FROM shop.coupon_product WHERE coupon_id = $1",
        )
        .bind(id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(CouponScope {
            categories: categories.into_iter().map(CategoryId::new).collect(),
            products: products.into_iter().map(ProductId::new).collect(),
        })
    }

    async fn load_coupon(
        &mut self,
        row: Option<CouponRow>,
    ) -> Result<Option<Coupon>, RepositoryError> {
        match row {
            Some(row) => {
                let scope = self.coupon_scope(row.id).await?;
                row.into_coupon(scope).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn replace_coupon_scope(
        &mut self,
        id: i32,
        categories: &BTreeSet<CategoryId>,
        products: &BTreeSet<ProductId>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM shop.coupon_category WHERE coupon_id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("DELETE FROM shop.coupon_product WHERE coupon_id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        let category_ids: Vec<i32> = categories.iter().map(CategoryId::as_i32).collect();
        sqlx::query(
            "INSERT INTO shop.coupon_category (coupon_id, category_id)
             SELECT $1, UNNEST($2::INT[])",
        )
        .bind(id)
        .bind(&category_ids)
        .execute(&mut *self.tx)
        .await?;

        let product_ids: Vec<i32> = products.iter().map(ProductId::as_i32).collect();
        sqlx::query(
            "INSERT INTO shop.coupon_product (coupon_id, product_id)
             SELECT $1, UNNEST($2::INT[])",
        )
        .bind(id)
        .bind(&product_ids)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl StoreTx for PgTx {
    // ---- catalog ----------------------------------------------------------

    async fn upsert_category(
        &mut self,
        category: &NewCategory,
    ) -> Result<Category, RepositoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(
            r"
            INSERT INTO shop.category (name, slug)
            VALUES ($1, $2)
            ON CONFLICT (slug) DO UPDATE SET name = EXCLUDED.name
            RETURNING id, name, slug
            ",
        )
        .bind(&category.name)
        .bind(&category.slug)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.into())
    }

    async fn upsert_product(&mut self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            INSERT INTO shop.product (category_id, name, slug, price, stock, available)
            VALUES ($1, $2, $3, $4, $5, $5 > 0)
            ON CONFLICT (slug) DO UPDATE SET
                category_id = EXCLUDED.category_id,
                name = EXCLUDED.name,
                price = EXCLUDED.price,
                stock = EXCLUDED.stock,
                available = EXCLUDED.available
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(product.category_id)
        .bind(&product.name)
        .bind(&product.slug)
        .bind(product.price)
        .bind(product.stock)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| conflict_or_database(e, "product"))?;

        Ok(row.into())
    }

    async fn category_by_slug(
        &mut self,
        slug: &str,
    ) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, slug FROM shop.category WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Category::from))
    }

    async fn available_products(
        &mut self,
        category: Option<CategoryId>,
    ) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            SELECT {PRODUCT_COLUMNS}
            FROM shop.product
            WHERE available AND ($1::INTEGER IS NULL OR category_id = $1)
            ORDER BY id DESC
            "
        ))
        .bind(category)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM shop.product WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Product::from))
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM shop.product WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Product::from))
    }

    async fn decrement_stock(
        &mut self,
        id: ProductId,
        quantity: i32,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.product
            SET stock = stock - $2,
                available = available AND stock - $2 > 0
            WHERE id = $1 AND stock >= $2
            ",
        )
        .bind(id)
        .bind(quantity)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn restock(&mut self, id: ProductId, quantity: i32) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.product
            SET stock = stock + $2,
                available = available OR stock = 0
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(quantity)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    // ---- carts ------------------------------------------------------------

    async fn cart_for_owner(
        &mut self,
        owner: &CartOwner,
        now: DateTime<Utc>,
    ) -> Result<Cart, RepositoryError> {
        let row = match owner {
            CartOwner::User(user) => {
                sqlx::query_as::<_, CartRow>(&format!(
                    r"
                    INSERT INTO shop.cart (user_id, created_at)
                    VALUES ($1, $2)
                    ON CONFLICT (user_id) WHERE user_id IS NOT NULL
                    DO UPDATE SET user_id = EXCLUDED.user_id
                    RETURNING {CART_COLUMNS}
                    "
                ))
                .bind(*user)
                .bind(now)
                .fetch_one(&mut *self.tx)
                .await?
            }
            CartOwner::Session(key) => {
                sqlx::query_as::<_, CartRow>(&format!(
                    r"
                    INSERT INTO shop.cart (session_key, created_at)
                    VALUES ($1, $2)
                    ON CONFLICT (session_key) WHERE session_key IS NOT NULL
                    DO UPDATE SET session_key = EXCLUDED.session_key
                    RETURNING {CART_COLUMNS}
                    "
                ))
                .bind(key)
                .bind(now)
                .fetch_one(&mut *self.tx)
                .await?
            }
        };

        row.try_into()
    }

    async fn cart(&mut self, id: CartId) -> Result<Option<Cart>, RepositoryError> {
        let row = sqlx::query_as::<_, CartRow>(&format!(
            "SELECT {CART_COLUMNS} FROM shop.cart WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Cart::try_from).transpose()
    }

    async fn find_cart(&mut self, owner: &CartOwner) -> Result<Option<Cart>, RepositoryError> {
        let row = match owner {
            CartOwner::User(user) => {
                sqlx::query_as::<_, CartRow>(&format!(
                    "SELECT {CART_COLUMNS} FROM shop.cart WHERE user_id = $1"
                ))
                .bind(*user)
                .fetch_optional(&mut *self.tx)
                .await?
            }
            CartOwner::Session(key) => {
                sqlx::query_as::<_, CartRow>(&format!(
                    "SELECT {CART_COLUMNS} FROM shop.cart WHERE session_key = $1"
                ))
                .bind(key)
                .fetch_optional(&mut *self.tx)
                .await?
            }
        };

        row.map(Cart::try_from).transpose()
    }

    async fn delete_cart(&mut self, id: CartId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM shop.cart WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn cart_lines(&mut self, id: CartId) -> Result<Vec<CartLine>, RepositoryError> {
        let rows = sqlx::query_as::<_, CartLineRow>(
            r"
            SELECT ci.product_id, p.category_id, ci.quantity, p.price
            FROM shop.cart_item ci
            JOIN shop.product p ON p.id = ci.product_id
            WHERE ci.cart_id = $1
            ORDER BY ci.product_id
            ",
        )
        .bind(id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(CartLine::from).collect())
    }

    async fn cart_quantity(
        &mut self,
        cart: CartId,
        product: ProductId,
    ) -> Result<Option<i32>, RepositoryError> {
        let quantity = sqlx::query_scalar::<_, i32>(
            "SELECT quantity FROM shop.cart_item WHERE cart_id = $1 AND product_id = $2",
        )
        .bind(cart)
        .bind(product)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(quantity)
    }

    async fn set_cart_quantity(
        &mut self,
        cart: CartId,
        product: ProductId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO shop.cart_item (cart_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity
            ",
        )
        .bind(cart)
        .bind(product)
        .bind(quantity)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn remove_cart_item(
        &mut self,
        cart: CartId,
        product: ProductId,
    ) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM shop.cart_item WHERE cart_id = $1 AND product_id = $2")
                .bind(cart)
                .bind(product)
                .execute(&mut *self.tx)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_cart(&mut self, cart: CartId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM shop.cart_item WHERE cart_id = $1")
            .bind(cart)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    // ---- coupons ----------------------------------------------------------

    async fn upsert_coupon(&mut self, coupon: &Coupon) -> Result<Coupon, RepositoryError> {
        let id = sqlx::query_scalar::<_, i32>(
            r"
            INSERT INTO shop.coupon (
                code, description, discount_type, discount_value, minimum_amount,
                valid_from, valid_to, max_usage, used_count, active, single_use_per_user
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (code) DO UPDATE SET
                description = EXCLUDED.description,
                discount_type = EXCLUDED.discount_type,
                discount_value = EXCLUDED.discount_value,
                minimum_amount = EXCLUDED.minimum_amount,
                valid_from = EXCLUDED.valid_from,
                valid_to = EXCLUDED.valid_to,
                max_usage = EXCLUDED.max_usage,
                active = EXCLUDED.active,
                single_use_per_user = EXCLUDED.single_use_per_user
            RETURNING id
            ",
        )
        .bind(&coupon.code)
        .bind(&coupon.description)
        .bind(coupon.discount_type.as_str())
        .bind(coupon.discount_value)
        .bind(coupon.minimum_amount)
        .bind(coupon.valid_from)
        .bind(coupon.valid_to)
        .bind(coupon.max_usage)
        .bind(coupon.used_count)
        .bind(coupon.active)
        .bind(coupon.single_use_per_user)
        .fetch_one(&mut *self.tx)
        .await?;

        self.replace_coupon_scope(id, &coupon.scope.categories, &coupon.scope.products)
            .await?;

        self.coupon(CouponId::new(id))
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn coupon_by_code(&mut self, code: &str) -> Result<Option<Coupon>, RepositoryError> {
        let row = sqlx::query_as::<_, CouponRow>(&format!(
            "SELECT {COUPON_COLUMNS} FROM shop.coupon WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&mut *self.tx)
        .await?;

        self.load_coupon(row).await
    }

    async fn lock_coupon_by_code(
        &mut self,
        code: &str,
    ) -> Result<Option<Coupon>, RepositoryError> {
        let row = sqlx::query_as::<_, CouponRow>(&format!(
            "SELECT {COUPON_COLUMNS} FROM shop.coupon WHERE code = $1 FOR UPDATE"
        ))
        .bind(code)
        .fetch_optional(&mut *self.tx)
        .await?;

        self.load_coupon(row).await
    }

    async fn coupon(&mut self, id: CouponId) -> Result<Option<Coupon>, RepositoryError> {
        let row = sqlx::query_as::<_, CouponRow>(&format!(
            "SELECT {COUPON_COLUMNS} FROM shop.coupon WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        self.load_coupon(row).await
    }

    async fn has_redeemed(
        &mut self,
        coupon: CouponId,
        user: UserId,
    ) -> Result<bool, RepositoryError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r"
            SELECT EXISTS (
                SELECT 1 FROM shop.coupon_redemption
                WHERE coupon_id = $1 AND user_id = $2
            )
            ",
        )
        .bind(coupon)
        .bind(user)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(exists)
    }

    async fn increment_coupon_usage(&mut self, coupon: CouponId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.coupon
            SET used_count = used_count + 1
            WHERE id = $1 AND (max_usage = 0 OR used_count < max_usage)
            ",
        )
        .bind(coupon)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_coupon_usage(&mut self, coupon: CouponId) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE shop.coupon SET used_count = GREATEST(used_count - 1, 0) WHERE id = $1",
        )
        .bind(coupon)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn record_redemption(
        &mut self,
        coupon: CouponId,
        user: UserId,
        order: OrderId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            INSERT INTO shop.coupon_redemption (coupon_id, user_id, order_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (coupon_id, user_id) DO NOTHING
            ",
        )
        .bind(coupon)
        .bind(user)
        .bind(order)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_redemption(
        &mut self,
        coupon: CouponId,
        user: UserId,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM shop.coupon_redemption WHERE coupon_id = $1 AND user_id = $2")
            .bind(coupon)
            .bind(user)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    // ---- orders -----------------------------------------------------------

    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            INSERT INTO shop.customer_order (
                user_id, first_name, last_name, email, address, postal_code, city,
                subtotal, discount_amount, shipping_cost, total, coupon_id, status, paid,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, FALSE, $14)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(order.user_id)
        .bind(&order.shipping.first_name)
        .bind(&order.shipping.last_name)
        .bind(&order.shipping.email)
        .bind(&order.shipping.address)
        .bind(&order.shipping.postal_code)
        .bind(&order.shipping.city)
        .bind(order.price.subtotal)
        .bind(order.price.discount)
        .bind(order.price.shipping_cost)
        .bind(order.price.final_total)
        .bind(order.coupon_id)
        .bind(OrderStatus::Pending.as_str())
        .bind(order.created_at)
        .fetch_one(&mut *self.tx)
        .await?;

        row.try_into()
    }

    async fn insert_order_item(
        &mut self,
        order: OrderId,
        product: ProductId,
        price: Money,
        quantity: i32,
    ) -> Result<OrderItem, RepositoryError> {
        let row = sqlx::query_as::<_, OrderItemRow>(
            r"
            INSERT INTO shop.order_item (order_id, product_id, price, quantity)
            VALUES ($1, $2, $3, $4)
            RETURNING id, order_id, product_id, price, quantity
            ",
        )
        .bind(order)
        .bind(product)
        .bind(price)
        .bind(quantity)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.into())
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM shop.customer_order WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn orders_for_user(&mut self, user: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM shop.customer_order
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "
        ))
        .bind(user)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM shop.customer_order WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn order_items(&mut self, order: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT id, order_id, product_id, price, quantity
            FROM shop.order_item
            WHERE order_id = $1
            ORDER BY product_id
            ",
        )
        .bind(order)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    async fn set_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE shop.customer_order SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn has_purchased(
        &mut self,
        user: UserId,
        product: ProductId,
    ) -> Result<bool, RepositoryError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r"
            SELECT EXISTS (
                SELECT 1
                FROM shop.order_item oi
                JOIN shop.customer_order o ON o.id = oi.order_id
                WHERE o.user_id = $1 AND oi.product_id = $2 AND o.status <> 'cancelled'
            )
            ",
        )
        .bind(user)
        .bind(product)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(exists)
    }

    // ---- reviews ----------------------------------------------------------

    async fn lock_reviewer(&mut self, user: UserId) -> Result<(), RepositoryError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext('shop.product_review'), $1)")
            .bind(user)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn review(&mut self, id: ReviewId) -> Result<Option<Review>, RepositoryError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM shop.product_review WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Review::try_from).transpose()
    }

    async fn count_reviews_by(&mut self, user: UserId) -> Result<u32, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM shop.product_review WHERE user_id = $1",
        )
        .bind(user)
        .fetch_one(&mut *self.tx)
        .await?;

        count_to_u32(count)
    }

    async fn count_reviews_since(
        &mut self,
        user: UserId,
        since: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM shop.product_review WHERE user_id = $1 AND created_at >= $2",
        )
        .bind(user)
        .bind(since)
        .fetch_one(&mut *self.tx)
        .await?;

        count_to_u32(count)
    }

    async fn upsert_review(
        &mut self,
        draft: &ReviewDraft,
        now: DateTime<Utc>,
    ) -> Result<Review, RepositoryError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            r"
            INSERT INTO shop.product_review (
                user_id, product_id, rating, title, comment, approved, moderator_notes,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            ON CONFLICT (user_id, product_id) DO UPDATE SET
                rating = EXCLUDED.rating,
                title = EXCLUDED.title,
                comment = EXCLUDED.comment,
                approved = EXCLUDED.approved,
                moderator_notes = EXCLUDED.moderator_notes,
                reported = FALSE,
                report_reason = NULL,
                updated_at = EXCLUDED.updated_at
            RETURNING {REVIEW_COLUMNS}
            "
        ))
        .bind(draft.user_id)
        .bind(draft.product_id)
        .bind(i16::from(draft.rating))
        .bind(&draft.title)
        .bind(&draft.comment)
        .bind(draft.approved)
        .bind(&draft.moderator_notes)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;

        row.try_into()
    }

    async fn update_review_moderation(
        &mut self,
        review: &Review,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.product_review
            SET approved = $2, reported = $3, report_reason = $4, moderator_notes = $5,
                updated_at = $6
            WHERE id = $1
            ",
        )
        .bind(review.id)
        .bind(review.approved)
        .bind(review.reported)
        .bind(&review.report_reason)
        .bind(&review.moderator_notes)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete_review(&mut self, id: ReviewId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.product_review WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn rating_summary(
        &mut self,
        product: ProductId,
    ) -> Result<RatingSummary, RepositoryError> {
        let row = sqlx::query_as::<_, RatingRow>(
            r"
            SELECT COALESCE(SUM(rating), 0)::BIGINT AS rating_sum,
                   COUNT(*) AS rating_count
            FROM shop.product_review
            WHERE product_id = $1 AND approved
            ",
        )
        .bind(product)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(RatingSummary::from_totals(row.rating_sum, row.rating_count))
    }

    // ---- favorites --------------------------------------------------------

    async fn toggle_favorite(
        &mut self,
        user: UserId,
        product: ProductId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let removed =
            sqlx::query("DELETE FROM shop.favorite WHERE user_id = $1 AND product_id = $2")
                .bind(user)
                .bind(product)
                .execute(&mut *self.tx)
                .await?;

        if removed.rows_affected() > 0 {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO shop.favorite (user_id, product_id, created_at) VALUES ($1, $2, $3)",
        )
        .bind(user)
        .bind(product)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| conflict_or_database(e, "favorite"))?;

        Ok(true)
    }

    async fn favorites(&mut self, user: UserId) -> Result<Vec<Favorite>, RepositoryError> {
        let rows = sqlx::query_as::<_, FavoriteRow>(
            r"
            SELECT user_id, product_id, created_at
            FROM shop.favorite
            WHERE user_id = $1
            ORDER BY created_at DESC, product_id
            ",
        )
        .bind(user)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(Favorite::from).collect())
    }

    // ---- lifecycle --------------------------------------------------------

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        let this = *self;
        this.tx.rollback().await?;
        Ok(())
    }
}

//! In-process store.
//!
//! A transaction holds the store-wide async mutex for its whole lifetime and
//! works on a copy of the data, published only on commit. Transactions are
//! therefore fully serialized, which gives the same guarantees the row locks
//! give on `PostgreSQL`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use boutique_core::cart::CartLine;
use boutique_core::coupon::Coupon;
use boutique_core::{
    CartId, CategoryId, CouponId, Money, OrderId, OrderItemId, OrderStatus, ProductId, ReviewId,
    UserId,
};
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{RepositoryError, Store, StoreTx};
use crate::models::{
    Cart, CartOwner, Category, Favorite, NewCategory, NewOrder, NewProduct, Order, OrderItem,
    Product, RatingSummary, Review, ReviewDraft,
};

/// Store keeping everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Sequence(i32);

impl Sequence {
    const fn next(&mut self) -> i32 {
        self.0 += 1;
        self.0
    }
}

#[derive(Debug, Clone, Default)]
struct Sequences {
    category: Sequence,
    product: Sequence,
    cart: Sequence,
    coupon: Sequence,
    order: Sequence,
    order_item: Sequence,
    review: Sequence,
}

#[derive(Debug, Clone, Default)]
struct State {
    seq: Sequences,
    categories: BTreeMap<CategoryId, Category>,
    products: BTreeMap<ProductId, Product>,
    carts: BTreeMap<CartId, Cart>,
    cart_items: BTreeMap<(CartId, ProductId), i32>,
    coupons: BTreeMap<CouponId, Coupon>,
    redemptions: BTreeMap<(CouponId, UserId), OrderId>,
    orders: BTreeMap<OrderId, Order>,
    order_items: BTreeMap<OrderItemId, OrderItem>,
    reviews: BTreeMap<ReviewId, Review>,
    favorites: BTreeMap<(UserId, ProductId), DateTime<Utc>>,
}

impl State {
    fn coupon_id_by_code(&self, code: &str) -> Option<CouponId> {
        self.coupons
            .values()
            .find(|coupon| coupon.code == code)
            .map(|coupon| coupon.id)
    }

    fn reviews_by(&self, user: UserId) -> impl Iterator<Item = &Review> {
        self.reviews.values().filter(move |r| r.user_id == user)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, RepositoryError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// A serialized in-memory transaction.
pub struct MemoryTx {
    guard: OwnedMutexGuard<State>,
    working: State,
}

#[async_trait]
impl StoreTx for MemoryTx {
    // ---- catalog ----------------------------------------------------------

    async fn upsert_category(
        &mut self,
        category: &NewCategory,
    ) -> Result<Category, RepositoryError> {
        let state = &mut self.working;
        let existing = state
            .categories
            .values()
            .find(|c| c.slug == category.slug)
            .map(|c| c.id);
        let id = existing.unwrap_or_else(|| CategoryId::new(state.seq.category.next()));

        let row = Category {
            id,
            name: category.name.clone(),
            slug: category.slug.clone(),
        };
        state.categories.insert(id, row.clone());
        Ok(row)
    }

    async fn upsert_product(&mut self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let state = &mut self.working;
        if !state.categories.contains_key(&product.category_id) {
            return Err(RepositoryError::Conflict(format!(
                "category {} does not exist",
                product.category_id
            )));
        }

        let existing = state
            .products
            .values()
            .find(|p| p.slug == product.slug)
            .map(|p| p.id);
        let id = existing.unwrap_or_else(|| ProductId::new(state.seq.product.next()));

        let row = Product {
            id,
            category_id: product.category_id,
            name: product.name.clone(),
            slug: product.slug.clone(),
            price: product.price,
            stock: product.stock,
            available: product.stock > 0,
        };
        state.products.insert(id, row.clone());
        Ok(row)
    }

    async fn category_by_slug(
        &mut self,
        slug: &str,
    ) -> Result<Option<Category>, RepositoryError> {
        Ok(self
            .working
            .categories
            .values()
            .find(|c| c.slug == slug)
            .cloned())
    }

    async fn available_products(
        &mut self,
        category: Option<CategoryId>,
    ) -> Result<Vec<Product>, RepositoryError> {
        Ok(self
            .working
            .products
            .values()
            .rev()
            .filter(|p| p.available && category.is_none_or(|id| p.category_id == id))
            .cloned()
            .collect())
    }

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn decrement_stock(
        &mut self,
        id: ProductId,
        quantity: i32,
    ) -> Result<bool, RepositoryError> {
        match self.working.products.get_mut(&id) {
            Some(product) if product.stock >= quantity => {
                product.stock -= quantity;
                product.available = product.available && product.stock > 0;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn restock(&mut self, id: ProductId, quantity: i32) -> Result<(), RepositoryError> {
        let product = self
            .working
            .products
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        product.available = product.available || product.stock == 0;
        product.stock += quantity;
        Ok(())
    }

    // ---- carts ------------------------------------------------------------

    async fn cart_for_owner(
        &mut self,
        owner: &CartOwner,
        now: DateTime<Utc>,
    ) -> Result<Cart, RepositoryError> {
        let state = &mut self.working;
        if let Some(cart) = state.carts.values().find(|c| &c.owner == owner) {
            return Ok(cart.clone());
        }

        let cart = Cart {
            id: CartId::new(state.seq.cart.next()),
            owner: owner.clone(),
            created_at: now,
        };
        state.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn cart(&mut self, id: CartId) -> Result<Option<Cart>, RepositoryError> {
        Ok(self.working.carts.get(&id).cloned())
    }

    async fn find_cart(&mut self, owner: &CartOwner) -> Result<Option<Cart>, RepositoryError> {
        Ok(self
            .working
            .carts
            .values()
            .find(|c| &c.owner == owner)
            .cloned())
    }

    async fn delete_cart(&mut self, id: CartId) -> Result<(), RepositoryError> {
        self.working.carts.remove(&id);
        self.working.cart_items.retain(|&(cart, _), _| cart != id);
        Ok(())
    }

    async fn cart_lines(&mut self, id: CartId) -> Result<Vec<CartLine>, RepositoryError> {
        let state = &self.working;
        state
            .cart_items
            .range((id, ProductId::new(i32::MIN))..=(id, ProductId::new(i32::MAX)))
            .map(|(&(_, product_id), &quantity)| {
                let product = state.products.get(&product_id).ok_or_else(|| {
                    RepositoryError::DataCorruption(format!(
                        "cart {id} references missing product {product_id}"
                    ))
                })?;
                Ok(CartLine {
                    product_id,
                    category_id: product.category_id,
                    quantity,
                    unit_price: product.price,
                })
            })
            .collect()
    }

    async fn cart_quantity(
        &mut self,
        cart: CartId,
        product: ProductId,
    ) -> Result<Option<i32>, RepositoryError> {
        Ok(self.working.cart_items.get(&(cart, product)).copied())
    }

    async fn set_cart_quantity(
        &mut self,
        cart: CartId,
        product: ProductId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        if !self.working.carts.contains_key(&cart) {
            return Err(RepositoryError::NotFound);
        }
        self.working.cart_items.insert((cart, product), quantity);
        Ok(())
    }

    async fn remove_cart_item(
        &mut self,
        cart: CartId,
        product: ProductId,
    ) -> Result<bool, RepositoryError> {
        Ok(self.working.cart_items.remove(&(cart, product)).is_some())
    }

    async fn clear_cart(&mut self, cart: CartId) -> Result<(), RepositoryError> {
        self.working.cart_items.retain(|&(id, _), _| id != cart);
        Ok(())
    }

    // ---- coupons ----------------------------------------------------------

    async fn upsert_coupon(&mut self, coupon: &Coupon) -> Result<Coupon, RepositoryError> {
        let state = &mut self.working;
        let row = match state.coupon_id_by_code(&coupon.code) {
            Some(id) => {
                let used_count = state.coupons.get(&id).map_or(0, |c| c.used_count);
                Coupon {
                    id,
                    used_count,
                    ..coupon.clone()
                }
            }
            None => Coupon {
                id: CouponId::new(state.seq.coupon.next()),
                ..coupon.clone()
            },
        };
        state.coupons.insert(row.id, row.clone());
        Ok(row)
    }

    async fn coupon_by_code(&mut self, code: &str) -> Result<Option<Coupon>, RepositoryError> {
        let state = &self.working;
        Ok(state
            .coupon_id_by_code(code)
            .and_then(|id| state.coupons.get(&id).cloned()))
    }

    async fn lock_coupon_by_code(
        &mut self,
        code: &str,
    ) -> Result<Option<Coupon>, RepositoryError> {
        self.coupon_by_code(code).await
    }

    async fn coupon(&mut self, id: CouponId) -> Result<Option<Coupon>, RepositoryError> {
        Ok(self.working.coupons.get(&id).cloned())
    }

    async fn has_redeemed(
        &mut self,
        coupon: CouponId,
        user: UserId,
    ) -> Result<bool, RepositoryError> {
        Ok(self.working.redemptions.contains_key(&(coupon, user)))
    }

    async fn increment_coupon_usage(&mut self, coupon: CouponId) -> Result<bool, RepositoryError> {
        match self.working.coupons.get_mut(&coupon) {
            Some(c) if !c.usage_exhausted() => {
                c.used_count += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_coupon_usage(&mut self, coupon: CouponId) -> Result<(), RepositoryError> {
        if let Some(c) = self.working.coupons.get_mut(&coupon) {
            c.used_count = (c.used_count - 1).max(0);
        }
        Ok(())
    }

    async fn record_redemption(
        &mut self,
        coupon: CouponId,
        user: UserId,
        order: OrderId,
    ) -> Result<bool, RepositoryError> {
        if self.working.redemptions.contains_key(&(coupon, user)) {
            return Ok(false);
        }
        self.working.redemptions.insert((coupon, user), order);
        Ok(true)
    }

    async fn delete_redemption(
        &mut self,
        coupon: CouponId,
        user: UserId,
    ) -> Result<(), RepositoryError> {
        self.working.redemptions.remove(&(coupon, user));
        Ok(())
    }

    // ---- orders -----------------------------------------------------------

    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let state = &mut self.working;
        let row = Order {
            id: OrderId::new(state.seq.order.next()),
            user_id: order.user_id,
            shipping: order.shipping.clone(),
            subtotal: order.price.subtotal,
            discount_amount: order.price.discount,
            shipping_cost: order.price.shipping_cost,
            total: order.price.final_total,
            coupon_id: order.coupon_id,
            status: OrderStatus::Pending,
            paid: false,
            created_at: order.created_at,
        };
        state.orders.insert(row.id, row.clone());
        Ok(row)
    }

    async fn insert_order_item(
        &mut self,
        order: OrderId,
        product: ProductId,
        price: Money,
        quantity: i32,
    ) -> Result<OrderItem, RepositoryError> {
        let state = &mut self.working;
        if !state.orders.contains_key(&order) {
            return Err(RepositoryError::NotFound);
        }
        let row = OrderItem {
            id: OrderItemId::new(state.seq.order_item.next()),
            order_id: order,
            product_id: product,
            price,
            quantity,
        };
        state.order_items.insert(row.id, row.clone());
        Ok(row)
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn orders_for_user(&mut self, user: UserId) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .working
            .orders
            .values()
            .filter(|order| order.user_id == Some(user))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn order_items(&mut self, order: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let mut items: Vec<OrderItem> = self
            .working
            .order_items
            .values()
            .filter(|item| item.order_id == order)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.product_id);
        Ok(items)
    }

    async fn set_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        let order = self
            .working
            .orders
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        order.status = status;
        Ok(())
    }

    async fn has_purchased(
        &mut self,
        user: UserId,
        product: ProductId,
    ) -> Result<bool, RepositoryError> {
        let state = &self.working;
        Ok(state.order_items.values().any(|item| {
            item.product_id == product
                && state.orders.get(&item.order_id).is_some_and(|order| {
                    order.user_id == Some(user) && order.status != OrderStatus::Cancelled
                })
        }))
    }

    // ---- reviews ----------------------------------------------------------

    // Transactions are already serialized by the store mutex.
    async fn lock_reviewer(&mut self, _user: UserId) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn review(&mut self, id: ReviewId) -> Result<Option<Review>, RepositoryError> {
        Ok(self.working.reviews.get(&id).cloned())
    }

    async fn count_reviews_by(&mut self, user: UserId) -> Result<u32, RepositoryError> {
        let count = self.working.reviews_by(user).count();
        u32::try_from(count)
            .map_err(|_| RepositoryError::DataCorruption(format!("count out of range: {count}")))
    }

    async fn count_reviews_since(
        &mut self,
        user: UserId,
        since: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        let count = self
            .working
            .reviews_by(user)
            .filter(|review| review.created_at >= since)
            .count();
        u32::try_from(count)
            .map_err(|_| RepositoryError::DataCorruption(format!("count out of range: {count}")))
    }

    async fn upsert_review(
        &mut self,
        draft: &ReviewDraft,
        now: DateTime<Utc>,
    ) -> Result<Review, RepositoryError> {
        let state = &mut self.working;
        let existing = state
            .reviews
            .values()
            .find(|r| r.user_id == draft.user_id && r.product_id == draft.product_id)
            .map(|r| (r.id, r.created_at));

        let (id, created_at) =
            existing.unwrap_or_else(|| (ReviewId::new(state.seq.review.next()), now));

        let row = Review {
            id,
            user_id: draft.user_id,
            product_id: draft.product_id,
            rating: draft.rating,
            title: draft.title.clone(),
            comment: draft.comment.clone(),
            approved: draft.approved,
            reported: false,
            report_reason: None,
            moderator_notes: draft.moderator_notes.clone(),
            created_at,
            updated_at: now,
        };
        state.reviews.insert(id, row.clone());
        Ok(row)
    }

    async fn update_review_moderation(
        &mut self,
        review: &Review,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let row = self
            .working
            .reviews
            .get_mut(&review.id)
            .ok_or(RepositoryError::NotFound)?;
        row.approved = review.approved;
        row.reported = review.reported;
        row.report_reason.clone_from(&review.report_reason);
        row.moderator_notes.clone_from(&review.moderator_notes);
        row.updated_at = now;
        Ok(())
    }

    async fn delete_review(&mut self, id: ReviewId) -> Result<bool, RepositoryError> {
        Ok(self.working.reviews.remove(&id).is_some())
    }

    async fn rating_summary(
        &mut self,
        product: ProductId,
    ) -> Result<RatingSummary, RepositoryError> {
        let (sum, count) = self
            .working
            .reviews
            .values()
            .filter(|r| r.product_id == product && r.approved)
            .fold((0_i64, 0_i64), |(sum, count), r| {
                (sum + i64::from(r.rating), count + 1)
            });
        Ok(RatingSummary::from_totals(sum, count))
    }

    // ---- favorites --------------------------------------------------------

    async fn toggle_favorite(
        &mut self,
        user: UserId,
        product: ProductId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let favorites = &mut self.working.favorites;
        if favorites.remove(&(user, product)).is_some() {
            return Ok(false);
        }
        favorites.insert((user, product), now);
        Ok(true)
    }

    async fn favorites(&mut self, user: UserId) -> Result<Vec<Favorite>, RepositoryError> {
        let mut favorites: Vec<Favorite> = self
            .working
            .favorites
            .iter()
            .filter(|((owner, _), _)| *owner == user)
            .map(|(&(user_id, product_id), &created_at)| Favorite {
                user_id,
                product_id,
                created_at,
            })
            .collect();
        favorites.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(a.product_id.cmp(&b.product_id))
        });
        Ok(favorites)
    }

    // ---- lifecycle --------------------------------------------------------

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let Self { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        Ok(())
    }
}

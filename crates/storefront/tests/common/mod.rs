//! Shared fixtures: a shop over any store with a pinned clock.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;

use boutique_core::checkout::ShippingInfo;
use boutique_core::clock::ManualClock;
use boutique_core::coupon::{Coupon, CouponScope};
use boutique_core::moderation::ModerationPolicy;
use boutique_core::pricing::PricingPolicy;
use boutique_core::{CartId, CategoryId, CouponId, DiscountType, Money, ProductId, UserId};
use boutique_storefront::db::{MemoryStore, Store};
use boutique_storefront::models::{CartOwner, NewCategory, NewProduct, Product};
use boutique_storefront::services::{CartService, CommitRequest};
use boutique_storefront::state::AppState;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn money(s: &str) -> Money {
    s.parse().unwrap()
}

pub struct Shop {
    pub state: AppState,
    pub store: Arc<dyn Store>,
    pub clock: Arc<ManualClock>,
}

impl Shop {
    /// A shop over a fresh in-memory store.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn Store>) -> Self {
        let clock = Arc::new(ManualClock::new(now()));
        let state = AppState::new(
            Arc::clone(&store),
            clock.clone(),
            PricingPolicy::default(),
            ModerationPolicy::default(),
        );
        Self {
            state,
            store,
            clock,
        }
    }

    pub async fn category(&self, slug: &str) -> CategoryId {
        let mut tx = self.store.begin().await.unwrap();
        let category = tx
            .upsert_category(&NewCategory {
                name: slug.to_string(),
                slug: slug.to_string(),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        category.id
    }

    /// Create (or update) a product in the `general` category.
    pub async fn product(&self, slug: &str, price: &str, stock: i32) -> ProductId {
        let category_id = self.category("general").await;
        self.product_in(category_id, slug, price, stock).await
    }

    pub async fn product_in(
        &self,
        category_id: CategoryId,
        slug: &str,
        price: &str,
        stock: i32,
    ) -> ProductId {
        let mut tx = self.store.begin().await.unwrap();
        let product = tx
            .upsert_product(&NewProduct {
                category_id,
                name: slug.to_string(),
                slug: slug.to_string(),
                price: money(price),
                stock,
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        product.id
    }

    pub async fn stock(&self, id: ProductId) -> Product {
        let mut tx = self.store.begin().await.unwrap();
        tx.product(id).await.unwrap().unwrap()
    }

    pub async fn coupon(&self, coupon: Coupon) -> Coupon {
        let mut tx = self.store.begin().await.unwrap();
        let coupon = tx.upsert_coupon(&coupon).await.unwrap();
        tx.commit().await.unwrap();
        coupon
    }

    pub async fn coupon_by_code(&self, code: &str) -> Coupon {
        let mut tx = self.store.begin().await.unwrap();
        tx.coupon_by_code(code).await.unwrap().unwrap()
    }

    /// A cart for `user` holding the given lines.
    pub async fn cart(&self, user: UserId, lines: &[(ProductId, i32)]) -> CartId {
        self.cart_for(&CartOwner::User(user), lines).await
    }

    pub async fn cart_for(&self, owner: &CartOwner, lines: &[(ProductId, i32)]) -> CartId {
        let service = CartService::new(&self.state);
        let mut view = None;
        for &(product, quantity) in lines {
            view = Some(service.add_item(owner, product, quantity).await.unwrap());
        }
        view.unwrap().cart.id
    }
}

/// An active, unrestricted coupon valid around [`now`].
pub fn coupon(code: &str, discount_type: DiscountType, value: &str) -> Coupon {
    Coupon {
        id: CouponId::new(0),
        code: code.to_string(),
        description: String::new(),
        discount_type,
        discount_value: value.parse::<Decimal>().unwrap(),
        minimum_amount: Money::ZERO,
        valid_from: now() - Duration::days(30),
        valid_to: now() + Duration::days(30),
        max_usage: 0,
        used_count: 0,
        active: true,
        single_use_per_user: false,
        scope: CouponScope::default(),
    }
}

pub fn shipping() -> ShippingInfo {
    ShippingInfo {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        address: "12 rue des Lilas".to_string(),
        postal_code: "75011".to_string(),
        city: "Paris".to_string(),
    }
}

pub fn commit_request(cart_id: CartId, user: Option<UserId>, code: Option<&str>) -> CommitRequest {
    CommitRequest {
        cart_id,
        shipping: shipping(),
        coupon_code: code.map(str::to_string),
        user_id: user,
    }
}

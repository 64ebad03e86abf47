//! Checkout and review guarantees against a real `PostgreSQL`.
//!
//! These tests need a database where the `shop` schema can be created. They
//! run when `STOREFRONT_TEST_DATABASE_URL` (or `DATABASE_URL`) is set and
//! return early otherwise:
//!
//! ```bash
//! STOREFRONT_TEST_DATABASE_URL=postgres://localhost/boutique_test \
//!     cargo test -p boutique-storefront --test postgres
//! ```
//!
//! Rows are named with a per-run suffix and users get fresh ids, so runs can
//! share a database.

#![allow(clippy::unwrap_used, clippy::print_stderr)]

mod common;

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use boutique_core::moderation::{ReviewCandidate, ReviewRejection};
use boutique_core::{DiscountType, UserId};
use boutique_storefront::db::{PgStore, create_pool};
use boutique_storefront::services::{
    CartService, CheckoutService, CommitError, ReviewError, ReviewService, commit_order,
};
use common::{Shop, commit_request, coupon};
use secrecy::SecretString;

/// A shop over `PostgreSQL`, or `None` when no database is configured.
async fn pg_shop() -> Option<Shop> {
    let Some(url) = std::env::var("STOREFRONT_TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
    else {
        eprintln!("no test database configured, skipping");
        return None;
    };

    let pool = create_pool(&SecretString::from(url)).await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    Some(Shop::with_store(Arc::new(PgStore::new(pool))))
}

fn run_seed() -> u32 {
    static SEED: OnceLock<u32> = OnceLock::new();
    *SEED.get_or_init(|| {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .subsec_nanos();
        (nanos ^ std::process::id().wrapping_mul(7919)) % 1_000_000
    })
}

/// `name` made unique to this run.
fn unique(name: &str) -> String {
    static NEXT: AtomicI32 = AtomicI32::new(0);
    format!(
        "{name}-{}-{}",
        run_seed(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    )
}

/// A user id no other run has used.
fn fresh_user() -> UserId {
    static NEXT: AtomicI32 = AtomicI32::new(0);
    let base = i32::try_from(run_seed()).unwrap() * 1000;
    UserId::new(1_000_000_000 + base + NEXT.fetch_add(1, Ordering::Relaxed))
}

// =============================================================================
// Stock
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_commits_for_the_last_unit() {
    let Some(shop) = pg_shop().await else { return };
    let product = shop.product(&unique("last-kyusu"), "45.00", 1).await;
    let first = fresh_user();
    let second = fresh_user();
    let carts = [
        (shop.cart(first, &[(product, 1)]).await, first),
        (shop.cart(second, &[(product, 1)]).await, second),
    ];

    let handles: Vec<_> = carts
        .into_iter()
        .map(|(cart, user)| {
            let state = shop.state.clone();
            tokio::spawn(async move {
                commit_order(&state, commit_request(cart, Some(user), None)).await
            })
        })
        .collect();

    let mut committed = 0;
    let mut out_of_stock = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(CommitError::InsufficientStock { available: 0, .. }) => out_of_stock += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(committed, 1);
    assert_eq!(out_of_stock, 1);
    let product = shop.stock(product).await;
    assert_eq!(product.stock, 0);
    assert!(!product.available);
}

#[tokio::test]
async fn test_insufficient_stock_rolls_back() {
    let Some(shop) = pg_shop().await else { return };
    let slug = unique("kyusu");
    let product = shop.product(&slug, "45.00", 2).await;
    let user = fresh_user();
    let cart = shop.cart(user, &[(product, 2)]).await;

    // Stock drops after the item was added.
    shop.product(&slug, "45.00", 1).await;

    let err = CheckoutService::new(&shop.state)
        .commit_order(commit_request(cart, Some(user), None))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CommitError::InsufficientStock { product: p, available: 1 } if p == product
    ));
    assert_eq!(shop.stock(product).await.stock, 1);
    let view = CartService::new(&shop.state).view(cart).await.unwrap();
    assert_eq!(view.total_quantity, 2);
}

// =============================================================================
// Coupons
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_coupon_limit_holds_under_contention() {
    let Some(shop) = pg_shop().await else { return };
    let product = shop.product(&unique("sencha"), "20.00", 100).await;
    let code = unique("FIRST3").to_uppercase();
    let mut limited = coupon(&code, DiscountType::Fixed, "5");
    limited.max_usage = 3;
    shop.coupon(limited).await;

    let mut carts = Vec::new();
    for _ in 0..8 {
        let user = fresh_user();
        carts.push((shop.cart(user, &[(product, 1)]).await, user));
    }

    let handles: Vec<_> = carts
        .into_iter()
        .map(|(cart, user)| {
            let state = shop.state.clone();
            let code = code.clone();
            tokio::spawn(async move {
                commit_order(&state, commit_request(cart, Some(user), Some(code.as_str()))).await
            })
        })
        .collect();

    let mut committed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(CommitError::CouponNoLongerValid { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(committed, 3);
    assert_eq!(shop.coupon_by_code(&code).await.used_count, 3);
    assert_eq!(shop.stock(product).await.stock, 97);
}

#[tokio::test]
async fn test_single_use_coupon_is_redeemed_once() {
    let Some(shop) = pg_shop().await else { return };
    let product = shop.product(&unique("matcha"), "30.00", 10).await;
    let code = unique("WELCOME").to_uppercase();
    let mut welcome = coupon(&code, DiscountType::Percentage, "10");
    welcome.single_use_per_user = true;
    shop.coupon(welcome).await;
    let user = fresh_user();
    let checkout = CheckoutService::new(&shop.state);

    let cart = shop.cart(user, &[(product, 1)]).await;
    checkout
        .commit_order(commit_request(cart, Some(user), Some(code.as_str())))
        .await
        .unwrap();

    let cart = shop.cart(user, &[(product, 1)]).await;
    let err = checkout
        .commit_order(commit_request(cart, Some(user), Some(code.as_str())))
        .await
        .unwrap_err();
    assert!(matches!(err, CommitError::CouponNoLongerValid { .. }));
    assert_eq!(shop.coupon_by_code(&code).await.used_count, 1);
}

// =============================================================================
// Reviews
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rate_limit_holds_under_concurrent_reviews() {
    let Some(shop) = pg_shop().await else { return };
    let user = fresh_user();
    let mut products = Vec::new();
    for i in 0..6 {
        products.push(
            shop.product(&unique(&format!("tea-{i}")), "8.00", 10)
                .await,
        );
    }
    let lines: Vec<_> = products.iter().map(|&p| (p, 1)).collect();
    let cart = shop.cart(user, &lines).await;
    commit_order(&shop.state, commit_request(cart, Some(user), None))
        .await
        .unwrap();

    let handles: Vec<_> = products
        .into_iter()
        .map(|product| {
            let state = shop.state.clone();
            tokio::spawn(async move {
                let candidate = ReviewCandidate {
                    rating: 3,
                    title: "Correctement emballé".to_string(),
                    comment: "Livraison rapide.".to_string(),
                };
                ReviewService::new(&state)
                    .submit(user, product, candidate)
                    .await
            })
        })
        .collect();

    let mut stored = 0;
    let mut limited = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => stored += 1,
            Err(ReviewError::Rejected(ReviewRejection::RateLimited)) => limited += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(stored, 3);
    assert_eq!(limited, 3);
    let mut tx = shop.store.begin().await.unwrap();
    assert_eq!(tx.count_reviews_by(user).await.unwrap(), 3);
}

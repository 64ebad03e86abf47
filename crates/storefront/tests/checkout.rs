//! Order commit, cancellation and order reads against the in-memory store.

#![allow(clippy::unwrap_used)]

mod common;

use boutique_core::coupon::CouponRejection;
use boutique_core::{DiscountType, OrderStatus, UserId};
use boutique_storefront::models::CartOwner;
use boutique_storefront::db::RepositoryError;
use boutique_storefront::services::{
    CancelError, CartService, CheckoutService, CommitError, OrderService,
};
use chrono::Duration;
use common::{Shop, commit_request, coupon, money};

// =============================================================================
// Pricing at commit
// =============================================================================

#[tokio::test]
async fn test_percentage_coupon_frees_shipping_above_threshold() {
    let shop = Shop::new();
    let product = shop.product("teapot", "100.00", 5).await;
    shop.coupon(coupon("SAVE10", DiscountType::Percentage, "10"))
        .await;
    let user = UserId::new(1);
    let cart = shop.cart(user, &[(product, 1)]).await;

    let receipt = CheckoutService::new(&shop.state)
        .commit_order(commit_request(cart, Some(user), Some("save10")))
        .await
        .unwrap();

    let order = &receipt.order;
    assert_eq!(order.subtotal, money("100.00"));
    assert_eq!(order.discount_amount, money("10.00"));
    assert_eq!(order.shipping_cost, money("0.00"));
    assert_eq!(order.total, money("90.00"));
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(!order.paid);
    assert!(order.coupon_id.is_some());

    assert_eq!(receipt.items.len(), 1);
    assert_eq!(receipt.items[0].price, money("100.00"));
    assert_eq!(shop.stock(product).await.stock, 4);
    assert_eq!(shop.coupon_by_code("SAVE10").await.used_count, 1);
}

#[tokio::test]
async fn test_small_order_pays_flat_shipping() {
    let shop = Shop::new();
    let product = shop.product("sencha", "15.00", 10).await;
    let user = UserId::new(1);
    let cart = shop.cart(user, &[(product, 2)]).await;

    let receipt = CheckoutService::new(&shop.state)
        .commit_order(commit_request(cart, Some(user), None))
        .await
        .unwrap();

    assert_eq!(receipt.order.subtotal, money("30.00"));
    assert_eq!(receipt.order.discount_amount, money("0.00"));
    assert_eq!(receipt.order.shipping_cost, money("4.99"));
    assert_eq!(receipt.order.total, money("34.99"));
    assert_eq!(receipt.order.coupon_id, None);
}

#[tokio::test]
async fn test_commit_empties_the_cart() {
    let shop = Shop::new();
    let product = shop.product("sencha", "15.00", 10).await;
    let user = UserId::new(1);
    let cart = shop.cart(user, &[(product, 1)]).await;

    CheckoutService::new(&shop.state)
        .commit_order(commit_request(cart, Some(user), None))
        .await
        .unwrap();

    let view = CartService::new(&shop.state).view(cart).await.unwrap();
    assert!(view.lines.is_empty());

    let err = CheckoutService::new(&shop.state)
        .commit_order(commit_request(cart, Some(user), None))
        .await
        .unwrap_err();
    assert!(matches!(err, CommitError::EmptyCart));
}

#[tokio::test]
async fn test_guest_checkout_from_session_cart() {
    let shop = Shop::new();
    let product = shop.product("sencha", "60.00", 3).await;
    let cart = shop
        .cart_for(&CartOwner::Session("guest-42".to_string()), &[(product, 1)])
        .await;

    let receipt = CheckoutService::new(&shop.state)
        .commit_order(commit_request(cart, None, None))
        .await
        .unwrap();

    assert_eq!(receipt.order.user_id, None);
    assert_eq!(receipt.order.shipping_cost, money("0.00"));
    assert_eq!(receipt.order.shipping.email, "ada@example.com");
}

// =============================================================================
// Failures leave everything untouched
// =============================================================================

#[tokio::test]
async fn test_insufficient_stock_rolls_back() {
    let shop = Shop::new();
    let product = shop.product("kyusu", "45.00", 2).await;
    let user = UserId::new(1);
    let cart = shop.cart(user, &[(product, 2)]).await;

    // Stock drops after the item was added.
    shop.product("kyusu", "45.00", 1).await;

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

#[tokio::test]
async fn test_invalid_coupon_aborts_commit() {
    let shop = Shop::new();
    let product = shop.product("sencha", "20.00", 5).await;
    let mut expired = coupon("OLD", DiscountType::Fixed, "5");
    expired.valid_to = common::now() - chrono::Duration::days(1);
    shop.coupon(expired).await;
    let user = UserId::new(1);
    let cart = shop.cart(user, &[(product, 1)]).await;

    let err = CheckoutService::new(&shop.state)
        .commit_order(commit_request(cart, Some(user), Some("OLD")))
        .await
        .unwrap_err();

    match err {
        CommitError::CouponNoLongerValid { reason } => {
            assert_eq!(reason, CouponRejection::OutsideValidityWindow.to_string());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(shop.stock(product).await.stock, 5);
}

#[tokio::test]
async fn test_invalid_shipping_info_is_a_validation_error() {
    let shop = Shop::new();
    let product = shop.product("sencha", "20.00", 5).await;
    let user = UserId::new(1);
    let cart = shop.cart(user, &[(product, 1)]).await;

    let mut request = commit_request(cart, Some(user), None);
    request.shipping.email = "not-an-email".to_string();

    let err = CheckoutService::new(&shop.state)
        .commit_order(request)
        .await
        .unwrap_err();
    assert!(matches!(err, CommitError::Validation(_)));
    assert_eq!(shop.stock(product).await.stock, 5);
}

#[tokio::test]
async fn test_cart_of_another_user_is_rejected() {
    let shop = Shop::new();
    let product = shop.product("sencha", "20.00", 5).await;
    let cart = shop.cart(UserId::new(1), &[(product, 1)]).await;

    let err = CheckoutService::new(&shop.state)
        .commit_order(commit_request(cart, Some(UserId::new(2)), None))
        .await
        .unwrap_err();
    assert!(matches!(err, CommitError::Validation(_)));
}

// =============================================================================
// Coupon usage
// =============================================================================

#[tokio::test]
async fn test_coupon_usage_limit_is_enforced_at_commit() {
    let shop = Shop::new();
    let product = shop.product("sencha", "20.00", 100).await;
    let mut limited = coupon("TWICE", DiscountType::Fixed, "5");
    limited.max_usage = 2;
    shop.coupon(limited).await;

    let checkout = CheckoutService::new(&shop.state);
    for id in 1..=2 {
        let user = UserId::new(id);
        let cart = shop.cart(user, &[(product, 1)]).await;
        checkout
            .commit_order(commit_request(cart, Some(user), Some("TWICE")))
            .await
            .unwrap();
    }

    let user = UserId::new(3);
    let cart = shop.cart(user, &[(product, 1)]).await;
    let err = checkout
        .commit_order(commit_request(cart, Some(user), Some("TWICE")))
        .await
        .unwrap_err();

    assert!(matches!(err, CommitError::CouponNoLongerValid { .. }));
    assert_eq!(shop.coupon_by_code("TWICE").await.used_count, 2);
    assert_eq!(shop.stock(product).await.stock, 98);
}

#[tokio::test]
async fn test_single_use_coupon_is_refused_the_second_time() {
    let shop = Shop::new();
    let product = shop.product("sencha", "20.00", 10).await;
    let mut once = coupon("WELCOME", DiscountType::Percentage, "10");
    once.single_use_per_user = true;
    shop.coupon(once).await;
    let user = UserId::new(1);
    let checkout = CheckoutService::new(&shop.state);

    let cart = shop.cart(user, &[(product, 1)]).await;
    checkout
        .commit_order(commit_request(cart, Some(user), Some("WELCOME")))
        .await
        .unwrap();

    let cart = shop.cart(user, &[(product, 1)]).await;
    let err = checkout
        .commit_order(commit_request(cart, Some(user), Some("WELCOME")))
        .await
        .unwrap_err();

    match err {
        CommitError::CouponNoLongerValid { reason } => {
            assert_eq!(reason, CouponRejection::AlreadyRedeemed.to_string());
        }
        other => panic!("unexpected error: {other}"),
    }
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_restocks_and_releases_coupon() {
    let shop = Shop::new();
    let product = shop.product("matcha", "30.00", 5).await;
    let mut once = coupon("WELCOME", DiscountType::Percentage, "10");
    once.single_use_per_user = true;
    shop.coupon(once).await;
    let user = UserId::new(1);
    let checkout = CheckoutService::new(&shop.state);

    let cart = shop.cart(user, &[(product, 3)]).await;
    let receipt = checkout
        .commit_order(commit_request(cart, Some(user), Some("WELCOME")))
        .await
        .unwrap();
    assert_eq!(shop.stock(product).await.stock, 2);

    let cancelled = checkout.cancel_order(receipt.order.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(shop.stock(product).await.stock, 5);
    assert_eq!(shop.coupon_by_code("WELCOME").await.used_count, 0);

    // The redemption is gone, so the coupon can be used again.
    let cart = shop.cart(user, &[(product, 1)]).await;
    checkout
        .commit_order(commit_request(cart, Some(user), Some("WELCOME")))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cancel_twice_is_refused() {
    let shop = Shop::new();
    let product = shop.product("matcha", "30.00", 5).await;
    let user = UserId::new(1);
    let cart = shop.cart(user, &[(product, 1)]).await;
    let checkout = CheckoutService::new(&shop.state);
    let receipt = checkout
        .commit_order(commit_request(cart, Some(user), None))
        .await
        .unwrap();

    checkout.cancel_order(receipt.order.id).await.unwrap();
    let err = checkout.cancel_order(receipt.order.id).await.unwrap_err();

    assert!(matches!(
        err,
        CancelError::NotCancellable {
            status: OrderStatus::Cancelled
        }
    ));
    assert_eq!(shop.stock(product).await.stock, 5);
}

#[tokio::test]
async fn test_cancel_sold_out_product_makes_it_available() {
    let shop = Shop::new();
    let product = shop.product("matcha", "30.00", 1).await;
    let user = UserId::new(1);
    let cart = shop.cart(user, &[(product, 1)]).await;
    let checkout = CheckoutService::new(&shop.state);
    let receipt = checkout
        .commit_order(commit_request(cart, Some(user), None))
        .await
        .unwrap();

    let sold_out = shop.stock(product).await;
    assert_eq!(sold_out.stock, 0);
    assert!(!sold_out.available);

    checkout.cancel_order(receipt.order.id).await.unwrap();
    let restocked = shop.stock(product).await;
    assert_eq!(restocked.stock, 1);
    assert!(restocked.available);
}

// =============================================================================
// Order history
// =============================================================================

#[tokio::test]
async fn test_history_lists_newest_first() {
    let shop = Shop::new();
    let product = shop.product("teapot", "40.00", 10).await;
    let user = UserId::new(1);
    let checkout = CheckoutService::new(&shop.state);

    let cart = shop.cart(user, &[(product, 1)]).await;
    let first = checkout
        .commit_order(commit_request(cart, Some(user), None))
        .await
        .unwrap();
    shop.clock.advance(Duration::days(1));
    let cart = shop.cart(user, &[(product, 2)]).await;
    let second = checkout
        .commit_order(commit_request(cart, Some(user), None))
        .await
        .unwrap();
    checkout.cancel_order(first.order.id).await.unwrap();

    let other = shop.cart(UserId::new(2), &[(product, 1)]).await;
    checkout
        .commit_order(commit_request(other, Some(UserId::new(2)), None))
        .await
        .unwrap();

    let history = OrderService::new(&shop.state).history(user).await.unwrap();
    let ids: Vec<_> = history.iter().map(|order| order.id).collect();
    assert_eq!(ids, vec![second.order.id, first.order.id]);
    assert_eq!(history.last().unwrap().status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_order_detail_is_private_to_its_buyer() {
    let shop = Shop::new();
    let product = shop.product("teapot", "40.00", 10).await;
    let user = UserId::new(1);
    let cart = shop.cart(user, &[(product, 2)]).await;
    let receipt = CheckoutService::new(&shop.state)
        .commit_order(commit_request(cart, Some(user), None))
        .await
        .unwrap();
    let orders = OrderService::new(&shop.state);

    let detail = orders.detail(receipt.order.id, Some(user)).await.unwrap();
    assert_eq!(detail, receipt);

    let err = orders
        .detail(receipt.order.id, Some(UserId::new(2)))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound));

    let err = orders
        .detail(boutique_core::OrderId::new(999), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound));
}

#[tokio::test]
async fn test_guest_order_receipt() {
    let shop = Shop::new();
    let product = shop.product("teapot", "40.00", 10).await;
    let cart = shop
        .cart_for(&CartOwner::Session("guest".to_string()), &[(product, 1)])
        .await;
    let receipt = CheckoutService::new(&shop.state)
        .commit_order(commit_request(cart, None, None))
        .await
        .unwrap();

    let detail = OrderService::new(&shop.state)
        .detail(receipt.order.id, None)
        .await
        .unwrap();
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.order.user_id, None);
}

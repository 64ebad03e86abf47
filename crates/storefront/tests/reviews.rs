//! Review submission, moderation and lifecycle.

#![allow(clippy::unwrap_used)]

mod common;

use boutique_core::moderation::{ModerationRule, ReviewCandidate, ReviewRejection};
use boutique_core::{ProductId, UserId};
use boutique_storefront::db::Store;
use boutique_storefront::models::ReviewDraft;
use boutique_storefront::services::{CatalogService, CheckoutService, ReviewError, ReviewService};
use chrono::Duration;
use common::{Shop, commit_request, now};
use rust_decimal::Decimal;

fn candidate(rating: u8, title: &str, comment: &str) -> ReviewCandidate {
    ReviewCandidate {
        rating,
        title: title.to_string(),
        comment: comment.to_string(),
    }
}

async fn purchase(shop: &Shop, user: UserId, product: ProductId) {
    let cart = shop.cart(user, &[(product, 1)]).await;
    CheckoutService::new(&shop.state)
        .commit_order(commit_request(cart, Some(user), None))
        .await
        .unwrap();
}

/// Store `count` reviews by `user` on other products, written `age` ago.
async fn past_reviews(shop: &Shop, user: UserId, count: usize, age: Duration) {
    for i in 0..count {
        let product = shop.product(&format!("past-{user}-{i}"), "10.00", 1).await;
        let mut tx = shop.store.begin().await.unwrap();
        tx.upsert_review(
            &ReviewDraft {
                user_id: user,
                product_id: product,
                rating: 4,
                title: "Earlier review".to_string(),
                comment: "Written some time ago.".to_string(),
                approved: true,
                moderator_notes: String::new(),
            },
            now() - age,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }
}

// =============================================================================
// Auto-moderation
// =============================================================================

#[tokio::test]
async fn test_trusted_reviewer_is_published() {
    let shop = Shop::new();
    let product = shop.product("teapot", "40.00", 10).await;
    let user = UserId::new(1);
    purchase(&shop, user, product).await;
    past_reviews(&shop, user, 6, Duration::days(30)).await;

    let submitted = ReviewService::new(&shop.state)
        .submit(user, product, candidate(1, "Fissuré", "Arrivé fêlé, dommage."))
        .await
        .unwrap();

    assert!(submitted.review.approved);
    assert!(submitted.moderation.approved);
    assert_eq!(submitted.moderation.rule, ModerationRule::TrustedReviewer);
}

#[tokio::test]
async fn test_extreme_rating_with_short_comment_is_held() {
    let shop = Shop::new();
    let product = shop.product("teapot", "40.00", 10).await;
    let user = UserId::new(1);
    purchase(&shop, user, product).await;
    past_reviews(&shop, user, 3, Duration::days(30)).await;

    let comment = "Pas à la hauteur ici";
    assert_eq!(comment.chars().count(), 20);
    let submitted = ReviewService::new(&shop.state)
        .submit(user, product, candidate(1, "Décevant", comment))
        .await
        .unwrap();

    assert!(!submitted.review.approved);
    assert_eq!(submitted.moderation.rule, ModerationRule::ExtremeRating);
    assert_eq!(
        submitted.review.moderator_notes,
        "extreme rating with a comment that is too short"
    );
}

#[tokio::test]
async fn test_moderate_rating_without_signal_waits_for_a_moderator() {
    let shop = Shop::new();
    let product = shop.product("teapot", "40.00", 10).await;
    let user = UserId::new(1);
    purchase(&shop, user, product).await;

    let submitted = ReviewService::new(&shop.state)
        .submit(user, product, candidate(3, "Correctement emballé", "Livraison rapide."))
        .await
        .unwrap();

    assert!(!submitted.review.approved);
    assert_eq!(submitted.moderation.rule, ModerationRule::ManualReview);
}

#[tokio::test]
async fn test_resubmitting_overwrites_the_review() {
    let shop = Shop::new();
    let product = shop.product("teapot", "40.00", 10).await;
    let user = UserId::new(1);
    purchase(&shop, user, product).await;
    let reviews = ReviewService::new(&shop.state);

    let first = reviews
        .submit(user, product, candidate(3, "Premier avis", "Livraison rapide."))
        .await
        .unwrap();
    shop.clock.advance(Duration::minutes(5));
    let second = reviews
        .submit(
            user,
            product,
            candidate(4, "Avis mis à jour", "Très bon produit, je le recommande."),
        )
        .await
        .unwrap();

    assert_eq!(first.review.id, second.review.id);
    assert_eq!(second.review.rating, 4);
    assert_eq!(second.review.created_at, first.review.created_at);
    assert_eq!(second.review.updated_at, now() + Duration::minutes(5));
    assert!(second.review.approved);
}

// =============================================================================
// Pre-checks
// =============================================================================

#[tokio::test]
async fn test_new_reviewer_extreme_rating_needs_a_detailed_comment() {
    let shop = Shop::new();
    let product = shop.product("teapot", "40.00", 10).await;
    let user = UserId::new(1);
    purchase(&shop, user, product).await;

    let comment = "Pas à la hauteur ici";
    assert_eq!(comment.chars().count(), 20);
    let err = ReviewService::new(&shop.state)
        .submit(user, product, candidate(1, "Décevant", comment))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReviewError::Rejected(ReviewRejection::ExtremeRatingNeedsDetail { min: 50 })
    ));
    let mut tx = shop.store.begin().await.unwrap();
    assert_eq!(tx.count_reviews_by(user).await.unwrap(), 0);
}

#[tokio::test]
async fn test_review_requires_a_purchase() {
    let shop = Shop::new();
    let product = shop.product("teapot", "40.00", 10).await;

    let err = ReviewService::new(&shop.state)
        .submit(UserId::new(1), product, candidate(4, "Joli objet", "Bon produit."))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReviewError::Rejected(ReviewRejection::NotPurchased)
    ));
}

#[tokio::test]
async fn test_cancelled_order_does_not_count_as_purchase() {
    let shop = Shop::new();
    let product = shop.product("teapot", "40.00", 10).await;
    let user = UserId::new(1);
    let cart = shop.cart(user, &[(product, 1)]).await;
    let checkout = CheckoutService::new(&shop.state);
    let receipt = checkout
        .commit_order(commit_request(cart, Some(user), None))
        .await
        .unwrap();
    checkout.cancel_order(receipt.order.id).await.unwrap();

    let err = ReviewService::new(&shop.state)
        .submit(user, product, candidate(4, "Joli objet", "Bon produit."))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReviewError::Rejected(ReviewRejection::NotPurchased)
    ));
}

#[tokio::test]
async fn test_rate_limit_window() {
    let shop = Shop::new();
    let product = shop.product("teapot", "40.00", 10).await;
    let user = UserId::new(1);
    purchase(&shop, user, product).await;
    past_reviews(&shop, user, 3, Duration::minutes(10)).await;
    let reviews = ReviewService::new(&shop.state);

    let err = reviews
        .submit(user, product, candidate(4, "Joli objet", "Bon produit."))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReviewError::Rejected(ReviewRejection::RateLimited)
    ));

    shop.clock.advance(Duration::hours(1));
    reviews
        .submit(user, product, candidate(4, "Joli objet", "Bon produit."))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unknown_product() {
    let shop = Shop::new();

    let err = ReviewService::new(&shop.state)
        .submit(UserId::new(1), ProductId::new(999), candidate(4, "Joli", "Bon produit."))
        .await
        .unwrap_err();

    assert!(matches!(err, ReviewError::ProductNotFound));
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_report_approve_reject_delete() {
    let shop = Shop::new();
    let product = shop.product("teapot", "40.00", 10).await;
    let author = UserId::new(1);
    let reader = UserId::new(2);
    purchase(&shop, author, product).await;
    let reviews = ReviewService::new(&shop.state);

    let review = reviews
        .submit(author, product, candidate(3, "Correctement emballé", "Livraison rapide."))
        .await
        .unwrap()
        .review;

    let err = reviews
        .report(review.id, author, "spam".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::CannotReportOwn));

    let reported = reviews
        .report(review.id, reader, "hors sujet".to_string())
        .await
        .unwrap();
    assert!(reported.reported);
    assert_eq!(reported.report_reason.as_deref(), Some("hors sujet"));

    let approved = reviews.approve(review.id, None).await.unwrap();
    assert!(approved.approved);
    assert!(!approved.reported);
    assert_eq!(approved.report_reason, None);

    let rejected = reviews
        .reject(review.id, "off-topic".to_string())
        .await
        .unwrap();
    assert!(!rejected.approved);
    assert_eq!(rejected.moderator_notes, "off-topic");

    let err = reviews.delete(review.id, reader).await.unwrap_err();
    assert!(matches!(err, ReviewError::NotAuthor));

    reviews.delete(review.id, author).await.unwrap();
    let err = reviews.approve(review.id, None).await.unwrap_err();
    assert!(matches!(err, ReviewError::ReviewNotFound));
}

#[tokio::test]
async fn test_average_rating_counts_approved_reviews_only() {
    let shop = Shop::new();
    let product = shop.product("teapot", "40.00", 10).await;
    let reviews = ReviewService::new(&shop.state);

    for (id, rating) in [(1, 4), (2, 5)] {
        let user = UserId::new(id);
        purchase(&shop, user, product).await;
        past_reviews(&shop, user, 5, Duration::days(30)).await;
        reviews
            .submit(user, product, candidate(rating, "Très joli", "Belle finition."))
            .await
            .unwrap();
    }

    // Held for moderation, so not counted.
    let newcomer = UserId::new(3);
    purchase(&shop, newcomer, product).await;
    reviews
        .submit(newcomer, product, candidate(2, "Moyen", "Livraison rapide."))
        .await
        .unwrap();

    let detail = CatalogService::new(&shop.state)
        .product_detail(product)
        .await
        .unwrap();
    assert_eq!(detail.rating.count, 2);
    assert_eq!(detail.rating.average, Some(Decimal::new(45, 1)));
}

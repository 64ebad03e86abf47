//! Catalog listing and product detail.

#![allow(clippy::unwrap_used)]

mod common;

use boutique_storefront::db::RepositoryError;
use boutique_storefront::services::CatalogService;
use common::Shop;

#[tokio::test]
async fn test_listing_shows_available_products_newest_first() {
    let shop = Shop::new();
    let teapot = shop.product("teapot", "40.00", 3).await;
    let cups = shop.product("cups", "6.00", 5).await;
    shop.product("sold-out", "9.00", 0).await;

    let products = CatalogService::new(&shop.state)
        .list_products(None)
        .await
        .unwrap();

    let ids: Vec<_> = products.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![cups, teapot]);
}

#[tokio::test]
async fn test_listing_by_category_slug() {
    let shop = Shop::new();
    let tea = shop.category("tea").await;
    let ware = shop.category("teaware").await;
    let sencha = shop.product_in(tea, "sencha", "12.00", 4).await;
    shop.product_in(ware, "teapot", "40.00", 2).await;
    let catalog = CatalogService::new(&shop.state);

    let products = catalog.list_products(Some("tea")).await.unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products.first().unwrap().id, sencha);

    let err = catalog.list_products(Some("unknown")).await.unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound));
}

//! Catalog reads.

use boutique_core::ProductId;
use serde::Serialize;

use crate::db::{RepositoryError, Store, finish};
use crate::models::{Product, RatingSummary};
use crate::state::AppState;

/// A product with the statistics of its approved reviews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub rating: RatingSummary,
}

pub struct CatalogService<'a> {
    store: &'a dyn Store,
}

impl<'a> CatalogService<'a> {
    #[must_use]
    pub fn new(state: &'a AppState) -> Self {
        Self {
            store: state.store(),
        }
    }

    /// Products on sale, newest first. With a category slug, only that
    /// category's products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown category.
    pub async fn list_products(
        &self,
        category_slug: Option<&str>,
    ) -> Result<Vec<Product>, RepositoryError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let category = match category_slug {
                Some(slug) => Some(
                    tx.category_by_slug(slug)
                        .await?
                        .ok_or(RepositoryError::NotFound)?
                        .id,
                ),
                None => None,
            };
            tx.available_products(category).await
        }
        .await;
        finish(tx, result).await
    }

    /// Look up a product and its average rating.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown product.
    pub async fn product_detail(&self, id: ProductId) -> Result<ProductDetail, RepositoryError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let product = tx.product(id).await?.ok_or(RepositoryError::NotFound)?;
            let rating = tx.rating_summary(id).await?;
            Ok::<_, RepositoryError>(ProductDetail { product, rating })
        }
        .await;
        finish(tx, result).await
    }
}

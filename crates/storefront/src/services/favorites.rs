//! Favorite products.

use boutique_core::clock::Clock;
use boutique_core::{ProductId, UserId};
use thiserror::Error;
use tracing::instrument;

use crate::db::{RepositoryError, Store, StoreTx, finish};
use crate::models::Favorite;
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum FavoriteError {
    #[error("product not found")]
    ProductNotFound,

    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
}

pub struct FavoriteService<'a> {
    store: &'a dyn Store,
    clock: &'a dyn Clock,
}

impl<'a> FavoriteService<'a> {
    #[must_use]
    pub fn new(state: &'a AppState) -> Self {
        Self {
            store: state.store(),
            clock: state.clock(),
        }
    }

    /// Add the product to the user's favorites, or remove it if present.
    /// Returns whether it is now a favorite.
    ///
    /// # Errors
    ///
    /// Returns `FavoriteError::ProductNotFound` for an unknown product.
    #[instrument(skip(self))]
    pub async fn toggle(&self, user: UserId, product: ProductId) -> Result<bool, FavoriteError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = toggle_in(tx.as_mut(), user, product, now).await;
        finish(tx, result).await
    }

    /// Favorites of a user, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `FavoriteError::Persistence` if the store fails.
    pub async fn list(&self, user: UserId) -> Result<Vec<Favorite>, FavoriteError> {
        let mut tx = self.store.begin().await?;
        let result = tx.favorites(user).await.map_err(FavoriteError::from);
        finish(tx, result).await
    }
}

async fn toggle_in(
    tx: &mut dyn StoreTx,
    user: UserId,
    product: ProductId,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<bool, FavoriteError> {
    if tx.product(product).await?.is_none() {
        return Err(FavoriteError::ProductNotFound);
    }
    Ok(tx.toggle_favorite(user, product, now).await?)
}

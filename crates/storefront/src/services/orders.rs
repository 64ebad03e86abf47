//! Order reads: a buyer's history and a single receipt.

use boutique_core::{OrderId, UserId};

use crate::db::{RepositoryError, Store, finish};
use crate::models::{Order, OrderReceipt};
use crate::state::AppState;

/// Order history service.
pub struct OrderService<'a> {
    store: &'a dyn Store,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub fn new(state: &'a AppState) -> Self {
        Self {
            store: state.store(),
        }
    }

    /// Orders placed by `user`, newest first. Cancelled orders are listed
    /// with their status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the store fails.
    pub async fn history(&self, user: UserId) -> Result<Vec<Order>, RepositoryError> {
        let mut tx = self.store.begin().await?;
        let result = tx.orders_for_user(user).await;
        finish(tx, result).await
    }

    /// An order with its items. When `viewer` is given the order must be
    /// theirs; someone else's order reads as not found.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown or foreign order.
    pub async fn detail(
        &self,
        id: OrderId,
        viewer: Option<UserId>,
    ) -> Result<OrderReceipt, RepositoryError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let order = tx
                .order(id)
                .await?
                .filter(|order| viewer.is_none() || order.user_id == viewer)
                .ok_or(RepositoryError::NotFound)?;
            let items = tx.order_items(order.id).await?;
            Ok::<_, RepositoryError>(OrderReceipt { order, items })
        }
        .await;
        finish(tx, result).await
    }
}

//! Cart maintenance.
//!
//! Quantities are checked against the stock of the product when they are
//! written; checkout checks them again against the locked rows.

use boutique_core::cart::{CartLine, CartSnapshot};
use boutique_core::clock::Clock;
use boutique_core::{CartId, Money, ProductId, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::db::{RepositoryError, Store, StoreTx, finish};
use crate::models::{Cart, CartOwner};
use crate::state::AppState;

/// Cart operation errors.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("cart not found")]
    CartNotFound,

    #[error("product not found")]
    ProductNotFound,

    #[error("product is not available")]
    ProductUnavailable,

    #[error("insufficient stock: {available} available")]
    InsufficientStock { product: ProductId, available: i32 },

    #[error("quantity must be at least 1")]
    InvalidQuantity,

    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
}

/// A cart with its priced lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub cart: Cart,
    pub lines: Vec<CartLine>,
    pub subtotal: Money,
    pub total_quantity: i32,
}

impl CartView {
    fn new(cart: Cart, lines: Vec<CartLine>) -> Self {
        let snapshot = CartSnapshot::new(lines);
        Self {
            cart,
            subtotal: snapshot.subtotal(),
            total_quantity: snapshot.total_quantity(),
            lines: snapshot.lines,
        }
    }
}

/// Cart service.
pub struct CartService<'a> {
    store: &'a dyn Store,
    clock: &'a dyn Clock,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub fn new(state: &'a AppState) -> Self {
        Self {
            store: state.store(),
            clock: state.clock(),
        }
    }

    /// Add `quantity` units of a product to the owner's cart, creating the
    /// cart on first use. Adding a product already in the cart accumulates.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InsufficientStock` if the resulting quantity
    /// exceeds the stock, `CartError::ProductUnavailable` if the product
    /// cannot be sold.
    #[instrument(skip(self), fields(product_id = %product))]
    pub async fn add_item(
        &self,
        owner: &CartOwner,
        product: ProductId,
        quantity: i32,
    ) -> Result<CartView, CartError> {
        if quantity < 1 {
            return Err(CartError::InvalidQuantity);
        }

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            let cart = tx.cart_for_owner(owner, now).await?;
            let current = tx.cart_quantity(cart.id, product).await?.unwrap_or(0);
            let wanted = current.saturating_add(quantity);
            write_line(tx.as_mut(), &cart, product, wanted).await?;
            load_view(tx.as_mut(), cart).await
        }
        .await;
        finish(tx, result).await
    }

    /// Replace the quantity of a line. A quantity of zero removes it.
    ///
    /// # Errors
    ///
    /// Same as [`CartService::add_item`].
    #[instrument(skip(self), fields(product_id = %product))]
    pub async fn set_quantity(
        &self,
        owner: &CartOwner,
        product: ProductId,
        quantity: i32,
    ) -> Result<CartView, CartError> {
        if quantity < 0 {
            return Err(CartError::InvalidQuantity);
        }

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            let cart = tx.cart_for_owner(owner, now).await?;
            if quantity == 0 {
                tx.remove_cart_item(cart.id, product).await?;
            } else {
                write_line(tx.as_mut(), &cart, product, quantity).await?;
            }
            load_view(tx.as_mut(), cart).await
        }
        .await;
        finish(tx, result).await
    }

    /// Remove a product from a cart. Removing an absent line is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `CartError::CartNotFound` for an unknown cart.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        cart_id: CartId,
        product: ProductId,
    ) -> Result<CartView, CartError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let cart = tx.cart(cart_id).await?.ok_or(CartError::CartNotFound)?;
            tx.remove_cart_item(cart.id, product).await?;
            load_view(tx.as_mut(), cart).await
        }
        .await;
        finish(tx, result).await
    }

    /// Move a guest cart into the user's cart when the guest signs in.
    ///
    /// Quantities of products in both carts are added up, capped at the
    /// current stock; lines for products no longer on sale are dropped. The
    /// session cart is deleted. Without a session cart this only returns
    /// the user's cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Persistence` if the store fails.
    #[instrument(skip(self, session_key), fields(user_id = %user))]
    pub async fn merge_session_into_user(
        &self,
        session_key: &str,
        user: UserId,
    ) -> Result<CartView, CartError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = merge_in(tx.as_mut(), session_key, user, now).await;
        let result = finish(tx, result).await;

        if let Ok(view) = &result {
            tracing::info!(
                cart_id = %view.cart.id,
                total_quantity = view.total_quantity,
                "Session cart merged"
            );
        }
        result
    }

    /// Read a cart with current prices.
    ///
    /// # Errors
    ///
    /// Returns `CartError::CartNotFound` for an unknown cart.
    pub async fn view(&self, cart_id: CartId) -> Result<CartView, CartError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let cart = tx.cart(cart_id).await?.ok_or(CartError::CartNotFound)?;
            load_view(tx.as_mut(), cart).await
        }
        .await;
        finish(tx, result).await
    }
}

/// Store `quantity` for the line after checking the product can supply it.
async fn write_line(
    tx: &mut dyn StoreTx,
    cart: &Cart,
    product: ProductId,
    quantity: i32,
) -> Result<(), CartError> {
    let product = tx
        .product(product)
        .await?
        .ok_or(CartError::ProductNotFound)?;
    if !product.available {
        return Err(CartError::ProductUnavailable);
    }
    if quantity > product.stock {
        return Err(CartError::InsufficientStock {
            product: product.id,
            available: product.stock,
        });
    }
    tx.set_cart_quantity(cart.id, product.id, quantity).await?;
    Ok(())
}

async fn merge_in(
    tx: &mut dyn StoreTx,
    session_key: &str,
    user: UserId,
    now: DateTime<Utc>,
) -> Result<CartView, CartError> {
    let target = tx.cart_for_owner(&CartOwner::User(user), now).await?;
    let session = CartOwner::Session(session_key.to_owned());
    let Some(source) = tx.find_cart(&session).await? else {
        return load_view(tx, target).await;
    };

    for line in tx.cart_lines(source.id).await? {
        let Some(product) = tx.product(line.product_id).await? else {
            continue;
        };
        if !product.available {
            continue;
        }
        let current = tx.cart_quantity(target.id, product.id).await?.unwrap_or(0);
        let wanted = current.saturating_add(line.quantity).min(product.stock);
        if wanted > 0 {
            tx.set_cart_quantity(target.id, product.id, wanted).await?;
        }
    }
    tx.delete_cart(source.id).await?;

    load_view(tx, target).await
}

async fn load_view(tx: &mut dyn StoreTx, cart: Cart) -> Result<CartView, CartError> {
    let lines = tx.cart_lines(cart.id).await?;
    Ok(CartView::new(cart, lines))
}

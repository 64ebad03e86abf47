//! Order commit and cancellation.
//!
//! [`CheckoutService::commit_order`] turns a cart into an order inside one
//! transaction:
//!
//! 1. lock every product of the cart (in product id order) and check stock;
//! 2. lock the coupon and validate it again against the live cart;
//! 3. price the cart and insert the order with frozen totals;
//! 4. insert the items and decrement stock with guarded updates;
//! 5. count the coupon use (and the per-user redemption);
//! 6. empty the cart.
//!
//! Any failure rolls the whole transaction back, so stock, coupon usage and
//! the cart are left exactly as they were.

use boutique_core::cart::{CartLine, CartSnapshot};
use boutique_core::checkout::{ShippingInfo, ShippingInfoError};
use boutique_core::clock::Clock;
use boutique_core::coupon::{Coupon, CouponRejection, canonical_code};
use boutique_core::pricing::{PricingContext, PricingPolicy, price_cart};
use boutique_core::{CartId, OrderId, OrderStatus, ProductId, UserId};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use crate::db::{RepositoryError, Store, StoreTx, finish};
use crate::models::{NewOrder, Order, OrderReceipt};
use crate::state::AppState;

/// Why an order could not be committed.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("cart not found")]
    CartNotFound,

    #[error("cart is empty")]
    EmptyCart,

    /// A line asks for more than the product has in stock.
    #[error("insufficient stock for product {product}: {available} available")]
    InsufficientStock { product: ProductId, available: i32 },

    /// The coupon was valid when applied but no longer is.
    #[error("coupon is no longer valid: {reason}")]
    CouponNoLongerValid { reason: String },

    /// Malformed input; nothing was written.
    #[error("{0}")]
    Validation(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
}

impl From<ShippingInfoError> for CommitError {
    fn from(err: ShippingInfoError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Why an order could not be cancelled.
#[derive(Debug, Error)]
pub enum CancelError {
    #[error("order not found")]
    OrderNotFound,

    #[error("an order that is {status} can no longer be cancelled")]
    NotCancellable { status: OrderStatus },

    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
}

/// Input of [`CheckoutService::commit_order`].
#[derive(Debug, Clone, Deserialize)]
pub struct CommitRequest {
    pub cart_id: CartId,
    pub shipping: ShippingInfo,
    #[serde(default)]
    pub coupon_code: Option<String>,
    /// Signed-in buyer; `None` for guest checkout.
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// Checkout operations.
pub struct CheckoutService<'a> {
    store: &'a dyn Store,
    clock: &'a dyn Clock,
    pricing: &'a PricingPolicy,
}

impl<'a> CheckoutService<'a> {
    /// Create a checkout service over the application state.
    #[must_use]
    pub fn new(state: &'a AppState) -> Self {
        Self {
            store: state.store(),
            clock: state.clock(),
            pricing: state.pricing(),
        }
    }

    /// Convert a cart into an order.
    ///
    /// # Errors
    ///
    /// Returns a [`CommitError`]; the transaction is rolled back first.
    #[instrument(skip(self, request), fields(cart_id = %request.cart_id))]
    pub async fn commit_order(&self, request: CommitRequest) -> Result<OrderReceipt, CommitError> {
        let shipping = request.shipping.normalized()?;

        let mut tx = self.store.begin().await?;
        let result = self.commit_in(tx.as_mut(), &request, shipping).await;
        let result = finish(tx, result).await;

        match &result {
            Ok(receipt) => tracing::info!(
                order_id = %receipt.order.id,
                total = %receipt.order.total,
                coupon = ?request.coupon_code,
                "Order committed"
            ),
            Err(CommitError::Persistence(err)) => {
                tracing::error!(error = %err, "Order commit failed");
            }
            Err(err) => tracing::warn!(reason = %err, "Order commit rejected"),
        }

        result
    }

    async fn commit_in(
        &self,
        tx: &mut dyn StoreTx,
        request: &CommitRequest,
        shipping: ShippingInfo,
    ) -> Result<OrderReceipt, CommitError> {
        let now = self.clock.now();

        let cart = tx
            .cart(request.cart_id)
            .await?
            .ok_or(CommitError::CartNotFound)?;
        let owner_id = cart.owner.user_id();
        if let (Some(buyer), Some(owner)) = (request.user_id, owner_id)
            && buyer != owner
        {
            return Err(CommitError::Validation(
                "cart belongs to another user".to_owned(),
            ));
        }
        let buyer = request.user_id.or(owner_id);

        let lines = tx.cart_lines(cart.id).await?;
        if lines.is_empty() {
            return Err(CommitError::EmptyCart);
        }

        // Lines come ordered by product id, so concurrent commits lock in
        // the same order.
        let mut locked = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = tx.lock_product(line.product_id).await?;
            let product = match product {
                Some(p) if p.can_supply(line.quantity) => p,
                Some(p) => {
                    return Err(CommitError::InsufficientStock {
                        product: p.id,
                        available: if p.available { p.stock } else { 0 },
                    });
                }
                None => {
                    return Err(CommitError::InsufficientStock {
                        product: line.product_id,
                        available: 0,
                    });
                }
            };
            locked.push(CartLine {
                product_id: product.id,
                category_id: product.category_id,
                quantity: line.quantity,
                unit_price: product.price,
            });
        }
        let snapshot = CartSnapshot::new(locked);

        let coupon = match request.coupon_code.as_deref().map(canonical_code) {
            Some(code) if !code.is_empty() => {
                Some(lock_valid_coupon(tx, &code, buyer, &snapshot, now).await?)
            }
            _ => None,
        };

        let price = price_cart(
            &snapshot,
            &PricingContext::new(self.pricing).with_coupon(coupon.as_ref()),
        );

        let order = tx
            .insert_order(&NewOrder {
                user_id: buyer,
                shipping,
                price,
                coupon_id: coupon.as_ref().map(|c| c.id),
                created_at: now,
            })
            .await?;

        let mut items = Vec::with_capacity(snapshot.lines.len());
        for line in &snapshot.lines {
            items.push(
                tx.insert_order_item(order.id, line.product_id, line.unit_price, line.quantity)
                    .await?,
            );
            if !tx.decrement_stock(line.product_id, line.quantity).await? {
                let available = tx
                    .product(line.product_id)
                    .await?
                    .map_or(0, |p| p.stock);
                return Err(CommitError::InsufficientStock {
                    product: line.product_id,
                    available,
                });
            }
        }

        if let Some(coupon) = &coupon {
            if !tx.increment_coupon_usage(coupon.id).await? {
                return Err(CommitError::CouponNoLongerValid {
                    reason: CouponRejection::UsageLimitReached.to_string(),
                });
            }
            if coupon.single_use_per_user
                && let Some(user) = buyer
                && !tx.record_redemption(coupon.id, user, order.id).await?
            {
                return Err(CommitError::CouponNoLongerValid {
                    reason: CouponRejection::AlreadyRedeemed.to_string(),
                });
            }
        }

        tx.clear_cart(cart.id).await?;

        Ok(OrderReceipt { order, items })
    }

    /// Cancel an order and undo its side effects: restock every item,
    /// release the coupon use and the per-user redemption.
    ///
    /// # Errors
    ///
    /// Returns `CancelError::NotCancellable` once the order has shipped.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order, CancelError> {
        let mut tx = self.store.begin().await?;
        let result = cancel_in(tx.as_mut(), order_id).await;
        let result = finish(tx, result).await;

        if let Ok(order) = &result {
            tracing::info!(order_id = %order.id, "Order cancelled");
        }
        result
    }
}

/// Lock the coupon and check it against the live cart.
async fn lock_valid_coupon(
    tx: &mut dyn StoreTx,
    code: &str,
    buyer: Option<UserId>,
    cart: &CartSnapshot,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Coupon, CommitError> {
    let coupon = tx
        .lock_coupon_by_code(code)
        .await?
        .ok_or_else(|| CommitError::CouponNoLongerValid {
            reason: super::coupons::UNKNOWN_CODE.to_owned(),
        })?;

    let already_redeemed = match buyer {
        Some(user) if coupon.single_use_per_user => Some(tx.has_redeemed(coupon.id, user).await?),
        Some(_) => Some(false),
        None => None,
    };

    coupon
        .validate(now, already_redeemed, Some(cart))
        .map_err(|rejection| CommitError::CouponNoLongerValid {
            reason: rejection.to_string(),
        })?;

    Ok(coupon)
}

async fn cancel_in(tx: &mut dyn StoreTx, order_id: OrderId) -> Result<Order, CancelError> {
    let mut order = tx
        .lock_order(order_id)
        .await?
        .ok_or(CancelError::OrderNotFound)?;

    if !order.status.is_cancellable() {
        return Err(CancelError::NotCancellable {
            status: order.status,
        });
    }

    for item in tx.order_items(order.id).await? {
        tx.restock(item.product_id, item.quantity).await?;
    }

    if let Some(coupon) = order.coupon_id {
        tx.release_coupon_usage(coupon).await?;
        if let Some(user) = order.user_id {
            tx.delete_redemption(coupon, user).await?;
        }
    }

    tx.set_order_status(order.id, OrderStatus::Cancelled).await?;
    order.status = OrderStatus::Cancelled;
    Ok(order)
}

/// Commit the cart of `request` as an order.
///
/// # Errors
///
/// See [`CheckoutService::commit_order`].
pub async fn commit_order(
    state: &AppState,
    request: CommitRequest,
) -> Result<OrderReceipt, CommitError> {
    CheckoutService::new(state).commit_order(request).await
}

//! Cart route handlers.
//!
//! Carts are keyed by their owner: a `user_id` for signed-in shoppers or a
//! `session_key` for guests. Exactly one of them must be given.

use axum::extract::State;
use boutique_core::{CartId, ProductId, UserId};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::extract::{Json, Path};
use crate::models::CartOwner;
use crate::services::{CartService, CartView, CouponService, PricePreview};
use crate::state::AppState;

/// Owner of the cart a request acts on.
#[derive(Debug, Default, Deserialize)]
pub struct OwnerFields {
    pub user_id: Option<UserId>,
    pub session_key: Option<String>,
}

impl OwnerFields {
    /// Resolve the cart owner.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` unless exactly one identity is given.
    pub fn into_owner(self) -> Result<CartOwner> {
        let session_key = self.session_key.filter(|key| !key.trim().is_empty());
        match (self.user_id, session_key) {
            (Some(user), None) => Ok(CartOwner::User(user)),
            (None, Some(key)) => Ok(CartOwner::Session(key)),
            _ => Err(AppError::BadRequest(
                "exactly one of user_id or session_key is required".to_string(),
            )),
        }
    }
}

/// Add-to-cart request.
#[derive(Debug, Deserialize)]
pub struct CartItemRequest {
    #[serde(flatten)]
    pub owner: OwnerFields,
    pub product_id: ProductId,
    pub quantity: i32,
    /// Replace the line quantity instead of adding to it.
    #[serde(default)]
    pub replace: bool,
}

/// Price preview request.
#[derive(Debug, Default, Deserialize)]
pub struct PriceRequest {
    pub coupon_code: Option<String>,
    pub user_id: Option<UserId>,
}

/// Sign-in cart merge request.
#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub session_key: String,
    pub user_id: UserId,
}

/// Add a product to the owner's cart, or set its quantity.
pub async fn add(
    State(state): State<AppState>,
    Json(request): Json<CartItemRequest>,
) -> Result<Json<CartView>> {
    let owner = request.owner.into_owner()?;
    let service = CartService::new(&state);
    let view = if request.replace {
        service
            .set_quantity(&owner, request.product_id, request.quantity)
            .await?
    } else {
        service
            .add_item(&owner, request.product_id, request.quantity)
            .await?
    };
    Ok(Json(view))
}

/// Move the guest cart of `session_key` into the user's cart.
pub async fn merge(
    State(state): State<AppState>,
    Json(request): Json<MergeRequest>,
) -> Result<Json<CartView>> {
    let view = CartService::new(&state)
        .merge_session_into_user(&request.session_key, request.user_id)
        .await?;
    Ok(Json(view))
}

/// Cart with current prices.
pub async fn show(
    State(state): State<AppState>,
    Path(cart_id): Path<CartId>,
) -> Result<Json<CartView>> {
    Ok(Json(CartService::new(&state).view(cart_id).await?))
}

/// Remove a line from a cart.
pub async fn remove(
    State(state): State<AppState>,
    Path((cart_id, product_id)): Path<(CartId, ProductId)>,
) -> Result<Json<CartView>> {
    let view = CartService::new(&state)
        .remove_item(cart_id, product_id)
        .await?;
    Ok(Json(view))
}

/// Price a cart, with the coupon applied only if valid.
pub async fn price(
    State(state): State<AppState>,
    Path(cart_id): Path<CartId>,
    Json(request): Json<PriceRequest>,
) -> Result<Json<PricePreview>> {
    let preview = CouponService::new(&state)
        .preview_price(cart_id, request.coupon_code.as_deref(), request.user_id)
        .await?;
    Ok(Json(preview))
}

//! Order route handlers.

use axum::{extract::State, http::StatusCode};
use boutique_core::{OrderId, UserId};
use serde::Deserialize;
use tracing::instrument;

use crate::error::{Result, add_breadcrumb, set_sentry_user};
use crate::extract::{Json, Path, Query};
use crate::models::{Order, OrderReceipt};
use crate::services::{CheckoutService, CommitRequest, OrderService};
use crate::state::AppState;

/// Commit a cart as an order.
#[instrument(skip(state, request), fields(cart_id = %request.cart_id))]
pub async fn commit(
    State(state): State<AppState>,
    Json(request): Json<CommitRequest>,
) -> Result<(StatusCode, Json<OrderReceipt>)> {
    if let Some(user) = request.user_id {
        set_sentry_user(&user);
    }
    let cart_id = request.cart_id.to_string();
    add_breadcrumb("checkout", "Commit requested", Some(&[("cart_id", cart_id.as_str())]));

    let receipt = CheckoutService::new(&state).commit_order(request).await?;

    let order_id = receipt.order.id.to_string();
    add_breadcrumb("checkout", "Order committed", Some(&[("order_id", order_id.as_str())]));
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Who is looking at an order.
#[derive(Debug, Default, Deserialize)]
pub struct ViewerQuery {
    pub user_id: Option<UserId>,
}

/// An order with its items.
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Query(viewer): Query<ViewerQuery>,
) -> Result<Json<OrderReceipt>> {
    let receipt = OrderService::new(&state).detail(id, viewer.user_id).await?;
    Ok(Json(receipt))
}

/// A user's orders, newest first.
pub async fn history(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(OrderService::new(&state).history(user_id).await?))
}

/// Cancel an order, restocking its items and releasing its coupon.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    let order = CheckoutService::new(&state).cancel_order(id).await?;
    Ok(Json(order))
}

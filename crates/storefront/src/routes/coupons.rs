//! Coupon route handlers.

use axum::extract::State;
use boutique_core::coupon::CouponCheck;
use boutique_core::{CartId, UserId};
use serde::Deserialize;

use crate::error::Result;
use crate::extract::Json;
use crate::services::CouponService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub user_id: Option<UserId>,
    /// Cart to check the minimum amount and restrictions against.
    pub cart_id: Option<CartId>,
}

/// Validate a coupon code. An invalid code is a normal response with
/// `valid: false` and the reason.
pub async fn validate(
    State(state): State<AppState>,
    Json(request): Json<ValidateCouponRequest>,
) -> Result<Json<CouponCheck>> {
    let check = CouponService::new(&state)
        .validate_coupon(&request.code, request.user_id, request.cart_id)
        .await?;
    Ok(Json(check))
}

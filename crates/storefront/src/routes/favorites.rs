//! Favorite route handlers.

use axum::extract::State;
use boutique_core::{ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::extract::{Json, Path};
use crate::models::Favorite;
use crate::services::FavoriteService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub user_id: UserId,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub product_id: ProductId,
    pub favorite: bool,
}

pub async fn toggle(
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
    Json(request): Json<ToggleRequest>,
) -> Result<Json<ToggleResponse>> {
    let favorite = FavoriteService::new(&state)
        .toggle(request.user_id, product_id)
        .await?;
    Ok(Json(ToggleResponse {
        product_id,
        favorite,
    }))
}

pub async fn list(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Vec<Favorite>>> {
    Ok(Json(FavoriteService::new(&state).list(user_id).await?))
}

//! Product route handlers.

use axum::extract::State;
use boutique_core::ProductId;
use serde::Deserialize;

use crate::error::Result;
use crate::extract::{Json, Path, Query};
use crate::models::Product;
use crate::services::{CatalogService, ProductDetail};
use crate::state::AppState;

/// Catalog filter.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Category slug.
    pub category: Option<String>,
}

/// Products on sale, optionally from one category.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Product>>> {
    let products = CatalogService::new(&state)
        .list_products(query.category.as_deref())
        .await?;
    Ok(Json(products))
}

/// Product detail with the average of its approved ratings.
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<ProductDetail>> {
    let detail = CatalogService::new(&state).product_detail(id).await?;
    Ok(Json(detail))
}

//! Review route handlers.

use axum::{extract::State, http::StatusCode};
use boutique_core::moderation::ReviewCandidate;
use boutique_core::{ProductId, ReviewId, UserId};
use serde::Deserialize;

use crate::error::Result;
use crate::extract::{Json, Path, Query};
use crate::models::Review;
use crate::services::{ReviewService, SubmittedReview};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitReviewRequest {
    pub user_id: UserId,
    #[serde(flatten)]
    pub review: ReviewCandidate,
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModeratorNotes {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthorQuery {
    pub user_id: UserId,
}

/// Submit (or overwrite) a review of a product.
pub async fn submit(
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
    Json(request): Json<SubmitReviewRequest>,
) -> Result<(StatusCode, Json<SubmittedReview>)> {
    let submitted = ReviewService::new(&state)
        .submit(request.user_id, product_id, request.review)
        .await?;
    Ok((StatusCode::CREATED, Json(submitted)))
}

pub async fn report(
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
    Json(request): Json<ReportRequest>,
) -> Result<Json<Review>> {
    let review = ReviewService::new(&state)
        .report(id, request.user_id, request.reason)
        .await?;
    Ok(Json(review))
}

pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
    Json(request): Json<ModeratorNotes>,
) -> Result<Json<Review>> {
    let review = ReviewService::new(&state).approve(id, request.notes).await?;
    Ok(Json(review))
}

pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
    Json(request): Json<ModeratorNotes>,
) -> Result<Json<Review>> {
    let review = ReviewService::new(&state)
        .reject(id, request.notes.unwrap_or_default())
        .await?;
    Ok(Json(review))
}

/// Delete a review; only its author may.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
    Query(author): Query<AuthorQuery>,
) -> Result<StatusCode> {
    ReviewService::new(&state).delete(id, author.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

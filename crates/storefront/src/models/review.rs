//! Product review domain types.

use boutique_core::{ProductId, ReviewId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A product review. One per (user, product).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub rating: u8,
    pub title: String,
    pub comment: String,
    /// Published on the product page.
    pub approved: bool,
    pub reported: bool,
    pub report_reason: Option<String>,
    pub moderator_notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A moderated review to write, inserting or overwriting the
/// (user, product) pair.
///
/// Overwriting clears any previous report.
#[derive(Debug, Clone)]
pub struct ReviewDraft {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub rating: u8,
    pub title: String,
    pub comment: String,
    pub approved: bool,
    pub moderator_notes: String,
}

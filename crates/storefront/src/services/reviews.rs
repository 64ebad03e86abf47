//! Review submission and moderation lifecycle.

use boutique_core::clock::Clock;
use boutique_core::moderation::{
    ModerationOutcome, ModerationPolicy, ReviewCandidate, ReviewRejection, ReviewerHistory,
};
use boutique_core::{ProductId, ReviewId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::db::{RepositoryError, Store, StoreTx, finish};
use crate::models::{Review, ReviewDraft};
use crate::state::AppState;

/// Review operation errors.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// The review failed a pre-check; nothing was stored.
    #[error(transparent)]
    Rejected(#[from] ReviewRejection),

    #[error("product not found")]
    ProductNotFound,

    #[error("review not found")]
    ReviewNotFound,

    #[error("you cannot report your own review")]
    CannotReportOwn,

    #[error("only the author can delete a review")]
    NotAuthor,

    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
}

/// A stored review with the decision that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedReview {
    pub review: Review,
    pub moderation: ModerationOutcome,
}

/// Review service.
pub struct ReviewService<'a> {
    store: &'a dyn Store,
    clock: &'a dyn Clock,
    policy: &'a ModerationPolicy,
}

impl<'a> ReviewService<'a> {
    #[must_use]
    pub fn new(state: &'a AppState) -> Self {
        Self {
            store: state.store(),
            clock: state.clock(),
            policy: state.moderation(),
        }
    }

    /// Moderate and store a review, overwriting the user's previous review
    /// of the product.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::Rejected` when a pre-check fails.
    #[instrument(skip(self, candidate), fields(user_id = %user, product_id = %product))]
    pub async fn submit(
        &self,
        user: UserId,
        product: ProductId,
        candidate: ReviewCandidate,
    ) -> Result<SubmittedReview, ReviewError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = submit_in(tx.as_mut(), self.policy, user, product, &candidate, now).await;
        let result = finish(tx, result).await;

        match &result {
            Ok(submitted) => tracing::info!(
                review_id = %submitted.review.id,
                approved = submitted.moderation.approved,
                rule = ?submitted.moderation.rule,
                "Review moderated"
            ),
            Err(ReviewError::Rejected(reason)) => {
                tracing::info!(%reason, "Review rejected");
            }
            Err(_) => {}
        }
        result
    }

    /// Flag someone else's review for moderators.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::CannotReportOwn` when `reporter` wrote it.
    #[instrument(skip(self, reason))]
    pub async fn report(
        &self,
        id: ReviewId,
        reporter: UserId,
        reason: String,
    ) -> Result<Review, ReviewError> {
        self.update(id, |review| {
            if review.user_id == reporter {
                return Err(ReviewError::CannotReportOwn);
            }
            review.reported = true;
            review.report_reason = Some(reason);
            Ok(())
        })
        .await
    }

    /// Publish a review and clear any report.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::ReviewNotFound` for an unknown review.
    #[instrument(skip(self, notes))]
    pub async fn approve(&self, id: ReviewId, notes: Option<String>) -> Result<Review, ReviewError> {
        self.update(id, |review| {
            review.approved = true;
            review.reported = false;
            review.report_reason = None;
            if let Some(notes) = notes {
                review.moderator_notes = notes;
            }
            Ok(())
        })
        .await
    }

    /// Unpublish a review.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::ReviewNotFound` for an unknown review.
    #[instrument(skip(self, notes))]
    pub async fn reject(&self, id: ReviewId, notes: String) -> Result<Review, ReviewError> {
        self.update(id, |review| {
            review.approved = false;
            review.moderator_notes = notes;
            Ok(())
        })
        .await
    }

    /// Delete a review on behalf of its author.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::NotAuthor` when `user` did not write it.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: ReviewId, user: UserId) -> Result<(), ReviewError> {
        let mut tx = self.store.begin().await?;
        let result = delete_in(tx.as_mut(), id, user).await;
        finish(tx, result).await
    }

    async fn update<F>(&self, id: ReviewId, apply: F) -> Result<Review, ReviewError>
    where
        F: FnOnce(&mut Review) -> Result<(), ReviewError> + Send,
    {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = update_in(tx.as_mut(), id, apply, now).await;
        finish(tx, result).await
    }
}

async fn submit_in(
    tx: &mut dyn StoreTx,
    policy: &ModerationPolicy,
    user: UserId,
    product: ProductId,
    candidate: &ReviewCandidate,
    now: DateTime<Utc>,
) -> Result<SubmittedReview, ReviewError> {
    if tx.product(product).await?.is_none() {
        return Err(ReviewError::ProductNotFound);
    }

    // Held until commit: the counts below stay true while this review is stored.
    tx.lock_reviewer(user).await?;
    let window_start = now - Duration::minutes(policy.rate_limit_window_minutes);
    let history = ReviewerHistory {
        has_purchased: tx.has_purchased(user, product).await?,
        prior_reviews: tx.count_reviews_by(user).await?,
        recent_reviews: tx.count_reviews_since(user, window_start).await?,
    };

    let candidate = ReviewCandidate {
        rating: candidate.rating,
        title: candidate.title.trim().to_owned(),
        comment: candidate.comment.trim().to_owned(),
    };
    let moderation = policy.moderate(&candidate, &history)?;

    let review = tx
        .upsert_review(
            &ReviewDraft {
                user_id: user,
                product_id: product,
                rating: candidate.rating,
                title: candidate.title,
                comment: candidate.comment,
                approved: moderation.approved,
                moderator_notes: moderation.notes.clone(),
            },
            now,
        )
        .await?;

    Ok(SubmittedReview { review, moderation })
}

async fn update_in<F>(
    tx: &mut dyn StoreTx,
    id: ReviewId,
    apply: F,
    now: DateTime<Utc>,
) -> Result<Review, ReviewError>
where
    F: FnOnce(&mut Review) -> Result<(), ReviewError> + Send,
{
    let mut review = tx.review(id).await?.ok_or(ReviewError::ReviewNotFound)?;
    apply(&mut review)?;
    tx.update_review_moderation(&review, now).await?;
    review.updated_at = now;
    Ok(review)
}

async fn delete_in(tx: &mut dyn StoreTx, id: ReviewId, user: UserId) -> Result<(), ReviewError> {
    let review = tx.review(id).await?.ok_or(ReviewError::ReviewNotFound)?;
    if review.user_id != user {
        return Err(ReviewError::NotAuthor);
    }
    tx.delete_review(id).await?;
    Ok(())
}

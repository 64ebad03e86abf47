//! Review moderation rules.
//!
//! A submitted review first goes through hard pre-checks (eligibility, rate
//! limit, content hygiene). If it passes, an ordered list of auto-moderation
//! rules decides whether it is published immediately or held for a human
//! moderator. The engine never rejects a review outright; rejection is a
//! later moderator action.
//!
//! ```text
//! candidate ──pre-checks──▶ ReviewRejection (nothing stored)
//!     │
//!     └──rules──▶ TrustedReviewer   → approved
//!                 ModerateRating    → approved
//!                 SensitiveContent  → pending + note
//!                 ExtremeRating     → pending + note
//!                 ManualReview      → pending
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terms that make a review unpublishable.
const DEFAULT_DENYLIST: &[&str] = &[
    "spam", "arnaque", "escroc", "merde", "connard", "pute", "salope", "putain", "enculé",
    "bâtard", "abruti", "idiot", "débile", "chienne", "foutre", "bordel", "porn", "sexe",
    "masturb", "sodom", "viol ", "meurtre", "tuer", "massacre", "raciste", "nazi", "terror",
    "haineux", "suicide", "drogue", "héroïne", "toxico",
];

/// Terms that hold a review for a human moderator.
const DEFAULT_SENSITIVE_TERMS: &[&str] = &[
    "arnaqu", "escroc", "vol", "inutil", "nul", "horrible", "terrible",
];

/// Terms suggesting a constructive moderate review.
const DEFAULT_POSITIVE_TERMS: &[&str] =
    &["bon", "bien", "correct", "satisfait", "recommandé", "qualité"];

/// Why a review was refused before moderation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewRejection {
    #[error("you must have ordered this product to review it")]
    NotPurchased,
    #[error("you have submitted too many reviews recently, please wait before posting again")]
    RateLimited,
    #[error("rating must be between 1 and 5")]
    InvalidRating,
    #[error("title must be between {min} and {max} characters")]
    TitleLength { min: usize, max: usize },
    #[error("title contains inappropriate words")]
    InappropriateTitle,
    #[error("comment must be between {min} and {max} characters")]
    CommentLength { min: usize, max: usize },
    #[error("comment contains inappropriate words")]
    InappropriateComment,
    #[error("please avoid writing in capital letters")]
    Shouting,
    #[error("ratings of 1 or 5 stars need a comment of at least {min} characters explaining them")]
    ExtremeRatingNeedsDetail { min: usize },
}

/// A review as submitted by a shopper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewCandidate {
    pub rating: u8,
    pub title: String,
    pub comment: String,
}

/// What the store knows about the reviewer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerHistory {
    /// Has a non-cancelled order containing the product.
    pub has_purchased: bool,
    /// Reviews by this user on any product.
    pub prior_reviews: u32,
    /// Reviews by this user created inside the rate-limit window.
    pub recent_reviews: u32,
}

/// The auto-moderation rule that produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationRule {
    TrustedReviewer,
    ModerateRating,
    SensitiveContent,
    ExtremeRating,
    ManualReview,
}

/// Result of auto-moderation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationOutcome {
    pub approved: bool,
    /// Note for moderators; empty when there is nothing to flag.
    pub notes: String,
    pub rule: ModerationRule,
}

impl ModerationOutcome {
    fn approve(rule: ModerationRule) -> Self {
        Self {
            approved: true,
            notes: String::new(),
            rule,
        }
    }

    fn hold(rule: ModerationRule, notes: impl Into<String>) -> Self {
        Self {
            approved: false,
            notes: notes.into(),
            rule,
        }
    }
}

/// Thresholds and word lists of the moderation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationPolicy {
    /// Terms rejected in titles and comments (case-insensitive substring).
    pub denylist: Vec<String>,
    /// Terms that force manual review.
    pub sensitive_terms: Vec<String>,
    /// Terms that let a moderate rating through.
    pub positive_terms: Vec<String>,
    pub title_min: usize,
    pub title_max: usize,
    pub comment_min: usize,
    pub comment_max: usize,
    /// Comments longer than this are checked for shouting.
    pub shouting_min_length: usize,
    /// Maximum share of upper-case characters, in percent.
    pub max_uppercase_percent: usize,
    /// Reviews allowed inside the rate-limit window.
    pub rate_limit: u32,
    pub rate_limit_window_minutes: i64,
    /// Reviewers with fewer reviews must justify extreme ratings.
    pub scrutiny_below_reviews: u32,
    pub extreme_rating_min_comment: usize,
    /// Reviewers with at least this many reviews are published directly.
    pub trusted_after_reviews: u32,
    /// Moderate ratings with a comment longer than this are published.
    pub moderate_long_comment: usize,
    /// Extreme ratings with a comment shorter than this are held.
    pub extreme_short_comment: usize,
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        Self {
            denylist: to_owned_terms(DEFAULT_DENYLIST),
            sensitive_terms: to_owned_terms(DEFAULT_SENSITIVE_TERMS),
            positive_terms: to_owned_terms(DEFAULT_POSITIVE_TERMS),
            title_min: 5,
            title_max: 100,
            comment_min: 10,
            comment_max: 1000,
            shouting_min_length: 20,
            max_uppercase_percent: 50,
            rate_limit: 3,
            rate_limit_window_minutes: 60,
            scrutiny_below_reviews: 3,
            extreme_rating_min_comment: 50,
            trusted_after_reviews: 5,
            moderate_long_comment: 50,
            extreme_short_comment: 30,
        }
    }
}

fn to_owned_terms(terms: &[&str]) -> Vec<String> {
    terms.iter().map(|t| (*t).to_owned()).collect()
}

/// First term of `terms` found in `text`, ignoring case.
fn find_term<'t>(text: &str, terms: &'t [String]) -> Option<&'t str> {
    let text = text.to_lowercase();
    terms
        .iter()
        .map(String::as_str)
        .filter(|term| !term.is_empty())
        .find(|term| text.contains(&term.to_lowercase()))
}

const fn is_extreme(rating: u8) -> bool {
    rating == 1 || rating == 5
}

impl ModerationPolicy {
    /// Hard validation applied before any moderation rule.
    ///
    /// # Errors
    ///
    /// Returns the first failed check as a [`ReviewRejection`].
    pub fn precheck(
        &self,
        candidate: &ReviewCandidate,
        history: &ReviewerHistory,
    ) -> Result<(), ReviewRejection> {
        if !history.has_purchased {
            return Err(ReviewRejection::NotPurchased);
        }

        if history.recent_reviews >= self.rate_limit {
            return Err(ReviewRejection::RateLimited);
        }

        if !(1..=5).contains(&candidate.rating) {
            return Err(ReviewRejection::InvalidRating);
        }

        let title_len = candidate.title.chars().count();
        if title_len < self.title_min || title_len > self.title_max {
            return Err(ReviewRejection::TitleLength {
                min: self.title_min,
                max: self.title_max,
            });
        }
        if find_term(&candidate.title, &self.denylist).is_some() {
            return Err(ReviewRejection::InappropriateTitle);
        }

        let comment_len = candidate.comment.chars().count();
        if comment_len < self.comment_min || comment_len > self.comment_max {
            return Err(ReviewRejection::CommentLength {
                min: self.comment_min,
                max: self.comment_max,
            });
        }
        if find_term(&candidate.comment, &self.denylist).is_some() {
            return Err(ReviewRejection::InappropriateComment);
        }

        if comment_len > self.shouting_min_length {
            let uppercase = candidate.comment.chars().filter(|c| c.is_uppercase()).count();
            if uppercase * 100 > comment_len * self.max_uppercase_percent {
                return Err(ReviewRejection::Shouting);
            }
        }

        if history.prior_reviews < self.scrutiny_below_reviews
            && is_extreme(candidate.rating)
            && comment_len < self.extreme_rating_min_comment
        {
            return Err(ReviewRejection::ExtremeRatingNeedsDetail {
                min: self.extreme_rating_min_comment,
            });
        }

        Ok(())
    }

    /// Auto-moderation decision for a review that passed [`Self::precheck`].
    #[must_use]
    pub fn decide(
        &self,
        candidate: &ReviewCandidate,
        history: &ReviewerHistory,
    ) -> ModerationOutcome {
        if history.prior_reviews >= self.trusted_after_reviews {
            return ModerationOutcome::approve(ModerationRule::TrustedReviewer);
        }

        let comment_len = candidate.comment.chars().count();

        if matches!(candidate.rating, 2..=4)
            && (find_term(&candidate.comment, &self.positive_terms).is_some()
                || comment_len > self.moderate_long_comment)
        {
            return ModerationOutcome::approve(ModerationRule::ModerateRating);
        }

        let sensitive = find_term(&candidate.comment, &self.sensitive_terms)
            .or_else(|| find_term(&candidate.title, &self.sensitive_terms));
        if let Some(term) = sensitive {
            return ModerationOutcome::hold(
                ModerationRule::SensitiveContent,
                format!("sensitive content detected: {term}"),
            );
        }

        if is_extreme(candidate.rating) && comment_len < self.extreme_short_comment {
            return ModerationOutcome::hold(
                ModerationRule::ExtremeRating,
                "extreme rating with a comment that is too short",
            );
        }

        ModerationOutcome::hold(ModerationRule::ManualReview, "")
    }

    /// Pre-check then decide.
    ///
    /// # Errors
    ///
    /// Returns a [`ReviewRejection`] when a pre-check fails.
    pub fn moderate(
        &self,
        candidate: &ReviewCandidate,
        history: &ReviewerHistory,
    ) -> Result<ModerationOutcome, ReviewRejection> {
        self.precheck(candidate, history)?;
        Ok(self.decide(candidate, history))
    }
}

/// Moderate a review with the given policy.
///
/// # Errors
///
/// Returns a [`ReviewRejection`] when a pre-check fails.
pub fn moderate_review(
    candidate: &ReviewCandidate,
    history: &ReviewerHistory,
    policy: &ModerationPolicy,
) -> Result<ModerationOutcome, ReviewRejection> {
    policy.moderate(candidate, history)
}

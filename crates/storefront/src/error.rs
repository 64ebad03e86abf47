//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers return `Result<T, AppError>`.
//! Service errors convert into the variant matching their HTTP status.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use boutique_core::ProductId;
use boutique_core::moderation::ReviewRejection;
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::{CancelError, CartError, CommitError, FavoriteError, ReviewError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(RepositoryError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Well-formed request refused by a business rule.
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    /// Request conflicts with the current state (stock, coupon usage).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Conflict whose cause is also returned as fields of the body.
    #[error("Conflict: {message}")]
    ConflictDetail {
        message: String,
        detail: ConflictDetail,
    },

    /// Caller may not act on this resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Rate limited.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Machine-readable cause of a conflict, flattened into the error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConflictDetail {
    InsufficientStock {
        product_id: ProductId,
        available: i32,
    },
    CouponNoLongerValid {
        reason: String,
    },
}

impl AppError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) | Self::ConflictDetail { .. } => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Message shown to the client.
    fn client_message(&self) -> String {
        match self {
            // Don't expose internal error details to clients
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::NotFound(msg)
            | Self::BadRequest(msg)
            | Self::Unprocessable(msg)
            | Self::Conflict(msg)
            | Self::Forbidden(msg)
            | Self::RateLimited(msg)
            | Self::ConflictDetail { message: msg, .. } => msg.clone(),
        }
    }

    /// JSON body: `{"error": message}` plus the conflict fields, if any.
    fn body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({ "error": self.client_message() });
        if let Self::ConflictDetail { detail, .. } = self
            && let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(detail)
            && let Some(object) = body.as_object_mut()
        {
            object.extend(fields);
        }
        body
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if matches!(self, Self::Database(_) | Self::Internal(_)) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (self.status(), Json(self.body())).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound("not found".to_string()),
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Database(other),
        }
    }
}

impl From<CommitError> for AppError {
    fn from(err: CommitError) -> Self {
        match err {
            CommitError::CartNotFound => Self::NotFound(err.to_string()),
            CommitError::EmptyCart => Self::Unprocessable(err.to_string()),
            CommitError::InsufficientStock { product, available } => Self::ConflictDetail {
                message: err.to_string(),
                detail: ConflictDetail::InsufficientStock {
                    product_id: product,
                    available,
                },
            },
            CommitError::CouponNoLongerValid { ref reason } => Self::ConflictDetail {
                detail: ConflictDetail::CouponNoLongerValid {
                    reason: reason.clone(),
                },
                message: err.to_string(),
            },
            CommitError::Validation(msg) => Self::BadRequest(msg),
            CommitError::Persistence(err) => err.into(),
        }
    }
}

impl From<CancelError> for AppError {
    fn from(err: CancelError) -> Self {
        match err {
            CancelError::OrderNotFound => Self::NotFound(err.to_string()),
            CancelError::NotCancellable { .. } => Self::Conflict(err.to_string()),
            CancelError::Persistence(err) => err.into(),
        }
    }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::CartNotFound | CartError::ProductNotFound => Self::NotFound(err.to_string()),
            CartError::InsufficientStock { product, available } => Self::ConflictDetail {
                message: err.to_string(),
                detail: ConflictDetail::InsufficientStock {
                    product_id: product,
                    available,
                },
            },
            CartError::ProductUnavailable => Self::Conflict(err.to_string()),
            CartError::InvalidQuantity => Self::BadRequest(err.to_string()),
            CartError::Persistence(err) => err.into(),
        }
    }
}

impl From<ReviewError> for AppError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::Rejected(ReviewRejection::RateLimited) => {
                Self::RateLimited(err.to_string())
            }
            ReviewError::Rejected(ReviewRejection::NotPurchased)
            | ReviewError::CannotReportOwn
            | ReviewError::NotAuthor => Self::Forbidden(err.to_string()),
            ReviewError::Rejected(_) => Self::Unprocessable(err.to_string()),
            ReviewError::ProductNotFound | ReviewError::ReviewNotFound => {
                Self::NotFound(err.to_string())
            }
            ReviewError::Persistence(err) => err.into(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<FavoriteError> for AppError {
    fn from(err: FavoriteError) -> Self {
        match err {
            FavoriteError::ProductNotFound => Self::NotFound(err.to_string()),
            FavoriteError::Persistence(err) => err.into(),
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Identity is resolved upstream; call this once a request names its user.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("checkout", "Order committed", Some(&[("order_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

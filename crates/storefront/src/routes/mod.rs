//! HTTP route handlers for the storefront JSON API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                               - Liveness
//! GET    /health/ready                         - Store reachability
//!
//! # Catalog
//! GET    /products?category=                   - Products on sale, by category slug
//! GET    /products/{id}                        - Product with average rating
//!
//! # Carts
//! POST   /carts/items                          - Add or set a line (stock-checked)
//! POST   /carts/merge                          - Merge a guest cart on sign-in
//! GET    /carts/{cart_id}                      - Cart with current prices
//! DELETE /carts/{cart_id}/items/{product_id}   - Remove a line
//! POST   /carts/{cart_id}/price                - Price preview, optional coupon
//!
//! # Coupons
//! POST   /coupons/validate                     - Validate a code against a cart
//!
//! # Orders
//! POST   /orders                               - Commit a cart
//! GET    /orders/{id}?user_id=                 - Order with its items
//! POST   /orders/{id}/cancel                   - Cancel and compensate
//! GET    /users/{id}/orders                    - Order history
//!
//! # Reviews
//! POST   /products/{id}/reviews                - Submit or overwrite a review
//! POST   /reviews/{id}/report                  - Report someone else's review
//! POST   /reviews/{id}/approve                 - Moderator approval
//! POST   /reviews/{id}/reject                  - Moderator rejection
//! DELETE /reviews/{id}?user_id=                - Author deletes own review
//!
//! # Favorites
//! POST   /favorites/{product_id}/toggle        - Toggle a favorite
//! GET    /users/{id}/favorites                 - List favorites
//! ```
//!
//! Identity is resolved upstream: requests name their `user_id` (or a guest
//! `session_key` for carts).

pub mod cart;
pub mod coupons;
pub mod favorites;
pub mod orders;
pub mod products;
pub mod reviews;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::list))
        .route("/{id}", get(products::show))
        .route("/{id}/reviews", post(reviews::submit))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/items", post(cart::add))
        .route("/merge", post(cart::merge))
        .route("/{cart_id}", get(cart::show))
        .route("/{cart_id}/items/{product_id}", delete(cart::remove))
        .route("/{cart_id}/price", post(cart::price))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(orders::commit))
        .route("/{id}", get(orders::show))
        .route("/{id}/cancel", post(orders::cancel))
}

/// Create the review routes router.
pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/{id}", delete(reviews::delete))
        .route("/{id}/report", post(reviews::report))
        .route("/{id}/approve", post(reviews::approve))
        .route("/{id}/reject", post(reviews::reject))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/products", product_routes())
        .nest("/carts", cart_routes())
        .route("/coupons/validate", post(coupons::validate))
        .nest("/orders", order_routes())
        .nest("/reviews", review_routes())
        .route("/favorites/{product_id}/toggle", post(favorites::toggle))
        .route("/users/{id}/favorites", get(favorites::list))
        .route("/users/{id}/orders", get(orders::history))
}

/// Build the application router with health checks and request tracing.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().ping().await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            tracing::warn!(error = %err, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

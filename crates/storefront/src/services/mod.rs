//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `cart` - Cart maintenance (add, set quantity, remove, merge on sign-in)
//! - `catalog` - Product listing and detail with average rating
//! - `checkout` - Order commit and cancellation
//! - `coupons` - Coupon validation and price previews
//! - `favorites` - Favorite products
//! - `orders` - Order history and receipts
//! - `reviews` - Review submission and moderator actions
//!
//! Every service borrows the [`AppState`](crate::state::AppState) and runs
//! each operation in one store transaction.

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod coupons;
pub mod favorites;
pub mod orders;
pub mod reviews;

pub use cart::{CartError, CartService, CartView};
pub use catalog::{CatalogService, ProductDetail};
pub use checkout::{CancelError, CheckoutService, CommitError, CommitRequest, commit_order};
pub use coupons::{CouponService, PricePreview};
pub use favorites::{FavoriteError, FavoriteService};
pub use orders::OrderService;
pub use reviews::{ReviewError, ReviewService, SubmittedReview};

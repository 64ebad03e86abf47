//! Domain models for the storefront.
//!
//! These types represent validated domain objects separate from database row
//! types. Coupons are modelled by [`boutique_core::coupon::Coupon`].

pub mod cart;
pub mod catalog;
pub mod favorite;
pub mod order;
pub mod review;

pub use cart::{Cart, CartOwner};
pub use catalog::{Category, NewCategory, NewProduct, Product, RatingSummary};
pub use favorite::Favorite;
pub use order::{NewOrder, Order, OrderItem, OrderReceipt};
pub use review::{Review, ReviewDraft};

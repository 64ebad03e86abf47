//! Boutique Core - Storefront business rules.
//!
//! This crate holds the rules every Boutique component agrees on:
//! - [`coupon`] - Coupon codes and their validation
//! - [`pricing`] - Discount, shipping and total computation for a cart
//! - [`moderation`] - Pre-checks and auto-moderation of product reviews
//! - [`checkout`] - Shipping details captured when an order is placed
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP. Callers load the data (cart lines, coupon,
//! reviewer history), pass it in, and persist the result themselves.
//! "Now" is always supplied by the caller, see [`clock`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod checkout;
pub mod clock;
pub mod coupon;
pub mod moderation;
pub mod pricing;
pub mod types;

pub use types::*;

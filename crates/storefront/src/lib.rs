//! Boutique Storefront library.
//!
//! This crate provides the storefront functionality as a library,
//! allowing it to be tested and reused: persistence behind the [`db::Store`]
//! trait, services for carts, checkout, coupons, reviews and favorites, and
//! the JSON HTTP API built by [`routes::app`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

//! Core value types for Boutique.
//!
//! This module provides type-safe wrappers for IDs, money and statuses.

pub mod id;
pub mod money;
pub mod status;

pub use id::*;
pub use money::Money;
pub use status::*;

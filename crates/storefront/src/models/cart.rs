//! Cart domain types.

use boutique_core::{CartId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who a cart belongs to.
///
/// Identity is resolved by the caller: a signed-in user, or an anonymous
/// session key for guests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartOwner {
    User(UserId),
    Session(String),
}

impl CartOwner {
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::User(id) => Some(*id),
            Self::Session(_) => None,
        }
    }
}

/// A shopping cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub owner: CartOwner,
    pub created_at: DateTime<Utc>,
}

//! Read-only cart snapshots fed to the pricing engine.

use serde::{Deserialize, Serialize};

use crate::types::{CategoryId, Money, ProductId};

/// One cart line resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub category_id: CategoryId,
    /// Always at least 1.
    pub quantity: i32,
    /// Product price at the moment the snapshot was taken.
    pub unit_price: Money,
}

impl CartLine {
    /// `quantity × unit_price`.
    #[must_use]
    pub fn cost(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// Lines of a cart at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub lines: Vec<CartLine>,
}

impl CartSnapshot {
    #[must_use]
    pub const fn new(lines: Vec<CartLine>) -> Self {
        Self { lines }
    }

    /// Sum of all line costs.
    #[must_use]
    pub fn subtotal(&self) -> Money {
        self.lines.iter().map(CartLine::cost).sum()
    }

    #[must_use]
    pub fn total_quantity(&self) -> i32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

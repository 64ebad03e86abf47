//! Catalog domain types.

use boutique_core::{CategoryId, Money, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    /// Unique URL slug.
    pub slug: String,
}

/// A sellable product.
///
/// `available` is false whenever `stock` is zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub category_id: CategoryId,
    pub name: String,
    pub slug: String,
    pub price: Money,
    pub stock: i32,
    pub available: bool,
}

impl Product {
    /// Whether `quantity` units can be sold right now.
    #[must_use]
    pub const fn can_supply(&self, quantity: i32) -> bool {
        self.available && quantity <= self.stock
    }
}

/// Category to create or update by slug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub slug: String,
}

/// Product to create or update by slug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub category_id: CategoryId,
    pub name: String,
    pub slug: String,
    pub price: Money,
    pub stock: i32,
}

/// Approved-review statistics of a product.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingSummary {
    /// Mean rating rounded to one decimal place, `None` without reviews.
    pub average: Option<Decimal>,
    pub count: i64,
}

impl RatingSummary {
    /// Build a summary from the sum and count of approved ratings.
    #[must_use]
    pub fn from_totals(sum: i64, count: i64) -> Self {
        let average = (count > 0).then(|| {
            (Decimal::from(sum) / Decimal::from(count))
                .round_dp_with_strategy(1, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
        });
        Self { average, count }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_summary() {
        assert_eq!(RatingSummary::from_totals(0, 0).average, None);
        assert_eq!(
            RatingSummary::from_totals(13, 3).average,
            Some(Decimal::new(43, 1))
        );
        assert_eq!(
            RatingSummary::from_totals(9, 2).average,
            Some(Decimal::new(45, 1))
        );
    }

    #[test]
    fn test_can_supply() {
        let mut product = Product {
            id: ProductId::new(1),
            category_id: CategoryId::new(1),
            name: "Linen shirt".to_owned(),
            slug: "linen-shirt".to_owned(),
            price: Money::from_minor(4500),
            stock: 2,
            available: true,
        };
        assert!(product.can_supply(2));
        assert!(!product.can_supply(3));
        product.available = false;
        assert!(!product.can_supply(1));
    }
}

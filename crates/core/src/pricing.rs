//! Cart pricing engine.
//!
//! [`price_cart`] turns a [`CartSnapshot`] and a [`PricingContext`] into a
//! [`PriceBreakdown`]. The context carries the coupon the shopper applied;
//! callers build it from whatever storage they keep that choice in.
//!
//! # Example
//!
//! ```
//! use boutique_core::cart::{CartLine, CartSnapshot};
//! use boutique_core::pricing::{price_cart, PricingContext, PricingPolicy};
//! use boutique_core::{CategoryId, Money, ProductId};
//!
//! let cart = CartSnapshot::new(vec![CartLine {
//!     product_id: ProductId::new(1),
//!     category_id: CategoryId::new(1),
//!     quantity: 1,
//!     unit_price: Money::from_minor(3000),
//! }]);
//! let policy = PricingPolicy::default();
//! let price = price_cart(&cart, &PricingContext::new(&policy));
//!
//! assert_eq!(price.shipping_cost, Money::from_minor(499));
//! assert_eq!(price.final_total, Money::from_minor(3499));
//! ```

use serde::{Deserialize, Serialize};

use crate::cart::CartSnapshot;
use crate::coupon::Coupon;
use crate::types::Money;

/// Shipping rules of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Flat shipping fee charged below the threshold.
    pub flat_shipping_fee: Money,
    /// Discounted subtotal from which shipping is free.
    pub free_shipping_threshold: Money,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            flat_shipping_fee: Money::from_minor(499),
            free_shipping_threshold: Money::from_minor(5000),
        }
    }
}

/// Everything besides the cart that influences the price.
#[derive(Debug, Clone, Copy)]
pub struct PricingContext<'a> {
    pub policy: &'a PricingPolicy,
    pub coupon: Option<&'a Coupon>,
}

impl<'a> PricingContext<'a> {
    /// A context with no coupon applied.
    #[must_use]
    pub const fn new(policy: &'a PricingPolicy) -> Self {
        Self {
            policy,
            coupon: None,
        }
    }

    #[must_use]
    pub const fn with_coupon(mut self, coupon: Option<&'a Coupon>) -> Self {
        self.coupon = coupon;
        self
    }
}

/// Totals of a priced cart, each rounded to the minor unit.
///
/// Invariant: `final_total >= shipping_cost >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub subtotal: Money,
    pub discount: Money,
    pub shipping_cost: Money,
    pub final_total: Money,
}

/// Price a cart.
///
/// - `subtotal` is the sum of `quantity × unit_price`;
/// - `discount` comes from the coupon applied to the lines it covers;
/// - shipping is free with a free-shipping coupon or when
///   `subtotal - discount` reaches the policy threshold, otherwise the flat fee;
/// - `final_total = max(subtotal - discount, 0) + shipping_cost`.
///
/// The discount is the only figure that needs rounding; it is rounded once
/// (half-even) and every total is derived from the rounded values so the
/// breakdown always adds up.
#[must_use]
pub fn price_cart(cart: &CartSnapshot, ctx: &PricingContext<'_>) -> PriceBreakdown {
    let subtotal = cart.subtotal();

    let discount = ctx.coupon.map_or(Money::ZERO, |coupon| {
        coupon
            .discount_for(coupon.applicable_amount(cart))
            .round_minor()
            .max(Money::ZERO)
    });

    let discounted = subtotal.saturating_sub(discount);

    let free_shipping = ctx.coupon.is_some_and(Coupon::waives_shipping)
        || discounted >= ctx.policy.free_shipping_threshold;
    let shipping_cost = if free_shipping {
        Money::ZERO
    } else {
        ctx.policy.flat_shipping_fee.max(Money::ZERO)
    };

    PriceBreakdown {
        subtotal: subtotal.round_minor(),
        discount,
        shipping_cost,
        final_total: (discounted + shipping_cost).round_minor(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::*;
    use crate::cart::CartLine;
    use crate::coupon::CouponScope;
    use crate::types::{CategoryId, CouponId, DiscountType, ProductId};

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn cart(lines: &[(i32, i32, i32, &str)]) -> CartSnapshot {
        CartSnapshot::new(
            lines
                .iter()
                .map(|&(product, category, quantity, price)| CartLine {
                    product_id: ProductId::new(product),
                    category_id: CategoryId::new(category),
                    quantity,
                    unit_price: money(price),
                })
                .collect(),
        )
    }

    fn coupon(discount_type: DiscountType, value: &str) -> Coupon {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Coupon {
            id: CouponId::new(1),
            code: "TEST".to_owned(),
            description: String::new(),
            discount_type,
            discount_value: value.parse().unwrap(),
            minimum_amount: Money::ZERO,
            valid_from: now,
            valid_to: now + Duration::days(30),
            max_usage: 0,
            used_count: 0,
            active: true,
            single_use_per_user: false,
            scope: CouponScope::default(),
        }
    }

    #[test]
    fn test_percentage_coupon_reaches_free_shipping() {
        let policy = PricingPolicy::default();
        let c = coupon(DiscountType::Percentage, "10");
        let price = price_cart(
            &cart(&[(1, 1, 1, "100.00")]),
            &PricingContext::new(&policy).with_coupon(Some(&c)),
        );
        assert_eq!(price.subtotal, money("100.00"));
        assert_eq!(price.discount, money("10.00"));
        assert_eq!(price.shipping_cost, Money::ZERO);
        assert_eq!(price.final_total, money("90.00"));
    }

    #[test]
    fn test_small_cart_pays_flat_fee() {
        let policy = PricingPolicy::default();
        let price = price_cart(&cart(&[(1, 1, 2, "15.00")]), &PricingContext::new(&policy));
        assert_eq!(price.subtotal, money("30.00"));
        assert_eq!(price.discount, Money::ZERO);
        assert_eq!(price.shipping_cost, money("4.99"));
        assert_eq!(price.final_total, money("34.99"));
    }

    #[test]
    fn test_threshold_uses_discounted_subtotal() {
        let policy = PricingPolicy::default();
        let c = coupon(DiscountType::Fixed, "5.00");
        let price = price_cart(
            &cart(&[(1, 1, 1, "52.00")]),
            &PricingContext::new(&policy).with_coupon(Some(&c)),
        );
        assert_eq!(price.discount, money("5.00"));
        assert_eq!(price.shipping_cost, money("4.99"));
        assert_eq!(price.final_total, money("51.99"));
    }

    #[test]
    fn test_exact_threshold_ships_free() {
        let policy = PricingPolicy::default();
        let price = price_cart(&cart(&[(1, 1, 1, "50.00")]), &PricingContext::new(&policy));
        assert_eq!(price.shipping_cost, Money::ZERO);
        assert_eq!(price.final_total, money("50.00"));
    }

    #[test]
    fn test_free_shipping_coupon() {
        let policy = PricingPolicy::default();
        let c = coupon(DiscountType::FreeShipping, "0");
        let price = price_cart(
            &cart(&[(1, 1, 1, "12.00")]),
            &PricingContext::new(&policy).with_coupon(Some(&c)),
        );
        assert_eq!(price.discount, Money::ZERO);
        assert_eq!(price.shipping_cost, Money::ZERO);
        assert_eq!(price.final_total, money("12.00"));
    }

    #[test]
    fn test_fixed_coupon_larger_than_cart() {
        let policy = PricingPolicy::default();
        let c = coupon(DiscountType::Fixed, "40.00");
        let price = price_cart(
            &cart(&[(1, 1, 1, "25.00")]),
            &PricingContext::new(&policy).with_coupon(Some(&c)),
        );
        assert_eq!(price.discount, money("25.00"));
        assert_eq!(price.shipping_cost, money("4.99"));
        assert_eq!(price.final_total, money("4.99"));
    }

    #[test]
    fn test_restricted_coupon_discounts_matching_lines_only() {
        let policy = PricingPolicy::default();
        let mut c = coupon(DiscountType::Percentage, "50");
        c.scope.products.insert(ProductId::new(2));
        let price = price_cart(
            &cart(&[(1, 1, 1, "30.00"), (2, 1, 1, "10.00")]),
            &PricingContext::new(&policy).with_coupon(Some(&c)),
        );
        assert_eq!(price.subtotal, money("40.00"));
        assert_eq!(price.discount, money("5.00"));
        assert_eq!(price.final_total, money("39.99"));
    }

    #[test]
    fn test_discount_rounds_half_even() {
        let policy = PricingPolicy::default();
        // 12.5% of 0.20 = 0.025 -> 0.02
        let c = coupon(DiscountType::Percentage, "12.5");
        let price = price_cart(
            &cart(&[(1, 1, 1, "0.20")]),
            &PricingContext::new(&policy).with_coupon(Some(&c)),
        );
        assert_eq!(price.discount, money("0.02"));
        assert_eq!(price.final_total, money("5.17"));
    }

    #[test]
    fn test_over_hundred_percent_never_goes_negative() {
        let policy = PricingPolicy::default();
        let c = coupon(DiscountType::Percentage, "150");
        let price = price_cart(
            &cart(&[(1, 1, 1, "20.00")]),
            &PricingContext::new(&policy).with_coupon(Some(&c)),
        );
        assert_eq!(price.final_total, price.shipping_cost);
    }

    #[test]
    fn test_final_total_never_below_shipping() {
        let policy = PricingPolicy::default();
        let coupons = [
            coupon(DiscountType::Fixed, "0"),
            coupon(DiscountType::Fixed, "7.77"),
            coupon(DiscountType::Fixed, "1000"),
            coupon(DiscountType::Percentage, "33.3"),
            coupon(DiscountType::Percentage, "100"),
            coupon(DiscountType::FreeShipping, "0"),
        ];
        let carts = [
            cart(&[]),
            cart(&[(1, 1, 1, "0.01")]),
            cart(&[(1, 1, 3, "16.66")]),
            cart(&[(1, 1, 1, "49.99"), (2, 2, 4, "0.33")]),
            cart(&[(1, 1, 10, "999.99")]),
        ];

        for cart in &carts {
            let no_coupon = price_cart(cart, &PricingContext::new(&policy));
            assert!(no_coupon.final_total >= no_coupon.shipping_cost);
            assert!(no_coupon.shipping_cost >= Money::ZERO);

            for c in &coupons {
                let price = price_cart(cart, &PricingContext::new(&policy).with_coupon(Some(c)));
                assert!(price.final_total >= price.shipping_cost, "{price:?}");
                assert!(price.shipping_cost >= Money::ZERO);
                if c.discount_type == DiscountType::Fixed {
                    assert!(price.discount <= c.applicable_amount(cart));
                }
                assert_eq!(
                    price.final_total,
                    price.subtotal.saturating_sub(price.discount) + price.shipping_cost
                );
            }
        }
    }

    #[test]
    fn test_custom_policy() {
        let policy = PricingPolicy {
            flat_shipping_fee: money("7.50"),
            free_shipping_threshold: Money::new(Decimal::ONE_HUNDRED),
        };
        let price = price_cart(&cart(&[(1, 1, 1, "60.00")]), &PricingContext::new(&policy));
        assert_eq!(price.shipping_cost, money("7.50"));
        assert_eq!(price.final_total, money("67.50"));
    }
}

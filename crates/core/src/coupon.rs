//! Coupon validation and discount calculation.
//!
//! [`Coupon::validate`] decides whether a code may be applied to a cart and
//! [`Coupon::discount_for`] computes the monetary discount for an applicable
//! amount. Both are pure: usage is persisted by the checkout workflow.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cart::{CartLine, CartSnapshot};
use crate::types::{CategoryId, CouponId, DiscountType, Money, ProductId};

/// Canonical form of a coupon code: surrounding whitespace removed, upper-case.
///
/// Codes are unique and compared in this form, so `" summer10 "` and
/// `"SUMMER10"` are the same coupon.
#[must_use]
pub fn canonical_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Why a coupon cannot be applied.
///
/// The `Display` text is shown to shoppers as the rejection reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponRejection {
    #[error("this coupon is not active")]
    Inactive,
    #[error("this coupon is not valid at this time")]
    OutsideValidityWindow,
    #[error("this coupon has reached its usage limit")]
    UsageLimitReached,
    #[error("you have already used this coupon")]
    AlreadyRedeemed,
    #[error("the minimum order amount for this coupon is {minimum}")]
    BelowMinimum { minimum: Money },
    #[error("this coupon does not apply to the products in your cart")]
    NotApplicable,
}

/// Outcome of a coupon validation as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponCheck {
    pub valid: bool,
    pub reason: String,
}

impl CouponCheck {
    /// A failed check with a free-form reason (e.g. unknown code).
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
        }
    }
}

impl From<Result<(), CouponRejection>> for CouponCheck {
    fn from(result: Result<(), CouponRejection>) -> Self {
        match result {
            Ok(()) => Self {
                valid: true,
                reason: "valid".to_owned(),
            },
            Err(rejection) => Self::invalid(rejection.to_string()),
        }
    }
}

/// Products and categories a coupon is restricted to.
///
/// Both sets empty means the coupon applies to everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponScope {
    pub categories: BTreeSet<CategoryId>,
    pub products: BTreeSet<ProductId>,
}

impl CouponScope {
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.categories.is_empty() && self.products.is_empty()
    }

    /// Whether a cart line falls inside the scope.
    #[must_use]
    pub fn matches(&self, line: &CartLine) -> bool {
        self.is_unrestricted()
            || self.products.contains(&line.product_id)
            || self.categories.contains(&line.category_id)
    }
}

/// A discount code with its validity rules and usage counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    /// Canonical (upper-case) code.
    pub code: String,
    pub description: String,
    pub discount_type: DiscountType,
    /// Percent for `Percentage`, an amount for `Fixed`, ignored for `FreeShipping`.
    pub discount_value: Decimal,
    /// Zero means no minimum.
    pub minimum_amount: Money,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    /// Zero means unlimited.
    pub max_usage: i32,
    pub used_count: i32,
    pub active: bool,
    pub single_use_per_user: bool,
    pub scope: CouponScope,
}

impl Coupon {
    /// Check whether this coupon may be applied.
    ///
    /// * `already_redeemed` - `Some(..)` when a user is known, telling whether
    ///   that user has already used this coupon. `None` for guests.
    /// * `cart` - the cart the coupon would apply to, if any.
    ///
    /// Checks run in a fixed order and stop at the first failure: active flag,
    /// validity window, global usage limit, per-user single use, minimum
    /// amount, product/category restriction.
    ///
    /// # Errors
    ///
    /// Returns the first [`CouponRejection`] encountered.
    pub fn validate(
        &self,
        now: DateTime<Utc>,
        already_redeemed: Option<bool>,
        cart: Option<&CartSnapshot>,
    ) -> Result<(), CouponRejection> {
        if !self.active {
            return Err(CouponRejection::Inactive);
        }

        if now < self.valid_from || now > self.valid_to {
            return Err(CouponRejection::OutsideValidityWindow);
        }

        if self.usage_exhausted() {
            return Err(CouponRejection::UsageLimitReached);
        }

        if self.single_use_per_user && already_redeemed == Some(true) {
            return Err(CouponRejection::AlreadyRedeemed);
        }

        if let Some(cart) = cart {
            if self.minimum_amount > Money::ZERO && cart.subtotal() < self.minimum_amount {
                return Err(CouponRejection::BelowMinimum {
                    minimum: self.minimum_amount,
                });
            }

            if !self.scope.is_unrestricted()
                && !cart.lines.iter().any(|line| self.scope.matches(line))
            {
                return Err(CouponRejection::NotApplicable);
            }
        }

        Ok(())
    }

    /// Whether the global usage limit has been reached.
    #[must_use]
    pub const fn usage_exhausted(&self) -> bool {
        self.max_usage > 0 && self.used_count >= self.max_usage
    }

    /// Subtotal of the cart lines this coupon applies to.
    ///
    /// For an unrestricted coupon this is the whole cart subtotal.
    #[must_use]
    pub fn applicable_amount(&self, cart: &CartSnapshot) -> Money {
        cart.lines
            .iter()
            .filter(|line| self.scope.matches(line))
            .map(CartLine::cost)
            .sum()
    }

    /// Monetary discount for the given applicable amount, unrounded.
    ///
    /// `Fixed` never exceeds the applicable amount; `FreeShipping` is always
    /// zero here because shipping is waived by the pricing engine instead.
    #[must_use]
    pub fn discount_for(&self, applicable: Money) -> Money {
        match self.discount_type {
            DiscountType::Fixed => Money::new(self.discount_value).min(applicable),
            DiscountType::Percentage => applicable.percent(self.discount_value),
            DiscountType::FreeShipping => Money::ZERO,
        }
    }

    #[must_use]
    pub fn waives_shipping(&self) -> bool {
        self.discount_type == DiscountType::FreeShipping
    }
}

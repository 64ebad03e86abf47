//! Coupon validation and price previews.
//!
//! Both operations are read-only: coupon usage is only counted when an
//! order is committed.

use boutique_core::cart::CartSnapshot;
use boutique_core::clock::Clock;
use boutique_core::coupon::{Coupon, CouponCheck, canonical_code};
use boutique_core::pricing::{PriceBreakdown, PricingContext, PricingPolicy, price_cart};
use boutique_core::{CartId, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use super::cart::CartError;
use crate::db::{RepositoryError, Store, StoreTx, finish};
use crate::state::AppState;

/// Reason given for a code that matches no coupon.
pub const UNKNOWN_CODE: &str = "invalid coupon code";

/// Priced cart, with the outcome of the coupon the shopper entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricePreview {
    #[serde(flatten)]
    pub price: PriceBreakdown,
    /// `None` when no code was entered. An invalid coupon is not applied.
    pub coupon: Option<CouponCheck>,
}

/// Coupon lookups and cart pricing.
pub struct CouponService<'a> {
    store: &'a dyn Store,
    clock: &'a dyn Clock,
    pricing: &'a PricingPolicy,
}

impl<'a> CouponService<'a> {
    #[must_use]
    pub fn new(state: &'a AppState) -> Self {
        Self {
            store: state.store(),
            clock: state.clock(),
            pricing: state.pricing(),
        }
    }

    /// Check a code for a user and optionally a cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::CartNotFound` for an unknown cart.
    #[instrument(skip(self))]
    pub async fn validate_coupon(
        &self,
        code: &str,
        user: Option<UserId>,
        cart_id: Option<CartId>,
    ) -> Result<CouponCheck, CartError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = validate_in(tx.as_mut(), code, user, cart_id, now).await;
        finish(tx, result).await
    }

    /// Price a cart, applying the coupon only if it is valid.
    ///
    /// # Errors
    ///
    /// Returns `CartError::CartNotFound` for an unknown cart.
    #[instrument(skip(self))]
    pub async fn preview_price(
        &self,
        cart_id: CartId,
        code: Option<&str>,
        user: Option<UserId>,
    ) -> Result<PricePreview, CartError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = preview_in(tx.as_mut(), self.pricing, cart_id, code, user, now).await;
        finish(tx, result).await
    }
}

async fn validate_in(
    tx: &mut dyn StoreTx,
    code: &str,
    user: Option<UserId>,
    cart_id: Option<CartId>,
    now: DateTime<Utc>,
) -> Result<CouponCheck, CartError> {
    let cart = match cart_id {
        Some(id) => Some(load_snapshot(tx, id).await?),
        None => None,
    };
    let (check, _) = check_code(tx, code, user, cart.as_ref(), now).await?;
    Ok(check)
}

async fn preview_in(
    tx: &mut dyn StoreTx,
    pricing: &PricingPolicy,
    cart_id: CartId,
    code: Option<&str>,
    user: Option<UserId>,
    now: DateTime<Utc>,
) -> Result<PricePreview, CartError> {
    let cart = load_snapshot(tx, cart_id).await?;

    let (check, coupon) = match code {
        Some(code) if !code.trim().is_empty() => {
            let (check, coupon) = check_code(tx, code, user, Some(&cart), now).await?;
            (Some(check), coupon)
        }
        _ => (None, None),
    };

    let price = price_cart(
        &cart,
        &PricingContext::new(pricing).with_coupon(coupon.as_ref()),
    );
    Ok(PricePreview {
        price,
        coupon: check,
    })
}

async fn load_snapshot(tx: &mut dyn StoreTx, cart_id: CartId) -> Result<CartSnapshot, CartError> {
    if tx.cart(cart_id).await?.is_none() {
        return Err(CartError::CartNotFound);
    }
    Ok(CartSnapshot::new(tx.cart_lines(cart_id).await?))
}

/// Validate `code`, returning the coupon when it may be applied.
async fn check_code(
    tx: &mut dyn StoreTx,
    code: &str,
    user: Option<UserId>,
    cart: Option<&CartSnapshot>,
    now: DateTime<Utc>,
) -> Result<(CouponCheck, Option<Coupon>), RepositoryError> {
    let Some(coupon) = tx.coupon_by_code(&canonical_code(code)).await? else {
        return Ok((CouponCheck::invalid(UNKNOWN_CODE), None));
    };

    let already_redeemed = match user {
        Some(user) if coupon.single_use_per_user => Some(tx.has_redeemed(coupon.id, user).await?),
        Some(_) => Some(false),
        None => None,
    };

    let outcome = coupon.validate(now, already_redeemed, cart);
    let valid = outcome.is_ok();
    Ok((CouponCheck::from(outcome), valid.then_some(coupon)))
}

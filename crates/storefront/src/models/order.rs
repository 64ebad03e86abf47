//! Order domain types.
//!
//! An order is an immutable snapshot of a committed cart: prices and totals
//! are frozen at commit time. Only `status` and `paid` change afterwards.

use boutique_core::checkout::ShippingInfo;
use boutique_core::pricing::PriceBreakdown;
use boutique_core::{CouponId, Money, OrderId, OrderItemId, OrderStatus, ProductId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A committed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// `None` for guest checkouts.
    pub user_id: Option<UserId>,
    pub shipping: ShippingInfo,
    pub subtotal: Money,
    pub discount_amount: Money,
    pub shipping_cost: Money,
    pub total: Money,
    /// `None` without a coupon, or once the coupon has been deleted.
    pub coupon_id: Option<CouponId>,
    pub status: OrderStatus,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
}

/// One product line of an order, price frozen at commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub price: Money,
    pub quantity: i32,
}

impl OrderItem {
    #[must_use]
    pub fn cost(&self) -> Money {
        self.price.times(self.quantity)
    }
}

/// Order row to insert.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Option<UserId>,
    pub shipping: ShippingInfo,
    pub price: PriceBreakdown,
    pub coupon_id: Option<CouponId>,
    pub created_at: DateTime<Utc>,
}

/// An order together with its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceipt {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

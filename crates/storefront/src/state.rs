//! Application state shared across handlers.

use std::sync::Arc;

use boutique_core::clock::Clock;
use boutique_core::moderation::ModerationPolicy;
use boutique_core::pricing::PricingPolicy;

use crate::config::StorefrontConfig;
use crate::db::Store;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the store, the clock and the business policies.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    pricing: PricingPolicy,
    moderation: ModerationPolicy,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        pricing: PricingPolicy,
        moderation: ModerationPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                store,
                clock,
                pricing,
                moderation,
            }),
        }
    }

    /// Create the state of the server from its configuration.
    #[must_use]
    pub fn from_config(
        config: &StorefrontConfig,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            store,
            clock,
            config.pricing.clone(),
            config.moderation.clone(),
        )
    }

    /// Get a reference to the data store.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.inner.clock.as_ref()
    }

    /// Shipping rules used when pricing carts.
    #[must_use]
    pub fn pricing(&self) -> &PricingPolicy {
        &self.inner.pricing
    }

    /// Thresholds and word lists used when moderating reviews.
    #[must_use]
    pub fn moderation(&self) -> &ModerationPolicy {
        &self.inner.moderation
    }
}

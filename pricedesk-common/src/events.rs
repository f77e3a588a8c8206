//! Typed pricing events and the broadcast bus that carries them
//!
//! Events are published after the change they describe is committed, in
//! commit order. Subscribers that connect late get no replay; they fetch a
//! snapshot instead (see `PricingEngine::subscribe_with_snapshot`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::overrides::OverrideRecord;
use crate::reconcile::EffectivePrice;
use crate::variant::{Market, VariantKey};

/// Why a batch of prices was recomputed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecomputeTrigger {
    /// First inventory dataset of the session
    Initial,
    SettingsChanged { market: Market },
    SyncCompleted,
    OverridesCleared,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PricingEvent {
    /// An override was set or removed for one variant
    OverrideChanged {
        variant: VariantKey,
        /// None once the override is gone
        override_info: Option<OverrideRecord>,
        /// None when the variant is not in the current dataset
        effective_price: Option<EffectivePrice>,
        timestamp: DateTime<Utc>,
    },

    /// Effective prices of these variants may have moved
    PricesRecomputed {
        variants: Vec<VariantKey>,
        trigger: RecomputeTrigger,
        timestamp: DateTime<Utc>,
    },
}

impl PricingEvent {
    pub fn override_changed(
        variant: VariantKey,
        override_info: Option<OverrideRecord>,
        effective_price: Option<EffectivePrice>,
    ) -> Self {
        PricingEvent::OverrideChanged {
            variant,
            override_info,
            effective_price,
            timestamp: Utc::now(),
        }
    }

    pub fn prices_recomputed(variants: Vec<VariantKey>, trigger: RecomputeTrigger) -> Self {
        PricingEvent::PricesRecomputed {
            variants,
            trigger,
            timestamp: Utc::now(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            PricingEvent::OverrideChanged { .. } => "OverrideChanged",
            PricingEvent::PricesRecomputed { .. } => "PricesRecomputed",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            PricingEvent::OverrideChanged { timestamp, .. }
            | PricingEvent::PricesRecomputed { timestamp, .. } => *timestamp,
        }
    }
}

/// Broadcast bus for pricing events
///
/// Publishing never blocks. A subscriber that falls more than `capacity`
/// events behind gets `RecvError::Lagged` and should re-fetch a snapshot.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PricingEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PricingEvent> {
        self.tx.subscribe()
    }

    /// Returns `Err` if no subscribers are listening
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PricingEvent,
    ) -> Result<usize, broadcast::error::SendError<PricingEvent>> {
        self.tx.send(event)
    }

    /// Emit, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: PricingEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

//! Pricing engine: the single owner of reconciled price state
//!
//! Every command (override edits, settings edits, sync application) runs
//! under one lock, commits to storage first, updates memory, then publishes
//! its event before releasing the lock. Consumers therefore only ever see
//! committed snapshots, and events arrive in commit order.
//!
//! A sync fetch runs outside the lock. Its response is applied only if no
//! newer sync has been applied meanwhile, and the current override map is
//! always re-applied on top of the fresh computed prices.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::events::{EventBus, PricingEvent, RecomputeTrigger};
use crate::overrides::{OverrideMap, OverrideRecord, OverrideStore};
use crate::reconcile::{merge_duplicates, price_variant, reconcile, EffectivePrice};
use crate::settings::{MarketSettings, MarketSettingsStore};
use crate::storage::PricingStorage;
use crate::sync::{InventorySource, SyncOutcome, SyncTicket};
use crate::variant::{Market, ProductVariant, RawCostRecord, VariantKey};
use crate::{Error, Result};

struct EngineState<S> {
    settings: MarketSettingsStore,
    overrides: OverrideStore<S>,
    variants: Vec<ProductVariant>,
    prices: Vec<EffectivePrice>,
    index: HashMap<VariantKey, usize>,
    applied_sync: SyncTicket,
}

impl<S: PricingStorage> EngineState<S> {
    fn rebuild(&mut self) {
        self.prices = reconcile(&self.variants, &self.settings, self.overrides.records());
        self.index = self
            .prices
            .iter()
            .enumerate()
            .map(|(i, price)| (price.variant.clone(), i))
            .collect();
    }

    fn reprice(&mut self, index: usize) -> EffectivePrice {
        let variant = &self.variants[index];
        let settings = self.settings.get(&variant.id.market);
        let price = price_variant(variant, &settings, self.overrides.get(&variant.key()));
        self.prices[index] = price.clone();
        price
    }

    fn reprice_key(&mut self, key: &VariantKey) -> Option<EffectivePrice> {
        let index = *self.index.get(key)?;
        Some(self.reprice(index))
    }

    /// Reprice the market's variants that have no active override
    fn reprice_market(&mut self, market: &Market) -> Vec<VariantKey> {
        let targets: Vec<usize> = self
            .variants
            .iter()
            .enumerate()
            .filter(|(_, v)| &v.id.market == market && self.overrides.active(&v.key()).is_none())
            .map(|(i, _)| i)
            .collect();

        targets
            .into_iter()
            .map(|index| self.reprice(index).variant)
            .collect()
    }

    async fn commit_settings(
        &mut self,
        market: &Market,
        settings: MarketSettings,
    ) -> Result<Vec<VariantKey>> {
        if let Err(e) = settings.validate() {
            warn!(market = %market, "Rejected market settings: {}", e);
            return Err(e);
        }
        self.overrides
            .storage()
            .save_market_settings(market, &settings)
            .await
            .map_err(|e| {
                error!(market = %market, "Failed to persist market settings: {}", e);
                e
            })?;
        self.settings.set(market, settings)?;
        Ok(self.reprice_market(market))
    }
}

/// Reconciliation service over an injectable storage backend
pub struct PricingEngine<S> {
    state: Mutex<EngineState<S>>,
    events: EventBus,
    next_ticket: AtomicU64,
}

impl<S: PricingStorage> PricingEngine<S> {
    /// Build the engine from durable state
    ///
    /// Unreadable storage never fails startup: overrides degrade to none and
    /// settings to config seeds or built-in defaults.
    pub async fn open(storage: S, config: &EngineConfig) -> Self {
        let mut settings = MarketSettingsStore::with_seeds(config.market_seeds());
        match storage.load_market_settings().await {
            Ok(persisted) => {
                for (market, stored) in persisted {
                    settings.load_lenient(&market, stored);
                }
            }
            Err(e) => warn!("Market settings unreadable, using seeds and defaults: {}", e),
        }

        let overrides = OverrideStore::open(storage).await;

        Self {
            state: Mutex::new(EngineState {
                settings,
                overrides,
                variants: Vec::new(),
                prices: Vec::new(),
                index: HashMap::new(),
                applied_sync: SyncTicket(0),
            }),
            events: EventBus::new(config.event_capacity),
            next_ticket: AtomicU64::new(0),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PricingEvent> {
        self.events.subscribe()
    }

    /// Current snapshot plus a receiver for every later event
    ///
    /// Taken under the engine lock, so no event falls between the two.
    pub async fn subscribe_with_snapshot(
        &self,
    ) -> (Vec<EffectivePrice>, broadcast::Receiver<PricingEvent>) {
        let state = self.state.lock().await;
        (state.prices.clone(), self.events.subscribe())
    }

    /// Every effective price, in dataset order
    pub async fn snapshot(&self) -> Vec<EffectivePrice> {
        self.state.lock().await.prices.clone()
    }

    pub async fn effective_price(&self, key: &VariantKey) -> Option<EffectivePrice> {
        let state = self.state.lock().await;
        state.index.get(key).map(|&i| state.prices[i].clone())
    }

    /// All stored overrides, including ones for variants not in the dataset
    pub async fn overrides(&self) -> OverrideMap {
        self.state.lock().await.overrides.records().clone()
    }

    /// Set a manual price for a variant in the current dataset
    ///
    /// The current computed sell price is captured as the original price on
    /// first override.
    pub async fn set_override(&self, key: &VariantKey, price: f64) -> Result<EffectivePrice> {
        let mut state = self.state.lock().await;
        let index = *state
            .index
            .get(key)
            .ok_or_else(|| Error::NotFound(format!("variant {key}")))?;
        let original_price = state.prices[index].computed.sell_price;

        let record = state.overrides.set(key.clone(), price, original_price).await?;
        let effective = state.reprice(index);

        self.events.emit_lossy(PricingEvent::override_changed(
            key.clone(),
            Some(record),
            Some(effective.clone()),
        ));
        Ok(effective)
    }

    /// Remove one override; the variant returns to a freshly computed price
    pub async fn clear_override(&self, key: &VariantKey) -> Result<Option<OverrideRecord>> {
        let mut state = self.state.lock().await;
        let removed = state.overrides.clear(key).await?;
        if removed.is_some() {
            let effective = state.reprice_key(key);
            self.events
                .emit_lossy(PricingEvent::override_changed(key.clone(), None, effective));
        }
        Ok(removed)
    }

    /// Remove every override atomically; returns how many were removed
    pub async fn clear_all_overrides(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let removed = state.overrides.clear_all().await?;

        let mut repriced = Vec::new();
        for key in removed.keys() {
            let effective = state.reprice_key(key);
            if effective.is_some() {
                repriced.push(key.clone());
            }
            self.events
                .emit_lossy(PricingEvent::override_changed(key.clone(), None, effective));
        }
        self.events.emit_lossy(PricingEvent::prices_recomputed(
            repriced,
            RecomputeTrigger::OverridesCleared,
        ));
        Ok(removed.len())
    }

    /// Settings in effect for a market
    pub async fn market_settings(&self, market: &Market) -> MarketSettings {
        self.state.lock().await.settings.get(market)
    }

    /// Markets that are seeded by config or have stored settings
    pub async fn configured_markets(&self) -> Vec<Market> {
        self.state.lock().await.settings.markets().cloned().collect()
    }

    /// Strictly validated, persisted settings write
    ///
    /// Only non-overridden variants of the market are repriced.
    pub async fn update_market_settings(
        &self,
        market: &Market,
        settings: MarketSettings,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let repriced = state.commit_settings(market, settings).await?;
        self.emit_settings_changed(market, repriced);
        Ok(())
    }

    /// Parse one field into the current settings and write them back
    pub async fn update_market_setting_field(
        &self,
        market: &Market,
        key: &str,
        value: &str,
    ) -> Result<MarketSettings> {
        let mut state = self.state.lock().await;
        let mut settings = state.settings.get(market);
        settings.apply_field(key, value)?;

        let repriced = state.commit_settings(market, settings.clone()).await?;
        self.emit_settings_changed(market, repriced);
        Ok(settings)
    }

    /// Drop stored settings; the market's config seed, else its built-in
    /// default, applies again
    ///
    /// Nothing is persisted for the baseline, so the same settings are in
    /// effect after a restart with the same config.
    pub async fn reset_market_settings(&self, market: &Market) -> Result<MarketSettings> {
        let mut state = self.state.lock().await;
        state
            .overrides
            .storage()
            .delete_market_settings(market)
            .await?;
        let baseline = state.settings.reset(market);
        info!(market = %market, "Market settings reset to baseline");

        let repriced = state.reprice_market(market);
        self.emit_settings_changed(market, repriced);
        Ok(baseline)
    }

    fn emit_settings_changed(&self, market: &Market, repriced: Vec<VariantKey>) {
        self.events.emit_lossy(PricingEvent::prices_recomputed(
            repriced,
            RecomputeTrigger::SettingsChanged {
                market: market.clone(),
            },
        ));
    }

    /// Issue the ticket for a sync about to be requested
    pub fn begin_sync(&self) -> SyncTicket {
        SyncTicket(self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Apply a sync response unless a newer one was applied already
    pub async fn apply_sync(&self, ticket: SyncTicket, records: Vec<RawCostRecord>) -> SyncOutcome {
        let mut state = self.state.lock().await;
        if ticket < state.applied_sync {
            info!(
                ticket = ticket.0,
                applied = state.applied_sync.0,
                "Discarding stale sync response"
            );
            return SyncOutcome::Stale {
                ticket,
                applied: state.applied_sync,
            };
        }

        let variants: Vec<ProductVariant> =
            records.into_iter().map(ProductVariant::from_raw).collect();
        for variant in variants.iter().filter(|v| !v.flags.is_empty()) {
            debug!(variant = %variant.key(), flags = ?variant.flags, "Cost data flagged");
        }

        let trigger = if state.applied_sync == SyncTicket(0) {
            RecomputeTrigger::Initial
        } else {
            RecomputeTrigger::SyncCompleted
        };

        state.variants = merge_duplicates(variants);
        state.applied_sync = ticket;
        state.rebuild();

        let flagged = state.prices.iter().filter(|p| !p.flags.is_empty()).count();
        let keys: Vec<VariantKey> = state.prices.iter().map(|p| p.variant.clone()).collect();
        info!(ticket = ticket.0, variants = keys.len(), "Sync applied");

        let outcome = SyncOutcome::Applied {
            ticket,
            variants: keys.len(),
            flagged,
        };
        self.events.emit_lossy(PricingEvent::prices_recomputed(keys, trigger));
        outcome
    }

    /// Fetch from a source and apply the result
    ///
    /// A failed fetch leaves every reconciled price as it was.
    pub async fn sync_now<I: InventorySource>(&self, source: &I) -> Result<SyncOutcome> {
        let ticket = self.begin_sync();
        debug!(ticket = ticket.0, "Sync requested");
        match source.fetch().await {
            Ok(records) => Ok(self.apply_sync(ticket, records).await),
            Err(e) => {
                warn!(ticket = ticket.0, "Sync failed: {}", e);
                Err(e)
            }
        }
    }
}

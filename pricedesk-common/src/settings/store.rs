//! Market settings store with a single default-fallback policy
//!
//! The baseline for a market is its config seed when one was accepted, the
//! built-in default otherwise. Every fallback (missing record, malformed
//! load, reset) lands on that baseline.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use super::MarketSettings;
use crate::variant::Market;
use crate::Result;

/// Holds the accepted settings for each market
///
/// Only valid records are ever stored. Markets without an accepted record
/// are served their baseline.
#[derive(Debug, Clone, Default)]
pub struct MarketSettingsStore {
    seeds: BTreeMap<Market, MarketSettings>,
    entries: BTreeMap<Market, MarketSettings>,
}

impl MarketSettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose baselines come from config seeds
    ///
    /// A malformed seed is dropped with a warning; that market keeps its
    /// built-in default.
    pub fn with_seeds(seeds: impl IntoIterator<Item = (Market, MarketSettings)>) -> Self {
        let mut store = Self::new();
        for (market, seed) in seeds {
            let errors = seed.validation_errors();
            if errors.is_empty() {
                store.seeds.insert(market, seed);
            } else {
                warn!(
                    market = %market,
                    "Malformed settings seed, using built-in default: {}",
                    errors.join("; ")
                );
            }
        }
        store
    }

    /// Config seed if present, built-in default otherwise
    pub fn baseline(&self, market: &Market) -> MarketSettings {
        self.seeds
            .get(market)
            .cloned()
            .unwrap_or_else(|| MarketSettings::default_for(market))
    }

    /// Settings in effect for a market
    pub fn get(&self, market: &Market) -> MarketSettings {
        self.entries
            .get(market)
            .cloned()
            .unwrap_or_else(|| self.baseline(market))
    }

    /// Explicitly accepted settings, if any (None = baseline in use)
    pub fn stored(&self, market: &Market) -> Option<&MarketSettings> {
        self.entries.get(market)
    }

    /// Strict write: rejected settings leave the prior record in effect
    pub fn set(&mut self, market: &Market, settings: MarketSettings) -> Result<()> {
        if let Err(err) = settings.validate() {
            warn!(market = %market, "Rejected market settings: {}", err);
            return Err(err);
        }
        self.entries.insert(market.clone(), settings);
        info!(market = %market, "Market settings updated");
        Ok(())
    }

    /// Lenient load: malformed settings fall back to the market baseline
    ///
    /// Returns true when the record was accepted as-is.
    pub fn load_lenient(&mut self, market: &Market, settings: MarketSettings) -> bool {
        let errors = settings.validation_errors();
        if errors.is_empty() {
            self.entries.insert(market.clone(), settings);
            true
        } else {
            warn!(
                market = %market,
                seeded = self.seeds.contains_key(market),
                "Malformed market settings, using baseline: {}",
                errors.join("; ")
            );
            self.entries.remove(market);
            false
        }
    }

    /// Drop any accepted record; the baseline applies again
    pub fn reset(&mut self, market: &Market) -> MarketSettings {
        self.entries.remove(market);
        self.baseline(market)
    }

    /// Markets that are seeded or have an accepted record
    pub fn markets(&self) -> impl Iterator<Item = &Market> {
        self.seeds
            .keys()
            .chain(self.entries.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
    }
}

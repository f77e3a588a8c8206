//! Durable key-value surface behind the override store and settings store
//!
//! The engine reads everything at startup and writes through on every
//! mutation. [`crate::db::SqliteStorage`] is the on-disk backend;
//! [`MemoryStorage`] keeps the same contract inside the process.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::overrides::OverrideMap;
use crate::settings::MarketSettings;
use crate::variant::Market;
use crate::{Error, Result};

/// Persistence contract for overrides and market settings
pub trait PricingStorage: Clone + Send + Sync + 'static {
    /// Full override map; undecodable records are skipped
    fn load_overrides(&self) -> impl Future<Output = Result<OverrideMap>> + Send;

    /// Replace the whole durable override map in one step
    fn save_overrides(&self, overrides: &OverrideMap) -> impl Future<Output = Result<()>> + Send;

    /// Persisted settings per market, unvalidated
    fn load_market_settings(
        &self,
    ) -> impl Future<Output = Result<BTreeMap<Market, MarketSettings>>> + Send;

    fn save_market_settings(
        &self,
        market: &Market,
        settings: &MarketSettings,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Forget the persisted record so the built-in default applies again
    fn delete_market_settings(&self, market: &Market) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Default)]
struct MemoryInner {
    overrides: OverrideMap,
    settings: BTreeMap<Market, MarketSettings>,
    fail_reads: bool,
    fail_writes: bool,
}

/// In-process storage; clones share the same map
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the durable override map
    pub fn with_overrides(overrides: OverrideMap) -> Self {
        let storage = Self::new();
        if let Ok(mut inner) = storage.inner.lock() {
            inner.overrides = overrides;
        }
        storage
    }

    /// Make every subsequent load fail with a storage error
    pub fn set_fail_reads(&self, fail: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_reads = fail;
        }
    }

    /// Make every subsequent write fail with a storage error
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_writes = fail;
        }
    }

    /// What is currently persisted (inspection helper)
    pub fn stored_overrides(&self) -> OverrideMap {
        self.inner
            .lock()
            .map(|inner| inner.overrides.clone())
            .unwrap_or_default()
    }

    pub fn stored_settings(&self, market: &Market) -> Option<MarketSettings> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.settings.get(market).cloned())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Storage("memory storage lock poisoned".to_string()))
    }

    fn readable(&self) -> Result<MutexGuard<'_, MemoryInner>> {
        let inner = self.lock()?;
        if inner.fail_reads {
            return Err(Error::Storage("memory storage read failure".to_string()));
        }
        Ok(inner)
    }

    fn writable(&self) -> Result<MutexGuard<'_, MemoryInner>> {
        let inner = self.lock()?;
        if inner.fail_writes {
            return Err(Error::Storage("memory storage write failure".to_string()));
        }
        Ok(inner)
    }
}

impl PricingStorage for MemoryStorage {
    async fn load_overrides(&self) -> Result<OverrideMap> {
        Ok(self.readable()?.overrides.clone())
    }

    async fn save_overrides(&self, overrides: &OverrideMap) -> Result<()> {
        self.writable()?.overrides = overrides.clone();
        Ok(())
    }

    async fn load_market_settings(&self) -> Result<BTreeMap<Market, MarketSettings>> {
        Ok(self.readable()?.settings.clone())
    }

    async fn save_market_settings(&self, market: &Market, settings: &MarketSettings) -> Result<()> {
        self.writable()?
            .settings
            .insert(market.clone(), settings.clone());
        Ok(())
    }

    async fn delete_market_settings(&self, market: &Market) -> Result<()> {
        self.writable()?.settings.remove(market);
        Ok(())
    }
}

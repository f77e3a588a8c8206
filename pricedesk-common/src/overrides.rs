//! Override store
//!
//! Keyed by [`VariantKey`], loaded in full at startup and written through
//! on every mutation. The durable map is always written before the in-memory
//! map changes, so a failed write leaves both exactly as they were.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::storage::PricingStorage;
use crate::variant::VariantKey;
use crate::{Error, Result};

/// Manually entered price superseding the computed one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub is_active: bool,
    pub override_price: f64,
    /// Computed sell price captured when the override was first created
    pub original_price: f64,
    pub last_updated: DateTime<Utc>,
}

pub type OverrideMap = BTreeMap<VariantKey, OverrideRecord>;

/// Owned, injectable override store
pub struct OverrideStore<S> {
    storage: S,
    records: OverrideMap,
}

impl<S: PricingStorage> OverrideStore<S> {
    /// Load the durable map; an unreadable store degrades to no overrides
    pub async fn open(storage: S) -> Self {
        let records = match storage.load_overrides().await {
            Ok(records) => {
                info!("Loaded {} price overrides", records.len());
                records
            }
            Err(e) => {
                warn!("Override storage unreadable, starting with no overrides: {}", e);
                OverrideMap::new()
            }
        };
        Self { storage, records }
    }

    pub fn get(&self, key: &VariantKey) -> Option<&OverrideRecord> {
        self.records.get(key)
    }

    /// Record only if it is currently active
    pub fn active(&self, key: &VariantKey) -> Option<&OverrideRecord> {
        self.records.get(key).filter(|record| record.is_active)
    }

    pub fn records(&self) -> &OverrideMap {
        &self.records
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Create or replace the override for a variant
    ///
    /// An existing record keeps its `original_price`, so clearing always
    /// returns to the pre-override computed value.
    pub async fn set(
        &mut self,
        key: VariantKey,
        override_price: f64,
        original_price: f64,
    ) -> Result<OverrideRecord> {
        if !override_price.is_finite() || override_price < 0.0 {
            return Err(Error::InvalidInput(format!(
                "override_price: {override_price} must be a finite number >= 0"
            )));
        }

        let original_price = self
            .records
            .get(&key)
            .map(|existing| existing.original_price)
            .unwrap_or(original_price);
        let record = OverrideRecord {
            is_active: true,
            override_price,
            original_price,
            last_updated: Utc::now(),
        };

        let mut next = self.records.clone();
        next.insert(key.clone(), record.clone());
        self.commit(next).await?;

        info!(variant = %key, price = override_price, "Override set");
        Ok(record)
    }

    /// Remove one override; returns the removed record
    pub async fn clear(&mut self, key: &VariantKey) -> Result<Option<OverrideRecord>> {
        if !self.records.contains_key(key) {
            return Ok(None);
        }
        let mut next = self.records.clone();
        let removed = next.remove(key);
        self.commit(next).await?;

        info!(variant = %key, "Override cleared");
        Ok(removed)
    }

    /// Remove every override in one durable write; returns the removed map
    pub async fn clear_all(&mut self) -> Result<OverrideMap> {
        self.commit(OverrideMap::new()).await?;
        let removed = std::mem::take(&mut self.records);
        info!("Cleared {} overrides", removed.len());
        Ok(removed)
    }

    async fn commit(&mut self, next: OverrideMap) -> Result<()> {
        if let Err(e) = self.storage.save_overrides(&next).await {
            error!("Failed to persist overrides: {}", e);
            return Err(e);
        }
        self.records = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn key(name: &str) -> VariantKey {
        VariantKey::from_raw(name)
    }

    #[tokio::test]
    async fn test_set_preserves_first_original_price() {
        let mut store = OverrideStore::open(MemoryStorage::new()).await;
        store.set(key("a"), 900.0, 675.0).await.unwrap();
        let second = store.set(key("a"), 950.0, 900.0).await.unwrap();

        assert_eq!(second.override_price, 950.0);
        assert_eq!(second.original_price, 675.0);
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn test_set_writes_through() {
        let storage = MemoryStorage::new();
        let mut store = OverrideStore::open(storage.clone()).await;
        store.set(key("a"), 999.0, 675.0).await.unwrap();

        let persisted = storage.stored_overrides();
        assert_eq!(persisted.get(&key("a")).map(|r| r.override_price), Some(999.0));
    }

    #[tokio::test]
    async fn test_negative_price_rejected() {
        let mut store = OverrideStore::open(MemoryStorage::new()).await;
        assert!(matches!(
            store.set(key("a"), -1.0, 10.0).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(store.set(key("a"), f64::NAN, 10.0).await.is_err());
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_memory_unchanged() {
        let storage = MemoryStorage::new();
        let mut store = OverrideStore::open(storage.clone()).await;
        store.set(key("a"), 100.0, 80.0).await.unwrap();

        storage.set_fail_writes(true);
        assert!(store.set(key("b"), 100.0, 80.0).await.is_err());
        assert!(store.clear(&key("a")).await.is_err());
        assert!(store.clear_all().await.is_err());

        assert_eq!(store.records().len(), 1);
        assert!(store.active(&key("a")).is_some());
    }

    #[tokio::test]
    async fn test_clear_returns_removed_record() {
        let mut store = OverrideStore::open(MemoryStorage::new()).await;
        store.set(key("a"), 100.0, 80.0).await.unwrap();

        let removed = store.clear(&key("a")).await.unwrap();
        assert_eq!(removed.map(|r| r.original_price), Some(80.0));
        assert!(store.clear(&key("a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_all_empties_durable_map() {
        let storage = MemoryStorage::new();
        let mut store = OverrideStore::open(storage.clone()).await;
        for name in ["a", "b", "c"] {
            store.set(key(name), 100.0, 80.0).await.unwrap();
        }

        let removed = store.clear_all().await.unwrap();
        assert_eq!(removed.len(), 3);
        assert!(store.records().is_empty());
        assert!(storage.stored_overrides().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_storage_degrades_to_empty() {
        let storage = MemoryStorage::new();
        storage.set_fail_reads(true);
        let store = OverrideStore::open(storage).await;
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_inactive_record_is_not_active() {
        let mut map = OverrideMap::new();
        map.insert(
            key("a"),
            OverrideRecord {
                is_active: false,
                override_price: 10.0,
                original_price: 5.0,
                last_updated: Utc::now(),
            },
        );
        let store = OverrideStore::open(MemoryStorage::with_overrides(map)).await;
        assert!(store.get(&key("a")).is_some());
        assert!(store.active(&key("a")).is_none());
    }
}

//! SQLite-backed [`PricingStorage`]
//!
//! Each override and each market's settings is one JSON document keyed by
//! variant key or market code.

use std::collections::BTreeMap;
use std::path::Path;

use sqlx::SqlitePool;
use tracing::{debug, warn};

use super::init::init_database;
use crate::overrides::{OverrideMap, OverrideRecord};
use crate::settings::MarketSettings;
use crate::storage::PricingStorage;
use crate::variant::{Market, VariantKey};
use crate::Result;

#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open the database file, creating it and its schema when needed
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = init_database(db_path).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl PricingStorage for SqliteStorage {
    async fn load_overrides(&self) -> Result<OverrideMap> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT variant_key, record FROM price_overrides")
                .fetch_all(&self.pool)
                .await?;

        let mut overrides = OverrideMap::new();
        for (key, json) in rows {
            match serde_json::from_str::<OverrideRecord>(&json) {
                Ok(record) => {
                    overrides.insert(VariantKey::from_raw(key), record);
                }
                Err(e) => {
                    warn!(variant = %key, "Skipping corrupt override record: {}", e);
                }
            }
        }
        Ok(overrides)
    }

    async fn save_overrides(&self, overrides: &OverrideMap) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM price_overrides")
            .execute(&mut *tx)
            .await?;

        for (key, record) in overrides {
            let json = serde_json::to_string(record)?;
            sqlx::query(
                "INSERT INTO price_overrides (variant_key, record, updated_at) VALUES (?, ?, ?)",
            )
            .bind(key.as_str())
            .bind(json)
            .bind(record.last_updated)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Persisted {} overrides", overrides.len());
        Ok(())
    }

    async fn load_market_settings(&self) -> Result<BTreeMap<Market, MarketSettings>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT market, settings FROM market_settings")
                .fetch_all(&self.pool)
                .await?;

        let mut settings = BTreeMap::new();
        for (code, json) in rows {
            match serde_json::from_str::<MarketSettings>(&json) {
                Ok(record) => {
                    settings.insert(Market::new(&code), record);
                }
                Err(e) => {
                    warn!(market = %code, "Skipping undecodable market settings: {}", e);
                }
            }
        }
        Ok(settings)
    }

    async fn save_market_settings(&self, market: &Market, settings: &MarketSettings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        sqlx::query(
            r#"
            INSERT INTO market_settings (market, settings, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(market) DO UPDATE SET
                settings = excluded.settings,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(market.code())
        .bind(json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_market_settings(&self, market: &Market) -> Result<()> {
        sqlx::query("DELETE FROM market_settings WHERE market = ?")
            .bind(market.code())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

//! Inventory sources the engine re-syncs raw cost data from
//!
//! A source only fetches; the engine owns ordering (tickets) and
//! reconciliation of whatever comes back.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::variant::RawCostRecord;
use crate::{Error, Result};

/// Anything that can deliver a fresh raw cost dataset
pub trait InventorySource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<Vec<RawCostRecord>>> + Send;
}

/// Monotonically increasing sync sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SyncTicket(pub u64);

/// Result of applying a sync response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Applied {
        ticket: SyncTicket,
        variants: usize,
        flagged: usize,
    },
    /// A newer sync had already been applied; the response was discarded
    Stale {
        ticket: SyncTicket,
        applied: SyncTicket,
    },
}

/// Backend refresh over HTTP: `POST {base}/inventory/refresh`, then
/// `GET {base}/inventory/costs` returning a JSON array of cost records
#[derive(Debug, Clone)]
pub struct HttpInventorySource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpInventorySource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

impl InventorySource for HttpInventorySource {
    async fn fetch(&self) -> Result<Vec<RawCostRecord>> {
        let refresh = self.endpoint("inventory/refresh");
        self.client
            .post(&refresh)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::Sync(format!("refresh request failed: {e}")))?;
        debug!("Backend refresh acknowledged: {}", refresh);

        let records = self
            .client
            .get(self.endpoint("inventory/costs"))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::Sync(format!("cost download failed: {e}")))?
            .json::<Vec<RawCostRecord>>()
            .await
            .map_err(|e| Error::Sync(format!("cost payload malformed: {e}")))?;

        Ok(records)
    }
}

/// Cost records read from a JSON file on disk
#[derive(Debug, Clone)]
pub struct FileInventorySource {
    path: PathBuf,
}

impl FileInventorySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl InventorySource for FileInventorySource {
    async fn fetch(&self) -> Result<Vec<RawCostRecord>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::Sync(format!("{}: {e}", self.path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Sync(format!("{}: {e}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_source_reads_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("costs.json");
        std::fs::write(
            &path,
            r#"[{"model":"iPhone 13","grade":"A","capacity":"128GB","color":"Blue","market":"VE","quantity":2,"base_cost":410.5}]"#,
        )
        .unwrap();

        let records = FileInventorySource::new(&path).fetch().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].base_cost, Some(410.5));
        assert_eq!(records[0].shipping_cost, None);
    }

    #[tokio::test]
    async fn test_missing_file_is_sync_failure() {
        let source = FileInventorySource::new("/nonexistent/pricedesk/costs.json");
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, Error::Sync(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_malformed_file_is_sync_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("costs.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileInventorySource::new(&path).fetch().await,
            Err(Error::Sync(_))
        ));
    }

    #[test]
    fn test_http_endpoints_join_cleanly() {
        let source =
            HttpInventorySource::new("http://localhost:8080/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(source.base_url(), "http://localhost:8080/api");
        assert_eq!(
            source.endpoint("inventory/costs"),
            "http://localhost:8080/api/inventory/costs"
        );
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_sync_failure() {
        let source =
            HttpInventorySource::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(matches!(source.fetch().await, Err(Error::Sync(_))));
    }
}

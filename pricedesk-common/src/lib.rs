//! # Pricedesk Common Library
//!
//! Pricing and override reconciliation shared by every pricedesk front end:
//! - Market settings with a single default-fallback policy
//! - Margin curve and price composition
//! - Durable price overrides
//! - Reconciled effective prices and the event bus that announces them
//! - Inventory sync glue, configuration and error types

pub mod composer;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod events;
pub mod margin_curve;
pub mod overrides;
pub mod reconcile;
pub mod settings;
pub mod storage;
pub mod sync;
pub mod variant;

pub use engine::PricingEngine;
pub use error::{Error, ErrorCategory, Result, UserFacingError};
pub use events::{EventBus, PricingEvent, RecomputeTrigger};
pub use overrides::{OverrideMap, OverrideRecord};
pub use reconcile::{EffectivePrice, PriceSource};
pub use settings::{CommissionType, MarketSettings, MarketSettingsStore};
pub use storage::{MemoryStorage, PricingStorage};
pub use variant::{Market, ProductVariant, RawCostRecord, VariantId, VariantKey};

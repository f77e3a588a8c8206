//! Per-market pricing configuration
//!
//! One [`MarketSettings`] record per market holds the margin curve, the
//! profit caps, the market-level cost add-ons and the commission rule.
//!
//! # Defaulting
//!
//! Every market has a built-in default ([`MarketSettings::default_for`]).
//! Malformed settings never reach the price math: the lenient load path
//! substitutes the market baseline (config seed, else built-in default), and
//! the strict write path rejects the write and keeps whatever was in effect
//! before.
//!
//! Validation rules live in one metadata table ([`MarketSettings::metadata`])
//! shared by both paths.

use serde::{Deserialize, Serialize};

use crate::variant::Market;
use crate::{Error, Result};

mod metadata;
mod store;

pub use store::MarketSettingsStore;

/// How the commission on top of the sell price is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionType {
    /// `commission_value` percent of the sell price
    Percentage,
    /// `commission_value` currency units per unit sold
    Fixed,
}

impl CommissionType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "percentage" | "percent" | "%" => Some(CommissionType::Percentage),
            "fixed" | "flat" => Some(CommissionType::Fixed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionType::Percentage => "percentage",
            CommissionType::Fixed => "fixed",
        }
    }
}

impl std::fmt::Display for CommissionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric pricing configuration for one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSettings {
    /// Lower bound of the margin band; curve output is clamped to it
    pub low_margin_percent: f64,
    /// Upper bound of the margin band
    pub high_margin_percent: f64,
    /// false = two-point step instead of interpolation
    pub margin_curve_enabled: bool,
    pub curve_start_price: f64,
    pub curve_end_price: f64,
    pub curve_start_margin: f64,
    pub curve_end_margin: f64,
    /// Exponent applied to the normalized curve position; > 0
    pub curve_steepness: f64,
    pub min_profit_cap: f64,
    pub max_profit_cap: f64,
    pub commission_type: CommissionType,
    pub commission_value: f64,
    /// Added to every variant's cost in this market
    pub shipping_addon: f64,
    pub packaging_addon: f64,
    /// Decimal places of the currency's minor unit (0 = whole units)
    pub price_decimals: u32,
}

/// Metadata for a single market setting
///
/// `validator` checks the field inside a whole record (so cross-field rules
/// such as `curve_start_price < curve_end_price` live with the field they
/// constrain). Error format: `"{key}: {reason}"`.
pub struct SettingMetadata {
    pub key: &'static str,
    pub description: &'static str,
    pub validation_range: &'static str,
    pub validator: fn(&MarketSettings) -> std::result::Result<(), String>,
    pub setter: fn(&mut MarketSettings, &str) -> std::result::Result<(), String>,
    pub getter: fn(&MarketSettings) -> String,
}

impl Default for MarketSettings {
    /// Generic default, served to markets without a built-in profile
    fn default() -> Self {
        Self {
            low_margin_percent: 5.0,
            high_margin_percent: 60.0,
            margin_curve_enabled: true,
            curve_start_price: 100.0,
            curve_end_price: 1500.0,
            curve_start_margin: 35.0,
            curve_end_margin: 12.0,
            curve_steepness: 1.5,
            min_profit_cap: 20.0,
            max_profit_cap: 400.0,
            commission_type: CommissionType::Percentage,
            commission_value: 0.0,
            shipping_addon: 0.0,
            packaging_addon: 0.0,
            price_decimals: 0,
        }
    }
}

impl MarketSettings {
    /// Built-in default for a market
    pub fn default_for(market: &Market) -> Self {
        match market.code() {
            "VE" => Self {
                low_margin_percent: 8.0,
                high_margin_percent: 60.0,
                margin_curve_enabled: true,
                curve_start_price: 100.0,
                curve_end_price: 1200.0,
                curve_start_margin: 40.0,
                curve_end_margin: 18.0,
                curve_steepness: 1.8,
                min_profit_cap: 25.0,
                max_profit_cap: 350.0,
                commission_type: CommissionType::Percentage,
                commission_value: 5.0,
                shipping_addon: 20.0,
                packaging_addon: 5.0,
                price_decimals: 0,
            },
            "US" => Self {
                low_margin_percent: 5.0,
                high_margin_percent: 50.0,
                margin_curve_enabled: true,
                curve_start_price: 150.0,
                curve_end_price: 1500.0,
                curve_start_margin: 30.0,
                curve_end_margin: 12.0,
                curve_steepness: 2.0,
                min_profit_cap: 30.0,
                max_profit_cap: 500.0,
                commission_type: CommissionType::Fixed,
                commission_value: 0.0,
                shipping_addon: 0.0,
                packaging_addon: 3.0,
                price_decimals: 0,
            },
            _ => Self::default(),
        }
    }

    /// Metadata for every setting, the single source of validation rules
    pub fn metadata() -> &'static [SettingMetadata] {
        metadata::SETTING_METADATA
    }

    /// Collect every violated rule
    pub fn validation_errors(&self) -> Vec<String> {
        Self::metadata()
            .iter()
            .filter_map(|meta| (meta.validator)(self).err())
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.validation_errors().is_empty()
    }

    /// Strict validation used on the settings write path
    pub fn validate(&self) -> Result<()> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidInput(errors.join("; ")))
        }
    }

    /// Self if valid, the market default otherwise
    pub fn sanitized(self, market: &Market) -> Self {
        if self.is_valid() {
            self
        } else {
            Self::default_for(market)
        }
    }

    /// Parse and assign one field by key (no cross-field validation)
    pub fn apply_field(&mut self, key: &str, value: &str) -> Result<()> {
        let meta = Self::metadata()
            .iter()
            .find(|m| m.key == key)
            .ok_or_else(|| Error::InvalidInput(format!("{key}: unknown setting")))?;
        (meta.setter)(self, value).map_err(Error::InvalidInput)
    }

    /// Render one field by key
    pub fn field(&self, key: &str) -> Option<String> {
        Self::metadata()
            .iter()
            .find(|m| m.key == key)
            .map(|meta| (meta.getter)(self))
    }
}

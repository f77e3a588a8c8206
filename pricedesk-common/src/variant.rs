//! Product variant identity, cost records and the sync wire shape
//!
//! A variant is identified by `(model, grade, capacity, color, market)`.
//! The rendered [`VariantKey`] (`model-grade-capacity-color-market`) is the
//! stable identity used by the override store, the durable map and events,
//! so overrides stay attached regardless of dataset order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Market code (upper-case normalized, extensible)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Market(String);

impl Market {
    /// Market assumed when a raw record does not carry one
    pub const DEFAULT_CODE: &'static str = "US";

    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_uppercase())
    }

    pub fn ve() -> Self {
        Self::new("VE")
    }

    pub fn us() -> Self {
        Self::new("US")
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl Default for Market {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CODE)
    }
}

impl From<String> for Market {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Market {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Market> for String {
    fn from(value: Market) -> Self {
        value.0
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable string identity of a variant
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantKey(String);

impl VariantKey {
    /// Wrap an already-rendered key (e.g. one read back from storage)
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity tuple of a sellable SKU
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantId {
    pub model: String,
    pub grade: String,
    pub capacity: String,
    pub color: String,
    pub market: Market,
}

impl VariantId {
    pub fn new(
        model: impl Into<String>,
        grade: impl Into<String>,
        capacity: impl Into<String>,
        color: impl Into<String>,
        market: Market,
    ) -> Self {
        Self {
            model: model.into(),
            grade: grade.into(),
            capacity: capacity.into(),
            color: color.into(),
            market,
        }
    }

    pub fn key(&self) -> VariantKey {
        VariantKey(format!(
            "{}-{}-{}-{}-{}",
            self.model.trim(),
            self.grade.trim(),
            self.capacity.trim(),
            self.color.trim(),
            self.market
        ))
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Per-unit cost add-ons recorded for a variant (all non-negative)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AdditionalCosts {
    #[serde(default)]
    pub shipping: f64,
    #[serde(default, rename = "box")]
    pub box_cost: f64,
    #[serde(default)]
    pub cable: f64,
    #[serde(default)]
    pub repair: f64,
    #[serde(default)]
    pub parts: f64,
}

impl AdditionalCosts {
    pub fn total(&self) -> f64 {
        self.shipping + self.box_cost + self.cable + self.repair + self.parts
    }

    fn components(&self) -> [f64; 5] {
        [self.shipping, self.box_cost, self.cable, self.repair, self.parts]
    }
}

/// Data-quality markers attached while normalizing a raw record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostFlag {
    /// Base cost absent or not a number; priced as cost 0
    MissingCost,
    /// A cost component was negative; replaced by 0
    NegativeCost,
    /// Quantity was negative; replaced by 0
    NegativeQuantity,
}

/// A priced inventory line, created and refreshed only by sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: VariantId,
    pub quantity: u32,
    pub base_cost: f64,
    #[serde(default)]
    pub additional_costs: AdditionalCosts,
    #[serde(default)]
    pub flags: Vec<CostFlag>,
}

impl ProductVariant {
    pub fn new(id: VariantId, quantity: u32, base_cost: f64) -> Self {
        Self {
            id,
            quantity,
            base_cost,
            additional_costs: AdditionalCosts::default(),
            flags: Vec::new(),
        }
    }

    pub fn with_additional_costs(mut self, costs: AdditionalCosts) -> Self {
        self.additional_costs = costs;
        self
    }

    pub fn key(&self) -> VariantKey {
        self.id.key()
    }

    /// Base cost plus every recorded add-on, before market add-ons
    pub fn unit_cost(&self) -> f64 {
        self.base_cost + self.additional_costs.total()
    }

    /// True when any cost component is negative or non-finite
    pub fn has_invalid_cost(&self) -> bool {
        std::iter::once(self.base_cost)
            .chain(self.additional_costs.components())
            .any(|value| !value.is_finite() || value < 0.0)
    }

    /// Normalize a sync record. Missing or negative fields never drop the
    /// record; they become 0 and are flagged.
    pub fn from_raw(raw: RawCostRecord) -> Self {
        let mut flags = Vec::new();

        let base_cost = match raw.base_cost.filter(|v| v.is_finite()) {
            None => {
                flags.push(CostFlag::MissingCost);
                0.0
            }
            Some(v) if v < 0.0 => {
                flags.push(CostFlag::NegativeCost);
                0.0
            }
            Some(v) => v,
        };

        let mut negative_component = false;
        let mut component = |value: Option<f64>| -> f64 {
            match value.filter(|v| v.is_finite()) {
                Some(v) if v < 0.0 => {
                    negative_component = true;
                    0.0
                }
                Some(v) => v,
                None => 0.0,
            }
        };
        let additional_costs = AdditionalCosts {
            shipping: component(raw.shipping_cost),
            box_cost: component(raw.box_cost),
            cable: component(raw.cable_cost),
            repair: component(raw.repair_cost),
            parts: component(raw.parts_cost),
        };
        if negative_component && !flags.contains(&CostFlag::NegativeCost) {
            flags.push(CostFlag::NegativeCost);
        }

        let quantity = match raw.quantity {
            Some(q) if q < 0 => {
                flags.push(CostFlag::NegativeQuantity);
                0
            }
            Some(q) => u32::try_from(q).unwrap_or(u32::MAX),
            None => 0,
        };

        let market = raw
            .market
            .filter(|m| !m.trim().is_empty())
            .map(Market::new)
            .unwrap_or_default();

        Self {
            id: VariantId::new(raw.model, raw.grade, raw.capacity, raw.color, market),
            quantity,
            base_cost,
            additional_costs,
            flags,
        }
    }
}

/// Raw cost row as delivered by the backend refresh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCostRecord {
    pub model: String,
    pub grade: String,
    pub capacity: String,
    pub color: String,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub base_cost: Option<f64>,
    #[serde(default)]
    pub shipping_cost: Option<f64>,
    #[serde(default)]
    pub box_cost: Option<f64>,
    #[serde(default)]
    pub cable_cost: Option<f64>,
    #[serde(default)]
    pub repair_cost: Option<f64>,
    #[serde(default)]
    pub parts_cost: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(model: &str) -> RawCostRecord {
        RawCostRecord {
            model: model.to_string(),
            grade: "A".to_string(),
            capacity: "128GB".to_string(),
            color: "Black".to_string(),
            market: Some("ve".to_string()),
            quantity: Some(3),
            base_cost: Some(400.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_market_is_normalized() {
        assert_eq!(Market::new(" ve "), Market::ve());
        assert_eq!(Market::new("us").code(), "US");
        let parsed: Market = serde_json::from_str("\"ve\"").unwrap();
        assert_eq!(parsed, Market::ve());
    }

    #[test]
    fn test_key_includes_market() {
        let id = VariantId::new("iPhone 13", "A", "128GB", "Blue", Market::us());
        assert_eq!(id.key().as_str(), "iPhone 13-A-128GB-Blue-US");
    }

    #[test]
    fn test_same_identity_same_key_regardless_of_market_case() {
        let a = VariantId::new("Pixel 7", "B", "256GB", "Snow", Market::new("ve"));
        let b = VariantId::new("Pixel 7", "B", "256GB", "Snow", Market::new("VE"));
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_from_raw_clean_record_has_no_flags() {
        let variant = ProductVariant::from_raw(raw("iPhone 12"));
        assert!(variant.flags.is_empty());
        assert_eq!(variant.base_cost, 400.0);
        assert_eq!(variant.quantity, 3);
        assert_eq!(variant.id.market, Market::ve());
    }

    #[test]
    fn test_from_raw_missing_cost_is_zero_and_flagged() {
        let mut record = raw("iPhone 12");
        record.base_cost = None;
        let variant = ProductVariant::from_raw(record);
        assert_eq!(variant.base_cost, 0.0);
        assert_eq!(variant.flags, vec![CostFlag::MissingCost]);
    }

    #[test]
    fn test_from_raw_negative_fields_clamped_and_flagged() {
        let mut record = raw("iPhone 12");
        record.repair_cost = Some(-25.0);
        record.quantity = Some(-2);
        let variant = ProductVariant::from_raw(record);
        assert_eq!(variant.additional_costs.repair, 0.0);
        assert_eq!(variant.quantity, 0);
        assert!(variant.flags.contains(&CostFlag::NegativeCost));
        assert!(variant.flags.contains(&CostFlag::NegativeQuantity));
    }

    #[test]
    fn test_from_raw_without_market_uses_default() {
        let mut record = raw("iPhone 12");
        record.market = None;
        let variant = ProductVariant::from_raw(record);
        assert_eq!(variant.id.market, Market::default());
    }

    #[test]
    fn test_unit_cost_sums_components() {
        let variant = ProductVariant::new(
            VariantId::new("X", "A", "64GB", "Red", Market::us()),
            1,
            100.0,
        )
        .with_additional_costs(AdditionalCosts {
            shipping: 10.0,
            box_cost: 2.0,
            cable: 3.0,
            repair: 0.0,
            parts: 5.0,
        });
        assert_eq!(variant.unit_cost(), 120.0);
        assert!(!variant.has_invalid_cost());
    }
}

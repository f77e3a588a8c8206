//! Reconciliation: computed price merged with override state
//!
//! This is the only place that decides which price a variant shows. An
//! active override is terminal: its price is shown as both the sell price
//! and the customer price, without commission on top.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::composer::{compute_from_cost, compute_price, ComputedPrice};
use crate::overrides::{OverrideMap, OverrideRecord};
use crate::settings::{MarketSettings, MarketSettingsStore};
use crate::variant::{CostFlag, ProductVariant, VariantId, VariantKey};

/// Where the displayed price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Computed,
    Override,
}

/// The single price every consumer sees for a variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectivePrice {
    pub variant: VariantKey,
    pub id: VariantId,
    pub quantity: u32,
    pub source: PriceSource,
    pub sell_price: f64,
    pub customer_price: f64,
    pub computed: ComputedPrice,
    pub override_info: Option<OverrideRecord>,
    pub flags: Vec<CostFlag>,
}

impl EffectivePrice {
    pub fn is_overridden(&self) -> bool {
        self.source == PriceSource::Override
    }
}

/// Effective price for one variant
///
/// Never fails: a variant with an invalid cost component is priced as if
/// that cost were zero and flagged.
pub fn price_variant(
    variant: &ProductVariant,
    settings: &MarketSettings,
    override_record: Option<&OverrideRecord>,
) -> EffectivePrice {
    let mut flags = variant.flags.clone();
    let computed = match compute_price(variant, settings) {
        Ok(computed) => computed,
        Err(e) => {
            debug!(variant = %variant.key(), "Pricing at zero cost: {}", e);
            if !flags.contains(&CostFlag::NegativeCost) {
                flags.push(CostFlag::NegativeCost);
            }
            compute_from_cost(settings.shipping_addon + settings.packaging_addon, settings)
        }
    };

    let active = override_record.filter(|record| record.is_active);
    let (source, sell_price, customer_price) = match active {
        Some(record) => (
            PriceSource::Override,
            record.override_price,
            record.override_price,
        ),
        None => (
            PriceSource::Computed,
            computed.sell_price,
            computed.customer_price,
        ),
    };

    EffectivePrice {
        variant: variant.key(),
        id: variant.id.clone(),
        quantity: variant.quantity,
        source,
        sell_price,
        customer_price,
        computed,
        override_info: active.cloned(),
        flags,
    }
}

/// Effective prices for a dataset, in dataset order
///
/// Overrides are matched by key, so dataset order and size do not matter.
pub fn reconcile(
    variants: &[ProductVariant],
    settings: &MarketSettingsStore,
    overrides: &OverrideMap,
) -> Vec<EffectivePrice> {
    let mut market_settings: HashMap<_, MarketSettings> = HashMap::new();
    let prices: Vec<EffectivePrice> = variants
        .iter()
        .map(|variant| {
            let market = market_settings
                .entry(variant.id.market.clone())
                .or_insert_with(|| settings.get(&variant.id.market));
            price_variant(variant, market, overrides.get(&variant.key()))
        })
        .collect();

    let flagged = prices.iter().filter(|p| !p.flags.is_empty()).count();
    if flagged > 0 {
        info!("{} of {} variants have flagged cost data", flagged, prices.len());
    }
    prices
}

/// Merge rows sharing a variant key
///
/// The first occurrence keeps its position, quantities are summed and the
/// last row's costs win.
pub fn merge_duplicates(variants: Vec<ProductVariant>) -> Vec<ProductVariant> {
    let mut positions: HashMap<VariantKey, usize> = HashMap::new();
    let mut merged: Vec<ProductVariant> = Vec::with_capacity(variants.len());

    for variant in variants {
        let key = variant.key();
        match positions.get(&key) {
            Some(&index) => {
                let quantity = merged[index].quantity.saturating_add(variant.quantity);
                debug!(variant = %key, "Merging duplicate inventory row");
                merged[index] = ProductVariant {
                    quantity,
                    ..variant
                };
            }
            None => {
                positions.insert(key, merged.len());
                merged.push(variant);
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::CommissionType;
    use crate::variant::Market;
    use chrono::Utc;

    fn settings() -> MarketSettings {
        MarketSettings {
            low_margin_percent: 0.0,
            high_margin_percent: 100.0,
            margin_curve_enabled: true,
            curve_start_price: 500.0,
            curve_end_price: 1500.0,
            curve_start_margin: 35.0,
            curve_end_margin: 15.0,
            curve_steepness: 2.0,
            min_profit_cap: 50.0,
            max_profit_cap: 1000.0,
            commission_type: CommissionType::Percentage,
            commission_value: 10.0,
            shipping_addon: 0.0,
            packaging_addon: 0.0,
            price_decimals: 0,
        }
    }

    fn variant(model: &str, cost: f64) -> ProductVariant {
        ProductVariant::new(
            VariantId::new(model, "A", "128GB", "Black", Market::us()),
            1,
            cost,
        )
    }

    fn active_override(price: f64) -> OverrideRecord {
        OverrideRecord {
            is_active: true,
            override_price: price,
            original_price: 675.0,
            last_updated: Utc::now(),
        }
    }

    fn store() -> MarketSettingsStore {
        let mut store = MarketSettingsStore::new();
        store.set(&Market::us(), settings()).unwrap();
        store
    }

    #[test]
    fn test_computed_price_without_override() {
        let price = price_variant(&variant("X", 500.0), &settings(), None);
        assert_eq!(price.source, PriceSource::Computed);
        assert_eq!(price.sell_price, 675.0);
        assert_eq!(price.customer_price, 743.0);
        assert!(price.override_info.is_none());
    }

    #[test]
    fn test_override_is_terminal() {
        let record = active_override(999.0);
        let price = price_variant(&variant("X", 500.0), &settings(), Some(&record));
        assert_eq!(price.source, PriceSource::Override);
        assert_eq!(price.sell_price, 999.0);
        assert_eq!(price.customer_price, 999.0);
        assert_eq!(price.computed.sell_price, 675.0);
    }

    #[test]
    fn test_inactive_override_ignored() {
        let mut record = active_override(999.0);
        record.is_active = false;
        let price = price_variant(&variant("X", 500.0), &settings(), Some(&record));
        assert_eq!(price.source, PriceSource::Computed);
        assert!(price.override_info.is_none());
    }

    #[test]
    fn test_invalid_cost_isolated_and_flagged() {
        let variants = vec![variant("Bad", -40.0), variant("Good", 500.0)];
        let prices = reconcile(&variants, &store(), &OverrideMap::new());

        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0].computed.total_cost, 0.0);
        assert_eq!(prices[0].sell_price, 50.0);
        assert!(prices[0].flags.contains(&CostFlag::NegativeCost));
        assert_eq!(prices[1].sell_price, 675.0);
        assert!(prices[1].flags.is_empty());
    }

    #[test]
    fn test_override_follows_key_not_position() {
        let mut overrides = OverrideMap::new();
        overrides.insert(variant("B", 500.0).key(), active_override(999.0));

        let first = reconcile(
            &[variant("A", 500.0), variant("B", 500.0)],
            &store(),
            &overrides,
        );
        let reordered = reconcile(
            &[variant("C", 100.0), variant("B", 500.0), variant("A", 500.0)],
            &store(),
            &overrides,
        );

        assert_eq!(first[1].sell_price, 999.0);
        assert_eq!(reordered[1].sell_price, 999.0);
        assert_eq!(reordered[2].source, PriceSource::Computed);
    }

    #[test]
    fn test_merge_duplicates_sums_quantity() {
        let mut second = variant("A", 520.0);
        second.quantity = 4;
        let merged = merge_duplicates(vec![variant("A", 500.0), variant("B", 10.0), second]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id.model, "A");
        assert_eq!(merged[0].quantity, 5);
        assert_eq!(merged[0].base_cost, 520.0);
    }
}

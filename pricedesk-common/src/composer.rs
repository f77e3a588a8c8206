//! Price composition: cost + margin + caps → sell price → customer price
//!
//! ```text
//! raw_sell = cost × (1 + margin/100)
//! profit   = raw_sell - cost
//! sell     = cost + max_cap   if profit > max_cap
//!          = cost + min_cap   if profit < min_cap
//!          = raw_sell         otherwise
//! ```
//!
//! The sell price is rounded to the market's `price_decimals`. Commission is
//! a percentage of, or a fixed amount on top of, the rounded sell price.

use serde::{Deserialize, Serialize};

use crate::margin_curve::margin_percent;
use crate::settings::{CommissionType, MarketSettings};
use crate::variant::ProductVariant;
use crate::{Error, Result};

/// Which profit cap bound the sell price, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapApplied {
    Min,
    Max,
}

/// Derived, ephemeral price breakdown; always re-derivable from its inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedPrice {
    pub total_cost: f64,
    pub margin_percent: f64,
    pub sell_price: f64,
    pub commission_amount: f64,
    pub customer_price: f64,
    pub cap_applied: Option<CapApplied>,
}

/// Round half away from zero to `decimals` places
///
/// Decimal ties that binary floats store just below the midpoint (`1.005`
/// is `1.00499999...`) are nudged by a few ulps before rounding so they
/// round the way they are written.
pub fn round_to_precision(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals.min(9) as i32);
    let scaled = value * factor;
    let nudged = scaled * (1.0 + 4.0 * f64::EPSILON);
    nudged.round() / factor
}

fn check_cost(cost: f64) -> Result<()> {
    if !cost.is_finite() {
        return Err(Error::InvalidInput(format!("cost: {cost} is not a number")));
    }
    if cost < 0.0 {
        return Err(Error::InvalidInput(format!("cost: {cost} is negative")));
    }
    Ok(())
}

/// Sell price for a total unit cost
pub fn compose_sell_price(cost: f64, settings: &MarketSettings) -> Result<f64> {
    check_cost(cost)?;
    Ok(sell_price_unchecked(cost, settings).0)
}

/// Customer price: sell price plus commission
pub fn compose_customer_price(sell_price: f64, settings: &MarketSettings) -> Result<f64> {
    if !sell_price.is_finite() || sell_price < 0.0 {
        return Err(Error::InvalidInput(format!(
            "sell_price: {sell_price} must be a finite number >= 0"
        )));
    }
    Ok(sell_price + commission_amount(sell_price, settings))
}

/// Commission owed on a sell price, rounded like the sell price
pub fn commission_amount(sell_price: f64, settings: &MarketSettings) -> f64 {
    let raw = match settings.commission_type {
        CommissionType::Percentage => sell_price * settings.commission_value / 100.0,
        CommissionType::Fixed => settings.commission_value,
    };
    round_to_precision(raw, settings.price_decimals)
}

/// Total unit cost of a variant in its market, including market add-ons
pub fn total_cost(variant: &ProductVariant, settings: &MarketSettings) -> f64 {
    variant.unit_cost() + settings.shipping_addon + settings.packaging_addon
}

/// Full breakdown for a variant; negative cost components are rejected
pub fn compute_price(variant: &ProductVariant, settings: &MarketSettings) -> Result<ComputedPrice> {
    if variant.has_invalid_cost() {
        return Err(Error::InvalidInput(format!(
            "cost: variant {} has a negative or non-numeric cost component",
            variant.key()
        )));
    }
    let cost = total_cost(variant, settings);
    check_cost(cost)?;
    Ok(compute_from_cost(cost, settings))
}

/// Breakdown for an already validated, non-negative total cost
pub(crate) fn compute_from_cost(cost: f64, settings: &MarketSettings) -> ComputedPrice {
    let (sell_price, margin, cap_applied) = sell_price_unchecked(cost, settings);
    let commission = commission_amount(sell_price, settings);
    ComputedPrice {
        total_cost: cost,
        margin_percent: margin,
        sell_price,
        commission_amount: commission,
        customer_price: round_to_precision(sell_price + commission, settings.price_decimals),
        cap_applied,
    }
}

fn sell_price_unchecked(cost: f64, settings: &MarketSettings) -> (f64, f64, Option<CapApplied>) {
    let margin = margin_percent(cost, settings);
    let raw_sell = cost * (1.0 + margin / 100.0);
    let profit = raw_sell - cost;

    let (sell, cap) = if profit > settings.max_profit_cap {
        (cost + settings.max_profit_cap, Some(CapApplied::Max))
    } else if profit < settings.min_profit_cap {
        (cost + settings.min_profit_cap, Some(CapApplied::Min))
    } else {
        (raw_sell, None)
    };

    (round_to_precision(sell, settings.price_decimals), margin, cap)
}

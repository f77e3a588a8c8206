//! Market setting metadata definitions
//!
//! Single source of truth for setting names, ranges, parsing and validation.

use super::{CommissionType, SettingMetadata};

fn parse_f64(key: &str, value: &str) -> Result<f64, String> {
    let v: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("{key}: invalid number format"))?;
    if !v.is_finite() {
        return Err(format!("{key}: value must be finite"));
    }
    Ok(v)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(format!("{key}: expected true or false")),
    }
}

fn non_negative(key: &str, v: f64) -> Result<(), String> {
    if !v.is_finite() || v < 0.0 {
        return Err(format!("{key}: value {v} must be a finite number >= 0"));
    }
    Ok(())
}

pub(super) static SETTING_METADATA: &[SettingMetadata] = &[
    SettingMetadata {
        key: "low_margin_percent",
        description: "Lowest margin the curve may produce (percent)",
        validation_range: "0-1000",
        validator: |s| {
            non_negative("low_margin_percent", s.low_margin_percent)?;
            if s.low_margin_percent > 1000.0 {
                return Err(format!(
                    "low_margin_percent: value {} out of range [0, 1000]",
                    s.low_margin_percent
                ));
            }
            Ok(())
        },
        setter: |s, v| {
            s.low_margin_percent = parse_f64("low_margin_percent", v)?;
            Ok(())
        },
        getter: |s| s.low_margin_percent.to_string(),
    },
    SettingMetadata {
        key: "high_margin_percent",
        description: "Highest margin the curve may produce (percent)",
        validation_range: ">= low_margin_percent",
        validator: |s| {
            non_negative("high_margin_percent", s.high_margin_percent)?;
            if s.high_margin_percent < s.low_margin_percent {
                return Err(format!(
                    "high_margin_percent: value {} below low_margin_percent {}",
                    s.high_margin_percent, s.low_margin_percent
                ));
            }
            Ok(())
        },
        setter: |s, v| {
            s.high_margin_percent = parse_f64("high_margin_percent", v)?;
            Ok(())
        },
        getter: |s| s.high_margin_percent.to_string(),
    },
    SettingMetadata {
        key: "margin_curve_enabled",
        description: "Interpolate along the curve (false = two-point step)",
        validation_range: "true|false",
        validator: |_| Ok(()),
        setter: |s, v| {
            s.margin_curve_enabled = parse_bool("margin_curve_enabled", v)?;
            Ok(())
        },
        getter: |s| s.margin_curve_enabled.to_string(),
    },
    SettingMetadata {
        key: "curve_start_price",
        description: "Cost at or below which the start margin applies",
        validation_range: ">= 0",
        validator: |s| non_negative("curve_start_price", s.curve_start_price),
        setter: |s, v| {
            s.curve_start_price = parse_f64("curve_start_price", v)?;
            Ok(())
        },
        getter: |s| s.curve_start_price.to_string(),
    },
    SettingMetadata {
        key: "curve_end_price",
        description: "Cost at or above which the end margin applies",
        validation_range: "> curve_start_price",
        validator: |s| {
            if !s.curve_end_price.is_finite() || s.curve_end_price <= s.curve_start_price {
                return Err(format!(
                    "curve_end_price: value {} must be greater than curve_start_price {}",
                    s.curve_end_price, s.curve_start_price
                ));
            }
            Ok(())
        },
        setter: |s, v| {
            s.curve_end_price = parse_f64("curve_end_price", v)?;
            Ok(())
        },
        getter: |s| s.curve_end_price.to_string(),
    },
    SettingMetadata {
        key: "curve_start_margin",
        description: "Margin at the low-cost end of the curve (percent)",
        validation_range: ">= curve_end_margin",
        validator: |s| {
            non_negative("curve_start_margin", s.curve_start_margin)?;
            if s.curve_start_margin < s.curve_end_margin {
                return Err(format!(
                    "curve_start_margin: value {} below curve_end_margin {}",
                    s.curve_start_margin, s.curve_end_margin
                ));
            }
            Ok(())
        },
        setter: |s, v| {
            s.curve_start_margin = parse_f64("curve_start_margin", v)?;
            Ok(())
        },
        getter: |s| s.curve_start_margin.to_string(),
    },
    SettingMetadata {
        key: "curve_end_margin",
        description: "Margin at the high-cost end of the curve (percent)",
        validation_range: ">= 0",
        validator: |s| non_negative("curve_end_margin", s.curve_end_margin),
        setter: |s, v| {
            s.curve_end_margin = parse_f64("curve_end_margin", v)?;
            Ok(())
        },
        getter: |s| s.curve_end_margin.to_string(),
    },
    SettingMetadata {
        key: "curve_steepness",
        description: "Exponent of the interpolation (1 = linear)",
        validation_range: "> 0",
        validator: |s| {
            if !s.curve_steepness.is_finite() || s.curve_steepness <= 0.0 {
                return Err(format!(
                    "curve_steepness: value {} must be greater than 0",
                    s.curve_steepness
                ));
            }
            Ok(())
        },
        setter: |s, v| {
            s.curve_steepness = parse_f64("curve_steepness", v)?;
            Ok(())
        },
        getter: |s| s.curve_steepness.to_string(),
    },
    SettingMetadata {
        key: "min_profit_cap",
        description: "Minimum absolute profit per unit",
        validation_range: ">= 0",
        validator: |s| non_negative("min_profit_cap", s.min_profit_cap),
        setter: |s, v| {
            s.min_profit_cap = parse_f64("min_profit_cap", v)?;
            Ok(())
        },
        getter: |s| s.min_profit_cap.to_string(),
    },
    SettingMetadata {
        key: "max_profit_cap",
        description: "Maximum absolute profit per unit",
        validation_range: ">= min_profit_cap",
        validator: |s| {
            if !s.max_profit_cap.is_finite() || s.max_profit_cap < s.min_profit_cap {
                return Err(format!(
                    "max_profit_cap: value {} below min_profit_cap {}",
                    s.max_profit_cap, s.min_profit_cap
                ));
            }
            Ok(())
        },
        setter: |s, v| {
            s.max_profit_cap = parse_f64("max_profit_cap", v)?;
            Ok(())
        },
        getter: |s| s.max_profit_cap.to_string(),
    },
    SettingMetadata {
        key: "commission_type",
        description: "Commission rule: percentage of sell price or fixed amount",
        validation_range: "percentage|fixed",
        validator: |_| Ok(()),
        setter: |s, v| {
            s.commission_type = CommissionType::from_str(v)
                .ok_or_else(|| format!("commission_type: expected percentage or fixed, got '{v}'"))?;
            Ok(())
        },
        getter: |s| s.commission_type.to_string(),
    },
    SettingMetadata {
        key: "commission_value",
        description: "Commission percent or fixed amount",
        validation_range: ">= 0 (<= 100 for percentage)",
        validator: |s| {
            non_negative("commission_value", s.commission_value)?;
            if s.commission_type == CommissionType::Percentage && s.commission_value > 100.0 {
                return Err(format!(
                    "commission_value: percentage {} out of range [0, 100]",
                    s.commission_value
                ));
            }
            Ok(())
        },
        setter: |s, v| {
            s.commission_value = parse_f64("commission_value", v)?;
            Ok(())
        },
        getter: |s| s.commission_value.to_string(),
    },
    SettingMetadata {
        key: "shipping_addon",
        description: "Shipping cost added to every variant in the market",
        validation_range: ">= 0",
        validator: |s| non_negative("shipping_addon", s.shipping_addon),
        setter: |s, v| {
            s.shipping_addon = parse_f64("shipping_addon", v)?;
            Ok(())
        },
        getter: |s| s.shipping_addon.to_string(),
    },
    SettingMetadata {
        key: "packaging_addon",
        description: "Packaging cost added to every variant in the market",
        validation_range: ">= 0",
        validator: |s| non_negative("packaging_addon", s.packaging_addon),
        setter: |s, v| {
            s.packaging_addon = parse_f64("packaging_addon", v)?;
            Ok(())
        },
        getter: |s| s.packaging_addon.to_string(),
    },
    SettingMetadata {
        key: "price_decimals",
        description: "Decimal places prices are rounded to",
        validation_range: "0-4",
        validator: |s| {
            if s.price_decimals > 4 {
                return Err(format!(
                    "price_decimals: value {} out of range [0, 4]",
                    s.price_decimals
                ));
            }
            Ok(())
        },
        setter: |s, v| {
            s.price_decimals = v
                .trim()
                .parse()
                .map_err(|_| "price_decimals: invalid integer format".to_string())?;
            Ok(())
        },
        getter: |s| s.price_decimals.to_string(),
    },
];

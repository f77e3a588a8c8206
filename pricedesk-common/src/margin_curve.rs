//! Margin curve: cost → markup percentage
//!
//! Between `curve_start_price` and `curve_end_price` the margin falls from
//! `curve_start_margin` to `curve_end_margin`:
//!
//! ```text
//! t      = (cost - start_price) / (end_price - start_price)
//! margin = start_margin - (start_margin - end_margin) * t^steepness
//! ```
//!
//! Outside the band the nearest extreme applies. The result is clamped into
//! `[low_margin_percent, high_margin_percent]`. With `curve_start_margin >=
//! curve_end_margin` the curve is monotonically non-increasing in cost.

use crate::settings::MarketSettings;

/// Margin percentage for a cost
///
/// Negative or non-finite costs are evaluated as 0. Pure and deterministic.
pub fn margin_percent(cost: f64, settings: &MarketSettings) -> f64 {
    let cost = if cost.is_finite() { cost.max(0.0) } else { 0.0 };

    let margin = if !settings.margin_curve_enabled {
        step_margin(cost, settings)
    } else if cost <= settings.curve_start_price {
        settings.curve_start_margin
    } else if cost >= settings.curve_end_price {
        settings.curve_end_margin
    } else {
        let span = settings.curve_end_price - settings.curve_start_price;
        let t = (cost - settings.curve_start_price) / span;
        let factor = curve_factor(t, settings.curve_steepness);
        settings.curve_start_margin - (settings.curve_start_margin - settings.curve_end_margin) * factor
    };

    clamp_to_band(margin, settings)
}

/// `t^steepness` with `t` clamped to [0, 1]
pub fn curve_factor(t: f64, steepness: f64) -> f64 {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    t.powf(steepness)
}

fn step_margin(cost: f64, settings: &MarketSettings) -> f64 {
    if cost < settings.curve_start_price {
        settings.curve_start_margin
    } else {
        settings.curve_end_margin
    }
}

// max/min instead of clamp: a malformed band must not panic here.
fn clamp_to_band(margin: f64, settings: &MarketSettings) -> f64 {
    margin
        .max(settings.low_margin_percent)
        .min(settings.high_margin_percent)
}

/// Sample the curve at `points` evenly spaced costs from 0 to
/// `1.25 × curve_end_price`, for settings previews.
pub fn sample_curve(settings: &MarketSettings, points: usize) -> Vec<(f64, f64)> {
    if points == 0 {
        return Vec::new();
    }
    let upper = settings.curve_end_price.max(0.0) * 1.25;
    let step = if points > 1 {
        upper / (points - 1) as f64
    } else {
        0.0
    };
    (0..points)
        .map(|i| {
            let cost = step * i as f64;
            (cost, margin_percent(cost, settings))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::CommissionType;

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
            commission_value: 0.0,
            shipping_addon: 0.0,
            packaging_addon: 0.0,
            price_decimals: 0,
        }
    }

    #[test]
    fn test_extremes() {
        let s = settings();
        assert_eq!(margin_percent(100.0, &s), 35.0);
        assert_eq!(margin_percent(500.0, &s), 35.0);
        assert_eq!(margin_percent(1500.0, &s), 15.0);
        assert_eq!(margin_percent(9000.0, &s), 15.0);
    }

    #[test]
    fn test_interpolation_midpoint() {
        // t = 0.5, factor = 0.25, margin = 35 - 20 * 0.25
        let margin = margin_percent(1000.0, &settings());
        assert!((margin - 30.0).abs() < 1e-9, "got {margin}");
    }

    #[test]
    fn test_linear_when_steepness_is_one() {
        let mut s = settings();
        s.curve_steepness = 1.0;
        let margin = margin_percent(1000.0, &s);
        assert!((margin - 25.0).abs() < 1e-9, "got {margin}");
    }

    #[test]
    fn test_negative_and_nan_cost_evaluated_as_zero() {
        let s = settings();
        assert_eq!(margin_percent(-50.0, &s), 35.0);
        assert_eq!(margin_percent(f64::NAN, &s), 35.0);
    }

    #[test]
    fn test_step_function_when_curve_disabled() {
        let mut s = settings();
        s.margin_curve_enabled = false;
        assert_eq!(margin_percent(499.0, &s), 35.0);
        assert_eq!(margin_percent(500.0, &s), 15.0);
        assert_eq!(margin_percent(1000.0, &s), 15.0);
    }

    #[test]
    fn test_band_clamps_output() {
        let mut s = settings();
        s.low_margin_percent = 20.0;
        s.high_margin_percent = 30.0;
        assert_eq!(margin_percent(0.0, &s), 30.0);
        assert_eq!(margin_percent(5000.0, &s), 20.0);
    }

    #[test]
    fn test_monotonically_non_increasing() {
        for steepness in [0.3, 1.0, 2.0, 5.0] {
            let mut s = settings();
            s.curve_steepness = steepness;
            let mut previous = f64::INFINITY;
            for cost in (0..=2000).step_by(7) {
                let margin = margin_percent(cost as f64, &s);
                assert!(
                    margin <= previous + 1e-12,
                    "steepness {steepness}: margin rose at cost {cost}"
                );
                previous = margin;
            }
        }
    }

    #[test]
    fn test_curve_factor_bounds() {
        assert_eq!(curve_factor(0.0, 2.0), 0.0);
        assert_eq!(curve_factor(1.0, 2.0), 1.0);
        assert_eq!(curve_factor(1.5, 2.0), 1.0);
        assert_eq!(curve_factor(-0.5, 2.0), 0.0);
    }

    #[test]
    fn test_sample_curve() {
        let samples = sample_curve(&settings(), 6);
        assert_eq!(samples.len(), 6);
        assert_eq!(samples[0], (0.0, 35.0));
        assert_eq!(samples[5].0, 1875.0);
        assert_eq!(samples[5].1, 15.0);
        assert!(sample_curve(&settings(), 0).is_empty());
    }
}

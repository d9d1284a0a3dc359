use serde::{Deserialize, Serialize};

use crate::window::ServiceWindow;

/// Two-tier hourly tariff.
///
/// The first `base_hours` of a trip are billed at `base_rate`, every hour after
/// that at `extended_rate`. Partial hours are billed pro rata.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Tariff {
    pub base_rate: f64,
    pub extended_rate: f64,
    pub base_hours: f64,
}

impl Default for Tariff {
    fn default() -> Self {
        Self {
            base_rate: 150.0,
            extended_rate: 100.0,
            base_hours: 3.0,
        }
    }
}

/// The single cost formula used for previews, submission and payment checks
#[derive(Debug, Clone, Default)]
pub struct CostEstimator {
    tariff: Tariff,
}

impl CostEstimator {
    pub fn new(tariff: Tariff) -> Self {
        Self { tariff }
    }

    pub fn tariff(&self) -> &Tariff {
        &self.tariff
    }

    /// Cost of a service window, rounded to two decimals. Empty or inverted windows cost 0.
    pub fn estimate(&self, window: &ServiceWindow) -> f64 {
        let minutes = window.duration_minutes();
        if minutes <= 0 {
            return 0.0;
        }
        let hours = minutes as f64 / 60.0;

        let base = hours.min(self.tariff.base_hours) * self.tariff.base_rate;
        let extended = (hours - self.tariff.base_hours).max(0.0) * self.tariff.extended_rate;

        round_currency(base + extended)
    }
}

/// Cost under the default tariff
pub fn estimate_cost(window: &ServiceWindow) -> f64 {
    CostEstimator::default().estimate(window)
}

/// Amount in the gateway's minor unit (paise).
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

fn round_currency(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

//! Curvature ratio.
//!
//! Second difference of the last three closes, scaled by the mean absolute
//! close-to-close change over the lookback:
//!
//! curvature_ratio = (C[t] - 2*C[t-1] + C[t-2]) / mean(|C[i] - C[i-1]|)
//!
//! A flat lookback has no scale and reads as `Missing`.

use crate::domain::bar::Bar;
use crate::domain::indicator::{
    BarWindow, CURVATURE_RATIO, Indicator, IndicatorValue, closes_with, mean_abs_change,
};

#[derive(Debug, Clone)]
pub struct CurvatureRatio {
    period: usize,
}

impl CurvatureRatio {
    /// Periods below 2 are raised to 2; a second difference needs three closes.
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(2),
        }
    }
}

impl Indicator for CurvatureRatio {
    fn name(&self) -> &'static str {
        CURVATURE_RATIO
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bar: &Bar, prior: &BarWindow) -> IndicatorValue {
        let Some(closes) = closes_with(bar, prior, self.period) else {
            return IndicatorValue::Missing;
        };
        let n = closes.len();
        let second = closes[n - 1] - 2.0 * closes[n - 2] + closes[n - 3];
        IndicatorValue::ratio(second, mean_abs_change(&closes))
    }
}

//! Momentum extension.
//!
//! Distance of the current close from the mean of the prior `n` closes,
//! measured in units of the mean absolute close-to-close change:
//!
//! momentum_ext = (C[t] - mean(C[t-n..t-1])) / mean(|C[i] - C[i-1]|)

use crate::domain::bar::Bar;
use crate::domain::indicator::{
    BarWindow, Indicator, IndicatorValue, MOMENTUM_EXT, closes_with, mean_abs_change,
};

#[derive(Debug, Clone)]
pub struct MomentumExt {
    period: usize,
}

impl MomentumExt {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
        }
    }
}

impl Indicator for MomentumExt {
    fn name(&self) -> &'static str {
        MOMENTUM_EXT
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bar: &Bar, prior: &BarWindow) -> IndicatorValue {
        let Some(closes) = closes_with(bar, prior, self.period) else {
            return IndicatorValue::Missing;
        };
        let (current, history) = match closes.split_last() {
            Some((c, h)) => (*c, h),
            None => return IndicatorValue::Missing,
        };
        let mean = history.iter().sum::<f64>() / history.len() as f64;
        IndicatorValue::ratio(current - mean, mean_abs_change(&closes))
    }
}

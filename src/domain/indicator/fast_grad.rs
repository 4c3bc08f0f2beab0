//! Fast gradient: least-squares slope of the last `n + 1` closes, expressed as
//! a percentage of the current close.

use crate::domain::bar::Bar;
use crate::domain::indicator::{BarWindow, FAST_GRAD, Indicator, IndicatorValue, closes_with};

#[derive(Debug, Clone)]
pub struct FastGrad {
    period: usize,
}

impl FastGrad {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
        }
    }
}

fn slope(ys: &[f64]) -> f64 {
    let n = ys.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = ys.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    num / den
}

impl Indicator for FastGrad {
    fn name(&self) -> &'static str {
        FAST_GRAD
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bar: &Bar, prior: &BarWindow) -> IndicatorValue {
        let Some(closes) = closes_with(bar, prior, self.period) else {
            return IndicatorValue::Missing;
        };
        IndicatorValue::ratio(slope(&closes) * 100.0, bar.close)
    }
}

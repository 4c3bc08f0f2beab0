//! RSI (Relative Strength Index) over the last n close-to-close changes.
//!
//! Simple averages of gains and losses across the window:
//! RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0 and avg_gain > 0: RSI = 100.
//! A window with no movement at all has no defined RSI and reads as `Missing`.
//!
//! Warm-up: n prior bars are needed for n changes.

use crate::domain::bar::Bar;
use crate::domain::indicator::{BarWindow, Indicator, IndicatorValue, RSI, closes_with};

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &'static str {
        RSI
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bar: &Bar, prior: &BarWindow) -> IndicatorValue {
        let Some(closes) = closes_with(bar, prior, self.period) else {
            return IndicatorValue::Missing;
        };

        let mut gains = 0.0;
        let mut losses = 0.0;
        for w in closes.windows(2) {
            let change = w[1] - w[0];
            if change > 0.0 {
                gains += change;
            } else {
                losses -= change;
            }
        }
        let avg_gain = gains / self.period as f64;
        let avg_loss = losses / self.period as f64;

        if avg_loss == 0.0 {
            if avg_gain == 0.0 {
                return IndicatorValue::Missing;
            }
            return IndicatorValue::Present(100.0);
        }
        IndicatorValue::from_f64(100.0 - (100.0 / (1.0 + avg_gain / avg_loss)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::bars;

    fn run(closes: &[f64], period: usize) -> IndicatorValue {
        let ind = Rsi::new(period);
        let all = bars(closes);
        let mut window = BarWindow::with_capacity(ind.lookback());
        let (last, prior) = all.split_last().unwrap();
        for b in prior {
            window.push(b.clone());
        }
        ind.compute(last, &window)
    }

    #[test]
    fn warmup_period() {
        let closes: Vec<f64> = (0..14).map(|i| 100.0 + (i % 5) as f64 * 2.0).collect();
        assert!(run(&closes, 14).is_missing());
        let closes: Vec<f64> = (0..15).map(|i| 100.0 + (i % 5) as f64 * 2.0).collect();
        assert!(!run(&closes, 14).is_missing());
    }

    #[test]
    fn all_gains_no_losses() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        assert_eq!(run(&closes, 14), IndicatorValue::Present(100.0));
    }

    #[test]
    fn all_losses_no_gains() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 - i as f64).collect();
        let v = run(&closes, 14).value().unwrap();
        assert!(v.abs() < f64::EPSILON, "RSI should be 0 when all losses");
    }

    #[test]
    fn flat_window_is_missing() {
        assert!(run(&[50.0; 15], 14).is_missing());
    }

    #[test]
    fn known_calculation_is_bullish() {
        let closes = [
            44.0, 44.25, 44.50, 43.75, 44.50, 44.25, 44.75, 45.25, 45.50, 45.25, 45.50, 46.0,
            46.25, 46.0, 46.50,
        ];
        let v = run(&closes, 14).value().unwrap();
        assert!(v > 50.0 && v < 100.0, "RSI should be in bullish territory");
    }

    #[test]
    fn in_range() {
        let closes: Vec<f64> = (1..=20)
            .map(|i| 100.0 + (i as f64 % 7.0 - 3.0) * 2.0)
            .collect();
        let v = run(&closes, 14).value().unwrap();
        assert!((0.0..=100.0).contains(&v), "RSI {} out of range", v);
    }
}

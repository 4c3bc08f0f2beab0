//! Per-bar indicator pipeline.
//!
//! - `IndicatorValue`: a present number or an explicit `Missing` marker
//! - `Indicator`: the pluggable contract every indicator implements
//! - `IndicatorSet`: one value per schema name for exactly one bar
//! - `IndicatorPipeline`: runs the configured indicators over a bounded window
//!
//! Warm-up bars, zero denominators and non-finite results all surface as
//! `Missing`; nothing is ever omitted from a set, so the schema of every row
//! is identical.

pub mod adx;
pub mod curvature;
pub mod fast_grad;
pub mod momentum;
pub mod rsi;
pub mod window;

use serde::{Serialize, Serializer};
use std::fmt;

use crate::domain::bar::Bar;
pub use window::BarWindow;

pub const SCHEMA_VERSION: u32 = 1;

pub const CURVATURE_RATIO: &str = "curvature_ratio";
pub const MOMENTUM_EXT: &str = "momentum_ext";
pub const FAST_GRAD: &str = "fast_grad";
pub const ADX: &str = "adx";
pub const RSI: &str = "rsi";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorValue {
    Present(f64),
    Missing,
}

impl IndicatorValue {
    /// Non-finite inputs become `Missing`.
    pub fn from_f64(value: f64) -> Self {
        if value.is_finite() {
            IndicatorValue::Present(value)
        } else {
            IndicatorValue::Missing
        }
    }

    /// `numerator / denominator`, `Missing` when the ratio is undefined.
    pub fn ratio(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 {
            IndicatorValue::Missing
        } else {
            Self::from_f64(numerator / denominator)
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            IndicatorValue::Present(v) => Some(*v),
            IndicatorValue::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, IndicatorValue::Missing)
    }
}

impl Serialize for IndicatorValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            IndicatorValue::Present(v) => serializer.serialize_f64(*v),
            IndicatorValue::Missing => serializer.serialize_none(),
        }
    }
}

/// A named indicator over the current bar and a bounded window of prior bars.
///
/// `lookback` is the number of prior bars the indicator needs; implementations
/// must return `Missing` while the window holds fewer.
pub trait Indicator: Send + Sync {
    fn name(&self) -> &'static str;
    fn lookback(&self) -> usize;
    fn compute(&self, bar: &Bar, prior: &BarWindow) -> IndicatorValue;
}

/// The last `n` prior closes followed by the current close.
pub(crate) fn closes_with(bar: &Bar, prior: &BarWindow, n: usize) -> Option<Vec<f64>> {
    let tail = prior.tail(n)?;
    let mut closes: Vec<f64> = tail.iter().map(|b| b.close).collect();
    closes.push(bar.close);
    Some(closes)
}

/// Mean absolute first difference of a close series.
pub(crate) fn mean_abs_change(closes: &[f64]) -> f64 {
    if closes.len() < 2 {
        return 0.0;
    }
    let total: f64 = closes.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    total / (closes.len() - 1) as f64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSchema {
    pub version: u32,
    pub names: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSet {
    pub bar_index: u64,
    pub values: Vec<(&'static str, IndicatorValue)>,
}

impl IndicatorSet {
    /// Value for `name`. Names outside the schema read as `Missing`.
    pub fn get(&self, name: &str) -> IndicatorValue {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
            .unwrap_or(IndicatorValue::Missing)
    }

    pub fn has_missing(&self) -> bool {
        self.values.iter().any(|(_, v)| v.is_missing())
    }

    pub fn missing_names(&self) -> Vec<&'static str> {
        self.values
            .iter()
            .filter(|(_, v)| v.is_missing())
            .map(|(n, _)| *n)
            .collect()
    }
}

/// Lookback periods for the standard indicator set.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPeriods {
    pub curvature: usize,
    pub momentum: usize,
    pub grad: usize,
    pub adx: usize,
    pub rsi: usize,
}

impl Default for IndicatorPeriods {
    fn default() -> Self {
        IndicatorPeriods {
            curvature: 5,
            momentum: 10,
            grad: 5,
            adx: 14,
            rsi: 14,
        }
    }
}

pub struct IndicatorPipeline {
    indicators: Vec<Box<dyn Indicator>>,
    window: BarWindow,
    schema: IndicatorSchema,
}

impl IndicatorPipeline {
    pub fn new(indicators: Vec<Box<dyn Indicator>>) -> Self {
        let capacity = indicators.iter().map(|i| i.lookback()).max().unwrap_or(0);
        let schema = IndicatorSchema {
            version: SCHEMA_VERSION,
            names: indicators.iter().map(|i| i.name()).collect(),
        };
        Self {
            indicators,
            window: BarWindow::with_capacity(capacity),
            schema,
        }
    }

    pub fn standard(periods: &IndicatorPeriods) -> Self {
        Self::new(vec![
            Box::new(curvature::CurvatureRatio::new(periods.curvature)),
            Box::new(momentum::MomentumExt::new(periods.momentum)),
            Box::new(fast_grad::FastGrad::new(periods.grad)),
            Box::new(adx::Adx::new(periods.adx)),
            Box::new(rsi::Rsi::new(periods.rsi)),
        ])
    }

    pub fn schema(&self) -> &IndicatorSchema {
        &self.schema
    }

    pub fn window(&self) -> &BarWindow {
        &self.window
    }

    /// Evaluate every indicator against `prior`. Pure: identical inputs give
    /// identical sets.
    pub fn compute(&self, bar: &Bar, prior: &BarWindow) -> IndicatorSet {
        let values = self
            .indicators
            .iter()
            .map(|ind| {
                let value = match ind.compute(bar, prior) {
                    IndicatorValue::Present(v) => IndicatorValue::from_f64(v),
                    IndicatorValue::Missing => IndicatorValue::Missing,
                };
                (ind.name(), value)
            })
            .collect();
        IndicatorSet {
            bar_index: bar.bar_index,
            values,
        }
    }

    /// Compute the set for `bar` against the held window, then admit `bar`
    /// into the window.
    pub fn push(&mut self, bar: &Bar) -> IndicatorSet {
        let set = self.compute(bar, &self.window);
        self.window.push(bar.clone());
        set
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}

impl fmt::Debug for IndicatorPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndicatorPipeline")
            .field("schema", &self.schema)
            .field("window_capacity", &self.window.capacity())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    struct Broken;

    impl Indicator for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn lookback(&self) -> usize {
            0
        }
        fn compute(&self, _bar: &Bar, _prior: &BarWindow) -> IndicatorValue {
            IndicatorValue::Present(f64::NAN)
        }
    }

    #[test]
    fn ratio_with_zero_denominator_is_missing() {
        assert_eq!(IndicatorValue::ratio(1.0, 0.0), IndicatorValue::Missing);
        assert_eq!(IndicatorValue::ratio(1.0, 2.0), IndicatorValue::Present(0.5));
    }

    #[test]
    fn non_finite_becomes_missing() {
        assert!(IndicatorValue::from_f64(f64::INFINITY).is_missing());
        assert!(IndicatorValue::from_f64(f64::NAN).is_missing());
    }

    #[test]
    fn pipeline_scrubs_nan_from_plugins() {
        let mut p = IndicatorPipeline::new(vec![Box::new(Broken)]);
        let set = p.push(&bar(1, 100.0));
        assert_eq!(set.get("broken"), IndicatorValue::Missing);
    }

    #[test]
    fn warmup_sets_carry_every_schema_name() {
        let mut p = IndicatorPipeline::standard(&IndicatorPeriods::default());
        let set = p.push(&bar(1, 100.0));
        assert_eq!(set.values.len(), p.schema().names.len());
        assert!(set.values.iter().all(|(_, v)| v.is_missing()));
        let names: Vec<&str> = set.values.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, p.schema().names);
    }

    #[test]
    fn window_capacity_is_max_lookback() {
        let p = IndicatorPipeline::standard(&IndicatorPeriods::default());
        // ADX(14) looks back 2 * 14 bars.
        assert_eq!(p.window().capacity(), 28);
    }

    #[test]
    fn compute_is_deterministic() {
        let mut p = IndicatorPipeline::standard(&IndicatorPeriods::default());
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        for b in bars(&closes[..39]) {
            p.push(&b);
        }
        let next = bar(40, closes[39]);
        let a = p.compute(&next, p.window());
        let b = p.compute(&next, p.window());
        assert_eq!(a, b);
        assert!(!a.has_missing());
    }

    #[test]
    fn get_unknown_name_reads_missing() {
        let set = IndicatorSet {
            bar_index: 1,
            values: vec![(RSI, IndicatorValue::Present(55.0))],
        };
        assert_eq!(set.get(RSI), IndicatorValue::Present(55.0));
        assert!(set.get(ADX).is_missing());
        assert!(!set.has_missing());
    }

    #[test]
    fn mean_abs_change_of_flat_series_is_zero() {
        assert_eq!(mean_abs_change(&[5.0, 5.0, 5.0]), 0.0);
        assert!((mean_abs_change(&[1.0, 2.0, 0.0]) - 1.5).abs() < f64::EPSILON);
    }
}

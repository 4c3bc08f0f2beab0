//! Blocker evaluation.
//!
//! A blocker is a named predicate over one indicator and one override
//! threshold. When it fires, its name lands in the blocker set of every side
//! it applies to. A side may only be entered while its set is empty.
//!
//! # Evaluation Semantics
//!
//! - A `Missing` input fires the blocker; absent data never clears a side
//! - A disabled blocker never fires
//! - One side clear: that side is the signal
//! - Both sides clear: the injected `TieBreak` decides
//! - Neither side clear: `Blocked`

use serde::Serialize;

use crate::domain::indicator::{ADX, CURVATURE_RATIO, FAST_GRAD, IndicatorSet, MOMENTUM_EXT, RSI};
use crate::domain::overrides::{
    ADX_MIN, CURVATURE_MAX, GRAD_MIN, MOMENTUM_EXT_MAX, OverrideSet, RSI_OVERBOUGHT, RSI_OVERSOLD,
};
use crate::domain::signal::{Side, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applies {
    Long,
    Short,
    Both,
}

impl Applies {
    fn covers(self, side: Side) -> bool {
        matches!(
            (self, side),
            (Applies::Both, _) | (Applies::Long, Side::Long) | (Applies::Short, Side::Short)
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Blocker {
    pub name: &'static str,
    pub applies: Applies,
    pub indicator: &'static str,
    pub threshold: &'static str,
    fires: fn(value: f64, threshold: f64) -> bool,
}

impl Blocker {
    /// Whether this blocker fires for `set` under `overrides`.
    pub fn fires(&self, set: &IndicatorSet, overrides: &OverrideSet) -> bool {
        if !overrides.is_enabled(self.name) {
            return false;
        }
        match (set.get(self.indicator).value(), overrides.threshold(self.threshold)) {
            (Some(value), Some(threshold)) => (self.fires)(value, threshold),
            _ => true,
        }
    }
}

pub const BLOCKERS: [Blocker; 9] = [
    Blocker {
        name: "adx_low",
        applies: Applies::Both,
        indicator: ADX,
        threshold: ADX_MIN,
        fires: |adx, min| adx < min,
    },
    Blocker {
        name: "rsi_overbought",
        applies: Applies::Long,
        indicator: RSI,
        threshold: RSI_OVERBOUGHT,
        fires: |rsi, max| rsi > max,
    },
    Blocker {
        name: "rsi_oversold",
        applies: Applies::Short,
        indicator: RSI,
        threshold: RSI_OVERSOLD,
        fires: |rsi, min| rsi < min,
    },
    Blocker {
        name: "grad_not_rising",
        applies: Applies::Long,
        indicator: FAST_GRAD,
        threshold: GRAD_MIN,
        fires: |grad, min| grad <= min,
    },
    Blocker {
        name: "grad_not_falling",
        applies: Applies::Short,
        indicator: FAST_GRAD,
        threshold: GRAD_MIN,
        fires: |grad, min| grad >= -min,
    },
    Blocker {
        name: "momentum_extended_long",
        applies: Applies::Long,
        indicator: MOMENTUM_EXT,
        threshold: MOMENTUM_EXT_MAX,
        fires: |ext, max| ext > max,
    },
    Blocker {
        name: "momentum_extended_short",
        applies: Applies::Short,
        indicator: MOMENTUM_EXT,
        threshold: MOMENTUM_EXT_MAX,
        fires: |ext, max| ext < -max,
    },
    Blocker {
        name: "curvature_against_long",
        applies: Applies::Long,
        indicator: CURVATURE_RATIO,
        threshold: CURVATURE_MAX,
        fires: |curv, max| curv < -max,
    },
    Blocker {
        name: "curvature_against_short",
        applies: Applies::Short,
        indicator: CURVATURE_RATIO,
        threshold: CURVATURE_MAX,
        fires: |curv, max| curv > max,
    },
];

pub const BLOCKER_NAMES: [&str; 9] = [
    "adx_low",
    "rsi_overbought",
    "rsi_oversold",
    "grad_not_rising",
    "grad_not_falling",
    "momentum_extended_long",
    "momentum_extended_short",
    "curvature_against_long",
    "curvature_against_short",
];

/// How the signal of a bar was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    OnlyEligible,
    TieBreak,
    NoneEligible,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::OnlyEligible => "only_eligible",
            Resolution::TieBreak => "tie_break",
            Resolution::NoneEligible => "none_eligible",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockerResult {
    pub bar_index: u64,
    pub blockers_long: Vec<&'static str>,
    pub blockers_short: Vec<&'static str>,
    pub signal: Signal,
    pub resolution: Resolution,
}

impl BlockerResult {
    pub fn blockers(&self, side: Side) -> &[&'static str] {
        match side {
            Side::Long => &self.blockers_long,
            Side::Short => &self.blockers_short,
        }
    }

    /// Entry reason derived from how the signal was resolved, e.g.
    /// `long:only_eligible`. `None` when the bar carries no direction.
    pub fn entry_reason(&self) -> Option<String> {
        self.signal
            .side()
            .map(|side| format!("{}:{}", side, self.resolution.as_str()))
    }
}

/// Decides the signal when both sides are clear.
pub trait TieBreak: Send + Sync {
    fn resolve(&self, set: &IndicatorSet) -> Signal;
}

/// Compares the favourable magnitude of one indicator for each side: the
/// positive part counts for long, the negative part for short. Equal
/// magnitudes (including zero) or a missing value resolve `Flat`.
#[derive(Debug, Clone)]
pub struct PrimaryMagnitude {
    pub indicator: &'static str,
}

impl Default for PrimaryMagnitude {
    fn default() -> Self {
        Self {
            indicator: FAST_GRAD,
        }
    }
}

impl TieBreak for PrimaryMagnitude {
    fn resolve(&self, set: &IndicatorSet) -> Signal {
        let Some(v) = set.get(self.indicator).value() else {
            return Signal::Flat;
        };
        let long = v.max(0.0);
        let short = (-v).max(0.0);
        if long > short {
            Signal::Long
        } else if short > long {
            Signal::Short
        } else {
            Signal::Flat
        }
    }
}

pub struct BlockerEvaluator {
    blockers: Vec<Blocker>,
    tie_break: Box<dyn TieBreak>,
}

impl Default for BlockerEvaluator {
    fn default() -> Self {
        Self::new(Box::new(PrimaryMagnitude::default()))
    }
}

impl BlockerEvaluator {
    pub fn new(tie_break: Box<dyn TieBreak>) -> Self {
        Self {
            blockers: BLOCKERS.to_vec(),
            tie_break,
        }
    }

    pub fn blockers(&self) -> &[Blocker] {
        &self.blockers
    }

    /// Pure function of `set` and `overrides`.
    pub fn evaluate(&self, set: &IndicatorSet, overrides: &OverrideSet) -> BlockerResult {
        let mut blockers_long = Vec::new();
        let mut blockers_short = Vec::new();

        for blocker in &self.blockers {
            if !blocker.fires(set, overrides) {
                continue;
            }
            if blocker.applies.covers(Side::Long) {
                blockers_long.push(blocker.name);
            }
            if blocker.applies.covers(Side::Short) {
                blockers_short.push(blocker.name);
            }
        }

        let (signal, resolution) = match (blockers_long.is_empty(), blockers_short.is_empty()) {
            (true, true) => (self.tie_break.resolve(set), Resolution::TieBreak),
            (true, false) => (Signal::Long, Resolution::OnlyEligible),
            (false, true) => (Signal::Short, Resolution::OnlyEligible),
            (false, false) => (Signal::Blocked, Resolution::NoneEligible),
        };

        BlockerResult {
            bar_index: set.bar_index,
            blockers_long,
            blockers_short,
            signal,
            resolution,
        }
    }
}

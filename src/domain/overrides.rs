//! Runtime-adjustable blocker thresholds and enable flags.
//!
//! An `OverrideSet` is a plain value handed to every evaluation call. Writers
//! build a new set from a patch, validate it as a whole and stage it; the
//! ingestion loop swaps it in between bars.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::blocker::BLOCKER_NAMES;
use crate::domain::error::TrendgateError;

pub const ADX_MIN: &str = "adx_min";
pub const RSI_OVERBOUGHT: &str = "rsi_overbought";
pub const RSI_OVERSOLD: &str = "rsi_oversold";
pub const GRAD_MIN: &str = "grad_min";
pub const MOMENTUM_EXT_MAX: &str = "momentum_ext_max";
pub const CURVATURE_MAX: &str = "curvature_max";

pub const THRESHOLD_KEYS: [&str; 6] = [
    ADX_MIN,
    RSI_OVERBOUGHT,
    RSI_OVERSOLD,
    GRAD_MIN,
    MOMENTUM_EXT_MAX,
    CURVATURE_MAX,
];

const ENABLED_PREFIX: &str = "enabled.";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OverrideValue {
    Flag(bool),
    Number(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverrideSet {
    pub adx_min: f64,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub grad_min: f64,
    pub momentum_ext_max: f64,
    pub curvature_max: f64,
    pub disabled: BTreeSet<String>,
}

impl Default for OverrideSet {
    fn default() -> Self {
        OverrideSet {
            adx_min: 20.0,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            grad_min: 0.0,
            momentum_ext_max: 3.0,
            curvature_max: 2.0,
            disabled: BTreeSet::new(),
        }
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> TrendgateError {
    TrendgateError::OverrideInvalid {
        key: key.to_string(),
        reason: reason.into(),
    }
}

impl OverrideSet {
    pub fn is_enabled(&self, blocker: &str) -> bool {
        !self.disabled.contains(blocker)
    }

    pub fn threshold(&self, key: &str) -> Option<f64> {
        match key {
            ADX_MIN => Some(self.adx_min),
            RSI_OVERBOUGHT => Some(self.rsi_overbought),
            RSI_OVERSOLD => Some(self.rsi_oversold),
            GRAD_MIN => Some(self.grad_min),
            MOMENTUM_EXT_MAX => Some(self.momentum_ext_max),
            CURVATURE_MAX => Some(self.curvature_max),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<OverrideValue> {
        if let Some(v) = self.threshold(key) {
            return Some(OverrideValue::Number(v));
        }
        let blocker = key.strip_prefix(ENABLED_PREFIX)?;
        BLOCKER_NAMES
            .contains(&blocker)
            .then(|| OverrideValue::Flag(self.is_enabled(blocker)))
    }

    /// Every override name with its current value.
    pub fn entries(&self) -> BTreeMap<String, OverrideValue> {
        let mut out = BTreeMap::new();
        for key in THRESHOLD_KEYS {
            if let Some(v) = self.get(key) {
                out.insert(key.to_string(), v);
            }
        }
        for name in BLOCKER_NAMES {
            out.insert(
                format!("{ENABLED_PREFIX}{name}"),
                OverrideValue::Flag(self.is_enabled(name)),
            );
        }
        out
    }

    /// Set a single value without cross-field validation.
    fn set(&mut self, key: &str, value: OverrideValue) -> Result<(), TrendgateError> {
        if let Some(blocker) = key.strip_prefix(ENABLED_PREFIX) {
            if !BLOCKER_NAMES.contains(&blocker) {
                return Err(TrendgateError::UnknownOverride {
                    key: key.to_string(),
                });
            }
            let OverrideValue::Flag(enabled) = value else {
                return Err(invalid(key, "expected true or false"));
            };
            if enabled {
                self.disabled.remove(blocker);
            } else {
                self.disabled.insert(blocker.to_string());
            }
            return Ok(());
        }

        let slot = match key {
            ADX_MIN => &mut self.adx_min,
            RSI_OVERBOUGHT => &mut self.rsi_overbought,
            RSI_OVERSOLD => &mut self.rsi_oversold,
            GRAD_MIN => &mut self.grad_min,
            MOMENTUM_EXT_MAX => &mut self.momentum_ext_max,
            CURVATURE_MAX => &mut self.curvature_max,
            _ => {
                return Err(TrendgateError::UnknownOverride {
                    key: key.to_string(),
                });
            }
        };
        let OverrideValue::Number(v) = value else {
            return Err(invalid(key, "expected a number"));
        };
        *slot = v;
        Ok(())
    }

    /// Build the set that results from applying `patch`. All-or-nothing: on
    /// any error `self` is untouched and no partial result escapes.
    pub fn patched(&self, patch: &BTreeMap<String, OverrideValue>) -> Result<Self, TrendgateError> {
        let mut next = self.clone();
        for (key, value) in patch {
            next.set(key, *value)?;
        }
        next.validate()?;
        Ok(next)
    }

    pub fn validate(&self) -> Result<(), TrendgateError> {
        for key in THRESHOLD_KEYS {
            if let Some(v) = self.threshold(key) {
                if !v.is_finite() {
                    return Err(invalid(key, "must be finite"));
                }
            }
        }
        if !(0.0..=100.0).contains(&self.adx_min) {
            return Err(invalid(ADX_MIN, "adx_min must be between 0 and 100"));
        }
        if !(0.0..=100.0).contains(&self.rsi_overbought) {
            return Err(invalid(
                RSI_OVERBOUGHT,
                "rsi_overbought must be between 0 and 100",
            ));
        }
        if !(0.0..=100.0).contains(&self.rsi_oversold) {
            return Err(invalid(RSI_OVERSOLD, "rsi_oversold must be between 0 and 100"));
        }
        if self.rsi_oversold >= self.rsi_overbought {
            return Err(invalid(
                RSI_OVERSOLD,
                "rsi_oversold must be below rsi_overbought",
            ));
        }
        if self.grad_min < 0.0 {
            return Err(invalid(GRAD_MIN, "grad_min must be non-negative"));
        }
        if self.momentum_ext_max <= 0.0 {
            return Err(invalid(MOMENTUM_EXT_MAX, "momentum_ext_max must be positive"));
        }
        if self.curvature_max <= 0.0 {
            return Err(invalid(CURVATURE_MAX, "curvature_max must be positive"));
        }
        if let Some(unknown) = self
            .disabled
            .iter()
            .find(|name| !BLOCKER_NAMES.contains(&name.as_str()))
        {
            return Err(TrendgateError::UnknownOverride {
                key: format!("{ENABLED_PREFIX}{unknown}"),
            });
        }
        Ok(())
    }
}

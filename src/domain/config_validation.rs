//! Configuration validation.
//!
//! Validates every config field before a stream is started. Numeric fields
//! are checked against their raw text so a typo is reported instead of
//! silently falling back to the default.

use std::collections::BTreeSet;

use crate::domain::blocker::BLOCKER_NAMES;
use crate::domain::error::TrendgateError;
use crate::domain::overrides::{OverrideSet, THRESHOLD_KEYS};
use crate::domain::segment::FlatPolicy;
use crate::ports::config_port::{parse_bool, ConfigPort};

pub const INDICATOR_PERIOD_KEYS: [&str; 5] = [
    "curvature_period",
    "momentum_period",
    "grad_period",
    "adx_period",
    "rsi_period",
];

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), TrendgateError> {
    validate_flat_policy(config)?;
    validate_bool(config, "engine", "multi_position")?;
    validate_count(config, "engine", "history_capacity", 0)?;
    validate_count(config, "engine", "flush_every", 1)?;
    for key in INDICATOR_PERIOD_KEYS {
        let min = if key == "curvature_period" { 2 } else { 1 };
        validate_count(config, "indicators", key, min)?;
    }
    validate_overrides(config)?;
    validate_count(config, "quality", "horizon", 1)?;
    validate_non_negative(config, "quality", "min_move_pct")?;
    validate_bool(config, "trader", "enabled")?;
    validate_bool(config, "trader", "exit_on_reverse")?;
    validate_non_negative(config, "trader", "stop_loss_pct")?;
    validate_non_negative(config, "trader", "take_profit_pct")?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> TrendgateError {
    TrendgateError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Raw numeric value of `section.key`, `None` when unset.
fn number(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, TrendgateError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| invalid(section, key, format!("{key} must be a number, got '{raw}'"))),
    }
}

fn validate_flat_policy(config: &dyn ConfigPort) -> Result<(), TrendgateError> {
    if let Some(raw) = config.get_string("engine", "flat_policy") {
        raw.parse::<FlatPolicy>()
            .map_err(|e| invalid("engine", "flat_policy", e))?;
    }
    Ok(())
}

fn validate_bool(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), TrendgateError> {
    if let Some(raw) = config.get_string(section, key) {
        if parse_bool(&raw).is_none() {
            return Err(invalid(section, key, format!("{key} must be true or false")));
        }
    }
    Ok(())
}

fn validate_count(config: &dyn ConfigPort, section: &str, key: &str, min: i64) -> Result<(), TrendgateError> {
    let Some(raw) = config.get_string(section, key) else {
        return Ok(());
    };
    match raw.trim().parse::<i64>() {
        Ok(v) if v >= min => Ok(()),
        Ok(_) => Err(invalid(section, key, format!("{key} must be at least {min}"))),
        Err(_) => Err(invalid(section, key, format!("{key} must be an integer, got '{raw}'"))),
    }
}

fn validate_non_negative(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), TrendgateError> {
    match number(config, section, key)? {
        Some(v) if v < 0.0 || !v.is_finite() => {
            Err(invalid(section, key, format!("{key} must be non-negative")))
        }
        _ => Ok(()),
    }
}

fn validate_overrides(config: &dyn ConfigPort) -> Result<(), TrendgateError> {
    overrides_from_config(config).map(|_| ())
}

/// The `[overrides]` section as a validated `OverrideSet`. Unset keys keep
/// their defaults.
pub fn overrides_from_config(config: &dyn ConfigPort) -> Result<OverrideSet, TrendgateError> {
    let mut set = OverrideSet::default();
    for key in THRESHOLD_KEYS {
        let Some(v) = number(config, "overrides", key)? else {
            continue;
        };
        match key {
            "adx_min" => set.adx_min = v,
            "rsi_overbought" => set.rsi_overbought = v,
            "rsi_oversold" => set.rsi_oversold = v,
            "grad_min" => set.grad_min = v,
            "momentum_ext_max" => set.momentum_ext_max = v,
            "curvature_max" => set.curvature_max = v,
            _ => {}
        }
    }

    if let Some(names) = config.get_list("overrides", "disabled") {
        let mut disabled = BTreeSet::new();
        for name in names {
            if !BLOCKER_NAMES.contains(&name.as_str()) {
                return Err(invalid(
                    "overrides",
                    "disabled",
                    format!("unknown blocker '{name}'"),
                ));
            }
            disabled.insert(name);
        }
        set.disabled = disabled;
    }

    set.validate().map_err(|e| match e {
        TrendgateError::OverrideInvalid { key, reason } => invalid("overrides", &key, reason),
        other => other,
    })?;
    Ok(set)
}

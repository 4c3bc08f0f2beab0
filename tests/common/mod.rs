#![allow(dead_code)]

use chrono::NaiveDate;
use std::io::Write;
use std::path::Path;
use trendgate::domain::bar::{Bar, TIMESTAMP_FORMAT};
use trendgate::domain::blocker::{BlockerEvaluator, TieBreak, BLOCKER_NAMES};
use trendgate::domain::engine::{EngineConfig, StreamEngine};
use trendgate::domain::indicator::IndicatorSet;
use trendgate::domain::signal::Signal;
use trendgate::domain::trader::TraderConfig;

pub fn bar(i: u64, close: f64) -> Bar {
    Bar {
        bar_index: i,
        timestamp: NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
            + chrono::Duration::minutes(i as i64),
        open: close,
        high: close + 0.5,
        low: close - 0.5,
        close,
    }
}

/// Bars indexed from 1 with the given closes.
pub fn bars(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| bar(i as u64 + 1, c))
        .collect()
}

/// An uptrend with pullbacks every few bars, so both directional movements
/// show up in ADX.
pub fn choppy_uptrend(n: usize) -> Vec<Bar> {
    let closes: Vec<f64> = (0..n)
        .map(|i| {
            let step = if i % 4 == 3 { -0.8 } else { 0.6 };
            100.0 + (i / 4) as f64 * 1.0 + step * (i % 4) as f64
        })
        .collect();
    bars(&closes)
}

/// Sine wave around 100 with amplitude `amp` and `period` bars per cycle.
pub fn wave(n: usize, amp: f64, period: f64) -> Vec<Bar> {
    let closes: Vec<f64> = (0..n)
        .map(|i| 100.0 + amp * (i as f64 * std::f64::consts::TAU / period).sin())
        .collect();
    bars(&closes)
}

/// Tie-break that replays a fixed signal per bar index (1-based); bars past
/// the end resolve `Flat`.
pub struct Scripted(pub Vec<Signal>);

impl TieBreak for Scripted {
    fn resolve(&self, set: &IndicatorSet) -> Signal {
        self.0
            .get(set.bar_index.saturating_sub(1) as usize)
            .copied()
            .unwrap_or(Signal::Flat)
    }
}

/// Config with every blocker disabled and the built-in trader off.
pub fn quiet_config() -> EngineConfig {
    let mut config = EngineConfig {
        trader: TraderConfig {
            enabled: false,
            ..TraderConfig::default()
        },
        ..EngineConfig::default()
    };
    for name in BLOCKER_NAMES {
        config.overrides.disabled.insert(name.to_string());
    }
    config
}

pub fn scripted_engine(config: EngineConfig, signals: Vec<Signal>) -> StreamEngine {
    StreamEngine::with_evaluator(config, BlockerEvaluator::new(Box::new(Scripted(signals))))
}

pub fn write_temp(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub fn write_bars_csv(path: &Path, series: &[Bar]) {
    let mut out = String::from("bar_index,timestamp,open,high,low,close\n");
    for b in series {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.bar_index,
            b.timestamp.format(TIMESTAMP_FORMAT),
            b.open,
            b.high,
            b.low,
            b.close
        ));
    }
    std::fs::write(path, out).unwrap();
}

//! Per-stream ingestion engine.
//!
//! Wires the indicator pipeline, blocker evaluator, trend segmenter, trade
//! journal and signal trader into one sequential step per bar. A bar is
//! processed to completion before the next one is accepted.

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

use crate::domain::bar::Bar;
use crate::domain::blocker::{BlockerEvaluator, BlockerResult, Resolution};
use crate::domain::error::TrendgateError;
use crate::domain::indicator::{IndicatorPeriods, IndicatorPipeline, IndicatorSchema, IndicatorSet, IndicatorValue};
use crate::domain::journal::{ExitOrder, ExitOutcome, TradeJournal};
use crate::domain::overrides::OverrideSet;
use crate::domain::segment::{FavorableMove, FlatPolicy, TrendSegment, TrendSegmenter};
use crate::domain::signal::{Side, Signal};
use crate::domain::trader::{SignalTrader, TraderConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub multi_position: bool,
    pub flat_policy: FlatPolicy,
    /// Number of per-bar diagnostics kept for queries.
    pub history_capacity: usize,
    /// Bars between journal flushes to the trade store.
    pub flush_every: usize,
    pub periods: IndicatorPeriods,
    pub overrides: OverrideSet,
    pub quality_horizon: u64,
    pub quality_min_move_pct: f64,
    pub trader: TraderConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            multi_position: false,
            flat_policy: FlatPolicy::Ignore,
            history_capacity: 500,
            flush_every: 50,
            periods: IndicatorPeriods::default(),
            overrides: OverrideSet::default(),
            quality_horizon: 5,
            quality_min_move_pct: 0.0,
            trader: TraderConfig::default(),
        }
    }
}

/// What the diagnostics query returns for one bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarDiagnostics {
    pub bar_index: u64,
    pub timestamp: String,
    pub close: f64,
    pub signal: Signal,
    pub resolution: Resolution,
    pub indicators: BTreeMap<&'static str, IndicatorValue>,
    pub blockers_long: Vec<&'static str>,
    pub blockers_short: Vec<&'static str>,
}

impl BarDiagnostics {
    fn new(bar: &Bar, set: &IndicatorSet, result: &BlockerResult) -> Self {
        BarDiagnostics {
            bar_index: bar.bar_index,
            timestamp: bar.timestamp_string(),
            close: bar.close,
            signal: result.signal,
            resolution: result.resolution,
            indicators: set.values.iter().copied().collect(),
            blockers_long: result.blockers_long.clone(),
            blockers_short: result.blockers_short.clone(),
        }
    }
}

/// Everything one bar produced.
#[derive(Debug, Clone)]
pub struct BarOutcome {
    pub bar: Bar,
    pub indicators: IndicatorSet,
    pub result: BlockerResult,
    pub closed_segment: Option<TrendSegment>,
    pub exits: Vec<ExitOutcome>,
}

pub struct StreamEngine {
    config: EngineConfig,
    pipeline: IndicatorPipeline,
    evaluator: BlockerEvaluator,
    segmenter: TrendSegmenter,
    journal: TradeJournal,
    trader: SignalTrader,
    overrides: OverrideSet,
    history: VecDeque<BarDiagnostics>,
    last_bar_index: Option<u64>,
    bars_processed: u64,
}

fn segmenter_for(config: &EngineConfig) -> TrendSegmenter {
    TrendSegmenter::new(
        config.flat_policy,
        Box::new(FavorableMove {
            horizon: config.quality_horizon,
            min_move_pct: config.quality_min_move_pct,
        }),
    )
}

impl StreamEngine {
    pub fn new(config: EngineConfig) -> Result<Self, TrendgateError> {
        config.overrides.validate()?;
        Ok(Self::with_evaluator(config, BlockerEvaluator::default()))
    }

    /// Build an engine around a custom evaluator (for instance one with a
    /// different tie-break policy). `config.overrides` is assumed valid.
    pub fn with_evaluator(config: EngineConfig, evaluator: BlockerEvaluator) -> Self {
        Self {
            pipeline: IndicatorPipeline::standard(&config.periods),
            evaluator,
            segmenter: segmenter_for(&config),
            journal: TradeJournal::new(config.multi_position),
            trader: SignalTrader::new(config.trader.clone()),
            overrides: config.overrides.clone(),
            history: VecDeque::with_capacity(config.history_capacity),
            last_bar_index: None,
            bars_processed: 0,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn schema(&self) -> &IndicatorSchema {
        self.pipeline.schema()
    }

    pub fn overrides(&self) -> &OverrideSet {
        &self.overrides
    }

    pub fn segmenter(&self) -> &TrendSegmenter {
        &self.segmenter
    }

    pub fn journal(&self) -> &TradeJournal {
        &self.journal
    }

    pub fn journal_mut(&mut self) -> &mut TradeJournal {
        &mut self.journal
    }

    pub fn history(&self) -> &VecDeque<BarDiagnostics> {
        &self.history
    }

    pub fn last_bar_index(&self) -> Option<u64> {
        self.last_bar_index
    }

    pub fn bars_processed(&self) -> u64 {
        self.bars_processed
    }

    /// Replace the active overrides. Only called between bars.
    pub fn apply_overrides(&mut self, overrides: OverrideSet) {
        tracing::info!(after_bar = ?self.last_bar_index, "overrides applied");
        self.overrides = overrides;
    }

    /// Bars must arrive with strictly consecutive indices. A segment's `count`
    /// is the number of bars it saw, so a skipped index would break
    /// `end - start + 1 == count`.
    fn check_sequence(&self, received: u64) -> Result<(), TrendgateError> {
        let Some(previous) = self.last_bar_index else {
            return Ok(());
        };
        if received <= previous {
            tracing::warn!(previous, received, "out-of-order bar rejected");
            return Err(TrendgateError::OutOfOrderBar { previous, received });
        }
        let expected = previous + 1;
        if received != expected {
            tracing::warn!(expected, received, "bar gap rejected");
            return Err(TrendgateError::BarGap { expected, received });
        }
        Ok(())
    }

    /// Run one bar through the whole pipeline.
    pub fn process_bar(&mut self, bar: &Bar) -> Result<BarOutcome, TrendgateError> {
        self.check_sequence(bar.bar_index)?;

        let indicators = self.pipeline.push(bar);
        let inputs_missing = indicators.has_missing();
        let result = self.evaluator.evaluate(&indicators, &self.overrides);
        let closed_segment = self.segmenter.observe(bar, result.signal, inputs_missing);

        let exits = match self.trader.on_bar(bar, &result, &mut self.journal) {
            Ok(exits) => exits,
            Err(e) => {
                tracing::warn!(bar_index = bar.bar_index, error = %e, "trader rejected by journal");
                Vec::new()
            }
        };

        if self.config.history_capacity > 0 {
            if self.history.len() == self.config.history_capacity {
                self.history.pop_front();
            }
            self.history
                .push_back(BarDiagnostics::new(bar, &indicators, &result));
        }
        self.last_bar_index = Some(bar.bar_index);
        self.bars_processed += 1;

        tracing::debug!(
            bar_index = bar.bar_index,
            signal = %result.signal,
            long = result.blockers_long.len(),
            short = result.blockers_short.len(),
            missing = inputs_missing,
            "bar processed"
        );

        Ok(BarOutcome {
            bar: bar.clone(),
            indicators,
            result,
            closed_segment,
            exits,
        })
    }

    /// Journal an entry decided outside the built-in trader.
    pub fn record_entry(&mut self, bar_index: u64, direction: Side, price: f64, reason: Option<&str>) -> Result<u64, TrendgateError> {
        Ok(self.journal.record_entry(bar_index, direction, price, reason)?)
    }

    /// Journal an exit decided outside the built-in trader.
    pub fn record_exit(&mut self, order: ExitOrder) -> Result<ExitOutcome, TrendgateError> {
        Ok(self.journal.record_exit(order)?)
    }

    /// End of stream: close the open segment.
    pub fn finish(&mut self) -> Option<TrendSegment> {
        let closed = self.segmenter.finish();
        tracing::info!(
            bars = self.bars_processed,
            segments = self.segmenter.closed().len(),
            trades = self.journal.trades().len(),
            "stream finished"
        );
        closed
    }

    /// Drop all stream state. Active overrides survive.
    pub fn restart(&mut self) {
        self.pipeline.reset();
        self.segmenter.reset();
        self.journal.reset();
        self.history.clear();
        self.last_bar_index = None;
        self.bars_processed = 0;
        tracing::info!("stream restarted");
    }
}

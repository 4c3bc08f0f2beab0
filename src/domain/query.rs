//! Shared handle over a stream engine for concurrent readers.
//!
//! Ingestion takes the write lock for exactly one bar. Readers take the read
//! lock only long enough to copy out a snapshot, so no reader ever sees a
//! half-processed bar. Override patches are validated and staged under their
//! own mutex; the next `ingest` swaps them in before touching the bar.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::bar::Bar;
use crate::domain::engine::{BarDiagnostics, BarOutcome, StreamEngine};
use crate::domain::error::{DirectionMismatch, TrendgateError};
use crate::domain::indicator::IndicatorSchema;
use crate::domain::journal::{
    Direction, EventKind, ExitOrder, ExitOutcome, JournalBatch, MatchedTrade, ReasonStats, TradeEvent,
    TradeFilter,
};
use crate::domain::overrides::{OverrideSet, OverrideValue};
use crate::domain::segment::TrendSegment;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSnapshot {
    pub current: Option<TrendSegment>,
    pub segments: Vec<TrendSegment>,
    pub good_bad_updates: u64,
    pub inputs_missing_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverridesView {
    pub active: BTreeMap<String, OverrideValue>,
    /// Staged values that take effect on the next bar.
    pub pending: Option<BTreeMap<String, OverrideValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JournalQuality {
    pub stats: ReasonStats,
    pub mismatches: Vec<DirectionMismatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub bars_processed: u64,
    pub last_bar_index: Option<u64>,
    pub open_positions: usize,
    pub schema_version: u32,
}

/// Bar range for the diagnostics query. `last` wins over the range bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiagnosticsQuery {
    pub last: Option<usize>,
    pub from: Option<u64>,
    pub to: Option<u64>,
}

#[derive(Clone)]
pub struct EngineHandle {
    engine: Arc<RwLock<StreamEngine>>,
    staged: Arc<Mutex<Option<OverrideSet>>>,
}

impl EngineHandle {
    pub fn new(engine: StreamEngine) -> Self {
        Self {
            engine: Arc::new(RwLock::new(engine)),
            staged: Arc::new(Mutex::new(None)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StreamEngine> {
        self.engine.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StreamEngine> {
        self.engine.write().unwrap_or_else(|e| e.into_inner())
    }

    fn staged(&self) -> MutexGuard<'_, Option<OverrideSet>> {
        self.staged.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write access with any staged overrides already swapped in.
    ///
    /// Lock order is staged, then engine, as in `patch_overrides`. The staged
    /// guard is held until the swap is done so a concurrent patch either
    /// lands before it or builds on the set it installs.
    fn write_with_staged(&self) -> RwLockWriteGuard<'_, StreamEngine> {
        let mut staged = self.staged();
        let mut engine = self.write();
        if let Some(overrides) = staged.take() {
            engine.apply_overrides(overrides);
        }
        engine
    }

    /// Process one bar, applying any staged overrides first.
    pub fn ingest(&self, bar: &Bar) -> Result<BarOutcome, TrendgateError> {
        self.write_with_staged().process_bar(bar)
    }

    pub fn finish(&self) -> Option<TrendSegment> {
        self.write().finish()
    }

    pub fn restart(&self) {
        self.write_with_staged().restart();
    }

    pub fn record_entry(
        &self,
        bar_index: u64,
        direction: Direction,
        price: f64,
        reason: Option<&str>,
    ) -> Result<u64, TrendgateError> {
        self.write().record_entry(bar_index, direction, price, reason)
    }

    pub fn record_exit(&self, order: ExitOrder) -> Result<ExitOutcome, TrendgateError> {
        self.write().record_exit(order)
    }

    /// Journal entries appended since the previous call.
    pub fn take_journal_batch(&self) -> JournalBatch {
        self.write().journal_mut().take_unflushed()
    }

    pub fn status(&self) -> EngineStatus {
        let engine = self.read();
        EngineStatus {
            bars_processed: engine.bars_processed(),
            last_bar_index: engine.last_bar_index(),
            open_positions: engine.journal().open_positions().len(),
            schema_version: engine.schema().version,
        }
    }

    pub fn schema(&self) -> IndicatorSchema {
        self.read().schema().clone()
    }

    pub fn recent_events(&self, limit: usize, kind: Option<EventKind>) -> Vec<TradeEvent> {
        self.read().journal().recent_events(limit, kind)
    }

    /// Current segment plus the last `m` closed ones (all when `None`).
    pub fn trend(&self, m: Option<usize>) -> TrendSnapshot {
        let engine = self.read();
        let segmenter = engine.segmenter();
        let segments = match m {
            Some(m) => segmenter.closed_tail(m).to_vec(),
            None => segmenter.closed().to_vec(),
        };
        TrendSnapshot {
            current: segmenter.current().cloned(),
            segments,
            good_bad_updates: segmenter.good_bad_updates(),
            inputs_missing_count: segmenter.inputs_missing_count(),
        }
    }

    pub fn diagnostics(&self, query: DiagnosticsQuery) -> Vec<BarDiagnostics> {
        let engine = self.read();
        let history = engine.history();
        match query.last {
            Some(n) => {
                let skip = history.len().saturating_sub(n);
                history.iter().skip(skip).cloned().collect()
            }
            None => history
                .iter()
                .filter(|d| query.from.is_none_or(|f| d.bar_index >= f))
                .filter(|d| query.to.is_none_or(|t| d.bar_index <= t))
                .cloned()
                .collect(),
        }
    }

    pub fn overrides(&self) -> OverridesView {
        let pending = self.staged().as_ref().map(OverrideSet::entries);
        OverridesView {
            active: self.read().overrides().entries(),
            pending,
        }
    }

    /// Validate `patch` against the newest configuration (staged if any,
    /// otherwise active) and stage the result. On error nothing changes.
    pub fn patch_overrides(
        &self,
        patch: &BTreeMap<String, OverrideValue>,
    ) -> Result<BTreeMap<String, OverrideValue>, TrendgateError> {
        let mut staged = self.staged();
        let base = match staged.as_ref() {
            Some(set) => set.clone(),
            None => self.read().overrides().clone(),
        };
        match base.patched(patch) {
            Ok(next) => {
                let entries = next.entries();
                *staged = Some(next);
                tracing::info!(keys = patch.len(), "overrides staged for next bar");
                Ok(entries)
            }
            Err(e) => {
                tracing::warn!(error = %e, "override patch rejected");
                Err(e)
            }
        }
    }

    pub fn journal_quality(&self) -> JournalQuality {
        let engine = self.read();
        JournalQuality {
            stats: engine.journal().reason_stats(),
            mismatches: engine.journal().mismatches().to_vec(),
        }
    }

    pub fn trades(&self, filter: &TradeFilter) -> Vec<MatchedTrade> {
        self.read().journal().query_trades(filter)
    }
}

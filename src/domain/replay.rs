//! Replay loop: feed a bar sequence through an engine handle, stream the
//! indicator log and flush the journal to a trade store in batches.

use serde::Serialize;

use crate::domain::bar::Bar;
use crate::domain::error::TrendgateError;
use crate::domain::query::EngineHandle;
use crate::ports::report_port::IndicatorSink;
use crate::ports::trade_store::TradeStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub bars: u64,
    pub rejected: u64,
    pub segments: usize,
    pub trades: usize,
    pub mismatches: usize,
    pub flushes: usize,
}

/// Where and how often journal batches are persisted.
pub struct StoreTarget<'a> {
    pub store: &'a dyn TradeStore,
    pub stream: &'a str,
    pub flush_every: usize,
}

fn flush(handle: &EngineHandle, target: &StoreTarget<'_>, summary: &mut ReplaySummary) -> Result<(), TrendgateError> {
    let batch = handle.take_journal_batch();
    if batch.is_empty() {
        return Ok(());
    }
    target.store.save_batch(target.stream, &batch)?;
    summary.flushes += 1;
    tracing::debug!(
        events = batch.events.len(),
        trades = batch.trades.len(),
        "journal batch flushed"
    );
    Ok(())
}

/// Run `bars` to completion and close the stream.
///
/// Out-of-order and gapped bars are skipped and counted. A schema mismatch at the
/// indicator sink or a store failure halts the replay.
pub fn replay<I>(
    handle: &EngineHandle,
    bars: I,
    mut sink: Option<&mut dyn IndicatorSink>,
    target: Option<StoreTarget<'_>>,
) -> Result<ReplaySummary, TrendgateError>
where
    I: IntoIterator<Item = Bar>,
{
    let mut summary = ReplaySummary::default();
    let mut since_flush = 0usize;

    for bar in bars {
        let outcome = match handle.ingest(&bar) {
            Ok(outcome) => outcome,
            Err(TrendgateError::OutOfOrderBar { .. } | TrendgateError::BarGap { .. }) => {
                summary.rejected += 1;
                continue;
            }
            Err(e) => return Err(e),
        };
        summary.bars += 1;

        if let Some(sink) = sink.as_deref_mut() {
            sink.write_row(&outcome.bar, &outcome.indicators)?;
        }

        if let Some(target) = &target {
            since_flush += 1;
            if since_flush >= target.flush_every.max(1) {
                flush(handle, target, &mut summary)?;
                since_flush = 0;
            }
        }
    }

    handle.finish();
    if let Some(sink) = sink.as_deref_mut() {
        sink.finish()?;
    }
    if let Some(target) = &target {
        flush(handle, target, &mut summary)?;
    }

    let trend = handle.trend(None);
    let quality = handle.journal_quality();
    summary.segments = trend.segments.len();
    summary.trades = handle.trades(&Default::default()).len();
    summary.mismatches = quality.mismatches.len();

    tracing::info!(
        bars = summary.bars,
        rejected = summary.rejected,
        segments = summary.segments,
        trades = summary.trades,
        mismatches = summary.mismatches,
        "replay complete"
    );
    Ok(summary)
}

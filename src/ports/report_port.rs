//! Export ports for the indicator log and the trade journal.

use std::path::Path;

use crate::domain::bar::Bar;
use crate::domain::error::TrendgateError;
use crate::domain::indicator::IndicatorSet;
use crate::domain::journal::TradeEvent;

/// Row-at-a-time writer for the per-bar indicator log.
pub trait IndicatorSink {
    /// Write one row. A set whose width differs from the header is a
    /// `SchemaMismatch`; nothing is written for it.
    fn write_row(&mut self, bar: &Bar, set: &IndicatorSet) -> Result<(), TrendgateError>;

    fn finish(&mut self) -> Result<(), TrendgateError>;
}

pub trait ReportPort {
    fn write_journal(&self, events: &[TradeEvent], output_path: &Path) -> Result<(), TrendgateError>;
}

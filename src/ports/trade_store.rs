//! Persistent store for journal events and matched trades.

use crate::domain::error::TrendgateError;
use crate::domain::journal::{JournalBatch, MatchedTrade, TradeFilter};

pub trait TradeStore: Send + Sync {
    /// Append a batch for `stream` atomically.
    fn save_batch(&self, stream: &str, batch: &JournalBatch) -> Result<(), TrendgateError>;

    /// Matched trades of `stream` (all streams when `None`) passing `filter`,
    /// ordered by exit bar.
    fn query_trades(
        &self,
        stream: Option<&str>,
        filter: &TradeFilter,
    ) -> Result<Vec<MatchedTrade>, TrendgateError>;

    /// Entry reasons with their trade counts, most frequent first.
    fn entry_reason_counts(&self, stream: Option<&str>) -> Result<Vec<(String, usize)>, TrendgateError>;

    /// Remove everything stored for `stream`.
    fn clear_stream(&self, stream: &str) -> Result<(), TrendgateError>;
}

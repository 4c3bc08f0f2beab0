//! Bar feed port.

use crate::domain::bar::Bar;
use crate::domain::error::TrendgateError;

pub trait DataPort {
    /// All bars of `stream`, ordered by bar index.
    fn fetch_bars(&self, stream: &str) -> Result<Vec<Bar>, TrendgateError>;

    fn list_streams(&self) -> Result<Vec<String>, TrendgateError>;

    /// First index, last index and bar count of `stream`, if it has bars.
    fn get_data_range(&self, stream: &str) -> Result<Option<(u64, u64, usize)>, TrendgateError>;
}

//! Domain error types.

use crate::domain::journal::Direction;

/// Rejections raised by the trade journal when the producer breaks the
/// position protocol.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JournalError {
    #[error("no open position to exit at bar {bar_index}")]
    NoOpenPosition { bar_index: u64 },

    #[error("no open position with id {position_id} at bar {bar_index}")]
    UnknownPosition { bar_index: u64, position_id: u64 },

    #[error("invalid state at bar {bar_index}: {reason}")]
    InvalidState { bar_index: u64, reason: String },
}

/// A stop-loss exit whose direction disagrees with the entry it closed.
///
/// Recorded on the journal rather than returned as a failure: the trade is
/// kept and the pair is flagged for review.
#[derive(Debug, Clone, PartialEq, serde::Serialize, thiserror::Error)]
#[error(
    "stop loss at bar {exit_bar} exits {exit_direction} but entry at bar {entry_bar} was {entry_direction}"
)]
pub struct DirectionMismatch {
    pub position_id: u64,
    pub entry_bar: u64,
    pub exit_bar: u64,
    pub entry_direction: Direction,
    pub exit_direction: Direction,
}

/// Top-level error type for trendgate.
#[derive(Debug, thiserror::Error)]
pub enum TrendgateError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown override {key}")]
    UnknownOverride { key: String },

    #[error("invalid override {key}: {reason}")]
    OverrideInvalid { key: String, reason: String },

    #[error("bar {received} arrived after bar {previous}")]
    OutOfOrderBar { previous: u64, received: u64 },

    #[error("bar {received} skips ahead of expected bar {expected}")]
    BarGap { expected: u64, received: u64 },

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error("schema mismatch at bar {bar_index}: expected {expected} columns, found {found}")]
    SchemaMismatch {
        bar_index: u64,
        expected: usize,
        found: usize,
    },

    #[error("export error: {reason}")]
    Export { reason: String },

    #[error("no bars for stream {stream}")]
    NoData { stream: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&TrendgateError> for std::process::ExitCode {
    fn from(err: &TrendgateError) -> Self {
        let code: u8 = match err {
            TrendgateError::Io(_) | TrendgateError::Export { .. } => 1,
            TrendgateError::ConfigParse { .. }
            | TrendgateError::ConfigMissing { .. }
            | TrendgateError::ConfigInvalid { .. }
            | TrendgateError::UnknownOverride { .. }
            | TrendgateError::OverrideInvalid { .. } => 2,
            TrendgateError::Database { .. } | TrendgateError::DatabaseQuery { .. } => 3,
            TrendgateError::SchemaMismatch { .. } => 4,
            TrendgateError::NoData { .. } => 5,
            TrendgateError::OutOfOrderBar { .. }
            | TrendgateError::BarGap { .. }
            | TrendgateError::Journal(_) => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_mismatch_message_names_both_sides() {
        let m = DirectionMismatch {
            position_id: 1,
            entry_bar: 5,
            exit_bar: 9,
            entry_direction: Direction::Long,
            exit_direction: Direction::Short,
        };
        assert_eq!(
            m.to_string(),
            "stop loss at bar 9 exits short but entry at bar 5 was long"
        );
    }

    #[test]
    fn journal_error_wraps_transparently() {
        let err: TrendgateError = JournalError::NoOpenPosition { bar_index: 3 }.into();
        assert_eq!(err.to_string(), "no open position to exit at bar 3");
    }

    #[test]
    fn schema_mismatch_message() {
        let err = TrendgateError::SchemaMismatch {
            bar_index: 7,
            expected: 11,
            found: 10,
        };
        assert_eq!(
            err.to_string(),
            "schema mismatch at bar 7: expected 11 columns, found 10"
        );
    }
}

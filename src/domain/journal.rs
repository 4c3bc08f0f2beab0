//! Trade journal: append-only ENTRY/EXIT events plus the open-position queue.
//!
//! An ENTRY pushes an open position; an EXIT pops the position it closes and
//! produces a `MatchedTrade`. With multi-position tracking off, at most one
//! position is open and an EXIT takes the most recent one. With it on, an EXIT
//! must name the position it closes.
//!
//! A stop-loss EXIT whose direction differs from its ENTRY is still recorded;
//! the pair is flagged as a `DirectionMismatch` for review.

use serde::Serialize;
use std::str::FromStr;

use crate::domain::error::{DirectionMismatch, JournalError};
pub use crate::domain::signal::Side as Direction;

pub const UNKNOWN_REASON: &str = "Unknown";
pub const STOP_LOSS: &str = "Stop loss";
pub const TARGET: &str = "Target";
pub const MANUAL: &str = "Manual";
pub const REVERSE: &str = "Reverse";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Entry,
    Exit,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Entry => "ENTRY",
            EventKind::Exit => "EXIT",
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ENTRY" => Ok(EventKind::Entry),
            "EXIT" => Ok(EventKind::Exit),
            other => Err(format!("unknown event kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "UPPERCASE")]
pub enum TradeEvent {
    Entry {
        bar_index: u64,
        position_id: u64,
        direction: Direction,
        price: f64,
        reason: String,
    },
    Exit {
        bar_index: u64,
        position_id: u64,
        direction: Direction,
        price: f64,
        order_name: String,
        pnl: f64,
        reason: String,
    },
}

impl TradeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TradeEvent::Entry { .. } => EventKind::Entry,
            TradeEvent::Exit { .. } => EventKind::Exit,
        }
    }

    pub fn bar_index(&self) -> u64 {
        match self {
            TradeEvent::Entry { bar_index, .. } | TradeEvent::Exit { bar_index, .. } => *bar_index,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            TradeEvent::Entry { direction, .. } | TradeEvent::Exit { direction, .. } => *direction,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            TradeEvent::Entry { reason, .. } | TradeEvent::Exit { reason, .. } => reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenPosition {
    pub position_id: u64,
    pub entry_bar: u64,
    pub direction: Direction,
    pub price: f64,
    pub reason: String,
}

impl OpenPosition {
    /// Per-unit profit of closing at `price`.
    pub fn pnl_at(&self, price: f64) -> f64 {
        self.direction.sign() * (price - self.price)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedTrade {
    pub position_id: u64,
    pub entry_bar: u64,
    pub exit_bar: u64,
    pub direction: Direction,
    pub exit_direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_reason: String,
    pub exit_reason: String,
    pub order_name: String,
    pub pnl: f64,
    pub direction_mismatch: bool,
}

/// Everything `record_exit` needs to close a position.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitOrder {
    pub bar_index: u64,
    pub direction: Direction,
    pub price: f64,
    pub order_name: String,
    pub pnl: f64,
    pub reason: Option<String>,
    pub position_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitOutcome {
    pub trade: MatchedTrade,
    pub mismatch: Option<DirectionMismatch>,
}

/// Filter over matched trades, shared by the in-memory journal and the
/// persistent trade store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeFilter {
    pub entry_reason: Option<String>,
    pub direction: Option<Direction>,
    pub mismatch_only: bool,
    pub limit: Option<usize>,
}

impl TradeFilter {
    pub fn matches(&self, trade: &MatchedTrade) -> bool {
        if let Some(reason) = &self.entry_reason {
            if &trade.entry_reason != reason {
                return false;
            }
        }
        if let Some(direction) = self.direction {
            if trade.direction != direction {
                return false;
            }
        }
        !self.mismatch_only || trade.direction_mismatch
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasonStats {
    pub entries: usize,
    pub unknown_entries: usize,
    pub unknown_rate: f64,
    pub mismatches: usize,
}

/// Events and trades not yet handed to persistent storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JournalBatch {
    pub events: Vec<TradeEvent>,
    pub trades: Vec<MatchedTrade>,
}

impl JournalBatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.trades.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct TradeJournal {
    multi_position: bool,
    events: Vec<TradeEvent>,
    open: Vec<OpenPosition>,
    trades: Vec<MatchedTrade>,
    mismatches: Vec<DirectionMismatch>,
    next_position_id: u64,
    flushed_events: usize,
    flushed_trades: usize,
}

fn reason_or_unknown(reason: Option<&str>) -> String {
    match reason {
        Some(r) if !r.trim().is_empty() => r.to_string(),
        _ => UNKNOWN_REASON.to_string(),
    }
}

impl TradeJournal {
    pub fn new(multi_position: bool) -> Self {
        Self {
            multi_position,
            events: Vec::new(),
            open: Vec::new(),
            trades: Vec::new(),
            mismatches: Vec::new(),
            next_position_id: 1,
            flushed_events: 0,
            flushed_trades: 0,
        }
    }

    pub fn multi_position(&self) -> bool {
        self.multi_position
    }

    pub fn events(&self) -> &[TradeEvent] {
        &self.events
    }

    pub fn trades(&self) -> &[MatchedTrade] {
        &self.trades
    }

    pub fn open_positions(&self) -> &[OpenPosition] {
        &self.open
    }

    pub fn mismatches(&self) -> &[DirectionMismatch] {
        &self.mismatches
    }

    fn check_order(&self, bar_index: u64) -> Result<(), JournalError> {
        match self.events.last() {
            Some(last) if bar_index < last.bar_index() => Err(JournalError::InvalidState {
                bar_index,
                reason: format!("event precedes last journaled bar {}", last.bar_index()),
            }),
            _ => Ok(()),
        }
    }

    /// Open a position. Returns its id.
    pub fn record_entry(
        &mut self,
        bar_index: u64,
        direction: Direction,
        price: f64,
        reason: Option<&str>,
    ) -> Result<u64, JournalError> {
        self.check_order(bar_index)?;
        if !self.multi_position {
            if let Some(open) = self.open.last() {
                return Err(JournalError::InvalidState {
                    bar_index,
                    reason: format!(
                        "position {} opened at bar {} is still open",
                        open.position_id, open.entry_bar
                    ),
                });
            }
        }

        let position_id = self.next_position_id;
        self.next_position_id += 1;
        let reason = reason_or_unknown(reason);

        self.open.push(OpenPosition {
            position_id,
            entry_bar: bar_index,
            direction,
            price,
            reason: reason.clone(),
        });
        self.events.push(TradeEvent::Entry {
            bar_index,
            position_id,
            direction,
            price,
            reason,
        });
        tracing::debug!(bar_index, position_id, %direction, price, "entry recorded");
        Ok(position_id)
    }

    /// Close a position. A direction mismatch on a stop loss is recorded in
    /// the outcome and on the journal, not returned as an error.
    pub fn record_exit(&mut self, order: ExitOrder) -> Result<ExitOutcome, JournalError> {
        self.check_order(order.bar_index)?;

        let slot = match (self.multi_position, order.position_id) {
            (false, None) => self.open.len().checked_sub(1),
            (_, Some(id)) => match self.open.iter().position(|p| p.position_id == id) {
                Some(slot) => Some(slot),
                None if self.open.is_empty() => None,
                None => {
                    return Err(JournalError::UnknownPosition {
                        bar_index: order.bar_index,
                        position_id: id,
                    });
                }
            },
            (true, None) => {
                if self.open.is_empty() {
                    None
                } else {
                    return Err(JournalError::InvalidState {
                        bar_index: order.bar_index,
                        reason: "multi-position exit must name a position id".to_string(),
                    });
                }
            }
        };
        let Some(slot) = slot else {
            return Err(JournalError::NoOpenPosition {
                bar_index: order.bar_index,
            });
        };
        let entry = self.open.remove(slot);

        let mismatch = (order.order_name == STOP_LOSS && order.direction != entry.direction)
            .then(|| DirectionMismatch {
                position_id: entry.position_id,
                entry_bar: entry.entry_bar,
                exit_bar: order.bar_index,
                entry_direction: entry.direction,
                exit_direction: order.direction,
            });
        if let Some(m) = &mismatch {
            tracing::warn!(position_id = m.position_id, "{m}");
            self.mismatches.push(m.clone());
        }

        let exit_reason = reason_or_unknown(order.reason.as_deref());
        self.events.push(TradeEvent::Exit {
            bar_index: order.bar_index,
            position_id: entry.position_id,
            direction: order.direction,
            price: order.price,
            order_name: order.order_name.clone(),
            pnl: order.pnl,
            reason: exit_reason.clone(),
        });

        let trade = MatchedTrade {
            position_id: entry.position_id,
            entry_bar: entry.entry_bar,
            exit_bar: order.bar_index,
            direction: entry.direction,
            exit_direction: order.direction,
            entry_price: entry.price,
            exit_price: order.price,
            entry_reason: entry.reason,
            exit_reason,
            order_name: order.order_name,
            pnl: order.pnl,
            direction_mismatch: mismatch.is_some(),
        };
        self.trades.push(trade.clone());
        tracing::debug!(
            bar_index = trade.exit_bar,
            position_id = trade.position_id,
            order = %trade.order_name,
            pnl = trade.pnl,
            "exit recorded"
        );
        Ok(ExitOutcome { trade, mismatch })
    }

    /// The most recent `limit` events, optionally of one kind, oldest first.
    pub fn recent_events(&self, limit: usize, kind: Option<EventKind>) -> Vec<TradeEvent> {
        let mut out: Vec<TradeEvent> = self
            .events
            .iter()
            .rev()
            .filter(|e| kind.is_none_or(|k| e.kind() == k))
            .take(limit)
            .cloned()
            .collect();
        out.reverse();
        out
    }

    pub fn query_trades(&self, filter: &TradeFilter) -> Vec<MatchedTrade> {
        let matching = self.trades.iter().filter(|t| filter.matches(t));
        match filter.limit {
            Some(limit) => {
                let all: Vec<&MatchedTrade> = matching.collect();
                let skip = all.len().saturating_sub(limit);
                all.into_iter().skip(skip).cloned().collect()
            }
            None => matching.cloned().collect(),
        }
    }

    pub fn reason_stats(&self) -> ReasonStats {
        let entries: Vec<&TradeEvent> = self
            .events
            .iter()
            .filter(|e| e.kind() == EventKind::Entry)
            .collect();
        let unknown_entries = entries
            .iter()
            .filter(|e| e.reason() == UNKNOWN_REASON)
            .count();
        let unknown_rate = if entries.is_empty() {
            0.0
        } else {
            unknown_entries as f64 / entries.len() as f64
        };
        ReasonStats {
            entries: entries.len(),
            unknown_entries,
            unknown_rate,
            mismatches: self.mismatches.len(),
        }
    }

    /// Hand out everything appended since the previous call.
    pub fn take_unflushed(&mut self) -> JournalBatch {
        let batch = JournalBatch {
            events: self.events[self.flushed_events..].to_vec(),
            trades: self.trades[self.flushed_trades..].to_vec(),
        };
        self.flushed_events = self.events.len();
        self.flushed_trades = self.trades.len();
        batch
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.multi_position);
    }
}

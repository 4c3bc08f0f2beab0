//! Built-in decision policy turning resolved signals into journal calls.
//!
//! Per bar, open positions are first checked against their stop-loss and
//! target levels using the bar's range, then against a reversing signal. An
//! eligible signal opens a position at the close when nothing on that side is
//! open.

use serde::Serialize;

use crate::domain::bar::Bar;
use crate::domain::blocker::BlockerResult;
use crate::domain::error::JournalError;
use crate::domain::journal::{
    Direction, ExitOrder, ExitOutcome, OpenPosition, TradeJournal, REVERSE, STOP_LOSS, TARGET,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraderConfig {
    pub enabled: bool,
    /// Percent adverse move that stops a position out. Zero disables.
    pub stop_loss_pct: f64,
    /// Percent favourable move that takes profit. Zero disables.
    pub take_profit_pct: f64,
    pub exit_on_reverse: bool,
}

impl Default for TraderConfig {
    fn default() -> Self {
        TraderConfig {
            enabled: true,
            stop_loss_pct: 2.0,
            take_profit_pct: 4.0,
            exit_on_reverse: true,
        }
    }
}

/// Price levels protecting an open position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Protection {
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

impl Protection {
    pub fn for_entry(direction: Direction, price: f64, config: &TraderConfig) -> Self {
        let sign = direction.sign();
        let stop_loss =
            (config.stop_loss_pct > 0.0).then(|| price * (1.0 - sign * config.stop_loss_pct / 100.0));
        let take_profit = (config.take_profit_pct > 0.0)
            .then(|| price * (1.0 + sign * config.take_profit_pct / 100.0));
        Protection {
            stop_loss,
            take_profit,
        }
    }

    pub fn stop_hit(&self, direction: Direction, bar: &Bar) -> Option<f64> {
        let level = self.stop_loss?;
        let hit = match direction {
            Direction::Long => bar.low <= level,
            Direction::Short => bar.high >= level,
        };
        hit.then_some(level)
    }

    pub fn target_hit(&self, direction: Direction, bar: &Bar) -> Option<f64> {
        let level = self.take_profit?;
        let hit = match direction {
            Direction::Long => bar.high >= level,
            Direction::Short => bar.low <= level,
        };
        hit.then_some(level)
    }
}

#[derive(Debug, Clone)]
pub struct SignalTrader {
    config: TraderConfig,
}

impl SignalTrader {
    pub fn new(config: TraderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TraderConfig {
        &self.config
    }

    /// Decide the exit, if any, for one open position on this bar. When a bar
    /// spans both levels the stop is assumed to fill first.
    fn exit_for(&self, position: &OpenPosition, bar: &Bar, result: &BlockerResult) -> Option<ExitOrder> {
        let protection = Protection::for_entry(position.direction, position.price, &self.config);
        let (price, order_name, reason) =
            if let Some(level) = protection.stop_hit(position.direction, bar) {
                (level, STOP_LOSS, format!("stop {:.4}", level))
            } else if let Some(level) = protection.target_hit(position.direction, bar) {
                (level, TARGET, format!("target {:.4}", level))
            } else if self.config.exit_on_reverse
                && result.signal.side() == Some(position.direction.opposite())
            {
                (bar.close, REVERSE, format!("signal {}", result.signal))
            } else {
                return None;
            };

        Some(ExitOrder {
            bar_index: bar.bar_index,
            direction: position.direction,
            price,
            order_name: order_name.to_string(),
            pnl: position.pnl_at(price),
            reason: Some(reason),
            position_id: Some(position.position_id),
        })
    }

    /// Apply the policy for one bar. Returns the exits it recorded.
    pub fn on_bar(
        &self,
        bar: &Bar,
        result: &BlockerResult,
        journal: &mut TradeJournal,
    ) -> Result<Vec<ExitOutcome>, JournalError> {
        if !self.config.enabled {
            return Ok(Vec::new());
        }

        let exits: Vec<ExitOrder> = journal
            .open_positions()
            .iter()
            .filter_map(|p| self.exit_for(p, bar, result))
            .collect();
        let mut outcomes = Vec::with_capacity(exits.len());
        for order in exits {
            outcomes.push(journal.record_exit(order)?);
        }

        if let Some(side) = result.signal.side() {
            let side_open = journal
                .open_positions()
                .iter()
                .any(|p| p.direction == side);
            let may_enter = if journal.multi_position() {
                !side_open
            } else {
                journal.open_positions().is_empty()
            };
            if may_enter {
                let reason = result.entry_reason();
                journal.record_entry(bar.bar_index, side, bar.close, reason.as_deref())?;
            }
        }
        Ok(outcomes)
    }
}

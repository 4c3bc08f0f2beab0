//! Trend segmentation.
//!
//! A state machine over resolved signals: `NoSegment` or `OpenSegment(side)`.
//! A side change closes the open segment and opens a new one with count 1; the
//! same side extends it. Flat and blocked bars follow the configured
//! `FlatPolicy`.
//!
//! Segment quality is judged after the fact. Each bar admitted to a segment
//! schedules one evaluation keyed by the segment id and due `horizon` bars
//! later; `observe` ticks the schedule before handling the bar. Evaluations
//! still pending when a segment closes are resolved at the closing
//! observation, and only then is the segment frozen.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::VecDeque;
use std::str::FromStr;

use crate::domain::bar::Bar;
use crate::domain::signal::{Side, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlatPolicy {
    /// Flat and blocked bars extend the open segment.
    Ignore,
    /// Flat and blocked bars close the open segment.
    Close,
}

impl FromStr for FlatPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ignore" => Ok(FlatPolicy::Ignore),
            "close" => Ok(FlatPolicy::Close),
            other => Err(format!("unknown flat policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Good,
    Bad,
}

pub trait QualityEvaluator: Send + Sync {
    /// Bars between a judged bar and its evaluation.
    fn horizon(&self) -> u64;

    /// Judge a bar of a `side` segment that closed at `reference`, given the
    /// close `observed` at evaluation time.
    fn judge(&self, side: Side, reference: f64, observed: f64) -> Quality;
}

/// Good when price moved in the segment's favour by more than `min_move_pct`.
#[derive(Debug, Clone)]
pub struct FavorableMove {
    pub horizon: u64,
    pub min_move_pct: f64,
}

impl Default for FavorableMove {
    fn default() -> Self {
        Self {
            horizon: 5,
            min_move_pct: 0.0,
        }
    }
}

impl QualityEvaluator for FavorableMove {
    fn horizon(&self) -> u64 {
        self.horizon
    }

    fn judge(&self, side: Side, reference: f64, observed: f64) -> Quality {
        if reference == 0.0 {
            return Quality::Bad;
        }
        let move_pct = side.sign() * (observed - reference) / reference * 100.0;
        if move_pct > self.min_move_pct {
            Quality::Good
        } else {
            Quality::Bad
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSegment {
    pub id: u64,
    pub side: Side,
    pub start_bar_index: u64,
    pub end_bar_index: Option<u64>,
    pub count: u64,
    pub good: u64,
    pub bad: u64,
    pub start_timestamp: NaiveDateTime,
    pub end_timestamp: Option<NaiveDateTime>,
    pub start_price: f64,
}

impl TrendSegment {
    pub fn is_open(&self) -> bool {
        self.end_bar_index.is_none()
    }
}

#[derive(Debug, Clone)]
struct PendingEvaluation {
    segment_id: u64,
    reference: f64,
    due: u64,
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    bar_index: u64,
    timestamp: NaiveDateTime,
}

pub struct TrendSegmenter {
    policy: FlatPolicy,
    evaluator: Box<dyn QualityEvaluator>,
    current: Option<TrendSegment>,
    closed: Vec<TrendSegment>,
    pending: VecDeque<PendingEvaluation>,
    next_id: u64,
    last: Option<Observation>,
    last_close: f64,
    good_bad_updates: u64,
    inputs_missing_count: u64,
}

impl TrendSegmenter {
    pub fn new(policy: FlatPolicy, evaluator: Box<dyn QualityEvaluator>) -> Self {
        Self {
            policy,
            evaluator,
            current: None,
            closed: Vec::new(),
            pending: VecDeque::new(),
            next_id: 1,
            last: None,
            last_close: 0.0,
            good_bad_updates: 0,
            inputs_missing_count: 0,
        }
    }

    pub fn policy(&self) -> FlatPolicy {
        self.policy
    }

    pub fn current(&self) -> Option<&TrendSegment> {
        self.current.as_ref()
    }

    pub fn closed(&self) -> &[TrendSegment] {
        &self.closed
    }

    /// The last `m` closed segments, oldest first.
    pub fn closed_tail(&self, m: usize) -> &[TrendSegment] {
        let skip = self.closed.len().saturating_sub(m);
        &self.closed[skip..]
    }

    pub fn good_bad_updates(&self) -> u64 {
        self.good_bad_updates
    }

    pub fn inputs_missing_count(&self) -> u64 {
        self.inputs_missing_count
    }

    pub fn pending_evaluations(&self) -> usize {
        self.pending.len()
    }

    /// Feed one bar's resolved signal. Returns the segment closed by this
    /// bar, if any.
    pub fn observe(&mut self, bar: &Bar, signal: Signal, inputs_missing: bool) -> Option<TrendSegment> {
        if inputs_missing {
            self.inputs_missing_count += 1;
        }
        self.tick(bar.bar_index, bar.close);

        let current_side = self.current.as_ref().map(|s| s.side);
        let mut closed = None;

        match (signal.side(), current_side) {
            (Some(side), None) => self.open(side, bar),
            (Some(side), Some(cur)) if side == cur => self.extend(),
            (Some(side), Some(_)) => {
                closed = self.close(bar.close);
                self.open(side, bar);
            }
            (None, Some(_)) => match self.policy {
                FlatPolicy::Ignore => self.extend(),
                FlatPolicy::Close => closed = self.close(bar.close),
            },
            (None, None) => {}
        }

        if let Some(seg) = &self.current {
            self.pending.push_back(PendingEvaluation {
                segment_id: seg.id,
                reference: bar.close,
                due: bar.bar_index + self.evaluator.horizon(),
            });
        }

        self.last = Some(Observation {
            bar_index: bar.bar_index,
            timestamp: bar.timestamp,
        });
        self.last_close = bar.close;
        closed
    }

    /// Close the open segment at the last observed bar.
    pub fn finish(&mut self) -> Option<TrendSegment> {
        let close = self.last_close;
        self.close(close)
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.closed.clear();
        self.pending.clear();
        self.next_id = 1;
        self.last = None;
        self.last_close = 0.0;
        self.good_bad_updates = 0;
        self.inputs_missing_count = 0;
    }

    fn tick(&mut self, bar_index: u64, close: f64) {
        while self.pending.front().is_some_and(|p| p.due <= bar_index) {
            if let Some(p) = self.pending.pop_front() {
                self.apply(&p, close);
            }
        }
    }

    fn apply(&mut self, eval: &PendingEvaluation, observed: f64) {
        let Some(seg) = self.current.as_mut().filter(|s| s.id == eval.segment_id) else {
            return;
        };
        match self.evaluator.judge(seg.side, eval.reference, observed) {
            Quality::Good => seg.good += 1,
            Quality::Bad => seg.bad += 1,
        }
        self.good_bad_updates += 1;
    }

    fn open(&mut self, side: Side, bar: &Bar) {
        self.current = Some(TrendSegment {
            id: self.next_id,
            side,
            start_bar_index: bar.bar_index,
            end_bar_index: None,
            count: 1,
            good: 0,
            bad: 0,
            start_timestamp: bar.timestamp,
            end_timestamp: None,
            start_price: bar.close,
        });
        self.next_id += 1;
    }

    fn extend(&mut self) {
        if let Some(seg) = self.current.as_mut() {
            seg.count += 1;
        }
    }

    fn close(&mut self, observed: f64) -> Option<TrendSegment> {
        let id = self.current.as_ref()?.id;
        let due: Vec<PendingEvaluation> = self
            .pending
            .iter()
            .filter(|p| p.segment_id == id)
            .cloned()
            .collect();
        self.pending.retain(|p| p.segment_id != id);
        for p in &due {
            self.apply(p, observed);
        }

        let mut seg = self.current.take()?;
        let last = self.last?;
        seg.end_bar_index = Some(last.bar_index);
        seg.end_timestamp = Some(last.timestamp);
        tracing::debug!(
            segment = seg.id,
            side = %seg.side,
            start = seg.start_bar_index,
            end = last.bar_index,
            good = seg.good,
            bad = seg.bad,
            "segment closed"
        );
        self.closed.push(seg.clone());
        Some(seg)
    }
}

//! ADX (Average Directional Index) over a bounded window.
//!
//! For each consecutive pair of bars:
//! - up = H[t] - H[t-1], down = L[t-1] - L[t]
//! - +DM = up if up > down and up > 0, else 0
//! - -DM = down if down > up and down > 0, else 0
//! - TR = true range against the previous close
//!
//! DX over n moves = 100 * |+DI - -DI| / (+DI + -DI), with DI = sum(DM) / sum(TR).
//! ADX is the plain mean of the last n DX values, so it needs 2n prior bars.
//! Any DX with an empty range or no directional movement makes ADX `Missing`.

use crate::domain::bar::Bar;
use crate::domain::indicator::{ADX, BarWindow, Indicator, IndicatorValue};

#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
}

impl Adx {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
        }
    }
}

struct Move {
    plus_dm: f64,
    minus_dm: f64,
    tr: f64,
}

fn directional_move(prev: &Bar, cur: &Bar) -> Move {
    let up = cur.high - prev.high;
    let down = prev.low - cur.low;
    Move {
        plus_dm: if up > down && up > 0.0 { up } else { 0.0 },
        minus_dm: if down > up && down > 0.0 { down } else { 0.0 },
        tr: cur.true_range(prev.close),
    }
}

fn dx(moves: &[Move]) -> Option<f64> {
    let tr: f64 = moves.iter().map(|m| m.tr).sum();
    if tr == 0.0 {
        return None;
    }
    let plus_di = moves.iter().map(|m| m.plus_dm).sum::<f64>() / tr;
    let minus_di = moves.iter().map(|m| m.minus_dm).sum::<f64>() / tr;
    let di_sum = plus_di + minus_di;
    if di_sum == 0.0 {
        return None;
    }
    Some(100.0 * (plus_di - minus_di).abs() / di_sum)
}

impl Indicator for Adx {
    fn name(&self) -> &'static str {
        ADX
    }

    fn lookback(&self) -> usize {
        2 * self.period
    }

    fn compute(&self, bar: &Bar, prior: &BarWindow) -> IndicatorValue {
        let Some(mut seq) = prior.tail(self.lookback()) else {
            return IndicatorValue::Missing;
        };
        seq.push(bar);

        let moves: Vec<Move> = seq
            .windows(2)
            .map(|pair| directional_move(pair[0], pair[1]))
            .collect();

        let n = self.period;
        let mut total = 0.0;
        for end in (moves.len() - n + 1)..=moves.len() {
            match dx(&moves[end - n..end]) {
                Some(v) => total += v,
                None => return IndicatorValue::Missing,
            }
        }
        IndicatorValue::from_f64(total / n as f64)
    }
}

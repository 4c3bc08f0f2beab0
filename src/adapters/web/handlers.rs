//! HTTP request handlers for the web adapter.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::bar::Bar;
use crate::domain::error::TrendgateError;
use crate::domain::engine::BarDiagnostics;
use crate::domain::journal::{Direction, EventKind, MatchedTrade, TradeEvent, TradeFilter};
use crate::domain::overrides::OverrideValue;
use crate::domain::query::{DiagnosticsQuery, EngineStatus, JournalQuality, OverridesView, TrendSnapshot};
use crate::domain::signal::Signal;

use super::{AppState, WebError};

const DEFAULT_LOG_LIMIT: usize = 50;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub stream: String,
    #[serde(flatten)]
    pub engine: EngineStatus,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        stream: state.stream.clone(),
        engine: state.handle.status(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsParams {
    pub limit: Option<usize>,
    pub kind: Option<String>,
}

pub async fn logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogsParams>,
) -> Result<Json<Vec<TradeEvent>>, WebError> {
    let kind = params
        .kind
        .as_deref()
        .map(str::parse::<EventKind>)
        .transpose()
        .map_err(WebError::bad_request)?;
    let limit = params.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    Ok(Json(state.handle.recent_events(limit, kind)))
}

#[derive(Debug, Default, Deserialize)]
pub struct TrendParams {
    pub segments: Option<usize>,
}

pub async fn trend(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrendParams>,
) -> Json<TrendSnapshot> {
    Json(state.handle.trend(params.segments))
}

#[derive(Debug, Default, Deserialize)]
pub struct DiagnosticsParams {
    pub last: Option<usize>,
    pub from: Option<u64>,
    pub to: Option<u64>,
}

pub async fn diagnostics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DiagnosticsParams>,
) -> Result<Json<Vec<BarDiagnostics>>, WebError> {
    if let (Some(from), Some(to)) = (params.from, params.to) {
        if from > to {
            return Err(WebError::bad_request("from must not exceed to"));
        }
    }
    Ok(Json(state.handle.diagnostics(DiagnosticsQuery {
        last: params.last,
        from: params.from,
        to: params.to,
    })))
}

pub async fn get_overrides(State(state): State<Arc<AppState>>) -> Json<OverridesView> {
    Json(state.handle.overrides())
}

#[derive(Debug, Serialize)]
pub struct PatchResponse {
    /// Configuration that will be active from the next bar.
    pub staged: BTreeMap<String, OverrideValue>,
    pub effective_after_bar: Option<u64>,
}

pub async fn patch_overrides(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<BTreeMap<String, OverrideValue>>,
) -> Result<Json<PatchResponse>, WebError> {
    if patch.is_empty() {
        return Err(WebError::bad_request("empty patch"));
    }
    let staged = state.handle.patch_overrides(&patch)?;
    Ok(Json(PatchResponse {
        staged,
        effective_after_bar: state.handle.status().last_bar_index,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct TradesParams {
    pub entry_reason: Option<String>,
    pub direction: Option<String>,
    #[serde(default)]
    pub mismatch_only: bool,
    pub limit: Option<usize>,
}

pub async fn trades(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TradesParams>,
) -> Result<Json<Vec<MatchedTrade>>, WebError> {
    let direction = params
        .direction
        .as_deref()
        .map(str::parse::<Direction>)
        .transpose()
        .map_err(WebError::bad_request)?;
    let filter = TradeFilter {
        entry_reason: params.entry_reason,
        direction,
        mismatch_only: params.mismatch_only,
        limit: params.limit,
    };

    let trades = match &state.trade_store {
        Some(store) => store.query_trades(Some(state.stream.as_str()), &filter)?,
        None => state.handle.trades(&filter),
    };
    Ok(Json(trades))
}

#[derive(Debug, Serialize)]
pub struct QualityResponse {
    #[serde(flatten)]
    pub journal: JournalQuality,
    /// Stored entry reasons with counts; absent without a trade store.
    pub entry_reasons: Option<Vec<(String, usize)>>,
}

pub async fn journal_quality(
    State(state): State<Arc<AppState>>,
) -> Result<Json<QualityResponse>, WebError> {
    let entry_reasons = match &state.trade_store {
        Some(store) => Some(store.entry_reason_counts(Some(state.stream.as_str()))?),
        None => None,
    };
    Ok(Json(QualityResponse {
        journal: state.handle.journal_quality(),
        entry_reasons,
    }))
}

#[derive(Debug, Serialize)]
pub struct IngestedBar {
    pub bar_index: u64,
    pub signal: Signal,
    pub blockers_long: Vec<&'static str>,
    pub blockers_short: Vec<&'static str>,
}

/// Ingest bars in order. Stops at the first rejected bar; bars before it
/// stay committed and their journal entries are flushed to the store.
pub async fn ingest_bars(
    State(state): State<Arc<AppState>>,
    Json(bars): Json<Vec<Bar>>,
) -> Result<Json<Vec<IngestedBar>>, WebError> {
    let mut out = Vec::with_capacity(bars.len());
    let mut failure: Option<TrendgateError> = None;
    for bar in &bars {
        match state.handle.ingest(bar) {
            Ok(outcome) => out.push(IngestedBar {
                bar_index: outcome.bar.bar_index,
                signal: outcome.result.signal,
                blockers_long: outcome.result.blockers_long,
                blockers_short: outcome.result.blockers_short,
            }),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    if let Some(store) = &state.trade_store {
        let batch = state.handle.take_journal_batch();
        if !batch.is_empty() {
            store.save_batch(&state.stream, &batch)?;
        }
    }

    match failure {
        Some(e) => Err(e.into()),
        None => Ok(Json(out)),
    }
}

pub async fn not_found() -> WebError {
    WebError::not_found("no such endpoint")
}

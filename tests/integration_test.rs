//! End-to-end engine tests: replay through the public API, export, persist
//! and query.

mod common;

use approx::assert_relative_eq;
use common::*;
use std::collections::BTreeMap;
use trendgate::adapters::csv_adapter::{audit_indicator_log, IndicatorLogWriter};
use trendgate::adapters::sqlite_adapter::SqliteAdapter;
use trendgate::domain::blocker::{Applies, BLOCKERS};
use trendgate::domain::engine::{EngineConfig, StreamEngine};
use trendgate::domain::error::TrendgateError;
use trendgate::domain::journal::{Direction, ExitOrder, TradeFilter, STOP_LOSS, UNKNOWN_REASON};
use trendgate::domain::overrides::{OverrideValue, ADX_MIN};
use trendgate::domain::query::{DiagnosticsQuery, EngineHandle};
use trendgate::domain::replay::{replay, StoreTarget};
use trendgate::domain::signal::{Side, Signal};
use trendgate::ports::report_port::IndicatorSink;
use trendgate::ports::trade_store::TradeStore;

fn handle(config: EngineConfig) -> EngineHandle {
    EngineHandle::new(StreamEngine::new(config).unwrap())
}

mod export {
    use super::*;

    #[test]
    fn indicator_log_rows_match_header_through_warm_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indicators.csv");
        let h = handle(EngineConfig::default());

        let mut writer = IndicatorLogWriter::create(&path, &h.schema()).unwrap();
        let summary = replay(
            &h,
            choppy_uptrend(60),
            Some(&mut writer as &mut dyn IndicatorSink),
            None,
        )
        .unwrap();
        assert_eq!(summary.bars, 60);

        let report = audit_indicator_log(&path).unwrap();
        assert!(report.is_aligned());
        assert_eq!(report.rows, 60);
        assert_eq!(report.header_width, 6 + h.schema().names.len());
        // warm-up rows carry explicit markers rather than short rows
        assert!(report.missing_cells > 0);
    }

    #[test]
    fn audit_flags_a_short_row() {
        let file = write_temp(
            "bar_index,timestamp,close,adx,rsi\n\
             1,2024-01-02 09:31:00,100,NA,NA\n\
             2,2024-01-02 09:32:00,101,NA\n\
             3,2024-01-02 09:33:00,102,25.0,55.0\n",
        );
        let report = audit_indicator_log(file.path()).unwrap();
        assert_eq!(report.rows, 3);
        assert_eq!(report.misaligned.len(), 1);
        assert_eq!(report.misaligned[0].bar_index, Some(2));
        assert_eq!(report.misaligned[0].width, 4);
        assert_eq!(report.missing_cells, 3);
    }
}

mod blocking {
    use super::*;

    #[test]
    fn missing_indicator_blocks_the_sides_it_guards() {
        let h = handle(EngineConfig::default());
        for bar in wave(80, 3.0, 17.0) {
            let out = h.ingest(&bar).unwrap();
            for blocker in BLOCKERS.iter() {
                if !out.indicators.get(blocker.indicator).is_missing() {
                    continue;
                }
                let long = out.result.blockers(Side::Long).contains(&blocker.name);
                let short = out.result.blockers(Side::Short).contains(&blocker.name);
                match blocker.applies {
                    Applies::Long => assert!(long, "{} at bar {}", blocker.name, bar.bar_index),
                    Applies::Short => assert!(short, "{} at bar {}", blocker.name, bar.bar_index),
                    Applies::Both => assert!(long && short, "{} at bar {}", blocker.name, bar.bar_index),
                }
            }
        }
    }

    #[test]
    fn first_bar_is_blocked() {
        let h = handle(EngineConfig::default());
        let out = h.ingest(&bar(1, 100.0)).unwrap();
        assert_eq!(out.result.signal, Signal::Blocked);
        assert!(out.indicators.has_missing());
        assert_eq!(h.trend(None).inputs_missing_count, 1);
    }
}

mod segments {
    use super::*;

    #[test]
    fn ten_long_then_short_closes_first_segment() {
        let mut signals = vec![Signal::Long; 10];
        signals.push(Signal::Short);
        let h = EngineHandle::new(scripted_engine(quiet_config(), signals));
        for b in bars(&[100.0; 11]) {
            h.ingest(&b).unwrap();
        }

        let trend = h.trend(None);
        assert_eq!(trend.segments.len(), 1);
        let first = &trend.segments[0];
        assert_eq!(first.side, Side::Long);
        assert_eq!(first.start_bar_index, 1);
        assert_eq!(first.end_bar_index, Some(10));
        assert_eq!(first.count, 10);

        let current = trend.current.unwrap();
        assert_eq!(current.side, Side::Short);
        assert_eq!(current.start_bar_index, 11);
        assert_eq!(current.count, 1);
        assert!(current.is_open());
    }

    #[test]
    fn finish_closes_the_open_segment() {
        let h = EngineHandle::new(scripted_engine(quiet_config(), vec![Signal::Short; 4]));
        for b in bars(&[100.0, 99.0, 98.0, 97.0]) {
            h.ingest(&b).unwrap();
        }
        let closed = h.finish().unwrap();
        assert_eq!(closed.end_bar_index, Some(4));
        assert_eq!(closed.count, 4);
        assert!(h.trend(None).current.is_none());
    }

    #[test]
    fn trend_limits_closed_segments() {
        let signals: Vec<Signal> = (0..9)
            .map(|i| if (i / 3) % 2 == 0 { Signal::Long } else { Signal::Short })
            .collect();
        let h = EngineHandle::new(scripted_engine(quiet_config(), signals));
        for b in bars(&[100.0; 9]) {
            h.ingest(&b).unwrap();
        }
        let trend = h.trend(Some(1));
        assert_eq!(trend.segments.len(), 1);
        assert_eq!(trend.segments[0].start_bar_index, 4);
        assert_eq!(trend.current.unwrap().start_bar_index, 7);
    }
}

mod journal {
    use super::*;

    fn stop_exit(bar_index: u64, direction: Direction, price: f64, pnl: f64) -> ExitOrder {
        ExitOrder {
            bar_index,
            direction,
            price,
            order_name: STOP_LOSS.to_string(),
            pnl,
            reason: None,
            position_id: None,
        }
    }

    #[test]
    fn mismatched_stop_loss_is_recorded_and_persisted() {
        let h = handle(quiet_config());
        h.record_entry(5, Direction::Long, 100.0, Some("breakout"))
            .unwrap();
        let out = h
            .record_exit(stop_exit(9, Direction::Short, 98.0, -2.0))
            .unwrap();
        let mismatch = out.mismatch.unwrap();
        assert_eq!(mismatch.entry_bar, 5);
        assert_eq!(mismatch.exit_bar, 9);

        let store = SqliteAdapter::in_memory().unwrap();
        store.initialize_schema().unwrap();
        store.save_batch("es", &h.take_journal_batch()).unwrap();

        let flagged = store
            .query_trades(
                Some("es"),
                &TradeFilter {
                    mismatch_only: true,
                    ..TradeFilter::default()
                },
            )
            .unwrap();
        assert_eq!(flagged.len(), 1);
        assert!(flagged[0].direction_mismatch);
        assert_eq!(flagged[0].entry_reason, "breakout");
        assert_relative_eq!(flagged[0].pnl, -2.0);
        assert_eq!(store.fetch_events("es").unwrap().len(), 2);
        assert_eq!(h.journal_quality().mismatches.len(), 1);
    }

    #[test]
    fn every_stop_loss_matches_or_is_flagged() {
        let h = handle(EngineConfig {
            multi_position: true,
            ..EngineConfig::default()
        });
        replay(&h, wave(300, 4.0, 23.0), None, None).unwrap();
        let id = h.record_entry(400, Direction::Short, 100.0, None).unwrap();
        h.record_exit(ExitOrder {
            position_id: Some(id),
            ..stop_exit(401, Direction::Long, 101.0, -1.0)
        })
        .unwrap();

        let trades = h.trades(&TradeFilter::default());
        assert!(!trades.is_empty());
        for t in trades.iter().filter(|t| t.order_name == STOP_LOSS) {
            assert!(t.direction == t.exit_direction || t.direction_mismatch);
        }
        assert_eq!(h.journal_quality().stats.mismatches, 1);
    }

    #[test]
    fn missing_entry_reason_is_unknown() {
        let h = handle(quiet_config());
        h.record_entry(1, Direction::Long, 100.0, None).unwrap();
        let quality = h.journal_quality();
        assert_eq!(quality.stats.entries, 1);
        assert_eq!(quality.stats.unknown_entries, 1);
        assert_relative_eq!(quality.stats.unknown_rate, 1.0);
        let events = h.recent_events(10, None);
        assert_eq!(events[0].reason(), UNKNOWN_REASON);
    }

    #[test]
    fn exit_without_open_position_is_rejected() {
        let h = handle(quiet_config());
        let err = h
            .record_exit(stop_exit(3, Direction::Long, 99.0, -1.0))
            .unwrap_err();
        assert!(matches!(err, TrendgateError::Journal(_)));
        assert!(h.recent_events(10, None).is_empty());
    }
}

mod replaying {
    use super::*;

    #[test]
    fn replay_from_fresh_state_is_deterministic() {
        let series = wave(200, 3.0, 19.0);
        let a = handle(EngineConfig::default());
        let b = handle(EngineConfig::default());
        replay(&a, series.clone(), None, None).unwrap();
        replay(&b, series, None, None).unwrap();

        assert_eq!(a.trend(None), b.trend(None));
        assert_eq!(a.recent_events(usize::MAX, None), b.recent_events(usize::MAX, None));
        assert_eq!(
            a.trades(&TradeFilter::default()),
            b.trades(&TradeFilter::default())
        );
    }

    #[test]
    fn restart_then_replay_matches_fresh_run() {
        let series = wave(120, 3.0, 19.0);
        let fresh = handle(EngineConfig::default());
        replay(&fresh, series.clone(), None, None).unwrap();

        let reused = handle(EngineConfig::default());
        replay(&reused, choppy_uptrend(40), None, None).unwrap();
        reused.restart();
        replay(&reused, series, None, None).unwrap();

        assert_eq!(fresh.trend(None), reused.trend(None));
        assert_eq!(
            fresh.recent_events(usize::MAX, None),
            reused.recent_events(usize::MAX, None)
        );
    }

    #[test]
    fn out_of_order_bars_are_skipped_and_counted() {
        let mut series = bars(&[100.0, 101.0, 102.0, 103.0]);
        let repeat = series[1].clone();
        series.insert(2, repeat);
        let h = handle(EngineConfig::default());
        let summary = replay(&h, series, None, None).unwrap();
        assert_eq!(summary.bars, 4);
        assert_eq!(summary.rejected, 1);
        assert_eq!(h.status().last_bar_index, Some(4));
    }

    #[test]
    fn gapped_bars_never_stretch_a_segment() {
        let series = bars(&[100.0; 5]);
        let gapped = vec![
            series[0].clone(),
            series[1].clone(),
            series[4].clone(),
            series[2].clone(),
        ];
        let h = EngineHandle::new(scripted_engine(quiet_config(), vec![Signal::Long; 5]));
        let summary = replay(&h, gapped, None, None).unwrap();
        assert_eq!(summary.bars, 3);
        assert_eq!(summary.rejected, 1);

        let trend = h.trend(None);
        let seg = &trend.segments[0];
        assert_eq!(seg.start_bar_index, 1);
        assert_eq!(seg.end_bar_index, Some(3));
        assert_eq!(seg.end_bar_index.unwrap() - seg.start_bar_index + 1, seg.count);
    }

    #[test]
    fn replay_flushes_journal_to_store_in_batches() {
        let store = SqliteAdapter::in_memory().unwrap();
        store.initialize_schema().unwrap();
        let h = handle(EngineConfig::default());
        let summary = replay(
            &h,
            wave(300, 4.0, 23.0),
            None,
            Some(StoreTarget {
                store: &store,
                stream: "wave",
                flush_every: 25,
            }),
        )
        .unwrap();

        let stored = store
            .query_trades(Some("wave"), &TradeFilter::default())
            .unwrap();
        assert_eq!(stored.len(), summary.trades);
        assert_eq!(stored, h.trades(&TradeFilter::default()));
        assert!(summary.flushes >= 1);
    }
}

mod overrides {
    use super::*;

    #[test]
    fn mid_stream_change_applies_from_next_bar_only() {
        let series = choppy_uptrend(60);
        let h = handle(quiet_config());
        for b in &series[..30] {
            h.ingest(b).unwrap();
        }
        let before_trend = h.trend(None);
        let before_diag = h.diagnostics(DiagnosticsQuery::default());

        let mut patch = BTreeMap::new();
        patch.insert("enabled.adx_low".to_string(), OverrideValue::Flag(true));
        patch.insert(ADX_MIN.to_string(), OverrideValue::Number(100.0));
        h.patch_overrides(&patch).unwrap();

        // staged, not yet active
        assert!(h.overrides().pending.is_some());
        assert_eq!(
            h.overrides().active.get(ADX_MIN),
            Some(&OverrideValue::Number(20.0))
        );

        for b in &series[30..] {
            h.ingest(b).unwrap();
        }

        let after_diag = h.diagnostics(DiagnosticsQuery::default());
        assert_eq!(&after_diag[..30], &before_diag[..]);
        for d in &after_diag[30..] {
            assert!(d.blockers_long.contains(&"adx_low"), "bar {}", d.bar_index);
            assert_eq!(d.signal, Signal::Blocked);
        }
        for d in &before_diag {
            assert!(!d.blockers_long.contains(&"adx_low"));
        }

        let after_trend = h.trend(None);
        assert_eq!(
            &after_trend.segments[..before_trend.segments.len()],
            &before_trend.segments[..]
        );
        assert!(h.overrides().pending.is_none());
    }

    #[test]
    fn rejected_patch_keeps_previous_set() {
        let h = handle(EngineConfig::default());
        let before = h.overrides();

        let mut patch = BTreeMap::new();
        patch.insert("rsi_oversold".to_string(), OverrideValue::Number(95.0));
        let err = h.patch_overrides(&patch).unwrap_err();
        assert!(matches!(err, TrendgateError::OverrideInvalid { .. }));

        patch.clear();
        patch.insert("no_such_key".to_string(), OverrideValue::Number(1.0));
        let err = h.patch_overrides(&patch).unwrap_err();
        assert!(matches!(err, TrendgateError::UnknownOverride { .. }));

        assert_eq!(h.overrides(), before);
        h.ingest(&bar(1, 100.0)).unwrap();
    }
}

mod concurrency {
    use super::*;
    use std::thread;

    #[test]
    fn readers_see_consistent_state_while_ingesting() {
        let h = handle(EngineConfig::default());
        let writer = h.clone();
        let series = wave(400, 3.0, 21.0);

        let feed = thread::spawn(move || {
            for b in &series {
                writer.ingest(b).unwrap();
            }
        });

        let mut seen = 0;
        while seen < 400 {
            let status = h.status();
            let diag = h.diagnostics(DiagnosticsQuery {
                last: Some(5),
                ..DiagnosticsQuery::default()
            });
            if let (Some(last), Some(d)) = (status.last_bar_index, diag.last()) {
                assert!(d.bar_index <= last);
            }
            for seg in h.trend(None).segments {
                assert_eq!(seg.end_bar_index.unwrap() - seg.start_bar_index + 1, seg.count);
            }
            seen = status.bars_processed as usize;
            thread::yield_now();
        }
        feed.join().unwrap();
        assert_eq!(h.status().bars_processed, 400);
    }
}

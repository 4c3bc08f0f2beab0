//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::{audit_indicator_log, read_bars, CsvReportAdapter, IndicatorLogWriter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::bar::Bar;
use crate::domain::config_validation::{overrides_from_config, validate_engine_config};
use crate::domain::engine::{EngineConfig, StreamEngine};
use crate::domain::error::TrendgateError;
use crate::domain::indicator::IndicatorPeriods;
use crate::domain::journal::{Direction, TradeFilter, UNKNOWN_REASON};
use crate::domain::query::EngineHandle;
use crate::domain::replay::{replay, ReplaySummary, StoreTarget};
use crate::domain::segment::FlatPolicy;
use crate::domain::trader::TraderConfig;
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::{IndicatorSink, ReportPort};

#[derive(Parser, Debug)]
#[command(name = "trendgate", about = "Streaming indicator, trend and trade-journal engine")]
pub struct Cli {
    /// Log per-bar detail
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a bar stream through the engine
    Replay {
        #[arg(short, long)]
        config: PathBuf,
        /// CSV bar file; without it bars are read from SQLite
        #[arg(short, long)]
        bars: Option<PathBuf>,
        /// Stream name; defaults to the bar file stem
        #[arg(short, long)]
        stream: Option<String>,
        /// Write the per-bar indicator log here
        #[arg(long)]
        indicators: Option<PathBuf>,
        /// Write the trade journal here
        #[arg(long)]
        journal: Option<PathBuf>,
        /// Do not persist trades to SQLite
        #[arg(long)]
        no_store: bool,
    },
    /// Check an exported indicator log for misaligned rows
    Audit { file: PathBuf },
    /// Query persisted trades
    Trades {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        stream: Option<String>,
        #[arg(long)]
        entry_reason: Option<String>,
        /// Only trades whose entry reason is Unknown
        #[arg(long)]
        unknown: bool,
        #[arg(long)]
        mismatch_only: bool,
        #[arg(long)]
        direction: Option<Direction>,
        #[arg(long)]
        limit: Option<usize>,
        /// Print entry reason counts instead of trades
        #[arg(long)]
        reasons: bool,
    },
    /// Load a CSV bar file into SQLite
    Import {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        bars: PathBuf,
        #[arg(short, long)]
        stream: Option<String>,
    },
    /// List bar streams stored in SQLite with their index ranges
    Streams {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate an engine configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Start the HTTP query server
    Serve {
        #[arg(short, long)]
        config: PathBuf,
        /// Replay this CSV bar file in the background while serving
        #[arg(short, long)]
        bars: Option<PathBuf>,
        #[arg(short, long)]
        stream: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Replay {
            config,
            bars,
            stream,
            indicators,
            journal,
            no_store,
        } => run_replay(
            &config,
            bars.as_deref(),
            stream.as_deref(),
            indicators.as_deref(),
            journal.as_deref(),
            no_store,
        ),
        Command::Audit { file } => run_audit(&file),
        Command::Trades {
            config,
            stream,
            entry_reason,
            unknown,
            mismatch_only,
            direction,
            limit,
            reasons,
        } => {
            let filter = TradeFilter {
                entry_reason: if unknown {
                    Some(UNKNOWN_REASON.to_string())
                } else {
                    entry_reason
                },
                direction,
                mismatch_only,
                limit,
            };
            run_trades(&config, stream.as_deref(), &filter, reasons)
        }
        Command::Import {
            config,
            bars,
            stream,
        } => run_import(&config, &bars, stream.as_deref()),
        Command::Streams { config } => run_streams(&config),
        Command::Validate { config } => run_validate(&config),
        Command::Serve {
            config,
            bars,
            stream,
        } => run_serve(&config, bars.as_deref(), stream.as_deref()),
    }
}

fn fail(err: &TrendgateError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(err)
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

/// Validate the config and build the engine settings from it.
pub fn build_engine_config(config: &dyn ConfigPort) -> Result<EngineConfig, TrendgateError> {
    validate_engine_config(config)?;
    let defaults = EngineConfig::default();
    let periods = IndicatorPeriods::default();
    let trader = TraderConfig::default();

    let flat_policy = match config.get_string("engine", "flat_policy") {
        Some(raw) => raw
            .parse::<FlatPolicy>()
            .map_err(|reason| TrendgateError::ConfigInvalid {
                section: "engine".into(),
                key: "flat_policy".into(),
                reason,
            })?,
        None => defaults.flat_policy,
    };
    let period = |key: &str, default: usize| config.get_int("indicators", key, default as i64) as usize;

    Ok(EngineConfig {
        multi_position: config.get_bool("engine", "multi_position", defaults.multi_position),
        flat_policy,
        history_capacity: config.get_int("engine", "history_capacity", defaults.history_capacity as i64)
            as usize,
        flush_every: config.get_int("engine", "flush_every", defaults.flush_every as i64) as usize,
        periods: IndicatorPeriods {
            curvature: period("curvature_period", periods.curvature),
            momentum: period("momentum_period", periods.momentum),
            grad: period("grad_period", periods.grad),
            adx: period("adx_period", periods.adx),
            rsi: period("rsi_period", periods.rsi),
        },
        overrides: overrides_from_config(config)?,
        quality_horizon: config.get_int("quality", "horizon", defaults.quality_horizon as i64) as u64,
        quality_min_move_pct: config.get_double("quality", "min_move_pct", defaults.quality_min_move_pct),
        trader: TraderConfig {
            enabled: config.get_bool("trader", "enabled", trader.enabled),
            stop_loss_pct: config.get_double("trader", "stop_loss_pct", trader.stop_loss_pct),
            take_profit_pct: config.get_double("trader", "take_profit_pct", trader.take_profit_pct),
            exit_on_reverse: config.get_bool("trader", "exit_on_reverse", trader.exit_on_reverse),
        },
    })
}

/// Stream name from `--stream` or the bar file stem.
fn stream_name(stream: Option<&str>, bars: Option<&Path>) -> String {
    stream
        .map(str::to_string)
        .or_else(|| {
            bars.and_then(|p| p.file_stem())
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "default".to_string())
}

#[cfg(feature = "sqlite")]
fn open_store(config: &dyn ConfigPort) -> Result<crate::adapters::sqlite_adapter::SqliteAdapter, TrendgateError> {
    let store = crate::adapters::sqlite_adapter::SqliteAdapter::from_config(config)?;
    store.initialize_schema()?;
    Ok(store)
}

fn load_bars(config: &dyn ConfigPort, bars: Option<&Path>, stream: &str) -> Result<Vec<Bar>, TrendgateError> {
    let loaded = match bars {
        Some(path) => read_bars(path)?,
        None => {
            #[cfg(feature = "sqlite")]
            {
                use crate::ports::data_port::DataPort;
                open_store(config)?.fetch_bars(stream)?
            }
            #[cfg(not(feature = "sqlite"))]
            {
                let _ = config;
                return Err(TrendgateError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                });
            }
        }
    };
    if loaded.is_empty() {
        return Err(TrendgateError::NoData {
            stream: stream.to_string(),
        });
    }
    Ok(loaded)
}

fn print_summary(stream: &str, summary: &ReplaySummary, handle: &EngineHandle) {
    let trend = handle.trend(None);
    let quality = handle.journal_quality();
    eprintln!("\n=== Replay: {stream} ===");
    eprintln!("Bars processed:   {}", summary.bars);
    eprintln!("Bars rejected:    {}", summary.rejected);
    eprintln!("Segments:         {}", summary.segments);
    eprintln!("Quality updates:  {}", trend.good_bad_updates);
    eprintln!("Inputs missing:   {}", trend.inputs_missing_count);
    eprintln!("Trades:           {}", summary.trades);
    eprintln!(
        "Unknown reasons:  {} of {} ({:.1}%)",
        quality.stats.unknown_entries,
        quality.stats.entries,
        quality.stats.unknown_rate * 100.0
    );
    eprintln!("Mismatches:       {}", summary.mismatches);
    for m in &quality.mismatches {
        eprintln!("  position {}: {}", m.position_id, m);
    }
}

fn run_replay(
    config_path: &Path,
    bars: Option<&Path>,
    stream: Option<&str>,
    indicators: Option<&Path>,
    journal: Option<&Path>,
    no_store: bool,
) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let engine_config = match build_engine_config(&config) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let flush_every = engine_config.flush_every;
    let stream = stream_name(stream, bars);

    let series = match load_bars(&config, bars, &stream) {
        Ok(b) => b,
        Err(e) => return fail(&e),
    };
    let engine = match StreamEngine::new(engine_config) {
        Ok(e) => e,
        Err(e) => return fail(&e),
    };
    let handle = EngineHandle::new(engine);

    let mut writer = match indicators {
        Some(path) => match IndicatorLogWriter::create(path, &handle.schema()) {
            Ok(w) => Some(w),
            Err(e) => return fail(&e),
        },
        None => None,
    };
    let sink = writer.as_mut().map(|w| w as &mut dyn IndicatorSink);

    eprintln!("Replaying {} bars for stream {stream}", series.len());

    #[cfg(feature = "sqlite")]
    let result = {
        use crate::ports::trade_store::TradeStore;

        let store = if no_store || config.get_string("sqlite", "path").is_none() {
            None
        } else {
            match open_store(&config).and_then(|s| s.clear_stream(&stream).map(|_| s)) {
                Ok(s) => Some(s),
                Err(e) => return fail(&e),
            }
        };
        let target = store.as_ref().map(|s| StoreTarget {
            store: s,
            stream: &stream,
            flush_every,
        });
        replay(&handle, series, sink, target)
    };
    #[cfg(not(feature = "sqlite"))]
    let result = {
        let _ = (no_store, flush_every);
        replay(&handle, series, sink, None::<StoreTarget<'_>>)
    };

    let summary = match result {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    if let Some(path) = journal {
        let events = handle.recent_events(usize::MAX, None);
        if let Err(e) = CsvReportAdapter.write_journal(&events, path) {
            return fail(&e);
        }
        eprintln!("Journal written to: {}", path.display());
    }
    if let Some(path) = indicators {
        eprintln!("Indicator log written to: {}", path.display());
    }

    print_summary(&stream, &summary, &handle);
    ExitCode::SUCCESS
}

fn run_audit(file: &Path) -> ExitCode {
    let report = match audit_indicator_log(file) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    eprintln!("Header width:  {}", report.header_width);
    eprintln!("Rows:          {}", report.rows);
    eprintln!("Missing cells: {}", report.missing_cells);

    if report.is_aligned() {
        eprintln!("All rows match the header.");
        return ExitCode::SUCCESS;
    }

    eprintln!("Misaligned rows: {}", report.misaligned.len());
    for row in &report.misaligned {
        let bar = row
            .bar_index
            .map(|b| b.to_string())
            .unwrap_or_else(|| "?".to_string());
        eprintln!(
            "  line {} (bar {}): {} columns, expected {}",
            row.line, bar, row.width, report.header_width
        );
    }
    match report.misaligned.first() {
        Some(first) => ExitCode::from(&TrendgateError::SchemaMismatch {
            bar_index: first.bar_index.unwrap_or(0),
            expected: report.header_width,
            found: first.width,
        }),
        None => ExitCode::SUCCESS,
    }
}

fn run_trades(config_path: &Path, stream: Option<&str>, filter: &TradeFilter, reasons: bool) -> ExitCode {
    #[cfg(feature = "sqlite")]
    {
        use crate::ports::trade_store::TradeStore;

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(code) => return code,
        };
        let store = match open_store(&config) {
            Ok(s) => s,
            Err(e) => return fail(&e),
        };

        if reasons {
            let counts = match store.entry_reason_counts(stream) {
                Ok(c) => c,
                Err(e) => return fail(&e),
            };
            let total: usize = counts.iter().map(|(_, n)| n).sum();
            for (reason, n) in &counts {
                println!("{reason}\t{n}");
            }
            let unknown = counts
                .iter()
                .find(|(r, _)| r == UNKNOWN_REASON)
                .map(|(_, n)| *n)
                .unwrap_or(0);
            if total > 0 {
                eprintln!(
                    "Unknown entry reasons: {unknown} of {total} ({:.1}%)",
                    unknown as f64 / total as f64 * 100.0
                );
            }
            return ExitCode::SUCCESS;
        }

        let trades = match store.query_trades(stream, filter) {
            Ok(t) => t,
            Err(e) => return fail(&e),
        };
        let mut writer = csv::Writer::from_writer(std::io::stdout());
        for trade in &trades {
            if let Err(e) = writer.serialize(trade) {
                return fail(&TrendgateError::Export {
                    reason: e.to_string(),
                });
            }
        }
        if let Err(e) = writer.flush() {
            return fail(&TrendgateError::Io(e));
        }
        eprintln!("{} trades", trades.len());
        ExitCode::SUCCESS
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (config_path, stream, filter, reasons);
        eprintln!("error: sqlite feature is required for trades");
        ExitCode::from(1)
    }
}

fn run_import(config_path: &Path, bars: &Path, stream: Option<&str>) -> ExitCode {
    #[cfg(feature = "sqlite")]
    {
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(code) => return code,
        };
        let stream = stream_name(stream, Some(bars));
        let series = match read_bars(bars) {
            Ok(b) => b,
            Err(e) => return fail(&e),
        };
        let result = open_store(&config).and_then(|s| s.insert_bars(&stream, &series));
        if let Err(e) = result {
            return fail(&e);
        }
        eprintln!("Imported {} bars into stream {stream}", series.len());
        ExitCode::SUCCESS
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (config_path, bars, stream);
        eprintln!("error: sqlite feature is required for import");
        ExitCode::from(1)
    }
}

fn run_streams(config_path: &Path) -> ExitCode {
    #[cfg(feature = "sqlite")]
    {
        use crate::ports::data_port::DataPort;

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(code) => return code,
        };
        let store = match open_store(&config) {
            Ok(s) => s,
            Err(e) => return fail(&e),
        };
        let streams = match store.list_streams() {
            Ok(s) => s,
            Err(e) => return fail(&e),
        };
        if streams.is_empty() {
            eprintln!("No streams stored");
            return ExitCode::SUCCESS;
        }
        println!("stream,first_bar,last_bar,bars");
        for stream in streams {
            match store.get_data_range(&stream) {
                Ok(Some((first, last, count))) => println!("{stream},{first},{last},{count}"),
                Ok(None) => {}
                Err(e) => return fail(&e),
            }
        }
        ExitCode::SUCCESS
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = config_path;
        eprintln!("error: sqlite feature is required for streams");
        ExitCode::from(1)
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let engine = match build_engine_config(&config) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    eprintln!("\nEngine:");
    eprintln!("  Multi-position:   {}", engine.multi_position);
    eprintln!("  Flat policy:      {:?}", engine.flat_policy);
    eprintln!("  History:          {} bars", engine.history_capacity);
    eprintln!("  Flush every:      {} bars", engine.flush_every);
    eprintln!("\nIndicators: {:?}", engine.periods);
    eprintln!("\nOverrides:");
    for (key, value) in engine.overrides.entries() {
        eprintln!("  {key} = {value:?}");
    }
    eprintln!("\nQuality: horizon {} bars, min move {}%", engine.quality_horizon, engine.quality_min_move_pct);
    eprintln!("Trader:  {:?}", engine.trader);

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_serve(config_path: &Path, bars: Option<&Path>, stream: Option<&str>) -> ExitCode {
    #[cfg(feature = "web")]
    {
        use crate::adapters::web::{build_router, AppState};
        use crate::ports::trade_store::TradeStore;
        use std::net::SocketAddr;
        use std::sync::Arc;

        eprintln!("Loading config from {}", config_path.display());
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(code) => return code,
        };
        let engine_config = match build_engine_config(&config) {
            Ok(c) => c,
            Err(e) => return fail(&e),
        };
        let flush_every = engine_config.flush_every;
        let handle = match StreamEngine::new(engine_config) {
            Ok(e) => EngineHandle::new(e),
            Err(e) => return fail(&e),
        };
        let stream = stream_name(stream, bars);

        let trade_store: Option<Arc<dyn TradeStore>> = if config.get_string("sqlite", "path").is_some() {
            match open_store(&config) {
                Ok(s) => Some(Arc::new(s)),
                Err(e) => return fail(&e),
            }
        } else {
            None
        };

        let listen = config
            .get_string("web", "listen")
            .unwrap_or_else(|| "127.0.0.1:3000".to_string());
        let addr: SocketAddr = match listen.parse() {
            Ok(a) => a,
            Err(e) => {
                return fail(&TrendgateError::ConfigInvalid {
                    section: "web".into(),
                    key: "listen".into(),
                    reason: format!("{e}"),
                });
            }
        };

        if let Some(path) = bars {
            let series = match read_bars(path) {
                Ok(b) => b,
                Err(e) => return fail(&e),
            };
            let feed = handle.clone();
            let store = trade_store.clone();
            let feed_stream = stream.clone();
            std::thread::spawn(move || {
                let target = store.as_deref().map(|s| StoreTarget {
                    store: s,
                    stream: &feed_stream,
                    flush_every,
                });
                if let Err(e) = replay(&feed, series, None, target) {
                    tracing::warn!(error = %e, "background replay stopped");
                }
            });
        }

        eprintln!("Starting web server on {}", addr);

        let router = build_router(AppState {
            handle,
            trade_store,
            stream,
        });

        let runtime = match tokio::runtime::Runtime::new() {
            Ok(r) => r,
            Err(e) => return fail(&TrendgateError::Io(e)),
        };
        let served = runtime.block_on(async {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router).await
        });
        match served {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => fail(&TrendgateError::Io(e)),
        }
    }

    #[cfg(not(feature = "web"))]
    {
        let _ = (config_path, bars, stream);
        eprintln!("error: web feature is required for serve");
        ExitCode::from(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_from_ini() {
        let config = FileConfigAdapter::from_string(
            "[engine]\nmulti_position = true\nflat_policy = close\nhistory_capacity = 10\n\
             [indicators]\nadx_period = 7\n[overrides]\nadx_min = 25\n[trader]\nenabled = false\n",
        )
        .unwrap();
        let engine = build_engine_config(&config).unwrap();
        assert!(engine.multi_position);
        assert_eq!(engine.flat_policy, FlatPolicy::Close);
        assert_eq!(engine.history_capacity, 10);
        assert_eq!(engine.periods.adx, 7);
        assert_eq!(engine.periods.rsi, 14);
        assert_eq!(engine.overrides.adx_min, 25.0);
        assert!(!engine.trader.enabled);
    }

    #[test]
    fn invalid_config_is_rejected_before_building() {
        let config = FileConfigAdapter::from_string("[quality]\nhorizon = 0\n").unwrap();
        assert!(matches!(
            build_engine_config(&config),
            Err(TrendgateError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn stream_name_falls_back_to_file_stem() {
        assert_eq!(stream_name(Some("es"), None), "es");
        assert_eq!(stream_name(None, Some(Path::new("/data/nq_1m.csv"))), "nq_1m");
        assert_eq!(stream_name(None, None), "default");
    }

    #[test]
    fn cli_parses_replay() {
        let cli = Cli::parse_from([
            "trendgate",
            "-v",
            "replay",
            "--config",
            "c.ini",
            "--bars",
            "es.csv",
            "--no-store",
        ]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Replay { no_store: true, .. }));
    }
}

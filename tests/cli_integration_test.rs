//! CLI integration tests: config building and command dispatch against real
//! files on disk.

mod common;

use common::*;
use std::path::Path;
use std::process::ExitCode;
use trendgate::adapters::file_config_adapter::FileConfigAdapter;
use trendgate::adapters::sqlite_adapter::SqliteAdapter;
use trendgate::cli::{self, Cli, Command};
use trendgate::domain::error::TrendgateError;
use trendgate::domain::journal::TradeFilter;
use trendgate::domain::segment::FlatPolicy;
use trendgate::ports::data_port::DataPort;
use trendgate::ports::trade_store::TradeStore;

const FULL_INI: &str = r#"
[engine]
multi_position = false
flat_policy = close          ; ignore | close
history_capacity = 200
flush_every = 10

[indicators]
curvature_period = 4
momentum_period = 8
grad_period = 4
adx_period = 10
rsi_period = 10

[overrides]
adx_min = 15
rsi_overbought = 75
rsi_oversold = 25
disabled = curvature_against_long, curvature_against_short

[quality]
horizon = 3
min_move_pct = 0.1

[trader]
enabled = true
stop_loss_pct = 1.5
take_profit_pct = 3
exit_on_reverse = false
"#;

// ExitCode has no PartialEq; compare debug output.
fn same_code(actual: ExitCode, expected: ExitCode) -> bool {
    format!("{actual:?}") == format!("{expected:?}")
}

fn ini_with_db(db: &Path) -> String {
    format!("{FULL_INI}\n[sqlite]\npath = {}\n", db.display())
}

mod config_loading {
    use super::*;

    #[test]
    fn build_engine_config_reads_every_section() {
        let adapter = FileConfigAdapter::from_string(FULL_INI).unwrap();
        let config = cli::build_engine_config(&adapter).unwrap();

        assert!(!config.multi_position);
        assert_eq!(config.flat_policy, FlatPolicy::Close);
        assert_eq!(config.history_capacity, 200);
        assert_eq!(config.flush_every, 10);
        assert_eq!(config.periods.curvature, 4);
        assert_eq!(config.periods.momentum, 8);
        assert_eq!(config.periods.adx, 10);
        assert!((config.overrides.adx_min - 15.0).abs() < f64::EPSILON);
        assert!((config.overrides.rsi_overbought - 75.0).abs() < f64::EPSILON);
        assert!(!config.overrides.is_enabled("curvature_against_long"));
        assert!(config.overrides.is_enabled("adx_low"));
        assert_eq!(config.quality_horizon, 3);
        assert!((config.trader.stop_loss_pct - 1.5).abs() < f64::EPSILON);
        assert!(!config.trader.exit_on_reverse);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let adapter = FileConfigAdapter::from_string("").unwrap();
        let config = cli::build_engine_config(&adapter).unwrap();
        assert_eq!(config, trendgate::domain::engine::EngineConfig::default());
    }

    #[test]
    fn bad_flat_policy_is_rejected() {
        let adapter = FileConfigAdapter::from_string("[engine]\nflat_policy = sideways\n").unwrap();
        let err = cli::build_engine_config(&adapter).unwrap_err();
        assert!(matches!(err, TrendgateError::ConfigInvalid { .. }));
    }

    #[test]
    fn inverted_rsi_bounds_are_rejected() {
        let adapter = FileConfigAdapter::from_string(
            "[overrides]\nrsi_overbought = 40\nrsi_oversold = 60\n",
        )
        .unwrap();
        assert!(cli::build_engine_config(&adapter).is_err());
    }

    #[test]
    fn unknown_disabled_blocker_is_rejected() {
        let adapter = FileConfigAdapter::from_string("[overrides]\ndisabled = adx_low, nope\n").unwrap();
        assert!(cli::build_engine_config(&adapter).is_err());
    }
}

mod commands {
    use super::*;

    #[test]
    fn validate_accepts_good_config() {
        let ini = write_temp(FULL_INI);
        let code = cli::run(Cli {
            verbose: false,
            command: Command::Validate {
                config: ini.path().to_path_buf(),
            },
        });
        assert!(same_code(code, ExitCode::SUCCESS));
    }

    #[test]
    fn validate_rejects_bad_config_with_config_exit_code() {
        let ini = write_temp("[quality]\nhorizon = 0\n");
        let code = cli::run(Cli {
            verbose: false,
            command: Command::Validate {
                config: ini.path().to_path_buf(),
            },
        });
        assert!(same_code(code, ExitCode::from(2)));
    }

    #[test]
    fn replay_writes_logs_and_store() {
        let dir = tempfile::tempdir().unwrap();
        let bars_path = dir.path().join("es.csv");
        let indicators = dir.path().join("es_indicators.csv");
        let journal = dir.path().join("es_journal.csv");
        let db = dir.path().join("trades.db");
        write_bars_csv(&bars_path, &wave(150, 3.0, 20.0));
        let ini = write_temp(&ini_with_db(&db));

        let code = cli::run(Cli {
            verbose: false,
            command: Command::Replay {
                config: ini.path().to_path_buf(),
                bars: Some(bars_path),
                stream: None,
                indicators: Some(indicators.clone()),
                journal: Some(journal.clone()),
                no_store: false,
            },
        });
        assert!(same_code(code, ExitCode::SUCCESS));

        let audit = cli::run(Cli {
            verbose: false,
            command: Command::Audit { file: indicators },
        });
        assert!(same_code(audit, ExitCode::SUCCESS));

        let journal_csv = std::fs::read_to_string(&journal).unwrap();
        assert!(journal_csv.starts_with("bar,action,direction,price,order_name,pnl,reason"));

        let config = FileConfigAdapter::from_string(&ini_with_db(&db)).unwrap();
        let store = SqliteAdapter::from_config(&config).unwrap();
        let stored = store.query_trades(Some("es"), &TradeFilter::default()).unwrap();
        let exits = journal_csv.lines().filter(|l| l.contains(",EXIT,")).count();
        assert_eq!(stored.len(), exits);
    }

    #[test]
    fn replay_reads_bars_imported_into_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let bars_path = dir.path().join("nq.csv");
        let db = dir.path().join("bars.db");
        write_bars_csv(&bars_path, &choppy_uptrend(40));
        let ini = write_temp(&ini_with_db(&db));

        let imported = cli::run(Cli {
            verbose: false,
            command: Command::Import {
                config: ini.path().to_path_buf(),
                bars: bars_path,
                stream: None,
            },
        });
        assert!(same_code(imported, ExitCode::SUCCESS));

        let config = FileConfigAdapter::from_string(&ini_with_db(&db)).unwrap();
        let store = SqliteAdapter::from_config(&config).unwrap();
        assert_eq!(store.get_data_range("nq").unwrap(), Some((1, 40, 40)));

        let listed = cli::run(Cli {
            verbose: false,
            command: Command::Streams {
                config: ini.path().to_path_buf(),
            },
        });
        assert!(same_code(listed, ExitCode::SUCCESS));

        let code = cli::run(Cli {
            verbose: false,
            command: Command::Replay {
                config: ini.path().to_path_buf(),
                bars: None,
                stream: Some("nq".to_string()),
                indicators: None,
                journal: None,
                no_store: true,
            },
        });
        assert!(same_code(code, ExitCode::SUCCESS));
    }

    #[test]
    fn replay_of_unknown_stream_reports_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("empty.db");
        let ini = write_temp(&ini_with_db(&db));
        let code = cli::run(Cli {
            verbose: false,
            command: Command::Replay {
                config: ini.path().to_path_buf(),
                bars: None,
                stream: Some("missing".to_string()),
                indicators: None,
                journal: None,
                no_store: true,
            },
        });
        assert!(same_code(code, ExitCode::from(5)));
    }

    #[test]
    fn audit_fails_on_misaligned_log() {
        let file = write_temp(
            "bar_index,timestamp,close,adx\n1,2024-01-02 09:31:00,100,NA\n2,2024-01-02 09:32:00,101\n",
        );
        let code = cli::run(Cli {
            verbose: false,
            command: Command::Audit {
                file: file.path().to_path_buf(),
            },
        });
        assert!(same_code(code, ExitCode::from(4)));
    }

    #[test]
    fn streams_on_empty_store_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let ini = write_temp(&ini_with_db(&dir.path().join("fresh.db")));
        let code = cli::run(Cli {
            verbose: false,
            command: Command::Streams {
                config: ini.path().to_path_buf(),
            },
        });
        assert!(same_code(code, ExitCode::SUCCESS));
    }

    #[test]
    fn missing_config_file_fails() {
        let code = cli::run(Cli {
            verbose: false,
            command: Command::Validate {
                config: "/nonexistent/trendgate.ini".into(),
            },
        });
        assert!(!same_code(code, ExitCode::SUCCESS));
    }

    #[test]
    fn trades_command_reads_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let bars_path = dir.path().join("cl.csv");
        let db = dir.path().join("trades.db");
        write_bars_csv(&bars_path, &wave(120, 3.0, 18.0));
        let ini = write_temp(&ini_with_db(&db));

        cli::run(Cli {
            verbose: false,
            command: Command::Replay {
                config: ini.path().to_path_buf(),
                bars: Some(bars_path),
                stream: None,
                indicators: None,
                journal: None,
                no_store: false,
            },
        });

        for reasons in [false, true] {
            let code = cli::run(Cli {
                verbose: false,
                command: Command::Trades {
                    config: ini.path().to_path_buf(),
                    stream: Some("cl".to_string()),
                    entry_reason: None,
                    unknown: false,
                    mismatch_only: false,
                    direction: None,
                    limit: Some(5),
                    reasons,
                },
            });
            assert!(same_code(code, ExitCode::SUCCESS));
        }
    }
}

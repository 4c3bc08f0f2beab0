//! CSV adapters: bar feed files, indicator log export and audit, journal
//! export.

use crate::domain::bar::{parse_timestamp, Bar};
use crate::domain::error::TrendgateError;
use crate::domain::indicator::{IndicatorSchema, IndicatorSet, IndicatorValue};
use crate::domain::journal::TradeEvent;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::{IndicatorSink, ReportPort};
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

pub const BAR_COLUMNS: [&str; 6] = ["bar_index", "timestamp", "open", "high", "low", "close"];
pub const JOURNAL_COLUMNS: [&str; 7] = ["bar", "action", "direction", "price", "order_name", "pnl", "reason"];
pub const MISSING: &str = "NA";

fn export_err(path: &Path, e: impl std::fmt::Display) -> TrendgateError {
    TrendgateError::Export {
        reason: format!("{}: {}", path.display(), e),
    }
}

/// Directory of `<stream>.csv` bar files.
pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, stream: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", stream))
    }
}

fn field<'r>(record: &'r csv::StringRecord, idx: usize, line: u64) -> Result<&'r str, TrendgateError> {
    record.get(idx).ok_or_else(|| TrendgateError::Database {
        reason: format!("line {line}: missing {} column", BAR_COLUMNS[idx]),
    })
}

fn price(record: &csv::StringRecord, idx: usize, line: u64) -> Result<f64, TrendgateError> {
    field(record, idx, line)?
        .trim()
        .parse()
        .map_err(|e| TrendgateError::Database {
            reason: format!("line {line}: invalid {} value: {e}", BAR_COLUMNS[idx]),
        })
}

/// Read a bar file. Rows keep file order so the engine can reject
/// out-of-order bars itself.
pub fn read_bars(path: &Path) -> Result<Vec<Bar>, TrendgateError> {
    let content = fs::read_to_string(path).map_err(|e| TrendgateError::Database {
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;

    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut bars = Vec::new();

    for result in rdr.records() {
        let record = result.map_err(|e| TrendgateError::Database {
            reason: format!("CSV parse error: {}", e),
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let bar_index: u64 = field(&record, 0, line)?
            .trim()
            .parse()
            .map_err(|e| TrendgateError::Database {
                reason: format!("line {line}: invalid bar_index: {e}"),
            })?;
        let timestamp =
            parse_timestamp(field(&record, 1, line)?.trim()).map_err(|e| TrendgateError::Database {
                reason: format!("line {line}: invalid timestamp: {e}"),
            })?;

        bars.push(Bar {
            bar_index,
            timestamp,
            open: price(&record, 2, line)?,
            high: price(&record, 3, line)?,
            low: price(&record, 4, line)?,
            close: price(&record, 5, line)?,
        });
    }

    Ok(bars)
}

impl DataPort for CsvAdapter {
    fn fetch_bars(&self, stream: &str) -> Result<Vec<Bar>, TrendgateError> {
        read_bars(&self.csv_path(stream))
    }

    fn list_streams(&self) -> Result<Vec<String>, TrendgateError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| TrendgateError::Database {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut streams = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TrendgateError::Database {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            if let Some(stream) = name.to_string_lossy().strip_suffix(".csv") {
                streams.push(stream.to_string());
            }
        }

        streams.sort();
        Ok(streams)
    }

    fn get_data_range(&self, stream: &str) -> Result<Option<(u64, u64, usize)>, TrendgateError> {
        let bars = self.fetch_bars(stream)?;
        let first = bars.iter().map(|b| b.bar_index).min();
        let last = bars.iter().map(|b| b.bar_index).max();
        Ok(first.zip(last).map(|(f, l)| (f, l, bars.len())))
    }
}

fn format_value(value: IndicatorValue) -> String {
    match value {
        IndicatorValue::Present(v) => v.to_string(),
        IndicatorValue::Missing => MISSING.to_string(),
    }
}

/// Streams the indicator log to a CSV file, one row per bar.
pub struct IndicatorLogWriter {
    writer: csv::Writer<File>,
    path: PathBuf,
    names: Vec<&'static str>,
}

impl IndicatorLogWriter {
    pub fn create(path: &Path, schema: &IndicatorSchema) -> Result<Self, TrendgateError> {
        let mut writer = csv::Writer::from_path(path).map_err(|e| export_err(path, e))?;
        let header: Vec<&str> = BAR_COLUMNS
            .iter()
            .copied()
            .chain(schema.names.iter().copied())
            .collect();
        writer
            .write_record(&header)
            .map_err(|e| export_err(path, e))?;
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            names: schema.names.clone(),
        })
    }

    pub fn width(&self) -> usize {
        BAR_COLUMNS.len() + self.names.len()
    }
}

impl IndicatorSink for IndicatorLogWriter {
    fn write_row(&mut self, bar: &Bar, set: &IndicatorSet) -> Result<(), TrendgateError> {
        if set.values.len() != self.names.len() {
            return Err(TrendgateError::SchemaMismatch {
                bar_index: bar.bar_index,
                expected: self.width(),
                found: BAR_COLUMNS.len() + set.values.len(),
            });
        }
        if let Some((pos, (name, _))) = set
            .values
            .iter()
            .enumerate()
            .find(|(i, (name, _))| *name != self.names[*i])
        {
            return Err(TrendgateError::Export {
                reason: format!(
                    "bar {}: column {} is '{}' but header says '{}'",
                    bar.bar_index,
                    BAR_COLUMNS.len() + pos,
                    name,
                    self.names[pos]
                ),
            });
        }

        let mut row = vec![
            bar.bar_index.to_string(),
            bar.timestamp_string(),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
        ];
        row.extend(set.values.iter().map(|(_, v)| format_value(*v)));
        self.writer
            .write_record(&row)
            .map_err(|e| export_err(&self.path, e))
    }

    fn finish(&mut self) -> Result<(), TrendgateError> {
        self.writer.flush().map_err(|e| export_err(&self.path, e))
    }
}

/// A row whose width differs from the header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MisalignedRow {
    pub line: u64,
    pub bar_index: Option<u64>,
    pub width: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditReport {
    pub header_width: usize,
    pub rows: usize,
    pub missing_cells: usize,
    pub misaligned: Vec<MisalignedRow>,
}

impl AuditReport {
    pub fn is_aligned(&self) -> bool {
        self.misaligned.is_empty()
    }
}

/// Check every row of an exported indicator log against its header width.
pub fn audit_indicator_log(path: &Path) -> Result<AuditReport, TrendgateError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| export_err(path, e))?;

    let mut records = rdr.records();
    let header = match records.next() {
        Some(r) => r.map_err(|e| export_err(path, e))?,
        None => {
            return Err(TrendgateError::Export {
                reason: format!("{}: empty file", path.display()),
            });
        }
    };

    let mut report = AuditReport {
        header_width: header.len(),
        rows: 0,
        missing_cells: 0,
        misaligned: Vec::new(),
    };

    for result in records {
        let record = result.map_err(|e| export_err(path, e))?;
        report.rows += 1;
        report.missing_cells += record.iter().filter(|c| *c == MISSING).count();
        if record.len() != report.header_width {
            report.misaligned.push(MisalignedRow {
                line: record.position().map(|p| p.line()).unwrap_or(0),
                bar_index: record.get(0).and_then(|v| v.trim().parse().ok()),
                width: record.len(),
            });
        }
    }

    Ok(report)
}

/// Writes the trade journal as CSV.
pub struct CsvReportAdapter;

impl ReportPort for CsvReportAdapter {
    fn write_journal(&self, events: &[TradeEvent], output_path: &Path) -> Result<(), TrendgateError> {
        let mut writer = csv::Writer::from_path(output_path).map_err(|e| export_err(output_path, e))?;
        writer
            .write_record(JOURNAL_COLUMNS)
            .map_err(|e| export_err(output_path, e))?;

        for event in events {
            let row = match event {
                TradeEvent::Entry {
                    bar_index,
                    direction,
                    price,
                    reason,
                    ..
                } => [
                    bar_index.to_string(),
                    "ENTRY".to_string(),
                    direction.to_string(),
                    price.to_string(),
                    String::new(),
                    String::new(),
                    reason.clone(),
                ],
                TradeEvent::Exit {
                    bar_index,
                    direction,
                    price,
                    order_name,
                    pnl,
                    reason,
                    ..
                } => [
                    bar_index.to_string(),
                    "EXIT".to_string(),
                    direction.to_string(),
                    price.to_string(),
                    order_name.clone(),
                    pnl.to_string(),
                    reason.clone(),
                ],
            };
            writer
                .write_record(&row)
                .map_err(|e| export_err(output_path, e))?;
        }

        writer.flush().map_err(|e| export_err(output_path, e))
    }
}

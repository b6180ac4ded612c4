//! CSV file data adapter.
//!
//! One file per symbol, `<dir>/<symbol>.csv`, with a
//! `date,open,high,low,close,volume` header. Rows outside the requested
//! range are skipped; ordering and duplicate checks happen later when
//! the series is constructed.

use crate::domain::bar::Bar;
use crate::domain::error::QuantbackError;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }

    fn parse_row(symbol: &str, record: &csv::StringRecord) -> Result<Bar, QuantbackError> {
        let field = |idx: usize, name: &str| {
            record.get(idx).ok_or_else(|| QuantbackError::Data {
                reason: format!("{}: missing {} column", symbol, name),
            })
        };
        let number = |idx: usize, name: &str| -> Result<f64, QuantbackError> {
            field(idx, name)?.parse().map_err(|e| QuantbackError::Data {
                reason: format!("{}: invalid {} value: {}", symbol, name, e),
            })
        };

        let date = NaiveDate::parse_from_str(field(0, "date")?, "%Y-%m-%d").map_err(|e| {
            QuantbackError::Data {
                reason: format!("{}: invalid date format: {}", symbol, e),
            }
        })?;
        let volume: i64 =
            field(5, "volume")?
                .parse()
                .map_err(|e| QuantbackError::Data {
                    reason: format!("{}: invalid volume value: {}", symbol, e),
                })?;

        Ok(Bar {
            symbol: symbol.to_string(),
            date,
            open: number(1, "open")?,
            high: number(2, "high")?,
            low: number(3, "low")?,
            close: number(4, "close")?,
            volume,
        })
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, QuantbackError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| QuantbackError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| QuantbackError::Data {
                reason: format!("{}: CSV parse error: {}", symbol, e),
            })?;
            let bar = Self::parse_row(symbol, &record)?;
            if bar.date < start_date || bar.date > end_date {
                continue;
            }
            bars.push(bar);
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, QuantbackError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| QuantbackError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| QuantbackError::Data {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(stem) = name_str.strip_suffix(".csv") {
                symbols.push(stem.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, QuantbackError> {
        let bars = self.fetch_bars(symbol, NaiveDate::MIN, NaiveDate::MAX)?;
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date, bars.len())),
            _ => None,
        })
    }
}

//! Per-instrument bar series and the unified replay timeline.
//!
//! Series are validated at construction: strictly increasing dates, no
//! duplicate (symbol, date) pairs, no malformed bars. The engine treats
//! any violation as a fatal input error before the first step runs.

use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

use super::bar::Bar;
use super::error::QuantbackError;

#[derive(Debug, Clone)]
pub struct InstrumentSeries {
    pub symbol: String,
    pub bars: Vec<Bar>,
    date_index: HashMap<NaiveDate, usize>,
}

impl InstrumentSeries {
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Result<Self, QuantbackError> {
        let symbol = symbol.into();
        let mut date_index = HashMap::with_capacity(bars.len());

        for (i, bar) in bars.iter().enumerate() {
            bar.validate()?;
            if bar.symbol != symbol {
                return Err(QuantbackError::FatalInput {
                    symbol: symbol.clone(),
                    date: bar.date.to_string(),
                    reason: format!("bar belongs to {}", bar.symbol),
                });
            }
            if i > 0 && bar.date <= bars[i - 1].date {
                let reason = if bar.date == bars[i - 1].date {
                    format!("duplicate bar for {}", bar.date)
                } else {
                    format!("out-of-order bar: {} after {}", bar.date, bars[i - 1].date)
                };
                return Err(QuantbackError::FatalInput {
                    symbol: symbol.clone(),
                    date: bar.date.to_string(),
                    reason,
                });
            }
            date_index.insert(bar.date, i);
        }

        Ok(InstrumentSeries {
            symbol,
            bars,
            date_index,
        })
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn bar_at(&self, date: NaiveDate) -> Option<&Bar> {
        self.date_index.get(&date).map(|&i| &self.bars[i])
    }

    /// Trailing window of bars up to and including `date` — never a
    /// future bar.
    pub fn window_to(&self, date: NaiveDate) -> &[Bar] {
        let end = self.bars.partition_point(|b| b.date <= date);
        &self.bars[..end]
    }

    /// The bar strictly after `date`, if any.
    pub fn bar_after(&self, date: NaiveDate) -> Option<&Bar> {
        let idx = self.bars.partition_point(|b| b.date <= date);
        self.bars.get(idx)
    }
}

/// Sorted union of all dates across the given series.
pub fn build_timeline(series: &[InstrumentSeries]) -> Vec<NaiveDate> {
    let dates: BTreeSet<NaiveDate> = series
        .iter()
        .flat_map(|s| s.bars.iter().map(|b| b.date))
        .collect();
    dates.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bar(symbol: &str, day: u32, close: f64) -> Bar {
        Bar {
            symbol: symbol.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1000,
        }
    }

    #[test]
    fn series_builds_date_index() {
        let series = InstrumentSeries::new(
            "600519",
            vec![
                make_bar("600519", 1, 100.0),
                make_bar("600519", 2, 101.0),
                make_bar("600519", 3, 102.0),
            ],
        )
        .unwrap();

        assert_eq!(series.bar_count(), 3);
        let bar = series.bar_at(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert!((bar.unwrap().close - 101.0).abs() < f64::EPSILON);
    }

    #[test]
    fn duplicate_date_is_fatal() {
        let result = InstrumentSeries::new(
            "600519",
            vec![make_bar("600519", 1, 100.0), make_bar("600519", 1, 101.0)],
        );
        assert!(matches!(result, Err(QuantbackError::FatalInput { .. })));
    }

    #[test]
    fn out_of_order_date_is_fatal() {
        let result = InstrumentSeries::new(
            "600519",
            vec![make_bar("600519", 3, 100.0), make_bar("600519", 1, 101.0)],
        );
        assert!(matches!(result, Err(QuantbackError::FatalInput { .. })));
    }

    #[test]
    fn foreign_symbol_is_fatal() {
        let result = InstrumentSeries::new("600519", vec![make_bar("000001", 1, 100.0)]);
        assert!(result.is_err());
    }

    #[test]
    fn malformed_bar_is_fatal() {
        let mut bar = make_bar("600519", 1, 100.0);
        bar.close = -1.0;
        assert!(InstrumentSeries::new("600519", vec![bar]).is_err());
    }

    #[test]
    fn window_excludes_future_bars() {
        let series = InstrumentSeries::new(
            "600519",
            vec![
                make_bar("600519", 1, 100.0),
                make_bar("600519", 3, 101.0),
                make_bar("600519", 5, 102.0),
            ],
        )
        .unwrap();

        let window = series.window_to(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert_eq!(window.len(), 2);
        assert_eq!(window.last().unwrap().date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());

        // date between bars still excludes the future
        let window = series.window_to(NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn bar_after_returns_next() {
        let series = InstrumentSeries::new(
            "600519",
            vec![make_bar("600519", 1, 100.0), make_bar("600519", 3, 101.0)],
        )
        .unwrap();

        let next = series.bar_after(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(next.unwrap().date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert!(series
            .bar_after(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap())
            .is_none());
    }

    #[test]
    fn timeline_merges_and_sorts() {
        let a = InstrumentSeries::new(
            "600519",
            vec![make_bar("600519", 2, 100.0), make_bar("600519", 5, 101.0)],
        )
        .unwrap();
        let b = InstrumentSeries::new(
            "000001",
            vec![make_bar("000001", 1, 50.0), make_bar("000001", 3, 51.0)],
        )
        .unwrap();

        let timeline = build_timeline(&[a, b]);
        let days: Vec<u32> = timeline
            .iter()
            .map(|d| chrono::Datelike::day(d))
            .collect();
        assert_eq!(days, vec![1, 2, 3, 5]);
    }

    #[test]
    fn timeline_empty() {
        assert!(build_timeline(&[]).is_empty());
    }
}

//! OHLCV bar representation.

use chrono::NaiveDate;

use super::error::QuantbackError;

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Bar {
    /// Reject bars the engine cannot price: non-finite or non-positive
    /// fields, or an inverted high/low range.
    pub fn validate(&self) -> Result<(), QuantbackError> {
        let prices = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ];
        for (name, value) in prices {
            if !value.is_finite() || value <= 0.0 {
                return Err(self.fatal(format!("{} price {} is not a positive number", name, value)));
            }
        }
        if self.high < self.low {
            return Err(self.fatal(format!("high {} below low {}", self.high, self.low)));
        }
        if self.volume < 0 {
            return Err(self.fatal(format!("negative volume {}", self.volume)));
        }
        Ok(())
    }

    fn fatal(&self, reason: String) -> QuantbackError {
        QuantbackError::FatalInput {
            symbol: self.symbol.clone(),
            date: self.date.to_string(),
            reason,
        }
    }
}

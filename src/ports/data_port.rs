//! Data access port trait.

use crate::domain::bar::Bar;
use crate::domain::error::QuantbackError;
use chrono::NaiveDate;

pub trait DataPort {
    fn fetch_bars(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, QuantbackError>;

    fn list_symbols(&self) -> Result<Vec<String>, QuantbackError>;

    fn data_range(&self, symbol: &str)
        -> Result<Option<(NaiveDate, NaiveDate, usize)>, QuantbackError>;
}

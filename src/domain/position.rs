//! Position tracking with average cost and T+1 settlement locks.

use chrono::NaiveDate;

use super::order::Side;

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub quantity: i64,
    /// Weighted-average cost per share, excluding fees.
    pub avg_cost: f64,
    /// Shares bought on `locked_date`, not sellable until a later
    /// session.
    pub locked_quantity: i64,
    pub locked_date: Option<NaiveDate>,
}

impl Position {
    pub fn new(symbol: impl Into<String>) -> Self {
        Position {
            symbol: symbol.into(),
            quantity: 0,
            avg_cost: 0.0,
            locked_quantity: 0,
            locked_date: None,
        }
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    /// (price - avg_cost) / avg_cost, or 0 when flat.
    pub fn unrealized_pnl_ratio(&self, price: f64) -> f64 {
        if self.avg_cost <= 0.0 || self.quantity <= 0 {
            return 0.0;
        }
        (price - self.avg_cost) / self.avg_cost
    }

    /// Shares eligible to sell as of the given session. Shares bought
    /// on an earlier date have settled and are free.
    pub fn unlocked_quantity(&self, as_of: NaiveDate) -> i64 {
        match self.locked_date {
            Some(lock_date) if lock_date >= as_of => self.quantity - self.locked_quantity,
            _ => self.quantity,
        }
    }

    /// Add bought shares at `price`, locking them for the session.
    pub fn add_bought(&mut self, quantity: i64, price: f64, date: NaiveDate) {
        let prior_cost = self.quantity as f64 * self.avg_cost;
        self.quantity += quantity;
        self.avg_cost = (prior_cost + quantity as f64 * price) / self.quantity as f64;

        match self.locked_date {
            Some(lock_date) if lock_date == date => self.locked_quantity += quantity,
            _ => {
                self.locked_date = Some(date);
                self.locked_quantity = quantity;
            }
        }
    }

    /// Remove sold shares. Average cost is unchanged; a fully closed
    /// position resets to zero cost.
    pub fn remove_sold(&mut self, quantity: i64) {
        self.quantity -= quantity;
        if self.quantity <= 0 {
            self.quantity = 0;
            self.avg_cost = 0.0;
            self.locked_quantity = 0;
            self.locked_date = None;
        }
    }
}

/// One executed trade in the realized ledger. Sells carry the realized
/// P&L of the shares they closed (average-cost method, net of fees).
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub symbol: String,
    pub side: Side,
    pub date: NaiveDate,
    pub price: f64,
    pub quantity: i64,
    pub commission: f64,
    pub stamp_tax: f64,
    pub transfer_fee: f64,
    pub realized_pnl: Option<f64>,
    pub cash_after: f64,
}

//! Trading signals emitted by strategies.
//!
//! A signal is an immutable per-step value; it lives only for the step
//! that consumes it and is never persisted.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub enum SignalKind {
    Buy,
    Sell,
    /// Rebalance the instrument to the given fraction of total equity.
    TargetWeight(f64),
    Hold,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub symbol: String,
    pub date: NaiveDate,
    pub kind: SignalKind,
    /// Requested share count. `None` lets the engine size the order
    /// (Buy: as much as cash and risk limits allow; Sell: the full
    /// unlocked position).
    pub quantity: Option<i64>,
}

impl Signal {
    pub fn buy(symbol: impl Into<String>, date: NaiveDate, quantity: Option<i64>) -> Self {
        Signal {
            symbol: symbol.into(),
            date,
            kind: SignalKind::Buy,
            quantity,
        }
    }

    pub fn sell(symbol: impl Into<String>, date: NaiveDate, quantity: Option<i64>) -> Self {
        Signal {
            symbol: symbol.into(),
            date,
            kind: SignalKind::Sell,
            quantity,
        }
    }

    pub fn is_buy(&self) -> bool {
        self.kind == SignalKind::Buy
    }

    pub fn is_sell(&self) -> bool {
        self.kind == SignalKind::Sell
    }

    pub fn is_hold(&self) -> bool {
        self.kind == SignalKind::Hold
    }
}

//! Portfolio ledger: cash, positions, realized trades, equity curve.
//!
//! The portfolio is mutated only by confirmed fills. The order manager
//! checks cash and unlocked quantity before producing a fill; the same
//! checks are repeated here as defensive invariants.

use chrono::NaiveDate;
use std::collections::HashMap;

use super::error::QuantbackError;
use super::order::{Fill, Side};
use super::position::{Position, Trade};

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
    pub cash: f64,
    pub position_value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: HashMap<String, Position>,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            positions: HashMap::new(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn position_quantity(&self, symbol: &str) -> i64 {
        self.positions.get(symbol).map_or(0, |p| p.quantity)
    }

    pub fn unlocked_quantity(&self, symbol: &str, as_of: NaiveDate) -> i64 {
        self.positions
            .get(symbol)
            .map_or(0, |p| p.unlocked_quantity(as_of))
    }

    /// Apply a confirmed fill. Buy: cash pays notional plus costs and
    /// the bought shares are locked for the session. Sell: cash
    /// receives notional minus costs and realized P&L is recorded by
    /// the average-cost method.
    pub fn apply_fill(&mut self, fill: &Fill) -> Result<(), QuantbackError> {
        match fill.side {
            Side::Buy => self.apply_buy(fill),
            Side::Sell => self.apply_sell(fill),
        }
    }

    fn apply_buy(&mut self, fill: &Fill) -> Result<(), QuantbackError> {
        let total_cost = fill.notional() + fill.total_costs();
        if total_cost > self.cash + 1e-9 {
            return Err(QuantbackError::Accounting {
                reason: format!(
                    "buy fill for {} costs {:.2} but cash is {:.2}",
                    fill.symbol, total_cost, self.cash
                ),
            });
        }

        self.cash -= total_cost;
        self.positions
            .entry(fill.symbol.clone())
            .or_insert_with(|| Position::new(fill.symbol.clone()))
            .add_bought(fill.quantity, fill.price, fill.date);

        self.trades.push(Trade {
            symbol: fill.symbol.clone(),
            side: Side::Buy,
            date: fill.date,
            price: fill.price,
            quantity: fill.quantity,
            commission: fill.commission,
            stamp_tax: fill.stamp_tax,
            transfer_fee: fill.transfer_fee,
            realized_pnl: None,
            cash_after: self.cash,
        });
        Ok(())
    }

    fn apply_sell(&mut self, fill: &Fill) -> Result<(), QuantbackError> {
        let unlocked = self.unlocked_quantity(&fill.symbol, fill.date);
        if fill.quantity > unlocked {
            return Err(QuantbackError::Accounting {
                reason: format!(
                    "sell fill for {} of {} shares exceeds unlocked quantity {}",
                    fill.symbol, fill.quantity, unlocked
                ),
            });
        }

        let position = self
            .positions
            .get_mut(&fill.symbol)
            .ok_or_else(|| QuantbackError::Accounting {
                reason: format!("sell fill for unheld symbol {}", fill.symbol),
            })?;

        let realized =
            (fill.price - position.avg_cost) * fill.quantity as f64 - fill.total_costs();
        position.remove_sold(fill.quantity);
        self.cash += fill.notional() - fill.total_costs();

        self.trades.push(Trade {
            symbol: fill.symbol.clone(),
            side: Side::Sell,
            date: fill.date,
            price: fill.price,
            quantity: fill.quantity,
            commission: fill.commission,
            stamp_tax: fill.stamp_tax,
            transfer_fee: fill.transfer_fee,
            realized_pnl: Some(realized),
            cash_after: self.cash,
        });
        Ok(())
    }

    /// Cash plus the marked value of every open position. Symbols
    /// missing from the price map are valued at zero, so callers must
    /// provide a price for every held symbol.
    pub fn mark_to_market(&self, prices: &HashMap<String, f64>) -> f64 {
        let position_value: f64 = self
            .positions
            .values()
            .filter(|p| p.quantity > 0)
            .filter_map(|p| prices.get(&p.symbol).map(|&px| p.market_value(px)))
            .sum();
        self.cash + position_value
    }

    pub fn record_equity(&mut self, date: NaiveDate, prices: &HashMap<String, f64>) {
        let equity = self.mark_to_market(prices);
        self.equity_curve.push(EquityPoint {
            date,
            equity,
            cash: self.cash,
            position_value: equity - self.cash,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn buy_fill(symbol: &str, quantity: i64, price: f64, day: u32) -> Fill {
        Fill {
            order_id: 1,
            symbol: symbol.into(),
            side: Side::Buy,
            date: d(day),
            price,
            quantity,
            commission: 0.0,
            stamp_tax: 0.0,
            transfer_fee: 0.0,
        }
    }

    fn sell_fill(symbol: &str, quantity: i64, price: f64, day: u32) -> Fill {
        Fill {
            side: Side::Sell,
            ..buy_fill(symbol, quantity, price, day)
        }
    }

    #[test]
    fn buy_fill_moves_cash_into_position() {
        let mut portfolio = Portfolio::new(1_000_000.0);
        let mut fill = buy_fill("600519", 1000, 10.0, 15);
        fill.commission = 30.0;

        portfolio.apply_fill(&fill).unwrap();

        assert!((portfolio.cash - 989_970.0).abs() < 1e-9);
        assert_eq!(portfolio.position_quantity("600519"), 1000);
        assert_eq!(portfolio.trades.len(), 1);
        assert!(portfolio.trades[0].realized_pnl.is_none());
    }

    #[test]
    fn buy_fill_exceeding_cash_is_refused() {
        let mut portfolio = Portfolio::new(100.0);
        let fill = buy_fill("600519", 1000, 10.0, 15);

        assert!(portfolio.apply_fill(&fill).is_err());
        assert_eq!(portfolio.position_quantity("600519"), 0);
        assert!((portfolio.cash - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sell_fill_realizes_pnl() {
        let mut portfolio = Portfolio::new(100_000.0);
        portfolio.apply_fill(&buy_fill("600519", 1000, 10.0, 15)).unwrap();

        let mut fill = sell_fill("600519", 1000, 12.0, 16);
        fill.commission = 5.0;
        fill.stamp_tax = 12.0;
        portfolio.apply_fill(&fill).unwrap();

        assert_eq!(portfolio.position_quantity("600519"), 0);
        let trade = portfolio.trades.last().unwrap();
        // (12 - 10) * 1000 - 17 in costs
        assert!((trade.realized_pnl.unwrap() - 1983.0).abs() < 1e-9);
        assert!((portfolio.cash - (90_000.0 + 12_000.0 - 17.0)).abs() < 1e-9);
    }

    #[test]
    fn sell_same_day_violates_settlement() {
        let mut portfolio = Portfolio::new(100_000.0);
        portfolio.apply_fill(&buy_fill("600519", 1000, 10.0, 15)).unwrap();

        let result = portfolio.apply_fill(&sell_fill("600519", 1000, 11.0, 15));
        assert!(matches!(result, Err(QuantbackError::Accounting { .. })));
        assert_eq!(portfolio.position_quantity("600519"), 1000);
    }

    #[test]
    fn sell_next_day_succeeds() {
        let mut portfolio = Portfolio::new(100_000.0);
        portfolio.apply_fill(&buy_fill("600519", 1000, 10.0, 15)).unwrap();

        assert!(portfolio.apply_fill(&sell_fill("600519", 1000, 11.0, 16)).is_ok());
        assert_eq!(portfolio.position_quantity("600519"), 0);
    }

    #[test]
    fn sell_more_than_held_is_refused() {
        let mut portfolio = Portfolio::new(100_000.0);
        portfolio.apply_fill(&buy_fill("600519", 1000, 10.0, 15)).unwrap();

        let result = portfolio.apply_fill(&sell_fill("600519", 1200, 11.0, 16));
        assert!(result.is_err());
        assert_eq!(portfolio.position_quantity("600519"), 1000);
    }

    #[test]
    fn sell_unheld_symbol_is_refused() {
        let mut portfolio = Portfolio::new(100_000.0);
        assert!(portfolio.apply_fill(&sell_fill("000001", 100, 11.0, 16)).is_err());
    }

    #[test]
    fn mark_to_market_sums_cash_and_positions() {
        let mut portfolio = Portfolio::new(100_000.0);
        portfolio.apply_fill(&buy_fill("600519", 1000, 10.0, 15)).unwrap();
        portfolio.apply_fill(&buy_fill("000001", 200, 50.0, 15)).unwrap();

        let mut prices = HashMap::new();
        prices.insert("600519".to_string(), 11.0);
        prices.insert("000001".to_string(), 45.0);

        // cash 80,000 + 11,000 + 9,000
        assert!((portfolio.mark_to_market(&prices) - 100_000.0).abs() < 1e-9);
    }

    #[test]
    fn record_equity_appends_point() {
        let mut portfolio = Portfolio::new(100_000.0);
        portfolio.apply_fill(&buy_fill("600519", 1000, 10.0, 15)).unwrap();

        let mut prices = HashMap::new();
        prices.insert("600519".to_string(), 10.5);
        portfolio.record_equity(d(15), &prices);

        assert_eq!(portfolio.equity_curve.len(), 1);
        let point = &portfolio.equity_curve[0];
        assert!((point.equity - (90_000.0 + 10_500.0)).abs() < 1e-9);
        assert!((point.cash - 90_000.0).abs() < 1e-9);
        assert!((point.position_value - 10_500.0).abs() < 1e-9);
    }

    #[test]
    fn closed_positions_do_not_affect_valuation() {
        let mut portfolio = Portfolio::new(100_000.0);
        portfolio.apply_fill(&buy_fill("600519", 1000, 10.0, 15)).unwrap();
        portfolio.apply_fill(&sell_fill("600519", 1000, 10.0, 16)).unwrap();

        let mut prices = HashMap::new();
        prices.insert("600519".to_string(), 99.0);
        assert!((portfolio.mark_to_market(&prices) - portfolio.cash).abs() < 1e-9);
    }
}

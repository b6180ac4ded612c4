//! Risk limits, order authorization, and protective exits.
//!
//! The risk manager gatekeeps order creation (exposure caps, drawdown
//! halt) and synthesizes forced Sell signals when a position crosses
//! its stop-loss or take-profit threshold. A veto is a logged decision,
//! not an error; the run continues.

use chrono::NaiveDate;
use std::collections::HashMap;

use super::error::QuantbackError;
use super::order::LOT_SIZE;
use super::portfolio::Portfolio;
use super::signal::Signal;

/// Ratio-based limits, fixed for the duration of a run. A stop-loss or
/// take-profit ratio of zero disables that check.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskLimits {
    /// Cap on total invested value as a fraction of equity.
    pub max_position_ratio: f64,
    /// Cap on a single instrument's value as a fraction of equity.
    pub max_single_ratio: f64,
    pub stop_loss_ratio: f64,
    pub take_profit_ratio: f64,
    /// Drawdown from the running equity peak beyond which new buys are
    /// rejected until equity recovers.
    pub max_drawdown_ratio: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        RiskLimits {
            max_position_ratio: 0.8,
            max_single_ratio: 0.2,
            stop_loss_ratio: 0.08,
            take_profit_ratio: 0.15,
            max_drawdown_ratio: 0.15,
        }
    }
}

impl RiskLimits {
    pub fn validate(&self) -> Result<(), QuantbackError> {
        let ratios = [
            ("max_position_ratio", self.max_position_ratio),
            ("max_single_ratio", self.max_single_ratio),
            ("stop_loss_ratio", self.stop_loss_ratio),
            ("take_profit_ratio", self.take_profit_ratio),
            ("max_drawdown_ratio", self.max_drawdown_ratio),
        ];
        for (key, value) in ratios {
            if !(0.0..=1.0).contains(&value) || !value.is_finite() {
                return Err(QuantbackError::ConfigInvalid {
                    section: "risk".to_string(),
                    key: key.to_string(),
                    reason: format!("{} must be a ratio between 0 and 1, got {}", key, value),
                });
            }
        }
        Ok(())
    }
}

/// Decision on a prospective order.
#[derive(Debug, Clone, PartialEq)]
pub enum Authorization {
    Approved { quantity: i64 },
    /// Down-sized to the largest lot multiple that fits the caps.
    Modified { quantity: i64 },
    Rejected { reason: String },
}

#[derive(Debug, Clone)]
pub struct RiskManager {
    limits: RiskLimits,
    peak_equity: f64,
}

impl RiskManager {
    pub fn new(limits: RiskLimits, initial_capital: f64) -> Self {
        RiskManager {
            limits,
            peak_equity: initial_capital,
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn update_peak(&mut self, equity: f64) {
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
    }

    pub fn drawdown(&self, equity: f64) -> f64 {
        if self.peak_equity <= 0.0 {
            return 0.0;
        }
        ((self.peak_equity - equity) / self.peak_equity).max(0.0)
    }

    /// Authorize a prospective buy of `requested` shares at `price`.
    ///
    /// Checks in order: total exposure cap, single-instrument cap,
    /// drawdown halt. An order that exceeds a cap is down-sized to the
    /// largest lot multiple that fits; only a cap leaving no room (or
    /// an active drawdown halt) rejects outright.
    pub fn authorize_buy(
        &self,
        symbol: &str,
        requested: i64,
        price: f64,
        portfolio: &Portfolio,
        prices: &HashMap<String, f64>,
    ) -> Authorization {
        let equity = portfolio.mark_to_market(prices);
        if equity <= 0.0 || price <= 0.0 {
            return Authorization::Rejected {
                reason: "equity or price not positive".to_string(),
            };
        }

        let invested = equity - portfolio.cash;
        let headroom_total = self.limits.max_position_ratio * equity - invested;

        let held_value = portfolio
            .position(symbol)
            .and_then(|p| prices.get(symbol).map(|&px| p.market_value(px)))
            .unwrap_or(0.0);
        let headroom_single = self.limits.max_single_ratio * equity - held_value;

        let headroom = headroom_total.min(headroom_single);
        let max_quantity = ((headroom / price) as i64 / LOT_SIZE) * LOT_SIZE;

        if max_quantity <= 0 {
            let cap = if headroom_total <= headroom_single {
                "max position ratio"
            } else {
                "max single-instrument ratio"
            };
            return Authorization::Rejected {
                reason: format!("{} leaves no room for {}", cap, symbol),
            };
        }

        let drawdown = self.drawdown(equity);
        if drawdown > self.limits.max_drawdown_ratio {
            return Authorization::Rejected {
                reason: format!(
                    "drawdown {:.2}% exceeds halt threshold {:.2}%",
                    drawdown * 100.0,
                    self.limits.max_drawdown_ratio * 100.0
                ),
            };
        }

        if requested > max_quantity {
            Authorization::Modified {
                quantity: max_quantity,
            }
        } else {
            Authorization::Approved {
                quantity: requested,
            }
        }
    }

    /// Authorize a sell of up to `requested` shares. Sells are never
    /// blocked by exposure caps; they are capped to the unlocked
    /// position and rejected only when nothing is sellable.
    pub fn authorize_sell(
        &self,
        symbol: &str,
        requested: i64,
        portfolio: &Portfolio,
        date: NaiveDate,
    ) -> Authorization {
        let held = portfolio.position_quantity(symbol);
        if held <= 0 {
            return Authorization::Rejected {
                reason: format!("no position in {}", symbol),
            };
        }
        let unlocked = portfolio.unlocked_quantity(symbol, date);
        if unlocked <= 0 {
            return Authorization::Rejected {
                reason: format!("position in {} locked by T+1 settlement", symbol),
            };
        }
        if requested > unlocked {
            Authorization::Modified { quantity: unlocked }
        } else {
            Authorization::Approved {
                quantity: requested,
            }
        }
    }

    /// Scan open positions and synthesize forced Sell signals where the
    /// unrealized move has crossed the stop-loss or take-profit ratio.
    pub fn protective_exits(
        &self,
        portfolio: &Portfolio,
        prices: &HashMap<String, f64>,
        date: NaiveDate,
    ) -> Vec<Signal> {
        let mut exits: Vec<Signal> = portfolio
            .positions
            .values()
            .filter(|p| p.quantity > 0)
            .filter_map(|p| {
                let price = *prices.get(&p.symbol)?;
                let ratio = p.unrealized_pnl_ratio(price);
                let stop = self.limits.stop_loss_ratio > 0.0
                    && ratio <= -self.limits.stop_loss_ratio;
                let take = self.limits.take_profit_ratio > 0.0
                    && ratio >= self.limits.take_profit_ratio;
                (stop || take).then(|| Signal::sell(p.symbol.clone(), date, Some(p.quantity)))
            })
            .collect();
        exits.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        exits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Fill, Side};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn buy(portfolio: &mut Portfolio, symbol: &str, quantity: i64, price: f64, day: u32) {
        portfolio
            .apply_fill(&Fill {
                order_id: 0,
                symbol: symbol.into(),
                side: Side::Buy,
                date: d(day),
                price,
                quantity,
                commission: 0.0,
                stamp_tax: 0.0,
                transfer_fee: 0.0,
            })
            .unwrap();
    }

    fn prices_of(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(s, p)| (s.to_string(), *p)).collect()
    }

    #[test]
    fn limits_default_are_valid() {
        assert!(RiskLimits::default().validate().is_ok());
    }

    #[test]
    fn negative_ratio_is_invalid() {
        let limits = RiskLimits {
            stop_loss_ratio: -0.1,
            ..RiskLimits::default()
        };
        assert!(matches!(
            limits.validate(),
            Err(QuantbackError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn ratio_above_one_is_invalid() {
        let limits = RiskLimits {
            max_position_ratio: 1.5,
            ..RiskLimits::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn buy_within_caps_is_approved() {
        let portfolio = Portfolio::new(1_000_000.0);
        let rm = RiskManager::new(RiskLimits::default(), 1_000_000.0);
        let prices = prices_of(&[("600519", 10.0)]);

        let auth = rm.authorize_buy("600519", 1000, 10.0, &portfolio, &prices);
        assert_eq!(auth, Authorization::Approved { quantity: 1000 });
    }

    #[test]
    fn oversized_buy_is_downsized_to_single_cap() {
        let portfolio = Portfolio::new(1_000_000.0);
        let rm = RiskManager::new(RiskLimits::default(), 1_000_000.0);
        let prices = prices_of(&[("600519", 10.0)]);

        // single-instrument cap: 20% of 1,000,000 = 200,000 → 20,000 shares
        let auth = rm.authorize_buy("600519", 50_000, 10.0, &portfolio, &prices);
        assert_eq!(auth, Authorization::Modified { quantity: 20_000 });
    }

    #[test]
    fn downsizing_respects_lot_multiples() {
        let portfolio = Portfolio::new(10_000.0);
        let limits = RiskLimits {
            max_single_ratio: 0.25,
            ..RiskLimits::default()
        };
        let rm = RiskManager::new(limits, 10_000.0);
        let prices = prices_of(&[("600519", 9.7)]);

        // headroom 2,500 / 9.7 ≈ 257 shares → 200 after lot rounding
        let auth = rm.authorize_buy("600519", 1000, 9.7, &portfolio, &prices);
        assert_eq!(auth, Authorization::Modified { quantity: 200 });
    }

    #[test]
    fn buy_rejected_when_single_cap_full() {
        let mut portfolio = Portfolio::new(1_000_000.0);
        buy(&mut portfolio, "600519", 20_000, 10.0, 14);
        let rm = RiskManager::new(RiskLimits::default(), 1_000_000.0);
        let prices = prices_of(&[("600519", 10.0)]);

        let auth = rm.authorize_buy("600519", 1000, 10.0, &portfolio, &prices);
        assert!(matches!(auth, Authorization::Rejected { .. }));
    }

    #[test]
    fn buy_rejected_when_total_cap_full() {
        let mut portfolio = Portfolio::new(1_000_000.0);
        for (i, symbol) in ["600519", "000001", "600036", "601318"].iter().enumerate() {
            buy(&mut portfolio, symbol, 20_000, 10.0, 14 + i as u32);
        }
        let limits = RiskLimits {
            max_position_ratio: 0.8,
            max_single_ratio: 0.5,
            ..RiskLimits::default()
        };
        let rm = RiskManager::new(limits, 1_000_000.0);
        let prices = prices_of(&[
            ("600519", 10.0),
            ("000001", 10.0),
            ("600036", 10.0),
            ("601318", 10.0),
            ("600900", 10.0),
        ]);

        // invested 800,000 of 1,000,000 equity — at the 80% cap
        let auth = rm.authorize_buy("600900", 1000, 10.0, &portfolio, &prices);
        assert!(matches!(auth, Authorization::Rejected { .. }));
    }

    #[test]
    fn drawdown_halt_rejects_buys() {
        let portfolio = Portfolio::new(800_000.0);
        let mut rm = RiskManager::new(RiskLimits::default(), 1_000_000.0);
        rm.update_peak(1_000_000.0);
        let prices = prices_of(&[("600519", 10.0)]);

        // equity 800,000 against a 1,000,000 peak: 20% drawdown > 15% cap
        let auth = rm.authorize_buy("600519", 100, 10.0, &portfolio, &prices);
        match auth {
            Authorization::Rejected { reason } => assert!(reason.contains("drawdown")),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn drawdown_recovery_lifts_halt() {
        let portfolio = Portfolio::new(950_000.0);
        let mut rm = RiskManager::new(RiskLimits::default(), 1_000_000.0);
        rm.update_peak(1_000_000.0);
        let prices = prices_of(&[("600519", 10.0)]);

        // 5% drawdown is under the 15% cap
        let auth = rm.authorize_buy("600519", 100, 10.0, &portfolio, &prices);
        assert_eq!(auth, Authorization::Approved { quantity: 100 });
    }

    #[test]
    fn sell_without_position_rejected() {
        let portfolio = Portfolio::new(1_000_000.0);
        let rm = RiskManager::new(RiskLimits::default(), 1_000_000.0);

        let auth = rm.authorize_sell("600519", 100, &portfolio, d(15));
        assert!(matches!(auth, Authorization::Rejected { .. }));
    }

    #[test]
    fn sell_fully_locked_rejected() {
        let mut portfolio = Portfolio::new(1_000_000.0);
        buy(&mut portfolio, "600519", 1000, 10.0, 15);
        let rm = RiskManager::new(RiskLimits::default(), 1_000_000.0);

        let auth = rm.authorize_sell("600519", 1000, &portfolio, d(15));
        match auth {
            Authorization::Rejected { reason } => assert!(reason.contains("T+1")),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn sell_capped_to_unlocked() {
        let mut portfolio = Portfolio::new(1_000_000.0);
        buy(&mut portfolio, "600519", 1000, 10.0, 14);
        buy(&mut portfolio, "600519", 500, 10.0, 15);
        let rm = RiskManager::new(RiskLimits::default(), 1_000_000.0);

        let auth = rm.authorize_sell("600519", 1500, &portfolio, d(15));
        assert_eq!(auth, Authorization::Modified { quantity: 1000 });
    }

    #[test]
    fn stop_loss_exit_at_threshold() {
        let mut portfolio = Portfolio::new(1_000_000.0);
        buy(&mut portfolio, "600519", 1000, 10.0, 14);
        let rm = RiskManager::new(RiskLimits::default(), 1_000_000.0);

        // 8% loss: 10.00 → 9.20 crosses stop_loss_ratio = 0.08
        let exits = rm.protective_exits(&portfolio, &prices_of(&[("600519", 9.2)]), d(15));
        assert_eq!(exits.len(), 1);
        assert!(exits[0].is_sell());
        assert_eq!(exits[0].quantity, Some(1000));
    }

    #[test]
    fn no_exit_above_stop_threshold() {
        let mut portfolio = Portfolio::new(1_000_000.0);
        buy(&mut portfolio, "600519", 1000, 10.0, 14);
        let rm = RiskManager::new(RiskLimits::default(), 1_000_000.0);

        let exits = rm.protective_exits(&portfolio, &prices_of(&[("600519", 9.21)]), d(15));
        assert!(exits.is_empty());
    }

    #[test]
    fn take_profit_exit_at_threshold() {
        let mut portfolio = Portfolio::new(1_000_000.0);
        buy(&mut portfolio, "600519", 1000, 10.0, 14);
        let rm = RiskManager::new(RiskLimits::default(), 1_000_000.0);

        let exits = rm.protective_exits(&portfolio, &prices_of(&[("600519", 11.5)]), d(15));
        assert_eq!(exits.len(), 1);
    }

    #[test]
    fn disabled_thresholds_never_fire() {
        let mut portfolio = Portfolio::new(1_000_000.0);
        buy(&mut portfolio, "600519", 1000, 10.0, 14);
        let limits = RiskLimits {
            stop_loss_ratio: 0.0,
            take_profit_ratio: 0.0,
            ..RiskLimits::default()
        };
        let rm = RiskManager::new(limits, 1_000_000.0);

        let exits = rm.protective_exits(&portfolio, &prices_of(&[("600519", 1.0)]), d(15));
        assert!(exits.is_empty());
    }

    #[test]
    fn drawdown_tracks_peak() {
        let mut rm = RiskManager::new(RiskLimits::default(), 1_000_000.0);
        rm.update_peak(1_100_000.0);
        rm.update_peak(900_000.0); // below peak, ignored

        assert!((rm.drawdown(950_000.0) - (150_000.0 / 1_100_000.0)).abs() < 1e-12);
        assert!((rm.drawdown(1_200_000.0) - 0.0).abs() < f64::EPSILON);
    }
}

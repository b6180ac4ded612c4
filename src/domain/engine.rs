//! Event-driven replay loop.
//!
//! The engine steps through the unified date timeline. Each step:
//! match resting orders, synthesize protective exits, ask the strategy
//! for signals over trailing windows, authorize and submit orders,
//! apply fills, then mark equity. Strategies only ever see bars up to
//! the current date.

use chrono::NaiveDate;
use std::collections::HashMap;

use super::bar::Bar;
use super::error::QuantbackError;
use super::fees::FeeSchedule;
use super::metrics::Metrics;
use super::order::{OrderStatus, OrderType, Side, LOT_SIZE};
use super::order_manager::{MatchOutcome, OrderManager};
use super::portfolio::{EquityPoint, Portfolio};
use super::position::Trade;
use super::risk::{Authorization, RiskLimits, RiskManager};
use super::signal::{Signal, SignalKind};
use super::strategy::Strategy;
use super::timeline::{build_timeline, InstrumentSeries};

/// Which price a market order references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPolicy {
    /// Fill on the signal bar at its close.
    CurrentClose,
    /// Rest until the next bar and fill at its open.
    NextOpen,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub fees: FeeSchedule,
    pub limits: RiskLimits,
    pub fill_policy: FillPolicy,
    pub risk_free_rate: f64,
    pub var_confidence: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 1_000_000.0,
            fees: FeeSchedule::default(),
            limits: RiskLimits::default(),
            fill_policy: FillPolicy::CurrentClose,
            risk_free_rate: 0.03,
            var_confidence: 0.95,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), QuantbackError> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(QuantbackError::ConfigInvalid {
                section: "backtest".to_string(),
                key: "initial_capital".to_string(),
                reason: format!("must be positive, got {}", self.initial_capital),
            });
        }
        if !self.var_confidence.is_finite()
            || self.var_confidence <= 0.0
            || self.var_confidence >= 1.0
        {
            return Err(QuantbackError::ConfigInvalid {
                section: "backtest".to_string(),
                key: "var_confidence".to_string(),
                reason: format!("must be in (0, 1), got {}", self.var_confidence),
            });
        }
        if !self.risk_free_rate.is_finite() || self.risk_free_rate < 0.0 {
            return Err(QuantbackError::ConfigInvalid {
                section: "backtest".to_string(),
                key: "risk_free_rate".to_string(),
                reason: format!("must be non-negative, got {}", self.risk_free_rate),
            });
        }
        let rates = [
            ("commission_rate", self.fees.commission_rate),
            ("min_commission", self.fees.min_commission),
            ("stamp_tax_rate", self.fees.stamp_tax_rate),
            ("transfer_fee_rate", self.fees.transfer_fee_rate),
            ("slippage_rate", self.fees.slippage_rate),
        ];
        for (key, value) in rates {
            if !value.is_finite() || value < 0.0 {
                return Err(QuantbackError::ConfigInvalid {
                    section: "fees".to_string(),
                    key: key.to_string(),
                    reason: format!("must be non-negative, got {}", value),
                });
            }
        }
        self.limits.validate()
    }
}

/// A signal that produced no order, with the veto reason.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSignal {
    pub signal: Signal,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub strategy: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub final_equity: f64,
    pub metrics: Metrics,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub skipped: Vec<SkippedSignal>,
    pub orders_filled: usize,
    pub orders_cancelled: usize,
    pub orders_rejected: usize,
}

pub struct BacktestEngine {
    config: BacktestConfig,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig) -> Result<Self, QuantbackError> {
        config.validate()?;
        Ok(BacktestEngine { config })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn run(
        &self,
        strategy: &mut dyn Strategy,
        mut series: Vec<InstrumentSeries>,
    ) -> Result<BacktestReport, QuantbackError> {
        if series.is_empty() {
            return Err(QuantbackError::Data {
                reason: "no instrument series to replay".to_string(),
            });
        }
        series.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        for s in &series {
            if s.bar_count() < strategy.warmup_bars() {
                return Err(QuantbackError::InsufficientData {
                    symbol: s.symbol.clone(),
                    bars: s.bar_count(),
                    minimum: strategy.warmup_bars(),
                });
            }
        }

        let timeline = build_timeline(&series);
        let mut portfolio = Portfolio::new(self.config.initial_capital);
        let mut order_manager = OrderManager::new();
        let mut risk = RiskManager::new(self.config.limits.clone(), self.config.initial_capital);
        let mut prices: HashMap<String, f64> = HashMap::new();
        let mut skipped: Vec<SkippedSignal> = Vec::new();

        for &date in &timeline {
            let todays_bars: HashMap<&str, &Bar> = series
                .iter()
                .filter_map(|s| s.bar_at(date).map(|b| (s.symbol.as_str(), b)))
                .collect();
            for bar in todays_bars.values() {
                prices.insert(bar.symbol.clone(), bar.close);
            }

            // resting orders from earlier steps match first
            for id in order_manager.open_order_ids() {
                let (symbol, side, quantity) = match order_manager.order(id) {
                    Some(o) => (o.symbol.clone(), o.side, o.remaining_quantity()),
                    None => continue,
                };
                let Some(bar) = todays_bars.get(symbol.as_str()).copied() else {
                    continue;
                };
                let reference = match self.config.fill_policy {
                    FillPolicy::CurrentClose => bar.close,
                    FillPolicy::NextOpen => bar.open,
                };
                match order_manager.try_match(id, bar, reference, &portfolio, &self.config.fees) {
                    MatchOutcome::Filled(fill) => portfolio.apply_fill(&fill)?,
                    MatchOutcome::Rejected(reason) => {
                        let signal = match side {
                            Side::Buy => Signal::buy(symbol, date, Some(quantity)),
                            Side::Sell => Signal::sell(symbol, date, Some(quantity)),
                        };
                        skipped.push(SkippedSignal {
                            signal,
                            reason: reason.to_string(),
                        });
                    }
                    MatchOutcome::Resting => {}
                }
            }

            let mut signals = risk.protective_exits(&portfolio, &prices, date);
            for s in &series {
                if s.bar_at(date).is_none() {
                    continue;
                }
                let window = s.window_to(date);
                if window.len() < strategy.warmup_bars() {
                    continue;
                }
                signals.extend(
                    strategy
                        .generate_signals(window)
                        .into_iter()
                        .filter(|sig| sig.date == date && sig.symbol == s.symbol),
                );
            }

            for signal in signals {
                let Some(bar) = todays_bars.get(signal.symbol.as_str()).copied() else {
                    skipped.push(SkippedSignal {
                        reason: format!("no bar for {} on {}", signal.symbol, date),
                        signal,
                    });
                    continue;
                };
                self.process_signal(
                    signal,
                    bar,
                    date,
                    &mut portfolio,
                    &mut order_manager,
                    &risk,
                    &prices,
                    &mut skipped,
                )?;
            }

            portfolio.record_equity(date, &prices);
            let equity = portfolio
                .equity_curve
                .last()
                .map(|p| p.equity)
                .unwrap_or(self.config.initial_capital);
            risk.update_peak(equity);
        }

        order_manager.cancel_all_open();

        let metrics = Metrics::compute(
            &portfolio,
            self.config.risk_free_rate,
            self.config.var_confidence,
        );
        let (orders_filled, orders_cancelled, orders_rejected) = order_manager.status_counts();
        let final_equity = portfolio
            .equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.config.initial_capital);

        Ok(BacktestReport {
            strategy: strategy.name().to_string(),
            start: timeline.first().copied(),
            end: timeline.last().copied(),
            final_equity,
            metrics,
            equity_curve: portfolio.equity_curve,
            trades: portfolio.trades,
            skipped,
            orders_filled,
            orders_cancelled,
            orders_rejected,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn process_signal(
        &self,
        signal: Signal,
        bar: &Bar,
        date: NaiveDate,
        portfolio: &mut Portfolio,
        order_manager: &mut OrderManager,
        risk: &RiskManager,
        prices: &HashMap<String, f64>,
        skipped: &mut Vec<SkippedSignal>,
    ) -> Result<(), QuantbackError> {
        let (side, requested) = match signal.kind {
            SignalKind::Hold => return Ok(()),
            SignalKind::Buy => {
                let requested = signal
                    .quantity
                    .unwrap_or_else(|| self.affordable_quantity(portfolio.cash, bar.close));
                (Side::Buy, requested)
            }
            SignalKind::Sell => {
                let requested = signal
                    .quantity
                    .unwrap_or_else(|| portfolio.position_quantity(&signal.symbol));
                (Side::Sell, requested)
            }
            SignalKind::TargetWeight(weight) => {
                if !(0.0..=1.0).contains(&weight) {
                    skipped.push(SkippedSignal {
                        reason: format!("target weight {} outside [0, 1]", weight),
                        signal,
                    });
                    return Ok(());
                }
                let equity = portfolio.mark_to_market(prices);
                let held = portfolio.position_quantity(&signal.symbol);
                let desired = ((weight * equity / bar.close) as i64 / LOT_SIZE) * LOT_SIZE;
                let delta = desired - held;
                if delta >= LOT_SIZE {
                    (Side::Buy, delta)
                } else if delta <= -LOT_SIZE {
                    (Side::Sell, -delta)
                } else {
                    // already within one lot of the target
                    return Ok(());
                }
            }
        };

        let authorization = match side {
            Side::Buy => risk.authorize_buy(&signal.symbol, requested, bar.close, portfolio, prices),
            Side::Sell => risk.authorize_sell(&signal.symbol, requested, portfolio, date),
        };
        let quantity = match authorization {
            Authorization::Approved { quantity } | Authorization::Modified { quantity } => quantity,
            Authorization::Rejected { reason } => {
                skipped.push(SkippedSignal { signal, reason });
                return Ok(());
            }
        };

        let id =
            order_manager.create_and_submit(&signal.symbol, side, OrderType::Market, quantity, date);
        if let Some(reason) = order_manager
            .order(id)
            .filter(|o| o.status == OrderStatus::Rejected)
            .and_then(|o| o.reject_reason.clone())
        {
            skipped.push(SkippedSignal {
                signal,
                reason: reason.to_string(),
            });
            return Ok(());
        }

        match self.config.fill_policy {
            FillPolicy::NextOpen => Ok(()), // rests until the next bar
            FillPolicy::CurrentClose => {
                match order_manager.try_match(id, bar, bar.close, portfolio, &self.config.fees) {
                    MatchOutcome::Filled(fill) => portfolio.apply_fill(&fill),
                    MatchOutcome::Rejected(reason) => {
                        skipped.push(SkippedSignal {
                            signal,
                            reason: reason.to_string(),
                        });
                        Ok(())
                    }
                    MatchOutcome::Resting => Ok(()),
                }
            }
        }
    }

    /// Largest lot multiple the current cash can pay for at `price`,
    /// leaving room for slippage and per-trade costs.
    fn affordable_quantity(&self, cash: f64, price: f64) -> i64 {
        let fees = &self.config.fees;
        let gross = fees.buy_price(price);
        let per_share = gross * (1.0 + fees.commission_rate + fees.transfer_fee_rate);
        let budget = (cash - fees.min_commission).max(0.0);
        ((budget / per_share) as i64 / LOT_SIZE) * LOT_SIZE
    }
}

//! Risk-adjusted performance metrics over the equity curve and the
//! realized trade ledger.
//!
//! `Metrics::compute` is a pure function of the portfolio; calling it
//! twice on the same inputs yields identical results.

use super::order::Side;
use super::portfolio::{EquityPoint, Portfolio};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    /// Annualized standard deviation of daily returns.
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Annualized return over max drawdown; `f64::INFINITY` when the
    /// curve never draws down.
    pub calmar_ratio: f64,
    pub max_drawdown: f64,
    /// Longest stretch of sessions spent below a prior equity peak.
    pub max_drawdown_duration: i64,
    /// Empirical daily-return quantile at (1 - confidence).
    pub value_at_risk: f64,
    /// Mean of daily returns at or below the VaR quantile.
    pub conditional_var: f64,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
}

impl Metrics {
    pub fn compute(portfolio: &Portfolio, risk_free_rate: f64, var_confidence: f64) -> Self {
        let equity_curve = &portfolio.equity_curve;
        let initial_capital = portfolio.initial_capital;

        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };

        let trading_days = equity_curve.len() as f64;
        let years = trading_days / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);

        let returns = daily_returns(equity_curve);
        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let (volatility, sharpe_ratio, sortino_ratio) = compute_risk_adjusted(&returns, daily_rf);
        let (value_at_risk, conditional_var) = compute_tail_risk(&returns, var_confidence);

        let calmar_ratio = if max_drawdown > 0.0 {
            annualized_return / max_drawdown
        } else if annualized_return > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let trade_stats = TradeStats::from_portfolio(portfolio);

        Metrics {
            total_return,
            annualized_return,
            volatility,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            max_drawdown,
            max_drawdown_duration,
            value_at_risk,
            conditional_var,
            trades_won: trade_stats.won,
            trades_lost: trade_stats.lost,
            trades_breakeven: trade_stats.breakeven,
            win_rate: trade_stats.win_rate,
            profit_factor: trade_stats.profit_factor,
            avg_win: trade_stats.avg_win,
            avg_loss: trade_stats.avg_loss,
            largest_win: trade_stats.largest_win,
            largest_loss: trade_stats.largest_loss,
        }
    }
}

fn daily_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| {
            if w[0].equity > 0.0 {
                (w[1].equity - w[0].equity) / w[0].equity
            } else {
                0.0
            }
        })
        .collect()
}

fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, i64) {
    if equity_curve.is_empty() {
        return (0.0, 0);
    }

    let mut peak = equity_curve[0].equity;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for point in equity_curve {
        // equal to the peak counts as recovered, not in drawdown
        if point.equity >= peak {
            peak = point.equity;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - point.equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            current_dd_duration += 1;
            if current_dd_duration > max_dd_duration {
                max_dd_duration = current_dd_duration;
            }
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(returns: &[f64], daily_rf: f64) -> (f64, f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let volatility = stddev * TRADING_DAYS_PER_YEAR.sqrt();

    let excess = mean - daily_rf;
    let sharpe = if stddev > 0.0 {
        (excess / stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside_sq: f64 = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum();
    let downside_stddev = (downside_sq / n).sqrt();
    let sortino = if downside_stddev > 0.0 {
        (excess / downside_stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (volatility, sharpe, sortino)
}

fn compute_tail_risk(returns: &[f64], confidence: f64) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }

    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let tail = 1.0 - confidence;
    let rank = ((tail * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
    let var = sorted[rank - 1];

    let shortfall: Vec<f64> = sorted.iter().copied().filter(|&r| r <= var).collect();
    let cvar = shortfall.iter().sum::<f64>() / shortfall.len() as f64;

    (var, cvar)
}

struct TradeStats {
    won: usize,
    lost: usize,
    breakeven: usize,
    win_rate: f64,
    profit_factor: f64,
    avg_win: f64,
    avg_loss: f64,
    largest_win: f64,
    largest_loss: f64,
}

impl TradeStats {
    /// Realized P&L lives on sell-side trades; buys only open exposure.
    fn from_portfolio(portfolio: &Portfolio) -> Self {
        let mut won = 0usize;
        let mut lost = 0usize;
        let mut breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;

        for trade in &portfolio.trades {
            if trade.side != Side::Sell {
                continue;
            }
            let Some(pnl) = trade.realized_pnl else {
                continue;
            };
            if pnl > 0.0 {
                won += 1;
                total_wins += pnl;
                if pnl > largest_win {
                    largest_win = pnl;
                }
            } else if pnl < 0.0 {
                lost += 1;
                total_losses += pnl.abs();
                if pnl.abs() > largest_loss {
                    largest_loss = pnl.abs();
                }
            } else {
                breakeven += 1;
            }
        }

        let total = won + lost + breakeven;
        let win_rate = if total > 0 {
            won as f64 / total as f64
        } else {
            0.0
        };
        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        TradeStats {
            won,
            lost,
            breakeven,
            win_rate,
            profit_factor,
            avg_win: if won > 0 { total_wins / won as f64 } else { 0.0 },
            avg_loss: if lost > 0 { total_losses / lost as f64 } else { 0.0 },
            largest_win,
            largest_loss,
        }
    }
}

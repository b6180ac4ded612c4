//! Strategy contract and the bundled signal generators.
//!
//! A strategy sees one instrument's trailing window per step, ending at
//! the current bar, and returns signals dated to that bar. Sizing is
//! left to the engine; strategies emit direction only.

use super::bar::Bar;
use super::error::QuantbackError;
use super::indicator::{macd, rsi, sma};
use super::signal::Signal;

pub trait Strategy {
    fn generate_signals(&mut self, window: &[Bar]) -> Vec<Signal>;
    fn name(&self) -> &str;
    /// Bars needed before the strategy can emit its first signal.
    fn warmup_bars(&self) -> usize;
}

fn closes(window: &[Bar]) -> Vec<f64> {
    window.iter().map(|b| b.close).collect()
}

/// Golden/death cross of a fast and slow simple moving average.
///
/// A Buy fires on the bar where the fast average moves from at-or-below
/// the slow average to above it; a Sell on the opposite crossing.
#[derive(Debug, Clone)]
pub struct MaCrossoverStrategy {
    fast: usize,
    slow: usize,
    name: String,
}

impl MaCrossoverStrategy {
    pub fn new(fast: usize, slow: usize) -> Result<Self, QuantbackError> {
        if fast == 0 || slow == 0 {
            return Err(QuantbackError::ConfigInvalid {
                section: "strategy".to_string(),
                key: "ma_periods".to_string(),
                reason: "moving average periods must be positive".to_string(),
            });
        }
        if fast >= slow {
            return Err(QuantbackError::ConfigInvalid {
                section: "strategy".to_string(),
                key: "ma_periods".to_string(),
                reason: format!("fast period {} must be shorter than slow period {}", fast, slow),
            });
        }
        Ok(MaCrossoverStrategy {
            fast,
            slow,
            name: format!("ma_crossover({},{})", fast, slow),
        })
    }
}

impl Strategy for MaCrossoverStrategy {
    fn generate_signals(&mut self, window: &[Bar]) -> Vec<Signal> {
        if window.len() < self.slow + 1 {
            return Vec::new();
        }
        let closes = closes(window);
        let prev = &closes[..closes.len() - 1];

        let (Some(fast_now), Some(slow_now), Some(fast_prev), Some(slow_prev)) = (
            sma(&closes, self.fast),
            sma(&closes, self.slow),
            sma(prev, self.fast),
            sma(prev, self.slow),
        ) else {
            return Vec::new();
        };

        let bar = &window[window.len() - 1];
        if fast_prev <= slow_prev && fast_now > slow_now {
            vec![Signal::buy(bar.symbol.clone(), bar.date, None)]
        } else if fast_prev >= slow_prev && fast_now < slow_now {
            vec![Signal::sell(bar.symbol.clone(), bar.date, None)]
        } else {
            Vec::new()
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn warmup_bars(&self) -> usize {
        self.slow + 1
    }
}

/// MACD momentum: a fast/slow EMA difference tracked against its own
/// signal-line EMA. Buy fires on the bar where the MACD line crosses
/// above the signal line, Sell on the crossing below.
#[derive(Debug, Clone)]
pub struct MacdStrategy {
    fast: usize,
    slow: usize,
    signal: usize,
    name: String,
}

impl MacdStrategy {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Result<Self, QuantbackError> {
        if fast == 0 || slow == 0 || signal == 0 {
            return Err(QuantbackError::ConfigInvalid {
                section: "strategy".to_string(),
                key: "macd_periods".to_string(),
                reason: "MACD periods must be positive".to_string(),
            });
        }
        if fast >= slow {
            return Err(QuantbackError::ConfigInvalid {
                section: "strategy".to_string(),
                key: "macd_periods".to_string(),
                reason: format!("fast period {} must be shorter than slow period {}", fast, slow),
            });
        }
        Ok(MacdStrategy {
            fast,
            slow,
            signal,
            name: format!("macd({},{},{})", fast, slow, signal),
        })
    }
}

impl Strategy for MacdStrategy {
    fn generate_signals(&mut self, window: &[Bar]) -> Vec<Signal> {
        if window.len() < self.warmup_bars() {
            return Vec::new();
        }
        let closes = closes(window);
        let prev = &closes[..closes.len() - 1];

        let (Some((line_now, signal_now)), Some((line_prev, signal_prev))) = (
            macd(&closes, self.fast, self.slow, self.signal),
            macd(prev, self.fast, self.slow, self.signal),
        ) else {
            return Vec::new();
        };

        let bar = &window[window.len() - 1];
        if line_prev <= signal_prev && line_now > signal_now {
            vec![Signal::buy(bar.symbol.clone(), bar.date, None)]
        } else if line_prev >= signal_prev && line_now < signal_now {
            vec![Signal::sell(bar.symbol.clone(), bar.date, None)]
        } else {
            Vec::new()
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn warmup_bars(&self) -> usize {
        self.slow + self.signal + 1
    }
}

/// RSI mean reversion: Buy on a drop into oversold territory, Sell on a
/// rise into overbought territory. Signals fire on the crossing bar
/// only, not every bar spent past the threshold.
#[derive(Debug, Clone)]
pub struct RsiStrategy {
    period: usize,
    oversold: f64,
    overbought: f64,
    name: String,
}

impl RsiStrategy {
    pub fn new(period: usize, oversold: f64, overbought: f64) -> Result<Self, QuantbackError> {
        if period == 0 {
            return Err(QuantbackError::ConfigInvalid {
                section: "strategy".to_string(),
                key: "rsi_period".to_string(),
                reason: "RSI period must be positive".to_string(),
            });
        }
        if !(0.0..=100.0).contains(&oversold)
            || !(0.0..=100.0).contains(&overbought)
            || oversold >= overbought
        {
            return Err(QuantbackError::ConfigInvalid {
                section: "strategy".to_string(),
                key: "rsi_thresholds".to_string(),
                reason: format!(
                    "thresholds must satisfy 0 <= oversold ({}) < overbought ({}) <= 100",
                    oversold, overbought
                ),
            });
        }
        Ok(RsiStrategy {
            period,
            oversold,
            overbought,
            name: format!("rsi({},{},{})", period, oversold, overbought),
        })
    }
}

impl Strategy for RsiStrategy {
    fn generate_signals(&mut self, window: &[Bar]) -> Vec<Signal> {
        if window.len() < self.period + 2 {
            return Vec::new();
        }
        let closes = closes(window);
        let prev = &closes[..closes.len() - 1];

        let (Some(now), Some(before)) = (rsi(&closes, self.period), rsi(prev, self.period)) else {
            return Vec::new();
        };

        let bar = &window[window.len() - 1];
        if before >= self.oversold && now < self.oversold {
            vec![Signal::buy(bar.symbol.clone(), bar.date, None)]
        } else if before <= self.overbought && now > self.overbought {
            vec![Signal::sell(bar.symbol.clone(), bar.date, None)]
        } else {
            Vec::new()
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn warmup_bars(&self) -> usize {
        self.period + 2
    }
}

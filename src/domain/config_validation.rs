//! Configuration loading and validation.
//!
//! Every field is checked before the first simulation step; a bad
//! value fails the whole run with a `ConfigInvalid`/`ConfigMissing`
//! rather than surfacing mid-replay.

use crate::domain::engine::{BacktestConfig, FillPolicy};
use crate::domain::error::QuantbackError;
use crate::domain::fees::FeeSchedule;
use crate::domain::risk::RiskLimits;
use crate::domain::strategy::{MaCrossoverStrategy, MacdStrategy, RsiStrategy, Strategy};
use crate::ports::config_port::ConfigPort;

/// Load and validate the full engine configuration. Absent keys take
/// the documented defaults; present keys must parse and pass range
/// checks.
pub fn load_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, QuantbackError> {
    let defaults = BacktestConfig::default();
    let default_fees = FeeSchedule::default();
    let default_limits = RiskLimits::default();

    let loaded = BacktestConfig {
        initial_capital: config.get_double(
            "backtest",
            "initial_capital",
            defaults.initial_capital,
        ),
        fill_policy: load_fill_policy(config)?,
        risk_free_rate: config.get_double("backtest", "risk_free_rate", defaults.risk_free_rate),
        var_confidence: config.get_double("backtest", "var_confidence", defaults.var_confidence),
        fees: FeeSchedule {
            commission_rate: config.get_double(
                "fees",
                "commission_rate",
                default_fees.commission_rate,
            ),
            min_commission: config.get_double(
                "fees",
                "min_commission",
                default_fees.min_commission,
            ),
            stamp_tax_rate: config.get_double(
                "fees",
                "stamp_tax_rate",
                default_fees.stamp_tax_rate,
            ),
            transfer_fee_rate: config.get_double(
                "fees",
                "transfer_fee_rate",
                default_fees.transfer_fee_rate,
            ),
            slippage_rate: config.get_double("fees", "slippage_rate", default_fees.slippage_rate),
        },
        limits: RiskLimits {
            max_position_ratio: config.get_double(
                "risk",
                "max_position_ratio",
                default_limits.max_position_ratio,
            ),
            max_single_ratio: config.get_double(
                "risk",
                "max_single_ratio",
                default_limits.max_single_ratio,
            ),
            stop_loss_ratio: config.get_double(
                "risk",
                "stop_loss_ratio",
                default_limits.stop_loss_ratio,
            ),
            take_profit_ratio: config.get_double(
                "risk",
                "take_profit_ratio",
                default_limits.take_profit_ratio,
            ),
            max_drawdown_ratio: config.get_double(
                "risk",
                "max_drawdown_ratio",
                default_limits.max_drawdown_ratio,
            ),
        },
    };

    loaded.validate()?;
    Ok(loaded)
}

fn load_fill_policy(config: &dyn ConfigPort) -> Result<FillPolicy, QuantbackError> {
    match config.get_string("backtest", "fill_policy").as_deref() {
        None | Some("current_close") => Ok(FillPolicy::CurrentClose),
        Some("next_open") => Ok(FillPolicy::NextOpen),
        Some(other) => Err(QuantbackError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "fill_policy".to_string(),
            reason: format!(
                "unknown fill policy '{}', expected current_close or next_open",
                other
            ),
        }),
    }
}

/// Build the configured strategy from the `[strategy]` section.
pub fn load_strategy(config: &dyn ConfigPort) -> Result<Box<dyn Strategy>, QuantbackError> {
    let name = config
        .get_string("strategy", "name")
        .ok_or_else(|| QuantbackError::ConfigMissing {
            section: "strategy".to_string(),
            key: "name".to_string(),
        })?;

    match name.as_str() {
        "ma_crossover" => {
            let fast = config.get_int("strategy", "fast_period", 5);
            let slow = config.get_int("strategy", "slow_period", 20);
            let strategy = MaCrossoverStrategy::new(fast.max(0) as usize, slow.max(0) as usize)?;
            Ok(Box::new(strategy))
        }
        "macd" => {
            let fast = config.get_int("strategy", "fast_period", 12);
            let slow = config.get_int("strategy", "slow_period", 26);
            let signal = config.get_int("strategy", "signal_period", 9);
            let strategy = MacdStrategy::new(
                fast.max(0) as usize,
                slow.max(0) as usize,
                signal.max(0) as usize,
            )?;
            Ok(Box::new(strategy))
        }
        "rsi" => {
            let period = config.get_int("strategy", "rsi_period", 14);
            let oversold = config.get_double("strategy", "oversold", 30.0);
            let overbought = config.get_double("strategy", "overbought", 70.0);
            let strategy = RsiStrategy::new(period.max(0) as usize, oversold, overbought)?;
            Ok(Box::new(strategy))
        }
        other => Err(QuantbackError::ConfigInvalid {
            section: "strategy".to_string(),
            key: "name".to_string(),
            reason: format!(
                "unknown strategy '{}', expected ma_crossover, macd, or rsi",
                other
            ),
        }),
    }
}

/// Settings for locating the bar feed: data directory and symbol list.
pub fn load_data_settings(config: &dyn ConfigPort) -> Result<(String, Vec<String>), QuantbackError> {
    let dir = config
        .get_string("data", "dir")
        .ok_or_else(|| QuantbackError::ConfigMissing {
            section: "data".to_string(),
            key: "dir".to_string(),
        })?;

    let symbols: Vec<String> = config
        .get_string("data", "symbols")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if symbols.is_empty() {
        return Err(QuantbackError::ConfigMissing {
            section: "data".to_string(),
            key: "symbols".to_string(),
        });
    }

    Ok((dir, symbols))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StubConfig {
        values: HashMap<(String, String), String>,
    }

    impl StubConfig {
        fn new(pairs: &[(&str, &str, &str)]) -> Self {
            StubConfig {
                values: pairs
                    .iter()
                    .map(|&(s, k, v)| ((s.to_string(), k.to_string()), v.to_string()))
                    .collect(),
            }
        }
    }

    impl ConfigPort for StubConfig {
        fn get_string(&self, section: &str, key: &str) -> Option<String> {
            self.values
                .get(&(section.to_string(), key.to_string()))
                .cloned()
        }

        fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
            self.get_string(section, key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
            self.get_string(section, key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
            self.get_string(section, key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }
    }

    #[test]
    fn empty_config_loads_defaults() {
        let config = StubConfig::new(&[]);
        let loaded = load_backtest_config(&config).unwrap();
        assert_eq!(loaded, BacktestConfig::default());
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = StubConfig::new(&[
            ("backtest", "initial_capital", "500000"),
            ("backtest", "fill_policy", "next_open"),
            ("fees", "commission_rate", "0.0005"),
            ("risk", "stop_loss_ratio", "0.1"),
        ]);
        let loaded = load_backtest_config(&config).unwrap();
        assert!((loaded.initial_capital - 500_000.0).abs() < f64::EPSILON);
        assert_eq!(loaded.fill_policy, FillPolicy::NextOpen);
        assert!((loaded.fees.commission_rate - 0.0005).abs() < f64::EPSILON);
        assert!((loaded.limits.stop_loss_ratio - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn negative_capital_fails_validation() {
        let config = StubConfig::new(&[("backtest", "initial_capital", "-1")]);
        assert!(matches!(
            load_backtest_config(&config),
            Err(QuantbackError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn ratio_out_of_range_fails_validation() {
        let config = StubConfig::new(&[("risk", "max_single_ratio", "1.5")]);
        assert!(load_backtest_config(&config).is_err());
    }

    #[test]
    fn unknown_fill_policy_is_invalid() {
        let config = StubConfig::new(&[("backtest", "fill_policy", "vwap")]);
        match load_backtest_config(&config) {
            Err(QuantbackError::ConfigInvalid { key, .. }) => assert_eq!(key, "fill_policy"),
            other => panic!("expected ConfigInvalid, got {:?}", other),
        }
    }

    #[test]
    fn strategy_requires_a_name() {
        let config = StubConfig::new(&[]);
        assert!(matches!(
            load_strategy(&config),
            Err(QuantbackError::ConfigMissing { .. })
        ));
    }

    #[test]
    fn ma_crossover_with_defaults() {
        let config = StubConfig::new(&[("strategy", "name", "ma_crossover")]);
        let strategy = load_strategy(&config).unwrap();
        assert_eq!(strategy.name(), "ma_crossover(5,20)");
    }

    #[test]
    fn macd_with_defaults() {
        let config = StubConfig::new(&[("strategy", "name", "macd")]);
        let strategy = load_strategy(&config).unwrap();
        assert_eq!(strategy.name(), "macd(12,26,9)");
    }

    #[test]
    fn macd_with_custom_periods() {
        let config = StubConfig::new(&[
            ("strategy", "name", "macd"),
            ("strategy", "fast_period", "8"),
            ("strategy", "slow_period", "17"),
            ("strategy", "signal_period", "5"),
        ]);
        let strategy = load_strategy(&config).unwrap();
        assert_eq!(strategy.name(), "macd(8,17,5)");
    }

    #[test]
    fn rsi_with_custom_thresholds() {
        let config = StubConfig::new(&[
            ("strategy", "name", "rsi"),
            ("strategy", "rsi_period", "7"),
            ("strategy", "oversold", "25"),
            ("strategy", "overbought", "75"),
        ]);
        let strategy = load_strategy(&config).unwrap();
        assert_eq!(strategy.name(), "rsi(7,25,75)");
    }

    #[test]
    fn unknown_strategy_is_invalid() {
        let config = StubConfig::new(&[("strategy", "name", "turtle")]);
        assert!(load_strategy(&config).is_err());
    }

    #[test]
    fn bad_strategy_parameters_propagate() {
        let config = StubConfig::new(&[
            ("strategy", "name", "ma_crossover"),
            ("strategy", "fast_period", "30"),
            ("strategy", "slow_period", "10"),
        ]);
        assert!(load_strategy(&config).is_err());
    }

    #[test]
    fn data_settings_parse_symbol_list() {
        let config = StubConfig::new(&[
            ("data", "dir", "/var/bars"),
            ("data", "symbols", "600519, 000001 ,600036"),
        ]);
        let (dir, symbols) = load_data_settings(&config).unwrap();
        assert_eq!(dir, "/var/bars");
        assert_eq!(symbols, vec!["600519", "000001", "600036"]);
    }

    #[test]
    fn data_settings_require_symbols() {
        let config = StubConfig::new(&[("data", "dir", "/var/bars")]);
        assert!(matches!(
            load_data_settings(&config),
            Err(QuantbackError::ConfigMissing { .. })
        ));
    }
}

//! Fee schedule and slippage for simulated fills.
//!
//! Defaults follow the A-share convention: commission 3/10000 of
//! notional with a 5.0 minimum per trade, stamp tax 1/1000 on sells
//! only, transfer fee 2/100000 on both sides.

#[derive(Debug, Clone, PartialEq)]
pub struct FeeSchedule {
    pub commission_rate: f64,
    pub min_commission: f64,
    /// Charged on sells only.
    pub stamp_tax_rate: f64,
    pub transfer_fee_rate: f64,
    /// Adverse price deviation applied to market fills: buys pay
    /// `price * (1 + rate)`, sells receive `price * (1 - rate)`.
    pub slippage_rate: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        FeeSchedule {
            commission_rate: 0.0003,
            min_commission: 5.0,
            stamp_tax_rate: 0.001,
            transfer_fee_rate: 0.00002,
            slippage_rate: 0.0,
        }
    }
}

impl FeeSchedule {
    /// A schedule with every rate zeroed, for tests and cost-free runs.
    pub fn zero() -> Self {
        FeeSchedule {
            commission_rate: 0.0,
            min_commission: 0.0,
            stamp_tax_rate: 0.0,
            transfer_fee_rate: 0.0,
            slippage_rate: 0.0,
        }
    }

    pub fn commission(&self, notional: f64) -> f64 {
        let raw = notional * self.commission_rate;
        if raw < self.min_commission && self.commission_rate > 0.0 {
            self.min_commission
        } else {
            raw
        }
    }

    pub fn stamp_tax(&self, notional: f64, is_sell: bool) -> f64 {
        if is_sell {
            notional * self.stamp_tax_rate
        } else {
            0.0
        }
    }

    pub fn transfer_fee(&self, notional: f64) -> f64 {
        notional * self.transfer_fee_rate
    }

    pub fn buy_price(&self, market_price: f64) -> f64 {
        market_price * (1.0 + self.slippage_rate)
    }

    pub fn sell_price(&self, market_price: f64) -> f64 {
        market_price * (1.0 - self.slippage_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commission_applies_rate() {
        let fees = FeeSchedule {
            commission_rate: 0.0003,
            min_commission: 0.0,
            ..FeeSchedule::zero()
        };
        assert!((fees.commission(100_000.0) - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn commission_floor_kicks_in() {
        let fees = FeeSchedule::default();
        // 3/10000 of 1000 = 0.30, below the 5.0 minimum
        assert!((fees.commission(1_000.0) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_rate_means_zero_commission() {
        let fees = FeeSchedule::zero();
        assert!((fees.commission(100_000.0) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stamp_tax_sell_only() {
        let fees = FeeSchedule::default();
        assert!((fees.stamp_tax(10_000.0, true) - 10.0).abs() < f64::EPSILON);
        assert!((fees.stamp_tax(10_000.0, false) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn transfer_fee_both_sides() {
        let fees = FeeSchedule::default();
        assert!((fees.transfer_fee(100_000.0) - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn slippage_adverse_both_ways() {
        let fees = FeeSchedule {
            slippage_rate: 0.001,
            ..FeeSchedule::zero()
        };
        assert!((fees.buy_price(100.0) - 100.1).abs() < f64::EPSILON);
        assert!((fees.sell_price(100.0) - 99.9).abs() < f64::EPSILON);
    }
}

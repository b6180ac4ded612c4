//! Order book: creation, submission, matching, and cancellation.
//!
//! The manager is the single owner of every order until it reaches a
//! terminal state. Matching runs against one bar at a time; orders that
//! do not match rest and are retried on later bars until the run ends.

use chrono::NaiveDate;

use super::bar::Bar;
use super::fees::FeeSchedule;
use super::order::{Fill, Order, OrderId, OrderStatus, OrderType, RejectReason, Side, LOT_SIZE};
use super::portfolio::Portfolio;

/// Outcome of one matching attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Filled(Fill),
    Rejected(RejectReason),
    /// No trigger/price cross on this bar; the order stays open.
    Resting,
}

#[derive(Debug, Default)]
pub struct OrderManager {
    orders: Vec<Order>,
}

impl OrderManager {
    pub fn new() -> Self {
        OrderManager::default()
    }

    /// Create an order from an authorized signal and submit it. Lot
    /// violations reject immediately: quantities must be positive
    /// multiples of [`LOT_SIZE`], never rounded.
    pub fn create_and_submit(
        &mut self,
        symbol: &str,
        side: Side,
        order_type: OrderType,
        quantity: i64,
        date: NaiveDate,
    ) -> OrderId {
        let id = self.orders.len() as OrderId + 1;
        let mut order = Order::new(id, symbol, side, order_type, quantity, date);
        order.submit();
        if quantity <= 0 || quantity % LOT_SIZE != 0 {
            order.reject(RejectReason::OddLot);
        }
        self.orders.push(order);
        id
    }

    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(id as usize - 1)
    }

    fn order_mut(&mut self, id: OrderId) -> Option<&mut Order> {
        self.orders.get_mut(id as usize - 1)
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Ids of orders still eligible for matching, in creation order.
    pub fn open_order_ids(&self) -> Vec<OrderId> {
        self.orders
            .iter()
            .filter(|o| o.is_active())
            .map(|o| o.id)
            .collect()
    }

    pub fn cancel(&mut self, id: OrderId) -> bool {
        self.order_mut(id).is_some_and(|o| o.cancel())
    }

    /// Cancel every resting order; called when the feed is exhausted.
    pub fn cancel_all_open(&mut self) {
        for order in &mut self.orders {
            if order.is_active() {
                order.cancel();
            }
        }
    }

    /// Attempt to match an active order against `bar`.
    ///
    /// `market_reference` is the price a market execution references on
    /// this bar (the engine passes the close or next open depending on
    /// its fill policy); slippage is applied on top. Limit orders fill
    /// at their limit price when the bar range crosses it. Stop orders
    /// arm on a range cross and fill as market on the same bar.
    ///
    /// Cash and unlocked-position checks happen here, at fill time,
    /// before the portfolio is touched.
    pub fn try_match(
        &mut self,
        id: OrderId,
        bar: &Bar,
        market_reference: f64,
        portfolio: &Portfolio,
        fees: &FeeSchedule,
    ) -> MatchOutcome {
        let (symbol, side, order_type, quantity, was_armed) = match self.order(id) {
            Some(o) if o.is_active() && o.symbol == bar.symbol => (
                o.symbol.clone(),
                o.side,
                o.order_type,
                o.remaining_quantity(),
                o.armed,
            ),
            _ => return MatchOutcome::Resting,
        };

        let price = match order_type {
            OrderType::Market => match side {
                Side::Buy => fees.buy_price(market_reference),
                Side::Sell => fees.sell_price(market_reference),
            },
            OrderType::Limit(limit) => {
                let crossed = match side {
                    Side::Buy => bar.low <= limit,
                    Side::Sell => bar.high >= limit,
                };
                if !crossed {
                    return MatchOutcome::Resting;
                }
                limit
            }
            OrderType::Stop(trigger) => {
                let armed = was_armed
                    || match side {
                        Side::Buy => bar.high >= trigger,
                        Side::Sell => bar.low <= trigger,
                    };
                if !armed {
                    return MatchOutcome::Resting;
                }
                // remember the arming so the order stays armed on later bars
                if let Some(o) = self.order_mut(id) {
                    o.armed = true;
                }
                match side {
                    Side::Buy => fees.buy_price(market_reference),
                    Side::Sell => fees.sell_price(market_reference),
                }
            }
        };

        let notional = quantity as f64 * price;
        let commission = fees.commission(notional);
        let stamp_tax = fees.stamp_tax(notional, side == Side::Sell);
        let transfer_fee = fees.transfer_fee(notional);

        if let Some(reason) = match side {
            Side::Buy => {
                let total = notional + commission + stamp_tax + transfer_fee;
                (total > portfolio.cash).then_some(RejectReason::InsufficientCash)
            }
            Side::Sell => {
                if quantity > portfolio.position_quantity(&symbol) {
                    Some(RejectReason::InsufficientPosition)
                } else if quantity > portfolio.unlocked_quantity(&symbol, bar.date) {
                    Some(RejectReason::SettlementLocked)
                } else {
                    None
                }
            }
        } {
            if let Some(o) = self.order_mut(id) {
                o.reject(reason.clone());
            }
            return MatchOutcome::Rejected(reason);
        }

        if let Some(o) = self.order_mut(id) {
            o.record_fill(quantity);
        }
        MatchOutcome::Filled(Fill {
            order_id: id,
            symbol,
            side,
            date: bar.date,
            price,
            quantity,
            commission,
            stamp_tax,
            transfer_fee,
        })
    }

    pub fn status_counts(&self) -> (usize, usize, usize) {
        let filled = self
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::Filled)
            .count();
        let cancelled = self
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::Cancelled)
            .count();
        let rejected = self
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::Rejected)
            .count();
        (filled, cancelled, rejected)
    }
}

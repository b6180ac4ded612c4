//! Order lifecycle and fill records.
//!
//! Status is an explicit finite state machine:
//! `Created → Submitted → {Filled, PartiallyFilled → Filled, Cancelled,
//! Rejected}`. Transition methods return `false` instead of mutating
//! when called from an invalid state, so a terminal order can never be
//! filled twice.

use chrono::NaiveDate;

pub type OrderId = u64;

/// Minimum tradable lot. Order quantities must be positive multiples;
/// fractional remainders are rejected, never rounded silently.
pub const LOT_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderType {
    Market,
    Limit(f64),
    Stop(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Created,
    Submitted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    InsufficientCash,
    InsufficientPosition,
    /// Shares bought today are locked by T+1 settlement.
    SettlementLocked,
    /// Quantity is zero, negative, or not a multiple of [`LOT_SIZE`].
    OddLot,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            RejectReason::InsufficientCash => "insufficient cash",
            RejectReason::InsufficientPosition => "insufficient position",
            RejectReason::SettlementLocked => "position locked by T+1 settlement",
            RejectReason::OddLot => "quantity is not a positive lot multiple",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: i64,
    pub filled_quantity: i64,
    pub created: NaiveDate,
    pub status: OrderStatus,
    pub reject_reason: Option<RejectReason>,
    /// A stop order arms once the bar range crosses its trigger; it
    /// then matches as a market order.
    pub armed: bool,
}

impl Order {
    pub fn new(
        id: OrderId,
        symbol: impl Into<String>,
        side: Side,
        order_type: OrderType,
        quantity: i64,
        created: NaiveDate,
    ) -> Self {
        Order {
            id,
            symbol: symbol.into(),
            side,
            order_type,
            quantity,
            filled_quantity: 0,
            created,
            status: OrderStatus::Created,
            reject_reason: None,
            armed: false,
        }
    }

    pub fn remaining_quantity(&self) -> i64 {
        self.quantity - self.filled_quantity
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Submitted | OrderStatus::PartiallyFilled
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }

    pub fn submit(&mut self) -> bool {
        if self.status != OrderStatus::Created {
            return false;
        }
        self.status = OrderStatus::Submitted;
        true
    }

    /// Record a fill of `quantity` shares. Partial fills leave the
    /// order in `PartiallyFilled`; filling the remainder closes it.
    pub fn record_fill(&mut self, quantity: i64) -> bool {
        if !self.is_active() || quantity <= 0 || quantity > self.remaining_quantity() {
            return false;
        }
        self.filled_quantity += quantity;
        self.status = if self.filled_quantity == self.quantity {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        true
    }

    pub fn cancel(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = OrderStatus::Cancelled;
        true
    }

    pub fn reject(&mut self, reason: RejectReason) -> bool {
        if self.status != OrderStatus::Created && self.status != OrderStatus::Submitted {
            return false;
        }
        self.status = OrderStatus::Rejected;
        self.reject_reason = Some(reason);
        true
    }
}

/// One execution against an order. Costs are recorded individually,
/// never netted, to keep the trade ledger auditable.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub order_id: OrderId,
    pub symbol: String,
    pub side: Side,
    pub date: NaiveDate,
    pub price: f64,
    pub quantity: i64,
    pub commission: f64,
    pub stamp_tax: f64,
    pub transfer_fee: f64,
}

impl Fill {
    pub fn notional(&self) -> f64 {
        self.quantity as f64 * self.price
    }

    pub fn total_costs(&self) -> f64 {
        self.commission + self.stamp_tax + self.transfer_fee
    }
}

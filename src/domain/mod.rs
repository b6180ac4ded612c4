//! Core backtesting domain: bars, signals, orders, portfolio
//! accounting, risk controls, the replay engine, and performance
//! metrics.

pub mod bar;
pub mod config_validation;
pub mod engine;
pub mod error;
pub mod fees;
pub mod indicator;
pub mod metrics;
pub mod order;
pub mod order_manager;
pub mod portfolio;
pub mod position;
pub mod risk;
pub mod signal;
pub mod strategy;
pub mod timeline;

//! CSV export of backtest results: equity curve and trade ledger.

use crate::domain::engine::BacktestReport;
use crate::domain::error::QuantbackError;
use crate::domain::order::Side;
use crate::domain::portfolio::EquityPoint;
use crate::domain::position::Trade;
use std::path::Path;

fn csv_error(context: &str, e: csv::Error) -> QuantbackError {
    QuantbackError::Data {
        reason: format!("{}: {}", context, e),
    }
}

pub fn export_equity_curve<P: AsRef<Path>>(
    path: P,
    curve: &[EquityPoint],
) -> Result<(), QuantbackError> {
    let mut writer =
        csv::Writer::from_path(&path).map_err(|e| csv_error("open equity curve output", e))?;
    writer
        .write_record(["date", "equity", "cash", "position_value"])
        .map_err(|e| csv_error("write equity header", e))?;
    for point in curve {
        writer
            .write_record([
                point.date.to_string(),
                format!("{:.2}", point.equity),
                format!("{:.2}", point.cash),
                format!("{:.2}", point.position_value),
            ])
            .map_err(|e| csv_error("write equity row", e))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn export_trades<P: AsRef<Path>>(path: P, trades: &[Trade]) -> Result<(), QuantbackError> {
    let mut writer =
        csv::Writer::from_path(&path).map_err(|e| csv_error("open trade ledger output", e))?;
    writer
        .write_record([
            "date",
            "symbol",
            "side",
            "price",
            "quantity",
            "commission",
            "stamp_tax",
            "transfer_fee",
            "realized_pnl",
            "cash_after",
        ])
        .map_err(|e| csv_error("write trade header", e))?;
    for trade in trades {
        let side = match trade.side {
            Side::Buy => "buy",
            Side::Sell => "sell",
        };
        let realized = trade
            .realized_pnl
            .map(|p| format!("{:.2}", p))
            .unwrap_or_default();
        writer
            .write_record([
                trade.date.to_string(),
                trade.symbol.clone(),
                side.to_string(),
                format!("{:.4}", trade.price),
                trade.quantity.to_string(),
                format!("{:.2}", trade.commission),
                format!("{:.2}", trade.stamp_tax),
                format!("{:.2}", trade.transfer_fee),
                realized,
                format!("{:.2}", trade.cash_after),
            ])
            .map_err(|e| csv_error("write trade row", e))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write `equity_curve.csv` and `trades.csv` into `dir`.
pub fn export_report<P: AsRef<Path>>(dir: P, report: &BacktestReport) -> Result<(), QuantbackError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    export_equity_curve(dir.join("equity_curve.csv"), &report.equity_curve)?;
    export_trades(dir.join("trades.csv"), &report.trades)?;
    Ok(())
}

//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::export_report;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::{load_backtest_config, load_data_settings, load_strategy};
use crate::domain::engine::{BacktestEngine, BacktestReport};
use crate::domain::error::QuantbackError;
use crate::domain::timeline::InstrumentSeries;
use crate::ports::data_port::DataPort;

#[derive(Parser, Debug)]
#[command(name = "quantback", about = "Event-driven equities backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Directory for equity curve and trade ledger CSV export
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Replay start date (YYYY-MM-DD), defaults to the feed start
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Replay end date (YYYY-MM-DD), defaults to the feed end
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Validate a configuration file without running
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show available symbols and their date ranges
    Info {
        #[arg(long)]
        data_dir: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            output,
            start,
            end,
        } => run_backtest(&config, output.as_deref(), start, end),
        Command::Validate { config } => run_validate(&config),
        Command::Info { data_dir } => run_info(&data_dir),
    }
}

fn fail(err: &QuantbackError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

fn run_backtest(
    config_path: &PathBuf,
    output: Option<&std::path::Path>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> ExitCode {
    match run_backtest_inner(config_path, start, end) {
        Ok(report) => {
            print_summary(&report);
            if let Some(dir) = output {
                if let Err(e) = export_report(dir, &report) {
                    return fail(&e);
                }
                eprintln!("Results written to {}", dir.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_backtest_inner(
    config_path: &PathBuf,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<BacktestReport, QuantbackError> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = FileConfigAdapter::from_file(config_path)?;

    let bt_config = load_backtest_config(&adapter)?;
    let mut strategy = load_strategy(&adapter)?;
    let (data_dir, symbols) = load_data_settings(&adapter)?;

    let start = start.unwrap_or(NaiveDate::MIN);
    let end = end.unwrap_or(NaiveDate::MAX);

    eprintln!("Loading bars for {} symbols from {}", symbols.len(), data_dir);
    let data_port = CsvAdapter::new(PathBuf::from(data_dir));
    let mut series = Vec::with_capacity(symbols.len());
    for symbol in &symbols {
        let bars = data_port.fetch_bars(symbol, start, end)?;
        series.push(InstrumentSeries::new(symbol.clone(), bars)?);
    }

    eprintln!("Running backtest: {}", strategy.name());
    let engine = BacktestEngine::new(bt_config)?;
    engine.run(strategy.as_mut(), series)
}

fn print_summary(report: &BacktestReport) {
    let metrics = &report.metrics;
    println!("=== Backtest Results ===");
    println!("Strategy:         {}", report.strategy);
    if let (Some(start), Some(end)) = (report.start, report.end) {
        println!("Period:           {} to {}", start, end);
    }
    println!("Final Equity:     {:.2}", report.final_equity);
    println!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    println!("Annualized:       {:.2}%", metrics.annualized_return * 100.0);
    println!("Volatility:       {:.2}%", metrics.volatility * 100.0);
    println!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    println!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    println!("Calmar Ratio:     {:.2}", metrics.calmar_ratio);
    println!("Max Drawdown:     -{:.2}%", metrics.max_drawdown * 100.0);
    println!("Drawdown Length:  {} sessions", metrics.max_drawdown_duration);
    println!("VaR (daily):      {:.2}%", metrics.value_at_risk * 100.0);
    println!("CVaR (daily):     {:.2}%", metrics.conditional_var * 100.0);
    println!(
        "Trades:           {} won / {} lost / {} flat",
        metrics.trades_won, metrics.trades_lost, metrics.trades_breakeven
    );
    println!("Win Rate:         {:.1}%", metrics.win_rate * 100.0);
    println!("Profit Factor:    {:.2}", metrics.profit_factor);
    println!(
        "Orders:           {} filled, {} cancelled, {} rejected",
        report.orders_filled, report.orders_cancelled, report.orders_rejected
    );
    if !report.skipped.is_empty() {
        println!("Skipped Signals:  {}", report.skipped.len());
        for skip in &report.skipped {
            println!(
                "  {} {} {:?}: {}",
                skip.signal.date, skip.signal.symbol, skip.signal.kind, skip.reason
            );
        }
    }
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    let result = FileConfigAdapter::from_file(config_path).and_then(|adapter| {
        load_backtest_config(&adapter)?;
        load_strategy(&adapter)?;
        load_data_settings(&adapter)?;
        Ok(())
    });
    match result {
        Ok(()) => {
            println!("Configuration OK: {}", config_path.display());
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_info(data_dir: &PathBuf) -> ExitCode {
    let data_port = CsvAdapter::new(data_dir.clone());
    let symbols = match data_port.list_symbols() {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    if symbols.is_empty() {
        println!("No symbol data found in {}", data_dir.display());
        return ExitCode::SUCCESS;
    }
    for symbol in symbols {
        match data_port.data_range(&symbol) {
            Ok(Some((first, last, count))) => {
                println!("{}: {} to {} ({} bars)", symbol, first, last, count);
            }
            Ok(None) => println!("{}: no bars", symbol),
            Err(e) => return fail(&e),
        }
    }
    ExitCode::SUCCESS
}

mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::backtest::{BacktestArgs, CompareArgs};
use commands::optimize::{FrontierArgs, OptimizeArgs};
use commands::options::{ImpliedVolArgs, OptionChainArgs, OptionStrategyArgs};
use commands::risk::{DrawdownArgs, RiskArgs, SharpeArgs, StressArgs, VarArgs};

/// Portfolio optimization and risk analytics
#[derive(Parser)]
#[command(
    name = "qfo",
    version,
    about = "Portfolio optimization and risk analytics",
    long_about = "A CLI for mean-variance portfolio optimization, historical and parametric \
                  risk analytics, stress testing, Black-Scholes option pricing and \
                  strategy backtesting. Requests are read from JSON or YAML files or \
                  piped JSON on stdin."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log filter (e.g. "info" or "quantfolio_core=debug"); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize portfolio weights (max Sharpe, min volatility, target return, equal weight)
    Optimize(OptimizeArgs),
    /// Trace the constrained efficient frontier
    Frontier(FrontierArgs),
    /// Full risk report for a portfolio over historical returns
    Risk(RiskArgs),
    /// Apply shock scenarios to a portfolio
    Stress(StressArgs),
    /// Value at Risk and CVaR of a return series
    Var(VarArgs),
    /// Sharpe and Sortino ratios of a return series
    Sharpe(SharpeArgs),
    /// Maximum drawdown of an equity curve
    Drawdown(DrawdownArgs),
    /// Price calls and puts across strikes and expiries
    OptionChain(OptionChainArgs),
    /// Solve Black-Scholes implied volatility from a market price
    ImpliedVol(ImpliedVolArgs),
    /// Payoff, breakevens and risk of a multi-leg option strategy
    OptionStrategy(OptionStrategyArgs),
    /// Simulate one allocation strategy over a price history
    Backtest(BacktestArgs),
    /// Simulate several strategies over the same history
    Compare(CompareArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    // stdout carries results only
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Optimize(args) => commands::optimize::run_optimize(args),
        Commands::Frontier(args) => commands::optimize::run_frontier(args),
        Commands::Risk(args) => commands::risk::run_risk(args),
        Commands::Stress(args) => commands::risk::run_stress(args),
        Commands::Var(args) => commands::risk::run_var(args),
        Commands::Sharpe(args) => commands::risk::run_sharpe(args),
        Commands::Drawdown(args) => commands::risk::run_drawdown(args),
        Commands::OptionChain(args) => commands::options::run_option_chain(args),
        Commands::ImpliedVol(args) => commands::options::run_implied_vol(args),
        Commands::OptionStrategy(args) => commands::options::run_option_strategy(args),
        Commands::Backtest(args) => commands::backtest::run_backtest(args),
        Commands::Compare(args) => commands::backtest::run_compare(args),
        Commands::Version => {
            println!("qfo {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}

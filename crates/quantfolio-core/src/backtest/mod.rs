pub mod engine;
pub mod strategy;

pub use engine::{
    run_backtest, run_backtests, Backtest, BacktestResult, BacktestState, PriceBar, PriceHistory,
};
pub use strategy::{AllocationRule, RebalanceFrequency, StrategyConfig};

pub mod backtest;
pub mod optimize;
pub mod options;
pub mod risk;

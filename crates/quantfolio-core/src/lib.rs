pub mod error;
pub mod statistics;
pub mod types;

#[cfg(feature = "optimization")]
pub mod optimization;

#[cfg(feature = "risk")]
pub mod risk;

#[cfg(feature = "options")]
pub mod options;

#[cfg(feature = "backtest")]
pub mod backtest;

pub use error::QuantfolioError;
pub use types::*;

/// Standard result type for all quantfolio operations
pub type QuantfolioResult<T> = Result<T, QuantfolioError>;

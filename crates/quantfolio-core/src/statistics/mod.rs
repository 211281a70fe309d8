pub mod cache;
pub mod covariance;
pub mod linalg;
pub mod moments;

pub use cache::{CovarianceCache, CovarianceKey};
pub use covariance::{compute_covariance, CovarianceMatrix};
pub use moments::{
    annualize, excess_kurtosis, mean, percentile, rolling_mean, rolling_volatility,
    rolling_window, sample_covariance, sample_std_dev, sample_variance, simple_returns, skewness,
    PeriodStat, ReturnFrequency,
};

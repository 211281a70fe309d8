use serde::{Deserialize, Serialize};

use crate::error::QuantfolioError;
use crate::statistics::moments::{mean, sample_covariance, sample_std_dev, sample_variance};
use crate::statistics::ReturnFrequency;
use crate::QuantfolioResult;

use super::drawdown::{equity_from_returns, max_drawdown_from_values};

/// Per-period dispersion at or below this is treated as zero risk.
pub(crate) const ZERO_RISK: f64 = 1e-14;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaAlpha {
    pub beta: f64,
    /// Annualised Jensen alpha.
    pub alpha: f64,
}

fn require_observations(returns: &[f64], what: &str) -> QuantfolioResult<()> {
    if returns.len() < 2 {
        return Err(QuantfolioError::InsufficientData(format!(
            "{what} requires at least 2 return observations, got {}",
            returns.len()
        )));
    }
    if returns.iter().any(|r| !r.is_finite()) {
        return Err(QuantfolioError::invalid("returns", "contains non-finite values"));
    }
    Ok(())
}

fn require_aligned(returns: &[f64], benchmark: &[f64]) -> QuantfolioResult<()> {
    if returns.len() != benchmark.len() {
        return Err(QuantfolioError::InsufficientData(format!(
            "Portfolio has {} returns but benchmark has {}",
            returns.len(),
            benchmark.len()
        )));
    }
    require_observations(benchmark, "Benchmark comparison")
}

/// Annualised arithmetic mean return.
pub fn annualized_return(returns: &[f64], frequency: ReturnFrequency) -> QuantfolioResult<f64> {
    Ok(mean(returns)? * frequency.periods_per_year())
}

pub fn annualized_volatility(
    returns: &[f64],
    frequency: ReturnFrequency,
) -> QuantfolioResult<f64> {
    Ok(sample_std_dev(returns)? * frequency.periods_per_year().sqrt())
}

/// Compound annual growth rate of the return path.
pub fn cagr(returns: &[f64], frequency: ReturnFrequency) -> QuantfolioResult<f64> {
    require_observations(returns, "CAGR")?;
    let path = equity_from_returns(returns)?;
    let growth = path[path.len() - 1];
    let years = returns.len() as f64 / frequency.periods_per_year();
    Ok(growth.powf(1.0 / years) - 1.0)
}

/// (annualised mean − rf) / annualised volatility.
pub fn sharpe_ratio(
    returns: &[f64],
    risk_free_rate: f64,
    frequency: ReturnFrequency,
) -> QuantfolioResult<f64> {
    require_observations(returns, "Sharpe ratio")?;
    let sd = sample_std_dev(returns)?;
    if sd <= ZERO_RISK {
        return Err(QuantfolioError::divide_by_zero(
            "sharpe_ratio: return volatility is zero",
        ));
    }
    let excess = annualized_return(returns, frequency)? - risk_free_rate;
    Ok(excess / (sd * frequency.periods_per_year().sqrt()))
}

/// Downside deviation over negative-return periods, divided by the full
/// observation count, per period.
pub fn downside_deviation(returns: &[f64]) -> QuantfolioResult<f64> {
    require_observations(returns, "Downside deviation")?;
    let sum_sq: f64 = returns.iter().filter(|r| **r < 0.0).map(|r| r * r).sum();
    Ok((sum_sq / returns.len() as f64).sqrt())
}

/// (annualised mean − rf) / annualised downside deviation.
pub fn sortino_ratio(
    returns: &[f64],
    risk_free_rate: f64,
    frequency: ReturnFrequency,
) -> QuantfolioResult<f64> {
    let dd = downside_deviation(returns)?;
    if dd <= ZERO_RISK {
        return Err(QuantfolioError::divide_by_zero(
            "sortino_ratio: no downside deviation",
        ));
    }
    let excess = annualized_return(returns, frequency)? - risk_free_rate;
    Ok(excess / (dd * frequency.periods_per_year().sqrt()))
}

/// CAGR / max drawdown of the compounded return path.
pub fn calmar_ratio(returns: &[f64], frequency: ReturnFrequency) -> QuantfolioResult<f64> {
    require_observations(returns, "Calmar ratio")?;
    let max_dd = max_drawdown_from_values(&equity_from_returns(returns)?)?;
    if max_dd <= ZERO_RISK {
        return Err(QuantfolioError::divide_by_zero(
            "calmar_ratio: max drawdown is zero",
        ));
    }
    Ok(cagr(returns, frequency)? / max_dd)
}

/// Regression beta against a benchmark and annualised alpha
/// (mean_p − β·mean_b)·periods.
pub fn beta_alpha(
    returns: &[f64],
    benchmark: &[f64],
    frequency: ReturnFrequency,
) -> QuantfolioResult<BetaAlpha> {
    require_observations(returns, "Beta")?;
    require_aligned(returns, benchmark)?;
    let var_b = sample_variance(benchmark)?;
    if var_b <= ZERO_RISK * ZERO_RISK {
        return Err(QuantfolioError::divide_by_zero(
            "beta: benchmark variance is zero",
        ));
    }
    let beta = sample_covariance(returns, benchmark)? / var_b;
    let alpha = (mean(returns)? - beta * mean(benchmark)?) * frequency.periods_per_year();
    Ok(BetaAlpha { beta, alpha })
}

/// Annualised standard deviation of active returns.
pub fn tracking_error(
    returns: &[f64],
    benchmark: &[f64],
    frequency: ReturnFrequency,
) -> QuantfolioResult<f64> {
    require_observations(returns, "Tracking error")?;
    require_aligned(returns, benchmark)?;
    let active: Vec<f64> = returns.iter().zip(benchmark).map(|(r, b)| r - b).collect();
    Ok(sample_std_dev(&active)? * frequency.periods_per_year().sqrt())
}

/// Annualised active return over tracking error.
pub fn information_ratio(
    returns: &[f64],
    benchmark: &[f64],
    frequency: ReturnFrequency,
) -> QuantfolioResult<f64> {
    let te = tracking_error(returns, benchmark, frequency)?;
    if te <= ZERO_RISK {
        return Err(QuantfolioError::divide_by_zero(
            "information_ratio: tracking error is zero",
        ));
    }
    let active: Vec<f64> = returns.iter().zip(benchmark).map(|(r, b)| r - b).collect();
    Ok(mean(&active)? * frequency.periods_per_year() / te)
}

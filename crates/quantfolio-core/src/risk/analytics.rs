use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::QuantfolioError;
use crate::options::{aggregate_greeks, OptionPosition, PortfolioGreeks};
use crate::statistics::moments::{excess_kurtosis, skewness};
use crate::statistics::{compute_covariance, ReturnFrequency};
use crate::types::{with_metadata, ComputationOutput, Portfolio, RatioValue};
use crate::QuantfolioResult;

use super::drawdown::{drawdown_stats, equity_from_returns, DrawdownStats};
use super::ratios::{
    annualized_return, annualized_volatility, beta_alpha, calmar_ratio, information_ratio,
    sharpe_ratio, sortino_ratio, tracking_error, ZERO_RISK,
};
use super::var::{conditional_var, parametric_cvar, parametric_var, value_at_risk};

/// Kurtosis needs four observations, so the whole report does too.
const MIN_OBSERVATIONS: usize = 4;

const HHI_WARNING: f64 = 0.25;
const SINGLE_HOLDING_WARNING: f64 = 0.40;
const SECTOR_WARNING: f64 = 0.50;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAnalysisRequest {
    pub portfolio: Portfolio,
    /// Periodic returns per symbol, aligned by index across symbols.
    pub asset_returns: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    pub benchmark_returns: Option<Vec<f64>>,
    #[serde(default)]
    pub risk_free_rate: f64,
    #[serde(default)]
    pub frequency: ReturnFrequency,
    #[serde(default = "default_confidence_levels")]
    pub confidence_levels: Vec<f64>,
    #[serde(default)]
    pub option_positions: Vec<OptionPosition>,
}

fn default_confidence_levels() -> Vec<f64> {
    vec![0.95, 0.99]
}

/// Per-period loss estimates at one confidence level, positive = loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarEstimate {
    pub confidence: f64,
    pub historical_var: f64,
    pub historical_cvar: f64,
    pub parametric_var: f64,
    pub parametric_cvar: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetaSource {
    /// Regression on the supplied benchmark series
    Benchmark,
    /// Weighted average of the holdings' asset betas
    AssetBetas,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskContribution {
    pub symbol: String,
    pub weight: f64,
    /// Annualised marginal contribution to volatility, (Σw)ᵢ / σₚ.
    pub marginal_risk: f64,
    /// wᵢ(Σw)ᵢ / σₚ², summing to one across holdings.
    pub share: RatioValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub observations: usize,
    pub var: Vec<VarEstimate>,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    /// √(wᵀΣw) from the sample covariance of the asset returns, annualised.
    pub ex_ante_volatility: f64,
    pub sharpe_ratio: RatioValue,
    pub sortino_ratio: RatioValue,
    pub calmar_ratio: RatioValue,
    pub max_drawdown: f64,
    pub drawdown: DrawdownStats,
    pub beta: RatioValue,
    pub beta_source: BetaSource,
    pub alpha: Option<f64>,
    pub tracking_error: Option<f64>,
    pub information_ratio: Option<RatioValue>,
    pub skewness: RatioValue,
    pub excess_kurtosis: RatioValue,
    pub hhi_concentration: f64,
    pub effective_holdings: f64,
    pub sector_exposure: BTreeMap<String, f64>,
    pub risk_contributions: Vec<RiskContribution>,
    pub option_greeks: Option<PortfolioGreeks>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Full risk report for a constant-weight portfolio over historical asset
/// returns.
pub fn analyze_risk(
    request: &RiskAnalysisRequest,
) -> QuantfolioResult<ComputationOutput<RiskMetrics>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let portfolio = &request.portfolio;
    portfolio.validate()?;
    let weights = portfolio.weights();
    let series = aligned_series(request)?;
    let observations = series[0].len();
    if request.confidence_levels.is_empty() {
        return Err(QuantfolioError::invalid(
            "confidence_levels",
            "at least one confidence level is required",
        ));
    }

    // Portfolio return per period, rebalanced to constant weights
    let returns: Vec<f64> = (0..observations)
        .map(|t| weights.iter().zip(&series).map(|(w, s)| w * s[t]).sum())
        .collect();

    let var = request
        .confidence_levels
        .iter()
        .map(|&c| {
            Ok(VarEstimate {
                confidence: c,
                historical_var: value_at_risk(&returns, c)?,
                historical_cvar: conditional_var(&returns, c)?,
                parametric_var: parametric_var(&returns, c)?,
                parametric_cvar: parametric_cvar(&returns, c)?,
            })
        })
        .collect::<QuantfolioResult<Vec<_>>>()?;

    let freq = request.frequency;
    let rf = request.risk_free_rate;
    let periods = freq.periods_per_year();

    let cov = compute_covariance(&series)?;
    let annual_cov = cov.scaled(periods)?;
    let port_var = annual_cov.portfolio_variance(&weights);
    let ex_ante_volatility = port_var.max(0.0).sqrt();
    let zero_risk = ex_ante_volatility <= ZERO_RISK;
    let sigma_w = annual_cov.times(&weights);
    let risk_contributions = portfolio
        .holdings
        .iter()
        .zip(&sigma_w)
        .map(|(h, sw)| {
            let share = if !zero_risk {
                RatioValue::Defined {
                    value: h.weight * sw / port_var,
                }
            } else {
                RatioValue::Undefined {
                    reason: QuantfolioError::divide_by_zero(
                        "risk_contribution: portfolio variance is zero",
                    )
                    .to_string(),
                }
            };
            RiskContribution {
                symbol: h.asset.symbol.clone(),
                weight: h.weight,
                marginal_risk: if !zero_risk {
                    sw / ex_ante_volatility
                } else {
                    0.0
                },
                share,
            }
        })
        .collect();

    let path = equity_from_returns(&returns)?;
    let drawdown = drawdown_stats(&path)?;

    let (beta, beta_source, alpha, te, ir) = match &request.benchmark_returns {
        Some(bench) => {
            let ba = beta_alpha(&returns, bench, freq);
            let alpha = ba.as_ref().ok().map(|b| b.alpha);
            let beta = RatioValue::from_result(ba.map(|b| b.beta))?;
            let te = tracking_error(&returns, bench, freq)?;
            let ir = RatioValue::from_result(information_ratio(&returns, bench, freq))?;
            (beta, BetaSource::Benchmark, alpha, Some(te), Some(ir))
        }
        None => {
            warnings.push("No benchmark supplied: beta is the weighted asset beta".into());
            (
                RatioValue::Defined {
                    value: portfolio.weighted_beta(),
                },
                BetaSource::AssetBetas,
                None,
                None,
                None,
            )
        }
    };

    let hhi = portfolio.hhi();
    let sector_exposure = portfolio.sector_exposure();
    concentration_warnings(portfolio, hhi, &sector_exposure, &mut warnings);

    let option_greeks = if request.option_positions.is_empty() {
        None
    } else {
        Some(aggregate_greeks(&request.option_positions)?)
    };

    let metrics = RiskMetrics {
        observations,
        var,
        annualized_return: annualized_return(&returns, freq)?,
        annualized_volatility: annualized_volatility(&returns, freq)?,
        ex_ante_volatility,
        sharpe_ratio: RatioValue::from_result(sharpe_ratio(&returns, rf, freq))?,
        sortino_ratio: RatioValue::from_result(sortino_ratio(&returns, rf, freq))?,
        calmar_ratio: RatioValue::from_result(calmar_ratio(&returns, freq))?,
        max_drawdown: drawdown.max_drawdown,
        drawdown,
        beta,
        beta_source,
        alpha,
        tracking_error: te,
        information_ratio: ir,
        skewness: RatioValue::from_result(skewness(&returns))?,
        excess_kurtosis: RatioValue::from_result(excess_kurtosis(&returns))?,
        hhi_concentration: hhi,
        effective_holdings: 1.0 / hhi,
        sector_exposure,
        risk_contributions,
        option_greeks,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Historical and parametric (Gaussian) risk analytics on constant-weight portfolio returns",
        &serde_json::json!({
            "frequency": freq,
            "periods_per_year": periods,
            "risk_free_rate": rf,
            "confidence_levels": request.confidence_levels,
            "covariance_estimator": "sample (N-1)",
            "beta_source": beta_source,
        }),
        warnings,
        elapsed,
        metrics,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Asset return series in holding order, all of equal length.
fn aligned_series(request: &RiskAnalysisRequest) -> QuantfolioResult<Vec<Vec<f64>>> {
    let mut series = Vec::with_capacity(request.portfolio.len());
    for h in &request.portfolio.holdings {
        let s = request.asset_returns.get(&h.asset.symbol).ok_or_else(|| {
            QuantfolioError::invalid(
                format!("asset_returns.{}", h.asset.symbol),
                "no return series for holding",
            )
        })?;
        if s.iter().any(|r| !r.is_finite()) {
            return Err(QuantfolioError::invalid(
                format!("asset_returns.{}", h.asset.symbol),
                "contains non-finite values",
            ));
        }
        series.push(s.clone());
    }
    let n = series[0].len();
    if let Some((h, s)) = request
        .portfolio
        .holdings
        .iter()
        .zip(&series)
        .find(|(_, s)| s.len() != n)
    {
        return Err(QuantfolioError::InsufficientData(format!(
            "Return series for {} has {} observations, expected {n}",
            h.asset.symbol,
            s.len()
        )));
    }
    if n < MIN_OBSERVATIONS {
        return Err(QuantfolioError::InsufficientData(format!(
            "Risk analysis requires at least {MIN_OBSERVATIONS} observations, got {n}"
        )));
    }
    Ok(series)
}

fn concentration_warnings(
    portfolio: &Portfolio,
    hhi: f64,
    sector_exposure: &BTreeMap<String, f64>,
    warnings: &mut Vec<String>,
) {
    if hhi > HHI_WARNING {
        warn!(hhi, "portfolio is concentrated");
        warnings.push(format!("High concentration: HHI {hhi:.4} exceeds {HHI_WARNING}"));
    }
    for h in &portfolio.holdings {
        if h.weight > SINGLE_HOLDING_WARNING {
            warn!(symbol = %h.asset.symbol, weight = h.weight, "single holding exceeds limit");
            warnings.push(format!(
                "{} is {:.1}% of the portfolio",
                h.asset.symbol,
                h.weight * 100.0
            ));
        }
    }
    for (sector, w) in sector_exposure {
        if *w > SECTOR_WARNING {
            warn!(sector = %sector, weight = *w, "sector exposure exceeds limit");
            warnings.push(format!("Sector {sector} is {:.1}% of the portfolio", w * 100.0));
        }
    }
}

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::QuantfolioError;
use crate::types::{with_metadata, ComputationOutput};
use crate::QuantfolioResult;

use super::black_scholes::{
    price_european, solve_implied_volatility, Greeks, ImpliedVolSolution, Moneyness,
    OptionParams, OptionType,
};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Strikes × expiries to price off one underlying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionChainRequest {
    pub underlying: String,
    pub spot: f64,
    pub volatility: f64,
    #[serde(default)]
    pub risk_free_rate: f64,
    #[serde(default)]
    pub dividend_yield: f64,
    pub strikes: Vec<f64>,
    /// Times to expiry in years.
    pub expiries: Vec<f64>,
}

/// A priced contract. Greeks are always computed, never supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionContract {
    pub underlying: String,
    pub option_type: OptionType,
    pub strike: f64,
    pub time_to_expiry: f64,
    pub premium: f64,
    pub implied_volatility: f64,
    pub intrinsic_value: f64,
    pub time_value: f64,
    pub moneyness: Moneyness,
    pub breakeven: f64,
    pub greeks: Greeks,
}

/// A held option. `quantity` is signed: negative for written contracts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionPosition {
    pub underlying: String,
    pub option_type: OptionType,
    #[serde(flatten)]
    pub params: OptionParams,
    pub quantity: f64,
    /// Shares per contract.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    100.0
}

/// Position-weighted Greek totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioGreeks {
    pub total: Greeks,
    /// Σ premium × quantity × multiplier.
    pub net_premium: f64,
    pub positions: usize,
    pub by_underlying: BTreeMap<String, Greeks>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpliedVolRequest {
    pub spot: f64,
    pub strike: f64,
    pub time_to_expiry: f64,
    #[serde(default)]
    pub risk_free_rate: f64,
    #[serde(default)]
    pub dividend_yield: f64,
    pub option_type: OptionType,
    pub market_price: f64,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Price a call and a put for every strike × expiry, expiries outermost.
pub fn price_option_chain(
    request: &OptionChainRequest,
) -> QuantfolioResult<ComputationOutput<Vec<OptionContract>>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if request.strikes.is_empty() {
        return Err(QuantfolioError::invalid("strikes", "at least one strike is required"));
    }
    if request.expiries.is_empty() {
        return Err(QuantfolioError::invalid(
            "expiries",
            "at least one expiry is required",
        ));
    }
    if let Some(t) = request.expiries.iter().find(|t| !t.is_finite()) {
        return Err(QuantfolioError::invalid(
            "expiries",
            format!("{t} is not a finite time to expiry"),
        ));
    }
    let expired = request.expiries.iter().filter(|t| **t <= 0.0).count();
    if expired > 0 {
        warnings.push(format!(
            "{expired} expiries are at or past expiry and are priced at intrinsic value"
        ));
    }

    let mut contracts = Vec::with_capacity(request.strikes.len() * request.expiries.len() * 2);
    for &time_to_expiry in &request.expiries {
        for &strike in &request.strikes {
            let params = OptionParams {
                spot: request.spot,
                strike,
                time_to_expiry,
                risk_free_rate: request.risk_free_rate,
                volatility: request.volatility,
                dividend_yield: request.dividend_yield,
            };
            for option_type in [OptionType::Call, OptionType::Put] {
                let v = price_european(&params, option_type)?;
                contracts.push(OptionContract {
                    underlying: request.underlying.clone(),
                    option_type,
                    strike,
                    time_to_expiry,
                    premium: v.price,
                    implied_volatility: request.volatility,
                    intrinsic_value: v.intrinsic_value,
                    time_value: v.time_value,
                    moneyness: v.moneyness,
                    breakeven: v.breakeven,
                    greeks: v.greeks,
                });
            }
        }
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Black-Scholes-Merton (closed-form, continuous dividend yield)",
        &serde_json::json!({
            "underlying": request.underlying,
            "spot": request.spot,
            "volatility": request.volatility,
            "risk_free_rate": request.risk_free_rate,
            "dividend_yield": request.dividend_yield,
            "greek_units": "theta per day; vega and rho per 1%",
        }),
        warnings,
        elapsed,
        contracts,
    ))
}

/// Sum Greek × signed quantity × multiplier over all positions.
pub fn aggregate_greeks(positions: &[OptionPosition]) -> QuantfolioResult<PortfolioGreeks> {
    let mut out = PortfolioGreeks {
        positions: positions.len(),
        ..PortfolioGreeks::default()
    };
    for (i, pos) in positions.iter().enumerate() {
        if !pos.quantity.is_finite() {
            return Err(QuantfolioError::invalid(
                format!("positions[{i}].quantity"),
                "must be finite",
            ));
        }
        if !pos.multiplier.is_finite() || pos.multiplier <= 0.0 {
            return Err(QuantfolioError::invalid(
                format!("positions[{i}].multiplier"),
                "must be positive and finite",
            ));
        }
        let v = price_european(&pos.params, pos.option_type)?;
        let scale = pos.quantity * pos.multiplier;
        let exposure = v.greeks.scaled(scale);
        out.total = out.total + exposure;
        out.net_premium += v.price * scale;
        let entry = out.by_underlying.entry(pos.underlying.clone()).or_default();
        *entry = *entry + exposure;
    }
    Ok(out)
}

pub fn implied_volatility(
    request: &ImpliedVolRequest,
) -> QuantfolioResult<ComputationOutput<ImpliedVolSolution>> {
    let start = Instant::now();
    let solution = solve_implied_volatility(
        request.spot,
        request.strike,
        request.time_to_expiry,
        request.risk_free_rate,
        request.dividend_yield,
        request.option_type,
        request.market_price,
    )?;
    let mut warnings = Vec::new();
    if solution.implied_volatility > 2.0 {
        warnings.push(format!(
            "Implied volatility {:.4} is unusually high",
            solution.implied_volatility
        ));
    }
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Black-Scholes implied volatility (Newton-Raphson with bisection fallback)",
        &serde_json::json!({
            "initial_guess": 0.20,
            "search_interval": [1e-4, 5.0],
            "option_type": request.option_type,
        }),
        warnings,
        elapsed,
        solution,
    ))
}

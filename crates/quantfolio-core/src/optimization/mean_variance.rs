use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::QuantfolioError;
use crate::statistics::linalg::{dot, mat_inverse, mat_vec};
use crate::statistics::{
    compute_covariance, CovarianceCache, CovarianceKey, CovarianceMatrix, ReturnFrequency,
};
use crate::types::{with_metadata, Asset, ComputationOutput, Portfolio, RatioValue};
use crate::QuantfolioResult;

use super::constraints::{Constraints, FeasibleSet, ReturnTarget};
use super::solver::{golden_section_max, MinVarianceQp, QpSolution, SolverSettings};

/// Slack when comparing a return against a floor or a target range.
const RETURN_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What the optimizer maximises or minimises.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Objective {
    MaxSharpe,
    MinVolatility,
    TargetReturn { target: f64 },
    EqualWeight,
}

impl Objective {
    pub fn name(&self) -> &'static str {
        match self {
            Objective::MaxSharpe => "max_sharpe",
            Objective::MinVolatility => "min_volatility",
            Objective::TargetReturn { .. } => "target_return",
            Objective::EqualWeight => "equal_weight",
        }
    }
}

/// Where the covariance matrix comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CovarianceSource {
    /// Annualised covariance supplied directly.
    Matrix { values: CovarianceMatrix },
    /// Per-period return series, one per asset, annualised by `frequency`.
    Historical {
        returns: Vec<Vec<f64>>,
        #[serde(default)]
        frequency: ReturnFrequency,
    },
    /// Asset volatilities combined with a correlation matrix (identity when
    /// absent).
    Assumed {
        #[serde(default)]
        correlation: Option<Vec<Vec<f64>>>,
    },
}

impl Default for CovarianceSource {
    fn default() -> Self {
        CovarianceSource::Assumed { correlation: None }
    }
}

impl CovarianceSource {
    pub fn kind(&self) -> &'static str {
        match self {
            CovarianceSource::Matrix { .. } => "matrix",
            CovarianceSource::Historical { .. } => "historical",
            CovarianceSource::Assumed { .. } => "assumed",
        }
    }

    /// Annualised covariance for `assets`.
    pub fn resolve(&self, assets: &[Asset]) -> QuantfolioResult<CovarianceMatrix> {
        let n = assets.len();
        let matrix = match self {
            CovarianceSource::Matrix { values } => values.clone(),
            CovarianceSource::Historical { returns, frequency } => {
                if returns.len() != n {
                    return Err(QuantfolioError::invalid(
                        "covariance.returns",
                        format!("Expected {n} return series but got {}", returns.len()),
                    ));
                }
                compute_covariance(returns)?.scaled(frequency.periods_per_year())?
            }
            CovarianceSource::Assumed { correlation } => {
                let vols: Vec<f64> = assets.iter().map(|a| a.volatility).collect();
                match correlation {
                    Some(corr) => CovarianceMatrix::from_volatilities(&vols, corr)?,
                    None => CovarianceMatrix::diagonal(&vols)?,
                }
            }
        };
        if matrix.dim() != n {
            return Err(QuantfolioError::invalid(
                "covariance",
                format!("Matrix is {0}x{0} but there are {n} assets", matrix.dim()),
            ));
        }
        Ok(matrix)
    }
}

/// Input to [`optimize`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationRequest {
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub covariance: CovarianceSource,
    #[serde(default)]
    pub constraints: Constraints,
    pub objective: Objective,
    #[serde(default)]
    pub risk_free_rate: f64,
    /// Current allocation, aligned with `assets`.
    #[serde(default)]
    pub current_weights: Option<Vec<f64>>,
    #[serde(default)]
    pub solver: SolverSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

/// Trade suggestion for one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub symbol: String,
    pub action: Action,
    pub current_weight: f64,
    pub target_weight: f64,
    pub change: f64,
}

/// A single asset weight with risk/return contribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetContribution {
    pub symbol: String,
    pub weight: f64,
    /// Weight times marginal risk; contributions sum to portfolio volatility.
    pub risk_contribution: f64,
    /// Weight times expected return.
    pub return_contribution: f64,
}

/// Output of [`optimize`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub objective: Objective,
    pub allocation: Portfolio,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: RatioValue,
    /// Weighted average asset volatility over portfolio volatility.
    pub diversification_ratio: RatioValue,
    pub hhi_concentration: f64,
    pub contributions: Vec<AssetContribution>,
    pub recommendations: Vec<Recommendation>,
    pub solver_iterations: u32,
}

/// A single point on the efficient frontier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: RatioValue,
    pub weights: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EfficientFrontier {
    pub symbols: Vec<String>,
    pub min_variance: FrontierPoint,
    pub points: Vec<FrontierPoint>,
    pub max_return: f64,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Optimize a portfolio under long-only box, sector, return and volatility
/// constraints.
pub fn optimize(
    request: &OptimizationRequest,
) -> QuantfolioResult<ComputationOutput<OptimizationResult>> {
    let start = Instant::now();
    validate_request(request)?;
    let sigma = request.covariance.resolve(&request.assets)?;
    run_optimization(request, &sigma, start)
}

/// Same as [`optimize`] but the covariance matrix is read from, or stored
/// in, `cache` under `key`.
pub fn optimize_with_cache(
    request: &OptimizationRequest,
    cache: &CovarianceCache,
    key: CovarianceKey,
) -> QuantfolioResult<ComputationOutput<OptimizationResult>> {
    let start = Instant::now();
    validate_request(request)?;
    let sigma = cache.get_or_compute(key, || request.covariance.resolve(&request.assets))?;
    run_optimization(request, &sigma, start)
}

/// Evenly spaced minimum-variance portfolios from the global minimum-variance
/// return up to the highest achievable return.
pub fn efficient_frontier(
    request: &OptimizationRequest,
    num_points: usize,
) -> QuantfolioResult<ComputationOutput<EfficientFrontier>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    if num_points < 2 {
        return Err(QuantfolioError::invalid(
            "points",
            "an efficient frontier needs at least 2 points",
        ));
    }
    validate_request(request)?;
    let sigma = request.covariance.resolve(&request.assets)?;
    let set = FeasibleSet::new(&request.assets, &request.constraints)?;
    let mu = expected_returns(&request.assets);
    let rf = request.risk_free_rate;
    let anchor = anchor_weights(request);
    let qp = MinVarianceQp::new(&sigma, &set, anchor.clone(), &request.solver);

    let mv = qp.solve(None, &anchor)?;
    if !mv.converged {
        warnings.push("Minimum-variance solve stopped at the iteration limit".into());
    }
    let r_mv = dot(&mu, &mv.weights);
    let (_, r_max) = set.return_range(&mu);
    let min_variance = frontier_point(&mv.weights, &mu, &sigma, rf);

    let mut points = Vec::with_capacity(num_points);
    let mut warm = mv.weights.clone();
    for k in 0..num_points {
        let target = r_mv + (r_max - r_mv) * k as f64 / (num_points - 1) as f64;
        let sol = if k == 0 {
            mv.clone()
        } else {
            qp.solve(Some(ReturnTarget { mu: &mu, target }), &warm)?
        };
        if !sol.converged {
            warnings.push(format!(
                "Frontier point at return {target:.4} stopped at the iteration limit"
            ));
        }
        warm = sol.weights.clone();
        points.push(frontier_point(&sol.weights, &mu, &sigma, rf));
    }

    let output = EfficientFrontier {
        symbols: request.assets.iter().map(|a| a.symbol.clone()).collect(),
        min_variance,
        points,
        max_return: r_max,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Constrained mean-variance efficient frontier (accelerated projected gradient)",
        &serde_json::json!({
            "n_assets": request.assets.len(),
            "points": num_points,
            "risk_free_rate": rf,
            "covariance_source": request.covariance.kind(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Nearest allocation to `weights` that satisfies `constraints`.
pub fn project_weights(
    assets: &[Asset],
    constraints: &Constraints,
    weights: &[f64],
) -> QuantfolioResult<Vec<f64>> {
    if weights.len() != assets.len() {
        return Err(QuantfolioError::invalid(
            "weights",
            format!("Expected {} weights but got {}", assets.len(), weights.len()),
        ));
    }
    if weights.iter().any(|w| !w.is_finite()) {
        return Err(QuantfolioError::invalid("weights", "must be finite"));
    }
    let set = FeasibleSet::new(assets, constraints)?;
    let projected = set.project(
        weights,
        None,
        SolverSettings::default().projection_iterations as usize,
    );
    set.finalize(projected)
}

// ---------------------------------------------------------------------------
// Core optimization routines
// ---------------------------------------------------------------------------

fn run_optimization(
    request: &OptimizationRequest,
    sigma: &CovarianceMatrix,
    start: Instant,
) -> QuantfolioResult<ComputationOutput<OptimizationResult>> {
    let mut warnings: Vec<String> = Vec::new();
    let n = request.assets.len();
    let set = FeasibleSet::new(&request.assets, &request.constraints)?;
    let mu = expected_returns(&request.assets);
    let rf = request.risk_free_rate;
    let anchor = anchor_weights(request);
    let qp = MinVarianceQp::new(sigma, &set, anchor.clone(), &request.solver);
    let constraints = &request.constraints;

    let solution = match request.objective {
        Objective::EqualWeight => QpSolution {
            weights: vec![1.0 / n as f64; n],
            iterations: 0,
            converged: true,
        },
        Objective::MinVolatility => solve_min_volatility(&qp, &mu, constraints, &anchor)?,
        Objective::TargetReturn { target } => {
            solve_target_return(&qp, &mu, constraints, target, &anchor)?
        }
        Objective::MaxSharpe => solve_max_sharpe(&qp, &mu, rf, constraints, &anchor)?,
    };
    if !solution.converged {
        warnings.push(format!(
            "Solver stopped at {} iterations before reaching tolerance {:e}",
            solution.iterations, request.solver.tolerance
        ));
    }

    // Post-solve: clip and renormalise onto the feasible set, then verify
    let projected = set.project(
        &solution.weights,
        None,
        request.solver.projection_iterations as usize,
    );
    let weights = set.finalize(projected)?;

    let expected_return = dot(&mu, &weights);
    let volatility = sigma.portfolio_volatility(&weights);
    if let Some(cap) = constraints.max_volatility {
        if volatility > cap + RETURN_TOLERANCE {
            return Err(QuantfolioError::ConstraintsInfeasible(format!(
                "Portfolio volatility {volatility:.6} exceeds max_volatility {cap}"
            )));
        }
    }

    let sharpe_ratio = RatioValue::from_result(excess_over_risk(expected_return, rf, volatility))?;
    let asset_vols = sigma.volatilities();
    let weighted_vol: f64 = dot(&weights, &asset_vols);
    let diversification_ratio = RatioValue::from_result(if volatility > 0.0 {
        Ok(weighted_vol / volatility)
    } else {
        Err(QuantfolioError::divide_by_zero(
            "diversification_ratio: portfolio volatility is zero",
        ))
    })?;

    // Σw is zero whenever wᵀΣw is, so zero contributions are exact there
    let sigma_w = sigma.times(&weights);
    let contributions: Vec<AssetContribution> = request
        .assets
        .iter()
        .enumerate()
        .map(|(i, asset)| AssetContribution {
            symbol: asset.symbol.clone(),
            weight: weights[i],
            risk_contribution: if volatility > 0.0 {
                weights[i] * sigma_w[i] / volatility
            } else {
                0.0
            },
            return_contribution: weights[i] * mu[i],
        })
        .collect();

    let recommendations = recommend(
        &request.assets,
        request.current_weights.as_deref(),
        &weights,
        constraints.rebalance_threshold,
    );

    let allocation = Portfolio::from_weights(&request.assets, &weights)?;
    let hhi_concentration = allocation.hhi();

    for c in &contributions {
        if c.weight > 0.40 {
            warn!(symbol = %c.symbol, weight = c.weight, "concentrated position");
            warnings.push(format!(
                "Concentrated position: {} has weight {:.4}",
                c.symbol, c.weight
            ));
        }
    }
    if hhi_concentration > 0.5 {
        warnings.push(format!("High concentration: HHI = {hhi_concentration:.4}"));
    }
    if volatility > 0.30 {
        warnings.push(format!("High portfolio volatility: {volatility:.4}"));
    }

    debug!(
        objective = request.objective.name(),
        iterations = solution.iterations,
        expected_return,
        volatility,
        "optimization finished"
    );

    let output = OptimizationResult {
        objective: request.objective,
        allocation,
        expected_return,
        volatility,
        sharpe_ratio,
        diversification_ratio,
        hhi_concentration,
        contributions,
        recommendations,
        solver_iterations: solution.iterations,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Constrained mean-variance optimization (accelerated projected gradient, exact sector-aware projection)",
        &serde_json::json!({
            "n_assets": n,
            "objective": request.objective,
            "risk_free_rate": rf,
            "covariance_source": request.covariance.kind(),
            "min_weight": constraints.min_weight,
            "max_weight": constraints.upper_bound(),
            "max_sector_weight": constraints.max_sector_weight,
            "rebalance_threshold": constraints.rebalance_threshold,
        }),
        warnings,
        elapsed,
        output,
    ))
}

fn solve_min_volatility(
    qp: &MinVarianceQp<'_>,
    mu: &[f64],
    constraints: &Constraints,
    start: &[f64],
) -> QuantfolioResult<QpSolution> {
    let mut sol = qp.solve(None, start)?;
    if let Some(floor) = constraints.target_return {
        if dot(mu, &sol.weights) < floor - RETURN_TOLERANCE {
            check_target(qp.set(), mu, floor)?;
            let floored = qp.solve(Some(ReturnTarget { mu, target: floor }), &sol.weights)?;
            sol = QpSolution {
                iterations: sol.iterations + floored.iterations,
                ..floored
            };
        }
    }
    Ok(sol)
}

fn solve_target_return(
    qp: &MinVarianceQp<'_>,
    mu: &[f64],
    constraints: &Constraints,
    target: f64,
    start: &[f64],
) -> QuantfolioResult<QpSolution> {
    if !target.is_finite() {
        return Err(QuantfolioError::invalid("objective.target", "must be finite"));
    }
    if let Some(floor) = constraints.target_return {
        if target < floor - RETURN_TOLERANCE {
            return Err(QuantfolioError::ConstraintsInfeasible(format!(
                "Target return {target} is below the return floor {floor}"
            )));
        }
    }
    check_target(qp.set(), mu, target)?;
    qp.solve(Some(ReturnTarget { mu, target }), start)
}

fn solve_max_sharpe(
    qp: &MinVarianceQp<'_>,
    mu: &[f64],
    rf: f64,
    constraints: &Constraints,
    start: &[f64],
) -> QuantfolioResult<QpSolution> {
    let sigma = qp.sigma();
    let floor = constraints.target_return;
    let cap = constraints.max_volatility;

    if let Some(w) = tangency_weights(sigma, mu, rf) {
        let ret = dot(mu, &w);
        let vol = sigma.portfolio_volatility(&w);
        let floor_ok = floor.map_or(true, |f| ret >= f - RETURN_TOLERANCE);
        let cap_ok = cap.map_or(true, |c| vol <= c);
        if qp.set().contains(&w, 1e-9) && floor_ok && cap_ok {
            debug!("unconstrained tangency portfolio is feasible");
            return Ok(QpSolution {
                weights: w,
                iterations: 0,
                converged: true,
            });
        }
    }

    let (_, r_max) = qp.set().return_range(mu);
    let mv = qp.solve(None, start)?;
    let r_mv = dot(mu, &mv.weights);
    let lo = match floor {
        Some(f) if f > r_mv => {
            check_target(qp.set(), mu, f)?;
            f
        }
        _ => r_mv,
    };
    let mut iterations = mv.iterations;
    let mut converged = mv.converged;
    let mut warm = mv.weights.clone();

    let mut solve_at = |target: f64| -> QuantfolioResult<QpSolution> {
        let sol = qp.solve(Some(ReturnTarget { mu, target }), &warm)?;
        iterations += sol.iterations;
        converged &= sol.converged;
        warm = sol.weights.clone();
        Ok(sol)
    };

    let best_return = if r_max - lo <= RETURN_TOLERANCE {
        lo
    } else {
        let tolerance = 1e-7 * (r_max - lo).max(1e-12);
        golden_section_max(
            |target| {
                let sol = solve_at(target)?;
                let ret = dot(mu, &sol.weights);
                let vol = sigma.portfolio_volatility(&sol.weights);
                Ok(sharpe_for_search(ret, rf, vol))
            },
            lo,
            r_max,
            tolerance,
        )?
    };

    let mut best = if best_return == r_mv && floor.map_or(true, |f| f <= r_mv) {
        mv
    } else {
        solve_at(best_return)?
    };

    if let Some(cap) = cap {
        if sigma.portfolio_volatility(&best.weights) > cap {
            let bottom = solve_at(lo)?;
            if sigma.portfolio_volatility(&bottom.weights) > cap {
                return Err(QuantfolioError::ConstraintsInfeasible(format!(
                    "Lowest achievable volatility {:.6} exceeds max_volatility {cap}",
                    sigma.portfolio_volatility(&bottom.weights)
                )));
            }
            // Volatility rises along the efficient branch, so bisect for the
            // highest return still under the ceiling.
            let (mut a, mut b) = (lo, best_return);
            let mut feasible = bottom;
            for _ in 0..60 {
                if b - a <= RETURN_TOLERANCE * 1e-3 {
                    break;
                }
                let mid = 0.5 * (a + b);
                let sol = solve_at(mid)?;
                if sigma.portfolio_volatility(&sol.weights) <= cap {
                    a = mid;
                    feasible = sol;
                } else {
                    b = mid;
                }
            }
            best = feasible;
        }
    }

    Ok(QpSolution {
        weights: best.weights,
        iterations,
        converged,
    })
}

/// Unconstrained tangency Σ⁻¹(μ − rf) normalised to full investment, when
/// the inverse exists and the normaliser is positive.
fn tangency_weights(sigma: &CovarianceMatrix, mu: &[f64], rf: f64) -> Option<Vec<f64>> {
    let inverse = mat_inverse(sigma.values()).ok()?;
    let excess: Vec<f64> = mu.iter().map(|m| m - rf).collect();
    let raw = mat_vec(&inverse, &excess);
    let denom: f64 = raw.iter().sum();
    if !denom.is_finite() || denom <= 1e-12 {
        return None;
    }
    Some(raw.iter().map(|v| v / denom).collect())
}

fn check_target(set: &FeasibleSet, mu: &[f64], target: f64) -> QuantfolioResult<()> {
    let (min, max) = set.return_range(mu);
    if target < min - RETURN_TOLERANCE || target > max + RETURN_TOLERANCE {
        return Err(QuantfolioError::InfeasibleTarget { target, min, max });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn expected_returns(assets: &[Asset]) -> Vec<f64> {
    assets.iter().map(|a| a.expected_return).collect()
}

/// Tie-break anchor: the current allocation, or equal weights.
fn anchor_weights(request: &OptimizationRequest) -> Vec<f64> {
    let n = request.assets.len();
    match &request.current_weights {
        Some(w) => w.clone(),
        None => vec![1.0 / n as f64; n],
    }
}

fn excess_over_risk(ret: f64, rf: f64, vol: f64) -> QuantfolioResult<f64> {
    if vol <= 0.0 {
        return Err(QuantfolioError::divide_by_zero(
            "sharpe_ratio: portfolio volatility is zero",
        ));
    }
    Ok((ret - rf) / vol)
}

/// Sharpe used while searching; a riskless point dominates when its excess
/// return is positive.
fn sharpe_for_search(ret: f64, rf: f64, vol: f64) -> f64 {
    if vol > 1e-15 {
        (ret - rf) / vol
    } else if ret > rf {
        f64::INFINITY
    } else {
        f64::NEG_INFINITY
    }
}

fn frontier_point(
    weights: &[f64],
    mu: &[f64],
    sigma: &CovarianceMatrix,
    rf: f64,
) -> FrontierPoint {
    let expected_return = dot(mu, weights);
    let volatility = sigma.portfolio_volatility(weights);
    let sharpe_ratio = match excess_over_risk(expected_return, rf, volatility) {
        Ok(value) => RatioValue::Defined { value },
        Err(e) => RatioValue::Undefined {
            reason: e.to_string(),
        },
    };
    FrontierPoint {
        expected_return,
        volatility,
        sharpe_ratio,
        weights: weights.to_vec(),
    }
}

fn recommend(
    assets: &[Asset],
    current: Option<&[f64]>,
    target: &[f64],
    threshold: f64,
) -> Vec<Recommendation> {
    assets
        .iter()
        .enumerate()
        .map(|(i, asset)| {
            let current_weight = current.map_or(0.0, |c| c[i]);
            let change = target[i] - current_weight;
            let action = if change > threshold {
                Action::Buy
            } else if change < -threshold {
                Action::Sell
            } else {
                Action::Hold
            };
            Recommendation {
                symbol: asset.symbol.clone(),
                action,
                current_weight,
                target_weight: target[i],
                change,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_request(request: &OptimizationRequest) -> QuantfolioResult<()> {
    let n = request.assets.len();
    if n == 0 {
        return Err(QuantfolioError::InsufficientData(
            "At least one asset is required".into(),
        ));
    }
    for (i, asset) in request.assets.iter().enumerate() {
        if request.assets[..i].iter().any(|a| a.symbol == asset.symbol) {
            return Err(QuantfolioError::invalid(
                "assets",
                format!("Duplicate symbol {}", asset.symbol),
            ));
        }
        if !asset.expected_return.is_finite() {
            return Err(QuantfolioError::invalid(
                format!("assets[{}].expected_return", asset.symbol),
                "must be finite",
            ));
        }
        if !asset.volatility.is_finite() || asset.volatility < 0.0 {
            return Err(QuantfolioError::invalid(
                format!("assets[{}].volatility", asset.symbol),
                "must be non-negative and finite",
            ));
        }
    }
    if !request.risk_free_rate.is_finite() {
        return Err(QuantfolioError::invalid("risk_free_rate", "must be finite"));
    }
    if let Some(current) = &request.current_weights {
        if current.len() != n {
            return Err(QuantfolioError::invalid(
                "current_weights",
                format!("Expected {n} weights but got {}", current.len()),
            ));
        }
        if current.iter().any(|w| !w.is_finite()) {
            return Err(QuantfolioError::invalid("current_weights", "must be finite"));
        }
    }
    request.constraints.validate()?;
    request.solver.validate()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(symbol: &str, expected_return: f64, volatility: f64, sector: &str) -> Asset {
        Asset {
            symbol: symbol.into(),
            price: 100.0,
            expected_return,
            volatility,
            beta: 1.0,
            sector: sector.into(),
            market_cap: 0.0,
        }
    }

    fn three_asset_request(objective: Objective) -> OptimizationRequest {
        let corr = vec![
            vec![1.0, 0.3, 0.1],
            vec![0.3, 1.0, 0.5],
            vec![0.1, 0.5, 1.0],
        ];
        OptimizationRequest {
            assets: vec![
                asset("EQ", 0.10, 0.15, "Equity"),
                asset("BD", 0.04, 0.20, "Bonds"),
                asset("CM", 0.07, 0.25, "Commodities"),
            ],
            covariance: CovarianceSource::Assumed {
                correlation: Some(corr),
            },
            constraints: Constraints::default(),
            objective,
            risk_free_rate: 0.02,
            current_weights: None,
            solver: SolverSettings::default(),
        }
    }

    fn weights(out: &ComputationOutput<OptimizationResult>) -> Vec<f64> {
        out.result.allocation.weights()
    }

    // ------------------------------------------------------------------
    // 1. Equal weight
    // ------------------------------------------------------------------
    #[test]
    fn test_equal_weight() {
        let out = optimize(&three_asset_request(Objective::EqualWeight)).unwrap();
        for w in weights(&out) {
            assert!((w - 1.0 / 3.0).abs() < 1e-12);
        }
        assert_eq!(out.result.solver_iterations, 0);
    }

    // ------------------------------------------------------------------
    // 2. Equal weight clipped by bounds
    // ------------------------------------------------------------------
    #[test]
    fn test_equal_weight_respects_sector_cap() {
        let mut req = three_asset_request(Objective::EqualWeight);
        req.assets[1].sector = "Equity".into();
        req.constraints.max_sector_weight = Some(0.5);
        let out = optimize(&req).unwrap();
        let w = weights(&out);
        assert!(w[0] + w[1] <= 0.5 + 1e-6);
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-6);
    }

    // ------------------------------------------------------------------
    // 3. Min volatility beats equal weight
    // ------------------------------------------------------------------
    #[test]
    fn test_min_volatility_below_equal_weight() {
        let mv = optimize(&three_asset_request(Objective::MinVolatility)).unwrap();
        let ew = optimize(&three_asset_request(Objective::EqualWeight)).unwrap();
        assert!(mv.result.volatility <= ew.result.volatility + 1e-9);
    }

    // ------------------------------------------------------------------
    // 4. Return floor binds for min volatility
    // ------------------------------------------------------------------
    #[test]
    fn test_min_volatility_with_return_floor() {
        let mut req = three_asset_request(Objective::MinVolatility);
        req.constraints.target_return = Some(0.09);
        let out = optimize(&req).unwrap();
        assert!(out.result.expected_return >= 0.09 - 1e-6);
    }

    // ------------------------------------------------------------------
    // 5. Target return is hit
    // ------------------------------------------------------------------
    #[test]
    fn test_target_return_hit() {
        let out = optimize(&three_asset_request(Objective::TargetReturn {
            target: 0.08,
        }))
        .unwrap();
        assert!((out.result.expected_return - 0.08).abs() < 1e-6);
    }

    // ------------------------------------------------------------------
    // 6. Unreachable target
    // ------------------------------------------------------------------
    #[test]
    fn test_target_return_out_of_range() {
        let err = optimize(&three_asset_request(Objective::TargetReturn {
            target: 0.30,
        }))
        .unwrap_err();
        match err {
            QuantfolioError::InfeasibleTarget { target, min, max } => {
                assert_eq!(target, 0.30);
                assert!((min - 0.04).abs() < 1e-12);
                assert!((max - 0.10).abs() < 1e-12);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    // ------------------------------------------------------------------
    // 7. Max Sharpe dominates the other objectives
    // ------------------------------------------------------------------
    #[test]
    fn test_max_sharpe_dominates() {
        let ms = optimize(&three_asset_request(Objective::MaxSharpe)).unwrap();
        let mv = optimize(&three_asset_request(Objective::MinVolatility)).unwrap();
        let ew = optimize(&three_asset_request(Objective::EqualWeight)).unwrap();
        let s = ms.result.sharpe_ratio.value().unwrap();
        assert!(s >= mv.result.sharpe_ratio.value().unwrap() - 1e-6);
        assert!(s >= ew.result.sharpe_ratio.value().unwrap() - 1e-6);
    }

    // ------------------------------------------------------------------
    // 8. Max Sharpe under a volatility ceiling
    // ------------------------------------------------------------------
    #[test]
    fn test_max_sharpe_volatility_ceiling() {
        let mut req = three_asset_request(Objective::MaxSharpe);
        req.constraints.max_volatility = Some(0.14);
        let out = optimize(&req).unwrap();
        assert!(out.result.volatility <= 0.14 + 1e-9);

        req.constraints.max_volatility = Some(0.01);
        assert!(matches!(
            optimize(&req),
            Err(QuantfolioError::ConstraintsInfeasible(_))
        ));
    }

    // ------------------------------------------------------------------
    // 9. Max weight bound binds
    // ------------------------------------------------------------------
    #[test]
    fn test_max_sharpe_respects_max_weight() {
        let mut req = three_asset_request(Objective::MaxSharpe);
        req.constraints.max_weight = 0.5;
        let out = optimize(&req).unwrap();
        for w in weights(&out) {
            assert!(w <= 0.5 + 1e-6 && w >= -1e-9);
        }
    }

    // ------------------------------------------------------------------
    // 10. Recommendations
    // ------------------------------------------------------------------
    #[test]
    fn test_recommendations_from_current_weights() {
        let mut req = three_asset_request(Objective::EqualWeight);
        req.current_weights = Some(vec![0.6, 0.3, 0.1]);
        let out = optimize(&req).unwrap();
        let actions: Vec<Action> = out.result.recommendations.iter().map(|r| r.action).collect();
        assert_eq!(actions, vec![Action::Sell, Action::Hold, Action::Buy]);
    }

    #[test]
    fn test_recommendations_default_to_buy() {
        let out = optimize(&three_asset_request(Objective::EqualWeight)).unwrap();
        assert!(out
            .result
            .recommendations
            .iter()
            .all(|r| r.action == Action::Buy && r.current_weight == 0.0));
    }

    // ------------------------------------------------------------------
    // 11. Contributions add up
    // ------------------------------------------------------------------
    #[test]
    fn test_risk_contributions_sum_to_volatility() {
        let out = optimize(&three_asset_request(Objective::MaxSharpe)).unwrap();
        let total: f64 = out.result.contributions.iter().map(|c| c.risk_contribution).sum();
        assert!((total - out.result.volatility).abs() < 1e-9);
        let ret: f64 = out.result.contributions.iter().map(|c| c.return_contribution).sum();
        assert!((ret - out.result.expected_return).abs() < 1e-12);
    }

    // ------------------------------------------------------------------
    // 12. Zero volatility yields undefined ratios
    // ------------------------------------------------------------------
    #[test]
    fn test_zero_volatility_ratios_undefined() {
        let mut req = three_asset_request(Objective::EqualWeight);
        for a in req.assets.iter_mut() {
            a.volatility = 0.0;
        }
        req.covariance = CovarianceSource::Assumed { correlation: None };
        let out = optimize(&req).unwrap();
        assert!(!out.result.sharpe_ratio.is_defined());
        assert!(!out.result.diversification_ratio.is_defined());
    }

    // ------------------------------------------------------------------
    // 13. Frontier
    // ------------------------------------------------------------------
    #[test]
    fn test_frontier_monotonic() {
        let out = efficient_frontier(&three_asset_request(Objective::MinVolatility), 8).unwrap();
        let pts = &out.result.points;
        assert_eq!(pts.len(), 8);
        for pair in pts.windows(2) {
            assert!(pair[1].expected_return >= pair[0].expected_return - 1e-9);
            assert!(pair[1].volatility >= pair[0].volatility - 1e-7);
        }
        assert!((pts[7].expected_return - out.result.max_return).abs() < 1e-6);
    }

    #[test]
    fn test_frontier_needs_two_points() {
        assert!(efficient_frontier(&three_asset_request(Objective::MinVolatility), 1).is_err());
    }

    // ------------------------------------------------------------------
    // 14. Projection helper
    // ------------------------------------------------------------------
    #[test]
    fn test_project_weights() {
        let req = three_asset_request(Objective::EqualWeight);
        let c = Constraints {
            max_weight: 0.5,
            ..Default::default()
        };
        let w = project_weights(&req.assets, &c, &[0.9, 0.1, 0.0]).unwrap();
        assert!((w[0] - 0.5).abs() < 1e-9);
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    // ------------------------------------------------------------------
    // 15. Validation
    // ------------------------------------------------------------------
    #[test]
    fn test_duplicate_symbols_rejected() {
        let mut req = three_asset_request(Objective::EqualWeight);
        req.assets[1].symbol = "EQ".into();
        assert!(matches!(
            optimize(&req),
            Err(QuantfolioError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_historical_dimension_mismatch() {
        let mut req = three_asset_request(Objective::MinVolatility);
        req.covariance = CovarianceSource::Historical {
            returns: vec![vec![0.01, 0.02, -0.01]; 2],
            frequency: ReturnFrequency::Daily,
        };
        assert!(optimize(&req).is_err());
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let json = r#"{
            "assets": [
                {"symbol": "A", "expected_return": 0.08, "volatility": 0.2},
                {"symbol": "B", "expected_return": 0.05, "volatility": 0.1}
            ],
            "objective": {"type": "target_return", "target": 0.06}
        }"#;
        let req: OptimizationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.objective, Objective::TargetReturn { target: 0.06 });
        assert_eq!(req.constraints, Constraints::default());
        assert_eq!(req.covariance, CovarianceSource::default());
        let out = optimize(&req).unwrap();
        assert!((out.result.expected_return - 0.06).abs() < 1e-6);
    }

    #[test]
    fn test_methodology_and_precision() {
        let out = optimize(&three_asset_request(Objective::EqualWeight)).unwrap();
        assert!(out.methodology.contains("mean-variance"));
        assert_eq!(out.metadata.precision, "ieee754_f64");
    }
}

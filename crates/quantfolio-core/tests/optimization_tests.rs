use pretty_assertions::assert_eq;
use quantfolio_core::optimization::{
    efficient_frontier, optimize, optimize_with_cache, Constraints, CovarianceSource, Objective,
    OptimizationRequest,
};
use quantfolio_core::statistics::{CovarianceCache, CovarianceKey};
use quantfolio_core::{Asset, QuantfolioError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

// ===========================================================================
// Mean-variance optimizer: public API behaviour
// ===========================================================================

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

fn three_assets() -> Vec<Asset> {
    vec![
        asset("GROWTH", 0.15, 0.25, "Technology"),
        asset("CORE", 0.10, 0.18, "Industrials"),
        asset("DEFENSIVE", 0.05, 0.10, "Utilities"),
    ]
}

fn request(objective: Objective) -> OptimizationRequest {
    OptimizationRequest {
        assets: three_assets(),
        covariance: CovarianceSource::default(),
        constraints: Constraints::default(),
        objective,
        risk_free_rate: 0.02,
        current_weights: None,
        solver: Default::default(),
    }
}

/// Eight assets with a random but valid correlation structure.
fn random_universe(seed: u64) -> OptimizationRequest {
    sectored_universe(seed, 8, &["Even", "Odd"])
}

/// `n` random assets assigned to `sectors` round-robin.
fn sectored_universe(seed: u64, n: usize, sectors: &[&str]) -> OptimizationRequest {
    let mut rng = StdRng::seed_from_u64(seed);
    let assets: Vec<Asset> = (0..n)
        .map(|i| {
            asset(
                &format!("S{i}"),
                rng.gen_range(0.02..0.18),
                rng.gen_range(0.08..0.40),
                sectors[i % sectors.len()],
            )
        })
        .collect();
    // One-factor correlation keeps the matrix positive definite
    let loadings: Vec<f64> = (0..n).map(|_| rng.gen_range(0.1..0.8)).collect();
    let correlation: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            (0..n)
                .map(|j| if i == j { 1.0 } else { loadings[i] * loadings[j] })
                .collect()
        })
        .collect();
    OptimizationRequest {
        assets,
        covariance: CovarianceSource::Assumed {
            correlation: Some(correlation),
        },
        constraints: Constraints::default(),
        objective: Objective::MinVolatility,
        risk_free_rate: 0.02,
        current_weights: None,
        solver: Default::default(),
    }
}

// ---------------------------------------------------------------------------
// Weight invariants
// ---------------------------------------------------------------------------

#[test]
fn test_weights_sum_to_one_and_respect_bounds() {
    for seed in [1, 7, 42] {
        for objective in [
            Objective::MinVolatility,
            Objective::MaxSharpe,
            Objective::EqualWeight,
        ] {
            let mut req = random_universe(seed);
            req.objective = objective;
            req.constraints.max_weight = 0.30;
            req.constraints.min_weight = 0.02;
            let out = optimize(&req).unwrap();
            let weights = out.result.allocation.weights();
            let total: f64 = weights.iter().sum();
            assert!((total - 1.0).abs() < 1e-6, "seed {seed}: sum {total}");
            for w in weights {
                assert!((0.02 - 1e-6..=0.30 + 1e-6).contains(&w), "seed {seed}: weight {w}");
            }
        }
    }
}

#[test]
fn test_sector_cap_respected() {
    let mut req = random_universe(3);
    req.objective = Objective::MaxSharpe;
    req.constraints.max_sector_weight = Some(0.55);
    let out = optimize(&req).unwrap();
    let exposure = out.result.allocation.sector_exposure();
    for (sector, w) in exposure {
        assert!(w <= 0.55 + 1e-6, "{sector} at {w}");
    }
}

#[test]
fn test_sector_capped_max_sharpe_stays_fast() {
    for seed in [5, 11, 23] {
        let mut req = sectored_universe(seed, 10, &["Tech", "Energy", "Health", "Utilities"]);
        req.objective = Objective::MaxSharpe;
        req.constraints.min_weight = 0.02;
        req.constraints.max_weight = 0.3;
        req.constraints.max_sector_weight = Some(0.35);

        let start = Instant::now();
        let out = optimize(&req).unwrap();
        let elapsed = start.elapsed();

        assert!(
            out.result.solver_iterations < 100_000,
            "seed {seed}: {} iterations",
            out.result.solver_iterations
        );
        assert!(elapsed < Duration::from_secs(10), "seed {seed}: took {elapsed:?}");
        for (sector, w) in out.result.allocation.sector_exposure() {
            assert!(w <= 0.35 + 1e-6, "seed {seed}: {sector} at {w}");
        }
    }
}

#[test]
fn test_identical_assets_keep_current_split() {
    // Perfectly correlated twins: every split has the same risk and return
    let assets = vec![
        asset("TWIN_A", 0.08, 0.2, "Technology"),
        asset("TWIN_B", 0.08, 0.2, "Technology"),
    ];
    for objective in [Objective::MinVolatility, Objective::MaxSharpe] {
        let req = OptimizationRequest {
            assets: assets.clone(),
            covariance: CovarianceSource::Assumed {
                correlation: Some(vec![vec![1.0, 1.0], vec![1.0, 1.0]]),
            },
            constraints: Constraints::default(),
            objective,
            risk_free_rate: 0.02,
            current_weights: Some(vec![0.8, 0.2]),
            solver: Default::default(),
        };
        let weights = optimize(&req).unwrap().result.allocation.weights();
        assert!((weights[0] - 0.8).abs() < 1e-6, "{objective:?}: {weights:?}");
        assert!((weights[1] - 0.2).abs() < 1e-6, "{objective:?}: {weights:?}");
    }
}

// ---------------------------------------------------------------------------
// Objectives
// ---------------------------------------------------------------------------

#[test]
fn test_min_volatility_not_above_equal_weight() {
    for seed in [5, 11, 23] {
        let mut req = random_universe(seed);
        let min_vol = optimize(&req).unwrap().result.volatility;
        req.objective = Objective::EqualWeight;
        let ew = optimize(&req).unwrap().result.volatility;
        assert!(min_vol <= ew + 1e-9, "seed {seed}: {min_vol} > {ew}");
    }
}

#[test]
fn test_three_asset_zero_correlation_min_volatility() {
    // Inverse-variance weights: the lowest-volatility asset dominates
    let out = optimize(&request(Objective::MinVolatility)).unwrap();
    let w = out.result.allocation.weights();
    assert!(w[2] > w[1] && w[1] > w[0], "weights {w:?}");
    let inv: Vec<f64> = three_assets()
        .iter()
        .map(|a| 1.0 / (a.volatility * a.volatility))
        .collect();
    let total: f64 = inv.iter().sum();
    for (wi, ii) in w.iter().zip(&inv) {
        assert!((wi - ii / total).abs() < 1e-4);
    }
    assert!(out.result.volatility <= 0.10);
    assert!((out.result.volatility - (1.0 / total).sqrt()).abs() < 1e-6);
}

#[test]
fn test_infeasible_target_return() {
    let err = optimize(&request(Objective::TargetReturn { target: 0.30 })).unwrap_err();
    match err {
        QuantfolioError::InfeasibleTarget { target, max, .. } => {
            assert_eq!(target, 0.30);
            assert!((max - 0.15).abs() < 1e-12);
        }
        other => panic!("expected InfeasibleTarget, got {other:?}"),
    }
}

#[test]
fn test_target_return_is_met() {
    let out = optimize(&request(Objective::TargetReturn { target: 0.12 })).unwrap();
    assert!((out.result.expected_return - 0.12).abs() < 1e-6);
}

#[test]
fn test_optimize_is_deterministic() {
    let req = random_universe(99);
    let a = optimize(&req).unwrap().result.allocation.weights();
    let b = optimize(&req).unwrap().result.allocation.weights();
    assert_eq!(a, b);
}

#[test]
fn test_infeasible_constraints() {
    let mut req = request(Objective::MinVolatility);
    req.constraints.max_weight = 0.2;
    assert!(matches!(
        optimize(&req),
        Err(QuantfolioError::ConstraintsInfeasible(_))
    ));
}

// ---------------------------------------------------------------------------
// Frontier and cache
// ---------------------------------------------------------------------------

#[test]
fn test_frontier_volatility_increases_with_return() {
    let out = efficient_frontier(&random_universe(8), 6).unwrap();
    let points = &out.result.points;
    assert_eq!(points.len(), 6);
    for pair in points.windows(2) {
        assert!(pair[1].expected_return >= pair[0].expected_return - 1e-9);
        assert!(pair[1].volatility >= pair[0].volatility - 1e-7);
    }
}

#[test]
fn test_cached_optimization_matches_uncached() {
    let req = random_universe(17);
    let cache = CovarianceCache::new();
    let key = CovarianceKey::new(
        req.assets.iter().map(|a| a.symbol.clone()).collect(),
        0,
        None,
    );
    let first = optimize_with_cache(&req, &cache, key.clone()).unwrap();
    let second = optimize_with_cache(&req, &cache, key).unwrap();
    let plain = optimize(&req).unwrap();
    assert_eq!(cache.misses(), 1);
    assert_eq!(cache.hits(), 1);
    assert_eq!(
        first.result.allocation.weights(),
        second.result.allocation.weights()
    );
    assert_eq!(
        first.result.allocation.weights(),
        plain.result.allocation.weights()
    );
}

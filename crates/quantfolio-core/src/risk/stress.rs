use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::QuantfolioError;
use crate::types::{with_metadata, ComputationOutput, Portfolio};
use crate::QuantfolioResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A deterministic shock scenario. Returns are fractional (-0.30 = -30%).
///
/// An asset's shocked return is its symbol shock when one is given,
/// otherwise `beta × market_shock + sector_shock`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressScenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub market_shock: f64,
    #[serde(default)]
    pub sector_shocks: BTreeMap<String, f64>,
    #[serde(default)]
    pub symbol_shocks: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Classify a portfolio return under stress by the size of the loss.
    pub fn from_impact(impact: f64) -> Self {
        let loss = -impact;
        if loss >= 0.30 {
            Severity::Critical
        } else if loss >= 0.15 {
            Severity::High
        } else if loss >= 0.05 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionImpact {
    pub symbol: String,
    pub weight: f64,
    /// Shocked return applied to the position
    pub shock: f64,
    /// weight × shock
    pub contribution: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario: String,
    pub portfolio_impact: f64,
    pub severity: Severity,
    pub position_impacts: Vec<PositionImpact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressTestReport {
    pub scenarios: Vec<ScenarioResult>,
    pub worst_scenario: String,
    pub worst_impact: f64,
    pub average_impact: f64,
}

// ---------------------------------------------------------------------------
// Built-in scenarios
// ---------------------------------------------------------------------------

fn shocks(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// Six standard historical and hypothetical scenarios.
pub fn standard_scenarios() -> Vec<StressScenario> {
    vec![
        StressScenario {
            name: "2008 Financial Crisis".into(),
            description: "Credit crunch and broad equity sell-off".into(),
            market_shock: -0.37,
            sector_shocks: shocks(&[("Financials", -0.15), ("Real Estate", -0.10)]),
            symbol_shocks: BTreeMap::new(),
        },
        StressScenario {
            name: "COVID-19 Market Crash".into(),
            description: "Pandemic shutdown, February to March 2020".into(),
            market_shock: -0.23,
            sector_shocks: shocks(&[("Energy", -0.15), ("Technology", 0.08)]),
            symbol_shocks: BTreeMap::new(),
        },
        StressScenario {
            name: "Dot-com Bubble Burst".into(),
            description: "Technology valuation collapse, 2000 to 2002".into(),
            market_shock: -0.31,
            sector_shocks: shocks(&[("Technology", -0.25)]),
            symbol_shocks: BTreeMap::new(),
        },
        StressScenario {
            name: "Interest Rate Shock (+3%)".into(),
            description: "Parallel 300bp rise in rates".into(),
            market_shock: -0.15,
            sector_shocks: shocks(&[
                ("Real Estate", -0.08),
                ("Utilities", -0.06),
                ("Financials", 0.04),
            ]),
            symbol_shocks: BTreeMap::new(),
        },
        StressScenario {
            name: "Inflation Spike (+5%)".into(),
            description: "Sustained inflation surprise".into(),
            market_shock: -0.12,
            sector_shocks: shocks(&[("Energy", 0.10), ("Consumer Discretionary", -0.06)]),
            symbol_shocks: BTreeMap::new(),
        },
        StressScenario {
            name: "Currency Crisis".into(),
            description: "Sharp dollar move and emerging-market contagion".into(),
            market_shock: -0.18,
            sector_shocks: BTreeMap::new(),
            symbol_shocks: BTreeMap::new(),
        },
    ]
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Apply each scenario to the holdings and report the portfolio impact.
pub fn stress_test(
    portfolio: &Portfolio,
    scenarios: &[StressScenario],
) -> QuantfolioResult<ComputationOutput<StressTestReport>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    portfolio.validate()?;
    if scenarios.is_empty() {
        return Err(QuantfolioError::invalid(
            "scenarios",
            "at least one scenario is required",
        ));
    }

    let mut results = Vec::with_capacity(scenarios.len());
    for scenario in scenarios {
        validate_scenario(scenario)?;

        let mut position_impacts = Vec::with_capacity(portfolio.len());
        for h in &portfolio.holdings {
            let raw = match scenario.symbol_shocks.get(&h.asset.symbol) {
                Some(s) => *s,
                None => {
                    h.asset.beta * scenario.market_shock
                        + scenario.sector_shocks.get(&h.asset.sector).copied().unwrap_or(0.0)
                }
            };
            // A long position cannot lose more than its value
            let shock = if raw < -1.0 {
                warnings.push(format!(
                    "{}: shock on {} of {raw:.4} capped at -1.0",
                    scenario.name, h.asset.symbol
                ));
                -1.0
            } else {
                raw
            };
            position_impacts.push(PositionImpact {
                symbol: h.asset.symbol.clone(),
                weight: h.weight,
                shock,
                contribution: h.weight * shock,
            });
        }

        let portfolio_impact: f64 = position_impacts.iter().map(|p| p.contribution).sum();
        results.push(ScenarioResult {
            scenario: scenario.name.clone(),
            portfolio_impact,
            severity: Severity::from_impact(portfolio_impact),
            position_impacts,
        });
    }

    let mut worst = &results[0];
    for r in &results[1..] {
        if r.portfolio_impact < worst.portfolio_impact {
            worst = r;
        }
    }
    let worst_scenario = worst.scenario.clone();
    let worst_impact = worst.portfolio_impact;
    let average_impact =
        results.iter().map(|r| r.portfolio_impact).sum::<f64>() / results.len() as f64;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Deterministic scenario stress test (beta-scaled market shock plus sector shock)",
        &serde_json::json!({
            "scenarios": scenarios.len(),
            "holdings": portfolio.len(),
            "severity_thresholds": { "critical": 0.30, "high": 0.15, "medium": 0.05 },
        }),
        warnings,
        elapsed,
        StressTestReport {
            scenarios: results,
            worst_scenario,
            worst_impact,
            average_impact,
        },
    ))
}

fn validate_scenario(scenario: &StressScenario) -> QuantfolioResult<()> {
    let field = |what: &str| format!("scenarios[{}].{what}", scenario.name);
    if !scenario.market_shock.is_finite() {
        return Err(QuantfolioError::invalid(field("market_shock"), "must be finite"));
    }
    for (name, shock) in scenario.sector_shocks.iter().chain(&scenario.symbol_shocks) {
        if !shock.is_finite() || *shock < -1.0 {
            return Err(QuantfolioError::invalid(
                field(name),
                format!("shock {shock} must be finite and at least -1.0"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Asset;

    fn asset(symbol: &str, sector: &str, beta: f64) -> Asset {
        Asset {
            symbol: symbol.into(),
            price: 50.0,
            expected_return: 0.08,
            volatility: 0.2,
            beta,
            sector: sector.into(),
            market_cap: 0.0,
        }
    }

    fn portfolio() -> Portfolio {
        let assets = vec![
            asset("BANK", "Financials", 1.2),
            asset("SOFT", "Technology", 1.1),
            asset("UTIL", "Utilities", 0.5),
        ];
        Portfolio::from_weights(&assets, &[0.4, 0.4, 0.2]).unwrap()
    }

    #[test]
    fn test_beta_and_sector_shock_combine() {
        let scenario = StressScenario {
            name: "test".into(),
            description: String::new(),
            market_shock: -0.10,
            sector_shocks: shocks(&[("Financials", -0.05)]),
            symbol_shocks: BTreeMap::new(),
        };
        let out = stress_test(&portfolio(), &[scenario]).unwrap();
        let r = &out.result.scenarios[0];
        assert!((r.position_impacts[0].shock - (-0.17)).abs() < 1e-12);
        assert!((r.position_impacts[2].shock - (-0.05)).abs() < 1e-12);
        // 0.4×-0.17 + 0.4×-0.11 + 0.2×-0.05
        assert!((r.portfolio_impact - (-0.122)).abs() < 1e-12);
        assert_eq!(r.severity, Severity::Medium);
    }

    #[test]
    fn test_symbol_shock_overrides() {
        let scenario = StressScenario {
            name: "idiosyncratic".into(),
            description: String::new(),
            market_shock: -0.20,
            sector_shocks: shocks(&[("Technology", -0.10)]),
            symbol_shocks: shocks(&[("SOFT", 0.05)]),
        };
        let out = stress_test(&portfolio(), &[scenario]).unwrap();
        assert!((out.result.scenarios[0].position_impacts[1].shock - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_worst_scenario_among_standard_set() {
        let out = stress_test(&portfolio(), &standard_scenarios()).unwrap();
        assert_eq!(out.result.scenarios.len(), 6);
        assert_eq!(out.result.worst_scenario, "2008 Financial Crisis");
        assert!(out
            .result
            .scenarios
            .iter()
            .all(|s| s.portfolio_impact >= out.result.worst_impact));
        assert_eq!(out.result.scenarios[0].severity, Severity::Critical);
    }

    #[test]
    fn test_shock_capped_at_total_loss() {
        let scenario = StressScenario {
            name: "wipeout".into(),
            description: String::new(),
            market_shock: -0.9,
            sector_shocks: shocks(&[("Financials", -0.5)]),
            symbol_shocks: BTreeMap::new(),
        };
        let out = stress_test(&portfolio(), &[scenario]).unwrap();
        assert_eq!(out.result.scenarios[0].position_impacts[0].shock, -1.0);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_rejects_empty_and_invalid_scenarios() {
        assert!(stress_test(&portfolio(), &[]).is_err());
        let bad = StressScenario {
            name: "bad".into(),
            description: String::new(),
            market_shock: f64::NAN,
            sector_shocks: BTreeMap::new(),
            symbol_shocks: BTreeMap::new(),
        };
        assert!(matches!(
            stress_test(&portfolio(), &[bad]),
            Err(QuantfolioError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_severity_thresholds() {
        assert_eq!(Severity::from_impact(-0.30), Severity::Critical);
        assert_eq!(Severity::from_impact(-0.15), Severity::High);
        assert_eq!(Severity::from_impact(-0.05), Severity::Medium);
        assert_eq!(Severity::from_impact(0.02), Severity::Low);
    }
}

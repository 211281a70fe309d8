use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::QuantfolioError;
use crate::optimization::{Constraints, Objective};
use crate::statistics::ReturnFrequency;
use crate::types::WEIGHT_SUM_TOLERANCE;
use crate::QuantfolioResult;

/// How target weights are chosen at each rebalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AllocationRule {
    /// Constant weights keyed by symbol; unlisted symbols get zero.
    FixedWeights { weights: BTreeMap<String, f64> },
    EqualWeight,
    /// Mean-variance solve on the trailing `lookback` returns.
    MeanVariance {
        objective: Objective,
        #[serde(default)]
        constraints: Constraints,
        lookback: usize,
    },
    /// Equal weight across the `top_n` best trailing performers.
    Momentum { lookback: usize, top_n: usize },
    /// Weights proportional to 1 / trailing volatility.
    InverseVolatility { lookback: usize },
}

impl AllocationRule {
    pub fn name(&self) -> &'static str {
        match self {
            AllocationRule::FixedWeights { .. } => "fixed_weights",
            AllocationRule::EqualWeight => "equal_weight",
            AllocationRule::MeanVariance { .. } => "mean_variance",
            AllocationRule::Momentum { .. } => "momentum",
            AllocationRule::InverseVolatility { .. } => "inverse_volatility",
        }
    }

    /// Returns needed before the first allocation.
    pub fn lookback(&self) -> usize {
        match self {
            AllocationRule::FixedWeights { .. } | AllocationRule::EqualWeight => 0,
            AllocationRule::MeanVariance { lookback, .. }
            | AllocationRule::Momentum { lookback, .. }
            | AllocationRule::InverseVolatility { lookback } => *lookback,
        }
    }

    /// Check the rule against the traded universe.
    pub fn validate(&self, symbols: &[String]) -> QuantfolioResult<()> {
        match self {
            AllocationRule::FixedWeights { weights } => {
                for (symbol, w) in weights {
                    if !symbols.contains(symbol) {
                        return Err(QuantfolioError::invalid(
                            format!("rule.weights.{symbol}"),
                            "symbol is not in the price history",
                        ));
                    }
                    if !w.is_finite() || *w < 0.0 {
                        return Err(QuantfolioError::invalid(
                            format!("rule.weights.{symbol}"),
                            "must be non-negative and finite",
                        ));
                    }
                }
                let total: f64 = weights.values().sum();
                if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
                    return Err(QuantfolioError::invalid(
                        "rule.weights",
                        format!("Weights sum to {total:.8}, expected 1.0"),
                    ));
                }
            }
            AllocationRule::EqualWeight => {}
            AllocationRule::MeanVariance {
                lookback,
                constraints,
                ..
            } => {
                if *lookback < 2 {
                    return Err(QuantfolioError::invalid(
                        "rule.lookback",
                        "mean-variance needs at least 2 trailing returns",
                    ));
                }
                constraints.validate()?;
            }
            AllocationRule::Momentum { lookback, top_n } => {
                if *lookback == 0 {
                    return Err(QuantfolioError::invalid("rule.lookback", "must be at least 1"));
                }
                if *top_n == 0 || *top_n > symbols.len() {
                    return Err(QuantfolioError::invalid(
                        "rule.top_n",
                        format!("must be between 1 and {}", symbols.len()),
                    ));
                }
            }
            AllocationRule::InverseVolatility { lookback } => {
                if *lookback < 2 {
                    return Err(QuantfolioError::invalid(
                        "rule.lookback",
                        "inverse volatility needs at least 2 trailing returns",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// When the portfolio is brought back to target weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceFrequency {
    EveryPeriod,
    Monthly,
    Quarterly,
    Annually,
    EveryNPeriods(usize),
}

impl RebalanceFrequency {
    /// Whether the bar at `current` triggers a rebalance. Calendar
    /// frequencies fire on the first bar of a new month, quarter or year.
    pub fn is_due(&self, previous: NaiveDate, current: NaiveDate, periods_since: usize) -> bool {
        match self {
            RebalanceFrequency::EveryPeriod => true,
            RebalanceFrequency::Monthly => {
                (current.year(), current.month()) != (previous.year(), previous.month())
            }
            RebalanceFrequency::Quarterly => {
                (current.year(), current.month0() / 3) != (previous.year(), previous.month0() / 3)
            }
            RebalanceFrequency::Annually => current.year() != previous.year(),
            RebalanceFrequency::EveryNPeriods(n) => periods_since >= *n,
        }
    }
}

/// A named strategy to simulate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    pub rule: AllocationRule,
    #[serde(default = "default_rebalance")]
    pub rebalance: RebalanceFrequency,
    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,
    /// Cost charged on traded value at each rebalance, in basis points.
    #[serde(default)]
    pub transaction_cost_bps: f64,
    #[serde(default)]
    pub risk_free_rate: f64,
    /// Bar spacing, used to annualise.
    #[serde(default)]
    pub frequency: ReturnFrequency,
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

fn default_rebalance() -> RebalanceFrequency {
    RebalanceFrequency::Monthly
}

fn default_initial_capital() -> f64 {
    100_000.0
}

impl StrategyConfig {
    pub fn new(name: impl Into<String>, rule: AllocationRule) -> Self {
        StrategyConfig {
            name: name.into(),
            rule,
            rebalance: default_rebalance(),
            initial_capital: default_initial_capital(),
            transaction_cost_bps: 0.0,
            risk_free_rate: 0.0,
            frequency: ReturnFrequency::Daily,
            start: None,
            end: None,
        }
    }

    pub fn validate(&self, symbols: &[String]) -> QuantfolioResult<()> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(QuantfolioError::invalid(
                "initial_capital",
                "must be positive and finite",
            ));
        }
        if !self.transaction_cost_bps.is_finite() || self.transaction_cost_bps < 0.0 {
            return Err(QuantfolioError::invalid(
                "transaction_cost_bps",
                "must be non-negative and finite",
            ));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(QuantfolioError::invalid("risk_free_rate", "must be finite"));
        }
        if let RebalanceFrequency::EveryNPeriods(0) = self.rebalance {
            return Err(QuantfolioError::invalid("rebalance", "period count must be at least 1"));
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start >= end {
                return Err(QuantfolioError::invalid(
                    "start",
                    format!("{start} is not before end {end}"),
                ));
            }
        }
        self.rule.validate(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn symbols() -> Vec<String> {
        vec!["A".into(), "B".into(), "C".into()]
    }

    #[test]
    fn test_calendar_triggers() {
        let monthly = RebalanceFrequency::Monthly;
        assert!(!monthly.is_due(d(2024, 1, 30), d(2024, 1, 31), 1));
        assert!(monthly.is_due(d(2024, 1, 31), d(2024, 2, 1), 1));

        let quarterly = RebalanceFrequency::Quarterly;
        assert!(!quarterly.is_due(d(2024, 2, 28), d(2024, 3, 1), 1));
        assert!(quarterly.is_due(d(2024, 3, 29), d(2024, 4, 1), 1));

        let annually = RebalanceFrequency::Annually;
        assert!(annually.is_due(d(2023, 12, 29), d(2024, 1, 2), 1));
        assert!(!annually.is_due(d(2024, 6, 28), d(2024, 7, 1), 1));
    }

    #[test]
    fn test_every_n_periods() {
        let f = RebalanceFrequency::EveryNPeriods(3);
        assert!(!f.is_due(d(2024, 1, 1), d(2024, 1, 2), 2));
        assert!(f.is_due(d(2024, 1, 1), d(2024, 1, 2), 3));
    }

    #[test]
    fn test_rule_deserializes_tagged() {
        let rule: AllocationRule = serde_json::from_str(
            r#"{"type": "mean_variance", "objective": {"type": "min_volatility"}, "lookback": 20}"#,
        )
        .unwrap();
        assert_eq!(rule.lookback(), 20);
        assert_eq!(rule.name(), "mean_variance");

        let freq: RebalanceFrequency = serde_json::from_str(r#"{"every_n_periods": 5}"#).unwrap();
        assert_eq!(freq, RebalanceFrequency::EveryNPeriods(5));
    }

    #[test]
    fn test_config_defaults() {
        let cfg: StrategyConfig =
            serde_json::from_str(r#"{"name": "ew", "rule": {"type": "equal_weight"}}"#).unwrap();
        assert_eq!(cfg.rebalance, RebalanceFrequency::Monthly);
        assert_eq!(cfg.initial_capital, 100_000.0);
        assert!(cfg.validate(&symbols()).is_ok());
    }

    #[test]
    fn test_fixed_weights_validation() {
        let mut weights = BTreeMap::new();
        weights.insert("A".to_string(), 0.6);
        weights.insert("B".to_string(), 0.3);
        let rule = AllocationRule::FixedWeights {
            weights: weights.clone(),
        };
        assert!(rule.validate(&symbols()).is_err());

        weights.insert("C".to_string(), 0.1);
        assert!(AllocationRule::FixedWeights {
            weights: weights.clone()
        }
        .validate(&symbols())
        .is_ok());

        weights.insert("ZZZ".to_string(), 0.0);
        assert!(AllocationRule::FixedWeights { weights }
            .validate(&symbols())
            .is_err());
    }

    #[test]
    fn test_momentum_top_n_bounds() {
        let rule = AllocationRule::Momentum {
            lookback: 5,
            top_n: 4,
        };
        assert!(rule.validate(&symbols()).is_err());
        let rule = AllocationRule::Momentum {
            lookback: 5,
            top_n: 2,
        };
        assert!(rule.validate(&symbols()).is_ok());
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let mut cfg = StrategyConfig::new("x", AllocationRule::EqualWeight);
        cfg.initial_capital = 0.0;
        assert!(cfg.validate(&symbols()).is_err());

        let mut cfg = StrategyConfig::new("x", AllocationRule::EqualWeight);
        cfg.rebalance = RebalanceFrequency::EveryNPeriods(0);
        assert!(cfg.validate(&symbols()).is_err());

        let mut cfg = StrategyConfig::new("x", AllocationRule::EqualWeight);
        cfg.start = Some(d(2024, 2, 1));
        cfg.end = Some(d(2024, 1, 1));
        assert!(cfg.validate(&symbols()).is_err());
    }
}

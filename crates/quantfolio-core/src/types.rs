use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::QuantfolioError;
use crate::QuantfolioResult;

/// Rates, returns and volatilities expressed as fractions (0.05 = 5%). Never as percentages.
pub type Rate = f64;

/// Portfolio weight as a fraction of total value.
pub type Weight = f64;

/// Tolerance on the sum of portfolio weights.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Snapshot of a single asset for one computation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    #[serde(default)]
    pub price: f64,
    /// Annualized expected return.
    pub expected_return: Rate,
    /// Annualized volatility.
    pub volatility: Rate,
    #[serde(default = "default_beta")]
    pub beta: f64,
    #[serde(default = "default_sector")]
    pub sector: String,
    #[serde(default)]
    pub market_cap: f64,
}

fn default_beta() -> f64 {
    1.0
}

fn default_sector() -> String {
    "Unclassified".to_string()
}

/// An asset together with its portfolio weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub asset: Asset,
    pub weight: Weight,
}

/// Ordered collection of holdings whose weights sum to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub holdings: Vec<Holding>,
}

impl Portfolio {
    pub fn new(holdings: Vec<Holding>) -> QuantfolioResult<Self> {
        let portfolio = Portfolio { holdings };
        portfolio.validate()?;
        Ok(portfolio)
    }

    /// Build a portfolio from parallel asset and weight slices.
    pub fn from_weights(assets: &[Asset], weights: &[Weight]) -> QuantfolioResult<Self> {
        if assets.len() != weights.len() {
            return Err(QuantfolioError::invalid(
                "weights",
                format!("Expected {} weights but got {}", assets.len(), weights.len()),
            ));
        }
        let holdings = assets
            .iter()
            .zip(weights)
            .map(|(asset, &weight)| Holding {
                asset: asset.clone(),
                weight,
            })
            .collect();
        Portfolio::new(holdings)
    }

    pub fn validate(&self) -> QuantfolioResult<()> {
        if self.holdings.is_empty() {
            return Err(QuantfolioError::InsufficientData(
                "Portfolio must contain at least one holding".into(),
            ));
        }
        for h in &self.holdings {
            if !h.weight.is_finite() {
                return Err(QuantfolioError::invalid(
                    format!("holdings[{}].weight", h.asset.symbol),
                    "must be finite",
                ));
            }
        }
        let total: f64 = self.holdings.iter().map(|h| h.weight).sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(QuantfolioError::invalid(
                "holdings",
                format!("Weights sum to {total:.8}, expected 1.0"),
            ));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    pub fn weights(&self) -> Vec<Weight> {
        self.holdings.iter().map(|h| h.weight).collect()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.holdings.iter().map(|h| h.asset.symbol.clone()).collect()
    }

    pub fn assets(&self) -> Vec<Asset> {
        self.holdings.iter().map(|h| h.asset.clone()).collect()
    }

    /// Weighted expected return from the asset snapshots.
    pub fn expected_return(&self) -> Rate {
        self.holdings
            .iter()
            .map(|h| h.weight * h.asset.expected_return)
            .sum()
    }

    /// Weighted beta of the holdings.
    pub fn weighted_beta(&self) -> f64 {
        self.holdings.iter().map(|h| h.weight * h.asset.beta).sum()
    }

    /// Herfindahl-Hirschman index of weights.
    pub fn hhi(&self) -> f64 {
        self.holdings.iter().map(|h| h.weight * h.weight).sum()
    }

    /// Total weight per sector label, sorted by sector name.
    pub fn sector_exposure(&self) -> BTreeMap<String, Weight> {
        let mut exposure = BTreeMap::new();
        for h in &self.holdings {
            *exposure.entry(h.asset.sector.clone()).or_insert(0.0) += h.weight;
        }
        exposure
    }
}

/// One dated observation of portfolio value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDate,
    pub value: f64,
}

/// Portfolio value over time. Timestamps strictly increase and values are positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<EquityPoint>", into = "Vec<EquityPoint>")]
pub struct EquityCurve {
    points: Vec<EquityPoint>,
}

impl EquityCurve {
    pub fn new(points: Vec<EquityPoint>) -> QuantfolioResult<Self> {
        for (i, p) in points.iter().enumerate() {
            if !p.value.is_finite() || p.value <= 0.0 {
                return Err(QuantfolioError::invalid(
                    format!("equity_curve[{i}]"),
                    format!("value {} must be positive and finite", p.value),
                ));
            }
        }
        for pair in points.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(QuantfolioError::invalid(
                    "equity_curve",
                    format!(
                        "timestamps must strictly increase ({} follows {})",
                        pair[1].timestamp, pair[0].timestamp
                    ),
                ));
            }
        }
        Ok(EquityCurve { points })
    }

    /// Compound a starting value through periodic returns. `dates` holds one
    /// more entry than `returns`; the first date carries `initial_value`.
    pub fn from_returns(
        dates: &[NaiveDate],
        initial_value: f64,
        returns: &[Rate],
    ) -> QuantfolioResult<Self> {
        if dates.len() != returns.len() + 1 {
            return Err(QuantfolioError::invalid(
                "dates",
                format!(
                    "Expected {} dates for {} returns but got {}",
                    returns.len() + 1,
                    returns.len(),
                    dates.len()
                ),
            ));
        }
        let mut value = initial_value;
        let mut points = Vec::with_capacity(dates.len());
        points.push(EquityPoint {
            timestamp: dates[0],
            value,
        });
        for (date, r) in dates[1..].iter().zip(returns) {
            value *= 1.0 + r;
            points.push(EquityPoint {
                timestamp: *date,
                value,
            });
        }
        EquityCurve::new(points)
    }

    pub fn points(&self) -> &[EquityPoint] {
        &self.points
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&EquityPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&EquityPoint> {
        self.points.last()
    }

    /// Simple period-over-period returns.
    pub fn returns(&self) -> Vec<Rate> {
        self.points
            .windows(2)
            .map(|w| w[1].value / w[0].value - 1.0)
            .collect()
    }
}

impl TryFrom<Vec<EquityPoint>> for EquityCurve {
    type Error = QuantfolioError;

    fn try_from(points: Vec<EquityPoint>) -> Result<Self, Self::Error> {
        EquityCurve::new(points)
    }
}

impl From<EquityCurve> for Vec<EquityPoint> {
    fn from(curve: EquityCurve) -> Self {
        curve.points
    }
}

/// A ratio inside an aggregate report. A zero denominator is carried as an
/// explicit `Undefined` entry instead of 0 or infinity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RatioValue {
    Defined { value: f64 },
    Undefined { reason: String },
}

impl RatioValue {
    /// Convert a ratio computation. Only `DivideByZeroRisk` becomes `Undefined`;
    /// every other error still propagates.
    pub fn from_result(result: QuantfolioResult<f64>) -> QuantfolioResult<Self> {
        match result {
            Ok(value) => Ok(RatioValue::Defined { value }),
            Err(e @ QuantfolioError::DivideByZeroRisk { .. }) => Ok(RatioValue::Undefined {
                reason: e.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            RatioValue::Defined { value } => Some(*value),
            RatioValue::Undefined { .. } => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, RatioValue::Defined { .. })
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "ieee754_f64".to_string(),
        },
    }
}

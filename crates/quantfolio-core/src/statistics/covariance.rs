use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::QuantfolioError;
use crate::QuantfolioResult;

use super::linalg::{cholesky_psd, mat_vec};

/// Relative tolerance for the symmetry check.
const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Symmetric positive semi-definite covariance matrix. The diagonal holds
/// each asset's variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct CovarianceMatrix {
    values: Vec<Vec<f64>>,
}

impl CovarianceMatrix {
    /// Validate a raw matrix: square, finite, symmetric, non-negative
    /// diagonal and positive semi-definite.
    pub fn new(values: Vec<Vec<f64>>) -> QuantfolioResult<Self> {
        let n = values.len();
        if n == 0 {
            return Err(QuantfolioError::InsufficientData(
                "Covariance matrix must cover at least one asset".into(),
            ));
        }
        for (i, row) in values.iter().enumerate() {
            if row.len() != n {
                return Err(QuantfolioError::invalid(
                    "covariance",
                    format!("Row {i} has {} columns, expected {n}", row.len()),
                ));
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(QuantfolioError::invalid(
                    "covariance",
                    format!("Row {i} contains non-finite values"),
                ));
            }
            if row[i] < 0.0 {
                return Err(QuantfolioError::NonPositiveSemiDefiniteMatrix(format!(
                    "negative variance {} on diagonal {i}",
                    row[i]
                )));
            }
        }

        let max_diag = (0..n).fold(0.0_f64, |acc, i| acc.max(values[i][i]));
        let sym_tol = SYMMETRY_TOLERANCE * max_diag.max(f64::MIN_POSITIVE);
        for i in 0..n {
            for j in (i + 1)..n {
                if (values[i][j] - values[j][i]).abs() > sym_tol {
                    return Err(QuantfolioError::invalid(
                        "covariance",
                        format!("Matrix is not symmetric at ({i}, {j})"),
                    ));
                }
            }
        }

        cholesky_psd(&values).map_err(|row| {
            QuantfolioError::NonPositiveSemiDefiniteMatrix(format!(
                "Cholesky factorisation failed at row {row}"
            ))
        })?;

        Ok(CovarianceMatrix { values })
    }

    /// Assemble Σ = D·C·D from volatilities and a correlation matrix.
    /// Correlations are clamped to [-1, 1] and the diagonal is forced to 1.
    pub fn from_volatilities(
        volatilities: &[f64],
        correlation: &[Vec<f64>],
    ) -> QuantfolioResult<Self> {
        let n = volatilities.len();
        if correlation.len() != n || correlation.iter().any(|row| row.len() != n) {
            return Err(QuantfolioError::invalid(
                "correlation",
                format!("Expected a {n}x{n} correlation matrix"),
            ));
        }
        for (i, vol) in volatilities.iter().enumerate() {
            if !vol.is_finite() || *vol < 0.0 {
                return Err(QuantfolioError::invalid(
                    format!("volatilities[{i}]"),
                    "must be non-negative and finite",
                ));
            }
        }
        let mut values = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                let rho = if i == j {
                    1.0
                } else {
                    let raw = correlation[i][j];
                    if raw.is_nan() {
                        return Err(QuantfolioError::invalid(
                            "correlation",
                            format!("NaN correlation at ({i}, {j})"),
                        ));
                    }
                    raw.clamp(-1.0, 1.0)
                };
                values[i][j] = volatilities[i] * volatilities[j] * rho;
            }
        }
        CovarianceMatrix::new(values)
    }

    /// Diagonal matrix for uncorrelated assets.
    pub fn diagonal(volatilities: &[f64]) -> QuantfolioResult<Self> {
        let n = volatilities.len();
        let identity: Vec<Vec<f64>> = (0..n)
            .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect();
        CovarianceMatrix::from_volatilities(volatilities, &identity)
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i][j]
    }

    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    pub fn variance(&self, i: usize) -> f64 {
        self.values[i][i]
    }

    pub fn volatilities(&self) -> Vec<f64> {
        (0..self.dim()).map(|i| self.values[i][i].sqrt()).collect()
    }

    pub fn trace(&self) -> f64 {
        (0..self.dim()).map(|i| self.values[i][i]).sum()
    }

    /// Multiply every entry by `factor`, e.g. to annualise a per-period matrix.
    pub fn scaled(&self, factor: f64) -> QuantfolioResult<Self> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(QuantfolioError::invalid("factor", "must be positive and finite"));
        }
        Ok(CovarianceMatrix {
            values: self
                .values
                .iter()
                .map(|row| row.iter().map(|v| v * factor).collect())
                .collect(),
        })
    }

    /// Σ·w
    pub fn times(&self, weights: &[f64]) -> Vec<f64> {
        mat_vec(&self.values, weights)
    }

    /// wᵀΣw, floored at zero against rounding.
    pub fn portfolio_variance(&self, weights: &[f64]) -> f64 {
        let sw = self.times(weights);
        weights
            .iter()
            .zip(&sw)
            .map(|(w, s)| w * s)
            .sum::<f64>()
            .max(0.0)
    }

    pub fn portfolio_volatility(&self, weights: &[f64]) -> f64 {
        self.portfolio_variance(weights).sqrt()
    }

    /// Correlation matrix implied by the covariance. Zero-variance assets
    /// are reported uncorrelated with everything else.
    pub fn correlation_matrix(&self) -> Vec<Vec<f64>> {
        let vols = self.volatilities();
        let n = self.dim();
        (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        if i == j {
                            1.0
                        } else if vols[i] == 0.0 || vols[j] == 0.0 {
                            0.0
                        } else {
                            (self.values[i][j] / (vols[i] * vols[j])).clamp(-1.0, 1.0)
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

impl TryFrom<Vec<Vec<f64>>> for CovarianceMatrix {
    type Error = QuantfolioError;

    fn try_from(values: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
        CovarianceMatrix::new(values)
    }
}

impl From<CovarianceMatrix> for Vec<Vec<f64>> {
    fn from(matrix: CovarianceMatrix) -> Self {
        matrix.values
    }
}

/// Sample covariance (n-1) of aligned return series, one series per asset.
/// Rows of the upper triangle are computed in parallel.
pub fn compute_covariance(return_series: &[Vec<f64>]) -> QuantfolioResult<CovarianceMatrix> {
    let n = return_series.len();
    if n == 0 {
        return Err(QuantfolioError::InsufficientData(
            "No return series supplied".into(),
        ));
    }
    let t = return_series[0].len();
    if t < 2 {
        return Err(QuantfolioError::InsufficientData(format!(
            "Covariance requires at least 2 observations per asset, got {t}"
        )));
    }
    for (i, series) in return_series.iter().enumerate() {
        if series.len() != t {
            return Err(QuantfolioError::InsufficientData(format!(
                "Return series {i} has {} observations, expected {t}",
                series.len()
            )));
        }
        if series.iter().any(|r| !r.is_finite()) {
            return Err(QuantfolioError::invalid(
                format!("returns[{i}]"),
                "contains non-finite values",
            ));
        }
    }

    let tf = t as f64;
    let means: Vec<f64> = return_series
        .par_iter()
        .map(|s| s.iter().sum::<f64>() / tf)
        .collect();

    let upper: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            (i..n)
                .map(|j| {
                    let sum: f64 = return_series[i]
                        .iter()
                        .zip(&return_series[j])
                        .map(|(a, b)| (a - means[i]) * (b - means[j]))
                        .sum();
                    sum / (tf - 1.0)
                })
                .collect()
        })
        .collect();

    let mut values = vec![vec![0.0; n]; n];
    for (i, row) in upper.iter().enumerate() {
        for (offset, v) in row.iter().enumerate() {
            let j = i + offset;
            values[i][j] = *v;
            values[j][i] = *v;
        }
    }
    CovarianceMatrix::new(values)
}

use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

use crate::error::QuantfolioError;
use crate::QuantfolioResult;

// ---------------------------------------------------------------------------
// Frequencies and annualisation
// ---------------------------------------------------------------------------

/// Frequency of return observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReturnFrequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annual,
}

impl ReturnFrequency {
    /// Number of periods in a year for annualisation
    pub fn periods_per_year(&self) -> f64 {
        match self {
            ReturnFrequency::Daily => 252.0,
            ReturnFrequency::Weekly => 52.0,
            ReturnFrequency::Monthly => 12.0,
            ReturnFrequency::Quarterly => 4.0,
            ReturnFrequency::Annual => 1.0,
        }
    }
}

/// A per-period statistic tagged with what it measures, so annualisation
/// applies the right scaling rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PeriodStat {
    Return(f64),
    Variance(f64),
    Volatility(f64),
}

impl PeriodStat {
    pub fn value(&self) -> f64 {
        match self {
            PeriodStat::Return(v) | PeriodStat::Variance(v) | PeriodStat::Volatility(v) => *v,
        }
    }
}

/// Annualise a per-period statistic.
///
/// Returns and variances scale linearly with the number of periods; volatility
/// scales with its square root so that `annualize(Volatility)^2` equals
/// `annualize(Variance)`.
pub fn annualize(stat: PeriodStat, periods_per_year: f64) -> QuantfolioResult<PeriodStat> {
    if !periods_per_year.is_finite() || periods_per_year <= 0.0 {
        return Err(QuantfolioError::invalid(
            "periods_per_year",
            "must be positive and finite",
        ));
    }
    Ok(match stat {
        PeriodStat::Return(r) => PeriodStat::Return(r * periods_per_year),
        PeriodStat::Variance(v) => PeriodStat::Variance(v * periods_per_year),
        PeriodStat::Volatility(s) => PeriodStat::Volatility(s * periods_per_year.sqrt()),
    })
}

// ---------------------------------------------------------------------------
// Moments
// ---------------------------------------------------------------------------

pub fn mean(values: &[f64]) -> QuantfolioResult<f64> {
    if values.is_empty() {
        return Err(QuantfolioError::InsufficientData(
            "Mean requires at least one observation".into(),
        ));
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample variance (n-1 denominator).
pub fn sample_variance(values: &[f64]) -> QuantfolioResult<f64> {
    if values.len() < 2 {
        return Err(QuantfolioError::InsufficientData(format!(
            "Sample variance requires at least 2 observations, got {}",
            values.len()
        )));
    }
    let m = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Ok(sum_sq / (values.len() - 1) as f64)
}

pub fn sample_std_dev(values: &[f64]) -> QuantfolioResult<f64> {
    Ok(sample_variance(values)?.sqrt())
}

/// Sample covariance between two equally long series (n-1 denominator).
pub fn sample_covariance(x: &[f64], y: &[f64]) -> QuantfolioResult<f64> {
    if x.len() != y.len() {
        return Err(QuantfolioError::InsufficientData(format!(
            "Series lengths differ: {} vs {}",
            x.len(),
            y.len()
        )));
    }
    if x.len() < 2 {
        return Err(QuantfolioError::InsufficientData(
            "Covariance requires at least 2 observations".into(),
        ));
    }
    let mx = mean(x)?;
    let my = mean(y)?;
    let sum: f64 = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| (xi - mx) * (yi - my))
        .sum();
    Ok(sum / (x.len() - 1) as f64)
}

/// Sample skewness: n / ((n-1)(n-2)) * sum((x - mean)^3) / s^3
pub fn skewness(values: &[f64]) -> QuantfolioResult<f64> {
    let n = values.len();
    if n < 3 {
        return Err(QuantfolioError::InsufficientData(
            "Skewness requires at least 3 observations".into(),
        ));
    }
    let m = mean(values)?;
    let s = sample_std_dev(values)?;
    if s <= f64::EPSILON {
        return Err(QuantfolioError::divide_by_zero("skewness: zero dispersion"));
    }
    let nf = n as f64;
    let m3: f64 = values.iter().map(|v| ((v - m) / s).powi(3)).sum();
    Ok(nf / ((nf - 1.0) * (nf - 2.0)) * m3)
}

/// Sample excess kurtosis (G2 estimator).
pub fn excess_kurtosis(values: &[f64]) -> QuantfolioResult<f64> {
    let n = values.len();
    if n < 4 {
        return Err(QuantfolioError::InsufficientData(
            "Kurtosis requires at least 4 observations".into(),
        ));
    }
    let m = mean(values)?;
    let s = sample_std_dev(values)?;
    if s <= f64::EPSILON {
        return Err(QuantfolioError::divide_by_zero("kurtosis: zero dispersion"));
    }
    let nf = n as f64;
    let m4: f64 = values.iter().map(|v| ((v - m) / s).powi(4)).sum();
    let factor1 = nf * (nf + 1.0) / ((nf - 1.0) * (nf - 2.0) * (nf - 3.0));
    let factor2 = 3.0 * (nf - 1.0) * (nf - 1.0) / ((nf - 2.0) * (nf - 3.0));
    Ok(factor1 * m4 - factor2)
}

/// Percentile of a **sorted** slice using linear interpolation, `q` in [0, 1].
pub fn percentile(sorted: &[f64], q: f64) -> QuantfolioResult<f64> {
    if sorted.is_empty() {
        return Err(QuantfolioError::InsufficientData(
            "Percentile of an empty series".into(),
        ));
    }
    if !(0.0..=1.0).contains(&q) {
        return Err(QuantfolioError::invalid("q", "must lie in [0, 1]"));
    }
    if sorted.len() == 1 {
        return Ok(sorted[0]);
    }
    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        Ok(sorted[lower])
    } else {
        let frac = rank - lower as f64;
        Ok(sorted[lower] * (1.0 - frac) + sorted[upper] * frac)
    }
}

/// Sort a copy of the values ascending. Non-finite values are rejected.
pub(crate) fn sorted_copy(values: &[f64]) -> QuantfolioResult<Vec<f64>> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(QuantfolioError::invalid("returns", "contains non-finite values"));
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Ok(sorted)
}

/// N(0, 1) for quantiles and densities.
pub(crate) fn standard_normal() -> QuantfolioResult<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| QuantfolioError::invalid("distribution", e.to_string()))
}

/// Simple returns from a price series.
pub fn simple_returns(prices: &[f64]) -> QuantfolioResult<Vec<f64>> {
    if prices.len() < 2 {
        return Err(QuantfolioError::InsufficientData(
            "At least 2 prices are required to compute returns".into(),
        ));
    }
    if let Some(bad) = prices.iter().position(|p| !p.is_finite() || *p <= 0.0) {
        return Err(QuantfolioError::invalid(
            format!("prices[{bad}]"),
            "must be positive and finite",
        ));
    }
    Ok(prices.windows(2).map(|w| w[1] / w[0] - 1.0).collect())
}

// ---------------------------------------------------------------------------
// Rolling windows
// ---------------------------------------------------------------------------

/// All contiguous windows of `window` observations, oldest first.
pub fn rolling_window(series: &[f64], window: usize) -> QuantfolioResult<Vec<Vec<f64>>> {
    if window == 0 {
        return Err(QuantfolioError::invalid("window", "must be at least 1"));
    }
    if window > series.len() {
        return Err(QuantfolioError::InsufficientData(format!(
            "Window of {} exceeds series length {}",
            window,
            series.len()
        )));
    }
    Ok(series.windows(window).map(|w| w.to_vec()).collect())
}

pub fn rolling_mean(series: &[f64], window: usize) -> QuantfolioResult<Vec<f64>> {
    rolling_window(series, window)?
        .iter()
        .map(|w| mean(w))
        .collect()
}

/// Rolling sample standard deviation; windows need at least 2 observations.
pub fn rolling_volatility(series: &[f64], window: usize) -> QuantfolioResult<Vec<f64>> {
    if window < 2 {
        return Err(QuantfolioError::invalid(
            "window",
            "rolling volatility needs a window of at least 2",
        ));
    }
    rolling_window(series, window)?
        .iter()
        .map(|w| sample_std_dev(w))
        .collect()
}

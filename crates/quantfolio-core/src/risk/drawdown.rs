use serde::{Deserialize, Serialize};

use crate::error::QuantfolioError;
use crate::types::EquityCurve;
use crate::QuantfolioResult;

/// Location and length of the deepest drawdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownStats {
    pub max_drawdown: f64,
    pub peak_index: usize,
    pub trough_index: usize,
    /// First index at or above the prior peak, if the curve recovered.
    pub recovery_index: Option<usize>,
    /// Periods from peak to trough.
    pub duration_periods: usize,
}

fn validate_values(values: &[f64]) -> QuantfolioResult<()> {
    if values.is_empty() {
        return Err(QuantfolioError::InsufficientData(
            "Drawdown requires at least one value".into(),
        ));
    }
    if let Some(i) = values.iter().position(|v| !v.is_finite() || *v <= 0.0) {
        return Err(QuantfolioError::invalid(
            format!("values[{i}]"),
            "must be positive and finite",
        ));
    }
    Ok(())
}

/// Maximum peak-to-trough decline of an equity curve as a fraction of the
/// peak, in one pass with a running peak.
pub fn max_drawdown(curve: &EquityCurve) -> QuantfolioResult<f64> {
    max_drawdown_from_values(&curve.values())
}

pub fn max_drawdown_from_values(values: &[f64]) -> QuantfolioResult<f64> {
    validate_values(values)?;
    let mut peak = values[0];
    let mut max_dd = 0.0_f64;
    for &v in values {
        if v > peak {
            peak = v;
        }
        max_dd = max_dd.max((peak - v) / peak);
    }
    Ok(max_dd)
}

/// Drawdown from the running peak at every point.
pub fn drawdown_series(values: &[f64]) -> QuantfolioResult<Vec<f64>> {
    validate_values(values)?;
    let mut peak = values[0];
    Ok(values
        .iter()
        .map(|&v| {
            peak = peak.max(v);
            (peak - v) / peak
        })
        .collect())
}

pub fn drawdown_stats(values: &[f64]) -> QuantfolioResult<DrawdownStats> {
    validate_values(values)?;
    let mut peak = values[0];
    let mut peak_idx = 0;
    let mut best = DrawdownStats {
        max_drawdown: 0.0,
        peak_index: 0,
        trough_index: 0,
        recovery_index: None,
        duration_periods: 0,
    };
    for (i, &v) in values.iter().enumerate() {
        if v > peak {
            peak = v;
            peak_idx = i;
        }
        let dd = (peak - v) / peak;
        if dd > best.max_drawdown {
            best.max_drawdown = dd;
            best.peak_index = peak_idx;
            best.trough_index = i;
            best.duration_periods = i - peak_idx;
        }
    }
    if best.max_drawdown > 0.0 {
        let peak_value = values[best.peak_index];
        best.recovery_index = values[best.trough_index..]
            .iter()
            .position(|&v| v >= peak_value)
            .map(|offset| best.trough_index + offset);
    }
    Ok(best)
}

/// Compound periodic returns from 1.0 into an equity path.
pub(crate) fn equity_from_returns(returns: &[f64]) -> QuantfolioResult<Vec<f64>> {
    let mut value = 1.0;
    let mut values = Vec::with_capacity(returns.len() + 1);
    values.push(value);
    for (i, r) in returns.iter().enumerate() {
        if !r.is_finite() || *r <= -1.0 {
            return Err(QuantfolioError::invalid(
                format!("returns[{i}]"),
                "must be finite and above -100%",
            ));
        }
        value *= 1.0 + r;
        values.push(value);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EquityPoint;
    use chrono::NaiveDate;

    #[test]
    fn test_max_drawdown_known_path() {
        let dd = max_drawdown_from_values(&[100.0, 110.0, 90.0, 95.0]).unwrap();
        assert!((dd - 20.0 / 110.0).abs() < 1e-12);
    }

    #[test]
    fn test_max_drawdown_on_curve() {
        let points = [100.0, 110.0, 90.0, 95.0]
            .iter()
            .enumerate()
            .map(|(i, &value)| EquityPoint {
                timestamp: NaiveDate::from_ymd_opt(2024, 1, 1 + i as u32).unwrap(),
                value,
            })
            .collect();
        let curve = EquityCurve::new(points).unwrap();
        assert!((max_drawdown(&curve).unwrap() - 0.181818).abs() < 1e-6);
    }

    #[test]
    fn test_monotone_curve_has_no_drawdown() {
        assert_eq!(max_drawdown_from_values(&[1.0, 2.0, 3.0]).unwrap(), 0.0);
        let stats = drawdown_stats(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(stats.recovery_index, None);
        assert_eq!(stats.duration_periods, 0);
    }

    #[test]
    fn test_drawdown_stats_with_recovery() {
        let stats = drawdown_stats(&[100.0, 120.0, 90.0, 100.0, 125.0]).unwrap();
        assert_eq!(stats.peak_index, 1);
        assert_eq!(stats.trough_index, 2);
        assert_eq!(stats.recovery_index, Some(4));
        assert_eq!(stats.duration_periods, 1);
        assert!((stats.max_drawdown - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_drawdown_series() {
        let series = drawdown_series(&[100.0, 110.0, 99.0]).unwrap();
        assert_eq!(series[0], 0.0);
        assert_eq!(series[1], 0.0);
        assert!((series[2] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_non_positive_values() {
        assert!(max_drawdown_from_values(&[100.0, 0.0]).is_err());
        assert!(max_drawdown_from_values(&[]).is_err());
    }

    #[test]
    fn test_equity_from_returns() {
        let path = equity_from_returns(&[0.1, -0.5]).unwrap();
        assert!((path[2] - 0.55).abs() < 1e-12);
        assert!(equity_from_returns(&[-1.0]).is_err());
    }
}

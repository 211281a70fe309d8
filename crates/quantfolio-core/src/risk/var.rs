use statrs::distribution::{Continuous, ContinuousCDF};

use crate::error::QuantfolioError;
use crate::statistics::moments::{mean, percentile, sample_std_dev, sorted_copy, standard_normal};
use crate::QuantfolioResult;

fn validate(returns: &[f64], confidence: f64) -> QuantfolioResult<()> {
    if returns.len() < 2 {
        return Err(QuantfolioError::InsufficientData(format!(
            "VaR requires at least 2 return observations, got {}",
            returns.len()
        )));
    }
    if !confidence.is_finite() || confidence <= 0.0 || confidence >= 1.0 {
        return Err(QuantfolioError::invalid(
            "confidence",
            format!("{confidence} must lie strictly between 0 and 1"),
        ));
    }
    Ok(())
}

/// Historical VaR: the loss at the (1 - confidence) percentile of the
/// return distribution, reported as a positive number for a loss.
pub fn value_at_risk(returns: &[f64], confidence: f64) -> QuantfolioResult<f64> {
    validate(returns, confidence)?;
    let sorted = sorted_copy(returns)?;
    Ok(-percentile(&sorted, 1.0 - confidence)?)
}

/// Historical CVaR (expected shortfall): mean loss of the returns at or
/// below the VaR percentile. Never smaller than [`value_at_risk`].
pub fn conditional_var(returns: &[f64], confidence: f64) -> QuantfolioResult<f64> {
    validate(returns, confidence)?;
    let sorted = sorted_copy(returns)?;
    let cutoff = percentile(&sorted, 1.0 - confidence)?;
    let tail: Vec<f64> = sorted.iter().copied().take_while(|r| *r <= cutoff).collect();
    // The minimum is always at or below any interpolated percentile
    Ok(-mean(&tail)?)
}

/// Gaussian VaR: -(μ - z·σ) with z the standard normal quantile.
pub fn parametric_var(returns: &[f64], confidence: f64) -> QuantfolioResult<f64> {
    validate(returns, confidence)?;
    let mu = mean(returns)?;
    let sigma = sample_std_dev(returns)?;
    let z = standard_normal()?.inverse_cdf(confidence);
    Ok(z * sigma - mu)
}

/// Gaussian expected shortfall: σ·φ(z)/(1 - c) - μ.
pub fn parametric_cvar(returns: &[f64], confidence: f64) -> QuantfolioResult<f64> {
    validate(returns, confidence)?;
    let mu = mean(returns)?;
    let sigma = sample_std_dev(returns)?;
    let normal = standard_normal()?;
    let z = normal.inverse_cdf(confidence);
    Ok(sigma * normal.pdf(z) / (1.0 - confidence) - mu)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_returns() -> Vec<f64> {
        (0..100).map(|i| (i as f64 - 50.0) / 1000.0).collect()
    }

    #[test]
    fn test_historical_var_percentile() {
        let returns = sample_returns();
        let var = value_at_risk(&returns, 0.95).unwrap();
        // 5th percentile of -0.050..0.049 at rank 4.95
        assert!((var - 0.04505).abs() < 1e-12);
    }

    #[test]
    fn test_cvar_not_below_var() {
        let returns = sample_returns();
        for c in [0.90, 0.95, 0.99] {
            let var = value_at_risk(&returns, c).unwrap();
            let cvar = conditional_var(&returns, c).unwrap();
            assert!(cvar >= var, "CVaR {cvar} < VaR {var} at {c}");
        }
    }

    #[test]
    fn test_parametric_var_matches_formula() {
        let returns = vec![0.01, -0.02, 0.015, -0.005, 0.0];
        let var = parametric_var(&returns, 0.95).unwrap();
        let mu = mean(&returns).unwrap();
        let sigma = sample_std_dev(&returns).unwrap();
        assert!((var - (1.6448536269514722 * sigma - mu)).abs() < 1e-9);
        assert!(parametric_cvar(&returns, 0.95).unwrap() > var);
    }

    #[test]
    fn test_invalid_confidence() {
        let returns = sample_returns();
        assert!(value_at_risk(&returns, 1.0).is_err());
        assert!(value_at_risk(&returns, 0.0).is_err());
        assert!(parametric_var(&returns, f64::NAN).is_err());
    }

    #[test]
    fn test_too_few_observations() {
        assert!(matches!(
            conditional_var(&[0.01], 0.95),
            Err(QuantfolioError::InsufficientData(_))
        ));
    }
}

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuantfolioError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Constraints infeasible: {0}")]
    ConstraintsInfeasible(String),

    #[error("Infeasible target return {target:.6}: achievable range is [{min:.6}, {max:.6}]")]
    InfeasibleTarget { target: f64, min: f64, max: f64 },

    #[error("Invalid volatility {0}: must be positive and finite")]
    InvalidVolatility(f64),

    #[error("Data gap: no usable price for {symbol} on {date}")]
    DataGap { symbol: String, date: NaiveDate },

    #[error("Division by zero risk in {context}")]
    DivideByZeroRisk { context: String },

    #[error("Covariance matrix is not positive semi-definite: {0}")]
    NonPositiveSemiDefiniteMatrix(String),

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (delta: {last_delta:e})")]
    ConvergenceFailure {
        function: String,
        iterations: u32,
        last_delta: f64,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl QuantfolioError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        QuantfolioError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn divide_by_zero(context: impl Into<String>) -> Self {
        QuantfolioError::DivideByZeroRisk {
            context: context.into(),
        }
    }
}

impl From<serde_json::Error> for QuantfolioError {
    fn from(e: serde_json::Error) -> Self {
        QuantfolioError::Serialization(e.to_string())
    }
}

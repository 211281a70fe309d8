pub mod analytics;
pub mod drawdown;
pub mod ratios;
pub mod stress;
pub mod var;

pub use analytics::{
    analyze_risk, BetaSource, RiskAnalysisRequest, RiskContribution, RiskMetrics, VarEstimate,
};
pub use drawdown::{
    drawdown_series, drawdown_stats, max_drawdown, max_drawdown_from_values, DrawdownStats,
};
pub use ratios::{
    annualized_return, annualized_volatility, beta_alpha, cagr, calmar_ratio,
    downside_deviation, information_ratio, sharpe_ratio, sortino_ratio, tracking_error,
    BetaAlpha,
};
pub use stress::{
    standard_scenarios, stress_test, PositionImpact, ScenarioResult, Severity, StressScenario,
    StressTestReport,
};
pub use var::{conditional_var, parametric_cvar, parametric_var, value_at_risk};

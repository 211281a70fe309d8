use napi::Result as NapiResult;
use napi_derive::napi;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use quantfolio_core::backtest::{PriceHistory, StrategyConfig};
use quantfolio_core::optimization::OptimizationRequest;
use quantfolio_core::options::OptionPosition;
use quantfolio_core::risk::StressScenario;
use quantfolio_core::Portfolio;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

fn parse<T: DeserializeOwned>(input_json: &str) -> NapiResult<T> {
    serde_json::from_str(input_json).map_err(to_napi_error)
}

fn render(output: &impl Serialize) -> NapiResult<String> {
    serde_json::to_string(output).map_err(to_napi_error)
}

#[derive(Deserialize)]
struct FrontierInput {
    #[serde(flatten)]
    request: OptimizationRequest,
    #[serde(default = "default_points")]
    points: usize,
}

fn default_points() -> usize {
    20
}

#[derive(Deserialize)]
struct StressInput {
    portfolio: Portfolio,
    #[serde(default = "quantfolio_core::risk::standard_scenarios")]
    scenarios: Vec<StressScenario>,
}

#[derive(Deserialize)]
struct BacktestInput {
    strategy: StrategyConfig,
    history: PriceHistory,
}

#[derive(Deserialize)]
struct CompareInput {
    strategies: Vec<StrategyConfig>,
    history: PriceHistory,
}

// ---------------------------------------------------------------------------
// Optimization
// ---------------------------------------------------------------------------

#[napi]
pub fn optimize_portfolio(input_json: String) -> NapiResult<String> {
    let request: OptimizationRequest = parse(&input_json)?;
    let output = quantfolio_core::optimization::optimize(&request).map_err(to_napi_error)?;
    render(&output)
}

#[napi]
pub fn efficient_frontier(input_json: String) -> NapiResult<String> {
    let input: FrontierInput = parse(&input_json)?;
    let output = quantfolio_core::optimization::efficient_frontier(&input.request, input.points)
        .map_err(to_napi_error)?;
    render(&output)
}

// ---------------------------------------------------------------------------
// Risk
// ---------------------------------------------------------------------------

#[napi]
pub fn analyze_risk(input_json: String) -> NapiResult<String> {
    let request: quantfolio_core::risk::RiskAnalysisRequest = parse(&input_json)?;
    let output = quantfolio_core::risk::analyze_risk(&request).map_err(to_napi_error)?;
    render(&output)
}

#[napi]
pub fn stress_test(input_json: String) -> NapiResult<String> {
    let input: StressInput = parse(&input_json)?;
    let output = quantfolio_core::risk::stress_test(&input.portfolio, &input.scenarios)
        .map_err(to_napi_error)?;
    render(&output)
}

#[napi]
pub fn standard_scenarios() -> NapiResult<String> {
    render(&quantfolio_core::risk::standard_scenarios())
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[napi]
pub fn price_option_chain(input_json: String) -> NapiResult<String> {
    let request: quantfolio_core::options::OptionChainRequest = parse(&input_json)?;
    let output = quantfolio_core::options::price_option_chain(&request).map_err(to_napi_error)?;
    render(&output)
}

#[napi]
pub fn aggregate_greeks(input_json: String) -> NapiResult<String> {
    let positions: Vec<OptionPosition> = parse(&input_json)?;
    let output = quantfolio_core::options::aggregate_greeks(&positions).map_err(to_napi_error)?;
    render(&output)
}

#[napi]
pub fn implied_volatility(input_json: String) -> NapiResult<String> {
    let request: quantfolio_core::options::ImpliedVolRequest = parse(&input_json)?;
    let output = quantfolio_core::options::implied_volatility(&request).map_err(to_napi_error)?;
    render(&output)
}

#[napi]
pub fn analyze_option_strategy(input_json: String) -> NapiResult<String> {
    let request: quantfolio_core::options::OptionStrategyRequest = parse(&input_json)?;
    let output =
        quantfolio_core::options::analyze_option_strategy(&request).map_err(to_napi_error)?;
    render(&output)
}

// ---------------------------------------------------------------------------
// Backtesting
// ---------------------------------------------------------------------------

#[napi]
pub fn run_backtest(input_json: String) -> NapiResult<String> {
    let input: BacktestInput = parse(&input_json)?;
    let output = quantfolio_core::backtest::run_backtest(&input.strategy, &input.history)
        .map_err(to_napi_error)?;
    render(&output)
}

/// Each entry is either `{"ok": output}` or `{"error": message}`, in input order.
#[napi]
pub fn compare_backtests(input_json: String) -> NapiResult<String> {
    let input: CompareInput = parse(&input_json)?;
    let outcomes: Vec<serde_json::Value> =
        quantfolio_core::backtest::run_backtests(&input.strategies, &input.history)
            .into_iter()
            .map(|outcome| match outcome {
                Ok(out) => serde_json::json!({ "ok": out }),
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            })
            .collect();
    render(&outcomes)
}

use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use quantfolio_core::backtest::{self, BacktestResult, PriceHistory, StrategyConfig};
use quantfolio_core::RatioValue;

use crate::input;

/// Arguments for a single-strategy backtest
#[derive(Args)]
pub struct BacktestArgs {
    /// Path to a JSON/YAML file with `strategy` and `history`
    #[arg(long)]
    pub input: Option<String>,

    /// Drop period returns and curves from the output
    #[arg(long)]
    pub summary: bool,
}

/// Arguments for comparing strategies
#[derive(Args)]
pub struct CompareArgs {
    /// Path to a JSON/YAML file with `strategies` and `history`
    #[arg(long)]
    pub input: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BacktestInput {
    strategy: StrategyConfig,
    history: PriceHistory,
}

#[derive(Debug, Deserialize)]
struct CompareInput {
    strategies: Vec<StrategyConfig>,
    history: PriceHistory,
}

/// One row per strategy; failed runs carry their error instead of figures.
#[derive(Debug, Serialize)]
struct StrategySummary {
    strategy: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_return: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    annualized_return: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    volatility: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sharpe_ratio: Option<RatioValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_drawdown: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rebalance_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_costs: Option<f64>,
}

impl StrategySummary {
    fn completed(r: &BacktestResult) -> Self {
        StrategySummary {
            strategy: r.strategy.clone(),
            status: "completed",
            error: None,
            total_return: Some(r.total_return),
            annualized_return: Some(r.annualized_return),
            volatility: Some(r.volatility),
            sharpe_ratio: Some(r.sharpe_ratio.clone()),
            max_drawdown: Some(r.max_drawdown),
            final_value: Some(r.final_value),
            rebalance_count: Some(r.rebalance_count),
            total_costs: Some(r.total_costs),
        }
    }

    fn failed(strategy: &str, error: String) -> Self {
        StrategySummary {
            strategy: strategy.to_string(),
            status: "failed",
            error: Some(error),
            total_return: None,
            annualized_return: None,
            volatility: None,
            sharpe_ratio: None,
            max_drawdown: None,
            final_value: None,
            rebalance_count: None,
            total_costs: None,
        }
    }
}

pub fn run_backtest(args: BacktestArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: BacktestInput = input::read_request(&args.input)?;
    let output = backtest::run_backtest(&request.strategy, &request.history)?;
    let mut value = serde_json::to_value(output)?;
    if args.summary {
        if let Some(Value::Object(result)) = value.get_mut("result") {
            for key in ["period_returns", "equity_curve", "drawdown_curve"] {
                result.remove(key);
            }
        }
    }
    Ok(value)
}

pub fn run_compare(args: CompareArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: CompareInput = input::read_request(&args.input)?;
    if request.strategies.is_empty() {
        return Err("'strategies' must contain at least one strategy".into());
    }
    let outcomes = backtest::run_backtests(&request.strategies, &request.history);

    let mut warnings = Vec::new();
    let results: Vec<StrategySummary> = request
        .strategies
        .iter()
        .zip(&outcomes)
        .map(|(config, outcome)| match outcome {
            Ok(out) => {
                warnings.extend(
                    out.warnings
                        .iter()
                        .map(|w| format!("{}: {}", config.name, w)),
                );
                StrategySummary::completed(&out.result)
            }
            Err(e) => StrategySummary::failed(&config.name, e.to_string()),
        })
        .collect();

    Ok(serde_json::json!({
        "results": results,
        "warnings": warnings,
    }))
}

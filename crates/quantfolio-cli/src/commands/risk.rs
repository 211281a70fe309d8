use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use quantfolio_core::risk::{self, DrawdownStats, StressScenario};
use quantfolio_core::statistics::ReturnFrequency;
use quantfolio_core::{Portfolio, RatioValue};

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FrequencyArg {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annual,
}

impl From<FrequencyArg> for ReturnFrequency {
    fn from(f: FrequencyArg) -> Self {
        match f {
            FrequencyArg::Daily => ReturnFrequency::Daily,
            FrequencyArg::Weekly => ReturnFrequency::Weekly,
            FrequencyArg::Monthly => ReturnFrequency::Monthly,
            FrequencyArg::Quarterly => ReturnFrequency::Quarterly,
            FrequencyArg::Annual => ReturnFrequency::Annual,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum VarMethod {
    Historical,
    Parametric,
    Both,
}

/// Arguments for the full risk report
#[derive(Args)]
pub struct RiskArgs {
    /// Path to a JSON/YAML risk analysis request
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for scenario stress tests
#[derive(Args)]
pub struct StressArgs {
    /// Path to a JSON/YAML file with `portfolio` and optional `scenarios`
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for VaR / CVaR
#[derive(Args)]
pub struct VarArgs {
    /// Path to a JSON/YAML file with a returns array
    #[arg(long)]
    pub input: Option<String>,

    /// Comma-separated periodic returns (e.g. "0.01,-0.02,0.005")
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub returns: Option<Vec<f64>>,

    /// Confidence level (e.g. 0.95)
    #[arg(long, default_value = "0.95")]
    pub confidence: f64,

    #[arg(long, value_enum, default_value = "both")]
    pub method: VarMethod,

    /// Portfolio value for monetary VaR
    #[arg(long)]
    pub portfolio_value: Option<f64>,
}

/// Arguments for Sharpe / Sortino ratios
#[derive(Args)]
pub struct SharpeArgs {
    /// Path to a JSON/YAML file with a returns array
    #[arg(long)]
    pub input: Option<String>,

    /// Comma-separated periodic returns
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub returns: Option<Vec<f64>>,

    /// Annual risk-free rate
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    pub risk_free_rate: f64,

    /// Return frequency for annualisation
    #[arg(long, value_enum, default_value = "monthly")]
    pub frequency: FrequencyArg,
}

/// Arguments for drawdown analysis
#[derive(Args)]
pub struct DrawdownArgs {
    /// Path to a JSON/YAML file with an equity `values` array
    #[arg(long)]
    pub input: Option<String>,

    /// Comma-separated equity values (e.g. "100,110,90,95")
    #[arg(long, value_delimiter = ',')]
    pub values: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct StressInput {
    portfolio: Portfolio,
    #[serde(default = "risk::standard_scenarios")]
    scenarios: Vec<StressScenario>,
}

/// A bare array or an object holding the array under `key`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SeriesInput {
    Bare(Vec<f64>),
    Keyed(serde_json::Map<String, Value>),
}

#[derive(Debug, Serialize)]
struct VarOutput {
    confidence: f64,
    observations: usize,
    historical_var: Option<f64>,
    historical_cvar: Option<f64>,
    parametric_var: Option<f64>,
    parametric_cvar: Option<f64>,
    var_monetary: Option<f64>,
    cvar_monetary: Option<f64>,
}

#[derive(Debug, Serialize)]
struct SharpeOutput {
    sharpe_ratio: RatioValue,
    sortino_ratio: RatioValue,
    annualized_return: f64,
    annualized_volatility: f64,
    risk_free_rate: f64,
    observations: usize,
}

#[derive(Debug, Serialize)]
struct DrawdownOutput {
    #[serde(flatten)]
    stats: DrawdownStats,
    series: Vec<f64>,
}

fn get_series(
    input_path: &Option<String>,
    cli_values: &Option<Vec<f64>>,
    key: &str,
) -> Result<Vec<f64>, Box<dyn std::error::Error>> {
    if let Some(values) = cli_values {
        return Ok(values.clone());
    }
    let parsed: SeriesInput = input::read_request(input_path)
        .map_err(|e| format!("Provide --{key} or an input with a '{key}' array: {e}"))?;
    match parsed {
        SeriesInput::Bare(v) => Ok(v),
        SeriesInput::Keyed(map) => {
            let arr = map
                .get(key)
                .ok_or_else(|| format!("Input object must contain a '{key}' array"))?;
            Ok(serde_json::from_value(arr.clone())?)
        }
    }
}

pub fn run_risk(args: RiskArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: risk::RiskAnalysisRequest = input::read_request(&args.input)?;
    let result = risk::analyze_risk(&request)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_stress(args: StressArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: StressInput = input::read_request(&args.input)?;
    let result = risk::stress_test(&request.portfolio, &request.scenarios)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_var(args: VarArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let returns = get_series(&args.input, &args.returns, "returns")?;
    let c = args.confidence;
    let (historical, parametric) = match args.method {
        VarMethod::Historical => (true, false),
        VarMethod::Parametric => (false, true),
        VarMethod::Both => (true, true),
    };

    let historical_var = historical
        .then(|| risk::value_at_risk(&returns, c))
        .transpose()?;
    let historical_cvar = historical
        .then(|| risk::conditional_var(&returns, c))
        .transpose()?;
    let parametric_var = parametric
        .then(|| risk::parametric_var(&returns, c))
        .transpose()?;
    let parametric_cvar = parametric
        .then(|| risk::parametric_cvar(&returns, c))
        .transpose()?;

    // Monetary figures follow the historical estimate when present
    let headline_var = historical_var.or(parametric_var);
    let headline_cvar = historical_cvar.or(parametric_cvar);
    let output = VarOutput {
        confidence: c,
        observations: returns.len(),
        historical_var,
        historical_cvar,
        parametric_var,
        parametric_cvar,
        var_monetary: args.portfolio_value.zip(headline_var).map(|(pv, v)| pv * v),
        cvar_monetary: args.portfolio_value.zip(headline_cvar).map(|(pv, v)| pv * v),
    };
    Ok(serde_json::to_value(output)?)
}

pub fn run_sharpe(args: SharpeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let returns = get_series(&args.input, &args.returns, "returns")?;
    let freq: ReturnFrequency = args.frequency.into();
    let rf = args.risk_free_rate;
    let output = SharpeOutput {
        sharpe_ratio: RatioValue::from_result(risk::sharpe_ratio(&returns, rf, freq))?,
        sortino_ratio: RatioValue::from_result(risk::sortino_ratio(&returns, rf, freq))?,
        annualized_return: risk::annualized_return(&returns, freq)?,
        annualized_volatility: risk::annualized_volatility(&returns, freq)?,
        risk_free_rate: rf,
        observations: returns.len(),
    };
    Ok(serde_json::to_value(output)?)
}

pub fn run_drawdown(args: DrawdownArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let values = get_series(&args.input, &args.values, "values")?;
    let output = DrawdownOutput {
        stats: risk::drawdown_stats(&values)?,
        series: risk::drawdown_series(&values)?,
    };
    Ok(serde_json::to_value(output)?)
}

use clap::{Args, ValueEnum};
use serde_json::Value;

use quantfolio_core::options::{
    self, ImpliedVolRequest, OptionChainRequest, OptionStrategyRequest, OptionType, StrategyKind,
};

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OptionTypeArg {
    Call,
    Put,
}

impl From<OptionTypeArg> for OptionType {
    fn from(t: OptionTypeArg) -> Self {
        match t {
            OptionTypeArg::Call => OptionType::Call,
            OptionTypeArg::Put => OptionType::Put,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    LongCall,
    LongPut,
    CoveredCall,
    ProtectivePut,
    Straddle,
    Strangle,
    IronCondor,
    Butterfly,
}

impl From<StrategyArg> for StrategyKind {
    fn from(s: StrategyArg) -> Self {
        match s {
            StrategyArg::LongCall => StrategyKind::LongCall,
            StrategyArg::LongPut => StrategyKind::LongPut,
            StrategyArg::CoveredCall => StrategyKind::CoveredCall,
            StrategyArg::ProtectivePut => StrategyKind::ProtectivePut,
            StrategyArg::Straddle => StrategyKind::Straddle,
            StrategyArg::Strangle => StrategyKind::Strangle,
            StrategyArg::IronCondor => StrategyKind::IronCondor,
            StrategyArg::Butterfly => StrategyKind::Butterfly,
        }
    }
}

/// Arguments for option chain pricing
#[derive(Args)]
pub struct OptionChainArgs {
    /// Path to a JSON/YAML chain request; flags are used when absent
    #[arg(long)]
    pub input: Option<String>,

    #[arg(long, default_value = "UNDERLYING")]
    pub underlying: String,

    #[arg(long)]
    pub spot: Option<f64>,

    /// Annual volatility (e.g. 0.25)
    #[arg(long)]
    pub volatility: Option<f64>,

    /// Annual risk-free rate
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    pub rate: f64,

    #[arg(long, default_value = "0.0")]
    pub dividend_yield: f64,

    /// Comma-separated strikes
    #[arg(long, value_delimiter = ',')]
    pub strikes: Vec<f64>,

    /// Comma-separated times to expiry in years
    #[arg(long, value_delimiter = ',')]
    pub expiries: Vec<f64>,
}

/// Arguments for implied volatility
#[derive(Args)]
pub struct ImpliedVolArgs {
    /// Path to a JSON/YAML implied volatility request; flags are used when absent
    #[arg(long)]
    pub input: Option<String>,

    #[arg(long)]
    pub spot: Option<f64>,

    #[arg(long)]
    pub strike: Option<f64>,

    /// Time to expiry in years
    #[arg(long)]
    pub expiry: Option<f64>,

    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    pub rate: f64,

    #[arg(long, default_value = "0.0")]
    pub dividend_yield: f64,

    #[arg(long = "type", value_enum, default_value = "call")]
    pub option_type: OptionTypeArg,

    /// Observed option premium
    #[arg(long)]
    pub price: Option<f64>,
}

/// Arguments for option strategy analysis
#[derive(Args)]
pub struct OptionStrategyArgs {
    /// Path to a JSON/YAML strategy request (needed for custom legs)
    #[arg(long)]
    pub input: Option<String>,

    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    #[arg(long)]
    pub spot: Option<f64>,

    /// Annual volatility (e.g. 0.25)
    #[arg(long)]
    pub volatility: Option<f64>,

    /// Time to expiry in years
    #[arg(long)]
    pub expiry: Option<f64>,

    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    pub rate: f64,

    #[arg(long, default_value = "0.0")]
    pub dividend_yield: f64,

    /// Comma-separated ascending strikes; defaults bracket the spot
    #[arg(long, value_delimiter = ',')]
    pub strikes: Vec<f64>,

    /// Number of intervals in the payoff grid
    #[arg(long, default_value = "40")]
    pub steps: usize,
}

fn required(value: Option<f64>, flag: &str) -> Result<f64, Box<dyn std::error::Error>> {
    value.ok_or_else(|| format!("--{flag} is required when no --input is given").into())
}

pub fn run_option_chain(args: OptionChainArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: OptionChainRequest = if args.input.is_some() || args.spot.is_none() {
        input::read_request(&args.input)?
    } else {
        OptionChainRequest {
            underlying: args.underlying,
            spot: required(args.spot, "spot")?,
            volatility: required(args.volatility, "volatility")?,
            risk_free_rate: args.rate,
            dividend_yield: args.dividend_yield,
            strikes: args.strikes,
            expiries: args.expiries,
        }
    };
    let result = options::price_option_chain(&request)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_implied_vol(args: ImpliedVolArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: ImpliedVolRequest = if args.input.is_some() || args.price.is_none() {
        input::read_request(&args.input)?
    } else {
        ImpliedVolRequest {
            spot: required(args.spot, "spot")?,
            strike: required(args.strike, "strike")?,
            time_to_expiry: required(args.expiry, "expiry")?,
            risk_free_rate: args.rate,
            dividend_yield: args.dividend_yield,
            option_type: args.option_type.into(),
            market_price: required(args.price, "price")?,
        }
    };
    let result = options::implied_volatility(&request)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_option_strategy(args: OptionStrategyArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: OptionStrategyRequest = match args.strategy {
        Some(strategy) if args.input.is_none() => OptionStrategyRequest {
            strategy: strategy.into(),
            spot: required(args.spot, "spot")?,
            volatility: required(args.volatility, "volatility")?,
            time_to_expiry: required(args.expiry, "expiry")?,
            risk_free_rate: args.rate,
            dividend_yield: args.dividend_yield,
            strikes: args.strikes,
            legs: Vec::new(),
            price_range: None,
            price_steps: args.steps,
        },
        _ => input::read_request(&args.input)?,
    };
    let result = options::analyze_option_strategy(&request)?;
    Ok(serde_json::to_value(result)?)
}

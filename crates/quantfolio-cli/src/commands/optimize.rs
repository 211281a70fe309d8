use clap::{Args, ValueEnum};
use serde_json::Value;

use quantfolio_core::optimization::{self, Objective, OptimizationRequest};

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ObjectiveArg {
    MaxSharpe,
    MinVolatility,
    EqualWeight,
}

/// Arguments for portfolio optimization
#[derive(Args)]
pub struct OptimizeArgs {
    /// Path to a JSON/YAML optimization request
    #[arg(long)]
    pub input: Option<String>,

    /// Override the request objective
    #[arg(long, conflicts_with = "target_return")]
    pub objective: Option<ObjectiveArg>,

    /// Solve for the minimum-volatility portfolio with this expected return
    #[arg(long, allow_hyphen_values = true)]
    pub target_return: Option<f64>,

    /// Override the annual risk-free rate
    #[arg(long, allow_hyphen_values = true)]
    pub risk_free_rate: Option<f64>,
}

/// Arguments for efficient frontier generation
#[derive(Args)]
pub struct FrontierArgs {
    /// Path to a JSON/YAML optimization request (objective is ignored)
    #[arg(long)]
    pub input: Option<String>,

    /// Number of frontier points
    #[arg(long, default_value = "20")]
    pub points: usize,
}

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request: OptimizationRequest = input::read_request(&args.input)?;
    if let Some(objective) = args.objective {
        request.objective = match objective {
            ObjectiveArg::MaxSharpe => Objective::MaxSharpe,
            ObjectiveArg::MinVolatility => Objective::MinVolatility,
            ObjectiveArg::EqualWeight => Objective::EqualWeight,
        };
    }
    if let Some(target) = args.target_return {
        request.objective = Objective::TargetReturn { target };
    }
    if let Some(rf) = args.risk_free_rate {
        request.risk_free_rate = rf;
    }
    let result = optimization::optimize(&request)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_frontier(args: FrontierArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: OptimizationRequest = input::read_request(&args.input)?;
    let result = optimization::efficient_frontier(&request, args.points)?;
    Ok(serde_json::to_value(result)?)
}

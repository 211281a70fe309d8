pub mod black_scholes;
pub mod chain;
pub mod strategies;

pub use black_scholes::{
    price_european, solve_implied_volatility, Greeks, ImpliedVolSolution, Moneyness,
    OptionParams, OptionType, OptionValuation,
};
pub use chain::{
    aggregate_greeks, implied_volatility, price_option_chain, ImpliedVolRequest,
    OptionChainRequest, OptionContract, OptionPosition, PortfolioGreeks,
};
pub use strategies::{
    analyze_option_strategy, preset_legs, LegKind, OptionStrategyRequest, PayoffBound,
    PayoffPoint, Position, PricedLeg, RiskLevel, StrategyAnalysis, StrategyKind, StrategyLeg,
};

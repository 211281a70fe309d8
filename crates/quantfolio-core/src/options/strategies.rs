use std::time::Instant;

use serde::{Deserialize, Serialize};
use statrs::distribution::ContinuousCDF;

use crate::error::QuantfolioError;
use crate::statistics::moments::standard_normal;
use crate::types::{with_metadata, ComputationOutput};
use crate::QuantfolioResult;

use super::black_scholes::{price_european, Greeks, OptionParams, OptionType};

/// Payoff magnitude treated as exactly zero when locating breakevens.
const ZERO_PAYOFF: f64 = 1e-12;
/// Breakevens closer than this are reported once.
const BREAKEVEN_MERGE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    LongCall,
    LongPut,
    CoveredCall,
    ProtectivePut,
    Straddle,
    Strangle,
    IronCondor,
    Butterfly,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegKind {
    Call,
    Put,
    Stock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Long,
    Short,
}

impl Position {
    fn sign(self) -> f64 {
        match self {
            Position::Long => 1.0,
            Position::Short => -1.0,
        }
    }
}

/// One leg of a strategy. Stock legs carry no strike.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyLeg {
    pub kind: LegKind,
    pub position: Position,
    #[serde(default)]
    pub strike: Option<f64>,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
}

fn default_quantity() -> f64 {
    1.0
}

fn default_price_steps() -> usize {
    40
}

/// Market inputs plus either preset strikes or explicit legs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionStrategyRequest {
    pub strategy: StrategyKind,
    pub spot: f64,
    pub volatility: f64,
    /// Years to the common expiry of every option leg.
    pub time_to_expiry: f64,
    #[serde(default)]
    pub risk_free_rate: f64,
    #[serde(default)]
    pub dividend_yield: f64,
    /// Ascending strikes for the preset legs. Empty means the default
    /// strikes around the spot.
    #[serde(default)]
    pub strikes: Vec<f64>,
    /// Explicit legs. Required for `custom`; replace the preset otherwise.
    #[serde(default)]
    pub legs: Vec<StrategyLeg>,
    /// Spot range of the payoff grid; defaults to ±30% around the spot.
    #[serde(default)]
    pub price_range: Option<(f64, f64)>,
    #[serde(default = "default_price_steps")]
    pub price_steps: usize,
}

/// A leg with its entry price: the Black-Scholes premium for options, the
/// spot for stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricedLeg {
    #[serde(flatten)]
    pub leg: StrategyLeg,
    pub entry_price: f64,
    pub greeks: Greeks,
}

/// Extreme of the expiry payoff. `Unlimited` when the payoff keeps growing
/// in that direction as the spot rises.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayoffBound {
    Limited { value: f64 },
    Unlimited,
}

impl PayoffBound {
    pub fn value(&self) -> Option<f64> {
        match self {
            PayoffBound::Limited { value } => Some(*value),
            PayoffBound::Unlimited => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoffPoint {
    pub spot: f64,
    pub payoff: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyAnalysis {
    pub strategy: StrategyKind,
    pub name: String,
    pub direction: String,
    pub risk_level: RiskLevel,
    pub legs: Vec<PricedLeg>,
    /// Option premium paid minus premium received; negative for a credit.
    pub net_premium: f64,
    pub max_profit: PayoffBound,
    /// Largest loss as a positive amount.
    pub max_loss: PayoffBound,
    pub breakevens: Vec<f64>,
    pub risk_reward_ratio: Option<f64>,
    /// Risk-neutral probability that the expiry payoff is positive.
    pub profit_probability: f64,
    pub greeks: Greeks,
    pub payoff: Vec<PayoffPoint>,
}

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

impl StrategyKind {
    pub fn display_name(self) -> &'static str {
        match self {
            StrategyKind::LongCall => "Long Call",
            StrategyKind::LongPut => "Long Put",
            StrategyKind::CoveredCall => "Covered Call",
            StrategyKind::ProtectivePut => "Protective Put",
            StrategyKind::Straddle => "Long Straddle",
            StrategyKind::Strangle => "Long Strangle",
            StrategyKind::IronCondor => "Iron Condor",
            StrategyKind::Butterfly => "Butterfly Spread",
            StrategyKind::Custom => "Custom Strategy",
        }
    }

    fn direction(self) -> &'static str {
        match self {
            StrategyKind::LongCall | StrategyKind::CoveredCall | StrategyKind::ProtectivePut => {
                "bullish"
            }
            StrategyKind::LongPut => "bearish",
            StrategyKind::Straddle | StrategyKind::Strangle => "volatile",
            StrategyKind::IronCondor | StrategyKind::Butterfly => "neutral",
            StrategyKind::Custom => "custom",
        }
    }

    /// Default strikes as fractions of spot.
    fn default_strike_ratios(self) -> &'static [f64] {
        match self {
            StrategyKind::LongCall | StrategyKind::LongPut | StrategyKind::Straddle => &[1.0],
            StrategyKind::CoveredCall => &[1.05],
            StrategyKind::ProtectivePut => &[0.95],
            StrategyKind::Strangle => &[0.95, 1.05],
            StrategyKind::IronCondor => &[0.90, 0.95, 1.05, 1.10],
            StrategyKind::Butterfly => &[0.95, 1.0, 1.05],
            StrategyKind::Custom => &[],
        }
    }
}

fn leg(kind: LegKind, position: Position, strike: Option<f64>, quantity: f64) -> StrategyLeg {
    StrategyLeg {
        kind,
        position,
        strike,
        quantity,
    }
}

/// Legs of a named strategy at the given ascending strikes.
pub fn preset_legs(kind: StrategyKind, strikes: &[f64]) -> QuantfolioResult<Vec<StrategyLeg>> {
    use LegKind::{Call, Put, Stock};
    use Position::{Long, Short};

    let expected = kind.default_strike_ratios().len();
    if kind == StrategyKind::Custom {
        return Err(QuantfolioError::invalid(
            "legs",
            "a custom strategy needs explicit legs",
        ));
    }
    if strikes.len() != expected {
        return Err(QuantfolioError::invalid(
            "strikes",
            format!("{} takes {expected} strikes, got {}", kind.display_name(), strikes.len()),
        ));
    }
    if strikes.windows(2).any(|w| w[1] <= w[0]) {
        return Err(QuantfolioError::invalid("strikes", "must be strictly ascending"));
    }

    let k = |i: usize| Some(strikes[i]);
    Ok(match kind {
        StrategyKind::LongCall => vec![leg(Call, Long, k(0), 1.0)],
        StrategyKind::LongPut => vec![leg(Put, Long, k(0), 1.0)],
        StrategyKind::CoveredCall => vec![leg(Stock, Long, None, 1.0), leg(Call, Short, k(0), 1.0)],
        StrategyKind::ProtectivePut => vec![leg(Stock, Long, None, 1.0), leg(Put, Long, k(0), 1.0)],
        StrategyKind::Straddle => vec![leg(Call, Long, k(0), 1.0), leg(Put, Long, k(0), 1.0)],
        StrategyKind::Strangle => vec![leg(Put, Long, k(0), 1.0), leg(Call, Long, k(1), 1.0)],
        StrategyKind::IronCondor => vec![
            leg(Put, Long, k(0), 1.0),
            leg(Put, Short, k(1), 1.0),
            leg(Call, Short, k(2), 1.0),
            leg(Call, Long, k(3), 1.0),
        ],
        StrategyKind::Butterfly => vec![
            leg(Call, Long, k(0), 1.0),
            leg(Call, Short, k(1), 2.0),
            leg(Call, Long, k(2), 1.0),
        ],
        StrategyKind::Custom => Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_request(request: &OptionStrategyRequest) -> QuantfolioResult<()> {
    if !request.spot.is_finite() || request.spot <= 0.0 {
        return Err(QuantfolioError::invalid("spot", "must be positive and finite"));
    }
    if !request.volatility.is_finite() || request.volatility <= 0.0 {
        return Err(QuantfolioError::InvalidVolatility(request.volatility));
    }
    if !request.time_to_expiry.is_finite() || request.time_to_expiry <= 0.0 {
        return Err(QuantfolioError::invalid(
            "time_to_expiry",
            "must be positive and finite",
        ));
    }
    if request.price_steps == 0 {
        return Err(QuantfolioError::invalid(
            "price_steps",
            "must have at least 1 price step",
        ));
    }
    Ok(())
}

fn validate_legs(kind: StrategyKind, legs: &[StrategyLeg]) -> QuantfolioResult<()> {
    if legs.is_empty() {
        return Err(QuantfolioError::invalid("legs", "at least one leg is required"));
    }
    for (i, leg) in legs.iter().enumerate() {
        if !leg.quantity.is_finite() || leg.quantity <= 0.0 {
            return Err(QuantfolioError::invalid(
                format!("legs[{i}].quantity"),
                "must be positive and finite",
            ));
        }
        match (leg.kind, leg.strike) {
            (LegKind::Stock, _) => {}
            (_, Some(k)) if k.is_finite() && k > 0.0 => {}
            (_, Some(_)) => {
                return Err(QuantfolioError::invalid(
                    format!("legs[{i}].strike"),
                    "must be positive and finite",
                ))
            }
            (_, None) => {
                return Err(QuantfolioError::invalid(
                    format!("legs[{i}].strike"),
                    "required for call and put legs",
                ))
            }
        }
    }

    let count = |kind: LegKind| legs.iter().filter(|l| l.kind == kind).count();
    let (calls, puts, stock) = (count(LegKind::Call), count(LegKind::Put), count(LegKind::Stock));
    let ok = match kind {
        StrategyKind::LongCall => (calls, puts, stock) == (1, 0, 0),
        StrategyKind::LongPut => (calls, puts, stock) == (0, 1, 0),
        StrategyKind::CoveredCall => (calls, puts, stock) == (1, 0, 1),
        StrategyKind::ProtectivePut => (calls, puts, stock) == (0, 1, 1),
        StrategyKind::Straddle | StrategyKind::Strangle => (calls, puts, stock) == (1, 1, 0),
        StrategyKind::IronCondor => (calls, puts, stock) == (2, 2, 0),
        StrategyKind::Butterfly => {
            stock == 0 && ((calls == 3 && puts == 0) || (puts == 3 && calls == 0))
        }
        StrategyKind::Custom => true,
    };
    if !ok {
        return Err(QuantfolioError::invalid(
            "legs",
            format!(
                "{} cannot be built from {calls} call, {puts} put and {stock} stock legs",
                kind.display_name()
            ),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Payoff
// ---------------------------------------------------------------------------

/// Expiry payoff of one priced leg at spot `s`, net of its entry price.
fn leg_payoff(leg: &PricedLeg, s: f64) -> f64 {
    let value = match (leg.leg.kind, leg.leg.strike) {
        (LegKind::Call, Some(k)) => (s - k).max(0.0),
        (LegKind::Put, Some(k)) => (k - s).max(0.0),
        (LegKind::Stock, _) => s,
        _ => 0.0,
    };
    leg.leg.position.sign() * leg.leg.quantity * (value - leg.entry_price)
}

fn strategy_payoff(legs: &[PricedLeg], s: f64) -> f64 {
    legs.iter().map(|l| leg_payoff(l, s)).sum()
}

/// Payoff slope beyond the highest strike.
fn terminal_slope(legs: &[PricedLeg]) -> f64 {
    legs.iter()
        .filter(|l| matches!(l.leg.kind, LegKind::Call | LegKind::Stock))
        .map(|l| l.leg.position.sign() * l.leg.quantity)
        .sum()
}

/// Zero spot plus every strike, ascending. The payoff is linear between
/// consecutive nodes.
fn payoff_nodes(legs: &[PricedLeg]) -> Vec<f64> {
    let mut nodes: Vec<f64> = std::iter::once(0.0)
        .chain(legs.iter().filter_map(|l| l.leg.strike.filter(|_| l.leg.kind != LegKind::Stock)))
        .collect();
    nodes.sort_by(|a, b| a.total_cmp(b));
    nodes.dedup();
    nodes
}

/// Exact roots of the piecewise-linear payoff.
fn find_breakevens(nodes: &[f64], values: &[f64], slope: f64) -> Vec<f64> {
    let mut roots: Vec<f64> = Vec::new();
    let mut push = |x: f64| {
        if roots.last().map_or(true, |last| x - last > BREAKEVEN_MERGE) {
            roots.push(x);
        }
    };
    for i in 0..nodes.len() {
        let a = values[i];
        if a.abs() <= ZERO_PAYOFF {
            push(nodes[i]);
            continue;
        }
        if let (Some(&b), Some(&x_next)) = (values.get(i + 1), nodes.get(i + 1)) {
            if b.abs() > ZERO_PAYOFF && (a < 0.0) != (b < 0.0) {
                push(nodes[i] + a / (a - b) * (x_next - nodes[i]));
            }
        }
    }
    if let (Some(&x), Some(&a)) = (nodes.last(), values.last()) {
        if a.abs() > ZERO_PAYOFF && a * slope < 0.0 {
            push(x - a / slope);
        }
    }
    roots
}

fn build_payoff_grid(legs: &[PricedLeg], low: f64, high: f64, steps: usize) -> Vec<PayoffPoint> {
    let step = (high - low) / steps as f64;
    (0..=steps)
        .map(|i| {
            let spot = if i == steps { high } else { low + step * i as f64 };
            PayoffPoint {
                spot,
                payoff: strategy_payoff(legs, spot),
            }
        })
        .collect()
}

/// Risk-neutral probability that the spot at expiry lands where the payoff
/// is positive. Sign is constant between breakevens, so one test point per
/// interval decides it.
fn profit_probability(
    request: &OptionStrategyRequest,
    legs: &[PricedLeg],
    breakevens: &[f64],
) -> QuantfolioResult<f64> {
    let n = standard_normal()?;
    let t = request.time_to_expiry;
    let sigma_sqrt_t = request.volatility * t.sqrt();
    let drift =
        (request.risk_free_rate - request.dividend_yield - 0.5 * request.volatility.powi(2)) * t;
    let below = |x: f64| -> f64 {
        if x <= 0.0 {
            0.0
        } else if x.is_infinite() {
            1.0
        } else {
            n.cdf(((x / request.spot).ln() - drift) / sigma_sqrt_t)
        }
    };

    let mut edges = vec![0.0];
    edges.extend_from_slice(breakevens);
    edges.push(f64::INFINITY);
    let mut probability = 0.0;
    for pair in edges.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let sample_spot = if b.is_infinite() {
            2.0 * a.max(request.spot)
        } else {
            0.5 * (a + b)
        };
        if strategy_payoff(legs, sample_spot) > 0.0 {
            probability += below(b) - below(a);
        }
    }
    Ok(probability.clamp(0.0, 1.0))
}

fn risk_level(kind: StrategyKind, max_loss: PayoffBound) -> RiskLevel {
    match kind {
        StrategyKind::CoveredCall | StrategyKind::ProtectivePut => RiskLevel::Low,
        StrategyKind::LongCall
        | StrategyKind::LongPut
        | StrategyKind::IronCondor
        | StrategyKind::Butterfly => RiskLevel::Medium,
        StrategyKind::Straddle | StrategyKind::Strangle => RiskLevel::High,
        StrategyKind::Custom => match max_loss {
            PayoffBound::Unlimited => RiskLevel::High,
            PayoffBound::Limited { .. } => RiskLevel::Medium,
        },
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Price every leg with Black-Scholes and analyse the combined expiry
/// payoff: extremes, breakevens, profit probability and net Greeks.
pub fn analyze_option_strategy(
    request: &OptionStrategyRequest,
) -> QuantfolioResult<ComputationOutput<StrategyAnalysis>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    validate_request(request)?;

    let kind = request.strategy;
    let legs = if !request.legs.is_empty() {
        request.legs.clone()
    } else if request.strikes.is_empty() {
        let strikes: Vec<f64> = kind
            .default_strike_ratios()
            .iter()
            .map(|r| r * request.spot)
            .collect();
        preset_legs(kind, &strikes)?
    } else {
        preset_legs(kind, &request.strikes)?
    };
    validate_legs(kind, &legs)?;

    let priced: Vec<PricedLeg> = legs
        .iter()
        .map(|leg| -> QuantfolioResult<PricedLeg> {
            let option_type = match leg.kind {
                LegKind::Call => OptionType::Call,
                LegKind::Put => OptionType::Put,
                LegKind::Stock => {
                    return Ok(PricedLeg {
                        leg: *leg,
                        entry_price: request.spot,
                        greeks: Greeks {
                            delta: 1.0,
                            ..Default::default()
                        },
                    })
                }
            };
            let params = OptionParams {
                spot: request.spot,
                strike: leg.strike.unwrap_or(request.spot),
                time_to_expiry: request.time_to_expiry,
                risk_free_rate: request.risk_free_rate,
                volatility: request.volatility,
                dividend_yield: request.dividend_yield,
            };
            let valuation = price_european(&params, option_type)?;
            Ok(PricedLeg {
                leg: *leg,
                entry_price: valuation.price,
                greeks: valuation.greeks,
            })
        })
        .collect::<QuantfolioResult<_>>()?;

    let net_premium: f64 = priced
        .iter()
        .filter(|l| l.leg.kind != LegKind::Stock)
        .map(|l| l.leg.position.sign() * l.leg.quantity * l.entry_price)
        .sum();
    let greeks = priced.iter().fold(Greeks::default(), |acc, l| {
        acc + l.greeks.scaled(l.leg.position.sign() * l.leg.quantity)
    });

    let nodes = payoff_nodes(&priced);
    let values: Vec<f64> = nodes.iter().map(|x| strategy_payoff(&priced, *x)).collect();
    let slope = terminal_slope(&priced);
    let highest = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let lowest = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max_profit = if slope > ZERO_PAYOFF {
        PayoffBound::Unlimited
    } else {
        PayoffBound::Limited { value: highest }
    };
    let max_loss = if slope < -ZERO_PAYOFF {
        PayoffBound::Unlimited
    } else {
        PayoffBound::Limited {
            value: (-lowest).max(0.0),
        }
    };
    if max_profit == PayoffBound::Unlimited {
        warnings.push("Profit potential is theoretically unlimited".into());
    }
    if max_loss == PayoffBound::Unlimited {
        warnings.push("Loss potential is theoretically unlimited".into());
    }
    let risk_reward_ratio = match (max_profit, max_loss) {
        (PayoffBound::Limited { value: p }, PayoffBound::Limited { value: l }) if l > 0.0 => {
            Some(p / l)
        }
        _ => None,
    };

    let breakevens = find_breakevens(&nodes, &values, slope);
    if breakevens.is_empty() {
        warnings.push("Payoff never crosses zero at expiry".into());
    }
    let profit_probability = profit_probability(request, &priced, &breakevens)?;

    let (low, high) = request
        .price_range
        .unwrap_or((0.7 * request.spot, 1.3 * request.spot));
    let low = low.max(0.0);
    if !(low.is_finite() && high.is_finite() && low < high) {
        return Err(QuantfolioError::invalid(
            "price_range",
            "low price must be below high price",
        ));
    }
    let payoff = build_payoff_grid(&priced, low, high, request.price_steps);

    let analysis = StrategyAnalysis {
        strategy: kind,
        name: kind.display_name().to_string(),
        direction: kind.direction().to_string(),
        risk_level: risk_level(kind, max_loss),
        legs: priced,
        net_premium,
        max_profit,
        max_loss,
        breakevens,
        risk_reward_ratio,
        profit_probability,
        greeks,
        payoff,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Black-Scholes priced legs with piecewise-linear expiry payoff analysis",
        &serde_json::json!({
            "strategy": kind.display_name(),
            "spot": request.spot,
            "volatility": request.volatility,
            "time_to_expiry": request.time_to_expiry,
            "legs": analysis.legs.len(),
            "price_range": [low, high],
            "price_steps": request.price_steps,
            "profit_probability": "risk-neutral lognormal",
        }),
        warnings,
        elapsed,
        analysis,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(strategy: StrategyKind, strikes: Vec<f64>) -> OptionStrategyRequest {
        OptionStrategyRequest {
            strategy,
            spot: 100.0,
            volatility: 0.2,
            time_to_expiry: 1.0,
            risk_free_rate: 0.0,
            dividend_yield: 0.0,
            strikes,
            legs: Vec::new(),
            price_range: None,
            price_steps: 40,
        }
    }

    fn premium(strike: f64, option_type: OptionType, req: &OptionStrategyRequest) -> f64 {
        let params = OptionParams {
            spot: req.spot,
            strike,
            time_to_expiry: req.time_to_expiry,
            risk_free_rate: req.risk_free_rate,
            volatility: req.volatility,
            dividend_yield: req.dividend_yield,
        };
        price_european(&params, option_type).unwrap().price
    }

    #[test]
    fn test_straddle_breakevens() {
        // r = q = 0 at the money: C = P = S(2N(σ√T/2) − 1), N(0.1) = 0.5398278372770290
        let debit = 2.0 * 100.0 * (2.0 * 0.539_827_837_277_029 - 1.0);
        let out = analyze_option_strategy(&request(StrategyKind::Straddle, vec![100.0])).unwrap();
        let r = out.result;
        assert!((r.net_premium - debit).abs() < 1e-6);
        assert_eq!(r.breakevens.len(), 2);
        assert!((r.breakevens[0] - (100.0 - debit)).abs() < 1e-6);
        assert!((r.breakevens[1] - (100.0 + debit)).abs() < 1e-6);
        assert!((r.breakevens[0] - 84.068_865_089).abs() < 1e-6);
        assert_eq!(r.max_profit, PayoffBound::Unlimited);
        assert!((r.max_loss.value().unwrap() - debit).abs() < 1e-9);
        assert_eq!(r.risk_level, RiskLevel::High);
        assert!(out.warnings.iter().any(|w| w.contains("Profit potential")));
    }

    #[test]
    fn test_iron_condor_credit_and_breakevens() {
        let mut req = request(StrategyKind::IronCondor, vec![90.0, 95.0, 105.0, 110.0]);
        req.volatility = 0.25;
        req.time_to_expiry = 0.5;
        req.risk_free_rate = 0.03;
        let credit = premium(95.0, OptionType::Put, &req) - premium(90.0, OptionType::Put, &req)
            + premium(105.0, OptionType::Call, &req)
            - premium(110.0, OptionType::Call, &req);
        assert!(credit > 0.0);

        let r = analyze_option_strategy(&req).unwrap().result;
        assert!((r.net_premium + credit).abs() < 1e-9);
        assert_eq!(r.breakevens.len(), 2);
        assert!((r.breakevens[0] - (95.0 - credit)).abs() < 1e-9);
        assert!((r.breakevens[1] - (105.0 + credit)).abs() < 1e-9);
        assert!((r.max_profit.value().unwrap() - credit).abs() < 1e-9);
        assert!((r.max_loss.value().unwrap() - (5.0 - credit)).abs() < 1e-9);
        assert_eq!(r.risk_level, RiskLevel::Medium);
        assert!(r.profit_probability > 0.0 && r.profit_probability < 1.0);
    }

    #[test]
    fn test_butterfly_peaks_at_middle_strike() {
        let req = request(StrategyKind::Butterfly, Vec::new());
        let debit = premium(95.0, OptionType::Call, &req)
            - 2.0 * premium(100.0, OptionType::Call, &req)
            + premium(105.0, OptionType::Call, &req);
        let r = analyze_option_strategy(&req).unwrap().result;
        assert!((r.net_premium - debit).abs() < 1e-9);
        assert!((r.max_profit.value().unwrap() - (5.0 - debit)).abs() < 1e-9);
        assert!((r.max_loss.value().unwrap() - debit).abs() < 1e-9);
        assert!((r.breakevens[0] - (95.0 + debit)).abs() < 1e-9);
        assert!((r.breakevens[1] - (105.0 - debit)).abs() < 1e-9);
    }

    #[test]
    fn test_long_put_profit_capped_at_zero_spot() {
        let req = request(StrategyKind::LongPut, vec![100.0]);
        let p = premium(100.0, OptionType::Put, &req);
        let r = analyze_option_strategy(&req).unwrap().result;
        assert!((r.max_profit.value().unwrap() - (100.0 - p)).abs() < 1e-9);
        assert!((r.max_loss.value().unwrap() - p).abs() < 1e-9);
        assert_eq!(r.breakevens.len(), 1);
        assert!((r.breakevens[0] - (100.0 - p)).abs() < 1e-9);
    }

    #[test]
    fn test_covered_call_is_bounded_both_ways() {
        let req = request(StrategyKind::CoveredCall, Vec::new());
        let c = premium(105.0, OptionType::Call, &req);
        let r = analyze_option_strategy(&req).unwrap().result;
        // Called away at 105; stock worthless at zero
        assert!((r.max_profit.value().unwrap() - (5.0 + c)).abs() < 1e-9);
        assert!((r.max_loss.value().unwrap() - (100.0 - c)).abs() < 1e-9);
        assert!((r.net_premium + c).abs() < 1e-9);
        assert!((r.greeks.delta - (1.0 - r.legs[1].greeks.delta)).abs() < 1e-12);
        assert_eq!(r.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_naked_short_call_loss_unlimited() {
        let mut req = request(StrategyKind::Custom, Vec::new());
        req.legs = vec![StrategyLeg {
            kind: LegKind::Call,
            position: Position::Short,
            strike: Some(110.0),
            quantity: 1.0,
        }];
        let out = analyze_option_strategy(&req).unwrap();
        assert_eq!(out.result.max_loss, PayoffBound::Unlimited);
        assert_eq!(out.result.risk_level, RiskLevel::High);
        assert!(out.result.risk_reward_ratio.is_none());
        assert!(out.warnings.iter().any(|w| w.contains("Loss potential")));
    }

    #[test]
    fn test_payoff_grid_spans_range() {
        let mut req = request(StrategyKind::LongCall, vec![100.0]);
        req.price_steps = 10;
        let r = analyze_option_strategy(&req).unwrap().result;
        assert_eq!(r.payoff.len(), 11);
        assert!((r.payoff[0].spot - 70.0).abs() < 1e-12);
        assert!((r.payoff[10].spot - 130.0).abs() < 1e-12);
        let c = r.legs[0].entry_price;
        assert!((r.payoff[0].payoff + c).abs() < 1e-12);
        assert!((r.payoff[10].payoff - (30.0 - c)).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_strike_sets() {
        assert!(matches!(
            analyze_option_strategy(&request(StrategyKind::IronCondor, vec![90.0, 95.0, 105.0])),
            Err(QuantfolioError::InvalidInput { .. })
        ));
        assert!(matches!(
            analyze_option_strategy(&request(StrategyKind::Strangle, vec![105.0, 95.0])),
            Err(QuantfolioError::InvalidInput { .. })
        ));
        assert!(analyze_option_strategy(&request(StrategyKind::Custom, Vec::new())).is_err());
    }

    #[test]
    fn test_explicit_legs_must_match_strategy() {
        let mut req = request(StrategyKind::Straddle, Vec::new());
        req.legs = vec![StrategyLeg {
            kind: LegKind::Call,
            position: Position::Long,
            strike: Some(100.0),
            quantity: 1.0,
        }];
        assert!(matches!(
            analyze_option_strategy(&req),
            Err(QuantfolioError::InvalidInput { .. })
        ));
    }
}

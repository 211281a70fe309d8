use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

use crate::error::QuantfolioError;
use crate::statistics::moments::standard_normal;
use crate::QuantfolioResult;

/// Implied-volatility search interval.
const IV_LOWER: f64 = 1e-4;
const IV_UPPER: f64 = 5.0;
/// Price tolerance for the implied-volatility solve.
const IV_PRICE_TOLERANCE: f64 = 1e-8;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionType {
    Call,
    Put,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Moneyness {
    Itm,
    Atm,
    Otm,
}

/// Black-Scholes inputs. Time in years; rates, yield and volatility as
/// annual fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionParams {
    pub spot: f64,
    pub strike: f64,
    pub time_to_expiry: f64,
    pub risk_free_rate: f64,
    pub volatility: f64,
    #[serde(default)]
    pub dividend_yield: f64,
}

/// Sensitivities. Delta per unit of spot, gamma per unit of spot squared,
/// theta per calendar day, vega and rho per one percentage point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

impl Greeks {
    pub fn scaled(&self, factor: f64) -> Greeks {
        Greeks {
            delta: self.delta * factor,
            gamma: self.gamma * factor,
            theta: self.theta * factor,
            vega: self.vega * factor,
            rho: self.rho * factor,
        }
    }
}

impl std::ops::Add for Greeks {
    type Output = Greeks;

    fn add(self, other: Greeks) -> Greeks {
        Greeks {
            delta: self.delta + other.delta,
            gamma: self.gamma + other.gamma,
            theta: self.theta + other.theta,
            vega: self.vega + other.vega,
            rho: self.rho + other.rho,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionValuation {
    pub price: f64,
    pub intrinsic_value: f64,
    pub time_value: f64,
    pub greeks: Greeks,
    pub moneyness: Moneyness,
    pub breakeven: f64,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_market(spot: f64, strike: f64, rate: f64, dividend_yield: f64) -> QuantfolioResult<()> {
    if !spot.is_finite() || spot <= 0.0 {
        return Err(QuantfolioError::invalid("spot", "must be positive and finite"));
    }
    if !strike.is_finite() || strike <= 0.0 {
        return Err(QuantfolioError::invalid("strike", "must be positive and finite"));
    }
    if !rate.is_finite() {
        return Err(QuantfolioError::invalid("risk_free_rate", "must be finite"));
    }
    if !dividend_yield.is_finite() {
        return Err(QuantfolioError::invalid("dividend_yield", "must be finite"));
    }
    Ok(())
}

fn validate_params(params: &OptionParams) -> QuantfolioResult<()> {
    if !params.volatility.is_finite() || params.volatility <= 0.0 {
        return Err(QuantfolioError::InvalidVolatility(params.volatility));
    }
    validate_market(
        params.spot,
        params.strike,
        params.risk_free_rate,
        params.dividend_yield,
    )?;
    if !params.time_to_expiry.is_finite() {
        return Err(QuantfolioError::invalid(
            "time_to_expiry",
            format!("{} is not a finite time to expiry", params.time_to_expiry),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Black-Scholes core
// ---------------------------------------------------------------------------

struct BsTerms {
    d1: f64,
    d2: f64,
    sqrt_t: f64,
    exp_neg_qt: f64,
    exp_neg_rt: f64,
}

fn bs_terms(s: f64, k: f64, t: f64, r: f64, q: f64, sigma: f64) -> BsTerms {
    let sqrt_t = t.sqrt();
    let sigma_sqrt_t = sigma * sqrt_t;
    let d1 = ((s / k).ln() + (r - q + 0.5 * sigma * sigma) * t) / sigma_sqrt_t;
    BsTerms {
        d1,
        d2: d1 - sigma_sqrt_t,
        sqrt_t,
        exp_neg_qt: (-q * t).exp(),
        exp_neg_rt: (-r * t).exp(),
    }
}

fn bs_price(n: &Normal, s: f64, k: f64, terms: &BsTerms, option_type: OptionType) -> f64 {
    match option_type {
        OptionType::Call => {
            s * terms.exp_neg_qt * n.cdf(terms.d1) - k * terms.exp_neg_rt * n.cdf(terms.d2)
        }
        OptionType::Put => {
            k * terms.exp_neg_rt * n.cdf(-terms.d2) - s * terms.exp_neg_qt * n.cdf(-terms.d1)
        }
    }
}

fn bs_greeks(
    n: &Normal,
    params: &OptionParams,
    terms: &BsTerms,
    option_type: OptionType,
) -> Greeks {
    let (s, k, t, r, q, sigma) = (
        params.spot,
        params.strike,
        params.time_to_expiry,
        params.risk_free_rate,
        params.dividend_yield,
        params.volatility,
    );
    let pdf_d1 = n.pdf(terms.d1);

    let delta = match option_type {
        OptionType::Call => terms.exp_neg_qt * n.cdf(terms.d1),
        OptionType::Put => -terms.exp_neg_qt * n.cdf(-terms.d1),
    };
    let gamma = terms.exp_neg_qt * pdf_d1 / (s * sigma * terms.sqrt_t);

    let decay = -s * terms.exp_neg_qt * pdf_d1 * sigma / (2.0 * terms.sqrt_t);
    let theta_annual = match option_type {
        OptionType::Call => {
            decay - r * k * terms.exp_neg_rt * n.cdf(terms.d2)
                + q * s * terms.exp_neg_qt * n.cdf(terms.d1)
        }
        OptionType::Put => {
            decay + r * k * terms.exp_neg_rt * n.cdf(-terms.d2)
                - q * s * terms.exp_neg_qt * n.cdf(-terms.d1)
        }
    };

    let vega = s * terms.exp_neg_qt * pdf_d1 * terms.sqrt_t / 100.0;
    let rho = match option_type {
        OptionType::Call => k * t * terms.exp_neg_rt * n.cdf(terms.d2) / 100.0,
        OptionType::Put => -k * t * terms.exp_neg_rt * n.cdf(-terms.d2) / 100.0,
    };

    Greeks {
        delta,
        gamma,
        theta: theta_annual / 365.0,
        vega,
        rho,
    }
}

fn intrinsic_value(s: f64, k: f64, option_type: OptionType) -> f64 {
    match option_type {
        OptionType::Call => (s - k).max(0.0),
        OptionType::Put => (k - s).max(0.0),
    }
}

fn classify_moneyness(s: f64, k: f64, option_type: OptionType) -> Moneyness {
    // ATM band: within 1% of strike
    let ratio = s / k;
    if (0.99..=1.01).contains(&ratio) {
        return Moneyness::Atm;
    }
    let call_itm = ratio > 1.01;
    match (option_type, call_itm) {
        (OptionType::Call, true) | (OptionType::Put, false) => Moneyness::Itm,
        _ => Moneyness::Otm,
    }
}

fn breakeven(k: f64, premium: f64, option_type: OptionType) -> f64 {
    match option_type {
        OptionType::Call => k + premium,
        OptionType::Put => k - premium,
    }
}

/// Payoff at expiry with the limiting Greeks: delta is ±1 in the money and
/// zero otherwise, every other Greek is zero.
fn expired_valuation(params: &OptionParams, option_type: OptionType) -> OptionValuation {
    let (s, k) = (params.spot, params.strike);
    let intrinsic = intrinsic_value(s, k, option_type);
    let delta = match option_type {
        OptionType::Call if s > k => 1.0,
        OptionType::Put if s < k => -1.0,
        _ => 0.0,
    };
    OptionValuation {
        price: intrinsic,
        intrinsic_value: intrinsic,
        time_value: 0.0,
        greeks: Greeks {
            delta,
            ..Greeks::default()
        },
        moneyness: classify_moneyness(s, k, option_type),
        breakeven: breakeven(k, intrinsic, option_type),
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Black-Scholes-Merton valuation of a European option with continuous
/// dividend yield.
pub fn price_european(
    params: &OptionParams,
    option_type: OptionType,
) -> QuantfolioResult<OptionValuation> {
    validate_params(params)?;
    if params.time_to_expiry <= 0.0 {
        return Ok(expired_valuation(params, option_type));
    }

    let n = standard_normal()?;
    let terms = bs_terms(
        params.spot,
        params.strike,
        params.time_to_expiry,
        params.risk_free_rate,
        params.dividend_yield,
        params.volatility,
    );
    let price = bs_price(&n, params.spot, params.strike, &terms, option_type);
    let greeks = bs_greeks(&n, params, &terms, option_type);
    let intrinsic = intrinsic_value(params.spot, params.strike, option_type);

    Ok(OptionValuation {
        price,
        intrinsic_value: intrinsic,
        time_value: price - intrinsic,
        greeks,
        moneyness: classify_moneyness(params.spot, params.strike, option_type),
        breakeven: breakeven(params.strike, price, option_type),
    })
}

/// Solved implied volatility and the number of iterations used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpliedVolSolution {
    pub implied_volatility: f64,
    pub iterations: u32,
}

/// Volatility that reproduces `market_price`.
///
/// Newton-Raphson from 0.20; when a step leaves the search interval or vega
/// vanishes, falls back to bisection on [1e-4, 5].
pub fn solve_implied_volatility(
    spot: f64,
    strike: f64,
    time_to_expiry: f64,
    risk_free_rate: f64,
    dividend_yield: f64,
    option_type: OptionType,
    market_price: f64,
) -> QuantfolioResult<ImpliedVolSolution> {
    validate_market(spot, strike, risk_free_rate, dividend_yield)?;
    if !time_to_expiry.is_finite() || time_to_expiry <= 0.0 {
        return Err(QuantfolioError::invalid(
            "time_to_expiry",
            "implied volatility needs a positive time to expiry",
        ));
    }
    if !market_price.is_finite() {
        return Err(QuantfolioError::invalid("market_price", "must be finite"));
    }

    let t = time_to_expiry;
    let fwd_spot = spot * (-dividend_yield * t).exp();
    let pv_strike = strike * (-risk_free_rate * t).exp();
    let (lower_bound, upper_bound) = match option_type {
        OptionType::Call => ((fwd_spot - pv_strike).max(0.0), fwd_spot),
        OptionType::Put => ((pv_strike - fwd_spot).max(0.0), pv_strike),
    };
    if market_price <= lower_bound || market_price >= upper_bound {
        return Err(QuantfolioError::invalid(
            "market_price",
            format!(
                "{market_price} is outside the no-arbitrage bounds ({lower_bound:.6}, {upper_bound:.6})"
            ),
        ));
    }

    let n = standard_normal()?;
    let price_at = |sigma: f64| {
        let terms = bs_terms(spot, strike, t, risk_free_rate, dividend_yield, sigma);
        (bs_price(&n, spot, strike, &terms, option_type), terms)
    };

    let max_newton: u32 = 100;
    let mut sigma = 0.20;
    let mut iterations: u32 = 0;
    for _ in 0..max_newton {
        iterations += 1;
        let (price, terms) = price_at(sigma);
        let diff = price - market_price;
        if diff.abs() < IV_PRICE_TOLERANCE {
            return Ok(ImpliedVolSolution {
                implied_volatility: sigma,
                iterations,
            });
        }
        let vega_raw = spot * terms.exp_neg_qt * n.pdf(terms.d1) * terms.sqrt_t;
        if vega_raw <= 1e-10 {
            break;
        }
        let next = sigma - diff / vega_raw;
        if !(IV_LOWER..=IV_UPPER).contains(&next) {
            break;
        }
        sigma = next;
    }

    // Bisection: price is increasing in volatility
    let (mut lo, mut hi) = (IV_LOWER, IV_UPPER);
    let mut last_delta = f64::INFINITY;
    for _ in 0..200 {
        iterations += 1;
        let mid = 0.5 * (lo + hi);
        let diff = price_at(mid).0 - market_price;
        last_delta = diff.abs();
        if last_delta < IV_PRICE_TOLERANCE {
            return Ok(ImpliedVolSolution {
                implied_volatility: mid,
                iterations,
            });
        }
        if diff > 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
        if hi - lo < 1e-15 {
            break;
        }
    }
    Err(QuantfolioError::ConvergenceFailure {
        function: "implied_volatility".into(),
        iterations,
        last_delta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atm(t: f64) -> OptionParams {
        OptionParams {
            spot: 100.0,
            strike: 100.0,
            time_to_expiry: t,
            risk_free_rate: 0.05,
            volatility: 0.20,
            dividend_yield: 0.0,
        }
    }

    // ------------------------------------------------------------------
    // 1. Reference prices (Hull: S=K=100, r=5%, σ=20%, T=1)
    // ------------------------------------------------------------------
    #[test]
    fn test_reference_prices() {
        let call = price_european(&atm(1.0), OptionType::Call).unwrap();
        let put = price_european(&atm(1.0), OptionType::Put).unwrap();
        assert!((call.price - 10.4506).abs() < 1e-3);
        assert!((put.price - 5.5735).abs() < 1e-3);
    }

    // ------------------------------------------------------------------
    // 2. Put-call parity
    // ------------------------------------------------------------------
    #[test]
    fn test_put_call_parity_with_dividends() {
        let mut p = atm(0.75);
        p.dividend_yield = 0.02;
        p.strike = 95.0;
        let call = price_european(&p, OptionType::Call).unwrap().price;
        let put = price_european(&p, OptionType::Put).unwrap().price;
        let parity = p.spot * (-0.02_f64 * 0.75).exp() - 95.0 * (-0.05_f64 * 0.75).exp();
        assert!((call - put - parity).abs() < 1e-10);
    }

    // ------------------------------------------------------------------
    // 3. Greek signs and units
    // ------------------------------------------------------------------
    #[test]
    fn test_greek_signs() {
        let call = price_european(&atm(0.5), OptionType::Call).unwrap().greeks;
        let put = price_european(&atm(0.5), OptionType::Put).unwrap().greeks;
        assert!(call.delta > 0.0 && call.delta < 1.0);
        assert!(put.delta < 0.0 && put.delta > -1.0);
        assert!((call.delta - put.delta - 1.0).abs() < 1e-12);
        assert!(call.gamma > 0.0 && (call.gamma - put.gamma).abs() < 1e-12);
        assert!(call.theta < 0.0 && put.theta < 0.0);
        assert!(call.vega > 0.0 && (call.vega - put.vega).abs() < 1e-12);
        assert!(call.rho > 0.0 && put.rho < 0.0);
    }

    #[test]
    fn test_vega_is_per_percentage_point() {
        let base = price_european(&atm(1.0), OptionType::Call).unwrap();
        let mut bumped = atm(1.0);
        bumped.volatility = 0.21;
        let up = price_european(&bumped, OptionType::Call).unwrap();
        assert!((up.price - base.price - base.greeks.vega).abs() < 1e-3);
    }

    #[test]
    fn test_theta_is_per_day() {
        let base = price_european(&atm(1.0), OptionType::Call).unwrap();
        let later = price_european(&atm(1.0 - 1.0 / 365.0), OptionType::Call).unwrap();
        assert!((later.price - base.price - base.greeks.theta).abs() < 1e-3);
    }

    // ------------------------------------------------------------------
    // 4. Expiry
    // ------------------------------------------------------------------
    #[test]
    fn test_expired_itm_call() {
        let mut p = atm(0.0);
        p.spot = 110.0;
        let v = price_european(&p, OptionType::Call).unwrap();
        assert_eq!(v.price, 10.0);
        assert_eq!(v.greeks.delta, 1.0);
        assert_eq!(v.greeks.gamma, 0.0);
        assert_eq!(v.greeks.vega, 0.0);
        assert_eq!(v.moneyness, Moneyness::Itm);
    }

    #[test]
    fn test_expired_itm_put_and_otm() {
        let mut p = atm(-0.1);
        p.spot = 90.0;
        let put = price_european(&p, OptionType::Put).unwrap();
        assert_eq!(put.price, 10.0);
        assert_eq!(put.greeks.delta, -1.0);
        let call = price_european(&p, OptionType::Call).unwrap();
        assert_eq!(call.price, 0.0);
        assert_eq!(call.greeks.delta, 0.0);
    }

    #[test]
    fn test_price_converges_to_intrinsic() {
        let mut p = atm(1e-10);
        p.spot = 105.0;
        let v = price_european(&p, OptionType::Call).unwrap();
        assert!((v.price - 5.0).abs() < 1e-6);
    }

    // ------------------------------------------------------------------
    // 5. Validation
    // ------------------------------------------------------------------
    #[test]
    fn test_invalid_volatility() {
        let mut p = atm(1.0);
        p.volatility = 0.0;
        assert!(matches!(
            price_european(&p, OptionType::Call),
            Err(QuantfolioError::InvalidVolatility(_))
        ));
        // Volatility is checked even at expiry
        p.time_to_expiry = 0.0;
        p.volatility = -0.1;
        assert!(matches!(
            price_european(&p, OptionType::Put),
            Err(QuantfolioError::InvalidVolatility(_))
        ));
    }

    #[test]
    fn test_invalid_spot() {
        let mut p = atm(1.0);
        p.spot = 0.0;
        assert!(matches!(
            price_european(&p, OptionType::Call),
            Err(QuantfolioError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_non_finite_expiry_rejected() {
        for t in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let mut p = atm(1.0);
            p.time_to_expiry = t;
            assert!(
                matches!(
                    price_european(&p, OptionType::Call),
                    Err(QuantfolioError::InvalidInput { .. })
                ),
                "time_to_expiry {t} accepted"
            );
        }
    }

    // ------------------------------------------------------------------
    // 6. Implied volatility
    // ------------------------------------------------------------------
    #[test]
    fn test_implied_vol_roundtrip() {
        for (vol, option_type) in [(0.15, OptionType::Call), (0.45, OptionType::Put)] {
            let mut p = atm(0.5);
            p.volatility = vol;
            p.strike = 105.0;
            let price = price_european(&p, option_type).unwrap().price;
            let iv = solve_implied_volatility(100.0, 105.0, 0.5, 0.05, 0.0, option_type, price)
                .unwrap();
            assert!((iv.implied_volatility - vol).abs() < 1e-6);
        }
    }

    #[test]
    fn test_implied_vol_high_vol_uses_fallback() {
        let mut p = atm(0.25);
        p.volatility = 3.0;
        let price = price_european(&p, OptionType::Call).unwrap().price;
        let iv =
            solve_implied_volatility(100.0, 100.0, 0.25, 0.05, 0.0, OptionType::Call, price).unwrap();
        assert!((iv.implied_volatility - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_implied_vol_rejects_arbitrage_price() {
        // Call worth more than the spot
        assert!(matches!(
            solve_implied_volatility(100.0, 100.0, 1.0, 0.05, 0.0, OptionType::Call, 150.0),
            Err(QuantfolioError::InvalidInput { .. })
        ));
        // Below intrinsic
        assert!(solve_implied_volatility(120.0, 100.0, 1.0, 0.0, 0.0, OptionType::Call, 5.0).is_err());
    }
}

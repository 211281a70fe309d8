use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::QuantfolioError;
use crate::optimization::{optimize_with_cache, CovarianceSource, OptimizationRequest};
use crate::risk::drawdown::{drawdown_series, max_drawdown};
use crate::risk::ratios::{
    annualized_volatility, cagr, calmar_ratio, sharpe_ratio, sortino_ratio, ZERO_RISK,
};
use crate::statistics::moments::{mean, sample_std_dev};
use crate::statistics::{CovarianceCache, CovarianceKey};
use crate::types::{with_metadata, Asset, ComputationOutput, EquityCurve, RatioValue};
use crate::QuantfolioResult;

use super::strategy::{AllocationRule, StrategyConfig};

// ---------------------------------------------------------------------------
// Price data
// ---------------------------------------------------------------------------

/// Prices for every symbol on one date. `None` marks a missing quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub prices: Vec<Option<f64>>,
}

/// Dated price bars aligned with `symbols`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub symbols: Vec<String>,
    pub bars: Vec<PriceBar>,
    /// Sector label per symbol, used by sector constraints.
    #[serde(default)]
    pub sectors: BTreeMap<String, String>,
}

impl PriceHistory {
    pub fn new(symbols: Vec<String>, bars: Vec<PriceBar>) -> QuantfolioResult<Self> {
        let history = PriceHistory {
            symbols,
            bars,
            sectors: BTreeMap::new(),
        };
        history.validate()?;
        Ok(history)
    }

    /// Shape checks only. Gaps surface when a run touches them.
    pub fn validate(&self) -> QuantfolioResult<()> {
        if self.symbols.is_empty() {
            return Err(QuantfolioError::InsufficientData(
                "Price history has no symbols".into(),
            ));
        }
        for (i, s) in self.symbols.iter().enumerate() {
            if self.symbols[..i].contains(s) {
                return Err(QuantfolioError::invalid(
                    "symbols",
                    format!("Duplicate symbol {s}"),
                ));
            }
        }
        for bar in &self.bars {
            if bar.prices.len() != self.symbols.len() {
                return Err(QuantfolioError::invalid(
                    format!("bars[{}]", bar.date),
                    format!(
                        "has {} prices for {} symbols",
                        bar.prices.len(),
                        self.symbols.len()
                    ),
                ));
            }
        }
        for pair in self.bars.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(QuantfolioError::invalid(
                    "bars",
                    format!(
                        "dates must strictly increase ({} follows {})",
                        pair[1].date, pair[0].date
                    ),
                ));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    fn sector(&self, symbol: &str) -> String {
        self.sectors
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| "Unclassified".to_string())
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy: String,
    pub rule: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_value: f64,
    pub final_value: f64,
    pub total_return: f64,
    /// CAGR over the simulated periods.
    pub annualized_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: RatioValue,
    pub sortino_ratio: RatioValue,
    pub calmar_ratio: RatioValue,
    pub max_drawdown: f64,
    /// Share of periods with a positive return.
    pub win_rate: f64,
    /// Sum of gains over sum of losses.
    pub profit_factor: RatioValue,
    pub rebalance_count: usize,
    pub total_turnover: f64,
    pub total_costs: f64,
    pub best_period: f64,
    pub worst_period: f64,
    pub period_returns: Vec<f64>,
    pub equity_curve: EquityCurve,
    pub drawdown_curve: Vec<f64>,
    pub final_weights: BTreeMap<String, f64>,
}

/// Lifecycle of a [`Backtest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacktestState {
    Initialized,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for BacktestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BacktestState::Initialized => write!(f, "initialized"),
            BacktestState::Running => write!(f, "running"),
            BacktestState::Completed => write!(f, "completed"),
            BacktestState::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Single-use simulation of one strategy over one price history.
pub struct Backtest<'a> {
    config: StrategyConfig,
    history: &'a PriceHistory,
    state: BacktestState,
    cache: Arc<CovarianceCache>,
    warnings: Vec<String>,
}

impl<'a> Backtest<'a> {
    pub fn new(config: StrategyConfig, history: &'a PriceHistory) -> QuantfolioResult<Self> {
        Self::with_cache(config, history, Arc::new(CovarianceCache::new()))
    }

    /// Backtest reading covariance matrices from a cache shared with other
    /// runs over the same history.
    pub fn with_cache(
        config: StrategyConfig,
        history: &'a PriceHistory,
        cache: Arc<CovarianceCache>,
    ) -> QuantfolioResult<Self> {
        history.validate()?;
        config.validate(&history.symbols)?;
        Ok(Backtest {
            config,
            history,
            state: BacktestState::Initialized,
            cache,
            warnings: Vec::new(),
        })
    }

    pub fn state(&self) -> BacktestState {
        self.state
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Hits and misses of the covariance cache, counted over every run that
    /// shares it.
    pub fn cache_stats(&self) -> (u64, u64) {
        (self.cache.hits(), self.cache.misses())
    }

    /// Run the simulation. A backtest runs once; a second call is an error.
    pub fn run(&mut self) -> QuantfolioResult<BacktestResult> {
        if self.state != BacktestState::Initialized {
            return Err(QuantfolioError::invalid(
                "backtest",
                format!("cannot run from state {}", self.state),
            ));
        }
        self.transition(BacktestState::Running);
        match self.simulate() {
            Ok(result) => {
                self.transition(BacktestState::Completed);
                Ok(result)
            }
            Err(e) => {
                warn!(strategy = %self.config.name, error = %e, "backtest failed");
                self.transition(BacktestState::Failed);
                Err(e)
            }
        }
    }

    fn transition(&mut self, to: BacktestState) {
        info!(strategy = %self.config.name, from = %self.state, to = %to, "backtest state");
        self.state = to;
    }

    fn simulate(&mut self) -> QuantfolioResult<BacktestResult> {
        let (lo, hi) = self.window()?;
        let lookback = self.config.rule.lookback();
        let first = lo + lookback;
        if hi < first + 2 {
            return Err(QuantfolioError::InsufficientData(format!(
                "{} bars in range but {} lookback returns plus 2 periods are needed",
                hi - lo + 1,
                lookback
            )));
        }

        let prices = self.window_prices(lo, hi)?;
        // returns[k][i] is the return of asset i from bar lo+k to lo+k+1
        let returns: Vec<Vec<f64>> = prices
            .windows(2)
            .map(|w| w[1].iter().zip(&w[0]).map(|(p1, p0)| p1 / p0 - 1.0).collect())
            .collect();
        let history = self.history;
        let bars = &history.bars;
        let cost_rate = self.config.transaction_cost_bps / 10_000.0;

        // First allocation is bought from cash and carries no cost
        let mut weights = self.target_weights(&returns, lookback, bars[first].date, None)?;
        let mut value = self.config.initial_capital;
        let mut dates = vec![bars[first].date];
        let mut values = vec![value];
        let mut period_returns = Vec::with_capacity(hi - first);
        let mut rebalance_count = 0usize;
        let mut total_turnover = 0.0;
        let mut total_costs = 0.0;
        let mut since_rebalance = 0usize;

        for t in first + 1..=hi {
            let r = &returns[t - lo - 1];
            let gross: f64 = weights.iter().zip(r).map(|(w, ri)| w * (1.0 + ri)).sum();
            let prior = value;
            value *= gross;
            for (w, ri) in weights.iter_mut().zip(r) {
                *w *= (1.0 + ri) / gross;
            }
            since_rebalance += 1;

            let due = self.config.rebalance.is_due(bars[t - 1].date, bars[t].date, since_rebalance);
            if due && t < hi {
                let target = self.target_weights(
                    &returns,
                    t - lo,
                    bars[t].date,
                    Some(weights.as_slice()),
                )?;
                let turnover: f64 = target.iter().zip(&weights).map(|(a, b)| (a - b).abs()).sum();
                let cost = value * turnover * cost_rate;
                value -= cost;
                total_costs += cost;
                total_turnover += turnover;
                rebalance_count += 1;
                since_rebalance = 0;
                weights = target;
                debug!(date = %bars[t].date, turnover, cost, "rebalanced");
            }

            period_returns.push(value / prior - 1.0);
            dates.push(bars[t].date);
            values.push(value);
        }

        let equity_curve = EquityCurve::from_returns(
            &dates,
            self.config.initial_capital,
            &period_returns,
        )?;
        self.summarize(
            equity_curve,
            period_returns,
            &values,
            weights,
            rebalance_count,
            total_turnover,
            total_costs,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn summarize(
        &self,
        equity_curve: EquityCurve,
        period_returns: Vec<f64>,
        values: &[f64],
        weights: Vec<f64>,
        rebalance_count: usize,
        total_turnover: f64,
        total_costs: f64,
    ) -> QuantfolioResult<BacktestResult> {
        let cfg = &self.config;
        let freq = cfg.frequency;
        let initial_value = cfg.initial_capital;
        let final_value = values[values.len() - 1];

        let gains: f64 = period_returns.iter().filter(|r| **r > 0.0).sum();
        let losses: f64 = -period_returns.iter().filter(|r| **r < 0.0).sum::<f64>();
        let profit_factor = RatioValue::from_result(if losses > ZERO_RISK {
            Ok(gains / losses)
        } else {
            Err(QuantfolioError::divide_by_zero("profit_factor: no losing periods"))
        })?;
        let wins = period_returns.iter().filter(|r| **r > 0.0).count();

        let (start_date, end_date) = match (equity_curve.first(), equity_curve.last()) {
            (Some(a), Some(b)) => (a.timestamp, b.timestamp),
            _ => {
                return Err(QuantfolioError::InsufficientData(
                    "Backtest produced an empty equity curve".into(),
                ))
            }
        };

        Ok(BacktestResult {
            strategy: cfg.name.clone(),
            rule: cfg.rule.name().to_string(),
            start_date,
            end_date,
            initial_value,
            final_value,
            total_return: final_value / initial_value - 1.0,
            annualized_return: cagr(&period_returns, freq)?,
            volatility: annualized_volatility(&period_returns, freq)?,
            sharpe_ratio: RatioValue::from_result(sharpe_ratio(
                &period_returns,
                cfg.risk_free_rate,
                freq,
            ))?,
            sortino_ratio: RatioValue::from_result(sortino_ratio(
                &period_returns,
                cfg.risk_free_rate,
                freq,
            ))?,
            calmar_ratio: RatioValue::from_result(calmar_ratio(&period_returns, freq))?,
            max_drawdown: max_drawdown(&equity_curve)?,
            win_rate: wins as f64 / period_returns.len() as f64,
            profit_factor,
            rebalance_count,
            total_turnover,
            total_costs,
            best_period: period_returns.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            worst_period: period_returns.iter().copied().fold(f64::INFINITY, f64::min),
            drawdown_curve: drawdown_series(values)?,
            final_weights: self
                .history
                .symbols
                .iter()
                .cloned()
                .zip(weights)
                .collect(),
            period_returns,
            equity_curve,
        })
    }

    /// Inclusive bar index range selected by the configured start and end.
    fn window(&self) -> QuantfolioResult<(usize, usize)> {
        let bars = &self.history.bars;
        let lo = match self.config.start {
            Some(start) => bars.iter().position(|b| b.date >= start),
            None => (!bars.is_empty()).then_some(0),
        };
        let hi = match self.config.end {
            Some(end) => bars.iter().rposition(|b| b.date <= end),
            None => bars.len().checked_sub(1),
        };
        match (lo, hi) {
            (Some(lo), Some(hi)) if lo <= hi => Ok((lo, hi)),
            _ => Err(QuantfolioError::InsufficientData(
                "No price bars fall inside the backtest range".into(),
            )),
        }
    }

    /// Dense prices for bars lo..=hi. The first missing, non-finite or
    /// non-positive quote fails the run.
    fn window_prices(&self, lo: usize, hi: usize) -> QuantfolioResult<Vec<Vec<f64>>> {
        self.history.bars[lo..=hi]
            .iter()
            .map(|bar| {
                bar.prices
                    .iter()
                    .zip(&self.history.symbols)
                    .map(|(p, symbol)| match p {
                        Some(p) if p.is_finite() && *p > 0.0 => Ok(*p),
                        _ => Err(QuantfolioError::DataGap {
                            symbol: symbol.clone(),
                            date: bar.date,
                        }),
                    })
                    .collect()
            })
            .collect()
    }

    /// Target weights using the returns that end at window offset `end`.
    /// `current` holds the drifted weights on a rebalance; mean-variance
    /// breaks ties toward them.
    fn target_weights(
        &mut self,
        returns: &[Vec<f64>],
        end: usize,
        date: NaiveDate,
        current: Option<&[f64]>,
    ) -> QuantfolioResult<Vec<f64>> {
        let n = self.history.symbols.len();
        let lookback = self.config.rule.lookback();
        let trailing = &returns[end - lookback..end];
        let rule = self.config.rule.clone();
        match &rule {
            AllocationRule::FixedWeights { weights } => Ok(self
                .history
                .symbols
                .iter()
                .map(|s| weights.get(s).copied().unwrap_or(0.0))
                .collect()),
            AllocationRule::EqualWeight => Ok(vec![1.0 / n as f64; n]),
            AllocationRule::Momentum { top_n, .. } => {
                let mut scored: Vec<(usize, f64)> = (0..n)
                    .map(|i| (i, trailing.iter().map(|r| 1.0 + r[i]).product::<f64>() - 1.0))
                    .collect();
                // Stable sort keeps symbol order among equal scores
                scored.sort_by(|a, b| b.1.total_cmp(&a.1));
                let mut w = vec![0.0; n];
                for (i, _) in scored.iter().take(*top_n) {
                    w[*i] = 1.0 / *top_n as f64;
                }
                Ok(w)
            }
            AllocationRule::InverseVolatility { .. } => {
                let columns = columns(trailing, n);
                let mut inv = Vec::with_capacity(n);
                for (i, col) in columns.iter().enumerate() {
                    let sd = sample_std_dev(col)?;
                    if sd <= ZERO_RISK {
                        return Err(QuantfolioError::divide_by_zero(format!(
                            "inverse_volatility: {} has zero trailing volatility at {date}",
                            self.history.symbols[i]
                        )));
                    }
                    inv.push(1.0 / sd);
                }
                let total: f64 = inv.iter().sum();
                Ok(inv.into_iter().map(|v| v / total).collect())
            }
            AllocationRule::MeanVariance {
                objective,
                constraints,
                ..
            } => {
                let freq = self.config.frequency;
                let periods = freq.periods_per_year();
                let columns = columns(trailing, n);
                let assets = self
                    .history
                    .symbols
                    .iter()
                    .zip(&columns)
                    .map(|(symbol, col)| {
                        Ok(Asset {
                            symbol: symbol.clone(),
                            price: 0.0,
                            expected_return: mean(col)? * periods,
                            volatility: sample_std_dev(col)? * periods.sqrt(),
                            beta: 1.0,
                            sector: self.history.sector(symbol),
                            market_cap: 0.0,
                        })
                    })
                    .collect::<QuantfolioResult<Vec<_>>>()?;
                let request = OptimizationRequest {
                    assets,
                    covariance: CovarianceSource::Historical {
                        returns: columns,
                        frequency: freq,
                    },
                    constraints: constraints.clone(),
                    objective: *objective,
                    risk_free_rate: self.config.risk_free_rate,
                    current_weights: current.map(<[f64]>::to_vec),
                    solver: Default::default(),
                };
                let key = CovarianceKey::new(self.history.symbols.clone(), lookback, Some(date))
                    .with_frequency(freq);
                let out = optimize_with_cache(&request, &self.cache, key)?;
                for w in out.warnings {
                    self.warnings.push(format!("{date}: {w}"));
                }
                Ok(out.result.allocation.weights())
            }
        }
    }
}

/// Transpose period-major returns into one series per asset.
fn columns(rows: &[Vec<f64>], n: usize) -> Vec<Vec<f64>> {
    (0..n).map(|i| rows.iter().map(|r| r[i]).collect()).collect()
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Simulate one strategy.
pub fn run_backtest(
    config: &StrategyConfig,
    history: &PriceHistory,
) -> QuantfolioResult<ComputationOutput<BacktestResult>> {
    run_with_cache(config, history, Arc::new(CovarianceCache::new()))
}

fn run_with_cache(
    config: &StrategyConfig,
    history: &PriceHistory,
    cache: Arc<CovarianceCache>,
) -> QuantfolioResult<ComputationOutput<BacktestResult>> {
    let start = Instant::now();
    let mut backtest = Backtest::with_cache(config.clone(), history, cache)?;
    let result = backtest.run()?;
    let warnings = backtest.warnings().to_vec();
    let (hits, misses) = backtest.cache_stats();

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Periodic rebalancing simulation with price drift between rebalances",
        &serde_json::json!({
            "rule": config.rule.name(),
            "rebalance": config.rebalance,
            "frequency": config.frequency,
            "initial_capital": config.initial_capital,
            "transaction_cost_bps": config.transaction_cost_bps,
            "initial_allocation_cost": "none",
            "covariance_cache": { "hits": hits, "misses": misses },
        }),
        warnings,
        elapsed,
        result,
    ))
}

/// Simulate several strategies in parallel over the same history. Results
/// keep the input order and fail independently. Mean-variance rebalances
/// share one covariance cache, so the reported cache counts are totals over
/// the whole batch.
pub fn run_backtests(
    configs: &[StrategyConfig],
    history: &PriceHistory,
) -> Vec<QuantfolioResult<ComputationOutput<BacktestResult>>> {
    let cache = Arc::new(CovarianceCache::new());
    configs
        .par_iter()
        .map(|config| run_with_cache(config, history, Arc::clone(&cache)))
        .collect()
}

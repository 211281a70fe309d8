use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::QuantfolioError;
use crate::statistics::linalg::dot;
use crate::types::Asset;
use crate::QuantfolioResult;

/// Slack accepted when verifying a solved allocation against its bounds.
const VERIFY_TOLERANCE: f64 = 1e-6;

/// Maximum deviation of the weight sum after renormalisation.
const SUM_TOLERANCE: f64 = 1e-4;

// ---------------------------------------------------------------------------
// Constraints value object
// ---------------------------------------------------------------------------

/// Allocation constraints. Every field has a serde default so a request may
/// omit the whole block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// Per-asset minimum weight (default 0, long-only).
    #[serde(default)]
    pub min_weight: f64,
    /// Per-asset maximum weight (default 1).
    #[serde(default = "default_max_weight")]
    pub max_weight: f64,
    /// Cap on the total weight of any one sector.
    #[serde(default)]
    pub max_sector_weight: Option<f64>,
    /// Additional per-asset cap; the tighter of this and `max_weight` applies.
    #[serde(default)]
    pub max_single_stock_weight: Option<f64>,
    /// Return floor for MinVolatility and MaxSharpe.
    #[serde(default)]
    pub target_return: Option<f64>,
    /// Volatility ceiling.
    #[serde(default)]
    pub max_volatility: Option<f64>,
    /// Minimum absolute weight change that triggers a Buy or Sell.
    #[serde(default = "default_rebalance_threshold")]
    pub rebalance_threshold: f64,
}

fn default_max_weight() -> f64 {
    1.0
}

fn default_rebalance_threshold() -> f64 {
    0.05
}

impl Default for Constraints {
    fn default() -> Self {
        Constraints {
            min_weight: 0.0,
            max_weight: default_max_weight(),
            max_sector_weight: None,
            max_single_stock_weight: None,
            target_return: None,
            max_volatility: None,
            rebalance_threshold: default_rebalance_threshold(),
        }
    }
}

impl Constraints {
    /// Effective per-asset upper bound.
    pub fn upper_bound(&self) -> f64 {
        match self.max_single_stock_weight {
            Some(single) => self.max_weight.min(single),
            None => self.max_weight,
        }
    }

    /// Field-level validation. Ordering problems are `InvalidInput`;
    /// joint infeasibility is detected by [`FeasibleSet::new`].
    pub fn validate(&self) -> QuantfolioResult<()> {
        check_fraction("constraints.min_weight", self.min_weight)?;
        check_fraction("constraints.max_weight", self.max_weight)?;
        if let Some(single) = self.max_single_stock_weight {
            check_fraction("constraints.max_single_stock_weight", single)?;
        }
        if let Some(cap) = self.max_sector_weight {
            check_fraction("constraints.max_sector_weight", cap)?;
        }
        if self.min_weight > self.upper_bound() {
            return Err(QuantfolioError::invalid(
                "constraints.min_weight",
                format!(
                    "min_weight {} exceeds the effective max weight {}",
                    self.min_weight,
                    self.upper_bound()
                ),
            ));
        }
        if let Some(target) = self.target_return {
            if !target.is_finite() {
                return Err(QuantfolioError::invalid(
                    "constraints.target_return",
                    "must be finite",
                ));
            }
        }
        if let Some(vol) = self.max_volatility {
            if !vol.is_finite() || vol <= 0.0 {
                return Err(QuantfolioError::invalid(
                    "constraints.max_volatility",
                    "must be positive and finite",
                ));
            }
        }
        if !self.rebalance_threshold.is_finite() || self.rebalance_threshold < 0.0 {
            return Err(QuantfolioError::invalid(
                "constraints.rebalance_threshold",
                "must be non-negative and finite",
            ));
        }
        Ok(())
    }
}

fn check_fraction(field: &str, value: f64) -> QuantfolioResult<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(QuantfolioError::invalid(
            field,
            format!("{value} must lie in [0, 1]"),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Feasible set
// ---------------------------------------------------------------------------

/// Equality constraint μ·w = target added to the feasible set.
#[derive(Debug, Clone, Copy)]
pub struct ReturnTarget<'a> {
    pub mu: &'a [f64],
    pub target: f64,
}

#[derive(Debug, Clone)]
struct SectorCap {
    name: String,
    members: Vec<usize>,
    cap: f64,
}

/// Box-simplex {l ≤ w ≤ u, Σw = 1} intersected with per-sector caps.
#[derive(Debug, Clone)]
pub struct FeasibleSet {
    lower: Vec<f64>,
    upper: Vec<f64>,
    sectors: Vec<SectorCap>,
}

impl FeasibleSet {
    /// Build the set for `assets` and check it is non-empty.
    pub fn new(assets: &[Asset], constraints: &Constraints) -> QuantfolioResult<Self> {
        constraints.validate()?;
        let n = assets.len();
        if n == 0 {
            return Err(QuantfolioError::InsufficientData(
                "At least one asset is required".into(),
            ));
        }

        let lower = vec![constraints.min_weight; n];
        let upper = vec![constraints.upper_bound(); n];

        if constraints.min_weight * n as f64 > 1.0 + 1e-12 {
            return Err(QuantfolioError::ConstraintsInfeasible(format!(
                "{} assets at min_weight {} exceed full investment",
                n, constraints.min_weight
            )));
        }

        let mut sectors = Vec::new();
        if let Some(cap) = constraints.max_sector_weight {
            let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
            for (i, asset) in assets.iter().enumerate() {
                groups.entry(asset.sector.as_str()).or_default().push(i);
            }
            for (name, members) in groups {
                let floor: f64 = members.iter().map(|&i| lower[i]).sum();
                if floor > cap + 1e-12 {
                    return Err(QuantfolioError::ConstraintsInfeasible(format!(
                        "Sector {name} needs at least {floor:.6} from min weights but is capped at {cap}"
                    )));
                }
                sectors.push(SectorCap {
                    name: name.to_string(),
                    members,
                    cap,
                });
            }
        }

        let set = FeasibleSet {
            lower,
            upper,
            sectors,
        };
        let capacity = set.capacity();
        if capacity < 1.0 - 1e-12 {
            return Err(QuantfolioError::ConstraintsInfeasible(format!(
                "Upper bounds allow at most {capacity:.6} total weight"
            )));
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// Largest total weight the per-asset and sector caps permit.
    fn capacity(&self) -> f64 {
        if self.sectors.is_empty() {
            return self.upper.iter().sum();
        }
        self.sectors
            .iter()
            .map(|s| {
                let box_total: f64 = s.members.iter().map(|&i| self.upper[i]).sum();
                box_total.min(s.cap)
            })
            .sum()
    }

    fn sector_violation(&self, w: &[f64]) -> f64 {
        self.sectors
            .iter()
            .map(|s| s.members.iter().map(|&i| w[i]).sum::<f64>() - s.cap)
            .fold(0.0, f64::max)
    }

    /// Euclidean projection of `y` onto the set, optionally intersected with
    /// a return hyperplane.
    ///
    /// Both cases are exact. With a return target the multiplier on μ is
    /// found by regula falsi, capped at `max_iterations` steps.
    pub fn project(
        &self,
        y: &[f64],
        target: Option<ReturnTarget<'_>>,
        max_iterations: usize,
    ) -> Vec<f64> {
        match target {
            Some(t) => self.project_with_return(y, t, max_iterations),
            None => self.project_budget(y),
        }
    }

    /// Projection onto box, budget and sector caps.
    ///
    /// Sectors partition the assets. Every member of sector s is shifted by
    /// max(τ, τ_s), where τ_s alone would put the sector exactly at its cap,
    /// so the budget total stays piecewise linear in τ with the τ_s as extra
    /// breakpoints.
    fn project_budget(&self, y: &[f64]) -> Vec<f64> {
        if self.sectors.is_empty() {
            return project_box_simplex(y, &self.lower, &self.upper);
        }
        let sector_shifts: Vec<f64> = self
            .sectors
            .iter()
            .map(|s| {
                let pick = |v: &[f64]| -> Vec<f64> { s.members.iter().map(|&i| v[i]).collect() };
                shift_for_total(&pick(y), &pick(&self.lower), &pick(&self.upper), s.cap)
            })
            .collect();

        let total = |tau: f64| -> f64 {
            self.sectors
                .iter()
                .zip(&sector_shifts)
                .map(|(s, ts)| {
                    let shift = tau.max(*ts);
                    s.members
                        .iter()
                        .map(|&i| clip(y[i] - shift, self.lower[i], self.upper[i]))
                        .sum::<f64>()
                })
                .sum()
        };
        let breaks = box_breakpoints(y, &self.lower, &self.upper)
            .chain(sector_shifts.iter().copied())
            .collect();
        let tau = piecewise_root(breaks, total, 1.0);

        let mut w = vec![0.0; y.len()];
        for (s, ts) in self.sectors.iter().zip(&sector_shifts) {
            let shift = tau.max(*ts);
            for &i in &s.members {
                w[i] = clip(y[i] - shift, self.lower[i], self.upper[i]);
            }
        }
        w
    }

    /// Projection with μ·w = target added.
    ///
    /// The solution is the budget projection of y − λμ at the multiplier λ
    /// where the return hits the target. The return is non-increasing and
    /// piecewise linear in λ, so the Illinois variant of regula falsi
    /// converges in a handful of steps once the root is bracketed.
    fn project_with_return(
        &self,
        y: &[f64],
        t: ReturnTarget<'_>,
        max_iterations: usize,
    ) -> Vec<f64> {
        let mu_scale = t.mu.iter().fold(0.0_f64, |acc, m| acc.max(m.abs()));
        if mu_scale == 0.0 {
            return self.project_budget(y);
        }
        let at = |lambda: f64| -> Vec<f64> {
            let shifted: Vec<f64> = y.iter().zip(t.mu).map(|(yi, m)| yi - lambda * m).collect();
            self.project_budget(&shifted)
        };
        let gap = |lambda: f64| dot(t.mu, &at(lambda)) - t.target;
        let tolerance = 1e-14 * (1.0 + t.target.abs());

        let g0 = gap(0.0);
        if g0.abs() <= tolerance {
            return at(0.0);
        }
        let step = 1.0 / mu_scale;
        let (mut a, mut ga, mut b, mut gb) = if g0 > 0.0 {
            let (mut b, mut gb) = (step, gap(step));
            for _ in 0..64 {
                if gb <= 0.0 {
                    break;
                }
                b *= 2.0;
                gb = gap(b);
            }
            (0.0, g0, b, gb)
        } else {
            let (mut a, mut ga) = (-step, gap(-step));
            for _ in 0..64 {
                if ga >= 0.0 {
                    break;
                }
                a *= 2.0;
                ga = gap(a);
            }
            (a, ga, 0.0, g0)
        };
        // Unreachable target: stay at the end nearest to it
        if ga < 0.0 {
            return at(a);
        }
        if gb > 0.0 {
            return at(b);
        }

        let mut side = 0_i8;
        for _ in 0..max_iterations {
            if ga.abs() <= tolerance {
                return at(a);
            }
            if gb.abs() <= tolerance {
                return at(b);
            }
            let mut c = b - gb * (b - a) / (gb - ga);
            if !(c > a && c < b) {
                c = 0.5 * (a + b);
            }
            if c <= a || c >= b {
                break;
            }
            let gc = gap(c);
            if gc.abs() <= tolerance {
                return at(c);
            }
            if gc > 0.0 {
                a = c;
                ga = gc;
                if side == 1 {
                    gb *= 0.5;
                }
                side = 1;
            } else {
                b = c;
                gb = gc;
                if side == -1 {
                    ga *= 0.5;
                }
                side = -1;
            }
        }
        if ga.abs() <= gb.abs() {
            at(a)
        } else {
            at(b)
        }
    }

    /// Achievable expected-return range under the constraints.
    ///
    /// Greedy fill by return order after every asset receives its minimum.
    /// Exact here because the sector groups partition the assets.
    pub fn return_range(&self, mu: &[f64]) -> (f64, f64) {
        let mut order: Vec<usize> = (0..mu.len()).collect();
        order.sort_by(|&a, &b| mu[b].total_cmp(&mu[a]).then(a.cmp(&b)));
        let max = dot(mu, &self.greedy_fill(&order));
        order.reverse();
        let min = dot(mu, &self.greedy_fill(&order));
        (min, max)
    }

    fn greedy_fill(&self, order: &[usize]) -> Vec<f64> {
        let mut w = self.lower.clone();
        let mut remaining = 1.0 - w.iter().sum::<f64>();

        let mut sector_of = vec![None; w.len()];
        let mut sector_room: Vec<f64> = Vec::with_capacity(self.sectors.len());
        for (k, s) in self.sectors.iter().enumerate() {
            for &i in &s.members {
                sector_of[i] = Some(k);
            }
            sector_room.push(s.cap - s.members.iter().map(|&i| w[i]).sum::<f64>());
        }

        for &i in order {
            if remaining <= 0.0 {
                break;
            }
            let mut room = self.upper[i] - w[i];
            if let Some(k) = sector_of[i] {
                room = room.min(sector_room[k]);
            }
            let add = room.min(remaining).max(0.0);
            w[i] += add;
            remaining -= add;
            if let Some(k) = sector_of[i] {
                sector_room[k] -= add;
            }
        }
        w
    }

    /// True when `w` satisfies budget, bounds and sector caps within `tol`.
    pub fn contains(&self, w: &[f64], tol: f64) -> bool {
        if w.len() != self.len() || w.iter().any(|x| !x.is_finite()) {
            return false;
        }
        let total: f64 = w.iter().sum();
        (total - 1.0).abs() <= tol
            && w
                .iter()
                .zip(self.lower.iter().zip(&self.upper))
                .all(|(x, (l, u))| *x >= l - tol && *x <= u + tol)
            && self.sector_violation(w) <= tol
    }

    /// Clip a solved allocation to the bounds, renormalise it by
    /// water-filling and verify the sector caps.
    pub fn finalize(&self, w: Vec<f64>) -> QuantfolioResult<Vec<f64>> {
        if w.len() != self.len() || w.iter().any(|x| !x.is_finite()) {
            return Err(QuantfolioError::ConstraintsInfeasible(
                "Solved weights are not finite".into(),
            ));
        }
        let clipped: Vec<f64> = w
            .iter()
            .zip(self.lower.iter().zip(&self.upper))
            .map(|(x, (l, u))| clip(*x, *l, *u))
            .collect();
        let total: f64 = clipped.iter().sum();
        if (total - 1.0).abs() > SUM_TOLERANCE {
            return Err(QuantfolioError::ConstraintsInfeasible(format!(
                "Weights sum to {total:.8} after clipping to bounds"
            )));
        }
        let w = project_box_simplex(&clipped, &self.lower, &self.upper);
        for s in &self.sectors {
            let exposure: f64 = s.members.iter().map(|&i| w[i]).sum();
            if exposure > s.cap + VERIFY_TOLERANCE {
                return Err(QuantfolioError::ConstraintsInfeasible(format!(
                    "Sector {} weight {exposure:.6} exceeds cap {}",
                    s.name, s.cap
                )));
            }
        }
        Ok(w)
    }
}

// ---------------------------------------------------------------------------
// Exact projections
// ---------------------------------------------------------------------------

fn clip(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

/// Kinks of Σ clip(y_i − τ, l_i, u_i) as a function of τ.
fn box_breakpoints<'a>(
    y: &'a [f64],
    lower: &'a [f64],
    upper: &'a [f64],
) -> impl Iterator<Item = f64> + 'a {
    y.iter()
        .zip(lower)
        .map(|(yi, l)| yi - l)
        .chain(y.iter().zip(upper).map(|(yi, u)| yi - u))
}

/// Root of a continuous, non-increasing function that is linear between the
/// given breakpoints: binary search over the sorted breakpoints, then one
/// linear interpolation. Clamps to the outer breakpoints when `target` lies
/// outside the range.
fn piecewise_root<F>(mut breaks: Vec<f64>, total: F, target: f64) -> f64
where
    F: Fn(f64) -> f64,
{
    breaks.sort_by(|a, b| a.total_cmp(b));
    breaks.dedup();

    let mut lo = 0;
    let mut hi = breaks.len() - 1;
    if total(breaks[lo]) <= target {
        return breaks[lo];
    }
    if total(breaks[hi]) >= target {
        return breaks[hi];
    }
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if total(breaks[mid]) >= target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let (s_lo, s_hi) = (total(breaks[lo]), total(breaks[hi]));
    if s_lo == s_hi {
        breaks[lo]
    } else {
        breaks[lo] + (s_lo - target) / (s_lo - s_hi) * (breaks[hi] - breaks[lo])
    }
}

/// Shift τ such that Σ clip(y_i − τ, l_i, u_i) = `target`.
fn shift_for_total(y: &[f64], lower: &[f64], upper: &[f64], target: f64) -> f64 {
    let total = |tau: f64| -> f64 {
        y.iter()
            .zip(lower.iter().zip(upper))
            .map(|(yi, (l, u))| clip(yi - tau, *l, *u))
            .sum()
    };
    piecewise_root(box_breakpoints(y, lower, upper).collect(), total, target)
}

/// Projection onto {l ≤ w ≤ u, Σw = 1} (water-filling).
pub(crate) fn project_box_simplex(y: &[f64], lower: &[f64], upper: &[f64]) -> Vec<f64> {
    let tau = shift_for_total(y, lower, upper, 1.0);
    y.iter()
        .zip(lower.iter().zip(upper))
        .map(|(yi, (l, u))| clip(yi - tau, *l, *u))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(symbol: &str, sector: &str, expected_return: f64) -> Asset {
        Asset {
            symbol: symbol.into(),
            price: 100.0,
            expected_return,
            volatility: 0.2,
            beta: 1.0,
            sector: sector.into(),
            market_cap: 0.0,
        }
    }

    fn four_assets() -> Vec<Asset> {
        vec![
            asset("A", "Tech", 0.12),
            asset("B", "Tech", 0.10),
            asset("C", "Energy", 0.06),
            asset("D", "Utilities", 0.04),
        ]
    }

    #[test]
    fn test_defaults() {
        let c: Constraints = serde_json::from_str("{}").unwrap();
        assert_eq!(c, Constraints::default());
        assert_eq!(c.rebalance_threshold, 0.05);
        assert_eq!(c.upper_bound(), 1.0);
    }

    #[test]
    fn test_effective_upper_bound() {
        let c = Constraints {
            max_weight: 0.5,
            max_single_stock_weight: Some(0.3),
            ..Default::default()
        };
        assert_eq!(c.upper_bound(), 0.3);
    }

    #[test]
    fn test_min_above_max_is_invalid_input() {
        let c = Constraints {
            min_weight: 0.4,
            max_weight: 0.3,
            ..Default::default()
        };
        assert!(matches!(
            FeasibleSet::new(&four_assets(), &c),
            Err(QuantfolioError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_min_weights_exceeding_budget_infeasible() {
        let c = Constraints {
            min_weight: 0.3,
            ..Default::default()
        };
        assert!(matches!(
            FeasibleSet::new(&four_assets(), &c),
            Err(QuantfolioError::ConstraintsInfeasible(_))
        ));
    }

    #[test]
    fn test_caps_below_budget_infeasible() {
        let c = Constraints {
            max_weight: 0.2,
            ..Default::default()
        };
        assert!(matches!(
            FeasibleSet::new(&four_assets(), &c),
            Err(QuantfolioError::ConstraintsInfeasible(_))
        ));

        // Three sectors capped at 0.3 hold at most 0.9
        let c = Constraints {
            max_sector_weight: Some(0.3),
            ..Default::default()
        };
        assert!(matches!(
            FeasibleSet::new(&four_assets(), &c),
            Err(QuantfolioError::ConstraintsInfeasible(_))
        ));
    }

    #[test]
    fn test_box_simplex_projection() {
        let lower = vec![0.0; 3];
        let upper = vec![0.5; 3];
        let w = project_box_simplex(&[0.9, 0.3, -0.2], &lower, &upper);
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((w[0] - 0.5).abs() < 1e-12);
        assert!((w[1] - 0.5).abs() < 1e-12);
        assert!(w[2].abs() < 1e-12);
    }

    #[test]
    fn test_projection_of_feasible_point_is_identity() {
        let set = FeasibleSet::new(&four_assets(), &Constraints::default()).unwrap();
        let w = vec![0.1, 0.2, 0.3, 0.4];
        let p = set.project(&w, None, 500);
        for (a, b) in w.iter().zip(&p) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_projection_respects_sector_cap() {
        let c = Constraints {
            max_sector_weight: Some(0.4),
            ..Default::default()
        };
        let set = FeasibleSet::new(&four_assets(), &c).unwrap();
        let p = set.project(&[0.5, 0.4, 0.05, 0.05], None, 500);
        assert!(set.contains(&p, 1e-9), "projection {p:?} not feasible");
        assert!(p[0] + p[1] <= 0.4 + 1e-9);
    }

    #[test]
    fn test_projection_hits_return_target() {
        let assets = four_assets();
        let mu: Vec<f64> = assets.iter().map(|a| a.expected_return).collect();
        let set = FeasibleSet::new(&assets, &Constraints::default()).unwrap();
        let target = ReturnTarget {
            mu: &mu,
            target: 0.09,
        };
        let p = set.project(&[0.25; 4], Some(target), 500);
        assert!((dot(&mu, &p) - 0.09).abs() < 1e-10);
        assert!(set.contains(&p, 1e-10));
    }

    #[test]
    fn test_return_range_with_caps() {
        let assets = four_assets();
        let mu: Vec<f64> = assets.iter().map(|a| a.expected_return).collect();

        let set = FeasibleSet::new(&assets, &Constraints::default()).unwrap();
        let (lo, hi) = set.return_range(&mu);
        assert!((lo - 0.04).abs() < 1e-12);
        assert!((hi - 0.12).abs() < 1e-12);

        let c = Constraints {
            max_weight: 0.5,
            max_sector_weight: Some(0.6),
            ..Default::default()
        };
        let set = FeasibleSet::new(&assets, &c).unwrap();
        let (_, hi) = set.return_range(&mu);
        // 0.5 A + 0.1 B (Tech cap) + 0.4 C
        assert!((hi - (0.06 + 0.01 + 0.024)).abs() < 1e-12);
    }

    #[test]
    fn test_finalize_rejects_violations() {
        let set = FeasibleSet::new(&four_assets(), &Constraints::default()).unwrap();
        assert!(set.finalize(vec![0.5, 0.5, 0.5, 0.0]).is_err());
        let ok = set.finalize(vec![0.25, 0.25, 0.25, 0.25]).unwrap();
        assert!((ok.iter().sum::<f64>() - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_finalize_clips_before_renormalising() {
        let c = Constraints {
            max_weight: 0.4,
            ..Default::default()
        };
        let set = FeasibleSet::new(&four_assets(), &c).unwrap();
        let w = set
            .finalize(vec![0.4 + 5e-7, 0.3, 0.3 - 5e-7, 0.0])
            .unwrap();
        assert!(w[0] <= 0.4, "cap breached: {}", w[0]);
        assert!(w.iter().all(|x| *x >= 0.0));
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sector_projection_is_exact() {
        let c = Constraints {
            max_sector_weight: Some(0.4),
            ..Default::default()
        };
        let set = FeasibleSet::new(&four_assets(), &c).unwrap();
        // Tech shifted down by 0.25 to its cap, the rest up by 0.25
        let p = set.project(&[0.5, 0.4, 0.05, 0.05], None, 500);
        let expected = [0.25, 0.15, 0.30, 0.30];
        for (a, b) in p.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-12, "{p:?}");
        }
    }

    #[test]
    fn test_return_projection_with_sector_caps() {
        let assets = four_assets();
        let mu: Vec<f64> = assets.iter().map(|a| a.expected_return).collect();
        let c = Constraints {
            max_weight: 0.5,
            max_sector_weight: Some(0.6),
            ..Default::default()
        };
        let set = FeasibleSet::new(&assets, &c).unwrap();
        let target = ReturnTarget {
            mu: &mu,
            target: 0.085,
        };
        let p = set.project(&[0.25; 4], Some(target), 100);
        assert!((dot(&mu, &p) - 0.085).abs() < 1e-10);
        assert!(set.contains(&p, 1e-10));
    }
}

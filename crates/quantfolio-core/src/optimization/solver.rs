use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::QuantfolioError;
use crate::statistics::linalg::largest_eigenvalue;
use crate::statistics::CovarianceMatrix;
use crate::QuantfolioResult;

use super::constraints::{FeasibleSet, ReturnTarget};

/// A step this small after the iteration budget is spent is accepted as
/// converged for practical purposes.
const STALL_TOLERANCE: f64 = 1e-8;

/// Iteration limits and tolerances for the projected-gradient solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Convergence threshold on the largest weight change per iteration.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Cap on multiplier search steps per return-targeted projection.
    #[serde(default = "default_projection_iterations")]
    pub projection_iterations: u32,
}

fn default_max_iterations() -> u32 {
    20_000
}

fn default_tolerance() -> f64 {
    1e-12
}

fn default_projection_iterations() -> u32 {
    500
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            projection_iterations: default_projection_iterations(),
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> QuantfolioResult<()> {
        if self.max_iterations == 0 {
            return Err(QuantfolioError::invalid(
                "solver.max_iterations",
                "must be at least 1",
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(QuantfolioError::invalid(
                "solver.tolerance",
                "must be positive and finite",
            ));
        }
        if self.projection_iterations == 0 {
            return Err(QuantfolioError::invalid(
                "solver.projection_iterations",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct QpSolution {
    pub weights: Vec<f64>,
    pub iterations: u32,
    pub converged: bool,
}

/// min wᵀΣw + ε‖w − w₀‖² over the feasible set.
///
/// The proximal term makes the minimiser unique and, on flat regions of the
/// variance surface, the one nearest the anchor w₀.
pub(crate) struct MinVarianceQp<'a> {
    sigma: &'a CovarianceMatrix,
    set: &'a FeasibleSet,
    anchor: Vec<f64>,
    settings: &'a SolverSettings,
    epsilon: f64,
    lipschitz: f64,
}

impl<'a> MinVarianceQp<'a> {
    pub fn new(
        sigma: &'a CovarianceMatrix,
        set: &'a FeasibleSet,
        anchor: Vec<f64>,
        settings: &'a SolverSettings,
    ) -> Self {
        let n = sigma.dim() as f64;
        let epsilon = 1e-9 * sigma.trace() / n;
        let lambda_max = largest_eigenvalue(sigma.values(), 1_000);
        // Power iteration approaches λmax from below
        let lipschitz = 2.0 * (lambda_max * (1.0 + 1e-6) + epsilon);
        debug!(lambda_max, epsilon, "min-variance QP prepared");
        MinVarianceQp {
            sigma,
            set,
            anchor,
            settings,
            epsilon,
            lipschitz,
        }
    }

    pub fn set(&self) -> &FeasibleSet {
        self.set
    }

    pub fn sigma(&self) -> &CovarianceMatrix {
        self.sigma
    }

    fn gradient(&self, w: &[f64]) -> Vec<f64> {
        self.sigma
            .times(w)
            .iter()
            .zip(w.iter().zip(&self.anchor))
            .map(|(sw, (wi, ai))| 2.0 * sw + 2.0 * self.epsilon * (wi - ai))
            .collect()
    }

    fn project(&self, y: &[f64], target: Option<ReturnTarget<'_>>) -> Vec<f64> {
        self.set
            .project(y, target, self.settings.projection_iterations as usize)
    }

    /// Accelerated projected gradient (FISTA with gradient restart),
    /// step 1/L with L = 2·(λmax(Σ) + ε).
    pub fn solve(
        &self,
        target: Option<ReturnTarget<'_>>,
        start: &[f64],
    ) -> QuantfolioResult<QpSolution> {
        let mut x = self.project(start, target);
        if self.lipschitz <= 0.0 {
            // Zero covariance: every feasible point has zero variance
            return Ok(QpSolution {
                weights: x,
                iterations: 0,
                converged: true,
            });
        }

        let step = 1.0 / self.lipschitz;
        let mut y = x.clone();
        let mut t = 1.0_f64;
        let mut last_delta = f64::INFINITY;

        for iteration in 1..=self.settings.max_iterations {
            let grad = self.gradient(&y);
            let trial: Vec<f64> = y.iter().zip(&grad).map(|(yi, g)| yi - step * g).collect();
            let x_next = self.project(&trial, target);

            last_delta = x_next
                .iter()
                .zip(&x)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            if last_delta <= self.settings.tolerance {
                debug!(iteration, last_delta, "min-variance QP converged");
                return Ok(QpSolution {
                    weights: x_next,
                    iterations: iteration,
                    converged: true,
                });
            }

            // Restart momentum when it points against the descent direction
            let restart = y
                .iter()
                .zip(&x_next)
                .zip(&x)
                .map(|((yi, xn), xo)| (yi - xn) * (xn - xo))
                .sum::<f64>()
                > 0.0;
            let t_next = if restart {
                1.0
            } else {
                0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt())
            };
            let momentum = if restart { 0.0 } else { (t - 1.0) / t_next };
            y = x_next
                .iter()
                .zip(&x)
                .map(|(xn, xo)| xn + momentum * (xn - xo))
                .collect();
            x = x_next;
            t = t_next;
        }

        if last_delta <= STALL_TOLERANCE {
            debug!(
                iterations = self.settings.max_iterations,
                last_delta, "min-variance QP stopped at iteration limit"
            );
            return Ok(QpSolution {
                weights: x,
                iterations: self.settings.max_iterations,
                converged: false,
            });
        }
        Err(QuantfolioError::ConvergenceFailure {
            function: "min_variance_qp".into(),
            iterations: self.settings.max_iterations,
            last_delta,
        })
    }
}

/// Golden-section search for the maximum of a unimodal function on
/// `[lo, hi]`. Endpoints are evaluated too so monotone functions resolve to
/// the right boundary. Returns the best abscissa found.
pub(crate) fn golden_section_max<F>(
    mut f: F,
    lo: f64,
    hi: f64,
    tolerance: f64,
) -> QuantfolioResult<f64>
where
    F: FnMut(f64) -> QuantfolioResult<f64>,
{
    let inv_phi = (5.0_f64.sqrt() - 1.0) / 2.0;
    let (mut a, mut b) = (lo, hi);
    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    let mut fc = f(c)?;
    let mut fd = f(d)?;

    let mut best = if fc >= fd { (c, fc) } else { (d, fd) };
    for _ in 0..200 {
        if (b - a).abs() <= tolerance {
            break;
        }
        if fc >= fd {
            b = d;
            d = c;
            fd = fc;
            c = b - inv_phi * (b - a);
            fc = f(c)?;
            if fc > best.1 {
                best = (c, fc);
            }
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + inv_phi * (b - a);
            fd = f(d)?;
            if fd > best.1 {
                best = (d, fd);
            }
        }
    }

    let f_lo = f(lo)?;
    if f_lo > best.1 {
        best = (lo, f_lo);
    }
    let f_hi = f(hi)?;
    if f_hi > best.1 {
        best = (hi, f_hi);
    }
    Ok(best.0)
}

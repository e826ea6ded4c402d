//! Projected limited-memory BFGS.
//!
//! Each iteration builds an L-BFGS direction over the variables that are not
//! held at an active bound, then backtracks along the projected path
//! `P(x + α d)` until the Armijo condition holds. Without bounds this is
//! plain L-BFGS with a backtracking line search.

use super::{BoundedMinimizer, MinimizerReport, Objective, Termination};
use crate::SolverParams;
use std::collections::VecDeque;
use tracing::debug;

/// Sufficient-decrease constant of the Armijo test.
const ARMIJO_C1: f64 = 1e-4;

/// Maximum number of step halvings in one line search.
const MAX_BACKTRACKS: usize = 40;

/// Step-size convergence threshold, relative to the iterate magnitude.
const STEP_TOLERANCE: f64 = 1e-12;

/// Correction pairs with `s·y` below this fraction of `y·y` are discarded.
const CURVATURE_EPS: f64 = 1e-10;

/// Projected L-BFGS minimizer configured by [`SolverParams`].
///
/// # Example
///
/// ```
/// use mesh_template_fit::solver::{BoundedMinimizer, Objective, ProjectedLbfgs};
/// use mesh_template_fit::SolverParams;
///
/// struct Bowl;
///
/// impl Objective for Bowl {
///     fn dimension(&self) -> usize {
///         2
///     }
///     fn evaluate(&self, x: &[f64], grad: &mut [f64]) -> f64 {
///         grad[0] = 2.0 * (x[0] - 3.0);
///         grad[1] = 2.0 * (x[1] + 1.0);
///         (x[0] - 3.0).powi(2) + (x[1] + 1.0).powi(2)
///     }
/// }
///
/// let solver = ProjectedLbfgs::new(SolverParams::default().with_bounds(-2.0, 2.0));
/// let mut x = [0.0, 0.0];
/// let report = solver.minimize(&Bowl, &mut x);
///
/// assert!(report.is_converged());
/// assert!((x[0] - 2.0).abs() < 1e-6);
/// assert!((x[1] + 1.0).abs() < 1e-4);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProjectedLbfgs {
    params: SolverParams,
}

/// One stored correction pair.
struct Correction {
    s: Vec<f64>,
    y: Vec<f64>,
}

impl ProjectedLbfgs {
    /// Creates a minimizer with the given settings.
    #[must_use]
    pub const fn new(params: SolverParams) -> Self {
        Self { params }
    }

    /// Settings in use.
    #[must_use]
    pub const fn params(&self) -> &SolverParams {
        &self.params
    }

    fn bounds(&self) -> (f64, f64) {
        self.params
            .bounds
            .map_or((f64::NEG_INFINITY, f64::INFINITY), |[lo, hi]| (lo, hi))
    }
}

impl BoundedMinimizer for ProjectedLbfgs {
    #[allow(clippy::too_many_lines)]
    fn minimize(&self, objective: &dyn Objective, x: &mut [f64]) -> MinimizerReport {
        let (lower, upper) = self.bounds();
        let ftol = self.params.function_tolerance();
        let pgtol = self.params.projected_gradient_tolerance;
        let max_evaluations = self.params.max_evaluations.max(1);
        let history = self.params.history.max(1);

        let n = x.len();
        project(x, lower, upper);

        let mut grad = vec![0.0; n];
        let mut f = objective.evaluate(x, &mut grad);
        let initial_value = f;
        let mut evaluations = 1;
        let mut iterations = 0;

        let finish = |termination: Termination, final_value: f64, evaluations: usize, iterations: usize| {
            debug!(
                %termination,
                initial_value,
                final_value,
                evaluations,
                iterations,
                "minimizer finished"
            );
            MinimizerReport {
                termination,
                initial_value,
                final_value,
                evaluations,
                iterations,
            }
        };

        if !f.is_finite() || grad.iter().any(|g| !g.is_finite()) {
            return finish(Termination::NonFinite, f, evaluations, iterations);
        }

        let mut corrections: VecDeque<Correction> = VecDeque::with_capacity(history);
        let mut free = vec![true; n];
        let mut x_trial = vec![0.0; n];
        let mut grad_trial = vec![0.0; n];

        loop {
            if projected_gradient_norm(x, &grad, lower, upper) <= pgtol {
                return finish(Termination::ConvergedGtol, f, evaluations, iterations);
            }
            if evaluations >= max_evaluations {
                return finish(Termination::TooManyEvaluations, f, evaluations, iterations);
            }

            mark_free(x, &grad, lower, upper, &mut free);
            let mut direction = two_loop_direction(&grad, &corrections, &free);
            let mut slope = dot(&direction, &grad);
            if slope.is_nan() || slope >= 0.0 {
                corrections.clear();
                direction = grad
                    .iter()
                    .zip(&free)
                    .map(|(g, &fr)| if fr { -g } else { 0.0 })
                    .collect();
                slope = dot(&direction, &grad);
                if slope.is_nan() || slope >= 0.0 {
                    return finish(Termination::ConvergedGtol, f, evaluations, iterations);
                }
            }

            let mut step = if iterations == 0 && corrections.is_empty() {
                (1.0 / inf_norm(&direction)).min(1.0)
            } else {
                1.0
            };

            let mut accepted = false;
            let mut f_trial = f;
            for _ in 0..MAX_BACKTRACKS {
                if evaluations >= max_evaluations {
                    break;
                }
                for ((xt, xi), di) in x_trial.iter_mut().zip(x.iter()).zip(&direction) {
                    *xt = step.mul_add(*di, *xi).clamp(lower, upper);
                }
                f_trial = objective.evaluate(&x_trial, &mut grad_trial);
                evaluations += 1;

                let predicted: f64 = grad
                    .iter()
                    .zip(x_trial.iter().zip(x.iter()))
                    .map(|(g, (xt, xi))| g * (xt - xi))
                    .sum();
                let gradient_finite = grad_trial.iter().all(|g| g.is_finite());
                if f_trial.is_finite()
                    && gradient_finite
                    && predicted < 0.0
                    && f_trial <= ARMIJO_C1.mul_add(predicted, f)
                {
                    accepted = true;
                    break;
                }
                step *= 0.5;
            }

            if !accepted {
                let termination = if evaluations >= max_evaluations {
                    Termination::TooManyEvaluations
                } else {
                    Termination::LineSearchFailed
                };
                return finish(termination, f, evaluations, iterations);
            }

            let s: Vec<f64> = x_trial.iter().zip(x.iter()).map(|(a, b)| a - b).collect();
            let y: Vec<f64> = grad_trial.iter().zip(&grad).map(|(a, b)| a - b).collect();
            let sy = dot(&s, &y);
            if sy > CURVATURE_EPS * dot(&y, &y) {
                if corrections.len() == history {
                    corrections.pop_front();
                }
                corrections.push_back(Correction { s: s.clone(), y });
            }

            let f_previous = f;
            f = f_trial;
            x.copy_from_slice(&x_trial);
            grad.copy_from_slice(&grad_trial);
            iterations += 1;

            let reduction = (f_previous - f) / f_previous.abs().max(f.abs()).max(1.0);
            let function_converged = reduction <= ftol;
            let step_converged = inf_norm(&s) <= STEP_TOLERANCE * inf_norm(x).max(1.0);
            match (function_converged, step_converged) {
                (true, true) => {
                    return finish(Termination::ConvergedXftol, f, evaluations, iterations);
                }
                (true, false) => {
                    return finish(Termination::ConvergedFtol, f, evaluations, iterations);
                }
                (false, true) => {
                    return finish(Termination::ConvergedXtol, f, evaluations, iterations);
                }
                (false, false) => {}
            }
        }
    }
}

fn project(x: &mut [f64], lower: f64, upper: f64) {
    for xi in x {
        *xi = xi.clamp(lower, upper);
    }
}

/// Infinity norm of `P(x − g) − x`.
fn projected_gradient_norm(x: &[f64], grad: &[f64], lower: f64, upper: f64) -> f64 {
    x.iter()
        .zip(grad)
        .map(|(&xi, &gi)| ((xi - gi).clamp(lower, upper) - xi).abs())
        .fold(0.0, f64::max)
}

/// A variable is held when it sits on a bound and the gradient pushes outward.
fn mark_free(x: &[f64], grad: &[f64], lower: f64, upper: f64, free: &mut [bool]) {
    for ((fr, &xi), &gi) in free.iter_mut().zip(x).zip(grad) {
        *fr = !((xi <= lower && gi > 0.0) || (xi >= upper && gi < 0.0));
    }
}

/// L-BFGS two-loop recursion restricted to free variables.
fn two_loop_direction(grad: &[f64], corrections: &VecDeque<Correction>, free: &[bool]) -> Vec<f64> {
    let masked_dot = |a: &[f64], b: &[f64]| -> f64 {
        a.iter()
            .zip(b)
            .zip(free)
            .filter(|(_, fr)| **fr)
            .map(|((x, y), _)| x * y)
            .sum()
    };

    let mut q: Vec<f64> = grad
        .iter()
        .zip(free)
        .map(|(g, &fr)| if fr { *g } else { 0.0 })
        .collect();

    let rhos: Vec<Option<f64>> = corrections
        .iter()
        .map(|c| {
            let sy = masked_dot(&c.s, &c.y);
            (sy > 0.0).then(|| 1.0 / sy)
        })
        .collect();

    let mut alphas = vec![0.0; corrections.len()];
    for (k, c) in corrections.iter().enumerate().rev() {
        let Some(rho) = rhos[k] else { continue };
        let alpha = rho * masked_dot(&c.s, &q);
        alphas[k] = alpha;
        for ((qi, yi), &fr) in q.iter_mut().zip(&c.y).zip(free) {
            if fr {
                *qi -= alpha * yi;
            }
        }
    }

    let gamma = corrections
        .iter()
        .zip(&rhos)
        .rev()
        .find_map(|(c, rho)| {
            rho.and_then(|_| {
                let yy = masked_dot(&c.y, &c.y);
                (yy > 0.0).then(|| masked_dot(&c.s, &c.y) / yy)
            })
        })
        .unwrap_or(1.0);

    let mut r: Vec<f64> = q.iter().map(|v| gamma * v).collect();
    for (k, c) in corrections.iter().enumerate() {
        let Some(rho) = rhos[k] else { continue };
        let beta = rho * masked_dot(&c.y, &r);
        for ((ri, si), &fr) in r.iter_mut().zip(&c.s).zip(free) {
            if fr {
                *ri += si * (alphas[k] - beta);
            }
        }
    }

    r.iter_mut().for_each(|v| *v = -*v);
    r
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |m, x| m.max(x.abs()))
}

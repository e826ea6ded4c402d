//! Bound-constrained minimization.
//!
//! The fitting driver only depends on the [`BoundedMinimizer`] trait and the
//! [`MinimizerReport`] it returns. [`ProjectedLbfgs`] is the implementation
//! used by default.

mod lbfgs;

pub use lbfgs::ProjectedLbfgs;

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A differentiable scalar function of a flat parameter vector.
pub trait Objective {
    /// Number of parameters.
    fn dimension(&self) -> usize;

    /// Evaluates the function at `x`, overwriting `grad` with its gradient.
    ///
    /// `x` and `grad` both have length [`dimension`](Self::dimension).
    fn evaluate(&self, x: &[f64], grad: &mut [f64]) -> f64;
}

/// A minimizer over a box-constrained domain.
pub trait BoundedMinimizer {
    /// Minimizes `objective` starting from `x`.
    ///
    /// On return `x` holds the best feasible point found, even when the
    /// report does not indicate convergence.
    fn minimize(&self, objective: &dyn Objective, x: &mut [f64]) -> MinimizerReport;
}

/// Why a minimization stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Termination {
    /// Relative function reduction fell below tolerance.
    ConvergedFtol,
    /// Step length fell below tolerance.
    ConvergedXtol,
    /// Both function reduction and step length fell below tolerance.
    ConvergedXftol,
    /// Largest projected-gradient component fell below tolerance.
    ConvergedGtol,
    /// Evaluation cap reached before convergence.
    TooManyEvaluations,
    /// No acceptable step along the search direction.
    LineSearchFailed,
    /// The objective or its gradient became NaN or infinite.
    NonFinite,
}

impl Termination {
    /// Returns true for the four convergence conditions.
    #[must_use]
    pub const fn is_converged(self) -> bool {
        matches!(
            self,
            Self::ConvergedFtol | Self::ConvergedXtol | Self::ConvergedXftol | Self::ConvergedGtol
        )
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ConvergedFtol => "converged (function tolerance)",
            Self::ConvergedXtol => "converged (step tolerance)",
            Self::ConvergedXftol => "converged (function and step tolerance)",
            Self::ConvergedGtol => "converged (gradient tolerance)",
            Self::TooManyEvaluations => "evaluation limit reached",
            Self::LineSearchFailed => "line search failed",
            Self::NonFinite => "non-finite objective",
        };
        f.write_str(s)
    }
}

/// Outcome of one minimization.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MinimizerReport {
    /// Why the minimizer stopped.
    pub termination: Termination,
    /// Objective at the starting point.
    pub initial_value: f64,
    /// Objective at the returned point.
    pub final_value: f64,
    /// Number of objective evaluations.
    pub evaluations: usize,
    /// Number of accepted steps.
    pub iterations: usize,
}

impl MinimizerReport {
    /// Returns true if a convergence condition was met.
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        self.termination.is_converged()
    }

    /// Returns true if the returned point is strictly better than the start.
    #[must_use]
    pub fn objective_reduced(&self) -> bool {
        self.final_value < self.initial_value
    }
}

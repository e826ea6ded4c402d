//! Fit output and per-iteration diagnostics.

use crate::solver::Termination;
use crate::{AffineParams, EnergyBreakdown, EnergyWeights};
use mesh_registration::SimilarityTransform;
use mesh_types::IndexedMesh;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What happened in one outer iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IterationReport {
    /// Zero-based outer iteration index.
    pub iteration: usize,
    /// Term weights used for this iteration.
    pub weights: EnergyWeights,
    /// Number of template vertices with a valid correspondence.
    pub valid_correspondences: usize,
    /// Why the minimizer stopped.
    pub termination: Termination,
    /// Objective evaluations spent by the minimizer.
    pub evaluations: usize,
    /// Objective at the parameters the iteration started from.
    pub energy_before: f64,
    /// Objective at the parameters the iteration ended with.
    ///
    /// Equal to `energy_before` when the solver result was discarded.
    pub energy_after: f64,
    /// Whether the solver result replaced the previous parameters.
    pub accepted: bool,
}

/// Result of a template fit.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FitOutput {
    /// Deformed template: same faces and attributes, new positions and normals.
    pub mesh: IndexedMesh,
    /// Final per-vertex affine parameters.
    pub params: AffineParams,
    /// One report per outer iteration, in order.
    pub iterations: Vec<IterationReport>,
    /// Energy terms of the final parameters, evaluated with the weights and
    /// correspondences of the last iteration.
    pub energy: EnergyBreakdown,
}

impl FitOutput {
    /// Number of iterations whose solver result was kept.
    #[must_use]
    pub fn accepted_count(&self) -> usize {
        self.iterations.iter().filter(|r| r.accepted).count()
    }

    /// Returns true if the last iteration's solver met a convergence condition.
    #[must_use]
    pub fn converged(&self) -> bool {
        self.iterations
            .last()
            .is_some_and(|r| r.termination.is_converged())
    }

    /// Total objective evaluations across all iterations.
    #[must_use]
    pub fn total_evaluations(&self) -> usize {
        self.iterations.iter().map(|r| r.evaluations).sum()
    }
}

/// Result of a landmark-aligned template fit.
#[derive(Debug, Clone)]
pub struct AlignedFitOutput {
    /// Similarity transform applied to the template before fitting.
    pub alignment: SimilarityTransform,
    /// Non-rigid fit of the aligned template.
    pub fit: FitOutput,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(iteration: usize, termination: Termination, accepted: bool) -> IterationReport {
        IterationReport {
            iteration,
            weights: EnergyWeights::new(1.0, 1.0, 1.0),
            valid_correspondences: 3,
            termination,
            evaluations: 7,
            energy_before: 1.0,
            energy_after: 0.5,
            accepted,
        }
    }

    #[test]
    fn summary_counts() {
        let output = FitOutput {
            mesh: IndexedMesh::new(),
            params: AffineParams::identity(0),
            iterations: vec![
                report(0, Termination::ConvergedFtol, true),
                report(1, Termination::LineSearchFailed, false),
                report(2, Termination::ConvergedGtol, true),
            ],
            energy: EnergyBreakdown::default(),
        };

        assert_eq!(output.accepted_count(), 2);
        assert_eq!(output.total_evaluations(), 21);
        assert!(output.converged());
    }

    #[test]
    fn no_iterations_is_not_converged() {
        let output = FitOutput {
            mesh: IndexedMesh::new(),
            params: AffineParams::identity(0),
            iterations: Vec::new(),
            energy: EnergyBreakdown::default(),
        };
        assert!(!output.converged());
        assert_eq!(output.accepted_count(), 0);
    }
}

//! Outer fitting loop.
//!
//! Each outer iteration re-matches the deformed template against the target,
//! minimizes the energy with the current weights and decides whether to keep
//! the result. The parameter arena is threaded through the loop by value.

use mesh_registration::{LandmarkParams, align_by_landmarks, transform_mesh};
use mesh_types::IndexedMesh;
use nalgebra::{Point3, Vector3};
use tracing::{debug, info, warn};

use crate::error::{FitError, FitResult};
use crate::normals::compute_vertex_normals;
use crate::params::FitParams;
use crate::result::{AlignedFitOutput, FitOutput, IterationReport};
use crate::solver::{BoundedMinimizer, MinimizerReport, ProjectedLbfgs, Termination};
use crate::{
    AffineParams, CorrespondenceThresholds, Correspondences, EdgeSet, EnergyBreakdown,
    EnergyFunction, EnergyWeights, PARAMS_PER_VERTEX, TargetSurface,
};

/// Decides whether a solver result replaces the previous parameters.
///
/// A result is kept if the solver converged, or if it ran out of evaluations
/// while strictly lowering the objective. Anything else (line search failure,
/// non-finite values, no progress) keeps the previous parameters.
///
/// # Example
///
/// ```
/// use mesh_template_fit::accept_step;
/// use mesh_template_fit::solver::{MinimizerReport, Termination};
///
/// let report = MinimizerReport {
///     termination: Termination::TooManyEvaluations,
///     initial_value: 4.0,
///     final_value: 3.5,
///     evaluations: 100,
///     iterations: 40,
/// };
/// assert!(accept_step(&report));
/// ```
#[must_use]
pub fn accept_step(report: &MinimizerReport) -> bool {
    report.is_converged()
        || (report.termination == Termination::TooManyEvaluations && report.objective_reduced())
}

/// Fits `template` to `target` starting from the identity deformation.
///
/// The output mesh keeps the template's faces, colors and texture
/// coordinates. Positions are deformed and normals are re-estimated.
///
/// # Errors
///
/// Returns an error before any optimization if either mesh is empty, has an
/// out-of-range face index or a non-finite vertex, or if `params` is invalid.
/// Solver failures are not errors; see [`IterationReport::accepted`].
///
/// # Example
///
/// ```
/// use mesh_template_fit::{fit_template, FitParams};
/// use mesh_types::{IndexedMesh, Vertex};
///
/// let mut mesh = IndexedMesh::new();
/// mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
/// mesh.faces.push([0, 1, 2]);
///
/// let output = fit_template(&mesh, &mesh, &FitParams::default())?;
/// assert_eq!(output.iterations.len(), 10);
/// assert!(output.energy.total() < 1e-12);
/// # Ok::<(), mesh_template_fit::FitError>(())
/// ```
pub fn fit_template(
    template: &IndexedMesh,
    target: &IndexedMesh,
    params: &FitParams,
) -> FitResult<FitOutput> {
    let initial = AffineParams::identity(template.vertices.len());
    fit_template_from(template, target, initial, params)
}

/// Fits `template` to `target` starting from the given parameters.
///
/// # Errors
///
/// As [`fit_template`], plus [`FitError::ParameterLength`] if `initial` does
/// not hold twelve values per template vertex.
pub fn fit_template_from(
    template: &IndexedMesh,
    target: &IndexedMesh,
    initial: AffineParams,
    params: &FitParams,
) -> FitResult<FitOutput> {
    let minimizer = ProjectedLbfgs::new(params.solver.clone());
    fit_template_with(&minimizer, template, target, initial, params)
}

/// Fits `template` to `target` using a caller-supplied minimizer.
///
/// `params.solver` is still validated but only [`ProjectedLbfgs`] reads it.
///
/// # Errors
///
/// As [`fit_template_from`].
#[allow(clippy::too_many_lines)]
pub fn fit_template_with(
    minimizer: &dyn BoundedMinimizer,
    template: &IndexedMesh,
    target: &IndexedMesh,
    initial: AffineParams,
    params: &FitParams,
) -> FitResult<FitOutput> {
    // Validate input
    if template.vertices.is_empty() {
        return Err(FitError::EmptyTemplate);
    }
    template.validate()?;
    let template_positions = template.positions();
    if let Some(index) = first_non_finite(&template_positions) {
        return Err(FitError::NonFiniteVertex {
            mesh: "template",
            index,
        });
    }
    params.validate()?;
    let expected = template_positions.len() * PARAMS_PER_VERTEX;
    if initial.as_slice().len() != expected {
        return Err(FitError::ParameterLength {
            expected,
            actual: initial.as_slice().len(),
        });
    }
    let surface = TargetSurface::new(target)?;

    let edges = EdgeSet::from_faces(template_positions.len(), &template.faces);
    let thresholds = CorrespondenceThresholds::new(
        params.max_correspondence_distance,
        params.max_correspondence_angle,
    );

    info!(
        "Fitting template: {} vertices, {} edges -> target: {} vertices, {} iterations",
        template_positions.len(),
        edges.len(),
        surface.positions().len(),
        params.max_iterations
    );

    let mut current = initial;
    let mut iterations = Vec::with_capacity(params.max_iterations);
    let mut last_round: Option<(Correspondences, EnergyWeights)> = None;

    for iteration in 0..params.max_iterations {
        // 1. Deform the original template and re-estimate its normals
        let deformed = current.apply(&template_positions);
        let normals = compute_vertex_normals(&deformed, &template.faces);

        // 2. Match against the target
        let correspondences = surface.find_correspondences(&deformed, &normals, thresholds);
        let valid_correspondences = correspondences.valid_count();
        if valid_correspondences == 0 {
            warn!(
                "Iteration {}: no valid correspondences within {} units and {} degrees",
                iteration, params.max_correspondence_distance, params.max_correspondence_angle
            );
        }

        // 3. Build the energy with this iteration's weights
        let (regularization, rigidity) = params.weights_at(iteration);
        let weights = EnergyWeights::new(params.data_weight, regularization, rigidity);
        let energy = EnergyFunction::new(&template_positions, &correspondences, &edges, weights);

        // 4. Minimize and keep or discard the result
        let (next, report) = solve_step(minimizer, &energy, current);
        let accepted = accept_step(&report);
        if !accepted {
            warn!(
                "Iteration {}: solver stopped with {} after {} evaluations, keeping previous parameters",
                iteration, report.termination, report.evaluations
            );
        }
        current = next;

        let energy_after = if accepted {
            report.final_value
        } else {
            report.initial_value
        };
        debug!(
            "Iteration {}: weights (data {:.3e}, reg {:.3e}, rigid {:.3e}), {} valid correspondences, {} in {} evaluations, energy {:.6e} -> {:.6e}{}",
            iteration,
            weights.data,
            weights.regularization,
            weights.rigidity,
            valid_correspondences,
            report.termination,
            report.evaluations,
            report.initial_value,
            energy_after,
            if accepted { "" } else { " (kept)" }
        );

        iterations.push(IterationReport {
            iteration,
            weights,
            valid_correspondences,
            termination: report.termination,
            evaluations: report.evaluations,
            energy_before: report.initial_value,
            energy_after,
            accepted,
        });
        last_round = Some((correspondences, weights));
    }

    let energy = last_round.map_or_else(EnergyBreakdown::default, |(correspondences, weights)| {
        EnergyFunction::new(&template_positions, &correspondences, &edges, weights)
            .breakdown(current.as_slice())
    });

    let mesh = build_output_mesh(template, &current)?;

    info!(
        "Fit complete: {} of {} iterations accepted, final energy {:.6e} (data {:.6e}, reg {:.6e}, rigid {:.6e})",
        iterations.iter().filter(|r| r.accepted).count(),
        iterations.len(),
        energy.total(),
        energy.data,
        energy.regularization,
        energy.rigidity
    );

    Ok(FitOutput {
        mesh,
        params: current,
        iterations,
        energy,
    })
}

/// Aligns `template` to `target` from paired landmarks, then fits it.
///
/// `template_landmarks` and `target_landmarks` are paired by index. The
/// similarity transform they define is applied to the template before the
/// non-rigid fit.
///
/// # Errors
///
/// Returns [`FitError::Registration`] if the landmarks cannot be aligned
/// (count mismatch, too few or degenerate points, or a reflection), and
/// otherwise the errors of [`fit_template`].
///
/// # Example
///
/// ```
/// use mesh_registration::LandmarkParams;
/// use mesh_template_fit::{fit_template_with_landmarks, FitParams};
/// use mesh_types::{IndexedMesh, Vertex};
/// use nalgebra::Vector3;
///
/// let mut template = IndexedMesh::new();
/// template.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
/// template.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
/// template.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
/// template.faces.push([0, 1, 2]);
///
/// let offset = Vector3::new(5.0, -3.0, 2.0);
/// let mut target = template.clone();
/// for v in &mut target.vertices {
///     v.position += offset;
/// }
///
/// let output = fit_template_with_landmarks(
///     &template,
///     &target,
///     &template.positions(),
///     &target.positions(),
///     &LandmarkParams::default(),
///     &FitParams::default(),
/// )?;
///
/// assert!((output.alignment.translation - offset).norm() < 1e-9);
/// assert!((output.fit.mesh.vertices[1].position - target.vertices[1].position).norm() < 1e-6);
/// # Ok::<(), mesh_template_fit::FitError>(())
/// ```
pub fn fit_template_with_landmarks(
    template: &IndexedMesh,
    target: &IndexedMesh,
    template_landmarks: &[Point3<f64>],
    target_landmarks: &[Point3<f64>],
    landmark_params: &LandmarkParams,
    params: &FitParams,
) -> FitResult<AlignedFitOutput> {
    let alignment = align_by_landmarks(template_landmarks, target_landmarks, landmark_params)?;
    debug!(
        "Landmark alignment: scale {:.6}, translation ({:.4}, {:.4}, {:.4})",
        alignment.scale, alignment.translation.x, alignment.translation.y, alignment.translation.z
    );

    let aligned = transform_mesh(template, &alignment);
    let fit = fit_template(&aligned, target, params)?;
    Ok(AlignedFitOutput { alignment, fit })
}

/// Runs the minimizer on a copy of `current`.
///
/// Returns the solver's point if [`accept_step`] keeps it, otherwise
/// `current` unchanged, together with the report.
fn solve_step(
    minimizer: &dyn BoundedMinimizer,
    energy: &EnergyFunction<'_>,
    current: AffineParams,
) -> (AffineParams, MinimizerReport) {
    let mut trial = current.clone();
    let report = minimizer.minimize(energy, trial.as_mut_slice());
    if accept_step(&report) {
        (trial, report)
    } else {
        (current, report)
    }
}

/// Deforms the template with `params` and refreshes its normals.
fn build_output_mesh(template: &IndexedMesh, params: &AffineParams) -> FitResult<IndexedMesh> {
    let positions = params.apply(&template.positions());
    let normals = compute_vertex_normals(&positions, &template.faces);

    let mut mesh = template.with_positions(&positions)?;
    for (vertex, normal) in mesh.vertices.iter_mut().zip(normals) {
        vertex.attributes.normal = (normal != Vector3::zeros()).then_some(normal);
    }
    Ok(mesh)
}

fn first_non_finite(points: &[Point3<f64>]) -> Option<usize> {
    points
        .iter()
        .position(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::Objective;
    use approx::assert_relative_eq;
    use mesh_types::Vertex;

    fn report(termination: Termination, initial_value: f64, final_value: f64) -> MinimizerReport {
        MinimizerReport {
            termination,
            initial_value,
            final_value,
            evaluations: 100,
            iterations: 20,
        }
    }

    fn unit_triangle() -> IndexedMesh {
        let mut mesh = IndexedMesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
        mesh.faces.push([0, 1, 2]);
        mesh
    }

    /// Minimizer that scrambles `x` and reports a fixed outcome.
    struct Scripted(Termination, f64);

    impl BoundedMinimizer for Scripted {
        fn minimize(&self, objective: &dyn Objective, x: &mut [f64]) -> MinimizerReport {
            let mut grad = vec![0.0; x.len()];
            let initial_value = objective.evaluate(x, &mut grad);
            x.fill(7.0);
            MinimizerReport {
                termination: self.0,
                initial_value,
                final_value: self.1,
                evaluations: 1,
                iterations: 0,
            }
        }
    }

    #[test]
    fn converged_results_are_accepted() {
        for termination in [
            Termination::ConvergedFtol,
            Termination::ConvergedXtol,
            Termination::ConvergedXftol,
            Termination::ConvergedGtol,
        ] {
            assert!(accept_step(&report(termination, 1.0, 2.0)));
        }
    }

    #[test]
    fn evaluation_cap_needs_strict_decrease() {
        assert!(accept_step(&report(Termination::TooManyEvaluations, 2.0, 1.0)));
        assert!(!accept_step(&report(Termination::TooManyEvaluations, 2.0, 2.0)));
        assert!(!accept_step(&report(Termination::TooManyEvaluations, 2.0, 3.0)));
    }

    #[test]
    fn failures_are_rejected() {
        assert!(!accept_step(&report(Termination::LineSearchFailed, 2.0, 1.0)));
        assert!(!accept_step(&report(Termination::NonFinite, 2.0, 1.0)));
    }

    #[test]
    fn rejected_step_keeps_previous_parameters() {
        let mesh = unit_triangle();
        let params = FitParams::new().with_max_iterations(3);
        let scripted = Scripted(Termination::LineSearchFailed, 0.0);

        let output =
            fit_template_with(&scripted, &mesh, &mesh, AffineParams::identity(3), &params).unwrap();

        assert_eq!(output.params, AffineParams::identity(3));
        assert_eq!(output.accepted_count(), 0);
        for r in &output.iterations {
            assert!(!r.accepted);
            assert_eq!(r.energy_after, r.energy_before);
        }
        assert_eq!(output.mesh.positions(), mesh.positions());
    }

    #[test]
    fn accepted_step_replaces_parameters() {
        let mesh = unit_triangle();
        let params = FitParams::new().with_max_iterations(1);
        let scripted = Scripted(Termination::ConvergedGtol, 0.0);

        let output =
            fit_template_with(&scripted, &mesh, &mesh, AffineParams::identity(3), &params).unwrap();

        assert!(output.params.as_slice().iter().all(|&v| v == 7.0));
        assert_eq!(output.accepted_count(), 1);
    }

    #[test]
    fn weights_follow_schedule() {
        let mesh = unit_triangle();
        let params = FitParams::new().with_max_iterations(4);
        let output = fit_template(&mesh, &mesh, &params).unwrap();

        let reg: Vec<f64> = output
            .iterations
            .iter()
            .map(|r| r.weights.regularization)
            .collect();
        assert_eq!(reg, vec![1000.0, 500.0, 250.0, 125.0]);
        assert!(output.iterations.iter().all(|r| r.weights.data == 1.0));
    }

    #[test]
    fn parameter_length_checked() {
        let mesh = unit_triangle();
        let err = fit_template_from(&mesh, &mesh, AffineParams::identity(2), &FitParams::default())
            .unwrap_err();
        assert!(matches!(
            err,
            FitError::ParameterLength {
                expected: 36,
                actual: 24
            }
        ));
    }

    #[test]
    fn parameters_checked_before_target() {
        let mut target = unit_triangle();
        target.vertices[0].position.z = f64::NAN;
        let params = FitParams::new().with_max_iterations(0);

        let err = fit_template(&unit_triangle(), &target, &params).unwrap_err();
        assert!(matches!(
            err,
            FitError::InvalidParameter {
                name: "max_iterations",
                ..
            }
        ));

        let err = fit_template_from(
            &unit_triangle(),
            &IndexedMesh::new(),
            AffineParams::identity(1),
            &FitParams::default(),
        )
        .unwrap_err();
        assert!(matches!(err, FitError::ParameterLength { .. }));
    }

    #[test]
    fn non_finite_template_rejected() {
        let mut mesh = unit_triangle();
        let target = unit_triangle();
        mesh.vertices[2].position.y = f64::NAN;
        let err = fit_template(&mesh, &target, &FitParams::default()).unwrap_err();
        assert!(matches!(
            err,
            FitError::NonFiniteVertex {
                mesh: "template",
                index: 2
            }
        ));
    }

    #[test]
    fn output_normals_are_refreshed() {
        let mut mesh = unit_triangle();
        for v in &mut mesh.vertices {
            v.attributes.normal = Some(Vector3::new(1.0, 0.0, 0.0));
        }
        let output = fit_template(&mesh, &unit_triangle(), &FitParams::default()).unwrap();
        for v in &output.mesh.vertices {
            assert_relative_eq!(
                v.attributes.normal.unwrap(),
                Vector3::new(0.0, 0.0, 1.0),
                epsilon = 1e-12
            );
        }
    }
}

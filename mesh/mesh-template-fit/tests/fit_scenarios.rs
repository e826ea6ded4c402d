//! End-to-end fitting scenarios.
//!
//! Run with: cargo test -p mesh-template-fit --test fit_scenarios

use approx::assert_relative_eq;
use mesh_registration::{LandmarkParams, RegistrationError};
use mesh_template_fit::{
    AffineParams, FitError, FitParams, SolverParams, fit_template, fit_template_from,
    fit_template_with_landmarks,
};
use mesh_types::{IndexedMesh, MeshError, Vertex, VertexColor};
use nalgebra::{Point3, Rotation3, Vector3};

// =============================================================================
// Fixtures
// =============================================================================

fn unit_triangle() -> IndexedMesh {
    let mut mesh = IndexedMesh::new();
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
    mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
    mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
    mesh.faces.push([0, 1, 2]);
    mesh
}

/// Regular `n x n` grid with the given spacing and height function.
fn grid(n: u32, spacing: f64, height: impl Fn(f64, f64) -> f64) -> IndexedMesh {
    let mut mesh = IndexedMesh::new();
    for j in 0..n {
        for i in 0..n {
            let x = f64::from(i) * spacing;
            let y = f64::from(j) * spacing;
            mesh.vertices.push(Vertex::from_coords(x, y, height(x, y)));
        }
    }
    for j in 0..n - 1 {
        for i in 0..n - 1 {
            let v = j * n + i;
            mesh.faces.push([v, v + 1, v + n]);
            mesh.faces.push([v + 1, v + n + 1, v + n]);
        }
    }
    mesh
}

fn translated(mesh: &IndexedMesh, offset: Vector3<f64>) -> IndexedMesh {
    let mut out = mesh.clone();
    for v in &mut out.vertices {
        v.position += offset;
    }
    out
}

fn max_position_error(a: &IndexedMesh, b: &IndexedMesh) -> f64 {
    a.vertices
        .iter()
        .zip(&b.vertices)
        .map(|(u, v)| (u.position - v.position).norm())
        .fold(0.0, f64::max)
}

// =============================================================================
// Core scenarios
// =============================================================================

#[test]
fn self_fit_stays_at_identity() {
    let mesh = unit_triangle();
    let output = fit_template(&mesh, &mesh, &FitParams::default()).unwrap();

    assert_eq!(output.iterations.len(), 10);
    assert_eq!(output.accepted_count(), 10);
    assert!(output.params.max_deviation_from_identity() < 1e-9);
    assert!(output.energy.total() < 1e-12);
    assert!(max_position_error(&output.mesh, &mesh) < 1e-9);
    for report in &output.iterations {
        assert_eq!(report.valid_correspondences, 3);
    }
}

#[test]
fn self_fit_on_curved_grid() {
    let mesh = grid(4, 1.0, |x, y| 0.2 * x * y / 9.0);
    let output = fit_template(&mesh, &mesh, &FitParams::default()).unwrap();

    assert!(output.energy.total() < 1e-12);
    assert!(max_position_error(&output.mesh, &mesh) < 1e-9);
}

#[test]
fn in_plane_translation_keeps_rigid_shape() {
    let template = unit_triangle();
    let offset = Vector3::new(2.0, 0.0, 0.0);
    let target = translated(&template, offset);
    let params = FitParams::default();

    let output = fit_template(&template, &target, &params).unwrap();

    // Point-to-plane matching cannot see sliding within the plane, so the
    // fitted vertices only need to stay within the matching radius.
    for (fitted, expected) in output.mesh.vertices.iter().zip(&target.vertices) {
        assert!((fitted.position - expected.position).norm() <= params.max_correspondence_distance);
        assert_relative_eq!(fitted.position.z, 0.0, epsilon = 1e-9);
    }
    assert!(output.energy.rigidity < 1e-9);
}

#[test]
fn in_plane_translation_with_dominant_data_term() {
    let template = unit_triangle();
    let offset = Vector3::new(2.0, 0.0, 0.0);
    let target = translated(&template, offset);
    let params = FitParams::new()
        .with_data_weight(100.0)
        .with_regularization_weight(0.1)
        .with_rigidity_weight(0.1);

    let output = fit_template(&template, &target, &params).unwrap();

    for (fitted, expected) in output.mesh.vertices.iter().zip(&target.vertices) {
        assert!((fitted.position - expected.position).norm() <= params.max_correspondence_distance);
        assert_relative_eq!(fitted.position.z, 0.0, epsilon = 1e-9);
    }
    assert!(output.iterations.iter().all(|r| r.valid_correspondences == 3));
    assert!(output.energy.rigidity < 1e-9);
}

#[test]
fn offset_along_normal_is_recovered() {
    let template = grid(4, 1.0, |_, _| 0.0);
    let target = translated(&template, Vector3::new(0.0, 0.0, 0.25));
    let params = FitParams::new()
        .with_data_weight(10.0)
        .with_regularization_weight(1.0)
        .with_rigidity_weight(1.0);

    let output = fit_template(&template, &target, &params).unwrap();

    assert!(max_position_error(&output.mesh, &target) < 1e-3);
    assert!(output.energy.rigidity < 1e-6);
    assert!(output.accepted_count() > 0);
    let last = output.iterations.last().unwrap();
    assert!(last.energy_after <= output.iterations[0].energy_before);
}

#[test]
fn large_planar_target_is_fitted() {
    // 1600 vertices sharing one z value, and 40 per x and y value.
    let template = grid(40, 0.5, |_, _| 0.0);
    let target = translated(&template, Vector3::new(0.0, 0.0, 0.25));
    let params = FitParams::new()
        .with_data_weight(10.0)
        .with_regularization_weight(1.0)
        .with_rigidity_weight(1.0)
        .with_max_iterations(3);

    let output = fit_template(&template, &target, &params).unwrap();

    assert!(output.iterations.iter().all(|r| r.valid_correspondences == 1600));
    assert!(output.accepted_count() > 0);
    assert!(max_position_error(&output.mesh, &target) < 1e-3);
}

#[test]
fn fitting_is_deterministic() {
    let template = grid(5, 0.5, |_, _| 0.0);
    let target = grid(5, 0.5, |x, y| {
        0.3 * (-(x - 1.0).powi(2) - (y - 1.0).powi(2)).exp()
    });
    let params = FitParams::new().with_max_iterations(4);

    let first = fit_template(&template, &target, &params).unwrap();
    let second = fit_template(&template, &target, &params).unwrap();

    assert_eq!(first.mesh.positions(), second.mesh.positions());
    assert_eq!(first.params, second.params);
    assert_eq!(first.iterations, second.iterations);
    assert_eq!(first.energy, second.energy);
}

#[test]
fn restarting_from_previous_parameters_continues() {
    let template = grid(4, 1.0, |_, _| 0.0);
    let target = translated(&template, Vector3::new(0.0, 0.0, 0.25));
    let params = FitParams::new()
        .with_data_weight(10.0)
        .with_regularization_weight(1.0)
        .with_rigidity_weight(1.0)
        .with_max_iterations(2);

    let first = fit_template(&template, &target, &params).unwrap();
    let resumed = fit_template_from(&template, &target, first.params.clone(), &params).unwrap();

    assert!(resumed.iterations[0].energy_before < first.iterations[0].energy_before);
    assert!(max_position_error(&resumed.mesh, &target) < 1e-3);
}

#[test]
fn distant_target_leaves_template_unchanged() {
    let template = unit_triangle();
    let target = translated(&template, Vector3::new(100.0, 0.0, 0.0));

    let output = fit_template(&template, &target, &FitParams::default()).unwrap();

    assert!(output.iterations.iter().all(|r| r.valid_correspondences == 0));
    assert_eq!(output.params, AffineParams::identity(3));
    assert_eq!(output.mesh.positions(), template.positions());
}

#[test]
fn attributes_pass_through() {
    let mut template = unit_triangle();
    template.vertices[0] = Vertex::with_color(Point3::origin(), VertexColor::new(200, 10, 30));
    template.vertices[1].attributes.uv = Some((1.0, 0.0));
    template.vertices[2].attributes.uv = Some((0.0, 1.0));
    let target = translated(&unit_triangle(), Vector3::new(0.0, 0.0, 0.1));

    let output = fit_template(&template, &target, &FitParams::default()).unwrap();

    assert_eq!(output.mesh.faces, template.faces);
    assert_eq!(output.mesh.vertices.len(), 3);
    assert_eq!(output.mesh.vertices[0].color(), Some(VertexColor::new(200, 10, 30)));
    assert_eq!(output.mesh.vertices[1].attributes.uv, Some((1.0, 0.0)));
    assert_eq!(output.mesh.vertices[2].attributes.uv, Some((0.0, 1.0)));
    assert!(output.mesh.vertices.iter().all(|v| v.normal().is_some()));
}

// =============================================================================
// Landmark pre-alignment
// =============================================================================

#[test]
fn landmark_alignment_then_fit() {
    let template = grid(4, 1.0, |x, y| 0.2 * x * y / 9.0);
    let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), 30_f64.to_radians());
    let offset = Vector3::new(3.0, -1.0, 4.0);

    let mut target = template.clone();
    for v in &mut target.vertices {
        v.position = Point3::from(rotation * (v.position.coords * 2.0) + offset);
    }

    let corners = [0, 3, 12, 15];
    let template_landmarks: Vec<_> = corners.iter().map(|&i| template.vertices[i].position).collect();
    let target_landmarks: Vec<_> = corners.iter().map(|&i| target.vertices[i].position).collect();

    let output = fit_template_with_landmarks(
        &template,
        &target,
        &template_landmarks,
        &target_landmarks,
        &LandmarkParams::default(),
        &FitParams::default(),
    )
    .unwrap();

    assert_relative_eq!(output.alignment.scale, 2.0, epsilon = 1e-9);
    assert_relative_eq!(output.alignment.translation, offset, epsilon = 1e-9);
    assert!(max_position_error(&output.fit.mesh, &target) < 1e-6);
    assert!(output.fit.iterations.iter().all(|r| r.valid_correspondences == 16));
}

#[test]
fn mirrored_landmarks_are_rejected() {
    let template = unit_triangle();
    let source = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
    ];
    let mirrored: Vec<_> = source.iter().map(|p| Point3::new(-p.x, p.y, p.z)).collect();

    let err = fit_template_with_landmarks(
        &template,
        &template,
        &source,
        &mirrored,
        &LandmarkParams::default(),
        &FitParams::default(),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        FitError::Registration(RegistrationError::Reflection { .. })
    ));
}

#[test]
fn landmark_count_mismatch_is_rejected() {
    let template = unit_triangle();
    let positions = template.positions();

    let err = fit_template_with_landmarks(
        &template,
        &template,
        &positions,
        &positions[..2],
        &LandmarkParams::default(),
        &FitParams::default(),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        FitError::Registration(RegistrationError::LandmarkCountMismatch {
            source_count: 3,
            target_count: 2
        })
    ));
}

// =============================================================================
// Input errors
// =============================================================================

#[test]
fn empty_meshes_are_rejected() {
    let mesh = unit_triangle();
    let empty = IndexedMesh::new();

    assert!(matches!(
        fit_template(&empty, &mesh, &FitParams::default()),
        Err(FitError::EmptyTemplate)
    ));
    assert!(matches!(
        fit_template(&mesh, &empty, &FitParams::default()),
        Err(FitError::EmptyTarget)
    ));
}

#[test]
fn bad_face_index_is_rejected() {
    let mut template = unit_triangle();
    template.faces.push([0, 1, 7]);

    let err = fit_template(&template, &unit_triangle(), &FitParams::default()).unwrap_err();
    assert!(matches!(
        err,
        FitError::Mesh(MeshError::FaceIndexOutOfRange {
            face: 1,
            index: 7,
            vertex_count: 3
        })
    ));
}

#[test]
fn non_finite_target_is_rejected() {
    let mut target = unit_triangle();
    target.vertices[1].position.x = f64::INFINITY;

    let err = fit_template(&unit_triangle(), &target, &FitParams::default()).unwrap_err();
    assert!(matches!(
        err,
        FitError::NonFiniteVertex {
            mesh: "target",
            index: 1
        }
    ));
}

#[test]
fn invalid_parameters_are_rejected() {
    let mesh = unit_triangle();

    let err = fit_template(&mesh, &mesh, &FitParams::new().with_max_iterations(0)).unwrap_err();
    assert!(matches!(
        err,
        FitError::InvalidParameter {
            name: "max_iterations",
            ..
        }
    ));

    let boxed = FitParams::new().with_solver(SolverParams::new().with_bounds(2.0, 3.0));
    let err = fit_template(&mesh, &mesh, &boxed).unwrap_err();
    assert!(matches!(err, FitError::InvalidParameter { name: "bounds", .. }));
}

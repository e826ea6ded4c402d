//! Per-vertex normal estimation from face incidence.
//!
//! Each face adds `(next − v) × (prev − v) / (|next − v|²·|prev − v|²)` at
//! each of its corners. Dividing by both squared edge lengths weights the
//! contribution by the corner angle rather than by triangle area, so long
//! thin triangles do not dominate.
//!
//! Vertices whose contributions are all degenerate, or cancel out, get the
//! zero vector. Callers must read a zero normal as "no reliable orientation".

use mesh_types::{IndexedMesh, is_degenerate_face};
use nalgebra::{Point3, Vector3};

/// Computes unit vertex normals for `positions` under the given faces.
///
/// Degenerate faces, faces referencing missing vertices and corners with a
/// zero-length incident edge are skipped.
///
/// # Example
///
/// ```
/// use mesh_template_fit::compute_vertex_normals;
/// use nalgebra::{Point3, Vector3};
///
/// let positions = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
/// let normals = compute_vertex_normals(&positions, &[[0, 1, 2]]);
///
/// for n in &normals {
///     assert!((n - Vector3::z()).norm() < 1e-12);
/// }
/// ```
#[must_use]
pub fn compute_vertex_normals(positions: &[Point3<f64>], faces: &[[u32; 3]]) -> Vec<Vector3<f64>> {
    let mut normals = vec![Vector3::zeros(); positions.len()];

    for &face in faces {
        if is_degenerate_face(face) {
            continue;
        }
        let Some(corners) = corner_positions(positions, face) else {
            continue;
        };

        for k in 0..3 {
            let curr = corners[k];
            let next_edge = corners[(k + 1) % 3] - curr;
            let prev_edge = corners[(k + 2) % 3] - curr;

            let next_len_sq = next_edge.norm_squared();
            let prev_len_sq = prev_edge.norm_squared();
            if next_len_sq < f64::EPSILON || prev_len_sq < f64::EPSILON {
                continue;
            }

            normals[face[k] as usize] += next_edge.cross(&prev_edge) / (next_len_sq * prev_len_sq);
        }
    }

    for n in &mut normals {
        let len = n.norm();
        if len > 0.0 && len.is_finite() {
            *n /= len;
        } else {
            *n = Vector3::zeros();
        }
    }

    normals
}

/// Computes vertex normals of a mesh from its current positions.
#[must_use]
pub fn mesh_vertex_normals(mesh: &IndexedMesh) -> Vec<Vector3<f64>> {
    compute_vertex_normals(&mesh.positions(), &mesh.faces)
}

fn corner_positions(positions: &[Point3<f64>], face: [u32; 3]) -> Option<[Point3<f64>; 3]> {
    Some([
        *positions.get(face[0] as usize)?,
        *positions.get(face[1] as usize)?,
        *positions.get(face[2] as usize)?,
    ])
}

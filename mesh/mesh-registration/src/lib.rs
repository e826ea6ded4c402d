//! Similarity alignment of meshes from paired landmarks.
//!
//! This crate estimates the transform `x ↦ s·R·x + t` (uniform scale,
//! proper rotation, translation) that best maps one set of landmarks onto
//! another, and applies it to meshes. It is the pre-alignment step used
//! before non-rigid template fitting.
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with zero Bevy dependencies.
//!
//! # Quick Start
//!
//! ```
//! use mesh_registration::{align_by_landmarks, transform_mesh, LandmarkParams};
//! use mesh_types::{IndexedMesh, Vertex};
//! use nalgebra::Point3;
//!
//! let mut mesh = IndexedMesh::new();
//! mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
//! mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
//! mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
//! mesh.faces.push([0, 1, 2]);
//!
//! let source = mesh.positions();
//! let target = vec![
//!     Point3::new(10.0, 10.0, 0.0),
//!     Point3::new(12.0, 10.0, 0.0),
//!     Point3::new(10.0, 12.0, 0.0),
//! ];
//!
//! let transform = align_by_landmarks(&source, &target, &LandmarkParams::default()).unwrap();
//! let aligned = transform_mesh(&mesh, &transform);
//!
//! assert!((aligned.vertices[1].position - target[1]).norm() < 1e-9);
//! ```
//!
//! # Failure modes
//!
//! Reflections are rejected with [`RegistrationError::Reflection`] instead of
//! being silently corrected: a mirrored landmark set has no proper rotation
//! that fits it.

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod landmark;
mod procrustes;
mod transform;

pub use error::{RegistrationError, RegistrationResult};
pub use landmark::{LandmarkParams, align_by_landmarks, compute_alignment_error};
pub use procrustes::{MIN_POINT_PAIRS, compute_similarity_transform};
pub use transform::SimilarityTransform;

use mesh_types::IndexedMesh;

/// Applies a similarity transform to a mesh, returning a new mesh.
///
/// Faces and non-geometric attributes are kept. Cached normals are rotated
/// (they are unaffected by scale and translation).
///
/// # Example
///
/// ```
/// use mesh_registration::{transform_mesh, SimilarityTransform};
/// use mesh_types::{IndexedMesh, Vertex};
/// use nalgebra::Vector3;
///
/// let mut mesh = IndexedMesh::new();
/// mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
///
/// let transform = SimilarityTransform::from_translation(Vector3::new(5.0, 0.0, 0.0));
/// let transformed = transform_mesh(&mesh, &transform);
///
/// assert!((transformed.vertices[0].position.x - 5.0).abs() < 1e-10);
/// ```
#[must_use]
pub fn transform_mesh(mesh: &IndexedMesh, transform: &SimilarityTransform) -> IndexedMesh {
    let mut result = mesh.clone();
    for v in &mut result.vertices {
        v.position = transform.transform_point(&v.position);
        if let Some(normal) = v.attributes.normal {
            v.attributes.normal = Some(transform.transform_direction(&normal));
        }
    }
    result
}

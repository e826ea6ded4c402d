//! Non-rigid template fitting.
//!
//! This crate deforms a template mesh onto a target mesh by giving every
//! template vertex its own affine transform (a 3x3 linear map plus a
//! translation) and minimizing a weighted energy:
//!
//! - **Data**: pulls each deformed vertex onto the tangent plane of its
//!   nearest target vertex
//! - **Regularization**: neighboring vertices should carry similar transforms
//! - **Rigidity**: each linear map should stay close to a rotation
//!
//! The regularization and rigidity weights start high and are halved after
//! every outer iteration, so the template first moves almost rigidly and
//! then relaxes to follow the target's detail.
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with zero Bevy dependencies.
//!
//! # Quick Start
//!
//! ```
//! use mesh_template_fit::{fit_template, FitParams};
//! use mesh_types::{IndexedMesh, Vertex};
//!
//! let mut template = IndexedMesh::new();
//! template.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
//! template.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
//! template.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
//! template.faces.push([0, 1, 2]);
//!
//! // Target sits half a unit above the template
//! let mut target = template.clone();
//! for v in &mut target.vertices {
//!     v.position.z += 0.5;
//! }
//!
//! let params = FitParams::new()
//!     .with_regularization_weight(1.0)
//!     .with_rigidity_weight(1.0);
//! let output = fit_template(&template, &target, &params)?;
//!
//! for (fitted, expected) in output.mesh.vertices.iter().zip(&target.vertices) {
//!     assert!((fitted.position - expected.position).norm() < 1e-3);
//! }
//! # Ok::<(), mesh_template_fit::FitError>(())
//! ```
//!
//! Templates that start far from the target can be pre-aligned from paired
//! landmarks with [`fit_template_with_landmarks`].
//!
//! # Determinism
//!
//! Per-vertex work runs on the rayon thread pool, but every vertex writes
//! only its own output slots and per-vertex energies are summed in index
//! order. Fitting the same inputs twice gives bit-identical results.

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod affine;
mod correspondence;
mod edges;
mod energy;
mod error;
mod fit;
mod normals;
mod params;
mod result;
pub mod solver;
mod spatial;

pub use affine::{AffineParams, PARAMS_PER_VERTEX};
pub use correspondence::{
    CorrespondenceThresholds, Correspondences, TargetSurface, normal_angle_degrees,
};
pub use edges::{Edge, EdgeSet};
pub use energy::{EnergyBreakdown, EnergyFunction, EnergyWeights, NEGLIGIBLE_WEIGHT};
pub use error::{FitError, FitResult};
pub use fit::{
    accept_step, fit_template, fit_template_from, fit_template_with, fit_template_with_landmarks,
};
pub use normals::{compute_vertex_normals, mesh_vertex_normals};
pub use params::{FitParams, SolverParams};
pub use result::{AlignedFitOutput, FitOutput, IterationReport};
pub use spatial::{Neighbor, SpatialIndex};

// Re-export the types that appear in this crate's signatures
pub use mesh_registration::{LandmarkParams, SimilarityTransform};
pub use mesh_types::IndexedMesh;

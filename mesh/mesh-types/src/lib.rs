//! Indexed triangle surfaces for template fitting.
//!
//! A surface is a list of [`Vertex`] values (position plus optional normal,
//! color and texture coordinates) and a list of triangles indexing into it.
//! The fitting crates only ever move positions and refresh normals; every
//! other attribute rides along unchanged.
//!
//! Fitting expects surfaces without degenerate triangles. Run
//! [`IndexedMesh::remove_degenerate_faces`] on loaded data first.
//!
//! Coordinates are plain `f64` with no unit attached.
//!
//! # Example
//!
//! ```
//! use mesh_types::{IndexedMesh, Point3, Vertex};
//!
//! let mut mesh = IndexedMesh::from_raw(
//!     &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
//!     &[0, 1, 2, 2, 2, 0],
//! );
//! mesh.vertices.push(Vertex::new(Point3::new(5.0, 5.0, 5.0)));
//! assert!(mesh.validate().is_ok());
//!
//! let report = mesh.remove_degenerate_faces();
//! assert_eq!(report.faces_removed, 1);
//! assert_eq!(report.vertices_removed, 1);
//! assert_eq!(mesh.face_count(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod mesh;
mod vertex;

pub use error::{MeshError, MeshResult};
pub use mesh::{CleanReport, IndexedMesh, is_degenerate_face};
pub use vertex::{Vertex, VertexAttributes, VertexColor};

pub use nalgebra::{Point3, Vector3};

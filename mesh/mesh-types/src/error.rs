//! Error types for surface validation.

use thiserror::Error;

/// Errors reported when a surface violates its structural invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum MeshError {
    /// A face references a vertex that does not exist.
    #[error("face {face} references vertex {index}, but the mesh has {vertex_count} vertices")]
    FaceIndexOutOfRange {
        /// Index of the offending face.
        face: usize,
        /// The out-of-range vertex index.
        index: u32,
        /// Number of vertices in the mesh.
        vertex_count: usize,
    },

    /// A position buffer does not match the vertex count of the mesh.
    #[error("expected {expected} positions, got {actual}")]
    PositionCountMismatch {
        /// Number of vertices in the mesh.
        expected: usize,
        /// Number of positions supplied.
        actual: usize,
    },
}

/// Result type for surface operations.
pub type MeshResult<T> = Result<T, MeshError>;

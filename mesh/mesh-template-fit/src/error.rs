//! Error types for template fitting.

use thiserror::Error;

/// Result type for template fitting operations.
pub type FitResult<T> = Result<T, FitError>;

/// Errors that can occur during template fitting.
///
/// Every variant is an input error detected before optimization starts.
/// Solver non-convergence is not an error: it is recorded per iteration in
/// [`IterationReport`](crate::IterationReport).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FitError {
    /// The template mesh has no vertices.
    #[error("template mesh has no vertices")]
    EmptyTemplate,

    /// The target mesh has no vertices.
    #[error("target mesh has no vertices")]
    EmptyTarget,

    /// A vertex position has a NaN or infinite coordinate.
    #[error("{mesh} vertex {index} has a non-finite coordinate")]
    NonFiniteVertex {
        /// Which input the vertex belongs to (`"template"` or `"target"`).
        mesh: &'static str,
        /// Index of the offending vertex.
        index: usize,
    },

    /// A mesh failed structural validation.
    #[error("invalid mesh: {0}")]
    Mesh(#[from] mesh_types::MeshError),

    /// Landmark pre-alignment failed.
    #[error("landmark alignment failed: {0}")]
    Registration(#[from] mesh_registration::RegistrationError),

    /// A fitting or solver parameter is out of range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Name of the offending parameter.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A parameter vector does not match the template's vertex count.
    #[error("parameter vector holds {actual} values, expected {expected}")]
    ParameterLength {
        /// Expected number of scalars (12 per vertex).
        expected: usize,
        /// Number of scalars supplied.
        actual: usize,
    },
}

impl FitError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

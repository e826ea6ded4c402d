//! Error types for landmark alignment.

use thiserror::Error;

/// Errors that can occur while estimating a similarity alignment.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum RegistrationError {
    /// The two landmark sets have different sizes.
    #[error("landmark sets differ in size: {source_count} source vs {target_count} target")]
    LandmarkCountMismatch {
        /// Number of source landmarks.
        source_count: usize,
        /// Number of target landmarks.
        target_count: usize,
    },

    /// Not enough landmarks provided for alignment.
    #[error("at least {required} landmarks required, got {provided}")]
    InsufficientLandmarks {
        /// Number of landmarks required.
        required: usize,
        /// Number of landmarks provided.
        provided: usize,
    },

    /// All landmarks of one set coincide, so no scale or rotation is defined.
    #[error("{0} landmarks have no spread around their centroid")]
    DegenerateLandmarks(&'static str),

    /// A landmark coordinate is NaN or infinite.
    #[error("landmark {index} has a non-finite coordinate")]
    NonFiniteLandmark {
        /// Index of the offending landmark.
        index: usize,
    },

    /// SVD computation failed during rotation estimation.
    #[error("SVD computation failed during rotation estimation")]
    SvdFailed,

    /// The best orthogonal fit is a reflection; no proper rotation exists.
    #[error("landmark sets are related by a reflection (determinant {determinant:.6})")]
    Reflection {
        /// Determinant of the orthogonal fit.
        determinant: f64,
    },
}

/// Result type for registration operations.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

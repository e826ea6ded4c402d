//! Landmark-based similarity alignment.
//!
//! Landmarks are paired points picked on the template and on the target.
//! The alignment found here is the optional pre-alignment step run before
//! non-rigid fitting.

use crate::procrustes::compute_similarity_transform;
use crate::{RegistrationError, RegistrationResult, SimilarityTransform};
use nalgebra::Point3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters for landmark-based alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LandmarkParams {
    /// Whether to estimate a uniform scale (default: true).
    ///
    /// Templates and scans commonly come in different units, so scale is
    /// estimated unless disabled.
    pub compute_scale: bool,
}

impl Default for LandmarkParams {
    fn default() -> Self {
        Self {
            compute_scale: true,
        }
    }
}

impl LandmarkParams {
    /// Creates new landmark parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables scale estimation.
    #[must_use]
    pub const fn with_scale(mut self, compute_scale: bool) -> Self {
        self.compute_scale = compute_scale;
        self
    }
}

/// Computes the similarity transform mapping source landmarks onto target landmarks.
///
/// Landmark `i` of `source` is paired with landmark `i` of `target`. At least
/// three non-collinear pairs are needed for a unique rotation.
///
/// # Errors
///
/// Returns an error if the sets differ in size, hold fewer than three
/// landmarks, contain non-finite coordinates, have no spread, or are related
/// only by a reflection.
///
/// # Example
///
/// ```
/// use mesh_registration::{align_by_landmarks, LandmarkParams};
/// use nalgebra::Point3;
///
/// let source = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
/// let target = vec![
///     Point3::new(10.0, 10.0, 0.0),
///     Point3::new(11.0, 10.0, 0.0),
///     Point3::new(10.0, 11.0, 0.0),
/// ];
///
/// let transform = align_by_landmarks(&source, &target, &LandmarkParams::default()).unwrap();
/// assert!((transform.scale - 1.0).abs() < 1e-9);
/// ```
pub fn align_by_landmarks(
    source: &[Point3<f64>],
    target: &[Point3<f64>],
    params: &LandmarkParams,
) -> RegistrationResult<SimilarityTransform> {
    compute_similarity_transform(source, target, params.compute_scale)
}

/// Measures how well `transform` maps `source` onto `target`.
///
/// Returns `(rms, max)` of the distances between transformed source points
/// and their paired target points. Empty sets give `(0.0, 0.0)`.
///
/// # Errors
///
/// Returns [`RegistrationError::LandmarkCountMismatch`] if the sets differ in size.
pub fn compute_alignment_error(
    source: &[Point3<f64>],
    target: &[Point3<f64>],
    transform: &SimilarityTransform,
) -> RegistrationResult<(f64, f64)> {
    if source.len() != target.len() {
        return Err(RegistrationError::LandmarkCountMismatch {
            source_count: source.len(),
            target_count: target.len(),
        });
    }
    if source.is_empty() {
        return Ok((0.0, 0.0));
    }

    let (sum_sq, max) = source
        .iter()
        .zip(target)
        .map(|(s, t)| (transform.transform_point(s) - t).norm())
        .fold((0.0_f64, 0.0_f64), |(sum, max), d| (d.mul_add(d, sum), max.max(d)));

    #[allow(clippy::cast_precision_loss)]
    let rms = (sum_sq / source.len() as f64).sqrt();
    Ok((rms, max))
}

//! Similarity Procrustes fit between paired point sets.
//!
//! Finds `s`, `R`, `t` minimizing `Σ ‖s·R·pᵢ + t − qᵢ‖²` over proper
//! rotations. The scale is the ratio of RMS spreads around the centroids,
//! the rotation comes from the SVD of the cross-covariance, and the
//! translation is `t = c_target − s·R·c_source`.

use crate::{RegistrationError, RegistrationResult, SimilarityTransform};
use nalgebra::{Matrix3, Point3, Rotation3, Vector3};
use tracing::debug;

/// Minimum number of paired points for a unique similarity fit.
pub const MIN_POINT_PAIRS: usize = 3;

/// Relative size below which the weakest singular value counts as zero.
///
/// With a rank-deficient cross-covariance (coplanar or collinear input) a
/// proper rotation and a reflection fit equally well, so the proper one is
/// taken instead of reporting a reflection.
const RANK_TOLERANCE: f64 = 1e-9;

/// Computes the similarity transform mapping `source_points` onto `target_points`.
///
/// # Arguments
///
/// * `source_points` - Points to be transformed
/// * `target_points` - Paired target points, same length as `source_points`
/// * `compute_scale` - If false, the scale is fixed at 1
///
/// # Errors
///
/// Returns an error if:
/// - The point sets differ in length
/// - Fewer than [`MIN_POINT_PAIRS`] pairs are given
/// - A coordinate is not finite
/// - Either set has zero spread
/// - SVD fails
/// - The only orthogonal fit is a reflection
///
/// # Example
///
/// ```
/// use mesh_registration::compute_similarity_transform;
/// use nalgebra::Point3;
///
/// let source = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
/// let target: Vec<_> = source
///     .iter()
///     .map(|p| Point3::new(2.0 * p.x + 1.0, 2.0 * p.y, 2.0 * p.z))
///     .collect();
///
/// let transform = compute_similarity_transform(&source, &target, true).unwrap();
/// assert!((transform.scale - 2.0).abs() < 1e-9);
/// ```
pub fn compute_similarity_transform(
    source_points: &[Point3<f64>],
    target_points: &[Point3<f64>],
    compute_scale: bool,
) -> RegistrationResult<SimilarityTransform> {
    if source_points.len() != target_points.len() {
        return Err(RegistrationError::LandmarkCountMismatch {
            source_count: source_points.len(),
            target_count: target_points.len(),
        });
    }
    if source_points.len() < MIN_POINT_PAIRS {
        return Err(RegistrationError::InsufficientLandmarks {
            required: MIN_POINT_PAIRS,
            provided: source_points.len(),
        });
    }
    if let Some(index) = source_points
        .iter()
        .zip(target_points)
        .position(|(s, t)| !(s.coords.iter().all(|c| c.is_finite()) && t.coords.iter().all(|c| c.is_finite())))
    {
        return Err(RegistrationError::NonFiniteLandmark { index });
    }

    let source_centroid = compute_centroid(source_points);
    let target_centroid = compute_centroid(target_points);

    let source_centered: Vec<Vector3<f64>> = source_points
        .iter()
        .map(|p| p.coords - source_centroid)
        .collect();
    let target_centered: Vec<Vector3<f64>> = target_points
        .iter()
        .map(|p| p.coords - target_centroid)
        .collect();

    let source_spread = rms_spread(&source_centered);
    let target_spread = rms_spread(&target_centered);
    if source_spread <= f64::EPSILON {
        return Err(RegistrationError::DegenerateLandmarks("source"));
    }
    if target_spread <= f64::EPSILON {
        return Err(RegistrationError::DegenerateLandmarks("target"));
    }

    let scale = if compute_scale {
        target_spread / source_spread
    } else {
        1.0
    };

    let rotation = compute_rotation(&source_centered, &target_centered)?;

    let translation = target_centroid - scale * (rotation * source_centroid);

    debug!(
        scale,
        angle = rotation.angle(),
        translation_norm = translation.norm(),
        "similarity transform estimated"
    );

    Ok(SimilarityTransform::new(scale, rotation, translation))
}

/// Computes the proper rotation best aligning centered source onto centered target.
fn compute_rotation(
    source_centered: &[Vector3<f64>],
    target_centered: &[Vector3<f64>],
) -> RegistrationResult<Rotation3<f64>> {
    // H = Σ sᵢ tᵢᵀ
    let mut h = Matrix3::zeros();
    for (s, t) in source_centered.iter().zip(target_centered) {
        h += s * t.transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u.ok_or(RegistrationError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(RegistrationError::SvdFailed)?;

    // R = V Uᵀ
    let mut rotation_matrix = v_t.transpose() * u.transpose();
    let determinant = rotation_matrix.determinant();

    if determinant < 0.0 {
        let sigma = svd.singular_values;
        let (weakest, _) = sigma.argmin();
        if sigma[weakest] > RANK_TOLERANCE * sigma.max() {
            return Err(RegistrationError::Reflection { determinant });
        }

        // Flip the singular direction that carries no information
        let mut v = v_t.transpose();
        for i in 0..3 {
            v[(i, weakest)] = -v[(i, weakest)];
        }
        rotation_matrix = v * u.transpose();
    }

    Ok(Rotation3::from_matrix_unchecked(rotation_matrix))
}

/// Computes the centroid of a set of points.
fn compute_centroid(points: &[Point3<f64>]) -> Vector3<f64> {
    #[allow(clippy::cast_precision_loss)]
    let n = points.len() as f64;
    let sum: Vector3<f64> = points.iter().map(|p| p.coords).sum();
    sum / n
}

/// Root-mean-square distance of centered points from the origin.
fn rms_spread(centered: &[Vector3<f64>]) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let n = centered.len() as f64;
    (centered.iter().map(Vector3::norm_squared).sum::<f64>() / n).sqrt()
}

//! Similarity transformation type for alignment results.

use nalgebra::{Matrix4, Point3, Rotation3, Vector3};

/// A similarity transformation `x ↦ s·R·x + t`.
///
/// `rotation` is always a proper rotation (orthogonal, determinant +1) and
/// `scale` is strictly positive when produced by this crate.
///
/// # Example
///
/// ```
/// use mesh_registration::SimilarityTransform;
/// use nalgebra::{Point3, Rotation3, Vector3};
/// use std::f64::consts::FRAC_PI_2;
///
/// let transform = SimilarityTransform::new(
///     2.0,
///     Rotation3::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2),
///     Vector3::new(1.0, 0.0, 0.0),
/// );
///
/// let p = transform.transform_point(&Point3::new(1.0, 0.0, 0.0));
/// assert!((p - Point3::new(1.0, 2.0, 0.0)).norm() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform {
    /// Uniform scale factor.
    pub scale: f64,
    /// Proper rotation.
    pub rotation: Rotation3<f64>,
    /// Translation applied after scaling and rotating.
    pub translation: Vector3<f64>,
}

impl Default for SimilarityTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl SimilarityTransform {
    /// Creates a transform from its three components.
    #[must_use]
    pub const fn new(scale: f64, rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            scale,
            rotation,
            translation,
        }
    }

    /// Creates an identity transform.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            rotation: Rotation3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Creates a transform with only translation.
    #[must_use]
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    /// Transforms a 3D point: scale, then rotate, then translate.
    #[must_use]
    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * (point.coords * self.scale) + self.translation)
    }

    /// Transforms a direction. Directions are rotated only.
    #[must_use]
    pub fn transform_direction(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * vector
    }

    /// Computes the inverse transform.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let inv_scale = 1.0 / self.scale;
        let inv_rotation = self.rotation.inverse();
        Self {
            scale: inv_scale,
            rotation: inv_rotation,
            translation: inv_rotation * (-self.translation * inv_scale),
        }
    }

    /// Converts to a 4x4 homogeneous matrix.
    #[must_use]
    pub fn to_matrix4(&self) -> Matrix4<f64> {
        let mut mat = Matrix4::identity();
        mat.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(self.rotation.matrix() * self.scale));
        mat.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        mat
    }

    /// Returns true if this transform is approximately the identity.
    #[must_use]
    pub fn is_identity(&self, epsilon: f64) -> bool {
        self.rotation.angle().abs() < epsilon
            && self.translation.norm() < epsilon
            && (self.scale - 1.0).abs() < epsilon
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn identity_leaves_points() {
        let point = Point3::new(1.0, 2.0, 3.0);
        let result = SimilarityTransform::identity().transform_point(&point);
        assert_relative_eq!(result.coords, point.coords, epsilon = 1e-12);
    }

    #[test]
    fn order_is_scale_rotate_translate() {
        let transform = SimilarityTransform::new(
            3.0,
            Rotation3::from_axis_angle(&Vector3::z_axis(), PI / 2.0),
            Vector3::new(0.0, 0.0, 1.0),
        );
        let result = transform.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(result.coords, Vector3::new(0.0, 3.0, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn inverse_round_trips() {
        let transform = SimilarityTransform::new(
            1.5,
            Rotation3::from_axis_angle(&Vector3::y_axis(), 0.7),
            Vector3::new(1.0, -2.0, 3.0),
        );
        let point = Point3::new(0.3, 0.2, -4.0);
        let back = transform
            .inverse()
            .transform_point(&transform.transform_point(&point));
        assert_relative_eq!(back.coords, point.coords, epsilon = 1e-10);
    }

    #[test]
    fn directions_ignore_scale_and_translation() {
        let transform = SimilarityTransform::new(
            5.0,
            Rotation3::from_axis_angle(&Vector3::z_axis(), PI / 2.0),
            Vector3::new(100.0, 100.0, 100.0),
        );
        let result = transform.transform_direction(&Vector3::x());
        assert_relative_eq!(result, Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn matrix_matches_point_transform() {
        let transform = SimilarityTransform::new(
            2.0,
            Rotation3::from_axis_angle(&Vector3::x_axis(), 0.3),
            Vector3::new(1.0, 2.0, 3.0),
        );
        let point = Point3::new(-1.0, 0.5, 2.0);
        let expected = transform.transform_point(&point);
        let mat = transform.to_matrix4();
        let homogeneous = mat * point.to_homogeneous();
        assert_relative_eq!(homogeneous.xyz(), expected.coords, epsilon = 1e-12);
        assert_relative_eq!(homogeneous.w, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn is_identity_respects_tolerance() {
        assert!(SimilarityTransform::identity().is_identity(1e-10));
        let shifted = SimilarityTransform::from_translation(Vector3::new(0.001, 0.0, 0.0));
        assert!(!shifted.is_identity(1e-10));
        assert!(shifted.is_identity(0.01));
        assert_eq!(SimilarityTransform::default(), SimilarityTransform::identity());
    }
}

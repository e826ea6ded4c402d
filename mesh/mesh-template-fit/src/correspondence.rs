//! Point-to-plane correspondence search.
//!
//! Every deformed template vertex is matched to its nearest target vertex.
//! The match is kept when it is close enough and the two normals agree,
//! and the correspondence point is the template vertex projected onto the
//! target vertex's tangent plane.

use crate::normals::compute_vertex_normals;
use crate::{FitError, FitResult, SpatialIndex};
use mesh_types::IndexedMesh;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

/// Distance and angle gates applied to each candidate match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrespondenceThresholds {
    /// Largest accepted distance to the nearest target vertex.
    pub max_distance: f64,
    /// Largest accepted normal deviation in degrees.
    pub max_angle_degrees: f64,
}

impl CorrespondenceThresholds {
    /// Creates thresholds from a distance and an angle in degrees.
    #[must_use]
    pub const fn new(max_distance: f64, max_angle_degrees: f64) -> Self {
        Self {
            max_distance,
            max_angle_degrees,
        }
    }
}

/// Angle between two normals, in degrees, saturating at 90.
///
/// The cosine is clamped to `[0, 1]`, so any pair facing away from each
/// other (including a normal and its negation) reads as 90°. Back-facing
/// matches therefore fail every angle gate below a right angle. Returns
/// `None` when either vector has zero length, since such a vertex has no
/// reliable orientation.
///
/// # Example
///
/// ```
/// use mesh_template_fit::normal_angle_degrees;
/// use nalgebra::Vector3;
///
/// let n = Vector3::new(0.0, 0.0, 1.0);
/// assert_eq!(normal_angle_degrees(&n, &n), Some(0.0));
/// assert_eq!(normal_angle_degrees(&n, &-n), Some(90.0));
/// assert_eq!(normal_angle_degrees(&n, &Vector3::zeros()), None);
/// ```
#[must_use]
pub fn normal_angle_degrees(a: &Vector3<f64>, b: &Vector3<f64>) -> Option<f64> {
    let denom = a.norm() * b.norm();
    if denom <= 0.0 || !denom.is_finite() {
        return None;
    }
    let cos = (a.dot(b) / denom).clamp(0.0, 1.0);
    if cos.is_nan() {
        return None;
    }
    Some(cos.acos().to_degrees())
}

/// Result of one correspondence pass.
///
/// `targets[i]` is meaningful only when `valid[i]` is true. For rejected
/// vertices it holds the vertex's own position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correspondences {
    /// Whether vertex `i` found an acceptable match.
    pub valid: Vec<bool>,
    /// Correspondence point for vertex `i`.
    pub targets: Vec<Point3<f64>>,
}

impl Correspondences {
    /// Number of vertices covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.valid.len()
    }

    /// Returns true if no vertex is covered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }

    /// Number of accepted correspondences.
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    /// Correspondences where every vertex is matched to itself.
    ///
    /// Useful for evaluating the energy of a surface against its own shape.
    #[must_use]
    pub fn identity(positions: &[Point3<f64>]) -> Self {
        Self {
            valid: vec![true; positions.len()],
            targets: positions.to_vec(),
        }
    }
}

/// Static data about the target surface, built once per fit.
#[derive(Debug)]
pub struct TargetSurface {
    positions: Vec<Point3<f64>>,
    normals: Vec<Vector3<f64>>,
    index: SpatialIndex,
}

impl TargetSurface {
    /// Indexes the target mesh and estimates its vertex normals.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::EmptyTarget`] for a mesh without vertices,
    /// [`FitError::NonFiniteVertex`] for NaN or infinite coordinates, or
    /// [`FitError::Mesh`] if a face index is out of range.
    pub fn new(mesh: &IndexedMesh) -> FitResult<Self> {
        if mesh.vertices.is_empty() {
            return Err(FitError::EmptyTarget);
        }
        mesh.validate()?;

        let positions = mesh.positions();
        let index = SpatialIndex::new(&positions)?;
        let normals = compute_vertex_normals(&positions, &mesh.faces);

        Ok(Self {
            positions,
            normals,
            index,
        })
    }

    /// Target vertex positions.
    #[must_use]
    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    /// Target vertex normals (zero where undefined).
    #[must_use]
    pub fn normals(&self) -> &[Vector3<f64>] {
        &self.normals
    }

    /// Nearest-neighbor index over the target vertices.
    #[must_use]
    pub const fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// Matches each source vertex against the target.
    ///
    /// `source_normals` must have one entry per source position; missing
    /// entries are treated as zero normals and the vertex is rejected.
    #[must_use]
    pub fn find_correspondences(
        &self,
        source_positions: &[Point3<f64>],
        source_normals: &[Vector3<f64>],
        thresholds: CorrespondenceThresholds,
    ) -> Correspondences {
        let (valid, targets): (Vec<bool>, Vec<Point3<f64>>) = source_positions
            .par_iter()
            .enumerate()
            .map(|(i, v)| {
                let n_v = source_normals.get(i).copied().unwrap_or_else(Vector3::zeros);
                self.match_vertex(v, &n_v, thresholds)
                    .map_or((false, *v), |c| (true, c))
            })
            .unzip();

        Correspondences { valid, targets }
    }

    fn match_vertex(
        &self,
        v: &Point3<f64>,
        n_v: &Vector3<f64>,
        thresholds: CorrespondenceThresholds,
    ) -> Option<Point3<f64>> {
        let hit = self.index.nearest(v);
        if hit.distance() > thresholds.max_distance {
            return None;
        }

        let p = self.positions[hit.index];
        let n_p = self.normals[hit.index];
        let angle = normal_angle_degrees(n_v, &n_p)?;
        if angle > thresholds.max_angle_degrees {
            return None;
        }

        Some(v + n_p * (p - v).dot(&n_p))
    }
}

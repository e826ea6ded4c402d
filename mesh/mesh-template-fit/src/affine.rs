//! Per-vertex affine deformation parameters.
//!
//! Vertex `i` owns the twelve scalars `values[12 i .. 12 i + 12]`. The first
//! nine are the columns of its 3x3 linear map, the last three its
//! translation:
//!
//! ```text
//! x' = p0·x + p3·y + p6·z + p9
//! y' = p1·x + p4·y + p7·z + p10
//! z' = p2·x + p5·y + p8·z + p11
//! ```

use crate::{FitError, FitResult};
use nalgebra::{Matrix3, Point3, Vector3};
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of scalars per vertex.
pub const PARAMS_PER_VERTEX: usize = 12;

const IDENTITY_BLOCK: [f64; PARAMS_PER_VERTEX] =
    [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0];

/// Flat arena of per-vertex affine transforms.
///
/// # Example
///
/// ```
/// use mesh_template_fit::AffineParams;
/// use nalgebra::{Matrix3, Point3, Vector3};
///
/// let mut params = AffineParams::identity(2);
/// params.set_vertex(1, &Matrix3::identity(), &Vector3::new(0.0, 0.0, 3.0));
///
/// let moved = params.apply(&[Point3::origin(), Point3::origin()]);
/// assert_eq!(moved[0], Point3::origin());
/// assert_eq!(moved[1], Point3::new(0.0, 0.0, 3.0));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AffineParams {
    values: Vec<f64>,
}

impl AffineParams {
    /// Identity deformation for `vertex_count` vertices.
    #[must_use]
    pub fn identity(vertex_count: usize) -> Self {
        Self {
            values: IDENTITY_BLOCK.repeat(vertex_count),
        }
    }

    /// Wraps a flat parameter vector.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::ParameterLength`] if the length is not a multiple of 12.
    pub fn from_vec(values: Vec<f64>) -> FitResult<Self> {
        if values.len() % PARAMS_PER_VERTEX != 0 {
            return Err(FitError::ParameterLength {
                expected: values.len() / PARAMS_PER_VERTEX * PARAMS_PER_VERTEX,
                actual: values.len(),
            });
        }
        Ok(Self { values })
    }

    /// Number of vertices described.
    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.values.len() / PARAMS_PER_VERTEX
    }

    /// Flat view of all parameters.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Mutable flat view of all parameters.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Consumes the arena, returning the flat vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<f64> {
        self.values
    }

    /// The twelve parameters of vertex `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    #[inline]
    #[must_use]
    pub fn block(&self, i: usize) -> &[f64] {
        &self.values[i * PARAMS_PER_VERTEX..(i + 1) * PARAMS_PER_VERTEX]
    }

    /// Linear part of vertex `i`'s transform.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    #[must_use]
    pub fn linear(&self, i: usize) -> Matrix3<f64> {
        Matrix3::from_column_slice(&self.block(i)[..9])
    }

    /// Translation of vertex `i`'s transform.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    #[must_use]
    pub fn translation(&self, i: usize) -> Vector3<f64> {
        Vector3::from_column_slice(&self.block(i)[9..])
    }

    /// Overwrites vertex `i`'s transform.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    pub fn set_vertex(&mut self, i: usize, linear: &Matrix3<f64>, translation: &Vector3<f64>) {
        let block = &mut self.values[i * PARAMS_PER_VERTEX..(i + 1) * PARAMS_PER_VERTEX];
        block[..9].copy_from_slice(linear.as_slice());
        block[9..].copy_from_slice(translation.as_slice());
    }

    /// Applies each vertex's transform to the matching point.
    ///
    /// Points beyond the arena's vertex count are dropped.
    #[must_use]
    pub fn apply(&self, points: &[Point3<f64>]) -> Vec<Point3<f64>> {
        points
            .par_iter()
            .zip(self.values.par_chunks_exact(PARAMS_PER_VERTEX))
            .map(|(p, block)| transform_point(block, p))
            .collect()
    }

    /// Largest absolute deviation of any parameter from the identity.
    #[must_use]
    pub fn max_deviation_from_identity(&self) -> f64 {
        self.values
            .chunks_exact(PARAMS_PER_VERTEX)
            .flat_map(|block| block.iter().zip(IDENTITY_BLOCK.iter()).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max)
    }
}

/// Applies one twelve-parameter block to a point.
#[inline]
pub(crate) fn transform_point(block: &[f64], p: &Point3<f64>) -> Point3<f64> {
    Point3::new(
        block[0] * p.x + block[3] * p.y + block[6] * p.z + block[9],
        block[1] * p.x + block[4] * p.y + block[7] * p.z + block[10],
        block[2] * p.x + block[5] * p.y + block[8] * p.z + block[11],
    )
}

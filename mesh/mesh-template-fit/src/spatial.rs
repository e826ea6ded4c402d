//! Exact nearest-neighbor queries over a fixed point set.

use crate::{FitError, FitResult};
use kiddo::{ImmutableKdTree, SquaredEuclidean};
use nalgebra::Point3;
use std::cmp::Ordering;

/// A neighbor returned by [`SpatialIndex`] queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the point in the indexed set.
    pub index: usize,
    /// Squared Euclidean distance to the query.
    pub distance_squared: f64,
}

impl Neighbor {
    /// Euclidean distance to the query.
    #[inline]
    #[must_use]
    pub fn distance(&self) -> f64 {
        self.distance_squared.sqrt()
    }

    fn from_hit(item: u64, distance_squared: f64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let index = item as usize;
        Self {
            index,
            distance_squared,
        }
    }

    fn cmp_by_distance_then_index(&self, other: &Self) -> Ordering {
        self.distance_squared
            .total_cmp(&other.distance_squared)
            .then(self.index.cmp(&other.index))
    }
}

/// KD-tree over the target vertices.
///
/// Queries are exact. When several points are equally near, the one with
/// the smallest index wins, so repeated runs give identical answers. The
/// tree is built once in balanced form and never modified, so any number of
/// points may share a coordinate, as on a planar target. It can be shared
/// across threads.
///
/// # Example
///
/// ```
/// use mesh_template_fit::SpatialIndex;
/// use nalgebra::Point3;
///
/// let points = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 2.0, 0.0),
/// ];
/// let index = SpatialIndex::new(&points).unwrap();
///
/// let hit = index.nearest(&Point3::new(0.9, 0.1, 0.0));
/// assert_eq!(hit.index, 1);
/// ```
pub struct SpatialIndex {
    tree: ImmutableKdTree<f64, 3>,
    len: usize,
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex").field("len", &self.len).finish()
    }
}

impl SpatialIndex {
    /// Builds an index over `points`.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::EmptyTarget`] if `points` is empty, or
    /// [`FitError::NonFiniteVertex`] if a coordinate is NaN or infinite.
    pub fn new(points: &[Point3<f64>]) -> FitResult<Self> {
        if points.is_empty() {
            return Err(FitError::EmptyTarget);
        }

        if let Some(index) = points
            .iter()
            .position(|p| !p.coords.iter().all(|c| c.is_finite()))
        {
            return Err(FitError::NonFiniteVertex {
                mesh: "target",
                index,
            });
        }

        // Item ids are slice positions.
        let coords: Vec<[f64; 3]> = points.iter().map(|p| [p.x, p.y, p.z]).collect();
        let tree = ImmutableKdTree::new_from_slice(&coords);

        Ok(Self {
            tree,
            len: points.len(),
        })
    }

    /// Number of indexed points.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Always false: construction rejects empty point sets.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Finds the nearest indexed point to `query`.
    #[must_use]
    pub fn nearest(&self, query: &Point3<f64>) -> Neighbor {
        let q = [query.x, query.y, query.z];
        let hit = self.tree.nearest_one::<SquaredEuclidean>(&q);
        let best = Neighbor::from_hit(hit.item, hit.distance);

        self.ties_within(&q, best.distance_squared)
            .into_iter()
            .min_by(Neighbor::cmp_by_distance_then_index)
            .unwrap_or(best)
    }

    /// Finds the `k` nearest indexed points, ordered by ascending distance
    /// and then by index.
    ///
    /// Returns fewer than `k` entries only when fewer points are indexed.
    #[must_use]
    pub fn k_nearest(&self, query: &Point3<f64>, k: usize) -> Vec<Neighbor> {
        let k = k.min(self.len);
        if k == 0 {
            return Vec::new();
        }

        let q = [query.x, query.y, query.z];
        let hits = self.tree.nearest_n::<SquaredEuclidean>(&q, k);
        let radius = hits
            .iter()
            .map(|h| h.distance)
            .fold(0.0_f64, f64::max);

        let mut result = self.ties_within(&q, radius);
        if result.len() < k {
            // Non-finite queries leave the radius search empty.
            result = hits
                .into_iter()
                .map(|h| Neighbor::from_hit(h.item, h.distance))
                .collect();
        }
        result.sort_by(Neighbor::cmp_by_distance_then_index);
        result.truncate(k);
        result
    }

    /// Every point whose squared distance does not exceed `radius_squared`.
    fn ties_within(&self, query: &[f64; 3], radius_squared: f64) -> Vec<Neighbor> {
        let slack = radius_squared.abs().mul_add(1e-12, f64::MIN_POSITIVE);
        self.tree
            .within_unsorted::<SquaredEuclidean>(query, radius_squared + slack)
            .into_iter()
            .filter(|h| h.distance <= radius_squared)
            .map(|h| Neighbor::from_hit(h.item, h.distance))
            .collect()
    }
}

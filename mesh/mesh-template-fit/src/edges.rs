//! Regularization graph built from template connectivity.
//!
//! The edge list is the canonical form (unique `(min, max)` pairs, sorted).
//! A compressed neighbor table is kept alongside so per-vertex work can run
//! in parallel with each vertex owning its own output slot.

use hashbrown::HashSet;
use mesh_types::is_degenerate_face;

/// Undirected edge between two vertices, stored as `(min, max)`.
pub type Edge = (u32, u32);

/// Unique undirected edges of a mesh plus a per-vertex neighbor table.
///
/// # Example
///
/// ```
/// use mesh_template_fit::EdgeSet;
///
/// let edges = EdgeSet::from_faces(4, &[[0, 1, 2], [2, 1, 3]]);
/// assert_eq!(edges.len(), 5);
/// assert_eq!(edges.neighbors(1), &[0, 2, 3]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeSet {
    edges: Vec<Edge>,
    /// `offsets[v]..offsets[v + 1]` indexes `neighbors` for vertex `v`.
    offsets: Vec<usize>,
    neighbors: Vec<u32>,
}

/// Canonical orientation of an edge.
#[inline]
const fn normalize_edge(a: u32, b: u32) -> Edge {
    if a < b { (a, b) } else { (b, a) }
}

impl EdgeSet {
    /// Builds the edge set of a triangle list over `vertex_count` vertices.
    ///
    /// Degenerate faces (fewer than three distinct indices) contribute no
    /// edges. Faces are expected to be validated; edges touching an index at
    /// or beyond `vertex_count` are dropped.
    #[must_use]
    pub fn from_faces(vertex_count: usize, faces: &[[u32; 3]]) -> Self {
        let face_edges = faces
            .iter()
            .filter(|&&face| !is_degenerate_face(face))
            .flat_map(|&[a, b, c]| [(a, b), (b, c), (c, a)]);
        Self::from_edges(vertex_count, face_edges)
    }

    /// Builds an edge set from explicit vertex pairs.
    ///
    /// Pairs are canonicalized to `(min, max)` and deduplicated. Self-edges
    /// and edges touching an index at or beyond `vertex_count` are dropped.
    #[must_use]
    pub fn from_edges(vertex_count: usize, pairs: impl IntoIterator<Item = Edge>) -> Self {
        let unique: HashSet<Edge> = pairs
            .into_iter()
            .filter(|&(a, b)| a != b)
            .map(|(a, b)| normalize_edge(a, b))
            .filter(|&(_, b)| (b as usize) < vertex_count)
            .collect();

        let mut edges: Vec<Edge> = unique.into_iter().collect();
        edges.sort_unstable();

        let mut degree = vec![0_usize; vertex_count];
        for &(a, b) in &edges {
            degree[a as usize] += 1;
            degree[b as usize] += 1;
        }

        let mut offsets = Vec::with_capacity(vertex_count + 1);
        offsets.push(0);
        for d in &degree {
            let last = offsets.last().copied().unwrap_or(0);
            offsets.push(last + d);
        }

        let mut cursor: Vec<usize> = offsets[..vertex_count].to_vec();
        let mut neighbors = vec![0_u32; edges.len() * 2];
        for &(a, b) in &edges {
            neighbors[cursor[a as usize]] = b;
            cursor[a as usize] += 1;
            neighbors[cursor[b as usize]] = a;
            cursor[b as usize] += 1;
        }
        for v in 0..vertex_count {
            neighbors[offsets[v]..offsets[v + 1]].sort_unstable();
        }

        Self {
            edges,
            offsets,
            neighbors,
        }
    }

    /// Sorted unique edges.
    #[inline]
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Number of unique edges.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns true if there are no edges.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Number of vertices the neighbor table covers.
    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Sorted neighbors of `vertex`; empty for isolated or unknown vertices.
    #[must_use]
    pub fn neighbors(&self, vertex: usize) -> &[u32] {
        match (self.offsets.get(vertex), self.offsets.get(vertex + 1)) {
            (Some(&start), Some(&end)) => &self.neighbors[start..end],
            _ => &[],
        }
    }

    /// Number of edges incident to `vertex`.
    #[must_use]
    pub fn degree(&self, vertex: usize) -> usize {
        self.neighbors(vertex).len()
    }
}

//! Indexed triangle surface.

use crate::{MeshError, MeshResult, Vertex};
use nalgebra::Point3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An indexed triangle surface.
///
/// Stores vertices and faces separately, with faces referencing vertices by
/// index. Faces keep the winding they were loaded with; nothing in this
/// crate reorders them.
///
/// # Example
///
/// ```
/// use mesh_types::{IndexedMesh, Vertex};
///
/// let mut mesh = IndexedMesh::new();
/// mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
/// mesh.faces.push([0, 1, 2]);
///
/// assert_eq!(mesh.vertex_count(), 3);
/// assert_eq!(mesh.face_count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IndexedMesh {
    /// Vertex data.
    pub vertices: Vec<Vertex>,

    /// Triangle faces as indices into the vertex array.
    pub faces: Vec<[u32; 3]>,
}

/// Summary of a [`IndexedMesh::remove_degenerate_faces`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Faces dropped because they had fewer than three distinct vertices.
    pub faces_removed: usize,
    /// Vertices dropped because no remaining face referenced them.
    pub vertices_removed: usize,
}

impl CleanReport {
    /// Returns true if the pass changed nothing.
    #[must_use]
    pub const fn is_unchanged(&self) -> bool {
        self.faces_removed == 0 && self.vertices_removed == 0
    }
}

/// Returns true if a face has fewer than three pairwise-distinct indices.
///
/// # Example
///
/// ```
/// use mesh_types::is_degenerate_face;
///
/// assert!(!is_degenerate_face([0, 1, 2]));
/// assert!(is_degenerate_face([4, 4, 2]));
/// ```
#[inline]
#[must_use]
pub const fn is_degenerate_face(face: [u32; 3]) -> bool {
    face[0] == face[1] || face[1] == face[2] || face[0] == face[2]
}

impl IndexedMesh {
    /// Create a new empty mesh.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
        }
    }

    /// Create a mesh from a flat coordinate buffer and a flat index buffer.
    ///
    /// * `positions` - `[x0, y0, z0, x1, y1, z1, ...]`
    /// * `indices` - `[a0, b0, c0, a1, b1, c1, ...]`
    ///
    /// Returns an empty mesh if either buffer length is not a multiple of 3.
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_types::IndexedMesh;
    ///
    /// let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    /// let mesh = IndexedMesh::from_raw(&positions, &[0, 1, 2]);
    /// assert_eq!(mesh.vertex_count(), 3);
    /// ```
    #[must_use]
    pub fn from_raw(positions: &[f64], indices: &[u32]) -> Self {
        if positions.len() % 3 != 0 || indices.len() % 3 != 0 {
            return Self::new();
        }

        let vertices = positions
            .chunks_exact(3)
            .map(|c| Vertex::from_coords(c[0], c[1], c[2]))
            .collect();

        let faces = indices
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();

        Self { vertices, faces }
    }

    /// Number of vertices.
    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of faces, degenerate ones included.
    #[inline]
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Returns true if the mesh has no vertices or no faces.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Collect vertex positions in index order.
    #[must_use]
    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.vertices.iter().map(|v| v.position).collect()
    }

    /// Return a copy of this mesh with every vertex moved to `positions`.
    ///
    /// Faces and all attributes other than position are kept.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::PositionCountMismatch`] if `positions` does not
    /// have one entry per vertex.
    pub fn with_positions(&self, positions: &[Point3<f64>]) -> MeshResult<Self> {
        if positions.len() != self.vertices.len() {
            return Err(MeshError::PositionCountMismatch {
                expected: self.vertices.len(),
                actual: positions.len(),
            });
        }

        let mut result = self.clone();
        for (vertex, position) in result.vertices.iter_mut().zip(positions) {
            vertex.position = *position;
        }
        Ok(result)
    }

    /// Check that every face index refers to an existing vertex.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::FaceIndexOutOfRange`] for the first bad index.
    pub fn validate(&self) -> MeshResult<()> {
        let vertex_count = self.vertices.len();
        for (face_idx, face) in self.faces.iter().enumerate() {
            if let Some(&index) = face.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(MeshError::FaceIndexOutOfRange {
                    face: face_idx,
                    index,
                    vertex_count,
                });
            }
        }
        Ok(())
    }

    /// Count faces with fewer than three distinct vertex indices.
    #[must_use]
    pub fn degenerate_face_count(&self) -> usize {
        self.faces
            .iter()
            .filter(|&&f| is_degenerate_face(f))
            .count()
    }

    /// Iterate over the faces that are not degenerate.
    pub fn proper_faces(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.faces.iter().copied().filter(|&f| !is_degenerate_face(f))
    }

    /// Remove degenerate faces and the vertices only they referenced.
    ///
    /// Remaining faces are re-indexed into the compacted vertex array. Vertex
    /// attributes travel with their vertex. Call [`validate`](Self::validate)
    /// first; out-of-range indices are treated as unreferenced.
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_types::{IndexedMesh, Vertex};
    ///
    /// let mut mesh = IndexedMesh::new();
    /// for i in 0..4 {
    ///     mesh.vertices.push(Vertex::from_coords(f64::from(i), 0.0, 0.0));
    /// }
    /// mesh.faces.push([0, 1, 2]);
    /// mesh.faces.push([3, 3, 1]);
    ///
    /// let report = mesh.remove_degenerate_faces();
    /// assert_eq!(report.faces_removed, 1);
    /// assert_eq!(report.vertices_removed, 1);
    /// assert_eq!(mesh.vertex_count(), 3);
    /// ```
    #[allow(clippy::cast_possible_truncation)]
    // Truncation: compacted indices are bounded by the original u32 indices
    pub fn remove_degenerate_faces(&mut self) -> CleanReport {
        let vertex_count = self.vertices.len();
        let face_count = self.faces.len();

        let mut referenced = vec![false; vertex_count];
        for face in self.proper_faces() {
            for &i in &face {
                if let Some(flag) = referenced.get_mut(i as usize) {
                    *flag = true;
                }
            }
        }

        let mut remap: Vec<Option<u32>> = Vec::with_capacity(vertex_count);
        let mut next = 0u32;
        for &keep in &referenced {
            if keep {
                remap.push(Some(next));
                next += 1;
            } else {
                remap.push(None);
            }
        }

        let faces: Vec<[u32; 3]> = self
            .proper_faces()
            .filter_map(|[a, b, c]| {
                let map = |i: u32| remap.get(i as usize).copied().flatten();
                Some([map(a)?, map(b)?, map(c)?])
            })
            .collect();

        let vertices: Vec<Vertex> = std::mem::take(&mut self.vertices)
            .into_iter()
            .zip(&referenced)
            .filter_map(|(v, &keep)| keep.then_some(v))
            .collect();

        self.vertices = vertices;
        self.faces = faces;

        CleanReport {
            faces_removed: face_count - self.faces.len(),
            vertices_removed: vertex_count - self.vertices.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VertexColor;
    use proptest::prelude::*;

    fn unit_triangle() -> IndexedMesh {
        IndexedMesh::from_raw(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], &[0, 1, 2])
    }

    #[test]
    fn mesh_is_empty() {
        let mesh = IndexedMesh::new();
        assert!(mesh.is_empty());

        let mut mesh2 = IndexedMesh::new();
        mesh2.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        assert!(mesh2.is_empty()); // no faces

        mesh2.faces.push([0, 0, 0]);
        assert!(!mesh2.is_empty());
    }

    #[test]
    fn from_raw_rejects_ragged_buffers() {
        let mesh = IndexedMesh::from_raw(&[0.0, 1.0], &[0, 1, 2]);
        assert!(mesh.vertices.is_empty());
        assert!(mesh.faces.is_empty());
    }

    #[test]
    fn validate_accepts_well_formed_mesh() {
        assert_eq!(unit_triangle().validate(), Ok(()));
    }

    #[test]
    fn validate_reports_first_bad_index() {
        let mut mesh = unit_triangle();
        mesh.faces.push([0, 7, 2]);
        assert_eq!(
            mesh.validate(),
            Err(MeshError::FaceIndexOutOfRange {
                face: 1,
                index: 7,
                vertex_count: 3,
            })
        );
    }

    #[test]
    fn degenerate_faces_are_detected() {
        assert!(is_degenerate_face([1, 1, 2]));
        assert!(is_degenerate_face([1, 2, 1]));
        assert!(is_degenerate_face([2, 1, 1]));
        assert!(!is_degenerate_face([0, 1, 2]));

        let mut mesh = unit_triangle();
        mesh.faces.push([0, 0, 1]);
        assert_eq!(mesh.degenerate_face_count(), 1);
        assert_eq!(mesh.proper_faces().count(), 1);
    }

    #[test]
    fn with_positions_keeps_attributes() {
        let mut mesh = unit_triangle();
        mesh.vertices[1].attributes.color = Some(VertexColor::new(1, 2, 3));
        mesh.vertices[2].attributes.uv = Some((0.5, 0.25));

        let moved: Vec<Point3<f64>> = mesh
            .positions()
            .iter()
            .map(|p| Point3::new(p.x + 2.0, p.y, p.z))
            .collect();
        let result = mesh.with_positions(&moved).unwrap();

        assert_eq!(result.faces, mesh.faces);
        assert_eq!(result.vertices[1].attributes.color, Some(VertexColor::new(1, 2, 3)));
        assert_eq!(result.vertices[2].attributes.uv, Some((0.5, 0.25)));
        assert!((result.vertices[0].position.x - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn with_positions_rejects_wrong_count() {
        let mesh = unit_triangle();
        let err = mesh.with_positions(&[Point3::origin()]).unwrap_err();
        assert_eq!(
            err,
            MeshError::PositionCountMismatch {
                expected: 3,
                actual: 1,
            }
        );
    }

    #[test]
    fn clean_removes_faces_and_orphans() {
        let mut mesh = IndexedMesh::new();
        for i in 0..5 {
            mesh.vertices
                .push(Vertex::with_color(Point3::new(f64::from(i), 0.0, 0.0), VertexColor::new(i as u8, 0, 0)));
        }
        // Vertex 1 only appears in a degenerate face, vertex 3 in none
        mesh.faces.push([0, 2, 4]);
        mesh.faces.push([1, 1, 2]);

        let report = mesh.remove_degenerate_faces();

        assert_eq!(report.faces_removed, 1);
        assert_eq!(report.vertices_removed, 2);
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
        let colors: Vec<u8> = mesh.vertices.iter().filter_map(|v| v.color()).map(|c| c.r).collect();
        assert_eq!(colors, vec![0, 2, 4]);
    }

    #[test]
    fn clean_is_noop_on_clean_mesh() {
        let mut mesh = unit_triangle();
        let before = mesh.clone();
        let report = mesh.remove_degenerate_faces();
        assert!(report.is_unchanged());
        assert_eq!(mesh, before);
    }

    proptest! {
        #[test]
        fn clean_leaves_no_degenerate_faces(
            faces in prop::collection::vec(prop::array::uniform3(0u32..6), 0..20)
        ) {
            let mut mesh = IndexedMesh::new();
            for i in 0..6 {
                mesh.vertices.push(Vertex::from_coords(f64::from(i), 0.0, 0.0));
            }
            mesh.faces = faces;

            mesh.remove_degenerate_faces();

            prop_assert_eq!(mesh.degenerate_face_count(), 0);
            prop_assert!(mesh.validate().is_ok());
            // Every surviving vertex is referenced by some face
            let mut used = vec![false; mesh.vertices.len()];
            for face in &mesh.faces {
                for &i in face {
                    used[i as usize] = true;
                }
            }
            prop_assert!(used.iter().all(|&u| u));
        }
    }
}

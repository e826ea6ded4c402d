//! Surface vertices and the attributes they carry.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VertexColor {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
}

impl VertexColor {
    /// Builds a color from its channels.
    #[inline]
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Optional per-vertex data.
///
/// Fitting rewrites `normal` with the normal of the deformed surface and
/// leaves `color` and `uv` alone.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VertexAttributes {
    /// Unit surface normal.
    pub normal: Option<Vector3<f64>>,
    /// Color.
    pub color: Option<VertexColor>,
    /// Texture coordinates.
    pub uv: Option<(f32, f32)>,
}

impl VertexAttributes {
    const NONE: Self = Self {
        normal: None,
        color: None,
        uv: None,
    };

    /// Returns true if no attribute is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.normal.is_none() && self.color.is_none() && self.uv.is_none()
    }
}

/// A surface point and its attributes.
///
/// # Example
///
/// ```
/// use mesh_types::{Point3, Vertex, VertexColor};
///
/// let v = Vertex::from_coords(0.5, 0.0, 2.0)
///     .with_uv(0.25, 0.75)
///     .with_vertex_color(VertexColor::new(255, 128, 0));
///
/// assert_eq!(v.position, Point3::new(0.5, 0.0, 2.0));
/// assert_eq!(v.attributes.uv, Some((0.25, 0.75)));
/// assert!(v.normal().is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Vertex {
    /// Position.
    pub position: Point3<f64>,
    /// Normal, color and texture coordinates.
    pub attributes: VertexAttributes,
}

impl Vertex {
    /// A vertex at `position` with no attributes.
    #[inline]
    #[must_use]
    pub const fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            attributes: VertexAttributes::NONE,
        }
    }

    /// A vertex at `(x, y, z)` with no attributes.
    #[inline]
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Point3::new is not const in nalgebra
    pub fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z))
    }

    /// A colored vertex at `position`.
    #[inline]
    #[must_use]
    pub const fn with_color(position: Point3<f64>, color: VertexColor) -> Self {
        Self::new(position).with_vertex_color(color)
    }

    /// Sets the color.
    #[inline]
    #[must_use]
    pub const fn with_vertex_color(mut self, color: VertexColor) -> Self {
        self.attributes.color = Some(color);
        self
    }

    /// Sets the texture coordinates.
    #[inline]
    #[must_use]
    pub const fn with_uv(mut self, u: f32, v: f32) -> Self {
        self.attributes.uv = Some((u, v));
        self
    }

    /// Normal, if one has been estimated.
    #[inline]
    #[must_use]
    pub const fn normal(&self) -> Option<Vector3<f64>> {
        self.attributes.normal
    }

    /// Color, if set.
    #[inline]
    #[must_use]
    pub const fn color(&self) -> Option<VertexColor> {
        self.attributes.color
    }
}

impl From<Point3<f64>> for Vertex {
    fn from(position: Point3<f64>) -> Self {
        Self::new(position)
    }
}

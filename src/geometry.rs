//! Flat geometry arrays and their validation.
//!
//! Geometry is kept exactly in the layout it is uploaded in:
//!
//! | Array      | Element | Per vertex |
//! |------------|---------|------------|
//! | `vertices` | `f32`   | 3          |
//! | `colors`   | `f32`   | 4          |
//! | `normals`  | `f32`   | 3, or empty for unlit geometry |
//! | `indices`  | `u16`   | triangle list, 3 per face |
//!
//! [`Geometry::validate`] checks these rules. The scene runs it when an object
//! is added and the renderer runs it again before every upload, so malformed
//! data never reaches the graphics context.

use crate::color::Color;
use thiserror::Error;

/// Largest vertex count addressable with 16-bit indices.
pub const MAX_VERTICES: usize = u16::MAX as usize + 1;

/// Ways geometry can break the upload contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("vertex array length {0} is not a multiple of 3")]
    RaggedVertices(usize),

    #[error("color array has {colors} floats, expected {expected} (4 per vertex)")]
    ColorCount { colors: usize, expected: usize },

    #[error("normal array has {normals} floats, expected 0 or {expected}")]
    NormalCount { normals: usize, expected: usize },

    #[error("index array length {0} is not a multiple of 3")]
    RaggedIndices(usize),

    #[error("index {index} at position {position} is out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        index: u16,
        position: usize,
        vertex_count: usize,
    },

    #[error("{0} vertices cannot be addressed with 16-bit indices")]
    TooManyVertices(usize),
}

/// Raw, upload-ready geometry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Geometry {
    pub vertices: Vec<f32>,
    pub colors: Vec<f32>,
    pub normals: Vec<f32>,
    pub indices: Vec<u16>,
}

impl Geometry {
    pub fn new(vertices: Vec<f32>, colors: Vec<f32>, indices: Vec<u16>) -> Self {
        Self {
            vertices,
            colors,
            normals: Vec::new(),
            indices,
        }
    }

    pub fn with_normals(mut self, normals: Vec<f32>) -> Self {
        self.normals = normals;
        self
    }

    /// Replace every vertex color with `color`.
    pub fn tinted(mut self, color: Color) -> Self {
        let rgba = color.to_array();
        self.colors = std::iter::repeat_n(rgba, self.vertex_count())
            .flatten()
            .collect();
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty()
    }

    /// Check the array-length and index-range rules.
    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.vertices.len() % 3 != 0 {
            return Err(GeometryError::RaggedVertices(self.vertices.len()));
        }
        let vertex_count = self.vertex_count();
        if vertex_count > MAX_VERTICES {
            return Err(GeometryError::TooManyVertices(vertex_count));
        }
        if self.colors.len() != vertex_count * 4 {
            return Err(GeometryError::ColorCount {
                colors: self.colors.len(),
                expected: vertex_count * 4,
            });
        }
        if !self.normals.is_empty() && self.normals.len() != self.vertices.len() {
            return Err(GeometryError::NormalCount {
                normals: self.normals.len(),
                expected: self.vertices.len(),
            });
        }
        if self.indices.len() % 3 != 0 {
            return Err(GeometryError::RaggedIndices(self.indices.len()));
        }
        if let Some((position, &index)) = self
            .indices
            .iter()
            .enumerate()
            .find(|(_, index)| usize::from(**index) >= vertex_count)
        {
            return Err(GeometryError::IndexOutOfRange {
                index,
                position,
                vertex_count,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Geometry {
        Geometry::new(
            vec![0.0, 1.0, 0.0, 1.0, -1.0, 0.0, -1.0, -1.0, 0.0],
            vec![1.0; 12],
            vec![0, 1, 2],
        )
    }

    #[test]
    fn valid_triangle() {
        assert_eq!(triangle().validate(), Ok(()));
        assert_eq!(triangle().triangle_count(), 1);
    }

    #[test]
    fn index_out_of_range() {
        let mut geometry = triangle();
        geometry.indices = vec![0, 1, 3];
        assert_eq!(
            geometry.validate(),
            Err(GeometryError::IndexOutOfRange {
                index: 3,
                position: 2,
                vertex_count: 3
            })
        );
    }

    #[test]
    fn mismatched_colors() {
        let mut geometry = triangle();
        geometry.colors.truncate(8);
        assert!(matches!(
            geometry.validate(),
            Err(GeometryError::ColorCount {
                colors: 8,
                expected: 12
            })
        ));
    }

    #[test]
    fn normals_must_match_vertices() {
        let geometry = triangle().with_normals(vec![0.0; 6]);
        assert!(matches!(
            geometry.validate(),
            Err(GeometryError::NormalCount { .. })
        ));
        assert_eq!(triangle().with_normals(vec![0.0; 9]).validate(), Ok(()));
    }

    #[test]
    fn ragged_arrays() {
        let mut geometry = triangle();
        geometry.vertices.push(0.0);
        assert_eq!(geometry.validate(), Err(GeometryError::RaggedVertices(10)));

        let mut geometry = triangle();
        geometry.indices.push(0);
        assert_eq!(geometry.validate(), Err(GeometryError::RaggedIndices(4)));
    }

    #[test]
    fn tinted_repeats_color_per_vertex() {
        let geometry = triangle().tinted(Color::hex(0x00ff00));
        assert_eq!(geometry.colors.len(), 12);
        assert_eq!(&geometry.colors[4..8], &[0.0, 1.0, 0.0, 1.0]);
    }
}

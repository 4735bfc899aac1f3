//! Built-in shapes.
//!
//! Each constructor returns a fresh [`RenderObject`] with an identity
//! transform. All shapes use counter-clockwise winding for front faces.
//!
//! ```
//! use xsthree::{Color, shapes};
//!
//! let plane = shapes::plane(2.0, 2.0);
//! assert_eq!(plane.geometry.indices.len(), 6);
//!
//! let red_cube = shapes::cube(1.0).tinted(Color::RED);
//! assert!(red_cube.geometry.has_normals());
//! ```

use crate::color::Color;
use crate::geometry::Geometry;
use crate::object::RenderObject;

/// Corner colors shared by the plane and the tetrahedron.
#[rustfmt::skip]
const CORNER_COLORS: [f32; 16] = [
    1.0, 0.0, 0.0, 1.0,
    0.0, 1.0, 0.0, 1.0,
    0.0, 0.0, 1.0, 1.0,
    1.0, 1.0, 0.0, 1.0,
];

/// A `width` × `height` rectangle in the XY plane, centered at the origin.
///
/// Four vertices (top-left, top-right, bottom-left, bottom-right) colored
/// red, green, blue and yellow. No normals, so it is drawn unlit.
pub fn plane(width: f32, height: f32) -> RenderObject {
    let w = width / 2.0;
    let h = height / 2.0;

    #[rustfmt::skip]
    let vertices = vec![
        -w,  h, 0.0,
         w,  h, 0.0,
        -w, -h, 0.0,
         w, -h, 0.0,
    ];

    RenderObject::new(Geometry::new(
        vertices,
        CORNER_COLORS.to_vec(),
        vec![0, 1, 2, 1, 2, 3],
    ))
    .named("plane")
}

/// A unit triangle pointing up the Y axis.
pub fn triangle() -> RenderObject {
    #[rustfmt::skip]
    let vertices = vec![
         0.0,  1.0, 0.0,
         1.0, -1.0, 0.0,
        -1.0, -1.0, 0.0,
    ];

    RenderObject::new(Geometry::new(
        vertices,
        CORNER_COLORS[..12].to_vec(),
        vec![0, 1, 2],
    ))
    .named("triangle")
}

/// A tetrahedron with its base on `y = -1` and apex at `(0, 1, 0)`.
pub fn tetrahedron() -> RenderObject {
    #[rustfmt::skip]
    let vertices = vec![
        -1.0, -1.0, -1.0,
         1.0, -1.0, -1.0,
         0.0, -1.0,  1.0,
         0.0,  1.0,  0.0,
    ];

    #[rustfmt::skip]
    let indices = vec![
        0, 1, 2,
        0, 1, 3,
        1, 2, 3,
        0, 2, 3,
    ];

    RenderObject::new(Geometry::new(vertices, CORNER_COLORS.to_vec(), indices)).named("tetrahedron")
}

/// A cube of edge `size` centered at the origin.
///
/// Each face has its own four vertices so normals stay flat; faces are
/// colored red, cyan, green, magenta, blue and yellow (+Z, -Z, +Y, -Y, +X, -X).
pub fn cube(size: f32) -> RenderObject {
    let s = size / 2.0;

    // (normal, face color) per face; the corner order below matches.
    const FACES: [([f32; 3], u32); 6] = [
        ([0.0, 0.0, 1.0], 0xff0000),
        ([0.0, 0.0, -1.0], 0x00ffff),
        ([0.0, 1.0, 0.0], 0x00ff00),
        ([0.0, -1.0, 0.0], 0xff00ff),
        ([1.0, 0.0, 0.0], 0x0000ff),
        ([-1.0, 0.0, 0.0], 0xffff00),
    ];

    #[rustfmt::skip]
    let corners: [[f32; 3]; 24] = [
        // Front face (Z+)
        [-s, -s,  s], [ s, -s,  s], [ s,  s,  s], [-s,  s,  s],
        // Back face (Z-)
        [ s, -s, -s], [-s, -s, -s], [-s,  s, -s], [ s,  s, -s],
        // Top face (Y+)
        [-s,  s,  s], [ s,  s,  s], [ s,  s, -s], [-s,  s, -s],
        // Bottom face (Y-)
        [-s, -s, -s], [ s, -s, -s], [ s, -s,  s], [-s, -s,  s],
        // Right face (X+)
        [ s, -s,  s], [ s, -s, -s], [ s,  s, -s], [ s,  s,  s],
        // Left face (X-)
        [-s, -s, -s], [-s, -s,  s], [-s,  s,  s], [-s,  s, -s],
    ];

    let vertices = corners.iter().flatten().copied().collect();

    let mut colors = Vec::with_capacity(24 * 4);
    let mut normals = Vec::with_capacity(24 * 3);
    let mut indices = Vec::with_capacity(36);
    for (face, (normal, hex)) in FACES.iter().enumerate() {
        let rgba = Color::hex(*hex).to_array();
        for _ in 0..4 {
            colors.extend_from_slice(&rgba);
            normals.extend_from_slice(normal);
        }
        let base = (face * 4) as u16;
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }

    RenderObject::new(Geometry::new(vertices, colors, indices).with_normals(normals)).named("cube")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_shapes_are_valid() {
        for object in [plane(2.0, 2.0), triangle(), tetrahedron(), cube(1.0)] {
            assert_eq!(object.geometry.validate(), Ok(()), "{}", object.name);
        }
    }

    #[test]
    fn plane_layout() {
        let plane = plane(2.0, 4.0);
        assert_eq!(plane.geometry.vertex_count(), 4);
        assert_eq!(plane.geometry.indices, vec![0, 1, 2, 1, 2, 3]);
        assert_eq!(&plane.geometry.vertices[..3], &[-1.0, 2.0, 0.0]);
        assert!(!plane.geometry.has_normals());
    }

    #[test]
    fn cube_has_flat_normals() {
        let cube = cube(2.0);
        assert_eq!(cube.geometry.vertex_count(), 24);
        assert_eq!(cube.geometry.triangle_count(), 12);
        assert_eq!(&cube.geometry.normals[..3], &[0.0, 0.0, 1.0]);
        assert!(cube.geometry.vertices.iter().all(|v| v.abs() == 1.0));
    }

    #[test]
    fn tetrahedron_has_four_faces() {
        assert_eq!(tetrahedron().geometry.triangle_count(), 4);
    }
}

//! The one shader program the renderer draws with.
//!
//! The program has a vertex and a fragment stage with a fixed interface:
//!
//! | Kind      | Name               | Slot |
//! |-----------|--------------------|------|
//! | attribute | `position`         | 0    |
//! | attribute | `color`            | 1    |
//! | attribute | `normal`           | 2    |
//! | uniform   | `modelViewMatrix`  | 0    |
//! | uniform   | `normalMatrix`     | 1    |
//! | uniform   | `projectionMatrix` | 2    |
//! | uniform   | `object3dMatrix`   | 3    |
//! | uniform   | `uSampler`         | 4    |
//!
//! `uSampler` is looked up but never set; texturing is not wired in.

use crate::context::{GraphicsContext, ProgramId, ShaderError, ShaderStage, UniformLocation};

/// Vertex stage source.
pub const VERTEX_SHADER: &str = include_str!("shaders/scene_vs.wgsl");
/// Fragment stage source.
pub const FRAGMENT_SHADER: &str = include_str!("shaders/scene_fs.wgsl");

/// Vertex attribute names, indexed by slot.
pub const ATTRIBUTES: [&str; 3] = ["position", "color", "normal"];

/// Uniform names, indexed by slot.
pub const UNIFORMS: [&str; 5] = [
    "modelViewMatrix",
    "normalMatrix",
    "projectionMatrix",
    "object3dMatrix",
    "uSampler",
];

/// Slot of a vertex attribute by name.
pub fn attribute_slot(name: &str) -> Option<u32> {
    ATTRIBUTES
        .iter()
        .position(|attribute| *attribute == name)
        .map(|slot| slot as u32)
}

/// Slot of a uniform by name.
pub fn uniform_slot(name: &str) -> Option<u32> {
    UNIFORMS
        .iter()
        .position(|uniform| *uniform == name)
        .map(|slot| slot as u32)
}

/// Attribute locations resolved from a linked program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeLocations {
    pub position: u32,
    pub color: u32,
    /// `None` if the program has no lighting input.
    pub normal: Option<u32>,
}

/// Uniform locations resolved from a linked program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformLocations {
    pub model_view: UniformLocation,
    pub normal: UniformLocation,
    pub projection: UniformLocation,
    pub object3d: UniformLocation,
    pub sampler: Option<UniformLocation>,
}

/// A compiled, linked program together with its location table.
#[derive(Clone, Copy, Debug)]
pub struct ShaderProgram {
    pub id: ProgramId,
    pub attributes: AttributeLocations,
    pub uniforms: UniformLocations,
}

impl ShaderProgram {
    /// Compile the built-in stages, link them and make the program current.
    pub fn build<C: GraphicsContext + ?Sized>(ctx: &mut C) -> Result<Self, ShaderError> {
        Self::from_sources(ctx, VERTEX_SHADER, FRAGMENT_SHADER)
    }

    /// Compile and link custom stage sources exposing the same interface.
    pub fn from_sources<C: GraphicsContext + ?Sized>(
        ctx: &mut C,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, ShaderError> {
        let vertex = ctx.compile_shader(ShaderStage::Vertex, vertex_source)?;
        let fragment = ctx.compile_shader(ShaderStage::Fragment, fragment_source)?;
        let id = ctx.link_program(vertex, fragment)?;
        ctx.use_program(id);

        let attribute = |name: &str| {
            ctx.attrib_location(id, name)
                .ok_or_else(|| ShaderError::Link(format!("attribute `{name}` not found")))
        };
        let attributes = AttributeLocations {
            position: attribute("position")?,
            color: attribute("color")?,
            normal: ctx.attrib_location(id, "normal"),
        };

        let uniform = |name: &str| {
            ctx.uniform_location(id, name)
                .ok_or_else(|| ShaderError::Link(format!("uniform `{name}` not found")))
        };
        let uniforms = UniformLocations {
            model_view: uniform("modelViewMatrix")?,
            normal: uniform("normalMatrix")?,
            projection: uniform("projectionMatrix")?,
            object3d: uniform("object3dMatrix")?,
            sampler: ctx.uniform_location(id, "uSampler"),
        };

        Ok(Self {
            id,
            attributes,
            uniforms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Command, RecordingContext};

    #[test]
    fn slots_follow_declaration_order() {
        assert_eq!(attribute_slot("position"), Some(0));
        assert_eq!(attribute_slot("normal"), Some(2));
        assert_eq!(attribute_slot("uv"), None);
        assert_eq!(uniform_slot("object3dMatrix"), Some(3));
    }

    #[test]
    fn build_links_and_uses_the_program() {
        let mut ctx = RecordingContext::new();
        let program = ShaderProgram::build(&mut ctx).unwrap();

        assert_eq!(program.attributes.normal, Some(2));
        assert!(program.uniforms.sampler.is_some());
        assert!(
            ctx.commands()
                .iter()
                .any(|command| *command == Command::UseProgram(program.id))
        );
    }

    #[test]
    fn link_failure_is_an_error() {
        let mut ctx = RecordingContext::new().failing_link();
        assert!(matches!(
            ShaderProgram::build(&mut ctx),
            Err(ShaderError::Link(_))
        ));
    }

    #[test]
    fn stage_sources_declare_the_interface() {
        for name in ["position", "color", "normal"] {
            assert!(VERTEX_SHADER.contains(name), "vertex stage lacks {name}");
        }
        for name in ["modelViewMatrix", "normalMatrix", "projectionMatrix", "object3dMatrix"] {
            assert!(VERTEX_SHADER.contains(name), "vertex stage lacks {name}");
        }
    }
}

//! Renderable objects and the GPU buffers cached on them.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use glam::Vec3;

use crate::color::Color;
use crate::context::{BufferId, ContextGeneration};
use crate::geometry::Geometry;
use crate::transform::RenderTransform;

/// Buffer handles created for one object under one context generation.
///
/// Handles are created the first time the object is drawn and reused on every
/// later frame. A set whose `generation` differs from the context's current
/// generation is stale and gets replaced wholesale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferSet {
    pub generation: ContextGeneration,
    pub position: BufferId,
    pub color: BufferId,
    /// Created lazily, the first frame the object has normals.
    pub normal: Option<BufferId>,
    pub index: BufferId,
}

/// A drawable entity: geometry, a transform and its cached GPU buffers.
#[derive(Clone, Debug, Default)]
pub struct RenderObject {
    pub name: String,
    pub geometry: Geometry,
    pub transform: RenderTransform,
    buffers: Option<BufferSet>,
}

impl RenderObject {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            ..Default::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Place the object.
    pub fn at(mut self, x: f32, y: f32, z: f32) -> Self {
        self.transform.position = Vec3::new(x, y, z);
        self
    }

    /// Replace every vertex color with `color`.
    pub fn tinted(mut self, color: Color) -> Self {
        self.geometry = self.geometry.tinted(color);
        self
    }

    /// Buffers cached by the renderer, if any.
    pub fn buffers(&self) -> Option<&BufferSet> {
        self.buffers.as_ref()
    }

    /// Cached buffers, but only if they belong to `generation`.
    pub(crate) fn live_buffers(&self, generation: ContextGeneration) -> Option<BufferSet> {
        self.buffers.filter(|set| set.generation == generation)
    }

    pub(crate) fn cache_buffers(&mut self, set: BufferSet) {
        self.buffers = Some(set);
    }

    /// Wrap the object in a shared handle.
    pub fn into_handle(self) -> ObjectHandle {
        ObjectHandle::new(self)
    }
}

/// Shared handle to a [`RenderObject`].
///
/// Cloning the handle does not clone the object: every clone refers to the
/// same object, and so to the same cached buffers. Identity, not content,
/// decides which buffers an object uses.
#[derive(Clone, Debug)]
pub struct ObjectHandle(Rc<RefCell<RenderObject>>);

impl ObjectHandle {
    pub fn new(object: RenderObject) -> Self {
        Self(Rc::new(RefCell::new(object)))
    }

    /// Borrow the object.
    ///
    /// # Panics
    ///
    /// Panics if the object is currently mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, RenderObject> {
        self.0.borrow()
    }

    /// Mutably borrow the object, e.g. to change its vertices between frames.
    ///
    /// # Panics
    ///
    /// Panics if the object is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, RenderObject> {
        self.0.borrow_mut()
    }

    /// Whether both handles point at the same object.
    pub fn ptr_eq(&self, other: &ObjectHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl From<RenderObject> for ObjectHandle {
    fn from(object: RenderObject) -> Self {
        Self::new(object)
    }
}

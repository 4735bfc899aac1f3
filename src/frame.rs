//! What the frame loop draws, and what it reports back.

use std::cell::RefCell;
use std::rc::Rc;

use crate::camera::Camera;
use crate::context::ContextGeneration;
use crate::scene::SharedScene;

/// A camera shared between the application and the renderer.
pub type SharedCamera = Rc<RefCell<Camera>>;

/// Called once per frame with that frame's stats.
pub type FrameCallback = Box<dyn FnMut(&FrameStats)>;

/// Summary of one `render` call.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameStats {
    /// Index of the frame, counted from the renderer's first tick.
    pub frame: u64,
    /// Draw calls issued, one per occupied scene slot.
    pub draw_calls: usize,
    /// Buffers created this frame (non-zero on first sight of an object or after a restore).
    pub buffers_created: usize,
    /// True if the frame was skipped because the context is lost.
    pub skipped: bool,
    /// Value of the idle-spin angle after this frame.
    pub rotation: f32,
    pub generation: ContextGeneration,
}

/// The `(scene, camera, callback)` triple a renderer draws every frame.
///
/// A binding is attached with [`Renderer::bind`](crate::Renderer::bind) and
/// can be swapped at any time; the renderer reads it anew each frame.
pub struct FrameBinding {
    pub scene: SharedScene,
    pub camera: SharedCamera,
    pub(crate) callback: FrameCallback,
}

impl FrameBinding {
    pub fn new(
        scene: SharedScene,
        camera: SharedCamera,
        callback: impl FnMut(&FrameStats) + 'static,
    ) -> Self {
        Self {
            scene,
            camera,
            callback: Box::new(callback),
        }
    }

    /// A binding whose callback does nothing.
    pub fn silent(scene: SharedScene, camera: SharedCamera) -> Self {
        Self::new(scene, camera, |_| {})
    }
}

impl std::fmt::Debug for FrameBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBinding")
            .field("scene", &self.scene.borrow().name)
            .field("objects", &self.scene.borrow().len())
            .finish_non_exhaustive()
    }
}

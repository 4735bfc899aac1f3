//! The scene graph: an ordered, append-only list of object slots.

use std::cell::RefCell;
use std::rc::Rc;

use crate::geometry::GeometryError;
use crate::object::{ObjectHandle, RenderObject};

/// A scene shared between the code that builds it and the renderer drawing it.
///
/// The renderer borrows the scene afresh every frame, so anything appended
/// through another clone of the handle shows up on the next frame.
pub type SharedScene = Rc<RefCell<Scene>>;

/// Ordered collection of renderable objects under a named root.
///
/// Slots are drawn in insertion order. The same object may appear more than
/// once (it is drawn once per slot and shares its buffers), and empty slots
/// are skipped.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub name: String,
    children: Vec<Option<ObjectHandle>>,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Append an object.
    ///
    /// The object's geometry is validated first; malformed geometry is
    /// rejected and the scene is left unchanged.
    pub fn add(&mut self, object: &ObjectHandle) -> Result<&mut Self, GeometryError> {
        object.borrow().geometry.validate()?;
        self.children.push(Some(object.clone()));
        Ok(self)
    }

    /// Wrap `object` in a handle, append it and return the handle.
    pub fn add_object(&mut self, object: RenderObject) -> Result<ObjectHandle, GeometryError> {
        let handle = ObjectHandle::new(object);
        self.add(&handle)?;
        Ok(handle)
    }

    /// Append an empty slot. It takes a position in the order but draws nothing.
    pub fn add_empty(&mut self) -> &mut Self {
        self.children.push(None);
        self
    }

    /// All slots, empty ones included.
    pub fn children(&self) -> &[Option<ObjectHandle>] {
        &self.children
    }

    /// Occupied slots in draw order.
    pub fn objects(&self) -> impl Iterator<Item = &ObjectHandle> {
        self.children.iter().flatten()
    }

    /// Number of slots, empty ones included.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn into_shared(self) -> SharedScene {
        Rc::new(RefCell::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::shapes;

    #[test]
    fn keeps_insertion_order_with_holes_and_duplicates() {
        let mut scene = Scene::new("root");
        let plane = scene.add_object(shapes::plane(1.0, 1.0)).unwrap();
        scene.add_empty();
        scene.add(&plane).unwrap();
        let cube = scene.add_object(shapes::cube(1.0)).unwrap();

        assert_eq!(scene.len(), 4);
        let drawn: Vec<_> = scene.objects().collect();
        assert_eq!(drawn.len(), 3);
        assert!(drawn[0].ptr_eq(&plane));
        assert!(drawn[1].ptr_eq(&plane));
        assert!(drawn[2].ptr_eq(&cube));
    }

    #[test]
    fn malformed_geometry_is_rejected_at_add() {
        let mut scene = Scene::new("root");
        let broken = RenderObject::new(Geometry::new(vec![0.0; 9], vec![1.0; 12], vec![0, 1, 7]));
        assert!(matches!(
            scene.add_object(broken),
            Err(GeometryError::IndexOutOfRange { index: 7, .. })
        ));
        assert!(scene.is_empty());
    }

    #[test]
    fn appends_through_a_shared_handle_are_visible() {
        let shared = Scene::new("root").into_shared();
        let view = Rc::clone(&shared);
        view.borrow_mut().add_object(shapes::triangle()).unwrap();
        assert_eq!(shared.borrow().objects().count(), 1);
    }
}

//! Scene graph: an entity arena with parent/child links and a main camera
//!
//! The [`SceneRoot`] owns every entity. Rendering walks the tree depth first in
//! insertion order, handing each entity its world transform. Dropping entities goes
//! through [`Entity::release`] so GPU and physics resources are returned before the
//! subsystems that own them shut down.

pub mod camera;
pub mod console;
pub mod mesh;
pub mod profiler;

use std::any::Any;

use slotmap::{new_key_type, SlotMap};

use crate::foundation::math::{Transform, Vec3};
use crate::render::RenderBackend;

pub use camera::Camera;
pub use console::ConsoleEntity;
pub use mesh::MeshEntity;
pub use profiler::ProfilerEntity;

new_key_type! {
    /// Key of an entity in its scene
    pub struct EntityId;
}

/// What an entity can reach while the scene renders
pub struct FrameContext<'a> {
    /// Device the frame is drawn with
    pub backend: &'a mut dyn RenderBackend,
    /// UI context of the window, between its begin and end of frame
    pub ui: &'a egui::Context,
    /// Seconds since the previous frame
    pub delta: f64,
}

/// A node of the scene
pub trait Entity: Any {
    /// Name for debugging
    fn name(&self) -> &str;

    /// Transform relative to the parent
    fn local_transform(&self) -> Transform {
        Transform::identity()
    }

    /// Draw the entity; `world` is its transform in world space
    fn render(&mut self, _frame: &mut FrameContext<'_>, _world: &Transform) {}

    /// Return resources before the entity is dropped
    fn release(&mut self, _backend: &mut dyn RenderBackend) {}

    /// Upcast for downcasting to the concrete type
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete type
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Node {
    entity: Box<dyn Entity>,
    parent: Option<EntityId>,
    children: Vec<EntityId>,
}

/// Root of the entity tree
pub struct SceneRoot {
    nodes: SlotMap<EntityId, Node>,
    top_level: Vec<EntityId>,
    camera: Camera,
    listener: Option<EntityId>,
}

impl Default for SceneRoot {
    fn default() -> Self {
        Self::new(Camera::default())
    }
}

impl SceneRoot {
    /// Empty scene viewed through `camera`
    pub fn new(camera: Camera) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            top_level: Vec::new(),
            camera,
            listener: None,
        }
    }

    /// Add an entity under `parent`, or at the top level for `None`
    #[track_caller]
    pub fn add_child(&mut self, parent: Option<EntityId>, entity: impl Entity) -> EntityId {
        self.add_boxed(parent, Box::new(entity))
    }

    /// Add an already boxed entity
    #[track_caller]
    pub fn add_boxed(&mut self, parent: Option<EntityId>, entity: Box<dyn Entity>) -> EntityId {
        if let Some(parent) = parent {
            assert!(self.nodes.contains_key(parent), "Parent entity does not exist");
        }
        let id = self.nodes.insert(Node {
            entity,
            parent,
            children: Vec::new(),
        });
        match parent.and_then(|parent| self.nodes.get_mut(parent)) {
            Some(node) => node.children.push(id),
            None => self.top_level.push(id),
        }
        id
    }

    /// Remove an entity and its whole subtree, releasing each one
    pub fn remove(&mut self, id: EntityId, backend: &mut dyn RenderBackend) -> bool {
        let Some(parent) = self.nodes.get(id).map(|node| node.parent) else {
            return false;
        };
        match parent.and_then(|parent| self.nodes.get_mut(parent)) {
            Some(node) => node.children.retain(|child| *child != id),
            None => self.top_level.retain(|child| *child != id),
        }
        self.release_subtree(id, backend);
        true
    }

    /// Release and drop every entity
    pub fn release_all(&mut self, backend: &mut dyn RenderBackend) {
        for id in std::mem::take(&mut self.top_level) {
            self.release_subtree(id, backend);
        }
        self.listener = None;
        log::debug!("Scene released");
    }

    /// Whether `id` is in the scene
    pub fn contains(&self, id: EntityId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the scene has no entities
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Children of `id` in insertion order
    pub fn children(&self, id: EntityId) -> &[EntityId] {
        self.nodes.get(id).map_or(&[], |node| &node.children)
    }

    /// Parent of `id`
    pub fn parent(&self, id: EntityId) -> Option<EntityId> {
        self.nodes.get(id).and_then(|node| node.parent)
    }

    /// Entity as a trait object
    pub fn entity(&self, id: EntityId) -> Option<&dyn Entity> {
        self.nodes.get(id).map(|node| &*node.entity)
    }

    /// Entity downcast to its concrete type
    pub fn get<T: Entity>(&self, id: EntityId) -> Option<&T> {
        self.nodes.get(id)?.entity.as_any().downcast_ref()
    }

    /// Mutable entity downcast to its concrete type
    pub fn get_mut<T: Entity>(&mut self, id: EntityId) -> Option<&mut T> {
        self.nodes.get_mut(id)?.entity.as_any_mut().downcast_mut()
    }

    /// First entity of type `T`, searched depth first
    pub fn find<T: Entity>(&self) -> Option<EntityId> {
        let mut stack: Vec<EntityId> = self.top_level.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if node.entity.as_any().is::<T>() {
                return Some(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }

    /// Transform of `id` in world space
    pub fn world_transform(&self, id: EntityId) -> Option<Transform> {
        let node = self.nodes.get(id)?;
        let local = node.entity.local_transform();
        Some(match node.parent {
            Some(parent) => self.world_transform(parent)?.combine(&local),
            None => local,
        })
    }

    /// The camera the scene is viewed through
    pub const fn main_camera(&self) -> &Camera {
        &self.camera
    }

    /// Mutable main camera
    pub fn main_camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Entity the audio listener follows; `None` follows the main camera
    pub fn set_audio_listener(&mut self, id: Option<EntityId>) {
        self.listener = id.filter(|id| self.nodes.contains_key(*id));
    }

    /// Position of the audio listener
    pub fn audio_listening_position(&self) -> Vec3 {
        self.listener_transform()
            .map_or(self.camera.position, |transform| transform.position)
    }

    /// Direction the audio listener faces
    pub fn audio_listening_rotation(&self) -> Vec3 {
        self.listener_transform()
            .map_or_else(|| self.camera.forward(), |transform| transform.forward())
    }

    /// Up direction of the audio listener
    pub fn audio_listening_up(&self) -> Vec3 {
        self.listener_transform()
            .map_or_else(|| self.camera.up(), |transform| transform.up())
    }

    /// Draw every entity, parents before children, siblings in insertion order
    pub fn render(&mut self, frame: &mut FrameContext<'_>) {
        let top_level = self.top_level.clone();
        for id in top_level {
            self.render_subtree(id, &Transform::identity(), frame);
        }
    }

    fn render_subtree(&mut self, id: EntityId, parent: &Transform, frame: &mut FrameContext<'_>) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let world = parent.combine(&node.entity.local_transform());
        node.entity.render(frame, &world);
        let children = node.children.clone();
        for child in children {
            self.render_subtree(child, &world, frame);
        }
    }

    fn release_subtree(&mut self, id: EntityId, backend: &mut dyn RenderBackend) {
        let Some(mut node) = self.nodes.remove(id) else {
            return;
        };
        for child in std::mem::take(&mut node.children) {
            self.release_subtree(child, backend);
        }
        node.entity.release(backend);
        if self.listener == Some(id) {
            self.listener = None;
        }
    }

    fn listener_transform(&self) -> Option<Transform> {
        self.listener.and_then(|id| self.world_transform(id))
    }
}

impl std::fmt::Debug for SceneRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneRoot")
            .field("entities", &self.nodes.len())
            .field("camera", &self.camera)
            .field("listener", &self.listener)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessBackend;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Journal = Rc<RefCell<Vec<String>>>;

    struct Marker {
        name: String,
        offset: Vec3,
        journal: Journal,
    }

    impl Marker {
        fn new(name: &str, offset: Vec3, journal: &Journal) -> Self {
            Self {
                name: name.to_string(),
                offset,
                journal: Rc::clone(journal),
            }
        }
    }

    impl Entity for Marker {
        fn name(&self) -> &str {
            &self.name
        }

        fn local_transform(&self) -> Transform {
            Transform::from_position(self.offset)
        }

        fn render(&mut self, _frame: &mut FrameContext<'_>, world: &Transform) {
            self.journal
                .borrow_mut()
                .push(format!("render {} at {}", self.name, world.position.x));
        }

        fn release(&mut self, _backend: &mut dyn RenderBackend) {
            self.journal.borrow_mut().push(format!("release {}", self.name));
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn render(scene: &mut SceneRoot, backend: &mut HeadlessBackend) {
        let ctx = egui::Context::default();
        let mut frame = FrameContext {
            backend,
            ui: &ctx,
            delta: 0.016,
        };
        scene.render(&mut frame);
    }

    #[test]
    fn test_render_is_depth_first_in_insertion_order() {
        let journal = Journal::default();
        let mut scene = SceneRoot::default();
        let a = scene.add_child(None, Marker::new("a", Vec3::new(1.0, 0.0, 0.0), &journal));
        scene.add_child(Some(a), Marker::new("a1", Vec3::new(2.0, 0.0, 0.0), &journal));
        scene.add_child(None, Marker::new("b", Vec3::zeros(), &journal));

        render(&mut scene, &mut HeadlessBackend::new());
        assert_eq!(*journal.borrow(), ["render a at 1", "render a1 at 3", "render b at 0"]);
    }

    #[test]
    fn test_remove_releases_subtree() {
        let journal = Journal::default();
        let mut scene = SceneRoot::default();
        let a = scene.add_child(None, Marker::new("a", Vec3::zeros(), &journal));
        scene.add_child(Some(a), Marker::new("a1", Vec3::zeros(), &journal));
        let b = scene.add_child(None, Marker::new("b", Vec3::zeros(), &journal));

        assert!(scene.remove(a, &mut HeadlessBackend::new()));
        assert_eq!(*journal.borrow(), ["release a1", "release a"]);
        assert_eq!(scene.len(), 1);
        assert!(scene.contains(b));
        assert!(!scene.remove(a, &mut HeadlessBackend::new()));
    }

    #[test]
    fn test_release_all_empties_scene() {
        let journal = Journal::default();
        let mut scene = SceneRoot::default();
        scene.add_child(None, Marker::new("a", Vec3::zeros(), &journal));
        scene.add_child(None, Marker::new("b", Vec3::zeros(), &journal));
        scene.release_all(&mut HeadlessBackend::new());
        assert!(scene.is_empty());
        assert_eq!(journal.borrow().len(), 2);
    }

    #[test]
    fn test_listener_follows_entity_or_camera() {
        let journal = Journal::default();
        let mut scene = SceneRoot::new(Camera::perspective(Vec3::new(0.0, 1.0, 0.0), 70.0, 0.1, 10.0));
        assert_eq!(scene.audio_listening_position(), Vec3::new(0.0, 1.0, 0.0));

        let parent = scene.add_child(None, Marker::new("ship", Vec3::new(3.0, 0.0, 0.0), &journal));
        let ear = scene.add_child(Some(parent), Marker::new("ear", Vec3::new(0.0, 2.0, 0.0), &journal));
        scene.set_audio_listener(Some(ear));
        assert_eq!(scene.audio_listening_position(), Vec3::new(3.0, 2.0, 0.0));
        assert_eq!(scene.audio_listening_rotation(), Vec3::new(0.0, 0.0, -1.0));

        scene.remove(parent, &mut HeadlessBackend::new());
        assert_eq!(scene.audio_listening_position(), Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_downcast_and_find() {
        let journal = Journal::default();
        let mut scene = SceneRoot::default();
        let id = scene.add_child(None, Marker::new("m", Vec3::zeros(), &journal));
        assert_eq!(scene.find::<Marker>(), Some(id));
        assert_eq!(scene.get::<Marker>(id).map(Entity::name), Some("m"));
        assert!(scene.get::<ConsoleEntity>(id).is_none());
    }

    #[test]
    #[should_panic(expected = "Parent entity does not exist")]
    fn test_adding_under_missing_parent_panics() {
        let journal = Journal::default();
        let mut scene = SceneRoot::default();
        let id = scene.add_child(None, Marker::new("gone", Vec3::zeros(), &journal));
        scene.remove(id, &mut HeadlessBackend::new());
        scene.add_child(Some(id), Marker::new("orphan", Vec3::zeros(), &journal));
    }
}

//! Opaque resource handles and the per-backend tables that resolve them
//!
//! A default-constructed handle is invalid. Passing an invalid or destroyed handle to
//! a use/update operation is a programmer error and panics.

use slotmap::{new_key_type, Key, SlotMap};

use super::types::TextureType;

new_key_type! {
    /// Key of a texture inside its backend
    pub struct TextureKey;
    /// Key of a framebuffer inside its backend
    pub struct FrameBufferKey;
    /// Key of a shader program inside its backend
    pub struct ShaderKey;
    /// Key of a uniform buffer inside its backend
    pub struct UniformBufferKey;
    /// Key of a mesh inside its backend
    pub struct MeshKey;
    /// Key of a presentable surface attached to a backend
    pub struct SurfaceId;
}

/// Texture created by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureHandle {
    pub(crate) key: TextureKey,
    /// Dimensionality the texture was created with
    pub texture_type: TextureType,
}

impl TextureHandle {
    pub(crate) const fn new(key: TextureKey, texture_type: TextureType) -> Self {
        Self { key, texture_type }
    }

    /// Whether the handle refers to a created texture
    pub fn is_valid(&self) -> bool {
        !self.key.is_null()
    }
}

/// Offscreen render target created by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FrameBufferHandle {
    pub(crate) key: FrameBufferKey,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Whether a depth attachment exists
    pub has_depth: bool,
}

impl FrameBufferHandle {
    pub(crate) const fn new(key: FrameBufferKey, width: u32, height: u32, has_depth: bool) -> Self {
        Self {
            key,
            width,
            height,
            has_depth,
        }
    }

    /// Whether the handle refers to a created framebuffer
    pub fn is_valid(&self) -> bool {
        !self.key.is_null()
    }
}

/// Linked shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShaderHandle {
    pub(crate) key: ShaderKey,
}

impl ShaderHandle {
    pub(crate) const fn new(key: ShaderKey) -> Self {
        Self { key }
    }

    /// Whether the handle refers to a created shader
    pub fn is_valid(&self) -> bool {
        !self.key.is_null()
    }
}

/// Uniform buffer attached to a fixed binding point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UniformBufferHandle {
    pub(crate) key: UniformBufferKey,
    /// Binding point the buffer is attached to
    pub binding: u32,
    /// Size in bytes
    pub size: usize,
}

impl UniformBufferHandle {
    pub(crate) const fn new(key: UniformBufferKey, binding: u32, size: usize) -> Self {
        Self { key, binding, size }
    }

    /// Whether the handle refers to a created uniform buffer
    pub fn is_valid(&self) -> bool {
        !self.key.is_null()
    }
}

/// Uploaded vertex and index buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MeshHandle {
    pub(crate) key: MeshKey,
    /// Number of indices drawn
    pub index_count: u32,
}

impl MeshHandle {
    pub(crate) const fn new(key: MeshKey, index_count: u32) -> Self {
        Self { key, index_count }
    }

    /// Whether the handle refers to a created mesh
    pub fn is_valid(&self) -> bool {
        !self.key.is_null()
    }
}

/// Backend-side storage for one resource family
///
/// Lookups go through [`ResourceTable::resolve`], which turns a stale or null key
/// into a panic naming the resource family.
#[derive(Debug)]
pub struct ResourceTable<K: Key, V> {
    what: &'static str,
    entries: SlotMap<K, V>,
}

impl<K: Key, V> ResourceTable<K, V> {
    /// Empty table for resources called `what` in panic messages
    pub fn new(what: &'static str) -> Self {
        Self {
            what,
            entries: SlotMap::with_key(),
        }
    }

    /// Store a resource and return its key
    pub fn insert(&mut self, value: V) -> K {
        self.entries.insert(value)
    }

    /// Resource for a key that must be live
    #[track_caller]
    pub fn resolve(&self, key: K) -> &V {
        assert!(!key.is_null(), "Invalid {} handle", self.what);
        match self.entries.get(key) {
            Some(value) => value,
            None => panic!("Stale {} handle", self.what),
        }
    }

    /// Mutable resource for a key that must be live
    #[track_caller]
    pub fn resolve_mut(&mut self, key: K) -> &mut V {
        assert!(!key.is_null(), "Invalid {} handle", self.what);
        let what = self.what;
        match self.entries.get_mut(key) {
            Some(value) => value,
            None => panic!("Stale {what} handle"),
        }
    }

    /// Remove a live resource; null keys are ignored
    #[track_caller]
    pub fn release(&mut self, key: K) -> Option<V> {
        if key.is_null() {
            return None;
        }
        match self.entries.remove(key) {
            Some(value) => Some(value),
            None => panic!("{} handle destroyed twice", self.what),
        }
    }

    /// Whether a key is live
    pub fn contains(&self, key: K) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of live resources
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate live resources
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.entries.iter()
    }

    /// Remove every resource
    pub fn drain(&mut self) -> impl Iterator<Item = (K, V)> + '_ {
        self.entries.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_handles_are_invalid() {
        assert!(!TextureHandle::default().is_valid());
        assert!(!FrameBufferHandle::default().is_valid());
        assert!(!ShaderHandle::default().is_valid());
        assert!(!UniformBufferHandle::default().is_valid());
        assert!(!MeshHandle::default().is_valid());
    }

    #[test]
    fn test_release_of_null_key_is_noop() {
        let mut table: ResourceTable<MeshKey, u32> = ResourceTable::new("mesh");
        assert!(table.release(MeshKey::null()).is_none());
    }

    #[test]
    #[should_panic(expected = "Stale mesh handle")]
    fn test_resolving_released_key_panics() {
        let mut table = ResourceTable::new("mesh");
        let key: MeshKey = table.insert(7u32);
        table.release(key);
        table.resolve(key);
    }

    #[test]
    #[should_panic(expected = "destroyed twice")]
    fn test_double_release_panics() {
        let mut table = ResourceTable::new("texture");
        let key: TextureKey = table.insert(());
        table.release(key);
        table.release(key);
    }
}

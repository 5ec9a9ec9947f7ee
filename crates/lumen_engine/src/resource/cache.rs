//! Reference-counted resource cache
//!
//! The cache owns one `Rc` to every loaded resource. A resource whose only other
//! holder asks for its removal is erased right away, and [`ResourceCache::cleanup`]
//! sweeps every resource nothing outside the cache references anymore.

use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use super::mesh::{MeshData, MeshLoader};
use super::provider::ResourceProvider;
use super::{Resource, ResourceError, ResourceId};

/// Strong count at or below which [`ResourceCache::remove_resource`] erases an entry:
/// the cache's own reference plus the caller's.
pub const REMOVAL_USE_COUNT: usize = 2;

/// Providers per scheme plus the cache of decoded resources
#[derive(Default)]
pub struct ResourceCache {
    providers: Vec<Box<dyn ResourceProvider>>,
    resources: HashMap<String, Rc<dyn Any>>,
    mesh_loaders: HashMap<String, Box<dyn MeshLoader>>,
}

impl ResourceCache {
    /// Create an empty cache without providers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider; providers added later are searched first
    pub fn add_provider(&mut self, provider: impl ResourceProvider + 'static) {
        log::debug!("Registered resource provider for {}://", provider.scheme());
        self.providers.push(Box::new(provider));
    }

    /// Number of registered providers
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Register a mesh loader under `name`, replacing any previous one
    pub fn add_mesh_loader(&mut self, name: &str, loader: impl MeshLoader + 'static) {
        self.mesh_loaders.insert(name.to_string(), Box::new(loader));
    }

    /// Whether a mesh loader is registered under `name`
    pub fn has_mesh_loader(&self, name: &str) -> bool {
        self.mesh_loaders.contains_key(name)
    }

    /// Whether any provider for the identifier's scheme has the resource
    pub fn has_resource(&self, identifier: &str) -> bool {
        ResourceId::split(identifier).is_some_and(|id| self.find_provider(&id).is_some())
    }

    /// Local filesystem path of an identifier, when its provider is disk-backed
    pub fn local_path(&self, identifier: &str) -> Option<PathBuf> {
        let id = ResourceId::split(identifier)?;
        self.find_provider(&id)?.local_path(id.path)
    }

    /// Read the raw bytes of an identifier without caching them
    pub fn read(&self, identifier: &str) -> Result<Vec<u8>, ResourceError> {
        let id = ResourceId::parse(identifier)?;
        let provider = self
            .find_provider(&id)
            .ok_or_else(|| ResourceError::NotFound(identifier.to_string()))?;
        provider.read(id.path)
    }

    /// Fetch a cached resource, loading and caching it on first use
    ///
    /// Failures are logged and yield `None`; callers decide whether that is fatal.
    pub fn get_resource<T: Resource + Default>(&mut self, identifier: &str) -> Option<Rc<T>> {
        if let Some(entry) = self.resources.get(identifier) {
            return Self::downcast(identifier, entry.clone());
        }
        let resource = Rc::new(self.get_unique_uncached::<T>(identifier)?);
        self.resources.insert(identifier.to_string(), resource.clone());
        Some(resource)
    }

    /// Load a fresh copy of a resource that the cache does not track
    pub fn get_unique_uncached<T: Resource + Default>(&self, identifier: &str) -> Option<T> {
        let mut resource = T::default();
        match self.compile(identifier, &mut resource) {
            Ok(()) => Some(resource),
            Err(e) => {
                log::error!("Failed to load {identifier}: {e}");
                None
            }
        }
    }

    /// Fetch a cached mesh, decoding it with the loader registered as `loader` on first use
    pub fn get_mesh(&mut self, identifier: &str, loader: &str) -> Option<Rc<MeshData>> {
        if let Some(entry) = self.resources.get(identifier) {
            return Self::downcast(identifier, entry.clone());
        }
        let result = self.mesh_loaders.get(loader).map_or_else(
            || Err(ResourceError::NoLoader(loader.to_string())),
            |mesh_loader| mesh_loader.load(&self.read(identifier)?),
        );
        match result {
            Ok(mesh) => {
                let mesh = Rc::new(mesh);
                self.resources.insert(identifier.to_string(), mesh.clone());
                Some(mesh)
            }
            Err(e) => {
                log::error!("Failed to load mesh {identifier}: {e}");
                None
            }
        }
    }

    /// Whether an identifier is currently cached
    pub fn is_cached(&self, identifier: &str) -> bool {
        self.resources.contains_key(identifier)
    }

    /// Number of cached resources
    pub fn cached_count(&self) -> usize {
        self.resources.len()
    }

    /// Erase a cached resource if at most one reference besides the cache's exists
    ///
    /// Returns whether the entry was erased.
    pub fn remove_resource(&mut self, identifier: &str) -> bool {
        let erase = self
            .resources
            .get(identifier)
            .is_some_and(|entry| Rc::strong_count(entry) <= REMOVAL_USE_COUNT);
        if erase {
            self.resources.remove(identifier);
        }
        erase
    }

    /// Drop every cached resource that only the cache still references
    pub fn cleanup(&mut self) -> usize {
        let before = self.resources.len();
        self.resources.retain(|_, entry| Rc::strong_count(entry) > 1);
        before - self.resources.len()
    }

    /// Drop every cached resource, provider, and mesh loader
    pub fn discard_all(&mut self) {
        self.resources.clear();
        self.providers.clear();
        self.mesh_loaders.clear();
    }

    fn compile(&self, identifier: &str, target: &mut dyn Resource) -> Result<(), ResourceError> {
        let id = ResourceId::parse(identifier)?;
        let provider = self
            .find_provider(&id)
            .ok_or_else(|| ResourceError::NotFound(identifier.to_string()))?;
        provider.compile_resource(id.path, target)
    }

    fn find_provider(&self, id: &ResourceId<'_>) -> Option<&dyn ResourceProvider> {
        self.providers
            .iter()
            .rev()
            .filter(|provider| provider.scheme() == id.scheme)
            .find(|provider| provider.has_resource(id.path))
            .map(|provider| &**provider)
    }

    fn downcast<T: Any>(identifier: &str, entry: Rc<dyn Any>) -> Option<Rc<T>> {
        match entry.downcast::<T>() {
            Ok(resource) => Some(resource),
            Err(_) => {
                log::error!("Resource {identifier} is cached as a different type");
                None
            }
        }
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("providers", &self.providers.len())
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{BinaryResource, PrimitiveMeshLoader, TextResource};
    use std::collections::HashMap;

    /// In-memory provider serving fixed blobs
    struct MemoryProvider {
        scheme: &'static str,
        files: HashMap<&'static str, &'static [u8]>,
    }

    impl MemoryProvider {
        fn new(scheme: &'static str, files: &[(&'static str, &'static [u8])]) -> Self {
            Self {
                scheme,
                files: files.iter().copied().collect(),
            }
        }
    }

    impl ResourceProvider for MemoryProvider {
        fn scheme(&self) -> &str {
            self.scheme
        }

        fn has_resource(&self, path: &str) -> bool {
            self.files.contains_key(path)
        }

        fn read(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
            self.files
                .get(path)
                .map(|bytes| bytes.to_vec())
                .ok_or_else(|| ResourceError::NotFound(path.to_string()))
        }
    }

    fn cache_with(files: &[(&'static str, &'static [u8])]) -> ResourceCache {
        let mut cache = ResourceCache::new();
        cache.add_provider(MemoryProvider::new("mem", files));
        cache
    }

    #[test]
    fn test_resource_is_loaded_once() {
        let mut cache = cache_with(&[("a.txt", b"alpha")]);
        let first = cache.get_resource::<TextResource>("mem://a.txt").unwrap();
        let second = cache.get_resource::<TextResource>("mem://a.txt").unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.text, "alpha");
    }

    #[test]
    fn test_missing_resource_yields_none() {
        let mut cache = cache_with(&[]);
        assert!(cache.get_resource::<BinaryResource>("mem://nothing").is_none());
        assert!(cache.get_resource::<BinaryResource>("no-scheme").is_none());
        assert_eq!(cache.cached_count(), 0);
    }

    #[test]
    fn test_remove_erases_at_use_count_two() {
        let mut cache = cache_with(&[("a.bin", b"1")]);
        let held = cache.get_resource::<BinaryResource>("mem://a.bin").unwrap();
        assert_eq!(Rc::strong_count(&held), 2);
        assert!(cache.remove_resource("mem://a.bin"));
        assert!(!cache.is_cached("mem://a.bin"));
        assert_eq!(held.data, b"1");
    }

    #[test]
    fn test_remove_keeps_shared_resource() {
        let mut cache = cache_with(&[("a.bin", b"1")]);
        let held = cache.get_resource::<BinaryResource>("mem://a.bin").unwrap();
        let other = held.clone();
        assert!(!cache.remove_resource("mem://a.bin"));
        assert!(cache.is_cached("mem://a.bin"));
        drop(other);
        assert!(cache.remove_resource("mem://a.bin"));
    }

    #[test]
    fn test_cleanup_sweeps_unreferenced() {
        let mut cache = cache_with(&[("a.bin", b"1"), ("b.bin", b"2")]);
        let kept = cache.get_resource::<BinaryResource>("mem://a.bin").unwrap();
        drop(cache.get_resource::<BinaryResource>("mem://b.bin"));
        assert_eq!(cache.cleanup(), 1);
        assert!(cache.is_cached("mem://a.bin"));
        assert!(!cache.is_cached("mem://b.bin"));
        drop(kept);
    }

    #[test]
    fn test_latest_provider_wins() {
        let mut cache = cache_with(&[("shared.txt", b"old")]);
        cache.add_provider(MemoryProvider::new("mem", &[("shared.txt", b"new")]));
        let text = cache.get_resource::<TextResource>("mem://shared.txt").unwrap();
        assert_eq!(text.text, "new");
    }

    #[test]
    fn test_earlier_provider_serves_what_later_lacks() {
        let mut cache = cache_with(&[("only-old.txt", b"old")]);
        cache.add_provider(MemoryProvider::new("mem", &[]));
        assert!(cache.has_resource("mem://only-old.txt"));
        assert!(!cache.has_resource("other://only-old.txt"));
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let mut cache = cache_with(&[("a.txt", b"alpha")]);
        let _text = cache.get_resource::<TextResource>("mem://a.txt").unwrap();
        assert!(cache.get_resource::<BinaryResource>("mem://a.txt").is_none());
    }

    #[test]
    fn test_mesh_loader_lookup() {
        let mut cache = cache_with(&[("tri.toml", b"shape = \"triangle\"")]);
        assert!(cache.get_mesh("mem://tri.toml", PrimitiveMeshLoader::NAME).is_none());
        cache.add_mesh_loader(PrimitiveMeshLoader::NAME, PrimitiveMeshLoader);
        let mesh = cache.get_mesh("mem://tri.toml", PrimitiveMeshLoader::NAME).unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_discard_all_drops_providers() {
        let mut cache = cache_with(&[("a.bin", b"1")]);
        let _held = cache.get_resource::<BinaryResource>("mem://a.bin");
        cache.discard_all();
        assert_eq!(cache.cached_count(), 0);
        assert_eq!(cache.provider_count(), 0);
        assert!(!cache.has_resource("mem://a.bin"));
    }
}

//! Fixed-capacity pool of secondary windows

use super::{Platform, PlatformEvent, PlatformWindow, Viewport, WindowDescriptor, WindowHandle};
use crate::foundation::collections::{PoolIndex, SlotPool};
use crate::render::RenderBackend;

/// Windows a manager created with [`WindowManager::new`] can hold
pub const DEFAULT_WINDOW_CAPACITY: usize = 256;

/// Index of a window in its manager
pub type WindowId = PoolIndex;

/// Owns secondary windows and refreshes them once per frame
///
/// Destruction is deferred: [`WindowManager::queue_destroy`] only flags a window, and
/// the next [`WindowManager::refresh`] destroys it before touching any other window.
pub struct WindowManager {
    windows: SlotPool<WindowHandle>,
}

impl Default for WindowManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowManager {
    /// Pool of [`DEFAULT_WINDOW_CAPACITY`] windows
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_WINDOW_CAPACITY)
    }

    /// Pool of `capacity` windows
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            windows: SlotPool::with_capacity(capacity),
        }
    }

    /// Open a window and attach it to `backend`
    ///
    /// Returns `None` when the pool is full or the platform or backend fails; the
    /// reason is logged.
    pub fn create_window(
        &mut self,
        platform: &mut dyn Platform,
        share: Option<&dyn PlatformWindow>,
        backend: &mut dyn RenderBackend,
        desc: &WindowDescriptor,
        viewport: Viewport,
    ) -> Option<WindowId> {
        if self.windows.find_free().is_none() {
            log::error!(
                "Cannot create window '{}': all {} window slots are in use",
                desc.title,
                self.windows.capacity()
            );
            return None;
        }
        let window = match platform.create_window(desc, share) {
            Ok(window) => window,
            Err(e) => {
                log::error!("Cannot create window '{}': {e}", desc.title);
                return None;
            }
        };
        let handle = match WindowHandle::new(window, backend, viewport) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Cannot attach window '{}' to {}: {e}", desc.title, backend.name());
                return None;
            }
        };
        let id = self.windows.insert(handle);
        log::debug!("Window '{}' created in slot {:?}", desc.title, id);
        id
    }

    /// Window at `id`
    pub fn get(&self, id: WindowId) -> Option<&WindowHandle> {
        self.windows.get(id)
    }

    /// Window at `id`, mutably
    pub fn get_mut(&mut self, id: WindowId) -> Option<&mut WindowHandle> {
        self.windows.get_mut(id)
    }

    /// Flag a window for destruction at the next refresh
    pub fn queue_destroy(&mut self, id: WindowId) -> bool {
        match self.windows.get_mut(id) {
            Some(window) => {
                window.queue_destroy();
                true
            }
            None => false,
        }
    }

    /// Flag every window for destruction
    pub fn queue_destroy_all(&mut self) {
        for window in self.windows.iter_mut() {
            window.queue_destroy();
        }
    }

    /// Number of live windows, including ones queued for destruction
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no window is live
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Destroy queued windows, then pump and draw the rest
    ///
    /// Hidden and minimized windows still have their events drained but are not drawn.
    pub fn refresh(&mut self, backend: &mut dyn RenderBackend, time: f64) {
        for id in self.windows.indices() {
            if self.windows.get(id).is_some_and(WindowHandle::is_pending_destroy) {
                if let Some(window) = self.windows.remove(id) {
                    drop(window.destroy(backend));
                    log::debug!("Window in slot {id:?} destroyed");
                }
            }
        }

        for window in self.windows.iter_mut() {
            let events = window.drain_events(backend);
            if events.contains(&PlatformEvent::CloseRequested) || window.platform().should_close() {
                window.queue_destroy();
                continue;
            }
            if !window.is_drawable() {
                continue;
            }
            if let Err(e) = window.render_panels(backend, time) {
                log::error!("Window frame failed: {e}");
            }
        }
    }

    /// Destroy every window now
    pub fn destroy_all(&mut self, backend: &mut dyn RenderBackend) {
        for window in self.windows.drain() {
            drop(window.destroy(backend));
        }
    }
}

impl std::fmt::Debug for WindowManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowManager")
            .field("windows", &self.windows.len())
            .field("capacity", &self.windows.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessBackend;
    use crate::window::{ContextApi, HeadlessPlatform};

    fn desc(title: &str) -> WindowDescriptor {
        WindowDescriptor::new(title, 320, 240).with_api(ContextApi::None)
    }

    fn create(
        manager: &mut WindowManager,
        platform: &mut HeadlessPlatform,
        backend: &mut HeadlessBackend,
        title: &str,
    ) -> Option<WindowId> {
        manager.create_window(platform, None, backend, &desc(title), Viewport::Scene)
    }

    #[test]
    fn test_creating_past_capacity_returns_none() {
        let mut platform = HeadlessPlatform::new();
        let mut backend = HeadlessBackend::new();
        let mut manager = WindowManager::with_capacity(2);
        assert!(create(&mut manager, &mut platform, &mut backend, "a").is_some());
        assert!(create(&mut manager, &mut platform, &mut backend, "b").is_some());
        assert!(create(&mut manager, &mut platform, &mut backend, "c").is_none());
        assert_eq!(platform.window_count(), 2);
    }

    #[test]
    fn test_queued_window_lives_until_next_refresh() {
        let mut platform = HeadlessPlatform::new();
        let mut backend = HeadlessBackend::new();
        let mut manager = WindowManager::new();
        let id = create(&mut manager, &mut platform, &mut backend, "a").expect("window");
        let probe = platform.window(0).expect("probe");

        assert!(manager.queue_destroy(id));
        assert!(manager.get(id).is_some());
        assert!(!probe.is_destroyed());

        manager.refresh(&mut backend, 0.0);
        assert!(manager.get(id).is_none());
        assert!(probe.is_destroyed());
        assert_eq!(probe.presented(), 0);
    }

    #[test]
    fn test_close_request_queues_window() {
        let mut platform = HeadlessPlatform::new();
        let mut backend = HeadlessBackend::new();
        let mut manager = WindowManager::new();
        let id = create(&mut manager, &mut platform, &mut backend, "a").expect("window");

        platform.window(0).expect("probe").request_close();
        manager.refresh(&mut backend, 0.0);
        assert!(manager.get(id).is_some_and(WindowHandle::is_pending_destroy));
        manager.refresh(&mut backend, 0.1);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_only_drawable_windows_present() {
        let mut platform = HeadlessPlatform::new();
        let mut backend = HeadlessBackend::new();
        let mut manager = WindowManager::new();
        create(&mut manager, &mut platform, &mut backend, "shown").expect("window");
        create(&mut manager, &mut platform, &mut backend, "minimized").expect("window");
        let shown = platform.window(0).expect("probe");
        let minimized = platform.window(1).expect("probe");
        minimized.set_iconified(true);

        manager.refresh(&mut backend, 0.0);
        assert_eq!(shown.presented(), 1);
        assert_eq!(minimized.presented(), 0);
    }

    #[test]
    fn test_failed_creation_is_logged_not_fatal() {
        let mut platform = HeadlessPlatform::failing();
        let mut backend = HeadlessBackend::new();
        let mut manager = WindowManager::new();
        assert!(create(&mut manager, &mut platform, &mut backend, "a").is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_slot_is_reused_after_destroy() {
        let mut platform = HeadlessPlatform::new();
        let mut backend = HeadlessBackend::new();
        let mut manager = WindowManager::with_capacity(1);
        let first = create(&mut manager, &mut platform, &mut backend, "a").expect("window");
        manager.queue_destroy_all();
        manager.refresh(&mut backend, 0.0);

        let second = create(&mut manager, &mut platform, &mut backend, "b").expect("window");
        assert_ne!(first, second);
        assert!(manager.get(first).is_none());
        manager.destroy_all(&mut backend);
        assert_eq!(backend.live_resources(), 0);
    }
}

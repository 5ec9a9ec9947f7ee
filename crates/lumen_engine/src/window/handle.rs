//! One window with its surface, viewport, UI overlay and panels

use std::collections::BTreeMap;

use super::{CursorMode, PlatformEvent, PlatformWindow, WindowResult};
use crate::render::{ClearFlags, RenderBackend, RenderError, SurfaceId};
use crate::scene::Camera;
use crate::ui::{Panel, PanelId, UiContext, UiFrame, UiRenderer};

/// Camera a window is drawn through
#[derive(Debug, Clone, PartialEq)]
pub enum Viewport {
    /// The window keeps its own camera
    Owned(Camera),
    /// The window shows the scene's main camera
    Scene,
}

impl Viewport {
    /// The owned camera, if any
    pub const fn camera(&self) -> Option<&Camera> {
        match self {
            Self::Owned(camera) => Some(camera),
            Self::Scene => None,
        }
    }
}

/// A native window bound to a backend surface
pub struct WindowHandle {
    window: Box<dyn PlatformWindow>,
    surface: SurfaceId,
    viewport: Viewport,
    ui: UiContext,
    ui_renderer: UiRenderer,
    panels: BTreeMap<PanelId, Box<dyn Panel>>,
    next_panel: u64,
    mouse_captured: bool,
    iconified: bool,
    pending_destroy: bool,
}

impl WindowHandle {
    /// Attach `window` to `backend` and create its UI overlay
    pub fn new(
        mut window: Box<dyn PlatformWindow>,
        backend: &mut dyn RenderBackend,
        viewport: Viewport,
    ) -> WindowResult<Self> {
        let surface = backend.attach_surface(window.as_surface_mut())?;
        let ui_renderer = UiRenderer::new(backend);
        let mut handle = Self {
            iconified: window.is_iconified(),
            window,
            surface,
            viewport,
            ui: UiContext::new(),
            ui_renderer,
            panels: BTreeMap::new(),
            next_panel: 0,
            mouse_captured: false,
            pending_destroy: false,
        };
        let (width, height) = handle.window.framebuffer_size();
        if let Viewport::Owned(camera) = &mut handle.viewport {
            camera.create_projection(width, height);
        }
        Ok(handle)
    }

    /// The native window
    pub fn platform(&self) -> &dyn PlatformWindow {
        &*self.window
    }

    /// The native window, mutably
    pub fn platform_mut(&mut self) -> &mut dyn PlatformWindow {
        &mut *self.window
    }

    /// Backend surface of the window
    pub const fn surface(&self) -> SurfaceId {
        self.surface
    }

    /// Camera association
    pub const fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Camera association, mutably
    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    /// UI overlay state
    pub const fn ui(&self) -> &UiContext {
        &self.ui
    }

    /// UI overlay state, mutably
    pub fn ui_mut(&mut self) -> &mut UiContext {
        &mut self.ui
    }

    /// Hand a panel to the window; it is drawn every UI frame until it closes
    pub fn add_panel(&mut self, panel: impl Panel + 'static) -> PanelId {
        let id = PanelId(self.next_panel);
        self.next_panel += 1;
        self.panels.insert(id, Box::new(panel));
        id
    }

    /// Take a panel back
    pub fn remove_panel(&mut self, id: PanelId) -> Option<Box<dyn Panel>> {
        self.panels.remove(&id)
    }

    /// Number of open panels
    pub fn panel_count(&self) -> usize {
        self.panels.len()
    }

    /// Lock the cursor for camera control, or release it to the UI
    pub fn set_mouse_captured(&mut self, captured: bool) {
        self.mouse_captured = captured;
        self.window
            .set_cursor_mode(if captured { CursorMode::Disabled } else { CursorMode::Normal });
        self.ui.set_pointer_enabled(!captured);
    }

    /// Whether the cursor is locked
    pub const fn is_mouse_captured(&self) -> bool {
        self.mouse_captured
    }

    /// Whether the window is minimized
    pub const fn is_iconified(&self) -> bool {
        self.iconified
    }

    /// Whether the window is neither hidden nor minimized
    pub fn is_drawable(&self) -> bool {
        !self.iconified && self.window.is_visible()
    }

    /// Mark the window for destruction at the next refresh
    pub fn queue_destroy(&mut self) {
        self.pending_destroy = true;
    }

    /// Whether the window will be destroyed at the next refresh
    pub const fn is_pending_destroy(&self) -> bool {
        self.pending_destroy
    }

    /// Take the window's events, feeding the UI and tracking size and iconify state
    ///
    /// The events are returned so the caller can route them to input bindings.
    pub fn drain_events(&mut self, backend: &mut dyn RenderBackend) -> Vec<PlatformEvent> {
        let events = self.window.drain_events();
        for event in &events {
            self.ui.handle_event(event);
            match *event {
                PlatformEvent::FramebufferResized(width, height) => {
                    backend.resize_surface(self.surface, width, height);
                    if let Viewport::Owned(camera) = &mut self.viewport {
                        camera.create_projection(width, height);
                    }
                }
                PlatformEvent::Iconified(iconified) => self.iconified = iconified,
                _ => {}
            }
        }
        events
    }

    /// Start the window's UI frame
    pub fn begin_ui(&mut self, time: f64) {
        let pixels_per_point = self.pixels_per_point();
        self.ui.begin_frame(time, self.window.size(), pixels_per_point);
    }

    /// Draw the panels and finish the UI frame; closed panels are dropped
    pub fn end_ui(&mut self) -> UiFrame {
        let ctx = self.ui.context().clone();
        for panel in self.panels.values_mut() {
            panel.show(&ctx);
        }
        self.panels.retain(|id, panel| {
            let open = panel.is_open();
            if !open {
                log::debug!("Panel {} '{}' closed", id.0, panel.title());
            }
            open
        });
        self.ui.end_frame()
    }

    /// Paint a finished UI frame into the bound target
    pub fn paint_ui(&mut self, backend: &mut dyn RenderBackend, frame: &UiFrame) {
        let size = self.window.framebuffer_size();
        self.ui_renderer.paint(backend, size, frame);
    }

    /// Begin a frame on the window's surface
    pub fn begin_frame(&mut self, backend: &mut dyn RenderBackend) -> Result<(), RenderError> {
        backend.begin_frame(self.surface, self.window.as_surface_mut())
    }

    /// Present the window's surface
    pub fn end_frame(&mut self, backend: &mut dyn RenderBackend) -> Result<(), RenderError> {
        backend.end_frame(self.surface, self.window.as_surface_mut())
    }

    /// Draw a frame containing only the UI panels
    pub fn render_panels(&mut self, backend: &mut dyn RenderBackend, time: f64) -> Result<(), RenderError> {
        match self.begin_frame(backend) {
            Ok(()) => {}
            Err(RenderError::SurfaceUnavailable) => return Ok(()),
            Err(e) => return Err(e),
        }
        backend.clear(ClearFlags::COLOR | ClearFlags::DEPTH);
        self.begin_ui(time);
        let frame = self.end_ui();
        self.paint_ui(backend, &frame);
        self.end_frame(backend)
    }

    /// Free the overlay's device resources and detach the surface
    ///
    /// Returns the native window, which closes when dropped. A GL backend must be
    /// dropped before the window owning its context.
    pub fn destroy(mut self, backend: &mut dyn RenderBackend) -> Box<dyn PlatformWindow> {
        self.ui_renderer.destroy(backend);
        backend.detach_surface(self.surface);
        self.window
    }

    fn pixels_per_point(&self) -> f32 {
        let (window_width, _) = self.window.size();
        let (framebuffer_width, _) = self.window.framebuffer_size();
        if window_width == 0 || framebuffer_width == 0 {
            return 1.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = framebuffer_width as f32 / window_width as f32;
        ratio
    }
}

impl std::fmt::Debug for WindowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowHandle")
            .field("surface", &self.surface)
            .field("viewport", &self.viewport)
            .field("panels", &self.panels.len())
            .field("mouse_captured", &self.mouse_captured)
            .field("iconified", &self.iconified)
            .field("pending_destroy", &self.pending_destroy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ButtonPhase, Key};
    use crate::render::{DeviceCall, HeadlessBackend};
    use crate::window::{ContextApi, HeadlessPlatform, HeadlessWindowProbe, Platform, WindowDescriptor};

    struct Counter {
        shown: usize,
        close_after: usize,
    }

    impl Panel for Counter {
        fn title(&self) -> &str {
            "Counter"
        }

        fn show(&mut self, ctx: &egui::Context) {
            self.shown += 1;
            egui::Window::new("Counter").show(ctx, |ui| ui.label(self.shown.to_string()));
        }

        fn is_open(&self) -> bool {
            self.shown < self.close_after
        }
    }

    fn open(backend: &mut HeadlessBackend, viewport: Viewport) -> (WindowHandle, HeadlessWindowProbe) {
        let mut platform = HeadlessPlatform::new();
        let desc = WindowDescriptor::new("handle", 800, 600).with_api(ContextApi::None);
        let window = platform.create_window(&desc, None).expect("headless window");
        let handle = WindowHandle::new(window, backend, viewport).expect("attach");
        (handle, platform.window(0).expect("probe"))
    }

    #[test]
    fn test_resize_reprojects_owned_camera() {
        let mut backend = HeadlessBackend::new();
        let (mut handle, probe) = open(&mut backend, Viewport::Owned(Camera::default()));
        assert!((handle.viewport().camera().expect("owned").aspect() - 800.0 / 600.0).abs() < 1e-5);

        probe.resize(1000, 500);
        handle.drain_events(&mut backend);
        assert!((handle.viewport().camera().expect("owned").aspect() - 2.0).abs() < 1e-5);
        assert_eq!(
            backend.count_calls(|call| matches!(call, DeviceCall::ResizeSurface(_, 1000, 500))),
            1
        );
    }

    #[test]
    fn test_drained_events_are_returned_for_routing() {
        let mut backend = HeadlessBackend::new();
        let (mut handle, probe) = open(&mut backend, Viewport::Scene);
        probe.press_key(Key::Escape);
        probe.set_iconified(true);
        let events = handle.drain_events(&mut backend);
        assert_eq!(events[0], PlatformEvent::Key(Key::Escape, ButtonPhase::Pressed));
        assert!(handle.is_iconified());
        assert!(!handle.is_drawable());
    }

    #[test]
    fn test_panels_draw_until_closed() {
        let mut backend = HeadlessBackend::new();
        let (mut handle, probe) = open(&mut backend, Viewport::Scene);
        handle.add_panel(Counter { shown: 0, close_after: 2 });

        handle.render_panels(&mut backend, 0.0).expect("frame");
        assert_eq!(handle.panel_count(), 1);
        handle.render_panels(&mut backend, 0.1).expect("frame");
        assert_eq!(handle.panel_count(), 0);
        assert_eq!(probe.presented(), 2);
    }

    #[test]
    fn test_capture_locks_cursor_and_ui_pointer() {
        let mut backend = HeadlessBackend::new();
        let (mut handle, probe) = open(&mut backend, Viewport::Scene);
        handle.set_mouse_captured(true);
        assert_eq!(probe.cursor_mode(), CursorMode::Disabled);
        assert!(!handle.ui().pointer_enabled());
        handle.set_mouse_captured(false);
        assert_eq!(probe.cursor_mode(), CursorMode::Normal);
        assert!(handle.ui().pointer_enabled());
    }

    #[test]
    fn test_destroy_detaches_and_frees_overlay() {
        let mut backend = HeadlessBackend::new();
        let (mut handle, probe) = open(&mut backend, Viewport::Scene);
        handle.render_panels(&mut backend, 0.0).expect("frame");
        assert!(backend.live_resources() > 0);

        let native = handle.destroy(&mut backend);
        assert_eq!(backend.live_resources(), 0);
        assert!(!probe.is_destroyed());
        drop(native);
        assert!(probe.is_destroyed());
        assert_eq!(backend.count_calls(|call| matches!(call, DeviceCall::DetachSurface(_))), 1);
    }
}

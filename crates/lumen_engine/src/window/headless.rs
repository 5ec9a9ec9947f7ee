//! Windows without a display
//!
//! [`HeadlessPlatform`] hands out [`HeadlessWindow`]s whose state is shared with a
//! [`HeadlessWindowProbe`]. Tests keep a clone of the platform, look up the probe of a
//! window and use it to inject input or read back what the engine did to the window.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use super::{
    CursorMode, Platform, PlatformEvent, PlatformWindow, WindowDescriptor, WindowError, WindowResult,
};
use crate::input::{ButtonPhase, InputDevice, Key, MouseButton};
use crate::render::RenderSurface;

#[derive(Debug, Default)]
struct WindowState {
    title: String,
    size: (u32, u32),
    events: Vec<PlatformEvent>,
    keys: HashSet<Key>,
    buttons: HashSet<MouseButton>,
    should_close: bool,
    visible: bool,
    iconified: bool,
    cursor_mode: CursorMode,
    icon: Option<(u32, u32)>,
    presented: u64,
    destroyed: bool,
}

/// Test-side view of a headless window
#[derive(Debug, Clone)]
pub struct HeadlessWindowProbe {
    state: Rc<RefCell<WindowState>>,
}

impl HeadlessWindowProbe {
    /// Queue a raw event for the next drain
    pub fn push_event(&self, event: PlatformEvent) {
        self.state.borrow_mut().events.push(event);
    }

    /// Hold a key down and queue its press event
    pub fn press_key(&self, key: Key) {
        let mut state = self.state.borrow_mut();
        state.keys.insert(key);
        state.events.push(PlatformEvent::Key(key, ButtonPhase::Pressed));
    }

    /// Let go of a key and queue its release event
    pub fn release_key(&self, key: Key) {
        let mut state = self.state.borrow_mut();
        state.keys.remove(&key);
        state.events.push(PlatformEvent::Key(key, ButtonPhase::Released));
    }

    /// Hold a mouse button down and queue its press event
    pub fn press_button(&self, button: MouseButton) {
        let mut state = self.state.borrow_mut();
        state.buttons.insert(button);
        state.events.push(PlatformEvent::MouseButton(button, ButtonPhase::Pressed));
    }

    /// Change the size and queue the resize event
    pub fn resize(&self, width: u32, height: u32) {
        let mut state = self.state.borrow_mut();
        state.size = (width, height);
        state.events.push(PlatformEvent::FramebufferResized(width, height));
    }

    /// Minimize or restore and queue the event
    pub fn set_iconified(&self, iconified: bool) {
        let mut state = self.state.borrow_mut();
        state.iconified = iconified;
        state.events.push(PlatformEvent::Iconified(iconified));
    }

    /// Simulate the close button
    pub fn request_close(&self) {
        let mut state = self.state.borrow_mut();
        state.should_close = true;
        state.events.push(PlatformEvent::CloseRequested);
    }

    /// Number of buffer swaps
    pub fn presented(&self) -> u64 {
        self.state.borrow().presented
    }

    /// Current cursor mode
    pub fn cursor_mode(&self) -> CursorMode {
        self.state.borrow().cursor_mode
    }

    /// Size of the last icon set
    pub fn icon(&self) -> Option<(u32, u32)> {
        self.state.borrow().icon
    }

    /// Window title
    pub fn title(&self) -> String {
        self.state.borrow().title.clone()
    }

    /// Whether the engine dropped the window
    pub fn is_destroyed(&self) -> bool {
        self.state.borrow().destroyed
    }
}

/// A window that exists only in memory
#[derive(Debug)]
pub struct HeadlessWindow {
    state: Rc<RefCell<WindowState>>,
}

impl Drop for HeadlessWindow {
    fn drop(&mut self) {
        self.state.borrow_mut().destroyed = true;
    }
}

impl RenderSurface for HeadlessWindow {
    fn framebuffer_size(&self) -> (u32, u32) {
        let state = self.state.borrow();
        if state.iconified {
            (0, 0)
        } else {
            state.size
        }
    }

    fn swap_buffers(&mut self) {
        self.state.borrow_mut().presented += 1;
    }
}

impl InputDevice for HeadlessWindow {
    fn is_key_down(&self, key: Key) -> bool {
        self.state.borrow().keys.contains(&key)
    }

    fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.state.borrow().buttons.contains(&button)
    }
}

impl PlatformWindow for HeadlessWindow {
    fn drain_events(&mut self) -> Vec<PlatformEvent> {
        std::mem::take(&mut self.state.borrow_mut().events)
    }

    fn should_close(&self) -> bool {
        self.state.borrow().should_close
    }

    fn set_should_close(&mut self, close: bool) {
        self.state.borrow_mut().should_close = close;
    }

    fn size(&self) -> (u32, u32) {
        self.state.borrow().size
    }

    fn set_title(&mut self, title: &str) {
        self.state.borrow_mut().title = title.to_string();
    }

    fn set_visible(&mut self, visible: bool) {
        self.state.borrow_mut().visible = visible;
    }

    fn is_visible(&self) -> bool {
        self.state.borrow().visible
    }

    fn is_iconified(&self) -> bool {
        self.state.borrow().iconified
    }

    fn set_cursor_mode(&mut self, mode: CursorMode) {
        self.state.borrow_mut().cursor_mode = mode;
    }

    fn set_input_modes(&mut self, _sticky: bool, _raw_motion: bool) {}

    fn set_icon(&mut self, width: u32, height: u32, rgba: &[u8]) {
        assert_eq!(rgba.len(), width as usize * height as usize * 4, "Icon size mismatch");
        self.state.borrow_mut().icon = Some((width, height));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_surface_mut(&mut self) -> &mut dyn RenderSurface {
        self
    }

    fn as_input(&self) -> &dyn InputDevice {
        self
    }
}

#[derive(Debug, Default)]
struct PlatformState {
    windows: Vec<HeadlessWindowProbe>,
    polls: u64,
    fail_windows: bool,
}

/// Platform for tests and servers; clones share the same windows
#[derive(Debug, Clone, Default)]
pub struct HeadlessPlatform {
    state: Rc<RefCell<PlatformState>>,
}

impl HeadlessPlatform {
    /// Platform that opens windows normally
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform whose window creation always fails
    pub fn failing() -> Self {
        let platform = Self::default();
        platform.state.borrow_mut().fail_windows = true;
        platform
    }

    /// Probe of the `index`-th window ever created
    pub fn window(&self, index: usize) -> Option<HeadlessWindowProbe> {
        self.state.borrow().windows.get(index).cloned()
    }

    /// Number of windows created so far
    pub fn window_count(&self) -> usize {
        self.state.borrow().windows.len()
    }

    /// Number of `poll_events` calls
    pub fn polls(&self) -> u64 {
        self.state.borrow().polls
    }
}

impl Platform for HeadlessPlatform {
    fn name(&self) -> &'static str {
        "Headless"
    }

    fn create_window(
        &mut self,
        desc: &WindowDescriptor,
        _share: Option<&dyn PlatformWindow>,
    ) -> WindowResult<Box<dyn PlatformWindow>> {
        let mut platform = self.state.borrow_mut();
        if platform.fail_windows {
            return Err(WindowError::CreationFailed(desc.title.clone()));
        }
        let state = Rc::new(RefCell::new(WindowState {
            title: desc.title.clone(),
            size: (desc.width, desc.height),
            visible: desc.visible,
            ..Default::default()
        }));
        platform.windows.push(HeadlessWindowProbe {
            state: Rc::clone(&state),
        });
        Ok(Box::new(HeadlessWindow { state }))
    }

    fn poll_events(&mut self) {
        self.state.borrow_mut().polls += 1;
    }

    fn set_swap_interval(&mut self, _vsync: bool) {}

    fn supports_raw_motion(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::ContextApi;

    fn open(platform: &mut HeadlessPlatform) -> Box<dyn PlatformWindow> {
        let desc = WindowDescriptor::new("test", 320, 240).with_api(ContextApi::None);
        platform.create_window(&desc, None).expect("headless window")
    }

    #[test]
    fn test_probe_injects_events_and_key_state() {
        let mut platform = HeadlessPlatform::new();
        let mut window = open(&mut platform);
        let probe = platform.window(0).expect("probe");

        probe.press_key(Key::W);
        assert!(window.is_key_down(Key::W));
        assert_eq!(window.drain_events(), [PlatformEvent::Key(Key::W, ButtonPhase::Pressed)]);
        assert!(window.drain_events().is_empty());

        probe.release_key(Key::W);
        assert!(!window.is_key_down(Key::W));
    }

    #[test]
    fn test_iconified_window_has_no_drawable_area() {
        let mut platform = HeadlessPlatform::new();
        let window = open(&mut platform);
        platform.window(0).expect("probe").set_iconified(true);
        assert_eq!(window.framebuffer_size(), (0, 0));
        assert_eq!(window.size(), (320, 240));
    }

    #[test]
    fn test_dropping_window_is_observable() {
        let mut platform = HeadlessPlatform::new();
        let window = open(&mut platform);
        let probe = platform.window(0).expect("probe");
        assert!(!probe.is_destroyed());
        drop(window);
        assert!(probe.is_destroyed());
    }

    #[test]
    fn test_failing_platform_reports_creation_error() {
        let mut platform = HeadlessPlatform::failing();
        let desc = WindowDescriptor::new("nope", 1, 1);
        assert!(matches!(
            platform.create_window(&desc, None),
            Err(WindowError::CreationFailed(_))
        ));
    }
}

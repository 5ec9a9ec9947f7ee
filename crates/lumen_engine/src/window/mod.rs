//! Windows, their platform layer and the window pool
//!
//! A [`Platform`] opens native windows and pumps their events. Each window is wrapped
//! in a [`WindowHandle`] that also owns its backend surface, viewport, UI context and
//! panels. Secondary windows live in the fixed-capacity [`WindowManager`] and are
//! destroyed lazily at the start of the next refresh.

pub mod desktop;
pub mod handle;
pub mod headless;
pub mod manager;

use std::any::Any;

use thiserror::Error;

use crate::input::{ButtonPhase, InputDevice, Key, MouseButton};
use crate::render::{RenderError, RenderSurface};

pub use desktop::{GlfwPlatform, GlfwWindow};
pub use handle::{Viewport, WindowHandle};
pub use headless::{HeadlessPlatform, HeadlessWindow, HeadlessWindowProbe};
pub use manager::{WindowId, WindowManager, DEFAULT_WINDOW_CAPACITY};

/// Window and platform errors
#[derive(Debug, Error)]
pub enum WindowError {
    /// The windowing toolkit could not start
    #[error("Windowing toolkit initialization failed: {0}")]
    ToolkitInit(String),

    /// A native window could not be created
    #[error("Window creation failed: {0}")]
    CreationFailed(String),

    /// The window's surface could not be attached to the renderer
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// Graphics API a window's context is created for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextApi {
    /// OpenGL 3.3 core context, optionally with debug output
    OpenGl {
        /// Request a debug context
        debug: bool,
    },
    /// No client API, for Vulkan or headless presentation
    None,
}

/// How to open a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowDescriptor {
    /// Title bar text
    pub title: String,
    /// Width in screen coordinates
    pub width: u32,
    /// Height in screen coordinates
    pub height: u32,
    /// Cover the primary monitor at its current video mode
    pub fullscreen: bool,
    /// Maximize after creation
    pub maximized: bool,
    /// Show immediately
    pub visible: bool,
    /// Context to create
    pub api: ContextApi,
}

impl WindowDescriptor {
    /// Visible windowed OpenGL window
    pub fn new(title: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            title: title.into(),
            width,
            height,
            fullscreen: false,
            maximized: false,
            visible: true,
            api: ContextApi::OpenGl { debug: cfg!(debug_assertions) },
        }
    }

    /// Use a different context API
    #[must_use]
    pub const fn with_api(mut self, api: ContextApi) -> Self {
        self.api = api;
        self
    }
}

/// Cursor behaviour inside a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorMode {
    /// Visible and free
    #[default]
    Normal,
    /// Invisible while over the window
    Hidden,
    /// Hidden and locked, reporting unbounded motion
    Disabled,
}

/// Something that happened to a window since the last poll
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlatformEvent {
    /// A key changed state
    Key(Key, ButtonPhase),
    /// A mouse button changed state
    MouseButton(MouseButton, ButtonPhase),
    /// The cursor moved, in screen coordinates relative to the window
    CursorMoved(f64, f64),
    /// The wheel or trackpad scrolled
    Scroll(f64, f64),
    /// The drawable size changed, in pixels
    FramebufferResized(u32, u32),
    /// The window was minimized or restored
    Iconified(bool),
    /// The window gained or lost focus
    Focused(bool),
    /// Text input
    Char(char),
    /// The user asked to close the window
    CloseRequested,
}

/// A windowing toolkit
pub trait Platform {
    /// Toolkit name for logs
    fn name(&self) -> &'static str;

    /// Open a window; GL windows given `share` join its context's share group
    fn create_window(
        &mut self,
        desc: &WindowDescriptor,
        share: Option<&dyn PlatformWindow>,
    ) -> WindowResult<Box<dyn PlatformWindow>>;

    /// Process pending native events without blocking
    fn poll_events(&mut self);

    /// Enable or disable vertical sync for the current GL context
    fn set_swap_interval(&mut self, vsync: bool);

    /// Whether unaccelerated mouse motion is available
    fn supports_raw_motion(&self) -> bool;
}

/// A native window
pub trait PlatformWindow: RenderSurface + InputDevice {
    /// Take the events received since the last call
    fn drain_events(&mut self) -> Vec<PlatformEvent>;

    /// Whether the close flag is set
    fn should_close(&self) -> bool;

    /// Set or clear the close flag
    fn set_should_close(&mut self, close: bool);

    /// Size in screen coordinates
    fn size(&self) -> (u32, u32);

    /// Change the title bar text
    fn set_title(&mut self, title: &str);

    /// Show or hide the window
    fn set_visible(&mut self, visible: bool);

    /// Whether the window is shown
    fn is_visible(&self) -> bool;

    /// Whether the window is minimized
    fn is_iconified(&self) -> bool;

    /// Change the cursor behaviour
    fn set_cursor_mode(&mut self, mode: CursorMode);

    /// Configure sticky keys and buttons, and raw mouse motion where supported
    fn set_input_modes(&mut self, sticky: bool, raw_motion: bool);

    /// Replace the window icon with RGBA8 pixels
    fn set_icon(&mut self, width: u32, height: u32, rgba: &[u8]);

    /// Access to the concrete type, for toolkit-specific operations like context sharing
    fn as_any(&self) -> &dyn Any;

    /// The window as a backend surface
    fn as_surface_mut(&mut self) -> &mut dyn RenderSurface;

    /// The window as an input state source
    fn as_input(&self) -> &dyn InputDevice;
}

/// Show a native modal error dialog
pub fn popup_error(title: &str, message: &str) {
    let result = native_dialog::MessageDialog::new()
        .set_type(native_dialog::MessageType::Error)
        .set_title(title)
        .set_text(message)
        .show_alert();
    if let Err(e) = result {
        log::error!("Could not show error dialog: {e}");
    }
}

//! Desktop windows through GLFW

use std::any::Any;
use std::ffi::c_void;

use ash::vk;
use glfw::Context;

use super::{
    ContextApi, CursorMode, Platform, PlatformEvent, PlatformWindow, WindowDescriptor, WindowError,
    WindowResult,
};
use crate::input::{ButtonPhase, InputDevice, Key, MouseButton};
use crate::render::{RenderError, RenderSurface};

/// The GLFW library, initialized for the lifetime of the value
pub struct GlfwPlatform {
    glfw: glfw::Glfw,
}

impl GlfwPlatform {
    /// Initialize GLFW; errors reported by GLFW later on are logged
    pub fn new() -> WindowResult<Self> {
        let glfw = glfw::init(|error: glfw::Error, description: String| {
            log::error!("GLFW error {error:?}: {description}");
        })
        .map_err(|e| WindowError::ToolkitInit(format!("{e:?}")))?;
        log::info!("GLFW {}", glfw::get_version_string());
        Ok(Self { glfw })
    }

    fn apply_hints(&mut self, desc: &WindowDescriptor) {
        self.glfw.default_window_hints();
        self.glfw.window_hint(glfw::WindowHint::Visible(desc.visible));
        self.glfw.window_hint(glfw::WindowHint::Resizable(true));
        match desc.api {
            ContextApi::OpenGl { debug } => {
                self.glfw.window_hint(glfw::WindowHint::ContextVersion(3, 3));
                self.glfw
                    .window_hint(glfw::WindowHint::OpenGlProfile(glfw::OpenGlProfileHint::Core));
                self.glfw.window_hint(glfw::WindowHint::OpenGlForwardCompat(true));
                self.glfw.window_hint(glfw::WindowHint::OpenGlDebugContext(debug));
            }
            ContextApi::None => {
                self.glfw
                    .window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
            }
        }

        if desc.fullscreen {
            let mode = self
                .glfw
                .with_primary_monitor(|_, monitor| monitor.and_then(|m| m.get_video_mode()));
            if let Some(mode) = mode {
                self.glfw.window_hint(glfw::WindowHint::RedBits(Some(mode.red_bits)));
                self.glfw.window_hint(glfw::WindowHint::GreenBits(Some(mode.green_bits)));
                self.glfw.window_hint(glfw::WindowHint::BlueBits(Some(mode.blue_bits)));
                self.glfw
                    .window_hint(glfw::WindowHint::RefreshRate(Some(mode.refresh_rate)));
            }
        }
    }
}

impl Platform for GlfwPlatform {
    fn name(&self) -> &'static str {
        "GLFW"
    }

    fn create_window(
        &mut self,
        desc: &WindowDescriptor,
        share: Option<&dyn PlatformWindow>,
    ) -> WindowResult<Box<dyn PlatformWindow>> {
        self.apply_hints(desc);

        let mode = glfw::WindowMode::Windowed;
        let shared_with = share.and_then(|window| window.as_any().downcast_ref::<GlfwWindow>());
        let created = match (desc.api, shared_with) {
            (ContextApi::OpenGl { .. }, Some(parent)) => {
                parent.window.create_shared(desc.width, desc.height, &desc.title, mode)
            }
            _ => self.glfw.create_window(desc.width, desc.height, &desc.title, mode),
        };
        let (mut window, events) =
            created.ok_or_else(|| WindowError::CreationFailed(desc.title.clone()))?;

        if desc.fullscreen {
            self.glfw.with_primary_monitor(|_, monitor| {
                let Some(monitor) = monitor else {
                    log::warn!("No primary monitor, staying windowed");
                    return;
                };
                if let Some(video) = monitor.get_video_mode() {
                    window.set_monitor(
                        glfw::WindowMode::FullScreen(&*monitor),
                        0,
                        0,
                        video.width,
                        video.height,
                        Some(video.refresh_rate),
                    );
                }
            });
        } else if desc.maximized {
            window.maximize();
        }

        window.set_all_polling(true);
        Ok(Box::new(GlfwWindow {
            window,
            events,
            has_context: matches!(desc.api, ContextApi::OpenGl { .. }),
        }))
    }

    fn poll_events(&mut self) {
        self.glfw.poll_events();
    }

    fn set_swap_interval(&mut self, vsync: bool) {
        let interval = if vsync {
            glfw::SwapInterval::Sync(1)
        } else {
            glfw::SwapInterval::None
        };
        self.glfw.set_swap_interval(interval);
    }

    fn supports_raw_motion(&self) -> bool {
        self.glfw.supports_raw_motion()
    }
}

/// A GLFW window and its event queue
pub struct GlfwWindow {
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    has_context: bool,
}

impl GlfwWindow {
    /// The underlying GLFW window
    pub fn raw(&self) -> &glfw::Window {
        &self.window
    }
}

impl RenderSurface for GlfwWindow {
    fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (clamp_size(width), clamp_size(height))
    }

    fn make_current(&mut self) {
        if self.has_context {
            self.window.make_current();
        }
    }

    fn swap_buffers(&mut self) {
        if self.has_context {
            self.window.swap_buffers();
        }
    }

    fn gl_proc_address(&mut self, name: &str) -> *const c_void {
        self.window.get_proc_address(name)
    }

    fn vulkan_instance_extensions(&self) -> Result<Vec<String>, RenderError> {
        self.window
            .glfw
            .get_required_instance_extensions()
            .ok_or_else(|| RenderError::Surface("GLFW reports no Vulkan presentation support".to_string()))
    }

    fn create_vulkan_surface(&mut self, instance: vk::Instance) -> Result<vk::SurfaceKHR, RenderError> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self
            .window
            .create_window_surface(instance, std::ptr::null(), &mut surface);
        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(RenderError::Surface(format!("Failed to create Vulkan surface: {result:?}")))
        }
    }
}

impl InputDevice for GlfwWindow {
    fn is_key_down(&self, key: Key) -> bool {
        self.window.get_key(to_glfw_key(key)) != glfw::Action::Release
    }

    fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.window.get_mouse_button(to_glfw_button(button)) != glfw::Action::Release
    }
}

impl PlatformWindow for GlfwWindow {
    fn drain_events(&mut self) -> Vec<PlatformEvent> {
        glfw::flush_messages(&self.events)
            .filter_map(|(_, event)| translate_event(event))
            .collect()
    }

    fn should_close(&self) -> bool {
        self.window.should_close()
    }

    fn set_should_close(&mut self, close: bool) {
        self.window.set_should_close(close);
    }

    fn size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_size();
        (clamp_size(width), clamp_size(height))
    }

    fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }

    fn set_visible(&mut self, visible: bool) {
        if visible {
            self.window.show();
        } else {
            self.window.hide();
        }
    }

    fn is_visible(&self) -> bool {
        self.window.is_visible()
    }

    fn is_iconified(&self) -> bool {
        self.window.is_iconified()
    }

    fn set_cursor_mode(&mut self, mode: CursorMode) {
        self.window.set_cursor_mode(match mode {
            CursorMode::Normal => glfw::CursorMode::Normal,
            CursorMode::Hidden => glfw::CursorMode::Hidden,
            CursorMode::Disabled => glfw::CursorMode::Disabled,
        });
    }

    fn set_input_modes(&mut self, sticky: bool, raw_motion: bool) {
        self.window.set_sticky_keys(sticky);
        self.window.set_sticky_mouse_buttons(sticky);
        if raw_motion {
            if self.window.glfw.supports_raw_motion() {
                self.window.set_raw_mouse_motion(true);
            } else {
                log::info!("Raw mouse motion is not supported on this system");
            }
        }
    }

    fn set_icon(&mut self, width: u32, height: u32, rgba: &[u8]) {
        let pixels = rgba
            .chunks_exact(4)
            .map(|p| u32::from_ne_bytes([p[0], p[1], p[2], p[3]]))
            .collect();
        self.window.set_icon_from_pixels(vec![glfw::PixelImage {
            width,
            height,
            pixels,
        }]);
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

fn clamp_size(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn phase(action: glfw::Action) -> ButtonPhase {
    match action {
        glfw::Action::Press => ButtonPhase::Pressed,
        glfw::Action::Release => ButtonPhase::Released,
        glfw::Action::Repeat => ButtonPhase::Repeat,
    }
}

fn translate_event(event: glfw::WindowEvent) -> Option<PlatformEvent> {
    let translated = match event {
        glfw::WindowEvent::Key(key, _, action, _) => PlatformEvent::Key(from_glfw_key(key)?, phase(action)),
        glfw::WindowEvent::MouseButton(button, action, _) => {
            PlatformEvent::MouseButton(from_glfw_button(button)?, phase(action))
        }
        glfw::WindowEvent::CursorPos(x, y) => PlatformEvent::CursorMoved(x, y),
        glfw::WindowEvent::Scroll(x, y) => PlatformEvent::Scroll(x, y),
        glfw::WindowEvent::FramebufferSize(width, height) => {
            PlatformEvent::FramebufferResized(clamp_size(width), clamp_size(height))
        }
        glfw::WindowEvent::Iconify(iconified) => PlatformEvent::Iconified(iconified),
        glfw::WindowEvent::Focus(focused) => PlatformEvent::Focused(focused),
        glfw::WindowEvent::Char(c) => PlatformEvent::Char(c),
        glfw::WindowEvent::Close => PlatformEvent::CloseRequested,
        _ => return None,
    };
    Some(translated)
}

const fn from_glfw_button(button: glfw::MouseButton) -> Option<MouseButton> {
    match button {
        glfw::MouseButton::Button1 => Some(MouseButton::Left),
        glfw::MouseButton::Button2 => Some(MouseButton::Right),
        glfw::MouseButton::Button3 => Some(MouseButton::Middle),
        glfw::MouseButton::Button4 => Some(MouseButton::Back),
        glfw::MouseButton::Button5 => Some(MouseButton::Forward),
        _ => None,
    }
}

const fn to_glfw_button(button: MouseButton) -> glfw::MouseButton {
    match button {
        MouseButton::Left => glfw::MouseButton::Button1,
        MouseButton::Right => glfw::MouseButton::Button2,
        MouseButton::Middle => glfw::MouseButton::Button3,
        MouseButton::Back => glfw::MouseButton::Button4,
        MouseButton::Forward => glfw::MouseButton::Button5,
    }
}

macro_rules! key_table {
    ($($key:ident => $glfw:ident),* $(,)?) => {
        const fn from_glfw_key(key: glfw::Key) -> Option<Key> {
            match key {
                $(glfw::Key::$glfw => Some(Key::$key),)*
                _ => None,
            }
        }

        const fn to_glfw_key(key: Key) -> glfw::Key {
            match key {
                $(Key::$key => glfw::Key::$glfw,)*
            }
        }
    };
}

key_table! {
    A => A, B => B, C => C, D => D, E => E, F => F, G => G, H => H, I => I, J => J,
    K => K, L => L, M => M, N => N, O => O, P => P, Q => Q, R => R, S => S, T => T,
    U => U, V => V, W => W, X => X, Y => Y, Z => Z,
    Num0 => Num0, Num1 => Num1, Num2 => Num2, Num3 => Num3, Num4 => Num4,
    Num5 => Num5, Num6 => Num6, Num7 => Num7, Num8 => Num8, Num9 => Num9,
    Space => Space, Enter => Enter, Escape => Escape, Tab => Tab,
    Backspace => Backspace, Delete => Delete, GraveAccent => GraveAccent,
    LeftShift => LeftShift, RightShift => RightShift,
    LeftControl => LeftControl, RightControl => RightControl,
    LeftAlt => LeftAlt, RightAlt => RightAlt,
    Up => Up, Down => Down, Left => Left, Right => Right,
    Home => Home, End => End, PageUp => PageUp, PageDown => PageDown,
    F1 => F1, F2 => F2, F3 => F3, F4 => F4, F5 => F5, F6 => F6,
    F7 => F7, F8 => F8, F9 => F9, F10 => F10, F11 => F11, F12 => F12,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_table_round_trips_engine_keys() {
        for key in [Key::A, Key::Num5, Key::GraveAccent, Key::RightAlt, Key::F12] {
            assert_eq!(from_glfw_key(to_glfw_key(key)), Some(key));
        }
        assert_eq!(from_glfw_key(glfw::Key::Kp5), None);
    }

    #[test]
    fn test_translates_input_events() {
        assert_eq!(
            translate_event(glfw::WindowEvent::Key(
                glfw::Key::W,
                0,
                glfw::Action::Repeat,
                glfw::Modifiers::empty()
            )),
            Some(PlatformEvent::Key(Key::W, ButtonPhase::Repeat))
        );
        assert_eq!(
            translate_event(glfw::WindowEvent::FramebufferSize(-1, 720)),
            Some(PlatformEvent::FramebufferResized(0, 720))
        );
        assert_eq!(
            translate_event(glfw::WindowEvent::MouseButton(
                glfw::MouseButton::Button8,
                glfw::Action::Press,
                glfw::Modifiers::empty()
            )),
            None
        );
    }
}

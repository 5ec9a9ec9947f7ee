//! Immediate-mode UI overlay
//!
//! Each window owns a [`UiContext`] that turns platform events into egui input and
//! collects the tessellated output of a frame. [`UiRenderer`] then paints that output
//! through the [`crate::render::RenderBackend`] contract.

pub mod renderer;

pub use renderer::UiRenderer;

use crate::input::{ButtonPhase, Key, MouseButton};
use crate::window::PlatformEvent;

/// Identifier of a panel inside its window
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PanelId(pub u64);

/// A UI window drawn into a window's overlay
pub trait Panel {
    /// Title shown in the panel's frame
    fn title(&self) -> &str;

    /// Draw the panel's contents for this frame
    fn show(&mut self, ctx: &egui::Context);

    /// Whether the panel should still be drawn
    fn is_open(&self) -> bool {
        true
    }
}

/// Output of one UI frame, ready for [`UiRenderer::paint`]
#[derive(Default)]
pub struct UiFrame {
    /// Tessellated triangles with their clip rectangles
    pub primitives: Vec<egui::ClippedPrimitive>,
    /// Texture uploads and frees requested by egui
    pub textures_delta: egui::TexturesDelta,
    /// Ratio of framebuffer pixels to UI points
    pub pixels_per_point: f32,
}

/// egui context bound to one window
pub struct UiContext {
    context: egui::Context,
    events: Vec<egui::Event>,
    modifiers: egui::Modifiers,
    pointer: egui::Pos2,
    pointer_enabled: bool,
    focused: bool,
    in_frame: bool,
}

impl Default for UiContext {
    fn default() -> Self {
        Self::new()
    }
}

impl UiContext {
    /// Fresh context with the dark style
    pub fn new() -> Self {
        let context = egui::Context::default();
        context.set_visuals(egui::Visuals::dark());
        Self {
            context,
            events: Vec::new(),
            modifiers: egui::Modifiers::default(),
            pointer: egui::Pos2::ZERO,
            pointer_enabled: true,
            focused: true,
            in_frame: false,
        }
    }

    /// The egui context, for drawing between `begin_frame` and `end_frame`
    pub fn context(&self) -> &egui::Context {
        &self.context
    }

    /// Stop or resume feeding pointer input to the UI
    pub fn set_pointer_enabled(&mut self, enabled: bool) {
        if self.pointer_enabled && !enabled {
            self.events.push(egui::Event::PointerGone);
        }
        self.pointer_enabled = enabled;
    }

    /// Whether pointer input reaches the UI
    pub const fn pointer_enabled(&self) -> bool {
        self.pointer_enabled
    }

    /// Whether a frame is being built
    pub const fn in_frame(&self) -> bool {
        self.in_frame
    }

    /// Whether the UI is using the pointer, for example while dragging a panel
    pub fn wants_pointer(&self) -> bool {
        self.pointer_enabled && self.context.wants_pointer_input()
    }

    /// Whether a text field has keyboard focus
    pub fn wants_keyboard(&self) -> bool {
        self.context.wants_keyboard_input()
    }

    /// Queue the egui translation of a platform event for the next frame
    pub fn handle_event(&mut self, event: &PlatformEvent) {
        match *event {
            PlatformEvent::Key(key, phase) => {
                self.track_modifier(key, phase);
                if let Some(egui_key) = egui_key(key) {
                    self.events.push(egui::Event::Key {
                        key: egui_key,
                        physical_key: None,
                        pressed: phase != ButtonPhase::Released,
                        repeat: phase == ButtonPhase::Repeat,
                        modifiers: self.modifiers,
                    });
                }
            }
            PlatformEvent::Char(c) => {
                if !c.is_control() {
                    self.events.push(egui::Event::Text(c.to_string()));
                }
            }
            PlatformEvent::MouseButton(button, phase) if self.pointer_enabled => {
                let Some(button) = pointer_button(button) else {
                    return;
                };
                if phase == ButtonPhase::Repeat {
                    return;
                }
                self.events.push(egui::Event::PointerButton {
                    pos: self.pointer,
                    button,
                    pressed: phase == ButtonPhase::Pressed,
                    modifiers: self.modifiers,
                });
            }
            #[allow(clippy::cast_possible_truncation)]
            PlatformEvent::CursorMoved(x, y) if self.pointer_enabled => {
                self.pointer = egui::pos2(x as f32, y as f32);
                self.events.push(egui::Event::PointerMoved(self.pointer));
            }
            #[allow(clippy::cast_possible_truncation)]
            PlatformEvent::Scroll(dx, dy) if self.pointer_enabled => {
                self.events.push(egui::Event::MouseWheel {
                    unit: egui::MouseWheelUnit::Line,
                    delta: egui::vec2(dx as f32, dy as f32),
                    modifiers: self.modifiers,
                });
            }
            PlatformEvent::Focused(focused) => {
                self.focused = focused;
                self.events.push(egui::Event::WindowFocused(focused));
            }
            _ => {}
        }
    }

    /// Start a UI frame for a window of `window_size` points drawn at `pixels_per_point`
    pub fn begin_frame(&mut self, time: f64, window_size: (u32, u32), pixels_per_point: f32) {
        assert!(!self.in_frame, "UI frame already started");
        #[allow(clippy::cast_precision_loss)]
        let size = egui::vec2(window_size.0 as f32, window_size.1 as f32);

        let mut input = egui::RawInput {
            screen_rect: Some(egui::Rect::from_min_size(egui::Pos2::ZERO, size)),
            time: Some(time),
            modifiers: self.modifiers,
            focused: self.focused,
            events: std::mem::take(&mut self.events),
            ..Default::default()
        };
        input
            .viewports
            .entry(egui::ViewportId::ROOT)
            .or_default()
            .native_pixels_per_point = Some(pixels_per_point.max(f32::EPSILON));

        self.context.begin_frame(input);
        self.in_frame = true;
    }

    /// Finish the frame and tessellate its shapes
    pub fn end_frame(&mut self) -> UiFrame {
        assert!(self.in_frame, "UI frame was not started");
        self.in_frame = false;
        let output = self.context.end_frame();
        let primitives = self.context.tessellate(output.shapes, output.pixels_per_point);
        UiFrame {
            primitives,
            textures_delta: output.textures_delta,
            pixels_per_point: output.pixels_per_point,
        }
    }

    fn track_modifier(&mut self, key: Key, phase: ButtonPhase) {
        let down = phase != ButtonPhase::Released;
        match key {
            Key::LeftShift | Key::RightShift => self.modifiers.shift = down,
            Key::LeftControl | Key::RightControl => {
                self.modifiers.ctrl = down;
                self.modifiers.command = down;
            }
            Key::LeftAlt | Key::RightAlt => self.modifiers.alt = down,
            _ => {}
        }
    }
}

impl std::fmt::Debug for UiContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiContext")
            .field("queued_events", &self.events.len())
            .field("pointer_enabled", &self.pointer_enabled)
            .field("in_frame", &self.in_frame)
            .finish_non_exhaustive()
    }
}

const fn pointer_button(button: MouseButton) -> Option<egui::PointerButton> {
    match button {
        MouseButton::Left => Some(egui::PointerButton::Primary),
        MouseButton::Right => Some(egui::PointerButton::Secondary),
        MouseButton::Middle => Some(egui::PointerButton::Middle),
        MouseButton::Back => Some(egui::PointerButton::Extra1),
        MouseButton::Forward => Some(egui::PointerButton::Extra2),
    }
}

fn egui_key(key: Key) -> Option<egui::Key> {
    use egui::Key as E;
    let mapped = match key {
        Key::A => E::A,
        Key::B => E::B,
        Key::C => E::C,
        Key::D => E::D,
        Key::E => E::E,
        Key::F => E::F,
        Key::G => E::G,
        Key::H => E::H,
        Key::I => E::I,
        Key::J => E::J,
        Key::K => E::K,
        Key::L => E::L,
        Key::M => E::M,
        Key::N => E::N,
        Key::O => E::O,
        Key::P => E::P,
        Key::Q => E::Q,
        Key::R => E::R,
        Key::S => E::S,
        Key::T => E::T,
        Key::U => E::U,
        Key::V => E::V,
        Key::W => E::W,
        Key::X => E::X,
        Key::Y => E::Y,
        Key::Z => E::Z,
        Key::Num0 => E::Num0,
        Key::Num1 => E::Num1,
        Key::Num2 => E::Num2,
        Key::Num3 => E::Num3,
        Key::Num4 => E::Num4,
        Key::Num5 => E::Num5,
        Key::Num6 => E::Num6,
        Key::Num7 => E::Num7,
        Key::Num8 => E::Num8,
        Key::Num9 => E::Num9,
        Key::Space => E::Space,
        Key::Enter => E::Enter,
        Key::Escape => E::Escape,
        Key::Tab => E::Tab,
        Key::Backspace => E::Backspace,
        Key::Delete => E::Delete,
        Key::Up => E::ArrowUp,
        Key::Down => E::ArrowDown,
        Key::Left => E::ArrowLeft,
        Key::Right => E::ArrowRight,
        Key::Home => E::Home,
        Key::End => E::End,
        Key::PageUp => E::PageUp,
        Key::PageDown => E::PageDown,
        Key::F1 => E::F1,
        Key::F2 => E::F2,
        Key::F3 => E::F3,
        Key::F4 => E::F4,
        Key::F5 => E::F5,
        Key::F6 => E::F6,
        Key::F7 => E::F7,
        Key::F8 => E::F8,
        Key::F9 => E::F9,
        Key::F10 => E::F10,
        Key::F11 => E::F11,
        Key::F12 => E::F12,
        _ => return None,
    };
    Some(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_frame(ui: &mut UiContext, draw: impl FnOnce(&egui::Context)) -> UiFrame {
        ui.begin_frame(0.0, (800, 600), 1.0);
        draw(ui.context());
        ui.end_frame()
    }

    #[test]
    fn test_frame_produces_primitives_and_font_atlas() {
        let mut ui = UiContext::new();
        let frame = run_frame(&mut ui, |ctx| {
            egui::Window::new("Stats").show(ctx, |ui| {
                ui.label("frame time");
            });
        });
        assert!(!frame.primitives.is_empty());
        assert!(!frame.textures_delta.set.is_empty());
    }

    #[test]
    fn test_disabled_pointer_drops_pointer_events() {
        let mut ui = UiContext::new();
        ui.set_pointer_enabled(false);
        ui.handle_event(&PlatformEvent::CursorMoved(10.0, 10.0));
        ui.handle_event(&PlatformEvent::MouseButton(MouseButton::Left, ButtonPhase::Pressed));
        assert_eq!(ui.events, [egui::Event::PointerGone]);
        assert!(!ui.wants_pointer());
    }

    #[test]
    fn test_keys_carry_modifiers() {
        let mut ui = UiContext::new();
        ui.handle_event(&PlatformEvent::Key(Key::LeftShift, ButtonPhase::Pressed));
        ui.handle_event(&PlatformEvent::Key(Key::A, ButtonPhase::Pressed));
        let Some(egui::Event::Key { key, modifiers, pressed, .. }) = ui.events.last() else {
            panic!("expected a key event");
        };
        assert_eq!(*key, egui::Key::A);
        assert!(modifiers.shift);
        assert!(*pressed);
    }

    #[test]
    #[should_panic(expected = "UI frame was not started")]
    fn test_end_without_begin_panics() {
        UiContext::new().end_frame();
    }
}

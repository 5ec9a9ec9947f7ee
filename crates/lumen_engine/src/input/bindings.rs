//! Keyboard, mouse button and mouse motion bindings

use super::keys::{ButtonPhase, Key, MouseButton};

/// Physical trigger of a [`Keybind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// A keyboard key
    Key(Key),
    /// A mouse button
    Mouse(MouseButton),
}

impl Trigger {
    /// Whether the trigger is a mouse button
    pub const fn is_mouse(self) -> bool {
        matches!(self, Self::Mouse(_))
    }
}

impl From<Key> for Trigger {
    fn from(key: Key) -> Self {
        Self::Key(key)
    }
}

impl From<MouseButton> for Trigger {
    fn from(button: MouseButton) -> Self {
        Self::Mouse(button)
    }
}

/// A key or mouse button bound to a callback for one phase
///
/// `C` is whatever context the router hands to callbacks.
pub struct Keybind<C> {
    trigger: Trigger,
    phase: ButtonPhase,
    callback: Box<dyn FnMut(&mut C)>,
}

impl<C> Keybind<C> {
    /// Bind `trigger` in `phase` to `callback`
    pub fn new(trigger: impl Into<Trigger>, phase: ButtonPhase, callback: impl FnMut(&mut C) + 'static) -> Self {
        Self {
            trigger: trigger.into(),
            phase,
            callback: Box::new(callback),
        }
    }

    /// Bound key or button
    pub const fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// Phase the binding fires on
    pub const fn phase(&self) -> ButtonPhase {
        self.phase
    }

    /// Whether the binding listens to a mouse button
    pub const fn is_mouse(&self) -> bool {
        self.trigger.is_mouse()
    }

    pub(crate) fn run(&mut self, context: &mut C) {
        (self.callback)(context);
    }
}

impl<C> std::fmt::Debug for Keybind<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keybind")
            .field("trigger", &self.trigger)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

/// Kind of pointer motion a [`Mousebind`] receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseAction {
    /// Cursor movement as an offset from the previous position
    Move,
    /// Wheel offsets as reported by the platform
    Scroll,
}

/// Callback for cursor movement or scrolling, receiving `(dx, dy)`
pub struct Mousebind<C> {
    action: MouseAction,
    callback: Box<dyn FnMut(&mut C, f64, f64)>,
}

impl<C> Mousebind<C> {
    /// Bind `action` to `callback`
    pub fn new(action: MouseAction, callback: impl FnMut(&mut C, f64, f64) + 'static) -> Self {
        Self {
            action,
            callback: Box::new(callback),
        }
    }

    /// Motion kind the binding receives
    pub const fn action(&self) -> MouseAction {
        self.action
    }

    pub(crate) fn run(&mut self, context: &mut C, dx: f64, dy: f64) {
        (self.callback)(context, dx, dy);
    }
}

impl<C> std::fmt::Debug for Mousebind<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mousebind")
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}

//! Input routing
//!
//! Platform events are translated into [`Key`] / [`MouseButton`] codes by the window
//! layer and handed to an [`InputRouter`], which runs every matching binding in
//! registration order. Press and release bindings fire on events; repeat bindings
//! fire once per frame from polled device state.

pub mod bindings;
pub mod keys;

pub use bindings::{Keybind, MouseAction, Mousebind, Trigger};
pub use keys::{ButtonPhase, Key, MouseButton};

/// Live key and button state, queried for repeat bindings
pub trait InputDevice {
    /// Whether `key` is currently held
    fn is_key_down(&self, key: Key) -> bool;

    /// Whether `button` is currently held
    fn is_mouse_button_down(&self, button: MouseButton) -> bool;
}

/// Dispatches input to registered bindings
///
/// Bindings have no priority and nothing consumes an event: everything that matches runs.
pub struct InputRouter<C> {
    keybinds: Vec<Keybind<C>>,
    mousebinds: Vec<Mousebind<C>>,
    last_cursor: Option<(f64, f64)>,
    invert_y: bool,
}

impl<C> Default for InputRouter<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> InputRouter<C> {
    /// Router with no bindings
    pub fn new() -> Self {
        Self {
            keybinds: Vec::new(),
            mousebinds: Vec::new(),
            last_cursor: None,
            invert_y: false,
        }
    }

    /// Register a key or mouse button binding
    pub fn add_keybind(&mut self, keybind: Keybind<C>) {
        self.keybinds.push(keybind);
    }

    /// Register a cursor or scroll binding
    pub fn add_mousebind(&mut self, mousebind: Mousebind<C>) {
        self.mousebinds.push(mousebind);
    }

    /// Registered key and mouse button bindings
    pub fn keybinds(&self) -> &[Keybind<C>] {
        &self.keybinds
    }

    /// Registered motion bindings
    pub fn mousebinds(&self) -> &[Mousebind<C>] {
        &self.mousebinds
    }

    /// Negate vertical cursor offsets
    pub fn set_invert_y(&mut self, invert: bool) {
        self.invert_y = invert;
    }

    /// Whether vertical cursor offsets are negated
    pub const fn invert_y(&self) -> bool {
        self.invert_y
    }

    /// Forget the last cursor position so the next movement reports no offset
    pub fn reset_cursor(&mut self) {
        self.last_cursor = None;
    }

    /// Key went down or up; platform auto-repeat is ignored
    pub fn on_key(&mut self, key: Key, phase: ButtonPhase, context: &mut C) {
        self.dispatch_edge(Trigger::Key(key), phase, context);
    }

    /// Mouse button went down or up
    pub fn on_mouse_button(&mut self, button: MouseButton, phase: ButtonPhase, context: &mut C) {
        self.dispatch_edge(Trigger::Mouse(button), phase, context);
    }

    fn dispatch_edge(&mut self, trigger: Trigger, phase: ButtonPhase, context: &mut C) {
        if phase == ButtonPhase::Repeat {
            return;
        }
        for bind in &mut self.keybinds {
            if bind.trigger() == trigger && bind.phase() == phase {
                bind.run(context);
            }
        }
    }

    /// Cursor moved to `(x, y)`; returns the offset passed to move bindings
    ///
    /// The first position after startup or [`reset_cursor`](Self::reset_cursor) only
    /// seeds the previous position and reports `(0, 0)`.
    pub fn on_cursor_moved(&mut self, x: f64, y: f64, context: &mut C) -> (f64, f64) {
        let (last_x, last_y) = self.last_cursor.unwrap_or((x, y));
        self.last_cursor = Some((x, y));

        let dx = x - last_x;
        let dy = if self.invert_y { last_y - y } else { y - last_y };
        for bind in &mut self.mousebinds {
            if bind.action() == MouseAction::Move {
                bind.run(context, dx, dy);
            }
        }
        (dx, dy)
    }

    /// Wheel scrolled; offsets are passed through unchanged
    pub fn on_scroll(&mut self, dx: f64, dy: f64, context: &mut C) {
        for bind in &mut self.mousebinds {
            if bind.action() == MouseAction::Scroll {
                bind.run(context, dx, dy);
            }
        }
    }

    /// Run every repeat binding whose key or button is held; call once per frame
    ///
    /// `device` picks the input device out of `context`. Every trigger is queried
    /// before the first binding runs, so callbacks may mutate whatever the state came
    /// from. Nothing runs when `device` returns `None`.
    pub fn dispatch_repeating<F>(&mut self, context: &mut C, device: F)
    where
        F: FnOnce(&C) -> Option<&dyn InputDevice>,
    {
        let held: Vec<bool> = {
            let Some(device) = device(context) else {
                return;
            };
            self.keybinds
                .iter()
                .map(|bind| {
                    bind.phase() == ButtonPhase::Repeat
                        && match bind.trigger() {
                            Trigger::Key(key) => device.is_key_down(key),
                            Trigger::Mouse(button) => device.is_mouse_button_down(button),
                        }
                })
                .collect()
        };
        for (bind, held) in self.keybinds.iter_mut().zip(held) {
            if held {
                bind.run(context);
            }
        }
    }
}

impl<C> std::fmt::Debug for InputRouter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputRouter")
            .field("keybinds", &self.keybinds)
            .field("mousebinds", &self.mousebinds)
            .field("last_cursor", &self.last_cursor)
            .field("invert_y", &self.invert_y)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    type Log = Vec<String>;

    fn logging_bind(trigger: impl Into<Trigger>, phase: ButtonPhase, name: &'static str) -> Keybind<Log> {
        Keybind::new(trigger, phase, move |log: &mut Log| log.push(name.to_string()))
    }

    #[test]
    fn test_press_and_release_only_fire_matching_phase() {
        let mut router = InputRouter::new();
        router.add_keybind(logging_bind(Key::K, ButtonPhase::Pressed, "pressed"));
        router.add_keybind(logging_bind(Key::K, ButtonPhase::Released, "released"));
        let mut log = Log::new();

        router.on_key(Key::K, ButtonPhase::Pressed, &mut log);
        assert_eq!(log, ["pressed"]);

        router.on_key(Key::K, ButtonPhase::Released, &mut log);
        assert_eq!(log, ["pressed", "released"]);
    }

    #[test]
    fn test_platform_repeat_events_are_ignored() {
        let mut router = InputRouter::new();
        router.add_keybind(logging_bind(Key::K, ButtonPhase::Pressed, "pressed"));
        router.add_keybind(logging_bind(Key::K, ButtonPhase::Released, "released"));
        router.add_keybind(logging_bind(Key::K, ButtonPhase::Repeat, "repeat"));
        let mut log = Log::new();

        router.on_key(Key::K, ButtonPhase::Repeat, &mut log);
        assert!(log.is_empty());
    }

    #[test]
    fn test_all_matches_run_in_registration_order() {
        let mut router = InputRouter::new();
        router.add_keybind(logging_bind(Key::Space, ButtonPhase::Pressed, "first"));
        router.add_keybind(logging_bind(Key::Enter, ButtonPhase::Pressed, "other key"));
        router.add_keybind(logging_bind(Key::Space, ButtonPhase::Pressed, "second"));
        let mut log = Log::new();

        router.on_key(Key::Space, ButtonPhase::Pressed, &mut log);
        assert_eq!(log, ["first", "second"]);
    }

    #[test]
    fn test_mouse_buttons_do_not_trigger_key_bindings() {
        let mut router = InputRouter::new();
        router.add_keybind(logging_bind(Key::A, ButtonPhase::Pressed, "key"));
        router.add_keybind(logging_bind(MouseButton::Left, ButtonPhase::Pressed, "mouse"));
        let mut log = Log::new();

        router.on_mouse_button(MouseButton::Left, ButtonPhase::Pressed, &mut log);
        assert_eq!(log, ["mouse"]);
        assert!(router.keybinds()[1].is_mouse());
    }

    #[test]
    fn test_first_cursor_sample_reports_zero_offset() {
        let mut router: InputRouter<Vec<(f64, f64)>> = InputRouter::new();
        router.add_mousebind(Mousebind::new(MouseAction::Move, |moves: &mut Vec<(f64, f64)>, dx, dy| {
            moves.push((dx, dy));
        }));
        let mut moves = Vec::new();

        router.on_cursor_moved(640.0, 360.0, &mut moves);
        router.on_cursor_moved(650.0, 355.0, &mut moves);
        assert_eq!(moves, [(0.0, 0.0), (10.0, -5.0)]);

        router.reset_cursor();
        router.on_cursor_moved(0.0, 0.0, &mut moves);
        assert_eq!(moves[2], (0.0, 0.0));
    }

    #[test]
    fn test_inverted_y_negates_vertical_offset() {
        let mut router: InputRouter<()> = InputRouter::new();
        router.set_invert_y(true);
        router.on_cursor_moved(0.0, 0.0, &mut ());
        assert_eq!(router.on_cursor_moved(3.0, 4.0, &mut ()), (3.0, -4.0));
    }

    #[test]
    fn test_scroll_passes_raw_offsets_to_scroll_bindings_only() {
        let mut router: InputRouter<Vec<(MouseAction, f64, f64)>> = InputRouter::new();
        router.add_mousebind(Mousebind::new(MouseAction::Move, |log: &mut Vec<_>, dx, dy| {
            log.push((MouseAction::Move, dx, dy));
        }));
        router.add_mousebind(Mousebind::new(MouseAction::Scroll, |log: &mut Vec<_>, dx, dy| {
            log.push((MouseAction::Scroll, dx, dy));
        }));
        let mut log = Vec::new();

        router.on_scroll(0.0, -2.0, &mut log);
        assert_eq!(log, [(MouseAction::Scroll, 0.0, -2.0)]);
    }

    #[derive(Default)]
    struct Pad {
        keys: HashSet<Key>,
        buttons: HashSet<MouseButton>,
        log: Log,
    }

    impl InputDevice for Pad {
        fn is_key_down(&self, key: Key) -> bool {
            self.keys.contains(&key)
        }

        fn is_mouse_button_down(&self, button: MouseButton) -> bool {
            self.buttons.contains(&button)
        }
    }

    fn pad_bind(trigger: impl Into<Trigger>, phase: ButtonPhase, name: &'static str) -> Keybind<Pad> {
        Keybind::new(trigger, phase, move |pad: &mut Pad| pad.log.push(name.to_string()))
    }

    fn as_device(pad: &Pad) -> Option<&dyn InputDevice> {
        Some(pad as &dyn InputDevice)
    }

    #[test]
    fn test_repeat_bindings_poll_held_state() {
        let mut router = InputRouter::new();
        router.add_keybind(pad_bind(Key::W, ButtonPhase::Repeat, "forward"));
        router.add_keybind(pad_bind(Key::W, ButtonPhase::Pressed, "pressed"));
        router.add_keybind(pad_bind(MouseButton::Right, ButtonPhase::Repeat, "aim"));
        let mut pad = Pad::default();

        router.dispatch_repeating(&mut pad, as_device);
        assert!(pad.log.is_empty());

        pad.keys.insert(Key::W);
        pad.buttons.insert(MouseButton::Right);
        router.dispatch_repeating(&mut pad, as_device);
        router.dispatch_repeating(&mut pad, as_device);
        assert_eq!(pad.log, ["forward", "aim", "forward", "aim"]);
    }

    #[test]
    fn test_held_state_is_read_before_callbacks_run() {
        let mut router = InputRouter::new();
        router.add_keybind(Keybind::new(Key::W, ButtonPhase::Repeat, |pad: &mut Pad| {
            pad.keys.clear();
            pad.log.push("release".to_string());
        }));
        router.add_keybind(pad_bind(Key::W, ButtonPhase::Repeat, "forward"));
        let mut pad = Pad::default();
        pad.keys.insert(Key::W);

        router.dispatch_repeating(&mut pad, as_device);
        assert_eq!(pad.log, ["release", "forward"]);
    }

    #[test]
    fn test_missing_device_runs_nothing() {
        let mut router = InputRouter::new();
        router.add_keybind(pad_bind(Key::W, ButtonPhase::Repeat, "forward"));
        let mut pad = Pad::default();
        pad.keys.insert(Key::W);

        router.dispatch_repeating(&mut pad, |_| None);
        assert!(pad.log.is_empty());
    }
}

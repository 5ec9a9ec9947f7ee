//! Platform-independent key and mouse button codes

use serde::{Deserialize, Serialize};

/// Keyboard keys the engine can bind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    /// A key
    A,
    /// B key
    B,
    /// C key
    C,
    /// D key
    D,
    /// E key
    E,
    /// F key
    F,
    /// G key
    G,
    /// H key
    H,
    /// I key
    I,
    /// J key
    J,
    /// K key
    K,
    /// L key
    L,
    /// M key
    M,
    /// N key
    N,
    /// O key
    O,
    /// P key
    P,
    /// Q key
    Q,
    /// R key
    R,
    /// S key
    S,
    /// T key
    T,
    /// U key
    U,
    /// V key
    V,
    /// W key
    W,
    /// X key
    X,
    /// Y key
    Y,
    /// Z key
    Z,
    /// Number row 0
    Num0,
    /// Number row 1
    Num1,
    /// Number row 2
    Num2,
    /// Number row 3
    Num3,
    /// Number row 4
    Num4,
    /// Number row 5
    Num5,
    /// Number row 6
    Num6,
    /// Number row 7
    Num7,
    /// Number row 8
    Num8,
    /// Number row 9
    Num9,
    /// Space bar
    Space,
    /// Enter / return
    Enter,
    /// Escape
    Escape,
    /// Tab
    Tab,
    /// Backspace
    Backspace,
    /// Delete
    Delete,
    /// Grave accent / tilde, toggles the console
    GraveAccent,
    /// Left shift
    LeftShift,
    /// Right shift
    RightShift,
    /// Left control
    LeftControl,
    /// Right control
    RightControl,
    /// Left alt
    LeftAlt,
    /// Right alt
    RightAlt,
    /// Up arrow
    Up,
    /// Down arrow
    Down,
    /// Left arrow
    Left,
    /// Right arrow
    Right,
    /// Home
    Home,
    /// End
    End,
    /// Page up
    PageUp,
    /// Page down
    PageDown,
    /// Function key 1
    F1,
    /// Function key 2
    F2,
    /// Function key 3
    F3,
    /// Function key 4
    F4,
    /// Function key 5
    F5,
    /// Function key 6
    F6,
    /// Function key 7
    F7,
    /// Function key 8
    F8,
    /// Function key 9
    F9,
    /// Function key 10
    F10,
    /// Function key 11
    F11,
    /// Function key 12
    F12,
}

/// Mouse buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    /// Left mouse button
    Left,
    /// Right mouse button
    Right,
    /// Middle mouse button
    Middle,
    /// Back side button
    Back,
    /// Forward side button
    Forward,
}

/// What happened to a key or button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ButtonPhase {
    /// Went down this event
    Pressed,
    /// Went up this event
    Released,
    /// Held; platform auto-repeat on events, polled state for bindings
    Repeat,
}

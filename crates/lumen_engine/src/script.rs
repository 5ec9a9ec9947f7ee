//! Scripting collaborator

/// A scripting runtime driven by the engine
///
/// The engine calls `init_provider` during startup, `init_scripts` after the
/// init hooks, `render` every frame and `stop` during teardown.
pub trait ScriptProvider {
    /// Bring up the runtime and register engine bindings
    fn init_provider(&mut self);

    /// Load and run script entry points
    fn init_scripts(&mut self);

    /// Run per-frame script callbacks
    fn render(&mut self, delta: f64);

    /// Run script shutdown callbacks and release the runtime
    fn stop(&mut self);
}

//! Init, render and stop hook lists

/// Callbacks run in registration order at one phase of the frame loop
pub struct HookList<C> {
    phase: &'static str,
    hooks: Vec<Box<dyn FnMut(&mut C)>>,
}

impl<C> HookList<C> {
    /// Empty list for `phase`, used in log messages
    pub fn new(phase: &'static str) -> Self {
        Self {
            phase,
            hooks: Vec::new(),
        }
    }

    /// Register a hook
    pub fn add(&mut self, hook: impl FnMut(&mut C) + 'static) {
        self.hooks.push(Box::new(hook));
    }

    /// Run every hook in registration order
    pub fn run(&mut self, context: &mut C) {
        for hook in &mut self.hooks {
            hook(context);
        }
    }

    /// Number of registered hooks
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no hooks are registered
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Phase name
    pub const fn phase(&self) -> &'static str {
        self.phase
    }
}

impl<C> std::fmt::Debug for HookList<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookList")
            .field("phase", &self.phase)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// The three hook phases of the engine
pub struct LifecycleHooks<C> {
    /// Run at the end of `init`
    pub init: HookList<C>,
    /// Run every frame before the scene renders
    pub render: HookList<C>,
    /// Run first thing in `stop`
    pub stop: HookList<C>,
}

impl<C> Default for LifecycleHooks<C> {
    fn default() -> Self {
        Self {
            init: HookList::new("init"),
            render: HookList::new("render"),
            stop: HookList::new("stop"),
        }
    }
}

impl<C> std::fmt::Debug for LifecycleHooks<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("init", &self.init)
            .field("render", &self.render)
            .field("stop", &self.stop)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hooks_run_in_registration_order() {
        let mut hooks = HookList::new("render");
        hooks.add(|log: &mut Vec<u32>| log.push(1));
        hooks.add(|log: &mut Vec<u32>| log.push(2));
        hooks.add(|log: &mut Vec<u32>| log.push(3));

        let mut log = Vec::new();
        hooks.run(&mut log);
        hooks.run(&mut log);
        assert_eq!(log, [1, 2, 3, 1, 2, 3]);
        assert_eq!(hooks.len(), 3);
    }

    #[test]
    fn test_hooks_keep_their_own_state() {
        let mut hooks = HookList::new("render");
        let mut frames = 0;
        hooks.add(move |total: &mut u32| {
            frames += 1;
            *total = frames;
        });

        let mut total = 0;
        for _ in 0..5 {
            hooks.run(&mut total);
        }
        assert_eq!(total, 5);
    }
}

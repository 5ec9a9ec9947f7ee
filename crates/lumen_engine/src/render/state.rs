//! Render-mode and framebuffer stacks shared by every backend
//!
//! Both stacks only track values; they report whether the device actually needs to
//! change so that backends can skip redundant driver calls.

use std::collections::BTreeMap;

use super::handle::{FrameBufferHandle, FrameBufferKey};
use super::types::RenderMode;

/// One boolean stack per [`RenderMode`], seeded with each mode's base value
#[derive(Debug, Clone)]
pub struct RenderStateStack {
    stacks: BTreeMap<RenderMode, Vec<bool>>,
}

impl Default for RenderStateStack {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderStateStack {
    /// Stacks holding only the base values
    pub fn new() -> Self {
        Self {
            stacks: RenderMode::ALL
                .into_iter()
                .map(|mode| (mode, vec![mode.base_value()]))
                .collect(),
        }
    }

    /// Value currently in effect for `mode`
    pub fn top(&self, mode: RenderMode) -> bool {
        self.stacks
            .get(&mode)
            .and_then(|stack| stack.last().copied())
            .unwrap_or_else(|| mode.base_value())
    }

    /// Number of entries including the base value
    pub fn depth(&self, mode: RenderMode) -> usize {
        self.stacks.get(&mode).map_or(0, Vec::len)
    }

    /// Push a value; returns whether the device must change
    pub fn push(&mut self, mode: RenderMode, enabled: bool) -> bool {
        let current = self.top(mode);
        self.stacks.entry(mode).or_default().push(enabled);
        current != enabled
    }

    /// Pop the top value; returns the restored value if the device must change
    ///
    /// # Panics
    ///
    /// Popping the base value is a usage error.
    #[track_caller]
    pub fn pop(&mut self, mode: RenderMode) -> Option<bool> {
        let stack = self.stacks.entry(mode).or_default();
        assert!(
            stack.len() > 1,
            "Attempted to pop render state {mode:?} without a corresponding push"
        );
        let old = stack.pop();
        let restored = stack.last().copied();
        if old == restored {
            None
        } else {
            restored
        }
    }

    /// Base values for every mode, in application order
    pub fn base_values(&self) -> impl Iterator<Item = (RenderMode, bool)> + '_ {
        self.stacks
            .iter()
            .filter_map(|(mode, stack)| stack.first().map(|value| (*mode, *value)))
    }

    /// Whether every stack is back at its base value
    pub fn is_balanced(&self) -> bool {
        self.stacks.values().all(|stack| stack.len() == 1)
    }
}

/// Stack of offscreen targets; empty means the window's default target
#[derive(Debug, Clone, Default)]
pub struct FrameBufferStack {
    stack: Vec<FrameBufferHandle>,
}

impl FrameBufferStack {
    /// Target currently bound, `None` for the default target
    pub fn top(&self) -> Option<FrameBufferHandle> {
        self.stack.last().copied()
    }

    /// Number of pushed targets
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Whether the default target is bound
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Push a target; returns whether the bound target changed
    pub fn push(&mut self, handle: FrameBufferHandle) -> bool {
        let old = self.top_key();
        self.stack.push(handle);
        old != Some(handle.key)
    }

    /// Pop a target; returns the target to rebind if it changed
    ///
    /// The outer `Option` is `None` when nothing needs rebinding; the inner one is
    /// `None` for the default target.
    ///
    /// # Panics
    ///
    /// Popping an empty stack is a usage error.
    #[track_caller]
    pub fn pop(&mut self) -> Option<Option<FrameBufferHandle>> {
        let popped = self.stack.pop();
        assert!(
            popped.is_some(),
            "Attempted to pop framebuffer without a corresponding push"
        );
        let old = popped.map(|handle| handle.key);
        if old == self.top_key() {
            None
        } else {
            Some(self.top())
        }
    }

    /// Whether any entry refers to `key`
    pub fn contains(&self, key: FrameBufferKey) -> bool {
        self.stack.iter().any(|handle| handle.key == key)
    }

    fn top_key(&self) -> Option<FrameBufferKey> {
        self.stack.last().map(|handle| handle.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn frame_buffers(count: usize) -> Vec<FrameBufferHandle> {
        let mut keys: SlotMap<FrameBufferKey, ()> = SlotMap::with_key();
        (0..count)
            .map(|_| FrameBufferHandle::new(keys.insert(()), 64, 64, true))
            .collect()
    }

    #[test]
    fn test_redundant_push_reports_no_change() {
        let mut stack = RenderStateStack::new();
        assert!(!stack.push(RenderMode::DepthTest, true));
        assert!(stack.push(RenderMode::DepthTest, false));
        assert_eq!(stack.pop(RenderMode::DepthTest), Some(true));
        assert_eq!(stack.pop(RenderMode::DepthTest), None);
        assert!(stack.is_balanced());
    }

    #[test]
    fn test_nested_scopes_restore() {
        let mut stack = RenderStateStack::new();
        stack.push(RenderMode::Blend, true);
        stack.push(RenderMode::Blend, true);
        assert_eq!(stack.pop(RenderMode::Blend), None);
        assert!(stack.top(RenderMode::Blend));
        assert_eq!(stack.pop(RenderMode::Blend), Some(false));
        assert_eq!(stack.depth(RenderMode::Blend), 1);
    }

    #[test]
    #[should_panic(expected = "without a corresponding push")]
    fn test_popping_base_state_panics() {
        let mut stack = RenderStateStack::new();
        stack.push(RenderMode::CullFace, false);
        stack.pop(RenderMode::CullFace);
        stack.pop(RenderMode::CullFace);
    }

    #[test]
    fn test_base_values_cover_every_mode() {
        let stack = RenderStateStack::new();
        let bases: Vec<_> = stack.base_values().collect();
        assert_eq!(bases.len(), RenderMode::ALL.len());
        assert!(bases.contains(&(RenderMode::Blend, false)));
    }

    #[test]
    fn test_frame_buffer_round_trip() {
        let targets = frame_buffers(2);
        let mut stack = FrameBufferStack::default();
        assert!(stack.push(targets[0]));
        assert!(stack.push(targets[1]));
        assert_eq!(stack.pop(), Some(Some(targets[0])));
        assert_eq!(stack.pop(), Some(None));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_pushing_same_target_twice_is_not_a_change() {
        let targets = frame_buffers(1);
        let mut stack = FrameBufferStack::default();
        assert!(stack.push(targets[0]));
        assert!(!stack.push(targets[0]));
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.pop(), Some(None));
    }

    #[test]
    #[should_panic(expected = "pop framebuffer")]
    fn test_popping_empty_frame_buffer_stack_panics() {
        FrameBufferStack::default().pop();
    }
}

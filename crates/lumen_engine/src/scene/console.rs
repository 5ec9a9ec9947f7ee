//! In-engine log console

use std::any::Any;

use super::{Entity, FrameContext};
use crate::foundation::logging::{ConsoleBuffer, ConsoleLine};
use crate::foundation::math::Transform;

/// Scene entity showing recent log lines in a UI window
#[derive(Debug, Clone)]
pub struct ConsoleEntity {
    buffer: ConsoleBuffer,
    visible: bool,
    filter: String,
}

impl ConsoleEntity {
    /// Console over `buffer`, hidden until toggled
    pub fn new(buffer: ConsoleBuffer) -> Self {
        Self {
            buffer,
            visible: false,
            filter: String::new(),
        }
    }

    /// Show or hide the console window
    pub fn toggle(&mut self) {
        self.visible = !self.visible;
    }

    /// Whether the window is shown
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    /// Show or hide the console window
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Buffered lines whose message or target contains the current filter
    pub fn visible_lines(&self) -> Vec<ConsoleLine> {
        let mut lines = self.buffer.snapshot();
        if !self.filter.is_empty() {
            lines.retain(|line| line.message.contains(&self.filter) || line.target.contains(&self.filter));
        }
        lines
    }

    /// Only list lines containing `filter`; empty shows everything
    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.filter = filter.into();
    }
}

impl Entity for ConsoleEntity {
    fn name(&self) -> &str {
        "Console"
    }

    fn render(&mut self, frame: &mut FrameContext<'_>, _world: &Transform) {
        if !self.visible {
            return;
        }
        let lines = self.visible_lines();
        let mut open = true;
        let mut clear = false;
        egui::Window::new("Console")
            .open(&mut open)
            .default_size([640.0, 320.0])
            .show(frame.ui, |ui| {
                ui.horizontal(|ui| {
                    ui.label("Filter");
                    ui.text_edit_singleline(&mut self.filter);
                    clear = ui.button("Clear").clicked();
                });
                ui.separator();
                egui::ScrollArea::vertical()
                    .stick_to_bottom(true)
                    .auto_shrink([false, false])
                    .show(ui, |ui| {
                        for line in &lines {
                            ui.colored_label(
                                level_color(line.level),
                                format!("[{}] {}: {}", line.level, line.target, line.message),
                            );
                        }
                    });
            });
        if clear {
            self.buffer.clear();
        }
        self.visible = open;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

const fn level_color(level: log::Level) -> egui::Color32 {
    match level {
        log::Level::Error => egui::Color32::from_rgb(0xe0, 0x50, 0x50),
        log::Level::Warn => egui::Color32::from_rgb(0xe0, 0xc0, 0x40),
        log::Level::Info => egui::Color32::from_rgb(0xd0, 0xd0, 0xd0),
        log::Level::Debug => egui::Color32::from_rgb(0x80, 0xa0, 0xe0),
        log::Level::Trace => egui::Color32::GRAY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessBackend;

    fn line(level: log::Level, message: &str) -> ConsoleLine {
        ConsoleLine {
            level,
            target: "lumen_engine::test".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_filter_narrows_lines() {
        let buffer = ConsoleBuffer::new(8);
        buffer.push(line(log::Level::Info, "window opened"));
        buffer.push(line(log::Level::Warn, "texture missing"));

        let mut console = ConsoleEntity::new(buffer);
        assert_eq!(console.visible_lines().len(), 2);
        console.set_filter("texture");
        assert_eq!(console.visible_lines(), [line(log::Level::Warn, "texture missing")]);
    }

    fn run_frames(console: &mut ConsoleEntity, frames: usize) -> egui::FullOutput {
        let ctx = egui::Context::default();
        let mut backend = HeadlessBackend::new();
        let mut output = egui::FullOutput::default();
        for _ in 0..frames {
            output = ctx.run(egui::RawInput::default(), |ctx| {
                let mut frame = FrameContext {
                    backend: &mut backend,
                    ui: ctx,
                    delta: 1.0 / 60.0,
                };
                console.render(&mut frame, &Transform::identity());
            });
        }
        output
    }

    #[test]
    fn test_only_visible_console_draws() {
        let mut console = ConsoleEntity::new(ConsoleBuffer::new(4));
        assert!(run_frames(&mut console, 3).shapes.is_empty());

        console.toggle();
        assert!(console.is_visible());
        // windows fade in over a few frames
        assert!(!run_frames(&mut console, 10).shapes.is_empty());
    }
}

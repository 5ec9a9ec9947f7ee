//! Frame time overlay

use std::any::Any;
use std::collections::VecDeque;

use super::{Entity, FrameContext};
use crate::foundation::math::Transform;

/// Frames kept in the history graph
pub const PROFILER_HISTORY: usize = 240;

/// Scene entity plotting recent frame times
#[derive(Debug, Clone)]
pub struct ProfilerEntity {
    history: VecDeque<f64>,
    visible: bool,
}

impl Default for ProfilerEntity {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfilerEntity {
    /// Empty profiler, shown
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(PROFILER_HISTORY),
            visible: true,
        }
    }

    /// Add a frame time in seconds
    pub fn record(&mut self, delta: f64) {
        if self.history.len() == PROFILER_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(delta);
    }

    /// Average frame time in seconds over the history
    pub fn average_frame_time(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let count = self.history.len() as f64;
        self.history.iter().sum::<f64>() / count
    }

    /// Frames per second implied by the average frame time
    pub fn average_fps(&self) -> f64 {
        let average = self.average_frame_time();
        if average > 0.0 {
            1.0 / average
        } else {
            0.0
        }
    }

    /// Slowest frame in the history
    pub fn worst_frame_time(&self) -> f64 {
        self.history.iter().copied().fold(0.0, f64::max)
    }

    /// Show or hide the overlay
    pub fn toggle(&mut self) {
        self.visible = !self.visible;
    }

    /// Whether the overlay is shown
    pub const fn is_visible(&self) -> bool {
        self.visible
    }
}

impl Entity for ProfilerEntity {
    fn name(&self) -> &str {
        "Profiler"
    }

    fn render(&mut self, frame: &mut FrameContext<'_>, _world: &Transform) {
        self.record(frame.delta);
        if !self.visible {
            return;
        }
        let average = self.average_frame_time();
        let worst = self.worst_frame_time();
        let fps = self.average_fps();
        let history = &self.history;
        egui::Window::new("Profiler")
            .resizable(false)
            .default_pos([8.0, 8.0])
            .show(frame.ui, |ui| {
                ui.label(format!("{fps:.1} FPS"));
                ui.label(format!("avg {:.2} ms, worst {:.2} ms", average * 1000.0, worst * 1000.0));
                let (rect, _) = ui.allocate_exact_size(egui::vec2(240.0, 60.0), egui::Sense::hover());
                let painter = ui.painter_at(rect);
                painter.rect_filled(rect, 2.0, egui::Color32::from_black_alpha(96));
                // 50 ms fills the graph
                #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
                let points: Vec<egui::Pos2> = history
                    .iter()
                    .enumerate()
                    .map(|(i, delta)| {
                        let x = rect.left() + rect.width() * i as f32 / PROFILER_HISTORY as f32;
                        let y = rect.bottom() - rect.height() * (*delta as f32 / 0.05).min(1.0);
                        egui::pos2(x, y)
                    })
                    .collect();
                painter.add(egui::Shape::line(points, egui::Stroke::new(1.0, egui::Color32::LIGHT_GREEN)));
            });
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_statistics_over_history() {
        let mut profiler = ProfilerEntity::new();
        assert_relative_eq!(profiler.average_fps(), 0.0);
        profiler.record(0.01);
        profiler.record(0.03);
        assert_relative_eq!(profiler.average_frame_time(), 0.02);
        assert_relative_eq!(profiler.average_fps(), 50.0);
        assert_relative_eq!(profiler.worst_frame_time(), 0.03);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut profiler = ProfilerEntity::new();
        for _ in 0..PROFILER_HISTORY {
            profiler.record(1.0);
        }
        profiler.record(0.0);
        assert_eq!(profiler.history.len(), PROFILER_HISTORY);
        assert!(profiler.average_frame_time() < 1.0);
    }
}

//! Paints egui output through the render backend contract

use std::collections::HashMap;

use crate::render::{
    BuiltinShader, FilterMode, MeshCullType, MeshDepthFunction, MeshDrawMode, MeshHandle, RenderBackend,
    RenderMode, ScissorRect, ShaderHandle, TextureDescriptor, TextureHandle, UniformValue, Vertex,
};

use super::UiFrame;

/// GPU side of one window's UI: the program, egui's textures and a pool of dynamic meshes
#[derive(Debug, Default)]
pub struct UiRenderer {
    shader: ShaderHandle,
    textures: HashMap<egui::TextureId, TextureHandle>,
    meshes: Vec<MeshHandle>,
}

impl UiRenderer {
    /// Compile the UI program for `backend`
    pub fn new(backend: &mut dyn RenderBackend) -> Self {
        let shader = match BuiltinShader::Ui.source(backend.shader_form()) {
            Some(source) => backend.create_shader(&source),
            None => ShaderHandle::default(),
        };
        if !shader.is_valid() {
            log::error!("UI shader is unavailable on {}, the overlay will not be drawn", backend.name());
        }
        Self {
            shader,
            textures: HashMap::new(),
            meshes: Vec::new(),
        }
    }

    /// Number of egui textures resident on the device
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Apply texture changes and draw a frame's primitives into the bound target
    pub fn paint(&mut self, backend: &mut dyn RenderBackend, framebuffer_size: (u32, u32), frame: &UiFrame) {
        for (id, delta) in &frame.textures_delta.set {
            self.set_texture(backend, *id, delta);
        }

        if self.shader.is_valid() {
            self.draw(backend, framebuffer_size, frame);
        }

        for id in &frame.textures_delta.free {
            if let Some(texture) = self.textures.remove(id) {
                backend.destroy_texture(texture);
            }
        }
    }

    /// Free everything this renderer created
    pub fn destroy(&mut self, backend: &mut dyn RenderBackend) {
        for (_, texture) in self.textures.drain() {
            backend.destroy_texture(texture);
        }
        for mesh in self.meshes.drain(..) {
            backend.destroy_mesh(mesh);
        }
        if self.shader.is_valid() {
            backend.destroy_shader(self.shader);
            self.shader = ShaderHandle::default();
        }
    }

    fn draw(&mut self, backend: &mut dyn RenderBackend, framebuffer_size: (u32, u32), frame: &UiFrame) {
        let (width, height) = framebuffer_size;
        if width == 0 || height == 0 {
            return;
        }
        let pixels_per_point = frame.pixels_per_point.max(f32::EPSILON);
        #[allow(clippy::cast_precision_loss)]
        let screen_points = [width as f32 / pixels_per_point, height as f32 / pixels_per_point];

        backend.push_state(RenderMode::Blend, true);
        backend.push_state(RenderMode::DepthTest, false);
        backend.use_shader(self.shader);
        backend.set_shader_uniform(self.shader, "u_screen_size", UniformValue::Vec2(screen_points));

        let mut used = 0;
        for primitive in &frame.primitives {
            let egui::epaint::Primitive::Mesh(mesh) = &primitive.primitive else {
                log::warn!("UI paint callbacks are not supported");
                continue;
            };
            if mesh.indices.is_empty() {
                continue;
            }
            let Some(texture) = self.textures.get(&mesh.texture_id).copied() else {
                log::warn!("UI mesh uses unknown texture {:?}", mesh.texture_id);
                continue;
            };
            let Some(scissor) = clip_to_scissor(primitive.clip_rect, pixels_per_point, framebuffer_size) else {
                continue;
            };

            let vertices: Vec<Vertex> = mesh.vertices.iter().map(convert_vertex).collect();
            if used < self.meshes.len() {
                backend.update_mesh(&mut self.meshes[used], &vertices, &mesh.indices, MeshDrawMode::Dynamic);
            } else {
                let handle = backend.create_mesh(&vertices, &mesh.indices, MeshDrawMode::Dynamic);
                if !handle.is_valid() {
                    continue;
                }
                self.meshes.push(handle);
            }

            backend.set_scissor(Some(scissor));
            backend.use_texture(texture, 0);
            backend.draw_mesh(self.meshes[used], MeshDepthFunction::Always, MeshCullType::None);
            used += 1;
        }

        backend.set_scissor(None);
        backend.pop_state(RenderMode::DepthTest);
        backend.pop_state(RenderMode::Blend);
    }

    fn set_texture(&mut self, backend: &mut dyn RenderBackend, id: egui::TextureId, delta: &egui::epaint::ImageDelta) {
        let [width, height] = delta.image.size();
        let (Ok(width), Ok(height)) = (u32::try_from(width), u32::try_from(height)) else {
            log::error!("UI texture {id:?} is too large");
            return;
        };
        let pixels = image_rgba(&delta.image);

        match (delta.pos, self.textures.get(&id)) {
            (Some([x, y]), Some(&texture)) => {
                let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) else {
                    return;
                };
                backend.update_texture(texture, x, y, width, height, &pixels);
            }
            (Some(_), None) => log::warn!("Partial update for missing UI texture {id:?}"),
            (None, _) => {
                let filter = match delta.options.magnification {
                    egui::TextureFilter::Nearest => FilterMode::Nearest,
                    egui::TextureFilter::Linear => FilterMode::Linear,
                };
                let desc = TextureDescriptor::new(width, height).clamped().with_filter(filter);
                let texture = backend.create_texture(&desc, &pixels);
                if let Some(old) = self.textures.insert(id, texture) {
                    backend.destroy_texture(old);
                }
            }
        }
    }
}

fn image_rgba(image: &egui::epaint::ImageData) -> Vec<u8> {
    match image {
        egui::epaint::ImageData::Color(color) => color.pixels.iter().flat_map(|c| c.to_array()).collect(),
        egui::epaint::ImageData::Font(font) => font.srgba_pixels(None).flat_map(|c| c.to_array()).collect(),
    }
}

fn convert_vertex(vertex: &egui::epaint::Vertex) -> Vertex {
    Vertex::new(
        [vertex.pos.x, vertex.pos.y, 0.0],
        [0.0, 0.0, 1.0],
        egui::Rgba::from(vertex.color).to_array(),
        [vertex.uv.x, vertex.uv.y],
    )
}

/// Convert a clip rectangle in points to a pixel scissor, `None` when nothing is visible
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn clip_to_scissor(clip: egui::Rect, pixels_per_point: f32, framebuffer_size: (u32, u32)) -> Option<ScissorRect> {
    let (width, height) = (framebuffer_size.0 as f32, framebuffer_size.1 as f32);
    let min_x = (clip.min.x * pixels_per_point).round().clamp(0.0, width);
    let min_y = (clip.min.y * pixels_per_point).round().clamp(0.0, height);
    let max_x = (clip.max.x * pixels_per_point).round().clamp(min_x, width);
    let max_y = (clip.max.y * pixels_per_point).round().clamp(min_y, height);

    let rect = ScissorRect {
        x: min_x as i32,
        y: min_y as i32,
        width: (max_x - min_x) as u32,
        height: (max_y - min_y) as u32,
    };
    (rect.width > 0 && rect.height > 0).then_some(rect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{DeviceCall, HeadlessBackend};
    use crate::ui::UiContext;

    fn frame_with_label() -> UiFrame {
        let mut ui = UiContext::new();
        ui.begin_frame(0.0, (640, 480), 1.0);
        egui::Window::new("Console").show(ui.context(), |ui| {
            ui.label("hello");
        });
        ui.end_frame()
    }

    #[test]
    fn test_clip_is_clamped_to_framebuffer() {
        let clip = egui::Rect::from_min_max(egui::pos2(-10.0, 5.0), egui::pos2(50.0, 900.0));
        let scissor = clip_to_scissor(clip, 2.0, (80, 600)).expect("visible");
        assert_eq!(scissor, ScissorRect { x: 0, y: 10, width: 80, height: 590 });
    }

    #[test]
    fn test_clip_outside_framebuffer_is_skipped() {
        let clip = egui::Rect::from_min_max(egui::pos2(700.0, 0.0), egui::pos2(800.0, 10.0));
        assert!(clip_to_scissor(clip, 1.0, (640, 480)).is_none());
    }

    #[test]
    fn test_paint_uploads_atlas_and_restores_state() {
        let mut backend = HeadlessBackend::new();
        let mut renderer = UiRenderer::new(&mut backend);
        let frame = frame_with_label();

        renderer.paint(&mut backend, (640, 480), &frame);

        assert!(renderer.texture_count() >= 1);
        assert!(backend.count_calls(|call| matches!(call, DeviceCall::DrawMesh(..))) >= 1);
        assert_eq!(backend.calls().last(), Some(&DeviceCall::SetRenderMode(RenderMode::Blend, false)));
        assert!(backend.state_stack().is_balanced());
    }

    #[test]
    fn test_meshes_are_reused_between_frames() {
        let mut backend = HeadlessBackend::new();
        let mut renderer = UiRenderer::new(&mut backend);
        renderer.paint(&mut backend, (640, 480), &frame_with_label());
        let created = backend.count_calls(|call| matches!(call, DeviceCall::CreateMesh(_)));

        renderer.paint(&mut backend, (640, 480), &frame_with_label());
        assert_eq!(backend.count_calls(|call| matches!(call, DeviceCall::CreateMesh(_))), created);
        assert!(backend.count_calls(|call| matches!(call, DeviceCall::UpdateMesh(_))) >= 1);
    }

    #[test]
    fn test_destroy_frees_everything() {
        let mut backend = HeadlessBackend::new();
        let before = backend.live_resources();
        let mut renderer = UiRenderer::new(&mut backend);
        renderer.paint(&mut backend, (640, 480), &frame_with_label());
        renderer.destroy(&mut backend);
        assert_eq!(backend.live_resources(), before);
    }
}

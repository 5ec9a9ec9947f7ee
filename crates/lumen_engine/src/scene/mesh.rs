//! Mesh drawn with the built-in basic shader

use std::any::Any;

use super::{Entity, FrameContext};
use crate::foundation::math::{ColorRgba, Transform};
use crate::render::{
    MeshCullType, MeshDepthFunction, MeshDrawMode, MeshHandle, RenderBackend, ShaderHandle, TextureHandle,
    UniformValue,
};
use crate::resource::MeshData;

/// Scene entity owning one uploaded mesh
///
/// The shader and texture are shared and stay alive after the entity is released;
/// the mesh is destroyed with it.
#[derive(Debug)]
pub struct MeshEntity {
    name: String,
    mesh: MeshHandle,
    shader: ShaderHandle,
    texture: TextureHandle,
    /// Transform relative to the parent entity
    pub transform: Transform,
    /// Color multiplied into the vertex colors
    pub tint: ColorRgba,
    /// Skip drawing while false
    pub visible: bool,
    /// Faces culled when drawing
    pub cull: MeshCullType,
}

impl MeshEntity {
    /// Upload `data` and draw it with `shader` and `texture`
    pub fn new(
        name: impl Into<String>,
        backend: &mut dyn RenderBackend,
        data: &MeshData,
        shader: ShaderHandle,
        texture: TextureHandle,
    ) -> Self {
        let name = name.into();
        let mesh = backend.create_mesh(&data.vertices, &data.indices, MeshDrawMode::Static);
        log::debug!("Mesh entity '{name}' uploaded {} indices", mesh.index_count);
        Self {
            name,
            mesh,
            shader,
            texture,
            transform: Transform::identity(),
            tint: ColorRgba::WHITE,
            visible: true,
            cull: MeshCullType::Back,
        }
    }

    /// Replace the geometry
    pub fn set_mesh_data(&mut self, backend: &mut dyn RenderBackend, data: &MeshData) {
        backend.update_mesh(&mut self.mesh, &data.vertices, &data.indices, MeshDrawMode::Static);
    }

    /// The uploaded mesh
    pub const fn mesh(&self) -> MeshHandle {
        self.mesh
    }
}

impl Entity for MeshEntity {
    fn name(&self) -> &str {
        &self.name
    }

    fn local_transform(&self) -> Transform {
        self.transform.clone()
    }

    fn render(&mut self, frame: &mut FrameContext<'_>, world: &Transform) {
        if !self.visible || !self.mesh.is_valid() || !self.shader.is_valid() {
            return;
        }
        let backend = &mut *frame.backend;
        backend.use_shader(self.shader);
        backend.set_shader_uniform(self.shader, "u_model", UniformValue::from(world.to_matrix()));
        backend.set_shader_uniform(self.shader, "u_tint", UniformValue::Vec4(self.tint.to_array()));
        backend.use_texture(self.texture, 0);
        backend.draw_mesh(self.mesh, MeshDepthFunction::Less, self.cull);
    }

    fn release(&mut self, backend: &mut dyn RenderBackend) {
        if self.mesh.is_valid() {
            backend.destroy_mesh(self.mesh);
            self.mesh = MeshHandle::default();
        }
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
    use crate::foundation::math::Vec3;
    use crate::render::{BuiltinShader, DeviceCall, HeadlessBackend, ShaderForm, TextureDescriptor};
    use crate::scene::SceneRoot;

    fn resources(backend: &mut HeadlessBackend) -> (ShaderHandle, TextureHandle) {
        let source = BuiltinShader::Basic.source(ShaderForm::Glsl).expect("glsl source");
        let shader = backend.create_shader(&source);
        let white: &[u8] = &[255, 255, 255, 255];
        let texture = backend.create_texture(&TextureDescriptor::new(1, 1), white);
        (shader, texture)
    }

    #[test]
    fn test_render_sets_model_and_draws() {
        let mut backend = HeadlessBackend::new();
        let (shader, texture) = resources(&mut backend);
        let mut scene = SceneRoot::default();
        let mut entity = MeshEntity::new("cube", &mut backend, &MeshData::cube(1.0, [1.0; 4]), shader, texture);
        entity.transform = Transform::from_position(Vec3::new(0.0, 0.0, -3.0));
        let mesh = entity.mesh();
        scene.add_child(None, entity);
        backend.take_calls();

        let ctx = egui::Context::default();
        scene.render(&mut FrameContext {
            backend: &mut backend,
            ui: &ctx,
            delta: 0.0,
        });

        assert_eq!(
            backend.count_calls(|call| matches!(call, DeviceCall::DrawMesh(m, MeshDepthFunction::Less, MeshCullType::Back) if *m == mesh)),
            1
        );
        let Some(UniformValue::Mat4(model)) = backend.shader_uniform(shader, "u_model") else {
            panic!("model matrix not set");
        };
        assert!((model[14] + 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_release_destroys_only_the_mesh() {
        let mut backend = HeadlessBackend::new();
        let (shader, texture) = resources(&mut backend);
        let mut scene = SceneRoot::default();
        let id = scene.add_child(
            None,
            MeshEntity::new("tri", &mut backend, &MeshData::triangle([1.0; 4]), shader, texture),
        );
        assert_eq!(backend.live_resources(), 3);

        scene.remove(id, &mut backend);
        assert_eq!(backend.live_resources(), 2);
    }

    #[test]
    fn test_hidden_mesh_is_not_drawn() {
        let mut backend = HeadlessBackend::new();
        let (shader, texture) = resources(&mut backend);
        let mut entity = MeshEntity::new("p", &mut backend, &MeshData::plane(2.0, [1.0; 4]), shader, texture);
        entity.visible = false;
        let ctx = egui::Context::default();
        entity.render(
            &mut FrameContext {
                backend: &mut backend,
                ui: &ctx,
                delta: 0.0,
            },
            &Transform::identity(),
        );
        assert_eq!(backend.count_calls(|call| matches!(call, DeviceCall::DrawMesh(..))), 0);
    }
}

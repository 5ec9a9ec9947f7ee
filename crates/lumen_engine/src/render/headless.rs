//! A render backend without a device
//!
//! Every device-level operation is recorded as a [`DeviceCall`], which lets tests
//! assert on exactly what a real backend would have sent to the driver. Resources
//! keep their CPU-side contents so uploads can be inspected.

use std::collections::HashMap;

use slotmap::SlotMap;

use super::backend::RenderBackend;
use super::handle::{
    FrameBufferHandle, FrameBufferKey, MeshHandle, MeshKey, ResourceTable, ShaderHandle, ShaderKey,
    SurfaceId, TextureHandle, TextureKey, UniformBufferHandle, UniformBufferKey,
};
use super::shaders::{ShaderDefines, ShaderForm};
use super::state::{FrameBufferStack, RenderStateStack};
use super::surface::RenderSurface;
use super::types::{
    ClearFlags, DeviceCapabilities, MeshCullType, MeshDepthFunction, MeshDrawMode, RenderMode,
    ScissorRect, ShaderSource, TextureDescriptor, TextureType, UniformValue, TEXTURE_UNIT_COUNT,
};
use super::{RenderError, Vertex};
use crate::foundation::math::ColorRgba;

/// One operation that would have reached the device
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    /// A render mode was switched
    SetRenderMode(RenderMode, bool),
    /// An offscreen target, or the surface for `None`, was bound
    BindFrameBuffer(Option<FrameBufferHandle>),
    /// The viewport changed
    Viewport {
        /// Left edge
        x: i32,
        /// Top edge
        y: i32,
        /// Width
        width: u32,
        /// Height
        height: u32,
    },
    /// The scissor rectangle changed
    Scissor(Option<ScissorRect>),
    /// The clear color changed
    ClearColor(ColorRgba),
    /// Buffers were cleared
    Clear(ClearFlags),
    /// A texture was created
    CreateTexture(TextureHandle),
    /// A texture region was replaced
    UpdateTexture(TextureHandle),
    /// A texture was bound to a unit
    UseTexture(TextureHandle, u32),
    /// A texture was freed
    DestroyTexture(TextureHandle),
    /// A framebuffer was created
    CreateFrameBuffer(FrameBufferHandle),
    /// A framebuffer was freed
    DestroyFrameBuffer(FrameBufferHandle),
    /// A shader was linked
    CreateShader(ShaderHandle),
    /// A shader was made current
    UseShader(ShaderHandle),
    /// A named uniform was set
    SetUniform(ShaderHandle, String, UniformValue),
    /// A shader was freed
    DestroyShader(ShaderHandle),
    /// A uniform buffer was created
    CreateUniformBuffer(UniformBufferHandle),
    /// A shader block was connected to a uniform buffer
    BindUniformBuffer(ShaderHandle, UniformBufferHandle, String),
    /// A uniform buffer range was written
    UpdateUniformBuffer(UniformBufferHandle, usize, usize),
    /// A uniform buffer was freed
    DestroyUniformBuffer(UniformBufferHandle),
    /// A mesh was uploaded
    CreateMesh(MeshHandle),
    /// A mesh was re-uploaded
    UpdateMesh(MeshHandle),
    /// A mesh was drawn
    DrawMesh(MeshHandle, MeshDepthFunction, MeshCullType),
    /// A mesh was freed
    DestroyMesh(MeshHandle),
    /// A surface was attached
    AttachSurface(SurfaceId),
    /// A surface was detached
    DetachSurface(SurfaceId),
    /// A surface changed size
    ResizeSurface(SurfaceId, u32, u32),
    /// A frame started
    BeginFrame(SurfaceId),
    /// A frame was presented
    EndFrame(SurfaceId),
}

/// Surface of a fixed size with nothing behind it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessSurface {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Number of presented frames
    pub presented: u64,
}

impl HeadlessSurface {
    /// Surface of the given size
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            presented: 0,
        }
    }
}

impl RenderSurface for HeadlessSurface {
    fn framebuffer_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn swap_buffers(&mut self) {
        self.presented += 1;
    }
}

#[derive(Debug)]
struct HeadlessTexture {
    desc: TextureDescriptor,
    layers: Vec<Vec<u8>>,
}

#[derive(Debug)]
struct HeadlessFrameBuffer {
    color: TextureHandle,
}

#[derive(Debug, Default)]
struct HeadlessShader {
    uniforms: HashMap<String, UniformValue>,
    blocks: HashMap<String, u32>,
}

#[derive(Debug)]
struct HeadlessMesh {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    mode: MeshDrawMode,
}

/// Recording backend used by tests and by [`crate::config::BackendKind::Headless`]
#[derive(Debug)]
pub struct HeadlessBackend {
    capabilities: DeviceCapabilities,
    states: RenderStateStack,
    frame_buffer_stack: FrameBufferStack,
    defines: ShaderDefines,
    calls: Vec<DeviceCall>,
    textures: ResourceTable<TextureKey, HeadlessTexture>,
    frame_buffers: ResourceTable<FrameBufferKey, HeadlessFrameBuffer>,
    shaders: ResourceTable<ShaderKey, HeadlessShader>,
    uniform_buffers: ResourceTable<UniformBufferKey, Vec<u8>>,
    meshes: ResourceTable<MeshKey, HeadlessMesh>,
    surfaces: SlotMap<SurfaceId, (u32, u32)>,
    current_surface: Option<SurfaceId>,
    current_shader: Option<ShaderHandle>,
    frames_presented: u64,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    /// Create the backend and apply the base render state
    pub fn new() -> Self {
        let mut backend = Self {
            capabilities: DeviceCapabilities {
                backend: "Headless".to_string(),
                device_name: "none".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                max_texture_size: 16384,
                texture_units: TEXTURE_UNIT_COUNT,
                debug_output: false,
            },
            states: RenderStateStack::new(),
            frame_buffer_stack: FrameBufferStack::default(),
            defines: ShaderDefines::default(),
            calls: Vec::new(),
            textures: ResourceTable::new("texture"),
            frame_buffers: ResourceTable::new("framebuffer"),
            shaders: ResourceTable::new("shader"),
            uniform_buffers: ResourceTable::new("uniform buffer"),
            meshes: ResourceTable::new("mesh"),
            surfaces: SlotMap::with_key(),
            current_surface: None,
            current_shader: None,
            frames_presented: 0,
        };
        backend.apply_base_state();
        backend
    }

    /// Every call recorded so far
    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    /// Take the recorded calls, leaving the log empty
    pub fn take_calls(&mut self) -> Vec<DeviceCall> {
        std::mem::take(&mut self.calls)
    }

    /// Number of recorded calls matching `predicate`
    pub fn count_calls(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    /// Number of frames ended
    pub const fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Number of live textures, framebuffers, shaders, uniform buffers and meshes
    pub fn live_resources(&self) -> usize {
        self.textures.len()
            + self.frame_buffers.len()
            + self.shaders.len()
            + self.uniform_buffers.len()
            + self.meshes.len()
    }

    /// Uploaded vertices and indices of a mesh
    #[track_caller]
    pub fn mesh_data(&self, handle: MeshHandle) -> (&[Vertex], &[u32]) {
        let mesh = self.meshes.resolve(handle.key);
        (&mesh.vertices, &mesh.indices)
    }

    /// Upload hint a mesh was last written with
    #[track_caller]
    pub fn mesh_draw_mode(&self, handle: MeshHandle) -> MeshDrawMode {
        self.meshes.resolve(handle.key).mode
    }

    /// First layer of a texture's pixels
    #[track_caller]
    pub fn texture_pixels(&self, handle: TextureHandle) -> &[u8] {
        self.textures
            .resolve(handle.key)
            .layers
            .first()
            .map_or(&[], Vec::as_slice)
    }

    /// Contents of a uniform buffer
    #[track_caller]
    pub fn uniform_buffer_data(&self, handle: UniformBufferHandle) -> &[u8] {
        self.uniform_buffers.resolve(handle.key)
    }

    /// Last value set for a named uniform
    #[track_caller]
    pub fn shader_uniform(&self, handle: ShaderHandle, name: &str) -> Option<UniformValue> {
        self.shaders.resolve(handle.key).uniforms.get(name).copied()
    }

    /// Binding point a shader block was connected to
    #[track_caller]
    pub fn shader_block_binding(&self, handle: ShaderHandle, block: &str) -> Option<u32> {
        self.shaders.resolve(handle.key).blocks.get(block).copied()
    }

    fn target_size(&self, target: Option<FrameBufferHandle>) -> (u32, u32) {
        match target {
            Some(handle) => (handle.width, handle.height),
            None => self
                .current_surface
                .and_then(|id| self.surfaces.get(id).copied())
                .unwrap_or((0, 0)),
        }
    }

    fn insert_texture(&mut self, desc: &TextureDescriptor, layers: Vec<Vec<u8>>, texture_type: TextureType) -> TextureHandle {
        let key = self.textures.insert(HeadlessTexture { desc: *desc, layers });
        let handle = TextureHandle::new(key, texture_type);
        self.calls.push(DeviceCall::CreateTexture(handle));
        handle
    }
}

impl RenderBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "Headless"
    }

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn shader_form(&self) -> ShaderForm {
        ShaderForm::Glsl
    }

    fn state_stack(&self) -> &RenderStateStack {
        &self.states
    }

    fn state_stack_mut(&mut self) -> &mut RenderStateStack {
        &mut self.states
    }

    fn apply_render_mode(&mut self, mode: RenderMode, enabled: bool) {
        self.calls.push(DeviceCall::SetRenderMode(mode, enabled));
    }

    fn frame_buffer_stack(&self) -> &FrameBufferStack {
        &self.frame_buffer_stack
    }

    fn frame_buffer_stack_mut(&mut self) -> &mut FrameBufferStack {
        &mut self.frame_buffer_stack
    }

    fn bind_frame_buffer_target(&mut self, target: Option<FrameBufferHandle>) {
        if let Some(handle) = target {
            self.frame_buffers.resolve(handle.key);
        }
        self.calls.push(DeviceCall::BindFrameBuffer(target));
        let (width, height) = self.target_size(target);
        self.set_viewport(0, 0, width, height);
    }

    fn attach_surface(&mut self, surface: &mut dyn RenderSurface) -> Result<SurfaceId, RenderError> {
        let id = self.surfaces.insert(surface.framebuffer_size());
        self.calls.push(DeviceCall::AttachSurface(id));
        Ok(id)
    }

    fn detach_surface(&mut self, id: SurfaceId) {
        if self.surfaces.remove(id).is_some() {
            if self.current_surface == Some(id) {
                self.current_surface = None;
            }
            self.calls.push(DeviceCall::DetachSurface(id));
        }
    }

    fn resize_surface(&mut self, id: SurfaceId, width: u32, height: u32) {
        if let Some(size) = self.surfaces.get_mut(id) {
            *size = (width, height);
            self.calls.push(DeviceCall::ResizeSurface(id, width, height));
        }
    }

    fn begin_frame(&mut self, id: SurfaceId, surface: &mut dyn RenderSurface) -> Result<(), RenderError> {
        let size = self.surfaces.get_mut(id).ok_or(RenderError::UnknownSurface)?;
        *size = surface.framebuffer_size();
        self.current_surface = Some(id);
        self.calls.push(DeviceCall::BeginFrame(id));
        self.bind_frame_buffer_target(None);
        Ok(())
    }

    fn end_frame(&mut self, id: SurfaceId, surface: &mut dyn RenderSurface) -> Result<(), RenderError> {
        if !self.surfaces.contains_key(id) {
            return Err(RenderError::UnknownSurface);
        }
        if !self.frame_buffer_stack.is_empty() {
            log::warn!("Frame ended with {} framebuffer(s) still pushed", self.frame_buffer_stack.len());
        }
        surface.swap_buffers();
        self.frames_presented += 1;
        self.calls.push(DeviceCall::EndFrame(id));
        Ok(())
    }

    fn set_clear_color(&mut self, color: ColorRgba) {
        self.calls.push(DeviceCall::ClearColor(color.premultiplied()));
    }

    fn clear(&mut self, flags: ClearFlags) {
        self.calls.push(DeviceCall::Clear(flags));
    }

    fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.calls.push(DeviceCall::Viewport { x, y, width, height });
    }

    fn set_scissor(&mut self, rect: Option<ScissorRect>) {
        self.calls.push(DeviceCall::Scissor(rect));
    }

    fn shader_defines_mut(&mut self) -> &mut ShaderDefines {
        &mut self.defines
    }

    fn create_texture(&mut self, desc: &TextureDescriptor, pixels: &[u8]) -> TextureHandle {
        if pixels.len() != desc.layer_size() {
            log::error!(
                "Texture data is {} bytes, expected {} for {}x{}",
                pixels.len(),
                desc.layer_size(),
                desc.width,
                desc.height
            );
            return TextureHandle::default();
        }
        self.insert_texture(desc, vec![pixels.to_vec()], TextureType::TwoDimensional)
    }

    fn create_cube_map(&mut self, desc: &TextureDescriptor, faces: [&[u8]; 6]) -> TextureHandle {
        if faces.iter().any(|face| face.len() != desc.layer_size()) {
            log::error!("Cube map faces must all be {}x{} RGBA8", desc.width, desc.height);
            return TextureHandle::default();
        }
        let layers = faces.iter().map(|face| face.to_vec()).collect();
        self.insert_texture(desc, layers, TextureType::CubeMap)
    }

    fn update_texture(&mut self, handle: TextureHandle, x: u32, y: u32, width: u32, height: u32, pixels: &[u8]) {
        let texture = self.textures.resolve_mut(handle.key);
        assert!(
            x + width <= texture.desc.width && y + height <= texture.desc.height,
            "Texture update out of bounds"
        );
        assert_eq!(pixels.len(), width as usize * height as usize * 4, "Texture update size mismatch");
        let stride = texture.desc.width as usize * 4;
        if let Some(layer) = texture.layers.first_mut() {
            for row in 0..height as usize {
                let dst = (y as usize + row) * stride + x as usize * 4;
                let src = row * width as usize * 4;
                layer[dst..dst + width as usize * 4].copy_from_slice(&pixels[src..src + width as usize * 4]);
            }
        }
        self.calls.push(DeviceCall::UpdateTexture(handle));
    }

    fn use_texture(&mut self, handle: TextureHandle, unit: u32) {
        assert!(unit < TEXTURE_UNIT_COUNT, "Texture unit {unit} out of range");
        self.textures.resolve(handle.key);
        self.calls.push(DeviceCall::UseTexture(handle, unit));
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        if self.textures.release(handle.key).is_some() {
            self.calls.push(DeviceCall::DestroyTexture(handle));
        }
    }

    fn create_frame_buffer(&mut self, desc: &TextureDescriptor, has_depth: bool) -> FrameBufferHandle {
        if desc.width == 0 || desc.height == 0 {
            log::error!("Cannot create a {}x{} framebuffer", desc.width, desc.height);
            return FrameBufferHandle::default();
        }
        let color = self.insert_texture(desc, vec![vec![0; desc.layer_size()]], TextureType::TwoDimensional);
        let key = self.frame_buffers.insert(HeadlessFrameBuffer { color });
        let handle = FrameBufferHandle::new(key, desc.width, desc.height, has_depth);
        self.calls.push(DeviceCall::CreateFrameBuffer(handle));
        handle
    }

    fn frame_buffer_texture(&self, handle: FrameBufferHandle) -> TextureHandle {
        self.frame_buffers.resolve(handle.key).color
    }

    fn destroy_frame_buffer(&mut self, handle: FrameBufferHandle) {
        if let Some(frame_buffer) = self.frame_buffers.release(handle.key) {
            self.textures.release(frame_buffer.color.key);
            self.calls.push(DeviceCall::DestroyFrameBuffer(handle));
        }
    }

    fn create_shader(&mut self, source: &ShaderSource) -> ShaderHandle {
        let empty = match source {
            ShaderSource::Glsl { vertex, fragment } => vertex.trim().is_empty() || fragment.trim().is_empty(),
            ShaderSource::SpirV { vertex, fragment, .. } => vertex.is_empty() || fragment.is_empty(),
        };
        if empty {
            log::error!("Shader program has an empty stage");
            return ShaderHandle::default();
        }
        let handle = ShaderHandle::new(self.shaders.insert(HeadlessShader::default()));
        self.calls.push(DeviceCall::CreateShader(handle));
        handle
    }

    fn use_shader(&mut self, handle: ShaderHandle) {
        self.shaders.resolve(handle.key);
        self.current_shader = Some(handle);
        self.calls.push(DeviceCall::UseShader(handle));
    }

    fn set_shader_uniform(&mut self, handle: ShaderHandle, name: &str, value: UniformValue) {
        self.shaders
            .resolve_mut(handle.key)
            .uniforms
            .insert(name.to_string(), value);
        self.calls.push(DeviceCall::SetUniform(handle, name.to_string(), value));
    }

    fn destroy_shader(&mut self, handle: ShaderHandle) {
        if self.shaders.release(handle.key).is_some() {
            if self.current_shader == Some(handle) {
                self.current_shader = None;
            }
            self.calls.push(DeviceCall::DestroyShader(handle));
        }
    }

    fn create_uniform_buffer(&mut self, size: usize, binding: u32) -> UniformBufferHandle {
        let key = self.uniform_buffers.insert(vec![0; size]);
        let handle = UniformBufferHandle::new(key, binding, size);
        self.calls.push(DeviceCall::CreateUniformBuffer(handle));
        handle
    }

    fn bind_uniform_buffer(&mut self, shader: ShaderHandle, buffer: UniformBufferHandle, block: &str) {
        self.uniform_buffers.resolve(buffer.key);
        self.shaders
            .resolve_mut(shader.key)
            .blocks
            .insert(block.to_string(), buffer.binding);
        self.calls
            .push(DeviceCall::BindUniformBuffer(shader, buffer, block.to_string()));
    }

    fn update_uniform_buffer(&mut self, handle: UniformBufferHandle, offset: usize, data: &[u8]) {
        let buffer = self.uniform_buffers.resolve_mut(handle.key);
        assert!(offset + data.len() <= buffer.len(), "Uniform buffer write out of bounds");
        buffer[offset..offset + data.len()].copy_from_slice(data);
        self.calls
            .push(DeviceCall::UpdateUniformBuffer(handle, offset, data.len()));
    }

    fn destroy_uniform_buffer(&mut self, handle: UniformBufferHandle) {
        if self.uniform_buffers.release(handle.key).is_some() {
            self.calls.push(DeviceCall::DestroyUniformBuffer(handle));
        }
    }

    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32], mode: MeshDrawMode) -> MeshHandle {
        let Ok(index_count) = u32::try_from(indices.len()) else {
            log::error!("Mesh has too many indices");
            return MeshHandle::default();
        };
        let key = self.meshes.insert(HeadlessMesh {
            vertices: vertices.to_vec(),
            indices: indices.to_vec(),
            mode,
        });
        let handle = MeshHandle::new(key, index_count);
        self.calls.push(DeviceCall::CreateMesh(handle));
        handle
    }

    fn update_mesh(&mut self, handle: &mut MeshHandle, vertices: &[Vertex], indices: &[u32], mode: MeshDrawMode) {
        assert!(handle.is_valid(), "Invalid mesh handle given to Headless renderer");
        let mesh = self.meshes.resolve_mut(handle.key);
        mesh.vertices = vertices.to_vec();
        mesh.indices = indices.to_vec();
        mesh.mode = mode;
        handle.index_count = u32::try_from(indices.len()).unwrap_or(u32::MAX);
        self.calls.push(DeviceCall::UpdateMesh(*handle));
    }

    fn submit_mesh(&mut self, handle: MeshHandle, depth: MeshDepthFunction, cull: MeshCullType) {
        self.meshes.resolve(handle.key);
        self.calls.push(DeviceCall::DrawMesh(handle, depth, cull));
    }

    fn destroy_mesh(&mut self, handle: MeshHandle) {
        if self.meshes.release(handle.key).is_some() {
            self.calls.push(DeviceCall::DestroyMesh(handle));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::MeshData;

    fn triangle(backend: &mut HeadlessBackend) -> MeshHandle {
        let data = MeshData::triangle([1.0; 4]);
        backend.create_mesh(&data.vertices, &data.indices, MeshDrawMode::Static)
    }

    #[test]
    fn test_base_state_is_applied_once_at_startup() {
        let backend = HeadlessBackend::new();
        assert_eq!(
            backend.count_calls(|call| matches!(call, DeviceCall::SetRenderMode(..))),
            RenderMode::ALL.len()
        );
        assert!(backend
            .calls()
            .contains(&DeviceCall::SetRenderMode(RenderMode::TextureCubeMapSeamless, true)));
    }

    fn depth_calls(calls: &[DeviceCall]) -> Vec<bool> {
        calls
            .iter()
            .filter_map(|call| match call {
                DeviceCall::SetRenderMode(RenderMode::DepthTest, enabled) => Some(*enabled),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_depthless_offscreen_draw_disables_then_restores_depth() {
        let mut backend = HeadlessBackend::new();
        let mut surface = HeadlessSurface::new(800, 600);
        let id = backend.attach_surface(&mut surface).unwrap();
        backend.begin_frame(id, &mut surface).unwrap();
        let mesh = triangle(&mut backend);
        assert_eq!(mesh.index_count, 3);
        let target = backend.create_frame_buffer(&TextureDescriptor::new(800, 600), false);
        backend.take_calls();

        backend.push_frame_buffer(target);
        backend.draw_mesh(mesh, MeshDepthFunction::Less, MeshCullType::Back);
        backend.pop_frame_buffer();
        backend.end_frame(id, &mut surface).unwrap();

        assert_eq!(depth_calls(&backend.take_calls()), vec![false, true]);
        assert!(backend.state_stack().is_balanced());
        assert_eq!(surface.presented, 1);
    }

    #[test]
    fn test_depth_target_keeps_depth_state() {
        let mut backend = HeadlessBackend::new();
        let mesh = triangle(&mut backend);
        let target = backend.create_frame_buffer(&TextureDescriptor::new(64, 64), true);
        backend.take_calls();

        backend.push_frame_buffer(target);
        backend.draw_mesh(mesh, MeshDepthFunction::Less, MeshCullType::Back);
        backend.pop_frame_buffer();

        assert!(depth_calls(&backend.take_calls()).is_empty());
        assert!(backend.state_stack().is_balanced());
    }

    #[test]
    fn test_clear_color_is_recorded_premultiplied() {
        let mut backend = HeadlessBackend::new();
        backend.take_calls();
        backend.set_clear_color(ColorRgba::new(1.0, 0.5, 0.0, 0.5));
        assert_eq!(
            backend.take_calls(),
            vec![DeviceCall::ClearColor(ColorRgba::new(0.5, 0.25, 0.0, 0.5))]
        );
    }

    #[test]
    fn test_depthless_target_toggles_depth_around_scope() {
        let mut backend = HeadlessBackend::new();
        let target = backend.create_frame_buffer(&TextureDescriptor::new(64, 64), false);
        backend.take_calls();

        backend.push_frame_buffer(target);
        backend.pop_frame_buffer();

        let calls = backend.take_calls();
        assert_eq!(calls[0], DeviceCall::BindFrameBuffer(Some(target)));
        assert!(calls.contains(&DeviceCall::SetRenderMode(RenderMode::DepthTest, false)));
        assert!(calls.contains(&DeviceCall::Clear(ClearFlags::COLOR)));
        assert_eq!(calls.last(), Some(&DeviceCall::SetRenderMode(RenderMode::DepthTest, true)));
    }

    #[test]
    fn test_frame_buffer_round_trip_rebinds_surface() {
        let mut backend = HeadlessBackend::new();
        let desc = TextureDescriptor::new(32, 32);
        let first = backend.create_frame_buffer(&desc, true);
        let second = backend.create_frame_buffer(&desc, true);
        backend.take_calls();

        backend.push_frame_buffer(first);
        backend.push_frame_buffer(second);
        backend.pop_frame_buffer();
        backend.pop_frame_buffer();

        let binds: Vec<_> = backend
            .calls()
            .iter()
            .filter_map(|call| match call {
                DeviceCall::BindFrameBuffer(target) => Some(*target),
                _ => None,
            })
            .collect();
        assert_eq!(binds, vec![Some(first), Some(second), Some(first), None]);
        assert!(backend.frame_buffer_stack().is_empty());
    }

    #[test]
    fn test_redundant_state_push_emits_nothing() {
        let mut backend = HeadlessBackend::new();
        backend.take_calls();
        backend.push_state(RenderMode::CullFace, true);
        backend.pop_state(RenderMode::CullFace);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_uncull_draw_scopes_cull_face() {
        let mut backend = HeadlessBackend::new();
        let mesh = triangle(&mut backend);
        backend.take_calls();
        backend.draw_mesh(mesh, MeshDepthFunction::LessEqual, MeshCullType::None);
        assert_eq!(
            backend.take_calls(),
            vec![
                DeviceCall::SetRenderMode(RenderMode::CullFace, false),
                DeviceCall::DrawMesh(mesh, MeshDepthFunction::LessEqual, MeshCullType::None),
                DeviceCall::SetRenderMode(RenderMode::CullFace, true),
            ]
        );
    }

    #[test]
    #[should_panic(expected = "Invalid mesh handle")]
    fn test_drawing_default_mesh_panics() {
        let mut backend = HeadlessBackend::new();
        backend.draw_mesh(MeshHandle::default(), MeshDepthFunction::Less, MeshCullType::Back);
    }

    #[test]
    #[should_panic(expected = "Stale mesh handle")]
    fn test_drawing_destroyed_mesh_panics() {
        let mut backend = HeadlessBackend::new();
        let mesh = triangle(&mut backend);
        backend.destroy_mesh(mesh);
        backend.draw_mesh(mesh, MeshDepthFunction::Less, MeshCullType::Back);
    }

    #[test]
    #[should_panic(expected = "Invalid mesh handle")]
    fn test_updating_default_mesh_panics() {
        let mut backend = HeadlessBackend::new();
        backend.update_mesh(&mut MeshHandle::default(), &[], &[], MeshDrawMode::Dynamic);
    }

    #[test]
    fn test_destroying_invalid_handles_is_noop() {
        let mut backend = HeadlessBackend::new();
        backend.take_calls();
        backend.destroy_mesh(MeshHandle::default());
        backend.destroy_texture(TextureHandle::default());
        backend.destroy_frame_buffer(FrameBufferHandle::default());
        backend.destroy_shader(ShaderHandle::default());
        backend.destroy_uniform_buffer(UniformBufferHandle::default());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_failed_creation_returns_invalid_handle() {
        let mut backend = HeadlessBackend::new();
        let texture = backend.create_texture(&TextureDescriptor::new(2, 2), &[0; 3]);
        assert!(!texture.is_valid());
        let shader = backend.create_shader(&ShaderSource::Glsl {
            vertex: String::new(),
            fragment: "void main() {}".to_string(),
        });
        assert!(!shader.is_valid());
        assert_eq!(backend.live_resources(), 0);
    }

    #[test]
    fn test_update_mesh_tracks_index_count() {
        let mut backend = HeadlessBackend::new();
        let mut mesh = triangle(&mut backend);
        let cube = MeshData::cube(1.0, [1.0; 4]);
        backend.update_mesh(&mut mesh, &cube.vertices, &cube.indices, MeshDrawMode::Dynamic);
        assert_eq!(mesh.index_count, 36);
        assert_eq!(backend.mesh_data(mesh).0.len(), 24);
        assert_eq!(backend.mesh_draw_mode(mesh), MeshDrawMode::Dynamic);
    }

    #[test]
    fn test_texture_region_update() {
        let mut backend = HeadlessBackend::new();
        let texture = backend.create_texture(&TextureDescriptor::new(2, 2), &[0; 16]);
        backend.update_texture(texture, 1, 1, 1, 1, &[9, 9, 9, 9]);
        let pixels = backend.texture_pixels(texture);
        assert_eq!(&pixels[12..16], &[9, 9, 9, 9]);
        assert_eq!(&pixels[0..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_uniform_buffer_partial_update() {
        let mut backend = HeadlessBackend::new();
        let buffer = backend.create_uniform_buffer(8, 0);
        backend.update_uniform_buffer(buffer, 4, &[1, 2, 3, 4]);
        assert_eq!(backend.uniform_buffer_data(buffer), &[0, 0, 0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_frame_buffer_texture_is_sampled_and_freed_with_it() {
        let mut backend = HeadlessBackend::new();
        let target = backend.create_frame_buffer(&TextureDescriptor::new(4, 4), true);
        backend.use_frame_buffer_texture(target, 1);
        let color = backend.frame_buffer_texture(target);
        assert!(backend.calls().contains(&DeviceCall::UseTexture(color, 1)));
        backend.destroy_frame_buffer(target);
        assert_eq!(backend.live_resources(), 0);
    }

    #[test]
    fn test_recreate_frame_buffer_keeps_depth() {
        let mut backend = HeadlessBackend::new();
        let mut target = backend.create_frame_buffer(&TextureDescriptor::new(4, 4), false);
        backend.recreate_frame_buffer(&mut target, &TextureDescriptor::new(8, 6));
        assert_eq!((target.width, target.height, target.has_depth), (8, 6, false));
        assert_eq!(backend.live_resources(), 2);
    }
}

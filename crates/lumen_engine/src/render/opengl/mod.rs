//! OpenGL 3.3 core backend over `glow`
//!
//! Textures, buffers and programs live in the primary window's share group and are
//! usable from every window. Vertex array objects are per context, so every surface
//! owns one. Framebuffer objects belong to the context that was current when they
//! were created, which is the primary window's in practice.

mod convert;
pub mod debug;

use std::collections::HashMap;

use glow::HasContext;
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

struct GlTexture {
    raw: glow::NativeTexture,
    target: u32,
}

struct GlFrameBuffer {
    raw: glow::NativeFramebuffer,
    depth: Option<glow::NativeRenderbuffer>,
    color: TextureHandle,
}

struct GlShader {
    program: glow::NativeProgram,
    locations: HashMap<String, Option<glow::NativeUniformLocation>>,
}

struct GlMesh {
    vertex_buffer: glow::NativeBuffer,
    index_buffer: glow::NativeBuffer,
}

struct GlSurface {
    vertex_array: glow::NativeVertexArray,
    size: (u32, u32),
}

/// Render backend for OpenGL 3.3 core contexts
pub struct OpenGlBackend {
    gl: glow::Context,
    capabilities: DeviceCapabilities,
    states: RenderStateStack,
    frame_buffer_stack: FrameBufferStack,
    defines: ShaderDefines,
    textures: ResourceTable<TextureKey, GlTexture>,
    frame_buffers: ResourceTable<FrameBufferKey, GlFrameBuffer>,
    shaders: ResourceTable<ShaderKey, GlShader>,
    uniform_buffers: ResourceTable<UniformBufferKey, glow::NativeBuffer>,
    meshes: ResourceTable<MeshKey, GlMesh>,
    surfaces: SlotMap<SurfaceId, GlSurface>,
    /// Surface whose context is current
    current_surface: Option<SurfaceId>,
    /// VAO used for uploads before any surface is current
    upload_vertex_array: glow::NativeVertexArray,
    target_height: u32,
}

impl std::fmt::Debug for OpenGlBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenGlBackend")
            .field("capabilities", &self.capabilities)
            .field("textures", &self.textures.len())
            .field("meshes", &self.meshes.len())
            .field("surfaces", &self.surfaces.len())
            .finish_non_exhaustive()
    }
}

impl OpenGlBackend {
    /// Load GL entry points through `surface`'s context and apply the base state
    pub fn new(surface: &mut dyn RenderSurface, debug_output: bool) -> Result<Self, RenderError> {
        surface.make_current();
        let mut gl = unsafe { glow::Context::from_loader_function(|name| surface.gl_proc_address(name)) };

        let version = gl.version();
        if version.major < 3 || (version.major == 3 && version.minor < 3) {
            return Err(RenderError::InitializationFailed(format!(
                "OpenGL 3.3 required, context is {}.{}",
                version.major, version.minor
            )));
        }

        let debug_output = debug_output && gl.supports_debug();
        let upload_vertex_array = unsafe {
            if debug_output {
                gl.enable(glow::DEBUG_OUTPUT);
                gl.enable(glow::DEBUG_OUTPUT_SYNCHRONOUS);
                gl.debug_message_callback(debug::log_message);
            }
            gl.front_face(glow::CCW);
            gl.blend_func(glow::ONE, glow::ONE_MINUS_SRC_ALPHA);
            gl.create_vertex_array().map_err(RenderError::InitializationFailed)?
        };

        let capabilities = unsafe {
            DeviceCapabilities {
                backend: "OpenGL".to_string(),
                device_name: gl.get_parameter_string(glow::RENDERER),
                version: gl.get_parameter_string(glow::VERSION),
                max_texture_size: u32::try_from(gl.get_parameter_i32(glow::MAX_TEXTURE_SIZE)).unwrap_or(0),
                texture_units: TEXTURE_UNIT_COUNT,
                debug_output,
            }
        };
        log::info!("{capabilities}");

        let mut backend = Self {
            gl,
            capabilities,
            states: RenderStateStack::new(),
            frame_buffer_stack: FrameBufferStack::default(),
            defines: ShaderDefines::default(),
            textures: ResourceTable::new("texture"),
            frame_buffers: ResourceTable::new("framebuffer"),
            shaders: ResourceTable::new("shader"),
            uniform_buffers: ResourceTable::new("uniform buffer"),
            meshes: ResourceTable::new("mesh"),
            surfaces: SlotMap::with_key(),
            current_surface: None,
            upload_vertex_array,
            target_height: surface.framebuffer_size().1,
        };
        backend.apply_base_state();
        Ok(backend)
    }

    fn active_vertex_array(&self) -> glow::NativeVertexArray {
        self.current_surface
            .and_then(|id| self.surfaces.get(id))
            .map_or(self.upload_vertex_array, |surface| surface.vertex_array)
    }

    fn surface_size(&self) -> (u32, u32) {
        self.current_surface
            .and_then(|id| self.surfaces.get(id))
            .map_or((0, 0), |surface| surface.size)
    }

    fn apply_sampling(&self, target: u32, desc: &TextureDescriptor) {
        let (min, mag) = convert::filters(desc.filter, desc.mipmaps);
        unsafe {
            self.gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_S, convert::wrap(desc.wrap_s));
            self.gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_T, convert::wrap(desc.wrap_t));
            if target == glow::TEXTURE_CUBE_MAP {
                self.gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_R, convert::wrap(desc.wrap_r));
            }
            self.gl.tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, min);
            self.gl.tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, mag);
            if desc.mipmaps {
                self.gl.generate_mipmap(target);
            }
        }
    }

    fn allocate_texture(
        &mut self,
        desc: &TextureDescriptor,
        layers: &[Option<&[u8]>],
        texture_type: TextureType,
    ) -> TextureHandle {
        let target = match texture_type {
            TextureType::TwoDimensional => glow::TEXTURE_2D,
            TextureType::CubeMap => glow::TEXTURE_CUBE_MAP,
        };
        let (Ok(width), Ok(height)) = (i32::try_from(desc.width), i32::try_from(desc.height)) else {
            log::error!("Texture size {}x{} is out of range", desc.width, desc.height);
            return TextureHandle::default();
        };

        let raw = match unsafe { self.gl.create_texture() } {
            Ok(raw) => raw,
            Err(e) => {
                log::error!("Failed to create texture: {e}");
                return TextureHandle::default();
            }
        };
        unsafe {
            self.gl.bind_texture(target, Some(raw));
            for (face, pixels) in (0u32..).zip(layers) {
                let image_target = if target == glow::TEXTURE_CUBE_MAP {
                    glow::TEXTURE_CUBE_MAP_POSITIVE_X + face
                } else {
                    target
                };
                self.gl.tex_image_2d(
                    image_target,
                    0,
                    glow::RGBA8 as i32,
                    width,
                    height,
                    0,
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                    *pixels,
                );
            }
        }
        self.apply_sampling(target, desc);
        unsafe { self.gl.bind_texture(target, None) };

        TextureHandle::new(self.textures.insert(GlTexture { raw, target }), texture_type)
    }

    fn compile_stage(&self, kind: u32, source: &str) -> Result<glow::NativeShader, String> {
        let source = self.defines.apply(source);
        unsafe {
            let shader = self.gl.create_shader(kind)?;
            self.gl.shader_source(shader, &source);
            self.gl.compile_shader(shader);
            if self.gl.get_shader_compile_status(shader) {
                Ok(shader)
            } else {
                let info = self.gl.get_shader_info_log(shader);
                self.gl.delete_shader(shader);
                Err(info)
            }
        }
    }

    fn link_program(&self, vertex: &str, fragment: &str) -> Result<glow::NativeProgram, String> {
        let vertex = self.compile_stage(glow::VERTEX_SHADER, vertex)?;
        let fragment = match self.compile_stage(glow::FRAGMENT_SHADER, fragment) {
            Ok(fragment) => fragment,
            Err(e) => {
                unsafe { self.gl.delete_shader(vertex) };
                return Err(e);
            }
        };
        unsafe {
            let program = self.gl.create_program()?;
            self.gl.attach_shader(program, vertex);
            self.gl.attach_shader(program, fragment);
            self.gl.link_program(program);
            self.gl.detach_shader(program, vertex);
            self.gl.detach_shader(program, fragment);
            self.gl.delete_shader(vertex);
            self.gl.delete_shader(fragment);
            if self.gl.get_program_link_status(program) {
                Ok(program)
            } else {
                let info = self.gl.get_program_info_log(program);
                self.gl.delete_program(program);
                Err(info)
            }
        }
    }

    fn rebind_current_target(&self) {
        let raw = self
            .frame_buffer_stack
            .top()
            .map(|handle| self.frame_buffers.resolve(handle.key).raw);
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, raw) };
    }

    fn write_mesh(&self, mesh: &GlMesh, vertices: &[Vertex], indices: &[u32], mode: MeshDrawMode) {
        let usage = convert::buffer_usage(mode);
        unsafe {
            self.gl.bind_vertex_array(Some(self.active_vertex_array()));
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(mesh.vertex_buffer));
            self.gl
                .buffer_data_u8_slice(glow::ARRAY_BUFFER, bytemuck::cast_slice(vertices), usage);
            self.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(mesh.index_buffer));
            self.gl
                .buffer_data_u8_slice(glow::ELEMENT_ARRAY_BUFFER, bytemuck::cast_slice(indices), usage);
        }
    }
}

impl RenderBackend for OpenGlBackend {
    fn name(&self) -> &'static str {
        "OpenGL"
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
        let capability = convert::capability(mode);
        unsafe {
            if enabled {
                self.gl.enable(capability);
            } else {
                self.gl.disable(capability);
            }
        }
    }

    fn frame_buffer_stack(&self) -> &FrameBufferStack {
        &self.frame_buffer_stack
    }

    fn frame_buffer_stack_mut(&mut self) -> &mut FrameBufferStack {
        &mut self.frame_buffer_stack
    }

    fn bind_frame_buffer_target(&mut self, target: Option<FrameBufferHandle>) {
        let (raw, (width, height)) = match target {
            Some(handle) => (
                Some(self.frame_buffers.resolve(handle.key).raw),
                (handle.width, handle.height),
            ),
            None => (None, self.surface_size()),
        };
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, raw) };
        self.target_height = height;
        self.set_viewport(0, 0, width, height);
    }

    fn attach_surface(&mut self, surface: &mut dyn RenderSurface) -> Result<SurfaceId, RenderError> {
        surface.make_current();
        let vertex_array = unsafe { self.gl.create_vertex_array() }.map_err(RenderError::Surface)?;
        let id = self.surfaces.insert(GlSurface {
            vertex_array,
            size: surface.framebuffer_size(),
        });
        self.current_surface = Some(id);
        // Render state is per context
        self.apply_base_state();
        unsafe {
            self.gl.front_face(glow::CCW);
            self.gl.blend_func(glow::ONE, glow::ONE_MINUS_SRC_ALPHA);
        }
        Ok(id)
    }

    fn detach_surface(&mut self, id: SurfaceId) {
        // The VAO dies with its context
        self.surfaces.remove(id);
        if self.current_surface == Some(id) {
            self.current_surface = None;
        }
    }

    fn resize_surface(&mut self, id: SurfaceId, width: u32, height: u32) {
        if let Some(surface) = self.surfaces.get_mut(id) {
            surface.size = (width, height);
        }
    }

    fn begin_frame(&mut self, id: SurfaceId, surface: &mut dyn RenderSurface) -> Result<(), RenderError> {
        let size = surface.framebuffer_size();
        let entry = self.surfaces.get_mut(id).ok_or(RenderError::UnknownSurface)?;
        entry.size = size;
        if size.0 == 0 || size.1 == 0 {
            return Err(RenderError::SurfaceUnavailable);
        }
        surface.make_current();
        self.current_surface = Some(id);
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
        Ok(())
    }

    fn set_clear_color(&mut self, color: ColorRgba) {
        let c = color.premultiplied();
        unsafe { self.gl.clear_color(c.r, c.g, c.b, c.a) };
    }

    fn clear(&mut self, flags: ClearFlags) {
        unsafe { self.gl.clear(convert::clear_mask(flags)) };
    }

    fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        let gl_y = convert::flip_y(self.target_height, y, height);
        unsafe {
            self.gl.viewport(
                x,
                gl_y,
                i32::try_from(width).unwrap_or(i32::MAX),
                i32::try_from(height).unwrap_or(i32::MAX),
            );
        }
    }

    fn set_scissor(&mut self, rect: Option<ScissorRect>) {
        unsafe {
            match rect {
                Some(rect) => {
                    self.gl.enable(glow::SCISSOR_TEST);
                    self.gl.scissor(
                        rect.x,
                        convert::flip_y(self.target_height, rect.y, rect.height),
                        i32::try_from(rect.width).unwrap_or(i32::MAX),
                        i32::try_from(rect.height).unwrap_or(i32::MAX),
                    );
                }
                None => self.gl.disable(glow::SCISSOR_TEST),
            }
        }
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
        self.allocate_texture(desc, &[Some(pixels)], TextureType::TwoDimensional)
    }

    fn create_cube_map(&mut self, desc: &TextureDescriptor, faces: [&[u8]; 6]) -> TextureHandle {
        if faces.iter().any(|face| face.len() != desc.layer_size()) {
            log::error!("Cube map faces must all be {}x{} RGBA8", desc.width, desc.height);
            return TextureHandle::default();
        }
        let layers = faces.map(Some);
        self.allocate_texture(desc, &layers, TextureType::CubeMap)
    }

    fn update_texture(&mut self, handle: TextureHandle, x: u32, y: u32, width: u32, height: u32, pixels: &[u8]) {
        assert_eq!(pixels.len(), width as usize * height as usize * 4, "Texture update size mismatch");
        let texture = self.textures.resolve(handle.key);
        let to_i32 = |v: u32| i32::try_from(v).unwrap_or(i32::MAX);
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(texture.raw));
            self.gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                0,
                to_i32(x),
                to_i32(y),
                to_i32(width),
                to_i32(height),
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(pixels),
            );
            self.gl.bind_texture(glow::TEXTURE_2D, None);
        }
    }

    fn use_texture(&mut self, handle: TextureHandle, unit: u32) {
        assert!(unit < TEXTURE_UNIT_COUNT, "Texture unit {unit} out of range");
        let texture = self.textures.resolve(handle.key);
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(texture.target, Some(texture.raw));
        }
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        if let Some(texture) = self.textures.release(handle.key) {
            unsafe { self.gl.delete_texture(texture.raw) };
        }
    }

    fn create_frame_buffer(&mut self, desc: &TextureDescriptor, has_depth: bool) -> FrameBufferHandle {
        if desc.width == 0 || desc.height == 0 {
            log::error!("Cannot create a {}x{} framebuffer", desc.width, desc.height);
            return FrameBufferHandle::default();
        }
        let color = self.allocate_texture(desc, &[None], TextureType::TwoDimensional);
        if !color.is_valid() {
            return FrameBufferHandle::default();
        }
        let color_raw = self.textures.resolve(color.key).raw;

        let created = unsafe {
            self.gl.create_framebuffer().and_then(|raw| {
                self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(raw));
                self.gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    glow::COLOR_ATTACHMENT0,
                    glow::TEXTURE_2D,
                    Some(color_raw),
                    0,
                );
                let depth = if has_depth {
                    let depth = self.gl.create_renderbuffer()?;
                    self.gl.bind_renderbuffer(glow::RENDERBUFFER, Some(depth));
                    self.gl.renderbuffer_storage(
                        glow::RENDERBUFFER,
                        glow::DEPTH24_STENCIL8,
                        i32::try_from(desc.width).unwrap_or(i32::MAX),
                        i32::try_from(desc.height).unwrap_or(i32::MAX),
                    );
                    self.gl.framebuffer_renderbuffer(
                        glow::FRAMEBUFFER,
                        glow::DEPTH_STENCIL_ATTACHMENT,
                        glow::RENDERBUFFER,
                        Some(depth),
                    );
                    self.gl.bind_renderbuffer(glow::RENDERBUFFER, None);
                    Some(depth)
                } else {
                    None
                };
                let status = self.gl.check_framebuffer_status(glow::FRAMEBUFFER);
                if status == glow::FRAMEBUFFER_COMPLETE {
                    Ok((raw, depth))
                } else {
                    self.gl.delete_framebuffer(raw);
                    if let Some(depth) = depth {
                        self.gl.delete_renderbuffer(depth);
                    }
                    Err(format!("framebuffer incomplete (0x{status:X})"))
                }
            })
        };
        self.rebind_current_target();

        match created {
            Ok((raw, depth)) => {
                let key = self.frame_buffers.insert(GlFrameBuffer { raw, depth, color });
                FrameBufferHandle::new(key, desc.width, desc.height, has_depth)
            }
            Err(e) => {
                log::error!("Failed to create framebuffer: {e}");
                self.destroy_texture(color);
                FrameBufferHandle::default()
            }
        }
    }

    fn frame_buffer_texture(&self, handle: FrameBufferHandle) -> TextureHandle {
        self.frame_buffers.resolve(handle.key).color
    }

    fn destroy_frame_buffer(&mut self, handle: FrameBufferHandle) {
        if let Some(frame_buffer) = self.frame_buffers.release(handle.key) {
            unsafe {
                self.gl.delete_framebuffer(frame_buffer.raw);
                if let Some(depth) = frame_buffer.depth {
                    self.gl.delete_renderbuffer(depth);
                }
            }
            self.destroy_texture(frame_buffer.color);
        }
    }

    fn create_shader(&mut self, source: &ShaderSource) -> ShaderHandle {
        let ShaderSource::Glsl { vertex, fragment } = source else {
            log::error!("OpenGL backend only compiles GLSL sources");
            return ShaderHandle::default();
        };
        match self.link_program(vertex, fragment) {
            Ok(program) => ShaderHandle::new(self.shaders.insert(GlShader {
                program,
                locations: HashMap::new(),
            })),
            Err(e) => {
                log::error!("Shader program failed to build:\n{e}");
                ShaderHandle::default()
            }
        }
    }

    fn use_shader(&mut self, handle: ShaderHandle) {
        let program = self.shaders.resolve(handle.key).program;
        unsafe { self.gl.use_program(Some(program)) };
    }

    fn set_shader_uniform(&mut self, handle: ShaderHandle, name: &str, value: UniformValue) {
        let gl = &self.gl;
        let shader = self.shaders.resolve_mut(handle.key);
        let program = shader.program;
        let location = shader
            .locations
            .entry(name.to_string())
            .or_insert_with(|| unsafe { gl.get_uniform_location(program, name) });
        let Some(location) = location.as_ref() else {
            log::debug!("Shader has no active uniform named {name}");
            return;
        };
        unsafe {
            gl.use_program(Some(program));
            match value {
                UniformValue::Bool(v) => gl.uniform_1_i32(Some(location), i32::from(v)),
                UniformValue::Int(v) => gl.uniform_1_i32(Some(location), v),
                UniformValue::UInt(v) => gl.uniform_1_u32(Some(location), v),
                UniformValue::Float(v) => gl.uniform_1_f32(Some(location), v),
                UniformValue::Vec2([x, y]) => gl.uniform_2_f32(Some(location), x, y),
                UniformValue::Vec3([x, y, z]) => gl.uniform_3_f32(Some(location), x, y, z),
                UniformValue::Vec4([x, y, z, w]) => gl.uniform_4_f32(Some(location), x, y, z, w),
                UniformValue::Mat4(m) => gl.uniform_matrix_4_f32_slice(Some(location), false, &m),
            }
        }
    }

    fn destroy_shader(&mut self, handle: ShaderHandle) {
        if let Some(shader) = self.shaders.release(handle.key) {
            unsafe { self.gl.delete_program(shader.program) };
        }
    }

    fn create_uniform_buffer(&mut self, size: usize, binding: u32) -> UniformBufferHandle {
        let Ok(byte_size) = i32::try_from(size) else {
            log::error!("Uniform buffer of {size} bytes is too large");
            return UniformBufferHandle::default();
        };
        match unsafe { self.gl.create_buffer() } {
            Ok(raw) => {
                unsafe {
                    self.gl.bind_buffer(glow::UNIFORM_BUFFER, Some(raw));
                    self.gl
                        .buffer_data_size(glow::UNIFORM_BUFFER, byte_size, glow::DYNAMIC_DRAW);
                    self.gl.bind_buffer_base(glow::UNIFORM_BUFFER, binding, Some(raw));
                    self.gl.bind_buffer(glow::UNIFORM_BUFFER, None);
                }
                UniformBufferHandle::new(self.uniform_buffers.insert(raw), binding, size)
            }
            Err(e) => {
                log::error!("Failed to create uniform buffer: {e}");
                UniformBufferHandle::default()
            }
        }
    }

    fn bind_uniform_buffer(&mut self, shader: ShaderHandle, buffer: UniformBufferHandle, block: &str) {
        self.uniform_buffers.resolve(buffer.key);
        let program = self.shaders.resolve(shader.key).program;
        unsafe {
            match self.gl.get_uniform_block_index(program, block) {
                Some(index) => self.gl.uniform_block_binding(program, index, buffer.binding),
                None => log::debug!("Shader has no uniform block named {block}"),
            }
        }
    }

    fn update_uniform_buffer(&mut self, handle: UniformBufferHandle, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= handle.size, "Uniform buffer write out of bounds");
        let raw = *self.uniform_buffers.resolve(handle.key);
        unsafe {
            self.gl.bind_buffer(glow::UNIFORM_BUFFER, Some(raw));
            self.gl.buffer_sub_data_u8_slice(
                glow::UNIFORM_BUFFER,
                i32::try_from(offset).unwrap_or(i32::MAX),
                data,
            );
            self.gl.bind_buffer(glow::UNIFORM_BUFFER, None);
        }
    }

    fn destroy_uniform_buffer(&mut self, handle: UniformBufferHandle) {
        if let Some(raw) = self.uniform_buffers.release(handle.key) {
            unsafe { self.gl.delete_buffer(raw) };
        }
    }

    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32], mode: MeshDrawMode) -> MeshHandle {
        let Ok(index_count) = u32::try_from(indices.len()) else {
            log::error!("Mesh has too many indices");
            return MeshHandle::default();
        };
        let buffers = unsafe {
            self.gl
                .create_buffer()
                .and_then(|vertex_buffer| Ok((vertex_buffer, self.gl.create_buffer()?)))
        };
        match buffers {
            Ok((vertex_buffer, index_buffer)) => {
                let mesh = GlMesh {
                    vertex_buffer,
                    index_buffer,
                };
                self.write_mesh(&mesh, vertices, indices, mode);
                MeshHandle::new(self.meshes.insert(mesh), index_count)
            }
            Err(e) => {
                log::error!("Failed to create mesh buffers: {e}");
                MeshHandle::default()
            }
        }
    }

    fn update_mesh(&mut self, handle: &mut MeshHandle, vertices: &[Vertex], indices: &[u32], mode: MeshDrawMode) {
        assert!(handle.is_valid(), "Invalid mesh handle given to OpenGL renderer");
        let mesh = self.meshes.resolve(handle.key);
        self.write_mesh(mesh, vertices, indices, mode);
        handle.index_count = u32::try_from(indices.len()).unwrap_or(u32::MAX);
    }

    fn submit_mesh(&mut self, handle: MeshHandle, depth: MeshDepthFunction, cull: MeshCullType) {
        let mesh = self.meshes.resolve(handle.key);
        let stride = Vertex::STRIDE as i32;
        unsafe {
            self.gl.bind_vertex_array(Some(self.active_vertex_array()));
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(mesh.vertex_buffer));
            for (location, (components, offset)) in (0u32..).zip([3, 3, 4, 2].into_iter().zip(Vertex::OFFSETS)) {
                self.gl.enable_vertex_attrib_array(location);
                self.gl.vertex_attrib_pointer_f32(
                    location,
                    components,
                    glow::FLOAT,
                    false,
                    stride,
                    offset as i32,
                );
            }
            self.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(mesh.index_buffer));
            self.gl.depth_func(convert::depth_function(depth));
            if let Some(face) = convert::cull_face(cull) {
                self.gl.cull_face(face);
            }
            self.gl.draw_elements(
                glow::TRIANGLES,
                i32::try_from(handle.index_count).unwrap_or(i32::MAX),
                glow::UNSIGNED_INT,
                0,
            );
        }
    }

    fn destroy_mesh(&mut self, handle: MeshHandle) {
        if let Some(mesh) = self.meshes.release(handle.key) {
            unsafe {
                self.gl.delete_buffer(mesh.vertex_buffer);
                self.gl.delete_buffer(mesh.index_buffer);
            }
        }
    }
}

impl Drop for OpenGlBackend {
    fn drop(&mut self) {
        let live = self.textures.len() + self.frame_buffers.len() + self.shaders.len() + self.meshes.len();
        if live > 0 {
            log::debug!("Releasing {live} GL object(s) still alive at shutdown");
        }
        unsafe {
            for (_, mesh) in self.meshes.drain() {
                self.gl.delete_buffer(mesh.vertex_buffer);
                self.gl.delete_buffer(mesh.index_buffer);
            }
            for (_, raw) in self.uniform_buffers.drain() {
                self.gl.delete_buffer(raw);
            }
            for (_, shader) in self.shaders.drain() {
                self.gl.delete_program(shader.program);
            }
            for (_, frame_buffer) in self.frame_buffers.drain() {
                self.gl.delete_framebuffer(frame_buffer.raw);
                if let Some(depth) = frame_buffer.depth {
                    self.gl.delete_renderbuffer(depth);
                }
            }
            for (_, texture) in self.textures.drain() {
                self.gl.delete_texture(texture.raw);
            }
            self.gl.delete_vertex_array(self.upload_vertex_array);
        }
    }
}

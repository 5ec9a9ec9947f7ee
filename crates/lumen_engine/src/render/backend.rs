//! The handle-based contract every render backend implements
//!
//! Backends implement the device-level operations. The stack disciplines
//! ([`RenderBackend::push_state`], [`RenderBackend::push_frame_buffer`]) and the mesh
//! draw scope are provided on top of them so that every backend coalesces state
//! changes the same way.

use super::handle::{
    FrameBufferHandle, MeshHandle, ShaderHandle, SurfaceId, TextureHandle, UniformBufferHandle,
};
use super::shaders::{ShaderDefines, ShaderForm};
use super::state::{FrameBufferStack, RenderStateStack};
use super::surface::RenderSurface;
use super::types::{
    ClearFlags, DeviceCapabilities, MeshCullType, MeshDepthFunction, MeshDrawMode, RenderMode,
    ScissorRect, ShaderSource, TextureDescriptor, UniformValue,
};
use super::{RenderError, Vertex};
use crate::foundation::math::ColorRgba;

/// GPU resource and state API shared by all native graphics APIs
///
/// `create_*` never fails loudly: on failure it logs and returns an invalid handle.
/// `use_*`, `update_*` and draws assert that their handle is live. `destroy_*` ignores
/// invalid handles.
pub trait RenderBackend {
    /// Human readable API name
    fn name(&self) -> &'static str;

    /// Device information gathered at startup
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Shader source form this backend compiles
    fn shader_form(&self) -> ShaderForm;

    /// Render-mode stacks
    fn state_stack(&self) -> &RenderStateStack;

    /// Mutable render-mode stacks
    fn state_stack_mut(&mut self) -> &mut RenderStateStack;

    /// Set a render mode on the device unconditionally
    fn apply_render_mode(&mut self, mode: RenderMode, enabled: bool);

    /// Offscreen target stack
    fn frame_buffer_stack(&self) -> &FrameBufferStack;

    /// Mutable offscreen target stack
    fn frame_buffer_stack_mut(&mut self) -> &mut FrameBufferStack;

    /// Bind an offscreen target, or the current surface for `None`, and size the viewport to it
    fn bind_frame_buffer_target(&mut self, target: Option<FrameBufferHandle>);

    /// Start presenting into a surface
    fn attach_surface(&mut self, surface: &mut dyn RenderSurface) -> Result<SurfaceId, RenderError>;

    /// Stop presenting into a surface and free its resources
    fn detach_surface(&mut self, id: SurfaceId);

    /// React to a surface's drawable size changing
    fn resize_surface(&mut self, id: SurfaceId, width: u32, height: u32);

    /// Begin recording a frame for a surface; the surface becomes the default target
    fn begin_frame(&mut self, id: SurfaceId, surface: &mut dyn RenderSurface) -> Result<(), RenderError>;

    /// Finish the frame and present it
    fn end_frame(&mut self, id: SurfaceId, surface: &mut dyn RenderSurface) -> Result<(), RenderError>;

    /// Color used by [`RenderBackend::clear`], premultiplied by alpha on the device
    fn set_clear_color(&mut self, color: ColorRgba);

    /// Clear buffers of the bound target
    fn clear(&mut self, flags: ClearFlags);

    /// Set the viewport in pixels, origin top-left
    fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32);

    /// Restrict drawing to a rectangle, or lift the restriction
    fn set_scissor(&mut self, rect: Option<ScissorRect>);

    /// Defines prepended to GLSL sources compiled from now on
    fn shader_defines_mut(&mut self) -> &mut ShaderDefines;

    /// Create a 2D texture from tightly packed RGBA8 pixels
    fn create_texture(&mut self, desc: &TextureDescriptor, pixels: &[u8]) -> TextureHandle;

    /// Create a cube map from six RGBA8 faces (+X, -X, +Y, -Y, +Z, -Z)
    fn create_cube_map(&mut self, desc: &TextureDescriptor, faces: [&[u8]; 6]) -> TextureHandle;

    /// Replace a region of a 2D texture
    fn update_texture(&mut self, handle: TextureHandle, x: u32, y: u32, width: u32, height: u32, pixels: &[u8]);

    /// Bind a texture to a texture unit
    fn use_texture(&mut self, handle: TextureHandle, unit: u32);

    /// Free a texture
    fn destroy_texture(&mut self, handle: TextureHandle);

    /// Create an offscreen target with an RGBA8 color attachment
    fn create_frame_buffer(&mut self, desc: &TextureDescriptor, has_depth: bool) -> FrameBufferHandle;

    /// Color attachment of an offscreen target, for sampling
    fn frame_buffer_texture(&self, handle: FrameBufferHandle) -> TextureHandle;

    /// Free an offscreen target and its attachments
    fn destroy_frame_buffer(&mut self, handle: FrameBufferHandle);

    /// Compile and link a shader program
    fn create_shader(&mut self, source: &ShaderSource) -> ShaderHandle;

    /// Make a program current for subsequent draws
    fn use_shader(&mut self, handle: ShaderHandle);

    /// Set a named uniform of a program
    fn set_shader_uniform(&mut self, handle: ShaderHandle, name: &str, value: UniformValue);

    /// Free a program
    fn destroy_shader(&mut self, handle: ShaderHandle);

    /// Create a uniform buffer of `size` bytes attached to binding point `binding`
    fn create_uniform_buffer(&mut self, size: usize, binding: u32) -> UniformBufferHandle;

    /// Connect a program's uniform block called `block` to a buffer's binding point
    fn bind_uniform_buffer(&mut self, shader: ShaderHandle, buffer: UniformBufferHandle, block: &str);

    /// Write `data` at byte `offset` of a uniform buffer
    fn update_uniform_buffer(&mut self, handle: UniformBufferHandle, offset: usize, data: &[u8]);

    /// Free a uniform buffer
    fn destroy_uniform_buffer(&mut self, handle: UniformBufferHandle);

    /// Upload vertices and triangle-list indices
    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32], mode: MeshDrawMode) -> MeshHandle;

    /// Replace the contents of a mesh, updating its index count
    fn update_mesh(&mut self, handle: &mut MeshHandle, vertices: &[Vertex], indices: &[u32], mode: MeshDrawMode);

    /// Issue the draw call for a mesh with the current program and state
    fn submit_mesh(&mut self, handle: MeshHandle, depth: MeshDepthFunction, cull: MeshCullType);

    /// Free a mesh
    fn destroy_mesh(&mut self, handle: MeshHandle);

    /// Push a render-mode value, touching the device only if it changes
    fn push_state(&mut self, mode: RenderMode, enabled: bool) {
        if self.state_stack_mut().push(mode, enabled) {
            self.apply_render_mode(mode, enabled);
        }
    }

    /// Restore the previous render-mode value, touching the device only if it changes
    #[track_caller]
    fn pop_state(&mut self, mode: RenderMode) {
        if let Some(restored) = self.state_stack_mut().pop(mode) {
            self.apply_render_mode(mode, restored);
        }
    }

    /// Apply every mode's base value to the device
    fn apply_base_state(&mut self) {
        let bases: Vec<_> = self.state_stack().base_values().collect();
        for (mode, enabled) in bases {
            self.apply_render_mode(mode, enabled);
        }
    }

    /// Redirect rendering into an offscreen target and clear it
    #[track_caller]
    fn push_frame_buffer(&mut self, handle: FrameBufferHandle) {
        assert!(handle.is_valid(), "Invalid framebuffer handle");
        if self.frame_buffer_stack_mut().push(handle) {
            self.bind_frame_buffer_target(Some(handle));
            self.push_state(RenderMode::DepthTest, handle.has_depth);
        }
        let flags = if handle.has_depth {
            ClearFlags::COLOR | ClearFlags::DEPTH
        } else {
            ClearFlags::COLOR
        };
        self.clear(flags);
    }

    /// Return to the previous offscreen target, or the surface when none is left
    #[track_caller]
    fn pop_frame_buffer(&mut self) {
        if let Some(target) = self.frame_buffer_stack_mut().pop() {
            self.bind_frame_buffer_target(target);
            self.pop_state(RenderMode::DepthTest);
        }
    }

    /// Recreate an offscreen target at a new size, keeping its depth setting
    fn recreate_frame_buffer(&mut self, handle: &mut FrameBufferHandle, desc: &TextureDescriptor) {
        let has_depth = handle.has_depth;
        self.destroy_frame_buffer(*handle);
        *handle = self.create_frame_buffer(desc, has_depth);
    }

    /// Bind an offscreen target's color attachment to a texture unit
    #[track_caller]
    fn use_frame_buffer_texture(&mut self, handle: FrameBufferHandle, unit: u32) {
        assert!(handle.is_valid(), "Invalid framebuffer handle");
        let texture = self.frame_buffer_texture(handle);
        self.use_texture(texture, unit);
    }

    /// Draw a mesh with culling scoped around the draw
    #[track_caller]
    fn draw_mesh(&mut self, handle: MeshHandle, depth: MeshDepthFunction, cull: MeshCullType) {
        assert!(handle.is_valid(), "Invalid mesh handle given to {} renderer", self.name());
        self.push_state(RenderMode::CullFace, cull != MeshCullType::None);
        self.submit_mesh(handle, depth, cull);
        self.pop_state(RenderMode::CullFace);
    }
}

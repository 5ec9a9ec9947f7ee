//! Rendering: the backend contract, its resource handles, and the native backends
//!
//! Everything above this module talks to a `Box<dyn RenderBackend>`. The OpenGL,
//! Vulkan and headless backends each implement the contract over their own device
//! model.

pub mod backend;
pub mod handle;
pub mod headless;
pub mod opengl;
pub mod shaders;
pub mod state;
pub mod surface;
pub mod types;
pub mod ubo;
pub mod vulkan;

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

pub use backend::RenderBackend;
pub use handle::{
    FrameBufferHandle, MeshHandle, ShaderHandle, SurfaceId, TextureHandle, UniformBufferHandle,
};
pub use headless::{DeviceCall, HeadlessBackend, HeadlessSurface};
pub use opengl::OpenGlBackend;
pub use shaders::{BuiltinShader, ShaderDefines, ShaderForm};
pub use state::{FrameBufferStack, RenderStateStack};
pub use surface::RenderSurface;
pub use types::{
    ClearFlags, DeviceCapabilities, FilterMode, MeshCullType, MeshDepthFunction, MeshDrawMode,
    RenderMode, ScissorRect, ShaderSource, TextureDescriptor, TextureType, UniformField,
    UniformValue, WrapMode,
};
pub use ubo::UboPv;
pub use vulkan::{VulkanBackend, VulkanError};

/// Errors raised while creating or driving a render backend
#[derive(Debug, Error)]
pub enum RenderError {
    /// Backend could not be brought up
    #[error("Renderer initialization failed: {0}")]
    InitializationFailed(String),

    /// A surface could not be attached or presented to
    #[error("Surface error: {0}")]
    Surface(String),

    /// The surface cannot be drawn to right now, for example while minimized
    #[error("Surface is unavailable")]
    SurfaceUnavailable,

    /// The surface id is not attached to this backend
    #[error("Unknown surface")]
    UnknownSurface,

    /// The operation is not implemented by this surface or backend
    #[error("{0} is not supported")]
    Unsupported(&'static str),

    /// Vulkan API failure
    #[error(transparent)]
    Vulkan(#[from] VulkanError),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Vertex layout shared by every backend
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position in model space
    pub position: [f32; 3],
    /// Normal vector
    pub normal: [f32; 3],
    /// Linear RGBA color
    pub color: [f32; 4],
    /// Texture coordinates
    pub uv: [f32; 2],
}

impl Vertex {
    /// Size of one vertex in bytes
    pub const STRIDE: usize = std::mem::size_of::<Self>();

    /// Byte offsets of position, normal, color and uv
    pub const OFFSETS: [usize; 4] = [0, 12, 24, 40];

    /// Create a vertex
    pub const fn new(position: [f32; 3], normal: [f32; 3], color: [f32; 4], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            color,
            uv,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(Vertex::STRIDE, 48);
        let vertex = Vertex::new([1.0, 2.0, 3.0], [0.0; 3], [0.5; 4], [0.25, 0.75]);
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&vertex));
        assert_eq!(floats[Vertex::OFFSETS[3] / 4], 0.25);
        assert_eq!(floats[Vertex::OFFSETS[2] / 4], 0.5);
    }
}

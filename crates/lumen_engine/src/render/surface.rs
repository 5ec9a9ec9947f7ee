//! What a backend needs from a window to present into it

use std::ffi::c_void;

use ash::vk;

use super::RenderError;

/// A presentable surface such as a native window
///
/// OpenGL backends use the context hooks; Vulkan backends use the instance
/// extension and surface hooks. Implementations only provide what their
/// windowing toolkit supports.
pub trait RenderSurface {
    /// Drawable size in pixels
    fn framebuffer_size(&self) -> (u32, u32);

    /// Make this surface's GL context current on the calling thread
    fn make_current(&mut self) {}

    /// Present the back buffer of a GL context
    fn swap_buffers(&mut self) {}

    /// Address of a GL entry point, null when unsupported
    fn gl_proc_address(&mut self, _name: &str) -> *const c_void {
        std::ptr::null()
    }

    /// Instance extensions required to present to this surface
    fn vulkan_instance_extensions(&self) -> Result<Vec<String>, RenderError> {
        Err(RenderError::Unsupported("Vulkan presentation"))
    }

    /// Create a `VkSurfaceKHR` for this surface
    fn create_vulkan_surface(&mut self, _instance: vk::Instance) -> Result<vk::SurfaceKHR, RenderError> {
        Err(RenderError::Unsupported("Vulkan presentation"))
    }
}

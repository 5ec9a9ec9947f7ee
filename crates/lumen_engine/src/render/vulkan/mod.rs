//! Vulkan 1.0 backend over `ash`
//!
//! The low-level wrappers own exactly one Vulkan object each and free it on drop.
//! [`VulkanBackend`] composes them into the handle-based render contract. Resources
//! released while the GPU may still read them are parked until the next in-flight
//! fence wait.

pub mod backend;
pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptor;
pub mod image;
pub mod pipeline;
pub mod render_pass;
pub mod swapchain;
pub mod sync;

use ash::vk;
use thiserror::Error;

pub use backend::VulkanBackend;
pub use buffer::Buffer;
pub use commands::CommandPool;
pub use context::{LogicalDevice, PhysicalDeviceInfo, PresentSurface, VulkanInstance};
pub use descriptor::DescriptorPool;
pub use image::{Image, Sampler};
pub use pipeline::{Pipeline, PipelineKey, ShaderProgram};
pub use render_pass::RenderPass;
pub use swapchain::Swapchain;
pub use sync::{Fence, Semaphore};

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

//! Per-frame descriptor pool

use ash::{vk, Device};

use super::{VulkanError, VulkanResult};
use crate::render::types::{TEXTURE_UNIT_COUNT, UNIFORM_BINDING_COUNT};

/// Draws per frame before descriptor allocation fails
pub const MAX_SETS_PER_FRAME: u32 = 4096;

/// Descriptor pool reset wholesale at the start of every frame
pub struct DescriptorPool {
    device: Device,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Create a pool sized for [`MAX_SETS_PER_FRAME`] draw sets
    pub fn new(device: Device) -> VulkanResult<Self> {
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: MAX_SETS_PER_FRAME * UNIFORM_BINDING_COUNT,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: MAX_SETS_PER_FRAME * TEXTURE_UNIT_COUNT,
            },
        ];
        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(MAX_SETS_PER_FRAME)
            .pool_sizes(&pool_sizes);
        let pool = unsafe {
            device
                .create_descriptor_pool(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self { device, pool })
    }

    /// Allocate one set of `layout`
    pub fn allocate(&self, layout: vk::DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);
        let sets = unsafe {
            self.device
                .allocate_descriptor_sets(&alloc_info)
                .map_err(VulkanError::Api)?
        };
        sets.into_iter().next().ok_or(VulkanError::InvalidOperation {
            reason: "descriptor pool returned no set".to_string(),
        })
    }

    /// Return every set to the pool; the sets must no longer be in use
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

//! Host-visible buffers for vertices, indices, uniforms and staging

use ash::{vk, Device};

use super::context::PhysicalDeviceInfo;
use super::{VulkanError, VulkanResult};

/// Buffer wrapper with its own memory allocation
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a host-visible, coherent buffer of `size` bytes
    pub fn new(
        device: Device,
        physical_device: &PhysicalDeviceInfo,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Self> {
        // Zero-sized buffers are invalid
        let size = size.max(4);
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None).map_err(VulkanError::Api)? };
        let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory_type_index = match physical_device.find_memory_type(
            mem_requirements.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ) {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(VulkanError::Api(e));
            }
        };

        let buffer = Self {
            device,
            buffer,
            memory,
            size,
        };
        unsafe {
            buffer
                .device
                .bind_buffer_memory(buffer.buffer, buffer.memory, 0)
                .map_err(VulkanError::Api)?;
        }
        Ok(buffer)
    }

    /// Create a buffer holding `data`
    pub fn with_data(
        device: Device,
        physical_device: &PhysicalDeviceInfo,
        usage: vk::BufferUsageFlags,
        data: &[u8],
    ) -> VulkanResult<Self> {
        let buffer = Self::new(device, physical_device, data.len() as vk::DeviceSize, usage)?;
        buffer.write(0, data)?;
        Ok(buffer)
    }

    /// Copy `data` into the buffer starting at byte `offset`
    pub fn write(&self, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let len = data.len() as vk::DeviceSize;
        if offset + len > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("write of {len} bytes at {offset} overflows a {} byte buffer", self.size),
            });
        }
        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, offset, len, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

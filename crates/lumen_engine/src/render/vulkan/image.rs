//! Images, views and samplers, with staging uploads and layout transitions

use ash::{vk, Device};

use super::buffer::Buffer;
use super::commands::CommandPool;
use super::context::PhysicalDeviceInfo;
use super::{VulkanError, VulkanResult};
use crate::render::types::{FilterMode, TextureDescriptor, WrapMode};

/// Color format of textures and offscreen targets
pub const COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Depth format of swapchain and offscreen depth attachments
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Number of mip levels in a full chain for a `width` x `height` image
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    u32::BITS - width.max(height).max(1).leading_zeros()
}

/// Shape of an image to create
#[derive(Debug, Clone, Copy)]
pub struct ImageSpec {
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Texel format
    pub format: vk::Format,
    /// How the image is used
    pub usage: vk::ImageUsageFlags,
    /// Aspect of the view
    pub aspect: vk::ImageAspectFlags,
    /// Mip levels
    pub mip_levels: u32,
    /// Six-layer cube map
    pub cube: bool,
}

impl ImageSpec {
    /// Sampled RGBA8 texture that can be uploaded to
    pub fn texture(desc: &TextureDescriptor, cube: bool) -> Self {
        let mip_levels = if desc.mipmaps {
            mip_level_count(desc.width, desc.height)
        } else {
            1
        };
        let mut usage = vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST;
        if mip_levels > 1 {
            usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        }
        Self {
            width: desc.width,
            height: desc.height,
            format: COLOR_FORMAT,
            usage,
            aspect: vk::ImageAspectFlags::COLOR,
            mip_levels,
            cube,
        }
    }

    /// Sampled RGBA8 color attachment
    pub const fn color_target(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: COLOR_FORMAT,
            usage: vk::ImageUsageFlags::from_raw(
                vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw() | vk::ImageUsageFlags::SAMPLED.as_raw(),
            ),
            aspect: vk::ImageAspectFlags::COLOR,
            mip_levels: 1,
            cube: false,
        }
    }

    /// Depth attachment
    pub const fn depth_target(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: DEPTH_FORMAT,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: vk::ImageAspectFlags::DEPTH,
            mip_levels: 1,
            cube: false,
        }
    }

    const fn layers(&self) -> u32 {
        if self.cube {
            6
        } else {
            1
        }
    }

    fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect,
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: self.layers(),
        }
    }
}

/// Device-local image with its memory and a view over all of it
pub struct Image {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    spec: ImageSpec,
}

impl Image {
    /// Create an image in `UNDEFINED` layout
    pub fn new(device: Device, physical_device: &PhysicalDeviceInfo, spec: ImageSpec) -> VulkanResult<Self> {
        let flags = if spec.cube {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };
        let image_info = vk::ImageCreateInfo::builder()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: spec.width,
                height: spec.height,
                depth: 1,
            })
            .mip_levels(spec.mip_levels)
            .array_layers(spec.layers())
            .format(spec.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(spec.usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.create_image(&image_info, None).map_err(VulkanError::Api)? };
        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory_type_index = match physical_device
            .find_memory_type(requirements.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL)
        {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(VulkanError::Api(e));
            }
        };

        let mut result = Self {
            device,
            image,
            memory,
            view: vk::ImageView::null(),
            spec,
        };
        unsafe {
            result
                .device
                .bind_image_memory(image, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        let view_type = if spec.cube {
            vk::ImageViewType::CUBE
        } else {
            vk::ImageViewType::TYPE_2D
        };
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(view_type)
            .format(spec.format)
            .subresource_range(spec.subresource_range());
        result.view = unsafe {
            result
                .device
                .create_image_view(&view_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(result)
    }

    /// Get image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Get the view over every layer and level
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Shape the image was created with
    pub fn spec(&self) -> &ImageSpec {
        &self.spec
    }

    /// Record a layout transition of the whole image
    pub fn record_transition(&self, command_buffer: vk::CommandBuffer, old: vk::ImageLayout, new: vk::ImageLayout) {
        record_transition(
            &self.device,
            command_buffer,
            self.image,
            self.spec.subresource_range(),
            old,
            new,
        );
    }

    /// Move the image from `UNDEFINED` into `layout`
    pub fn initialize_layout(&self, pool: &CommandPool, queue: vk::Queue, layout: vk::ImageLayout) -> VulkanResult<()> {
        pool.submit_one_time(queue, |_, command_buffer| {
            self.record_transition(command_buffer, vk::ImageLayout::UNDEFINED, layout);
        })
    }

    /// Upload tightly packed RGBA8 `layers` into mip 0 and leave the image shader-readable
    ///
    /// `from` is the image's current layout. Mip levels below 0 are regenerated by blits.
    pub fn upload(
        &self,
        pool: &CommandPool,
        queue: vk::Queue,
        physical_device: &PhysicalDeviceInfo,
        layers: &[&[u8]],
        from: vk::ImageLayout,
    ) -> VulkanResult<()> {
        let bytes: Vec<u8> = layers.concat();
        let staging = Buffer::with_data(
            self.device.clone(),
            physical_device,
            vk::BufferUsageFlags::TRANSFER_SRC,
            &bytes,
        )?;
        let layer_size = layers.first().map_or(0, |layer| layer.len()) as vk::DeviceSize;
        let regions: Vec<vk::BufferImageCopy> = (0u32..)
            .zip(layers)
            .map(|(layer, _)| vk::BufferImageCopy {
                buffer_offset: vk::DeviceSize::from(layer) * layer_size,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: layer,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D::default(),
                image_extent: vk::Extent3D {
                    width: self.spec.width,
                    height: self.spec.height,
                    depth: 1,
                },
            })
            .collect();

        pool.submit_one_time(queue, |device, command_buffer| unsafe {
            self.record_transition(command_buffer, from, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
            device.cmd_copy_buffer_to_image(
                command_buffer,
                staging.handle(),
                self.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &regions,
            );
            if self.spec.mip_levels > 1 {
                self.record_mip_chain(command_buffer);
            } else {
                self.record_transition(
                    command_buffer,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                );
            }
        })
    }

    /// Replace a region of mip 0 of layer 0; the image must be shader-readable
    pub fn upload_region(
        &self,
        pool: &CommandPool,
        queue: vk::Queue,
        physical_device: &PhysicalDeviceInfo,
        offset: (u32, u32),
        extent: (u32, u32),
        pixels: &[u8],
    ) -> VulkanResult<()> {
        let staging = Buffer::with_data(
            self.device.clone(),
            physical_device,
            vk::BufferUsageFlags::TRANSFER_SRC,
            pixels,
        )?;
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D {
                x: i32::try_from(offset.0).unwrap_or(i32::MAX),
                y: i32::try_from(offset.1).unwrap_or(i32::MAX),
                z: 0,
            },
            image_extent: vk::Extent3D {
                width: extent.0,
                height: extent.1,
                depth: 1,
            },
        };
        pool.submit_one_time(queue, |device, command_buffer| unsafe {
            self.record_transition(
                command_buffer,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );
            device.cmd_copy_buffer_to_image(
                command_buffer,
                staging.handle(),
                self.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
            if self.spec.mip_levels > 1 {
                self.record_mip_chain(command_buffer);
            } else {
                self.record_transition(
                    command_buffer,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                );
            }
        })
    }

    /// Blit each level from the one above; expects every level in `TRANSFER_DST_OPTIMAL`
    fn record_mip_chain(&self, command_buffer: vk::CommandBuffer) {
        let layers = self.spec.layers();
        let level_range = |level: u32| vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: level,
            level_count: 1,
            base_array_layer: 0,
            layer_count: layers,
        };
        let level_layers = |level: u32| vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: level,
            base_array_layer: 0,
            layer_count: layers,
        };
        let extent = |size: u32, level: u32| i32::try_from((size >> level).max(1)).unwrap_or(i32::MAX);

        for level in 1..self.spec.mip_levels {
            record_transition(
                &self.device,
                command_buffer,
                self.image,
                level_range(level - 1),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            );
            let blit = vk::ImageBlit {
                src_subresource: level_layers(level - 1),
                src_offsets: [
                    vk::Offset3D::default(),
                    vk::Offset3D {
                        x: extent(self.spec.width, level - 1),
                        y: extent(self.spec.height, level - 1),
                        z: 1,
                    },
                ],
                dst_subresource: level_layers(level),
                dst_offsets: [
                    vk::Offset3D::default(),
                    vk::Offset3D {
                        x: extent(self.spec.width, level),
                        y: extent(self.spec.height, level),
                        z: 1,
                    },
                ],
            };
            unsafe {
                self.device.cmd_blit_image(
                    command_buffer,
                    self.image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    self.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit],
                    vk::Filter::LINEAR,
                );
            }
            record_transition(
                &self.device,
                command_buffer,
                self.image,
                level_range(level - 1),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        }
        record_transition(
            &self.device,
            command_buffer,
            self.image,
            level_range(self.spec.mip_levels - 1),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.destroy_image_view(self.view, None);
            }
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

fn access_and_stage(layout: vk::ImageLayout) -> (vk::AccessFlags, vk::PipelineStageFlags) {
    match layout {
        vk::ImageLayout::UNDEFINED => (vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
            (vk::AccessFlags::TRANSFER_WRITE, vk::PipelineStageFlags::TRANSFER)
        }
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => (vk::AccessFlags::TRANSFER_READ, vk::PipelineStageFlags::TRANSFER),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
            (vk::AccessFlags::SHADER_READ, vk::PipelineStageFlags::FRAGMENT_SHADER)
        }
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => (
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        ),
        _ => (
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            vk::PipelineStageFlags::ALL_COMMANDS,
        ),
    }
}

/// Record an image memory barrier moving `range` from `old` to `new`
pub fn record_transition(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) {
    let (src_access, src_stage) = access_and_stage(old);
    let (dst_access, dst_stage) = access_and_stage(new);
    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .build();
    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

const fn address_mode(mode: WrapMode) -> vk::SamplerAddressMode {
    match mode {
        WrapMode::Repeat => vk::SamplerAddressMode::REPEAT,
        WrapMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        WrapMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        WrapMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
    }
}

/// Texture sampler with RAII cleanup
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Create a sampler for a texture described by `desc` with `mip_levels` levels
    pub fn new(device: Device, desc: &TextureDescriptor, mip_levels: u32) -> VulkanResult<Self> {
        let (filter, mipmap_mode) = match desc.filter {
            FilterMode::Nearest => (vk::Filter::NEAREST, vk::SamplerMipmapMode::NEAREST),
            FilterMode::Linear => (vk::Filter::LINEAR, vk::SamplerMipmapMode::LINEAR),
        };
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(mipmap_mode)
            .address_mode_u(address_mode(desc.wrap_s))
            .address_mode_v(address_mode(desc.wrap_t))
            .address_mode_w(address_mode(desc.wrap_r))
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK)
            .min_lod(0.0)
            .max_lod(mip_levels.saturating_sub(1) as f32);
        let sampler = unsafe { device.create_sampler(&create_info, None).map_err(VulkanError::Api)? };
        Ok(Self { device, sampler })
    }

    /// Get sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(300, 20), 9);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn test_texture_spec_enables_blit_source_for_mips() {
        let plain = ImageSpec::texture(&TextureDescriptor::new(64, 64), false);
        assert_eq!(plain.mip_levels, 1);
        assert!(!plain.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));

        let mipped = ImageSpec::texture(&TextureDescriptor::new(64, 64).with_mipmaps(), true);
        assert_eq!(mipped.mip_levels, 7);
        assert!(mipped.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
        assert_eq!(mipped.layers(), 6);
    }
}

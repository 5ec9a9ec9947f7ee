//! Swapchain with its depth buffer and per-image framebuffers

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use super::context::{PhysicalDeviceInfo, PresentSurface};
use super::image::{Image, ImageSpec};
use super::render_pass::Framebuffer;
use super::{VulkanError, VulkanResult};

/// Pick the surface format, preferring 8-bit BGRA UNORM
pub fn choose_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|sf| sf.format == vk::Format::B8G8R8A8_UNORM && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
}

/// Pick the swapchain extent for a window of `window_extent` pixels
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window_extent: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width == u32::MAX {
        vk::Extent2D {
            width: window_extent
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: window_extent
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    } else {
        caps.current_extent
    }
}

/// Swapchain management wrapper with RAII cleanup
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    // Drop order: framebuffers reference the views and the depth image
    framebuffers: Vec<Framebuffer>,
    depth: Image,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain for `surface`, retiring `old_swapchain` if it is not null
    ///
    /// `surface_format` is fixed by the caller so that pipelines built for the
    /// previous swapchain stay compatible.
    pub fn new(
        device: Device,
        swapchain_loader: SwapchainLoader,
        surface: &PresentSurface,
        physical_device: &PhysicalDeviceInfo,
        surface_format: vk::SurfaceFormatKHR,
        window_extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
        render_pass: vk::RenderPass,
    ) -> VulkanResult<Self> {
        let surface_caps = unsafe {
            surface
                .loader()
                .get_physical_device_surface_capabilities(physical_device.device, surface.handle())
                .map_err(VulkanError::Api)?
        };
        let present_modes = unsafe {
            surface
                .loader()
                .get_physical_device_surface_present_modes(physical_device.device, surface.handle())
                .map_err(VulkanError::Api)?
        };
        let present_mode = present_modes
            .iter()
            .copied()
            .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
            .unwrap_or(vk::PresentModeKHR::FIFO);

        let extent = choose_extent(&surface_caps, window_extent);
        if extent.width == 0 || extent.height == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "surface has zero size".to_string(),
            });
        }

        let image_count = if surface_caps.max_image_count > 0 {
            (surface_caps.min_image_count + 1).min(surface_caps.max_image_count)
        } else {
            surface_caps.min_image_count + 1
        };
        let composite_alpha = [
            vk::CompositeAlphaFlagsKHR::OPAQUE,
            vk::CompositeAlphaFlagsKHR::INHERIT,
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        ]
        .into_iter()
        .find(|&mode| surface_caps.supported_composite_alpha.contains(mode))
        .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE);

        let swapchain_create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(composite_alpha)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&swapchain_create_info, None)
                .map_err(VulkanError::Api)?
        };

        let depth = match Image::new(
            device.clone(),
            physical_device,
            ImageSpec::depth_target(extent.width, extent.height),
        ) {
            Ok(depth) => depth,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e);
            }
        };

        let mut result = Self {
            device,
            swapchain_loader,
            swapchain,
            framebuffers: Vec::new(),
            depth,
            image_views: Vec::new(),
            format: surface_format,
            extent,
        };

        let images = unsafe {
            result
                .swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };
        for image in images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe {
                result
                    .device
                    .create_image_view(&create_info, None)
                    .map_err(VulkanError::Api)?
            };
            result.image_views.push(view);
            let framebuffer = Framebuffer::new(
                result.device.clone(),
                render_pass,
                &[view, result.depth.view()],
                extent,
            )?;
            result.framebuffers.push(framebuffer);
        }
        Ok(result)
    }

    /// Pick the surface format a new surface's swapchains will use
    pub fn query_format(surface: &PresentSurface, physical_device: &PhysicalDeviceInfo) -> VulkanResult<vk::SurfaceFormatKHR> {
        let formats = unsafe {
            surface
                .loader()
                .get_physical_device_surface_formats(physical_device.device, surface.handle())
                .map_err(VulkanError::Api)?
        };
        choose_format(&formats)
            .ok_or_else(|| VulkanError::InitializationFailed("Surface reports no formats".to_string()))
    }

    /// Acquire the next image; `Ok(None)` when the swapchain must be recreated
    pub fn acquire_next_image(&self, signal: vk::Semaphore) -> VulkanResult<Option<u32>> {
        match unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, u64::MAX, signal, vk::Fence::null())
        } {
            Ok((index, _suboptimal)) => Ok(Some(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(None),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Present an image; `Ok(false)` when the swapchain should be recreated
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait: vk::Semaphore) -> VulkanResult<bool> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        match unsafe { self.swapchain_loader.queue_present(queue, &present_info) } {
            Ok(suboptimal) => Ok(!suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(false),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Framebuffer for a swapchain image
    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .map(Framebuffer::handle)
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.framebuffers.clear();
        unsafe {
            for &image_view in &self.image_views {
                self.device.destroy_image_view(image_view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_bgra_unorm() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(choose_format(&formats).map(|f| f.format), Some(vk::Format::B8G8R8A8_UNORM));
        assert_eq!(choose_format(&formats[..1]).map(|f| f.format), Some(vk::Format::R8G8B8A8_SRGB));
        assert!(choose_format(&[]).is_none());
    }

    #[test]
    fn test_extent_follows_surface_when_fixed() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: 640, height: 480 },
            ..Default::default()
        };
        let extent = choose_extent(&caps, vk::Extent2D { width: 800, height: 600 });
        assert_eq!((extent.width, extent.height), (640, 480));
    }

    #[test]
    fn test_extent_clamps_window_size() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 1024,
                height: 1024,
            },
            ..Default::default()
        };
        let extent = choose_extent(&caps, vk::Extent2D { width: 2000, height: 300 });
        assert_eq!((extent.width, extent.height), (1024, 300));
    }
}

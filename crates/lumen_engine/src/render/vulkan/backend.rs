//! The Vulkan implementation of the render contract
//!
//! One command buffer records each frame. `begin_frame` waits for the previous
//! submission, frees parked resources and acquires a swapchain image. Render passes
//! begin lazily on the first clear or draw after a target change, so pushing and
//! popping framebuffers costs nothing until something is drawn.

use std::collections::HashMap;

use ash::{vk, Device};
use slotmap::SlotMap;

use super::buffer::Buffer;
use super::commands::CommandPool;
use super::context::{LogicalDevice, PhysicalDeviceInfo, PresentSurface, VulkanInstance};
use super::descriptor::DescriptorPool;
use super::image::{Image, ImageSpec, Sampler};
use super::pipeline::{Pipeline, PipelineKey, PipelineTarget, ShaderProgram, SAMPLER_BINDING_BASE};
use super::render_pass::{Framebuffer, PassKind, RenderPass};
use super::swapchain::Swapchain;
use super::sync::{Fence, Semaphore};
use super::{VulkanError, VulkanResult};
use crate::foundation::math::ColorRgba;
use crate::render::backend::RenderBackend;
use crate::render::handle::{
    FrameBufferHandle, FrameBufferKey, MeshHandle, MeshKey, ResourceTable, ShaderHandle, ShaderKey,
    SurfaceId, TextureHandle, TextureKey, UniformBufferHandle, UniformBufferKey,
};
use crate::render::shaders::{ShaderDefines, ShaderForm};
use crate::render::state::{FrameBufferStack, RenderStateStack};
use crate::render::surface::RenderSurface;
use crate::render::types::{
    ClearFlags, DeviceCapabilities, MeshCullType, MeshDepthFunction, MeshDrawMode, RenderMode,
    ScissorRect, ShaderSource, TextureDescriptor, TextureType, UniformValue, TEXTURE_UNIT_COUNT,
    UNIFORM_BINDING_COUNT,
};
use crate::render::{RenderError, Vertex};

/// Size of the zeroed buffer bound to unused uniform slots
const DUMMY_UNIFORM_SIZE: usize = 256;

struct VkTexture {
    sampler: Sampler,
    image: Image,
}

struct VkFrameBuffer {
    framebuffer: Framebuffer,
    depth: Option<Image>,
    color: TextureHandle,
}

struct VkMesh {
    vertices: Buffer,
    indices: Buffer,
    last_used_frame: u64,
}

struct VkUniformBuffer {
    buffer: Buffer,
    contents: Vec<u8>,
    last_used_frame: u64,
}

struct VkSurface {
    swapchain: Option<Swapchain>,
    surface: PresentSurface,
    format: vk::SurfaceFormatKHR,
    image_available: Semaphore,
    render_finished: Semaphore,
    size: (u32, u32),
    needs_recreate: bool,
}

/// Resources parked until the GPU can no longer read them
#[allow(dead_code)] // Held only to be dropped
enum Garbage {
    Buffer(Buffer),
    Texture(VkTexture),
    FrameBuffer(Framebuffer, Option<Image>),
    Shader(ShaderProgram),
    Pipeline(Pipeline),
}

struct FrameState {
    surface: SurfaceId,
    image_index: u32,
    extent: vk::Extent2D,
    format: vk::Format,
    framebuffer: vk::Framebuffer,
    swapchain_cleared: bool,
    pass_open: bool,
    bound_pipeline: Option<vk::Pipeline>,
}

const fn extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D { width, height }
}

/// Vulkan scissor for a top-left origin rectangle, clipped to the target
pub fn scissor_rect(rect: Option<ScissorRect>, target: vk::Extent2D) -> vk::Rect2D {
    let Some(rect) = rect else {
        return vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: target,
        };
    };
    let clip = |origin: i32, size: u32, limit: u32| -> (i32, u32) {
        let start = i64::from(origin).clamp(0, i64::from(limit));
        let end = (i64::from(origin) + i64::from(size)).clamp(start, i64::from(limit));
        (
            i32::try_from(start).unwrap_or(i32::MAX),
            u32::try_from(end - start).unwrap_or(0),
        )
    };
    let (x, width) = clip(rect.x, rect.width, target.width);
    let (y, height) = clip(rect.y, rect.height, target.height);
    vk::Rect2D {
        offset: vk::Offset2D { x, y },
        extent: extent(width, height),
    }
}

fn build_texture(
    device: &Device,
    physical_device: &PhysicalDeviceInfo,
    pool: &CommandPool,
    queue: vk::Queue,
    desc: &TextureDescriptor,
    layers: &[&[u8]],
) -> VulkanResult<VkTexture> {
    let image = Image::new(
        device.clone(),
        physical_device,
        ImageSpec::texture(desc, layers.len() == 6),
    )?;
    image.upload(pool, queue, physical_device, layers, vk::ImageLayout::UNDEFINED)?;
    let sampler = Sampler::new(device.clone(), desc, image.spec().mip_levels)?;
    Ok(VkTexture { sampler, image })
}

/// Render backend for Vulkan 1.0 devices
pub struct VulkanBackend {
    capabilities: DeviceCapabilities,
    states: RenderStateStack,
    frame_buffer_stack: FrameBufferStack,
    defines: ShaderDefines,
    frame: Option<FrameState>,
    frame_index: u64,
    current_target: Option<FrameBufferHandle>,
    target_extent: vk::Extent2D,
    viewport: vk::Viewport,
    scissor: Option<ScissorRect>,
    clear_color: ColorRgba,
    current_shader: Option<ShaderKey>,
    bound_textures: [Option<TextureKey>; TEXTURE_UNIT_COUNT as usize],
    bound_uniforms: [Option<UniformBufferKey>; UNIFORM_BINDING_COUNT as usize],
    garbage: Vec<Garbage>,
    pipelines: HashMap<PipelineKey, Pipeline>,
    textures: ResourceTable<TextureKey, VkTexture>,
    frame_buffers: ResourceTable<FrameBufferKey, VkFrameBuffer>,
    shaders: ResourceTable<ShaderKey, ShaderProgram>,
    uniform_buffers: ResourceTable<UniformBufferKey, VkUniformBuffer>,
    meshes: ResourceTable<MeshKey, VkMesh>,
    surfaces: SlotMap<SurfaceId, VkSurface>,
    pending_surface: Option<PresentSurface>,
    white_texture: VkTexture,
    dummy_uniforms: Buffer,
    swapchain_passes: HashMap<vk::Format, (RenderPass, RenderPass)>,
    offscreen_pass: RenderPass,
    offscreen_depth_pass: RenderPass,
    descriptor_pool: DescriptorPool,
    in_flight: Fence,
    command_buffer: vk::CommandBuffer,
    command_pool: CommandPool,
    physical_device: PhysicalDeviceInfo,
    // Drop order: the device goes after everything it created, the instance last
    device: LogicalDevice,
    instance: VulkanInstance,
}

impl VulkanBackend {
    /// Bring up a device able to present to `surface`
    ///
    /// `surface` must be the first surface attached afterwards; its `VkSurfaceKHR`
    /// is created here for device selection and handed over on attach.
    pub fn new(surface: &mut dyn RenderSurface, app_name: &str, debug_output: bool) -> Result<Self, RenderError> {
        let extensions = surface.vulkan_instance_extensions()?;
        let instance = VulkanInstance::new(&extensions, app_name, debug_output)?;
        let raw_surface = surface.create_vulkan_surface(instance.instance.handle())?;
        let present = PresentSurface::new(instance.surface_loader.clone(), raw_surface);

        let physical_device = PhysicalDeviceInfo::select_suitable_device(&instance.instance, &present)?;
        let device = LogicalDevice::new(&instance.instance, &physical_device)?;
        let raw = device.device.clone();

        let command_pool = CommandPool::new(raw.clone(), physical_device.graphics_family)?;
        let command_buffer = command_pool
            .allocate_command_buffers(1)?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InitializationFailed("No frame command buffer".to_string()))?;
        let in_flight = Fence::new(raw.clone(), true)?;
        let descriptor_pool = DescriptorPool::new(raw.clone())?;
        let offscreen_pass = RenderPass::offscreen(raw.clone(), false)?;
        let offscreen_depth_pass = RenderPass::offscreen(raw.clone(), true)?;

        let white: &[u8] = &[255; 4];
        let white_texture = build_texture(
            &raw,
            &physical_device,
            &command_pool,
            device.graphics_queue,
            &TextureDescriptor::new(1, 1),
            &[white],
        )?;
        let dummy_uniforms = Buffer::with_data(
            raw,
            &physical_device,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            &[0; DUMMY_UNIFORM_SIZE],
        )?;

        let properties = &physical_device.properties;
        let capabilities = DeviceCapabilities {
            backend: "Vulkan".to_string(),
            device_name: physical_device.device_name(),
            version: format!(
                "{}.{}.{}",
                vk::api_version_major(properties.api_version),
                vk::api_version_minor(properties.api_version),
                vk::api_version_patch(properties.api_version)
            ),
            max_texture_size: properties.limits.max_image_dimension2_d,
            texture_units: TEXTURE_UNIT_COUNT,
            debug_output: instance.has_debug_output(),
        };
        log::info!("{capabilities}");

        Ok(Self {
            capabilities,
            states: RenderStateStack::new(),
            frame_buffer_stack: FrameBufferStack::default(),
            defines: ShaderDefines::default(),
            frame: None,
            frame_index: 0,
            current_target: None,
            target_extent: extent(0, 0),
            viewport: vk::Viewport::default(),
            scissor: None,
            clear_color: ColorRgba::BLACK,
            current_shader: None,
            bound_textures: [None; TEXTURE_UNIT_COUNT as usize],
            bound_uniforms: [None; UNIFORM_BINDING_COUNT as usize],
            garbage: Vec::new(),
            pipelines: HashMap::new(),
            textures: ResourceTable::new("texture"),
            frame_buffers: ResourceTable::new("framebuffer"),
            shaders: ResourceTable::new("shader"),
            uniform_buffers: ResourceTable::new("uniform buffer"),
            meshes: ResourceTable::new("mesh"),
            surfaces: SlotMap::with_key(),
            pending_surface: Some(present),
            white_texture,
            dummy_uniforms,
            swapchain_passes: HashMap::new(),
            offscreen_pass,
            offscreen_depth_pass,
            descriptor_pool,
            in_flight,
            command_buffer,
            command_pool,
            physical_device,
            device,
            instance,
        })
    }

    fn raw_device(&self) -> Device {
        self.device.device.clone()
    }

    fn ensure_swapchain_passes(&mut self, format: vk::Format) -> VulkanResult<()> {
        if !self.swapchain_passes.contains_key(&format) {
            let clear = RenderPass::swapchain(self.raw_device(), format, PassKind::SwapchainClear)?;
            let load = RenderPass::swapchain(self.raw_device(), format, PassKind::SwapchainLoad)?;
            self.swapchain_passes.insert(format, (clear, load));
        }
        Ok(())
    }

    fn swapchain_pass(&self, format: vk::Format, kind: PassKind) -> VulkanResult<vk::RenderPass> {
        let (clear, load) = self
            .swapchain_passes
            .get(&format)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("no render pass for {format:?}"),
            })?;
        Ok(if kind == PassKind::SwapchainClear {
            clear.handle()
        } else {
            load.handle()
        })
    }

    fn recreate_swapchain(&mut self, id: SurfaceId, size: (u32, u32)) -> VulkanResult<()> {
        self.device.wait_idle();
        let format = self
            .surfaces
            .get(id)
            .map(|surface| surface.format)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "unknown surface".to_string(),
            })?;
        let render_pass = self.swapchain_pass(format.format, PassKind::SwapchainClear)?;

        let Some(surface) = self.surfaces.get_mut(id) else {
            return Ok(());
        };
        let old = surface.swapchain.take();
        let swapchain = Swapchain::new(
            self.device.device.clone(),
            self.device.swapchain_loader.clone(),
            &surface.surface,
            &self.physical_device,
            format,
            extent(size.0, size.1),
            old.as_ref().map_or(vk::SwapchainKHR::null(), Swapchain::handle),
            render_pass,
        )?;
        drop(old);
        log::debug!(
            "Swapchain recreated at {}x{}",
            swapchain.extent().width,
            swapchain.extent().height
        );
        surface.swapchain = Some(swapchain);
        surface.size = size;
        surface.needs_recreate = false;
        Ok(())
    }

    fn acquire(&mut self, id: SurfaceId, size: (u32, u32)) -> Result<(u32, vk::Extent2D, vk::Format, vk::Framebuffer), RenderError> {
        for _ in 0..2 {
            let surface = self.surfaces.get(id).ok_or(RenderError::UnknownSurface)?;
            if surface.needs_recreate || surface.swapchain.is_none() || surface.size != size {
                self.recreate_swapchain(id, size)?;
                continue;
            }
            let Some(swapchain) = surface.swapchain.as_ref() else {
                continue;
            };
            match swapchain.acquire_next_image(surface.image_available.handle())? {
                Some(index) => {
                    let framebuffer = swapchain
                        .framebuffer(index)
                        .ok_or(RenderError::SurfaceUnavailable)?;
                    return Ok((index, swapchain.extent(), surface.format.format, framebuffer));
                }
                None => {
                    if let Some(surface) = self.surfaces.get_mut(id) {
                        surface.needs_recreate = true;
                    }
                }
            }
        }
        Err(RenderError::SurfaceUnavailable)
    }

    fn set_dynamic_state(&self) {
        let scissor = scissor_rect(self.scissor, self.target_extent);
        unsafe {
            self.device
                .device
                .cmd_set_viewport(self.command_buffer, 0, &[self.viewport]);
            self.device
                .device
                .cmd_set_scissor(self.command_buffer, 0, &[scissor]);
        }
    }

    /// Begin a pass over the current target if none is open; false outside a frame
    fn ensure_pass(&mut self) -> bool {
        let Some(frame) = self.frame.as_ref() else {
            log::debug!("Render command issued outside of a frame was skipped");
            return false;
        };
        if frame.pass_open {
            return true;
        }

        let begin = match self.current_target {
            None => {
                let kind = if frame.swapchain_cleared {
                    PassKind::SwapchainLoad
                } else {
                    PassKind::SwapchainClear
                };
                self.swapchain_pass(frame.format, kind)
                    .map(|pass| (pass, frame.framebuffer, frame.extent))
            }
            Some(handle) => {
                let target = self.frame_buffers.resolve(handle.key);
                let pass = if handle.has_depth {
                    &self.offscreen_depth_pass
                } else {
                    &self.offscreen_pass
                };
                Ok((
                    pass.handle(),
                    target.framebuffer.handle(),
                    extent(handle.width, handle.height),
                ))
            }
        };
        let (render_pass, framebuffer, render_extent) = match begin {
            Ok(begin) => begin,
            Err(e) => {
                log::error!("Cannot begin render pass: {e}");
                return false;
            }
        };

        let c = self.clear_color;
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: c.to_array(),
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: render_extent,
            })
            .clear_values(&clear_values);
        unsafe {
            self.device.device.cmd_begin_render_pass(
                self.command_buffer,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }

        if let Some(frame) = self.frame.as_mut() {
            if self.current_target.is_none() {
                frame.swapchain_cleared = true;
            }
            frame.pass_open = true;
            frame.bound_pipeline = None;
        }
        self.set_dynamic_state();
        true
    }

    fn end_pass(&mut self) {
        if let Some(frame) = self.frame.as_mut() {
            if frame.pass_open {
                unsafe { self.device.device.cmd_end_render_pass(self.command_buffer) };
                frame.pass_open = false;
            }
        }
    }

    fn pass_open(&self) -> bool {
        self.frame.as_ref().is_some_and(|frame| frame.pass_open)
    }

    fn pipeline_for(&mut self, key: PipelineKey) -> Option<vk::Pipeline> {
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Some(pipeline.handle());
        }
        let render_pass = match key.target {
            PipelineTarget::Surface(format) => match self.swapchain_pass(format, PassKind::SwapchainLoad) {
                Ok(pass) => pass,
                Err(e) => {
                    log::error!("{e}");
                    return None;
                }
            },
            PipelineTarget::Offscreen { has_depth: true } => self.offscreen_depth_pass.handle(),
            PipelineTarget::Offscreen { has_depth: false } => self.offscreen_pass.handle(),
        };
        let program = self.shaders.resolve(key.shader);
        match Pipeline::new(self.raw_device(), program, render_pass, &key) {
            Ok(pipeline) => {
                let handle = pipeline.handle();
                self.pipelines.insert(key, pipeline);
                Some(handle)
            }
            Err(e) => {
                log::error!("Failed to build pipeline {key:?}: {e}");
                None
            }
        }
    }

    fn write_descriptor_set(&mut self, layout: vk::DescriptorSetLayout) -> Option<vk::DescriptorSet> {
        let set = match self.descriptor_pool.allocate(layout) {
            Ok(set) => set,
            Err(e) => {
                log::warn!("Draw skipped, descriptor allocation failed: {e}");
                return None;
            }
        };

        let frame_index = self.frame_index;
        let buffer_infos: Vec<vk::DescriptorBufferInfo> = self
            .bound_uniforms
            .iter()
            .map(|slot| {
                let buffer = match slot {
                    Some(key) => {
                        let uniform = self.uniform_buffers.resolve_mut(*key);
                        uniform.last_used_frame = frame_index;
                        uniform.buffer.handle()
                    }
                    None => self.dummy_uniforms.handle(),
                };
                vk::DescriptorBufferInfo {
                    buffer,
                    offset: 0,
                    range: vk::WHOLE_SIZE,
                }
            })
            .collect();
        let image_infos: Vec<vk::DescriptorImageInfo> = self
            .bound_textures
            .iter()
            .map(|slot| {
                let texture = slot.map_or(&self.white_texture, |key| self.textures.resolve(key));
                vk::DescriptorImageInfo {
                    sampler: texture.sampler.handle(),
                    image_view: texture.image.view(),
                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                }
            })
            .collect();

        let writes: Vec<vk::WriteDescriptorSet> = (0u32..)
            .zip(&buffer_infos)
            .map(|(binding, info)| {
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(info))
                    .build()
            })
            .chain((0u32..).zip(&image_infos).map(|(unit, info)| {
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(SAMPLER_BINDING_BASE + unit)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(info))
                    .build()
            }))
            .collect();
        unsafe { self.device.device.update_descriptor_sets(&writes, &[]) };
        Some(set)
    }

    fn retire_texture(&mut self, key: TextureKey) {
        if let Some(texture) = self.textures.release(key) {
            for slot in &mut self.bound_textures {
                if *slot == Some(key) {
                    *slot = None;
                }
            }
            self.garbage.push(Garbage::Texture(texture));
        }
    }

    fn submit_frame(&mut self) -> VulkanResult<bool> {
        let Some(frame) = self.frame.take() else {
            return Ok(true);
        };
        let surface = self.surfaces.get(frame.surface).ok_or(VulkanError::InvalidOperation {
            reason: "surface detached mid-frame".to_string(),
        })?;
        let device = &self.device.device;
        unsafe {
            device
                .end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)?;
        }
        self.in_flight.reset()?;

        let wait_semaphores = [surface.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [surface.render_finished.handle()];
        let command_buffers = [self.command_buffer];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();
        unsafe {
            device
                .queue_submit(self.device.graphics_queue, &[submit_info], self.in_flight.handle())
                .map_err(VulkanError::Api)?;
        }

        match surface.swapchain.as_ref() {
            Some(swapchain) => swapchain.present(
                self.device.present_queue,
                frame.image_index,
                surface.render_finished.handle(),
            ),
            None => Ok(false),
        }
    }
}

impl RenderBackend for VulkanBackend {
    fn name(&self) -> &'static str {
        "Vulkan"
    }

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn shader_form(&self) -> ShaderForm {
        ShaderForm::SpirV
    }

    fn state_stack(&self) -> &RenderStateStack {
        &self.states
    }

    fn state_stack_mut(&mut self) -> &mut RenderStateStack {
        &mut self.states
    }

    fn apply_render_mode(&mut self, mode: RenderMode, enabled: bool) {
        // Read from the state stack when a draw picks its pipeline
        log::trace!("Vulkan render mode {mode:?} = {enabled}");
    }

    fn frame_buffer_stack(&self) -> &FrameBufferStack {
        &self.frame_buffer_stack
    }

    fn frame_buffer_stack_mut(&mut self) -> &mut FrameBufferStack {
        &mut self.frame_buffer_stack
    }

    fn bind_frame_buffer_target(&mut self, target: Option<FrameBufferHandle>) {
        self.end_pass();
        self.target_extent = match target {
            Some(handle) => {
                self.frame_buffers.resolve(handle.key);
                extent(handle.width, handle.height)
            }
            None => self.frame.as_ref().map_or(extent(0, 0), |frame| frame.extent),
        };
        self.current_target = target;
        self.viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.target_extent.width as f32,
            height: self.target_extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
    }

    fn attach_surface(&mut self, surface: &mut dyn RenderSurface) -> Result<SurfaceId, RenderError> {
        let present = match self.pending_surface.take() {
            Some(present) => present,
            None => {
                let raw = surface.create_vulkan_surface(self.instance.instance.handle())?;
                PresentSurface::new(self.instance.surface_loader.clone(), raw)
            }
        };
        let supported = unsafe {
            present
                .loader()
                .get_physical_device_surface_support(
                    self.physical_device.device,
                    self.physical_device.present_family,
                    present.handle(),
                )
                .map_err(VulkanError::Api)?
        };
        if !supported {
            return Err(RenderError::Surface(
                "Selected GPU cannot present to this window".to_string(),
            ));
        }

        let format = Swapchain::query_format(&present, &self.physical_device)?;
        self.ensure_swapchain_passes(format.format)?;
        let raw = self.raw_device();
        let id = self.surfaces.insert(VkSurface {
            swapchain: None,
            surface: present,
            format,
            image_available: Semaphore::new(raw.clone())?,
            render_finished: Semaphore::new(raw)?,
            size: surface.framebuffer_size(),
            needs_recreate: true,
        });
        Ok(id)
    }

    fn detach_surface(&mut self, id: SurfaceId) {
        if self.frame.as_ref().is_some_and(|frame| frame.surface == id) {
            log::warn!("Surface detached mid-frame; the frame is discarded");
            self.frame = None;
        }
        self.device.wait_idle();
        self.surfaces.remove(id);
    }

    fn resize_surface(&mut self, id: SurfaceId, width: u32, height: u32) {
        if let Some(surface) = self.surfaces.get_mut(id) {
            surface.size = (width, height);
            surface.needs_recreate = true;
        }
    }

    fn begin_frame(&mut self, id: SurfaceId, surface: &mut dyn RenderSurface) -> Result<(), RenderError> {
        if self.frame.is_some() {
            return Err(VulkanError::InvalidOperation {
                reason: "begin_frame called while a frame is recording".to_string(),
            }
            .into());
        }
        if !self.surfaces.contains_key(id) {
            return Err(RenderError::UnknownSurface);
        }
        let size = surface.framebuffer_size();
        if size.0 == 0 || size.1 == 0 {
            return Err(RenderError::SurfaceUnavailable);
        }

        self.in_flight.wait()?;
        self.garbage.clear();
        self.descriptor_pool.reset()?;

        let (image_index, image_extent, format, framebuffer) = self.acquire(id, size)?;
        unsafe {
            let device = &self.device.device;
            device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;
            let begin_info =
                vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        self.frame_index += 1;
        self.frame = Some(FrameState {
            surface: id,
            image_index,
            extent: image_extent,
            format,
            framebuffer,
            swapchain_cleared: false,
            pass_open: false,
            bound_pipeline: None,
        });
        self.bind_frame_buffer_target(None);
        Ok(())
    }

    fn end_frame(&mut self, id: SurfaceId, _surface: &mut dyn RenderSurface) -> Result<(), RenderError> {
        let Some(frame) = self.frame.as_ref() else {
            return Err(VulkanError::InvalidOperation {
                reason: "end_frame called without begin_frame".to_string(),
            }
            .into());
        };
        if frame.surface != id {
            return Err(RenderError::UnknownSurface);
        }
        if !self.frame_buffer_stack.is_empty() {
            log::warn!("Frame ended with {} framebuffer(s) still pushed", self.frame_buffer_stack.len());
        }

        // The image reaches PRESENT_SRC only through a swapchain pass
        let needs_swapchain_pass = self.current_target.is_some() || !frame.swapchain_cleared;
        if needs_swapchain_pass {
            self.bind_frame_buffer_target(None);
            self.ensure_pass();
        }
        self.end_pass();

        let presented = self.submit_frame()?;
        if !presented {
            if let Some(surface) = self.surfaces.get_mut(id) {
                surface.needs_recreate = true;
            }
        }
        Ok(())
    }

    fn set_clear_color(&mut self, color: ColorRgba) {
        self.clear_color = color.premultiplied();
    }

    fn clear(&mut self, flags: ClearFlags) {
        if !self.ensure_pass() {
            return;
        }
        let c = self.clear_color;
        let has_depth = self.current_target.map_or(true, |handle| handle.has_depth);
        let mut attachments = Vec::with_capacity(2);
        if flags.contains(ClearFlags::COLOR) {
            attachments.push(vk::ClearAttachment {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                color_attachment: 0,
                clear_value: vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: [c.r * c.a, c.g * c.a, c.b * c.a, c.a],
                    },
                },
            });
        }
        if flags.contains(ClearFlags::DEPTH) && has_depth {
            attachments.push(vk::ClearAttachment {
                aspect_mask: vk::ImageAspectFlags::DEPTH,
                color_attachment: 0,
                clear_value: vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
                },
            });
        }
        if attachments.is_empty() {
            return;
        }
        let rect = vk::ClearRect {
            rect: vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: self.target_extent,
            },
            base_array_layer: 0,
            layer_count: 1,
        };
        unsafe {
            self.device
                .device
                .cmd_clear_attachments(self.command_buffer, &attachments, &[rect]);
        }
    }

    fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.viewport = vk::Viewport {
            x: x as f32,
            y: y as f32,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        if self.pass_open() {
            self.set_dynamic_state();
        }
    }

    fn set_scissor(&mut self, rect: Option<ScissorRect>) {
        self.scissor = rect;
        if self.pass_open() {
            self.set_dynamic_state();
        }
    }

    fn shader_defines_mut(&mut self) -> &mut ShaderDefines {
        &mut self.defines
    }

    fn create_texture(&mut self, desc: &TextureDescriptor, pixels: &[u8]) -> TextureHandle {
        if pixels.len() != desc.layer_size() || desc.width == 0 || desc.height == 0 {
            log::error!(
                "Texture data is {} bytes, expected {} for {}x{}",
                pixels.len(),
                desc.layer_size(),
                desc.width,
                desc.height
            );
            return TextureHandle::default();
        }
        match build_texture(
            &self.device.device,
            &self.physical_device,
            &self.command_pool,
            self.device.graphics_queue,
            desc,
            &[pixels],
        ) {
            Ok(texture) => TextureHandle::new(self.textures.insert(texture), TextureType::TwoDimensional),
            Err(e) => {
                log::error!("Failed to create texture: {e}");
                TextureHandle::default()
            }
        }
    }

    fn create_cube_map(&mut self, desc: &TextureDescriptor, faces: [&[u8]; 6]) -> TextureHandle {
        if faces.iter().any(|face| face.len() != desc.layer_size()) || desc.width == 0 {
            log::error!("Cube map faces must all be {}x{} RGBA8", desc.width, desc.height);
            return TextureHandle::default();
        }
        match build_texture(
            &self.device.device,
            &self.physical_device,
            &self.command_pool,
            self.device.graphics_queue,
            desc,
            &faces,
        ) {
            Ok(texture) => TextureHandle::new(self.textures.insert(texture), TextureType::CubeMap),
            Err(e) => {
                log::error!("Failed to create cube map: {e}");
                TextureHandle::default()
            }
        }
    }

    fn update_texture(&mut self, handle: TextureHandle, x: u32, y: u32, width: u32, height: u32, pixels: &[u8]) {
        assert_eq!(pixels.len(), width as usize * height as usize * 4, "Texture update size mismatch");
        let texture = self.textures.resolve(handle.key);
        let spec = texture.image.spec();
        assert!(x + width <= spec.width && y + height <= spec.height, "Texture update out of bounds");
        if let Err(e) = texture.image.upload_region(
            &self.command_pool,
            self.device.graphics_queue,
            &self.physical_device,
            (x, y),
            (width, height),
            pixels,
        ) {
            log::error!("Failed to update texture: {e}");
        }
    }

    fn use_texture(&mut self, handle: TextureHandle, unit: u32) {
        assert!(unit < TEXTURE_UNIT_COUNT, "Texture unit {unit} out of range");
        self.textures.resolve(handle.key);
        self.bound_textures[unit as usize] = Some(handle.key);
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        self.retire_texture(handle.key);
    }

    fn create_frame_buffer(&mut self, desc: &TextureDescriptor, has_depth: bool) -> FrameBufferHandle {
        if desc.width == 0 || desc.height == 0 {
            log::error!("Cannot create a {}x{} framebuffer", desc.width, desc.height);
            return FrameBufferHandle::default();
        }
        let raw = self.raw_device();
        let queue = self.device.graphics_queue;
        let built = (|| -> VulkanResult<(VkTexture, Option<Image>, Framebuffer)> {
            let image = Image::new(
                raw.clone(),
                &self.physical_device,
                ImageSpec::color_target(desc.width, desc.height),
            )?;
            image.initialize_layout(&self.command_pool, queue, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)?;
            let sampler = Sampler::new(raw.clone(), desc, 1)?;
            let depth = if has_depth {
                let depth = Image::new(
                    raw.clone(),
                    &self.physical_device,
                    ImageSpec::depth_target(desc.width, desc.height),
                )?;
                depth.initialize_layout(
                    &self.command_pool,
                    queue,
                    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                )?;
                Some(depth)
            } else {
                None
            };
            let mut views = vec![image.view()];
            views.extend(depth.as_ref().map(Image::view));
            let pass = if has_depth {
                &self.offscreen_depth_pass
            } else {
                &self.offscreen_pass
            };
            let framebuffer = Framebuffer::new(raw.clone(), pass.handle(), &views, extent(desc.width, desc.height))?;
            Ok((VkTexture { sampler, image }, depth, framebuffer))
        })();

        match built {
            Ok((texture, depth, framebuffer)) => {
                let color = TextureHandle::new(self.textures.insert(texture), TextureType::TwoDimensional);
                let key = self.frame_buffers.insert(VkFrameBuffer {
                    framebuffer,
                    depth,
                    color,
                });
                FrameBufferHandle::new(key, desc.width, desc.height, has_depth)
            }
            Err(e) => {
                log::error!("Failed to create framebuffer: {e}");
                FrameBufferHandle::default()
            }
        }
    }

    fn frame_buffer_texture(&self, handle: FrameBufferHandle) -> TextureHandle {
        self.frame_buffers.resolve(handle.key).color
    }

    fn destroy_frame_buffer(&mut self, handle: FrameBufferHandle) {
        if let Some(target) = self.frame_buffers.release(handle.key) {
            self.garbage.push(Garbage::FrameBuffer(target.framebuffer, target.depth));
            self.retire_texture(target.color.key);
        }
    }

    fn create_shader(&mut self, source: &ShaderSource) -> ShaderHandle {
        let ShaderSource::SpirV {
            vertex,
            fragment,
            uniforms,
        } = source
        else {
            log::error!("Vulkan backend only accepts SPIR-V sources");
            return ShaderHandle::default();
        };
        if !self.defines.is_empty() {
            log::debug!("Shader defines are not applied to precompiled SPIR-V");
        }
        match ShaderProgram::new(self.raw_device(), vertex, fragment, uniforms.clone()) {
            Ok(program) => ShaderHandle::new(self.shaders.insert(program)),
            Err(e) => {
                log::error!("Shader program failed to build: {e}");
                ShaderHandle::default()
            }
        }
    }

    fn use_shader(&mut self, handle: ShaderHandle) {
        self.shaders.resolve(handle.key);
        self.current_shader = Some(handle.key);
    }

    fn set_shader_uniform(&mut self, handle: ShaderHandle, name: &str, value: UniformValue) {
        let program = self.shaders.resolve_mut(handle.key);
        if !program.set_uniform(name, &value.to_bytes()) {
            log::debug!("Shader has no push-constant uniform named {name}");
        }
    }

    fn destroy_shader(&mut self, handle: ShaderHandle) {
        let Some(program) = self.shaders.release(handle.key) else {
            return;
        };
        if self.current_shader == Some(handle.key) {
            self.current_shader = None;
        }
        let stale: Vec<PipelineKey> = self
            .pipelines
            .keys()
            .filter(|key| key.shader == handle.key)
            .copied()
            .collect();
        for key in stale {
            if let Some(pipeline) = self.pipelines.remove(&key) {
                self.garbage.push(Garbage::Pipeline(pipeline));
            }
        }
        self.garbage.push(Garbage::Shader(program));
    }

    fn create_uniform_buffer(&mut self, size: usize, binding: u32) -> UniformBufferHandle {
        if binding >= UNIFORM_BINDING_COUNT {
            log::error!("Uniform binding {binding} out of range");
            return UniformBufferHandle::default();
        }
        match Buffer::new(
            self.raw_device(),
            &self.physical_device,
            size as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
        ) {
            Ok(buffer) => {
                let key = self.uniform_buffers.insert(VkUniformBuffer {
                    buffer,
                    contents: vec![0; size],
                    last_used_frame: 0,
                });
                self.bound_uniforms[binding as usize] = Some(key);
                UniformBufferHandle::new(key, binding, size)
            }
            Err(e) => {
                log::error!("Failed to create uniform buffer: {e}");
                UniformBufferHandle::default()
            }
        }
    }

    fn bind_uniform_buffer(&mut self, shader: ShaderHandle, buffer: UniformBufferHandle, block: &str) {
        self.shaders.resolve(shader.key);
        self.uniform_buffers.resolve(buffer.key);
        log::trace!("Uniform block {block} reads binding {}", buffer.binding);
        self.bound_uniforms[buffer.binding as usize] = Some(buffer.key);
    }

    fn update_uniform_buffer(&mut self, handle: UniformBufferHandle, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= handle.size, "Uniform buffer write out of bounds");
        let frame_index = self.frame_index;
        let recording = self.frame.is_some();
        let raw = self.raw_device();
        let uniform = self.uniform_buffers.resolve_mut(handle.key);
        uniform.contents[offset..offset + data.len()].copy_from_slice(data);

        // Draws recorded this frame must keep the contents they were recorded with
        if recording && uniform.last_used_frame == frame_index {
            match Buffer::with_data(
                raw,
                &self.physical_device,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                &uniform.contents,
            ) {
                Ok(buffer) => {
                    let old = std::mem::replace(&mut uniform.buffer, buffer);
                    uniform.last_used_frame = 0;
                    self.garbage.push(Garbage::Buffer(old));
                }
                Err(e) => log::error!("Failed to replace uniform buffer: {e}"),
            }
        } else if let Err(e) = uniform.buffer.write(offset as vk::DeviceSize, data) {
            log::error!("Failed to write uniform buffer: {e}");
        }
    }

    fn destroy_uniform_buffer(&mut self, handle: UniformBufferHandle) {
        if let Some(uniform) = self.uniform_buffers.release(handle.key) {
            for slot in &mut self.bound_uniforms {
                if *slot == Some(handle.key) {
                    *slot = None;
                }
            }
            self.garbage.push(Garbage::Buffer(uniform.buffer));
        }
    }

    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32], mode: MeshDrawMode) -> MeshHandle {
        let Ok(index_count) = u32::try_from(indices.len()) else {
            log::error!("Mesh has too many indices");
            return MeshHandle::default();
        };
        log::trace!("Creating {mode:?} mesh with {} vertices", vertices.len());
        let raw = self.raw_device();
        let buffers = Buffer::with_data(
            raw.clone(),
            &self.physical_device,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(vertices),
        )
        .and_then(|vertex_buffer| {
            Buffer::with_data(
                raw,
                &self.physical_device,
                vk::BufferUsageFlags::INDEX_BUFFER,
                bytemuck::cast_slice(indices),
            )
            .map(|index_buffer| (vertex_buffer, index_buffer))
        });
        match buffers {
            Ok((vertices, indices)) => MeshHandle::new(
                self.meshes.insert(VkMesh {
                    vertices,
                    indices,
                    last_used_frame: 0,
                }),
                index_count,
            ),
            Err(e) => {
                log::error!("Failed to create mesh buffers: {e}");
                MeshHandle::default()
            }
        }
    }

    fn update_mesh(&mut self, handle: &mut MeshHandle, vertices: &[Vertex], indices: &[u32], mode: MeshDrawMode) {
        assert!(handle.is_valid(), "Invalid mesh handle given to Vulkan renderer");
        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(indices);
        let in_use = self.frame.is_some() && self.meshes.resolve(handle.key).last_used_frame == self.frame_index;
        let mesh = self.meshes.resolve(handle.key);
        let fits = vertex_bytes.len() as vk::DeviceSize <= mesh.vertices.size()
            && index_bytes.len() as vk::DeviceSize <= mesh.indices.size();

        if fits && !in_use {
            let written = mesh
                .vertices
                .write(0, vertex_bytes)
                .and_then(|()| mesh.indices.write(0, index_bytes));
            if let Err(e) = written {
                log::error!("Failed to update mesh: {e}");
                return;
            }
        } else {
            let replacement = self.create_mesh(vertices, indices, mode);
            if !replacement.is_valid() {
                return;
            }
            let Some(fresh) = self.meshes.release(replacement.key) else {
                return;
            };
            let mesh = self.meshes.resolve_mut(handle.key);
            let old_vertices = std::mem::replace(&mut mesh.vertices, fresh.vertices);
            let old_indices = std::mem::replace(&mut mesh.indices, fresh.indices);
            mesh.last_used_frame = 0;
            self.garbage.push(Garbage::Buffer(old_vertices));
            self.garbage.push(Garbage::Buffer(old_indices));
        }
        handle.index_count = u32::try_from(indices.len()).unwrap_or(u32::MAX);
    }

    fn submit_mesh(&mut self, handle: MeshHandle, depth: MeshDepthFunction, cull: MeshCullType) {
        self.meshes.resolve(handle.key);
        if handle.index_count == 0 || !self.ensure_pass() {
            return;
        }
        let Some(shader) = self.current_shader else {
            log::warn!("Mesh drawn without a shader in use");
            return;
        };
        let Some(frame_format) = self.frame.as_ref().map(|frame| frame.format) else {
            return;
        };

        let target = match self.current_target {
            None => PipelineTarget::Surface(frame_format),
            Some(handle) => PipelineTarget::Offscreen {
                has_depth: handle.has_depth,
            },
        };
        let cull = if self.states.top(RenderMode::CullFace) {
            cull
        } else {
            MeshCullType::None
        };
        let key = PipelineKey::new(
            shader,
            target,
            self.states.top(RenderMode::DepthTest),
            depth,
            cull,
            self.states.top(RenderMode::Blend),
        );
        let Some(pipeline) = self.pipeline_for(key) else {
            return;
        };
        let program = self.shaders.resolve(shader);
        let (set_layout, layout) = (program.set_layout(), program.layout());
        let Some(set) = self.write_descriptor_set(set_layout) else {
            return;
        };

        let frame_index = self.frame_index;
        let mesh = self.meshes.resolve_mut(handle.key);
        mesh.last_used_frame = frame_index;
        let (vertex_buffer, index_buffer) = (mesh.vertices.handle(), mesh.indices.handle());

        let device = &self.device.device;
        let command_buffer = self.command_buffer;
        let program = self.shaders.resolve(shader);
        unsafe {
            if self.frame.as_ref().and_then(|frame| frame.bound_pipeline) != Some(pipeline) {
                device.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
            }
            device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            );
            if !program.push_constants().is_empty() {
                device.cmd_push_constants(
                    command_buffer,
                    layout,
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                    0,
                    program.push_constants(),
                );
            }
            device.cmd_bind_vertex_buffers(command_buffer, 0, &[vertex_buffer], &[0]);
            device.cmd_bind_index_buffer(command_buffer, index_buffer, 0, vk::IndexType::UINT32);
            device.cmd_draw_indexed(command_buffer, handle.index_count, 1, 0, 0, 0);
        }
        if let Some(frame) = self.frame.as_mut() {
            frame.bound_pipeline = Some(pipeline);
        }
    }

    fn destroy_mesh(&mut self, handle: MeshHandle) {
        if let Some(mesh) = self.meshes.release(handle.key) {
            self.garbage.push(Garbage::Buffer(mesh.vertices));
            self.garbage.push(Garbage::Buffer(mesh.indices));
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        self.device.wait_idle();
        self.garbage.clear();
        self.pipelines.clear();
        let live = self.textures.len() + self.frame_buffers.len() + self.shaders.len() + self.meshes.len();
        if live > 0 {
            log::debug!("Releasing {live} Vulkan resource(s) still alive at shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scissor_defaults_to_target() {
        let rect = scissor_rect(None, extent(800, 600));
        assert_eq!((rect.offset.x, rect.offset.y), (0, 0));
        assert_eq!((rect.extent.width, rect.extent.height), (800, 600));
    }

    #[test]
    fn test_scissor_is_clipped_to_target() {
        let rect = scissor_rect(
            Some(ScissorRect {
                x: -10,
                y: 590,
                width: 30,
                height: 40,
            }),
            extent(800, 600),
        );
        assert_eq!((rect.offset.x, rect.offset.y), (0, 590));
        assert_eq!((rect.extent.width, rect.extent.height), (20, 10));
    }

    #[test]
    fn test_scissor_outside_target_is_empty() {
        let rect = scissor_rect(
            Some(ScissorRect {
                x: 900,
                y: 0,
                width: 10,
                height: 10,
            }),
            extent(800, 600),
        );
        assert_eq!(rect.extent.width, 0);
    }
}

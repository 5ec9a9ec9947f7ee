//! Shader programs and the graphics pipelines built from them
//!
//! Fixed-function state that OpenGL toggles at draw time is baked into Vulkan
//! pipelines, so pipelines are cached per [`PipelineKey`].

use std::ffi::CStr;

use ash::{vk, Device};

use super::{VulkanError, VulkanResult};
use crate::render::types::{MeshCullType, MeshDepthFunction, UniformField, TEXTURE_UNIT_COUNT, UNIFORM_BINDING_COUNT};
use crate::render::{handle::ShaderKey, Vertex};

/// Largest push-constant block every device supports
pub const MAX_PUSH_CONSTANT_SIZE: u32 = 128;

/// Descriptor binding of texture unit 0
pub const SAMPLER_BINDING_BASE: u32 = UNIFORM_BINDING_COUNT;

const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// Size of the push-constant block described by `uniforms`, rounded to 4 bytes
pub fn push_constant_size(uniforms: &[UniformField]) -> u32 {
    let end = uniforms.iter().map(|field| field.offset + field.size).max().unwrap_or(0);
    end.div_ceil(4) * 4
}

/// Compiled modules, descriptor layout and push-constant storage of one program
pub struct ShaderProgram {
    device: Device,
    vertex: vk::ShaderModule,
    fragment: vk::ShaderModule,
    set_layout: vk::DescriptorSetLayout,
    layout: vk::PipelineLayout,
    uniforms: Vec<UniformField>,
    push_constants: Vec<u8>,
}

impl ShaderProgram {
    /// Create modules from SPIR-V words and a layout with UBO and sampler bindings
    pub fn new(device: Device, vertex: &[u32], fragment: &[u32], uniforms: Vec<UniformField>) -> VulkanResult<Self> {
        let push_size = push_constant_size(&uniforms);
        if push_size > MAX_PUSH_CONSTANT_SIZE {
            return Err(VulkanError::InvalidOperation {
                reason: format!("push constants need {push_size} bytes, limit is {MAX_PUSH_CONSTANT_SIZE}"),
            });
        }

        let mut program = Self {
            device,
            vertex: vk::ShaderModule::null(),
            fragment: vk::ShaderModule::null(),
            set_layout: vk::DescriptorSetLayout::null(),
            layout: vk::PipelineLayout::null(),
            uniforms,
            push_constants: vec![0; push_size as usize],
        };
        program.vertex = program.create_module(vertex)?;
        program.fragment = program.create_module(fragment)?;

        let stages = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = (0..UNIFORM_BINDING_COUNT)
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(stages)
                    .build()
            })
            .chain((0..TEXTURE_UNIT_COUNT).map(|unit| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(SAMPLER_BINDING_BASE + unit)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::FRAGMENT)
                    .build()
            }))
            .collect();
        let set_layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        program.set_layout = unsafe {
            program
                .device
                .create_descriptor_set_layout(&set_layout_info, None)
                .map_err(VulkanError::Api)?
        };

        let set_layouts = [program.set_layout];
        let push_ranges = [vk::PushConstantRange {
            stage_flags: stages,
            offset: 0,
            size: push_size,
        }];
        let mut layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        if push_size > 0 {
            layout_info = layout_info.push_constant_ranges(&push_ranges);
        }
        program.layout = unsafe {
            program
                .device
                .create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(program)
    }

    fn create_module(&self, code: &[u32]) -> VulkanResult<vk::ShaderModule> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
        unsafe {
            self.device
                .create_shader_module(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    /// Store a named uniform's bytes in the push-constant block; false if the name is unknown
    pub fn set_uniform(&mut self, name: &str, bytes: &[u8]) -> bool {
        let Some(field) = self.uniforms.iter().find(|field| field.name == name) else {
            return false;
        };
        let start = field.offset as usize;
        let len = bytes.len().min(field.size as usize);
        self.push_constants[start..start + len].copy_from_slice(&bytes[..len]);
        true
    }

    /// Current push-constant bytes
    pub fn push_constants(&self) -> &[u8] {
        &self.push_constants
    }

    /// Descriptor set layout of the program
    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout
    }

    /// Pipeline layout of the program
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.layout, None);
            self.device.destroy_descriptor_set_layout(self.set_layout, None);
            self.device.destroy_shader_module(self.vertex, None);
            self.device.destroy_shader_module(self.fragment, None);
        }
    }
}

/// Kind of attachment set a pipeline renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineTarget {
    /// Swapchain image of a format, always with depth
    Surface(vk::Format),
    /// Offscreen RGBA8 target
    Offscreen {
        /// Whether the target has a depth attachment
        has_depth: bool,
    },
}

impl PipelineTarget {
    const fn has_depth(self) -> bool {
        match self {
            Self::Surface(_) => true,
            Self::Offscreen { has_depth } => has_depth,
        }
    }
}

/// Everything a cached pipeline was specialized for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    /// Program
    pub shader: ShaderKey,
    /// Attachment set
    pub target: PipelineTarget,
    /// Depth test and write enabled
    pub depth_test: bool,
    /// Depth comparison
    pub depth_function: MeshDepthFunction,
    /// Face culling, `None` when culling is disabled
    pub cull: MeshCullType,
    /// Premultiplied alpha blending enabled
    pub blend: bool,
}

impl PipelineKey {
    /// Key with depth testing dropped for targets without depth
    pub fn new(
        shader: ShaderKey,
        target: PipelineTarget,
        depth_test: bool,
        depth_function: MeshDepthFunction,
        cull: MeshCullType,
        blend: bool,
    ) -> Self {
        Self {
            shader,
            target,
            depth_test: depth_test && target.has_depth(),
            depth_function,
            cull,
            blend,
        }
    }
}

const fn compare_op(func: MeshDepthFunction) -> vk::CompareOp {
    match func {
        MeshDepthFunction::Never => vk::CompareOp::NEVER,
        MeshDepthFunction::Always => vk::CompareOp::ALWAYS,
        MeshDepthFunction::Equal => vk::CompareOp::EQUAL,
        MeshDepthFunction::NotEqual => vk::CompareOp::NOT_EQUAL,
        MeshDepthFunction::Less => vk::CompareOp::LESS,
        MeshDepthFunction::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        MeshDepthFunction::Greater => vk::CompareOp::GREATER,
        MeshDepthFunction::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
    }
}

const fn cull_mode(cull: MeshCullType) -> vk::CullModeFlags {
    match cull {
        MeshCullType::Back => vk::CullModeFlags::BACK,
        MeshCullType::Front => vk::CullModeFlags::FRONT,
        MeshCullType::None => vk::CullModeFlags::NONE,
    }
}

/// Graphics pipeline with RAII cleanup
pub struct Pipeline {
    device: Device,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    /// Build the pipeline `key` describes for `program`, compatible with `render_pass`
    pub fn new(device: Device, program: &ShaderProgram, render_pass: vk::RenderPass, key: &PipelineKey) -> VulkanResult<Self> {
        let stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(program.vertex)
                .name(ENTRY_POINT)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(program.fragment)
                .name(ENTRY_POINT)
                .build(),
        ];

        let bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: Vertex::STRIDE as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let formats = [
            vk::Format::R32G32B32_SFLOAT,
            vk::Format::R32G32B32_SFLOAT,
            vk::Format::R32G32B32A32_SFLOAT,
            vk::Format::R32G32_SFLOAT,
        ];
        let attributes: Vec<vk::VertexInputAttributeDescription> = (0u32..)
            .zip(formats.into_iter().zip(Vertex::OFFSETS))
            .map(|(location, (format, offset))| vk::VertexInputAttributeDescription {
                location,
                binding: 0,
                format,
                offset: offset as u32,
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly =
            vk::PipelineInputAssemblyStateCreateInfo::builder().topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(cull_mode(key.cull))
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);
        let multisample =
            vk::PipelineMultisampleStateCreateInfo::builder().rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(key.depth_test)
            .depth_write_enable(key.depth_test)
            .depth_compare_op(compare_op(key.depth_function));

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .blend_enable(key.blend)
            .src_color_blend_factor(vk::BlendFactor::ONE)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .build()];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder().attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(program.layout)
            .render_pass(render_pass)
            .subpass(0)
            .build();

        let pipeline = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, e)| VulkanError::Api(e))?
        }
        .into_iter()
        .next()
        .ok_or(VulkanError::InvalidOperation {
            reason: "driver returned no pipeline".to_string(),
        })?;
        Ok(Self { device, pipeline })
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    #[test]
    fn test_push_constant_size_rounds_up() {
        let fields = vec![UniformField::new("u_model", 0, 64), UniformField::new("u_flag", 64, 2)];
        assert_eq!(push_constant_size(&fields), 68);
        assert_eq!(push_constant_size(&[]), 0);
    }

    #[test]
    fn test_depth_test_dropped_without_depth_attachment() {
        let shader = ShaderKey::from(KeyData::from_ffi(1));
        let key = PipelineKey::new(
            shader,
            PipelineTarget::Offscreen { has_depth: false },
            true,
            MeshDepthFunction::Less,
            MeshCullType::Back,
            false,
        );
        assert!(!key.depth_test);
        let key = PipelineKey::new(
            shader,
            PipelineTarget::Surface(vk::Format::B8G8R8A8_UNORM),
            true,
            MeshDepthFunction::Less,
            MeshCullType::Back,
            false,
        );
        assert!(key.depth_test);
    }
}

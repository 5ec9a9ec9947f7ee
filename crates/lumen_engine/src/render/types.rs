//! Plain value types shared by every render backend

use bitflags::bitflags;

/// Device state toggled through the render-mode stacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderMode {
    /// Back-face culling
    CullFace,
    /// Depth testing and depth writes
    DepthTest,
    /// Seamless filtering across cube map faces
    TextureCubeMapSeamless,
    /// Source-alpha blending
    Blend,
}

impl RenderMode {
    /// Every mode, in the order their base state is applied
    pub const ALL: [Self; 4] = [
        Self::CullFace,
        Self::DepthTest,
        Self::TextureCubeMapSeamless,
        Self::Blend,
    ];

    /// Value at the bottom of the mode's stack
    pub const fn base_value(self) -> bool {
        !matches!(self, Self::Blend)
    }
}

/// Upload frequency hint for mesh buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MeshDrawMode {
    /// Uploaded once, drawn many times
    #[default]
    Static,
    /// Re-uploaded frequently
    Dynamic,
}

/// Depth comparison used for a mesh draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MeshDepthFunction {
    /// Never passes
    Never,
    /// Always passes
    Always,
    /// Passes when equal
    Equal,
    /// Passes when not equal
    NotEqual,
    /// Passes when closer
    #[default]
    Less,
    /// Passes when closer or equal
    LessEqual,
    /// Passes when farther
    Greater,
    /// Passes when farther or equal
    GreaterEqual,
}

/// Which faces a mesh draw culls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MeshCullType {
    /// Cull back faces
    #[default]
    Back,
    /// Cull front faces
    Front,
    /// Draw both sides
    None,
}

/// Dimensionality of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureType {
    /// Ordinary 2D texture
    #[default]
    TwoDimensional,
    /// Six-faced cube map
    CubeMap,
}

/// Texture coordinate wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    /// Tile
    #[default]
    Repeat,
    /// Tile, mirroring every other repetition
    MirroredRepeat,
    /// Clamp to the edge texel
    ClampToEdge,
    /// Clamp to the border color
    ClampToBorder,
}

/// Texture sampling filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    /// Nearest texel
    Nearest,
    /// Bilinear
    #[default]
    Linear,
}

/// Number of texture units every backend exposes
pub const TEXTURE_UNIT_COUNT: u32 = 4;

/// Number of uniform buffer binding points every backend exposes
pub const UNIFORM_BINDING_COUNT: u32 = 2;

/// Sampling parameters for a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Horizontal wrapping
    pub wrap_s: WrapMode,
    /// Vertical wrapping
    pub wrap_t: WrapMode,
    /// Depth wrapping, cube maps only
    pub wrap_r: WrapMode,
    /// Minification and magnification filter
    pub filter: FilterMode,
    /// Generate a full mip chain
    pub mipmaps: bool,
}

impl TextureDescriptor {
    /// Descriptor with default sampling for a `width` x `height` texture
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            wrap_s: WrapMode::Repeat,
            wrap_t: WrapMode::Repeat,
            wrap_r: WrapMode::Repeat,
            filter: FilterMode::Linear,
            mipmaps: false,
        }
    }

    /// Clamp every axis to the edge
    #[must_use]
    pub const fn clamped(mut self) -> Self {
        self.wrap_s = WrapMode::ClampToEdge;
        self.wrap_t = WrapMode::ClampToEdge;
        self.wrap_r = WrapMode::ClampToEdge;
        self
    }

    /// Use the given filter
    #[must_use]
    pub const fn with_filter(mut self, filter: FilterMode) -> Self {
        self.filter = filter;
        self
    }

    /// Request a mip chain
    #[must_use]
    pub const fn with_mipmaps(mut self) -> Self {
        self.mipmaps = true;
        self
    }

    /// Size in bytes of one RGBA8 layer
    pub const fn layer_size(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Pixel rectangle in window coordinates, origin top-left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScissorRect {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

bitflags! {
    /// Buffers affected by a clear
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u8 {
        /// Color attachment
        const COLOR = 1 << 0;
        /// Depth attachment
        const DEPTH = 1 << 1;
        /// Stencil attachment
        const STENCIL = 1 << 2;
    }
}

/// What a backend reported about its device at startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Human readable backend name
    pub backend: String,
    /// Device or renderer name
    pub device_name: String,
    /// Driver or API version string
    pub version: String,
    /// Largest supported 2D texture dimension
    pub max_texture_size: u32,
    /// Number of texture units the backend exposes
    pub texture_units: u32,
    /// Whether native debug output is active
    pub debug_output: bool,
}

impl std::fmt::Display for DeviceCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} on {} ({}), max texture {}, {} texture units, debug output {}",
            self.backend,
            self.device_name,
            self.version,
            self.max_texture_size,
            self.texture_units,
            if self.debug_output { "on" } else { "off" }
        )
    }
}

/// Typed value for a named shader uniform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    /// Boolean, uploaded as an int
    Bool(bool),
    /// Signed integer
    Int(i32),
    /// Unsigned integer
    UInt(u32),
    /// Float
    Float(f32),
    /// Two floats
    Vec2([f32; 2]),
    /// Three floats
    Vec3([f32; 3]),
    /// Four floats
    Vec4([f32; 4]),
    /// Column-major 4x4 matrix
    Mat4([f32; 16]),
}

impl UniformValue {
    /// Size of the value's std430 representation in bytes
    pub const fn size(&self) -> usize {
        match self {
            Self::Bool(_) | Self::Int(_) | Self::UInt(_) | Self::Float(_) => 4,
            Self::Vec2(_) => 8,
            Self::Vec3(_) => 12,
            Self::Vec4(_) => 16,
            Self::Mat4(_) => 64,
        }
    }

    /// Native-endian bytes of the value
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Bool(v) => i32::from(*v).to_ne_bytes().to_vec(),
            Self::Int(v) => v.to_ne_bytes().to_vec(),
            Self::UInt(v) => v.to_ne_bytes().to_vec(),
            Self::Float(v) => v.to_ne_bytes().to_vec(),
            Self::Vec2(v) => bytemuck::cast_slice(v).to_vec(),
            Self::Vec3(v) => bytemuck::cast_slice(v).to_vec(),
            Self::Vec4(v) => bytemuck::cast_slice(v).to_vec(),
            Self::Mat4(v) => bytemuck::cast_slice(v).to_vec(),
        }
    }
}

impl From<nalgebra::Matrix4<f32>> for UniformValue {
    fn from(value: nalgebra::Matrix4<f32>) -> Self {
        let mut data = [0.0; 16];
        data.copy_from_slice(value.as_slice());
        Self::Mat4(data)
    }
}

/// One named member of a shader's push-constant block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformField {
    /// Uniform name as written in the shader
    pub name: String,
    /// Byte offset inside the block
    pub offset: u32,
    /// Byte size
    pub size: u32,
}

impl UniformField {
    /// Field at `offset` spanning `size` bytes
    pub fn new(name: impl Into<String>, offset: u32, size: u32) -> Self {
        Self {
            name: name.into(),
            offset,
            size,
        }
    }
}

/// Shader program sources in one of the forms backends accept
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderSource {
    /// GLSL text for the OpenGL backend
    Glsl {
        /// Vertex stage
        vertex: String,
        /// Fragment stage
        fragment: String,
    },
    /// SPIR-V words for the Vulkan backend
    SpirV {
        /// Vertex stage
        vertex: Vec<u32>,
        /// Fragment stage
        fragment: Vec<u32>,
        /// Layout of the shared push-constant block
        uniforms: Vec<UniformField>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_blend_starts_disabled() {
        for mode in RenderMode::ALL {
            assert_eq!(mode.base_value(), mode != RenderMode::Blend);
        }
    }

    #[test]
    fn test_uniform_bytes_match_size() {
        let values = [
            UniformValue::Bool(true),
            UniformValue::Vec3([1.0, 2.0, 3.0]),
            UniformValue::from(nalgebra::Matrix4::identity()),
        ];
        for value in values {
            assert_eq!(value.to_bytes().len(), value.size());
        }
        assert_eq!(UniformValue::Bool(true).to_bytes(), 1i32.to_ne_bytes());
    }

    #[test]
    fn test_layer_size_is_rgba8() {
        assert_eq!(TextureDescriptor::new(4, 2).layer_size(), 32);
    }
}

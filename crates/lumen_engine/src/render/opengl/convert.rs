//! Engine enums to GL constants

use crate::render::types::{
    ClearFlags, FilterMode, MeshCullType, MeshDepthFunction, MeshDrawMode, RenderMode, WrapMode,
};

pub const fn capability(mode: RenderMode) -> u32 {
    match mode {
        RenderMode::CullFace => glow::CULL_FACE,
        RenderMode::DepthTest => glow::DEPTH_TEST,
        RenderMode::TextureCubeMapSeamless => glow::TEXTURE_CUBE_MAP_SEAMLESS,
        RenderMode::Blend => glow::BLEND,
    }
}

pub const fn depth_function(func: MeshDepthFunction) -> u32 {
    match func {
        MeshDepthFunction::Never => glow::NEVER,
        MeshDepthFunction::Always => glow::ALWAYS,
        MeshDepthFunction::Equal => glow::EQUAL,
        MeshDepthFunction::NotEqual => glow::NOTEQUAL,
        MeshDepthFunction::Less => glow::LESS,
        MeshDepthFunction::LessEqual => glow::LEQUAL,
        MeshDepthFunction::Greater => glow::GREATER,
        MeshDepthFunction::GreaterEqual => glow::GEQUAL,
    }
}

/// Face to cull, `None` when culling is off for the draw
pub const fn cull_face(cull: MeshCullType) -> Option<u32> {
    match cull {
        MeshCullType::Back => Some(glow::BACK),
        MeshCullType::Front => Some(glow::FRONT),
        MeshCullType::None => None,
    }
}

pub const fn buffer_usage(mode: MeshDrawMode) -> u32 {
    match mode {
        MeshDrawMode::Static => glow::STATIC_DRAW,
        MeshDrawMode::Dynamic => glow::DYNAMIC_DRAW,
    }
}

pub const fn wrap(mode: WrapMode) -> i32 {
    (match mode {
        WrapMode::Repeat => glow::REPEAT,
        WrapMode::MirroredRepeat => glow::MIRRORED_REPEAT,
        WrapMode::ClampToEdge => glow::CLAMP_TO_EDGE,
        WrapMode::ClampToBorder => glow::CLAMP_TO_BORDER,
    }) as i32
}

/// (min, mag) filters
pub const fn filters(filter: FilterMode, mipmaps: bool) -> (i32, i32) {
    let (min, mag) = match (filter, mipmaps) {
        (FilterMode::Nearest, false) => (glow::NEAREST, glow::NEAREST),
        (FilterMode::Nearest, true) => (glow::NEAREST_MIPMAP_NEAREST, glow::NEAREST),
        (FilterMode::Linear, false) => (glow::LINEAR, glow::LINEAR),
        (FilterMode::Linear, true) => (glow::LINEAR_MIPMAP_LINEAR, glow::LINEAR),
    };
    (min as i32, mag as i32)
}

pub fn clear_mask(flags: ClearFlags) -> u32 {
    let mut mask = 0;
    if flags.contains(ClearFlags::COLOR) {
        mask |= glow::COLOR_BUFFER_BIT;
    }
    if flags.contains(ClearFlags::DEPTH) {
        mask |= glow::DEPTH_BUFFER_BIT;
    }
    if flags.contains(ClearFlags::STENCIL) {
        mask |= glow::STENCIL_BUFFER_BIT;
    }
    mask
}

/// Flip a top-left origin rectangle's y into GL's bottom-left origin
pub fn flip_y(target_height: u32, y: i32, height: u32) -> i32 {
    i32::try_from(target_height).unwrap_or(i32::MAX) - y - i32::try_from(height).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mipmapped_min_filter() {
        assert_eq!(
            filters(FilterMode::Linear, true),
            (glow::LINEAR_MIPMAP_LINEAR as i32, glow::LINEAR as i32)
        );
    }

    #[test]
    fn test_clear_mask_combines_bits() {
        assert_eq!(
            clear_mask(ClearFlags::COLOR | ClearFlags::DEPTH),
            glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT
        );
        assert_eq!(clear_mask(ClearFlags::empty()), 0);
    }

    #[test]
    fn test_flip_y() {
        assert_eq!(flip_y(600, 0, 600), 0);
        assert_eq!(flip_y(600, 10, 100), 490);
    }

    #[test]
    fn test_no_cull_has_no_face() {
        assert_eq!(cull_face(MeshCullType::None), None);
        assert_eq!(cull_face(MeshCullType::Front), Some(glow::FRONT));
    }
}

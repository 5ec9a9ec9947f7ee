//! Layout of the per-frame projection/view uniform block

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::Mat4;

/// Name of the block in shader sources
pub const UBO_PV_NAME: &str = "UboPV";

/// Binding point the block is attached to
pub const UBO_PV_BINDING: u32 = 0;

/// Camera matrices shared by every shader for one frame
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UboPv {
    /// Column-major projection matrix
    pub projection: [f32; 16],
    /// Column-major view matrix
    pub view: [f32; 16],
}

impl Default for UboPv {
    fn default() -> Self {
        Self::new(&Mat4::identity(), &Mat4::identity())
    }
}

impl UboPv {
    /// Size of the block in bytes
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Pack the two matrices
    pub fn new(projection: &Mat4, view: &Mat4) -> Self {
        let mut ubo = Self::zeroed();
        ubo.projection.copy_from_slice(projection.as_slice());
        ubo.view.copy_from_slice(view.as_slice());
        ubo
    }

    /// Raw bytes for upload
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_is_two_matrices() {
        assert_eq!(UboPv::SIZE, 128);
        assert_eq!(UboPv::default().as_bytes().len(), 128);
    }

    #[test]
    fn test_matrices_are_column_major() {
        let mut projection = Mat4::identity();
        projection[(0, 3)] = 5.0;
        let ubo = UboPv::new(&projection, &Mat4::identity());
        assert_eq!(ubo.projection[12], 5.0);
    }
}

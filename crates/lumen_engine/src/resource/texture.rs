//! Decoded image resources

use super::{Resource, ResourceError};

/// Image decoded to tightly packed RGBA8 pixels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextureResource {
    /// Raw RGBA pixel data, row-major from the top-left corner
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl TextureResource {
    /// Decode an encoded image (PNG) held in memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ResourceError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| ResourceError::Decode(format!("Failed to load image from bytes: {e}")))?;

        let rgba_img = img.to_rgba8();
        let (width, height) = rgba_img.dimensions();

        log::debug!("Loaded image {width}x{height} from memory");

        Ok(Self {
            data: rgba_img.into_raw(),
            width,
            height,
        })
    }

    /// Create a solid color image
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixel_count = width as usize * height as usize;
        Self {
            data: color.repeat(pixel_count),
            width,
            height,
        }
    }

    /// Whether decoding produced any pixels
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() || self.width == 0 || self.height == 0
    }
}

impl Resource for TextureResource {
    fn compile(&mut self, bytes: Vec<u8>) -> Result<(), ResourceError> {
        *self = Self::from_bytes(&bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_png(width: u32, height: u32, pixel: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba(pixel));
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_png_decodes_to_rgba() {
        let mut texture = TextureResource::default();
        texture.compile(encode_png(3, 2, [10, 20, 30, 40])).unwrap();
        assert_eq!((texture.width, texture.height), (3, 2));
        assert_eq!(texture.data.len(), 3 * 2 * 4);
        assert_eq!(&texture.data[..4], &[10, 20, 30, 40]);
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        let mut texture = TextureResource::default();
        assert!(matches!(texture.compile(vec![1, 2, 3]), Err(ResourceError::Decode(_))));
        assert!(texture.is_empty());
    }

    #[test]
    fn test_solid_color_fills_every_pixel() {
        let texture = TextureResource::solid_color(2, 2, [1, 2, 3, 4]);
        assert_eq!(texture.data, [1, 2, 3, 4].repeat(4));
    }
}

use std::sync::OnceLock;

use image::{GrayImage, Luma, RgbImage};
use imageproc::definitions::Image;
use tracing::debug;

use crate::error::DecodeError;

/// Sobel gradient magnitude per pixel.
pub type EdgeMap = Image<Luma<u16>>;

/// Read-only pixel grid for one request.
///
/// Grayscale and edge grids are derived on first use and cached inside the
/// field, so analyzers sharing one field through an `Arc` compute them once.
pub struct ImageField {
    rgb: RgbImage,
    gray: OnceLock<GrayImage>,
    edges: OnceLock<EdgeMap>,
}

impl ImageField {
    /// Decode raw image bytes (PNG, JPEG, GIF, BMP, WebP...).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let image = image::load_from_memory(bytes)?;
        debug!(
            "Decoded {}x{} image ({:?}) from {} bytes",
            image.width(),
            image.height(),
            image.color(),
            bytes.len()
        );
        Self::from_rgb(image.to_rgb8())
    }

    pub fn from_rgb(rgb: RgbImage) -> Result<Self, DecodeError> {
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(DecodeError::EmptyImage(width, height));
        }

        Ok(Self {
            rgb,
            gray: OnceLock::new(),
            edges: OnceLock::new(),
        })
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.rgb.dimensions()
    }

    pub fn rgb(&self) -> &RgbImage {
        &self.rgb
    }

    /// Rec. 709 luminance.
    pub fn gray(&self) -> &GrayImage {
        self.gray
            .get_or_init(|| image::imageops::grayscale(&self.rgb))
    }

    pub fn edge_magnitude(&self) -> &EdgeMap {
        self.edges
            .get_or_init(|| imageproc::gradients::sobel_gradients(self.gray()))
    }

    /// Mean RGB over the whole image.
    pub fn mean_color(&self) -> [f64; 3] {
        let mut sums = [0f64; 3];
        for pixel in self.rgb.pixels() {
            for (sum, channel) in sums.iter_mut().zip(pixel.0) {
                *sum += channel as f64;
            }
        }

        let count = (self.width() as f64) * (self.height() as f64);
        sums.map(|s| s / count)
    }

    /// Sum of edge magnitudes down each column.
    pub fn edge_column_profile(&self) -> Vec<f64> {
        let edges = self.edge_magnitude();
        let mut profile = vec![0f64; self.width() as usize];
        for (x, _, pixel) in edges.enumerate_pixels() {
            profile[x as usize] += pixel.0[0] as f64;
        }
        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::fixtures;
    use image::Rgb;

    #[test]
    fn test_rejects_non_image_bytes() {
        let result = ImageField::from_bytes(b"definitely not a png");
        assert!(matches!(result, Err(DecodeError::Image(_))));
    }

    #[test]
    fn test_rejects_empty_image() {
        let result = ImageField::from_rgb(RgbImage::new(0, 10));
        assert!(matches!(result, Err(DecodeError::EmptyImage(0, 10))));
    }

    #[test]
    fn test_decodes_png_bytes() {
        let bytes = fixtures::encode_png(&fixtures::striped_background(120, 60));
        let field = ImageField::from_bytes(&bytes).unwrap();
        assert_eq!(field.dimensions(), (120, 60));
        assert_eq!(field.gray().dimensions(), (120, 60));
        assert_eq!(field.edge_magnitude().dimensions(), (120, 60));
    }

    #[test]
    fn test_mean_color_of_uniform_image() {
        let field =
            ImageField::from_rgb(RgbImage::from_pixel(8, 4, Rgb([10, 20, 30]))).unwrap();
        assert_eq!(field.mean_color(), [10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_uniform_image_has_no_edges() {
        let field =
            ImageField::from_rgb(RgbImage::from_pixel(16, 16, Rgb([90, 90, 90]))).unwrap();
        assert!(field.edge_column_profile().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_edge_profile_peaks_at_vertical_boundary() {
        let mut rgb = RgbImage::from_pixel(20, 10, Rgb([0, 0, 0]));
        for y in 0..10 {
            for x in 10..20 {
                rgb.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let field = ImageField::from_rgb(rgb).unwrap();
        let profile = field.edge_column_profile();
        assert!(profile[9] > 0.0 && profile[10] > 0.0);
        assert_eq!(profile[2], 0.0);
        assert_eq!(profile[17], 0.0);
    }
}

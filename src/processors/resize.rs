//! Resizing and cropping for classification inputs.

use crate::core::{ClassifierError, ClassifierResult};
use image::{imageops::FilterType, DynamicImage, GenericImageView};

/// Resizes an image so its shorter side matches a target length,
/// preserving the aspect ratio.
#[derive(Debug, Clone)]
pub struct ResizeShort {
    target: u32,
    filter: FilterType,
}

impl ResizeShort {
    /// # Errors
    ///
    /// Returns `ClassifierError::Config` if `target` is zero.
    pub fn new(target: u32, filter: FilterType) -> ClassifierResult<Self> {
        if target == 0 {
            return Err(ClassifierError::config(
                "resize target must be greater than 0",
            ));
        }
        Ok(Self { target, filter })
    }

    pub fn apply(&self, img: &DynamicImage) -> ClassifierResult<DynamicImage> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(ClassifierError::invalid_input(format!(
                "cannot resize an empty image ({width}x{height})"
            )));
        }

        let scale = self.target as f32 / width.min(height) as f32;
        let new_width = ((width as f32 * scale).round() as u32).max(1);
        let new_height = ((height as f32 * scale).round() as u32).max(1);
        Ok(img.resize_exact(new_width, new_height, self.filter))
    }
}

/// Crops a square region from the center of an image.
#[derive(Debug, Clone, Copy)]
pub struct CenterCrop {
    size: u32,
}

impl CenterCrop {
    /// # Errors
    ///
    /// Returns `ClassifierError::Config` if `size` is zero.
    pub fn new(size: u32) -> ClassifierResult<Self> {
        if size == 0 {
            return Err(ClassifierError::config("crop size must be greater than 0"));
        }
        Ok(Self { size })
    }

    pub fn apply(&self, img: &DynamicImage) -> ClassifierResult<DynamicImage> {
        let (width, height) = img.dimensions();
        if width < self.size || height < self.size {
            return Err(ClassifierError::invalid_input(format!(
                "image {width}x{height} is smaller than the {size}x{size} crop",
                size = self.size
            )));
        }

        let x = (width - self.size) / 2;
        let y = (height - self.size) / 2;
        Ok(img.crop_imm(x, y, self.size, self.size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    #[test]
    fn resize_short_preserves_aspect_ratio() {
        let resize = ResizeShort::new(256, FilterType::Triangle).unwrap();
        let out = resize.apply(&gradient(640, 480)).unwrap();
        assert_eq!(out.dimensions(), (341, 256));

        let out = resize.apply(&gradient(480, 640)).unwrap();
        assert_eq!(out.dimensions(), (256, 341));
    }

    #[test]
    fn center_crop_takes_the_middle() {
        let crop = CenterCrop::new(224).unwrap();
        let out = crop.apply(&gradient(341, 256)).unwrap();
        assert_eq!(out.dimensions(), (224, 224));
    }

    #[test]
    fn center_crop_rejects_small_images() {
        let crop = CenterCrop::new(224).unwrap();
        let err = crop.apply(&gradient(100, 300)).unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidInput { .. }));
    }

    #[test]
    fn zero_sizes_are_construction_errors() {
        assert!(ResizeShort::new(0, FilterType::Triangle).is_err());
        assert!(CenterCrop::new(0).is_err());
    }
}

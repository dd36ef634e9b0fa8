//! The fixed preprocessing pipeline for classification inputs.
//!
//! Ordered, stateless transforms applied to one image at a time:
//! decode bytes, resize so the shorter side hits a target length,
//! center-crop, normalize per channel, and emit the network's tensor
//! layout. Identical bytes always produce an identical tensor.

use crate::core::{ClassifierError, ClassifierResult, Tensor4D};
use crate::processors::{CenterCrop, ChannelOrder, NormalizeImage, ResizeShort};
use image::{imageops::FilterType, DynamicImage};
use serde::{Deserialize, Serialize};

/// Configuration for the preprocessing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Target length for the shorter image side after resize.
    pub resize_short: u32,
    /// Side length of the square center crop.
    pub crop_size: u32,
    /// Scaling factor applied before normalization.
    pub scale: f32,
    /// Per-channel means (RGB order).
    pub mean: [f32; 3],
    /// Per-channel standard deviations (RGB order).
    pub std: [f32; 3],
    /// Channel ordering of the produced tensor.
    pub channel_order: ChannelOrder,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            resize_short: 256,
            crop_size: 224,
            scale: 1.0 / 255.0,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            channel_order: ChannelOrder::CHW,
        }
    }
}

/// The deterministic image-to-tensor pipeline.
///
/// Stateless across images: processing is restartable and safe to share
/// between threads.
#[derive(Debug, Clone)]
pub struct PreprocessPipeline {
    resize: ResizeShort,
    crop: CenterCrop,
    normalize: NormalizeImage,
}

impl PreprocessPipeline {
    pub fn new(config: &PreprocessConfig) -> ClassifierResult<Self> {
        if config.crop_size > config.resize_short {
            return Err(ClassifierError::config(format!(
                "crop size {} exceeds the resized shorter side {}",
                config.crop_size, config.resize_short
            )));
        }
        Ok(Self {
            // Bilinear, matching what the network was trained with.
            resize: ResizeShort::new(config.resize_short, FilterType::Triangle)?,
            crop: CenterCrop::new(config.crop_size)?,
            normalize: NormalizeImage::new(
                Some(config.scale),
                Some(config.mean),
                Some(config.std),
                Some(config.channel_order),
            )?,
        })
    }

    /// Decodes raw image bytes and processes the result.
    pub fn process_bytes(&self, bytes: &[u8]) -> ClassifierResult<Tensor4D> {
        let img = image::load_from_memory(bytes)?;
        self.process_image(&img)
    }

    /// Processes an already decoded image into a batch-of-one tensor.
    pub fn process_image(&self, img: &DynamicImage) -> ClassifierResult<Tensor4D> {
        let resized = self.resize.apply(img)?;
        let cropped = self.crop.apply(&resized)?;
        self.normalize.normalize_to(&cropped)
    }

    /// Processes several images into one batched tensor.
    ///
    /// All images go through the same resize/crop, so the batch
    /// dimensions always agree. Memory scales linearly with batch size
    /// times tensor size; batch size is caller-controlled.
    pub fn process_batch(&self, imgs: &[DynamicImage]) -> ClassifierResult<Tensor4D> {
        let cropped = imgs
            .iter()
            .map(|img| self.crop.apply(&self.resize.apply(img)?))
            .collect::<ClassifierResult<Vec<_>>>()?;
        self.normalize.normalize_batch_to(&cropped)
    }
}

impl Default for PreprocessPipeline {
    fn default() -> Self {
        // The default configuration is statically valid.
        Self {
            resize: ResizeShort::new(256, FilterType::Triangle)
                .unwrap_or_else(|_| unreachable!("256 is a valid resize target")),
            crop: CenterCrop::new(224)
                .unwrap_or_else(|_| unreachable!("224 is a valid crop size")),
            normalize: NormalizeImage::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([
                (x * 7 % 256) as u8,
                (y * 13 % 256) as u8,
                ((x + y) % 256) as u8,
            ])
        }));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn produces_network_shaped_tensors() {
        let pipeline = PreprocessPipeline::default();
        let tensor = pipeline.process_bytes(&png_bytes(320, 300)).unwrap();
        assert_eq!(tensor.dim(), (1, 3, 224, 224));
    }

    #[test]
    fn identical_bytes_produce_identical_tensors() {
        let pipeline = PreprocessPipeline::default();
        let bytes = png_bytes(500, 375);
        let a = pipeline.process_bytes(&bytes).unwrap();
        let b = pipeline.process_bytes(&bytes).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn batch_stacks_images_of_any_source_size() {
        let pipeline = PreprocessPipeline::default();
        let imgs = vec![
            DynamicImage::ImageRgb8(RgbImage::new(400, 300)),
            DynamicImage::ImageRgb8(RgbImage::new(260, 640)),
        ];
        let tensor = pipeline.process_batch(&imgs).unwrap();
        assert_eq!(tensor.dim(), (2, 3, 224, 224));
    }

    #[test]
    fn crop_larger_than_resize_is_a_construction_error() {
        let config = PreprocessConfig {
            resize_short: 200,
            crop_size: 224,
            ..Default::default()
        };
        assert!(PreprocessPipeline::new(&config).is_err());
    }

    #[test]
    fn undecodable_bytes_are_an_image_error() {
        let pipeline = PreprocessPipeline::default();
        let err = pipeline.process_bytes(b"not an image").unwrap_err();
        assert!(matches!(err, ClassifierError::ImageLoad(_)));
    }
}

//! Per-channel image normalization.
//!
//! Pixels are mapped through `(pixel * scale - mean) / std`, which is
//! folded into a single multiply-add per channel: `alpha = scale / std`,
//! `beta = -mean / std`.

use crate::core::{ClassifierError, ClassifierResult, Tensor4D};
use crate::processors::ChannelOrder;
use image::DynamicImage;
use rayon::prelude::*;

/// Normalizes images into network-ready tensors.
///
/// Encapsulates the scaling factor, per-channel mean and standard
/// deviation, and the output channel ordering. The transform is
/// stateless; identical input always produces an identical tensor.
#[derive(Debug, Clone)]
pub struct NormalizeImage {
    /// Scaling factors for each channel (alpha = scale / std).
    alpha: [f32; 3],
    /// Offset values for each channel (beta = -mean / std).
    beta: [f32; 3],
    /// Channel ordering of the produced tensor.
    order: ChannelOrder,
}

impl NormalizeImage {
    /// Creates a normalizer.
    ///
    /// Defaults are the ImageNet constants: scale `1/255`, mean
    /// `[0.485, 0.456, 0.406]`, std `[0.229, 0.224, 0.225]`, CHW order.
    ///
    /// # Errors
    ///
    /// Returns `ClassifierError::Config` if the scale is not positive or
    /// any standard deviation is not positive.
    pub fn new(
        scale: Option<f32>,
        mean: Option<[f32; 3]>,
        std: Option<[f32; 3]>,
        order: Option<ChannelOrder>,
    ) -> ClassifierResult<Self> {
        let scale = scale.unwrap_or(1.0 / 255.0);
        let mean = mean.unwrap_or([0.485, 0.456, 0.406]);
        let std = std.unwrap_or([0.229, 0.224, 0.225]);
        let order = order.unwrap_or(ChannelOrder::CHW);

        if scale <= 0.0 {
            return Err(ClassifierError::config("scale must be greater than 0"));
        }
        for (i, &s) in std.iter().enumerate() {
            if s <= 0.0 {
                return Err(ClassifierError::config(format!(
                    "standard deviation at index {i} must be greater than 0, got {s}"
                )));
            }
        }

        let mut alpha = [0.0f32; 3];
        let mut beta = [0.0f32; 3];
        for c in 0..3 {
            alpha[c] = scale / std[c];
            beta[c] = -mean[c] / std[c];
        }
        Ok(Self { alpha, beta, order })
    }

    /// The channel ordering of tensors this normalizer produces.
    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    fn normalize_into(&self, img: &image::RgbImage, out: &mut [f32]) {
        let (width, height) = img.dimensions();
        let (width, height) = (width as usize, height as usize);

        match self.order {
            ChannelOrder::CHW => {
                for (i, pixel) in img.pixels().enumerate() {
                    for c in 0..3 {
                        out[c * height * width + i] =
                            pixel[c] as f32 * self.alpha[c] + self.beta[c];
                    }
                }
            }
            ChannelOrder::HWC => {
                for (i, pixel) in img.pixels().enumerate() {
                    for c in 0..3 {
                        out[i * 3 + c] = pixel[c] as f32 * self.alpha[c] + self.beta[c];
                    }
                }
            }
        }
    }

    /// Normalizes a single image into a batch-of-one 4D tensor.
    pub fn normalize_to(&self, img: &DynamicImage) -> ClassifierResult<Tensor4D> {
        self.normalize_batch_to(std::slice::from_ref(img))
    }

    /// Normalizes a batch of same-sized images into a 4D tensor.
    ///
    /// # Errors
    ///
    /// Returns `ClassifierError::InvalidInput` if the batch is empty or
    /// the images differ in size.
    pub fn normalize_batch_to(&self, imgs: &[DynamicImage]) -> ClassifierResult<Tensor4D> {
        if imgs.is_empty() {
            return Err(ClassifierError::invalid_input(
                "cannot normalize an empty batch",
            ));
        }

        let rgb: Vec<image::RgbImage> = imgs.iter().map(|img| img.to_rgb8()).collect();
        let (width, height) = rgb[0].dimensions();
        for (i, img) in rgb.iter().enumerate() {
            if img.dimensions() != (width, height) {
                return Err(ClassifierError::invalid_input(format!(
                    "all images in a batch must share dimensions; image 0 is {width}x{height}, \
                     image {i} is {}x{}",
                    img.dimensions().0,
                    img.dimensions().1
                )));
            }
        }

        let (width, height) = (width as usize, height as usize);
        let img_size = 3 * height * width;
        let mut data = vec![0.0f32; rgb.len() * img_size];

        if rgb.len() == 1 {
            // Avoid rayon overhead for single-image batches.
            self.normalize_into(&rgb[0], &mut data);
        } else {
            data.par_chunks_mut(img_size)
                .zip(rgb.par_iter())
                .for_each(|(chunk, img)| self.normalize_into(img, chunk));
        }

        let shape = match self.order {
            ChannelOrder::CHW => (rgb.len(), 3, height, width),
            ChannelOrder::HWC => (rgb.len(), height, width, 3),
        };
        Tensor4D::from_shape_vec(shape, data).map_err(ClassifierError::from)
    }
}

impl Default for NormalizeImage {
    fn default() -> Self {
        const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
        const STD: [f32; 3] = [0.229, 0.224, 0.225];
        let mut alpha = [0.0f32; 3];
        let mut beta = [0.0f32; 3];
        for c in 0..3 {
            alpha[c] = (1.0 / 255.0) / STD[c];
            beta[c] = -MEAN[c] / STD[c];
        }
        Self {
            alpha,
            beta,
            order: ChannelOrder::CHW,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn known_pixel_maps_to_known_value() {
        let norm = NormalizeImage::new(
            Some(1.0 / 255.0),
            Some([0.5, 0.5, 0.5]),
            Some([0.5, 0.5, 0.5]),
            Some(ChannelOrder::CHW),
        )
        .unwrap();

        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, image::Rgb([255, 0, 127])));
        let tensor = norm.normalize_to(&img).unwrap();
        assert_eq!(tensor.dim(), (1, 3, 2, 2));
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 0]] + 1.0).abs() < 1e-6);
        assert!(tensor[[0, 2, 0, 0]].abs() < 0.01);
    }

    #[test]
    fn hwc_layout_places_channels_last() {
        let norm = NormalizeImage::new(
            Some(1.0),
            Some([0.0, 0.0, 0.0]),
            Some([1.0, 1.0, 1.0]),
            Some(ChannelOrder::HWC),
        )
        .unwrap();

        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, image::Rgb([1, 2, 3])));
        let tensor = norm.normalize_batch_to(&[img]).unwrap();
        assert_eq!(tensor.dim(), (1, 1, 1, 3));
        assert_eq!(tensor[[0, 0, 0, 0]], 1.0);
        assert_eq!(tensor[[0, 0, 0, 1]], 2.0);
        assert_eq!(tensor[[0, 0, 0, 2]], 3.0);
    }

    #[test]
    fn mismatched_batch_dimensions_are_rejected() {
        let norm = NormalizeImage::default();
        let a = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let b = DynamicImage::ImageRgb8(RgbImage::new(4, 5));
        assert!(norm.normalize_batch_to(&[a, b]).is_err());
    }

    #[test]
    fn non_positive_std_is_a_construction_error() {
        let err =
            NormalizeImage::new(None, None, Some([0.2, 0.0, 0.2]), None).unwrap_err();
        assert!(matches!(err, ClassifierError::Config { .. }));
    }
}

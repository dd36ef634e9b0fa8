//! GoogLeNet (Inception v1) image classification in Rust.
//!
//! This crate provides the GoogLeNet backbone with its two auxiliary
//! classification heads, pretrained checkpoint loading, a deterministic
//! preprocessing pipeline and an end-to-end classifier.
//!
//! # Example
//!
//! ```no_run
//! use googlenet::models::PretrainedSource;
//! use googlenet::predictor::ImageClassifier;
//! use std::path::Path;
//!
//! # fn main() -> googlenet::core::ClassifierResult<()> {
//! let classifier = ImageClassifier::builder()
//!     .pretrained(PretrainedSource::Download { distilled: false })
//!     .topk(5)
//!     .build()?;
//!
//! for prediction in classifier.classify_path(Path::new("cat.jpg"))? {
//!     println!("class id: {}, probability: {:.4}", prediction.class_id, prediction.score);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! * [`core`] - error types, tensor aliases and logging setup
//! * [`models`] - the backbone and pretrained weight handling
//! * [`processors`] - preprocessing and top-k post-processing
//! * [`predictor`] - graph execution and the end-to-end classifier
//! * [`utils`] - file-system helpers for the driver

pub mod core;
pub mod models;
pub mod predictor;
pub mod processors;
pub mod utils;

pub use crate::core::{ClassifierError, ClassifierResult};
pub use crate::predictor::{ImageClassifier, ImageClassifierBuilder, Prediction, Predictor};

/// Commonly used types, importable in one line.
pub mod prelude {
    pub use crate::core::{ClassifierError, ClassifierResult, Tensor2D, Tensor4D};
    pub use crate::models::{GoogLeNet, GoogLeNetConfig, PretrainedConfig, PretrainedSource};
    pub use crate::predictor::{ImageClassifier, ImageClassifierBuilder, Prediction, Predictor};
    pub use crate::processors::{PreprocessConfig, PreprocessPipeline, Topk, TopkResult};
}

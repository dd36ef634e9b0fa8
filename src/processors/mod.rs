//! Image preprocessing and score post-processing.
//!
//! * [`resize`] - shorter-side resize and center crop
//! * [`normalization`] - per-channel normalization into tensors
//! * [`pipeline`] - the fixed decode/resize/crop/normalize pipeline
//! * [`topk`] - top-k extraction from score vectors
//! * [`types`] - shared processing types

pub mod normalization;
pub mod pipeline;
pub mod resize;
pub mod topk;
pub mod types;

pub use normalization::NormalizeImage;
pub use pipeline::{PreprocessConfig, PreprocessPipeline};
pub use resize::{CenterCrop, ResizeShort};
pub use topk::{Topk, TopkResult};
pub use types::ChannelOrder;

//! Model definitions and pretrained weight handling.
//!
//! * [`googlenet`] - the GoogLeNet backbone and its building blocks
//! * [`pretrained`] - pretrained source resolution and checkpoint loading

pub mod googlenet;
pub mod pretrained;

pub use googlenet::{ConvBlock, Dropout, GoogLeNet, GoogLeNetConfig, Inception, InceptionConfig};
pub use pretrained::{
    load_checkpoint, PretrainedConfig, PretrainedLoader, PretrainedSource, DEFAULT_WEIGHTS_URL,
};

//! Types used in image preprocessing operations.

use serde::{Deserialize, Serialize};

/// Specifies the order of channels in an image tensor.
///
/// The layout is fixed per network instance and must be consistent
/// across every component that consumes or produces a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelOrder {
    /// Channel-first layout (channels, height, width).
    CHW,
    /// Channel-last layout (height, width, channels).
    HWC,
}

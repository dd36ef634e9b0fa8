//! The core module of the classification pipeline.
//!
//! This module contains the fundamental pieces shared by the rest of the
//! crate:
//! - Error handling
//! - Tensor type aliases for preprocessing outputs
//! - Logging setup
//!
//! It also re-exports commonly used types for convenience.

pub mod errors;

pub use errors::{ClassifierError, ProcessingStage};

/// Convenient result alias for classification operations.
pub type ClassifierResult<T> = Result<T, ClassifierError>;

/// A 2D tensor (rows x columns), used for per-image score vectors.
pub type Tensor2D = ndarray::Array2<f32>;

/// A 4D tensor (batch x channels x height x width, or the channel-last
/// equivalent), produced by the preprocessing pipeline.
pub type Tensor4D = ndarray::Array4<f32>;

/// Initializes the tracing subscriber for logging.
///
/// This function sets up the tracing subscriber with environment filter
/// and formatting layer. It's typically called at the start of an
/// application to enable logging.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}

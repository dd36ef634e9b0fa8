//! Error types for the classification pipeline.
//!
//! This module defines the error taxonomy used throughout the crate:
//! configuration errors raised at construction time, checkpoint
//! resolution errors (missing file, malformed contents, failed
//! download), graph execution errors, and ambient processing errors
//! wrapped with the stage they occurred in.

use thiserror::Error;

/// Enum representing different stages of processing in the pipeline.
///
/// Used to identify which stage of the pipeline a processing error
/// occurred in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProcessingStage {
    /// Error occurred during tensor operations.
    TensorOperation,
    /// Error occurred during image normalization.
    Normalization,
    /// Error occurred during image resizing or cropping.
    Resize,
    /// Error occurred during batch processing.
    BatchProcessing,
    /// Error occurred during post-processing.
    PostProcessing,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::TensorOperation => write!(f, "tensor operation"),
            ProcessingStage::Normalization => write!(f, "normalization"),
            ProcessingStage::Resize => write!(f, "resize"),
            ProcessingStage::BatchProcessing => write!(f, "batch processing"),
            ProcessingStage::PostProcessing => write!(f, "post-processing"),
        }
    }
}

/// Enum representing the errors that can occur in the classification
/// pipeline.
///
/// Construction-time errors (`Config`, most `Format`) are fatal and
/// returned immediately; no partially built model is ever handed out.
/// Per-image errors are meant to be isolated by the surrounding driver.
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// Invalid construction argument, e.g. a channel/group combination
    /// that does not divide, or a pretrained source of the wrong type.
    #[error("configuration: {message}")]
    Config {
        /// A message describing the configuration error.
        message: String,
    },

    /// A required file or directory does not exist or is empty.
    #[error("not found: {path}: {message}")]
    NotFound {
        /// The offending path.
        path: String,
        /// A message describing what was expected there.
        message: String,
    },

    /// Checkpoint or graph contents do not match the model
    /// (parameter name or shape mismatch, unreadable container).
    #[error("checkpoint format: {message}")]
    Format {
        /// A message naming the offending parameters.
        message: String,
    },

    /// Network fetch of pretrained weights failed.
    #[error("download of {url} failed: {message}")]
    Download {
        /// The URL that was being fetched.
        url: String,
        /// A message describing the failure.
        message: String,
    },

    /// Graph execution was asked for a tensor name the graph does not
    /// declare.
    #[error("execution: {message}")]
    Execution {
        /// A message naming the unknown tensor.
        message: String,
    },

    /// Error indicating invalid runtime input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error occurred while decoding or loading an image.
    #[error("image load")]
    ImageLoad(#[source] image::ImageError),

    /// Error occurred during processing.
    #[error("{stage} failed: {context}")]
    Processing {
        /// The stage of processing where the error occurred.
        stage: ProcessingStage,
        /// Additional context about the error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error from tensor shape manipulation.
    #[error("tensor shape")]
    Shape(#[from] ndarray::ShapeError),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),
}

impl ClassifierError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a not-found error for a path.
    pub fn not_found(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a checkpoint format error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Creates a download error for a URL.
    pub fn download(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Download {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates an execution error for an unknown tensor name.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Creates an invalid-input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a processing error for tensor operations.
    pub fn tensor_op(
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            stage: ProcessingStage::TensorOperation,
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a processing error for normalization operations.
    pub fn normalization(
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            stage: ProcessingStage::Normalization,
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a processing error for post-processing operations.
    pub fn post_processing(
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            stage: ProcessingStage::PostProcessing,
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a processing error with an explicit stage.
    pub fn processing(
        stage: ProcessingStage,
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            stage,
            context: context.into(),
            source: Box::new(error),
        }
    }
}

impl From<image::ImageError> for ClassifierError {
    fn from(error: image::ImageError) -> Self {
        Self::ImageLoad(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = ClassifierError::config("groups must divide input channels");
        assert!(err.to_string().contains("groups must divide"));

        let err = ClassifierError::download("http://example.invalid/w.safetensors", "timed out");
        assert!(err.to_string().contains("example.invalid"));
    }

    #[test]
    fn processing_chains_source() {
        let io = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad header");
        let err = ClassifierError::tensor_op("reshape batch", io);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("tensor operation"));
    }
}

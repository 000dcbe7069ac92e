//! Error types for the watermarking library
//!
//! Rendering itself never fails: missing fonts, missing watermark bitmaps and
//! empty text all degrade to a defined fallback. The variants below cover the
//! surrounding I/O (decoding sources, writing exports, templates, config).

use std::path::PathBuf;

/// Main error type for watermarking operations
#[derive(Debug, thiserror::Error)]
pub enum WatermarkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Image format not supported: {format}")]
    UnsupportedFormat { format: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid color: {value}")]
    InvalidColor { value: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Template error: {message}")]
    TemplateError { message: String },

    #[error("Template not found: {name}")]
    TemplateNotFound { name: String },

    #[error("Logging initialization failed: {message}")]
    LoggingError { message: String },

    #[error("Refusing to overwrite source image {path}")]
    WouldOverwriteSource { path: PathBuf },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Processing failed: {message}")]
    ProcessingFailed { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WatermarkError {
    /// Get the error type as a string for categorization
    pub fn error_type(&self) -> &'static str {
        match self {
            WatermarkError::Io(_) => "io_error",
            WatermarkError::Image(_) => "image_error",
            WatermarkError::UnsupportedFormat { .. } => "unsupported_format",
            WatermarkError::FileNotFound { .. } => "file_not_found",
            WatermarkError::InvalidColor { .. } => "invalid_color",
            WatermarkError::InvalidInput { .. } => "invalid_input",
            WatermarkError::ConfigError { .. } => "config_error",
            WatermarkError::TemplateError { .. } => "template_error",
            WatermarkError::TemplateNotFound { .. } => "template_not_found",
            WatermarkError::LoggingError { .. } => "logging_error",
            WatermarkError::WouldOverwriteSource { .. } => "would_overwrite_source",
            WatermarkError::Cancelled => "cancelled",
            WatermarkError::ProcessingFailed { .. } => "processing_failed",
            WatermarkError::Serialization(_) => "serialization_error",
        }
    }

    /// Check if the error only affects the current item of a batch
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WatermarkError::Io(_)
                | WatermarkError::Image(_)
                | WatermarkError::UnsupportedFormat { .. }
                | WatermarkError::FileNotFound { .. }
                | WatermarkError::WouldOverwriteSource { .. }
        )
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, WatermarkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_types() {
        let error = WatermarkError::UnsupportedFormat {
            format: "xyz".to_string(),
        };
        assert_eq!(error.error_type(), "unsupported_format");
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_recoverable_errors() {
        let error = WatermarkError::FileNotFound {
            path: PathBuf::from("missing.jpg"),
        };
        assert!(error.is_recoverable());

        let error = WatermarkError::Cancelled;
        assert!(!error.is_recoverable());

        let error = WatermarkError::ConfigError {
            message: "bad".to_string(),
        };
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let error = WatermarkError::TemplateNotFound {
            name: "holiday".to_string(),
        };
        assert_eq!(error.to_string(), "Template not found: holiday");
    }
}

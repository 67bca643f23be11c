use std::path::PathBuf;

/// Result alias that carries the custom [`VisualiserError`] type.
pub type Result<T> = std::result::Result<T, VisualiserError>;

/// Common error type for the core crate.
///
/// Shader compilation and linking never return these directly; they report
/// failure through [`crate::CompileResult`] state and messages. The variants
/// that mirror those failures exist so callers can lift a failed result into
/// an error with [`crate::CompileResult::compile_error`] or
/// [`crate::CompileResult::link_error`].
#[derive(Debug, thiserror::Error)]
pub enum VisualiserError {
    /// A shader source or config file could not be read.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    /// The shader stage could not be determined or is not supported.
    #[error("unknown shader stage for `{}`", .0.display())]
    UnknownStageKind(PathBuf),
    #[error("failed to compile `{}`: {message}", .path.display())]
    CompileFailure { path: PathBuf, message: String },
    #[error("failed to link `{}`: {message}", .path.display())]
    LinkFailure { path: PathBuf, message: String },
    /// The framebuffer attachment check failed with the given status code.
    #[error("framebuffer incomplete: 0x{0:x}")]
    FramebufferIncomplete(u32),
    /// A dynamic buffer was used out of protocol (for example mapped twice).
    #[error("buffer usage error: {0}")]
    BufferUsage(&'static str),
    /// Input data that cannot be processed.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// The graphics backend failed to create or operate on an object.
    #[error("graphics backend error: {0}")]
    Backend(String),
    /// Free-form message, mostly surfaced by the command line driver.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Config parsing failures.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl VisualiserError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for VisualiserError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VisualiserError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<realfft::FftError> for VisualiserError {
    fn from(value: realfft::FftError) -> Self {
        Self::Message(format!("fft failed: {value}"))
    }
}

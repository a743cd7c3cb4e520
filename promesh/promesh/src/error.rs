//! Codec error types.

use std::fmt;

use promesh_mesh::MeshError;
use promesh_stream::StreamError;

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level codec error.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A configuration value outside its legal range.
    Config(ConfigError),
    /// The input mesh cannot be compressed.
    InputMesh(MeshError),
    /// A compressed stream failed validation.
    Corrupt(StreamError),
}

/// Rejected configuration values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    /// Quantization bit depth outside 4..=16.
    QuantizationBits {
        /// The rejected depth.
        bits: u8,
    },
    /// Decompression percentage outside 0..=100.
    Percentage {
        /// The rejected percentage.
        value: f64,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "configuration error: {err}"),
            Self::InputMesh(err) => write!(f, "input mesh error: {err}"),
            Self::Corrupt(err) => write!(f, "corrupt stream: {err}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuantizationBits { bits } => {
                write!(f, "quantization bit depth {bits} outside 4..=16")
            }
            Self::Percentage { value } => {
                write!(f, "percentage {value} outside 0..=100")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::InputMesh(err) => Some(err),
            Self::Corrupt(err) => Some(err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<MeshError> for Error {
    fn from(err: MeshError) -> Self {
        Self::InputMesh(err)
    }
}

impl From<StreamError> for Error {
    fn from(err: StreamError) -> Self {
        Self::Corrupt(err)
    }
}

/// Shorthand for stream corruption detected outside the stream crate.
pub(crate) fn corrupt(context: &'static str, detail: impl Into<String>) -> Error {
    Error::Corrupt(StreamError::InvalidFormat {
        context,
        detail: detail.into(),
    })
}

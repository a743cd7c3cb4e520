//! Wire-format errors.

use std::fmt;

/// Result type for stream reads and writes.
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors from parsing a progressive mesh stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The stream ended before a field was complete.
    UnexpectedEof {
        /// What was being read.
        context: &'static str,
    },
    /// A prefix code outside the symbol alphabet.
    InvalidSymbol {
        /// What was being read.
        context: &'static str,
        /// The offending code bits.
        value: u32,
    },
    /// A structurally invalid field.
    InvalidFormat {
        /// What was being read.
        context: &'static str,
        /// Description of the problem.
        detail: String,
    },
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof { context } => {
                write!(f, "unexpected end of stream while reading {context}")
            }
            Self::InvalidSymbol { context, value } => {
                write!(f, "invalid symbol code {value:#b} while reading {context}")
            }
            Self::InvalidFormat { context, detail } => {
                write!(f, "invalid {context}: {detail}")
            }
        }
    }
}

impl std::error::Error for StreamError {}

//! Bit-level wire format for progressive mesh streams.
//!
//! A stream is a [`StreamHeader`], a base (coarsest) mesh payload, and a
//! sequence of varint-framed refinement layer blobs stored in
//! simplification order. This crate owns the primitive encodings — varints,
//! MSB-first bit packing, zigzag residuals, the conquest symbol alphabet,
//! and layer framing — and validates on read: truncation, codes outside the
//! symbol alphabet, unknown flags, and nonzero padding all fail instead of
//! being silently accepted.
//!
//! Decoding mesh semantics out of these records is the `promesh` crate's
//! job; nothing here touches connectivity.

mod bits;
mod error;
mod header;
mod layer;
mod symbol;
mod varint;
mod zigzag;

pub use bits::{BitReader, BitWriter, bit_width};
pub use error::{StreamError, StreamResult};
pub use header::{
    FLAG_ADAPTIVE_QUANTIZATION, FLAG_ALLOW_CONCAVE_FACETS, FLAG_CURVATURE_PREDICTION,
    FLAG_EDGE_PREDICTION, FLAG_FACE_PREDICTION, FLAG_LIFTING_SCHEME,
    FLAG_TRIANGLE_FACE_PREDICTION, MAGIC, MAX_QUANTIZATION_BITS, MIN_QUANTIZATION_BITS,
    StreamHeader, VERSION, take,
};
pub use layer::{LAYER_FLAG_TRIANGLE, LayerReader, LayerWriter, read_frame, write_frame};
pub use symbol::{Symbol, explicit_code, predicted_code, read_explicit, read_predicted};
pub use varint::{read_varint, write_varint};
pub use zigzag::{zigzag_decode, zigzag_encode};

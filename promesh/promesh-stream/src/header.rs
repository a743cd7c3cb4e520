//! Stream header.
//!
//! Fixed little-endian layout:
//!
//! - Bytes 0-3: magic `"PMC1"`
//! - Byte 4: format version
//! - Byte 5: quantization bit depth (4..=16)
//! - Byte 6: codec flag bits
//! - Bytes 7-30: bounding cube center (3 × f64)
//! - Bytes 31-38: bounding cube diagonal (f64)
//!
//! The base mesh payload and layer frames follow.

use glam::DVec3;

use crate::error::{StreamError, StreamResult};

/// Stream magic bytes.
pub const MAGIC: [u8; 4] = *b"PMC1";

/// Current format version.
pub const VERSION: u8 = 1;

/// Flag: per-layer adaptive residual widths.
pub const FLAG_ADAPTIVE_QUANTIZATION: u8 = 1 << 0;
/// Flag: lifting-scheme position updates.
pub const FLAG_LIFTING_SCHEME: u8 = 1 << 1;
/// Flag: curvature term in position prediction.
pub const FLAG_CURVATURE_PREDICTION: u8 = 1 << 2;
/// Flag: context-predicted facet symbols.
pub const FLAG_FACE_PREDICTION: u8 = 1 << 3;
/// Flag: valence-driven connectivity mask coding.
pub const FLAG_EDGE_PREDICTION: u8 = 1 << 4;
/// Flag: mask omission on all-triangle layers.
pub const FLAG_TRIANGLE_FACE_PREDICTION: u8 = 1 << 5;
/// Flag: concave patches allowed during decimation.
pub const FLAG_ALLOW_CONCAVE_FACETS: u8 = 1 << 6;

const KNOWN_FLAGS: u8 = FLAG_ADAPTIVE_QUANTIZATION
    | FLAG_LIFTING_SCHEME
    | FLAG_CURVATURE_PREDICTION
    | FLAG_FACE_PREDICTION
    | FLAG_EDGE_PREDICTION
    | FLAG_TRIANGLE_FACE_PREDICTION
    | FLAG_ALLOW_CONCAVE_FACETS;

/// Smallest legal quantization bit depth.
pub const MIN_QUANTIZATION_BITS: u8 = 4;
/// Largest legal quantization bit depth.
pub const MAX_QUANTIZATION_BITS: u8 = 16;

/// Decoded stream header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamHeader {
    /// Quantization bit depth.
    pub quantization_bits: u8,
    /// Codec flag bits.
    pub flags: u8,
    /// Bounding cube center.
    pub center: DVec3,
    /// Bounding cube diagonal.
    pub diagonal: f64,
}

impl StreamHeader {
    /// Append the header to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.push(self.quantization_bits);
        out.push(self.flags);
        for component in [self.center.x, self.center.y, self.center.z, self.diagonal] {
            out.extend_from_slice(&component.to_le_bytes());
        }
    }

    /// Parse a header at `offset`, advancing the offset.
    pub fn read(data: &[u8], offset: &mut usize) -> StreamResult<Self> {
        let magic = take(data, offset, 4, "magic")?;
        if magic != MAGIC {
            return Err(StreamError::InvalidFormat {
                context: "magic",
                detail: format!("expected {MAGIC:?}, got {magic:?}"),
            });
        }
        let version = take(data, offset, 1, "version")?[0];
        if version != VERSION {
            return Err(StreamError::InvalidFormat {
                context: "version",
                detail: format!("unsupported version {version}"),
            });
        }
        let quantization_bits = take(data, offset, 1, "quantization bits")?[0];
        if !(MIN_QUANTIZATION_BITS..=MAX_QUANTIZATION_BITS).contains(&quantization_bits) {
            return Err(StreamError::InvalidFormat {
                context: "quantization bits",
                detail: format!(
                    "{quantization_bits} outside {MIN_QUANTIZATION_BITS}..={MAX_QUANTIZATION_BITS}"
                ),
            });
        }
        let flags = take(data, offset, 1, "flags")?[0];
        if flags & !KNOWN_FLAGS != 0 {
            return Err(StreamError::InvalidFormat {
                context: "flags",
                detail: format!("unknown flag bits in {flags:#04x}"),
            });
        }
        let center = DVec3::new(
            read_f64(data, offset, "bounding cube center")?,
            read_f64(data, offset, "bounding cube center")?,
            read_f64(data, offset, "bounding cube center")?,
        );
        let diagonal = read_f64(data, offset, "bounding cube diagonal")?;
        if !diagonal.is_finite() || diagonal <= 0.0 {
            return Err(StreamError::InvalidFormat {
                context: "bounding cube diagonal",
                detail: format!("{diagonal} is not a positive finite value"),
            });
        }
        Ok(Self {
            quantization_bits,
            flags,
            center,
            diagonal,
        })
    }
}

/// Take `len` bytes from `data` at `offset`, advancing the offset.
pub fn take<'a>(
    data: &'a [u8],
    offset: &mut usize,
    len: usize,
    context: &'static str,
) -> StreamResult<&'a [u8]> {
    let end = offset
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or(StreamError::UnexpectedEof { context })?;
    let slice = &data[*offset..end];
    *offset = end;
    Ok(slice)
}

fn read_f64(data: &[u8], offset: &mut usize, context: &'static str) -> StreamResult<f64> {
    let bytes = take(data, offset, 8, context)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(f64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StreamHeader {
        StreamHeader {
            quantization_bits: 12,
            flags: FLAG_LIFTING_SCHEME | FLAG_CURVATURE_PREDICTION | FLAG_ALLOW_CONCAVE_FACETS,
            center: DVec3::new(1.5, -2.0, 300.25),
            diagonal: 64.0,
        }
    }

    #[test]
    fn round_trips() {
        let mut out = Vec::new();
        sample().write(&mut out);
        assert_eq!(out.len(), 4 + 1 + 1 + 1 + 32);

        let mut offset = 0;
        let parsed = StreamHeader::read(&out, &mut offset).unwrap();
        assert_eq!(parsed, sample());
        assert_eq!(offset, out.len());
    }

    #[test]
    fn bad_magic_fails() {
        let mut out = Vec::new();
        sample().write(&mut out);
        out[0] = b'X';
        let mut offset = 0;
        assert!(matches!(
            StreamHeader::read(&out, &mut offset),
            Err(StreamError::InvalidFormat { context: "magic", .. })
        ));
    }

    #[test]
    fn bad_version_fails() {
        let mut out = Vec::new();
        sample().write(&mut out);
        out[4] = 99;
        let mut offset = 0;
        assert!(StreamHeader::read(&out, &mut offset).is_err());
    }

    #[test]
    fn bit_depth_bounds_are_enforced() {
        for bits in [3u8, 17, 0, 255] {
            let mut header = sample();
            header.quantization_bits = bits;
            let mut out = Vec::new();
            header.write(&mut out);
            let mut offset = 0;
            assert!(
                StreamHeader::read(&out, &mut offset).is_err(),
                "bit depth {bits} should fail"
            );
        }
        for bits in [4u8, 16] {
            let mut header = sample();
            header.quantization_bits = bits;
            let mut out = Vec::new();
            header.write(&mut out);
            let mut offset = 0;
            assert!(StreamHeader::read(&out, &mut offset).is_ok());
        }
    }

    #[test]
    fn unknown_flags_fail() {
        let mut out = Vec::new();
        sample().write(&mut out);
        out[6] |= 0x80;
        let mut offset = 0;
        assert!(StreamHeader::read(&out, &mut offset).is_err());
    }

    #[test]
    fn truncated_header_is_eof() {
        let mut out = Vec::new();
        sample().write(&mut out);
        out.truncate(20);
        let mut offset = 0;
        assert!(matches!(
            StreamHeader::read(&out, &mut offset),
            Err(StreamError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn nonpositive_diagonal_fails() {
        let mut header = sample();
        header.diagonal = 0.0;
        let mut out = Vec::new();
        header.write(&mut out);
        let mut offset = 0;
        assert!(StreamHeader::read(&out, &mut offset).is_err());
    }
}

//! Refinement layer payloads.
//!
//! A layer blob is:
//!
//! - flags byte (bit 0: triangle layer, other bits reserved as zero)
//! - residual width byte (bits per zigzag residual component)
//! - the layer's bit records, zero-padded to a byte boundary
//!
//! Residual components are buffered by the writer so the minimal width can
//! be chosen once the whole layer is known. Within the stream, layer blobs
//! are varint-length framed.

use glam::IVec3;

use crate::bits::{BitReader, BitWriter, bit_width};
use crate::error::{StreamError, StreamResult};
use crate::symbol::{self, Symbol};
use crate::varint::{read_varint, write_varint};
use crate::zigzag::{zigzag_decode, zigzag_encode};

/// Flags-byte bit marking a layer whose input mesh was all triangles.
pub const LAYER_FLAG_TRIANGLE: u8 = 0x01;

#[derive(Debug, Clone, Copy)]
enum Record {
    Bits { value: u32, width: u32 },
    Vlq(u32),
    Residual(IVec3),
}

/// Accumulates one layer's records, then packs them with the minimal
/// residual width.
#[derive(Debug)]
pub struct LayerWriter {
    triangle_layer: bool,
    records: Vec<Record>,
    max_residual_width: u32,
}

impl LayerWriter {
    #[must_use]
    pub fn new(triangle_layer: bool) -> Self {
        Self {
            triangle_layer,
            records: Vec::new(),
            max_residual_width: 1,
        }
    }

    /// Whether this layer was flagged as all-triangles.
    #[must_use]
    pub fn triangle_layer(&self) -> bool {
        self.triangle_layer
    }

    pub fn write_bit(&mut self, bit: bool) {
        self.records.push(Record::Bits {
            value: u32::from(bit),
            width: 1,
        });
    }

    pub fn write_bits(&mut self, value: u32, width: u32) {
        self.records.push(Record::Bits { value, width });
    }

    pub fn write_symbol(&mut self, (value, width): (u32, u32)) {
        self.records.push(Record::Bits { value, width });
    }

    pub fn write_vlq(&mut self, value: u32) {
        self.records.push(Record::Vlq(value));
    }

    /// Buffer a signed residual triple.
    pub fn write_residual(&mut self, residual: IVec3) {
        for component in [residual.x, residual.y, residual.z] {
            let width = bit_width(zigzag_encode(component));
            self.max_residual_width = self.max_residual_width.max(width);
        }
        self.records.push(Record::Residual(residual));
    }

    /// Pack the layer. With `fixed_width` the residual width is forced
    /// (non-adaptive streams); otherwise the minimal observed width is used.
    #[must_use]
    pub fn finish(self, fixed_width: Option<u32>) -> Vec<u8> {
        let width = fixed_width.unwrap_or(self.max_residual_width);
        debug_assert!(width >= self.max_residual_width);
        debug_assert!((1..=u32::from(u8::MAX)).contains(&width));

        let mut flags = 0u8;
        if self.triangle_layer {
            flags |= LAYER_FLAG_TRIANGLE;
        }

        let mut bits = BitWriter::new();
        for record in self.records {
            match record {
                Record::Bits { value, width } => bits.write_bits(value, width),
                Record::Vlq(value) => bits.write_vlq(value),
                Record::Residual(residual) => {
                    for component in [residual.x, residual.y, residual.z] {
                        bits.write_bits(zigzag_encode(component), width);
                    }
                }
            }
        }

        let mut out = vec![flags, width as u8];
        out.extend(bits.into_bytes());
        out
    }
}

/// Cursor over one layer blob.
#[derive(Debug, Clone)]
pub struct LayerReader {
    triangle_layer: bool,
    residual_width: u32,
    data: Vec<u8>,
    pos: usize,
}

impl LayerReader {
    /// Parse a layer blob. `max_width` is the widest legal residual width
    /// (`quantization bits + 1`); non-adaptive streams must use exactly it.
    pub fn parse(data: Vec<u8>, max_width: u32, adaptive: bool) -> StreamResult<Self> {
        if data.len() < 2 {
            return Err(StreamError::UnexpectedEof { context: "layer header" });
        }
        let flags = data[0];
        if flags & !LAYER_FLAG_TRIANGLE != 0 {
            return Err(StreamError::InvalidFormat {
                context: "layer header",
                detail: format!("unknown flags {flags:#04x}"),
            });
        }
        let residual_width = u32::from(data[1]);
        if residual_width == 0 || residual_width > max_width {
            return Err(StreamError::InvalidFormat {
                context: "layer header",
                detail: format!("residual width {residual_width} outside 1..={max_width}"),
            });
        }
        if !adaptive && residual_width != max_width {
            return Err(StreamError::InvalidFormat {
                context: "layer header",
                detail: format!(
                    "residual width {residual_width} in a non-adaptive stream (expected {max_width})"
                ),
            });
        }
        Ok(Self {
            triangle_layer: flags & LAYER_FLAG_TRIANGLE != 0,
            residual_width,
            data,
            pos: 16,
        })
    }

    /// Whether this layer was flagged as all-triangles.
    #[must_use]
    pub fn triangle_layer(&self) -> bool {
        self.triangle_layer
    }

    /// Bits per zigzag residual component.
    #[must_use]
    pub fn residual_width(&self) -> u32 {
        self.residual_width
    }

    fn with_bits<T>(
        &mut self,
        read: impl FnOnce(&mut BitReader<'_>) -> StreamResult<T>,
    ) -> StreamResult<T> {
        let mut bits = BitReader::new(&self.data);
        bits.seek(self.pos);
        let result = read(&mut bits);
        self.pos = bits.bit_pos();
        result
    }

    pub fn read_bit(&mut self) -> StreamResult<bool> {
        self.with_bits(|bits| bits.read_bit())
    }

    pub fn read_bits(&mut self, width: u32) -> StreamResult<u32> {
        self.with_bits(|bits| bits.read_bits(width))
    }

    pub fn read_vlq(&mut self) -> StreamResult<u32> {
        self.with_bits(|bits| bits.read_vlq())
    }

    /// Read a signed residual triple at this layer's width.
    pub fn read_residual(&mut self) -> StreamResult<IVec3> {
        let width = self.residual_width;
        self.with_bits(|bits| {
            let x = zigzag_decode(bits.read_bits(width)?);
            let y = zigzag_decode(bits.read_bits(width)?);
            let z = zigzag_decode(bits.read_bits(width)?);
            Ok(IVec3::new(x, y, z))
        })
    }

    pub fn read_symbol_explicit(&mut self) -> StreamResult<Symbol> {
        self.with_bits(symbol::read_explicit)
    }

    pub fn read_symbol_predicted(&mut self, predicted: Symbol) -> StreamResult<Symbol> {
        self.with_bits(|bits| symbol::read_predicted(bits, predicted))
    }

    /// Check that every record was consumed (only zero padding remains).
    pub fn ensure_consumed(&self) -> StreamResult<()> {
        let mut bits = BitReader::new(&self.data);
        bits.seek(self.pos);
        bits.expect_consumed("layer payload")
    }
}

/// Append a varint-length-framed blob.
pub fn write_frame(out: &mut Vec<u8>, blob: &[u8]) {
    write_varint(out, blob.len() as u32);
    out.extend_from_slice(blob);
}

/// Read a varint-length-framed blob, advancing `offset`.
pub fn read_frame<'a>(data: &'a [u8], offset: &mut usize) -> StreamResult<&'a [u8]> {
    let len = read_varint(data, offset)? as usize;
    let end = offset
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or(StreamError::UnexpectedEof { context: "frame" })?;
    let blob = &data[*offset..end];
    *offset = end;
    Ok(blob)
}

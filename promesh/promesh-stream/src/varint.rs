//! Variable-length integer encoding.
//!
//! Protocol Buffers style: each byte carries 7 payload bits, the MSB marks
//! continuation.

use crate::error::{StreamError, StreamResult};

/// Read a varint from `data` at `offset`, advancing the offset.
///
/// # Errors
///
/// Returns an error if the buffer ends before the varint is complete.
pub fn read_varint(data: &[u8], offset: &mut usize) -> StreamResult<u32> {
    let mut result: u32 = 0;
    let mut shift: u32 = 0;

    loop {
        if *offset >= data.len() {
            return Err(StreamError::UnexpectedEof { context: "varint" });
        }

        let byte = data[*offset];
        *offset += 1;

        result += u32::from(byte & 0x7F) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            break;
        }
    }

    Ok(result)
}

/// Append a varint to `out`.
pub fn write_varint(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

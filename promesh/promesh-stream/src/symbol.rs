//! Conquest symbol alphabet and its prefix codes.
//!
//! Two codings exist for the same three-symbol alphabet:
//!
//! - *explicit*: fixed 2-bit codes, used wherever no usable context exists
//!   (problematic-queue resolution).
//! - *predicted*: a context selects one symbol as likely; it costs a single
//!   `0` bit and the other two cost `10` and `110`.
//!
//! In both codings one code point (`11` / `111`) lies outside the alphabet
//! and fails decoding, so bit corruption surfaces instead of desynchronizing
//! the conquest.

use crate::bits::BitReader;
use crate::error::{StreamError, StreamResult};

/// Per-gate conquest decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    /// The gate facet is conquered without removing a vertex.
    Retained,
    /// A vertex is removed (or re-inserted) at the gate facet.
    Removed,
    /// The gate is deferred to the problematic queue.
    Deferred,
}

/// Alphabet in canonical order, used to rank the unpredicted symbols.
const CANONICAL: [Symbol; 3] = [Symbol::Retained, Symbol::Removed, Symbol::Deferred];

/// Fixed 2-bit code for `symbol`: `(value, width)`.
#[must_use]
pub fn explicit_code(symbol: Symbol) -> (u32, u32) {
    match symbol {
        Symbol::Retained => (0b00, 2),
        Symbol::Removed => (0b01, 2),
        Symbol::Deferred => (0b10, 2),
    }
}

/// Context-ordered prefix code for `symbol` given the `predicted` symbol:
/// `(value, width)`.
#[must_use]
pub fn predicted_code(symbol: Symbol, predicted: Symbol) -> (u32, u32) {
    if symbol == predicted {
        return (0b0, 1);
    }
    let rank = CANONICAL
        .iter()
        .filter(|&&s| s != predicted)
        .position(|&s| s == symbol);
    match rank {
        Some(0) => (0b10, 2),
        _ => (0b110, 3),
    }
}

/// Read a fixed 2-bit symbol.
pub fn read_explicit(reader: &mut BitReader<'_>) -> StreamResult<Symbol> {
    match reader.read_bits(2)? {
        0b00 => Ok(Symbol::Retained),
        0b01 => Ok(Symbol::Removed),
        0b10 => Ok(Symbol::Deferred),
        value => Err(StreamError::InvalidSymbol {
            context: "explicit symbol",
            value,
        }),
    }
}

/// Read a context-ordered prefix symbol.
pub fn read_predicted(reader: &mut BitReader<'_>, predicted: Symbol) -> StreamResult<Symbol> {
    if !reader.read_bit()? {
        return Ok(predicted);
    }
    let others: Vec<Symbol> = CANONICAL.iter().copied().filter(|&s| s != predicted).collect();
    if !reader.read_bit()? {
        return Ok(others[0]);
    }
    if !reader.read_bit()? {
        return Ok(others[1]);
    }
    Err(StreamError::InvalidSymbol {
        context: "predicted symbol",
        value: 0b111,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitWriter;

    const ALL: [Symbol; 3] = [Symbol::Retained, Symbol::Removed, Symbol::Deferred];

    #[test]
    fn explicit_codes_round_trip() {
        for symbol in ALL {
            let (value, width) = explicit_code(symbol);
            let mut w = BitWriter::new();
            w.write_bits(value, width);
            let bytes = w.into_bytes();
            let mut r = BitReader::new(&bytes);
            assert_eq!(read_explicit(&mut r).unwrap(), symbol);
        }
    }

    #[test]
    fn explicit_code_three_is_invalid() {
        let bytes = [0b1100_0000];
        let mut r = BitReader::new(&bytes);
        assert!(matches!(
            read_explicit(&mut r),
            Err(StreamError::InvalidSymbol { value: 0b11, .. })
        ));
    }

    #[test]
    fn predicted_symbol_costs_one_bit() {
        for predicted in ALL {
            let (value, width) = predicted_code(predicted, predicted);
            assert_eq!((value, width), (0, 1));
        }
    }

    #[test]
    fn predicted_codes_round_trip() {
        for predicted in ALL {
            for symbol in ALL {
                let (value, width) = predicted_code(symbol, predicted);
                let mut w = BitWriter::new();
                w.write_bits(value, width);
                let bytes = w.into_bytes();
                let mut r = BitReader::new(&bytes);
                assert_eq!(
                    read_predicted(&mut r, predicted).unwrap(),
                    symbol,
                    "predicted {predicted:?}, symbol {symbol:?}"
                );
            }
        }
    }

    #[test]
    fn predicted_code_seven_is_invalid() {
        let bytes = [0b1110_0000];
        let mut r = BitReader::new(&bytes);
        assert!(matches!(
            read_predicted(&mut r, Symbol::Removed),
            Err(StreamError::InvalidSymbol { value: 0b111, .. })
        ));
    }
}

//! Zigzag mapping between signed residuals and unsigned code values.
//!
//! Small magnitudes of either sign map to small codes, which keeps the
//! per-layer residual bit-width minimal.

/// Map a signed value to an unsigned code: 0, -1, 1, -2, 2, ... -> 0, 1, 2, 3, 4, ...
#[must_use]
pub fn zigzag_encode(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Inverse of [`zigzag_encode`].
#[must_use]
pub fn zigzag_decode(code: u32) -> i32 {
    ((code >> 1) as i32) ^ -((code & 1) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn small_values_interleave() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
        assert_eq!(zigzag_encode(2), 4);
        assert_eq!(zigzag_decode(0), 0);
        assert_eq!(zigzag_decode(1), -1);
        assert_eq!(zigzag_decode(2), 1);
        assert_eq!(zigzag_decode(3), -2);
        assert_eq!(zigzag_decode(4), 2);
    }

    #[test]
    fn extremes() {
        assert_eq!(zigzag_decode(zigzag_encode(i32::MAX)), i32::MAX);
        assert_eq!(zigzag_decode(zigzag_encode(i32::MIN)), i32::MIN);
    }

    proptest! {
        #[test]
        fn round_trips(value in any::<i32>()) {
            prop_assert_eq!(zigzag_decode(zigzag_encode(value)), value);
        }
    }
}

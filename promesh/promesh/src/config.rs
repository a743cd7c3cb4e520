//! Codec configuration.

use promesh_stream::{
    FLAG_ADAPTIVE_QUANTIZATION, FLAG_ALLOW_CONCAVE_FACETS, FLAG_CURVATURE_PREDICTION,
    FLAG_EDGE_PREDICTION, FLAG_FACE_PREDICTION, FLAG_LIFTING_SCHEME,
    FLAG_TRIANGLE_FACE_PREDICTION, MAX_QUANTIZATION_BITS, MIN_QUANTIZATION_BITS,
};

use crate::error::ConfigError;

/// Codec toggles and the quantization bit depth.
///
/// The whole configuration is recorded in the stream header, so a
/// decompressor never needs it as an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Bits per quantized coordinate axis, 4..=16.
    pub quantization_bits: u8,
    /// Store each layer's residuals at the minimal width for that layer.
    pub adaptive_quantization: bool,
    /// Spread position error over patch corners with a lifting update.
    pub lifting_scheme: bool,
    /// Add a curvature term to the gate-midpoint position prediction.
    pub curvature_prediction: bool,
    /// Code facet symbols with context-predicted prefix codes.
    pub face_prediction: bool,
    /// Code connectivity masks valence-first, eliding forced bits.
    pub edge_prediction: bool,
    /// Omit connectivity masks on layers whose input mesh is all triangles.
    pub triangle_face_prediction: bool,
    /// Permit decimation steps that leave a concave patch.
    pub allow_concave_facets: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quantization_bits: 12,
            adaptive_quantization: false,
            lifting_scheme: true,
            curvature_prediction: true,
            face_prediction: true,
            edge_prediction: true,
            triangle_face_prediction: true,
            allow_concave_facets: true,
        }
    }
}

impl Config {
    /// Check value ranges.
    ///
    /// Adaptive quantization works best without the lifting scheme (the
    /// update term widens residuals); that combination is legal but logged.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_QUANTIZATION_BITS..=MAX_QUANTIZATION_BITS).contains(&self.quantization_bits) {
            return Err(ConfigError::QuantizationBits {
                bits: self.quantization_bits,
            });
        }
        if self.adaptive_quantization && self.lifting_scheme {
            tracing::warn!(
                "adaptive quantization is recommended without the lifting scheme; \
                 residual widths will rarely shrink"
            );
        }
        Ok(())
    }

    /// Pack the toggles into the header flag byte.
    #[must_use]
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.adaptive_quantization {
            flags |= FLAG_ADAPTIVE_QUANTIZATION;
        }
        if self.lifting_scheme {
            flags |= FLAG_LIFTING_SCHEME;
        }
        if self.curvature_prediction {
            flags |= FLAG_CURVATURE_PREDICTION;
        }
        if self.face_prediction {
            flags |= FLAG_FACE_PREDICTION;
        }
        if self.edge_prediction {
            flags |= FLAG_EDGE_PREDICTION;
        }
        if self.triangle_face_prediction {
            flags |= FLAG_TRIANGLE_FACE_PREDICTION;
        }
        if self.allow_concave_facets {
            flags |= FLAG_ALLOW_CONCAVE_FACETS;
        }
        flags
    }

    /// Rebuild a configuration from header fields.
    #[must_use]
    pub fn from_flags(quantization_bits: u8, flags: u8) -> Self {
        Self {
            quantization_bits,
            adaptive_quantization: flags & FLAG_ADAPTIVE_QUANTIZATION != 0,
            lifting_scheme: flags & FLAG_LIFTING_SCHEME != 0,
            curvature_prediction: flags & FLAG_CURVATURE_PREDICTION != 0,
            face_prediction: flags & FLAG_FACE_PREDICTION != 0,
            edge_prediction: flags & FLAG_EDGE_PREDICTION != 0,
            triangle_face_prediction: flags & FLAG_TRIANGLE_FACE_PREDICTION != 0,
            allow_concave_facets: flags & FLAG_ALLOW_CONCAVE_FACETS != 0,
        }
    }
}

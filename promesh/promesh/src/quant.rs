//! Bounding-cube position quantization.
//!
//! Positions are mapped into a cube of `2^bits` cells per axis around the
//! input's bounding box. Dequantization returns cell centers, so the
//! round-trip error is at most half a cell step per axis.

use glam::{DVec3, IVec3};

/// Fixed-point mapping between world positions and quantized cells.
#[derive(Debug, Clone, Copy)]
pub struct Quantizer {
    center: DVec3,
    diagonal: f64,
    bits: u8,
    origin: DVec3,
    step: f64,
}

impl Quantizer {
    /// Fit a quantizer to a point set. Returns `None` for an empty set.
    ///
    /// A degenerate (single-point) set gets a unit cube so the mapping
    /// stays well defined.
    #[must_use]
    pub fn from_points(points: &[DVec3], bits: u8) -> Option<Self> {
        let first = *points.first()?;
        let mut min = first;
        let mut max = first;
        for &p in &points[1..] {
            min = min.min(p);
            max = max.max(p);
        }
        let extent = max - min;
        let mut diagonal = extent.x.max(extent.y).max(extent.z);
        if diagonal <= 0.0 {
            diagonal = 1.0;
        }
        let center = (min + max) * 0.5;
        Some(Self::from_header(center, diagonal, bits))
    }

    /// Rebuild a quantizer from stream header fields.
    #[must_use]
    pub fn from_header(center: DVec3, diagonal: f64, bits: u8) -> Self {
        let cells = f64::from(1u32 << bits);
        let origin = center - DVec3::splat(diagonal * 0.5);
        Self {
            center,
            diagonal,
            bits,
            origin,
            step: diagonal / cells,
        }
    }

    /// Bounding cube center.
    #[must_use]
    pub fn center(&self) -> DVec3 {
        self.center
    }

    /// Bounding cube diagonal (side length of the quantization cube).
    #[must_use]
    pub fn diagonal(&self) -> f64 {
        self.diagonal
    }

    /// Quantization bit depth.
    #[must_use]
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Cells per axis.
    #[must_use]
    pub fn cells(&self) -> i32 {
        1 << self.bits
    }

    /// World step of one cell.
    #[must_use]
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Map a position to its cell, clamping onto the cube.
    #[must_use]
    pub fn quantize(&self, position: DVec3) -> IVec3 {
        let scaled = (position - self.origin) / self.step;
        let top = self.cells() - 1;
        IVec3::new(
            (scaled.x.floor() as i32).clamp(0, top),
            (scaled.y.floor() as i32).clamp(0, top),
            (scaled.z.floor() as i32).clamp(0, top),
        )
    }

    /// Map a cell back to the world position of its center.
    #[must_use]
    pub fn dequantize(&self, cell: IVec3) -> DVec3 {
        self.origin + (cell.as_dvec3() + DVec3::splat(0.5)) * self.step
    }

    /// Whether a cell triple lies inside the cube.
    #[must_use]
    pub fn contains(&self, cell: IVec3) -> bool {
        let cells = self.cells();
        cell.cmpge(IVec3::ZERO).all() && cell.cmplt(IVec3::splat(cells)).all()
    }
}

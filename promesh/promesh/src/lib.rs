//! Progressive polygon mesh compression.
//!
//! A mesh is compressed by repeatedly decimating it: each pass removes an
//! independent set of vertices and records, per region-growing step, the
//! connectivity and position data needed to undo the removal. The passes
//! are stored as layers, so a decompressor can stop after any prefix of
//! the layer sequence and hold a valid intermediate mesh. All geometry is
//! quantized onto an integer cube, which makes the codec deterministic
//! down to the bit.
//!
//! [`Compressor`] and [`Decompressor`] are the entry points; both expose
//! incremental stepping so long meshes never block a caller.
//!
//! ```no_run
//! use promesh::{Compressor, Config, Decompressor};
//! # fn main() -> promesh::Result<()> {
//! # let (positions, faces): (Vec<glam::DVec3>, Vec<Vec<u32>>) = (vec![], vec![]);
//! let bytes = Compressor::new(&positions, &faces, Config::default())?.into_bytes()?;
//! let mut decompressor = Decompressor::new(&bytes, 100.0)?;
//! decompressor.complete()?;
//! let restored = decompressor.positions();
//! # Ok(())
//! # }
//! ```

mod config;
mod conquest;
mod controller;
mod error;
mod predict;
mod quant;

pub use config::Config;
pub use conquest::Phase;
pub use controller::{Completion, Compressor, Decompressor, Step};
pub use error::{ConfigError, Error, Result};
pub use quant::Quantizer;

pub use promesh_mesh::{
    EdgeKind, FacetId, FacetState, HalfEdgeMesh, HalfedgeId, HalfedgeState, MeshError, VertexId,
};
pub use promesh_stream::StreamError;

//! Arena-based half-edge mesh for progressive level-of-detail work.
//!
//! Elements live in arenas addressed by stable `u32` handles; deleting an
//! element tombstones its slot, and slots are only recycled at explicit
//! [`HalfEdgeMesh::reclaim`] points so handles held across a decimation or
//! refinement step stay valid.
//!
//! The two structural operations are exact inverses of each other:
//!
//! - [`HalfEdgeMesh::remove_vertex`] deletes an interior vertex and fuses its
//!   incident facets into a single patch facet.
//! - [`HalfEdgeMesh::insert_vertex`] splits a patch facet into a fan around a
//!   new vertex, connecting it to the corners selected by a mask.
//!
//! Both validate every precondition before mutating anything, so a failed
//! call leaves the mesh untouched.
//!
//! Conventions: `vertex(h)` is the halfedge's *destination*, `next(h)` walks
//! counter-clockwise within a facet, and each vertex stores one *outgoing*
//! halfedge.

mod error;
mod handle;
mod mesh;
mod ops;
mod state;

pub use error::{MeshError, MeshResult};
pub use handle::{FacetId, HalfedgeId, VertexId};
pub use mesh::{FacetCycle, HalfEdgeMesh, VertexCirculator};
pub use state::{EdgeKind, FacetState, HalfedgeState};

//! Mesh construction and mutation errors.

use std::fmt;

use crate::handle::{FacetId, VertexId};

/// Result type for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Errors from building or mutating a half-edge mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    /// A facet referenced a vertex index outside the vertex array.
    IndexOutOfBounds {
        /// The offending index.
        index: u32,
        /// Number of vertices available.
        len: usize,
    },
    /// A facet had fewer than three corners or a repeated corner.
    DegenerateFacet {
        /// Corner count of the offending facet.
        degree: usize,
    },
    /// The same directed edge appeared in more than one facet.
    NonManifoldEdge {
        /// Source vertex index.
        from: u32,
        /// Destination vertex index.
        to: u32,
    },
    /// The mesh has boundary edges where a closed mesh was required.
    OpenMesh {
        /// Number of halfedges without an incident facet.
        boundary_edges: usize,
    },
    /// A vertex did not satisfy the preconditions for removal.
    NotRemovable {
        /// The vertex that was rejected.
        vertex: VertexId,
        /// Which precondition failed.
        detail: String,
    },
    /// A facet split request was inconsistent with the patch.
    InvalidSplit {
        /// The patch facet that was targeted.
        facet: FacetId,
        /// Which precondition failed.
        detail: String,
    },
    /// A structural invariant did not hold.
    InvalidTopology {
        /// Description of the violated invariant.
        detail: String,
    },
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "vertex index {index} out of bounds (len {len})")
            }
            Self::DegenerateFacet { degree } => {
                write!(f, "degenerate facet with degree {degree}")
            }
            Self::NonManifoldEdge { from, to } => {
                write!(f, "directed edge {from}->{to} used by more than one facet")
            }
            Self::OpenMesh { boundary_edges } => {
                write!(f, "mesh is not closed ({boundary_edges} boundary halfedges)")
            }
            Self::NotRemovable { vertex, detail } => {
                write!(f, "vertex {vertex} is not removable: {detail}")
            }
            Self::InvalidSplit { facet, detail } => {
                write!(f, "invalid split of facet {facet}: {detail}")
            }
            Self::InvalidTopology { detail } => {
                write!(f, "invalid topology: {detail}")
            }
        }
    }
}

impl std::error::Error for MeshError {}

//! Vertex removal and insertion.
//!
//! The two operations are exact inverses: removing a vertex fuses its
//! incident facets into one patch, and inserting a vertex into that patch
//! with the same corner mask and position restores the previous
//! connectivity. Every precondition is checked before the first mutation,
//! so a failing call leaves the mesh exactly as it was.

use glam::IVec3;

use crate::error::{MeshError, MeshResult};
use crate::handle::{FacetId, HalfedgeId, VertexId};
use crate::mesh::HalfEdgeMesh;
use crate::state::EdgeKind;

impl HalfEdgeMesh {
    /// Remove an interior vertex and fuse its incident facets into a single
    /// patch facet.
    ///
    /// Requires valence at least 3, an incident facet on every spoke, all
    /// incident facets distinct, and a simple link ring. Returns the patch
    /// facet; deleted elements become tombstones until [`Self::reclaim`].
    pub fn remove_vertex(&mut self, v: VertexId) -> MeshResult<FacetId> {
        if !self.is_vertex_alive(v) {
            return Err(MeshError::NotRemovable {
                vertex: v,
                detail: "vertex is not alive".to_string(),
            });
        }

        // Incoming spokes in rotational order.
        let incoming: Vec<HalfedgeId> = self.vertex_incoming(v).collect();
        let k = incoming.len();
        if k < 3 {
            return Err(MeshError::NotRemovable {
                vertex: v,
                detail: format!("valence {k} is below 3"),
            });
        }

        let mut facets = Vec::with_capacity(k);
        let mut ring = Vec::with_capacity(k);
        let mut outs = Vec::with_capacity(k);
        for &g in &incoming {
            let Some(f) = self.facet(g) else {
                return Err(MeshError::NotRemovable {
                    vertex: v,
                    detail: "vertex lies on a boundary".to_string(),
                });
            };
            if facets.contains(&f) {
                return Err(MeshError::NotRemovable {
                    vertex: v,
                    detail: "incident facets are not distinct".to_string(),
                });
            }
            facets.push(f);
            ring.push(self.origin(g));
            outs.push(self.next(g));
        }
        for i in 0..k {
            for j in (i + 1)..k {
                if ring[i] == ring[j] {
                    return Err(MeshError::NotRemovable {
                        vertex: v,
                        detail: "link ring is not simple".to_string(),
                    });
                }
            }
        }

        // The remainder of facet i's cycle, from next(out_i) up to the
        // halfedge preceding g_i. Nonempty because facet degree >= 3.
        let mut chains: Vec<Vec<HalfedgeId>> = Vec::with_capacity(k);
        for i in 0..k {
            let g = incoming[i];
            let mut chain = Vec::new();
            let mut cursor = self.next(outs[i]);
            while cursor != g {
                chain.push(cursor);
                cursor = self.next(cursor);
                if chain.len() > self.halfedges.len() {
                    return Err(MeshError::InvalidTopology {
                        detail: format!("facet cycle around {v} does not close"),
                    });
                }
            }
            if chain.is_empty() {
                return Err(MeshError::InvalidTopology {
                    detail: format!("facet of degree below 3 around {v}"),
                });
            }
            chains.push(chain);
        }

        // All checks passed; mutate without further failure paths.
        let patch = self.alloc_facet(chains[0][0]);
        for chain in &chains {
            for &h in chain {
                self.halfedges[h.index()].facet = Some(patch);
            }
        }

        // Stitch the chains into one cycle. Chain i+1 flows into chain i so
        // the patch keeps the facets' shared orientation.
        for i in 0..k {
            let donor = &chains[(i + 1) % k];
            let last = donor[donor.len() - 1];
            self.halfedges[last.index()].next = chains[i][0];
        }

        // Ring vertices may have pointed at a deleted spoke; the first
        // halfedge of chain i-1 starts at ring vertex i.
        for i in 0..k {
            let survivor = chains[(i + k - 1) % k][0];
            self.vertices[ring[i].index()].halfedge = survivor;
        }

        for i in 0..k {
            self.kill_halfedge(incoming[i]);
            self.kill_halfedge(outs[i]);
            self.kill_facet(facets[i]);
        }
        self.kill_vertex(v);

        Ok(patch)
    }

    /// Split a patch facet by inserting a new vertex connected to the
    /// corners selected by `connect`.
    ///
    /// `connect[j]` refers to the destination of the `j`-th halfedge of the
    /// patch cycle starting at `gate`; its length must equal the patch
    /// degree and it must select at least 3 corners. New halfedges are
    /// tagged [`EdgeKind::Added`]. Returns the new vertex.
    pub fn insert_vertex(
        &mut self,
        patch: FacetId,
        gate: HalfedgeId,
        connect: &[bool],
        position: IVec3,
    ) -> MeshResult<VertexId> {
        if !self.is_facet_alive(patch) {
            return Err(MeshError::InvalidSplit {
                facet: patch,
                detail: "patch facet is not alive".to_string(),
            });
        }
        if !self.is_halfedge_alive(gate) || self.facet(gate) != Some(patch) {
            return Err(MeshError::InvalidSplit {
                facet: patch,
                detail: "gate halfedge does not border the patch".to_string(),
            });
        }

        let cycle: Vec<HalfedgeId> = self.facet_halfedges_from(gate).collect();
        let degree = cycle.len();
        if connect.len() != degree {
            return Err(MeshError::InvalidSplit {
                facet: patch,
                detail: format!(
                    "mask length {} does not match patch degree {degree}",
                    connect.len()
                ),
            });
        }
        let masked: Vec<usize> = (0..degree).filter(|&j| connect[j]).collect();
        if masked.len() < 3 {
            return Err(MeshError::InvalidSplit {
                facet: patch,
                detail: format!("mask selects {} corners, need at least 3", masked.len()),
            });
        }

        let corners: Vec<VertexId> = cycle.iter().map(|&h| self.destination(h)).collect();

        // All checks passed; mutate without further failure paths.
        let v = self.alloc_vertex(position);

        // One spoke pair per selected corner: corner -> v and v -> corner.
        let spokes: Vec<(HalfedgeId, HalfedgeId)> = masked
            .iter()
            .map(|&j| {
                let inward = self.alloc_halfedge(v, EdgeKind::Added);
                let outward = self.alloc_halfedge(corners[j], EdgeKind::Added);
                self.halfedges[inward.index()].opposite = outward;
                self.halfedges[outward.index()].opposite = inward;
                (inward, outward)
            })
            .collect();

        // Each pair of cyclically consecutive selected corners bounds one
        // new facet: v -> corner(j1) -> ... -> corner(j2) -> v.
        let fans = masked.len();
        for s in 0..fans {
            let j1 = masked[s];
            let j2 = masked[(s + 1) % fans];
            let outward = spokes[s].1;
            let inward = spokes[(s + 1) % fans].0;

            let facet = self.alloc_facet(inward);
            let mut segment = Vec::new();
            let mut t = (j1 + 1) % degree;
            loop {
                segment.push(cycle[t]);
                if t == j2 {
                    break;
                }
                t = (t + 1) % degree;
            }

            self.halfedges[outward.index()].next = segment[0];
            self.halfedges[segment[segment.len() - 1].index()].next = inward;
            self.halfedges[inward.index()].next = outward;
            self.halfedges[inward.index()].facet = Some(facet);
            self.halfedges[outward.index()].facet = Some(facet);
            for &h in &segment {
                self.halfedges[h.index()].facet = Some(facet);
            }
        }

        self.vertices[v.index()].halfedge = spokes[0].1;
        self.kill_facet(patch);

        Ok(v)
    }
}

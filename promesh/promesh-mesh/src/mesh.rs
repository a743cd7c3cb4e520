//! Arena storage, construction, traversal, and validation.

use std::collections::{HashMap, VecDeque};

use glam::IVec3;

use crate::error::{MeshError, MeshResult};
use crate::handle::{FacetId, HalfedgeId, VertexId};
use crate::state::{EdgeKind, FacetState, HalfedgeState};

const INVALID_HALFEDGE: HalfedgeId = HalfedgeId(u32::MAX);

#[derive(Debug, Clone)]
pub(crate) struct Vertex {
    pub position: IVec3,
    /// One outgoing halfedge.
    pub halfedge: HalfedgeId,
    pub conquered: bool,
    pub alive: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct Halfedge {
    /// Destination vertex.
    pub vertex: VertexId,
    pub opposite: HalfedgeId,
    /// Counter-clockwise successor within the facet.
    pub next: HalfedgeId,
    /// `None` on a boundary loop.
    pub facet: Option<FacetId>,
    pub kind: EdgeKind,
    pub state: HalfedgeState,
    pub alive: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct Facet {
    /// One halfedge of the facet cycle.
    pub halfedge: HalfedgeId,
    pub state: FacetState,
    pub alive: bool,
}

/// Half-edge mesh over arena storage with stable handles.
#[derive(Debug, Clone, Default)]
pub struct HalfEdgeMesh {
    pub(crate) vertices: Vec<Vertex>,
    pub(crate) halfedges: Vec<Halfedge>,
    pub(crate) facets: Vec<Facet>,
    free_vertices: Vec<VertexId>,
    free_halfedges: Vec<HalfedgeId>,
    free_facets: Vec<FacetId>,
    pending_vertices: Vec<VertexId>,
    pending_halfedges: Vec<HalfedgeId>,
    pending_facets: Vec<FacetId>,
    normal_queue: VecDeque<HalfedgeId>,
    problematic_queue: VecDeque<HalfedgeId>,
    level: u32,
}

impl HalfEdgeMesh {
    /// Build a mesh from quantized positions and facet corner loops.
    ///
    /// Corner loops are counter-clockwise; every directed edge may appear in
    /// at most one facet. Boundary loops (if any) are linked with
    /// facet-less halfedges so traversal never dangles.
    pub fn from_faces(positions: Vec<IVec3>, faces: &[Vec<u32>]) -> MeshResult<Self> {
        let mut mesh = Self {
            vertices: positions
                .into_iter()
                .map(|position| Vertex {
                    position,
                    halfedge: INVALID_HALFEDGE,
                    conquered: false,
                    alive: true,
                })
                .collect(),
            ..Self::default()
        };
        let vertex_count = mesh.vertices.len();

        let mut edge_map: HashMap<(u32, u32), HalfedgeId> = HashMap::new();
        let mut keys: Vec<(u32, u32)> = Vec::new();

        for corners in faces {
            let degree = corners.len();
            if degree < 3 {
                return Err(MeshError::DegenerateFacet { degree });
            }
            for i in 0..degree {
                if corners[i] as usize >= vertex_count {
                    return Err(MeshError::IndexOutOfBounds {
                        index: corners[i],
                        len: vertex_count,
                    });
                }
                for j in (i + 1)..degree {
                    if corners[i] == corners[j] {
                        return Err(MeshError::DegenerateFacet { degree });
                    }
                }
            }

            let facet = FacetId::new(mesh.facets.len());
            let base = mesh.halfedges.len();
            for (j, &from) in corners.iter().enumerate() {
                let to = corners[(j + 1) % degree];
                let h = HalfedgeId::new(base + j);
                mesh.halfedges.push(Halfedge {
                    vertex: VertexId(to),
                    opposite: INVALID_HALFEDGE,
                    next: HalfedgeId::new(base + (j + 1) % degree),
                    facet: Some(facet),
                    kind: EdgeKind::Original,
                    state: HalfedgeState::Idle,
                    alive: true,
                });
                keys.push((from, to));
                if edge_map.insert((from, to), h).is_some() {
                    return Err(MeshError::NonManifoldEdge { from, to });
                }
                mesh.vertices[from as usize].halfedge = h;
            }
            mesh.facets.push(Facet {
                halfedge: HalfedgeId::new(base),
                state: FacetState::Unprocessed,
                alive: true,
            });
        }

        // Pair opposites; unmatched directed edges get a boundary halfedge.
        let interior = mesh.halfedges.len();
        let mut border_of: HashMap<(u32, u32), HalfedgeId> = HashMap::new();
        for idx in 0..interior {
            let (from, to) = keys[idx];
            if let Some(&opp) = edge_map.get(&(to, from)) {
                mesh.halfedges[idx].opposite = opp;
            } else {
                let border = HalfedgeId::new(mesh.halfedges.len());
                mesh.halfedges.push(Halfedge {
                    vertex: VertexId(from),
                    opposite: HalfedgeId::new(idx),
                    next: INVALID_HALFEDGE,
                    facet: None,
                    kind: EdgeKind::Original,
                    state: HalfedgeState::Idle,
                    alive: true,
                });
                mesh.halfedges[idx].opposite = border;
                border_of.insert((to, from), border);
            }
        }

        // Link boundary loops. A manifold boundary vertex has exactly one
        // outgoing boundary halfedge.
        let mut border_start: HashMap<u32, HalfedgeId> = HashMap::new();
        for (&(from, _to), &h) in &border_of {
            if border_start.insert(from, h).is_some() {
                return Err(MeshError::InvalidTopology {
                    detail: format!("non-manifold boundary at vertex {from}"),
                });
            }
        }
        for (&(_from, to), &h) in &border_of {
            let Some(&next) = border_start.get(&to) else {
                return Err(MeshError::InvalidTopology {
                    detail: format!("boundary loop breaks at vertex {to}"),
                });
            };
            mesh.halfedges[h.index()].next = next;
        }

        for (idx, v) in mesh.vertices.iter().enumerate() {
            if v.halfedge == INVALID_HALFEDGE {
                return Err(MeshError::InvalidTopology {
                    detail: format!("isolated vertex {idx}"),
                });
            }
        }

        Ok(mesh)
    }

    // ------------------------------------------------------------------
    // Counts and liveness

    /// Number of live vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.iter().filter(|v| v.alive).count()
    }

    /// Number of live halfedges.
    #[must_use]
    pub fn halfedge_count(&self) -> usize {
        self.halfedges.iter().filter(|h| h.alive).count()
    }

    /// Number of live facets.
    #[must_use]
    pub fn facet_count(&self) -> usize {
        self.facets.iter().filter(|f| f.alive).count()
    }

    #[must_use]
    pub fn is_vertex_alive(&self, v: VertexId) -> bool {
        self.vertices.get(v.index()).is_some_and(|s| s.alive)
    }

    #[must_use]
    pub fn is_halfedge_alive(&self, h: HalfedgeId) -> bool {
        self.halfedges.get(h.index()).is_some_and(|s| s.alive)
    }

    #[must_use]
    pub fn is_facet_alive(&self, f: FacetId) -> bool {
        self.facets.get(f.index()).is_some_and(|s| s.alive)
    }

    /// Live vertex handles in arena order.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.alive)
            .map(|(i, _)| VertexId::new(i))
    }

    /// Live halfedge handles in arena order.
    pub fn halfedge_ids(&self) -> impl Iterator<Item = HalfedgeId> + '_ {
        self.halfedges
            .iter()
            .enumerate()
            .filter(|(_, h)| h.alive)
            .map(|(i, _)| HalfedgeId::new(i))
    }

    /// Live facet handles in arena order.
    pub fn facet_ids(&self) -> impl Iterator<Item = FacetId> + '_ {
        self.facets
            .iter()
            .enumerate()
            .filter(|(_, f)| f.alive)
            .map(|(i, _)| FacetId::new(i))
    }

    /// Halfedges deleted since the last [`Self::reclaim`], in deletion order.
    pub fn pending_halfedges(&self) -> impl Iterator<Item = HalfedgeId> + '_ {
        self.pending_halfedges.iter().copied()
    }

    // ------------------------------------------------------------------
    // Element accessors

    /// Quantized position of a vertex.
    #[must_use]
    pub fn position(&self, v: VertexId) -> IVec3 {
        self.vertices[v.index()].position
    }

    pub fn set_position(&mut self, v: VertexId, position: IVec3) {
        self.vertices[v.index()].position = position;
    }

    #[must_use]
    pub fn conquered(&self, v: VertexId) -> bool {
        self.vertices[v.index()].conquered
    }

    pub fn set_conquered(&mut self, v: VertexId, conquered: bool) {
        self.vertices[v.index()].conquered = conquered;
    }

    /// One outgoing halfedge of a vertex.
    #[must_use]
    pub fn outgoing(&self, v: VertexId) -> HalfedgeId {
        self.vertices[v.index()].halfedge
    }

    /// Destination vertex of a halfedge.
    #[must_use]
    pub fn destination(&self, h: HalfedgeId) -> VertexId {
        self.halfedges[h.index()].vertex
    }

    /// Source vertex of a halfedge.
    #[must_use]
    pub fn origin(&self, h: HalfedgeId) -> VertexId {
        self.destination(self.opposite(h))
    }

    #[must_use]
    pub fn opposite(&self, h: HalfedgeId) -> HalfedgeId {
        self.halfedges[h.index()].opposite
    }

    #[must_use]
    pub fn next(&self, h: HalfedgeId) -> HalfedgeId {
        self.halfedges[h.index()].next
    }

    /// Incident facet, `None` on a boundary loop.
    #[must_use]
    pub fn facet(&self, h: HalfedgeId) -> Option<FacetId> {
        self.halfedges[h.index()].facet
    }

    #[must_use]
    pub fn edge_kind(&self, h: HalfedgeId) -> EdgeKind {
        self.halfedges[h.index()].kind
    }

    #[must_use]
    pub fn halfedge_state(&self, h: HalfedgeId) -> HalfedgeState {
        self.halfedges[h.index()].state
    }

    pub fn set_halfedge_state(&mut self, h: HalfedgeId, state: HalfedgeState) {
        self.halfedges[h.index()].state = state;
    }

    #[must_use]
    pub fn facet_state(&self, f: FacetId) -> FacetState {
        self.facets[f.index()].state
    }

    pub fn set_facet_state(&mut self, f: FacetId, state: FacetState) {
        self.facets[f.index()].state = state;
    }

    /// One halfedge of a facet's cycle.
    #[must_use]
    pub fn facet_halfedge(&self, f: FacetId) -> HalfedgeId {
        self.facets[f.index()].halfedge
    }

    // ------------------------------------------------------------------
    // Traversal

    /// Halfedges of a facet cycle, starting at the stored representative.
    #[must_use]
    pub fn facet_halfedges(&self, f: FacetId) -> FacetCycle<'_> {
        self.facet_halfedges_from(self.facet_halfedge(f))
    }

    /// Halfedges of a facet cycle, starting at `start`.
    #[must_use]
    pub fn facet_halfedges_from(&self, start: HalfedgeId) -> FacetCycle<'_> {
        FacetCycle {
            mesh: self,
            start,
            current: Some(start),
            remaining: self.halfedges.len(),
        }
    }

    /// Corner count of a facet.
    #[must_use]
    pub fn facet_degree(&self, f: FacetId) -> usize {
        self.facet_halfedges(f).count()
    }

    /// Incoming halfedges around a vertex, in rotational order.
    #[must_use]
    pub fn vertex_incoming(&self, v: VertexId) -> VertexCirculator<'_> {
        let start = self.opposite(self.outgoing(v));
        VertexCirculator {
            mesh: self,
            start,
            current: Some(start),
            remaining: self.halfedges.len(),
        }
    }

    /// Number of edges incident to a vertex.
    #[must_use]
    pub fn vertex_valence(&self, v: VertexId) -> usize {
        self.vertex_incoming(v).count()
    }

    /// Find the live halfedge from `from` to `to`, if one exists.
    #[must_use]
    pub fn find_halfedge(&self, from: VertexId, to: VertexId) -> Option<HalfedgeId> {
        for incoming in self.vertex_incoming(from) {
            let candidate = self.opposite(incoming);
            if self.destination(candidate) == to {
                return Some(candidate);
            }
        }
        None
    }

    /// Whether every live halfedge has an incident facet.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.halfedges.iter().all(|h| !h.alive || h.facet.is_some())
    }

    /// Number of live halfedges without an incident facet.
    #[must_use]
    pub fn boundary_halfedge_count(&self) -> usize {
        self.halfedges
            .iter()
            .filter(|h| h.alive && h.facet.is_none())
            .count()
    }

    /// Whether every live facet is a triangle.
    #[must_use]
    pub fn is_triangle_only(&self) -> bool {
        self.facet_ids().all(|f| self.facet_degree(f) == 3)
    }

    // ------------------------------------------------------------------
    // Conquest queues

    /// Push a halfedge onto the normal queue and tag it.
    pub fn push_normal(&mut self, h: HalfedgeId) {
        self.halfedges[h.index()].state = HalfedgeState::QueuedNormal;
        self.normal_queue.push_back(h);
    }

    /// Push a halfedge onto the problematic queue and tag it.
    pub fn push_problematic(&mut self, h: HalfedgeId) {
        self.halfedges[h.index()].state = HalfedgeState::QueuedProblematic;
        self.problematic_queue.push_back(h);
    }

    pub fn pop_normal(&mut self) -> Option<HalfedgeId> {
        self.normal_queue.pop_front()
    }

    pub fn pop_problematic(&mut self) -> Option<HalfedgeId> {
        self.problematic_queue.pop_front()
    }

    #[must_use]
    pub fn queues_are_empty(&self) -> bool {
        self.normal_queue.is_empty() && self.problematic_queue.is_empty()
    }

    // ------------------------------------------------------------------
    // Level transitions

    /// Current level-of-detail index.
    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn set_level(&mut self, level: u32) {
        self.level = level;
    }

    /// Reset all conquest tags for a fresh pass. Queues must be empty.
    pub fn reset_conquest_tags(&mut self) {
        debug_assert!(self.queues_are_empty());
        for v in &mut self.vertices {
            v.conquered = false;
        }
        for h in &mut self.halfedges {
            if h.alive {
                h.state = HalfedgeState::Idle;
            }
        }
        for f in &mut self.facets {
            if f.alive {
                f.state = FacetState::Unprocessed;
            }
        }
    }

    /// Fold `Added` halfedges into `Original` at a level commit.
    pub fn settle_edge_kinds(&mut self) {
        for h in &mut self.halfedges {
            if h.alive && h.kind == EdgeKind::Added {
                h.kind = EdgeKind::Original;
            }
        }
    }

    /// Recycle tombstoned slots. Call only between steps, when no handles to
    /// deleted elements are held.
    pub fn reclaim(&mut self) {
        self.free_vertices.append(&mut self.pending_vertices);
        self.free_halfedges.append(&mut self.pending_halfedges);
        self.free_facets.append(&mut self.pending_facets);
    }

    // ------------------------------------------------------------------
    // Allocation (crate-internal, used by ops)

    pub(crate) fn alloc_vertex(&mut self, position: IVec3) -> VertexId {
        let slot = Vertex {
            position,
            halfedge: INVALID_HALFEDGE,
            conquered: false,
            alive: true,
        };
        if let Some(v) = self.free_vertices.pop() {
            self.vertices[v.index()] = slot;
            v
        } else {
            let v = VertexId::new(self.vertices.len());
            self.vertices.push(slot);
            v
        }
    }

    pub(crate) fn alloc_halfedge(&mut self, vertex: VertexId, kind: EdgeKind) -> HalfedgeId {
        let slot = Halfedge {
            vertex,
            opposite: INVALID_HALFEDGE,
            next: INVALID_HALFEDGE,
            facet: None,
            kind,
            state: HalfedgeState::Idle,
            alive: true,
        };
        if let Some(h) = self.free_halfedges.pop() {
            self.halfedges[h.index()] = slot;
            h
        } else {
            let h = HalfedgeId::new(self.halfedges.len());
            self.halfedges.push(slot);
            h
        }
    }

    pub(crate) fn alloc_facet(&mut self, halfedge: HalfedgeId) -> FacetId {
        let slot = Facet {
            halfedge,
            state: FacetState::Unprocessed,
            alive: true,
        };
        if let Some(f) = self.free_facets.pop() {
            self.facets[f.index()] = slot;
            f
        } else {
            let f = FacetId::new(self.facets.len());
            self.facets.push(slot);
            f
        }
    }

    pub(crate) fn kill_vertex(&mut self, v: VertexId) {
        self.vertices[v.index()].alive = false;
        self.pending_vertices.push(v);
    }

    pub(crate) fn kill_halfedge(&mut self, h: HalfedgeId) {
        let slot = &mut self.halfedges[h.index()];
        slot.alive = false;
        slot.kind = EdgeKind::PendingRemoval;
        slot.state = HalfedgeState::Idle;
        self.pending_halfedges.push(h);
    }

    pub(crate) fn kill_facet(&mut self, f: FacetId) {
        self.facets[f.index()].alive = false;
        self.pending_facets.push(f);
    }

    // ------------------------------------------------------------------
    // Validation

    /// Check every structural invariant.
    ///
    /// Intended for step boundaries and tests; cost is linear in arena size.
    pub fn validate(&self) -> MeshResult<()> {
        let cap = self.halfedges.len();

        for (idx, h) in self.halfedges.iter().enumerate() {
            if !h.alive {
                continue;
            }
            let id = HalfedgeId::new(idx);
            let opp = h.opposite;
            if opp == INVALID_HALFEDGE || !self.is_halfedge_alive(opp) {
                return Err(MeshError::InvalidTopology {
                    detail: format!("halfedge {id} has a dead opposite"),
                });
            }
            if self.opposite(opp) != id || opp == id {
                return Err(MeshError::InvalidTopology {
                    detail: format!("halfedge {id} opposite link is not an involution"),
                });
            }
            if !self.is_halfedge_alive(h.next) {
                return Err(MeshError::InvalidTopology {
                    detail: format!("halfedge {id} has a dead next"),
                });
            }
            if !self.is_vertex_alive(h.vertex) {
                return Err(MeshError::InvalidTopology {
                    detail: format!("halfedge {id} points at a dead vertex"),
                });
            }
            if self.origin(h.next) != h.vertex {
                return Err(MeshError::InvalidTopology {
                    detail: format!("halfedge {id} next does not continue at its destination"),
                });
            }
            if self.halfedges[h.next.index()].facet != h.facet {
                return Err(MeshError::InvalidTopology {
                    detail: format!("halfedge {id} next crosses a facet border"),
                });
            }
            if let Some(f) = h.facet {
                if !self.is_facet_alive(f) {
                    return Err(MeshError::InvalidTopology {
                        detail: format!("halfedge {id} belongs to a dead facet"),
                    });
                }
            }
        }

        for (idx, f) in self.facets.iter().enumerate() {
            if !f.alive {
                continue;
            }
            let id = FacetId::new(idx);
            if !self.is_halfedge_alive(f.halfedge) {
                return Err(MeshError::InvalidTopology {
                    detail: format!("facet {id} representative halfedge is dead"),
                });
            }
            let mut degree = 0usize;
            let mut cursor = f.halfedge;
            loop {
                if self.halfedges[cursor.index()].facet != Some(id) {
                    return Err(MeshError::InvalidTopology {
                        detail: format!("facet {id} cycle leaves the facet"),
                    });
                }
                degree += 1;
                if degree > cap {
                    return Err(MeshError::InvalidTopology {
                        detail: format!("facet {id} cycle does not close"),
                    });
                }
                cursor = self.next(cursor);
                if cursor == f.halfedge {
                    break;
                }
            }
            if degree < 3 {
                return Err(MeshError::InvalidTopology {
                    detail: format!("facet {id} has degree {degree}"),
                });
            }
        }

        // Every incident halfedge must be reachable by circulating.
        let mut incoming_counts = vec![0usize; self.vertices.len()];
        for h in &self.halfedges {
            if h.alive {
                incoming_counts[h.vertex.index()] += 1;
            }
        }
        for (idx, v) in self.vertices.iter().enumerate() {
            if !v.alive {
                continue;
            }
            let id = VertexId::new(idx);
            if !self.is_halfedge_alive(v.halfedge) {
                return Err(MeshError::InvalidTopology {
                    detail: format!("vertex {id} outgoing halfedge is dead"),
                });
            }
            if self.origin(v.halfedge) != id {
                return Err(MeshError::InvalidTopology {
                    detail: format!("vertex {id} outgoing halfedge does not start there"),
                });
            }
            let reachable = self.vertex_incoming(id).count();
            if reachable != incoming_counts[idx] {
                return Err(MeshError::InvalidTopology {
                    detail: format!(
                        "vertex {id} umbrella is split ({reachable} of {} incident halfedges reachable)",
                        incoming_counts[idx]
                    ),
                });
            }
        }

        // Queue tags must agree with queue membership.
        for &h in self.normal_queue.iter().chain(self.problematic_queue.iter()) {
            if !self.is_halfedge_alive(h) {
                return Err(MeshError::InvalidTopology {
                    detail: format!("queued halfedge {h} is dead"),
                });
            }
        }
        let queued_normal = self
            .halfedges
            .iter()
            .filter(|h| h.alive && h.state == HalfedgeState::QueuedNormal)
            .count();
        let queued_problematic = self
            .halfedges
            .iter()
            .filter(|h| h.alive && h.state == HalfedgeState::QueuedProblematic)
            .count();
        if queued_normal != self.normal_queue.len() || queued_problematic != self.problematic_queue.len()
        {
            return Err(MeshError::InvalidTopology {
                detail: "queue tags disagree with queue contents".to_string(),
            });
        }

        Ok(())
    }
}

/// Iterator over the halfedges of one facet cycle.
pub struct FacetCycle<'a> {
    mesh: &'a HalfEdgeMesh,
    start: HalfedgeId,
    current: Option<HalfedgeId>,
    remaining: usize,
}

impl Iterator for FacetCycle<'_> {
    type Item = HalfedgeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        if self.remaining == 0 {
            self.current = None;
            return None;
        }
        self.remaining -= 1;
        let next = self.mesh.next(current);
        self.current = if next == self.start { None } else { Some(next) };
        Some(current)
    }
}

/// Iterator over the incoming halfedges around one vertex.
pub struct VertexCirculator<'a> {
    mesh: &'a HalfEdgeMesh,
    start: HalfedgeId,
    current: Option<HalfedgeId>,
    remaining: usize,
}

impl Iterator for VertexCirculator<'_> {
    type Item = HalfedgeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        if self.remaining == 0 {
            self.current = None;
            return None;
        }
        self.remaining -= 1;
        let next = self.mesh.opposite(self.mesh.next(current));
        self.current = if next == self.start { None } else { Some(next) };
        Some(current)
    }
}

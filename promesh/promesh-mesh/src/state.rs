//! Per-element tags for one level transition.
//!
//! Each element carries exactly one tag from its enum; the tags are reset at
//! the start of every conquest pass and settled when the pass commits.

/// Structural lifecycle of a halfedge relative to the current level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeKind {
    /// Present before the current level transition started.
    #[default]
    Original,
    /// Created by a vertex insertion during the current transition.
    Added,
    /// Deleted by a vertex removal; the slot is a tombstone until reclaimed.
    PendingRemoval,
}

/// Conquest scheduling state of a halfedge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HalfedgeState {
    /// Not yet touched by the front.
    #[default]
    Idle,
    /// Waiting in the normal FIFO queue.
    QueuedNormal,
    /// Deferred to the problematic FIFO queue.
    QueuedProblematic,
    /// Popped and handled.
    Processed,
}

/// Conquest outcome recorded on a facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacetState {
    /// The front has not reached this facet.
    #[default]
    Unprocessed,
    /// Patch produced by a vertex removal (or, on refinement, a facet
    /// produced by a vertex insertion).
    Splittable,
    /// Conquered without removing a vertex.
    Unsplittable,
}

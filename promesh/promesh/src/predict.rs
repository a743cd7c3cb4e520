//! Position prediction and the lifting update.
//!
//! Everything here runs on both sides of the codec, so the arithmetic must
//! be bit-exact regardless of which side computes it. Predictions read only
//! the patch's own corner geometry: corner positions are canonical (lifting
//! offsets are ledgered, never applied mid-layer) and the patch cycle is
//! walked from the gate, so both sides sum in the same order. Exact integer
//! accumulation keeps facet-representative differences out of the floats.

use glam::{I64Vec3, IVec3};
use promesh_mesh::{HalfEdgeMesh, HalfedgeId};

/// Midpoint of the gate edge, truncating component-wise.
pub(crate) fn gate_midpoint(a: IVec3, b: IVec3) -> IVec3 {
    (a + b) / 2
}

/// Exact Newell normal of an integer polygon; magnitude is twice the area.
pub(crate) fn newell_normal(corners: &[IVec3]) -> I64Vec3 {
    let mut normal = I64Vec3::ZERO;
    for (i, &a) in corners.iter().enumerate() {
        let b = corners[(i + 1) % corners.len()];
        let (a, b) = (a.as_i64vec3(), b.as_i64vec3());
        normal.x += (a.y - b.y) * (a.z + b.z);
        normal.y += (a.z - b.z) * (a.x + b.x);
        normal.z += (a.x - b.x) * (a.y + b.y);
    }
    normal
}

/// Curvature term for the position prediction at `gate`'s patch.
///
/// A removed vertex bulged out of the patch it left behind, and the patch
/// border remembers that as non-planarity. The offset points along the
/// patch's Newell normal, scaled by the mean corner deviation from the
/// patch plane; a planar patch predicts no bulge at all.
pub(crate) fn curvature_offset(mesh: &HalfEdgeMesh, gate: HalfedgeId) -> IVec3 {
    let corners: Vec<IVec3> = mesh
        .facet_halfedges_from(gate)
        .map(|h| mesh.position(mesh.destination(h)))
        .collect();

    let normal = newell_normal(&corners);
    let length = normal.as_dvec3().length();
    if length < 1e-12 {
        return IVec3::ZERO;
    }
    let direction = normal.as_dvec3() / length;

    let mut corner_sum = I64Vec3::ZERO;
    for &c in &corners {
        corner_sum += c.as_i64vec3();
    }
    let centroid = corner_sum.as_dvec3() / corners.len() as f64;

    let mut deviation = 0.0;
    for &c in &corners {
        deviation += (c.as_dvec3() - centroid).dot(direction).abs();
    }
    deviation /= corners.len() as f64;

    let offset = direction * deviation;
    IVec3::new(
        offset.x.round() as i32,
        offset.y.round() as i32,
        offset.z.round() as i32,
    )
}

/// Predicted cell for a vertex inserted at `gate`'s patch.
pub(crate) fn predict_position(
    mesh: &HalfEdgeMesh,
    gate: HalfedgeId,
    curvature: bool,
    cells: i32,
) -> IVec3 {
    let a = mesh.position(mesh.origin(gate));
    let b = mesh.position(mesh.destination(gate));
    let mut predicted = gate_midpoint(a, b);
    if curvature {
        predicted += curvature_offset(mesh, gate);
    }
    predicted.clamp(IVec3::ZERO, IVec3::splat(cells - 1))
}

/// Lifting update distributed to each connected corner, truncating.
pub(crate) fn lifting_offset(residual: IVec3, valence: usize) -> IVec3 {
    residual / (4 * valence as i32)
}

/// Whether an integer polygon is convex with respect to its Newell normal.
///
/// Exact: consecutive edge cross products are tested against the normal in
/// integer arithmetic, so collinear corners count as convex.
pub(crate) fn polygon_is_convex(corners: &[IVec3]) -> bool {
    let normal = newell_normal(corners);
    let n = corners.len();
    for i in 0..n {
        let a = corners[i].as_i64vec3();
        let b = corners[(i + 1) % n].as_i64vec3();
        let c = corners[(i + 2) % n].as_i64vec3();
        let turn = (b - a).cross(c - b);
        let dot = i128::from(turn.x) * i128::from(normal.x)
            + i128::from(turn.y) * i128::from(normal.y)
            + i128::from(turn.z) * i128::from(normal.z);
        if dot < 0 {
            return false;
        }
    }
    true
}

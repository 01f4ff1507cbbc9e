//! Query engine (C11): nearest-polygon lookup, A* pathfinding, straight-path
//! string-pulling, and corridor raycasts over the runtime tile graph.
//!
//! The A* main loop and the funnel algorithm are grounded on the teacher's
//! `query.rs` `find_path`/`perform_string_pulling_on_path`, generalized from
//! its `Vec`-scan node store and sorted-`Vec` open list to the hashed node
//! pool and binary heap of [`crate::node_pool`], and extended with
//! [`find_nearest_poly`] and [`raycast`], neither of which the teacher
//! implements.

use glam::Vec3;

use crate::area::SampleFlags;
use crate::math::{
    closest_height_in_triangle, closest_point_on_segment_2d, distance_squared_2d, triangle_area_2d,
    FUNNEL_EPSILON,
};
use crate::nav_mesh::Poly;
use crate::node_pool::{NodeFlags, NodePool, OpenList};
use crate::runtime::{Link, MeshTile, NavMesh, PolyRef};
use crate::status::Status;

/// Which polygons a query may visit and how a crossing is costed (§3
/// "QueryFilter"). The default passes every flag and costs by plain
/// Euclidean distance, matching the teacher's unweighted `find_path`.
#[derive(Clone, Debug)]
pub struct QueryFilter {
    pub include_flags: SampleFlags,
    pub exclude_flags: SampleFlags,
}

impl Default for QueryFilter {
    fn default() -> Self {
        QueryFilter {
            include_flags: SampleFlags::all(),
            exclude_flags: SampleFlags::empty(),
        }
    }
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn passes(&self, flags: SampleFlags) -> bool {
        !(flags & self.include_flags).is_empty() && (flags & self.exclude_flags).is_empty()
    }

    /// Edge-traversal cost between two world-space points. Area-based cost
    /// multipliers are left for a caller to layer on top by wrapping this
    /// filter; the default is plain distance.
    pub fn cost(&self, from: Vec3, to: Vec3) -> f32 {
        from.distance(to)
    }
}

fn poly_flags(poly: &Poly) -> SampleFlags {
    SampleFlags::from_bits_truncate(poly.flags)
}

fn point_in_poly_xz(point: Vec3, verts: &[Vec3]) -> bool {
    let n = verts.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let vi = verts[i];
        let vj = verts[j];
        if (vi.z > point.z) != (vj.z > point.z)
            && point.x < (vj.x - vi.x) * (point.z - vi.z) / (vj.z - vi.z) + vi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn nearest_edge_point_xz(point: Vec3, verts: &[Vec3]) -> Vec3 {
    let n = verts.len();
    let mut best = verts[0];
    let mut best_d2 = f32::MAX;
    for i in 0..n {
        let a = verts[i];
        let b = verts[(i + 1) % n];
        let c = closest_point_on_segment_2d(point, a, b);
        let d2 = distance_squared_2d(point, c);
        if d2 < best_d2 {
            best_d2 = d2;
            best = c;
        }
    }
    best
}

fn poly_verts(tile: &MeshTile, poly: &Poly) -> Vec<Vec3> {
    let n = poly.vert_count as usize;
    poly.verts[..n].iter().map(|&v| tile.verts[v as usize]).collect()
}

/// Height sampled from `poly_index`'s detail-mesh triangulation at `(x, z)`,
/// or `None` if no detail triangle covers the point (shouldn't happen for a
/// point already known to lie in the base polygon's xz-interior).
fn detail_height(tile: &MeshTile, poly_index: usize, base_verts: &[Vec3], point: Vec3) -> Option<f32> {
    let entry = tile.detail_meshes.get(poly_index)?;
    for t in 0..entry.tri_count as usize {
        let tri = &tile.detail_tris[entry.tri_base as usize + t];
        let vertex_at = |i: usize| -> Vec3 {
            let idx = tri.indices[i] as usize;
            if idx < base_verts.len() {
                base_verts[idx]
            } else {
                tile.detail_verts[entry.vert_base as usize + idx - base_verts.len()]
            }
        };
        let (a, b, c) = (vertex_at(0), vertex_at(1), vertex_at(2));
        if let Some(h) = closest_height_in_triangle(point.into(), a.into(), b.into(), c.into()) {
            return Some(h);
        }
    }
    None
}

/// Closest point to `point` on polygon `poly_index`, and whether that point
/// lies over the polygon's xz-interior (as opposed to clamped to an edge)
/// (§4.10 "closestPointOnPoly"). Off-mesh connections interpolate linearly
/// between their two endpoints instead.
pub fn closest_point_on_poly(tile: &MeshTile, poly_index: usize, poly: &Poly, point: Vec3) -> (Vec3, bool) {
    if poly.is_off_mesh_connection() {
        let a = tile.verts[poly.verts[0] as usize];
        let b = tile.verts[poly.verts[1] as usize];
        let ab = b - a;
        let len2 = ab.length_squared();
        let t = if len2 > 1e-9 {
            ((point - a).dot(ab) / len2).clamp(0.0, 1.0)
        } else {
            0.0
        };
        return (a + ab * t, false);
    }

    let verts = poly_verts(tile, poly);
    if point_in_poly_xz(point, &verts) {
        let height = detail_height(tile, poly_index, &verts, point).unwrap_or(verts[0].y);
        return (Vec3::new(point.x, height, point.z), true);
    }

    (nearest_edge_point_xz(point, &verts), false)
}

/// Boundary clamp used by the ends of a straight path (§4.10
/// "FindStraightPath" step 1): xz-clamps to the polygon boundary but keeps
/// `pos.y` untouched, explicitly ignoring the detail mesh.
fn closest_on_boundary(nav_mesh: &NavMesh, poly_ref: PolyRef, pos: Vec3) -> Vec3 {
    let Some((tile, poly_index)) = nav_mesh.get_tile_and_poly(poly_ref) else {
        return pos;
    };
    let poly = &tile.polys[poly_index];
    if poly.is_off_mesh_connection() {
        return closest_point_on_poly(tile, poly_index, poly, pos).0;
    }
    let verts = poly_verts(tile, poly);
    if point_in_poly_xz(pos, &verts) {
        return pos;
    }
    let edge_point = nearest_edge_point_xz(pos, &verts);
    Vec3::new(edge_point.x, pos.y, edge_point.z)
}

/// `FindNearestPoly` (§4.10): scans every tile touching `center ± extents`
/// via each tile's BV-tree and prefers a polygon whose xz-interior contains
/// `center` within `walkableClimb` over one only close on an edge.
pub fn find_nearest_poly(
    nav_mesh: &NavMesh,
    center: Vec3,
    extents: Vec3,
    filter: &QueryFilter,
) -> (Status, PolyRef, Vec3) {
    if !center.is_finite() || extents.cmplt(Vec3::ZERO).any() {
        return (Status::failure(Status::INVALID_PARAM), PolyRef::NONE, Vec3::ZERO);
    }

    let bmin = center - extents;
    let bmax = center + extents;

    let mut best: Option<(PolyRef, Vec3, f32, bool)> = None;

    for tile_index in nav_mesh.tiles_overlapping_aabb(bmin, bmax) {
        let tile = nav_mesh.tile(tile_index).unwrap();
        for poly_index in nav_mesh.query_polygons_in_tile(tile_index, bmin, bmax) {
            let poly = &tile.polys[poly_index];
            if !filter.passes(poly_flags(poly)) {
                continue;
            }
            let (point, over_poly) = closest_point_on_poly(tile, poly_index, poly, center);
            let dy = (center.y - point.y).abs();
            let qualifies = over_poly && dy <= tile.header.walkable_climb.max(1e-3);
            let d2 = if over_poly {
                (center.x - point.x).powi(2) + (center.z - point.z).powi(2)
            } else {
                center.distance_squared(point)
            };

            let better = match &best {
                None => true,
                Some((_, _, best_d2, best_qualifies)) => match (qualifies, *best_qualifies) {
                    (true, false) => true,
                    (false, true) => false,
                    _ => d2 < *best_d2,
                },
            };
            if better {
                best = Some((nav_mesh.poly_ref(tile_index, poly_index), point, d2, qualifies));
            }
        }
    }

    match best {
        Some((poly_ref, point, _, _)) => (Status::success(), poly_ref, point),
        None => (Status::success(), PolyRef::NONE, Vec3::ZERO),
    }
}

/// The portal segment polygon `from_poly`'s `link` crosses, expressed as the
/// sub-edge `link.bmin/bmax` selects along `from`'s own edge vertices (used
/// while seeding an A* neighbor's position — §4.10 "Edge mid-point").
fn link_portal(from_tile: &MeshTile, from_poly: &Poly, link: &Link) -> (Vec3, Vec3) {
    if from_poly.is_off_mesh_connection() {
        let p = from_tile.verts[from_poly.verts[link.edge as usize] as usize];
        return (p, p);
    }
    let (v0, v1) = from_tile.edge_verts(from_poly, link.edge as usize);
    if link.side != 0xff && (link.bmin, link.bmax) != (0, 255) {
        let tmin = link.bmin as f32 / 255.0;
        let tmax = link.bmax as f32 / 255.0;
        (v0.lerp(v1, tmin), v0.lerp(v1, tmax))
    } else {
        (v0, v1)
    }
}

fn portal_midpoint(from_tile: &MeshTile, from_poly: &Poly, link: &Link) -> Vec3 {
    let (left, right) = link_portal(from_tile, from_poly, link);
    (left + right) * 0.5
}

/// Portal `(left, right)` between consecutive path polygons `from_ref` and
/// `to_ref`, for the straight-path funnel. Per the resolved indexing
/// question, this walks `to_ref`'s own link chain for the back-link to
/// `from_ref` and reads vertices out of `to_ref`'s tile/polygon, not
/// `from_ref`'s.
fn portal_points(nav_mesh: &NavMesh, from_ref: PolyRef, to_ref: PolyRef) -> Option<(Vec3, Vec3)> {
    let (to_tile, to_poly_index) = nav_mesh.get_tile_and_poly(to_ref)?;
    let to_poly = &to_tile.polys[to_poly_index];

    if to_poly.is_off_mesh_connection() {
        for link in to_tile.poly_links(to_poly_index) {
            if link.poly_ref == from_ref {
                let p = to_tile.verts[to_poly.verts[link.edge as usize] as usize];
                return Some((p, p));
            }
        }
        return None;
    }

    for link in to_tile.poly_links(to_poly_index) {
        if link.poly_ref == from_ref {
            let (v0, v1) = to_tile.edge_verts(to_poly, link.edge as usize);
            if link.side != 0xff && (link.bmin, link.bmax) != (0, 255) {
                let tmin = link.bmin as f32 / 255.0;
                let tmax = link.bmax as f32 / 255.0;
                return Some((v0.lerp(v1, tmin), v0.lerp(v1, tmax)));
            }
            return Some((v0, v1));
        }
    }
    None
}

/// Emits an extra [`StraightPathPoint`] at each portal crossed between
/// `path[start_idx]` and `path[end_idx]` that the straight segment
/// `start_pos -> end_pos` actually crosses, per `options`
/// (§4.10 step 6 `AREA_CROSSINGS`/`ALL_CROSSINGS`). Returns `false` once the
/// buffer fills, in which case the caller must stop and return.
#[allow(clippy::too_many_arguments)]
fn append_portals(
    nav_mesh: &NavMesh,
    start_idx: usize,
    end_idx: usize,
    start_pos: Vec3,
    end_pos: Vec3,
    path: &[PolyRef],
    options: StraightPathOptions,
    straight_path: &mut Vec<StraightPathPoint>,
    max_straight_path: usize,
    status: &mut Status,
) -> bool {
    for i in start_idx..end_idx {
        let from_ref = path[i];
        let to_ref = path[i + 1];

        if options.contains(StraightPathOptions::AREA_CROSSINGS) && !options.contains(StraightPathOptions::ALL_CROSSINGS) {
            let from_area = nav_mesh.get_tile_and_poly(from_ref).map(|(t, p)| t.polys[p].area());
            let to_area = nav_mesh.get_tile_and_poly(to_ref).map(|(t, p)| t.polys[p].area());
            if from_area == to_area {
                continue;
            }
        }

        let Some((left, right)) = portal_points(nav_mesh, from_ref, to_ref) else {
            break;
        };

        let Some(t) = segment_edge_t(start_pos, end_pos, left, right) else {
            continue;
        };

        if straight_path.len() >= max_straight_path {
            *status |= Status::BUFFER_TOO_SMALL;
            return false;
        }
        straight_path.push(StraightPathPoint {
            pos: left.lerp(right, t),
            flags: StraightPathFlags::empty(),
            poly_ref: to_ref,
        });
    }
    true
}

fn straight_path_flags(nav_mesh: &NavMesh, poly_ref: PolyRef) -> StraightPathFlags {
    match nav_mesh.get_tile_and_poly(poly_ref) {
        Some((tile, poly_index)) if tile.polys[poly_index].is_off_mesh_connection() => {
            StraightPathFlags::OFFMESH_CONNECTION
        }
        _ => StraightPathFlags::empty(),
    }
}

/// `FindPath` (§4.10): best-first A* over the polygon corridor. `max_path`
/// bounds the returned path length; a path that would exceed it is
/// truncated to its tail (closest to the goal) with `BUFFER_TOO_SMALL` set.
pub fn find_path(
    nav_mesh: &NavMesh,
    start_ref: PolyRef,
    end_ref: PolyRef,
    start_pos: Vec3,
    end_pos: Vec3,
    filter: &QueryFilter,
    max_path: usize,
) -> (Status, Vec<PolyRef>) {
    const H: f32 = 0.999;

    if max_path == 0 || !nav_mesh.is_valid_poly_ref(start_ref) || !nav_mesh.is_valid_poly_ref(end_ref) {
        return (Status::failure(Status::INVALID_PARAM), Vec::new());
    }

    if start_ref == end_ref {
        return (Status::success(), vec![start_ref]);
    }

    let mut pool = NodePool::new(max_path.saturating_mul(4).max(512));
    let mut open = OpenList::new();
    let mut out_of_nodes = false;

    let (start_index, _) = pool.get_or_allocate(start_ref, 0, start_pos).unwrap();
    {
        let node = pool.node_mut(start_index);
        node.cost = 0.0;
        node.total = start_pos.distance(end_pos) * H;
    }
    open.push(&mut pool, start_index);

    let mut last_best_index = start_index;
    let mut last_best_heuristic = start_pos.distance(end_pos) * H;

    while let Some(best_index) = open.pop(&mut pool) {
        pool.node_mut(best_index).flags.insert(NodeFlags::CLOSED);
        let best = *pool.node(best_index);

        let best_heuristic = best.pos.distance(end_pos) * H;
        if best_heuristic < last_best_heuristic {
            last_best_heuristic = best_heuristic;
            last_best_index = best_index;
        }

        if best.poly_ref == end_ref {
            last_best_index = best_index;
            break;
        }

        let Some((tile, poly_index)) = nav_mesh.get_tile_and_poly(best.poly_ref) else {
            continue;
        };
        let poly = &tile.polys[poly_index];
        let parent_ref = best.parent().map(|p| pool.node(p).poly_ref);

        for link in tile.poly_links(poly_index) {
            let neighbor_ref = link.poly_ref;
            if neighbor_ref.is_none() || Some(neighbor_ref) == parent_ref {
                continue;
            }
            let Some((neighbor_tile, neighbor_poly_index)) = nav_mesh.get_tile_and_poly(neighbor_ref) else {
                continue;
            };
            let neighbor_poly = &neighbor_tile.polys[neighbor_poly_index];
            if !filter.passes(poly_flags(neighbor_poly)) {
                continue;
            }

            let cross_side = link.side >> 1;
            let Some((neighbor_index, fresh)) = pool.get_or_allocate(neighbor_ref, cross_side, Vec3::ZERO)
            else {
                out_of_nodes = true;
                continue;
            };

            if fresh {
                pool.node_mut(neighbor_index).pos = portal_midpoint(tile, poly, link);
            }
            let neighbor_pos = pool.node(neighbor_index).pos;

            let is_goal = neighbor_ref == end_ref;
            let goal_segment = if is_goal { neighbor_pos.distance(end_pos) } else { 0.0 };
            let cost = best.cost + filter.cost(best.pos, neighbor_pos) + goal_segment;
            let heuristic = if is_goal { 0.0 } else { neighbor_pos.distance(end_pos) * H };
            let total = cost + heuristic;

            let neighbor_flags = pool.node(neighbor_index).flags;
            let already_visited =
                neighbor_flags.contains(NodeFlags::OPEN) || neighbor_flags.contains(NodeFlags::CLOSED);
            if already_visited && total >= pool.node(neighbor_index).total {
                continue;
            }

            {
                let node = pool.node_mut(neighbor_index);
                node.parent_index = best_index as u32 + 1;
                node.cost = cost;
                node.total = total;
                node.flags.remove(NodeFlags::CLOSED);
            }

            if neighbor_flags.contains(NodeFlags::OPEN) {
                open.modify(&mut pool, neighbor_index);
            } else {
                open.push(&mut pool, neighbor_index);
            }
        }
    }

    let mut path = Vec::new();
    let mut cursor = Some(last_best_index);
    while let Some(index) = cursor {
        path.push(pool.node(index).poly_ref);
        cursor = pool.node(index).parent();
    }
    path.reverse();

    let mut status = Status::success();
    if pool.node(last_best_index).poly_ref != end_ref {
        status |= Status::PARTIAL_RESULT;
    }
    if out_of_nodes {
        status |= Status::OUT_OF_NODES;
    }
    if path.len() > max_path {
        path = path.split_off(path.len() - max_path);
        status |= Status::BUFFER_TOO_SMALL;
    }

    (status, path)
}

bitflags::bitflags! {
    /// Per-vertex flags on a [`StraightPathPoint`] (§4.10 "FindStraightPath").
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct StraightPathFlags: u8 {
        const START = 1 << 0;
        const END = 1 << 1;
        const OFFMESH_CONNECTION = 1 << 2;
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct StraightPathOptions: u8 {
        const AREA_CROSSINGS = 1 << 0;
        const ALL_CROSSINGS = 1 << 1;
    }
}

#[derive(Clone, Copy, Debug)]
pub struct StraightPathPoint {
    pub pos: Vec3,
    pub flags: StraightPathFlags,
    pub poly_ref: PolyRef,
}

/// `FindStraightPath` (§4.10): the funnel string-pulling algorithm over a
/// polygon corridor already found by [`find_path`]. `options` controls
/// whether extra points are inserted at polygon-boundary crossings between
/// the funnel's apex vertices: `AREA_CROSSINGS` only at area changes,
/// `ALL_CROSSINGS` at every crossing (step 6).
pub fn find_straight_path(
    nav_mesh: &NavMesh,
    start_pos: Vec3,
    end_pos: Vec3,
    path: &[PolyRef],
    max_straight_path: usize,
    options: StraightPathOptions,
) -> (Status, Vec<StraightPathPoint>) {
    if path.is_empty() || max_straight_path == 0 {
        return (Status::failure(Status::INVALID_PARAM), Vec::new());
    }

    let closest_start = closest_on_boundary(nav_mesh, path[0], start_pos);
    let closest_end = closest_on_boundary(nav_mesh, *path.last().unwrap(), end_pos);

    let mut straight_path = Vec::new();
    let mut status = Status::success();

    macro_rules! emit {
        ($pos:expr, $flags:expr, $poly_ref:expr) => {{
            if straight_path.len() >= max_straight_path {
                status |= Status::BUFFER_TOO_SMALL;
                return (status, straight_path);
            }
            straight_path.push(StraightPathPoint {
                pos: $pos,
                flags: $flags,
                poly_ref: $poly_ref,
            });
        }};
    }

    macro_rules! append_crossings {
        ($start_idx:expr, $end_idx:expr, $start_pos:expr, $end_pos:expr) => {{
            if options.intersects(StraightPathOptions::AREA_CROSSINGS | StraightPathOptions::ALL_CROSSINGS)
                && !append_portals(
                    nav_mesh,
                    $start_idx,
                    $end_idx,
                    $start_pos,
                    $end_pos,
                    path,
                    options,
                    &mut straight_path,
                    max_straight_path,
                    &mut status,
                )
            {
                return (status, straight_path);
            }
        }};
    }

    emit!(closest_start, StraightPathFlags::START, path[0]);

    if path.len() == 1 {
        emit!(closest_end, StraightPathFlags::END, path[0]);
        return (status, straight_path);
    }

    let mut apex = closest_start;
    let mut portal_left = apex;
    let mut portal_right = apex;
    let mut apex_index = 0usize;
    let mut left_index = 0usize;
    let mut right_index = 0usize;
    let mut left_poly_ref = path[0];
    let mut right_poly_ref = path[0];

    let mut i = 0usize;
    while i < path.len() {
        let (left, right, poly_ref) = if i + 1 < path.len() {
            match portal_points(nav_mesh, path[i], path[i + 1]) {
                Some((l, r)) => (l, r, path[i + 1]),
                None => {
                    i += 1;
                    continue;
                }
            }
        } else {
            (closest_end, closest_end, path[i])
        };

        let mut restarted = false;

        if triangle_area_2d(apex, portal_right, right) <= 0.0 {
            if (apex - portal_right).length_squared() < FUNNEL_EPSILON * FUNNEL_EPSILON
                || triangle_area_2d(apex, portal_left, right) > 0.0
            {
                portal_right = right;
                right_index = i;
                right_poly_ref = poly_ref;
            } else {
                append_crossings!(apex_index, left_index, apex, portal_left);
                emit!(portal_left, straight_path_flags(nav_mesh, left_poly_ref), left_poly_ref);
                apex = portal_left;
                apex_index = left_index;
                portal_left = apex;
                portal_right = apex;
                right_poly_ref = left_poly_ref;
                i = apex_index;
                restarted = true;
            }
        }

        if !restarted && triangle_area_2d(apex, portal_left, left) >= 0.0 {
            if (apex - portal_left).length_squared() < FUNNEL_EPSILON * FUNNEL_EPSILON
                || triangle_area_2d(apex, portal_right, left) < 0.0
            {
                portal_left = left;
                left_index = i;
                left_poly_ref = poly_ref;
            } else {
                append_crossings!(apex_index, right_index, apex, portal_right);
                emit!(portal_right, straight_path_flags(nav_mesh, right_poly_ref), right_poly_ref);
                apex = portal_right;
                apex_index = right_index;
                portal_left = apex;
                portal_right = apex;
                left_poly_ref = right_poly_ref;
                i = apex_index;
            }
        }

        i += 1;
    }

    append_crossings!(apex_index, path.len() - 1, apex, closest_end);
    emit!(closest_end, StraightPathFlags::END, *path.last().unwrap());
    (status, straight_path)
}

/// Parametric `t` along `p0 -> p1` (xz-plane) where it crosses segment
/// `a -> b`, restricted to `t` strictly ahead of `p0` and within `a..b`.
fn segment_edge_t(p0: Vec3, p1: Vec3, a: Vec3, b: Vec3) -> Option<f32> {
    let dx = p1.x - p0.x;
    let dz = p1.z - p0.z;
    let ex = b.x - a.x;
    let ez = b.z - a.z;
    let denom = dx * ez - dz * ex;
    if denom.abs() < 1e-9 {
        return None;
    }
    let apx = a.x - p0.x;
    let apz = a.z - p0.z;
    let t = (apx * ez - apz * ex) / denom;
    let s = (apx * dz - apz * dx) / denom;
    if t > 1e-6 && t <= 1.0 + 1e-6 && (-1e-6..=1.0 + 1e-6).contains(&s) {
        Some(t.clamp(0.0, 1.0))
    } else {
        None
    }
}

#[derive(Clone, Debug)]
pub struct RaycastHit {
    /// Parametric distance, in `[0,1]`, along `startPos..endPos` where a
    /// wall was hit; `+inf` if the segment ended inside a polygon.
    pub t: f32,
    pub hit_normal: Vec3,
    pub path: Vec<PolyRef>,
}

/// `Raycast` (§4.10): walks the polygon corridor along `startPos..endPos`,
/// exiting through whichever edge the segment crosses first, stopping at
/// a wall (an unlinked or filtered-out edge).
pub fn raycast(
    nav_mesh: &NavMesh,
    start_ref: PolyRef,
    start_pos: Vec3,
    end_pos: Vec3,
    filter: &QueryFilter,
) -> (Status, RaycastHit) {
    if !nav_mesh.is_valid_poly_ref(start_ref) {
        return (
            Status::failure(Status::INVALID_PARAM),
            RaycastHit {
                t: 0.0,
                hit_normal: Vec3::ZERO,
                path: Vec::new(),
            },
        );
    }

    let mut hit = RaycastHit {
        t: f32::INFINITY,
        hit_normal: Vec3::ZERO,
        path: vec![start_ref],
    };
    let mut cur_ref = start_ref;
    let mut cur_pos = start_pos;

    // A tile graph has no cycles shorter than its total polygon count; bound
    // the walk generously so a degenerate mesh can't spin forever.
    for _ in 0..4096 {
        let Some((tile, poly_index)) = nav_mesh.get_tile_and_poly(cur_ref) else {
            break;
        };
        let poly = &tile.polys[poly_index];
        if poly.is_off_mesh_connection() {
            break;
        }
        let n = poly.vert_count as usize;

        let mut best_t = f32::INFINITY;
        let mut best_edge = None;
        let mut best_normal = Vec3::ZERO;
        for edge in 0..n {
            let (a, b) = tile.edge_verts(poly, edge);
            if let Some(t) = segment_edge_t(cur_pos, end_pos, a, b) {
                if t < best_t {
                    best_t = t;
                    best_edge = Some(edge);
                    let dir = b - a;
                    best_normal = Vec3::new(dir.z, 0.0, -dir.x).normalize_or_zero();
                }
            }
        }

        let Some(edge) = best_edge else {
            break;
        };

        let mut next_ref = PolyRef::NONE;
        for link in tile.poly_links(poly_index) {
            if link.edge as usize == edge {
                next_ref = link.poly_ref;
                break;
            }
        }

        let next_poly_data = if next_ref.is_none() {
            None
        } else {
            nav_mesh.get_tile_and_poly(next_ref)
        };
        let passable = match &next_poly_data {
            Some((t, i)) => filter.passes(poly_flags(&t.polys[*i])),
            None => false,
        };

        if !passable {
            hit.t = best_t;
            hit.hit_normal = best_normal;
            break;
        }

        hit.path.push(next_ref);
        cur_ref = next_ref;
        cur_pos = cur_pos.lerp(end_pos, best_t);
        if best_t >= 1.0 {
            break;
        }
    }

    (Status::success(), hit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::Area;
    use crate::compact_heightfield::build_open_heightfield_tile;
    use crate::config::BuildSettings;
    use crate::contour::build_contours;
    use crate::detail_mesh::build_detail_mesh;
    use crate::heightfield::{build_heightfield_tile, InputTriangle};
    use crate::mesher::build_poly_mesh;
    use crate::nav_mesh::build_tile_data;
    use crate::regions::build_regions;
    use crate::runtime::NavMeshParams;
    use glam::{UVec2, Vec2, Vec3A};

    fn build_flat_quad_nav_mesh() -> (NavMesh, PolyRef) {
        let settings = BuildSettings::from_agent_and_bounds(
            0.4,
            1.8,
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(20.0, 1.0, 20.0),
        )
        .with_region_area(0, 0);

        let triangles = [
            InputTriangle {
                vertices: [
                    Vec3A::new(0.0, 0.0, 0.0),
                    Vec3A::new(20.0, 0.0, 0.0),
                    Vec3A::new(20.0, 0.0, 20.0),
                ],
                area: Some(Area::GROUND),
            },
            InputTriangle {
                vertices: [
                    Vec3A::new(0.0, 0.0, 0.0),
                    Vec3A::new(20.0, 0.0, 20.0),
                    Vec3A::new(0.0, 0.0, 20.0),
                ],
                area: Some(Area::GROUND),
            },
        ];

        let voxelized = build_heightfield_tile(UVec2::ZERO, &triangles, &settings);
        let mut open_tile = build_open_heightfield_tile(voxelized, &settings);
        crate::compact_heightfield::calculate_distance_field(&mut open_tile);
        build_regions(&mut open_tile, &settings);
        let contours = build_contours(&open_tile, &settings);
        let poly_mesh = build_poly_mesh(&contours, &settings);
        let detail_mesh = build_detail_mesh(&open_tile, &poly_mesh, &settings);
        let tile_data = build_tile_data(UVec2::ZERO, 0, &poly_mesh, &detail_mesh, &settings, &[]);

        let mut nav_mesh = NavMesh::new(NavMeshParams {
            origin: settings.nav_mesh_bmin,
            tile_width: 20.0,
            tile_height: 20.0,
            max_tiles: 4,
            max_polys_per_tile: 256,
        })
        .unwrap();
        let tile_ref = nav_mesh.add_tile(tile_data, None).unwrap();
        let _ = tile_ref;
        let any_poly_ref = nav_mesh.poly_ref(0, 0);
        (nav_mesh, any_poly_ref)
    }

    #[test]
    fn degenerate_path_is_single_ref() {
        let (nav_mesh, start) = build_flat_quad_nav_mesh();
        let filter = QueryFilter::new();
        let (status, path) = find_path(
            &nav_mesh,
            start,
            start,
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            &filter,
            16,
        );
        assert!(status.is_success());
        assert_eq!(path, vec![start]);
    }

    #[test]
    fn find_nearest_poly_rejects_invalid_params() {
        let (nav_mesh, _) = build_flat_quad_nav_mesh();
        let (status, poly_ref, _) = find_nearest_poly(
            &nav_mesh,
            Vec3::new(10.0, 0.0, 10.0),
            Vec3::new(-1.0, 0.0, 0.0),
            &QueryFilter::new(),
        );
        assert!(status.is_failure());
        assert_eq!(status.detail(), Status::INVALID_PARAM);
        assert!(poly_ref.is_none());
    }

    #[test]
    fn find_nearest_poly_returns_none_ref_when_no_overlap() {
        let (nav_mesh, _) = build_flat_quad_nav_mesh();
        let (status, poly_ref, _) = find_nearest_poly(
            &nav_mesh,
            Vec3::new(-50.0, 0.0, -50.0),
            Vec3::splat(1.0),
            &QueryFilter::new(),
        );
        assert!(status.is_success());
        assert!(poly_ref.is_none());
    }

    #[test]
    fn find_nearest_poly_finds_a_polygon_over_the_floor() {
        let (nav_mesh, _) = build_flat_quad_nav_mesh();
        let (status, poly_ref, point) = find_nearest_poly(
            &nav_mesh,
            Vec3::new(10.0, 0.0, 10.0),
            Vec3::splat(2.0),
            &QueryFilter::new(),
        );
        assert!(status.is_success());
        assert!(!poly_ref.is_none());
        assert!(point.y.abs() < 1.0);
    }

    #[test]
    fn straight_path_starts_and_ends_with_markers() {
        let (nav_mesh, start) = build_flat_quad_nav_mesh();
        let path = [start];
        let (status, straight) = find_straight_path(
            &nav_mesh,
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(18.0, 0.0, 18.0),
            &path,
            16,
            StraightPathOptions::empty(),
        );
        assert!(status.is_success());
        assert!(straight.first().unwrap().flags.contains(StraightPathFlags::START));
        assert!(straight.last().unwrap().flags.contains(StraightPathFlags::END));
    }

    #[test]
    fn straight_path_emits_extra_points_on_area_crossing() {
        use crate::builder::{build_tiled_mesh, AreaVolume, InputGeometry};

        let settings = BuildSettings::from_agent_and_bounds(
            0.4,
            1.8,
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(40.0, 1.0, 40.0),
        )
        .with_region_area(0, 0)
        .with_tile_size(100);

        let geometry = InputGeometry {
            vertices: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(40.0, 0.0, 0.0),
                Vec3::new(40.0, 0.0, 40.0),
                Vec3::new(0.0, 0.0, 40.0),
            ],
            indices: vec![[0, 1, 2], [0, 2, 3]],
        };

        // Paint the far half of the plane a different area, so any corridor
        // crossing the middle crosses an area boundary.
        let area_volume = AreaVolume {
            polygon: vec![
                Vec2::new(20.0, 0.0),
                Vec2::new(40.0, 0.0),
                Vec2::new(40.0, 40.0),
                Vec2::new(20.0, 40.0),
            ],
            height_min: -1.0,
            height_max: 1.0,
            area: Area::ROAD,
        };

        let nav_mesh =
            build_tiled_mesh(&geometry, &settings, &[area_volume], &[]).expect("tiled build should succeed");

        let filter = QueryFilter::new();
        let (start_status, start_ref, start_pt) =
            find_nearest_poly(&nav_mesh, Vec3::new(5.0, 0.0, 20.0), Vec3::splat(2.0), &filter);
        let (end_status, end_ref, end_pt) =
            find_nearest_poly(&nav_mesh, Vec3::new(35.0, 0.0, 20.0), Vec3::splat(2.0), &filter);
        assert!(start_status.is_success() && end_status.is_success());
        assert!(!start_ref.is_none() && !end_ref.is_none());

        let (path_status, path) = find_path(&nav_mesh, start_ref, end_ref, start_pt, end_pt, &filter, 32);
        assert!(path_status.is_success());
        assert!(path.len() >= 2, "expected the corridor to cross at least one polygon boundary");

        let (_, without_crossings) =
            find_straight_path(&nav_mesh, start_pt, end_pt, &path, 32, StraightPathOptions::empty());
        let (_, with_crossings) =
            find_straight_path(&nav_mesh, start_pt, end_pt, &path, 32, StraightPathOptions::AREA_CROSSINGS);

        assert!(with_crossings.len() > without_crossings.len());
    }
}

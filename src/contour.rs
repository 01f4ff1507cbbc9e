//! Contour tracing and simplification (C5).
//!
//! Ported near-verbatim from the teacher's own `contour.rs` (the version
//! bundled alongside the rewritten `regions.rs` in the retrieval pack),
//! generalized from `NavMeshSettings`/bevy `UVec4` to this crate's
//! `BuildSettings`/`OpenTile`. Region ids are tagged with the regions
//! module's `BORDER_REG` bit rather than a separate boundary bitmask, so
//! vertex packing here uses a private `MASK_CONTOUR_REGION`/`FLAG_BORDER_VERTEX`
//! pair local to this module.

use std::cmp::Ordering;

use glam::{IVec2, UVec4};

use crate::area::Area;
use crate::compact_heightfield::{get_neighbour_index, OpenSpan, OpenTile};
use crate::config::BuildSettings;
use crate::math::{in_cone, intersect};
use crate::regions::BORDER_REG;

const MASK_CONTOUR_REGION: u32 = 0xffff;
const FLAG_BORDER_VERTEX: u32 = 1 << 16;

#[derive(Default, Clone, Debug)]
pub struct Contour {
    /// `(x, y, z)` in voxel units, `w` packs the bordering region id in its
    /// low 16 bits and [`FLAG_BORDER_VERTEX`] in bit 16.
    pub vertices: Vec<UVec4>,
    pub region: u16,
    pub area: Area,
}

#[derive(Default)]
pub struct ContourSet {
    pub contours: Vec<Contour>,
}

#[derive(Default, Clone)]
struct ContourHole {
    contour: Contour,
    min_x: u32,
    min_z: u32,
    left_most_vertex: u32,
}

#[derive(Default, Clone)]
struct ContourRegion {
    outline: Option<Contour>,
    holes: Vec<ContourHole>,
}

pub fn build_contours(open_tile: &OpenTile, settings: &BuildSettings) -> ContourSet {
    let max_contours = open_tile.max_regions.max(8);
    let mut contour_set = ContourSet {
        contours: Vec::with_capacity(max_contours.into()),
    };
    let tile_side = open_tile.tile_side;

    let mut boundary_flags = vec![0u8; open_tile.span_count];
    for (cell_index, cell) in open_tile.cells.iter().enumerate() {
        for span in cell.spans.iter() {
            let mut res = 0;

            for dir in 0..4 {
                let mut other_region = 0;
                if let Some(span_index) = span.neighbours[dir] {
                    let other_span = open_tile.cells[get_neighbour_index(tile_side, cell_index, dir)]
                        .spans[span_index as usize];
                    other_region = other_span.region;
                }

                if span.region == other_region {
                    res |= 1 << dir;
                }
            }

            boundary_flags[span.tile_index] = res ^ 0b1111;
        }
    }

    let mut vertices = Vec::with_capacity(256);
    let mut simplified_vertices = Vec::with_capacity(64);

    for (cell_index, cell) in open_tile.cells.iter().enumerate() {
        for (span_index, span) in cell.spans.iter().enumerate() {
            if boundary_flags[span.tile_index] == 0 || boundary_flags[span.tile_index] == 0b1111 {
                boundary_flags[span.tile_index] = 0;
                continue;
            }
            if span.region == 0 {
                continue;
            }
            let Some(area) = open_tile.span_area(span.tile_index) else {
                continue;
            };

            vertices.clear();
            simplified_vertices.clear();

            walk_contour(
                cell_index,
                span_index,
                open_tile,
                &mut boundary_flags,
                &mut vertices,
            );

            let max_edge_len_cells = if settings.cell_size > 0.0 {
                (settings.edge_max_len / settings.cell_size) as u16
            } else {
                0
            };

            simplify_contour(
                &vertices,
                &mut simplified_vertices,
                settings.edge_max_error,
                max_edge_len_cells,
            );

            remove_degenerate_segments(&mut simplified_vertices);

            if simplified_vertices.len() >= 3 {
                contour_set.contours.push(Contour {
                    vertices: simplified_vertices.clone(),
                    region: span.region,
                    area,
                });
            }
        }
    }

    if !contour_set.contours.is_empty() {
        #[derive(Clone, Copy)]
        enum Winding {
            Outline,
            Hole,
        }

        let mut winding = vec![Winding::Hole; contour_set.contours.len()];
        let mut num_holes = 0;
        for (i, contour) in contour_set.contours.iter().enumerate() {
            if calc_area_of_polygon_2d(&contour.vertices) < 0 {
                num_holes += 1;
                winding[i] = Winding::Hole;
            } else {
                winding[i] = Winding::Outline;
            }
        }

        if num_holes > 0 {
            // Border regions (`BORDER_REG`) never reach here as exportable
            // outlines, but they can still bound a hole numerically, so size
            // the lookup table by the raw id range rather than filtering them.
            let num_regions = (open_tile.max_regions as u32 + 1).max(
                contour_set
                    .contours
                    .iter()
                    .map(|c| u32::from(c.region & !BORDER_REG) + 1)
                    .max()
                    .unwrap_or(1),
            );
            let mut regions = vec![ContourRegion::default(); num_regions as usize];

            for (contour, winding) in contour_set.contours.iter().zip(winding) {
                let slot = (contour.region & !BORDER_REG) as usize;
                match winding {
                    Winding::Outline => {
                        regions[slot].outline = Some(contour.clone());
                    }
                    Winding::Hole => {
                        regions[slot].holes.push(ContourHole {
                            contour: contour.clone(),
                            min_x: contour.vertices[0].x,
                            min_z: contour.vertices[0].z,
                            left_most_vertex: 0,
                        });
                    }
                }
            }

            for region in regions
                .iter_mut()
                .filter(|region| !region.holes.is_empty() && region.outline.is_some())
            {
                merge_region_holes(region);
            }

            // Overwrite outline contours in-place with their merged form.
            let mut merged_by_region = std::collections::HashMap::new();
            for region in regions.into_iter() {
                if let Some(outline) = region.outline {
                    merged_by_region.insert(outline.region, outline);
                }
            }
            for contour in contour_set.contours.iter_mut() {
                if let Some(merged) = merged_by_region.remove(&contour.region) {
                    *contour = merged;
                }
            }
            contour_set
                .contours
                .retain(|c| calc_area_of_polygon_2d(&c.vertices) >= 0);
        }
    }

    contour_set
}

#[derive(Default, Clone, Copy)]
struct PotentialDiagonal {
    vertex: u32,
    distance: u32,
}

fn merge_region_holes(region: &mut ContourRegion) {
    for hole in region.holes.iter_mut() {
        for (i, vertex) in hole.contour.vertices.iter().enumerate() {
            if vertex.x < hole.min_x || (vertex.x == hole.min_x && vertex.z < hole.min_z) {
                hole.min_x = vertex.x;
                hole.min_z = vertex.z;
                hole.left_most_vertex = i as u32;
            }
        }
    }

    region.holes.sort_by(|a, b| match a.min_x.cmp(&b.min_x) {
        Ordering::Equal => a.min_z.cmp(&b.min_z),
        other => other,
    });

    let max_vertices = region
        .outline
        .as_ref()
        .map_or(0, |outline| outline.vertices.len())
        + region
            .holes
            .iter()
            .fold(0, |value, hole| value + hole.contour.vertices.len());

    let mut diagonals = Vec::with_capacity(max_vertices);
    let outline = region.outline.as_mut().unwrap();

    for (hole_i, hole) in region.holes.iter().enumerate() {
        let mut index = None;
        let mut best_vertex = hole.left_most_vertex;

        for _ in 0..hole.contour.vertices.len() {
            diagonals.clear();
            let corner_vertex = hole.contour.vertices[best_vertex as usize];
            let outline_ivec: Vec<_> = outline.vertices.iter().map(|v| v.as_ivec4()).collect();
            for i in 0..outline.vertices.len() {
                if in_cone(i, &outline_ivec, corner_vertex.as_ivec4()) {
                    let delta_x = outline.vertices[i].x.abs_diff(corner_vertex.x);
                    let delta_z = outline.vertices[i].z.abs_diff(corner_vertex.z);
                    let distance = delta_x * delta_x + delta_z * delta_z;
                    diagonals.push(PotentialDiagonal {
                        vertex: i as u32,
                        distance,
                    });
                }
            }

            diagonals.sort_by(|a, b| a.distance.cmp(&b.distance));

            index = None;
            for potential_diagonal in diagonals.iter() {
                let vertex = outline.vertices[potential_diagonal.vertex as usize];
                let mut intersects = intersect_segment_contour(
                    vertex,
                    corner_vertex,
                    potential_diagonal.vertex as usize,
                    &outline.vertices,
                );

                for other_hole in region.holes.iter().skip(hole_i) {
                    intersects |=
                        intersect_segment_contour_no_vertex(vertex, corner_vertex, &other_hole.contour.vertices);
                    if intersects {
                        break;
                    }
                }

                if !intersects {
                    index = Some(potential_diagonal.vertex);
                    break;
                }
            }

            if index.is_some() {
                break;
            }

            best_vertex = (best_vertex + 1) % hole.contour.vertices.len() as u32;
        }

        let Some(index) = index else {
            continue;
        };

        merge_contours(outline, &hole.contour, index as usize, best_vertex as usize);
    }
}

fn merge_contours(target: &mut Contour, source: &Contour, index_a: usize, index_b: usize) {
    let mut vertices = Vec::with_capacity(target.vertices.len() + source.vertices.len());

    for i in 0..target.vertices.len() {
        vertices.push(target.vertices[(index_a + i) % target.vertices.len()]);
    }
    for i in 0..source.vertices.len() {
        vertices.push(source.vertices[(index_b + i) % source.vertices.len()]);
    }

    target.vertices = vertices;
}

fn calc_area_of_polygon_2d(vertices: &[UVec4]) -> i32 {
    let mut area = 0;
    for i in 0..vertices.len() {
        let previous = vertices[i].as_ivec4();
        let next = vertices[(i + 1) % vertices.len()].as_ivec4();
        area += next.x * previous.z - previous.x * next.z;
    }
    (area + 1) / 2
}

fn intersect_segment_contour(point: UVec4, corner: UVec4, diagonal_vertex: usize, outline_vertices: &[UVec4]) -> bool {
    for i in 0..outline_vertices.len() {
        let next = (i + 1) % outline_vertices.len();
        if i == diagonal_vertex || next == diagonal_vertex {
            continue;
        }

        let point_i = outline_vertices[i];
        let point_next = outline_vertices[next];

        if (point.x == point_i.x && point.z == point_i.z)
            || (point_next.x == point_i.x && point_next.z == point_i.z)
            || (point_next.x == point.x && point_next.z == point.z)
        {
            continue;
        }

        if intersect(point.as_ivec4(), corner.as_ivec4(), point_i.as_ivec4(), point_next.as_ivec4()) {
            return true;
        }
    }
    false
}

fn intersect_segment_contour_no_vertex(point: UVec4, corner: UVec4, outline_vertices: &[UVec4]) -> bool {
    for i in 0..outline_vertices.len() {
        let next = (i + 1) % outline_vertices.len();
        let point_i = outline_vertices[i];
        let point_next = outline_vertices[next];

        if (point.x == point_i.x && point.z == point_i.z)
            || (point_next.x == point_i.x && point_next.z == point_i.z)
            || (point_next.x == point.x && point_next.z == point.z)
        {
            continue;
        }

        if intersect(point.as_ivec4(), corner.as_ivec4(), point_i.as_ivec4(), point_next.as_ivec4()) {
            return true;
        }
    }
    false
}

fn walk_contour(
    mut cell_index: usize,
    mut span_index: usize,
    tile: &OpenTile,
    boundary_flags: &mut [u8],
    contour: &mut Vec<u32>,
) {
    let mut dir = 0u8;
    while (boundary_flags[tile.cells[cell_index].spans[span_index].tile_index] & (1 << dir)) == 0 {
        dir += 1;
    }
    let start_direction = dir;
    let start_cell = cell_index;
    let start_span = span_index;
    let tile_side = tile.tile_side;

    loop {
        let row = cell_index / tile_side;
        let column = cell_index % tile_side;

        let span = tile.cells[cell_index].spans[span_index];
        if boundary_flags[span.tile_index] & (1 << dir) > 0 {
            let height = get_corner_height(cell_index, &span, tile, dir);

            let mut bordering_region = 0u32;
            if let Some(other_span_index) = span.neighbours[dir as usize] {
                let other_span = tile.cells[get_neighbour_index(tile_side, cell_index, dir.into())]
                    .spans[other_span_index as usize];
                bordering_region = other_span.region.into();
            }

            let px = match dir {
                1 | 2 => column + 1,
                _ => column,
            } as u32;
            let py = height as u32;
            let pz = match dir {
                0 | 1 => row + 1,
                _ => row,
            } as u32;
            contour.extend_from_slice(&[px, py, pz, bordering_region]);

            boundary_flags[span.tile_index] &= !(1 << dir);
            dir = (dir + 1) & 0x3;
        } else {
            let Some(index) = span.neighbours[dir as usize] else {
                panic!("incorrectly flagged boundary, this should not happen");
            };
            span_index = index.into();
            cell_index = get_neighbour_index(tile_side, cell_index, dir.into());
            dir = (dir + 3) & 0x3;
        }

        if start_cell == cell_index && start_span == span_index && start_direction == dir {
            break;
        }
    }
}

fn get_corner_height(cell_index: usize, span: &OpenSpan, tile: &OpenTile, dir: u8) -> u16 {
    let tile_side = tile.tile_side;
    let next_dir = (dir + 1) & 0x3;
    let mut height = span.min;

    if let Some(span_index) = span.neighbours[dir as usize] {
        let other_cell_index = get_neighbour_index(tile_side, cell_index, dir.into());
        let other_span = tile.cells[other_cell_index].spans[span_index as usize];
        height = height.max(other_span.min);

        if let Some(span_index) = other_span.neighbours[next_dir as usize] {
            let other_cell_index = get_neighbour_index(tile_side, other_cell_index, next_dir.into());
            let other_span = tile.cells[other_cell_index].spans[span_index as usize];
            height = height.max(other_span.min);
        }
    }

    if let Some(span_index) = span.neighbours[next_dir as usize] {
        let other_cell_index = get_neighbour_index(tile_side, cell_index, next_dir.into());
        let other_span = tile.cells[other_cell_index].spans[span_index as usize];
        height = height.max(other_span.min);

        if let Some(span_index) = other_span.neighbours[dir as usize] {
            let other_cell_index = get_neighbour_index(tile_side, other_cell_index, dir.into());
            let other_span = tile.cells[other_cell_index].spans[span_index as usize];
            height = height.max(other_span.min);
        }
    }

    height
}

fn simplify_contour(points: &[u32], simplified: &mut Vec<UVec4>, max_error: f32, max_edge_len: u16) {
    let has_connections = {
        let mut has_connections = false;
        let mut i = 0;
        while i < points.len() {
            if (points[i + 3] & MASK_CONTOUR_REGION) != 0 {
                has_connections = true;
                break;
            }
            i += 4;
        }
        has_connections
    };

    if has_connections {
        let length = points.len() / 4;
        for i in 0..length {
            let next = ((i + 1) % length) * 4;
            let i_pre_mul = i * 4;

            let regions_differ =
                (points[i_pre_mul + 3] & MASK_CONTOUR_REGION) != (points[next + 3] & MASK_CONTOUR_REGION);
            if regions_differ {
                simplified.push(UVec4 {
                    x: points[i_pre_mul],
                    y: points[i_pre_mul + 1],
                    z: points[i_pre_mul + 2],
                    w: i as u32,
                });
            }
        }
    } else {
        let mut lower_left = (points[0], points[1], points[2], 0u32);
        let mut upper_right = (points[0], points[1], points[2], 0u32);

        let length = points.len() / 4;
        for i in 0..length {
            let i_pre_mul = i * 4;
            let (x, y, z) = (points[i_pre_mul], points[i_pre_mul + 1], points[i_pre_mul + 2]);
            if x < lower_left.0 || (x == lower_left.0 && z < lower_left.2) {
                lower_left = (x, y, z, i as u32);
            }
            if x > upper_right.0 || (x == upper_right.0 && z > upper_right.2) {
                upper_right = (x, y, z, i as u32);
            }
        }

        simplified.push(UVec4::new(lower_left.0, lower_left.1, lower_left.2, lower_left.3));
        simplified.push(UVec4::new(upper_right.0, upper_right.1, upper_right.2, upper_right.3));
    }

    let point_count = points.len() / 4;
    let mut i = 0;
    while i < simplified.len() {
        let next = (i + 1) % simplified.len();

        let mut a = simplified[i];
        let mut b = simplified[next];

        let (mut c_i, c_increments, end_i) = if b.x > a.x || (b.x == a.x && b.z > a.z) {
            let c_increments = 1;
            let c_i = (a.w + c_increments) % point_count as u32;
            (c_i, c_increments, b.w)
        } else {
            let c_increments = (point_count - 1) as u32;
            let c_i = (b.w + c_increments) % point_count as u32;
            let end_i = a.w;
            std::mem::swap(&mut a.x, &mut b.x);
            std::mem::swap(&mut a.z, &mut b.z);
            (c_i, c_increments, end_i)
        };

        let mut max_deviation = 0.0;
        let mut max_i = None;

        if (points[(c_i * 4 + 3) as usize] & MASK_CONTOUR_REGION) == 0 {
            while c_i != end_i {
                let deviation = point_distance_from_segment(
                    IVec2::new(points[(c_i * 4) as usize] as i32, points[(c_i * 4 + 2) as usize] as i32),
                    IVec2::new(a.x as i32, a.z as i32),
                    IVec2::new(b.x as i32, b.z as i32),
                );
                if deviation > max_deviation {
                    max_deviation = deviation;
                    max_i = Some(c_i);
                }
                c_i = (c_i + c_increments) % point_count as u32;
            }
        }

        match (max_i, max_deviation > (max_error * max_error)) {
            (Some(max_i), true) => {
                simplified.insert(
                    i + 1,
                    UVec4 {
                        x: points[(max_i * 4) as usize],
                        y: points[(max_i * 4 + 1) as usize],
                        z: points[(max_i * 4 + 2) as usize],
                        w: max_i,
                    },
                );
            }
            _ => i += 1,
        }
    }

    // Split long edges.
    {
        let mut i = 0;
        while i < simplified.len() {
            let a = simplified[i];
            let b = simplified[(i + 1) % simplified.len()];

            let next_original_point_index = (a.w + 1) as usize % point_count;
            let should_tessellate = points[next_original_point_index * 4 + 3] & MASK_CONTOUR_REGION == 0;

            let mut max_i = None;
            if should_tessellate {
                let delta_x = b.x.abs_diff(a.x);
                let delta_z = b.z.abs_diff(a.z);

                if delta_x * delta_x + delta_z * delta_z > max_edge_len as u32 * max_edge_len as u32 {
                    let n = if b.w < a.w {
                        b.w as isize + point_count as isize - a.w as isize
                    } else {
                        b.w as isize - a.w as isize
                    };

                    if n > 1 {
                        max_i = if b.x > a.x || (b.x == a.x && b.z > a.z) {
                            Some((a.w as usize + (n / 2) as usize) % point_count)
                        } else {
                            Some((a.w as usize + ((n + 1) / 2) as usize) % point_count)
                        };
                    }
                }
            }

            if let Some(max_i) = max_i {
                simplified.insert(
                    i + 1,
                    UVec4::new(points[max_i * 4], points[max_i * 4 + 1], points[max_i * 4 + 2], max_i as u32),
                );
            } else {
                i += 1;
            }
        }
    }

    for point in simplified.iter_mut() {
        let next = (point.w + 1) % point_count as u32;
        let current = point.w;
        point.w = (points[(next * 4 + 3) as usize] & MASK_CONTOUR_REGION)
            | (points[(current * 4 + 3) as usize] & FLAG_BORDER_VERTEX);
    }
}

fn point_distance_from_segment(point: IVec2, seg_a: IVec2, seg_b: IVec2) -> f32 {
    let segment_delta = (seg_b - seg_a).as_vec2();
    let point_delta = (point - seg_a).as_vec2();

    let d = segment_delta.x * segment_delta.x + segment_delta.y * segment_delta.y;
    let mut t = segment_delta.x * point_delta.x + segment_delta.y * point_delta.y;
    if d > 0.0 {
        t /= d;
    }
    t = t.clamp(0.0, 1.0);

    let delta_x = seg_a.x as f32 + t * segment_delta.x - point.x as f32;
    let delta_y = seg_a.y as f32 + t * segment_delta.y - point.y as f32;

    delta_x * delta_x + delta_y * delta_y
}

fn remove_degenerate_segments(simplified: &mut Vec<UVec4>) {
    let mut i = 0;
    while i < simplified.len() {
        let next = (i + 1) % simplified.len();
        let a = simplified[i];
        let b = simplified[next];

        if a.x == b.x && a.z == b.z {
            simplified.remove(i);
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compact_heightfield::build_open_heightfield_tile;
    use crate::heightfield::{build_heightfield_tile, InputTriangle};
    use crate::regions::build_regions;
    use glam::{UVec2, Vec3, Vec3A};

    #[test]
    fn flat_floor_produces_one_outer_contour() {
        let settings = BuildSettings::from_agent_and_bounds(0.4, 1.8, Vec3::ZERO, Vec3::splat(20.0))
            .with_region_area(0, 0);
        let tri_a = InputTriangle {
            vertices: [
                Vec3A::new(0.0, 1.0, 0.0),
                Vec3A::new(10.0, 1.0, 0.0),
                Vec3A::new(0.0, 1.0, 10.0),
            ],
            area: Some(Area::GROUND),
        };
        let tri_b = InputTriangle {
            vertices: [
                Vec3A::new(10.0, 1.0, 0.0),
                Vec3A::new(10.0, 1.0, 10.0),
                Vec3A::new(0.0, 1.0, 10.0),
            ],
            area: Some(Area::GROUND),
        };
        let voxelized = build_heightfield_tile(UVec2::ZERO, &[tri_a, tri_b], &settings);
        let mut open = build_open_heightfield_tile(voxelized, &settings);
        crate::compact_heightfield::calculate_distance_field(&mut open);
        build_regions(&mut open, &settings);

        let contours = build_contours(&open, &settings);
        assert!(!contours.contours.is_empty());
        for contour in &contours.contours {
            assert!(contour.vertices.len() >= 3);
        }
    }
}

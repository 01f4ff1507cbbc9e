//! Solid heightfield rasterization and filters (C2).
//!
//! Adapted from the teacher's `heightfields.rs`: the column/row polygon
//! clipping (`divide_polygon`) and the per-cell span merge rule in
//! `process_triangle` are kept close to their original shape, generalized
//! from a collider/`Transform`-driven input to a plain triangle soup supplied
//! by the build orchestrator (C12). The teacher has no equivalent of the
//! three solid-heightfield filters spec §4.1 requires
//! (`filter_low_hanging_walkable_obstacles`, `filter_ledge_spans`,
//! `filter_walkable_low_height_spans`); they're built directly from the
//! spec's description and run, in that order, at the end of
//! `build_heightfield_tile`.

use std::cmp::Ordering;
use std::ops::Div;

use glam::{IVec3, UVec2, Vec3A};
use smallvec::SmallVec;

use crate::area::Area;
use crate::config::BuildSettings;

#[derive(Default, Clone, Debug)]
struct HeightSpan {
    min: u16,
    max: u16,
    traversable: bool,
    area: Option<Area>,
}

#[derive(Default, Clone)]
struct VoxelCell {
    spans: SmallVec<[HeightSpan; 2]>, // Bottom to top.
}

/// Solid heightfield for a single tile (or the whole solo mesh).
#[derive(Default)]
pub struct VoxelizedTile {
    cells: Box<[VoxelCell]>, // len = tile_side^2, laid out x then z.
}

/// A triangle fed into rasterization, with its externally-supplied area id
/// (e.g. a "water" or "door" override) and position already in tile-local
/// space with the tile-with-border origin subtracted out.
pub struct InputTriangle {
    pub vertices: [Vec3A; 3],
    pub area: Option<Area>,
}

pub fn build_heightfield_tile(
    tile_coord: UVec2,
    triangles: &[InputTriangle],
    settings: &BuildSettings,
) -> VoxelizedTile {
    let tile_side = settings.tile_side_with_border();
    let mut voxel_tile = VoxelizedTile {
        cells: vec![VoxelCell::default(); tile_side.pow(2)].into_boxed_slice(),
    };

    let tile_max_bound = IVec3::new((tile_side - 1) as i32, 0, (tile_side - 1) as i32);

    for triangle in triangles {
        let [a, b, c] = triangle.vertices;
        process_triangle(
            a,
            b,
            c,
            settings,
            tile_max_bound,
            tile_side,
            &mut voxel_tile.cells,
            triangle.area,
        );
    }

    filter_low_hanging_walkable_obstacles(&mut voxel_tile, settings);
    filter_ledge_spans(&mut voxel_tile, tile_side, settings);
    filter_walkable_low_height_spans(&mut voxel_tile, settings);

    let _ = tile_coord;
    voxel_tile
}

/// A non-walkable span whose top sits within `walkable_climb` of the
/// previous walkable span's top inherits that span's walkability and area
/// (§4.1 "low-hanging walkable obstacles"): a step, curb or low ledge an
/// agent can just climb onto shouldn't block the column above it.
fn filter_low_hanging_walkable_obstacles(tile: &mut VoxelizedTile, settings: &BuildSettings) {
    let walkable_climb = settings.walkable_climb();

    for cell in tile.cells.iter_mut() {
        let mut previous_walkable = false;
        let mut previous_area = None;
        let mut previous_max = 0u16;

        for span in cell.spans.iter_mut() {
            let walkable = span.traversable;
            if !walkable && previous_walkable && span.max.abs_diff(previous_max) <= walkable_climb {
                span.traversable = true;
                span.area = previous_area;
            }

            previous_walkable = span.traversable;
            previous_area = span.area;
            previous_max = span.max;
        }
    }
}

/// Four-neighbour offsets in the same x/z grid `process_triangle` indexes
/// with (`index = x + z * tile_side`), matching the direction numbering
/// `compact_heightfield.rs`'s `get_neighbour_index` uses for open spans.
fn dir_offset(dir: usize) -> (i32, i32) {
    match dir {
        0 => (-1, 0),
        1 => (0, 1),
        2 => (1, 0),
        _ => (0, -1),
    }
}

const UNBOUNDED_HEIGHT: i32 = i32::MAX;

/// Marks a walkable span as a ledge (unwalkable) if, on every side, the best
/// reachable neighbour floor is more than `walkable_climb` below this span's
/// floor — an agent standing here has nowhere to step down onto within a
/// single climb (§4.1 "ledge spans").
fn filter_ledge_spans(tile: &mut VoxelizedTile, tile_side: usize, settings: &BuildSettings) {
    let walkable_height = i32::from(settings.walkable_height());
    let walkable_climb = i32::from(settings.walkable_climb());
    let side = tile_side as i32;

    for z in 0..side {
        for x in 0..side {
            let index = (x + z * side) as usize;
            let span_count = tile.cells[index].spans.len();

            for span_i in 0..span_count {
                if !tile.cells[index].spans[span_i].traversable {
                    continue;
                }

                let bot = i32::from(tile.cells[index].spans[span_i].max);
                let top = tile.cells[index]
                    .spans
                    .get(span_i + 1)
                    .map(|s| i32::from(s.min))
                    .unwrap_or(UNBOUNDED_HEIGHT);

                let mut min_neighbor_floor_diff = UNBOUNDED_HEIGHT;

                for dir in 0..4 {
                    let (dx, dz) = dir_offset(dir);
                    let nx = x + dx;
                    let nz = z + dz;

                    if nx < 0 || nz < 0 || nx >= side || nz >= side {
                        min_neighbor_floor_diff = min_neighbor_floor_diff.min(-walkable_climb - bot);
                        continue;
                    }

                    let neighbor_spans = &tile.cells[(nx + nz * side) as usize].spans;
                    if neighbor_spans.is_empty() {
                        min_neighbor_floor_diff = min_neighbor_floor_diff.min(-walkable_climb - bot);
                        continue;
                    }

                    for (n_i, n_span) in neighbor_spans.iter().enumerate() {
                        let n_bot = i32::from(n_span.max);
                        let n_top = neighbor_spans
                            .get(n_i + 1)
                            .map(|s| i32::from(s.min))
                            .unwrap_or(UNBOUNDED_HEIGHT);

                        if top.min(n_top) - bot.max(n_bot) > walkable_height {
                            min_neighbor_floor_diff = min_neighbor_floor_diff.min(n_bot - bot);
                        }
                    }
                }

                if min_neighbor_floor_diff < -walkable_climb {
                    tile.cells[index].spans[span_i].traversable = false;
                }
            }
        }
    }
}

/// Removes walkability from spans with less than `walkable_height` of
/// headroom to the span above them (§4.1 "low height spans") — too little
/// clearance for the agent to stand there at all.
fn filter_walkable_low_height_spans(tile: &mut VoxelizedTile, settings: &BuildSettings) {
    let walkable_height = i32::from(settings.walkable_height());

    for cell in tile.cells.iter_mut() {
        let span_count = cell.spans.len();
        for i in 0..span_count {
            if !cell.spans[i].traversable {
                continue;
            }

            let bot = i32::from(cell.spans[i].max);
            let top = cell
                .spans
                .get(i + 1)
                .map(|s| i32::from(s.min))
                .unwrap_or(UNBOUNDED_HEIGHT);

            if top - bot < walkable_height {
                cell.spans[i].traversable = false;
            }
        }
    }
}

fn process_triangle(
    a: Vec3A,
    b: Vec3A,
    c: Vec3A,
    settings: &BuildSettings,
    tile_max_bound: IVec3,
    tile_side: usize,
    voxel_cells: &mut [VoxelCell],
    area: Option<Area>,
) {
    let min_bound = a.min(b).min(c).div(settings.cell_size).as_ivec3();
    let max_bound = a.max(b).max(c).div(settings.cell_size).as_ivec3();

    if max_bound.x < 0
        || max_bound.z < 0
        || min_bound.x > tile_max_bound.x
        || min_bound.z > tile_max_bound.z
    {
        return;
    }

    let clamped_bound_min = min_bound.max(IVec3::ZERO);
    let clamped_bound_max = max_bound.min(tile_max_bound);
    let traversable = is_triangle_traversable(a, b, c, settings);
    let vertices = [a, b, c];

    // Cache-friendly order: iterate rows (z) outer, columns (x) inner.
    for z in clamped_bound_min.z..=clamped_bound_max.z {
        let row_clip_min = z as f32 * settings.cell_size;
        let row_clip_max = row_clip_min + settings.cell_size;

        let (row_min_clip_vert_count, row_min_clip_verts) =
            divide_polygon(&vertices, row_clip_min, 2, false);
        let (row_vert_count, row_verts) = divide_polygon(
            &row_min_clip_verts[..row_min_clip_vert_count],
            row_clip_max,
            2,
            true,
        );
        if row_vert_count < 3 {
            continue;
        }

        let mut column_min_vert_x = row_verts[0].x;
        let mut column_max_vert_x = row_verts[0].x;
        for vertex in row_verts.iter().take(row_vert_count).skip(1) {
            column_min_vert_x = column_min_vert_x.min(vertex.x);
            column_max_vert_x = column_max_vert_x.max(vertex.x);
        }
        let column_min = ((column_min_vert_x / settings.cell_size) as i32).max(0);
        let column_max =
            ((column_max_vert_x / settings.cell_size) as i32).min((tile_side - 1) as i32);

        for x in column_min..=column_max {
            let column_clip_min = x as f32 * settings.cell_size;
            let column_clip_max = column_clip_min + settings.cell_size;

            let (column_min_clip_vert_count, column_min_clip_verts) =
                divide_polygon(&row_verts[..row_vert_count], column_clip_min, 0, false);
            let (column_vert_count, column_verts) = divide_polygon(
                &column_min_clip_verts[..column_min_clip_vert_count],
                column_clip_max,
                0,
                true,
            );
            if column_vert_count < 3 {
                continue;
            }

            let mut square_min_height = column_verts[0].y;
            let mut square_max_height = column_verts[0].y;
            for vertex in column_verts.iter().take(column_vert_count).skip(1) {
                square_min_height = square_min_height.min(vertex.y);
                square_max_height = square_max_height.max(vertex.y);
            }

            square_min_height = square_min_height.max(0.0);
            if square_max_height < 0.0 {
                continue;
            }

            let min_height = (square_min_height / settings.cell_height) as u16;
            let max_height = (square_max_height / settings.cell_height) as u16;

            let index = x as usize + z as usize * tile_side;
            let cell = &mut voxel_cells[index];

            let mut new_span = HeightSpan {
                min: min_height,
                max: max_height,
                traversable,
                area,
            };

            if cell.spans.is_empty() {
                cell.spans.push(new_span);
                continue;
            }

            let mut i = 0;
            while i < cell.spans.len() {
                let existing_span = &cell.spans[i];
                if existing_span.min > new_span.max {
                    break;
                } else if existing_span.max < new_span.min {
                    i += 1;
                    continue;
                } else {
                    match existing_span.max.cmp(&new_span.max) {
                        Ordering::Greater => {
                            new_span.traversable = existing_span.traversable;
                            new_span.area = existing_span.area;
                        }
                        Ordering::Equal => {
                            new_span.traversable |= existing_span.traversable;
                            new_span.area = new_span.area.max(existing_span.area);
                        }
                        Ordering::Less => {}
                    }

                    if existing_span.min < new_span.min {
                        new_span.min = existing_span.min;
                    }
                    if existing_span.max > new_span.max {
                        new_span.max = existing_span.max;
                    }

                    cell.spans.remove(i);
                }
            }
            cell.spans.insert(i, new_span);
        }
    }
}

fn is_triangle_traversable(a: Vec3A, b: Vec3A, c: Vec3A, settings: &BuildSettings) -> bool {
    let ab = b - a;
    let ac = c - a;
    let normal = ab.cross(ac).normalize();
    let slope = normal.dot(Vec3A::Y).acos();

    slope < settings.max_traversable_slope_radians()
}

/// Splits `vertices` (a convex polygon of at most 7 vertices) along the line
/// `axis == clip_line`, returning the side requested by `keep_left`.
fn divide_polygon(
    vertices: &[Vec3A],
    clip_line: f32,
    axis: usize,
    keep_left: bool,
) -> (usize, [Vec3A; 7]) {
    let mut delta_from_line = [0.0; 7];
    for (i, vertex) in vertices.iter().enumerate() {
        delta_from_line[i] = clip_line - vertex[axis];
    }

    let mut polygon_left = [Vec3A::ZERO; 7];
    let mut polygon_right = [Vec3A::ZERO; 7];

    let mut verts_left = 0;
    let mut verts_right = 0;

    for i in 0..vertices.len() {
        let previous = (vertices.len() - 1 + i) % vertices.len();

        let in_a = delta_from_line[previous] >= 0.0;
        let in_b = delta_from_line[i] >= 0.0;

        if in_a != in_b {
            let slide = delta_from_line[previous] / (delta_from_line[previous] - delta_from_line[i]);

            polygon_left[verts_left] = vertices[previous] + (vertices[i] - vertices[previous]) * slide;
            polygon_right[verts_right] = polygon_left[verts_left];
            verts_left += 1;
            verts_right += 1;

            if delta_from_line[i] > 0.0 {
                polygon_left[verts_left] = vertices[i];
                verts_left += 1;
            } else if delta_from_line[i] < 0.0 {
                polygon_right[verts_right] = vertices[i];
                verts_right += 1;
            }
        } else {
            if delta_from_line[i] >= 0.0 {
                polygon_left[verts_left] = vertices[i];
                verts_left += 1;

                if delta_from_line[i] != 0.0 {
                    continue;
                }
            }
            polygon_right[verts_right] = vertices[i];
            verts_right += 1;
        }
    }

    if keep_left {
        (verts_left, polygon_left)
    } else {
        (verts_right, polygon_right)
    }
}

// --- Open heightfield (C3) lives in compact_heightfield.rs; it consumes
// `VoxelizedTile` through this crate-visible accessor. ---

pub(crate) struct VoxelCellSpans<'a> {
    pub min: u16,
    pub max: u16,
    pub traversable: bool,
    pub area: Option<Area>,
    _marker: std::marker::PhantomData<&'a ()>,
}

impl VoxelizedTile {
    pub(crate) fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub(crate) fn cell_spans(&self, index: usize) -> impl Iterator<Item = VoxelCellSpans<'_>> {
        self.cells[index].spans.iter().map(|span| VoxelCellSpans {
            min: span.min,
            max: span.max,
            traversable: span.traversable,
            area: span.area,
            _marker: std::marker::PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn flat_settings() -> BuildSettings {
        BuildSettings::from_agent_and_bounds(0.4, 1.8, Vec3::ZERO, Vec3::splat(20.0))
    }

    #[test]
    fn single_flat_triangle_produces_spans() {
        let settings = flat_settings();
        let tri = InputTriangle {
            vertices: [
                Vec3A::new(0.0, 1.0, 0.0),
                Vec3A::new(2.0, 1.0, 0.0),
                Vec3A::new(0.0, 1.0, 2.0),
            ],
            area: Some(Area::GROUND),
        };

        let tile = build_heightfield_tile(UVec2::ZERO, &[tri], &settings);
        let has_spans = (0..tile.cell_count()).any(|i| tile.cell_spans(i).next().is_some());
        assert!(has_spans);
    }

    #[test]
    fn steep_triangle_is_not_traversable() {
        let settings = flat_settings();
        let tri = InputTriangle {
            vertices: [
                Vec3A::new(0.0, 0.0, 0.0),
                Vec3A::new(0.1, 5.0, 0.0),
                Vec3A::new(0.0, 0.0, 0.1),
            ],
            area: Some(Area::GROUND),
        };
        let tile = build_heightfield_tile(UVec2::ZERO, &[tri], &settings);
        for i in 0..tile.cell_count() {
            for span in tile.cell_spans(i) {
                assert!(!span.traversable);
            }
        }
    }

    fn single_cell_tile(spans: Vec<HeightSpan>) -> VoxelizedTile {
        VoxelizedTile {
            cells: vec![VoxelCell { spans: spans.into() }].into_boxed_slice(),
        }
    }

    #[test]
    fn low_hanging_obstacle_inherits_walkability() {
        let settings = flat_settings();
        let mut tile = single_cell_tile(vec![
            HeightSpan { min: 0, max: 4, traversable: true, area: Some(Area::GROUND) },
            HeightSpan { min: 5, max: 6, traversable: false, area: None },
        ]);

        filter_low_hanging_walkable_obstacles(&mut tile, &settings);

        assert!(tile.cells[0].spans[1].traversable);
        assert_eq!(tile.cells[0].spans[1].area, Some(Area::GROUND));
    }

    #[test]
    fn distant_obstacle_does_not_inherit_walkability() {
        let settings = flat_settings();
        let walkable_climb = settings.walkable_climb();
        let mut tile = single_cell_tile(vec![
            HeightSpan { min: 0, max: 4, traversable: true, area: Some(Area::GROUND) },
            HeightSpan {
                min: 4 + walkable_climb + 5,
                max: 4 + walkable_climb + 6,
                traversable: false,
                area: None,
            },
        ]);

        filter_low_hanging_walkable_obstacles(&mut tile, &settings);

        assert!(!tile.cells[0].spans[1].traversable);
    }

    #[test]
    fn low_headroom_span_is_marked_unwalkable() {
        let settings = flat_settings();
        let walkable_height = settings.walkable_height();
        let mut tile = single_cell_tile(vec![
            HeightSpan { min: 0, max: 4, traversable: true, area: Some(Area::GROUND) },
            HeightSpan {
                min: 4 + walkable_height.saturating_sub(1),
                max: 10 + walkable_height,
                traversable: true,
                area: Some(Area::GROUND),
            },
        ]);

        filter_walkable_low_height_spans(&mut tile, &settings);

        assert!(!tile.cells[0].spans[0].traversable);
        assert!(tile.cells[0].spans[1].traversable);
    }

    #[test]
    fn ledge_span_with_no_reachable_neighbor_floor_is_removed() {
        let settings = flat_settings();
        let tile_side = 2;
        let walkable_climb = settings.walkable_climb();

        let high_floor = VoxelCell {
            spans: vec![HeightSpan {
                min: 0,
                max: 50 + walkable_climb,
                traversable: true,
                area: Some(Area::GROUND),
            }]
            .into(),
        };
        let low_floor = VoxelCell {
            spans: vec![HeightSpan { min: 0, max: 4, traversable: true, area: Some(Area::GROUND) }].into(),
        };

        // (0, 0) stands well above both of its in-bounds neighbors' floors by
        // more than a climb, with no span close enough to step onto.
        let mut tile = VoxelizedTile {
            cells: vec![high_floor, low_floor.clone(), low_floor, VoxelCell::default()].into_boxed_slice(),
        };

        filter_ledge_spans(&mut tile, tile_side, &settings);

        assert!(!tile.cells[0].spans[0].traversable);
    }
}

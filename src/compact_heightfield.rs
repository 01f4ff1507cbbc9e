//! Compact (open) heightfield: neighbor linking, erosion, distance field and
//! convex-area marking (C3).
//!
//! The cell/span/neighbour-linking logic is carried over from the teacher's
//! `heightfields.rs` (`build_open_heightfield_tile`, `link_neighbours`,
//! `erode_walkable_area`, `calculate_distance_field`, `filter_tile`) almost
//! verbatim; `mark_convex_poly_area` is new (the teacher never needed it
//! because area assignment happens per-collider before rasterization, but
//! the spec's compact-heightfield stage calls for it explicitly — see
//! `DESIGN.md`).

use glam::Vec2;
use smallvec::SmallVec;

use crate::area::Area;
use crate::config::BuildSettings;
use crate::heightfield::VoxelizedTile;

#[derive(Default, Clone)]
pub(crate) struct OpenCell {
    pub(crate) spans: SmallVec<[OpenSpan; 1]>,
}

/// A walkable gap between two solid spans (or above the topmost one).
#[derive(Default, Clone, Copy, Debug)]
pub(crate) struct OpenSpan {
    pub(crate) min: u16,
    pub(crate) max: Option<u16>,
    pub(crate) neighbours: [Option<u16>; 4],
    pub(crate) tile_index: usize,
    pub(crate) region: u16,
    area: Option<Area>,
}

#[derive(Default)]
pub struct OpenTile {
    pub(crate) cells: Vec<OpenCell>,
    pub(crate) distances: Box<[u16]>,
    pub(crate) areas: Box<[Option<Area>]>,
    pub(crate) max_distance: u16,
    pub(crate) span_count: usize,
    pub(crate) max_regions: u16,
    pub(crate) tile_side: usize,
}

pub(crate) fn get_neighbour_index(tile_side: usize, index: usize, dir: usize) -> usize {
    match dir {
        0 => index - 1,
        1 => index + tile_side,
        2 => index + 1,
        3 => index - tile_side,
        _ => panic!("not a valid direction"),
    }
}

pub fn build_open_heightfield_tile(
    voxelized_tile: VoxelizedTile,
    settings: &BuildSettings,
) -> OpenTile {
    let tile_side = settings.tile_side_with_border();
    let mut cells = vec![OpenCell::default(); voxelized_tile.cell_count()];
    let mut span_count = 0;

    for i in 0..voxelized_tile.cell_count() {
        let mut iter = voxelized_tile.cell_spans(i).peekable();
        let open_spans = &mut cells[i].spans;

        while let Some(span) = iter.next() {
            let area = if span.traversable { span.area } else { None };

            if let Some(next_span) = iter.peek() {
                if next_span.min - span.max >= settings.walkable_height() {
                    open_spans.push(OpenSpan {
                        min: span.max,
                        max: Some(next_span.min),
                        area,
                        ..Default::default()
                    });
                }
            } else {
                open_spans.push(OpenSpan {
                    min: span.max,
                    max: None,
                    area,
                    ..Default::default()
                });
            }
        }
        span_count += open_spans.len();
    }

    let mut open_tile = OpenTile {
        cells,
        distances: vec![u16::MAX; span_count].into_boxed_slice(),
        areas: vec![None; span_count].into_boxed_slice(),
        max_distance: 0,
        span_count,
        max_regions: 0,
        tile_side,
    };

    let mut tile_index = 0;
    for cell in open_tile.cells.iter_mut() {
        for span in cell.spans.iter_mut() {
            span.tile_index = tile_index;
            open_tile.areas[tile_index] = span.area;
            tile_index += 1;
        }
    }

    {
        #[cfg(feature = "trace")]
        let _span = tracing::info_span!("link neighbours").entered();
        link_neighbours(&mut open_tile, settings);
    }

    open_tile
}

fn link_neighbours(open_tile: &mut OpenTile, settings: &BuildSettings) {
    let mut neighbour_spans = Vec::with_capacity(3);
    let tile_side = open_tile.tile_side;

    for i in 0..open_tile.cells.len() {
        if open_tile.cells[i].spans.is_empty() {
            continue;
        }

        let row = i / tile_side;
        let column = i % tile_side;

        let neighbour_index = [
            if column > 0 { Some(i - 1) } else { None },
            if row < (tile_side - 1) { Some(i + tile_side) } else { None },
            if column < (tile_side - 1) { Some(i + 1) } else { None },
            if row > 0 { Some(i - tile_side) } else { None },
        ];

        for (neighbour, neighbour_index) in neighbour_index
            .into_iter()
            .enumerate()
            .filter_map(|(i, index)| Some(i).zip(index))
        {
            neighbour_spans.clear();
            neighbour_spans.extend(
                open_tile.cells[neighbour_index]
                    .spans
                    .iter()
                    .map(|span| (span.min, span.max)),
            );

            for span in open_tile.cells[i].spans.iter_mut() {
                for (i, (min, max)) in neighbour_spans.iter().enumerate() {
                    if let Some((max, span_max)) = max.zip(span.max) {
                        let gap = span_max.min(*max).abs_diff(span.min.max(*min));
                        if gap < settings.walkable_height() {
                            continue;
                        }
                    }

                    if min.abs_diff(span.min) < settings.walkable_climb() {
                        span.neighbours[neighbour] = Some(i as u16);
                        break;
                    }
                }
            }
        }
    }
}

pub fn erode_walkable_area(open_tile: &mut OpenTile, settings: &BuildSettings) {
    let tile_side = open_tile.tile_side;

    for (i, cell) in open_tile.cells.iter().enumerate() {
        for span in cell.spans.iter() {
            let area = open_tile.areas[span.tile_index];

            if area.is_none() {
                open_tile.distances[span.tile_index] = 0;
                continue;
            }

            let all_neighbours = span.neighbours.iter().enumerate().all(|(dir, neighbour)| {
                if let Some(neighbour) = neighbour {
                    let neighbour_index = get_neighbour_index(tile_side, i, dir);
                    let neighbour = &open_tile.cells[neighbour_index].spans[*neighbour as usize];
                    open_tile.areas[neighbour.tile_index].is_some()
                } else {
                    false
                }
            });

            open_tile.distances[span.tile_index] = if all_neighbours { u16::MAX } else { 0 };
        }
    }

    filter_tile(open_tile);

    let threshold = settings.walkable_radius() * 2;
    for i in 0..open_tile.span_count {
        if open_tile.distances[i] < threshold {
            open_tile.areas[i] = None;
        }
    }
}

pub fn calculate_distance_field(open_tile: &mut OpenTile) {
    let tile_side = open_tile.tile_side;

    for (i, cell) in open_tile.cells.iter().enumerate() {
        for span in cell.spans.iter() {
            let area = open_tile.areas[span.tile_index];

            let all_neighbours = span.neighbours.iter().enumerate().all(|(dir, neighbour)| {
                if let Some(neighbour) = neighbour {
                    let neighbour_index = get_neighbour_index(tile_side, i, dir);
                    let neighbour = &open_tile.cells[neighbour_index].spans[*neighbour as usize];
                    open_tile.areas[neighbour.tile_index] == area
                } else {
                    false
                }
            });

            open_tile.distances[span.tile_index] = if all_neighbours { u16::MAX } else { 0 };
        }
    }

    filter_tile(open_tile);

    open_tile.max_distance = *open_tile.distances.iter().max().unwrap_or(&0);

    // Box blur.
    let threshold = 2;
    let mut blurred = vec![0; open_tile.distances.len()].into_boxed_slice();

    for (i, cell) in open_tile.cells.iter().enumerate() {
        for span in cell.spans.iter() {
            let distance = open_tile.distances[span.tile_index];
            if distance <= threshold {
                blurred[span.tile_index] = distance;
                continue;
            }

            let mut d = distance;
            for dir in 0..4 {
                let Some(index) = span.neighbours[dir] else {
                    d += distance * 2;
                    continue;
                };

                let other_cell_index = get_neighbour_index(tile_side, i, dir);
                let other_span = &open_tile.cells[other_cell_index].spans[index as usize];

                d += open_tile.distances[other_span.tile_index];

                let next_dir = (dir + 1) & 0x3;
                let Some(index) = other_span.neighbours[next_dir] else {
                    d += distance;
                    continue;
                };

                let other_cell_index = get_neighbour_index(tile_side, other_cell_index, next_dir);
                let other_span = &open_tile.cells[other_cell_index].spans[index as usize];

                d += open_tile.distances[other_span.tile_index];
            }

            blurred[span.tile_index] = (d + 5) / 9;
        }
    }

    open_tile.distances = blurred;
}

fn filter_tile(open_tile: &mut OpenTile) {
    let tile_side = open_tile.tile_side;

    for (i, cell) in open_tile.cells.iter().enumerate() {
        for span in cell.spans.iter() {
            let mut distance = open_tile.distances[span.tile_index];

            if let Some(span_index) = span.neighbours[0] {
                let other_cell_index = i - 1;
                let other_span = &open_tile.cells[other_cell_index].spans[span_index as usize];

                let other_distance = open_tile.distances[other_span.tile_index] + 2;
                if other_distance < distance {
                    distance = other_distance;
                }

                if let Some(span_index) = other_span.neighbours[3] {
                    let other_cell_index = other_cell_index - tile_side;
                    let other_span = &open_tile.cells[other_cell_index].spans[span_index as usize];

                    let other_distance = open_tile.distances[other_span.tile_index] + 3;
                    if other_distance < distance {
                        distance = other_distance;
                    }
                }
            }

            if let Some(span_index) = span.neighbours[3] {
                let other_cell_index = i - tile_side;
                let other_span = &open_tile.cells[other_cell_index].spans[span_index as usize];

                let other_distance = open_tile.distances[other_span.tile_index] + 2;
                if other_distance < distance {
                    distance = other_distance;
                }

                if let Some(span_index) = other_span.neighbours[2] {
                    let other_cell_index = other_cell_index + 1;
                    let other_span = &open_tile.cells[other_cell_index].spans[span_index as usize];

                    let other_distance = open_tile.distances[other_span.tile_index] + 3;
                    if other_distance < distance {
                        distance = other_distance;
                    }
                }
            }

            open_tile.distances[span.tile_index] = distance;
        }
    }

    for (i, cell) in open_tile.cells.iter().enumerate().rev() {
        for span in cell.spans.iter() {
            let mut distance = open_tile.distances[span.tile_index];

            if let Some(span_index) = span.neighbours[2] {
                let other_cell_index = i + 1;
                let other_span = &open_tile.cells[other_cell_index].spans[span_index as usize];

                let other_distance = open_tile.distances[other_span.tile_index] + 2;
                if other_distance < distance {
                    distance = other_distance;
                }

                if let Some(span_index) = other_span.neighbours[1] {
                    let other_cell_index = other_cell_index + tile_side;
                    let other_span = &open_tile.cells[other_cell_index].spans[span_index as usize];

                    let other_distance = open_tile.distances[other_span.tile_index] + 3;
                    if other_distance < distance {
                        distance = other_distance;
                    }
                }
            }

            if let Some(span_index) = span.neighbours[1] {
                let other_cell_index = i + tile_side;
                let other_span = &open_tile.cells[other_cell_index].spans[span_index as usize];

                let other_distance = open_tile.distances[other_span.tile_index] + 2;
                if other_distance < distance {
                    distance = other_distance;
                }

                if let Some(span_index) = other_span.neighbours[0] {
                    let other_cell_index = other_cell_index - 1;
                    let other_span = &open_tile.cells[other_cell_index].spans[span_index as usize];

                    let other_distance = open_tile.distances[other_span.tile_index] + 3;
                    if other_distance < distance {
                        distance = other_distance;
                    }
                }
            }

            open_tile.distances[span.tile_index] = distance;
        }
    }
}

/// Paints spans whose cell center lies inside `polygon` (xz, world units)
/// and whose world height lies within `[height_min, height_max]`.
///
/// `tile_origin` is the world-space xz position of cell `(0, 0)`.
pub fn mark_convex_poly_area(
    open_tile: &mut OpenTile,
    tile_origin: Vec2,
    polygon: &[Vec2],
    height_min: f32,
    height_max: f32,
    area: Area,
    settings: &BuildSettings,
) {
    if polygon.len() < 3 {
        return;
    }

    let tile_side = open_tile.tile_side;
    let min_y = (height_min / settings.cell_height) as u16;
    let max_y = (height_max / settings.cell_height) as u16;

    for row in 0..tile_side {
        for column in 0..tile_side {
            let index = column + row * tile_side;
            if open_tile.cells[index].spans.is_empty() {
                continue;
            }

            let center = tile_origin
                + Vec2::new(
                    (column as f32 + 0.5) * settings.cell_size,
                    (row as f32 + 0.5) * settings.cell_size,
                );

            if !point_in_polygon_2d(center, polygon) {
                continue;
            }

            for span in open_tile.cells[index].spans.iter() {
                if span.min >= min_y && span.min <= max_y {
                    open_tile.areas[span.tile_index] = Some(area);
                }
            }
        }
    }
}

fn point_in_polygon_2d(point: Vec2, polygon: &[Vec2]) -> bool {
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let vi = polygon[i];
        let vj = polygon[j];

        if ((vi.y > point.y) != (vj.y > point.y))
            && (point.x < (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

// Allow `regions.rs`/`contour.rs` to reach span fields without making them
// crate-public on `OpenSpan` itself.
impl OpenTile {
    pub(crate) fn span_area(&self, tile_index: usize) -> Option<Area> {
        self.areas[tile_index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightfield::{build_heightfield_tile, InputTriangle};
    use glam::{UVec2, Vec3, Vec3A};

    #[test]
    fn flat_floor_links_all_four_neighbours_in_interior() {
        let settings = BuildSettings::from_agent_and_bounds(0.4, 1.8, Vec3::ZERO, Vec3::splat(20.0));
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
        let open = build_open_heightfield_tile(voxelized, &settings);

        let tile_side = settings.tile_side_with_border();
        let center = (tile_side / 2) + (tile_side / 2) * tile_side;
        assert!(!open.cells[center].spans.is_empty());
    }
}

//! Region partitioning (C4): monotone (default) and watershed.
//!
//! Watershed (`flood_region`, `expand_regions`, `sort_cells_by_level`, the
//! whole `merge_regions` small-region filter/merge pass) is carried over
//! from the teacher's `regions.rs` almost unchanged, generalized from an ECS
//! `ResMut<TilesOpen>` system into a plain function over `OpenTile`.
//! Monotone partitioning is a supplement: the teacher never implemented it,
//! so it is built directly from the row-sweep connected-component labeling
//! Recast itself uses, reusing the same filter/merge pass afterwards.

use crate::compact_heightfield::{get_neighbour_index, OpenSpan, OpenTile};
use crate::config::{BuildSettings, PartitionType};

/// High bit marking a region whose polygons are not exported but whose
/// spans are still used to link across tile borders.
pub const BORDER_REG: u16 = 0x8000;
const REGION_ID_MASK: u16 = 0x7fff;

pub fn build_regions(open_tile: &mut OpenTile, settings: &BuildSettings) {
    match settings.partition_type {
        PartitionType::Monotone => build_regions_monotone(open_tile, settings),
        PartitionType::Watershed => build_regions_watershed(open_tile, settings),
        PartitionType::Layer => {
            #[cfg(feature = "trace")]
            tracing::warn!("layer partitioning is not implemented, falling back to monotone");
            build_regions_monotone(open_tile, settings);
        }
    }
}

// ---------------------------------------------------------------------
// Monotone partitioning.
// ---------------------------------------------------------------------

/// Union-find over row-sweep labels, merging row-runs that turn out to be
/// 4-connected as the sweep crosses rows.
struct UnionFind {
    parent: Vec<u16>,
}

impl UnionFind {
    fn new() -> Self {
        Self { parent: vec![0] } // Label 0 is reserved for "unassigned".
    }

    fn make_label(&mut self) -> u16 {
        let id = self.parent.len() as u16;
        self.parent.push(id);
        id
    }

    fn find(&mut self, mut x: u16) -> u16 {
        while self.parent[x as usize] != x {
            self.parent[x as usize] = self.parent[self.parent[x as usize] as usize];
            x = self.parent[x as usize];
        }
        x
    }

    fn union(&mut self, a: u16, b: u16) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            if ra < rb {
                self.parent[rb as usize] = ra;
            } else {
                self.parent[ra as usize] = rb;
            }
        }
    }
}

fn build_regions_monotone(open_tile: &mut OpenTile, settings: &BuildSettings) {
    let tile_side = open_tile.tile_side;
    let mut labels = vec![0u16; open_tile.span_count];
    let mut union_find = UnionFind::new();

    // Row-major sweep: z outer (rows), x inner (columns), matching the
    // cell layout (`index = x + z * tile_side`).
    for row in 0..tile_side {
        for column in 0..tile_side {
            let cell_index = column + row * tile_side;
            if open_tile.cells[cell_index].spans.is_empty() {
                continue;
            }

            for span_index in 0..open_tile.cells[cell_index].spans.len() {
                let span = open_tile.cells[cell_index].spans[span_index];
                if open_tile.span_area(span.tile_index).is_none() {
                    continue;
                }

                // West neighbour (dir 0) in the same row.
                let west_label = span.neighbours[0].and_then(|idx| {
                    let neighbour_index = get_neighbour_index(tile_side, cell_index, 0);
                    let neighbour = open_tile.cells[neighbour_index].spans[idx as usize];
                    let label = labels[neighbour.tile_index];
                    (label != 0).then_some(label)
                });

                // South neighbour (dir 3) in the previous row.
                let south_label = span.neighbours[3].and_then(|idx| {
                    let neighbour_index = get_neighbour_index(tile_side, cell_index, 3);
                    let neighbour = open_tile.cells[neighbour_index].spans[idx as usize];
                    let label = labels[neighbour.tile_index];
                    (label != 0).then_some(label)
                });

                let label = match (west_label, south_label) {
                    (None, None) => union_find.make_label(),
                    (Some(a), None) | (None, Some(a)) => a,
                    (Some(a), Some(b)) => {
                        union_find.union(a, b);
                        a.min(b)
                    }
                };

                labels[span.tile_index] = label;
            }
        }
    }

    let mut root_to_region = std::collections::HashMap::new();
    let mut next_region_id = 1u16;
    let mut regions = vec![0u16; open_tile.span_count];

    for i in 0..open_tile.span_count {
        if labels[i] == 0 {
            continue;
        }
        let root = union_find.find(labels[i]);
        let region_id = *root_to_region.entry(root).or_insert_with(|| {
            let id = next_region_id;
            next_region_id += 1;
            id
        });
        regions[i] = region_id;
    }

    merge_regions(settings, &mut regions, &mut next_region_id, open_tile);

    for cell in open_tile.cells.iter_mut() {
        for span in cell.spans.iter_mut() {
            span.region = regions[span.tile_index];
        }
    }
    open_tile.max_regions = next_region_id;
}

// ---------------------------------------------------------------------
// Watershed partitioning.
// ---------------------------------------------------------------------

#[derive(Default, Clone, Copy)]
struct LevelStackEntry {
    cell_index: u32,
    span_index: u32,
    index: i32,
}

fn build_regions_watershed(open_tile: &mut OpenTile, settings: &BuildSettings) {
    let expand_iters = 4 + settings.walkable_radius() * 2;

    const LOG_NB_STACKS: i32 = 3;
    const NB_STACKS: i32 = 1 << LOG_NB_STACKS;

    let mut regions = vec![0u16; open_tile.span_count];
    let mut distances = vec![0u16; open_tile.span_count];

    let mut level_stacks: Vec<Vec<LevelStackEntry>> =
        (0..NB_STACKS).map(|_| Vec::with_capacity(256)).collect();
    let mut stack = Vec::with_capacity(256);

    let mut region_id = 1u16;
    let mut level = (open_tile.max_distance + 1) & !1u16;

    let mut stack_id: i32 = -1;
    while level > 0 {
        level = if level >= 2 { level - 2 } else { 0 };
        stack_id = (stack_id + 1) & (NB_STACKS - 1);

        if stack_id == 0 {
            sort_cells_by_level(level, open_tile, &mut level_stacks, NB_STACKS, &regions);
        } else {
            let (prev, next) = level_stacks.split_at_mut(stack_id as usize);
            let prev_stack = &prev[prev.len() - 1];
            let next_stack = &mut next[0];
            next_stack.clear();
            for entry in prev_stack.iter() {
                if regions[entry.index as usize] != 0 {
                    continue;
                }
                next_stack.push(*entry);
            }
        }

        {
            let stack_slice = &mut level_stacks[stack_id as usize];
            expand_regions(expand_iters, open_tile, &mut regions, &mut distances, stack_slice);
        }

        let entries: Vec<LevelStackEntry> = level_stacks[stack_id as usize].clone();
        for entry in entries {
            if entry.index >= 0
                && regions[entry.index as usize] == 0
                && flood_region(
                    entry.cell_index,
                    entry.span_index,
                    entry.index,
                    level,
                    region_id,
                    open_tile,
                    &mut regions,
                    &mut distances,
                    &mut stack,
                )
            {
                region_id += 1;
            }
        }
    }

    expand_regions_until_end(open_tile, &mut regions, &mut distances, &mut stack);

    merge_regions(settings, &mut regions, &mut region_id, open_tile);

    for cell in open_tile.cells.iter_mut() {
        for span in cell.spans.iter_mut() {
            span.region = regions[span.tile_index];
        }
    }
    open_tile.max_regions = region_id;
}

fn sort_cells_by_level(
    start_level: u16,
    open_tile: &OpenTile,
    stacks: &mut [Vec<LevelStackEntry>],
    nb_stacks: i32,
    regions: &[u16],
) {
    let start_level = (start_level >> 1) as i32;

    for stack in stacks.iter_mut() {
        stack.clear();
    }

    for (c_i, cell) in open_tile.cells.iter().enumerate() {
        for (s_i, span) in cell.spans.iter().enumerate() {
            if regions[span.tile_index] != 0 {
                continue;
            }

            let level = (open_tile.distances[span.tile_index] >> 1) as i32;
            let stack_id = (start_level - level).max(0);
            if stack_id >= nb_stacks {
                continue;
            }

            stacks[stack_id as usize].push(LevelStackEntry {
                cell_index: c_i as u32,
                span_index: s_i as u32,
                index: span.tile_index as i32,
            });
        }
    }
}

struct DirtyEntry {
    index: i32,
    region: u16,
    distance: u16,
}

fn neighbour_region_distance(
    tile: &OpenTile,
    cell_index: usize,
    span: &OpenSpan,
    regions: &[u16],
    distances: &[u16],
) -> (u16, u16) {
    let mut new_region = regions[span.tile_index];
    let mut distance = u16::MAX;

    for dir in 0..4 {
        let Some(index) = span.neighbours[dir] else {
            continue;
        };

        let other_cell_index = get_neighbour_index(tile.tile_side, cell_index, dir);
        let other_span = tile.cells[other_cell_index].spans[index as usize];

        let other_region = regions[other_span.tile_index];
        let other_distance = distances[other_span.tile_index];
        if other_region > 0 && other_distance + 2 < distance {
            new_region = other_region;
            distance = other_distance + 2;
        }
    }

    (new_region, distance)
}

fn expand_regions(
    max_iterations: u16,
    tile: &OpenTile,
    regions: &mut [u16],
    distances: &mut [u16],
    level_stack: &mut [LevelStackEntry],
) {
    for entry in level_stack
        .iter_mut()
        .filter(|entry| regions[entry.index as usize] != 0)
    {
        entry.index = -1;
    }

    let mut iter = 0;
    let mut dirty_entries = Vec::new();
    loop {
        let mut failed = 0;
        dirty_entries.clear();

        for entry in level_stack.iter_mut() {
            if entry.index < 0 {
                failed += 1;
                continue;
            }

            let span = tile.cells[entry.cell_index as usize].spans[entry.span_index as usize];
            let (new_region, distance) =
                neighbour_region_distance(tile, entry.cell_index as usize, &span, regions, distances);

            if new_region != 0 {
                entry.index = -1;
                dirty_entries.push(DirtyEntry {
                    index: span.tile_index as i32,
                    region: new_region,
                    distance,
                });
            } else {
                failed += 1;
            }
        }

        for entry in dirty_entries.iter() {
            regions[entry.index as usize] = entry.region;
            distances[entry.index as usize] = entry.distance;
        }

        if failed == level_stack.len() {
            break;
        }

        iter += 1;
        if iter >= max_iterations {
            break;
        }
    }
}

fn expand_regions_until_end(
    tile: &OpenTile,
    regions: &mut [u16],
    distances: &mut [u16],
    level_stack: &mut Vec<LevelStackEntry>,
) {
    level_stack.clear();

    for (c_i, cell) in tile.cells.iter().enumerate() {
        for (s_i, span) in cell.spans.iter().enumerate() {
            if regions[span.tile_index] == 0 {
                level_stack.push(LevelStackEntry {
                    cell_index: c_i as u32,
                    span_index: s_i as u32,
                    index: span.tile_index as i32,
                });
            }
        }
    }

    let mut dirty_entries = Vec::new();
    loop {
        let mut failed = 0;
        dirty_entries.clear();

        for entry in level_stack.iter_mut() {
            if entry.index < 0 {
                failed += 1;
                continue;
            }

            let span = tile.cells[entry.cell_index as usize].spans[entry.span_index as usize];
            let (new_region, distance) =
                neighbour_region_distance(tile, entry.cell_index as usize, &span, regions, distances);

            if new_region != 0 {
                entry.index = -1;
                dirty_entries.push(DirtyEntry {
                    index: span.tile_index as i32,
                    region: new_region,
                    distance,
                });
            } else {
                failed += 1;
            }
        }

        for entry in dirty_entries.iter() {
            regions[entry.index as usize] = entry.region;
            distances[entry.index as usize] = entry.distance;
        }

        if failed == level_stack.len() {
            break;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn flood_region(
    cell_index: u32,
    span_index: u32,
    index: i32,
    level: u16,
    region_id: u16,
    tile: &OpenTile,
    regions: &mut [u16],
    distances: &mut [u16],
    stack: &mut Vec<LevelStackEntry>,
) -> bool {
    stack.clear();
    stack.push(LevelStackEntry {
        cell_index,
        span_index,
        index,
    });

    regions[index as usize] = region_id;
    distances[index as usize] = 0;

    let mut count = 0;

    while let Some(entry) = stack.pop() {
        let span = tile.cells[entry.cell_index as usize].spans[entry.span_index as usize];

        let mut adjacent_region = 0;
        for dir in 0..4 {
            let Some(neighbour_idx) = span.neighbours[dir] else {
                continue;
            };

            let other_cell_index = get_neighbour_index(tile.tile_side, entry.cell_index as usize, dir);
            let other_span = tile.cells[other_cell_index].spans[neighbour_idx as usize];
            let other_region = regions[other_span.tile_index];

            if other_region != 0 {
                adjacent_region = other_region;
                break;
            }

            let next_dir = (dir + 1) & 0x3;
            if let Some(neighbour_idx) = span.neighbours[next_dir] {
                let other_cell_index2 =
                    get_neighbour_index(tile.tile_side, entry.cell_index as usize, next_dir);
                let other_span = tile.cells[other_cell_index2].spans[neighbour_idx as usize];
                let other_region = regions[other_span.tile_index];

                if other_region != 0 {
                    adjacent_region = other_region;
                    break;
                }
            }
        }

        if adjacent_region != 0 {
            regions[entry.index as usize] = 0;
            continue;
        }

        count += 1;

        for dir in 0..4 {
            let Some(neighbour_idx) = span.neighbours[dir] else {
                continue;
            };

            let other_cell_index = get_neighbour_index(tile.tile_side, entry.cell_index as usize, dir);
            let other_span = tile.cells[other_cell_index].spans[neighbour_idx as usize];

            if tile.distances[other_span.tile_index] >= level && regions[other_span.tile_index] == 0 {
                regions[other_span.tile_index] = region_id;
                distances[other_span.tile_index] = 0;
                stack.push(LevelStackEntry {
                    cell_index: other_cell_index as u32,
                    span_index: neighbour_idx as u32,
                    index: other_span.tile_index as i32,
                });
            }
        }
    }

    count > 0
}

// ---------------------------------------------------------------------
// Shared filter + merge pass (both partitioning strategies end here).
// ---------------------------------------------------------------------

struct Region {
    id: u16,
    span_count: usize,
    remap: bool,
    visited: bool,
    overlap: bool,
    is_border_region: bool,
    floors: Vec<u16>,
    connections: Vec<u16>,
}

fn merge_regions(
    settings: &BuildSettings,
    source_regions: &mut [u16],
    max_region_id: &mut u16,
    tile: &OpenTile,
) {
    let tile_side = tile.tile_side;
    let mut regions: Vec<Region> = (0..*max_region_id)
        .map(|i| Region {
            id: i,
            span_count: 0,
            remap: false,
            visited: false,
            overlap: false,
            is_border_region: false,
            floors: Vec::new(),
            connections: Vec::new(),
        })
        .collect();

    for (c_i, cell) in tile.cells.iter().enumerate() {
        let row = c_i / tile_side;
        let column = c_i % tile_side;
        let is_border = row == 0 || column == 0 || row == tile_side - 1 || column == tile_side - 1;

        for (s_i, span) in cell.spans.iter().enumerate() {
            let region_id = source_regions[span.tile_index];
            if region_id == 0 || region_id >= *max_region_id {
                continue;
            }

            {
                let region = &mut regions[region_id as usize];
                region.span_count += 1;
                region.is_border_region |= is_border;
            }

            for other_span in cell.spans.iter().filter(|a| a.tile_index != span.tile_index) {
                let other_region_id = source_regions[other_span.tile_index];
                if other_region_id == 0 || other_region_id >= *max_region_id {
                    continue;
                }

                let region = &mut regions[region_id as usize];
                if other_region_id == region_id {
                    region.overlap = true;
                }
                add_unique_floor_region(region, other_region_id);
            }

            if !regions[region_id as usize].connections.is_empty() {
                continue;
            }

            let dir = (0..4).find(|&dir| is_solid_edge(tile, span, c_i, dir, source_regions));

            if let Some(dir) = dir {
                let mut connections = Vec::new();
                walk_contour(c_i, s_i, dir, tile, source_regions, &mut connections);
                regions[region_id as usize].connections = connections;
            }
        }
    }

    let mut stack = Vec::with_capacity(32);
    let mut trace = Vec::with_capacity(32);
    let mut connections: Vec<u16> = Vec::with_capacity(16);

    for i in 0..*max_region_id {
        {
            let region = &mut regions[i as usize];
            if region.id == 0 || region.span_count == 0 || region.visited || region.is_border_region {
                continue;
            }
            region.visited = true;
        }

        let mut connects_to_border = false;
        stack.clear();
        trace.clear();
        stack.push(i);

        let mut span_count = 0;

        while let Some(r_i) = stack.pop() {
            connections.clear();
            trace.push(r_i);

            {
                let region = &regions[r_i as usize];
                connections.extend(region.connections.iter());
                span_count += region.span_count;
            }

            for connected_region in &connections {
                let connected_region = &mut regions[*connected_region as usize];

                if connected_region.visited {
                    continue;
                }
                if connected_region.is_border_region {
                    connects_to_border = true;
                    continue;
                }

                stack.push(connected_region.id);
                connected_region.visited = true;
            }
        }

        if span_count < settings.region_min_size as usize && !connects_to_border {
            for trace in &trace {
                let region = &mut regions[*trace as usize];
                region.span_count = 0;
                region.id = 0;
            }
        }
    }

    loop {
        let mut merged = false;

        for region in 0..regions.len() {
            {
                let region = &regions[region];
                if region.id == 0 || !region.is_border_region || !region.overlap || region.span_count == 0 {
                    continue;
                }

                let connected_to_border = region.connections.contains(&0);
                if region.span_count > settings.region_merge_size as usize && connected_to_border {
                    continue;
                }
            }

            let mut smallest_region_size = usize::MAX;
            let mut merge_id = None;
            {
                let region = &regions[region];
                for connected in &region.connections {
                    let other_region = &regions[*connected as usize];
                    if other_region.id == 0 || other_region.is_border_region || other_region.overlap {
                        continue;
                    }

                    if other_region.span_count < smallest_region_size
                        && can_merge_with_region(region, other_region)
                        && can_merge_with_region(other_region, region)
                    {
                        smallest_region_size = other_region.span_count;
                        merge_id = Some(other_region.id);
                    }
                }
            }

            if let Some(merge_id) = merge_id {
                let old_id = regions[region].id;

                if merge_regions_i(&mut regions, region, merge_id as usize) {
                    for region in regions.iter_mut() {
                        if region.id == 0 || region.is_border_region {
                            continue;
                        }
                        if region.id == old_id {
                            region.id = merge_id;
                        }
                        replace_neighbour(region, old_id, merge_id);
                    }
                    merged = true;
                }
            }
        }

        if !merged {
            break;
        }
    }

    for region in regions.iter_mut() {
        region.remap = !(region.id == 0 || region.is_border_region);
    }

    let mut region_id_gen = 0;
    for i in 0..regions.len() {
        if !regions[i].remap {
            continue;
        }
        region_id_gen += 1;

        let old_id = regions[i].id;
        let new_id = region_id_gen;

        for region in regions.iter_mut().skip(i) {
            if region.id == old_id {
                region.id = new_id;
                region.remap = false;
            }
        }
    }

    // Border regions keep a unique id but are tagged with BORDER_REG so
    // downstream stages can skip exporting their polygons while still using
    // their spans to link across tile edges.
    let mut border_id_gen = 0u16;
    for region in regions.iter_mut() {
        if region.is_border_region && region.id != 0 {
            border_id_gen += 1;
            region.id = (border_id_gen & REGION_ID_MASK) | BORDER_REG;
        }
    }

    for cell in tile.cells.iter() {
        for span in cell.spans.iter() {
            let old_id = source_regions[span.tile_index];
            let new_region_id = if old_id == 0 || old_id >= regions.len() as u16 {
                0
            } else {
                regions[old_id as usize].id
            };
            source_regions[span.tile_index] = new_region_id;
        }
    }

    *max_region_id = region_id_gen + 1;
}

fn replace_neighbour(region: &mut Region, old_id: u16, new_id: u16) {
    let mut connection_changed = false;
    for connection in region.connections.iter_mut() {
        if *connection == old_id {
            *connection = new_id;
            connection_changed = true;
        }
    }
    for floor in region.floors.iter_mut() {
        if *floor == old_id {
            *floor = new_id;
        }
    }
    if connection_changed {
        remove_adjacent_connection_duplicates(region);
    }
}

fn merge_regions_i(regions: &mut [Region], a: usize, b: usize) -> bool {
    let merged_connections = {
        let a = &regions[a];
        let b = &regions[b];

        let Some(insert_point_a) = a.connections.iter().position(|i| *i == b.id) else {
            return false;
        };
        let Some(insert_point_b) = b.connections.iter().position(|i| *i == a.id) else {
            return false;
        };

        let mut merged_connections =
            Vec::with_capacity(a.connections.len() + b.connections.len() - 2);
        let size = a.connections.len() - 1;
        for i in 0..size {
            merged_connections.push(a.connections[(insert_point_a + 1 + i) % size]);
        }
        let size = b.connections.len() - 1;
        for i in 0..size {
            merged_connections.push(b.connections[(insert_point_b + 1 + i) % size]);
        }

        merged_connections
    };

    let (b_span_count, floors) = {
        let b = &mut regions[b];
        b.connections.clear();
        let count = b.span_count;
        b.span_count = 0;
        (count, b.floors.clone())
    };

    {
        let a = &mut regions[a];
        a.span_count += b_span_count;
        a.connections = merged_connections;

        remove_adjacent_connection_duplicates(a);

        for floor in floors {
            add_unique_floor_region(a, floor);
        }
    }

    true
}

fn remove_adjacent_connection_duplicates(region: &mut Region) {
    if region.connections.len() > 1 {
        let mut i = 0;
        while i < region.connections.len() {
            let next_index = (i + 1) % region.connections.len();
            let current = region.connections[i];
            let next = region.connections[next_index];

            if current == next {
                region.connections.remove(next_index);
            } else {
                i += 1;
            }
        }
    }
}

fn can_merge_with_region(a: &Region, b: &Region) -> bool {
    !(b.connections.contains(&a.id) || a.floors.contains(&b.id))
}

fn walk_contour(
    mut cell_index: usize,
    mut span_index: usize,
    mut dir: usize,
    tile: &OpenTile,
    source_regions: &[u16],
    contour: &mut Vec<u16>,
) {
    let start_direction = dir;
    let start_cell = cell_index;
    let start_span = span_index;

    let span = tile.cells[cell_index].spans[span_index];
    let mut current_region = 0;
    if let Some(index) = span.neighbours[dir] {
        let other_span =
            tile.cells[get_neighbour_index(tile.tile_side, cell_index, dir)].spans[index as usize];
        current_region = source_regions[other_span.tile_index];
    }
    contour.push(current_region);

    loop {
        let span = tile.cells[cell_index].spans[span_index];
        if is_solid_edge(tile, &span, cell_index, dir, source_regions) {
            let mut r = 0;
            if let Some(index) = span.neighbours[dir] {
                let other_span = tile.cells[get_neighbour_index(tile.tile_side, cell_index, dir)]
                    .spans[index as usize];
                r = source_regions[other_span.tile_index];
            }
            if r != current_region {
                current_region = r;
                contour.push(r);
            }

            dir = (dir + 1) & 0x3;
        } else {
            let Some(index) = span.neighbours[dir] else {
                return;
            };
            span_index = index as usize;

            cell_index = get_neighbour_index(tile.tile_side, cell_index, dir);
            dir = (dir + 3) & 0x3;
        }

        if start_cell == cell_index && start_span == span_index && start_direction == dir {
            break;
        }
    }

    if contour.len() > 2 {
        let mut i = 0;
        while i < contour.len() {
            let next_index = (i + 1) % contour.len();
            let current = contour[i];
            let next = contour[next_index];

            if current == next {
                contour.remove(next_index);
            } else {
                i += 1;
            }
        }
    }
}

fn is_solid_edge(
    tile: &OpenTile,
    span: &OpenSpan,
    c_i: usize,
    dir: usize,
    source_region: &[u16],
) -> bool {
    if let Some(index) = span.neighbours[dir] {
        let other_span =
            tile.cells[get_neighbour_index(tile.tile_side, c_i, dir)].spans[index as usize];
        return source_region[other_span.tile_index] != source_region[span.tile_index];
    }
    true
}

fn add_unique_floor_region(region: &mut Region, region_id: u16) {
    if region.floors.contains(&region_id) {
        return;
    }
    region.floors.push(region_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightfield::{build_heightfield_tile, InputTriangle};
    use glam::{UVec2, Vec3, Vec3A};

    #[test]
    fn flat_floor_gets_single_monotone_region() {
        let settings = BuildSettings::from_agent_and_bounds(0.4, 1.8, Vec3::ZERO, Vec3::splat(20.0))
            .with_region_area(0, 0);
        let tri_a = InputTriangle {
            vertices: [
                Vec3A::new(0.0, 1.0, 0.0),
                Vec3A::new(10.0, 1.0, 0.0),
                Vec3A::new(0.0, 1.0, 10.0),
            ],
            area: Some(crate::area::Area::GROUND),
        };
        let tri_b = InputTriangle {
            vertices: [
                Vec3A::new(10.0, 1.0, 0.0),
                Vec3A::new(10.0, 1.0, 10.0),
                Vec3A::new(0.0, 1.0, 10.0),
            ],
            area: Some(crate::area::Area::GROUND),
        };
        let voxelized = build_heightfield_tile(UVec2::ZERO, &[tri_a, tri_b], &settings);
        let mut open = crate::compact_heightfield::build_open_heightfield_tile(voxelized, &settings);
        crate::compact_heightfield::calculate_distance_field(&mut open);

        build_regions_monotone(&mut open, &settings);

        let has_region = open
            .cells
            .iter()
            .flat_map(|cell| cell.spans.iter())
            .any(|span| span.region != 0);
        assert!(has_region);
    }
}

//! Build orchestrator (C12): drives C2-C8 per tile (or once, for a solo
//! mesh), maps area ids to sample flags, and inserts the result into a
//! freshly created [`NavMesh`] via [`NavMesh::add_tile`].
//!
//! Grounded on the teacher's tile-generation driver (`send_tile_rebuild_tasks_system`
//! in `lib.rs`, which collects per-tile geometry, calls `build_tile_sync`, and
//! hands the result to `NavMeshTiles`) but restructured as a plain synchronous
//! function over a caller-supplied triangle soup rather than an ECS system
//! polling `NavMeshAffector` components and a Bevy task pool: this crate has
//! no runtime to schedule tasks on (§1 "out of scope": CLI front-end, async
//! scheduling are external collaborators).

use glam::{UVec2, Vec2, Vec3};

use crate::area::{area_to_flags, Area};
use crate::compact_heightfield::{
    build_open_heightfield_tile, calculate_distance_field, erode_walkable_area,
    mark_convex_poly_area,
};
use crate::config::BuildSettings;
use crate::contour::build_contours;
use crate::detail_mesh::build_detail_mesh;
use crate::error::{BuildError, BuildSettingsError};
use crate::heightfield::{build_heightfield_tile, InputTriangle};
use crate::mesher::build_poly_mesh;
use crate::nav_mesh::{build_tile_data, OffMeshConnectionDef, TileData};
use crate::runtime::{NavMesh, NavMeshParams};

/// A flat triangle soup in world space, as an external OBJ loader would
/// supply it (§1 "out of scope": OBJ loading; this is the interface it
/// hands in).
pub struct InputGeometry {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<[u32; 3]>,
}

impl InputGeometry {
    pub fn triangle(&self, i: usize) -> [Vec3; 3] {
        let [a, b, c] = self.indices[i];
        [
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ]
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }
}

/// A caller-supplied convex xz area volume, painted onto the compact
/// heightfield after erosion (§4.2 `markConvexPolyArea`) — the interface an
/// external "area volume" authoring tool would hand in.
pub struct AreaVolume {
    pub polygon: Vec<Vec2>,
    pub height_min: f32,
    pub height_max: f32,
    pub area: Area,
}

/// Runs C2-C7 for a single tile (or the one tile of a solo mesh) and packs
/// the result into a [`TileData`], or `None` if the tile has no walkable
/// geometry at all (an empty region/contour set is not an error, just an
/// empty tile that is skipped rather than inserted).
fn build_tile(
    tile: UVec2,
    layer: i32,
    geometry: &InputGeometry,
    settings: &BuildSettings,
    area_volumes: &[AreaVolume],
    off_mesh_cons: &[OffMeshConnectionDef],
) -> Option<TileData> {
    #[cfg(feature = "trace")]
    let _span = tracing::info_span!("build tile", x = tile.x, y = tile.y).entered();

    let origin = settings.tile_origin_with_border(tile);
    let side = settings.tile_side_with_border() as f32 * settings.cell_size;
    let tile_min = origin;
    let tile_max = origin + Vec2::splat(side);

    let mut triangles = Vec::new();
    for i in 0..geometry.triangle_count() {
        let [a, b, c] = geometry.triangle(i);

        let tri_min_x = a.x.min(b.x).min(c.x);
        let tri_max_x = a.x.max(b.x).max(c.x);
        let tri_min_z = a.z.min(b.z).min(c.z);
        let tri_max_z = a.z.max(b.z).max(c.z);
        if tri_max_x < tile_min.x || tri_min_x > tile_max.x || tri_max_z < tile_min.y || tri_min_z > tile_max.y {
            continue;
        }

        let to_local = |v: Vec3| -> Vec3 {
            Vec3::new(v.x - origin.x, v.y - settings.nav_mesh_bmin.y, v.z - origin.y)
        };

        triangles.push(InputTriangle {
            vertices: [to_local(a).into(), to_local(b).into(), to_local(c).into()],
            area: Some(Area::GROUND),
        });
    }

    if triangles.is_empty() {
        return None;
    }

    let voxelized = build_heightfield_tile(tile, &triangles, settings);
    let mut open_tile = build_open_heightfield_tile(voxelized, settings);
    if open_tile.span_count == 0 {
        return None;
    }

    erode_walkable_area(&mut open_tile, settings);

    for volume in area_volumes {
        mark_convex_poly_area(
            &mut open_tile,
            origin,
            &volume.polygon,
            volume.height_min,
            volume.height_max,
            volume.area,
            settings,
        );
    }

    calculate_distance_field(&mut open_tile);
    crate::regions::build_regions(&mut open_tile, settings);

    let contours = build_contours(&open_tile, settings);
    if contours.contours.is_empty() {
        return None;
    }

    let mut poly_mesh = build_poly_mesh(&contours, settings);
    if poly_mesh.poly_count() == 0 {
        return None;
    }

    // §4.11 "map Recast area IDs to sample flags".
    for p in 0..poly_mesh.poly_count() {
        poly_mesh.flags[p] = area_to_flags(poly_mesh.areas[p]).bits();
    }

    let detail_mesh = build_detail_mesh(&open_tile, &poly_mesh, settings);

    Some(build_tile_data(
        tile,
        layer,
        &poly_mesh,
        &detail_mesh,
        settings,
        off_mesh_cons,
    ))
}

/// Smallest power-of-two bit width that can represent `count` distinct
/// values, capped at `max_bits` (§4.11 `tileBits = min(..., 14)`).
fn capped_bits(count: u32, max_bits: u32) -> u32 {
    count.max(1).next_power_of_two().trailing_zeros().min(max_bits)
}

/// Builds a single tile covering the whole `nav_mesh_bmin..bmax` footprint
/// (§4.11 "For solo mesh: one tile covering the whole geometry AABB") and
/// returns a [`NavMesh`] containing just that tile, or
/// [`BuildError::EmptyGeometry`] if no walkable span survives the pipeline.
pub fn build_solo_mesh(
    geometry: &InputGeometry,
    settings: &BuildSettings,
    area_volumes: &[AreaVolume],
    off_mesh_cons: &[OffMeshConnectionDef],
) -> Result<NavMesh, BuildError> {
    settings.validate().map_err(BuildError::Settings)?;

    let mut solo_settings = settings.clone();
    solo_settings.tile_size = settings.solo_tile_voxels();

    let tile_data = build_tile(
        UVec2::ZERO,
        0,
        geometry,
        &solo_settings,
        area_volumes,
        off_mesh_cons,
    )
    .ok_or(BuildError::EmptyGeometry)?;

    let poly_count = tile_data.polys.len() as u32;
    let params = NavMeshParams {
        origin: solo_settings.nav_mesh_bmin,
        tile_width: solo_settings.tile_size_world(),
        tile_height: solo_settings.tile_size_world(),
        max_tiles: 1,
        max_polys_per_tile: poly_count.max(1).next_power_of_two(),
    };

    let mut nav_mesh = NavMesh::new(params)?;
    nav_mesh.add_tile(tile_data, None)?;
    Ok(nav_mesh)
}

/// Builds every tile of a `(tw, th)` grid covering `nav_mesh_bmin..bmax`
/// (§4.11 "For tile mesh"), skipping tiles with no walkable geometry, and
/// returns the assembled [`NavMesh]. Tile/poly bit widths follow
/// `tileBits = min(ceil(log2(nextpow2(tw*th))), 14), polyBits = 22 - tileBits`.
pub fn build_tiled_mesh(
    geometry: &InputGeometry,
    settings: &BuildSettings,
    area_volumes: &[AreaVolume],
    off_mesh_cons: &[OffMeshConnectionDef],
) -> Result<NavMesh, BuildError> {
    settings.validate().map_err(BuildError::Settings)?;
    if settings.tile_size == 0 {
        return Err(BuildError::Settings(BuildSettingsError::NonPositiveCellSize));
    }

    let dims = settings.tiles_along_axis();
    let tile_bits = capped_bits(dims.x * dims.y, 14);
    let poly_bits = 22 - tile_bits;

    let params = NavMeshParams {
        origin: settings.nav_mesh_bmin,
        tile_width: settings.tile_size_world(),
        tile_height: settings.tile_size_world(),
        max_tiles: 1u32 << tile_bits,
        max_polys_per_tile: 1u32 << poly_bits,
    };
    let mut nav_mesh = NavMesh::new(params)?;

    let mut built_any = false;
    for y in 0..dims.y {
        for x in 0..dims.x {
            let tile = UVec2::new(x, y);
            let Some(tile_data) = build_tile(tile, 0, geometry, settings, area_volumes, off_mesh_cons) else {
                continue;
            };
            nav_mesh.add_tile(tile_data, None)?;
            built_any = true;
        }
    }

    if !built_any {
        return Err(BuildError::EmptyGeometry);
    }

    Ok(nav_mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn flat_plane(half_extent: f32) -> InputGeometry {
        InputGeometry {
            vertices: vec![
                Vec3::new(-half_extent, 0.0, -half_extent),
                Vec3::new(half_extent, 0.0, -half_extent),
                Vec3::new(half_extent, 0.0, half_extent),
                Vec3::new(-half_extent, 0.0, half_extent),
            ],
            indices: vec![[0, 1, 2], [0, 2, 3]],
        }
    }

    #[test]
    fn solo_build_produces_a_walkable_tile() {
        let settings = BuildSettings::from_agent_and_bounds(
            0.4,
            1.8,
            Vec3::new(-20.0, -1.0, -20.0),
            Vec3::new(20.0, 1.0, 20.0),
        )
        .with_region_area(0, 0);
        let geometry = flat_plane(15.0);

        let nav_mesh = build_solo_mesh(&geometry, &settings, &[], &[]).expect("solo build should succeed");
        assert_eq!(nav_mesh.tile_count(), 1);
        assert!(nav_mesh.tile(0).is_some());
    }

    #[test]
    fn empty_geometry_is_rejected() {
        let settings = BuildSettings::from_agent_and_bounds(
            0.4,
            1.8,
            Vec3::new(-20.0, -1.0, -20.0),
            Vec3::new(20.0, 1.0, 20.0),
        );
        let geometry = InputGeometry {
            vertices: Vec::new(),
            indices: Vec::new(),
        };

        let result = build_solo_mesh(&geometry, &settings, &[], &[]);
        assert!(matches!(result, Err(BuildError::EmptyGeometry)));
    }

    #[test]
    fn tiled_build_covers_a_multi_tile_plane() {
        let settings = BuildSettings::from_agent_and_bounds(
            0.4,
            1.8,
            Vec3::new(-20.0, -1.0, -20.0),
            Vec3::new(20.0, 1.0, 20.0),
        )
        .with_region_area(0, 0)
        .with_tile_size(40);
        let geometry = flat_plane(18.0);

        let nav_mesh = build_tiled_mesh(&geometry, &settings, &[], &[]).expect("tiled build should succeed");
        assert!(nav_mesh.tile_count() >= 1);
    }
}

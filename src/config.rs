//! Build settings (§6 "Build settings") — the struct an external YAML loader
//! fills in and hands to the build orchestrator (C12). Mirrors the teacher's
//! `NavMeshSettings`: a plain, `Clone`-able settings struct with a
//! convenience constructor plus `with_*` builder methods.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::BuildSettingsError;

/// Region partitioning strategy (C4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionType {
    Watershed,
    Monotone,
    /// Accepted for forward-compatibility with the reference settings
    /// format; layer partitioning is not implemented (§9 design notes), a
    /// build with this setting falls back to `Monotone` and logs a warning.
    Layer,
}

/// Settings controlling height-corrected detail mesh generation (C7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DetailMeshSettings {
    /// Maximum acceptable deviation between the detail mesh and the sampled
    /// heightfield, in cell heights.
    pub sample_max_error: f32,
    /// Sampling spacing over the polygon, in cells.
    pub sample_distance: f32,
}

/// Settings for building a navigation mesh, equivalent in role to the
/// teacher's `NavMeshSettings` but covering the full build pipeline (C2-C12)
/// rather than only the runtime tile-grid geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSettings {
    /// Horizontal voxel size in world units (`cs` in the spec).
    pub cell_size: f32,
    /// Vertical voxel size in world units (`ch` in the spec).
    pub cell_height: f32,

    /// Agent height in world units, used to derive `walkable_height`.
    pub agent_height: f32,
    /// Agent radius in world units, used to derive `walkable_radius`.
    pub agent_radius: f32,
    /// Maximum step height the agent can climb, in world units.
    pub agent_max_climb: f32,
    /// Maximum walkable slope in degrees.
    pub agent_max_slope: f32,

    /// Minimum region size, in voxels squared.
    pub region_min_size: u32,
    /// Regions smaller than this are merged into a neighbor, in voxels squared.
    pub region_merge_size: u32,

    /// Maximum contour edge length before it's split, in world units.
    pub edge_max_len: f32,
    /// Maximum simplification error, in voxels.
    pub edge_max_error: f32,
    /// Maximum vertices per navmesh polygon (3..=6).
    pub verts_per_poly: u8,

    /// Detail-mesh sampling distance, in cells.
    pub detail_sample_dist: f32,
    /// Detail-mesh maximum sampling error, in cells.
    pub detail_sample_max_error: f32,

    pub partition_type: PartitionType,

    /// World-space bounds of the whole navigable area.
    pub nav_mesh_bmin: Vec3,
    pub nav_mesh_bmax: Vec3,

    /// Tile edge length in voxels; 0 means a single solo tile covering the
    /// whole `nav_mesh_bmin..nav_mesh_bmax` AABB (C12).
    pub tile_size: u16,
}

impl BuildSettings {
    /// Convenience constructor mirroring the teacher's
    /// `NavMeshSettings::from_agent_and_bounds`: reasonable defaults derived
    /// from agent dimensions and world bounds.
    pub fn from_agent_and_bounds(
        agent_radius: f32,
        agent_height: f32,
        nav_mesh_bmin: Vec3,
        nav_mesh_bmax: Vec3,
    ) -> Self {
        let cell_size = agent_radius / 2.0;
        let cell_height = agent_radius / 4.0;

        Self {
            cell_size,
            cell_height,
            agent_height,
            agent_radius,
            agent_max_climb: cell_height * 3.0,
            agent_max_slope: 50.0,
            region_min_size: 100,
            region_merge_size: 500,
            edge_max_len: 80.0 * cell_size,
            edge_max_error: 1.1,
            verts_per_poly: 6,
            detail_sample_dist: 6.0,
            detail_sample_max_error: 1.0,
            partition_type: PartitionType::Monotone,
            nav_mesh_bmin,
            nav_mesh_bmax,
            tile_size: 0,
        }
    }

    pub fn with_partition_type(mut self, partition_type: PartitionType) -> Self {
        self.partition_type = partition_type;
        self
    }

    pub fn with_region_area(mut self, min_size: u32, merge_size: u32) -> Self {
        self.region_min_size = min_size;
        self.region_merge_size = merge_size;
        self
    }

    pub fn with_verts_per_poly(mut self, verts_per_poly: u8) -> Self {
        self.verts_per_poly = verts_per_poly;
        self
    }

    pub fn with_tile_size(mut self, tile_size: u16) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_edge_max_error(mut self, edge_max_error: f32) -> Self {
        self.edge_max_error = edge_max_error;
        self
    }

    pub fn with_detail_mesh(mut self, settings: DetailMeshSettings) -> Self {
        self.detail_sample_dist = settings.sample_distance;
        self.detail_sample_max_error = settings.sample_max_error;
        self
    }

    /// Walkable height in cell heights, rounded up.
    #[inline]
    pub fn walkable_height(&self) -> u16 {
        (self.agent_height / self.cell_height).ceil() as u16
    }

    /// Walkable radius in cells, rounded up.
    #[inline]
    pub fn walkable_radius(&self) -> u16 {
        (self.agent_radius / self.cell_size).ceil() as u16
    }

    /// Max climbable step in cell heights.
    #[inline]
    pub fn walkable_climb(&self) -> u16 {
        (self.agent_max_climb / self.cell_height).ceil() as u16
    }

    #[inline]
    pub fn max_traversable_slope_radians(&self) -> f32 {
        self.agent_max_slope.to_radians()
    }

    /// Length of a tile's side in world units. Only meaningful when
    /// `tile_size != 0`; solo builds use `nav_mesh_bmin/bmax` directly.
    #[inline]
    pub fn tile_size_world(&self) -> f32 {
        self.cell_size * f32::from(self.tile_size)
    }

    /// Per-tile build AABB expansion, in voxels: `walkableRadius + 3`, wide
    /// enough that erosion and boundary detection near a tile edge see the
    /// same spans a neighbor tile would.
    #[inline]
    pub fn border_voxels(&self) -> u16 {
        self.walkable_radius() + 3
    }

    #[inline]
    pub fn border_size(&self) -> f32 {
        f32::from(self.border_voxels()) * self.cell_size
    }

    /// Minimum xz bound of `tile`, not including the border.
    #[inline]
    pub fn tile_origin(&self, tile: glam::UVec2) -> glam::Vec2 {
        glam::Vec2::new(self.nav_mesh_bmin.x, self.nav_mesh_bmin.z)
            + tile.as_vec2() * self.tile_size_world()
    }

    /// Minimum xz bound of `tile`, including the `border_size()` margin used
    /// to let rasterization see geometry just outside the tile (so that
    /// spans erode correctly up to the tile edge).
    #[inline]
    pub fn tile_origin_with_border(&self, tile: glam::UVec2) -> glam::Vec2 {
        self.tile_origin(tile) - self.border_size()
    }

    /// Side length, in voxels, of a tile's voxel grid including the border
    /// margin on both sides.
    #[inline]
    pub fn tile_side_with_border(&self) -> usize {
        usize::from(self.tile_size) + usize::from(self.border_voxels()) * 2
    }

    /// Voxel-grid edge length that makes a single `tile_size == 0` "solo"
    /// tile cover the whole `nav_mesh_bmin..bmax` footprint, for the build
    /// orchestrator (C12) to substitute before running the per-tile pipeline
    /// with `tile == (0, 0)`.
    pub fn solo_tile_voxels(&self) -> u16 {
        let extent = self.nav_mesh_bmax - self.nav_mesh_bmin;
        let cells = (extent.x / self.cell_size)
            .ceil()
            .max((extent.z / self.cell_size).ceil());
        (cells.max(1.0) as u32).min(u16::MAX as u32) as u16
    }

    /// Number of tiles along each axis needed to cover `nav_mesh_bmin..bmax`.
    pub fn tiles_along_axis(&self) -> glam::UVec2 {
        if self.tile_size == 0 {
            return glam::UVec2::ONE;
        }
        let extent = self.nav_mesh_bmax - self.nav_mesh_bmin;
        let tile_size = self.tile_size_world();
        glam::UVec2::new(
            (extent.x / tile_size).ceil().max(1.0) as u32,
            (extent.z / tile_size).ceil().max(1.0) as u32,
        )
    }

    pub fn validate(&self) -> Result<(), BuildSettingsError> {
        if !(3..=6).contains(&self.verts_per_poly) {
            return Err(BuildSettingsError::VertsPerPoly(self.verts_per_poly));
        }
        if self.cell_size <= 0.0 || self.cell_height <= 0.0 {
            return Err(BuildSettingsError::NonPositiveCellSize);
        }
        if !(self.nav_mesh_bmax.cmpgt(self.nav_mesh_bmin).all()) {
            return Err(BuildSettingsError::InvertedBounds);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_verts_per_poly() {
        let settings = BuildSettings::from_agent_and_bounds(
            0.4,
            1.8,
            Vec3::ZERO,
            Vec3::splat(100.0),
        )
        .with_verts_per_poly(2);
        assert_eq!(
            settings.validate(),
            Err(BuildSettingsError::VertsPerPoly(2))
        );
    }

    #[test]
    fn derives_walkable_height_from_agent() {
        let settings = BuildSettings::from_agent_and_bounds(
            0.4,
            1.8,
            Vec3::ZERO,
            Vec3::splat(100.0),
        );
        assert!(settings.walkable_height() > 0);
        assert!(settings.validate().is_ok());
    }
}

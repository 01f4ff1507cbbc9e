//! `NavMeshSet` archive (de)serialization (§6): a small container format
//! bundling every tile of a built [`NavMesh`] plus the params needed to
//! reconstruct it, for saving to and loading from disk.
//!
//! Grounded on the same explicit little-endian byte-packing style as
//! `nav_mesh.rs`'s tile blob (`TileData::to_bytes`/`from_bytes`), since the
//! wire layout in §6 is specified byte-for-byte and a generic derive-based
//! codec cannot guarantee that. `NavMesh::add_tile` is invoked once per
//! parsed tile exactly as the spec's `addTile(blob, tileRef)` loop
//! describes.

use glam::Vec3;

use crate::error::NavMeshSetError;
use crate::nav_mesh::TileData;
use crate::runtime::{NavMesh, NavMeshParams, PolyRef};

const NAVMESH_SET_MAGIC: u32 = 0x4D53_4554; // 'M' 'S' 'E' 'T'
const NAVMESH_SET_VERSION: u32 = 1;

fn push_vec3(buf: &mut Vec<u8>, v: Vec3) {
    buf.extend_from_slice(&v.x.to_le_bytes());
    buf.extend_from_slice(&v.y.to_le_bytes());
    buf.extend_from_slice(&v.z.to_le_bytes());
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Cursor { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], NavMeshSetError> {
        if self.pos + n > self.bytes.len() {
            return Err(NavMeshSetError::Truncated);
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, NavMeshSetError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn i32(&mut self) -> Result<i32, NavMeshSetError> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn f32(&mut self) -> Result<f32, NavMeshSetError> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn vec3(&mut self) -> Result<Vec3, NavMeshSetError> {
        Ok(Vec3::new(self.f32()?, self.f32()?, self.f32()?))
    }
}

/// Serializes every live tile of `nav_mesh` into a single `NavMeshSet`
/// archive: `{magic, version, numTiles, params}` followed by
/// `{tileRef, dataSize, data}` per tile (§6 "NavMeshSet archive").
///
/// Tiles are re-derived from their runtime `MeshTile` rather than kept as
/// the original `TileData`, since `NavMesh` owns tiles exclusively once
/// added (§5 "Ownership") and never retains the pre-link blob.
pub fn save_navmesh_set(nav_mesh: &NavMesh) -> Vec<u8> {
    let mut buf = Vec::new();

    buf.extend_from_slice(&NAVMESH_SET_MAGIC.to_le_bytes());
    buf.extend_from_slice(&NAVMESH_SET_VERSION.to_le_bytes());

    let live_tiles: Vec<(PolyRef, TileData)> = (0..nav_mesh.tile_count())
        .filter_map(|i| {
            let tile = nav_mesh.tile(i)?;
            Some((nav_mesh.tile_ref(i), tile.to_tile_data()))
        })
        .collect();

    buf.extend_from_slice(&(live_tiles.len() as i32).to_le_bytes());

    push_vec3(&mut buf, nav_mesh.origin());
    buf.extend_from_slice(&nav_mesh.tile_width().to_le_bytes());
    buf.extend_from_slice(&nav_mesh.tile_height().to_le_bytes());
    buf.extend_from_slice(&(nav_mesh.max_tiles() as u32).to_le_bytes());
    buf.extend_from_slice(&(nav_mesh.max_polys_per_tile() as u32).to_le_bytes());

    for (tile_ref, tile_data) in &live_tiles {
        let bytes = tile_data.to_bytes();
        buf.extend_from_slice(&tile_ref.0.to_le_bytes());
        buf.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
        buf.extend_from_slice(&bytes);
    }

    buf
}

/// Parses a `NavMeshSet` archive and replays `addTile(blob, tileRef)` for
/// every tile it contains, reconstructing the `NavMesh` it describes
/// (§6 "NavMeshSet archive").
pub fn load_navmesh_set(bytes: &[u8]) -> Result<NavMesh, NavMeshSetError> {
    let mut cursor = Cursor::new(bytes);

    let magic = cursor.u32()?;
    if magic != NAVMESH_SET_MAGIC {
        return Err(NavMeshSetError::WrongMagic);
    }
    let version = cursor.u32()?;
    if version != NAVMESH_SET_VERSION {
        return Err(NavMeshSetError::WrongVersion);
    }

    let num_tiles = cursor.i32()?;

    let origin = cursor.vec3()?;
    let tile_width = cursor.f32()?;
    let tile_height = cursor.f32()?;
    let max_tiles = cursor.u32()?;
    let max_polys_per_tile = cursor.u32()?;

    let mut nav_mesh = NavMesh::new(NavMeshParams {
        origin,
        tile_width,
        tile_height,
        max_tiles,
        max_polys_per_tile,
    })
    .map_err(|e| NavMeshSetError::AddTile {
        index: 0,
        reason: e.to_string(),
    })?;

    for index in 0..num_tiles.max(0) as usize {
        let tile_ref = PolyRef(cursor.u32()?);
        let data_size = cursor.i32()?;
        if data_size < 0 {
            return Err(NavMeshSetError::Truncated);
        }
        let blob = cursor.take(data_size as usize)?;

        let tile_data = TileData::from_bytes(blob).map_err(|source| NavMeshSetError::Tile { index, source })?;

        nav_mesh
            .add_tile(tile_data, Some(tile_ref))
            .map_err(|e| NavMeshSetError::AddTile {
                index,
                reason: e.to_string(),
            })?;
    }

    Ok(nav_mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{build_solo_mesh, InputGeometry};
    use crate::config::BuildSettings;
    use glam::Vec3 as GlamVec3;

    fn flat_plane(half_extent: f32) -> InputGeometry {
        InputGeometry {
            vertices: vec![
                GlamVec3::new(-half_extent, 0.0, -half_extent),
                GlamVec3::new(half_extent, 0.0, -half_extent),
                GlamVec3::new(half_extent, 0.0, half_extent),
                GlamVec3::new(-half_extent, 0.0, half_extent),
            ],
            indices: vec![[0, 1, 2], [0, 2, 3]],
        }
    }

    #[test]
    fn round_trips_a_solo_build() {
        let settings = BuildSettings::from_agent_and_bounds(
            0.4,
            1.8,
            GlamVec3::new(-20.0, -1.0, -20.0),
            GlamVec3::new(20.0, 1.0, 20.0),
        )
        .with_region_area(0, 0);
        let geometry = flat_plane(15.0);
        let nav_mesh = build_solo_mesh(&geometry, &settings, &[], &[]).unwrap();

        let archive = save_navmesh_set(&nav_mesh);
        let loaded = load_navmesh_set(&archive).expect("archive should parse");

        assert_eq!(loaded.tile_count(), nav_mesh.tile_count());
        let original_tile = nav_mesh.tile(0).unwrap();
        let loaded_tile = loaded.tile(0).unwrap();
        assert_eq!(loaded_tile.polys.len(), original_tile.polys.len());
        assert_eq!(loaded_tile.verts.len(), original_tile.verts.len());
    }

    #[test]
    fn rejects_wrong_magic() {
        let bytes = 0xdeadbeefu32.to_le_bytes().to_vec();
        assert!(matches!(load_navmesh_set(&bytes), Err(NavMeshSetError::WrongMagic)));
    }
}

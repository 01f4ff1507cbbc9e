//! Tile serialization (C8) and the runtime `NavMesh` tile graph (C9).
//!
//! The wire format is a flat, little-endian byte blob: a fixed header
//! followed by vertex/polygon/detail-mesh/detail-vert/detail-tri/bv-tree/
//! off-mesh-connection sections. The runtime rebuilds all linkage (the
//! per-polygon link chains) on `add_tile`; nothing about links is persisted.

use std::collections::HashMap;

use glam::{Vec2, Vec3};

use crate::area::Area;
use crate::config::BuildSettings;
use crate::detail_mesh::{DetailMesh, DetailMeshEntry, DetailTri};
use crate::error::TileParseError;
use crate::mesher::{PolyMesh, MESH_NULL_IDX};
use crate::runtime::PolyRef;

pub const NAVMESH_MAGIC: u32 = 0x444E_4156; // 'D' 'N' 'A' 'V'
pub const NAVMESH_VERSION: u32 = 7;
pub const VERTS_PER_POLYGON: usize = 6;
pub(crate) const NULL_LINK: u32 = u32::MAX;

/// `{firstLink, verts[6], neis[6], flags, vertCount, areaAndType}`.
#[derive(Clone, Debug)]
pub struct Poly {
    pub first_link: u32,
    pub verts: [u16; VERTS_PER_POLYGON],
    pub neis: [u16; VERTS_PER_POLYGON],
    pub flags: u16,
    pub vert_count: u8,
    area_and_type: u8,
}

impl Poly {
    pub fn area(&self) -> u8 {
        self.area_and_type & 0x3f
    }

    pub fn set_area(&mut self, area: u8) {
        self.area_and_type = (self.area_and_type & !0x3f) | (area & 0x3f);
    }

    pub fn is_off_mesh_connection(&self) -> bool {
        (self.area_and_type >> 6) == 1
    }

    pub fn set_off_mesh_connection(&mut self, is_off_mesh: bool) {
        self.area_and_type = (self.area_and_type & 0x3f) | if is_off_mesh { 1 << 6 } else { 0 };
    }

    fn new(vert_count: u8, area: u8, off_mesh: bool) -> Self {
        let mut poly = Poly {
            first_link: NULL_LINK,
            verts: [MESH_NULL_IDX; VERTS_PER_POLYGON],
            neis: [MESH_NULL_IDX; VERTS_PER_POLYGON],
            flags: 0,
            vert_count,
            area_and_type: 0,
        };
        poly.set_area(area);
        poly.set_off_mesh_connection(off_mesh);
        poly
    }
}

/// `{ref, next, edge, side, bmin, bmax}`, an entry in a polygon's
/// intrusive, free-listed link chain.
#[derive(Clone, Copy, Debug, Default)]
pub struct Link {
    pub poly_ref: PolyRef,
    pub next: u32,
    pub edge: u8,
    pub side: u8,
    pub bmin: u8,
    pub bmax: u8,
}

/// Flat BV-tree node: `i >= 0` is a leaf referencing a polygon, `i < 0` is
/// an internal node whose absolute value is the escape increment.
#[derive(Clone, Copy, Debug)]
pub struct BvNode {
    pub bmin: [u16; 3],
    pub bmax: [u16; 3],
    pub i: i32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct OffMeshConnection {
    pub pos: [Vec3; 2],
    pub radius: f32,
    pub poly: u16,
    pub bidirectional: bool,
    pub side: u8,
    pub user_id: u32,
}

/// User-supplied off-mesh connection request, in world space, fed into
/// `build_tile_data`.
#[derive(Clone, Copy, Debug)]
pub struct OffMeshConnectionDef {
    pub start: Vec3,
    pub end: Vec3,
    pub radius: f32,
    pub bidirectional: bool,
    pub area: Area,
    pub flags: u16,
    pub user_id: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct MeshHeader {
    pub x: i32,
    pub y: i32,
    pub layer: i32,
    pub poly_count: u32,
    pub vert_count: u32,
    pub max_link_count: u32,
    pub detail_mesh_count: u32,
    pub detail_vert_count: u32,
    pub detail_tri_count: u32,
    pub bv_node_count: u32,
    pub off_mesh_con_count: u32,
    pub bmin: Vec3,
    pub bmax: Vec3,
    pub bv_quant_factor: f32,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
}

/// A tile's data, either freshly built (`build_tile_data`) or parsed back
/// from a blob (`parse_tile`). `add_tile` consumes this and rebuilds the
/// link chains.
#[derive(Clone, Debug)]
pub struct TileData {
    pub header: MeshHeader,
    pub verts: Vec<Vec3>,
    pub polys: Vec<Poly>,
    pub detail_meshes: Vec<DetailMeshEntry>,
    pub detail_verts: Vec<Vec3>,
    pub detail_tris: Vec<DetailTri>,
    pub bv_tree: Vec<BvNode>,
    pub off_mesh_cons: Vec<OffMeshConnection>,
}

/// Converts a built `PolyMesh`/`DetailMesh` pair for one tile into the
/// runtime-independent `TileData` used by both serialization and
/// `NavMesh::add_tile`. `tile` is the tile grid coordinate (`(0,0)` for a
/// solo mesh); `layer` supports stacked tiles and is `0` unless multiple
/// voxel layers were built at the same `(x,y)`.
pub fn build_tile_data(
    tile: glam::UVec2,
    layer: i32,
    poly_mesh: &PolyMesh,
    detail_mesh: &DetailMesh,
    settings: &BuildSettings,
    off_mesh_cons: &[OffMeshConnectionDef],
) -> TileData {
    let origin = settings.tile_origin_with_border(tile);
    let to_world = |v: glam::IVec3| -> Vec3 {
        Vec3::new(
            origin.x + v.x as f32 * settings.cell_size,
            settings.nav_mesh_bmin.y + v.y as f32 * settings.cell_height,
            origin.y + v.z as f32 * settings.cell_size,
        )
    };

    let mut verts: Vec<Vec3> = poly_mesh.verts.iter().map(|&v| to_world(v)).collect();
    let mut bmin = Vec3::splat(f32::MAX);
    let mut bmax = Vec3::splat(f32::MIN);
    for v in &verts {
        bmin = bmin.min(*v);
        bmax = bmax.max(*v);
    }

    let npolys = poly_mesh.poly_count();
    let mut polys = Vec::with_capacity(npolys);
    let mut edge_count = 0u32;
    for p in 0..npolys {
        let vc = poly_mesh.poly_verts(p).len();
        let mut poly = Poly::new(vc as u8, poly_mesh.areas[p].0 as u8, false);
        poly.flags = poly_mesh.flags[p];
        for (i, &v) in poly_mesh.poly_verts(p).iter().enumerate() {
            poly.verts[i] = v;
        }
        for (i, &n) in poly_mesh.poly_neis(p).iter().enumerate() {
            poly.neis[i] = n;
            if n != MESH_NULL_IDX {
                edge_count += 1;
            }
        }
        polys.push(poly);
    }

    let off_mesh_start = verts.len() as u16;
    let mut off_mesh = Vec::with_capacity(off_mesh_cons.len());
    for def in off_mesh_cons {
        if !(bmin.x - def.radius <= def.start.x.max(def.end.x)
            && bmax.x + def.radius >= def.start.x.min(def.end.x)
            && bmin.z - def.radius <= def.start.z.max(def.end.z)
            && bmax.z + def.radius >= def.start.z.min(def.end.z))
        {
            continue;
        }

        let v0 = verts.len() as u16;
        verts.push(def.start);
        verts.push(def.end);

        let mut poly = Poly::new(2, def.area.0 as u8, true);
        poly.verts[0] = v0;
        poly.verts[1] = v0 + 1;
        poly.flags = def.flags;
        let poly_index = polys.len() as u16;
        polys.push(poly);

        off_mesh.push(OffMeshConnection {
            pos: [def.start, def.end],
            radius: def.radius,
            poly: poly_index,
            bidirectional: def.bidirectional,
            side: 0xff,
            user_id: def.user_id,
        });
    }
    let _ = off_mesh_start;

    let max_link_count = 2 * edge_count + 4 * off_mesh.len() as u32;

    let bv_quant_factor = 1.0 / settings.cell_size;
    let bv_tree = build_bv_tree(poly_mesh, &verts, npolys, bv_quant_factor, origin, settings);

    let mut detail_meshes = detail_mesh.meshes.clone();
    if detail_meshes.len() < polys.len() {
        // Off-mesh connections contribute no detail geometry.
        detail_meshes.resize(
            polys.len(),
            DetailMeshEntry {
                vert_base: 0,
                vert_count: 0,
                tri_base: 0,
                tri_count: 0,
            },
        );
    }

    let header = MeshHeader {
        x: tile.x as i32,
        y: tile.y as i32,
        layer,
        poly_count: polys.len() as u32,
        vert_count: verts.len() as u32,
        max_link_count,
        detail_mesh_count: detail_meshes.len() as u32,
        detail_vert_count: detail_mesh.verts.len() as u32,
        detail_tri_count: detail_mesh.tris.len() as u32,
        bv_node_count: bv_tree.len() as u32,
        off_mesh_con_count: off_mesh.len() as u32,
        bmin,
        bmax,
        bv_quant_factor,
        walkable_height: settings.agent_height,
        walkable_radius: settings.agent_radius,
        walkable_climb: settings.agent_max_climb,
    };

    let detail_verts = detail_mesh
        .verts
        .iter()
        .map(|v| {
            Vec3::new(
                origin.x + v.x as f32 * settings.cell_size,
                settings.nav_mesh_bmin.y + v.y as f32 * settings.cell_height,
                origin.y + v.z as f32 * settings.cell_size,
            )
        })
        .collect();

    TileData {
        header,
        verts,
        polys,
        detail_meshes,
        detail_verts,
        detail_tris: detail_mesh.tris.clone(),
        bv_tree,
        off_mesh_cons: off_mesh,
    }
}

struct BvItem {
    poly: u32,
    bmin: [u16; 3],
    bmax: [u16; 3],
}

fn build_bv_tree(
    poly_mesh: &PolyMesh,
    verts: &[Vec3],
    npolys: usize,
    quant_factor: f32,
    origin: Vec2,
    settings: &BuildSettings,
) -> Vec<BvNode> {
    let local = |v: Vec3| -> [u16; 3] {
        [
            (((v.x - origin.x) * quant_factor).floor().max(0.0)) as u16,
            ((v.y / settings.cell_height).floor().max(0.0)) as u16,
            (((v.z - origin.y) * quant_factor).floor().max(0.0)) as u16,
        ]
    };

    let mut items: Vec<BvItem> = Vec::with_capacity(npolys);
    for p in 0..npolys {
        let mut bmin = [u16::MAX; 3];
        let mut bmax = [0u16; 3];
        for &v in poly_mesh.poly_verts(p) {
            let q = local(verts[v as usize]);
            for axis in 0..3 {
                bmin[axis] = bmin[axis].min(q[axis]);
                bmax[axis] = bmax[axis].max(q[axis].saturating_add(1));
            }
        }
        items.push(BvItem {
            poly: p as u32,
            bmin,
            bmax,
        });
    }

    if items.is_empty() {
        return Vec::new();
    }

    let mut nodes = Vec::with_capacity(items.len() * 2);
    subdivide(&mut items, &mut nodes);
    nodes
}

/// Recursive median-split BV-tree build (Recast/Detour `subdivide`): pick
/// the longest axis of the items' combined bounds, sort by center along
/// it, split at the midpoint, recurse. Leaves store the polygon index;
/// internal nodes store the negative escape increment once both children
/// are known.
fn subdivide(items: &mut [BvItem], nodes: &mut Vec<BvNode>) -> usize {
    let node_index = nodes.len();

    if items.len() == 1 {
        nodes.push(BvNode {
            bmin: items[0].bmin,
            bmax: items[0].bmax,
            i: items[0].poly as i32,
        });
        return 1;
    }

    let mut bmin = [u16::MAX; 3];
    let mut bmax = [0u16; 3];
    for item in items.iter() {
        for axis in 0..3 {
            bmin[axis] = bmin[axis].min(item.bmin[axis]);
            bmax[axis] = bmax[axis].max(item.bmax[axis]);
        }
    }
    let extent = [
        bmax[0] - bmin[0],
        bmax[1] - bmin[1],
        bmax[2] - bmin[2],
    ];
    let axis = if extent[0] > extent[1] && extent[0] > extent[2] {
        0
    } else if extent[1] > extent[2] {
        1
    } else {
        2
    };

    items.sort_by_key(|item| item.bmin[axis] as u32 + item.bmax[axis] as u32);

    // Reserve this node's slot; fill it in once the subtree size is known.
    nodes.push(BvNode {
        bmin,
        bmax,
        i: 0,
    });

    let split = items.len() / 2;
    let (left, right) = items.split_at_mut(split);
    let left_count = subdivide(left, nodes);
    let right_count = subdivide(right, nodes);
    let escape = 1 + left_count + right_count;
    nodes[node_index].i = -(escape as i32);
    escape
}

// ---------------------------------------------------------------------
// Wire format (§4.7/§6): little-endian, 4-byte-aligned sections in a fixed
// order. Link entries are written as zeroed placeholders — `add_tile`
// rebuilds every link chain from the polygon neighbor table on load, so
// nothing about links is meaningful on disk beyond reserving their count.
// ---------------------------------------------------------------------

const LINK_RECORD_SIZE: usize = 12;
const DETAIL_MESH_RECORD_SIZE: usize = 16;
const DETAIL_VERT_RECORD_SIZE: usize = 12;
const DETAIL_TRI_RECORD_SIZE: usize = 4;
const BV_NODE_RECORD_SIZE: usize = 16;
const OFF_MESH_RECORD_SIZE: usize = 36;

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
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TileParseError> {
        let end = self.pos.checked_add(n).ok_or(TileParseError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(TileParseError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, TileParseError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn i32(&mut self) -> Result<i32, TileParseError> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u16(&mut self) -> Result<u16, TileParseError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u8(&mut self) -> Result<u8, TileParseError> {
        Ok(self.take(1)?[0])
    }

    fn f32(&mut self) -> Result<f32, TileParseError> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn vec3(&mut self) -> Result<Vec3, TileParseError> {
        Ok(Vec3::new(self.f32()?, self.f32()?, self.f32()?))
    }
}

impl TileData {
    /// Packs this tile into the on-wire blob described in §4.7/§6: header,
    /// then verts/polys/links/detail-meshes/detail-verts/detail-tris/
    /// bv-tree/off-mesh-connections, each section already a multiple of 4
    /// bytes so no inter-section padding is needed.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        buf.extend_from_slice(&NAVMESH_MAGIC.to_le_bytes());
        buf.extend_from_slice(&NAVMESH_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.header.x.to_le_bytes());
        buf.extend_from_slice(&self.header.y.to_le_bytes());
        buf.extend_from_slice(&self.header.layer.to_le_bytes());
        buf.extend_from_slice(&self.header.poly_count.to_le_bytes());
        buf.extend_from_slice(&self.header.vert_count.to_le_bytes());
        buf.extend_from_slice(&self.header.max_link_count.to_le_bytes());
        buf.extend_from_slice(&self.header.detail_mesh_count.to_le_bytes());
        buf.extend_from_slice(&self.header.detail_vert_count.to_le_bytes());
        buf.extend_from_slice(&self.header.detail_tri_count.to_le_bytes());
        buf.extend_from_slice(&self.header.bv_node_count.to_le_bytes());
        buf.extend_from_slice(&self.header.off_mesh_con_count.to_le_bytes());
        push_vec3(&mut buf, self.header.bmin);
        push_vec3(&mut buf, self.header.bmax);
        buf.extend_from_slice(&self.header.bv_quant_factor.to_le_bytes());
        buf.extend_from_slice(&self.header.walkable_height.to_le_bytes());
        buf.extend_from_slice(&self.header.walkable_radius.to_le_bytes());
        buf.extend_from_slice(&self.header.walkable_climb.to_le_bytes());

        for v in &self.verts {
            push_vec3(&mut buf, *v);
        }

        for poly in &self.polys {
            buf.extend_from_slice(&poly.first_link.to_le_bytes());
            for v in poly.verts {
                buf.extend_from_slice(&v.to_le_bytes());
            }
            for n in poly.neis {
                buf.extend_from_slice(&n.to_le_bytes());
            }
            buf.extend_from_slice(&poly.flags.to_le_bytes());
            buf.push(poly.vert_count);
            buf.push(poly.area_and_type);
        }

        // Link placeholders: `ref=0, next=NULL_LINK, edge=0, side=0xff, bmin=0, bmax=0`.
        for _ in 0..self.header.max_link_count {
            buf.extend_from_slice(&0u32.to_le_bytes());
            buf.extend_from_slice(&NULL_LINK.to_le_bytes());
            buf.extend_from_slice(&[0u8, 0xff, 0, 0]);
        }

        for mesh in &self.detail_meshes {
            buf.extend_from_slice(&mesh.vert_base.to_le_bytes());
            buf.extend_from_slice(&mesh.vert_count.to_le_bytes());
            buf.extend_from_slice(&mesh.tri_base.to_le_bytes());
            buf.extend_from_slice(&mesh.tri_count.to_le_bytes());
        }

        for v in &self.detail_verts {
            push_vec3(&mut buf, *v);
        }

        for tri in &self.detail_tris {
            buf.extend_from_slice(&tri.indices);
            buf.push(tri.flags);
        }

        for node in &self.bv_tree {
            for v in node.bmin {
                buf.extend_from_slice(&v.to_le_bytes());
            }
            for v in node.bmax {
                buf.extend_from_slice(&v.to_le_bytes());
            }
            buf.extend_from_slice(&node.i.to_le_bytes());
        }

        for con in &self.off_mesh_cons {
            push_vec3(&mut buf, con.pos[0]);
            push_vec3(&mut buf, con.pos[1]);
            buf.extend_from_slice(&con.radius.to_le_bytes());
            buf.extend_from_slice(&con.poly.to_le_bytes());
            buf.push(con.bidirectional as u8);
            buf.push(con.side);
            buf.extend_from_slice(&con.user_id.to_le_bytes());
        }

        debug_assert_eq!(buf.len() % 4, 0);
        buf
    }

    /// Parses a blob written by [`TileData::to_bytes`]. Rejects a wrong
    /// magic/version up front (§4.8 `add_tile` step 1); any other length
    /// mismatch is reported as [`TileParseError::Truncated`].
    pub fn from_bytes(bytes: &[u8]) -> Result<TileData, TileParseError> {
        let mut cursor = Cursor::new(bytes);

        let magic = cursor.u32()?;
        if magic != NAVMESH_MAGIC {
            return Err(TileParseError::WrongMagic);
        }
        let version = cursor.u32()?;
        if version != NAVMESH_VERSION {
            return Err(TileParseError::WrongVersion);
        }

        let header = MeshHeader {
            x: cursor.i32()?,
            y: cursor.i32()?,
            layer: cursor.i32()?,
            poly_count: cursor.u32()?,
            vert_count: cursor.u32()?,
            max_link_count: cursor.u32()?,
            detail_mesh_count: cursor.u32()?,
            detail_vert_count: cursor.u32()?,
            detail_tri_count: cursor.u32()?,
            bv_node_count: cursor.u32()?,
            off_mesh_con_count: cursor.u32()?,
            bmin: cursor.vec3()?,
            bmax: cursor.vec3()?,
            bv_quant_factor: cursor.f32()?,
            walkable_height: cursor.f32()?,
            walkable_radius: cursor.f32()?,
            walkable_climb: cursor.f32()?,
        };

        let mut verts = Vec::with_capacity(header.vert_count as usize);
        for _ in 0..header.vert_count {
            verts.push(cursor.vec3()?);
        }

        let mut polys = Vec::with_capacity(header.poly_count as usize);
        for _ in 0..header.poly_count {
            let first_link = cursor.u32()?;
            let mut poly_verts = [MESH_NULL_IDX; VERTS_PER_POLYGON];
            for slot in &mut poly_verts {
                *slot = cursor.u16()?;
            }
            let mut neis = [MESH_NULL_IDX; VERTS_PER_POLYGON];
            for slot in &mut neis {
                *slot = cursor.u16()?;
            }
            let flags = cursor.u16()?;
            let vert_count = cursor.u8()?;
            let area_and_type = cursor.u8()?;
            polys.push(Poly {
                first_link,
                verts: poly_verts,
                neis,
                flags,
                vert_count,
                area_and_type,
            });
        }

        cursor.take(header.max_link_count as usize * LINK_RECORD_SIZE)?;

        let mut detail_meshes = Vec::with_capacity(header.detail_mesh_count as usize);
        for _ in 0..header.detail_mesh_count {
            detail_meshes.push(DetailMeshEntry {
                vert_base: cursor.u32()?,
                vert_count: cursor.u32()?,
                tri_base: cursor.u32()?,
                tri_count: cursor.u32()?,
            });
        }

        let mut detail_verts = Vec::with_capacity(header.detail_vert_count as usize);
        for _ in 0..header.detail_vert_count {
            detail_verts.push(cursor.vec3()?);
        }

        let mut detail_tris = Vec::with_capacity(header.detail_tri_count as usize);
        for _ in 0..header.detail_tri_count {
            let indices_bytes = cursor.take(3)?;
            let indices = [indices_bytes[0], indices_bytes[1], indices_bytes[2]];
            let flags = cursor.u8()?;
            detail_tris.push(DetailTri { indices, flags });
        }

        let mut bv_tree = Vec::with_capacity(header.bv_node_count as usize);
        for _ in 0..header.bv_node_count {
            let mut bmin = [0u16; 3];
            for slot in &mut bmin {
                *slot = cursor.u16()?;
            }
            let mut bmax = [0u16; 3];
            for slot in &mut bmax {
                *slot = cursor.u16()?;
            }
            let i = cursor.i32()?;
            bv_tree.push(BvNode { bmin, bmax, i });
        }

        let mut off_mesh_cons = Vec::with_capacity(header.off_mesh_con_count as usize);
        for _ in 0..header.off_mesh_con_count {
            let pos = [cursor.vec3()?, cursor.vec3()?];
            let radius = cursor.f32()?;
            let poly = cursor.u16()?;
            let bidirectional = cursor.u8()? != 0;
            let side = cursor.u8()?;
            let user_id = cursor.u32()?;
            off_mesh_cons.push(OffMeshConnection {
                pos,
                radius,
                poly,
                bidirectional,
                side,
                user_id,
            });
        }

        let _ = (
            LINK_RECORD_SIZE,
            DETAIL_MESH_RECORD_SIZE,
            DETAIL_VERT_RECORD_SIZE,
            DETAIL_TRI_RECORD_SIZE,
            BV_NODE_RECORD_SIZE,
            OFF_MESH_RECORD_SIZE,
        );

        Ok(TileData {
            header,
            verts,
            polys,
            detail_meshes,
            detail_verts,
            detail_tris,
            bv_tree,
            off_mesh_cons,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::Area;
    use crate::config::BuildSettings;
    use crate::contour::build_contours;
    use crate::detail_mesh::build_detail_mesh;
    use crate::mesher::build_poly_mesh;
    use crate::regions::build_regions;
    use crate::compact_heightfield::build_open_heightfield_tile;
    use crate::heightfield::{build_heightfield_tile, InputTriangle};
    use glam::{UVec2, Vec3A};

    fn flat_quad_settings() -> BuildSettings {
        BuildSettings::from_agent_and_bounds(
            0.4,
            1.8,
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(10.0, 1.0, 10.0),
        )
    }

    fn build_flat_quad_tile(settings: &BuildSettings) -> TileData {
        let triangles = [
            InputTriangle {
                vertices: [
                    Vec3A::new(0.0, 0.0, 0.0),
                    Vec3A::new(10.0, 0.0, 0.0),
                    Vec3A::new(10.0, 0.0, 10.0),
                ],
                area: Some(Area::GROUND),
            },
            InputTriangle {
                vertices: [
                    Vec3A::new(0.0, 0.0, 0.0),
                    Vec3A::new(10.0, 0.0, 10.0),
                    Vec3A::new(0.0, 0.0, 10.0),
                ],
                area: Some(Area::GROUND),
            },
        ];

        let voxelized = build_heightfield_tile(UVec2::ZERO, &triangles, settings);
        let mut open_tile = build_open_heightfield_tile(voxelized, settings);
        build_regions(&mut open_tile, settings);
        let contours = build_contours(&open_tile, settings);
        let poly_mesh = build_poly_mesh(&contours, settings);
        let detail_mesh = build_detail_mesh(&open_tile, &poly_mesh, settings);

        build_tile_data(UVec2::ZERO, 0, &poly_mesh, &detail_mesh, settings, &[])
    }

    #[test]
    fn tile_blob_roundtrips_byte_identically() {
        let settings = flat_quad_settings();
        let tile = build_flat_quad_tile(&settings);
        assert!(tile.header.poly_count > 0);

        let bytes = tile.to_bytes();
        let parsed = TileData::from_bytes(&bytes).expect("parses its own blob");
        assert_eq!(bytes, parsed.to_bytes());
        assert_eq!(parsed.header.poly_count, tile.header.poly_count);
        assert_eq!(parsed.verts.len(), tile.verts.len());
    }

    #[test]
    fn from_bytes_rejects_wrong_magic() {
        let mut bytes = vec![0u8; 92];
        bytes[0..4].copy_from_slice(&0xdeadbeefu32.to_le_bytes());
        assert_eq!(TileData::from_bytes(&bytes), Err(TileParseError::WrongMagic));
    }

    #[test]
    fn from_bytes_rejects_wrong_version() {
        let mut bytes = vec![0u8; 92];
        bytes[0..4].copy_from_slice(&NAVMESH_MAGIC.to_le_bytes());
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        assert_eq!(TileData::from_bytes(&bytes), Err(TileParseError::WrongVersion));
    }

    #[test]
    fn from_bytes_rejects_truncated_blob() {
        let settings = flat_quad_settings();
        let tile = build_flat_quad_tile(&settings);
        let bytes = tile.to_bytes();
        let truncated = &bytes[..bytes.len() - 8];
        assert_eq!(TileData::from_bytes(truncated), Err(TileParseError::Truncated));
    }
}

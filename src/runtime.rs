//! The runtime tile graph (C9): opaque polygon references, the tile grid
//! with its hashed position lookup and free-listed slots, and the
//! inter/intra-tile link construction that `add_tile` performs.
//!
//! Grounded on the teacher's `tiles.rs`/`query.rs` shape — links are small
//! discriminated unions tagged with a direction (`Link::Internal` /
//! `Link::External { direction: EdgeConnectionDirection, .. }`) threaded
//! per-polygon — generalized from the teacher's `UVec2` tile coordinate and
//! untagged `u16` polygon index to the spec's opaque `PolyRef` packing
//! `(salt, tile index, poly index)` with configurable bit widths, a
//! `posLookup` hash grid, and free-listed tile slots (§3 "NavMesh", §4.8).

use glam::Vec3;

use crate::error::{AddTileError, NavMeshInitError, RemoveTileError};
use crate::nav_mesh::{BvNode, Link, Poly, TileData, NULL_LINK, VERTS_PER_POLYGON};
use crate::mesher::{MESH_NULL_IDX, NEIS_EXT_LINK};

/// Opaque handle packing `(salt, tile index, poly index)`. A zero ref is
/// reserved to mean "no polygon" (§3 "Polygon reference").
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolyRef(pub u32);

impl PolyRef {
    pub const NONE: PolyRef = PolyRef(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// `dtOppositeTile`: the neighbor direction that mirrors a crossing, used
/// both to validate link symmetry (P2) and to build the reciprocal link
/// set when two tiles become adjacent.
pub fn opposite_side(side: u8) -> u8 {
    (side + 4) & 7
}

/// xz offset, in tile-grid coordinates, of one of the four cardinal
/// directions the mesher ever tags a boundary edge with (§4.5 `Side`).
fn side_offset(side: u8) -> Option<(i32, i32)> {
    match side {
        0 => Some((0, -1)),  // North: -z
        2 => Some((1, 0)),   // East: +x
        4 => Some((0, 1)),   // South: +z
        6 => Some((-1, 0)),  // West: -x
        _ => None,
    }
}

/// Runtime init parameters (§3 "NavMesh"): grid origin/tile size plus the
/// counts `add_tile`/`init` derive `(saltBits, tileBits, polyBits)` from.
#[derive(Clone, Copy, Debug)]
pub struct NavMeshParams {
    pub origin: Vec3,
    pub tile_width: f32,
    pub tile_height: f32,
    pub max_tiles: u32,
    pub max_polys_per_tile: u32,
}

/// A built/loaded tile's live contents, owned exclusively by the `NavMesh`
/// slot holding it (§5 "Ownership"). Link chains here are rebuilt by
/// `add_tile`; nothing about them survives a `to_bytes`/`from_bytes` round
/// trip.
#[derive(Clone)]
pub struct MeshTile {
    pub header: crate::nav_mesh::MeshHeader,
    pub verts: Vec<Vec3>,
    pub polys: Vec<Poly>,
    pub links: Vec<Link>,
    links_free_list: u32,
    pub detail_meshes: Vec<crate::detail_mesh::DetailMeshEntry>,
    pub detail_verts: Vec<Vec3>,
    pub detail_tris: Vec<crate::detail_mesh::DetailTri>,
    pub bv_tree: Vec<BvNode>,
    pub off_mesh_cons: Vec<crate::nav_mesh::OffMeshConnection>,
}

impl MeshTile {
    /// Reconstructs the runtime-independent [`TileData`] this tile was
    /// built or parsed from, for re-serialization (§6 `NavMeshSet`). Link
    /// chains are not part of the wire format and are dropped; `add_tile`
    /// rebuilds them from `polys`/`header` alone.
    pub fn to_tile_data(&self) -> TileData {
        TileData {
            header: self.header.clone(),
            verts: self.verts.clone(),
            polys: self.polys.clone(),
            detail_meshes: self.detail_meshes.clone(),
            detail_verts: self.detail_verts.clone(),
            detail_tris: self.detail_tris.clone(),
            bv_tree: self.bv_tree.clone(),
            off_mesh_cons: self.off_mesh_cons.clone(),
        }
    }

    fn alloc_link(&mut self) -> Option<u32> {
        if self.links_free_list == NULL_LINK {
            return None;
        }
        let index = self.links_free_list;
        self.links_free_list = self.links[index as usize].next;
        Some(index)
    }

    fn free_link(&mut self, index: u32) {
        self.links[index as usize] = Link::default();
        self.links[index as usize].next = self.links_free_list;
        self.links_free_list = index;
    }

    fn prepend_link(&mut self, poly_index: usize, link_index: u32) {
        self.links[link_index as usize].next = self.polys[poly_index].first_link;
        self.polys[poly_index].first_link = link_index;
    }

    /// Links attached to `poly_index`'s chain, head (lowest edge) to tail.
    pub fn poly_links(&self, poly_index: usize) -> PolyLinkIter<'_> {
        PolyLinkIter {
            links: &self.links,
            cursor: self.polys[poly_index].first_link,
        }
    }

    /// World-space vertex pair for edge `edge` of `poly` (§4.10 portal math).
    pub fn edge_verts(&self, poly: &Poly, edge: usize) -> (Vec3, Vec3) {
        let n = poly.vert_count as usize;
        let a = poly.verts[edge] as usize;
        let b = poly.verts[(edge + 1) % n] as usize;
        (self.verts[a], self.verts[b])
    }
}

pub struct PolyLinkIter<'a> {
    links: &'a [Link],
    cursor: u32,
}

impl<'a> Iterator for PolyLinkIter<'a> {
    type Item = &'a Link;

    fn next(&mut self) -> Option<&'a Link> {
        if self.cursor == NULL_LINK {
            return None;
        }
        let link = &self.links[self.cursor as usize];
        self.cursor = link.next;
        Some(link)
    }
}

struct TileSlot {
    salt: u32,
    /// Bucket-chain successor while occupied; free-list successor while
    /// free. `-1` terminates either chain.
    next: i32,
    tile: Option<MeshTile>,
}

/// The tile grid and polygon-reference codec (§3 "NavMesh", §4.8).
pub struct NavMesh {
    origin: Vec3,
    tile_width: f32,
    tile_height: f32,
    tile_bits: u32,
    poly_bits: u32,
    salt_bits: u32,
    slots: Vec<TileSlot>,
    pos_lookup: Vec<i32>,
    next_free: i32,
}

fn bits_to_represent(max_value: u32) -> u32 {
    max_value.max(1).next_power_of_two().trailing_zeros()
}

fn tile_hash(x: i32, y: i32) -> u32 {
    // Matches the spec's `hash(tileX, tileY)`: a 2D spatial hash with the
    // same multiplicative constants used for the A* node pool (§4.9).
    let hx = (x as u32).wrapping_mul(0x8da6b343);
    let hy = (y as u32).wrapping_mul(0xcb1ab31f);
    hx.wrapping_add(hy)
}

impl NavMesh {
    pub fn new(params: NavMeshParams) -> Result<Self, NavMeshInitError> {
        let tile_bits = bits_to_represent(params.max_tiles);
        let poly_bits = bits_to_represent(params.max_polys_per_tile);
        let salt_bits = 32 - tile_bits - poly_bits;
        if salt_bits < 10 {
            return Err(NavMeshInitError::SaltBitsTooSmall(salt_bits));
        }

        let max_tiles = params.max_tiles.max(1) as usize;
        let mut slots = Vec::with_capacity(max_tiles);
        for i in 0..max_tiles {
            slots.push(TileSlot {
                salt: 1,
                next: if i + 1 < max_tiles { (i + 1) as i32 } else { -1 },
                tile: None,
            });
        }

        let lut_size = (max_tiles as u32 / 4).max(1).next_power_of_two() as usize;

        Ok(NavMesh {
            origin: params.origin,
            tile_width: params.tile_width,
            tile_height: params.tile_height,
            tile_bits,
            poly_bits,
            salt_bits,
            slots,
            pos_lookup: vec![-1; lut_size],
            next_free: 0,
        })
    }

    #[inline]
    pub fn encode(&self, salt: u32, tile: u32, poly: u32) -> PolyRef {
        encode_ref(salt, tile, poly, self.poly_bits, self.tile_bits)
    }

    #[inline]
    pub fn decode(&self, poly_ref: PolyRef) -> (u32, u32, u32) {
        decode_with_bits(poly_ref, self.poly_bits, self.tile_bits)
    }

    pub fn is_valid_poly_ref(&self, poly_ref: PolyRef) -> bool {
        if poly_ref.is_none() {
            return false;
        }
        let (salt, tile, poly) = self.decode(poly_ref);
        let Some(slot) = self.slots.get(tile as usize) else {
            return false;
        };
        let Some(tile_data) = &slot.tile else {
            return false;
        };
        slot.salt == salt && (poly as usize) < tile_data.polys.len()
    }

    pub fn tile_count(&self) -> usize {
        self.slots.len()
    }

    /// Slot capacity this mesh was initialized with (`NavMeshParams::max_tiles`,
    /// rounded up to the next power of two), not the number of occupied slots.
    #[inline]
    pub fn max_tiles(&self) -> usize {
        self.slots.len()
    }

    /// Per-tile polygon index space this mesh was initialized with
    /// (`NavMeshParams::max_polys_per_tile`, rounded up to the next power of two).
    #[inline]
    pub fn max_polys_per_tile(&self) -> u32 {
        1u32 << self.poly_bits
    }

    pub fn tile(&self, index: usize) -> Option<&MeshTile> {
        self.slots.get(index).and_then(|s| s.tile.as_ref())
    }

    pub fn tile_ref(&self, index: usize) -> PolyRef {
        self.encode(self.slots[index].salt, index as u32, 0)
    }

    /// Ref for a specific polygon in an already-known tile slot, sharing the
    /// slot's current salt (§3 "Polygon reference").
    pub fn poly_ref(&self, tile_index: usize, poly_index: usize) -> PolyRef {
        self.encode(self.slots[tile_index].salt, tile_index as u32, poly_index as u32)
    }

    #[inline]
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    #[inline]
    pub fn tile_width(&self) -> f32 {
        self.tile_width
    }

    #[inline]
    pub fn tile_height(&self) -> f32 {
        self.tile_height
    }

    /// Tile-grid coordinate containing world-space point `pos` (§4.8
    /// "calcTileLoc").
    pub fn tile_coords_at_point(&self, pos: Vec3) -> (i32, i32) {
        let x = ((pos.x - self.origin.x) / self.tile_width).floor() as i32;
        let y = ((pos.z - self.origin.z) / self.tile_height).floor() as i32;
        (x, y)
    }

    /// Indices of every tile slot whose world-space AABB overlaps
    /// `bmin..bmax`, scanning the tile-grid cells the box spans (§4.8).
    pub fn tiles_overlapping_aabb(&self, bmin: Vec3, bmax: Vec3) -> Vec<usize> {
        let (min_x, min_y) = self.tile_coords_at_point(bmin);
        let (max_x, max_y) = self.tile_coords_at_point(bmax);
        let mut out = Vec::new();
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                for index in self.tiles_at(x, y) {
                    if let Some(tile) = self.tile(index) {
                        if tile.header.bmin.x <= bmax.x
                            && tile.header.bmax.x >= bmin.x
                            && tile.header.bmin.z <= bmax.z
                            && tile.header.bmax.z >= bmin.z
                        {
                            out.push(index);
                        }
                    }
                }
            }
        }
        out
    }

    pub fn get_tile_and_poly(&self, poly_ref: PolyRef) -> Option<(&MeshTile, usize)> {
        if !self.is_valid_poly_ref(poly_ref) {
            return None;
        }
        let (_, tile, poly) = self.decode(poly_ref);
        Some((self.tile(tile as usize).unwrap(), poly as usize))
    }

    fn bucket(&self, x: i32, y: i32) -> usize {
        (tile_hash(x, y) as usize) & (self.pos_lookup.len() - 1)
    }

    /// Indices of every occupied tile slot at grid coordinate `(x, y)`
    /// (every layer, since layers share an xz footprint).
    pub fn tiles_at(&self, x: i32, y: i32) -> Vec<usize> {
        let mut out = Vec::new();
        let mut cursor = self.pos_lookup[self.bucket(x, y)];
        while cursor != -1 {
            let slot = &self.slots[cursor as usize];
            if let Some(tile) = &slot.tile {
                if tile.header.x == x && tile.header.y == y {
                    out.push(cursor as usize);
                }
            }
            cursor = slot.next;
        }
        out
    }

    fn tile_at_exact(&self, x: i32, y: i32, layer: i32) -> Option<usize> {
        self.tiles_at(x, y)
            .into_iter()
            .find(|&i| self.slots[i].tile.as_ref().unwrap().header.layer == layer)
    }

    /// Adds a built or parsed tile (§4.8 `addTile`). `last_ref`, when given,
    /// restores the tile into its previous slot with its previous salt
    /// (used when re-adding a tile that was just removed, so outstanding
    /// refs to *other* tiles stay valid); otherwise a free slot is taken
    /// from the free list.
    pub fn add_tile(
        &mut self,
        data: TileData,
        last_ref: Option<PolyRef>,
    ) -> Result<PolyRef, AddTileError> {
        if self
            .tile_at_exact(data.header.x, data.header.y, data.header.layer)
            .is_some()
        {
            return Err(AddTileError::SlotOccupied {
                x: data.header.x as u16,
                y: data.header.y as u16,
                layer: data.header.layer as u16,
            });
        }

        let slot_index = if let Some(r) = last_ref {
            let (salt, tile, _) = self.decode(r);
            let tile = tile as usize;
            self.unlink_from_free_list(tile);
            self.slots[tile].salt = salt;
            tile
        } else {
            if self.next_free == -1 {
                return Err(AddTileError::OutOfMemory);
            }
            let index = self.next_free as usize;
            self.next_free = self.slots[index].next;
            index
        };

        let max_links = data.header.max_link_count as usize;
        let mut links = vec![Link::default(); max_links];
        for i in 0..max_links {
            links[i].next = if i + 1 < max_links { (i + 1) as u32 } else { NULL_LINK };
        }

        let mut tile = MeshTile {
            header: data.header,
            verts: data.verts,
            polys: data.polys,
            links,
            links_free_list: if max_links > 0 { 0 } else { NULL_LINK },
            detail_meshes: data.detail_meshes,
            detail_verts: data.detail_verts,
            detail_tris: data.detail_tris,
            bv_tree: data.bv_tree,
            off_mesh_cons: data.off_mesh_cons,
        };
        for poly in &mut tile.polys {
            poly.first_link = NULL_LINK;
        }

        let salt = self.slots[slot_index].salt;
        self.build_internal_links(&mut tile, salt, slot_index as u32);
        self.slots[slot_index].tile = Some(tile);

        let bucket = self.bucket(data.header.x, data.header.y);
        self.slots[slot_index].next = self.pos_lookup[bucket];
        self.pos_lookup[bucket] = slot_index as i32;

        self.base_off_mesh_links(slot_index);

        for side in [0u8, 2, 4, 6] {
            let (dx, dy) = side_offset(side).unwrap();
            let nx = self.slots[slot_index].tile.as_ref().unwrap().header.x + dx;
            let ny = self.slots[slot_index].tile.as_ref().unwrap().header.y + dy;
            for neighbor_index in self.tiles_at(nx, ny) {
                self.connect_ext_links(slot_index, neighbor_index, side);
                self.connect_ext_links(neighbor_index, slot_index, opposite_side(side));
            }
        }

        let salt = self.slots[slot_index].salt;
        Ok(self.encode(salt, slot_index as u32, 0))
    }

    fn unlink_from_free_list(&mut self, target: usize) {
        if self.next_free == target as i32 {
            self.next_free = self.slots[target].next;
            return;
        }
        let mut cursor = self.next_free;
        while cursor != -1 {
            let next = self.slots[cursor as usize].next;
            if next == target as i32 {
                self.slots[cursor as usize].next = self.slots[target].next;
                return;
            }
            cursor = next;
        }
    }

    /// Builds the intra-tile link chains: for each polygon edge with an
    /// internal neighbor, allocate a link and prepend it, iterating edges
    /// backwards so the final chain reads in ascending edge order (§4.8
    /// step 5).
    fn build_internal_links(&self, tile: &mut MeshTile, salt: u32, tile_index: u32) {
        for p in 0..tile.polys.len() {
            if tile.polys[p].is_off_mesh_connection() {
                continue;
            }
            let vert_count = tile.polys[p].vert_count as usize;
            for j in (0..vert_count).rev() {
                let nei = tile.polys[p].neis[j];
                if nei == MESH_NULL_IDX || nei & NEIS_EXT_LINK != 0 {
                    continue;
                }
                let Some(link_index) = tile.alloc_link() else {
                    break;
                };
                tile.links[link_index as usize] = Link {
                    poly_ref: self.encode(salt, tile_index, nei as u32),
                    next: NULL_LINK,
                    edge: j as u8,
                    side: 0xff,
                    bmin: 0,
                    bmax: 255,
                };
                tile.prepend_link(p, link_index);
            }
        }
    }

    fn connect_ext_links(&mut self, from_index: usize, to_index: usize, dir: u8) {
        if from_index == to_index {
            return;
        }
        let opp = opposite_side(dir);
        let to_salt = self.slots[to_index].salt;
        let poly_bits = self.poly_bits;
        let tile_bits = self.tile_bits;

        // Split the slots slice so `from_tile` (mutated) and `to_tile` (read)
        // borrow disjoint halves instead of aliasing the same `Vec`.
        let (from_tile, to_tile) = if from_index < to_index {
            let (left, right) = self.slots.split_at_mut(to_index);
            (
                left[from_index].tile.as_mut().unwrap(),
                right[0].tile.as_ref().unwrap(),
            )
        } else {
            let (left, right) = self.slots.split_at_mut(from_index);
            (
                right[0].tile.as_mut().unwrap(),
                left[to_index].tile.as_ref().unwrap(),
            )
        };

        for p in 0..from_tile.polys.len() {
            let vert_count = from_tile.polys[p].vert_count as usize;
            for j in 0..vert_count {
                let nei = from_tile.polys[p].neis[j];
                if nei & NEIS_EXT_LINK == 0 || (nei & 0x7) as u8 != dir {
                    continue;
                }
                let (va, vb) = from_tile.edge_verts(&from_tile.polys[p], j);

                for (q, to_poly) in to_tile.polys.iter().enumerate() {
                    let to_vert_count = to_poly.vert_count as usize;
                    for k in 0..to_vert_count {
                        let to_nei = to_poly.neis[k];
                        if to_nei & NEIS_EXT_LINK == 0 || (to_nei & 0x7) as u8 != opp {
                            continue;
                        }
                        let (wa, wb) = to_tile.edge_verts(to_poly, k);
                        if let Some((tmin, tmax)) =
                            overlap_along_edge(dir, va, vb, wa, wb, from_tile.header.walkable_climb)
                        {
                            let Some(link_index) = from_tile.alloc_link() else {
                                continue;
                            };
                            from_tile.links[link_index as usize] = Link {
                                poly_ref: encode_ref(to_salt, to_index as u32, q as u32, poly_bits, tile_bits),
                                next: NULL_LINK,
                                edge: j as u8,
                                side: dir,
                                bmin: (tmin * 255.0).round() as u8,
                                bmax: (tmax * 255.0).round() as u8,
                            };
                            from_tile.prepend_link(p, link_index);
                        }
                    }
                }
            }
        }
    }

    /// Snaps off-mesh connection endpoints onto the nearest polygon within
    /// `radius` in this same tile and wires up the link and its back-link
    /// (§4.8 step 6).
    fn base_off_mesh_links(&mut self, tile_index: usize) {
        let off_mesh_cons = self.slots[tile_index].tile.as_ref().unwrap().off_mesh_cons.clone();
        let salt = self.slots[tile_index].salt;

        for con in &off_mesh_cons {
            let poly_index = con.poly as usize;
            let endpoints = if con.bidirectional { 0..2 } else { 0..1 };
            for end in endpoints {
                let point = con.pos[end];
                let extents = Vec3::splat(con.radius.max(0.001));
                let Some((landing_poly, nearest)) =
                    self.find_nearest_poly_in_tile(tile_index, point, extents)
                else {
                    continue;
                };

                let tile = self.slots[tile_index].tile.as_mut().unwrap();
                let vert_slot = tile.polys[poly_index].verts[end] as usize;
                tile.verts[vert_slot] = nearest;

                if let Some(link_index) = tile.alloc_link() {
                    tile.links[link_index as usize] = Link {
                        poly_ref: self.encode(salt, tile_index as u32, landing_poly as u32),
                        next: NULL_LINK,
                        edge: end as u8,
                        side: 0xff,
                        bmin: 0,
                        bmax: 255,
                    };
                    tile.prepend_link(poly_index, link_index);
                }
                if let Some(link_index) = tile.alloc_link() {
                    tile.links[link_index as usize] = Link {
                        poly_ref: self.encode(salt, tile_index as u32, poly_index as u32),
                        next: NULL_LINK,
                        edge: end as u8,
                        side: 0xff,
                        bmin: 0,
                        bmax: 255,
                    };
                    tile.prepend_link(landing_poly, link_index);
                }
            }
        }
    }

    /// Removes a tile (§4.8 `removeTile`): detaches it from its hash
    /// bucket, drops every incoming link held by the four cardinal
    /// neighbors, bumps its salt so outstanding refs fault, and returns the
    /// slot to the free list.
    pub fn remove_tile(&mut self, tile_ref: PolyRef) -> Result<TileData, RemoveTileError> {
        let (salt, tile_index, _) = self.decode(tile_ref);
        let tile_index = tile_index as usize;
        let slot = self
            .slots
            .get(tile_index)
            .ok_or(RemoveTileError::InvalidRef)?;
        if slot.salt != salt || slot.tile.is_none() {
            return Err(RemoveTileError::InvalidRef);
        }

        let (x, y) = {
            let tile = slot.tile.as_ref().unwrap();
            (tile.header.x, tile.header.y)
        };

        let bucket = self.bucket(x, y);
        if self.pos_lookup[bucket] == tile_index as i32 {
            self.pos_lookup[bucket] = self.slots[tile_index].next;
        } else {
            let mut cursor = self.pos_lookup[bucket];
            while cursor != -1 {
                let next = self.slots[cursor as usize].next;
                if next == tile_index as i32 {
                    self.slots[cursor as usize].next = self.slots[tile_index].next;
                    break;
                }
                cursor = next;
            }
        }

        for side in [0u8, 2, 4, 6] {
            let (dx, dy) = side_offset(side).unwrap();
            for neighbor_index in self.tiles_at(x + dx, y + dy) {
                self.remove_links_to(neighbor_index, tile_index);
            }
        }

        let removed = self.slots[tile_index].tile.take().unwrap();
        self.slots[tile_index].salt = next_salt(self.slots[tile_index].salt, self.salt_bits);
        self.slots[tile_index].next = self.next_free;
        self.next_free = tile_index as i32;

        Ok(TileData {
            header: removed.header,
            verts: removed.verts,
            polys: removed.polys,
            detail_meshes: removed.detail_meshes,
            detail_verts: removed.detail_verts,
            detail_tris: removed.detail_tris,
            bv_tree: removed.bv_tree,
            off_mesh_cons: removed.off_mesh_cons,
        })
    }

    fn remove_links_to(&mut self, holder_index: usize, target_tile_index: usize) {
        let Some(tile) = self.slots[holder_index].tile.as_mut() else {
            return;
        };
        for p in 0..tile.polys.len() {
            let mut cursor = tile.polys[p].first_link;
            let mut prev: Option<u32> = None;
            while cursor != NULL_LINK {
                let next = tile.links[cursor as usize].next;
                let (_, ref_tile, _) = decode_with_bits(
                    tile.links[cursor as usize].poly_ref,
                    self.poly_bits,
                    self.tile_bits,
                );
                if tile.links[cursor as usize].side != 0xff && ref_tile as usize == target_tile_index
                {
                    match prev {
                        Some(p_idx) => tile.links[p_idx as usize].next = next,
                        None => tile.polys[p].first_link = next,
                    }
                    tile.free_link(cursor);
                } else {
                    prev = Some(cursor);
                }
                cursor = next;
            }
        }
    }

    /// Finds the polygon in `tile_index` whose xz-interior (or, failing
    /// that, nearest boundary) is closest to `center`, restricted to the
    /// `center ± extents` AABB. Returns the landing point (on the polygon
    /// boundary/interior, height-correct via the detail mesh).
    pub fn find_nearest_poly_in_tile(
        &self,
        tile_index: usize,
        center: Vec3,
        extents: Vec3,
    ) -> Option<(usize, Vec3)> {
        let tile = self.tile(tile_index)?;
        let bmin = center - extents;
        let bmax = center + extents;
        let candidates = self.query_polygons_in_tile(tile_index, bmin, bmax);

        let mut best: Option<(usize, Vec3, f32, bool)> = None;
        for poly_index in candidates {
            if tile.polys[poly_index].is_off_mesh_connection() {
                continue;
            }
            let (point, over_poly) =
                crate::query::closest_point_on_poly(tile, poly_index, &tile.polys[poly_index], center);
            let dy = (center.y - point.y).abs();
            let within_climb = dy <= tile.header.walkable_climb.max(1e-3);
            let d2 = if over_poly {
                (center.x - point.x).powi(2) + (center.z - point.z).powi(2)
            } else {
                center.distance_squared(point)
            };

            let better = match &best {
                None => true,
                Some((_, _, best_d2, best_over)) => {
                    match (over_poly && within_climb, *best_over) {
                        (true, false) => true,
                        (false, true) => false,
                        _ => d2 < *best_d2,
                    }
                }
            };
            if better {
                best = Some((poly_index, point, d2, over_poly && within_climb));
            }
        }

        best.map(|(poly, point, _, _)| (poly, point))
    }

    /// BV-tree query over one tile's polygons, falling back to a linear
    /// scan when the tile has no tree (§4.8 "BV-tree query").
    pub fn query_polygons_in_tile(&self, tile_index: usize, bmin: Vec3, bmax: Vec3) -> Vec<usize> {
        let Some(tile) = self.tile(tile_index) else {
            return Vec::new();
        };
        if tile.bv_tree.is_empty() {
            return (0..tile.polys.len())
                .filter(|&p| poly_aabb_overlaps(tile, p, bmin, bmax))
                .collect();
        }

        let q = (tile.header.bv_quant_factor, tile.header.bmin);
        let local_min = quantize(bmin - q.1, q.0);
        let local_max = quantize(bmax - q.1, q.0);

        let mut out = Vec::new();
        let mut i = 0usize;
        while i < tile.bv_tree.len() {
            let node = &tile.bv_tree[i];
            let overlap = (0..3).all(|axis| {
                node.bmin[axis] <= local_max[axis] && node.bmax[axis] >= local_min[axis]
            });
            let is_leaf = node.i >= 0;
            if overlap && is_leaf {
                out.push(node.i as usize);
            }
            if overlap || is_leaf {
                i += 1;
            } else {
                i += (-node.i) as usize;
            }
        }
        out
    }
}

fn encode_ref(salt: u32, tile: u32, poly: u32, poly_bits: u32, tile_bits: u32) -> PolyRef {
    PolyRef((salt << (poly_bits + tile_bits)) | (tile << poly_bits) | poly)
}

fn decode_with_bits(poly_ref: PolyRef, poly_bits: u32, tile_bits: u32) -> (u32, u32, u32) {
    let poly_mask = (1u32 << poly_bits) - 1;
    let tile_mask = (1u32 << tile_bits) - 1;
    let poly = poly_ref.0 & poly_mask;
    let tile = (poly_ref.0 >> poly_bits) & tile_mask;
    let salt = poly_ref.0 >> (poly_bits + tile_bits);
    (salt, tile, poly)
}

fn next_salt(salt: u32, salt_bits: u32) -> u32 {
    let max = (1u32 << salt_bits) - 1;
    let next = (salt + 1) & max;
    if next == 0 {
        1
    } else {
        next
    }
}

fn quantize(v: Vec3, factor: f32) -> [u16; 3] {
    [
        (v.x * factor).floor().max(0.0) as u16,
        (v.y * factor).floor().max(0.0) as u16,
        (v.z * factor).floor().max(0.0) as u16,
    ]
}

fn poly_aabb_overlaps(tile: &MeshTile, poly_index: usize, bmin: Vec3, bmax: Vec3) -> bool {
    let poly = &tile.polys[poly_index];
    let n = poly.vert_count as usize;
    let mut poly_min = Vec3::splat(f32::MAX);
    let mut poly_max = Vec3::splat(f32::MIN);
    for &v in &poly.verts[..n] {
        let p = tile.verts[v as usize];
        poly_min = poly_min.min(p);
        poly_max = poly_max.max(p);
    }
    poly_min.cmple(bmax).all() && poly_max.cmpge(bmin).all()
}

/// Overlap of the shared edge segment in the axis perpendicular to `dir`,
/// within `SLAB_EPSILON` horizontally and `climb` vertically (§4.8 step 7).
/// Returns the `[tmin, tmax]` fraction along `(va, vb)` that overlaps.
fn overlap_along_edge(dir: u8, va: Vec3, vb: Vec3, wa: Vec3, wb: Vec3, climb: f32) -> Option<(f32, f32)> {
    const SLAB_EPSILON: f32 = 0.01;

    // North/South run along x; East/West run along z.
    let (a0, a1, b0, b1) = if dir == 0 || dir == 4 {
        (va.x, vb.x, wa.x, wb.x)
    } else {
        (va.z, vb.z, wa.z, wb.z)
    };

    let (lo, hi) = (a0.min(a1), a0.max(a1));
    let (nlo, nhi) = (b0.min(b1), b0.max(b1));
    let omin = lo.max(nlo);
    let omax = hi.min(nhi);
    if omin > omax + SLAB_EPSILON {
        return None;
    }

    let perp_self = if dir == 0 || dir == 4 { (va.z, vb.z) } else { (va.x, vb.x) };
    let perp_other = if dir == 0 || dir == 4 { (wa.z, wb.z) } else { (wa.x, wb.x) };
    if (perp_self.0 - perp_other.0).abs() > SLAB_EPSILON && (perp_self.0 - perp_other.0).abs() > climb {
        return None;
    }

    if (va.y - wa.y).abs() > climb && (vb.y - wb.y).abs() > climb {
        return None;
    }

    let span = (hi - lo).max(1e-6);
    let tmin = ((omin - lo) / span).clamp(0.0, 1.0);
    let tmax = ((omax - lo) / span).clamp(0.0, 1.0);
    if tmax - tmin < 1e-6 {
        return None;
    }
    Some((tmin.min(tmax), tmin.max(tmax)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> NavMeshParams {
        NavMeshParams {
            origin: Vec3::ZERO,
            tile_width: 10.0,
            tile_height: 10.0,
            max_tiles: 128,
            max_polys_per_tile: 256,
        }
    }

    #[test]
    fn ref_roundtrips_within_bit_widths() {
        let nav_mesh = NavMesh::new(params()).unwrap();
        for salt in [1u32, 5, 1000] {
            for tile in [0u32, 3, 100] {
                for poly in [0u32, 7, 200] {
                    let r = nav_mesh.encode(salt, tile, poly);
                    assert_eq!(nav_mesh.decode(r), (salt, tile, poly));
                }
            }
        }
    }

    #[test]
    fn init_rejects_too_few_salt_bits() {
        let result = NavMesh::new(NavMeshParams {
            origin: Vec3::ZERO,
            tile_width: 1.0,
            tile_height: 1.0,
            max_tiles: 1 << 20,
            max_polys_per_tile: 1 << 10,
        });
        assert!(matches!(result, Err(NavMeshInitError::SaltBitsTooSmall(_))));
    }

    #[test]
    fn opposite_side_is_involutive() {
        for side in 0u8..8 {
            assert_eq!(opposite_side(opposite_side(side)), side);
        }
    }
}

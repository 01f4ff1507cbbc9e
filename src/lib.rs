//! Navigation mesh generation and pathfinding, built on a Recast/Detour-style
//! voxel pipeline.
//!
//! Takes in a triangle soup (as an external OBJ loader or physics-collider
//! baker would supply it) plus a [`BuildSettings`], and voxelizes, filters,
//! partitions into regions, traces contours, polygonizes and detail-meshes it
//! into a queryable [`NavMesh`]. Nav-meshes can then be queried using
//! [`query::find_path`], [`query::find_straight_path`] and
//! [`query::raycast`].
//!
//! ## Quick-start
//!
//! **Building a nav-mesh:**
//! 1. Describe the walkable world as a [`builder::InputGeometry`] (flat
//!    vertex/index triangle soup, in world space).
//! 2. Pick a [`BuildSettings`] — either hand-assemble one or start from
//!    [`BuildSettings::from_agent_and_bounds`].
//! 3. Call [`builder::build_solo_mesh`] for a single-tile mesh covering the
//!    whole geometry AABB, or [`builder::build_tiled_mesh`] to split it into
//!    a `tile_size`-voxel grid (needed once path to navmesh memory becomes
//!    tile-streamed or the world exceeds one tile's poly budget, §4.11).
//!
//! **Querying the nav-mesh / pathfinding:**
//! 1. Build a [`query::QueryFilter`] describing which [`SampleFlags`] a
//!    traversal may cross.
//! 2. Call [`query::find_nearest_poly`] to snap a world point onto the mesh.
//! 3. Call [`query::find_path`] for the coarse polygon corridor, then
//!    [`query::find_straight_path`] to string-pull it into a line of
//!    waypoints. [`query::raycast`] walks a straight line through the
//!    corridor directly, for line-of-sight checks.
//!
//! **Saving and loading:**
//! [`archive::save_navmesh_set`]/[`archive::load_navmesh_set`] (de)serialize
//! a whole built [`NavMesh`] to a self-contained byte archive; a single
//! tile's wire format is [`TileData::to_bytes`]/[`TileData::from_bytes`].
//!
//! This crate does not parse CLI arguments, load OBJ/collider meshes, or
//! schedule builds onto a task pool — those are external collaborators
//! (§1 "out of scope"). It exposes plain, synchronous functions for a host
//! application to drive on whatever schedule fits.

mod area;
mod compact_heightfield;
mod config;
mod contour;
mod detail_mesh;
mod heightfield;
mod math;
mod mesher;
mod nav_mesh;
mod node_pool;
mod regions;
mod runtime;
mod status;

pub mod archive;
pub mod builder;
pub mod error;
pub mod query;

pub use area::{area_to_flags, Area, SampleFlags};
pub use archive::{load_navmesh_set, save_navmesh_set};
pub use builder::{build_solo_mesh, build_tiled_mesh, AreaVolume, InputGeometry};
pub use config::{BuildSettings, DetailMeshSettings, PartitionType};
pub use nav_mesh::{
    Link, MeshHeader, OffMeshConnection, OffMeshConnectionDef, Poly, TileData, NAVMESH_MAGIC,
    NAVMESH_VERSION,
};
pub use query::{find_nearest_poly, find_path, find_straight_path, raycast, QueryFilter};
pub use runtime::{opposite_side, MeshTile, NavMesh, NavMeshParams, PolyLinkIter, PolyRef};
pub use status::Status;

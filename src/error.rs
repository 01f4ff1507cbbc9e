//! Error types for the boundary-facing, non-bitfield parts of the crate.
//!
//! Internal algorithmic invariants (a corrupted navmesh producing no portal
//! mid-point, a node-pool index out of range) are programming errors and are
//! asserted against rather than modeled here; see the module notes in
//! `query.rs` and `nav_mesh.rs`.

use thiserror::Error;

/// Raised when parsing a serialized tile blob (§4.7/§6 wire format).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TileParseError {
    #[error("tile blob has wrong magic number")]
    WrongMagic,
    #[error("tile blob has unsupported version")]
    WrongVersion,
    #[error("tile blob is truncated or sections misaligned")]
    Truncated,
}

/// Raised when parsing a `NavMeshSet` archive (§6).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NavMeshSetError {
    #[error("navmesh set has wrong magic number")]
    WrongMagic,
    #[error("navmesh set has unsupported version")]
    WrongVersion,
    #[error("navmesh set is truncated")]
    Truncated,
    #[error("failed to parse tile {index}")]
    Tile { index: usize, source: TileParseError },
    #[error("failed to add tile {index} to the mesh: {reason}")]
    AddTile { index: usize, reason: String },
}

/// Raised by `NavMesh::add_tile` (C9).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddTileError {
    #[error(transparent)]
    Parse(#[from] TileParseError),
    #[error("a tile already occupies (x={x}, y={y}, layer={layer})")]
    SlotOccupied { x: u16, y: u16, layer: u16 },
    #[error("navmesh has no free tile slots")]
    OutOfMemory,
}

/// Raised by `NavMesh::new` (C9 init).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NavMeshInitError {
    #[error("salt bits ({0}) must be at least 10 after reserving tile/poly bits")]
    SaltBitsTooSmall(u32),
}

/// Raised by `NavMesh::remove_tile` (C9).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RemoveTileError {
    #[error("ref does not name a currently-occupied tile slot")]
    InvalidRef,
}

/// Raised by `BuildSettings` validation before a build starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildSettingsError {
    #[error("verts_per_poly must be in 3..=6, got {0}")]
    VertsPerPoly(u8),
    #[error("cell_size must be positive")]
    NonPositiveCellSize,
    #[error("nav_mesh_bmax must be strictly greater than nav_mesh_bmin on every axis")]
    InvertedBounds,
}

/// Raised by the build orchestrator (C12, `build_solo_mesh`/`build_tiled_mesh`).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error(transparent)]
    Settings(#[from] BuildSettingsError),
    #[error(transparent)]
    Init(#[from] NavMeshInitError),
    #[error(transparent)]
    AddTile(#[from] AddTileError),
    #[error("no walkable geometry survived the build pipeline")]
    EmptyGeometry,
}

//! Area id newtype threaded through the whole build pipeline.
//!
//! `Area(0)` behaves like "no area"/null everywhere except at the call sites
//! that explicitly want to distinguish "walkable area 0" (the default ground
//! area) from "non-walkable". Those call sites use `Option<Area>` instead,
//! exactly as the teacher's `HeightSpan`/`OpenSpan` do.

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Area(pub u16);

impl Area {
    pub const GROUND: Area = Area(0);
    pub const WATER: Area = Area(1);
    pub const ROAD: Area = Area(2);
    pub const DOOR: Area = Area(3);
    pub const GRASS: Area = Area(4);
}

bitflags::bitflags! {
    /// Sample poly flags the build orchestrator (C12) derives from a
    /// polygon's dominant area id, and that a [`crate::query::QueryFilter`]
    /// tests a polygon against (§4.11 "map Recast area IDs to sample
    /// flags").
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SampleFlags: u16 {
        const WALK = 1 << 0;
        const SWIM = 1 << 1;
        const DOOR = 1 << 2;
    }
}

/// `GROUND/GRASS/ROAD → WALK`, `WATER → SWIM`, `DOOR → WALK|DOOR`.
pub fn area_to_flags(area: Area) -> SampleFlags {
    match area {
        Area::WATER => SampleFlags::SWIM,
        Area::DOOR => SampleFlags::WALK | SampleFlags::DOOR,
        _ => SampleFlags::WALK,
    }
}

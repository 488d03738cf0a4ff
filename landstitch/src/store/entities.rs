//! Store row types.

use geo::Polygon;
use std::collections::BTreeSet;
use std::ops::BitOr;
use uuid::Uuid;

/// Tile lifecycle flags.
///
/// Flags are only ever added, never cleared; a tile's status is monotone
/// over its lifetime. [`TileStatus::MERGED`] is shorthand for all four
/// directional merge flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileStatus(u16);

impl TileStatus {
    pub const NONE: Self = Self(0);
    pub const CREATED: Self = Self(1);
    pub const PROCESSED: Self = Self(1 << 1);
    pub const MERGED_NORTH: Self = Self(1 << 2);
    pub const MERGED_EAST: Self = Self(1 << 3);
    pub const MERGED_SOUTH: Self = Self(1 << 4);
    pub const MERGED_WEST: Self = Self(1 << 5);
    pub const EXPORTED: Self = Self(1 << 6);
    pub const MERGED: Self = Self(
        Self::MERGED_NORTH.0 | Self::MERGED_EAST.0 | Self::MERGED_SOUTH.0 | Self::MERGED_WEST.0,
    );

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for TileStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One named import batch. All tiles and results hang off a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub id: Uuid,
    pub name: String,
}

/// One grid cell of the partitioned area of interest.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRecord {
    pub id: Uuid,
    pub source_id: Uuid,
    pub east_of_origin: u32,
    pub north_of_origin: u32,
    pub cell_size: f64,
    pub locked: bool,
    pub status: TileStatus,
    /// Bumped by the store on every successful update.
    pub version: u64,
}

/// One polygon owned by a tile.
///
/// `related_ids` names counterpart geometries in neighboring tiles that the
/// consolidation phase must union with this one.
#[derive(Debug, Clone, PartialEq)]
pub struct TileGeometry {
    pub id: Uuid,
    pub polygon: Polygon<f64>,
    pub related_ids: BTreeSet<Uuid>,
}

impl TileGeometry {
    pub fn new(polygon: Polygon<f64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            polygon,
            related_ids: BTreeSet::new(),
        }
    }
}

/// The two geometry sets a processed tile owns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileLayers {
    /// Authoritative output, confined to the tile rectangle.
    pub clipped: Vec<TileGeometry>,
    /// Working margin, extending `buffer_distance` past the tile rectangle.
    pub buffered: Vec<TileGeometry>,
}

/// One row of the result store.
///
/// `id` is carried over from the tile geometry the row was copied from, so
/// `related_ids` written during merge keep resolving after the copy.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub id: Uuid,
    pub source_id: Uuid,
    pub polygon: Polygon<f64>,
    pub related_ids: BTreeSet<Uuid>,
    pub locked: bool,
    pub completed: bool,
    pub version: u64,
}

impl ResultRecord {
    /// Copies a tile geometry into the result store.
    pub fn from_tile_geometry(source_id: Uuid, geometry: &TileGeometry) -> Self {
        Self {
            id: geometry.id,
            source_id,
            polygon: geometry.polygon.clone(),
            related_ids: geometry.related_ids.clone(),
            locked: false,
            completed: false,
            version: 0,
        }
    }
}

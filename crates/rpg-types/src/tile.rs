//! Map tiles and packed passability flags.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Terrain kind of a single tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileKind {
    Floor,
    Wall,
    Door,
    Water,
    Lava,
    StairsUp,
    StairsDown,
}

impl TileKind {
    /// Default flag set for a freshly generated tile of this kind.
    pub fn default_flags(self) -> TileFlags {
        match self {
            Self::Floor | Self::Door | Self::StairsUp | Self::StairsDown => TileFlags::WALKABLE,
            Self::Water => TileFlags::WALKABLE | TileFlags::HAZARD,
            Self::Lava => TileFlags::HAZARD | TileFlags::BLOCKS_SIGHT,
            Self::Wall => TileFlags::BLOCKS_SIGHT,
        }
    }
}

bitflags! {
    /// Per-tile boolean state packed into a u32 bitfield.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct TileFlags: u32 {
        const WALKABLE     = 1 << 0;
        const BLOCKS_SIGHT = 1 << 1;
        const HAZARD       = 1 << 2;
    }
}

// Manual serde for TileFlags as a u32 value.
impl Serialize for TileFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TileFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        Ok(TileFlags::from_bits_truncate(bits))
    }
}

/// One map cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapTile {
    pub kind: TileKind,
    pub flags: TileFlags,
}

impl MapTile {
    pub fn new(kind: TileKind) -> Self {
        Self {
            kind,
            flags: kind.default_flags(),
        }
    }

    pub fn is_walkable(&self) -> bool {
        self.flags.contains(TileFlags::WALKABLE)
    }
}

impl Default for MapTile {
    fn default() -> Self {
        Self::new(TileKind::Floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_is_walkable_wall_is_not() {
        assert!(MapTile::new(TileKind::Floor).is_walkable());
        assert!(!MapTile::new(TileKind::Wall).is_walkable());
    }

    #[test]
    fn flags_roundtrip_as_u32() {
        let tile = MapTile::new(TileKind::Water);
        let json = serde_json::to_string(&tile).unwrap();
        let back: MapTile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tile);
        assert!(back.flags.contains(TileFlags::HAZARD));
    }
}

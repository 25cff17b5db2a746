//! Game object variants held in the world registry.
//!
//! The registry stores one tagged enum per object so persisted snapshots
//! carry an explicit `kind` discriminator (`player`, `monster`,
//! `item_drop`).

use serde::{Deserialize, Serialize};

use crate::character::{Character, Item};
use crate::ids::EntityId;
use crate::position::Position;

/// Faction id shared by all player characters.
pub const PLAYER_FACTION: &str = "players";

/// A hostile or neutral NPC combatant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monster {
    pub id: EntityId,
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
    pub armor_class: i32,
    /// Damage dice expression for its natural attack.
    pub damage: String,
    pub position: Position,
    pub faction: String,
    pub xp_value: u64,
    #[serde(default)]
    pub action_points: u32,
    #[serde(default)]
    pub max_action_points: u32,
}

impl Monster {
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    /// Clamp HP into `[0, max_hp]`.
    pub fn set_hp(&mut self, hp: i32) {
        self.hp = hp.clamp(0, self.max_hp);
    }
}

/// An item lying on the ground.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDrop {
    pub id: EntityId,
    pub item: Item,
    pub position: Position,
}

/// Everything the world registry can hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameObject {
    Player(Character),
    Monster(Monster),
    ItemDrop(ItemDrop),
}

impl GameObject {
    pub fn id(&self) -> &EntityId {
        match self {
            Self::Player(c) => &c.id,
            Self::Monster(m) => &m.id,
            Self::ItemDrop(d) => &d.id,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Self::Player(c) => c.position,
            Self::Monster(m) => m.position,
            Self::ItemDrop(d) => d.position,
        }
    }

    pub fn set_position(&mut self, pos: Position) {
        match self {
            Self::Player(c) => c.position = pos,
            Self::Monster(m) => m.position = pos,
            Self::ItemDrop(d) => d.position = pos,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Player(c) => &c.name,
            Self::Monster(m) => &m.name,
            Self::ItemDrop(d) => &d.item.name,
        }
    }

    /// Whether this object blocks other objects from entering its tile.
    pub fn is_blocking(&self) -> bool {
        match self {
            Self::Player(c) => c.is_alive(),
            Self::Monster(m) => m.is_alive(),
            Self::ItemDrop(_) => false,
        }
    }

    /// Combat faction. Item drops never fight.
    pub fn faction(&self) -> Option<&str> {
        match self {
            Self::Player(_) => Some(PLAYER_FACTION),
            Self::Monster(m) => Some(&m.faction),
            Self::ItemDrop(_) => None,
        }
    }

    pub fn as_player(&self) -> Option<&Character> {
        match self {
            Self::Player(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_player_mut(&mut self) -> Option<&mut Character> {
        match self {
            Self::Player(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_monster(&self) -> Option<&Monster> {
        match self {
            Self::Monster(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_monster_mut(&mut self) -> Option<&mut Monster> {
        match self {
            Self::Monster(m) => Some(m),
            _ => None,
        }
    }
}

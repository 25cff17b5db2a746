//! Spell definitions.
//!
//! The catalog itself (which spells exist) lives in `rpg-data`; this module
//! defines the shape of a spell.

use serde::{Deserialize, Serialize};

use crate::effect::{DurationSpec, EffectType};
use crate::ids::SpellId;

/// School of magic. Gates which classes can learn a spell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellSchool {
    Evocation,
    Abjuration,
    Conjuration,
    Necromancy,
    Enchantment,
    Divination,
}

/// What a spell may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpellTarget {
    /// Caster only; no target parameter accepted.
    Caster,
    /// One entity within range.
    Single { range: u32 },
    /// All entities within `radius` of a position within range.
    Area { range: u32, radius: u32 },
}

/// One effect a spell applies on a successful cast.
///
/// `magnitude` is a dice expression; it is rolled per cast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpellEffectSpec {
    pub effect_type: EffectType,
    pub magnitude: String,
    pub duration: DurationSpec,
}

/// A spell definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spell {
    pub id: SpellId,
    pub name: String,
    pub school: SpellSchool,
    /// Minimum caster level.
    pub level: u32,
    pub mana_cost: u32,
    pub ap_cost: u32,
    pub target: SpellTarget,
    pub effects: Vec<SpellEffectSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spell_target_wire_form() {
        let t = SpellTarget::Area {
            range: 8,
            radius: 2,
        };
        let v = serde_json::to_value(t).unwrap();
        assert_eq!(v["type"], "area");
        assert_eq!(v["radius"], 2);
    }
}

//! Character, item and equipment data.
//!
//! `Character` is plain data — all mutation goes through the engine, under
//! the server's state lock. Boolean state is packed into `CharacterFlags`
//! and serialized as a bare u32.

use std::collections::BTreeMap;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, ItemId, SpellId};
use crate::position::Position;
use crate::quest::QuestProgress;

// =============================================================================
// Classes & attributes
// =============================================================================

/// Character class. Determines hit die, AP and mana growth, and the
/// attribute minimums enforced at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterClass {
    Fighter,
    Mage,
    Cleric,
    Thief,
    Ranger,
    Paladin,
}

impl CharacterClass {
    pub const ALL: [Self; 6] = [
        Self::Fighter,
        Self::Mage,
        Self::Cleric,
        Self::Thief,
        Self::Ranger,
        Self::Paladin,
    ];

    /// Hit die sides rolled per level for max-HP growth.
    pub const fn hit_die(self) -> u32 {
        match self {
            Self::Fighter => 10,
            Self::Paladin => 10,
            Self::Ranger => 10,
            Self::Cleric => 8,
            Self::Thief => 8,
            Self::Mage => 6,
        }
    }

    /// Base action points per combat turn.
    pub const fn base_action_points(self) -> u32 {
        match self {
            Self::Fighter | Self::Paladin => 4,
            Self::Ranger | Self::Thief => 4,
            Self::Cleric | Self::Mage => 3,
        }
    }

    /// Mana pool per level. Zero for non-casters.
    pub const fn mana_per_level(self) -> u32 {
        match self {
            Self::Mage => 10,
            Self::Cleric => 8,
            Self::Paladin | Self::Ranger => 4,
            Self::Fighter | Self::Thief => 0,
        }
    }

    /// Attribute minimums `(attribute, score)` required at creation.
    pub fn attribute_minimums(self) -> &'static [(Attribute, u8)] {
        match self {
            Self::Fighter => &[(Attribute::Strength, 9)],
            Self::Mage => &[(Attribute::Intelligence, 9)],
            Self::Cleric => &[(Attribute::Wisdom, 9)],
            Self::Thief => &[(Attribute::Dexterity, 9)],
            Self::Ranger => &[
                (Attribute::Constitution, 14),
                (Attribute::Wisdom, 14),
            ],
            Self::Paladin => &[
                (Attribute::Strength, 12),
                (Attribute::Charisma, 17),
            ],
        }
    }
}

/// The six attribute axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

/// The six attribute scores. Valid scores are 3..=18 at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl Attributes {
    pub fn get(&self, attr: Attribute) -> u8 {
        match attr {
            Attribute::Strength => self.strength,
            Attribute::Dexterity => self.dexterity,
            Attribute::Constitution => self.constitution,
            Attribute::Intelligence => self.intelligence,
            Attribute::Wisdom => self.wisdom,
            Attribute::Charisma => self.charisma,
        }
    }

    /// Ability modifier: `(score - 10) / 2`, rounded toward −∞.
    pub fn modifier(score: u8) -> i32 {
        (score as i32 - 10).div_euclid(2)
    }

    pub fn as_array(&self) -> [u8; 6] {
        [
            self.strength,
            self.dexterity,
            self.constitution,
            self.intelligence,
            self.wisdom,
            self.charisma,
        ]
    }
}

// =============================================================================
// Items & equipment
// =============================================================================

/// Item category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Weapon,
    Armor,
    Shield,
    Consumable,
    Quest,
    Misc,
}

/// Equipment slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipSlot {
    Head,
    Neck,
    Chest,
    Hands,
    Rings,
    Legs,
    Feet,
    WeaponMain,
    WeaponOff,
}

impl EquipSlot {
    pub const ALL: [Self; 9] = [
        Self::Head,
        Self::Neck,
        Self::Chest,
        Self::Hands,
        Self::Rings,
        Self::Legs,
        Self::Feet,
        Self::WeaponMain,
        Self::WeaponOff,
    ];
}

/// An item instance. `damage` is a dice expression ("1d8+1") for weapons,
/// empty otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub item_type: ItemType,
    #[serde(default)]
    pub damage: String,
    /// Preferred slot. None for items that cannot be equipped.
    #[serde(default)]
    pub slot: Option<EquipSlot>,
    pub weight: u32,
    pub value: u32,
}

impl Item {
    pub fn can_equip_to(&self, slot: EquipSlot) -> bool {
        match self.slot {
            Some(s) => {
                s == slot
                    // One-handed weapons may go in the off hand.
                    || (s == EquipSlot::WeaponMain && slot == EquipSlot::WeaponOff)
            }
            None => false,
        }
    }
}

// =============================================================================
// CharacterFlags — packed boolean fields
// =============================================================================

bitflags! {
    /// Boolean character state packed into a u32 bitfield.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct CharacterFlags: u32 {
        const IN_COMBAT = 1 << 0;
        const STUNNED   = 1 << 1;
        const ROOTED    = 1 << 2;
        const DEAD      = 1 << 3;
        const RESTING   = 1 << 4;
    }
}

// Manual serde for CharacterFlags as a u32 value.
impl Serialize for CharacterFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CharacterFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        Ok(CharacterFlags::from_bits_truncate(bits))
    }
}

// =============================================================================
// Character
// =============================================================================

/// A player character. Active effects live in the engine's per-character
/// effect manager and are persisted separately from this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub id: EntityId,
    pub name: String,
    pub class: CharacterClass,
    pub attributes: Attributes,

    pub hp: i32,
    pub max_hp: i32,
    pub action_points: u32,
    pub max_action_points: u32,
    pub mana: u32,
    pub max_mana: u32,
    pub experience: u64,
    pub level: u32,
    pub gold: u32,

    pub position: Position,
    #[serde(default)]
    pub equipment: BTreeMap<EquipSlot, Item>,
    #[serde(default)]
    pub inventory: Vec<Item>,
    #[serde(default)]
    pub known_spells: Vec<SpellId>,
    #[serde(default)]
    pub quests: Vec<QuestProgress>,
    #[serde(default)]
    pub flags: CharacterFlags,
}

impl Character {
    /// Total carried weight: inventory plus equipped items.
    pub fn total_weight(&self) -> u32 {
        self.inventory.iter().map(|i| i.weight).sum::<u32>()
            + self.equipment.values().map(|i| i.weight).sum::<u32>()
    }

    pub fn is_alive(&self) -> bool {
        !self.flags.contains(CharacterFlags::DEAD)
    }

    /// Clamp HP into `[0, max_hp]` and update the DEAD flag.
    /// Every HP mutation must go through this.
    pub fn set_hp(&mut self, hp: i32) {
        self.hp = hp.clamp(0, self.max_hp);
        self.flags.set(CharacterFlags::DEAD, self.hp == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, weight: u32, slot: Option<EquipSlot>) -> Item {
        Item {
            id: ItemId::from(name),
            name: name.to_string(),
            item_type: ItemType::Misc,
            damage: String::new(),
            slot,
            weight,
            value: 1,
        }
    }

    #[test]
    fn modifier_table() {
        assert_eq!(Attributes::modifier(3), -4);
        assert_eq!(Attributes::modifier(8), -1);
        assert_eq!(Attributes::modifier(10), 0);
        assert_eq!(Attributes::modifier(11), 0);
        assert_eq!(Attributes::modifier(14), 2);
        assert_eq!(Attributes::modifier(18), 4);
    }

    #[test]
    fn set_hp_clamps_both_ends() {
        let mut c = sample_character();
        c.set_hp(999);
        assert_eq!(c.hp, c.max_hp);
        c.set_hp(-5);
        assert_eq!(c.hp, 0);
        assert!(!c.is_alive());
    }

    #[test]
    fn total_weight_counts_equipment() {
        let mut c = sample_character();
        c.inventory.push(item("rope", 3, None));
        c.equipment.insert(
            EquipSlot::Chest,
            item("chainmail", 20, Some(EquipSlot::Chest)),
        );
        assert_eq!(c.total_weight(), 23);
    }

    #[test]
    fn one_handed_weapon_fits_off_hand() {
        let dagger = item("dagger", 1, Some(EquipSlot::WeaponMain));
        assert!(dagger.can_equip_to(EquipSlot::WeaponMain));
        assert!(dagger.can_equip_to(EquipSlot::WeaponOff));
        assert!(!dagger.can_equip_to(EquipSlot::Head));
    }

    #[test]
    fn flags_serialize_as_u32() {
        let flags = CharacterFlags::IN_COMBAT | CharacterFlags::STUNNED;
        assert_eq!(serde_json::to_string(&flags).unwrap(), "3");
        let back: CharacterFlags = serde_json::from_str("3").unwrap();
        assert_eq!(back, flags);
    }

    fn sample_character() -> Character {
        Character {
            id: EntityId::from("c1"),
            name: "Alice".into(),
            class: CharacterClass::Fighter,
            attributes: Attributes {
                strength: 16,
                dexterity: 12,
                constitution: 14,
                intelligence: 10,
                wisdom: 10,
                charisma: 8,
            },
            hp: 12,
            max_hp: 12,
            action_points: 4,
            max_action_points: 4,
            mana: 0,
            max_mana: 0,
            experience: 0,
            level: 1,
            gold: 50,
            position: Position::new(5, 5, 0),
            equipment: BTreeMap::new(),
            inventory: Vec::new(),
            known_spells: Vec::new(),
            quests: Vec::new(),
            flags: CharacterFlags::empty(),
        }
    }
}

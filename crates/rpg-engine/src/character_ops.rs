//! Character lifecycle — creation, experience, equipment, consumables.

use serde::{Deserialize, Serialize};
use tracing::info;

use rpg_data::items::{get_item, starting_equipment, starting_gold};
use rpg_types::character::{
    Attribute, Attributes, Character, CharacterClass, EquipSlot, Item, ItemType,
};
use rpg_types::event::{EventType, GameEvent};
use rpg_types::ids::EntityId;
use rpg_types::position::Position;
use rpg_types::rng::RngState;

use crate::error::GameError;

// =============================================================================
// Attribute generation
// =============================================================================

/// How attribute scores are generated at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeMethod {
    /// 4d6 drop lowest per attribute.
    Roll,
    /// The fixed array 15/14/13/12/10/8 in class priority order.
    Standard,
    /// 27-point buy spent greedily down the class priority order.
    Pointbuy,
    /// Caller-provided scores, validated.
    Custom,
}

/// Class priority order for assigning arrays — highest score to the first
/// attribute listed.
fn class_priority(class: CharacterClass) -> [Attribute; 6] {
    use Attribute::*;
    match class {
        CharacterClass::Fighter => [Strength, Constitution, Dexterity, Wisdom, Charisma, Intelligence],
        CharacterClass::Mage => [Intelligence, Constitution, Dexterity, Wisdom, Charisma, Strength],
        CharacterClass::Cleric => [Wisdom, Constitution, Strength, Charisma, Dexterity, Intelligence],
        CharacterClass::Thief => [Dexterity, Constitution, Intelligence, Charisma, Wisdom, Strength],
        CharacterClass::Ranger => [Constitution, Wisdom, Dexterity, Strength, Intelligence, Charisma],
        CharacterClass::Paladin => [Charisma, Strength, Constitution, Wisdom, Dexterity, Intelligence],
    }
}

const STANDARD_ARRAY: [u8; 6] = [15, 14, 13, 12, 10, 8];
/// 27-point buy resolves to three 15s and three 8s (9 points each).
const POINTBUY_ARRAY: [u8; 6] = [15, 15, 15, 8, 8, 8];

fn assign_by_priority(class: CharacterClass, values: [u8; 6]) -> Attributes {
    let mut attrs = Attributes {
        strength: 8,
        dexterity: 8,
        constitution: 8,
        intelligence: 8,
        wisdom: 8,
        charisma: 8,
    };
    for (attr, value) in class_priority(class).into_iter().zip(values) {
        match attr {
            Attribute::Strength => attrs.strength = value,
            Attribute::Dexterity => attrs.dexterity = value,
            Attribute::Constitution => attrs.constitution = value,
            Attribute::Intelligence => attrs.intelligence = value,
            Attribute::Wisdom => attrs.wisdom = value,
            Attribute::Charisma => attrs.charisma = value,
        }
    }
    attrs
}

/// Generate attribute scores.
///
/// `Custom` requires `custom` scores; the other methods ignore them.
pub fn generate_attributes(
    class: CharacterClass,
    method: AttributeMethod,
    custom: Option<Attributes>,
    rng: &mut RngState,
) -> Result<Attributes, GameError> {
    let attrs = match method {
        AttributeMethod::Roll => {
            let mut values = [0u8; 6];
            for v in values.iter_mut() {
                *v = rng.roll_attribute();
            }
            // Rolled sets are assigned best-first down the priority order.
            values.sort_unstable_by(|a, b| b.cmp(a));
            assign_by_priority(class, values)
        }
        AttributeMethod::Standard => assign_by_priority(class, STANDARD_ARRAY),
        AttributeMethod::Pointbuy => assign_by_priority(class, POINTBUY_ARRAY),
        AttributeMethod::Custom => {
            let attrs = custom.ok_or_else(|| {
                GameError::invalid_params("attribute_method=custom requires explicit scores")
            })?;
            for score in attrs.as_array() {
                if !(3..=18).contains(&score) {
                    return Err(GameError::invalid_params(format!(
                        "attribute score {score} outside 3..=18"
                    )));
                }
            }
            attrs
        }
    };

    for (attr, minimum) in class.attribute_minimums() {
        if attrs.get(*attr) < *minimum {
            return Err(GameError::invalid_params(format!(
                "{class:?} requires {attr:?} ≥ {minimum}"
            )));
        }
    }
    Ok(attrs)
}

// =============================================================================
// Creation
// =============================================================================

/// Everything `createCharacter` needs.
#[derive(Debug, Clone)]
pub struct CreateSpec {
    pub id: EntityId,
    pub name: String,
    pub class: CharacterClass,
    pub method: AttributeMethod,
    pub custom_attributes: Option<Attributes>,
    pub with_starting_equipment: bool,
    pub bonus_gold: u32,
    pub position: Position,
}

/// Build a level-1 character.
pub fn create_character(spec: CreateSpec, rng: &mut RngState) -> Result<Character, GameError> {
    if spec.name.trim().is_empty() {
        return Err(GameError::invalid_params("character name is empty"));
    }
    let attributes = generate_attributes(spec.class, spec.method, spec.custom_attributes, rng)?;

    let con_mod = Attributes::modifier(attributes.constitution);
    let max_hp = (spec.class.hit_die() as i32 + con_mod).max(1);
    let max_mana = spec.class.mana_per_level();
    let max_ap = spec.class.base_action_points();

    let mut character = Character {
        id: spec.id,
        name: spec.name,
        class: spec.class,
        attributes,
        hp: max_hp,
        max_hp,
        action_points: max_ap,
        max_action_points: max_ap,
        mana: max_mana,
        max_mana,
        experience: 0,
        level: 1,
        gold: starting_gold(spec.class) + spec.bonus_gold,
        position: spec.position,
        equipment: Default::default(),
        inventory: Vec::new(),
        known_spells: Vec::new(),
        quests: Vec::new(),
        flags: Default::default(),
    };

    if spec.with_starting_equipment {
        for item_id in starting_equipment(spec.class) {
            let item = get_item(item_id).expect("starting equipment ids are checked by rpg-data tests");
            match item.slot.filter(|s| !character.equipment.contains_key(s)) {
                Some(slot) => {
                    character.equipment.insert(slot, item);
                }
                None => character.inventory.push(item),
            }
        }
    }

    info!(id = %character.id, class = ?character.class, "character created");
    Ok(character)
}

// =============================================================================
// Experience & leveling
// =============================================================================

/// Cumulative XP required to reach `level`.
pub fn xp_threshold(level: u32) -> u64 {
    let l = level.saturating_sub(1) as u64;
    l * l * 1000
}

/// Award XP and process any level gains. Returns `LevelUp` events.
pub fn grant_experience(character: &mut Character, amount: u64) -> Vec<GameEvent> {
    character.experience += amount;
    let mut events = Vec::new();
    while character.experience >= xp_threshold(character.level + 1) {
        character.level += 1;
        let con_mod = Attributes::modifier(character.attributes.constitution);
        let gain = (character.class.hit_die() as i32 / 2 + 1 + con_mod).max(1);
        character.max_hp += gain;
        character.max_mana += character.class.mana_per_level();
        // Leveling restores the character.
        character.hp = character.max_hp;
        character.mana = character.max_mana;
        events.push(
            GameEvent::new(EventType::LevelUp)
                .source(&character.id)
                .with("level", character.level)
                .with("max_hp", character.max_hp),
        );
        info!(id = %character.id, level = character.level, "level up");
    }
    events
}

// =============================================================================
// Equipment
// =============================================================================

/// Equip an inventory item into a slot. Returns the item now equipped and
/// whatever it displaced.
pub fn equip_item(
    character: &mut Character,
    item_id: &str,
    slot: EquipSlot,
) -> Result<(Item, Option<Item>), GameError> {
    let idx = character
        .inventory
        .iter()
        .position(|i| i.id.as_str() == item_id)
        .ok_or_else(|| GameError::invalid_params(format!("item {item_id} not in inventory")))?;
    if !character.inventory[idx].can_equip_to(slot) {
        return Err(GameError::invalid_params(format!(
            "item {item_id} cannot be equipped to {slot:?}"
        )));
    }
    let item = character.inventory.remove(idx);
    let previous = character.equipment.insert(slot, item.clone());
    if let Some(prev) = previous.clone() {
        character.inventory.push(prev);
    }
    Ok((item, previous))
}

/// Move an equipped item back to the inventory.
pub fn unequip_item(character: &mut Character, slot: EquipSlot) -> Result<Item, GameError> {
    let item = character
        .equipment
        .remove(&slot)
        .ok_or_else(|| GameError::invalid_params(format!("nothing equipped in {slot:?}")))?;
    character.inventory.push(item.clone());
    Ok(item)
}

/// Remove one consumable from the inventory, returning it. The caller
/// resolves the consumable's payload.
pub fn take_consumable(character: &mut Character, item_id: &str) -> Result<Item, GameError> {
    let idx = character
        .inventory
        .iter()
        .position(|i| i.id.as_str() == item_id)
        .ok_or_else(|| GameError::invalid_params(format!("item {item_id} not in inventory")))?;
    if character.inventory[idx].item_type != ItemType::Consumable {
        return Err(GameError::invalid_params(format!(
            "item {item_id} is not consumable"
        )));
    }
    Ok(character.inventory.remove(idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(class: CharacterClass, method: AttributeMethod) -> CreateSpec {
        CreateSpec {
            id: EntityId::from("c1"),
            name: "Alice".into(),
            class,
            method,
            custom_attributes: None,
            with_starting_equipment: true,
            bonus_gold: 0,
            position: Position::new(5, 5, 0),
        }
    }

    #[test]
    fn standard_array_respects_class_priority() {
        let mut rng = RngState::new(1);
        let c = create_character(spec(CharacterClass::Fighter, AttributeMethod::Standard), &mut rng)
            .unwrap();
        assert_eq!(c.attributes.strength, 15);
        assert_eq!(c.attributes.constitution, 14);
        assert_eq!(c.attributes.intelligence, 8);
    }

    #[test]
    fn rolled_attributes_meet_class_minimums() {
        let mut rng = RngState::new(3);
        for _ in 0..20 {
            if let Ok(c) = create_character(spec(CharacterClass::Paladin, AttributeMethod::Roll), &mut rng)
            {
                assert!(c.attributes.charisma >= 17);
                assert!(c.attributes.strength >= 12);
            }
        }
    }

    #[test]
    fn custom_requires_scores_in_range() {
        let mut rng = RngState::new(1);
        let mut s = spec(CharacterClass::Fighter, AttributeMethod::Custom);
        assert!(create_character(s.clone(), &mut rng).is_err());

        s.custom_attributes = Some(Attributes {
            strength: 19,
            dexterity: 10,
            constitution: 10,
            intelligence: 10,
            wisdom: 10,
            charisma: 10,
        });
        assert!(create_character(s.clone(), &mut rng).is_err());

        s.custom_attributes = Some(Attributes {
            strength: 16,
            dexterity: 12,
            constitution: 14,
            intelligence: 10,
            wisdom: 10,
            charisma: 8,
        });
        let c = create_character(s, &mut rng).unwrap();
        assert_eq!(c.attributes.strength, 16);
    }

    #[test]
    fn class_minimum_rejects_weak_custom() {
        let mut rng = RngState::new(1);
        let mut s = spec(CharacterClass::Mage, AttributeMethod::Custom);
        s.custom_attributes = Some(Attributes {
            strength: 10,
            dexterity: 10,
            constitution: 10,
            intelligence: 8, // below the Mage minimum of 9
            wisdom: 10,
            charisma: 10,
        });
        let err = create_character(s, &mut rng).unwrap_err();
        assert_eq!(err.kind(), "InvalidParams");
    }

    #[test]
    fn starting_equipment_fills_slots() {
        let mut rng = RngState::new(1);
        let c = create_character(spec(CharacterClass::Fighter, AttributeMethod::Standard), &mut rng)
            .unwrap();
        assert!(c.equipment.contains_key(&EquipSlot::WeaponMain));
        assert!(c.equipment.contains_key(&EquipSlot::Chest));
        assert!(c.equipment.contains_key(&EquipSlot::WeaponOff));
        assert!(c.gold >= 100);
    }

    #[test]
    fn xp_thresholds_are_monotonic() {
        assert_eq!(xp_threshold(1), 0);
        assert_eq!(xp_threshold(2), 1000);
        assert_eq!(xp_threshold(3), 4000);
        for level in 1..20 {
            assert!(xp_threshold(level) < xp_threshold(level + 1));
        }
    }

    #[test]
    fn grant_experience_levels_up_and_restores() {
        let mut rng = RngState::new(1);
        let mut c = create_character(spec(CharacterClass::Fighter, AttributeMethod::Standard), &mut rng)
            .unwrap();
        c.set_hp(1);
        let before_max = c.max_hp;

        let events = grant_experience(&mut c, 1000);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::LevelUp);
        assert_eq!(c.level, 2);
        assert!(c.max_hp > before_max);
        assert_eq!(c.hp, c.max_hp);
    }

    #[test]
    fn multi_level_gain_emits_one_event_per_level() {
        let mut rng = RngState::new(1);
        let mut c = create_character(spec(CharacterClass::Mage, AttributeMethod::Standard), &mut rng)
            .unwrap();
        let events = grant_experience(&mut c, 4000);
        assert_eq!(events.len(), 2);
        assert_eq!(c.level, 3);
    }

    #[test]
    fn equip_swaps_previous_into_inventory() {
        let mut rng = RngState::new(1);
        let mut c = create_character(spec(CharacterClass::Fighter, AttributeMethod::Standard), &mut rng)
            .unwrap();
        c.inventory.push(get_item("dagger").unwrap());

        let (equipped, previous) =
            equip_item(&mut c, "dagger", EquipSlot::WeaponMain).unwrap();
        assert_eq!(equipped.id.as_str(), "dagger");
        assert_eq!(previous.unwrap().id.as_str(), "long_sword");
        assert!(c.inventory.iter().any(|i| i.id.as_str() == "long_sword"));
    }

    #[test]
    fn equip_rejects_wrong_slot() {
        let mut rng = RngState::new(1);
        let mut c = create_character(spec(CharacterClass::Fighter, AttributeMethod::Standard), &mut rng)
            .unwrap();
        c.inventory.push(get_item("dagger").unwrap());
        assert!(equip_item(&mut c, "dagger", EquipSlot::Head).is_err());
    }

    #[test]
    fn unequip_moves_to_inventory() {
        let mut rng = RngState::new(1);
        let mut c = create_character(spec(CharacterClass::Fighter, AttributeMethod::Standard), &mut rng)
            .unwrap();
        let item = unequip_item(&mut c, EquipSlot::Chest).unwrap();
        assert_eq!(item.id.as_str(), "chain_mail");
        assert!(!c.equipment.contains_key(&EquipSlot::Chest));
        assert!(unequip_item(&mut c, EquipSlot::Chest).is_err());
    }

    #[test]
    fn take_consumable_rejects_gear() {
        let mut rng = RngState::new(1);
        let mut c = create_character(spec(CharacterClass::Thief, AttributeMethod::Standard), &mut rng)
            .unwrap();
        c.inventory.push(get_item("healing_potion").unwrap());
        c.inventory.push(get_item("rusty_key").unwrap());

        assert!(take_consumable(&mut c, "rusty_key").is_err());
        let potion = take_consumable(&mut c, "healing_potion").unwrap();
        assert_eq!(potion.id.as_str(), "healing_potion");
        assert!(take_consumable(&mut c, "healing_potion").is_err());
    }
}

//! Item templates and per-class starting equipment.

use rpg_types::character::{CharacterClass, EquipSlot, Item, ItemType};
use rpg_types::ids::ItemId;

/// Look up an item template by ID.
pub fn get_item(id: &str) -> Option<Item> {
    match id {
        "short_sword" => Some(weapon("short_sword", "Short Sword", "1d6", 3, 10)),
        "long_sword" => Some(weapon("long_sword", "Long Sword", "1d8", 4, 15)),
        "dagger" => Some(weapon("dagger", "Dagger", "1d4", 1, 2)),
        "mace" => Some(weapon("mace", "Mace", "1d6", 4, 5)),
        "quarterstaff" => Some(weapon("quarterstaff", "Quarterstaff", "1d6", 4, 1)),
        "long_bow" => Some(weapon("long_bow", "Long Bow", "1d8", 2, 50)),
        "leather_armor" => Some(armor("leather_armor", "Leather Armor", EquipSlot::Chest, 10, 10)),
        "chain_mail" => Some(armor("chain_mail", "Chain Mail", EquipSlot::Chest, 40, 75)),
        "wooden_shield" => Some(Item {
            id: ItemId::from("wooden_shield"),
            name: "Wooden Shield".into(),
            item_type: ItemType::Shield,
            damage: String::new(),
            slot: Some(EquipSlot::WeaponOff),
            weight: 6,
            value: 10,
        }),
        "healing_potion" => Some(Item {
            id: ItemId::from("healing_potion"),
            name: "Healing Potion".into(),
            item_type: ItemType::Consumable,
            damage: "2d4+2".into(),
            slot: None,
            weight: 1,
            value: 50,
        }),
        "antidote" => Some(Item {
            id: ItemId::from("antidote"),
            name: "Antidote".into(),
            item_type: ItemType::Consumable,
            damage: String::new(),
            slot: None,
            weight: 1,
            value: 25,
        }),
        "rusty_key" => Some(Item {
            id: ItemId::from("rusty_key"),
            name: "Rusty Key".into(),
            item_type: ItemType::Quest,
            damage: String::new(),
            slot: None,
            weight: 0,
            value: 0,
        }),
        _ => None,
    }
}

fn weapon(id: &str, name: &str, damage: &str, weight: u32, value: u32) -> Item {
    Item {
        id: ItemId::from(id),
        name: name.to_string(),
        item_type: ItemType::Weapon,
        damage: damage.to_string(),
        slot: Some(EquipSlot::WeaponMain),
        weight,
        value,
    }
}

fn armor(id: &str, name: &str, slot: EquipSlot, weight: u32, value: u32) -> Item {
    Item {
        id: ItemId::from(id),
        name: name.to_string(),
        item_type: ItemType::Armor,
        damage: String::new(),
        slot: Some(slot),
        weight,
        value,
    }
}

/// Starting equipment item ids for a class.
pub fn starting_equipment(class: CharacterClass) -> &'static [&'static str] {
    match class {
        CharacterClass::Fighter => &["long_sword", "chain_mail", "wooden_shield"],
        CharacterClass::Mage => &["quarterstaff", "dagger"],
        CharacterClass::Cleric => &["mace", "chain_mail", "wooden_shield"],
        CharacterClass::Thief => &["short_sword", "dagger", "leather_armor"],
        CharacterClass::Ranger => &["long_bow", "short_sword", "leather_armor"],
        CharacterClass::Paladin => &["long_sword", "chain_mail", "wooden_shield"],
    }
}

/// Starting gold for a class, in addition to any requested bonus.
pub fn starting_gold(class: CharacterClass) -> u32 {
    match class {
        CharacterClass::Fighter | CharacterClass::Paladin => 100,
        CharacterClass::Cleric | CharacterClass::Ranger => 80,
        CharacterClass::Thief => 120,
        CharacterClass::Mage => 60,
    }
}

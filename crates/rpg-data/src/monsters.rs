//! Monster stat blocks.

use rpg_types::ids::EntityId;
use rpg_types::object::Monster;
use rpg_types::position::Position;

/// Stat block for a monster kind.
#[derive(Debug, Clone, Copy)]
pub struct MonsterDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub max_hp: i32,
    pub armor_class: i32,
    pub damage: &'static str,
    pub faction: &'static str,
    pub xp_value: u64,
    pub action_points: u32,
}

/// Look up a monster definition by ID.
pub fn get_monster(id: &str) -> Option<&'static MonsterDefinition> {
    MONSTERS.iter().find(|m| m.id == id)
}

pub fn all_monsters() -> &'static [MonsterDefinition] {
    MONSTERS
}

/// Instantiate a monster at a position. `instance` disambiguates multiple
/// spawns of the same kind ("goblin#3").
pub fn spawn(def: &MonsterDefinition, instance: u32, position: Position) -> Monster {
    Monster {
        id: EntityId::from(format!("{}#{}", def.id, instance)),
        name: def.name.to_string(),
        hp: def.max_hp,
        max_hp: def.max_hp,
        armor_class: def.armor_class,
        damage: def.damage.to_string(),
        position,
        faction: def.faction.to_string(),
        xp_value: def.xp_value,
        action_points: def.action_points,
        max_action_points: def.action_points,
    }
}

const MONSTERS: &[MonsterDefinition] = &[
    MonsterDefinition {
        id: "giant_rat",
        name: "Giant Rat",
        max_hp: 4,
        armor_class: 10,
        damage: "1d3",
        faction: "vermin",
        xp_value: 10,
        action_points: 3,
    },
    MonsterDefinition {
        id: "goblin",
        name: "Goblin",
        max_hp: 7,
        armor_class: 13,
        damage: "1d6",
        faction: "goblins",
        xp_value: 25,
        action_points: 3,
    },
    MonsterDefinition {
        id: "goblin_shaman",
        name: "Goblin Shaman",
        max_hp: 9,
        armor_class: 12,
        damage: "1d4",
        faction: "goblins",
        xp_value: 50,
        action_points: 3,
    },
    MonsterDefinition {
        id: "skeleton",
        name: "Skeleton",
        max_hp: 13,
        armor_class: 13,
        damage: "1d6+1",
        faction: "undead",
        xp_value: 50,
        action_points: 3,
    },
    MonsterDefinition {
        id: "ogre",
        name: "Ogre",
        max_hp: 30,
        armor_class: 11,
        damage: "2d8+3",
        faction: "giants",
        xp_value: 200,
        action_points: 3,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_id() {
        let goblin = get_monster("goblin").unwrap();
        assert_eq!(goblin.name, "Goblin");
        assert!(get_monster("tarrasque").is_none());
    }

    #[test]
    fn spawn_gets_unique_instance_id() {
        let def = get_monster("goblin").unwrap();
        let a = spawn(def, 1, Position::new(0, 0, 0));
        let b = spawn(def, 2, Position::new(1, 0, 0));
        assert_ne!(a.id, b.id);
        assert_eq!(a.hp, def.max_hp);
    }

    #[test]
    fn damage_dice_all_parse() {
        use rpg_types::dice::DiceExpr;
        for def in all_monsters() {
            def.damage
                .parse::<DiceExpr>()
                .unwrap_or_else(|_| panic!("{}: bad dice {}", def.id, def.damage));
        }
    }
}

//! Quest definitions.

use rpg_types::ids::{ItemId, QuestId};
use rpg_types::quest::{QuestDef, QuestObjective, QuestRewards};

/// Look up a quest definition by ID.
pub fn get_quest(id: &str) -> Option<QuestDef> {
    match id {
        "rat_problem" => Some(rat_problem()),
        "goblin_warrens" => Some(goblin_warrens()),
        "the_old_crypt" => Some(the_old_crypt()),
        _ => None,
    }
}

/// All quest ids, for catalog listings.
pub fn all_quest_ids() -> &'static [&'static str] {
    &["rat_problem", "goblin_warrens", "the_old_crypt"]
}

fn objective(key: &str, description: &str, required: u32) -> QuestObjective {
    QuestObjective {
        key: key.to_string(),
        description: description.to_string(),
        required,
    }
}

fn rat_problem() -> QuestDef {
    QuestDef {
        id: QuestId::from("rat_problem"),
        name: "A Rat Problem".into(),
        description: "The innkeeper's cellar is overrun. Clear it out.".into(),
        objectives: vec![objective("giant_rat_killed", "Kill giant rats", 5)],
        rewards: QuestRewards {
            experience: 100,
            gold: 25,
            items: vec![],
        },
        min_level: 1,
    }
}

fn goblin_warrens() -> QuestDef {
    QuestDef {
        id: QuestId::from("goblin_warrens"),
        name: "The Goblin Warrens".into(),
        description: "Goblins raid the east road by night. Find their warren and end it.".into(),
        objectives: vec![
            objective("goblin_killed", "Kill goblins", 8),
            objective("goblin_shaman_killed", "Kill the shaman", 1),
        ],
        rewards: QuestRewards {
            experience: 400,
            gold: 100,
            items: vec![ItemId::from("healing_potion")],
        },
        min_level: 2,
    }
}

fn the_old_crypt() -> QuestDef {
    QuestDef {
        id: QuestId::from("the_old_crypt"),
        name: "The Old Crypt".into(),
        description: "Something stirs beneath the chapel ruins. Take the key and look.".into(),
        objectives: vec![
            objective("skeleton_killed", "Destroy the risen dead", 6),
            objective("crypt_door_opened", "Open the crypt door", 1),
        ],
        rewards: QuestRewards {
            experience: 800,
            gold: 250,
            items: vec![ItemId::from("chain_mail")],
        },
        min_level: 3,
    }
}

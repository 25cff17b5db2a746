//! Quest log operations.
//!
//! Definitions live in `rpg-data`; progress lives on the character. Kill
//! credit flows in from combat via `record_kill`.

use tracing::info;

use rpg_data::items::get_item;
use rpg_data::quests::get_quest;
use rpg_types::character::Character;
use rpg_types::event::{EventType, GameEvent};
use rpg_types::quest::{QuestDef, QuestProgress, QuestRewards, QuestStatus};

use crate::character_ops::grant_experience;
use crate::error::GameError;

fn progress_of<'a>(
    character: &'a mut Character,
    quest_id: &str,
) -> Option<&'a mut QuestProgress> {
    character
        .quests
        .iter_mut()
        .find(|q| q.quest_id.as_str() == quest_id)
}

/// Accept a quest. Level-gated; re-accepting an active or completed quest
/// is rejected, but an abandoned quest can be picked back up.
pub fn accept_quest(character: &mut Character, quest_id: &str) -> Result<QuestDef, GameError> {
    let def = get_quest(quest_id)
        .ok_or_else(|| GameError::invalid_params(format!("unknown quest {quest_id}")))?;
    if character.level < def.min_level {
        return Err(GameError::invalid_params(format!(
            "quest {quest_id} requires level {}",
            def.min_level
        )));
    }
    match progress_of(character, quest_id) {
        Some(p) if p.status == QuestStatus::Abandoned => {
            p.status = QuestStatus::Active;
            p.progress.clear();
        }
        Some(p) => {
            return Err(GameError::invalid_params(format!(
                "quest {quest_id} is already {:?}",
                p.status
            )));
        }
        None => character
            .quests
            .push(QuestProgress::fresh(def.id.clone())),
    }
    info!(character = %character.id, quest_id, "quest accepted");
    Ok(def)
}

/// Abandon an active quest, keeping the log entry for later re-acceptance.
pub fn abandon_quest(character: &mut Character, quest_id: &str) -> Result<(), GameError> {
    let p = progress_of(character, quest_id)
        .filter(|p| p.status == QuestStatus::Active)
        .ok_or_else(|| GameError::invalid_params(format!("quest {quest_id} is not active")))?;
    p.status = QuestStatus::Abandoned;
    Ok(())
}

/// Bump an objective counter, clamped at its requirement. Returns the new
/// count and whether every objective is now met.
pub fn update_objective(
    character: &mut Character,
    quest_id: &str,
    key: &str,
    delta: u32,
) -> Result<(u32, bool), GameError> {
    let def = get_quest(quest_id)
        .ok_or_else(|| GameError::invalid_params(format!("unknown quest {quest_id}")))?;
    let objective = def
        .objectives
        .iter()
        .find(|o| o.key == key)
        .ok_or_else(|| GameError::invalid_params(format!("unknown objective {key}")))?;
    let required = objective.required;

    let p = progress_of(character, quest_id)
        .filter(|p| p.status == QuestStatus::Active)
        .ok_or_else(|| GameError::invalid_params(format!("quest {quest_id} is not active")))?;
    let counter = p.progress.entry(key.to_string()).or_insert(0);
    *counter = (*counter + delta).min(required);
    let count = *counter;
    let all_met = p.objectives_met(&def);
    Ok((count, all_met))
}

/// Turn in a quest whose objectives are all met. Pays out rewards and
/// returns the events to publish (`QuestUpdated` plus any `LevelUp`).
pub fn complete_quest(
    character: &mut Character,
    quest_id: &str,
) -> Result<(QuestRewards, Vec<GameEvent>), GameError> {
    let def = get_quest(quest_id)
        .ok_or_else(|| GameError::invalid_params(format!("unknown quest {quest_id}")))?;
    let p = progress_of(character, quest_id)
        .filter(|p| p.status == QuestStatus::Active)
        .ok_or_else(|| GameError::invalid_params(format!("quest {quest_id} is not active")))?;
    if !p.objectives_met(&def) {
        return Err(GameError::invalid_params(format!(
            "quest {quest_id} has unmet objectives"
        )));
    }
    p.status = QuestStatus::Completed;

    character.gold += def.rewards.gold;
    for item_id in &def.rewards.items {
        if let Some(item) = get_item(item_id.as_str()) {
            character.inventory.push(item);
        }
    }
    let mut events = vec![GameEvent::new(EventType::QuestUpdated)
        .source(&character.id)
        .with("quest_id", quest_id)
        .with("status", QuestStatus::Completed)];
    events.extend(grant_experience(character, def.rewards.experience));
    info!(character = %character.id, quest_id, "quest completed");
    Ok((def.rewards, events))
}

/// Credit a kill toward every active quest with a matching
/// `<monster>_killed` objective. Returns quests that newly satisfied all
/// objectives.
pub fn record_kill(character: &mut Character, monster_kind: &str) -> Vec<String> {
    let key = format!("{monster_kind}_killed");
    let active: Vec<String> = character
        .quests
        .iter()
        .filter(|p| p.status == QuestStatus::Active)
        .map(|p| p.quest_id.as_str().to_string())
        .collect();

    let mut newly_complete = Vec::new();
    for quest_id in active {
        let Some(def) = get_quest(&quest_id) else {
            continue;
        };
        if !def.objectives.iter().any(|o| o.key == key) {
            continue;
        }
        let was_met = progress_of(character, &quest_id)
            .map(|p| p.objectives_met(&def))
            .unwrap_or(false);
        if let Ok((_, all_met)) = update_objective(character, &quest_id, &key, 1) {
            if all_met && !was_met {
                newly_complete.push(quest_id);
            }
        }
    }
    newly_complete
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character_ops::{create_character, AttributeMethod, CreateSpec};
    use rpg_types::character::CharacterClass;
    use rpg_types::ids::EntityId;
    use rpg_types::position::Position;
    use rpg_types::rng::RngState;

    fn hero() -> Character {
        let mut rng = RngState::new(5);
        create_character(
            CreateSpec {
                id: EntityId::from("hero"),
                name: "Hero".into(),
                class: CharacterClass::Fighter,
                method: AttributeMethod::Standard,
                custom_attributes: None,
                with_starting_equipment: false,
                bonus_gold: 0,
                position: Position::new(0, 0, 0),
            },
            &mut rng,
        )
        .unwrap()
    }

    #[test]
    fn accept_is_level_gated() {
        let mut c = hero();
        assert!(accept_quest(&mut c, "rat_problem").is_ok());
        // goblin_warrens needs level 2.
        let err = accept_quest(&mut c, "goblin_warrens").unwrap_err();
        assert_eq!(err.kind(), "InvalidParams");
    }

    #[test]
    fn double_accept_rejected_but_abandoned_resumes() {
        let mut c = hero();
        accept_quest(&mut c, "rat_problem").unwrap();
        assert!(accept_quest(&mut c, "rat_problem").is_err());

        abandon_quest(&mut c, "rat_problem").unwrap();
        assert!(abandon_quest(&mut c, "rat_problem").is_err());
        accept_quest(&mut c, "rat_problem").unwrap();
        assert_eq!(c.quests.len(), 1);
    }

    #[test]
    fn objective_clamps_at_requirement() {
        let mut c = hero();
        accept_quest(&mut c, "rat_problem").unwrap();
        let (count, done) = update_objective(&mut c, "rat_problem", "giant_rat_killed", 3).unwrap();
        assert_eq!((count, done), (3, false));
        let (count, done) = update_objective(&mut c, "rat_problem", "giant_rat_killed", 99).unwrap();
        assert_eq!((count, done), (5, true));
    }

    #[test]
    fn unknown_objective_rejected() {
        let mut c = hero();
        accept_quest(&mut c, "rat_problem").unwrap();
        assert!(update_objective(&mut c, "rat_problem", "dragons_killed", 1).is_err());
    }

    #[test]
    fn complete_pays_out_once() {
        let mut c = hero();
        accept_quest(&mut c, "rat_problem").unwrap();
        assert!(complete_quest(&mut c, "rat_problem").is_err()); // unmet

        update_objective(&mut c, "rat_problem", "giant_rat_killed", 5).unwrap();
        let gold_before = c.gold;
        let (rewards, events) = complete_quest(&mut c, "rat_problem").unwrap();
        assert_eq!(rewards.gold, 25);
        assert_eq!(c.gold, gold_before + 25);
        assert_eq!(c.experience, 100);
        assert!(events
            .iter()
            .any(|e| e.event_type == EventType::QuestUpdated));

        // Completed quests cannot be turned in again or re-accepted.
        assert!(complete_quest(&mut c, "rat_problem").is_err());
        assert!(accept_quest(&mut c, "rat_problem").is_err());
    }

    #[test]
    fn record_kill_credits_matching_quests() {
        let mut c = hero();
        accept_quest(&mut c, "rat_problem").unwrap();

        for _ in 0..4 {
            assert!(record_kill(&mut c, "giant_rat").is_empty());
        }
        let done = record_kill(&mut c, "giant_rat");
        assert_eq!(done, vec!["rat_problem".to_string()]);
        // Further kills don't re-report completion.
        assert!(record_kill(&mut c, "giant_rat").is_empty());
        // Unrelated kills never credit.
        assert!(record_kill(&mut c, "ogre").is_empty());
    }
}

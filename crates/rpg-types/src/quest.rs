//! Quest definitions and per-player quest progress.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{ItemId, QuestId};

/// A single objective within a quest definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestObjective {
    /// Stable key used by `updateObjective` (e.g., "rats_killed").
    pub key: String,
    pub description: String,
    /// Progress count required to satisfy the objective.
    pub required: u32,
}

/// What completing a quest pays out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestRewards {
    #[serde(default)]
    pub experience: u64,
    #[serde(default)]
    pub gold: u32,
    #[serde(default)]
    pub items: Vec<ItemId>,
}

/// A quest definition (static data).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestDef {
    pub id: QuestId,
    pub name: String,
    pub description: String,
    pub objectives: Vec<QuestObjective>,
    pub rewards: QuestRewards,
    /// Minimum character level to accept.
    #[serde(default)]
    pub min_level: u32,
}

/// Lifecycle of a quest for one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    Active,
    Completed,
    Abandoned,
}

/// One player's progress on one quest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestProgress {
    pub quest_id: QuestId,
    pub status: QuestStatus,
    /// Objective key → progress count, clamped to the objective's `required`.
    #[serde(default)]
    pub progress: BTreeMap<String, u32>,
}

impl QuestProgress {
    pub fn fresh(quest_id: QuestId) -> Self {
        Self {
            quest_id,
            status: QuestStatus::Active,
            progress: BTreeMap::new(),
        }
    }

    /// Whether every objective of `def` has reached its required count.
    pub fn objectives_met(&self, def: &QuestDef) -> bool {
        def.objectives
            .iter()
            .all(|o| self.progress.get(&o.key).copied().unwrap_or(0) >= o.required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objectives_met_requires_all_keys() {
        let def = QuestDef {
            id: QuestId::from("rat_problem"),
            name: "A Rat Problem".into(),
            description: "Clear the cellar.".into(),
            objectives: vec![
                QuestObjective {
                    key: "rats_killed".into(),
                    description: "Kill rats".into(),
                    required: 5,
                },
                QuestObjective {
                    key: "report_back".into(),
                    description: "Report to the innkeeper".into(),
                    required: 1,
                },
            ],
            rewards: QuestRewards::default(),
            min_level: 0,
        };

        let mut progress = QuestProgress::fresh(def.id.clone());
        assert!(!progress.objectives_met(&def));

        progress.progress.insert("rats_killed".into(), 5);
        assert!(!progress.objectives_met(&def));

        progress.progress.insert("report_back".into(), 1);
        assert!(progress.objectives_met(&def));
    }
}

//! Turn manager — initiative order, turn advancement, rounds, delayed
//! actions.
//!
//! ## State machine
//!
//! ```text
//! OutOfCombat ── start_combat ──► InCombat { round = 1, index = 0 }
//!      ▲                              │ advance_turn
//!      │ end_combat                   ▼
//!      └──────── InCombat { index = (index+1) % N, round++ on wrap }
//! ```
//!
//! Effect processing for the outgoing actor happens between the advance
//! report and the next action; the manager itself never touches effects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, warn};

use rpg_types::ids::EntityId;
use rpg_types::position::Position;

use crate::error::GameError;

// =============================================================================
// Delayed actions
// =============================================================================

/// An action queued for a future tick, executed at a round boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayedAction {
    pub actor: EntityId,
    pub action_type: String,
    pub target: Position,
    /// Absolute game tick after which the action is due.
    pub trigger_tick: u64,
    #[serde(default)]
    pub params: Map<String, Value>,
}

// =============================================================================
// Advance report
// =============================================================================

/// What an `advance_turn` did.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvanceReport {
    /// Actor whose turn just ended.
    pub previous: EntityId,
    /// Actor whose turn begins now.
    pub next: EntityId,
    /// Set when the advance wrapped the initiative and started a new round.
    pub new_round: Option<u64>,
    /// Delayed actions due at this round boundary, FIFO. Empty unless the
    /// round wrapped.
    pub due_actions: Vec<DelayedAction>,
    /// Global turn counter after the advance.
    pub turn: u64,
}

// =============================================================================
// TurnManager
// =============================================================================

/// Initiative-based combat scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnManager {
    current_round: u64,
    initiative: Vec<EntityId>,
    current_index: usize,
    in_combat: bool,
    /// Faction → members, fixed at combat start.
    combat_groups: BTreeMap<String, Vec<EntityId>>,
    delayed_actions: Vec<DelayedAction>,
    /// Monotonic turn counter across all combats; drives turn-domain
    /// effect expiry.
    turn_counter: u64,
}

impl TurnManager {
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Combat lifecycle
    // -------------------------------------------------------------------------

    /// Enter combat with a pre-rolled initiative order.
    ///
    /// Validation: must not already be in combat; order must be non-empty,
    /// contain no blank ids, no duplicates, and every id must pass
    /// `is_known` (world membership).
    pub fn start_combat(
        &mut self,
        initiative: Vec<EntityId>,
        combat_groups: BTreeMap<String, Vec<EntityId>>,
        is_known: impl Fn(&EntityId) -> bool,
    ) -> Result<(), GameError> {
        if self.in_combat {
            return Err(GameError::AlreadyInCombat);
        }
        if initiative.is_empty() {
            return Err(GameError::InvalidInitiative {
                reason: "initiative order is empty".into(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for id in &initiative {
            if id.is_empty() {
                return Err(GameError::InvalidInitiative {
                    reason: "initiative contains a blank id".into(),
                });
            }
            if !seen.insert(id.clone()) {
                return Err(GameError::InvalidInitiative {
                    reason: format!("duplicate id {id} in initiative"),
                });
            }
            if !is_known(id) {
                return Err(GameError::InvalidInitiative {
                    reason: format!("unknown entity {id} in initiative"),
                });
            }
        }

        self.initiative = initiative;
        self.combat_groups = combat_groups;
        self.current_index = 0;
        self.current_round = 1;
        self.in_combat = true;
        self.turn_counter += 1;
        Ok(())
    }

    /// Leave combat, clearing initiative and any undelivered delayed
    /// actions.
    pub fn end_combat(&mut self) {
        self.in_combat = false;
        self.initiative.clear();
        self.combat_groups.clear();
        self.current_index = 0;
        if !self.delayed_actions.is_empty() {
            warn!(
                dropped = self.delayed_actions.len(),
                "combat ended with undelivered delayed actions"
            );
            self.delayed_actions.clear();
        }
    }

    /// Advance to the next actor. Returns `None` out of combat or when the
    /// initiative is corrupt (logged, never panics).
    ///
    /// `now_tick` gates which delayed actions come due on a round wrap.
    pub fn advance_turn(&mut self, now_tick: u64) -> Option<AdvanceReport> {
        if !self.in_combat {
            return None;
        }
        if self.initiative.is_empty() {
            error!("advance_turn called with empty initiative while in combat");
            return None;
        }
        if self.current_index >= self.initiative.len() {
            error!(
                index = self.current_index,
                len = self.initiative.len(),
                "initiative index out of range; resetting to 0"
            );
            self.current_index = 0;
        }

        let previous = self.initiative[self.current_index].clone();
        self.current_index = (self.current_index + 1) % self.initiative.len();
        self.turn_counter += 1;

        let mut new_round = None;
        let mut due_actions = Vec::new();
        if self.current_index == 0 {
            self.current_round += 1;
            new_round = Some(self.current_round);
            due_actions = self.drain_due(now_tick);
        }

        Some(AdvanceReport {
            previous,
            next: self.initiative[self.current_index].clone(),
            new_round,
            due_actions,
            turn: self.turn_counter,
        })
    }

    /// Drop a combatant mid-combat (death, flee). Keeps the current actor
    /// stable when possible.
    pub fn remove_participant(&mut self, id: &EntityId) {
        let Some(pos) = self.initiative.iter().position(|x| x == id) else {
            return;
        };
        self.initiative.remove(pos);
        for members in self.combat_groups.values_mut() {
            members.retain(|m| m != id);
        }
        if self.initiative.is_empty() {
            self.current_index = 0;
            return;
        }
        if pos < self.current_index {
            self.current_index -= 1;
        } else if self.current_index >= self.initiative.len() {
            self.current_index = 0;
        }
    }

    // -------------------------------------------------------------------------
    // Delayed actions
    // -------------------------------------------------------------------------

    /// Queue an action for a future tick. Executed FIFO among due actions
    /// at the next round boundary.
    pub fn queue_delayed(&mut self, action: DelayedAction) {
        self.delayed_actions.push(action);
    }

    fn drain_due(&mut self, now_tick: u64) -> Vec<DelayedAction> {
        let mut due = Vec::new();
        let mut remaining = Vec::with_capacity(self.delayed_actions.len());
        for action in self.delayed_actions.drain(..) {
            if action.trigger_tick <= now_tick {
                due.push(action);
            } else {
                remaining.push(action);
            }
        }
        self.delayed_actions = remaining;
        due
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn is_in_combat(&self) -> bool {
        self.in_combat
    }

    /// Strict check: in combat and `id` is the actor at the current index.
    pub fn is_current_turn(&self, id: &EntityId) -> bool {
        self.in_combat
            && self
                .initiative
                .get(self.current_index)
                .is_some_and(|cur| cur == id)
    }

    pub fn current_actor(&self) -> Option<&EntityId> {
        if !self.in_combat {
            return None;
        }
        self.initiative.get(self.current_index)
    }

    pub fn current_round(&self) -> u64 {
        self.current_round
    }

    /// Monotonic global turn counter.
    pub fn turn_counter(&self) -> u64 {
        self.turn_counter
    }

    pub fn initiative(&self) -> &[EntityId] {
        &self.initiative
    }

    pub fn combat_groups(&self) -> &BTreeMap<String, Vec<EntityId>> {
        &self.combat_groups
    }

    /// Factions that still have a member in the initiative order.
    pub fn surviving_factions(&self) -> Vec<&str> {
        self.combat_groups
            .iter()
            .filter(|(_, members)| members.iter().any(|m| self.initiative.contains(m)))
            .map(|(faction, _)| faction.as_str())
            .collect()
    }

    /// Whether at most one faction remains — the end-of-combat condition.
    pub fn combat_is_over(&self) -> bool {
        self.in_combat && self.surviving_factions().len() <= 1
    }

    pub fn in_initiative(&self, id: &EntityId) -> bool {
        self.initiative.contains(id)
    }
}

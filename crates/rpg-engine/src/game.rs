//! Game façade — the single mutation path over world, turns and time.
//!
//! Every gameplay RPC lands on one method here. Methods validate, mutate,
//! and return the events the server publishes; nothing in this module
//! does I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use rpg_types::dice::DiceExpr;
use rpg_types::effect::{
    DispelInfo, DispelType, DurationSpec, Effect, EffectClock, EffectStart, EffectType,
};
use rpg_types::event::{EventType, GameEvent};
use rpg_types::ids::{EffectId, EntityId};
use rpg_types::object::GameObject;
use rpg_types::position::{Direction, Position};

use crate::clock::TimeManager;
use crate::combat::{self, MOVE_AP_COST};
use crate::error::GameError;
use crate::spells;
use crate::turn::{DelayedAction, TurnManager};
use crate::world::World;

/// AP cost of drinking or applying a consumable in combat.
const USE_ITEM_AP_COST: u32 = 1;

/// The authoritative game core: everything that persists in the
/// `gamestate` snapshot.
#[derive(Debug, Serialize, Deserialize)]
pub struct Game {
    pub world: World,
    pub turns: TurnManager,
    pub time: TimeManager,
}

/// Result of a move request. A blocked move (edge, wall, occupied tile)
/// completes without error, position unchanged.
#[derive(Debug, Clone)]
pub struct MoveReport {
    pub position: Position,
    pub moved: bool,
    pub events: Vec<GameEvent>,
}

impl Game {
    pub fn new(width: i32, height: i32, seed: u64, now: DateTime<Utc>) -> Self {
        Self {
            world: World::new(width, height, seed),
            turns: TurnManager::new(),
            time: TimeManager::new(now),
        }
    }

    /// Fix up derived state after deserialization.
    pub fn after_load(&mut self, now: DateTime<Utc>) {
        self.world.rebuild_spatial();
        self.time.resume(now);
    }

    /// Current reading of the three effect clocks.
    pub fn clock(&self, now: DateTime<Utc>) -> EffectClock {
        EffectClock {
            now,
            round: self.turns.current_round(),
            turn: self.turns.turn_counter(),
        }
    }

    /// Clock snapshot stamped onto newly applied effects.
    pub fn effect_start(&self, now: DateTime<Utc>) -> EffectStart {
        EffectStart {
            at: now,
            round: self.turns.current_round(),
            turn: self.turns.turn_counter(),
        }
    }

    // -------------------------------------------------------------------------
    // Movement
    // -------------------------------------------------------------------------

    /// Move one step. In combat this costs AP and requires the actor's
    /// turn; AP is spent strictly before the position changes.
    pub fn move_entity(
        &mut self,
        id: &EntityId,
        direction: Direction,
    ) -> Result<MoveReport, GameError> {
        let obj = self
            .world
            .get(id)
            .ok_or_else(|| GameError::UnknownEntity { id: id.clone() })?;
        if !obj.is_blocking() {
            return Err(GameError::invalid_params("dead entities cannot move"));
        }
        let current = obj.position();

        if self
            .world
            .effect_manager_ref(id)
            .is_some_and(|m| m.is_rooted())
        {
            return Err(GameError::invalid_params("cannot move while rooted"));
        }

        let fighting = self.turns.is_in_combat() && self.turns.in_initiative(id);
        if fighting && !self.turns.is_current_turn(id) {
            return Err(GameError::NotYourTurn { id: id.clone() });
        }

        let target = current.step(direction);
        if self.world.validate_move(id, target).is_err() {
            // Edge of the world, wall, or an occupied tile: the request
            // completes, position unchanged, nothing spent.
            return Ok(MoveReport {
                position: current,
                moved: false,
                events: Vec::new(),
            });
        }

        if fighting {
            combat::spend_ap(self.world.get_mut(id).expect("checked above"), MOVE_AP_COST)?;
        }
        let event = self.world.move_object(id, target)?;
        Ok(MoveReport {
            position: target,
            moved: true,
            events: vec![event],
        })
    }

    // -------------------------------------------------------------------------
    // Combat
    // -------------------------------------------------------------------------

    /// Start combat among `participants`. Rolls initiative (d20 + dex
    /// modifier) and groups combatants by faction.
    pub fn start_combat(
        &mut self,
        participants: &[EntityId],
    ) -> Result<(Vec<EntityId>, EntityId, Vec<GameEvent>), GameError> {
        if self.turns.is_in_combat() {
            return Err(GameError::AlreadyInCombat);
        }
        for id in participants {
            if !self.world.contains(id) {
                return Err(GameError::InvalidInitiative {
                    reason: format!("unknown entity {id} in initiative"),
                });
            }
        }

        let order = combat::roll_initiative(&mut self.world, participants);
        let mut groups: std::collections::BTreeMap<String, Vec<EntityId>> = Default::default();
        for id in participants {
            if let Some(faction) = self.world.get(id).and_then(|o| o.faction()) {
                groups.entry(faction.to_string()).or_default().push(id.clone());
            }
        }
        let world = &self.world;
        self.turns
            .start_combat(order.clone(), groups, |id| world.contains(id))?;

        for id in &order {
            if let Some(c) = self.world.get_mut(id).and_then(GameObject::as_player_mut) {
                c.flags.set(rpg_types::character::CharacterFlags::IN_COMBAT, true);
            }
        }
        let first = order[0].clone();
        if let Some(obj) = self.world.get_mut(&first) {
            combat::refresh_ap(obj);
        }

        let events = vec![
            GameEvent::new(EventType::CombatStart)
                .with("initiative", order.iter().map(|i| i.as_str()).collect::<Vec<_>>()),
            GameEvent::new(EventType::TurnStart).source(&first),
        ];
        Ok((order, first, events))
    }

    /// Resolve an attack, then settle kills against the initiative and the
    /// attacker's quest log.
    pub fn attack(
        &mut self,
        attacker: &EntityId,
        target: &EntityId,
        weapon_id: Option<&str>,
    ) -> Result<(bool, i32, Vec<GameEvent>), GameError> {
        if self.turns.is_in_combat()
            && self.turns.in_initiative(attacker)
            && !self.turns.is_current_turn(attacker)
        {
            return Err(GameError::NotYourTurn {
                id: attacker.clone(),
            });
        }
        let outcome = combat::attack(&mut self.world, attacker, target, weapon_id)?;
        let mut events = outcome.events;
        if outcome.target_killed {
            events.extend(self.settle_death(attacker, target));
        }
        Ok((outcome.hit, outcome.damage, events))
    }

    /// Bookkeeping after something died: quest credit, initiative removal,
    /// combat-end detection.
    fn settle_death(&mut self, killer: &EntityId, victim: &EntityId) -> Vec<GameEvent> {
        let mut events = Vec::new();

        // Quest credit for the monster kind ("goblin#3" → "goblin").
        let kind = victim.as_str().split('#').next().unwrap_or_default().to_string();
        if let Some(c) = self.world.get_mut(killer).and_then(GameObject::as_player_mut) {
            for quest_id in crate::quests::record_kill(c, &kind) {
                events.push(
                    GameEvent::new(EventType::QuestUpdated)
                        .source(killer)
                        .with("quest_id", quest_id)
                        .with("objectives_met", true),
                );
            }
        }

        if self.turns.in_initiative(victim) {
            self.turns.remove_participant(victim);
            events.extend(self.maybe_end_combat());
        }
        events
    }

    fn maybe_end_combat(&mut self) -> Vec<GameEvent> {
        if !self.turns.combat_is_over() {
            return Vec::new();
        }
        let survivors = self
            .turns
            .surviving_factions()
            .first()
            .map(|s| s.to_string());
        self.turns.end_combat();
        let ids: Vec<EntityId> = self.world.objects().map(|(id, _)| id.clone()).collect();
        for id in ids {
            if let Some(c) = self.world.get_mut(&id).and_then(GameObject::as_player_mut) {
                c.flags
                    .set(rpg_types::character::CharacterFlags::IN_COMBAT, false);
            }
        }
        vec![GameEvent::new(EventType::CombatEnd).with("winning_faction", survivors)]
    }

    /// End the current actor's turn: per-turn effect processing, advance,
    /// delayed actions at round boundaries, AP refresh for the next actor.
    pub fn end_turn(
        &mut self,
        actor: &EntityId,
        now: DateTime<Utc>,
    ) -> Result<(Option<EntityId>, Vec<GameEvent>), GameError> {
        if !self.turns.is_in_combat() {
            return Err(GameError::NotInCombat);
        }
        if !self.turns.is_current_turn(actor) {
            return Err(GameError::NotYourTurn { id: actor.clone() });
        }

        let mut events = vec![GameEvent::new(EventType::TurnEnd).source(actor)];

        let Some(report) = self.turns.advance_turn(self.time.ticks()) else {
            return Err(GameError::NotInCombat);
        };
        // End-of-turn effect processing for the outgoing actor, against
        // the post-advance clocks.
        let clock = self.clock(now);
        events.extend(self.world.tick_effects_for(actor, &clock));
        events.extend(self.reap_dead_combatants());

        for action in report.due_actions {
            events.extend(self.execute_delayed(action));
        }

        if self.turns.is_in_combat() {
            let next = self.turns.current_actor().cloned();
            if let Some(next_id) = &next {
                if let Some(obj) = self.world.get_mut(next_id) {
                    combat::refresh_ap(obj);
                }
                events.push(GameEvent::new(EventType::TurnStart).source(next_id));
            }
            Ok((next, events))
        } else {
            Ok((None, events))
        }
    }

    /// Remove combatants the effect tick just killed.
    fn reap_dead_combatants(&mut self) -> Vec<GameEvent> {
        let dead: Vec<EntityId> = self
            .turns
            .initiative()
            .iter()
            .filter(|id| {
                self.world
                    .get(id)
                    .is_some_and(|o| !o.is_blocking())
            })
            .cloned()
            .collect();
        let mut events = Vec::new();
        for id in dead {
            self.turns.remove_participant(&id);
        }
        events.extend(self.maybe_end_combat());
        events
    }

    /// Queue a delayed action for a future tick.
    pub fn queue_delayed(&mut self, action: DelayedAction) {
        self.turns.queue_delayed(action);
    }

    fn execute_delayed(&mut self, action: DelayedAction) -> Vec<GameEvent> {
        match action.action_type.as_str() {
            "move" => match self.world.move_object(&action.actor, action.target) {
                Ok(event) => vec![event],
                Err(err) => {
                    warn!(actor = %action.actor, %err, "delayed move failed");
                    Vec::new()
                }
            },
            other => {
                warn!(action_type = other, "unknown delayed action type dropped");
                Vec::new()
            }
        }
    }

    // -------------------------------------------------------------------------
    // Spells, items, effects
    // -------------------------------------------------------------------------

    /// Cast a spell, settling any deaths it caused.
    pub fn cast_spell(
        &mut self,
        caster: &EntityId,
        spell_id: &str,
        target: Option<&EntityId>,
        position: Option<Position>,
        now: DateTime<Utc>,
    ) -> Result<(Vec<EffectId>, Vec<GameEvent>), GameError> {
        let fighting = self.turns.is_in_combat() && self.turns.in_initiative(caster);
        if fighting && !self.turns.is_current_turn(caster) {
            return Err(GameError::NotYourTurn { id: caster.clone() });
        }
        let start = self.effect_start(now);
        let outcome =
            spells::cast_spell(&mut self.world, caster, spell_id, target, position, fighting, start)?;

        let mut events = outcome.events;
        let victims: Vec<EntityId> = events
            .iter()
            .filter(|e| e.event_type == EventType::Death)
            .filter_map(|e| e.target.clone())
            .collect();
        for victim in victims {
            events.extend(self.settle_death(caster, &victim));
        }
        Ok((outcome.applied_effects, events))
    }

    /// Use a consumable on a target (default: self). Healing potions heal
    /// their dice; antidotes dispel poison.
    pub fn use_item(
        &mut self,
        user: &EntityId,
        item_id: &str,
        target: Option<&EntityId>,
    ) -> Result<Vec<GameEvent>, GameError> {
        let target = target.unwrap_or(user).clone();
        if !self.world.contains(&target) {
            return Err(GameError::UnknownEntity { id: target });
        }
        let fighting = self.turns.is_in_combat() && self.turns.in_initiative(user);
        if fighting {
            if !self.turns.is_current_turn(user) {
                return Err(GameError::NotYourTurn { id: user.clone() });
            }
            let available = self
                .world
                .get(user)
                .and_then(GameObject::as_player)
                .map(|c| c.action_points)
                .unwrap_or(0);
            if available < USE_ITEM_AP_COST {
                return Err(GameError::InsufficientResources {
                    resource: "action points",
                    needed: USE_ITEM_AP_COST,
                    available,
                });
            }
        }

        // Validate the item read-only so the AP spend stays first among
        // mutations.
        {
            let user_char = self
                .world
                .get(user)
                .and_then(GameObject::as_player)
                .ok_or_else(|| GameError::UnknownEntity { id: user.clone() })?;
            let item = user_char
                .inventory
                .iter()
                .find(|i| i.id.as_str() == item_id)
                .ok_or_else(|| {
                    GameError::invalid_params(format!("item {item_id} not in inventory"))
                })?;
            if item.item_type != rpg_types::character::ItemType::Consumable {
                return Err(GameError::invalid_params(format!(
                    "item {item_id} is not consumable"
                )));
            }
        }
        if fighting {
            combat::spend_ap(self.world.get_mut(user).expect("user exists"), USE_ITEM_AP_COST)?;
        }
        let item = {
            let user_char = self
                .world
                .get_mut(user)
                .and_then(GameObject::as_player_mut)
                .expect("validated above");
            crate::character_ops::take_consumable(user_char, item_id)?
        };

        let mut events = vec![GameEvent::new(EventType::ItemUsed)
            .source(user)
            .target(&target)
            .with("item_id", item_id)];

        if !item.damage.is_empty() {
            // Restorative consumables carry their dice in `damage`.
            let dice: DiceExpr = item
                .damage
                .parse()
                .map_err(|_| GameError::invalid_params(format!("item {item_id} has bad dice")))?;
            let amount = dice.roll(self.world.rng()).max(0);
            events.push(
                GameEvent::new(EventType::Heal)
                    .source(user)
                    .target(&target)
                    .with("amount", amount),
            );
            self.world.apply_hp_delta(&target, amount);
        } else if item.id.as_str() == "antidote" {
            let removed = self
                .world
                .effect_manager(&target)
                .dispel(DispelType::Poison, 100);
            for effect in removed {
                events.push(
                    GameEvent::new(EventType::EffectDispelled)
                        .source(user)
                        .target(&target)
                        .with("effect_id", effect.id.as_str())
                        .with("effect_type", effect.effect_type),
                );
            }
        }
        Ok(events)
    }

    /// Apply a bare effect (the `applyEffect` RPC): defaults from the
    /// policy table, one reflect bounce.
    pub fn apply_effect(
        &mut self,
        source: &EntityId,
        target: &EntityId,
        effect_type: EffectType,
        magnitude: f64,
        duration: DurationSpec,
        now: DateTime<Utc>,
    ) -> Result<(Vec<EffectId>, Vec<GameEvent>), GameError> {
        if !self.world.contains(target) {
            return Err(GameError::UnknownEntity { id: target.clone() });
        }
        let effect = Effect {
            id: self.world.next_effect_id(),
            effect_type,
            source: source.clone(),
            target: target.clone(),
            magnitude,
            duration,
            started: self.effect_start(now),
            stacks: 1,
            dispel: DispelInfo::defaults_for(effect_type),
        };
        let mut applied = Vec::new();
        let mut events = spells::apply_effect_to(&mut self.world, effect, target, &mut applied);

        let victims: Vec<EntityId> = events
            .iter()
            .filter(|e| e.event_type == EventType::Death)
            .filter_map(|e| e.target.clone())
            .collect();
        for victim in victims {
            events.extend(self.settle_death(source, &victim));
        }
        if applied.is_empty() && events.iter().any(|e| e.event_type == EventType::ImmunityBlocked)
        {
            // Surface the block as an error for the direct-apply RPC; the
            // event has already been recorded for subscribers.
            return Err(GameError::ImmunityBlocked { effect_type });
        }
        Ok((applied, events))
    }

    // -------------------------------------------------------------------------
    // Clock
    // -------------------------------------------------------------------------

    /// Advance game time: scheduled events fire, real-time effect domains
    /// tick across every holder.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<GameEvent> {
        let advance = self.time.advance(now);
        let mut events = Vec::new();
        if advance.ticks_elapsed > 0 {
            let clock = self.clock(now);
            events.extend(self.world.tick_all_effects(&clock));
            if self.turns.is_in_combat() {
                events.extend(self.reap_dead_combatants());
            }
        }
        for due in advance.due {
            warn!(id = %due.id, event_type = %due.event_type, "scheduled event fired without handler");
        }
        events
    }
}

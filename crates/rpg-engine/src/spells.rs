//! Spell casting — learning, forgetting, and the cast pipeline.
//!
//! Resource discipline matches combat: mana and action points are checked
//! and spent before any effect is built or applied.

use tracing::debug;

use rpg_data::spells::get_spell;
use rpg_types::character::Character;
use rpg_types::dice::DiceExpr;
use rpg_types::effect::{DispelInfo, Effect, EffectStart};
use rpg_types::event::{EventType, GameEvent};
use rpg_types::ids::{EffectId, EntityId, SpellId};
use rpg_types::object::GameObject;
use rpg_types::position::Position;
use rpg_types::spell::{Spell, SpellTarget};

use crate::combat::spend_ap;
use crate::effects::ApplyOutcome;
use crate::error::GameError;
use crate::world::World;

// =============================================================================
// Learning
// =============================================================================

/// Learn a spell from the catalog. Requires a caster class (a mana pool),
/// sufficient level, and not already knowing it.
pub fn learn_spell(character: &mut Character, spell_id: &str) -> Result<Spell, GameError> {
    let spell = get_spell(spell_id)
        .ok_or_else(|| GameError::invalid_params(format!("unknown spell {spell_id}")))?;
    if character.max_mana == 0 {
        return Err(GameError::invalid_params(format!(
            "{:?} cannot learn spells",
            character.class
        )));
    }
    if character.level < spell.level {
        return Err(GameError::invalid_params(format!(
            "spell {spell_id} requires level {}",
            spell.level
        )));
    }
    if character.known_spells.iter().any(|s| s.as_str() == spell_id) {
        return Err(GameError::invalid_params(format!(
            "spell {spell_id} already known"
        )));
    }
    character.known_spells.push(spell.id.clone());
    Ok(spell)
}

/// Forget a known spell.
pub fn forget_spell(character: &mut Character, spell_id: &str) -> Result<SpellId, GameError> {
    let idx = character
        .known_spells
        .iter()
        .position(|s| s.as_str() == spell_id)
        .ok_or_else(|| GameError::invalid_params(format!("spell {spell_id} not known")))?;
    Ok(character.known_spells.remove(idx))
}

// =============================================================================
// Casting
// =============================================================================

/// Result of a cast.
#[derive(Debug, Clone)]
pub struct CastOutcome {
    pub spell_id: SpellId,
    /// Effect ids now active on targets (instant effects excluded once
    /// they expire).
    pub applied_effects: Vec<EffectId>,
    pub events: Vec<GameEvent>,
}

/// Cast a known spell.
///
/// `in_combat` additionally charges the spell's AP cost. `start` stamps
/// the three effect clocks at application time.
#[allow(clippy::too_many_arguments)]
pub fn cast_spell(
    world: &mut World,
    caster_id: &EntityId,
    spell_id: &str,
    target_id: Option<&EntityId>,
    position: Option<Position>,
    in_combat: bool,
    start: EffectStart,
) -> Result<CastOutcome, GameError> {
    let caster = world
        .get(caster_id)
        .and_then(GameObject::as_player)
        .ok_or_else(|| GameError::UnknownEntity {
            id: caster_id.clone(),
        })?;
    if !caster.is_alive() {
        return Err(GameError::invalid_params("dead characters cannot cast"));
    }
    if !caster.known_spells.iter().any(|s| s.as_str() == spell_id) {
        return Err(GameError::invalid_params(format!(
            "spell {spell_id} not known"
        )));
    }
    let spell = get_spell(spell_id)
        .ok_or_else(|| GameError::invalid_params(format!("unknown spell {spell_id}")))?;
    if world
        .effect_manager_ref(caster_id)
        .is_some_and(|m| m.is_stunned())
    {
        return Err(GameError::invalid_params("cannot cast while stunned"));
    }

    let caster_pos = caster.position;
    let targets = resolve_targets(world, caster_id, caster_pos, &spell, target_id, position)?;

    // Resources: verify both, then spend both, before any mutation.
    let caster = world
        .get(caster_id)
        .and_then(GameObject::as_player)
        .expect("checked above");
    if caster.mana < spell.mana_cost {
        return Err(GameError::InsufficientResources {
            resource: "mana",
            needed: spell.mana_cost,
            available: caster.mana,
        });
    }
    if in_combat {
        let available = caster.action_points;
        if available < spell.ap_cost {
            return Err(GameError::InsufficientResources {
                resource: "action points",
                needed: spell.ap_cost,
                available,
            });
        }
        spend_ap(world.get_mut(caster_id).expect("caster exists"), spell.ap_cost)?;
    }
    if let Some(c) = world.get_mut(caster_id).and_then(GameObject::as_player_mut) {
        c.mana -= spell.mana_cost;
    }

    let mut events = vec![GameEvent::new(EventType::SpellCast)
        .source(caster_id)
        .with("spell_id", spell_id)
        .with("targets", targets.iter().map(|t| t.as_str()).collect::<Vec<_>>())];
    let mut applied_effects = Vec::new();

    for target in &targets {
        for spec in &spell.effects {
            let dice: DiceExpr = spec
                .magnitude
                .parse()
                .map_err(|_| GameError::invalid_params(format!("spell {spell_id} has bad dice")))?;
            let magnitude = dice.roll(world.rng()).max(0) as f64;
            let effect = Effect {
                id: world.next_effect_id(),
                effect_type: spec.effect_type,
                source: caster_id.clone(),
                target: target.clone(),
                magnitude,
                duration: spec.duration,
                started: start,
                stacks: 1,
                dispel: DispelInfo::defaults_for(spec.effect_type),
            };
            events.extend(apply_effect_to(world, effect, target, &mut applied_effects));
        }
    }

    debug!(%caster_id, spell_id, targets = targets.len(), "spell cast");
    Ok(CastOutcome {
        spell_id: spell.id,
        applied_effects,
        events,
    })
}

/// Apply one effect through the target's manager, following a single
/// reflect bounce back at the source. Returns the events to publish.
pub fn apply_effect_to(
    world: &mut World,
    effect: Effect,
    target: &EntityId,
    applied: &mut Vec<EffectId>,
) -> Vec<GameEvent> {
    let mut events = Vec::new();
    let source = effect.source.clone();
    let effect_type = effect.effect_type;
    let now = effect.started.at;

    let report = match world.effect_manager(target).apply(effect.clone(), now) {
        Ok(report) => report,
        Err(GameError::ImmunityBlocked { effect_type }) => {
            events.push(
                GameEvent::new(EventType::ImmunityBlocked)
                    .source(&source)
                    .target(target)
                    .with("effect_type", effect_type),
            );
            return events;
        }
        Err(_) => return events,
    };

    match &report.outcome {
        ApplyOutcome::Reflected { to } => {
            events.push(
                GameEvent::new(EventType::EffectApplied)
                    .source(&source)
                    .target(target)
                    .with("effect_type", effect_type)
                    .with("reflected_to", to.as_str()),
            );
            // One bounce only: a reflecting source eats the effect.
            let to = to.clone();
            let mut bounced = effect;
            bounced.target = to.clone();
            let bounce_report = world.effect_manager(&to).apply(bounced, now);
            if let Ok(r) = bounce_report {
                if !matches!(r.outcome, ApplyOutcome::Reflected { .. }) {
                    record_apply(world, &source, &to, effect_type, &r, applied, &mut events);
                }
            }
        }
        _ => {
            record_apply(world, &source, target, effect_type, &report, applied, &mut events);
        }
    }
    events
}

fn record_apply(
    world: &mut World,
    source: &EntityId,
    target: &EntityId,
    effect_type: rpg_types::effect::EffectType,
    report: &crate::effects::ApplyReport,
    applied: &mut Vec<EffectId>,
    events: &mut Vec<GameEvent>,
) {
    let effect_id = match &report.outcome {
        ApplyOutcome::Applied { effect_id }
        | ApplyOutcome::Stacked { effect_id, .. }
        | ApplyOutcome::Refreshed { effect_id } => effect_id.clone(),
        ApplyOutcome::Reflected { .. } => return,
    };
    applied.push(effect_id.clone());
    events.push(
        GameEvent::new(EventType::EffectApplied)
            .source(source)
            .target(target)
            .with("effect_id", effect_id.as_str())
            .with("effect_type", effect_type),
    );
    if report.hp_delta != 0 {
        let ty = if report.hp_delta < 0 {
            EventType::Damage
        } else {
            EventType::Heal
        };
        events.push(
            GameEvent::new(ty)
                .source(source)
                .target(target)
                .with("amount", report.hp_delta.abs()),
        );
        if let Some(death) = world.apply_hp_delta(target, report.hp_delta) {
            events.push(death);
        }
    }
}

fn resolve_targets(
    world: &World,
    caster_id: &EntityId,
    caster_pos: Position,
    spell: &Spell,
    target_id: Option<&EntityId>,
    position: Option<Position>,
) -> Result<Vec<EntityId>, GameError> {
    match spell.target {
        SpellTarget::Caster => Ok(vec![caster_id.clone()]),
        SpellTarget::Single { range } => {
            let target = target_id
                .ok_or_else(|| GameError::invalid_params("spell requires target_id"))?;
            let target_pos = world
                .get(target)
                .ok_or_else(|| GameError::UnknownEntity { id: target.clone() })?
                .position();
            if target_pos.level != caster_pos.level
                || caster_pos.distance(target_pos) > range as f64
            {
                return Err(GameError::OutOfBounds {
                    position: target_pos,
                });
            }
            Ok(vec![target.clone()])
        }
        SpellTarget::Area { range, radius } => {
            let center =
                position.ok_or_else(|| GameError::invalid_params("spell requires position"))?;
            if center.level != caster_pos.level || caster_pos.distance(center) > range as f64 {
                return Err(GameError::OutOfBounds { position: center });
            }
            Ok(world
                .spatial()
                .query_radius(center, radius as f64)
                .into_iter()
                .filter(|e| {
                    world
                        .get(&e.id)
                        .is_some_and(|o| !matches!(o, GameObject::ItemDrop(_)))
                })
                .map(|e| e.id)
                .collect())
        }
    }
}

//! Combat resolution — initiative rolls, action point discipline, attacks.
//!
//! Action points are consumed strictly before any other state mutation:
//! a failed AP spend aborts the action with the actor untouched.

use tracing::debug;

use rpg_types::character::{Attributes, EquipSlot};
use rpg_types::dice::DiceExpr;
use rpg_types::event::{EventType, GameEvent};
use rpg_types::ids::EntityId;
use rpg_types::object::GameObject;

use crate::error::GameError;
use crate::world::World;

/// AP cost of a move action in combat.
pub const MOVE_AP_COST: u32 = 1;
/// AP cost of a weapon attack.
pub const ATTACK_AP_COST: u32 = 2;

// =============================================================================
// Action points
// =============================================================================

fn ap_of(obj: &GameObject) -> Option<(u32, u32)> {
    match obj {
        GameObject::Player(c) => Some((c.action_points, c.max_action_points)),
        GameObject::Monster(m) => Some((m.action_points, m.max_action_points)),
        GameObject::ItemDrop(_) => None,
    }
}

/// Spend action points, or fail without touching anything.
pub fn spend_ap(obj: &mut GameObject, cost: u32) -> Result<(), GameError> {
    let (current, _) = ap_of(obj).ok_or_else(|| GameError::UnknownEntity {
        id: obj.id().clone(),
    })?;
    if current < cost {
        return Err(GameError::InsufficientResources {
            resource: "action points",
            needed: cost,
            available: current,
        });
    }
    match obj {
        GameObject::Player(c) => c.action_points -= cost,
        GameObject::Monster(m) => m.action_points -= cost,
        GameObject::ItemDrop(_) => unreachable!("checked by ap_of"),
    }
    Ok(())
}

/// Refill an actor's action points at the start of its turn.
pub fn refresh_ap(obj: &mut GameObject) {
    match obj {
        GameObject::Player(c) => c.action_points = c.max_action_points,
        GameObject::Monster(m) => m.action_points = m.max_action_points,
        GameObject::ItemDrop(_) => {}
    }
}

// =============================================================================
// Initiative
// =============================================================================

/// Roll initiative for the given combatants: d20 + dexterity modifier,
/// ordered descending, ties broken by roll total then id for stability.
pub fn roll_initiative(world: &mut World, ids: &[EntityId]) -> Vec<EntityId> {
    let mut rolled: Vec<(i32, EntityId)> = Vec::with_capacity(ids.len());
    for id in ids {
        let dex_mod = world
            .get(id)
            .and_then(GameObject::as_player)
            .map(|c| Attributes::modifier(c.attributes.dexterity))
            .unwrap_or(0);
        let roll = world.rng().roll_die(20) as i32 + dex_mod;
        debug!(%id, roll, "initiative roll");
        rolled.push((roll, id.clone()));
    }
    rolled.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    rolled.into_iter().map(|(_, id)| id).collect()
}

// =============================================================================
// Attack resolution
// =============================================================================

/// Result of a resolved attack.
#[derive(Debug, Clone)]
pub struct AttackOutcome {
    pub hit: bool,
    pub damage: i32,
    pub target_killed: bool,
    pub events: Vec<GameEvent>,
}

/// Armor class of any combatant: monsters carry theirs; players derive
/// 10 + dex modifier, +2 for body armor, +1 for an off-hand shield.
pub fn armor_class(obj: &GameObject) -> i32 {
    match obj {
        GameObject::Monster(m) => m.armor_class,
        GameObject::Player(c) => {
            let mut ac = 10 + Attributes::modifier(c.attributes.dexterity);
            if c.equipment.contains_key(&EquipSlot::Chest) {
                ac += 2;
            }
            if c.equipment.contains_key(&EquipSlot::WeaponOff) {
                ac += 1;
            }
            ac
        }
        GameObject::ItemDrop(_) => 10,
    }
}

/// The attacker's damage dice: the named weapon if given (must be
/// equipped), else the equipped main-hand weapon, else 1d2 unarmed.
/// Monsters always use their natural attack.
fn damage_dice(attacker: &GameObject, weapon_id: Option<&str>) -> Result<DiceExpr, GameError> {
    match attacker {
        GameObject::Monster(m) => m
            .damage
            .parse()
            .map_err(|_| GameError::invalid_params(format!("monster {} has bad damage dice", m.id))),
        GameObject::Player(c) => {
            let weapon = match weapon_id {
                Some(wid) => Some(
                    c.equipment
                        .values()
                        .find(|i| i.id.as_str() == wid)
                        .ok_or_else(|| {
                            GameError::invalid_params(format!("weapon {wid} is not equipped"))
                        })?,
                ),
                None => c.equipment.get(&EquipSlot::WeaponMain),
            };
            match weapon {
                Some(w) if !w.damage.is_empty() => w
                    .damage
                    .parse()
                    .map_err(|_| GameError::invalid_params(format!("item {} has bad damage dice", w.id))),
                _ => Ok("1d2".parse().expect("constant dice expression")),
            }
        }
        GameObject::ItemDrop(_) => Err(GameError::UnknownEntity {
            id: attacker.id().clone(),
        }),
    }
}

fn strength_mod(obj: &GameObject) -> i32 {
    obj.as_player()
        .map(|c| Attributes::modifier(c.attributes.strength))
        .unwrap_or(0)
}

/// Resolve a weapon attack. Consumes AP first; a failed spend leaves the
/// world untouched. To-hit is d20 + strength modifier + active stat
/// modifiers against the target's armor class.
pub fn attack(
    world: &mut World,
    attacker_id: &EntityId,
    target_id: &EntityId,
    weapon_id: Option<&str>,
) -> Result<AttackOutcome, GameError> {
    if !world.contains(target_id) {
        return Err(GameError::UnknownEntity {
            id: target_id.clone(),
        });
    }
    let attacker = world.get(attacker_id).ok_or_else(|| GameError::UnknownEntity {
        id: attacker_id.clone(),
    })?;
    // Resolve dice before spending AP so parameter errors cost nothing.
    let dice = damage_dice(attacker, weapon_id)?;
    let str_mod = strength_mod(attacker);
    let stat_mod = world
        .effect_manager_ref(attacker_id)
        .map(|m| m.stat_modifier())
        .unwrap_or(0);

    // AP first: the only mutation allowed to precede the roll.
    spend_ap(
        world.get_mut(attacker_id).expect("attacker exists"),
        ATTACK_AP_COST,
    )?;

    let target_ac = armor_class(world.get(target_id).expect("target exists"));
    let to_hit = world.rng().roll_die(20) as i32 + str_mod + stat_mod;

    let mut events = Vec::new();
    if to_hit < target_ac {
        events.push(
            GameEvent::new(EventType::Damage)
                .source(attacker_id)
                .target(target_id)
                .with("amount", 0)
                .with("missed", true),
        );
        return Ok(AttackOutcome {
            hit: false,
            damage: 0,
            target_killed: false,
            events,
        });
    }

    let damage = (dice.roll(world.rng()) + str_mod).max(1);
    events.push(
        GameEvent::new(EventType::Damage)
            .source(attacker_id)
            .target(target_id)
            .with("amount", damage),
    );
    let death = world.apply_hp_delta(target_id, -damage);
    let target_killed = death.is_some();
    if let Some(death_event) = death {
        events.push(death_event);
        // Kills pay out to player attackers.
        let xp = world
            .get(target_id)
            .and_then(GameObject::as_monster)
            .map(|m| m.xp_value)
            .unwrap_or(0);
        if xp > 0 {
            if let Some(c) = world.get_mut(attacker_id).and_then(GameObject::as_player_mut) {
                events.extend(crate::character_ops::grant_experience(c, xp));
            }
        }
    }

    Ok(AttackOutcome {
        hit: true,
        damage,
        target_killed,
        events,
    })
}

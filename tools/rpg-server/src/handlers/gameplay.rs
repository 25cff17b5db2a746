//! Core action handlers: movement, combat, spells, items, effects, state.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use rpg_types::effect::{DurationSpec, EffectType};
use rpg_types::ids::EntityId;
use rpg_types::object::GameObject;
use rpg_types::position::{Direction, Position};

use super::{HandlerResult, RequestCtx};
use crate::error::RpcError;

#[derive(Debug, Deserialize)]
struct MoveParams {
    direction: Direction,
}

pub fn do_move(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: MoveParams = ctx.params(params)?;
    let player_id = ctx.player_id()?;

    let mut game = ctx.state.game.write();
    let report = game
        .move_entity(&player_id, p.direction)
        .map_err(|e| ctx.game_error(e))?;
    Ok((
        json!({
            "success": true,
            "moved": report.moved,
            "position": report.position,
        }),
        report.events,
    ))
}

#[derive(Debug, Deserialize)]
struct AttackParams {
    target_id: String,
    #[serde(default)]
    weapon_id: Option<String>,
}

pub fn attack(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: AttackParams = ctx.params(params)?;
    let player_id = ctx.player_id()?;
    let target = EntityId::from(p.target_id);

    let mut game = ctx.state.game.write();
    let (hit, damage, events) = game
        .attack(&player_id, &target, p.weapon_id.as_deref())
        .map_err(|e| ctx.game_error(e))?;
    Ok((
        json!({
            "success": true,
            "hit": hit,
            "damage": damage,
        }),
        events,
    ))
}

#[derive(Debug, Deserialize)]
struct CastParams {
    spell_id: String,
    #[serde(default)]
    target_id: Option<String>,
    #[serde(default)]
    position: Option<Position>,
}

pub fn cast_spell(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: CastParams = ctx.params(params)?;
    let player_id = ctx.player_id()?;
    let target = p.target_id.map(EntityId::from);

    let mut game = ctx.state.game.write();
    let (effects, events) = game
        .cast_spell(&player_id, &p.spell_id, target.as_ref(), p.position, ctx.now)
        .map_err(|e| ctx.game_error(e))?;
    Ok((
        json!({
            "success": true,
            "effects": effects.iter().map(|e| e.as_str()).collect::<Vec<_>>(),
        }),
        events,
    ))
}

#[derive(Debug, Deserialize)]
struct UseItemParams {
    item_id: String,
    #[serde(default)]
    target_id: Option<String>,
}

pub fn use_item(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: UseItemParams = ctx.params(params)?;
    let player_id = ctx.player_id()?;
    let target = p.target_id.map(EntityId::from);

    let mut game = ctx.state.game.write();
    let events = game
        .use_item(&player_id, &p.item_id, target.as_ref())
        .map_err(|e| ctx.game_error(e))?;
    Ok((json!({ "success": true }), events))
}

#[derive(Debug, Deserialize)]
struct ApplyEffectParams {
    effect_type: EffectType,
    target_id: String,
    magnitude: f64,
    #[serde(default)]
    duration: DurationSpec,
}

pub fn apply_effect(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: ApplyEffectParams = ctx.params(params)?;
    let player_id = ctx.player_id()?;
    let target = EntityId::from(p.target_id);

    let mut game = ctx.state.game.write();
    let (applied, events) = game
        .apply_effect(&player_id, &target, p.effect_type, p.magnitude, p.duration, ctx.now)
        .map_err(|e| ctx.game_error(e))?;
    Ok((
        json!({
            "success": true,
            "effect_id": applied.first().map(|e| e.as_str()),
        }),
        events,
    ))
}

#[derive(Debug, Deserialize)]
struct StartCombatParams {
    participant_ids: Vec<String>,
}

pub fn start_combat(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: StartCombatParams = ctx.params(params)?;
    ctx.player_id()?;
    let participants: Vec<EntityId> = p.participant_ids.into_iter().map(EntityId::from).collect();

    let mut game = ctx.state.game.write();
    let (initiative, first, events) = game
        .start_combat(&participants)
        .map_err(|e| ctx.game_error(e))?;
    Ok((
        json!({
            "initiative": initiative.iter().map(|i| i.as_str()).collect::<Vec<_>>(),
            "first_turn": first.as_str(),
        }),
        events,
    ))
}

pub fn end_turn(ctx: &RequestCtx<'_>, _params: &Map<String, Value>) -> HandlerResult {
    let player_id = ctx.player_id()?;

    let mut game = ctx.state.game.write();
    let (next, events) = game
        .end_turn(&player_id, ctx.now)
        .map_err(|e| ctx.game_error(e))?;
    Ok((
        json!({
            "next_turn": next.as_ref().map(|n| n.as_str()),
        }),
        events,
    ))
}

pub fn get_game_state(ctx: &RequestCtx<'_>, _params: &Map<String, Value>) -> HandlerResult {
    let player_id = ctx.player_id()?;

    let game = ctx.state.game.read();
    let player = game
        .world
        .get(&player_id)
        .and_then(GameObject::as_player)
        .ok_or_else(|| RpcError::invalid_session(ctx.correlation_id))?;
    let effects = game
        .world
        .effect_manager_ref(&player_id)
        .map(|m| m.effects())
        .unwrap_or_default();

    Ok((
        json!({
            "player": player,
            "active_effects": effects,
            "world": {
                "width": game.world.width(),
                "height": game.world.height(),
                "object_count": game.world.object_count(),
                "ticks": game.time.ticks(),
            },
            "combat": {
                "in_combat": game.turns.is_in_combat(),
                "round": game.turns.current_round(),
                "current_turn": game.turns.current_actor().map(|a| a.as_str()),
                "initiative": game.turns.initiative().iter().map(|i| i.as_str()).collect::<Vec<_>>(),
            },
            "timestamp": ctx.now,
        }),
        Vec::new(),
    ))
}

//! Spell catalog handlers: getSpells, getSpell, learnSpell, forgetSpell,
//! getKnownSpells.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use rpg_data::spells::{all_spell_ids, get_spell as lookup_spell};
use rpg_engine::spells;
use rpg_types::object::GameObject;

use super::{HandlerResult, RequestCtx};
use crate::error::RpcError;

pub fn get_spells(ctx: &RequestCtx<'_>, _params: &Map<String, Value>) -> HandlerResult {
    ctx.player_id()?;
    let spells: Vec<_> = all_spell_ids()
        .iter()
        .filter_map(|id| lookup_spell(id))
        .collect();
    Ok((json!({ "spells": spells, "count": spells.len() }), Vec::new()))
}

#[derive(Debug, Deserialize)]
struct SpellParams {
    spell_id: String,
}

pub fn get_spell(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: SpellParams = ctx.params(params)?;
    ctx.player_id()?;
    let spell = lookup_spell(&p.spell_id).ok_or_else(|| {
        RpcError::invalid_params(format!("unknown spell {}", p.spell_id), ctx.correlation_id)
    })?;
    Ok((json!({ "spell": spell }), Vec::new()))
}

pub fn learn_spell(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: SpellParams = ctx.params(params)?;
    let player_id = ctx.player_id()?;

    let mut game = ctx.state.game.write();
    let character = game
        .world
        .get_mut(&player_id)
        .and_then(GameObject::as_player_mut)
        .ok_or_else(|| RpcError::invalid_session(ctx.correlation_id))?;
    let spell = spells::learn_spell(character, &p.spell_id).map_err(|e| ctx.game_error(e))?;
    Ok((json!({ "learned": spell.id.as_str() }), Vec::new()))
}

pub fn forget_spell(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: SpellParams = ctx.params(params)?;
    let player_id = ctx.player_id()?;

    let mut game = ctx.state.game.write();
    let character = game
        .world
        .get_mut(&player_id)
        .and_then(GameObject::as_player_mut)
        .ok_or_else(|| RpcError::invalid_session(ctx.correlation_id))?;
    let forgotten = spells::forget_spell(character, &p.spell_id).map_err(|e| ctx.game_error(e))?;
    Ok((json!({ "forgotten": forgotten.as_str() }), Vec::new()))
}

pub fn get_known_spells(ctx: &RequestCtx<'_>, _params: &Map<String, Value>) -> HandlerResult {
    let player_id = ctx.player_id()?;

    let game = ctx.state.game.read();
    let character = game
        .world
        .get(&player_id)
        .and_then(GameObject::as_player)
        .ok_or_else(|| RpcError::invalid_session(ctx.correlation_id))?;
    let known: Vec<_> = character
        .known_spells
        .iter()
        .filter_map(|id| lookup_spell(id.as_str()))
        .collect();
    Ok((json!({ "spells": known, "count": known.len() }), Vec::new()))
}

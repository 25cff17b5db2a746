//! Equipment handlers: equipItem, unequipItem, getEquipment.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use rpg_engine::character_ops;
use rpg_types::character::EquipSlot;
use rpg_types::object::GameObject;

use super::{HandlerResult, RequestCtx};
use crate::error::RpcError;

#[derive(Debug, Deserialize)]
struct EquipParams {
    item_id: String,
    slot: EquipSlot,
}

pub fn equip_item(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: EquipParams = ctx.params(params)?;
    let player_id = ctx.player_id()?;

    let mut game = ctx.state.game.write();
    let character = game
        .world
        .get_mut(&player_id)
        .and_then(GameObject::as_player_mut)
        .ok_or_else(|| RpcError::invalid_session(ctx.correlation_id))?;
    let (equipped, previous) = character_ops::equip_item(character, &p.item_id, p.slot)
        .map_err(|e| ctx.game_error(e))?;
    Ok((
        json!({
            "equipped_item": equipped,
            "previous_item": previous,
        }),
        Vec::new(),
    ))
}

#[derive(Debug, Deserialize)]
struct UnequipParams {
    slot: EquipSlot,
}

pub fn unequip_item(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: UnequipParams = ctx.params(params)?;
    let player_id = ctx.player_id()?;

    let mut game = ctx.state.game.write();
    let character = game
        .world
        .get_mut(&player_id)
        .and_then(GameObject::as_player_mut)
        .ok_or_else(|| RpcError::invalid_session(ctx.correlation_id))?;
    let item = character_ops::unequip_item(character, p.slot).map_err(|e| ctx.game_error(e))?;
    Ok((json!({ "unequipped_item": item }), Vec::new()))
}

pub fn get_equipment(ctx: &RequestCtx<'_>, _params: &Map<String, Value>) -> HandlerResult {
    let player_id = ctx.player_id()?;

    let game = ctx.state.game.read();
    let character = game
        .world
        .get(&player_id)
        .and_then(GameObject::as_player)
        .ok_or_else(|| RpcError::invalid_session(ctx.correlation_id))?;
    Ok((
        json!({
            "equipment": character.equipment,
            "total_weight": character.total_weight(),
        }),
        Vec::new(),
    ))
}

//! Quest handlers — the eight-method quest surface.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use rpg_data::quests::{all_quest_ids, get_quest as lookup_quest};
use rpg_engine::quests;
use rpg_types::object::GameObject;
use rpg_types::quest::QuestStatus;

use super::{HandlerResult, RequestCtx};
use crate::error::RpcError;

#[derive(Debug, Deserialize)]
struct QuestParams {
    quest_id: String,
}

pub fn get_quests(ctx: &RequestCtx<'_>, _params: &Map<String, Value>) -> HandlerResult {
    ctx.player_id()?;
    let quests: Vec<_> = all_quest_ids()
        .iter()
        .filter_map(|id| lookup_quest(id))
        .collect();
    Ok((json!({ "quests": quests, "count": quests.len() }), Vec::new()))
}

pub fn get_quest(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: QuestParams = ctx.params(params)?;
    let player_id = ctx.player_id()?;
    let quest = lookup_quest(&p.quest_id).ok_or_else(|| {
        RpcError::invalid_params(format!("unknown quest {}", p.quest_id), ctx.correlation_id)
    })?;

    let game = ctx.state.game.read();
    let progress = game
        .world
        .get(&player_id)
        .and_then(GameObject::as_player)
        .and_then(|c| {
            c.quests
                .iter()
                .find(|q| q.quest_id.as_str() == p.quest_id)
                .cloned()
        });
    Ok((json!({ "quest": quest, "progress": progress }), Vec::new()))
}

pub fn get_active_quests(ctx: &RequestCtx<'_>, _params: &Map<String, Value>) -> HandlerResult {
    let player_id = ctx.player_id()?;

    let game = ctx.state.game.read();
    let active: Vec<_> = game
        .world
        .get(&player_id)
        .and_then(GameObject::as_player)
        .map(|c| {
            c.quests
                .iter()
                .filter(|q| q.status == QuestStatus::Active)
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    Ok((json!({ "quests": active, "count": active.len() }), Vec::new()))
}

pub fn accept_quest(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: QuestParams = ctx.params(params)?;
    let player_id = ctx.player_id()?;

    let mut game = ctx.state.game.write();
    let character = game
        .world
        .get_mut(&player_id)
        .and_then(GameObject::as_player_mut)
        .ok_or_else(|| RpcError::invalid_session(ctx.correlation_id))?;
    let def = quests::accept_quest(character, &p.quest_id).map_err(|e| ctx.game_error(e))?;
    Ok((json!({ "accepted": def.id.as_str(), "quest": def }), Vec::new()))
}

pub fn abandon_quest(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: QuestParams = ctx.params(params)?;
    let player_id = ctx.player_id()?;

    let mut game = ctx.state.game.write();
    let character = game
        .world
        .get_mut(&player_id)
        .and_then(GameObject::as_player_mut)
        .ok_or_else(|| RpcError::invalid_session(ctx.correlation_id))?;
    quests::abandon_quest(character, &p.quest_id).map_err(|e| ctx.game_error(e))?;
    Ok((json!({ "success": true }), Vec::new()))
}

#[derive(Debug, Deserialize)]
struct ObjectiveParams {
    quest_id: String,
    objective: String,
    #[serde(default = "one")]
    count: u32,
}

fn one() -> u32 {
    1
}

pub fn update_objective(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: ObjectiveParams = ctx.params(params)?;
    let player_id = ctx.player_id()?;

    let mut game = ctx.state.game.write();
    let character = game
        .world
        .get_mut(&player_id)
        .and_then(GameObject::as_player_mut)
        .ok_or_else(|| RpcError::invalid_session(ctx.correlation_id))?;
    let (progress, all_met) =
        quests::update_objective(character, &p.quest_id, &p.objective, p.count)
            .map_err(|e| ctx.game_error(e))?;
    Ok((
        json!({
            "progress": progress,
            "objectives_met": all_met,
        }),
        Vec::new(),
    ))
}

pub fn complete_quest(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: QuestParams = ctx.params(params)?;
    let player_id = ctx.player_id()?;

    let mut game = ctx.state.game.write();
    let character = game
        .world
        .get_mut(&player_id)
        .and_then(GameObject::as_player_mut)
        .ok_or_else(|| RpcError::invalid_session(ctx.correlation_id))?;
    let (rewards, events) =
        quests::complete_quest(character, &p.quest_id).map_err(|e| ctx.game_error(e))?;
    Ok((json!({ "success": true, "rewards": rewards }), events))
}

pub fn get_quest_rewards(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: QuestParams = ctx.params(params)?;
    ctx.player_id()?;
    let quest = lookup_quest(&p.quest_id).ok_or_else(|| {
        RpcError::invalid_params(format!("unknown quest {}", p.quest_id), ctx.correlation_id)
    })?;
    Ok((json!({ "rewards": quest.rewards }), Vec::new()))
}

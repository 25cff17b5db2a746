//! Session lifecycle handlers: joinGame, leaveGame, createCharacter.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use rpg_engine::character_ops::{self, AttributeMethod, CreateSpec};
use rpg_types::character::{Attributes, CharacterClass};
use rpg_types::ids::EntityId;
use rpg_types::object::GameObject;
use rpg_types::position::Position;

use super::{HandlerResult, RequestCtx};
use crate::error::RpcError;

#[derive(Debug, Deserialize)]
struct JoinParams {
    player_name: String,
}

/// Find a free tile for a spawn, starting at the world center and
/// scanning outward ring by ring.
fn find_spawn(game: &rpg_engine::game::Game, id: &EntityId) -> Option<Position> {
    let center = Position::new(game.world.width() / 2, game.world.height() / 2, 0);
    for radius in 0..game.world.width().max(game.world.height()) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx.abs().max(dy.abs()) != radius {
                    continue;
                }
                let candidate = Position::new(center.x + dx, center.y + dy, 0);
                if game.world.validate_move(id, candidate).is_ok() {
                    return Some(candidate);
                }
            }
        }
    }
    None
}

/// joinGame — allocate a session and spawn a default character for it.
/// The character proper is shaped later by `createCharacter`.
pub fn join_game(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: JoinParams = ctx.params(params)?;
    if p.player_name.trim().is_empty() {
        return Err(RpcError::invalid_params(
            "player_name is empty",
            ctx.correlation_id,
        ));
    }

    let player_id = EntityId::from(format!("player-{}", Uuid::new_v4().as_hyphenated()));
    let mut game = ctx.state.game.write();

    let spawn = find_spawn(&game, &player_id)
        .ok_or_else(|| RpcError::internal("no free spawn tile", ctx.correlation_id))?;
    let character = character_ops::create_character(
        CreateSpec {
            id: player_id.clone(),
            name: p.player_name.trim().to_string(),
            class: CharacterClass::Fighter,
            method: AttributeMethod::Standard,
            custom_attributes: None,
            with_starting_equipment: true,
            bonus_gold: 0,
            position: spawn,
        },
        game.world.rng(),
    )
    .map_err(|e| ctx.game_error(e))?;
    let spawn_event = game
        .world
        .add_object(GameObject::Player(character))
        .map_err(|e| ctx.game_error(e))?;
    drop(game);

    let session = ctx
        .state
        .sessions
        .join(player_id.clone(), p.player_name.trim().to_string(), ctx.now);
    info!(player = %player_id, session = %session.id, "player joined");

    Ok((
        json!({
            "session_id": session.id.to_string(),
            "player_id": player_id.as_str(),
            "position": spawn_event.data.get("new"),
        }),
        vec![spawn_event],
    ))
}

/// leaveGame — drop the session and despawn its character.
pub fn leave_game(ctx: &RequestCtx<'_>, _params: &Map<String, Value>) -> HandlerResult {
    let session = ctx
        .session
        .ok_or_else(|| RpcError::invalid_session(ctx.correlation_id))?;
    let player_id = session.player_id.clone();

    // Persist a final character backup before the despawn.
    {
        let game = ctx.state.game.read();
        if let (Some(store), Some(obj)) = (&ctx.state.store, game.world.get(&player_id)) {
            if let Some(character) = obj.as_player() {
                if let Err(e) = store.save(&format!("characters/{player_id}"), character) {
                    tracing::warn!(error = %e, "character backup on leave failed");
                }
            }
        }
    }

    let mut game = ctx.state.game.write();
    if game.turns.in_initiative(&player_id) {
        game.turns.remove_participant(&player_id);
    }
    game.world.remove_object(&player_id);
    drop(game);

    ctx.state.broadcaster.unregister(&session.id);
    ctx.state.sessions.remove(&session.id);
    info!(player = %player_id, "player left");
    Ok((json!({ "success": true }), Vec::new()))
}

#[derive(Debug, Deserialize)]
struct CreateCharacterParams {
    name: String,
    class: CharacterClass,
    attribute_method: AttributeMethod,
    #[serde(default)]
    attributes: Option<Attributes>,
    #[serde(default = "default_true")]
    starting_equipment: bool,
    #[serde(default)]
    starting_gold: u32,
}

fn default_true() -> bool {
    true
}

/// createCharacter — reshape the session's character in place: same
/// entity id and tile, new class, attributes and gear.
pub fn create_character(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: CreateCharacterParams = ctx.params(params)?;
    let player_id = ctx.player_id()?;

    let mut game = ctx.state.game.write();
    if game.turns.in_initiative(&player_id) {
        return Err(ctx.game_error(rpg_engine::error::GameError::AlreadyInCombat));
    }
    let position = game
        .world
        .get(&player_id)
        .map(|o| o.position())
        .ok_or_else(|| RpcError::invalid_session(ctx.correlation_id))?;

    let character = character_ops::create_character(
        CreateSpec {
            id: player_id.clone(),
            name: p.name,
            class: p.class,
            method: p.attribute_method,
            custom_attributes: p.attributes,
            with_starting_equipment: p.starting_equipment,
            bonus_gold: p.starting_gold,
            position,
        },
        game.world.rng(),
    )
    .map_err(|e| ctx.game_error(e))?;

    let result = json!({ "character": &character });
    if let Some(obj) = game.world.get_mut(&player_id) {
        *obj = GameObject::Player(character);
    }
    Ok((result, Vec::new()))
}

//! RPC method handlers.
//!
//! Each handler decodes typed parameters, takes the state lock (write for
//! mutations, read for queries), and returns the wire result plus the
//! events the mutation caused. Handlers are synchronous; the dispatcher
//! owns transport, sessions and event publication.

mod equipment;
mod gameplay;
mod quests;
mod session;
mod spatial;
mod spells;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use rpg_engine::error::GameError;
use rpg_types::event::GameEvent;
use rpg_types::ids::EntityId;

use crate::error::RpcError;
use crate::session::SessionGuard;
use crate::state::AppState;

/// Everything a handler can see.
pub struct RequestCtx<'a> {
    pub state: &'a AppState,
    pub session: Option<&'a SessionGuard>,
    pub correlation_id: &'a str,
    pub now: DateTime<Utc>,
}

pub type HandlerResult = Result<(Value, Vec<GameEvent>), RpcError>;

impl RequestCtx<'_> {
    /// Decode the typed parameter struct for a method.
    pub fn params<P: DeserializeOwned>(&self, params: &Map<String, Value>) -> Result<P, RpcError> {
        serde_json::from_value(Value::Object(params.clone()))
            .map_err(|e| RpcError::invalid_params(e, self.correlation_id))
    }

    /// The player entity behind the authenticated session.
    pub fn player_id(&self) -> Result<EntityId, RpcError> {
        self.session
            .map(|s| s.player_id.clone())
            .ok_or_else(|| RpcError::invalid_session(self.correlation_id))
    }

    pub fn game_error(&self, err: GameError) -> RpcError {
        RpcError::from_game_error(&err, self.correlation_id)
    }
}

/// Method table. Unknown methods are the dispatcher's `-32601`.
pub fn route(ctx: &RequestCtx<'_>, method: &str, params: &Map<String, Value>) -> HandlerResult {
    match method {
        // Session
        "joinGame" => session::join_game(ctx, params),
        "leaveGame" => session::leave_game(ctx, params),
        "createCharacter" => session::create_character(ctx, params),

        // Core actions
        "move" => gameplay::do_move(ctx, params),
        "attack" => gameplay::attack(ctx, params),
        "castSpell" => gameplay::cast_spell(ctx, params),
        "useItem" => gameplay::use_item(ctx, params),
        "applyEffect" => gameplay::apply_effect(ctx, params),
        "startCombat" => gameplay::start_combat(ctx, params),
        "endTurn" => gameplay::end_turn(ctx, params),
        "getGameState" => gameplay::get_game_state(ctx, params),

        // Equipment
        "equipItem" => equipment::equip_item(ctx, params),
        "unequipItem" => equipment::unequip_item(ctx, params),
        "getEquipment" => equipment::get_equipment(ctx, params),

        // Quests
        "getQuests" => quests::get_quests(ctx, params),
        "getQuest" => quests::get_quest(ctx, params),
        "getActiveQuests" => quests::get_active_quests(ctx, params),
        "acceptQuest" => quests::accept_quest(ctx, params),
        "abandonQuest" => quests::abandon_quest(ctx, params),
        "updateObjective" => quests::update_objective(ctx, params),
        "completeQuest" => quests::complete_quest(ctx, params),
        "getQuestRewards" => quests::get_quest_rewards(ctx, params),

        // Spells
        "getSpells" => spells::get_spells(ctx, params),
        "getSpell" => spells::get_spell(ctx, params),
        "learnSpell" => spells::learn_spell(ctx, params),
        "forgetSpell" => spells::forget_spell(ctx, params),
        "getKnownSpells" => spells::get_known_spells(ctx, params),

        // Spatial queries
        "getObjectsInRange" => spatial::objects_in_range(ctx, params),
        "getObjectsInRadius" => spatial::objects_in_radius(ctx, params),
        "getNearestObjects" => spatial::nearest_objects(ctx, params),

        other => Err(RpcError::method_not_found(other)),
    }
}

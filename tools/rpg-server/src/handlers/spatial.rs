//! Spatial query handlers — read-only range/radius/nearest-K lookups.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use rpg_engine::spatial::SpatialEntry;
use rpg_types::object::GameObject;
use rpg_types::position::{Position, Rect};

use super::{HandlerResult, RequestCtx};

/// Wire shape of one query hit.
#[derive(Debug, Serialize)]
struct ObjectHit<'a> {
    id: &'a str,
    kind: &'a str,
    name: &'a str,
    position: Position,
}

fn hits(game: &rpg_engine::game::Game, entries: &[SpatialEntry]) -> Vec<Value> {
    entries
        .iter()
        .filter_map(|entry| {
            let obj = game.world.get(&entry.id)?;
            let kind = match obj {
                GameObject::Player(_) => "player",
                GameObject::Monster(_) => "monster",
                GameObject::ItemDrop(_) => "item_drop",
            };
            serde_json::to_value(ObjectHit {
                id: entry.id.as_str(),
                kind,
                name: obj.name(),
                position: entry.position,
            })
            .ok()
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct RangeParams {
    min_x: i32,
    min_y: i32,
    max_x: i32,
    max_y: i32,
    #[serde(default)]
    level: i32,
}

pub fn objects_in_range(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: RangeParams = ctx.params(params)?;
    ctx.player_id()?;

    let game = ctx.state.game.read();
    let rect = Rect::new(p.min_x, p.min_y, p.max_x, p.max_y);
    let entries = game.world.spatial().query_range(p.level, rect);
    let objects = hits(&game, &entries);
    Ok((
        json!({ "count": objects.len(), "objects": objects }),
        Vec::new(),
    ))
}

#[derive(Debug, Deserialize)]
struct RadiusParams {
    center_x: i32,
    center_y: i32,
    radius: f64,
    #[serde(default)]
    level: i32,
}

pub fn objects_in_radius(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: RadiusParams = ctx.params(params)?;
    ctx.player_id()?;

    let game = ctx.state.game.read();
    let center = Position::new(p.center_x, p.center_y, p.level);
    let entries = game.world.spatial().query_radius(center, p.radius);
    let objects = hits(&game, &entries);
    Ok((
        json!({ "count": objects.len(), "objects": objects }),
        Vec::new(),
    ))
}

#[derive(Debug, Deserialize)]
struct NearestParams {
    center_x: i32,
    center_y: i32,
    k: usize,
    #[serde(default)]
    level: i32,
}

pub fn nearest_objects(ctx: &RequestCtx<'_>, params: &Map<String, Value>) -> HandlerResult {
    let p: NearestParams = ctx.params(params)?;
    ctx.player_id()?;

    let game = ctx.state.game.read();
    let center = Position::new(p.center_x, p.center_y, p.level);
    let entries = game.world.spatial().query_nearest_k(center, p.k);
    let objects = hits(&game, &entries);
    Ok((
        json!({ "count": objects.len(), "objects": objects }),
        Vec::new(),
    ))
}

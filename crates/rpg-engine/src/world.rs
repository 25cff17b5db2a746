//! World state — the authoritative object registry.
//!
//! `add_object`, `remove_object` and `move_object` are the only mutators;
//! every one validates through the spatial index and returns the event the
//! caller should publish. `validate_move` is the single source of truth
//! for whether a tile can be entered.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use rpg_types::effect::EffectClock;
use rpg_types::event::{EventType, GameEvent};
use rpg_types::ids::{EffectId, EntityId};
use rpg_types::object::GameObject;
use rpg_types::position::{Position, Rect};
use rpg_types::rng::RngState;
use rpg_types::tile::MapTile;

use crate::effects::EffectManager;
use crate::error::GameError;
use crate::spatial::SpatialIndex;

impl Default for SpatialIndex {
    /// Placeholder for serde skip; `World::rebuild_spatial` replaces it
    /// with a correctly sized index after load.
    fn default() -> Self {
        SpatialIndex::new(0, 0)
    }
}

/// The game world: dimensions, tile maps, objects, per-object effect
/// managers, and the deterministic RNG.
#[derive(Debug, Serialize, Deserialize)]
pub struct World {
    width: i32,
    height: i32,
    /// Level → row-major tile vector (`y * width + x`). Levels without an
    /// entry are all floor.
    #[serde(default)]
    tiles: BTreeMap<i32, Vec<MapTile>>,
    objects: BTreeMap<EntityId, GameObject>,
    /// Per-object effect state, keyed by holder id.
    #[serde(default)]
    effects: BTreeMap<EntityId, EffectManager>,
    rng: RngState,
    next_effect_seq: u64,
    /// Derived from `objects`; rebuilt after deserialization.
    #[serde(skip)]
    spatial: SpatialIndex,
}

impl World {
    pub fn new(width: i32, height: i32, seed: u64) -> Self {
        Self {
            width,
            height,
            tiles: BTreeMap::new(),
            objects: BTreeMap::new(),
            effects: BTreeMap::new(),
            rng: RngState::new(seed),
            next_effect_seq: 0,
            spatial: SpatialIndex::new(width, height),
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::world(self.width, self.height)
    }

    /// Recreate the spatial index from the object registry. Must be called
    /// after deserialization; idempotent otherwise.
    pub fn rebuild_spatial(&mut self) {
        self.spatial = SpatialIndex::new(self.width, self.height);
        for (id, obj) in &self.objects {
            // Positions were validated when the objects entered the world.
            let _ = self.spatial.insert(id.clone(), obj.position());
        }
    }

    // -------------------------------------------------------------------------
    // Tiles
    // -------------------------------------------------------------------------

    /// Install a tile map for a level. Length must be `width × height`.
    pub fn set_level_tiles(&mut self, level: i32, tiles: Vec<MapTile>) -> Result<(), GameError> {
        if tiles.len() != (self.width * self.height) as usize {
            return Err(GameError::invalid_params(format!(
                "tile map for level {level} has {} cells, expected {}",
                tiles.len(),
                self.width * self.height
            )));
        }
        self.tiles.insert(level, tiles);
        Ok(())
    }

    /// Tile at a position. Out-of-bounds is the caller's problem; levels
    /// without an installed map read as floor.
    pub fn tile_at(&self, pos: Position) -> MapTile {
        self.tiles
            .get(&pos.level)
            .and_then(|tiles| tiles.get((pos.y * self.width + pos.x) as usize))
            .copied()
            .unwrap_or_default()
    }

    // -------------------------------------------------------------------------
    // Object registry (the only mutators)
    // -------------------------------------------------------------------------

    /// Register an object. Fails on duplicate id or invalid position.
    pub fn add_object(&mut self, obj: GameObject) -> Result<GameEvent, GameError> {
        let id = obj.id().clone();
        if self.objects.contains_key(&id) {
            return Err(GameError::invalid_params(format!(
                "entity {id} already exists"
            )));
        }
        self.spatial.insert(id.clone(), obj.position())?;
        let event = GameEvent::new(EventType::Movement)
            .source(&id)
            .with("new", obj.position())
            .with("spawned", true);
        self.objects.insert(id, obj);
        Ok(event)
    }

    /// Unregister an object, dropping its effects and index entry.
    /// Idempotent.
    pub fn remove_object(&mut self, id: &EntityId) -> Option<GameObject> {
        self.spatial.remove(id);
        self.effects.remove(id);
        self.objects.remove(id)
    }

    /// Move an object to a new position after full validation. Emits the
    /// `Movement` event on success.
    pub fn move_object(&mut self, id: &EntityId, new_pos: Position) -> Result<GameEvent, GameError> {
        let old_pos = self
            .objects
            .get(id)
            .ok_or_else(|| GameError::UnknownEntity { id: id.clone() })?
            .position();
        self.validate_move(id, new_pos)?;
        self.spatial.update(id, new_pos)?;
        self.objects
            .get_mut(id)
            .expect("existence checked above")
            .set_position(new_pos);
        Ok(GameEvent::new(EventType::Movement)
            .source(id)
            .with("old", old_pos)
            .with("new", new_pos))
    }

    /// Whether `id` may enter `new_pos`: in bounds, walkable tile, and no
    /// other blocking object on it.
    pub fn validate_move(&self, id: &EntityId, new_pos: Position) -> Result<(), GameError> {
        if !self.bounds().contains(new_pos.x, new_pos.y) {
            return Err(GameError::OutOfBounds { position: new_pos });
        }
        if !self.tile_at(new_pos).is_walkable() {
            return Err(GameError::OutOfBounds { position: new_pos });
        }
        let occupied = self
            .spatial
            .query_range(
                new_pos.level,
                Rect::new(new_pos.x, new_pos.y, new_pos.x, new_pos.y),
            )
            .into_iter()
            .any(|e| {
                e.id != *id
                    && self
                        .objects
                        .get(&e.id)
                        .is_some_and(|o| o.is_blocking())
            });
        if occupied {
            return Err(GameError::OutOfBounds { position: new_pos });
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    pub fn get(&self, id: &EntityId) -> Option<&GameObject> {
        self.objects.get(id)
    }

    pub fn get_mut(&mut self, id: &EntityId) -> Option<&mut GameObject> {
        self.objects.get_mut(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.objects.contains_key(id)
    }

    pub fn objects(&self) -> impl Iterator<Item = (&EntityId, &GameObject)> {
        self.objects.iter()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn spatial(&self) -> &SpatialIndex {
        &self.spatial
    }

    // -------------------------------------------------------------------------
    // Effects & RNG
    // -------------------------------------------------------------------------

    /// The effect manager for an entity, created on first use.
    pub fn effect_manager(&mut self, id: &EntityId) -> &mut EffectManager {
        self.effects.entry(id.clone()).or_default()
    }

    pub fn effect_manager_ref(&self, id: &EntityId) -> Option<&EffectManager> {
        self.effects.get(id)
    }

    /// Tick every entity's effects and apply HP deltas. Returns events to
    /// publish (damage/heal pulses, expirations).
    pub fn tick_all_effects(&mut self, clock: &EffectClock) -> Vec<GameEvent> {
        let mut events = Vec::new();
        let holders: Vec<EntityId> = self.effects.keys().cloned().collect();
        for holder in holders {
            events.extend(self.tick_effects_for(&holder, clock));
        }
        events
    }

    /// Tick one entity's effects (end-of-turn processing).
    pub fn tick_effects_for(&mut self, holder: &EntityId, clock: &EffectClock) -> Vec<GameEvent> {
        let Some(mgr) = self.effects.get_mut(holder) else {
            return Vec::new();
        };
        let report = mgr.tick(clock);
        let mut events = Vec::new();

        let hp_delta = report.hp_delta();
        if hp_delta != 0 {
            let ty = if hp_delta < 0 {
                EventType::Damage
            } else {
                EventType::Heal
            };
            events.push(
                GameEvent::new(ty)
                    .target(holder)
                    .with("amount", hp_delta.abs())
                    .with("periodic", true),
            );
            if let Some(death) = self.apply_hp_delta(holder, hp_delta) {
                events.push(death);
            }
        }
        for expired in report.expired {
            events.push(
                GameEvent::new(EventType::EffectExpired)
                    .source(&expired.source)
                    .target(holder)
                    .with("effect_id", expired.id.as_str())
                    .with("effect_type", expired.effect_type),
            );
        }
        events
    }

    /// Apply an HP change to any combatant, clamped. Returns the Death
    /// event when this killed it.
    pub fn apply_hp_delta(&mut self, id: &EntityId, delta: i32) -> Option<GameEvent> {
        let obj = self.objects.get_mut(id)?;
        let (was_alive, now_alive) = match obj {
            GameObject::Player(c) => {
                let was = c.is_alive();
                c.set_hp(c.hp + delta);
                (was, c.is_alive())
            }
            GameObject::Monster(m) => {
                let was = m.is_alive();
                m.set_hp(m.hp + delta);
                (was, m.is_alive())
            }
            GameObject::ItemDrop(_) => return None,
        };
        if was_alive && !now_alive {
            Some(GameEvent::new(EventType::Death).target(id))
        } else {
            None
        }
    }

    /// Allocate a fresh effect id.
    pub fn next_effect_id(&mut self) -> EffectId {
        self.next_effect_seq += 1;
        EffectId::from(format!("fx-{:08}", self.next_effect_seq))
    }

    pub fn rng(&mut self) -> &mut RngState {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpg_types::character::{Attributes, Character, CharacterClass};
    use rpg_types::tile::TileKind;

    fn player(id: &str, pos: Position) -> GameObject {
        GameObject::Player(Character {
            id: EntityId::from(id),
            name: id.to_string(),
            class: CharacterClass::Fighter,
            attributes: Attributes {
                strength: 14,
                dexterity: 12,
                constitution: 13,
                intelligence: 10,
                wisdom: 10,
                charisma: 9,
            },
            hp: 10,
            max_hp: 10,
            action_points: 4,
            max_action_points: 4,
            mana: 0,
            max_mana: 0,
            experience: 0,
            level: 1,
            gold: 0,
            position: pos,
            equipment: Default::default(),
            inventory: Vec::new(),
            known_spells: Vec::new(),
            quests: Vec::new(),
            flags: Default::default(),
        })
    }

    fn world() -> World {
        World::new(10, 10, 42)
    }

    #[test]
    fn add_object_indexes_position() {
        let mut w = world();
        w.add_object(player("p1", Position::new(5, 5, 0))).unwrap();
        assert!(w.contains(&EntityId::from("p1")));
        assert_eq!(
            w.spatial().position_of(&EntityId::from("p1")),
            Some(Position::new(5, 5, 0))
        );
    }

    #[test]
    fn add_duplicate_id_fails() {
        let mut w = world();
        w.add_object(player("p1", Position::new(5, 5, 0))).unwrap();
        assert!(w.add_object(player("p1", Position::new(6, 5, 0))).is_err());
    }

    #[test]
    fn add_out_of_bounds_fails() {
        let mut w = world();
        let err = w
            .add_object(player("p1", Position::new(10, 5, 0)))
            .unwrap_err();
        assert_eq!(err.kind(), "OutOfBounds");
        assert!(!w.contains(&EntityId::from("p1")));
    }

    #[test]
    fn move_object_emits_old_and_new() {
        let mut w = world();
        w.add_object(player("p1", Position::new(5, 5, 0))).unwrap();
        let event = w
            .move_object(&EntityId::from("p1"), Position::new(5, 4, 0))
            .unwrap();
        assert_eq!(event.event_type, EventType::Movement);
        assert_eq!(event.data["old"]["y"], 5);
        assert_eq!(event.data["new"]["y"], 4);
        assert_eq!(
            w.get(&EntityId::from("p1")).unwrap().position(),
            Position::new(5, 4, 0)
        );
    }

    #[test]
    fn move_into_blocking_object_fails() {
        let mut w = world();
        w.add_object(player("p1", Position::new(5, 5, 0))).unwrap();
        w.add_object(player("p2", Position::new(5, 4, 0))).unwrap();
        assert!(w
            .move_object(&EntityId::from("p1"), Position::new(5, 4, 0))
            .is_err());
    }

    #[test]
    fn move_onto_wall_fails() {
        let mut w = world();
        let mut tiles = vec![MapTile::new(TileKind::Floor); 100];
        tiles[(4 * 10 + 5) as usize] = MapTile::new(TileKind::Wall);
        w.set_level_tiles(0, tiles).unwrap();
        w.add_object(player("p1", Position::new(5, 5, 0))).unwrap();
        let err = w
            .move_object(&EntityId::from("p1"), Position::new(5, 4, 0))
            .unwrap_err();
        assert_eq!(err.kind(), "OutOfBounds");
    }

    #[test]
    fn remove_object_clears_index_and_effects() {
        let mut w = world();
        w.add_object(player("p1", Position::new(5, 5, 0))).unwrap();
        let id = EntityId::from("p1");
        w.effect_manager(&id); // create a manager
        w.remove_object(&id);
        assert!(w.get(&id).is_none());
        assert!(w.spatial().position_of(&id).is_none());
        assert!(w.effect_manager_ref(&id).is_none());
        // Idempotent.
        assert!(w.remove_object(&id).is_none());
    }

    #[test]
    fn hp_delta_clamps_and_reports_death() {
        let mut w = world();
        w.add_object(player("p1", Position::new(5, 5, 0))).unwrap();
        let id = EntityId::from("p1");

        assert!(w.apply_hp_delta(&id, -3).is_none());
        let death = w.apply_hp_delta(&id, -100).unwrap();
        assert_eq!(death.event_type, EventType::Death);
        let hp = w.get(&id).unwrap().as_player().unwrap().hp;
        assert_eq!(hp, 0);

        // Already dead: no second death event.
        assert!(w.apply_hp_delta(&id, -5).is_none());
    }

    #[test]
    fn rebuild_spatial_after_serde_roundtrip() {
        let mut w = world();
        w.add_object(player("p1", Position::new(5, 5, 0))).unwrap();
        w.add_object(player("p2", Position::new(2, 3, 1))).unwrap();

        let yaml = serde_yaml::to_string(&w).unwrap();
        let mut restored: World = serde_yaml::from_str(&yaml).unwrap();
        restored.rebuild_spatial();

        assert_eq!(restored.object_count(), 2);
        assert_eq!(
            restored.spatial().position_of(&EntityId::from("p2")),
            Some(Position::new(2, 3, 1))
        );
    }

    #[test]
    fn effect_ids_are_unique() {
        let mut w = world();
        let a = w.next_effect_id();
        let b = w.next_effect_id();
        assert_ne!(a, b);
    }
}

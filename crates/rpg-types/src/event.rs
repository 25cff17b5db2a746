//! Typed game events published on the server's event bus.
//!
//! Events are the unit of push traffic: each one is wrapped in a
//! `game_event` frame and fanned out to subscribed WebSocket clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::EntityId;

/// Event discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Movement,
    CombatStart,
    CombatEnd,
    TurnStart,
    TurnEnd,
    SpellCast,
    EffectApplied,
    EffectExpired,
    EffectDispelled,
    ImmunityBlocked,
    Damage,
    Heal,
    Death,
    LevelUp,
    ItemUsed,
    QuestUpdated,
}

/// A single event record. `data` carries event-specific payload fields
/// (old/new positions, damage amounts, effect ids, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub source: Option<EntityId>,
    #[serde(default)]
    pub target: Option<EntityId>,
    #[serde(default)]
    pub data: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl GameEvent {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            source: None,
            target: None,
            data: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn source(mut self, id: &EntityId) -> Self {
        self.source = Some(id.clone());
        self
    }

    pub fn target(mut self, id: &EntityId) -> Self {
        self.target = Some(id.clone());
        self
    }

    /// Attach a payload field. `value` must serialize; values that do not
    /// are programming errors and recorded as `null`.
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        let v = serde_json::to_value(value).unwrap_or(Value::Null);
        self.data.insert(key.to_string(), v);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;

    #[test]
    fn movement_event_payload() {
        let who = EntityId::from("p1");
        let event = GameEvent::new(EventType::Movement)
            .source(&who)
            .with("old", Position::new(5, 5, 0))
            .with("new", Position::new(5, 4, 0));

        assert_eq!(event.event_type, EventType::Movement);
        assert_eq!(event.source.as_ref().unwrap().as_str(), "p1");
        assert_eq!(event.data["old"]["y"], 5);
        assert_eq!(event.data["new"]["y"], 4);
    }

    #[test]
    fn event_type_wire_form() {
        let json = serde_json::to_string(&EventType::EffectApplied).unwrap();
        assert_eq!(json, "\"effect_applied\"");
    }

    #[test]
    fn event_serializes_with_type_key() {
        let event = GameEvent::new(EventType::CombatStart);
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "combat_start");
        assert!(v["timestamp"].is_string());
    }
}

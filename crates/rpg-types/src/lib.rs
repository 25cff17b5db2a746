//! Core types for the RPG server — data definitions, no game logic.
//!
//! This crate defines every type shared across the engine and the server:
//! IDs, positions, characters, items, effects, events, tiles, spells and
//! quests. It has no game logic — just data definitions and the small
//! value-type helpers that belong with them.

pub mod character;
pub mod dice;
pub mod effect;
pub mod event;
pub mod ids;
pub mod object;
pub mod position;
pub mod quest;
pub mod rng;
pub mod spell;
pub mod tile;

// Re-export commonly used types at crate root
pub use character::{Attributes, Character, CharacterClass, EquipSlot, Item, ItemType};
pub use effect::{DispelType, Effect, EffectType, ImmunityData, ImmunityLevel};
pub use event::{EventType, GameEvent};
pub use ids::*;
pub use object::GameObject;
pub use position::{Direction, Position, Rect};
pub use rng::RngState;

//! Game logic for the RPG server — spatial index, effects, turns, time,
//! world state, combat, characters, spells and quests.
//!
//! All mutable game logic lives here. No network or persistence code.

pub mod character_ops;
pub mod clock;
pub mod game;
pub mod combat;
pub mod effects;
pub mod error;
pub mod quests;
pub mod spatial;
pub mod spells;
pub mod turn;
pub mod world;

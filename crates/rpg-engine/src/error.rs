//! Engine error taxonomy.
//!
//! Every variant carries a stable machine-readable `kind()` string; the
//! server maps kinds onto JSON-RPC error payloads without inspecting
//! variant internals.

use rpg_types::effect::EffectType;
use rpg_types::ids::{EffectId, EntityId};
use rpg_types::position::Position;

/// Any rule violation or lookup failure inside the game engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("position {position} is outside the world or not enterable")]
    OutOfBounds { position: Position },

    #[error("unknown entity {id}")]
    UnknownEntity { id: EntityId },

    #[error("it is not {id}'s turn")]
    NotYourTurn { id: EntityId },

    #[error("no combat is in progress")]
    NotInCombat,

    #[error("combat is already in progress")]
    AlreadyInCombat,

    #[error("invalid initiative: {reason}")]
    InvalidInitiative { reason: String },

    #[error("insufficient {resource}: need {needed}, have {available}")]
    InsufficientResources {
        resource: &'static str,
        needed: u32,
        available: u32,
    },

    #[error("target is immune to {effect_type:?}")]
    ImmunityBlocked { effect_type: EffectType },

    #[error("effect {id} cannot be dispelled")]
    EffectNotRemovable { id: EffectId },

    #[error("{message}")]
    InvalidParams { message: String },
}

impl GameError {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Stable error kind for the wire protocol.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OutOfBounds { .. } => "OutOfBounds",
            Self::UnknownEntity { .. } | Self::InvalidParams { .. } => "InvalidParams",
            Self::NotYourTurn { .. } => "NotYourTurn",
            Self::NotInCombat => "NotInCombat",
            Self::AlreadyInCombat => "AlreadyInCombat",
            Self::InvalidInitiative { .. } => "InvalidInitiative",
            Self::InsufficientResources { .. } => "InsufficientResources",
            Self::ImmunityBlocked { .. } => "ImmunityBlocked",
            Self::EffectNotRemovable { .. } => "EffectNotRemovable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(
            GameError::OutOfBounds {
                position: Position::new(-1, 0, 0)
            }
            .kind(),
            "OutOfBounds"
        );
        assert_eq!(GameError::NotInCombat.kind(), "NotInCombat");
        assert_eq!(
            GameError::invalid_params("bad direction").kind(),
            "InvalidParams"
        );
    }
}

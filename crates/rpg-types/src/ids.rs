//! Branded/newtype ID types for type safety.
//!
//! Each ID wraps a `Box<str>` for cheap cloning and small struct size.
//! `SessionId` is the exception: it wraps a `uuid::Uuid` because session
//! tokens are format-validated before any lookup.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Box<str>);

        impl $name {
            pub fn new(s: impl Into<Box<str>>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.into())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s.into_boxed_str())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Game object identifier (players, monsters, item drops).
    EntityId
);

define_id!(
    /// Item identifier.
    ItemId
);

define_id!(
    /// Active effect instance identifier (unique per application).
    EffectId
);

define_id!(
    /// Spell definition identifier (e.g., "magic_missile").
    SpellId
);

define_id!(
    /// Quest definition identifier.
    QuestId
);

/// Opaque session token. Always a UUID v4 in canonical hyphenated form;
/// anything else is rejected at the parse boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh random session id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse and validate a session token. Returns `None` for anything
    /// that is not a canonical UUID v4 string.
    pub fn parse(s: &str) -> Option<Self> {
        let uuid = Uuid::try_parse(s).ok()?;
        if uuid.get_version_num() != 4 {
            return None;
        }
        Some(Self(uuid))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.as_hyphenated().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_roundtrip() {
        let id = EntityId::from("player_1");
        assert_eq!(id.as_str(), "player_1");
        assert_eq!(id.to_string(), "player_1");
    }

    #[test]
    fn ids_are_distinct_types() {
        // Compile-time check: EntityId and ItemId cannot be mixed up.
        fn takes_entity(_: &EntityId) {}
        takes_entity(&EntityId::from("x"));
    }

    #[test]
    fn session_id_generate_parses_back() {
        let id = SessionId::generate();
        let parsed = SessionId::parse(&id.to_string()).expect("generated id must parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn session_id_rejects_garbage() {
        assert!(SessionId::parse("").is_none());
        assert!(SessionId::parse("not-a-uuid").is_none());
        assert!(SessionId::parse("12345").is_none());
    }

    #[test]
    fn session_id_rejects_non_v4() {
        // Nil UUID is version 0, not 4.
        assert!(SessionId::parse("00000000-0000-0000-0000-000000000000").is_none());
        // Version 1 (time-based) layout.
        assert!(SessionId::parse("c232ab00-9414-11ec-b3c8-9f6bdeced846").is_none());
    }

    #[test]
    fn session_id_serde_transparent() {
        let id = SessionId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}

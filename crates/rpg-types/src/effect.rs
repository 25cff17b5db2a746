//! Effect data — the closed effect-type set, durations, dispel metadata
//! and immunities.
//!
//! Effect behavior is a closed tagged variant plus a policy table on
//! `EffectType` (`allows_stacking`, `default_dispel_priority`, ...), not a
//! trait object. Adding a type means extending the table; the data stays
//! purely value-typed and serializable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EffectId, EntityId};

// =============================================================================
// Effect types & policy table
// =============================================================================

/// Every effect type the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectType {
    DamageOverTime,
    HealOverTime,
    StatBoost,
    StatPenalty,
    Stun,
    Root,
    Burning,
    Bleeding,
    Poison,
    Blessed,
    Cursed,
}

impl EffectType {
    pub const ALL: [Self; 11] = [
        Self::DamageOverTime,
        Self::HealOverTime,
        Self::StatBoost,
        Self::StatPenalty,
        Self::Stun,
        Self::Root,
        Self::Burning,
        Self::Bleeding,
        Self::Poison,
        Self::Blessed,
        Self::Cursed,
    ];

    /// Whether repeat applications from the same source add stacks.
    /// Movement-impairing and binary-status effects refresh instead.
    pub const fn allows_stacking(self) -> bool {
        match self {
            Self::DamageOverTime
            | Self::HealOverTime
            | Self::StatBoost
            | Self::StatPenalty
            | Self::Burning
            | Self::Bleeding
            | Self::Poison => true,
            Self::Stun | Self::Root | Self::Blessed | Self::Cursed => false,
        }
    }

    /// Default dispel priority (0..=100). Higher priorities are removed first.
    pub const fn default_dispel_priority(self) -> u8 {
        match self {
            Self::Stun => 80,
            Self::Root => 70,
            Self::Cursed => 60,
            Self::Poison => 50,
            Self::Burning => 45,
            Self::Bleeding => 40,
            Self::DamageOverTime => 35,
            Self::StatPenalty => 30,
            Self::StatBoost => 20,
            Self::HealOverTime => 15,
            Self::Blessed => 10,
        }
    }

    /// Default dispel category this effect answers to.
    pub const fn default_dispel_type(self) -> DispelType {
        match self {
            Self::DamageOverTime | Self::HealOverTime | Self::StatBoost | Self::Burning => {
                DispelType::Magic
            }
            Self::StatPenalty | Self::Cursed => DispelType::Curse,
            Self::Poison => DispelType::Poison,
            Self::Bleeding => DispelType::Physical,
            Self::Stun | Self::Root => DispelType::Movement,
            Self::Blessed => DispelType::Magic,
        }
    }

    /// Whether the effect helps its target (affects dispel defaults and
    /// what counts as "harmful" for immunity purposes).
    pub const fn is_beneficial(self) -> bool {
        matches!(self, Self::HealOverTime | Self::StatBoost | Self::Blessed)
    }

    /// Whether the effect damages the target each tick.
    pub const fn deals_periodic_damage(self) -> bool {
        matches!(
            self,
            Self::DamageOverTime | Self::Burning | Self::Bleeding | Self::Poison
        )
    }
}

/// Dispel categories. An effect lists the categories that can remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispelType {
    Magic,
    Physical,
    Poison,
    Curse,
    Movement,
}

/// Dispel metadata attached to every active effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispelInfo {
    /// 0..=100; higher is removed first.
    pub priority: u8,
    pub types: Vec<DispelType>,
    pub removable: bool,
}

impl DispelInfo {
    /// Defaults for an effect type: its table priority, its table category,
    /// removable.
    pub fn defaults_for(effect_type: EffectType) -> Self {
        Self {
            priority: effect_type.default_dispel_priority(),
            types: vec![effect_type.default_dispel_type()],
            removable: true,
        }
    }

    pub fn matches(&self, dispel_type: DispelType) -> bool {
        self.removable && self.types.contains(&dispel_type)
    }
}

// =============================================================================
// Durations across three time domains
// =============================================================================

/// How long an effect lasts. Exactly one domain governs expiry, chosen by
/// precedence `turns → rounds → real time` (first non-zero wins).
///
/// - any field negative: the effect is permanent
/// - all fields zero: the effect is instant (applies once, expires on the
///   next tick check)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationSpec {
    /// Wall-clock lifetime in milliseconds.
    #[serde(default)]
    pub real_ms: i64,
    #[serde(default)]
    pub rounds: i64,
    #[serde(default)]
    pub turns: i64,
}

impl DurationSpec {
    pub const INSTANT: Self = Self {
        real_ms: 0,
        rounds: 0,
        turns: 0,
    };

    pub const PERMANENT: Self = Self {
        real_ms: -1,
        rounds: -1,
        turns: -1,
    };

    pub const fn rounds(n: i64) -> Self {
        Self {
            real_ms: 0,
            rounds: n,
            turns: 0,
        }
    }

    pub const fn turns(n: i64) -> Self {
        Self {
            real_ms: 0,
            rounds: 0,
            turns: n,
        }
    }

    pub const fn real_ms(ms: i64) -> Self {
        Self {
            real_ms: ms,
            rounds: 0,
            turns: 0,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.real_ms < 0 || self.rounds < 0 || self.turns < 0
    }

    pub fn is_instant(&self) -> bool {
        self.real_ms == 0 && self.rounds == 0 && self.turns == 0
    }
}

/// Snapshot of the three clocks at effect application time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectStart {
    pub at: DateTime<Utc>,
    pub round: u64,
    pub turn: u64,
}

/// Current reading of the three clocks, for expiry checks.
#[derive(Debug, Clone, Copy)]
pub struct EffectClock {
    pub now: DateTime<Utc>,
    pub round: u64,
    pub turn: u64,
}

// =============================================================================
// Immunities
// =============================================================================

/// How strongly a target resists an effect type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImmunityLevel {
    /// No protection.
    None,
    /// Incoming magnitude scaled by `1 − magnitude`.
    Partial,
    /// Application rejected outright.
    Complete,
    /// Application bounced back at its source.
    Reflect,
}

/// One immunity grant against a single effect type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmunityData {
    pub level: ImmunityLevel,
    /// Reduction fraction for `Partial`; ignored otherwise.
    pub magnitude: f64,
    /// Where the immunity came from ("racial", an item id, a spell id).
    pub source: String,
    pub permanent: bool,
    /// Expiry for temporary grants. `None` means no wall-clock bound.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Effect
// =============================================================================

/// An active (or about-to-be-applied) effect instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub id: EffectId,
    pub effect_type: EffectType,
    pub source: EntityId,
    pub target: EntityId,
    pub magnitude: f64,
    pub duration: DurationSpec,
    pub started: EffectStart,
    pub stacks: u32,
    pub dispel: DispelInfo,
}

impl Effect {
    /// Whether the effect has run out under the governing time domain.
    ///
    /// Permanent effects never expire; instant effects are expired as soon
    /// as any clock is checked after application.
    pub fn is_expired(&self, clock: &EffectClock) -> bool {
        if self.duration.is_permanent() {
            return false;
        }
        if self.duration.is_instant() {
            return true;
        }
        // Precedence: turns → rounds → real time; first non-zero wins.
        if self.duration.turns > 0 {
            return clock.turn >= self.started.turn + self.duration.turns as u64;
        }
        if self.duration.rounds > 0 {
            return clock.round >= self.started.round + self.duration.rounds as u64;
        }
        let elapsed_ms = (clock.now - self.started.at).num_milliseconds();
        elapsed_ms >= self.duration.real_ms
    }

    /// Reset the start clocks (stacking-refused re-application refreshes).
    pub fn refresh(&mut self, start: EffectStart) {
        self.started = start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> EffectStart {
        EffectStart {
            at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            round: 3,
            turn: 10,
        }
    }

    fn clock_at(secs: i64, round: u64, turn: u64) -> EffectClock {
        EffectClock {
            now: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
                + chrono::Duration::seconds(secs),
            round,
            turn,
        }
    }

    fn effect(duration: DurationSpec) -> Effect {
        Effect {
            id: EffectId::from("e1"),
            effect_type: EffectType::Poison,
            source: EntityId::from("src"),
            target: EntityId::from("tgt"),
            magnitude: 5.0,
            duration,
            started: start(),
            stacks: 1,
            dispel: DispelInfo::defaults_for(EffectType::Poison),
        }
    }

    #[test]
    fn stacking_policy_table() {
        assert!(EffectType::DamageOverTime.allows_stacking());
        assert!(EffectType::HealOverTime.allows_stacking());
        assert!(EffectType::StatBoost.allows_stacking());
        assert!(!EffectType::Stun.allows_stacking());
        assert!(!EffectType::Root.allows_stacking());
        assert!(!EffectType::Blessed.allows_stacking());
        assert!(!EffectType::Cursed.allows_stacking());
    }

    #[test]
    fn instant_effect_expires_immediately() {
        let e = effect(DurationSpec::INSTANT);
        assert!(e.is_expired(&clock_at(0, 3, 10)));
    }

    #[test]
    fn negative_duration_never_expires() {
        let e = effect(DurationSpec::PERMANENT);
        assert!(!e.is_expired(&clock_at(1_000_000, 999, 999)));
    }

    #[test]
    fn turn_duration_governs_when_nonzero() {
        // Both turns and rounds set: turns wins by precedence.
        let e = effect(DurationSpec {
            real_ms: 0,
            rounds: 100,
            turns: 2,
        });
        assert!(!e.is_expired(&clock_at(0, 3, 11)));
        assert!(e.is_expired(&clock_at(0, 3, 12)));
    }

    #[test]
    fn round_duration() {
        let e = effect(DurationSpec::rounds(2));
        assert!(!e.is_expired(&clock_at(0, 4, 50)));
        assert!(e.is_expired(&clock_at(0, 5, 50)));
    }

    #[test]
    fn real_time_duration() {
        let e = effect(DurationSpec::real_ms(30_000));
        assert!(!e.is_expired(&clock_at(29, 3, 10)));
        assert!(e.is_expired(&clock_at(30, 3, 10)));
    }

    #[test]
    fn dispel_match_requires_removable() {
        let mut info = DispelInfo::defaults_for(EffectType::Stun);
        assert!(info.matches(DispelType::Movement));
        assert!(!info.matches(DispelType::Poison));
        info.removable = false;
        assert!(!info.matches(DispelType::Movement));
    }
}

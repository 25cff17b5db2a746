//! Effect engine — apply, stack, dispel, tick, expire.
//!
//! One `EffectManager` per combatant. The manager owns the active effect
//! set plus immunities and resistances; it never touches the holder
//! directly. Apply and tick return reports (HP deltas, expired effects)
//! that the caller applies to the holder and turns into events, keeping
//! the manager free of back-references.
//!
//! ## Apply pipeline
//!
//! immunity gate → resistance scaling → stack / refresh / insert
//!
//! - `Complete` immunity rejects the application.
//! - `Reflect` immunity returns a redirect directive naming the source.
//! - `Partial` immunity and resistances scale magnitude multiplicatively.
//! - Same type + same source, stacking type: increment stacks.
//! - Same type, any source, non-stacking or different source: refresh
//!   start time, keep the larger magnitude.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rpg_types::effect::{
    DispelType, Effect, EffectClock, EffectStart, EffectType, ImmunityData, ImmunityLevel,
};
use rpg_types::ids::{EffectId, EntityId};

use crate::error::GameError;

// =============================================================================
// Reports
// =============================================================================

/// What happened to an application that was not blocked.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// Inserted as a new active effect.
    Applied { effect_id: EffectId },
    /// Same type and source already active; stack count incremented.
    Stacked { effect_id: EffectId, stacks: u32 },
    /// Same type already active; start time refreshed, magnitude maxed.
    Refreshed { effect_id: EffectId },
    /// Reflect immunity: the caller should re-apply against `to`.
    Reflected { to: EntityId },
}

/// Result of a successful apply.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyReport {
    pub outcome: ApplyOutcome,
    /// Immediate HP change from an instant payload (negative = damage).
    pub hp_delta: i32,
}

/// One periodic pulse produced by a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectPulse {
    pub effect_id: EffectId,
    pub effect_type: EffectType,
    /// HP change for the holder (negative = damage).
    pub hp_delta: i32,
}

/// Result of a tick pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub pulses: Vec<EffectPulse>,
    pub expired: Vec<Effect>,
}

impl TickReport {
    /// Net HP change across all pulses.
    pub fn hp_delta(&self) -> i32 {
        self.pulses.iter().map(|p| p.hp_delta).sum()
    }
}

// =============================================================================
// EffectManager
// =============================================================================

/// Per-combatant effect state. Serialized as the plain active set plus
/// immunity tables; anything derived is recomputed by scanning (the active
/// set is small).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EffectManager {
    active: BTreeMap<EffectId, Effect>,
    #[serde(default)]
    permanent_immunities: BTreeMap<EffectType, ImmunityData>,
    #[serde(default)]
    temporary_immunities: BTreeMap<EffectType, ImmunityData>,
    /// Type → damage reduction multiplier input in `[0, 1]`.
    #[serde(default)]
    resistances: BTreeMap<EffectType, f64>,
}

impl EffectManager {
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Apply
    // -------------------------------------------------------------------------

    /// Run the apply pipeline for `effect`.
    ///
    /// `Complete` immunity fails with `ImmunityBlocked`; everything else
    /// succeeds with an outcome describing what happened.
    pub fn apply(&mut self, mut effect: Effect, now: DateTime<Utc>) -> Result<ApplyReport, GameError> {
        match self.effective_immunity(effect.effect_type, now) {
            Some(imm) if imm.level == ImmunityLevel::Complete => {
                return Err(GameError::ImmunityBlocked {
                    effect_type: effect.effect_type,
                });
            }
            Some(imm) if imm.level == ImmunityLevel::Reflect => {
                return Ok(ApplyReport {
                    outcome: ApplyOutcome::Reflected {
                        to: effect.source.clone(),
                    },
                    hp_delta: 0,
                });
            }
            Some(imm) if imm.level == ImmunityLevel::Partial => {
                effect.magnitude *= 1.0 - imm.magnitude.clamp(0.0, 1.0);
            }
            _ => {}
        }

        if let Some(resist) = self.resistances.get(&effect.effect_type) {
            effect.magnitude *= 1.0 - resist.clamp(0.0, 1.0);
        }

        let instant = effect.duration.is_instant();
        let hp_delta = if instant {
            instant_hp_delta(&effect)
        } else {
            0
        };

        // Same type from the same source: stack when policy allows.
        if effect.effect_type.allows_stacking() {
            if let Some(existing) = self
                .active
                .values_mut()
                .find(|e| e.effect_type == effect.effect_type && e.source == effect.source)
            {
                existing.stacks += 1;
                return Ok(ApplyReport {
                    outcome: ApplyOutcome::Stacked {
                        effect_id: existing.id.clone(),
                        stacks: existing.stacks,
                    },
                    hp_delta,
                });
            }
        }

        // Same type from any source: refresh instead of duplicating.
        if let Some(existing) = self
            .active
            .values_mut()
            .find(|e| e.effect_type == effect.effect_type)
        {
            existing.refresh(effect.started);
            if effect.magnitude > existing.magnitude {
                existing.magnitude = effect.magnitude;
            }
            return Ok(ApplyReport {
                outcome: ApplyOutcome::Refreshed {
                    effect_id: existing.id.clone(),
                },
                hp_delta,
            });
        }

        let effect_id = effect.id.clone();
        self.active.insert(effect_id.clone(), effect);
        Ok(ApplyReport {
            outcome: ApplyOutcome::Applied { effect_id },
            hp_delta,
        })
    }

    // -------------------------------------------------------------------------
    // Dispel
    // -------------------------------------------------------------------------

    /// Remove every removable effect answering to `dispel_type` with
    /// priority at most `power`. Removal proceeds in descending priority;
    /// ties break toward the more recently applied effect.
    pub fn dispel(&mut self, dispel_type: DispelType, power: u8) -> Vec<Effect> {
        let mut victims: Vec<EffectId> = self
            .active
            .values()
            .filter(|e| e.dispel.matches(dispel_type) && e.dispel.priority <= power)
            .map(|e| e.id.clone())
            .collect();

        victims.sort_by(|a, b| {
            let ea = &self.active[a];
            let eb = &self.active[b];
            eb.dispel
                .priority
                .cmp(&ea.dispel.priority)
                .then_with(|| eb.started.at.cmp(&ea.started.at))
        });

        victims
            .into_iter()
            .filter_map(|id| self.active.remove(&id))
            .collect()
    }

    /// Remove a single effect by id regardless of dispel metadata
    /// (source removal, death cleanup). Errors if the effect is pinned
    /// as non-removable.
    pub fn remove_effect(&mut self, id: &EffectId) -> Result<Option<Effect>, GameError> {
        match self.active.get(id) {
            Some(e) if !e.dispel.removable => Err(GameError::EffectNotRemovable { id: id.clone() }),
            Some(_) => Ok(self.active.remove(id)),
            None => Ok(None),
        }
    }

    // -------------------------------------------------------------------------
    // Tick
    // -------------------------------------------------------------------------

    /// One tick pass: pulse periodic effects, then drop everything expired
    /// under `clock`. Instant effects pulsed at apply time are only
    /// collected here, never pulsed again.
    pub fn tick(&mut self, clock: &EffectClock) -> TickReport {
        let mut report = TickReport::default();

        for effect in self.active.values() {
            if effect.duration.is_instant() {
                continue;
            }
            let per_stack = effect.magnitude * effect.stacks as f64;
            let hp_delta = if effect.effect_type.deals_periodic_damage() {
                -(per_stack.round() as i32)
            } else if effect.effect_type == EffectType::HealOverTime {
                per_stack.round() as i32
            } else {
                0
            };
            if hp_delta != 0 {
                report.pulses.push(EffectPulse {
                    effect_id: effect.id.clone(),
                    effect_type: effect.effect_type,
                    hp_delta,
                });
            }
        }

        let expired_ids: Vec<EffectId> = self
            .active
            .values()
            .filter(|e| e.is_expired(clock))
            .map(|e| e.id.clone())
            .collect();
        for id in expired_ids {
            if let Some(e) = self.active.remove(&id) {
                report.expired.push(e);
            }
        }

        report
    }

    // -------------------------------------------------------------------------
    // Immunities & resistances
    // -------------------------------------------------------------------------

    pub fn add_immunity(&mut self, effect_type: EffectType, data: ImmunityData) {
        if data.permanent {
            self.permanent_immunities.insert(effect_type, data);
        } else {
            self.temporary_immunities.insert(effect_type, data);
        }
    }

    pub fn remove_immunity(&mut self, effect_type: EffectType) {
        self.permanent_immunities.remove(&effect_type);
        self.temporary_immunities.remove(&effect_type);
    }

    /// The immunity in force for `effect_type` at `now`, permanent entries
    /// taking precedence over unexpired temporary ones.
    pub fn effective_immunity(
        &self,
        effect_type: EffectType,
        now: DateTime<Utc>,
    ) -> Option<&ImmunityData> {
        if let Some(imm) = self.permanent_immunities.get(&effect_type) {
            return Some(imm);
        }
        self.temporary_immunities
            .get(&effect_type)
            .filter(|imm| imm.expires_at.map_or(true, |exp| exp > now))
    }

    /// Set the resistance multiplier input for a type. Clamped to `[0, 1]`.
    pub fn set_resistance(&mut self, effect_type: EffectType, value: f64) {
        self.resistances.insert(effect_type, value.clamp(0.0, 1.0));
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn has_effect(&self, effect_type: EffectType) -> bool {
        self.active.values().any(|e| e.effect_type == effect_type)
    }

    pub fn get_effect(&self, id: &EffectId) -> Option<&Effect> {
        self.active.get(id)
    }

    /// Snapshot of all active effects.
    pub fn effects(&self) -> Vec<Effect> {
        self.active.values().cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Net stat modifier from StatBoost/StatPenalty stacks. Applied at
    /// query time (attack rolls), so apply/expire boundaries are
    /// idempotent by construction.
    pub fn stat_modifier(&self) -> i32 {
        self.active
            .values()
            .map(|e| {
                let per = (e.magnitude * e.stacks as f64).round() as i32;
                match e.effect_type {
                    EffectType::StatBoost | EffectType::Blessed => per,
                    EffectType::StatPenalty | EffectType::Cursed => -per,
                    _ => 0,
                }
            })
            .sum()
    }

    pub fn is_stunned(&self) -> bool {
        self.has_effect(EffectType::Stun)
    }

    pub fn is_rooted(&self) -> bool {
        self.has_effect(EffectType::Root) || self.is_stunned()
    }
}

/// Immediate payload of an instant effect.
fn instant_hp_delta(effect: &Effect) -> i32 {
    let amount = (effect.magnitude * effect.stacks as f64).round() as i32;
    if effect.effect_type.deals_periodic_damage() {
        -amount
    } else if effect.effect_type == EffectType::HealOverTime {
        amount
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rpg_types::effect::{DispelInfo, DurationSpec};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    fn start_at(at: DateTime<Utc>) -> EffectStart {
        EffectStart {
            at,
            round: 1,
            turn: 1,
        }
    }

    fn clock(round: u64, turn: u64) -> EffectClock {
        EffectClock {
            now: t0(),
            round,
            turn,
        }
    }

    fn effect(n: u32, ty: EffectType, source: &str, duration: DurationSpec) -> Effect {
        Effect {
            id: EffectId::from(format!("fx_{n}")),
            effect_type: ty,
            source: EntityId::from(source),
            target: EntityId::from("victim"),
            magnitude: 5.0,
            duration,
            started: start_at(t0()),
            stacks: 1,
            dispel: DispelInfo::defaults_for(ty),
        }
    }

    #[test]
    fn same_source_dot_stacks() {
        let mut mgr = EffectManager::new();
        mgr.apply(
            effect(1, EffectType::DamageOverTime, "a", DurationSpec::rounds(3)),
            t0(),
        )
        .unwrap();
        let report = mgr
            .apply(
                effect(2, EffectType::DamageOverTime, "a", DurationSpec::rounds(3)),
                t0(),
            )
            .unwrap();

        assert!(matches!(
            report.outcome,
            ApplyOutcome::Stacked { stacks: 2, .. }
        ));
        assert_eq!(mgr.active_count(), 1);
    }

    #[test]
    fn stun_refreshes_instead_of_stacking() {
        let mut mgr = EffectManager::new();
        let mut first = effect(1, EffectType::Stun, "a", DurationSpec::rounds(2));
        first.started = start_at(t0() - chrono::Duration::seconds(60));
        mgr.apply(first, t0()).unwrap();

        let report = mgr
            .apply(effect(2, EffectType::Stun, "b", DurationSpec::rounds(2)), t0())
            .unwrap();
        assert!(matches!(report.outcome, ApplyOutcome::Refreshed { .. }));

        let effects = mgr.effects();
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].stacks, 1);
        assert_eq!(effects[0].started.at, t0()); // refreshed
    }

    #[test]
    fn refresh_keeps_larger_magnitude() {
        let mut mgr = EffectManager::new();
        let mut strong = effect(1, EffectType::Root, "a", DurationSpec::rounds(2));
        strong.magnitude = 9.0;
        mgr.apply(strong, t0()).unwrap();

        let weak = effect(2, EffectType::Root, "b", DurationSpec::rounds(2));
        mgr.apply(weak, t0()).unwrap();
        assert_eq!(mgr.effects()[0].magnitude, 9.0);
    }

    #[test]
    fn complete_immunity_blocks() {
        let mut mgr = EffectManager::new();
        mgr.add_immunity(
            EffectType::Poison,
            ImmunityData {
                level: ImmunityLevel::Complete,
                magnitude: 1.0,
                source: "racial".into(),
                permanent: true,
                expires_at: None,
            },
        );
        let err = mgr
            .apply(effect(1, EffectType::Poison, "a", DurationSpec::rounds(3)), t0())
            .unwrap_err();
        assert_eq!(err.kind(), "ImmunityBlocked");
        assert_eq!(mgr.active_count(), 0);
    }

    #[test]
    fn partial_immunity_and_resistance_scale_magnitude() {
        let mut mgr = EffectManager::new();
        mgr.add_immunity(
            EffectType::Burning,
            ImmunityData {
                level: ImmunityLevel::Partial,
                magnitude: 0.5,
                source: "ring".into(),
                permanent: true,
                expires_at: None,
            },
        );
        mgr.set_resistance(EffectType::Burning, 0.2);

        let mut e = effect(1, EffectType::Burning, "a", DurationSpec::rounds(3));
        e.magnitude = 10.0;
        mgr.apply(e, t0()).unwrap();
        // 10 × (1 − 0.5) × (1 − 0.2) = 4
        assert_eq!(mgr.effects()[0].magnitude, 4.0);
    }

    #[test]
    fn reflect_returns_redirect() {
        let mut mgr = EffectManager::new();
        mgr.add_immunity(
            EffectType::Cursed,
            ImmunityData {
                level: ImmunityLevel::Reflect,
                magnitude: 1.0,
                source: "mirror_amulet".into(),
                permanent: true,
                expires_at: None,
            },
        );
        let report = mgr
            .apply(
                effect(1, EffectType::Cursed, "warlock", DurationSpec::rounds(5)),
                t0(),
            )
            .unwrap();
        assert_eq!(
            report.outcome,
            ApplyOutcome::Reflected {
                to: EntityId::from("warlock")
            }
        );
        assert_eq!(mgr.active_count(), 0);
    }

    #[test]
    fn temporary_immunity_expires() {
        let mut mgr = EffectManager::new();
        mgr.add_immunity(
            EffectType::Poison,
            ImmunityData {
                level: ImmunityLevel::Complete,
                magnitude: 1.0,
                source: "antidote".into(),
                permanent: false,
                expires_at: Some(t0() + chrono::Duration::seconds(30)),
            },
        );
        assert!(mgr.effective_immunity(EffectType::Poison, t0()).is_some());
        let later = t0() + chrono::Duration::seconds(31);
        assert!(mgr.effective_immunity(EffectType::Poison, later).is_none());
    }

    #[test]
    fn instant_effect_pulses_at_apply_and_expires_next_tick() {
        let mut mgr = EffectManager::new();
        let report = mgr
            .apply(
                effect(1, EffectType::DamageOverTime, "a", DurationSpec::INSTANT),
                t0(),
            )
            .unwrap();
        assert_eq!(report.hp_delta, -5);
        assert_eq!(mgr.active_count(), 1);

        let tick = mgr.tick(&clock(1, 1));
        // No second pulse; the instant effect just expires.
        assert!(tick.pulses.is_empty());
        assert_eq!(tick.expired.len(), 1);
        assert_eq!(mgr.active_count(), 0);
    }

    #[test]
    fn dot_pulse_scales_with_stacks() {
        let mut mgr = EffectManager::new();
        mgr.apply(
            effect(1, EffectType::DamageOverTime, "a", DurationSpec::rounds(5)),
            t0(),
        )
        .unwrap();
        mgr.apply(
            effect(2, EffectType::DamageOverTime, "a", DurationSpec::rounds(5)),
            t0(),
        )
        .unwrap();

        let tick = mgr.tick(&clock(1, 1));
        assert_eq!(tick.hp_delta(), -10); // 5 × 2 stacks
        assert_eq!(mgr.active_count(), 1); // not yet expired
    }

    #[test]
    fn permanent_effect_survives_any_clock() {
        let mut mgr = EffectManager::new();
        mgr.apply(
            effect(1, EffectType::Blessed, "a", DurationSpec::PERMANENT),
            t0(),
        )
        .unwrap();
        let tick = mgr.tick(&clock(9999, 9999));
        assert!(tick.expired.is_empty());
        assert!(mgr.has_effect(EffectType::Blessed));
    }

    #[test]
    fn round_expiry_collected_on_tick() {
        let mut mgr = EffectManager::new();
        mgr.apply(
            effect(1, EffectType::Poison, "a", DurationSpec::rounds(2)),
            t0(),
        )
        .unwrap();
        assert!(mgr.tick(&clock(2, 1)).expired.is_empty());
        let tick = mgr.tick(&clock(3, 1));
        assert_eq!(tick.expired.len(), 1);
        assert_eq!(mgr.active_count(), 0);
    }

    #[test]
    fn dispel_respects_type_priority_and_power() {
        let mut mgr = EffectManager::new();
        // Stun (priority 80, Movement) applied earlier…
        let mut stun = effect(1, EffectType::Stun, "a", DurationSpec::rounds(3));
        stun.started = start_at(t0() - chrono::Duration::seconds(10));
        mgr.apply(stun, t0()).unwrap();
        // …Root (priority 70, Movement) applied later…
        mgr.apply(effect(2, EffectType::Root, "a", DurationSpec::rounds(3)), t0())
            .unwrap();
        // …and a DoT (Magic) that the dispel type does not cover.
        mgr.apply(
            effect(3, EffectType::DamageOverTime, "a", DurationSpec::rounds(3)),
            t0(),
        )
        .unwrap();

        let removed = mgr.dispel(DispelType::Movement, 100);
        let types: Vec<EffectType> = removed.iter().map(|e| e.effect_type).collect();
        assert_eq!(types, vec![EffectType::Stun, EffectType::Root]);
        assert!(mgr.has_effect(EffectType::DamageOverTime));
    }

    #[test]
    fn dispel_power_gates_high_priority_effects() {
        let mut mgr = EffectManager::new();
        mgr.apply(effect(1, EffectType::Stun, "a", DurationSpec::rounds(3)), t0())
            .unwrap();
        // Stun priority is 80; a 50-power dispel is too weak.
        assert!(mgr.dispel(DispelType::Movement, 50).is_empty());
        assert_eq!(mgr.dispel(DispelType::Movement, 90).len(), 1);
    }

    #[test]
    fn dispel_tie_breaks_toward_newer_effect() {
        let mut mgr = EffectManager::new();
        let mut older = effect(1, EffectType::Poison, "a", DurationSpec::rounds(3));
        older.started = start_at(t0() - chrono::Duration::seconds(60));
        mgr.apply(older, t0()).unwrap();
        let mut newer = effect(2, EffectType::Bleeding, "b", DurationSpec::rounds(3));
        newer.dispel.priority = EffectType::Poison.default_dispel_priority();
        newer.dispel.types = vec![DispelType::Poison];
        mgr.apply(newer, t0()).unwrap();

        let removed = mgr.dispel(DispelType::Poison, 100);
        assert_eq!(removed.len(), 2);
        // Equal priority: the later-started Bleeding goes first.
        assert_eq!(removed[0].effect_type, EffectType::Bleeding);
    }

    #[test]
    fn non_removable_effect_survives_dispel() {
        let mut mgr = EffectManager::new();
        let mut e = effect(1, EffectType::Cursed, "a", DurationSpec::PERMANENT);
        e.dispel.removable = false;
        mgr.apply(e, t0()).unwrap();

        assert!(mgr.dispel(DispelType::Curse, 100).is_empty());
        let id = mgr.effects()[0].id.clone();
        assert_eq!(
            mgr.remove_effect(&id).unwrap_err().kind(),
            "EffectNotRemovable"
        );
    }

    #[test]
    fn stat_modifier_sums_boosts_and_penalties() {
        let mut mgr = EffectManager::new();
        let mut boost = effect(1, EffectType::StatBoost, "a", DurationSpec::rounds(5));
        boost.magnitude = 2.0;
        mgr.apply(boost, t0()).unwrap();
        let mut penalty = effect(2, EffectType::StatPenalty, "b", DurationSpec::rounds(5));
        penalty.magnitude = 3.0;
        mgr.apply(penalty, t0()).unwrap();

        assert_eq!(mgr.stat_modifier(), -1);
    }

    #[test]
    fn serde_roundtrip_preserves_active_set() {
        let mut mgr = EffectManager::new();
        mgr.apply(
            effect(1, EffectType::Poison, "a", DurationSpec::rounds(4)),
            t0(),
        )
        .unwrap();
        mgr.add_immunity(
            EffectType::Stun,
            ImmunityData {
                level: ImmunityLevel::Complete,
                magnitude: 1.0,
                source: "helm".into(),
                permanent: true,
                expires_at: None,
            },
        );

        let yaml = serde_yaml::to_string(&mgr).unwrap();
        let restored: EffectManager = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(restored.active_count(), 1);
        assert!(restored.has_effect(EffectType::Poison));
        assert!(restored
            .effective_immunity(EffectType::Stun, t0())
            .is_some());
    }
}

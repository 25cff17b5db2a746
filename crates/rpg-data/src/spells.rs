//! Spell catalog — one constructor per spell, looked up by id.

use rpg_types::effect::{DurationSpec, EffectType};
use rpg_types::ids::SpellId;
use rpg_types::spell::{Spell, SpellEffectSpec, SpellSchool, SpellTarget};

/// Look up a spell by ID.
pub fn get_spell(id: &str) -> Option<Spell> {
    match id {
        "magic_missile" => Some(magic_missile()),
        "fireball" => Some(fireball()),
        "cure_wounds" => Some(cure_wounds()),
        "regeneration" => Some(regeneration()),
        "bless" => Some(bless()),
        "curse" => Some(curse()),
        "hold_person" => Some(hold_person()),
        "entangle" => Some(entangle()),
        "poison_spray" => Some(poison_spray()),
        "bear_strength" => Some(bear_strength()),
        _ => None,
    }
}

/// All spell ids, for catalog listings.
pub fn all_spell_ids() -> &'static [&'static str] {
    &[
        "magic_missile",
        "fireball",
        "cure_wounds",
        "regeneration",
        "bless",
        "curse",
        "hold_person",
        "entangle",
        "poison_spray",
        "bear_strength",
    ]
}

fn spell(
    id: &str,
    name: &str,
    school: SpellSchool,
    level: u32,
    mana_cost: u32,
    ap_cost: u32,
    target: SpellTarget,
    effects: Vec<SpellEffectSpec>,
) -> Spell {
    Spell {
        id: SpellId::from(id),
        name: name.to_string(),
        school,
        level,
        mana_cost,
        ap_cost,
        target,
        effects,
    }
}

fn instant(effect_type: EffectType, magnitude: &str) -> SpellEffectSpec {
    SpellEffectSpec {
        effect_type,
        magnitude: magnitude.to_string(),
        duration: DurationSpec::INSTANT,
    }
}

fn over_rounds(effect_type: EffectType, magnitude: &str, rounds: i64) -> SpellEffectSpec {
    SpellEffectSpec {
        effect_type,
        magnitude: magnitude.to_string(),
        duration: DurationSpec::rounds(rounds),
    }
}

// =============================================================================
// Evocation
// =============================================================================

fn magic_missile() -> Spell {
    spell(
        "magic_missile",
        "Magic Missile",
        SpellSchool::Evocation,
        1,
        2,
        1,
        SpellTarget::Single { range: 12 },
        vec![instant(EffectType::DamageOverTime, "1d4+1")],
    )
}

fn fireball() -> Spell {
    spell(
        "fireball",
        "Fireball",
        SpellSchool::Evocation,
        5,
        8,
        2,
        SpellTarget::Area {
            range: 15,
            radius: 3,
        },
        vec![
            instant(EffectType::DamageOverTime, "6d6"),
            over_rounds(EffectType::Burning, "1d4", 2),
        ],
    )
}

fn poison_spray() -> Spell {
    spell(
        "poison_spray",
        "Poison Spray",
        SpellSchool::Evocation,
        1,
        2,
        1,
        SpellTarget::Single { range: 2 },
        vec![over_rounds(EffectType::Poison, "1d6", 3)],
    )
}

// =============================================================================
// Healing & blessings
// =============================================================================

fn cure_wounds() -> Spell {
    spell(
        "cure_wounds",
        "Cure Wounds",
        SpellSchool::Conjuration,
        1,
        3,
        1,
        SpellTarget::Single { range: 1 },
        vec![instant(EffectType::HealOverTime, "1d8+2")],
    )
}

fn regeneration() -> Spell {
    spell(
        "regeneration",
        "Regeneration",
        SpellSchool::Conjuration,
        4,
        6,
        1,
        SpellTarget::Single { range: 1 },
        vec![over_rounds(EffectType::HealOverTime, "1d4", 5)],
    )
}

fn bless() -> Spell {
    spell(
        "bless",
        "Bless",
        SpellSchool::Enchantment,
        1,
        2,
        1,
        SpellTarget::Single { range: 6 },
        vec![over_rounds(EffectType::Blessed, "1", 10)],
    )
}

fn bear_strength() -> Spell {
    spell(
        "bear_strength",
        "Bear's Strength",
        SpellSchool::Enchantment,
        2,
        4,
        1,
        SpellTarget::Single { range: 1 },
        vec![over_rounds(EffectType::StatBoost, "2", 10)],
    )
}

// =============================================================================
// Hexes & control
// =============================================================================

fn curse() -> Spell {
    spell(
        "curse",
        "Curse",
        SpellSchool::Necromancy,
        2,
        4,
        1,
        SpellTarget::Single { range: 8 },
        vec![over_rounds(EffectType::Cursed, "1", 10)],
    )
}

fn hold_person() -> Spell {
    spell(
        "hold_person",
        "Hold Person",
        SpellSchool::Enchantment,
        3,
        5,
        2,
        SpellTarget::Single { range: 8 },
        vec![over_rounds(EffectType::Stun, "1", 2)],
    )
}

fn entangle() -> Spell {
    spell(
        "entangle",
        "Entangle",
        SpellSchool::Conjuration,
        1,
        3,
        1,
        SpellTarget::Single { range: 10 },
        vec![over_rounds(EffectType::Root, "1", 3)],
    )
}

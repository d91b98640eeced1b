//! Combat resolution.
//!
//! Strengths are expressed in percent-scaled integers: a base strength of 2
//! becomes 200, a veteran level adds 50 per level, terrain and fortification
//! multiply on top. Damage is dealt over a fixed number of rounds, the side
//! with greater strength winning each round more often, plus a flat toll
//! both sides always pay for closing to melee.

use serde::{Deserialize, Serialize};

use crate::rng::GameRng;

/// Damage rounds fought per attack
const ROUNDS: u32 = 6;

/// Health both sides always lose in an exchange
const MELEE_TOLL: u32 = 5;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct CombatOutcome {
    pub attacker_damage: u32,
    pub defender_damage: u32,
    pub attacker_destroyed: bool,
    pub defender_destroyed: bool,
    pub attacker_promoted: bool,
}

/// Percent-scaled strength with veteran, terrain, and fortification factors
pub fn effective_strength(
    base: u16,
    veteran_level: u8,
    terrain_bonus_pct: u16,
    fortify_bonus_pct: u16,
) -> u32 {
    let vet = 100 + 50 * u32::from(veteran_level);
    u32::from(base) * vet * (100 + u32::from(terrain_bonus_pct)) / 100
        * (100 + u32::from(fortify_bonus_pct))
        / 100
}

/// Fight it out. Returns the damage each side takes; destruction flags are
/// set when damage reaches the respective side's remaining health.
pub fn resolve(
    attack_strength: u32,
    defense_strength: u32,
    attacker_health: u8,
    defender_health: u8,
    rng: &mut GameRng,
) -> CombatOutcome {
    // A defenseless target is simply overrun
    if defense_strength == 0 {
        return CombatOutcome {
            attacker_damage: 0,
            defender_damage: u32::from(defender_health),
            attacker_destroyed: false,
            defender_destroyed: true,
            attacker_promoted: false,
        };
    }

    let total = (attack_strength + defense_strength) as f64;
    let p_attacker_wins = attack_strength as f64 / total;

    let mut attacker_damage = MELEE_TOLL;
    let mut defender_damage = MELEE_TOLL;

    for _ in 0..ROUNDS {
        let hit = 8 + rng.gen_below(8);
        if rng.next_f64() < p_attacker_wins {
            defender_damage += hit;
        } else {
            attacker_damage += hit;
        }
    }

    CombatOutcome {
        attacker_damage,
        defender_damage,
        attacker_destroyed: attacker_damage >= u32::from(attacker_health),
        defender_destroyed: defender_damage >= u32::from(defender_health),
        attacker_promoted: false,
    }
}

//! Unit lifecycle: creation, movement, combat, stances, healing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    conf,
    game::{
        combat::{self, CombatOutcome},
        error::{GameError, GameResult},
        map::MapState,
        PlayerId,
    },
    rng::GameRng,
    ruleset::{Ruleset, UnitTypeDef},
    util::Location,
};

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct UnitId(u64);

impl UnitId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
    pub fn value(self) -> u64 {
        self.0
    }
}

/// A unit's standing orders. Fortification takes a full held turn to set in:
/// `Fortifying` becomes `Fortified` at the next turn start.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    #[default]
    None,
    Fortifying,
    Fortified,
    Sentry,
    Skip,
}

impl Stance {
    pub fn id(self) -> &'static str {
        match self {
            Stance::None => "none",
            Stance::Fortifying => "fortifying",
            Stance::Fortified => "fortified",
            Stance::Sentry => "sentry",
            Stance::Skip => "skip",
        }
    }

    pub fn from_id(id: &str) -> Option<Stance> {
        match id {
            "none" => Some(Stance::None),
            "fortifying" => Some(Stance::Fortifying),
            "fortified" => Some(Stance::Fortified),
            "sentry" => Some(Stance::Sentry),
            "skip" => Some(Stance::Skip),
            _ => None,
        }
    }

    pub fn is_fortified(self) -> bool {
        self == Stance::Fortified
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Unit {
    pub id: UnitId,
    pub owner: PlayerId,
    pub type_id: String,
    pub loc: Location,
    pub health: u8,
    /// Movement fragments left this turn; a full move on open ground costs
    /// three
    pub movement_left: u16,
    pub veteran_level: u8,
    pub stance: Stance,
    pub home_city: Option<crate::game::city::CityId>,
    pub created_turn: u32,
}

impl Unit {
    fn new(id: UnitId, owner: PlayerId, type_def: &UnitTypeDef, loc: Location, turn: u32) -> Self {
        Self {
            id,
            owner,
            type_id: type_def.id.clone(),
            loc,
            health: conf::MAX_HEALTH,
            movement_left: type_def.max_movement,
            veteran_level: 0,
            stance: Stance::None,
            home_city: None,
            created_turn: turn,
        }
    }

    pub fn attack_strength(&self, type_def: &UnitTypeDef) -> u32 {
        combat::effective_strength(type_def.attack, self.veteran_level, 0, 0)
    }

    pub fn defense_strength(
        &self,
        type_def: &UnitTypeDef,
        terrain_bonus_pct: u16,
        extra_bonus_pct: u16,
    ) -> u32 {
        let fortify_pct = if self.stance.is_fortified() { 50 } else { 0 };
        combat::effective_strength(
            type_def.defense,
            self.veteran_level,
            terrain_bonus_pct,
            fortify_pct + extra_bonus_pct,
        )
    }
}

/// Owns every unit in a game, keyed by id; tiles carry only the ids.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct UnitManager {
    units: BTreeMap<UnitId, Unit>,
    next_id: UnitId,
}

impl UnitManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    fn unit_or_err(&self, id: UnitId) -> GameResult<&Unit> {
        self.units.get(&id).ok_or(GameError::UnknownId {
            kind: "unit",
            id: id.value().to_string(),
        })
    }

    /// The unit, if it exists and belongs to `player`
    pub fn player_unit(&self, player: PlayerId, id: UnitId) -> GameResult<&Unit> {
        let unit = self.unit_or_err(id)?;
        if unit.owner != player {
            return Err(GameError::UnknownId {
                kind: "unit",
                id: id.value().to_string(),
            });
        }
        Ok(unit)
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    pub fn player_units(&self, player: PlayerId) -> impl Iterator<Item = &Unit> {
        self.units.values().filter(move |u| u.owner == player)
    }

    pub fn units_at<'a>(&'a self, map: &'a MapState, loc: Location) -> impl Iterator<Item = &'a Unit> {
        map.tile(loc)
            .map(|t| t.unit_ids.clone())
            .unwrap_or_default()
            .into_iter()
            .filter_map(move |id| self.units.get(&id))
    }

    /// Whether `player` moving a civilian onto `loc` would stack it on a
    /// friendly civilian
    fn civilian_conflict(
        &self,
        map: &MapState,
        ruleset: &Ruleset,
        player: PlayerId,
        loc: Location,
    ) -> bool {
        self.units_at(map, loc).any(|other| {
            other.owner == player
                && ruleset
                    .unit_type(&other.type_id)
                    .map(UnitTypeDef::is_civilian)
                    .unwrap_or(false)
        })
    }

    fn enemy_at(&self, map: &MapState, player: PlayerId, loc: Location) -> bool {
        self.units_at(map, loc).any(|other| other.owner != player)
    }

    fn terrain_permits(type_def: &UnitTypeDef, map: &MapState, loc: Location) -> bool {
        let Some(tile) = map.tile(loc) else {
            return false;
        };
        if type_def.naval {
            tile.terrain.is_water()
        } else {
            tile.terrain.is_land()
        }
    }

    /// Create a unit of `type_id` for `player` at `loc`
    pub fn create(
        &mut self,
        map: &mut MapState,
        ruleset: &Ruleset,
        player: PlayerId,
        type_id: &str,
        loc: Location,
        turn: u32,
    ) -> GameResult<UnitId> {
        let type_def = ruleset.unit_type(type_id)?;

        if !map.dims().contain(loc) || !Self::terrain_permits(type_def, map, loc) {
            return Err(GameError::InvalidPosition { loc });
        }
        if self.enemy_at(map, player, loc) {
            return Err(GameError::InvalidPosition { loc });
        }
        if type_def.is_civilian() && self.civilian_conflict(map, ruleset, player, loc) {
            return Err(GameError::CivilianStackingForbidden { loc });
        }

        let id = self.next_id;
        self.next_id = self.next_id.next();

        let unit = Unit::new(id, player, type_def, loc, turn);
        map.add_unit(loc, id)?;
        self.units.insert(id, unit);

        Ok(id)
    }

    /// Move a unit one step to an adjacent tile, debiting movement fragments
    pub fn move_unit(
        &mut self,
        map: &mut MapState,
        ruleset: &Ruleset,
        player: PlayerId,
        id: UnitId,
        dest: Location,
    ) -> GameResult<()> {
        let unit = self.player_unit(player, id)?;
        let type_def = ruleset.unit_type(&unit.type_id)?;
        let from = unit.loc;
        let movement_left = unit.movement_left;
        let is_civilian = type_def.is_civilian();

        if !map.dims().contain(dest) {
            return Err(GameError::OutOfBounds {
                loc: dest,
                dims: map.dims(),
            });
        }
        if map.distance(from, dest) != 1 {
            return Err(GameError::InvalidInput {
                message: format!("{dest} is not adjacent to {from}"),
            });
        }
        if !Self::terrain_permits(type_def, map, dest) {
            return Err(GameError::InvalidPosition { loc: dest });
        }
        if self.enemy_at(map, player, dest) {
            return Err(GameError::CannotMoveOntoEnemyUnit { loc: dest });
        }
        if is_civilian && self.civilian_conflict(map, ruleset, player, dest) {
            return Err(GameError::CivilianStackingForbidden { loc: dest });
        }

        let cost = if type_def.naval {
            3
        } else {
            map.movement_cost(dest).ok_or(GameError::InvalidPosition { loc: dest })?
        };
        if movement_left < cost {
            return Err(GameError::NotEnoughMovement {
                required: cost,
                available: movement_left,
            });
        }

        map.remove_unit(from, id)?;
        map.add_unit(dest, id)?;

        let unit = self.units.get_mut(&id).unwrap();
        unit.loc = dest;
        unit.movement_left -= cost;
        unit.stance = Stance::None;

        Ok(())
    }

    /// Resolve an attack between adjacent units. Consumes all of the
    /// attacker's remaining movement; either side may be destroyed.
    ///
    /// `defender_extra_pct` carries situational defense such as city walls.
    pub fn attack(
        &mut self,
        map: &mut MapState,
        ruleset: &Ruleset,
        player: PlayerId,
        attacker_id: UnitId,
        defender_id: UnitId,
        defender_extra_pct: u16,
        rng: &mut GameRng,
    ) -> GameResult<CombatOutcome> {
        let attacker = self.player_unit(player, attacker_id)?;
        let defender = self.unit_or_err(defender_id)?;

        if defender.owner == player {
            return Err(GameError::InvalidInput {
                message: "cannot attack your own unit".to_owned(),
            });
        }
        if map.distance(attacker.loc, defender.loc) != 1 {
            return Err(GameError::InvalidInput {
                message: "target is not adjacent".to_owned(),
            });
        }
        if attacker.movement_left == 0 {
            return Err(GameError::NotEnoughMovement {
                required: 1,
                available: 0,
            });
        }

        let attacker_type = ruleset.unit_type(&attacker.type_id)?;
        if attacker_type.attack == 0 {
            return Err(GameError::InvalidInput {
                message: format!("{} cannot attack", attacker_type.name),
            });
        }
        let defender_type = ruleset.unit_type(&defender.type_id)?;

        let terrain_bonus = map
            .tile(defender.loc)
            .map(|t| t.terrain.defense_bonus_pct())
            .unwrap_or(0);

        let attack_strength = attacker.attack_strength(attacker_type);
        let defense_strength =
            defender.defense_strength(defender_type, terrain_bonus, defender_extra_pct);

        let mut outcome = combat::resolve(
            attack_strength,
            defense_strength,
            attacker.health,
            defender.health,
            rng,
        );

        if outcome.defender_destroyed
            && !outcome.attacker_destroyed
            && rng.gen_bool(conf::VETERAN_PROMOTION_CHANCE)
        {
            outcome.attacker_promoted = true;
        }

        {
            let attacker = self.units.get_mut(&attacker_id).unwrap();
            attacker.movement_left = 0;
            attacker.stance = Stance::None;
            attacker.health = attacker
                .health
                .saturating_sub(outcome.attacker_damage.min(255) as u8);
            if outcome.attacker_promoted {
                attacker.veteran_level =
                    (attacker.veteran_level + 1).min(conf::MAX_VETERAN_LEVEL);
            }
        }
        {
            let defender = self.units.get_mut(&defender_id).unwrap();
            defender.health = defender
                .health
                .saturating_sub(outcome.defender_damage.min(255) as u8);
        }

        if outcome.attacker_destroyed {
            self.destroy(map, attacker_id)?;
        }
        if outcome.defender_destroyed {
            self.destroy(map, defender_id)?;
        }

        Ok(outcome)
    }

    pub fn destroy(&mut self, map: &mut MapState, id: UnitId) -> GameResult<Unit> {
        let unit = self.units.remove(&id).ok_or(GameError::UnknownId {
            kind: "unit",
            id: id.value().to_string(),
        })?;
        map.remove_unit(unit.loc, id)?;
        Ok(unit)
    }

    pub fn set_stance(&mut self, player: PlayerId, id: UnitId, stance: Stance) -> GameResult<()> {
        self.player_unit(player, id)?;
        let unit = self.units.get_mut(&id).unwrap();
        unit.stance = match stance {
            // Fortification only sets in after a full held turn
            Stance::Fortified => Stance::Fortifying,
            other => other,
        };
        Ok(())
    }

    /// Turn-start refresh for one player's units: refill movement, advance
    /// fortification, and heal. Fortified units heal the most; units resting
    /// on their own territory a little; units in the field not at all.
    pub fn reset_movement(
        &mut self,
        map: &MapState,
        ruleset: &Ruleset,
        player: PlayerId,
    ) -> GameResult<()> {
        let ids: Vec<UnitId> = self
            .units
            .values()
            .filter(|u| u.owner == player)
            .map(|u| u.id)
            .collect();

        for id in ids {
            let unit = self.units.get(&id).unwrap();
            let max_movement = ruleset.unit_type(&unit.type_id)?.max_movement;
            let on_own_territory = map
                .tile(unit.loc)
                .and_then(|t| t.owner)
                .map(|owner| owner == player)
                .unwrap_or(false);

            let unit = self.units.get_mut(&id).unwrap();
            unit.movement_left = max_movement;

            // Heal by the stance held through the turn that just ended
            let heal = if unit.stance.is_fortified() {
                conf::FORTIFIED_HEAL
            } else if on_own_territory {
                conf::TERRITORY_HEAL
            } else {
                conf::FIELD_HEAL
            };
            unit.health = unit.health.saturating_add(heal).min(conf::MAX_HEALTH);

            if unit.stance == Stance::Fortifying {
                unit.stance = Stance::Fortified;
            } else if unit.stance == Stance::Skip {
                unit.stance = Stance::None;
            }
        }

        Ok(())
    }

    /// Rehydrate units from persistence, clamping any corrupted movement
    /// into the type's budget and registering tile occupancy
    pub fn load_units(
        &mut self,
        map: &mut MapState,
        ruleset: &Ruleset,
        units: Vec<Unit>,
    ) -> GameResult<()> {
        for mut unit in units {
            let type_def = ruleset.unit_type(&unit.type_id)?;
            unit.movement_left = unit.movement_left.min(type_def.max_movement);
            unit.health = unit.health.min(conf::MAX_HEALTH);

            if self.next_id <= unit.id {
                self.next_id = unit.id.next();
            }
            map.add_unit(unit.loc, unit.id)?;
            self.units.insert(unit.id, unit);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn setup() -> (MapState, std::sync::Arc<Ruleset>, UnitManager) {
        let map = MapState::try_from(
            "~~~~~~\n\
             ~....~\n\
             ~.h..~\n\
             ~....~\n\
             ~~~~~~",
        )
        .unwrap();
        let ruleset = Ruleset::load("classic").unwrap();
        (map, ruleset, UnitManager::new())
    }

    #[test]
    fn test_create_and_bounds() {
        let (mut map, ruleset, mut units) = setup();

        let id = units
            .create(&mut map, &ruleset, 0, "warriors", Location::new(1, 1), 1)
            .unwrap();
        assert_eq!(units.unit(id).unwrap().movement_left, 3);
        assert!(map.tile(Location::new(1, 1)).unwrap().unit_ids.contains(&id));

        // Off the map
        let err = units
            .create(&mut map, &ruleset, 0, "warriors", Location::new(6, 1), 1)
            .unwrap_err();
        assert_eq!(err.code(), "InvalidPosition");

        // Land unit in the water
        let err = units
            .create(&mut map, &ruleset, 0, "warriors", Location::new(0, 0), 1)
            .unwrap_err();
        assert_eq!(err.code(), "InvalidPosition");

        // Unknown type
        let err = units
            .create(&mut map, &ruleset, 0, "chariot", Location::new(1, 1), 1)
            .unwrap_err();
        assert_eq!(err.code(), "UnknownId");
    }

    #[test]
    fn test_civilian_stacking() {
        let (mut map, ruleset, mut units) = setup();
        let loc = Location::new(1, 1);

        units
            .create(&mut map, &ruleset, 0, "settlers", loc, 1)
            .unwrap();

        let err = units
            .create(&mut map, &ruleset, 0, "workers", loc, 1)
            .unwrap_err();
        assert_eq!(err.code(), "CivilianStackingForbidden");

        // A soldier may garrison with the settler, and an enemy civilian is
        // blocked for a different reason
        units
            .create(&mut map, &ruleset, 0, "warriors", loc, 1)
            .unwrap();
        let err = units
            .create(&mut map, &ruleset, 1, "settlers", loc, 1)
            .unwrap_err();
        assert_eq!(err.code(), "InvalidPosition");

        assert_eq!(units.units_at(&map, loc).count(), 2);
    }

    #[test]
    fn test_move_debits_fragments() {
        let (mut map, ruleset, mut units) = setup();
        let id = units
            .create(&mut map, &ruleset, 0, "warriors", Location::new(1, 1), 1)
            .unwrap();

        // Onto grassland: 3 fragments
        units
            .move_unit(&mut map, &ruleset, 0, id, Location::new(2, 1))
            .unwrap();
        assert_eq!(units.unit(id).unwrap().movement_left, 0);
        assert!(map.tile(Location::new(1, 1)).unwrap().unit_ids.is_empty());

        // Tank empty: moving further fails and position is unchanged
        let err = units
            .move_unit(&mut map, &ruleset, 0, id, Location::new(3, 1))
            .unwrap_err();
        assert_eq!(err.code(), "NotEnoughMovement");
        assert_eq!(units.unit(id).unwrap().loc, Location::new(2, 1));
    }

    #[test]
    fn test_move_costs_hills_more() {
        let (mut map, ruleset, mut units) = setup();
        let id = units
            .create(&mut map, &ruleset, 0, "horsemen", Location::new(1, 2), 1)
            .unwrap();

        // Horsemen have 6 fragments; hills cost 6
        units
            .move_unit(&mut map, &ruleset, 0, id, Location::new(2, 2))
            .unwrap();
        assert_eq!(units.unit(id).unwrap().movement_left, 0);
    }

    #[test]
    fn test_move_rules() {
        let (mut map, ruleset, mut units) = setup();
        let id = units
            .create(&mut map, &ruleset, 0, "warriors", Location::new(1, 1), 1)
            .unwrap();

        // Not adjacent
        let err = units
            .move_unit(&mut map, &ruleset, 0, id, Location::new(3, 3))
            .unwrap_err();
        assert_eq!(err.code(), "InvalidInput");

        // Into the sea
        let err = units
            .move_unit(&mut map, &ruleset, 0, id, Location::new(0, 0))
            .unwrap_err();
        assert_eq!(err.code(), "InvalidPosition");

        // Onto an enemy
        units
            .create(&mut map, &ruleset, 1, "warriors", Location::new(2, 1), 1)
            .unwrap();
        let err = units
            .move_unit(&mut map, &ruleset, 0, id, Location::new(2, 1))
            .unwrap_err();
        assert_eq!(err.code(), "CannotMoveOntoEnemyUnit");
    }

    #[test]
    fn test_attack_consumes_movement_and_wounds() {
        let (mut map, ruleset, mut units) = setup();
        let attacker = units
            .create(&mut map, &ruleset, 0, "warriors", Location::new(1, 1), 1)
            .unwrap();
        let defender = units
            .create(&mut map, &ruleset, 1, "warriors", Location::new(2, 1), 1)
            .unwrap();

        let mut rng = GameRng::from_seed_str("attack-test");
        let outcome = units
            .attack(&mut map, &ruleset, 0, attacker, defender, 0, &mut rng)
            .unwrap();

        if !outcome.attacker_destroyed {
            let a = units.unit(attacker).unwrap();
            assert_eq!(a.movement_left, 0);
            assert!(a.health < 100);
        }
        if !outcome.defender_destroyed {
            assert!(units.unit(defender).unwrap().health < 100);
        }
    }

    #[test]
    fn test_attack_between_wounded_units_kills() {
        let (mut map, ruleset, mut units) = setup();
        let attacker = units
            .create(&mut map, &ruleset, 0, "warriors", Location::new(1, 1), 1)
            .unwrap();
        let defender = units
            .create(&mut map, &ruleset, 1, "warriors", Location::new(2, 1), 1)
            .unwrap();

        for id in [attacker, defender] {
            // Reach into the store to pre-wound both sides
            units.units.get_mut(&id).unwrap().health = 10;
        }

        let mut rng = GameRng::from_seed_str("deathmatch");
        let outcome = units
            .attack(&mut map, &ruleset, 0, attacker, defender, 0, &mut rng)
            .unwrap();

        assert!(outcome.attacker_destroyed || outcome.defender_destroyed);
        if outcome.defender_destroyed {
            assert!(units.unit(defender).is_none());
            assert!(!map
                .tile(Location::new(2, 1))
                .unwrap()
                .unit_ids
                .contains(&defender));
        }
    }

    #[test]
    fn test_spent_attacker_cannot_strike() {
        let (mut map, ruleset, mut units) = setup();
        let attacker = units
            .create(&mut map, &ruleset, 0, "warriors", Location::new(1, 1), 1)
            .unwrap();
        let defender = units
            .create(&mut map, &ruleset, 1, "warriors", Location::new(2, 1), 1)
            .unwrap();

        units.units.get_mut(&attacker).unwrap().movement_left = 0;

        let mut rng = GameRng::from_seed_str("spent");
        let err = units
            .attack(&mut map, &ruleset, 0, attacker, defender, 0, &mut rng)
            .unwrap_err();
        assert_eq!(err.code(), "NotEnoughMovement");
    }

    #[test]
    fn test_fortify_heals_after_full_turn() {
        let (mut map, ruleset, mut units) = setup();
        let id = units
            .create(&mut map, &ruleset, 0, "warriors", Location::new(1, 1), 1)
            .unwrap();
        units.units.get_mut(&id).unwrap().health = 50;

        units.set_stance(0, id, Stance::Fortified).unwrap();
        assert_eq!(units.unit(id).unwrap().stance, Stance::Fortifying);

        // First turn start: fortification sets in, but the unit was only
        // fortifying, so it heals at the field rate of zero
        units.reset_movement(&map, &ruleset, 0).unwrap();
        assert_eq!(units.unit(id).unwrap().stance, Stance::Fortified);
        assert_eq!(units.unit(id).unwrap().health, 50);

        // Second turn start: fortified healing
        units.reset_movement(&map, &ruleset, 0).unwrap();
        assert_eq!(units.unit(id).unwrap().health, 50 + conf::FORTIFIED_HEAL);
    }

    #[test]
    fn test_territory_healing() {
        let (mut map, ruleset, mut units) = setup();
        let id = units
            .create(&mut map, &ruleset, 0, "warriors", Location::new(1, 1), 1)
            .unwrap();
        units.units.get_mut(&id).unwrap().health = 40;

        // In the field: no healing at all
        units.reset_movement(&map, &ruleset, 0).unwrap();
        assert_eq!(units.unit(id).unwrap().health, 40 + conf::FIELD_HEAL);

        map.tile_mut(Location::new(1, 1)).unwrap().owner = Some(0);
        units.reset_movement(&map, &ruleset, 0).unwrap();
        assert_eq!(
            units.unit(id).unwrap().health,
            40 + conf::FIELD_HEAL + conf::TERRITORY_HEAL
        );
    }

    #[test]
    fn test_load_clamps_movement() {
        let (mut map, ruleset, mut units) = setup();
        let type_def = ruleset.unit_type("warriors").unwrap();

        let mut corrupted = Unit::new(UnitId::new(9), 0, type_def, Location::new(1, 1), 1);
        corrupted.movement_left = 999;

        units
            .load_units(&mut map, &ruleset, vec![corrupted])
            .unwrap();

        let unit = units.unit(UnitId::new(9)).unwrap();
        assert_eq!(unit.movement_left, 3);

        // The id counter moved past the loaded id
        let fresh = units
            .create(&mut map, &ruleset, 0, "warriors", Location::new(3, 3), 1)
            .unwrap();
        assert!(fresh > UnitId::new(9));
    }
}

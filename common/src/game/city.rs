//! City lifecycle: founding, worked tiles, yields, growth, and production.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    conf,
    game::{
        error::{GameError, GameResult},
        map::MapState,
        player::Government,
        unit::UnitManager,
        PlayerId,
    },
    ruleset::{BuildingEffect, Ruleset},
    util::Location,
};

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct CityId(u64);

impl CityId {
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

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionKind {
    Unit,
    Building,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Production {
    pub kind: ProductionKind,
    pub id: String,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct CityYields {
    pub food: u32,
    pub production: u32,
    pub science: u32,
    pub gold: u32,
    pub culture: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct City {
    pub id: CityId,
    pub owner: PlayerId,
    pub name: String,
    pub loc: Location,
    pub population: u32,
    pub food_stock: u32,
    pub production_stock: u32,
    pub current_production: Option<Production>,
    pub buildings: BTreeSet<String>,
    /// Tiles worked by citizens; always contains the city center
    pub worked_tiles: BTreeSet<Location>,
    pub yields: CityYields,
    pub founded_turn: u32,
    pub is_capital: bool,
}

/// What happened to cities during a turn; surfaced as progress detail
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum CityTurnEvent {
    Grew { city: CityId, population: u32 },
    CompletedUnit { city: CityId, unit_type: String },
    CompletedBuilding { city: CityId, building: String },
    ProductionBlocked { city: CityId },
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CityManager {
    cities: BTreeMap<CityId, City>,
    next_id: CityId,
}

impl CityManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn city(&self, id: CityId) -> Option<&City> {
        self.cities.get(&id)
    }

    fn city_or_err(&self, id: CityId) -> GameResult<&City> {
        self.cities.get(&id).ok_or(GameError::UnknownId {
            kind: "city",
            id: id.value().to_string(),
        })
    }

    pub fn player_city(&self, player: PlayerId, id: CityId) -> GameResult<&City> {
        let city = self.city_or_err(id)?;
        if city.owner != player {
            return Err(GameError::UnknownId {
                kind: "city",
                id: id.value().to_string(),
            });
        }
        Ok(city)
    }

    pub fn cities(&self) -> impl Iterator<Item = &City> {
        self.cities.values()
    }

    pub fn player_cities(&self, player: PlayerId) -> impl Iterator<Item = &City> {
        self.cities.values().filter(move |c| c.owner == player)
    }

    pub fn city_at(&self, loc: Location) -> Option<&City> {
        self.cities.values().find(|c| c.loc == loc)
    }

    fn tile_worked(&self, loc: Location) -> bool {
        self.cities.values().any(|c| c.worked_tiles.contains(&loc))
    }

    /// Found a city for `player` at `loc`.
    ///
    /// The founder unit itself is consumed by the caller; this validates the
    /// position (land, unoccupied, on the founder's home continent, and at
    /// least the minimum distance from every other city) and creates the
    /// city with its center worked.
    pub fn found_city(
        &mut self,
        map: &mut MapState,
        ruleset: &Ruleset,
        player: PlayerId,
        name: &str,
        loc: Location,
        turn: u32,
        government: Government,
    ) -> GameResult<CityId> {
        let tile = map
            .tile(loc)
            .ok_or(GameError::InvalidFounderPosition { loc })?;
        if !tile.terrain.is_land() || tile.city_id.is_some() {
            return Err(GameError::InvalidFounderPosition { loc });
        }

        // Cities stay on the continent their civilization started on
        if let Some(start) = map.starting_position(player) {
            let start_continent = map.tile(start).map(|t| t.continent_id).unwrap_or(0);
            if start_continent != 0 && tile.continent_id != start_continent {
                return Err(GameError::InvalidFounderPosition { loc });
            }
        }

        if self
            .cities
            .values()
            .any(|c| map.distance(c.loc, loc) < conf::CITY_MIN_DISTANCE)
        {
            return Err(GameError::CityTooClose { loc });
        }

        let id = self.next_id;
        self.next_id = self.next_id.next();

        let is_capital = self.player_cities(player).next().is_none();
        let mut buildings = BTreeSet::new();
        if is_capital {
            buildings.insert("palace".to_owned());
        }

        let mut city = City {
            id,
            owner: player,
            name: name.to_owned(),
            loc,
            population: 1,
            food_stock: 0,
            production_stock: 0,
            current_production: None,
            buildings,
            worked_tiles: BTreeSet::from([loc]),
            yields: CityYields::default(),
            founded_turn: turn,
            is_capital,
        };
        Self::refresh(&mut city, map, ruleset, government);

        map.set_city(loc, id)?;
        map.claim_territory(loc, conf::CITY_WORK_RADIUS as u16, player);
        self.cities.insert(id, city);

        Ok(id)
    }

    /// Set what a city is producing
    pub fn set_production(
        &mut self,
        ruleset: &Ruleset,
        player: PlayerId,
        city_id: CityId,
        id: &str,
        kind: ProductionKind,
    ) -> GameResult<()> {
        let city = self.player_city(player, city_id)?;
        match kind {
            ProductionKind::Unit => {
                ruleset.unit_type(id)?;
            }
            ProductionKind::Building => {
                ruleset.building(id)?;
                if city.buildings.contains(id) {
                    return Err(GameError::BuildingAlreadyPresent {
                        building: id.to_owned(),
                    });
                }
            }
        }

        let city = self.cities.get_mut(&city_id).unwrap();
        city.current_production = Some(Production {
            kind,
            id: id.to_owned(),
        });
        Ok(())
    }

    /// Recompute a city's per-turn yields from its worked tiles, building
    /// effects, and government
    pub fn refresh_city(
        &mut self,
        id: CityId,
        map: &MapState,
        ruleset: &Ruleset,
        government: Government,
    ) -> GameResult<()> {
        self.city_or_err(id)?;
        let mut city = self.cities.remove(&id).unwrap();
        Self::refresh(&mut city, map, ruleset, government);
        self.cities.insert(id, city);
        Ok(())
    }

    fn refresh(city: &mut City, map: &MapState, ruleset: &Ruleset, government: Government) {
        let mut food = 0u32;
        let mut shields = 0u32;
        let mut trade = 0u32;

        for loc in &city.worked_tiles {
            let Some(tile) = map.tile(*loc) else { continue };
            let (f, s, t) = tile.yields();
            food += government.tile_yield(f);
            shields += government.tile_yield(s);
            trade += government.trade_bonus(government.tile_yield(t));
        }

        // Every city contributes one bulb on its own; trade splits evenly
        // between science and gold, science taking the odd point
        let mut science = 1 + trade.div_ceil(2);
        let mut gold = trade / 2;
        let mut culture = 1u32;

        // Building bonuses are multiplicative, one factor per building
        for building_id in &city.buildings {
            let Ok(building) = ruleset.building(building_id) else {
                continue;
            };
            for effect in &building.effects {
                match effect {
                    BuildingEffect::SciencePct(pct) => {
                        science = science * (100 + u32::from(*pct)) / 100;
                    }
                    BuildingEffect::GoldPct(pct) => {
                        gold = gold * (100 + u32::from(*pct)) / 100;
                    }
                    BuildingEffect::FoodPct(pct) => {
                        food = food * (100 + u32::from(*pct)) / 100;
                    }
                    BuildingEffect::CulturePerTurn(c) => {
                        culture += c;
                    }
                    BuildingEffect::DefensePct(_) => {}
                }
            }
        }

        city.yields = CityYields {
            food,
            production: shields,
            science,
            gold,
            culture,
        };
    }

    /// Defense bonus garrisoned units enjoy from the city's buildings
    pub fn garrison_defense_pct(&self, ruleset: &Ruleset, loc: Location) -> u16 {
        let Some(city) = self.city_at(loc) else {
            return 0;
        };
        city.buildings
            .iter()
            .filter_map(|b| ruleset.building(b).ok())
            .flat_map(|b| b.effects.iter())
            .map(|e| match e {
                BuildingEffect::DefensePct(pct) => *pct,
                _ => 0,
            })
            .sum()
    }

    /// Pick the best unworked tile in the city's working radius for a new
    /// citizen
    fn assign_working_tile(&mut self, id: CityId, map: &MapState) {
        let city = &self.cities[&id];
        let center = city.loc;

        let mut best: Option<(u32, Location)> = None;
        for loc in map.visible_tiles(center, conf::CITY_WORK_RADIUS as u16) {
            if self.tile_worked(loc) {
                continue;
            }
            let Some(tile) = map.tile(loc) else { continue };
            let quality = tile.quality();
            // Ties break toward the lower location for determinism
            if best.map_or(true, |(q, l)| quality > q || (quality == q && loc < l)) {
                best = Some((quality, loc));
            }
        }

        if let Some((_, loc)) = best {
            self.cities.get_mut(&id).unwrap().worked_tiles.insert(loc);
        }
    }

    /// Advance one city by a turn: food growth, then production
    pub fn process_city_turn(
        &mut self,
        id: CityId,
        map: &mut MapState,
        ruleset: &Ruleset,
        units: &mut UnitManager,
        government: Government,
        turn: u32,
    ) -> GameResult<Vec<CityTurnEvent>> {
        self.city_or_err(id)?;
        self.refresh_city(id, map, ruleset, government)?;

        let mut events = Vec::new();

        // Growth
        {
            let city = self.cities.get_mut(&id).unwrap();
            city.food_stock += city.yields.food;
            let threshold = conf::GROWTH_FOOD_PER_POP * city.population;
            if city.food_stock >= threshold {
                city.population += 1;
                city.food_stock -= threshold;
                let population = city.population;
                self.assign_working_tile(id, map);
                events.push(CityTurnEvent::Grew {
                    city: id,
                    population,
                });
            }
        }

        // Production
        let (owner, loc, stocked, producing) = {
            let city = self.cities.get_mut(&id).unwrap();
            city.production_stock += city.yields.production;
            (
                city.owner,
                city.loc,
                city.production_stock,
                city.current_production.clone(),
            )
        };

        if let Some(production) = producing {
            let cost = match production.kind {
                ProductionKind::Unit => ruleset.unit_type(&production.id)?.cost,
                ProductionKind::Building => ruleset.building(&production.id)?.cost,
            };

            if stocked >= cost {
                match production.kind {
                    ProductionKind::Unit => {
                        match self.spawn_unit(map, ruleset, units, owner, &production.id, loc, turn)
                        {
                            Some(_) => {
                                let city = self.cities.get_mut(&id).unwrap();
                                city.current_production = None;
                                city.production_stock = 0;
                                events.push(CityTurnEvent::CompletedUnit {
                                    city: id,
                                    unit_type: production.id,
                                });
                            }
                            // Nowhere to stand: production waits
                            None => events.push(CityTurnEvent::ProductionBlocked { city: id }),
                        }
                    }
                    ProductionKind::Building => {
                        let city = self.cities.get_mut(&id).unwrap();
                        city.buildings.insert(production.id.clone());
                        city.current_production = None;
                        city.production_stock = 0;
                        events.push(CityTurnEvent::CompletedBuilding {
                            city: id,
                            building: production.id,
                        });
                    }
                }
                self.refresh_city(id, map, ruleset, government)?;
            }
        }

        Ok(events)
    }

    /// Spawn a produced unit at the city, or on the nearest free adjacent
    /// tile when civilian stacking blocks the center
    fn spawn_unit(
        &self,
        map: &mut MapState,
        ruleset: &Ruleset,
        units: &mut UnitManager,
        owner: PlayerId,
        type_id: &str,
        loc: Location,
        turn: u32,
    ) -> Option<crate::game::unit::UnitId> {
        match units.create(map, ruleset, owner, type_id, loc, turn) {
            Ok(id) => Some(id),
            Err(GameError::CivilianStackingForbidden { .. }) => {
                for adjacent in map.neighbors(loc) {
                    if let Ok(id) = units.create(map, ruleset, owner, type_id, adjacent, turn) {
                        return Some(id);
                    }
                }
                None
            }
            Err(_) => None,
        }
    }

    /// Advance every city, in stable id order
    pub fn process_all_cities_turn(
        &mut self,
        map: &mut MapState,
        ruleset: &Ruleset,
        units: &mut UnitManager,
        governments: &BTreeMap<PlayerId, Government>,
        turn: u32,
    ) -> GameResult<Vec<CityTurnEvent>> {
        let ids: Vec<CityId> = self.cities.keys().copied().collect();
        let mut events = Vec::new();
        for id in ids {
            let government = self
                .cities
                .get(&id)
                .and_then(|c| governments.get(&c.owner).copied())
                .unwrap_or_default();
            events.extend(self.process_city_turn(id, map, ruleset, units, government, turn)?);
        }
        Ok(events)
    }

    /// Rehydrate cities from persistence
    pub fn load_cities(&mut self, map: &mut MapState, cities: Vec<City>) -> GameResult<()> {
        for city in cities {
            if self.next_id <= city.id {
                self.next_id = city.id.next();
            }
            map.set_city(city.loc, city.id)?;
            self.cities.insert(city.id, city);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    fn setup() -> (MapState, Arc<Ruleset>, CityManager, UnitManager) {
        let map = MapState::try_from(
            "~~~~~~~~\n\
             ~......~\n\
             ~......~\n\
             ~......~\n\
             ~......~\n\
             ~~~~~~~~",
        )
        .unwrap();
        let ruleset = Ruleset::load("classic").unwrap();
        (map, ruleset, CityManager::new(), UnitManager::new())
    }

    #[test]
    fn test_found_city_and_min_distance() {
        let (mut map, ruleset, mut cities, _) = setup();

        let id = cities
            .found_city(
                &mut map,
                &ruleset,
                0,
                "Alpha",
                Location::new(2, 2),
                1,
                Government::Despotism,
            )
            .unwrap();

        let city = cities.city(id).unwrap();
        assert_eq!(city.population, 1);
        assert!(city.is_capital);
        assert!(city.buildings.contains("palace"));
        assert!(city.worked_tiles.contains(&Location::new(2, 2)));
        assert_eq!(map.tile(Location::new(2, 2)).unwrap().city_id, Some(id));

        // Adjacent founding violates the minimum distance
        let err = cities
            .found_city(
                &mut map,
                &ruleset,
                0,
                "Beta",
                Location::new(3, 2),
                1,
                Government::Despotism,
            )
            .unwrap_err();
        assert_eq!(err.code(), "CityTooClose");
        assert_eq!(cities.player_cities(0).count(), 1);

        // Two steps away is legal, and is no longer the capital
        let second = cities
            .found_city(
                &mut map,
                &ruleset,
                0,
                "Beta",
                Location::new(4, 2),
                1,
                Government::Despotism,
            )
            .unwrap();
        assert!(!cities.city(second).unwrap().is_capital);
        assert!(!cities.city(second).unwrap().buildings.contains("palace"));
    }

    #[test]
    fn test_found_city_on_ocean_fails() {
        let (mut map, ruleset, mut cities, _) = setup();
        let err = cities
            .found_city(
                &mut map,
                &ruleset,
                0,
                "Atlantis",
                Location::new(0, 0),
                1,
                Government::Despotism,
            )
            .unwrap_err();
        assert_eq!(err.code(), "InvalidFounderPosition");
    }

    #[test]
    fn test_set_production_validation() {
        let (mut map, ruleset, mut cities, _) = setup();
        let id = cities
            .found_city(
                &mut map,
                &ruleset,
                0,
                "Alpha",
                Location::new(2, 2),
                1,
                Government::Despotism,
            )
            .unwrap();

        cities
            .set_production(&ruleset, 0, id, "warriors", ProductionKind::Unit)
            .unwrap();

        let err = cities
            .set_production(&ruleset, 0, id, "palace", ProductionKind::Building)
            .unwrap_err();
        assert_eq!(err.code(), "BuildingAlreadyPresent");

        let err = cities
            .set_production(&ruleset, 0, id, "ziggurat", ProductionKind::Building)
            .unwrap_err();
        assert_eq!(err.code(), "UnknownId");

        // Another player's city is invisible to the caller
        let err = cities
            .set_production(&ruleset, 1, id, "warriors", ProductionKind::Unit)
            .unwrap_err();
        assert_eq!(err.code(), "UnknownId");
    }

    #[test]
    fn test_production_completes_into_unit() {
        let (mut map, ruleset, mut cities, mut units) = setup();
        let id = cities
            .found_city(
                &mut map,
                &ruleset,
                0,
                "Alpha",
                Location::new(2, 2),
                1,
                Government::Despotism,
            )
            .unwrap();
        cities
            .set_production(&ruleset, 0, id, "warriors", ProductionKind::Unit)
            .unwrap();

        // Stock everything but the final shield, then let a turn close it out
        let cost = ruleset.unit_type("warriors").unwrap().cost;
        {
            let city = cities.cities.get_mut(&id).unwrap();
            city.production_stock = cost;
        }

        let events = cities
            .process_city_turn(id, &mut map, &ruleset, &mut units, Government::Despotism, 2)
            .unwrap();

        assert!(events
            .iter()
            .any(|e| matches!(e, CityTurnEvent::CompletedUnit { .. })));
        assert_eq!(units.player_units(0).count(), 1);
        assert_eq!(units.player_units(0).next().unwrap().loc, Location::new(2, 2));

        let city = cities.city(id).unwrap();
        assert_eq!(city.current_production, None);
        assert_eq!(city.production_stock, 0);
    }

    #[test]
    fn test_civilian_production_spills_to_adjacent() {
        let (mut map, ruleset, mut cities, mut units) = setup();
        let center = Location::new(2, 2);
        let id = cities
            .found_city(
                &mut map,
                &ruleset,
                0,
                "Alpha",
                center,
                1,
                Government::Despotism,
            )
            .unwrap();

        // A settler already garrisons the center
        units
            .create(&mut map, &ruleset, 0, "settlers", center, 1)
            .unwrap();

        cities
            .set_production(&ruleset, 0, id, "workers", ProductionKind::Unit)
            .unwrap();
        cities.cities.get_mut(&id).unwrap().production_stock =
            ruleset.unit_type("workers").unwrap().cost;

        cities
            .process_city_turn(id, &mut map, &ruleset, &mut units, Government::Despotism, 2)
            .unwrap();

        let worker = units
            .player_units(0)
            .find(|u| u.type_id == "workers")
            .unwrap();
        assert_ne!(worker.loc, center);
        assert_eq!(map.distance(worker.loc, center), 1);
    }

    #[test]
    fn test_growth() {
        let (mut map, ruleset, mut cities, mut units) = setup();
        let id = cities
            .found_city(
                &mut map,
                &ruleset,
                0,
                "Alpha",
                Location::new(2, 2),
                1,
                Government::Despotism,
            )
            .unwrap();

        // Grassland center yields 2 food; growth at 2 * population
        let events = cities
            .process_city_turn(id, &mut map, &ruleset, &mut units, Government::Despotism, 2)
            .unwrap();

        assert!(events
            .iter()
            .any(|e| matches!(e, CityTurnEvent::Grew { population: 2, .. })));

        let city = cities.city(id).unwrap();
        assert_eq!(city.population, 2);
        assert_eq!(city.worked_tiles.len(), 2);
    }

    #[test]
    fn test_library_boosts_science() {
        let (mut map, ruleset, mut cities, _) = setup();
        let id = cities
            .found_city(
                &mut map,
                &ruleset,
                0,
                "Alpha",
                Location::new(2, 2),
                1,
                Government::Despotism,
            )
            .unwrap();

        // Work a river tile so there's trade to multiply
        map.tile_mut(Location::new(3, 3)).unwrap().river_mask = 1;
        cities
            .cities
            .get_mut(&id)
            .unwrap()
            .worked_tiles
            .insert(Location::new(3, 3));

        cities
            .refresh_city(id, &map, &ruleset, Government::Despotism)
            .unwrap();
        let before = cities.city(id).unwrap().yields.science;

        cities
            .cities
            .get_mut(&id)
            .unwrap()
            .buildings
            .insert("library".to_owned());
        cities
            .refresh_city(id, &map, &ruleset, Government::Despotism)
            .unwrap();
        let after = cities.city(id).unwrap().yields.science;

        assert_eq!(after, before * 3 / 2);
        assert!(after > 0);
    }
}

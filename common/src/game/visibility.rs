//! Per-player fog of war.
//!
//! Each player carries two bit sets over the map: `explored` is sticky for
//! the life of the game, `visible` is recomputed from the player's units and
//! cities every turn. Everything a client is shown flows through
//! `player_map_view`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    conf,
    game::{
        city::{CityId, CityManager},
        map::{Improvement, MapState, Resource, Terrain},
        unit::{UnitId, UnitManager},
        PlayerId,
    },
    ruleset::Ruleset,
    util::{Dims, Location},
};

/// A dense bit set over the map's tiles
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct BitGrid {
    dims: Dims,
    words: Vec<u64>,
}

impl BitGrid {
    pub fn new(dims: Dims) -> Self {
        let words = (dims.area() as usize).div_ceil(64);
        Self {
            dims,
            words: vec![0; words],
        }
    }

    pub fn get(&self, loc: Location) -> bool {
        if !self.dims.contain(loc) {
            return false;
        }
        let idx = self.dims.index(loc);
        self.words[idx / 64] & (1 << (idx % 64)) != 0
    }

    pub fn set(&mut self, loc: Location) {
        if self.dims.contain(loc) {
            let idx = self.dims.index(loc);
            self.words[idx / 64] |= 1 << (idx % 64);
        }
    }

    pub fn clear_all(&mut self) {
        self.words.fill(0);
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

/// Snapshot of one tile as a particular player knows it
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TileView {
    pub x: u16,
    pub y: u16,
    pub terrain: Terrain,
    pub elevation: u8,
    pub river_mask: u8,
    pub continent_id: u16,
    pub resource: Option<Resource>,
    pub improvements: Vec<Improvement>,
    pub visible: bool,
    /// Live occupancy, only populated for currently-visible tiles
    pub city_id: Option<CityId>,
    pub unit_ids: Vec<UnitId>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct VisibilityManager {
    explored: BTreeMap<PlayerId, BitGrid>,
    visible: BTreeMap<PlayerId, BitGrid>,
}

impl VisibilityManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_player(&mut self, player: PlayerId, dims: Dims) {
        self.explored
            .entry(player)
            .or_insert_with(|| BitGrid::new(dims));
        self.visible
            .entry(player)
            .or_insert_with(|| BitGrid::new(dims));
    }

    pub fn is_visible(&self, player: PlayerId, loc: Location) -> bool {
        self.visible.get(&player).map(|g| g.get(loc)).unwrap_or(false)
    }

    pub fn is_explored(&self, player: PlayerId, loc: Location) -> bool {
        self.explored
            .get(&player)
            .map(|g| g.get(loc))
            .unwrap_or(false)
    }

    /// Recompute current sight for `player` from every unit and city they
    /// own. Sight is a Chebyshev disc: the unit type's radius, or the fixed
    /// city radius. Everything seen is also explored, permanently.
    pub fn update_player_visibility(
        &mut self,
        player: PlayerId,
        map: &MapState,
        units: &UnitManager,
        cities: &CityManager,
        ruleset: &Ruleset,
    ) {
        self.ensure_player(player, map.dims());

        let mut discs: Vec<(Location, u16)> = Vec::new();
        for unit in units.player_units(player) {
            let sight = ruleset
                .unit_type(&unit.type_id)
                .map(|t| t.sight)
                .unwrap_or(1);
            discs.push((unit.loc, sight));
        }
        for city in cities.player_cities(player) {
            discs.push((city.loc, conf::CITY_SIGHT_RADIUS));
        }

        let visible = self.visible.get_mut(&player).unwrap();
        visible.clear_all();
        let explored = self.explored.get_mut(&player).unwrap();

        for (center, radius) in discs {
            for loc in map.visible_tiles(center, radius) {
                visible.set(loc);
                explored.set(loc);
            }
        }
    }

    /// Everything `player` knows about the map: full tile data for explored
    /// tiles, live unit and city occupancy only where currently visible
    pub fn player_map_view(
        &self,
        player: PlayerId,
        map: &MapState,
        _units: &UnitManager,
        _cities: &CityManager,
    ) -> Vec<TileView> {
        let mut views = Vec::new();
        for (loc, tile) in map.iter_tiles() {
            if !self.is_explored(player, loc) {
                continue;
            }
            let visible = self.is_visible(player, loc);
            views.push(TileView {
                x: loc.x,
                y: loc.y,
                terrain: tile.terrain,
                elevation: tile.elevation,
                river_mask: tile.river_mask,
                continent_id: tile.continent_id,
                resource: tile.resource,
                improvements: tile.improvements.iter().copied().collect(),
                visible,
                city_id: if visible { tile.city_id } else { None },
                unit_ids: if visible {
                    tile.unit_ids.clone()
                } else {
                    Vec::new()
                },
            });
        }
        views
    }

    pub fn explored_count(&self, player: PlayerId) -> usize {
        self.explored.get(&player).map(BitGrid::count).unwrap_or(0)
    }

    pub fn load_player(&mut self, player: PlayerId, explored: BitGrid, visible: BitGrid) {
        self.explored.insert(player, explored);
        self.visible.insert(player, visible);
    }

    pub fn explored_grid(&self, player: PlayerId) -> Option<&BitGrid> {
        self.explored.get(&player)
    }

    pub fn visible_grid(&self, player: PlayerId) -> Option<&BitGrid> {
        self.visible.get(&player)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    fn setup() -> (MapState, Arc<Ruleset>, UnitManager, CityManager, VisibilityManager) {
        let map = MapState::try_from(
            "~~~~~~~~~~~~\n\
             ~..........~\n\
             ~..........~\n\
             ~..........~\n\
             ~..........~\n\
             ~..........~\n\
             ~..........~\n\
             ~~~~~~~~~~~~",
        )
        .unwrap();
        let ruleset = Ruleset::load("classic").unwrap();
        (
            map,
            ruleset,
            UnitManager::new(),
            CityManager::new(),
            VisibilityManager::new(),
        )
    }

    #[test]
    fn test_fresh_map_is_dark() {
        let (map, _ruleset, units, cities, mut visibility) = setup();
        visibility.ensure_player(0, map.dims());

        for loc in map.iter_locs() {
            assert!(!visibility.is_visible(0, loc));
            assert!(!visibility.is_explored(0, loc));
        }
        assert!(visibility.player_map_view(0, &map, &units, &cities).is_empty());
    }

    #[test]
    fn test_unit_sight_disc() {
        let (mut map, ruleset, mut units, cities, mut visibility) = setup();
        let center = Location::new(5, 4);
        units
            .create(&mut map, &ruleset, 0, "warriors", center, 1)
            .unwrap();

        visibility.update_player_visibility(0, &map, &units, &cities, &ruleset);

        let sight = ruleset.unit_type("warriors").unwrap().sight;
        for loc in map.iter_locs() {
            let inside = center.distance(loc) <= u32::from(sight);
            assert_eq!(visibility.is_visible(0, loc), inside, "visible at {loc}");
            assert_eq!(visibility.is_explored(0, loc), inside, "explored at {loc}");
        }

        // Another player still sees nothing
        assert!(!visibility.is_visible(1, center));
    }

    #[test]
    fn test_explored_is_sticky_visible_is_not() {
        let (mut map, ruleset, mut units, cities, mut visibility) = setup();
        let start = Location::new(2, 2);
        let id = units
            .create(&mut map, &ruleset, 0, "horsemen", start, 1)
            .unwrap();
        visibility.update_player_visibility(0, &map, &units, &cities, &ruleset);

        let far_corner = Location::new(10, 6);
        assert!(!visibility.is_explored(0, far_corner));

        // March east and look again
        units
            .move_unit(&mut map, &ruleset, 0, id, Location::new(3, 2))
            .unwrap();
        units
            .move_unit(&mut map, &ruleset, 0, id, Location::new(4, 2))
            .unwrap();
        visibility.update_player_visibility(0, &map, &units, &cities, &ruleset);

        // The west edge fell out of sight but stays explored
        let west = Location::new(1, 1);
        assert!(!visibility.is_visible(0, west));
        assert!(visibility.is_explored(0, west));

        // Invariant: visible implies explored
        for loc in map.iter_locs() {
            if visibility.is_visible(0, loc) {
                assert!(visibility.is_explored(0, loc));
            }
        }
    }

    #[test]
    fn test_map_view_hides_unseen_occupancy() {
        let (mut map, ruleset, mut units, cities, mut visibility) = setup();
        let scout = units
            .create(&mut map, &ruleset, 0, "warriors", Location::new(2, 2), 1)
            .unwrap();
        visibility.update_player_visibility(0, &map, &units, &cities, &ruleset);

        // An enemy stands inside our sight radius
        let enemy = units
            .create(&mut map, &ruleset, 1, "warriors", Location::new(3, 3), 1)
            .unwrap();

        let view = visibility.player_map_view(0, &map, &units, &cities);
        let seen_tile = view.iter().find(|v| v.x == 3 && v.y == 3).unwrap();
        assert!(seen_tile.visible);
        assert!(seen_tile.unit_ids.contains(&enemy));

        // March the scout east until (3,3) is explored-but-dark
        while units.unit(scout).unwrap().loc.x < 9 {
            units.reset_movement(&map, &ruleset, 0).unwrap();
            let cur = units.unit(scout).unwrap().loc;
            units
                .move_unit(&mut map, &ruleset, 0, scout, Location::new(cur.x + 1, cur.y))
                .unwrap();
        }
        visibility.update_player_visibility(0, &map, &units, &cities, &ruleset);

        let view = visibility.player_map_view(0, &map, &units, &cities);
        let dark_tile = view.iter().find(|v| v.x == 3 && v.y == 3).unwrap();
        assert!(!dark_tile.visible);
        assert!(dark_tile.unit_ids.is_empty());
    }

    #[test]
    fn test_city_sight() {
        let (mut map, ruleset, units, mut cities, mut visibility) = setup();
        cities
            .found_city(
                &mut map,
                &ruleset,
                0,
                "Watchtower",
                Location::new(6, 3),
                1,
                crate::game::player::Government::Despotism,
            )
            .unwrap();

        visibility.update_player_visibility(0, &map, &units, &cities, &ruleset);
        assert!(visibility.is_visible(0, Location::new(6 + conf::CITY_SIGHT_RADIUS, 3)));
        assert!(!visibility.is_visible(
            0,
            Location::new(6 + conf::CITY_SIGHT_RADIUS + 1, 3)
        ));
    }
}

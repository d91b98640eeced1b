//! Map representation
//!
//! The tile grid a game plays out on, plus the generator that builds it.
//! Tiles reference units and cities by id only; the managers own the
//! entities themselves.

pub mod gen;
pub(in crate::game) mod grid;
pub mod terrain;
pub mod tile;

pub use self::gen::{GenParams, Generator};
pub use self::grid::LocationGrid;
pub use self::terrain::{Resource, Terrain};
pub use self::tile::{Improvement, Tile};

use serde::{Deserialize, Serialize};

use crate::{
    game::{city::CityId, error::GameError, unit::UnitId, GameResult, PlayerId},
    util::{Dims, Location, Vec2d, Wrap},
};

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct StartingPosition {
    pub loc: Location,
    pub player: PlayerId,
}

/// The runtime store of tiles for one game.
///
/// Created once by the generator; afterwards mutated only by improvements,
/// city founding, unit movement, and territory claims.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MapState {
    tiles: LocationGrid<Tile>,
    wrap: Wrap,

    /// Elevation threshold separating the ocean family from land
    shore_level: u8,

    generator: Generator,
    seed: String,

    starting_positions: Vec<StartingPosition>,
}

impl MapState {
    pub fn new(
        tiles: LocationGrid<Tile>,
        wrap: Wrap,
        shore_level: u8,
        generator: Generator,
        seed: String,
        starting_positions: Vec<StartingPosition>,
    ) -> Self {
        Self {
            tiles,
            wrap,
            shore_level,
            generator,
            seed,
            starting_positions,
        }
    }

    pub fn dims(&self) -> Dims {
        self.tiles.dims()
    }

    pub fn wrap(&self) -> Wrap {
        self.wrap
    }

    pub fn shore_level(&self) -> u8 {
        self.shore_level
    }

    pub fn generator(&self) -> Generator {
        self.generator
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    pub fn starting_positions(&self) -> &[StartingPosition] {
        &self.starting_positions
    }

    pub fn starting_position(&self, player: PlayerId) -> Option<Location> {
        self.starting_positions
            .iter()
            .find(|sp| sp.player == player)
            .map(|sp| sp.loc)
    }

    pub fn tile(&self, loc: Location) -> Option<&Tile> {
        self.tiles.get(loc)
    }

    pub fn tile_mut(&mut self, loc: Location) -> Option<&mut Tile> {
        self.tiles.get_mut(loc)
    }

    fn tile_mut_or_err(&mut self, loc: Location) -> GameResult<&mut Tile> {
        let dims = self.dims();
        self.tiles
            .get_mut(loc)
            .ok_or(GameError::OutOfBounds { loc, dims })
    }

    pub fn iter_locs(&self) -> impl Iterator<Item = Location> {
        self.tiles.iter_locs()
    }

    pub fn iter_tiles(&self) -> impl Iterator<Item = (Location, &Tile)> {
        self.tiles.iter_locs().map(move |loc| (loc, &self.tiles[loc]))
    }

    /// Up to eight adjacent locations; x wraps when the map does
    pub fn neighbors(&self, loc: Location) -> Vec<Location> {
        let dims = self.dims();
        crate::util::Direction::values()
            .into_iter()
            .filter_map(|d| loc.shift(d.vec2d(), dims, self.wrap))
            .collect()
    }

    pub fn neighbor(&self, loc: Location, dir: crate::util::Direction) -> Option<Location> {
        loc.shift(dir.vec2d(), self.dims(), self.wrap)
    }

    /// Chebyshev distance respecting horizontal wrap
    pub fn distance(&self, a: Location, b: Location) -> u32 {
        let dy = (i32::from(a.y) - i32::from(b.y)).unsigned_abs();
        let mut dx = (i32::from(a.x) - i32::from(b.x)).unsigned_abs();
        if self.wrap.horiz {
            dx = dx.min(u32::from(self.dims().width) - dx);
        }
        dx.max(dy)
    }

    /// All in-bounds locations within Chebyshev radius `r` of `center`,
    /// the center included
    pub fn visible_tiles(&self, center: Location, r: u16) -> Vec<Location> {
        let r = i32::from(r);
        let mut locs = Vec::new();
        for dy in -r..=r {
            for dx in -r..=r {
                if let Some(loc) = center.shift(Vec2d::new(dx, dy), self.dims(), self.wrap) {
                    locs.push(loc);
                }
            }
        }
        locs
    }

    /// Movement cost in fragments for a land unit entering `loc`; roads cut
    /// it to a single fragment
    pub fn movement_cost(&self, loc: Location) -> Option<u16> {
        let tile = self.tile(loc)?;
        let base = tile.terrain.movement_cost()?;
        if tile.has_improvement(Improvement::Road) {
            Some(1)
        } else {
            Some(base)
        }
    }

    pub fn set_resource(&mut self, loc: Location, resource: Option<Resource>) -> GameResult<()> {
        let tile = self.tile_mut_or_err(loc)?;
        if let Some(resource) = resource {
            if !resource.compatible_with(tile.terrain) {
                return Err(GameError::InvalidInput {
                    message: format!(
                        "resource {} is incompatible with {} at {}",
                        resource.id(),
                        tile.terrain,
                        loc
                    ),
                });
            }
        }
        tile.resource = resource;
        Ok(())
    }

    pub fn add_improvement(&mut self, loc: Location, improvement: Improvement) -> GameResult<()> {
        self.tile_mut_or_err(loc)?.improvements.insert(improvement);
        Ok(())
    }

    pub fn remove_improvement(&mut self, loc: Location, improvement: Improvement) -> GameResult<()> {
        self.tile_mut_or_err(loc)?.improvements.remove(&improvement);
        Ok(())
    }

    pub fn set_city(&mut self, loc: Location, city_id: CityId) -> GameResult<()> {
        let tile = self.tile_mut_or_err(loc)?;
        debug_assert!(tile.city_id.is_none());
        tile.city_id = Some(city_id);
        Ok(())
    }

    pub fn clear_city(&mut self, loc: Location) -> GameResult<Option<CityId>> {
        Ok(self.tile_mut_or_err(loc)?.city_id.take())
    }

    /// Claim territory in a radius around a city for its owner
    pub fn claim_territory(&mut self, center: Location, radius: u16, owner: PlayerId) {
        for loc in self.visible_tiles(center, radius) {
            let tile = &mut self.tiles[loc];
            if tile.owner.is_none() {
                tile.owner = Some(owner);
            }
        }
    }

    pub fn add_unit(&mut self, loc: Location, unit_id: UnitId) -> GameResult<()> {
        let tile = self.tile_mut_or_err(loc)?;
        debug_assert!(!tile.unit_ids.contains(&unit_id));
        tile.unit_ids.push(unit_id);
        Ok(())
    }

    pub fn remove_unit(&mut self, loc: Location, unit_id: UnitId) -> GameResult<()> {
        let tile = self.tile_mut_or_err(loc)?;
        tile.unit_ids.retain(|id| *id != unit_id);
        Ok(())
    }
}

/// Build a map from a multiline string, for tests.
///
/// `~` and space are ocean, `.` grassland, `,` plains, `h` hills,
/// `^` mountains, `f` forest, `d` desert. Lines must be equal length.
impl TryFrom<&str> for MapState {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, String> {
        let lines: Vec<&str> = s.lines().map(str::trim_end).filter(|l| !l.is_empty()).collect();
        if lines.is_empty() {
            return Err("empty map string".to_owned());
        }
        let width = lines[0].chars().count();
        if lines.iter().any(|l| l.chars().count() != width) {
            return Err("ragged map string".to_owned());
        }

        let dims = Dims::new(width as u16, lines.len() as u16);
        let chars: Vec<Vec<char>> = lines.iter().map(|l| l.chars().collect()).collect();

        let shore_level = 128u8;
        let tiles = LocationGrid::new(dims, |loc| {
            let terrain = match chars[loc.y as usize][loc.x as usize] {
                '~' | ' ' => Terrain::Ocean,
                '.' => Terrain::Grassland,
                ',' => Terrain::Plains,
                'h' => Terrain::Hills,
                '^' => Terrain::Mountains,
                'f' => Terrain::Forest,
                'd' => Terrain::Desert,
                c => panic!("unrecognized map character {c:?}"),
            };
            let mut tile = Tile::new(terrain);
            tile.elevation = if terrain.is_ocean() { 100 } else { 160 };
            tile.continent_id = u16::from(terrain.is_land());
            tile.temperature = terrain::temperature::TEMPERATE;
            tile.wetness = 50;
            tile
        });

        Ok(MapState::new(
            tiles,
            Wrap::NEITHER,
            shore_level,
            Generator::Fractal,
            "test".to_owned(),
            Vec::new(),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::Direction;

    fn small_map() -> MapState {
        MapState::try_from(
            "~~~~~\n\
             ~...~\n\
             ~.h.~\n\
             ~...~\n\
             ~~~~~",
        )
        .unwrap()
    }

    #[test]
    fn test_tile_bounds() {
        let map = small_map();
        assert!(map.tile(Location::new(4, 4)).is_some());
        assert!(map.tile(Location::new(5, 0)).is_none());
        assert!(map.tile(Location::new(0, 5)).is_none());
    }

    #[test]
    fn test_neighbors_no_wrap() {
        let map = small_map();
        assert_eq!(map.neighbors(Location::new(2, 2)).len(), 8);
        assert_eq!(map.neighbors(Location::new(0, 0)).len(), 3);
        assert_eq!(map.neighbors(Location::new(2, 0)).len(), 5);
        assert_eq!(
            map.neighbor(Location::new(2, 2), Direction::North),
            Some(Location::new(2, 1))
        );
        assert_eq!(map.neighbor(Location::new(0, 0), Direction::West), None);
    }

    #[test]
    fn test_visible_tiles_disc() {
        let map = small_map();
        let disc = map.visible_tiles(Location::new(2, 2), 1);
        assert_eq!(disc.len(), 9);
        let disc = map.visible_tiles(Location::new(0, 0), 1);
        assert_eq!(disc.len(), 4);
    }

    #[test]
    fn test_movement_cost_with_road() {
        let mut map = small_map();
        let hill = Location::new(2, 2);
        assert_eq!(map.movement_cost(hill), Some(6));

        map.add_improvement(hill, Improvement::Road).unwrap();
        assert_eq!(map.movement_cost(hill), Some(1));

        assert_eq!(map.movement_cost(Location::new(0, 0)), None);
    }

    #[test]
    fn test_resource_compatibility_enforced() {
        let mut map = small_map();
        let grass = Location::new(1, 1);

        assert!(map.set_resource(grass, Some(Resource::Wheat)).is_ok());
        assert!(map.set_resource(grass, Some(Resource::Oasis)).is_err());

        let out = map.set_resource(Location::new(99, 99), None);
        assert!(matches!(out, Err(GameError::OutOfBounds { .. })));
    }

    #[test]
    fn test_unit_occupancy() {
        let mut map = small_map();
        let loc = Location::new(1, 1);
        let id = UnitId::new(7);

        map.add_unit(loc, id).unwrap();
        assert_eq!(map.tile(loc).unwrap().unit_ids, vec![id]);

        map.remove_unit(loc, id).unwrap();
        assert!(map.tile(loc).unwrap().unit_ids.is_empty());
    }
}

//! Map generation
//!
//! A fixed pipeline from seed and parameters to a finished [`MapState`]:
//! height synthesis, pole flattening, shore selection, continent labelling,
//! climate, relief, terrain placement, rivers, resources, and starting
//! positions. The whole pipeline is a pure function of its inputs; two runs
//! with the same seed, parameters, and player set produce byte-identical
//! maps.

pub mod climate;
pub mod height;
pub mod resources;
pub mod rivers;
pub mod startpos;
pub mod terrain_place;

pub use resources::ResourceDensity;
pub use startpos::StartPosMode;

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{
    conf,
    game::{
        error::{GameError, GameResult},
        PlayerId,
    },
    rng::GameRng,
    util::{Dims, Location, Wrap},
};

use super::{grid::LocationGrid, MapState, Terrain, Tile};

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Generator {
    Random,
    #[default]
    Fractal,
    /// Falls back to `Random` on maps smaller than
    /// [`conf::ISLAND_MIN_DIM`] squared, or when its starting positions
    /// cannot be placed
    Island,
    Fair,
    Fracture,
}

impl Generator {
    pub fn id(self) -> &'static str {
        match self {
            Generator::Random => "random",
            Generator::Fractal => "fractal",
            Generator::Island => "island",
            Generator::Fair => "fair",
            Generator::Fracture => "fracture",
        }
    }

    pub fn from_id(id: &str) -> Option<Generator> {
        match id {
            "random" => Some(Generator::Random),
            "fractal" => Some(Generator::Fractal),
            "island" => Some(Generator::Island),
            "fair" => Some(Generator::Fair),
            "fracture" => Some(Generator::Fracture),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Landmass {
    Sparse,
    #[default]
    Normal,
    Dense,
}

impl Landmass {
    pub fn id(self) -> &'static str {
        match self {
            Landmass::Sparse => "sparse",
            Landmass::Normal => "normal",
            Landmass::Dense => "dense",
        }
    }

    pub fn from_id(id: &str) -> Option<Landmass> {
        match id {
            "sparse" => Some(Landmass::Sparse),
            "normal" => Some(Landmass::Normal),
            "dense" => Some(Landmass::Dense),
            _ => None,
        }
    }

    /// Target land fraction of the map
    pub fn land_fraction(self) -> f64 {
        match self {
            Landmass::Sparse => 0.3,
            Landmass::Normal => 0.5,
            Landmass::Dense => 0.7,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GenParams {
    pub generator: Generator,
    pub landmass: Landmass,
    /// Huts per thousand tiles, 0..=50
    pub huts: u8,
    /// Climate heat knob, conventionally 35, 50, or 75
    pub temperature: u8,
    pub wetness: u8,
    pub rivers: u8,
    pub resources: ResourceDensity,
    pub startpos: StartPosMode,
    pub seed: String,
    pub players: Vec<PlayerId>,
    pub wrap: Wrap,
}

impl GenParams {
    pub fn validate(&self, dims: Dims) -> GameResult<()> {
        if dims.width < 8 || dims.height < 8 {
            return Err(GameError::InvalidInput {
                message: format!("map {dims} is too small; 8x8 is the minimum"),
            });
        }
        if self.players.is_empty() {
            return Err(GameError::InvalidInput {
                message: "at least one player is required".to_owned(),
            });
        }
        if self.huts > 50 {
            return Err(GameError::InvalidInput {
                message: format!("huts={} exceeds the maximum of 50", self.huts),
            });
        }
        for (name, v) in [
            ("temperature", self.temperature),
            ("wetness", self.wetness),
            ("rivers", self.rivers),
        ] {
            if v == 0 || v > 100 {
                return Err(GameError::InvalidInput {
                    message: format!("{name}={v} is outside 1..=100"),
                });
            }
        }
        Ok(())
    }
}

/// Generate a map. Retries with re-seeded substreams when validation fails;
/// the island generator falls back to random height synthesis rather than
/// fail, while the fair generator reports `MapGenerationFailed`.
pub fn generate(dims: Dims, params: &GenParams) -> GameResult<MapState> {
    params.validate(dims)?;

    let mut generator = params.generator;
    if generator == Generator::Island && dims.width.min(dims.height) < conf::ISLAND_MIN_DIM {
        generator = Generator::Random;
    }

    let root = GameRng::from_seed_str(&params.seed);
    let mut last_err = None;

    for attempt in 0..conf::MAPGEN_ATTEMPTS {
        let rng = root.substream(&format!("attempt-{attempt}"));
        match build(dims, params, generator, &rng).and_then(|map| {
            validate_map(&map, params)?;
            Ok(map)
        }) {
            Ok(map) => return Ok(map),
            Err(err) => {
                // Island degrades to random synthesis; fair never does, it
                // reports failure once the attempts run out
                if generator == Generator::Island {
                    generator = Generator::Random;
                }
                last_err = Some(err);
            }
        }
    }

    Err(last_err.unwrap_or(GameError::MapGenerationFailed {
        reason: "generation attempts exhausted".to_owned(),
    }))
}

fn build(
    dims: Dims,
    params: &GenParams,
    generator: Generator,
    root: &GameRng,
) -> GameResult<MapState> {
    let mut height_rng = root.substream("height");
    let mut hmap = match generator {
        Generator::Random => height::random(dims, &mut height_rng),
        Generator::Fractal => height::fractal(dims, &mut height_rng),
        Generator::Island => height::islands(dims, false, params.players.len(), &mut height_rng),
        Generator::Fair => height::islands(dims, true, params.players.len(), &mut height_rng),
        Generator::Fracture => height::fracture(dims, &mut height_rng),
    };

    height::flatten_poles(&mut hmap);

    let shore_level = pick_shore_level(&hmap, dims, params.landmass.land_fraction());
    let deep_cut = (u16::from(shore_level) * 3 / 5) as u8;

    // Water below the shore level, provisional grassland above it
    let mut tiles = LocationGrid::new(dims, |loc| {
        let elevation = hmap.elevation(loc);
        let mut tile = Tile::new(if elevation < shore_level {
            Terrain::Ocean
        } else {
            Terrain::Grassland
        });
        tile.elevation = elevation;
        tile
    });

    label_continents(&mut tiles, params.wrap);
    convert_lakes(&mut tiles, shore_level);
    classify_ocean_depth(&mut tiles, params.wrap, deep_cut);

    climate::assign_temperature(&mut tiles, shore_level, params.temperature);
    climate::assign_wetness(&mut tiles, params.wetness, &mut root.substream("wetness"));

    terrain_place::apply_relief(&mut tiles, shore_level, &mut root.substream("relief"));
    terrain_place::place_terrains(
        &mut tiles,
        shore_level,
        params.temperature,
        params.wetness,
        &mut root.substream("terrain"),
    );

    rivers::carve(
        &mut tiles,
        params.wrap,
        params.rivers,
        shore_level,
        &mut root.substream("rivers"),
    );

    resources::scatter(&mut tiles, params.resources, &mut root.substream("resources"));
    resources::scatter_huts(&mut tiles, params.huts, &mut root.substream("huts"));

    let starting_positions = startpos::assign(
        &tiles,
        params.wrap,
        params.startpos,
        &params.players,
        &mut root.substream("startpos"),
    )?;

    Ok(MapState::new(
        tiles,
        params.wrap,
        shore_level,
        params.generator,
        params.seed.clone(),
        starting_positions,
    ))
}

/// Histogram threshold hitting the requested land:ocean ratio
fn pick_shore_level(hmap: &height::HeightMap, dims: Dims, land_fraction: f64) -> u8 {
    let mut histogram = [0u32; 256];
    for loc in dims.iter_locs() {
        histogram[usize::from(hmap.elevation(loc))] += 1;
    }

    let water_target = (f64::from(dims.area()) * (1.0 - land_fraction)) as u32;
    let mut cumulative = 0u32;
    for (bucket, count) in histogram.iter().enumerate() {
        cumulative += count;
        if cumulative >= water_target {
            return (bucket as u8).saturating_add(1).clamp(16, 240);
        }
    }
    240
}

fn neighbors8(dims: Dims, wrap: Wrap, loc: Location) -> Vec<Location> {
    crate::util::Direction::values()
        .into_iter()
        .filter_map(|d| loc.shift(d.vec2d(), dims, wrap))
        .collect()
}

/// Flood-fill land into continents numbered from 1; all water keeps 0
fn label_continents(tiles: &mut LocationGrid<Tile>, wrap: Wrap) {
    let dims = tiles.dims();
    let mut next_id = 1u16;

    for start in dims.iter_locs() {
        let tile = tiles.get(start).unwrap();
        if !tile.terrain.is_land() || tile.continent_id != 0 {
            continue;
        }

        let id = next_id;
        next_id += 1;

        let mut queue = VecDeque::from([start]);
        tiles.get_mut(start).unwrap().continent_id = id;
        while let Some(loc) = queue.pop_front() {
            for nloc in neighbors8(dims, wrap, loc) {
                let ntile = tiles.get_mut(nloc).unwrap();
                if ntile.terrain.is_land() && ntile.continent_id == 0 {
                    ntile.continent_id = id;
                    queue.push_back(nloc);
                }
            }
        }
    }
}

/// Small water bodies fully enclosed by land become lakes. Their elevation
/// is lifted to the shore level so the ocean-family elevation invariant
/// keeps holding.
fn convert_lakes(tiles: &mut LocationGrid<Tile>, shore_level: u8) {
    let dims = tiles.dims();
    let mut seen = vec![false; dims.area() as usize];

    for start in dims.iter_locs() {
        if seen[dims.index(start)] || tiles.get(start).unwrap().terrain.is_land() {
            continue;
        }

        // Collect the connected water body
        let mut body = Vec::new();
        let mut touches_frame = false;
        let mut queue = VecDeque::from([start]);
        seen[dims.index(start)] = true;
        while let Some(loc) = queue.pop_front() {
            body.push(loc);
            if loc.x == 0 || loc.y == 0 || loc.x == dims.width - 1 || loc.y == dims.height - 1 {
                touches_frame = true;
            }
            for nloc in neighbors8(dims, Wrap::NEITHER, loc) {
                let idx = dims.index(nloc);
                if !seen[idx] && tiles.get(nloc).unwrap().terrain.is_water() {
                    seen[idx] = true;
                    queue.push_back(nloc);
                }
            }
        }

        if !touches_frame && body.len() <= conf::LAKE_MAX_SIZE {
            for loc in body {
                let tile = tiles.get_mut(loc).unwrap();
                tile.terrain = Terrain::Lake;
                tile.elevation = tile.elevation.max(shore_level);
            }
        }
    }
}

/// Split the remaining ocean into coast next to land, deep ocean well below
/// the shore, and plain ocean between
fn classify_ocean_depth(tiles: &mut LocationGrid<Tile>, wrap: Wrap, deep_cut: u8) {
    let dims = tiles.dims();
    let coastal: Vec<Location> = dims
        .iter_locs()
        .filter(|loc| tiles.get(*loc).unwrap().terrain == Terrain::Ocean)
        .filter(|loc| {
            neighbors8(dims, wrap, *loc)
                .into_iter()
                .any(|n| tiles.get(n).unwrap().terrain.is_land())
        })
        .collect();

    for loc in dims.iter_locs() {
        let tile = tiles.get_mut(loc).unwrap();
        if tile.terrain == Terrain::Ocean && tile.elevation < deep_cut {
            tile.terrain = Terrain::DeepOcean;
        }
    }

    for loc in coastal {
        tiles.get_mut(loc).unwrap().terrain = Terrain::Coast;
    }
}

fn validate_map(map: &MapState, params: &GenParams) -> GameResult<()> {
    let shore = map.shore_level();

    let mut continents = 0u16;
    for (loc, tile) in map.iter_tiles() {
        let below_shore = tile.elevation < shore;
        if below_shore != tile.terrain.is_ocean() {
            return Err(GameError::MapGenerationFailed {
                reason: format!(
                    "elevation {} vs terrain {} mismatch at {}",
                    tile.elevation, tile.terrain, loc
                ),
            });
        }
        if tile.terrain.is_land() && tile.continent_id == 0 {
            return Err(GameError::MapGenerationFailed {
                reason: format!("unlabelled land at {loc}"),
            });
        }
        continents = continents.max(tile.continent_id);
    }

    if continents == 0 {
        return Err(GameError::MapGenerationFailed {
            reason: "all-ocean map".to_owned(),
        });
    }

    let positions = map.starting_positions();
    if positions.len() != params.players.len() {
        return Err(GameError::MapGenerationFailed {
            reason: format!(
                "{} starting positions for {} players",
                positions.len(),
                params.players.len()
            ),
        });
    }
    for pos in positions {
        let tile = map.tile(pos.loc).ok_or(GameError::MapGenerationFailed {
            reason: format!("starting position {} out of bounds", pos.loc),
        })?;
        if !tile.terrain.is_land() {
            return Err(GameError::MapGenerationFailed {
                reason: format!("starting position {} is not on land", pos.loc),
            });
        }
    }
    for (i, a) in positions.iter().enumerate() {
        for b in positions.iter().skip(i + 1) {
            if a.loc == b.loc {
                return Err(GameError::MapGenerationFailed {
                    reason: format!("duplicate starting position {}", a.loc),
                });
            }
        }
    }

    Ok(())
}

//! Starting-position assignment.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    game::{
        error::{GameError, GameResult},
        map::{grid::LocationGrid, StartingPosition, Terrain, Tile},
        PlayerId,
    },
    rng::GameRng,
    util::{Dims, Location, Vec2d, Wrap},
};

/// Continental distribution rule for starting positions
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum StartPosMode {
    /// Generator's choice
    #[default]
    Default = 0,
    OnePerContinent = 1,
    TwoOrThreePerContinent = 2,
    AllOnOne = 3,
    /// Caps proportional to continent size
    Variable = 4,
}

impl StartPosMode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(StartPosMode::Default),
            1 => Some(StartPosMode::OnePerContinent),
            2 => Some(StartPosMode::TwoOrThreePerContinent),
            3 => Some(StartPosMode::AllOnOne),
            4 => Some(StartPosMode::Variable),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Place one starting position per player.
///
/// Candidates are scored by the quality of their surroundings; placements
/// maintain a minimum pairwise Chebyshev distance derived from map size and
/// player count, relaxed gradually when the map is too cramped to satisfy it.
pub fn assign(
    tiles: &LocationGrid<Tile>,
    wrap: Wrap,
    mode: StartPosMode,
    players: &[PlayerId],
    rng: &mut GameRng,
) -> GameResult<Vec<StartingPosition>> {
    let dims = tiles.dims();
    let n = players.len();
    if n == 0 {
        return Err(GameError::InvalidInput {
            message: "no players to place".to_owned(),
        });
    }

    let continent_sizes = continent_sizes(tiles);
    let total_land: usize = continent_sizes.values().sum();
    if continent_sizes.is_empty() {
        return Err(GameError::MapGenerationFailed {
            reason: "no land for starting positions".to_owned(),
        });
    }
    let largest_continent = *continent_sizes
        .iter()
        .max_by_key(|(_, size)| **size)
        .map(|(id, _)| id)
        .unwrap();

    let mut candidates: Vec<(Location, u32)> = dims
        .iter_locs()
        .filter(|loc| {
            let tile = tiles.get(*loc).unwrap();
            matches!(
                tile.terrain,
                Terrain::Grassland | Terrain::Plains | Terrain::Hills | Terrain::Forest
            )
        })
        .filter(|loc| continent_of(tiles, *loc) > 0)
        .filter(|loc| mode != StartPosMode::AllOnOne || continent_of(tiles, *loc) == largest_continent)
        .map(|loc| (loc, score(tiles, dims, wrap, loc)))
        .collect();

    if candidates.len() < n {
        return Err(GameError::MapGenerationFailed {
            reason: format!("only {} viable starting tiles for {} players", candidates.len(), n),
        });
    }

    let base_distance =
        (f64::from(dims.width.max(dims.height)) / (n as f64).sqrt() * 0.5).max(2.0);

    for attempt in 0..30u32 {
        // Relax spacing as attempts wear on
        let min_distance = (base_distance * 0.75f64.powi((attempt / 10) as i32)).max(2.0) as u32;

        // Jittered score ordering so each attempt explores a different
        // high-quality subset
        let mut ranked = candidates.clone();
        for (_, s) in &mut ranked {
            *s += rng.gen_below(8);
        }
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        if let Some(positions) = try_place(
            tiles,
            wrap,
            &ranked,
            players,
            min_distance,
            mode,
            &continent_sizes,
            total_land,
        ) {
            return Ok(positions);
        }
    }

    Err(GameError::MapGenerationFailed {
        reason: format!("could not place {n} starting positions"),
    })
}

fn try_place(
    tiles: &LocationGrid<Tile>,
    wrap: Wrap,
    ranked: &[(Location, u32)],
    players: &[PlayerId],
    min_distance: u32,
    mode: StartPosMode,
    continent_sizes: &HashMap<u16, usize>,
    total_land: usize,
) -> Option<Vec<StartingPosition>> {
    let n = players.len();
    let mut placed: Vec<Location> = Vec::with_capacity(n);
    let mut per_continent: HashMap<u16, usize> = HashMap::new();

    for (loc, _) in ranked {
        if placed.len() == n {
            break;
        }

        let continent = continent_of(tiles, *loc);
        let used = per_continent.get(&continent).copied().unwrap_or(0);
        let cap = continent_cap(mode, continent_sizes[&continent], total_land, n);
        if used >= cap {
            continue;
        }

        if placed
            .iter()
            .any(|p| wrapped_distance(tiles.dims(), wrap, *p, *loc) < min_distance)
        {
            continue;
        }

        placed.push(*loc);
        *per_continent.entry(continent).or_insert(0) += 1;
    }

    if placed.len() == n {
        Some(
            players
                .iter()
                .zip(placed)
                .map(|(player, loc)| StartingPosition {
                    loc,
                    player: *player,
                })
                .collect(),
        )
    } else {
        None
    }
}

fn continent_cap(
    mode: StartPosMode,
    continent_size: usize,
    total_land: usize,
    players: usize,
) -> usize {
    match mode {
        StartPosMode::Default => players,
        StartPosMode::OnePerContinent => 1,
        StartPosMode::TwoOrThreePerContinent => {
            if continent_size * 2 >= total_land {
                3
            } else {
                2
            }
        }
        StartPosMode::AllOnOne => players,
        StartPosMode::Variable => {
            (players * continent_size).div_ceil(total_land.max(1)).max(1)
        }
    }
}

fn continent_of(tiles: &LocationGrid<Tile>, loc: Location) -> u16 {
    tiles.get(loc).unwrap().continent_id
}

fn continent_sizes(tiles: &LocationGrid<Tile>) -> HashMap<u16, usize> {
    let mut sizes = HashMap::new();
    for tile in tiles.iter() {
        if tile.continent_id > 0 {
            *sizes.entry(tile.continent_id).or_insert(0) += 1;
        }
    }
    sizes
}

fn wrapped_distance(dims: Dims, wrap: Wrap, a: Location, b: Location) -> u32 {
    let dy = (i32::from(a.y) - i32::from(b.y)).unsigned_abs();
    let mut dx = (i32::from(a.x) - i32::from(b.x)).unsigned_abs();
    if wrap.horiz {
        dx = dx.min(u32::from(dims.width) - dx);
    }
    dx.max(dy)
}

/// Terrain quality of the would-be city's surroundings
fn score(tiles: &LocationGrid<Tile>, dims: Dims, wrap: Wrap, center: Location) -> u32 {
    let mut total = 0u32;
    let mut coastal = false;
    let mut river = false;

    for dy in -2i32..=2 {
        for dx in -2i32..=2 {
            let Some(loc) = center.shift(Vec2d::new(dx, dy), dims, wrap) else {
                continue;
            };
            let tile = tiles.get(loc).unwrap();
            total += tile.quality();
            if tile.terrain == Terrain::Coast {
                coastal = true;
            }
            if tile.has_river() {
                river = true;
            }
        }
    }

    total + u32::from(river) * 8 + u32::from(coastal) * 4
}

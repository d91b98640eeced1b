//! Relief and terrain placement over provisional land.

use crate::{
    game::map::{
        grid::LocationGrid,
        terrain::{temperature, Terrain},
        Tile,
    },
    rng::GameRng,
    ruleset::{pick_terrain, TerrainProperty},
    util::{Dims, Location},
};

/// Convert land tiles to hills or mountains where the local elevation is
/// rough. Hot regions lean toward hills, cold regions heavily toward
/// mountains.
pub fn apply_relief(tiles: &mut LocationGrid<Tile>, shore_level: u8, rng: &mut GameRng) {
    let dims = tiles.dims();
    let land_span = f64::from(255 - shore_level).max(1.0);

    let candidates: Vec<Location> = dims
        .iter_locs()
        .filter(|loc| {
            let tile = tiles.get(*loc).unwrap();
            if !tile.terrain.is_land() {
                return false;
            }
            let steep = local_relief(tiles, dims, *loc) > 18.0;
            let towering =
                f64::from(tile.elevation.saturating_sub(shore_level)) / land_span > 0.75;
            steep || towering
        })
        .collect();

    for loc in candidates {
        let tile = tiles.get_mut(loc).unwrap();
        let hot = tile.temperature & temperature::HOT != 0;
        tile.terrain = if hot {
            if rng.gen_bool(0.4) {
                Terrain::Hills
            } else {
                Terrain::Mountains
            }
        } else if rng.gen_bool(0.8) {
            Terrain::Mountains
        } else {
            Terrain::Hills
        };
    }
}

/// Largest elevation difference between a tile and its neighbors
fn local_relief(tiles: &LocationGrid<Tile>, dims: Dims, loc: Location) -> f64 {
    let here = f64::from(tiles.get(loc).unwrap().elevation);
    let mut max_delta = 0.0f64;
    for dy in -1i32..=1 {
        for dx in -1i32..=1 {
            let x = i32::from(loc.x) + dx;
            let y = i32::from(loc.y) + dy;
            if x < 0 || y < 0 || x >= i32::from(dims.width) || y >= i32::from(dims.height) {
                continue;
            }
            let there = f64::from(
                tiles
                    .get(Location::new(x as u16, y as u16))
                    .unwrap()
                    .elevation,
            );
            max_delta = max_delta.max((here - there).abs());
        }
    }
    max_delta
}

/// Place forest, jungle, desert, swamp, and tundra over the remaining
/// provisional grassland, then settle leftovers into plains or grassland by
/// temperature.
pub fn place_terrains(
    tiles: &mut LocationGrid<Tile>,
    shore_level: u8,
    temperature_param: u8,
    wetness_param: u8,
    rng: &mut GameRng,
) {
    let dims = tiles.dims();

    let mut open: Vec<Location> = dims
        .iter_locs()
        .filter(|loc| tiles.get(*loc).unwrap().terrain == Terrain::Grassland)
        .collect();
    rng.shuffle(&mut open);

    let total = open.len() as f64;
    let wet_scale = f64::from(wetness_param) / 50.0;
    let heat_scale = f64::from(temperature_param) / 50.0;

    let forest_target = (total * 0.20 * wet_scale) as usize;
    let jungle_target = (total * 0.10 * wet_scale * heat_scale) as usize;
    let desert_target = (total * 0.15 * (2.0 - wet_scale) * heat_scale * 0.5) as usize;
    let swamp_target = (total * 0.05 * wet_scale) as usize;

    let mut forest = 0usize;
    let mut jungle = 0usize;
    let mut desert = 0usize;
    let mut swamp = 0usize;

    let lowland_cut = shore_level.saturating_add(((255 - shore_level) / 5).max(1));

    for loc in &open {
        let tile = tiles.get(*loc).unwrap();
        let temp = tile.temperature;
        let wet = tile.wetness;
        let low = tile.elevation <= lowland_cut;

        let picked = if jungle < jungle_target && temp & temperature::TROPICAL != 0 && wet > 55 {
            jungle += 1;
            pick_terrain(
                TerrainProperty::Foliage,
                TerrainProperty::Tropical,
                TerrainProperty::Dry,
                rng,
            )
        } else if swamp < swamp_target && wet > 70 && low {
            swamp += 1;
            pick_terrain(
                TerrainProperty::Wet,
                TerrainProperty::Foliage,
                TerrainProperty::Frozen,
                rng,
            )
        } else if forest < forest_target
            && temp & (temperature::TEMPERATE | temperature::COLD) != 0
            && wet > 40
        {
            forest += 1;
            pick_terrain(
                TerrainProperty::Foliage,
                TerrainProperty::Temperate,
                TerrainProperty::Tropical,
                rng,
            )
        } else if desert < desert_target && temp & temperature::HOT != 0 && wet < 35 {
            desert += 1;
            pick_terrain(
                TerrainProperty::Dry,
                TerrainProperty::Tropical,
                TerrainProperty::Wet,
                rng,
            )
        } else {
            continue;
        };

        tiles.get_mut(*loc).unwrap().terrain = picked;
    }

    // Leftovers: tundra where it's cold, otherwise plains or grassland
    for loc in open {
        let tile = tiles.get_mut(loc).unwrap();
        if tile.terrain != Terrain::Grassland {
            continue;
        }
        tile.terrain = if tile.temperature & temperature::FROZEN != 0 {
            Terrain::Tundra
        } else if tile.temperature & temperature::COLD != 0 && tile.wetness < 40 {
            Terrain::Tundra
        } else if tile.temperature & temperature::HOT != 0 && tile.wetness < 50 {
            Terrain::Plains
        } else {
            Terrain::Grassland
        };
    }
}

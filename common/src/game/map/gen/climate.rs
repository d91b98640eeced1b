//! Climate assignment: temperature bands from latitude and elevation,
//! wetness from smoothed noise biased toward water.

use std::collections::VecDeque;

use crate::{
    game::map::{grid::LocationGrid, terrain::temperature, Tile},
    rng::GameRng,
    util::{Dims, Location},
};

/// Width of the overlap zone at band boundaries; tiles inside it carry both
/// neighboring temperature bits
const BAND_OVERLAP: f64 = 0.04;

/// Assign the temperature bit set for every tile.
///
/// `temperature_param` is the game's climate knob (35 cold, 50 normal,
/// 75 hot); it shifts every band boundary toward or away from the poles.
pub fn assign_temperature(tiles: &mut LocationGrid<Tile>, shore_level: u8, temperature_param: u8) {
    let dims = tiles.dims();
    let half = f64::from(dims.height.saturating_sub(1)) / 2.0;
    let shift = (f64::from(temperature_param) - 50.0) / 200.0;

    let tropical_limit = 0.30 + shift;
    let temperate_limit = 0.62 + shift;
    let cold_limit = 0.85 + shift;

    for loc in dims.iter_locs() {
        let tile = tiles.get_mut(loc).unwrap();

        // Colatitude: 0 at the equator row, 1 at either pole
        let mut colat = if half > 0.0 {
            (f64::from(loc.y) - half).abs() / half
        } else {
            0.0
        };

        // High ground reads colder
        if tile.elevation > shore_level {
            let above = f64::from(tile.elevation - shore_level) / f64::from(255 - shore_level);
            colat += above * 0.25;
        }

        tile.temperature = band_mask(colat, tropical_limit, temperate_limit, cold_limit);
    }
}

fn band_mask(colat: f64, tropical_limit: f64, temperate_limit: f64, cold_limit: f64) -> u8 {
    let mut mask = if colat < tropical_limit {
        temperature::TROPICAL
    } else if colat < temperate_limit {
        temperature::TEMPERATE
    } else if colat < cold_limit {
        temperature::COLD
    } else {
        temperature::FROZEN
    };

    // Composite bands at the boundaries
    for (limit, lower, upper) in [
        (tropical_limit, temperature::TROPICAL, temperature::TEMPERATE),
        (temperate_limit, temperature::TEMPERATE, temperature::COLD),
        (cold_limit, temperature::COLD, temperature::FROZEN),
    ] {
        if (colat - limit).abs() < BAND_OVERLAP {
            mask |= lower | upper;
        }
    }

    mask
}

/// Assign wetness 0..=100 from a smoothed noise field biased by the wetness
/// parameter and by proximity to water.
pub fn assign_wetness(
    tiles: &mut LocationGrid<Tile>,
    wetness_param: u8,
    rng: &mut GameRng,
) {
    let dims = tiles.dims();
    let noise = value_noise(dims, 4, rng);
    let water_dist = water_distance(tiles, 6);

    for loc in dims.iter_locs() {
        let idx = dims.index(loc);
        let base = noise[idx] * 60.0;
        let bias = (f64::from(wetness_param) - 50.0) * 0.6;
        let proximity = (25.0 - 5.0 * f64::from(water_dist[idx])).max(0.0);

        let tile = tiles.get_mut(loc).unwrap();
        tile.wetness = (base + bias + proximity).clamp(0.0, 100.0) as u8;
    }
}

/// Coarse lattice noise, bilinearly interpolated
fn value_noise(dims: Dims, cell: u16, rng: &mut GameRng) -> Vec<f64> {
    let cw = usize::from(dims.width / cell + 2);
    let ch = usize::from(dims.height / cell + 2);
    let lattice: Vec<f64> = (0..cw * ch).map(|_| rng.next_f64()).collect();

    let mut out = vec![0.0; dims.area() as usize];
    for loc in dims.iter_locs() {
        let fx = f64::from(loc.x) / f64::from(cell);
        let fy = f64::from(loc.y) / f64::from(cell);
        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let tx = fx - fx.floor();
        let ty = fy - fy.floor();

        let v00 = lattice[y0 * cw + x0];
        let v10 = lattice[y0 * cw + x0 + 1];
        let v01 = lattice[(y0 + 1) * cw + x0];
        let v11 = lattice[(y0 + 1) * cw + x0 + 1];

        let top = v00 * (1.0 - tx) + v10 * tx;
        let bottom = v01 * (1.0 - tx) + v11 * tx;
        out[dims.index(loc)] = top * (1.0 - ty) + bottom * ty;
    }
    out
}

/// BFS distance (in king moves) from each tile to the nearest water tile,
/// capped at `cap`
fn water_distance(tiles: &LocationGrid<Tile>, cap: u8) -> Vec<u8> {
    let dims = tiles.dims();
    let mut dist = vec![u8::MAX; dims.area() as usize];
    let mut queue = VecDeque::new();

    for loc in dims.iter_locs() {
        if tiles.get(loc).unwrap().terrain.is_water() {
            dist[dims.index(loc)] = 0;
            queue.push_back(loc);
        }
    }

    while let Some(loc) = queue.pop_front() {
        let d = dist[dims.index(loc)];
        if d >= cap {
            continue;
        }
        for dy in -1i32..=1 {
            for dx in -1i32..=1 {
                let x = i32::from(loc.x) + dx;
                let y = i32::from(loc.y) + dy;
                if x < 0 || y < 0 || x >= i32::from(dims.width) || y >= i32::from(dims.height) {
                    continue;
                }
                let nloc = Location::new(x as u16, y as u16);
                let nidx = dims.index(nloc);
                if dist[nidx] > d + 1 {
                    dist[nidx] = d + 1;
                    queue.push_back(nloc);
                }
            }
        }
    }

    for d in &mut dist {
        *d = (*d).min(cap);
    }
    dist
}

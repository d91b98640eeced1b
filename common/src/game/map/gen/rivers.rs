//! River carving: walk downhill from high ground toward water, writing
//! flow-direction bits into each visited tile.

use std::collections::HashSet;

use crate::{
    game::map::{grid::LocationGrid, Terrain, Tile},
    rng::GameRng,
    util::{Direction, Location, Wrap},
};

/// Carve rivers until roughly `rivers_param` per-mille of land carries one.
///
/// A river that loops back on itself or strands with nowhere lower to go is
/// abandoned without leaving marks.
pub fn carve(
    tiles: &mut LocationGrid<Tile>,
    wrap: Wrap,
    rivers_param: u8,
    shore_level: u8,
    rng: &mut GameRng,
) {
    let dims = tiles.dims();
    let land_count = tiles.iter().filter(|t| t.terrain.is_land()).count();
    let target = land_count * usize::from(rivers_param) / 1000;

    let source_cut =
        shore_level.saturating_add((u16::from(255 - shore_level) / 2).min(255) as u8);

    let mut carved = 0usize;
    let mut tries = 0usize;
    let max_tries = land_count.max(1) * 2;

    while carved < target && tries < max_tries {
        tries += 1;

        let source = Location::new(
            rng.gen_below(u32::from(dims.width)) as u16,
            rng.gen_below(u32::from(dims.height)) as u16,
        );
        let tile = tiles.get(source).unwrap();
        if !tile.terrain.is_land()
            || tile.terrain == Terrain::Mountains
            || tile.has_river()
            || tile.elevation < source_cut
        {
            continue;
        }

        if let Some(path) = trace_river(tiles, wrap, source, rng) {
            for (loc, dir) in &path {
                tiles.get_mut(*loc).unwrap().river_mask |= dir.river_bit().unwrap();
                if let Some(next) = loc.shift(dir.vec2d(), dims, wrap) {
                    let next_tile = tiles.get_mut(next).unwrap();
                    if next_tile.terrain.is_land() {
                        next_tile.river_mask |= dir.opposite().river_bit().unwrap();
                    }
                }
            }
            carved += path.len();
        }
    }
}

/// Walk downhill from `source`, returning the flow path, or `None` when the
/// walk loops or strands
fn trace_river(
    tiles: &LocationGrid<Tile>,
    wrap: Wrap,
    source: Location,
    rng: &mut GameRng,
) -> Option<Vec<(Location, Direction)>> {
    let dims = tiles.dims();
    let max_len = usize::from(dims.width + dims.height);

    let mut path: Vec<(Location, Direction)> = Vec::new();
    let mut visited: HashSet<Location> = HashSet::new();
    let mut cur = source;
    visited.insert(cur);

    loop {
        if path.len() > max_len {
            return None;
        }

        let here = tiles.get(cur).unwrap();

        // Pick the lowest cardinal neighbor; water always wins
        let mut best: Option<(Direction, Location, i32)> = None;
        let mut dirs = Direction::cardinals();
        rng.shuffle(&mut dirs);
        for dir in dirs {
            let Some(next) = cur.shift(dir.vec2d(), dims, wrap) else {
                continue;
            };
            let next_tile = tiles.get(next).unwrap();
            let score = if next_tile.terrain.is_water() {
                -1000
            } else {
                i32::from(next_tile.elevation)
            };
            if best.map_or(true, |(_, _, s)| score < s) {
                best = Some((dir, next, score));
            }
        }

        let (dir, next, score) = best?;

        // Reaching water or an existing river completes the run
        if score == -1000 {
            path.push((cur, dir));
            return Some(path);
        }
        let next_tile = tiles.get(next).unwrap();
        if next_tile.has_river() {
            path.push((cur, dir));
            return Some(path);
        }

        // Strictly uphill in every direction: the river strands
        if next_tile.elevation > here.elevation {
            return None;
        }

        // Looping back: abandon
        if !visited.insert(next) {
            return None;
        }

        path.push((cur, dir));
        cur = next;
    }
}

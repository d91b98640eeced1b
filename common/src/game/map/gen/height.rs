//! Height-map synthesis.
//!
//! Every generator produces a W x H field of heights in [0, 1]; the pipeline
//! later picks a shore level from its histogram. Heights are f64 here and
//! quantized to the tile's 0..=255 elevation when the grid is built.

use crate::{
    rng::GameRng,
    util::{Dims, Location},
};

pub struct HeightMap {
    dims: Dims,
    vals: Vec<f64>,
}

impl HeightMap {
    pub fn new(dims: Dims) -> Self {
        Self {
            dims,
            vals: vec![0.0; dims.area() as usize],
        }
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn get(&self, loc: Location) -> f64 {
        self.vals[self.dims.index(loc)]
    }

    pub fn set(&mut self, loc: Location, v: f64) {
        let idx = self.dims.index(loc);
        self.vals[idx] = v;
    }

    /// Rescale into [0, 1]
    pub fn normalize(&mut self) {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for v in &self.vals {
            lo = lo.min(*v);
            hi = hi.max(*v);
        }
        let span = (hi - lo).max(f64::EPSILON);
        for v in &mut self.vals {
            *v = (*v - lo) / span;
        }
    }

    /// Quantized elevation for the tile grid
    pub fn elevation(&self, loc: Location) -> u8 {
        (self.get(loc) * 255.0).round().clamp(0.0, 255.0) as u8
    }

    /// 3x3 box smoothing, `passes` times
    pub fn smooth(&mut self, passes: u32) {
        for _ in 0..passes {
            let mut next = self.vals.clone();
            for loc in self.dims.iter_locs() {
                let mut sum = 0.0;
                let mut n = 0.0;
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        let x = i32::from(loc.x) + dx;
                        let y = i32::from(loc.y) + dy;
                        if x >= 0
                            && y >= 0
                            && x < i32::from(self.dims.width)
                            && y < i32::from(self.dims.height)
                        {
                            sum += self.get(Location::new(x as u16, y as u16));
                            n += 1.0;
                        }
                    }
                }
                next[self.dims.index(loc)] = sum / n;
            }
            self.vals = next;
        }
    }

    /// Damp heights toward the map frame so the border trends to ocean
    pub fn damp_edges(&mut self) {
        let margin = (f64::from(self.dims.width.min(self.dims.height)) * 0.18).max(1.0);
        for loc in self.dims.iter_locs() {
            let dx = f64::from(loc.x.min(self.dims.width - 1 - loc.x));
            let dy = f64::from(loc.y.min(self.dims.height - 1 - loc.y));
            let edge = dx.min(dy);
            let factor = (edge / margin).min(1.0);
            let idx = self.dims.index(loc);
            self.vals[idx] *= 0.15 + 0.85 * factor;
        }
    }
}

/// Linearly depress elevations toward the poles so the top and bottom rows
/// trend lower. Returns the per-row factors applied, which is enough to
/// reverse the transform.
pub fn flatten_poles(hmap: &mut HeightMap) -> Vec<f64> {
    let dims = hmap.dims();
    let band = (f64::from(dims.height) * 0.15).max(1.0);

    let factors: Vec<f64> = (0..dims.height)
        .map(|y| {
            let to_pole = f64::from(y.min(dims.height - 1 - y));
            (0.25 + 0.75 * (to_pole / band)).min(1.0)
        })
        .collect();

    for loc in dims.iter_locs() {
        let idx_factor = factors[loc.y as usize];
        let v = hmap.get(loc) * idx_factor;
        hmap.set(loc, v);
    }

    factors
}

/// Uniform sampling followed by smoothing
pub fn random(dims: Dims, rng: &mut GameRng) -> HeightMap {
    let mut hmap = HeightMap::new(dims);
    for loc in dims.iter_locs() {
        hmap.set(loc, rng.next_f64());
    }
    hmap.smooth(2);
    hmap.normalize();
    hmap
}

/// Diamond-square on a power-of-two padded grid, cropped to the map dims
pub fn fractal(dims: Dims, rng: &mut GameRng) -> HeightMap {
    let side = usize::from(dims.width.max(dims.height))
        .saturating_sub(1)
        .next_power_of_two()
        .max(4);
    let n = side + 1;

    let mut grid = vec![0.0f64; n * n];
    let at = |x: usize, y: usize| y * n + x;

    for corner in [at(0, 0), at(side, 0), at(0, side), at(side, side)] {
        grid[corner] = rng.next_f64();
    }

    let roughness = 0.55;
    let mut step = side;
    let mut scale = 1.0;
    while step > 1 {
        let half = step / 2;

        // Diamond pass: centers of squares
        for y in (half..n).step_by(step) {
            for x in (half..n).step_by(step) {
                let avg = (grid[at(x - half, y - half)]
                    + grid[at(x + half, y - half)]
                    + grid[at(x - half, y + half)]
                    + grid[at(x + half, y + half)])
                    / 4.0;
                grid[at(x, y)] = avg + (rng.next_f64() - 0.5) * scale;
            }
        }

        // Square pass: edge midpoints
        for y in (0..n).step_by(half) {
            let x0 = if (y / half) % 2 == 0 { half } else { 0 };
            for x in (x0..n).step_by(step) {
                let mut sum = 0.0;
                let mut count = 0.0;
                if x >= half {
                    sum += grid[at(x - half, y)];
                    count += 1.0;
                }
                if x + half < n {
                    sum += grid[at(x + half, y)];
                    count += 1.0;
                }
                if y >= half {
                    sum += grid[at(x, y - half)];
                    count += 1.0;
                }
                if y + half < n {
                    sum += grid[at(x, y + half)];
                    count += 1.0;
                }
                grid[at(x, y)] = sum / count + (rng.next_f64() - 0.5) * scale;
            }
        }

        step = half;
        scale *= roughness;
    }

    let mut hmap = HeightMap::new(dims);
    for loc in dims.iter_locs() {
        hmap.set(loc, grid[at(usize::from(loc.x), usize::from(loc.y))]);
    }
    hmap.normalize();
    hmap.damp_edges();
    hmap.normalize();
    hmap
}

/// Seed island kernels and accrete their neighbors with decreasing
/// probability, then perturb with a fractal layer. `fair` uses more, smaller
/// islands so every start is comparable.
pub fn islands(dims: Dims, fair: bool, players: usize, rng: &mut GameRng) -> HeightMap {
    let kernels = if fair {
        players.max(2) * 2
    } else {
        (usize::from(dims.width.max(dims.height)) / 8).max(3)
    };

    let mut land = vec![false; dims.area() as usize];
    let mut frontier: Vec<Location> = Vec::new();

    for _ in 0..kernels {
        // Keep kernels off the frame
        let x = rng.gen_range(u32::from(dims.width) / 8, u32::from(dims.width) * 7 / 8) as u16;
        let y = rng.gen_range(u32::from(dims.height) / 8, u32::from(dims.height) * 7 / 8) as u16;
        let loc = Location::new(x, y);
        land[dims.index(loc)] = true;
        frontier.push(loc);
    }

    let mut accrete_p = 0.85;
    let growth_rounds = usize::from(dims.width.min(dims.height)) / 2;
    for _ in 0..growth_rounds {
        let mut next_frontier = Vec::new();
        for loc in frontier.drain(..) {
            for (dx, dy) in [(0i32, -1i32), (1, 0), (0, 1), (-1, 0)] {
                let x = i32::from(loc.x) + dx;
                let y = i32::from(loc.y) + dy;
                if x < 1
                    || y < 1
                    || x >= i32::from(dims.width) - 1
                    || y >= i32::from(dims.height) - 1
                {
                    continue;
                }
                let nloc = Location::new(x as u16, y as u16);
                if !land[dims.index(nloc)] && rng.gen_bool(accrete_p) {
                    land[dims.index(nloc)] = true;
                    next_frontier.push(nloc);
                }
            }
        }
        if next_frontier.is_empty() {
            break;
        }
        frontier = next_frontier;
        accrete_p *= 0.93;
    }

    let perturbation = fractal(dims, rng);
    let mut hmap = HeightMap::new(dims);
    for loc in dims.iter_locs() {
        let base = if land[dims.index(loc)] { 0.75 } else { 0.2 };
        hmap.set(loc, base + perturbation.get(loc) * 0.3);
    }
    hmap.normalize();
    hmap
}

/// Superposition of linear fracture lines creating elongated landmasses
pub fn fracture(dims: Dims, rng: &mut GameRng) -> HeightMap {
    let lines = usize::from(dims.width + dims.height) / 6;
    let ridge_width = f64::from(dims.width.min(dims.height)) * 0.08;

    let mut hmap = HeightMap::new(dims);
    for _ in 0..lines {
        let ax = rng.gen_below(u32::from(dims.width)) as f64;
        let ay = rng.gen_below(u32::from(dims.height)) as f64;
        let bx = rng.gen_below(u32::from(dims.width)) as f64;
        let by = rng.gen_below(u32::from(dims.height)) as f64;
        let strength = 0.3 + rng.next_f64() * 0.7;

        for loc in dims.iter_locs() {
            let d = segment_distance(
                f64::from(loc.x),
                f64::from(loc.y),
                ax,
                ay,
                bx,
                by,
            );
            if d < ridge_width {
                let v = hmap.get(loc) + strength * (1.0 - d / ridge_width);
                hmap.set(loc, v);
            }
        }
    }

    hmap.smooth(1);
    hmap.normalize();
    hmap.damp_edges();
    hmap.normalize();
    hmap
}

fn segment_distance(px: f64, py: f64, ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    let abx = bx - ax;
    let aby = by - ay;
    let len2 = abx * abx + aby * aby;
    let t = if len2 == 0.0 {
        0.0
    } else {
        (((px - ax) * abx + (py - ay) * aby) / len2).clamp(0.0, 1.0)
    };
    let cx = ax + t * abx;
    let cy = ay + t * aby;
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fractal_in_range() {
        let mut rng = GameRng::from_seed_str("height-test");
        let hmap = fractal(Dims::new(30, 20), &mut rng);
        for loc in hmap.dims().iter_locs() {
            let v = hmap.get(loc);
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_fractal_deterministic() {
        let dims = Dims::new(24, 24);
        let a = fractal(dims, &mut GameRng::from_seed_str("s"));
        let b = fractal(dims, &mut GameRng::from_seed_str("s"));
        for loc in dims.iter_locs() {
            assert_eq!(a.get(loc), b.get(loc));
        }
    }

    #[test]
    fn test_pole_flattening_monotone() {
        let dims = Dims::new(16, 20);
        let mut hmap = HeightMap::new(dims);
        for loc in dims.iter_locs() {
            hmap.set(loc, 1.0);
        }

        let factors = flatten_poles(&mut hmap);
        assert_eq!(factors.len(), 20);
        // Rows nearer the pole are depressed at least as much
        for y in 0..9 {
            assert!(factors[y] <= factors[y + 1] + 1e-9);
            assert!(hmap.get(Location::new(0, y as u16)) <= 1.0);
        }
        assert!(factors[0] < factors[10]);
    }

    #[test]
    fn test_edge_damping_lowers_frame() {
        let mut rng = GameRng::from_seed_str("edges");
        let hmap = fractal(Dims::new(32, 32), &mut rng);

        let frame_avg: f64 = (0..32)
            .map(|x| hmap.get(Location::new(x, 0)))
            .sum::<f64>()
            / 32.0;
        let center_avg: f64 = (12..20)
            .flat_map(|y| (12..20).map(move |x| (x, y)))
            .map(|(x, y)| hmap.get(Location::new(x, y)))
            .sum::<f64>()
            / 64.0;
        assert!(frame_avg < center_avg);
    }

    #[test]
    fn test_islands_have_land_and_sea() {
        let mut rng = GameRng::from_seed_str("islands");
        let hmap = islands(Dims::new(40, 40), false, 2, &mut rng);
        let high = hmap
            .dims()
            .iter_locs()
            .filter(|loc| hmap.get(*loc) > 0.6)
            .count();
        let low = hmap
            .dims()
            .iter_locs()
            .filter(|loc| hmap.get(*loc) < 0.4)
            .count();
        assert!(high > 0);
        assert!(low > 0);
    }
}

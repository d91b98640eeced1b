//! Resource and hut scattering.

use serde::{Deserialize, Serialize};

use crate::{
    game::map::{grid::LocationGrid, terrain::temperature, Improvement, Resource, Tile},
    rng::GameRng,
};

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceDensity {
    Sparse,
    #[default]
    Normal,
    Abundant,
}

impl ResourceDensity {
    pub fn id(self) -> &'static str {
        match self {
            ResourceDensity::Sparse => "sparse",
            ResourceDensity::Normal => "normal",
            ResourceDensity::Abundant => "abundant",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "sparse" => Some(ResourceDensity::Sparse),
            "normal" => Some(ResourceDensity::Normal),
            "abundant" => Some(ResourceDensity::Abundant),
            _ => None,
        }
    }

    fn chance(self) -> f64 {
        match self {
            ResourceDensity::Sparse => 0.03,
            ResourceDensity::Normal => 0.06,
            ResourceDensity::Abundant => 0.10,
        }
    }
}

/// Scatter terrain-compatible resources across the map
pub fn scatter(tiles: &mut LocationGrid<Tile>, density: ResourceDensity, rng: &mut GameRng) {
    let chance = density.chance();
    for tile in tiles.iter_mut() {
        if !rng.gen_bool(chance) {
            continue;
        }
        let compatible = Resource::for_terrain(tile.terrain);
        if compatible.is_empty() {
            continue;
        }
        let pick = rng.gen_below(compatible.len() as u32) as usize;
        tile.resource = Some(compatible[pick]);
    }
}

/// Scatter huts on temperate-or-warmer land; `huts_param` is huts per
/// thousand tiles, 0..=50
pub fn scatter_huts(tiles: &mut LocationGrid<Tile>, huts_param: u8, rng: &mut GameRng) {
    let dims = tiles.dims();
    let mut target = (dims.area() as usize * usize::from(huts_param.min(50))) / 1000;

    let mut candidates: Vec<_> = dims
        .iter_locs()
        .filter(|loc| {
            let tile = tiles.get(*loc).unwrap();
            tile.terrain.is_land() && tile.temperature & temperature::FROZEN == 0
        })
        .collect();
    rng.shuffle(&mut candidates);

    for loc in candidates {
        if target == 0 {
            break;
        }
        tiles
            .get_mut(loc)
            .unwrap()
            .improvements
            .insert(Improvement::Hut);
        target -= 1;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{game::map::Terrain, util::Dims};

    fn world(dims: Dims) -> LocationGrid<Tile> {
        LocationGrid::new(dims, |loc| {
            let mut tile = Tile::new(if loc.y < 2 {
                Terrain::Ocean
            } else {
                Terrain::Grassland
            });
            tile.temperature = temperature::TEMPERATE;
            tile
        })
    }

    #[test]
    fn test_resources_respect_terrain() {
        let mut tiles = world(Dims::new(40, 40));
        let mut rng = GameRng::from_seed_str("resources");
        scatter(&mut tiles, ResourceDensity::Abundant, &mut rng);

        let mut placed = 0;
        for tile in tiles.iter() {
            if let Some(resource) = tile.resource {
                assert!(resource.compatible_with(tile.terrain));
                placed += 1;
            }
        }
        assert!(placed > 0);
    }

    #[test]
    fn test_density_ordering() {
        let count = |density| {
            let mut tiles = world(Dims::new(40, 40));
            let mut rng = GameRng::from_seed_str("density");
            scatter(&mut tiles, density, &mut rng);
            tiles.iter().filter(|t| t.resource.is_some()).count()
        };
        assert!(count(ResourceDensity::Abundant) > count(ResourceDensity::Sparse));
    }

    #[test]
    fn test_huts_only_on_land() {
        let mut tiles = world(Dims::new(30, 30));
        let mut rng = GameRng::from_seed_str("huts");
        scatter_huts(&mut tiles, 30, &mut rng);

        let hut_count = tiles
            .iter()
            .filter(|t| t.has_improvement(Improvement::Hut))
            .count();
        assert_eq!(hut_count, 30 * 30 * 30 / 1000);
        for tile in tiles.iter() {
            if tile.has_improvement(Improvement::Hut) {
                assert!(tile.terrain.is_land());
            }
        }
    }
}

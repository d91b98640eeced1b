//! A single cell of the map grid.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::game::{city::CityId, unit::UnitId, PlayerId};

use super::terrain::{Resource, Terrain};

/// Tile improvements; huts are placement-only bonuses the generator scatters
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Improvement {
    Road,
    Irrigation,
    Mine,
    Hut,
}

impl Improvement {
    pub fn id(self) -> &'static str {
        match self {
            Improvement::Road => "road",
            Improvement::Irrigation => "irrigation",
            Improvement::Mine => "mine",
            Improvement::Hut => "hut",
        }
    }

    pub fn from_id(id: &str) -> Option<Improvement> {
        [
            Improvement::Road,
            Improvement::Irrigation,
            Improvement::Mine,
            Improvement::Hut,
        ]
        .into_iter()
        .find(|i| i.id() == id)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Tile {
    pub terrain: Terrain,
    pub elevation: u8,

    /// Bit set over `terrain::temperature`
    pub temperature: u8,

    /// 0..=100
    pub wetness: u8,

    /// Bits N=1 E=2 S=4 W=8
    pub river_mask: u8,

    /// 0 is ocean; land continents are numbered from 1
    pub continent_id: u16,

    pub resource: Option<Resource>,
    pub improvements: BTreeSet<Improvement>,

    pub city_id: Option<CityId>,
    pub unit_ids: Vec<UnitId>,

    /// Which player's territory the tile lies in, if any
    pub owner: Option<PlayerId>,
}

impl Tile {
    pub fn new(terrain: Terrain) -> Self {
        Self {
            terrain,
            elevation: 0,
            temperature: 0,
            wetness: 0,
            river_mask: 0,
            continent_id: 0,
            resource: None,
            improvements: BTreeSet::new(),
            city_id: None,
            unit_ids: Vec::new(),
            owner: None,
        }
    }

    pub fn has_river(&self) -> bool {
        self.river_mask != 0
    }

    pub fn has_improvement(&self, improvement: Improvement) -> bool {
        self.improvements.contains(&improvement)
    }

    /// Yields (food, shields, trade) from terrain, resource, river, and
    /// improvements
    pub fn yields(&self) -> (u32, u32, u32) {
        let (mut food, mut shields, mut trade) = self.terrain.yields();

        if let Some(resource) = self.resource {
            let (f, s, t) = resource.yield_bonus();
            food += f;
            shields += s;
            trade += t;
        }

        if self.has_river() {
            trade += 1;
        }
        if self.has_improvement(Improvement::Irrigation) {
            food += 1;
        }
        if self.has_improvement(Improvement::Mine) {
            shields += 1;
        }
        if self.has_improvement(Improvement::Road) {
            trade += 1;
        }

        (food, shields, trade)
    }

    /// A crude quality score used when ranking starting positions and
    /// picking tiles for citizens to work
    pub fn quality(&self) -> u32 {
        let (food, shields, trade) = self.yields();
        food * 3 + shields * 2 + trade
    }
}

//! Terrain taxonomy and per-terrain tables.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Temperature bands, stored per tile as a bit set; composites are permitted
/// at band boundaries.
pub mod temperature {
    pub const FROZEN: u8 = 1;
    pub const COLD: u8 = 2;
    pub const TEMPERATE: u8 = 4;
    pub const TROPICAL: u8 = 8;

    /// The canonical "hot" test: `(temperature & HOT) != 0`
    pub const HOT: u8 = TEMPERATE | TROPICAL;
}

pub const POSSIBLE_TERRAINS: usize = 13;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    DeepOcean,
    Ocean,
    Coast,
    Lake,
    Grassland,
    Plains,
    Desert,
    Tundra,
    Forest,
    Jungle,
    Swamp,
    Hills,
    Mountains,
}

impl Terrain {
    pub const fn values() -> [Terrain; POSSIBLE_TERRAINS] {
        [
            Terrain::DeepOcean,
            Terrain::Ocean,
            Terrain::Coast,
            Terrain::Lake,
            Terrain::Grassland,
            Terrain::Plains,
            Terrain::Desert,
            Terrain::Tundra,
            Terrain::Forest,
            Terrain::Jungle,
            Terrain::Swamp,
            Terrain::Hills,
            Terrain::Mountains,
        ]
    }

    pub fn id(self) -> &'static str {
        match self {
            Terrain::DeepOcean => "deep_ocean",
            Terrain::Ocean => "ocean",
            Terrain::Coast => "coast",
            Terrain::Lake => "lake",
            Terrain::Grassland => "grassland",
            Terrain::Plains => "plains",
            Terrain::Desert => "desert",
            Terrain::Tundra => "tundra",
            Terrain::Forest => "forest",
            Terrain::Jungle => "jungle",
            Terrain::Swamp => "swamp",
            Terrain::Hills => "hills",
            Terrain::Mountains => "mountains",
        }
    }

    pub fn from_id(id: &str) -> Option<Terrain> {
        Terrain::values().into_iter().find(|t| t.id() == id)
    }

    /// The ocean family proper: tiles that must sit below the shore level.
    /// Lakes are water but land-locked and sit above it.
    pub fn is_ocean(self) -> bool {
        matches!(self, Terrain::DeepOcean | Terrain::Ocean | Terrain::Coast)
    }

    pub fn is_water(self) -> bool {
        self.is_ocean() || self == Terrain::Lake
    }

    pub fn is_land(self) -> bool {
        !self.is_water()
    }

    /// Movement cost in fragments for land movers; `None` means boats only
    pub fn movement_cost(self) -> Option<u16> {
        match self {
            Terrain::DeepOcean | Terrain::Ocean | Terrain::Coast | Terrain::Lake => None,
            Terrain::Grassland | Terrain::Plains | Terrain::Desert | Terrain::Tundra => Some(3),
            Terrain::Forest | Terrain::Jungle | Terrain::Swamp | Terrain::Hills => Some(6),
            Terrain::Mountains => Some(9),
        }
    }

    /// Percentage added to a defender's strength
    pub fn defense_bonus_pct(self) -> u16 {
        match self {
            Terrain::Forest | Terrain::Jungle | Terrain::Swamp => 25,
            Terrain::Hills => 50,
            Terrain::Mountains => 100,
            _ => 0,
        }
    }

    /// Base yields (food, shields, trade) before resources and improvements
    pub fn yields(self) -> (u32, u32, u32) {
        match self {
            Terrain::DeepOcean => (0, 0, 0),
            Terrain::Ocean => (1, 0, 1),
            Terrain::Coast => (1, 0, 2),
            Terrain::Lake => (2, 0, 1),
            Terrain::Grassland => (2, 1, 0),
            Terrain::Plains => (1, 2, 0),
            Terrain::Desert => (0, 1, 0),
            Terrain::Tundra => (1, 0, 0),
            Terrain::Forest => (1, 2, 0),
            Terrain::Jungle => (1, 0, 0),
            Terrain::Swamp => (1, 0, 0),
            Terrain::Hills => (1, 2, 0),
            Terrain::Mountains => (0, 1, 0),
        }
    }
}

impl fmt::Display for Terrain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Special resources scattered by the generator
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Fish,
    Whales,
    Wheat,
    Horses,
    Oasis,
    Gold,
    Gems,
    Furs,
    Game,
    Coal,
    Wine,
    Peat,
}

impl Resource {
    pub const fn values() -> [Resource; 12] {
        [
            Resource::Fish,
            Resource::Whales,
            Resource::Wheat,
            Resource::Horses,
            Resource::Oasis,
            Resource::Gold,
            Resource::Gems,
            Resource::Furs,
            Resource::Game,
            Resource::Coal,
            Resource::Wine,
            Resource::Peat,
        ]
    }

    pub fn id(self) -> &'static str {
        match self {
            Resource::Fish => "fish",
            Resource::Whales => "whales",
            Resource::Wheat => "wheat",
            Resource::Horses => "horses",
            Resource::Oasis => "oasis",
            Resource::Gold => "gold",
            Resource::Gems => "gems",
            Resource::Furs => "furs",
            Resource::Game => "game",
            Resource::Coal => "coal",
            Resource::Wine => "wine",
            Resource::Peat => "peat",
        }
    }

    pub fn from_id(id: &str) -> Option<Resource> {
        Resource::values().into_iter().find(|r| r.id() == id)
    }

    /// The terrains this resource may appear on
    pub fn compatible_terrains(self) -> &'static [Terrain] {
        match self {
            Resource::Fish => &[Terrain::Ocean, Terrain::Coast, Terrain::Lake],
            Resource::Whales => &[Terrain::Ocean, Terrain::DeepOcean],
            Resource::Wheat => &[Terrain::Grassland, Terrain::Plains],
            Resource::Horses => &[Terrain::Plains, Terrain::Grassland],
            Resource::Oasis => &[Terrain::Desert],
            Resource::Gold => &[Terrain::Hills, Terrain::Mountains],
            Resource::Gems => &[Terrain::Jungle, Terrain::Mountains],
            Resource::Furs => &[Terrain::Tundra, Terrain::Forest],
            Resource::Game => &[Terrain::Forest, Terrain::Tundra],
            Resource::Coal => &[Terrain::Hills],
            Resource::Wine => &[Terrain::Hills, Terrain::Plains],
            Resource::Peat => &[Terrain::Swamp],
        }
    }

    pub fn compatible_with(self, terrain: Terrain) -> bool {
        self.compatible_terrains().contains(&terrain)
    }

    /// Resources that may appear on the given terrain
    pub fn for_terrain(terrain: Terrain) -> Vec<Resource> {
        Resource::values()
            .into_iter()
            .filter(|r| r.compatible_with(terrain))
            .collect()
    }

    /// Yield deltas (food, shields, trade)
    pub fn yield_bonus(self) -> (u32, u32, u32) {
        match self {
            Resource::Fish | Resource::Wheat => (2, 0, 0),
            Resource::Whales => (1, 1, 1),
            Resource::Horses => (0, 1, 0),
            Resource::Oasis => (3, 0, 0),
            Resource::Gold => (0, 0, 5),
            Resource::Gems => (0, 0, 3),
            Resource::Furs => (0, 0, 2),
            Resource::Game => (1, 1, 0),
            Resource::Coal => (0, 2, 0),
            Resource::Wine => (0, 0, 2),
            Resource::Peat => (0, 1, 0),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ocean_family() {
        assert!(Terrain::DeepOcean.is_ocean());
        assert!(Terrain::Coast.is_ocean());
        assert!(!Terrain::Lake.is_ocean());
        assert!(Terrain::Lake.is_water());
        assert!(Terrain::Grassland.is_land());
    }

    #[test]
    fn test_movement_costs() {
        assert_eq!(Terrain::Grassland.movement_cost(), Some(3));
        assert_eq!(Terrain::Hills.movement_cost(), Some(6));
        assert_eq!(Terrain::Mountains.movement_cost(), Some(9));
        assert_eq!(Terrain::Forest.movement_cost(), Some(6));
        assert_eq!(Terrain::Ocean.movement_cost(), None);
    }

    #[test]
    fn test_hot_mask() {
        use temperature::*;
        assert_ne!(TEMPERATE & HOT, 0);
        assert_ne!(TROPICAL & HOT, 0);
        assert_eq!(COLD & HOT, 0);
        assert_eq!(FROZEN & HOT, 0);
    }

    #[test]
    fn test_resource_compatibility() {
        assert!(Resource::Oasis.compatible_with(Terrain::Desert));
        assert!(!Resource::Oasis.compatible_with(Terrain::Grassland));
        assert!(Resource::for_terrain(Terrain::Hills).contains(&Resource::Coal));
    }

    #[test]
    fn test_ids_round_trip() {
        for terrain in Terrain::values() {
            assert_eq!(Terrain::from_id(terrain.id()), Some(terrain));
        }
        for resource in Resource::values() {
            assert_eq!(Resource::from_id(resource.id()), Some(resource));
        }
    }
}

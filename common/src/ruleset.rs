//! Ruleset provider
//!
//! Read-only lookup of nations, unit types, buildings, techs, and terrain
//! properties. The engine consumes rulesets through this interface only; the
//! built-in `classic` set is the sole ruleset compiled in today, but nothing
//! outside this module assumes that.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    game::error::{GameError, GameResult},
    game::map::Terrain,
    rng::GameRng,
};

pub const DEFAULT_RULESET: &str = "classic";

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Leader {
    pub name: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Nation {
    pub id: String,
    pub name: String,
    pub adjective: String,
    pub leaders: Vec<Leader>,
    /// Hex RGB, e.g. "#cc0000"
    pub color: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UnitTypeDef {
    pub id: String,
    pub name: String,
    pub attack: u16,
    pub defense: u16,
    /// Movement fragments per turn; one full move costs three on open ground
    pub max_movement: u16,
    pub sight: u16,
    /// Production cost in shields
    pub cost: u32,
    pub can_found_city: bool,
    pub naval: bool,
    pub requires: Option<String>,
}

impl UnitTypeDef {
    /// Civilians have no combat strength at all
    pub fn is_civilian(&self) -> bool {
        self.attack == 0 && self.defense == 0
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub enum BuildingEffect {
    /// Percentage bonus to city science output
    SciencePct(u16),
    /// Percentage bonus to city gold output
    GoldPct(u16),
    /// Percentage bonus to city food output
    FoodPct(u16),
    /// Flat culture per turn
    CulturePerTurn(u32),
    /// Percentage bonus to defenders garrisoned in the city
    DefensePct(u16),
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BuildingDef {
    pub id: String,
    pub name: String,
    pub cost: u32,
    pub effects: Vec<BuildingEffect>,
    pub requires: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TechDef {
    pub id: String,
    pub name: String,
    /// Bulbs required
    pub cost: u32,
    pub prereqs: Vec<String>,
}

/// Properties the terrain-placement stage selects against
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TerrainProperty {
    Foliage,
    Dry,
    Wet,
    Frozen,
    Cold,
    Temperate,
    Tropical,
    Mountainous,
    Green,
}

/// Property intensities, 0..=100, for each placeable land terrain
pub fn terrain_properties(terrain: Terrain) -> &'static [(TerrainProperty, u8)] {
    use TerrainProperty::*;
    match terrain {
        Terrain::Grassland => &[(Green, 50), (Temperate, 50), (Foliage, 10)],
        Terrain::Plains => &[(Green, 30), (Temperate, 50), (Dry, 30)],
        Terrain::Desert => &[(Dry, 100), (Tropical, 30)],
        Terrain::Tundra => &[(Cold, 70), (Frozen, 30), (Dry, 20)],
        Terrain::Forest => &[(Foliage, 80), (Temperate, 50), (Wet, 20), (Cold, 20)],
        Terrain::Jungle => &[(Foliage, 80), (Tropical, 70), (Wet, 50)],
        Terrain::Swamp => &[(Wet, 100), (Foliage, 20), (Tropical, 10)],
        Terrain::Hills => &[(Mountainous, 40), (Green, 20)],
        Terrain::Mountains => &[(Mountainous, 100), (Cold, 20)],
        _ => &[],
    }
}

fn property_intensity(terrain: Terrain, property: TerrainProperty) -> u8 {
    terrain_properties(terrain)
        .iter()
        .find(|(p, _)| *p == property)
        .map(|(_, i)| *i)
        .unwrap_or(0)
}

/// Weighted terrain pick: strongly favor `target`, mildly favor `prefer`,
/// refuse anything carrying `avoid`. Falls back to grassland when nothing
/// qualifies.
pub fn pick_terrain(
    target: TerrainProperty,
    prefer: TerrainProperty,
    avoid: TerrainProperty,
    rng: &mut GameRng,
) -> Terrain {
    let candidates: Vec<Terrain> = Terrain::values()
        .into_iter()
        .filter(|t| t.is_land())
        .filter(|t| property_intensity(*t, avoid) == 0)
        .collect();

    let weights: Vec<u32> = candidates
        .iter()
        .map(|t| {
            u32::from(property_intensity(*t, target)) * 2
                + u32::from(property_intensity(*t, prefer))
        })
        .collect();

    match rng.pick_weighted(&weights) {
        Some(idx) => candidates[idx],
        None => Terrain::Grassland,
    }
}

#[derive(Clone, Debug)]
pub struct Ruleset {
    name: String,
    nations: Vec<Nation>,
    unit_types: Vec<UnitTypeDef>,
    buildings: Vec<BuildingDef>,
    techs: Vec<TechDef>,
}

impl Ruleset {
    /// Load a ruleset by name
    pub fn load(name: &str) -> GameResult<Arc<Ruleset>> {
        match name {
            DEFAULT_RULESET => Ok(Arc::new(classic())),
            _ => Err(GameError::UnknownRuleset {
                name: name.to_owned(),
            }),
        }
    }

    pub fn available() -> &'static [&'static str] {
        &[DEFAULT_RULESET]
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nations(&self) -> &[Nation] {
        &self.nations
    }

    pub fn nation(&self, id: &str) -> GameResult<&Nation> {
        self.nations.iter().find(|n| n.id == id).ok_or_else(|| {
            GameError::UnknownId {
                kind: "nation",
                id: id.to_owned(),
            }
        })
    }

    pub fn unit_types(&self) -> &[UnitTypeDef] {
        &self.unit_types
    }

    pub fn unit_type(&self, id: &str) -> GameResult<&UnitTypeDef> {
        self.unit_types.iter().find(|u| u.id == id).ok_or_else(|| {
            GameError::UnknownId {
                kind: "unit_type",
                id: id.to_owned(),
            }
        })
    }

    pub fn buildings(&self) -> &[BuildingDef] {
        &self.buildings
    }

    pub fn building(&self, id: &str) -> GameResult<&BuildingDef> {
        self.buildings.iter().find(|b| b.id == id).ok_or_else(|| {
            GameError::UnknownId {
                kind: "building",
                id: id.to_owned(),
            }
        })
    }

    pub fn techs(&self) -> &[TechDef] {
        &self.techs
    }

    pub fn tech(&self, id: &str) -> GameResult<&TechDef> {
        self.techs.iter().find(|t| t.id == id).ok_or_else(|| {
            GameError::UnknownId {
                kind: "tech",
                id: id.to_owned(),
            }
        })
    }
}

fn nation(id: &str, name: &str, adjective: &str, leaders: &[&str], color: &str) -> Nation {
    Nation {
        id: id.to_owned(),
        name: name.to_owned(),
        adjective: adjective.to_owned(),
        leaders: leaders
            .iter()
            .map(|l| Leader {
                name: (*l).to_owned(),
            })
            .collect(),
        color: color.to_owned(),
    }
}

fn tech(id: &str, name: &str, cost: u32, prereqs: &[&str]) -> TechDef {
    TechDef {
        id: id.to_owned(),
        name: name.to_owned(),
        cost,
        prereqs: prereqs.iter().map(|p| (*p).to_owned()).collect(),
    }
}

fn classic() -> Ruleset {
    let nations = vec![
        nation("romans", "Romans", "Roman", &["Caesar", "Augustus"], "#cc0000"),
        nation("greeks", "Greeks", "Greek", &["Alexander", "Pericles"], "#2244cc"),
        nation(
            "egyptians",
            "Egyptians",
            "Egyptian",
            &["Ramesses", "Cleopatra"],
            "#ccaa00",
        ),
        nation(
            "babylonians",
            "Babylonians",
            "Babylonian",
            &["Hammurabi"],
            "#00aa66",
        ),
        nation("chinese", "Chinese", "Chinese", &["Mao", "Wu Zetian"], "#884400"),
        nation("indians", "Indians", "Indian", &["Gandhi", "Asoka"], "#8800aa"),
        nation("persians", "Persians", "Persian", &["Cyrus", "Darius"], "#008888"),
        nation("aztecs", "Aztecs", "Aztec", &["Montezuma"], "#446600"),
        nation(
            "mongols",
            "Mongols",
            "Mongol",
            &["Genghis Khan", "Kublai Khan"],
            "#666666",
        ),
        nation("vikings", "Vikings", "Viking", &["Ragnar", "Canute"], "#113355"),
        nation("iroquois", "Iroquois", "Iroquois", &["Hiawatha"], "#aa5500"),
        nation("zulus", "Zulus", "Zulu", &["Shaka"], "#cc6688"),
    ];

    let unit_types = vec![
        UnitTypeDef {
            id: "settlers".to_owned(),
            name: "Settlers".to_owned(),
            attack: 0,
            defense: 0,
            max_movement: 3,
            sight: 2,
            cost: 30,
            can_found_city: true,
            naval: false,
            requires: None,
        },
        UnitTypeDef {
            id: "workers".to_owned(),
            name: "Workers".to_owned(),
            attack: 0,
            defense: 0,
            max_movement: 3,
            sight: 2,
            cost: 20,
            can_found_city: false,
            naval: false,
            requires: None,
        },
        UnitTypeDef {
            id: "warriors".to_owned(),
            name: "Warriors".to_owned(),
            attack: 1,
            defense: 1,
            max_movement: 3,
            sight: 2,
            cost: 10,
            can_found_city: false,
            naval: false,
            requires: None,
        },
        UnitTypeDef {
            id: "phalanx".to_owned(),
            name: "Phalanx".to_owned(),
            attack: 1,
            defense: 2,
            max_movement: 3,
            sight: 2,
            cost: 20,
            can_found_city: false,
            naval: false,
            requires: Some("bronze_working".to_owned()),
        },
        UnitTypeDef {
            id: "archers".to_owned(),
            name: "Archers".to_owned(),
            attack: 3,
            defense: 2,
            max_movement: 3,
            sight: 2,
            cost: 30,
            can_found_city: false,
            naval: false,
            requires: Some("warrior_code".to_owned()),
        },
        UnitTypeDef {
            id: "horsemen".to_owned(),
            name: "Horsemen".to_owned(),
            attack: 2,
            defense: 1,
            max_movement: 6,
            sight: 2,
            cost: 20,
            can_found_city: false,
            naval: false,
            requires: Some("horseback_riding".to_owned()),
        },
        UnitTypeDef {
            id: "catapult".to_owned(),
            name: "Catapult".to_owned(),
            attack: 6,
            defense: 1,
            max_movement: 3,
            sight: 2,
            cost: 40,
            can_found_city: false,
            naval: false,
            requires: Some("mathematics".to_owned()),
        },
        UnitTypeDef {
            id: "trireme".to_owned(),
            name: "Trireme".to_owned(),
            attack: 1,
            defense: 1,
            max_movement: 9,
            sight: 3,
            cost: 40,
            can_found_city: false,
            naval: true,
            requires: Some("map_making".to_owned()),
        },
    ];

    let buildings = vec![
        BuildingDef {
            id: "palace".to_owned(),
            name: "Palace".to_owned(),
            cost: 70,
            effects: vec![BuildingEffect::CulturePerTurn(1)],
            requires: None,
        },
        BuildingDef {
            id: "barracks".to_owned(),
            name: "Barracks".to_owned(),
            cost: 40,
            effects: vec![],
            requires: None,
        },
        BuildingDef {
            id: "granary".to_owned(),
            name: "Granary".to_owned(),
            cost: 60,
            effects: vec![BuildingEffect::FoodPct(25)],
            requires: Some("pottery".to_owned()),
        },
        BuildingDef {
            id: "temple".to_owned(),
            name: "Temple".to_owned(),
            cost: 40,
            effects: vec![BuildingEffect::CulturePerTurn(2)],
            requires: Some("ceremonial_burial".to_owned()),
        },
        BuildingDef {
            id: "library".to_owned(),
            name: "Library".to_owned(),
            cost: 80,
            effects: vec![BuildingEffect::SciencePct(50)],
            requires: Some("writing".to_owned()),
        },
        BuildingDef {
            id: "marketplace".to_owned(),
            name: "Marketplace".to_owned(),
            cost: 80,
            effects: vec![BuildingEffect::GoldPct(50)],
            requires: Some("currency".to_owned()),
        },
        BuildingDef {
            id: "walls".to_owned(),
            name: "City Walls".to_owned(),
            cost: 60,
            effects: vec![BuildingEffect::DefensePct(100)],
            requires: Some("masonry".to_owned()),
        },
        BuildingDef {
            id: "harbor".to_owned(),
            name: "Harbor".to_owned(),
            cost: 60,
            effects: vec![BuildingEffect::FoodPct(10)],
            requires: Some("map_making".to_owned()),
        },
    ];

    let techs = vec![
        tech("pottery", "Pottery", 10, &[]),
        tech("alphabet", "Alphabet", 10, &[]),
        tech("warrior_code", "Warrior Code", 10, &[]),
        tech("horseback_riding", "Horseback Riding", 10, &[]),
        tech("bronze_working", "Bronze Working", 10, &[]),
        tech("ceremonial_burial", "Ceremonial Burial", 10, &[]),
        tech("masonry", "Masonry", 10, &[]),
        tech("writing", "Writing", 20, &["alphabet"]),
        tech("code_of_laws", "Code of Laws", 20, &["alphabet"]),
        tech("map_making", "Map Making", 20, &["alphabet"]),
        tech("currency", "Currency", 20, &["bronze_working"]),
        tech("iron_working", "Iron Working", 20, &["bronze_working"]),
        tech("mysticism", "Mysticism", 20, &["ceremonial_burial"]),
        tech("mathematics", "Mathematics", 30, &["alphabet", "masonry"]),
        tech("monarchy", "Monarchy", 40, &["ceremonial_burial", "code_of_laws"]),
        tech("philosophy", "Philosophy", 40, &["mysticism", "code_of_laws"]),
        tech("literacy", "Literacy", 40, &["writing", "code_of_laws"]),
        tech("the_wheel", "The Wheel", 20, &["horseback_riding"]),
    ];

    Ruleset {
        name: DEFAULT_RULESET.to_owned(),
        nations,
        unit_types,
        buildings,
        techs,
    }
}

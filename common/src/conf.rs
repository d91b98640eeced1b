//! Configuration
//!
//! Engine-wide constants. Anything tunable per game (map size, generator,
//! climate knobs) travels in `game::map::gen::GenParams` instead.

/// The name of this application
pub const APP_NAME: &str = "meridian";

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Movement fragments making up one full move
pub const MOVE_FRAGMENTS: u16 = 3;

/// Maximum unit health
pub const MAX_HEALTH: u8 = 100;

/// Healing per turn for a fortified unit
pub const FORTIFIED_HEAL: u8 = 10;

/// Healing per turn for an unfortified unit resting on its own territory
pub const TERRITORY_HEAL: u8 = 5;

/// Healing per turn otherwise
pub const FIELD_HEAL: u8 = 0;

/// Chance that a surviving, victorious attacker is promoted
pub const VETERAN_PROMOTION_CHANCE: f64 = 0.1;

pub const MAX_VETERAN_LEVEL: u8 = 3;

/// Minimum Chebyshev distance between any two cities
pub const CITY_MIN_DISTANCE: u32 = 2;

/// Sight radius of every city
pub const CITY_SIGHT_RADIUS: u16 = 2;

/// Radius of the ring of tiles a city may work
pub const CITY_WORK_RADIUS: u32 = 2;

/// Food stock threshold multiplier for population growth
pub const GROWTH_FOOD_PER_POP: u32 = 2;

/// Whole-pipeline retries before map generation gives up
pub const MAPGEN_ATTEMPTS: u32 = 3;

/// Below this square dimension the island generator falls back to random
/// height synthesis (its kernels have no room to accrete)
pub const ISLAND_MIN_DIM: u16 = 32;

/// Water bodies of at most this many tiles, fully enclosed by land, become lakes
pub const LAKE_MAX_SIZE: usize = 8;

/// Default per-turn submission timeout, seconds; 0 disables
pub const DEFAULT_TURN_TIME_LIMIT: u32 = 0;

/// Year displayed for turn 1
pub const STARTING_YEAR: i32 = -4000;

/// Years that pass per turn
pub const YEARS_PER_TURN: i32 = 50;

pub fn year_of_turn(turn: u32) -> i32 {
    STARTING_YEAR + YEARS_PER_TURN * (turn.saturating_sub(1) as i32)
}

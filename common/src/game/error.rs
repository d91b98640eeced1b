//! Engine error type.
//!
//! Every failure the engine can surface is a `GameError` variant with a
//! stable wire code. Human-readable detail goes through `Display`; clients
//! branch on `code()` alone.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::{Dims, Location};

#[derive(Clone, Debug, Deserialize, Error, PartialEq, Serialize)]
pub enum GameError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Location {loc} is outside the map bounds {dims}")]
    OutOfBounds { loc: Location, dims: Dims },

    #[error("Unknown {kind} id {id:?}")]
    UnknownId { kind: &'static str, id: String },

    #[error("Unknown ruleset {name:?}")]
    UnknownRuleset { name: String },

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Only the host may do that")]
    NotHost,

    #[error("It isn't player {player}'s turn")]
    NotPlayerTurn { player: u32 },

    #[error("The game is full")]
    GameFull,

    #[error("Nation {nation:?} is already taken")]
    NationTaken { nation: String },

    #[error("The game cannot be joined")]
    GameNotJoinable,

    #[error("The game is not active")]
    GameNotActive,

    #[error("Submitted against turn {submitted} but the current turn is {current}")]
    StaleTurn { submitted: u32, current: u32 },

    #[error("Position {loc} is invalid for that unit")]
    InvalidPosition { loc: Location },

    #[error("A friendly civilian already occupies {loc}")]
    CivilianStackingForbidden { loc: Location },

    #[error("An enemy unit holds {loc}; attack instead of moving")]
    CannotMoveOntoEnemyUnit { loc: Location },

    #[error("Move needs {required} movement fragments but only {available} remain")]
    NotEnoughMovement { required: u16, available: u16 },

    #[error("A city cannot be founded at {loc}")]
    InvalidFounderPosition { loc: Location },

    #[error("Another city lies too close to {loc}")]
    CityTooClose { loc: Location },

    #[error("Building {building:?} already stands in that city")]
    BuildingAlreadyPresent { building: String },

    #[error("Prerequisites for tech {tech:?} are not met")]
    PrereqNotMet { tech: String },

    #[error("Tech {tech:?} is already researched")]
    AlreadyResearched { tech: String },

    #[error("Map generation failed: {reason}")]
    MapGenerationFailed { reason: String },

    #[error("Persistence failed: {message}")]
    PersistenceFailed { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl GameError {
    /// Stable error code for the wire; never renamed
    pub fn code(&self) -> &'static str {
        match self {
            GameError::InvalidInput { .. } => "InvalidInput",
            GameError::OutOfBounds { .. } => "OutOfBounds",
            GameError::UnknownId { .. } => "UnknownId",
            GameError::UnknownRuleset { .. } => "UnknownRuleset",
            GameError::NotAuthenticated => "NotAuthenticated",
            GameError::NotHost => "NotHost",
            GameError::NotPlayerTurn { .. } => "NotPlayerTurn",
            GameError::GameFull => "GameFull",
            GameError::NationTaken { .. } => "NationTaken",
            GameError::GameNotJoinable => "GameNotJoinable",
            GameError::GameNotActive => "GameNotActive",
            GameError::StaleTurn { .. } => "StaleTurn",
            GameError::InvalidPosition { .. } => "InvalidPosition",
            GameError::CivilianStackingForbidden { .. } => "CivilianStackingForbidden",
            GameError::CannotMoveOntoEnemyUnit { .. } => "CannotMoveOntoEnemyUnit",
            GameError::NotEnoughMovement { .. } => "NotEnoughMovement",
            GameError::InvalidFounderPosition { .. } => "InvalidFounderPosition",
            GameError::CityTooClose { .. } => "CityTooClose",
            GameError::BuildingAlreadyPresent { .. } => "BuildingAlreadyPresent",
            GameError::PrereqNotMet { .. } => "PrereqNotMet",
            GameError::AlreadyResearched { .. } => "AlreadyResearched",
            GameError::MapGenerationFailed { .. } => "MapGenerationFailed",
            GameError::PersistenceFailed { .. } => "PersistenceFailed",
            GameError::Internal { .. } => "Internal",
        }
    }
}

pub type GameResult<T> = Result<T, GameError>;

//! Reified player actions.
//!
//! Clients submit actions as tagged JSON objects; the turn coordinator
//! replays them with a total match. Unknown shapes fail at deserialization,
//! never inside resolution.

use serde::{Deserialize, Serialize};

use super::city::ProductionKind;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerAction {
    #[serde(rename_all = "camelCase")]
    UnitMove { unit_id: u64, to_x: i32, to_y: i32 },

    #[serde(rename_all = "camelCase")]
    UnitAttack {
        attacker_unit_id: u64,
        defender_unit_id: u64,
    },

    FoundCity { name: String, x: i32, y: i32 },

    #[serde(rename_all = "camelCase")]
    ResearchSelection { tech_id: String },

    #[serde(rename_all = "camelCase")]
    SetProduction {
        city_id: u64,
        id: String,
        kind: ProductionKind,
    },

    #[serde(rename_all = "camelCase")]
    Fortify { unit_id: u64 },

    EndTurn,
}

impl PlayerAction {
    /// Stable wire name of the action type
    pub fn action_type(&self) -> &'static str {
        match self {
            PlayerAction::UnitMove { .. } => "unit_move",
            PlayerAction::UnitAttack { .. } => "unit_attack",
            PlayerAction::FoundCity { .. } => "found_city",
            PlayerAction::ResearchSelection { .. } => "research_selection",
            PlayerAction::SetProduction { .. } => "set_production",
            PlayerAction::Fortify { .. } => "fortify",
            PlayerAction::EndTurn => "end_turn",
        }
    }
}

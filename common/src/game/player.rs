//! Players and governments.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PlayerId;

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Government {
    #[default]
    Despotism,
    Monarchy,
    Republic,
}

impl Government {
    pub fn id(self) -> &'static str {
        match self {
            Government::Despotism => "despotism",
            Government::Monarchy => "monarchy",
            Government::Republic => "republic",
        }
    }

    pub fn from_id(id: &str) -> Option<Government> {
        match id {
            "despotism" => Some(Government::Despotism),
            "monarchy" => Some(Government::Monarchy),
            "republic" => Some(Government::Republic),
            _ => None,
        }
    }

    /// Despotism caps what a single tile can produce: any yield above 2 is
    /// reduced by one
    pub fn tile_yield(self, raw: u32) -> u32 {
        match self {
            Government::Despotism if raw > 2 => raw - 1,
            _ => raw,
        }
    }

    /// Republic stimulates trade on already-trading tiles
    pub fn trade_bonus(self, raw_trade: u32) -> u32 {
        match self {
            Government::Republic if raw_trade > 0 => raw_trade + 1,
            _ => raw_trade,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Player {
    pub id: PlayerId,
    pub user_id: Option<Uuid>,
    pub name: String,

    /// Nation id in the ruleset
    pub nation: String,
    /// Display name of the civilization
    pub civilization: String,
    pub color: String,

    pub government: Government,
    pub gold: i64,
    pub science: i64,
    pub culture: i64,

    pub has_ended_turn: bool,
    pub is_connected: bool,
    pub is_ai: bool,
}

impl Player {
    pub fn new(id: PlayerId, user_id: Option<Uuid>, name: String, nation: &crate::ruleset::Nation) -> Self {
        Self {
            id,
            user_id,
            name,
            nation: nation.id.clone(),
            civilization: nation.name.clone(),
            color: nation.color.clone(),
            government: Government::Despotism,
            gold: 50,
            science: 0,
            culture: 0,
            has_ended_turn: false,
            is_connected: true,
            is_ai: false,
        }
    }
}

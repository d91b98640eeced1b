//! Turn coordination types.
//!
//! The coordinator itself lives on [`crate::game::Game`]; this module holds
//! the submission, progress, and result shapes plus the cancel token checked
//! at stage boundaries.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use serde::{Deserialize, Serialize};

use super::{action::PlayerAction, PlayerId};

/// Cooperative cancellation, checked between resolution stages
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    #[default]
    Collecting,
    Resolving,
    Done,
}

/// One player's turn submission
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnSubmission {
    pub turn_version: u32,
    pub actions: Vec<PlayerAction>,
    pub idempotency_key: String,
}

/// Streamed while a turn resolves
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub stage: String,
    pub message: String,
    /// 0.0..=1.0
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one replayed action; failures are recorded, never fatal
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub player_id: PlayerId,
    pub action_type: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The terminal frame of a resolution stream
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResult {
    pub success: bool,
    pub turn: u32,
    pub results: Vec<ActionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What `submit_turn` tells the caller to do next
#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    /// This idempotency key already resolved; replay the stored result
    Cached(TurnResult),
    /// Submission buffered; `ready` means every awaited player is in and
    /// resolution should start
    Accepted { ready: bool },
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TurnState {
    /// Monotonically increasing; clients submit against it
    pub turn_version: u32,
    pub phase: TurnPhase,
    pub submissions: BTreeMap<PlayerId, TurnSubmission>,
    /// Idempotency keys seen this turn and the previous one, with the result
    /// each produced
    pub seen_keys: HashMap<String, (u32, TurnResult)>,
}

impl TurnState {
    pub fn new() -> Self {
        Self {
            turn_version: 1,
            phase: TurnPhase::Collecting,
            submissions: BTreeMap::new(),
            seen_keys: HashMap::new(),
        }
    }

    /// Drop cache entries older than the previous turn
    pub fn prune_keys(&mut self) {
        let cutoff = self.turn_version.saturating_sub(1);
        self.seen_keys.retain(|_, (version, _)| *version >= cutoff);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        let peer = token.clone();
        assert!(!token.is_cancelled());
        peer.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_progress_event_wire_shape() {
        let event = ProgressEvent {
            stage: "actions".to_owned(),
            message: "Moving warrior".to_owned(),
            progress: 0.3,
            action_type: Some("unit_move".to_owned()),
            error: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""actionType":"unit_move""#));
        assert!(!json.contains("error"));
    }

    #[test]
    fn test_prune_keys() {
        let mut state = TurnState::new();
        let result = TurnResult {
            success: true,
            turn: 2,
            results: vec![],
            error: None,
        };
        state.seen_keys.insert("old".to_owned(), (1, result.clone()));
        state.seen_keys.insert("new".to_owned(), (3, result));

        state.turn_version = 4;
        state.prune_keys();

        assert!(!state.seen_keys.contains_key("old"));
        assert!(state.seen_keys.contains_key("new"));
    }
}

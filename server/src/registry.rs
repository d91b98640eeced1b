//! The registry of live game instances.
//!
//! Built once at startup and handed to every request handler; no lazy
//! singletons. Each game sits behind its own async mutex, which is what
//! enforces the per-game single-writer rule: at most one mutating operation
//! per game at a time, while different games proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, RwLock};
use uuid::Uuid;

use common::game::{
    turn::{CancelToken, ProgressEvent, TurnResult},
    Game,
};

use crate::store::Store;

/// Frames fanned out to every open resolution stream of one game
#[derive(Clone, Debug)]
pub enum ResolveFrame {
    Progress(ProgressEvent),
    Final(TurnResult),
}

pub struct GameHandle {
    pub game: Mutex<Game>,
    events: broadcast::Sender<ResolveFrame>,
    cancel: std::sync::Mutex<CancelToken>,
}

impl GameHandle {
    fn new(game: Game) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            game: Mutex::new(game),
            events,
            cancel: std::sync::Mutex::new(CancelToken::new()),
        })
    }

    /// Subscribe before submitting so no frame is missed
    pub fn subscribe(&self) -> broadcast::Receiver<ResolveFrame> {
        self.events.subscribe()
    }

    fn fresh_cancel_token(&self) -> CancelToken {
        let token = CancelToken::new();
        *self.cancel.lock().unwrap() = token.clone();
        token
    }

    /// Abort any in-flight resolution at its next stage boundary
    pub fn cancel_in_flight(&self) {
        self.cancel.lock().unwrap().cancel();
    }
}

#[derive(Default)]
pub struct GameRegistry {
    games: RwLock<HashMap<Uuid, Arc<GameHandle>>>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, game: Game) -> Arc<GameHandle> {
        let id = game.id;
        let handle = GameHandle::new(game);
        self.games.write().await.insert(id, handle.clone());
        handle
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<GameHandle>> {
        self.games.read().await.get(&id).cloned()
    }

    /// Remove a game, aborting any resolution in flight; its effects are
    /// discarded, never persisted
    pub async fn remove(&self, id: Uuid) -> Option<Arc<GameHandle>> {
        let handle = self.games.write().await.remove(&id);
        if let Some(handle) = &handle {
            handle.cancel_in_flight();
        }
        handle
    }

    pub async fn ids(&self) -> Vec<Uuid> {
        self.games.read().await.keys().copied().collect()
    }
}

/// Drive one turn resolution to completion.
///
/// Resolution runs on a snapshot; the live game is replaced only after the
/// snapshot both resolved and persisted. Any failure, including a
/// persistence failure, leaves the live game exactly as it was, and the last
/// durable turn stays authoritative.
pub async fn run_resolution(handle: Arc<GameHandle>, store: Store) {
    let cancel = handle.fresh_cancel_token();
    let mut game = handle.game.lock().await;

    let mut working = game.clone();
    let events = handle.events.clone();
    let result = working.resolve_turn(
        &mut |event| {
            let _ = events.send(ResolveFrame::Progress(event));
        },
        &cancel,
    );

    let final_result = if result.success && !cancel.is_cancelled() {
        match store.save_game(&working).await {
            Ok(()) => {
                let log = serde_json::to_string(&result.results)
                    .unwrap_or_else(|_| "[]".to_owned());
                if let Err(err) = store.append_turn_log(working.id, result.turn, &log).await {
                    tracing::warn!(game = %working.id, error = %err, "turn log append failed");
                }
                *game = working;
                result
            }
            Err(err) => {
                tracing::error!(game = %game.id, error = %err, "persistence failed; rolling back");
                TurnResult {
                    success: false,
                    turn: game.turn_version(),
                    results: result.results,
                    error: Some(err.code().to_owned()),
                }
            }
        }
    } else {
        result
    };

    let _ = events.send(ResolveFrame::Final(final_result));
}

/// Arm the per-turn timeout: if the same turn is still collecting when it
/// fires, everyone who hasn't submitted is marked done and the turn resolves
pub fn arm_turn_timeout(handle: Arc<GameHandle>, store: Store, armed_version: u32, secs: u32) {
    if secs == 0 {
        return;
    }
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(u64::from(secs))).await;

        {
            let mut game = handle.game.lock().await;
            if game.turn_version() != armed_version {
                return;
            }
            game.force_end_turns();
            tracing::info!(game = %game.id, "turn timeout elapsed; resolving");
        }
        run_resolution(handle, store).await;
    });
}

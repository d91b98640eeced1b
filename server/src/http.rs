//! HTTP and SSE surface.
//!
//! Thin translation layer: requests authenticate, pick the game out of the
//! registry, take its lock, and call into the engine. Errors cross the wire
//! as `{error, message}` with a mapped status; stack traces never do.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt};
use uuid::Uuid;

use common::{
    game::{
        action::PlayerAction,
        map::gen::{Generator, Landmass, ResourceDensity, StartPosMode},
        turn::{SubmitOutcome, TurnResult, TurnSubmission},
        Game, GameConfig, GameError, GameStatus, PlayerId,
    },
    ruleset::Ruleset,
};

use crate::{
    registry::{self, GameRegistry, ResolveFrame},
    session::{Session, SessionStore},
    store::Store,
};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<GameRegistry>,
    pub sessions: Arc<SessionStore>,
    pub store: Store,
}

/// Every request runs inside a span carrying a fresh request id; log lines
/// under it pick the id up automatically
async fn request_span(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    use tracing::Instrument;

    let request_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "request",
        %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    next.run(request).instrument(span).await
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/auth/login", post(login))
        .route("/api/games", get(list_games).post(create_game))
        .route("/api/games/:id", get(get_game).delete(delete_game))
        .route("/api/games/:id/join", post(join_game))
        .route("/api/games/:id/observe", post(observe_game))
        .route("/api/games/:id/map", get(get_map))
        .route("/api/games/:id/tiles", get(get_map))
        .route("/api/games/:id/units", get(get_units))
        .route("/api/games/:id/cities", get(get_cities))
        .route("/api/games/:id/turns/resolve", post(resolve_turn))
        .route("/api/nations", get(list_nations))
        .route("/api/nations/rulesets", get(list_rulesets))
        .route("/api/nations/:id", get(get_nation))
        .route("/api/nations/:id/leaders", get(get_nation_leaders))
        .layer(axum::middleware::from_fn(request_span))
        .with_state(state)
}

// ---------------------------------------------------------------- errors

pub struct ApiError(GameError);

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        ApiError(err)
    }
}

fn status_for(err: &GameError) -> StatusCode {
    match err {
        GameError::InvalidInput { .. } | GameError::OutOfBounds { .. } => StatusCode::BAD_REQUEST,
        GameError::UnknownId { .. } | GameError::UnknownRuleset { .. } => StatusCode::NOT_FOUND,
        GameError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        GameError::NotHost | GameError::NotPlayerTurn { .. } => StatusCode::FORBIDDEN,
        GameError::GameFull
        | GameError::NationTaken { .. }
        | GameError::GameNotJoinable
        | GameError::GameNotActive
        | GameError::StaleTurn { .. }
        | GameError::CivilianStackingForbidden { .. }
        | GameError::CannotMoveOntoEnemyUnit { .. }
        | GameError::NotEnoughMovement { .. }
        | GameError::InvalidFounderPosition { .. }
        | GameError::CityTooClose { .. }
        | GameError::BuildingAlreadyPresent { .. }
        | GameError::PrereqNotMet { .. }
        | GameError::AlreadyResearched { .. }
        | GameError::InvalidPosition { .. } => StatusCode::CONFLICT,
        GameError::MapGenerationFailed { .. }
        | GameError::PersistenceFailed { .. }
        | GameError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = json!({
            "error": self.0.code(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn require_session(state: &AppState, headers: &HeaderMap) -> ApiResult<Session> {
    state
        .sessions
        .authenticate(headers)
        .ok_or(ApiError(GameError::NotAuthenticated))
}

fn game_not_found() -> ApiError {
    ApiError(GameError::UnknownId {
        kind: "game",
        id: String::new(),
    })
}

// ------------------------------------------------------------------ dtos

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TerrainSettingsRequest {
    generator: Option<String>,
    landmass: Option<String>,
    huts: Option<u8>,
    temperature: Option<u8>,
    wetness: Option<u8>,
    rivers: Option<u8>,
    resources: Option<String>,
    startpos: Option<u8>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGameRequest {
    name: String,
    #[allow(dead_code)]
    game_type: Option<String>,
    max_players: Option<u32>,
    map_width: Option<u16>,
    map_height: Option<u16>,
    terrain_settings: Option<TerrainSettingsRequest>,
    selected_nation: Option<String>,
    seed: Option<String>,
    turn_time_limit: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinRequest {
    civilization: Option<String>,
    selected_nation: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveRequest {
    turn_version: u32,
    player_actions: Vec<PlayerAction>,
    idempotency_key: String,
}

#[derive(Deserialize)]
struct NationsQuery {
    ruleset: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GameSummary {
    id: Uuid,
    name: String,
    host_name: String,
    status: &'static str,
    current_players: usize,
    max_players: u32,
    current_turn: u32,
    map_size: String,
    created_at: Option<String>,
    can_join: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlayerInfo {
    id: PlayerId,
    name: String,
    nation: String,
    civilization: String,
    color: String,
    government: &'static str,
    gold: i64,
    has_ended_turn: bool,
    is_connected: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnitInfo {
    id: u64,
    player_id: PlayerId,
    unit_type: String,
    x: u16,
    y: u16,
    health: u8,
    movement_left: u16,
    veteran_level: u8,
    stance: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CityInfo {
    id: u64,
    player_id: PlayerId,
    name: String,
    x: u16,
    y: u16,
    population: u32,
    food_stock: u32,
    production_stock: u32,
    current_production: Option<common::game::city::Production>,
    buildings: Vec<String>,
    food_per_turn: u32,
    production_per_turn: u32,
    science_per_turn: u32,
    gold_per_turn: u32,
    culture_per_turn: u32,
    is_capital: bool,
}

// -------------------------------------------------------------- handlers

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let username = body.username.trim();
    if username.is_empty() {
        return Err(ApiError(GameError::InvalidInput {
            message: "username must not be empty".to_owned(),
        }));
    }

    let user_id = match state.store.user_id_by_name(username).await? {
        Some(id) => id,
        None => {
            let id = Uuid::new_v4();
            state.store.upsert_user(id, username).await?;
            // A racing login may have won the unique constraint
            state
                .store
                .user_id_by_name(username)
                .await?
                .unwrap_or(id)
        }
    };

    let session_id = state.sessions.login(user_id, username);
    tracing::info!(user = %user_id, "login");
    Ok(Json(json!({"success": true, "sessionId": session_id})))
}

async fn list_games(State(state): State<AppState>) -> ApiResult<Json<Vec<GameSummary>>> {
    let mut summaries = Vec::new();
    for id in state.registry.ids().await {
        let Some(handle) = state.registry.get(id).await else {
            continue;
        };
        let created_at = state.store.game_created_at(id).await.unwrap_or(None);
        let game = handle.game.lock().await;
        summaries.push(summarize(&game, created_at));
    }
    summaries.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    Ok(Json(summaries))
}

fn summarize(game: &Game, created_at: Option<String>) -> GameSummary {
    let host_name = game
        .host_user
        .and_then(|host| game.player_by_user(host))
        .map(|p| p.name.clone())
        .unwrap_or_default();
    GameSummary {
        id: game.id,
        name: game.name().to_owned(),
        host_name,
        status: game.status.id(),
        current_players: game.players().len(),
        max_players: game.max_players(),
        current_turn: game.turn_version(),
        map_size: format!("{}", game.map().dims()),
        created_at,
        can_join: game.can_join(),
    }
}

async fn create_game(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateGameRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let session = require_session(&state, &headers)?;

    let mut config = GameConfig::new(
        body.name.trim(),
        body.seed
            .as_deref()
            .unwrap_or(&Uuid::new_v4().to_string()),
        body.max_players.unwrap_or(2).clamp(1, 12),
        body.map_width.unwrap_or(80),
        body.map_height.unwrap_or(50),
    );
    config.turn_time_limit = body.turn_time_limit.unwrap_or(config.turn_time_limit);

    if let Some(settings) = body.terrain_settings {
        if let Some(generator) = settings.generator {
            config.generator = Generator::from_id(&generator).ok_or_else(|| {
                ApiError(GameError::InvalidInput {
                    message: format!("unknown generator {generator:?}"),
                })
            })?;
        }
        if let Some(landmass) = settings.landmass {
            config.landmass = Landmass::from_id(&landmass).ok_or_else(|| {
                ApiError(GameError::InvalidInput {
                    message: format!("unknown landmass {landmass:?}"),
                })
            })?;
        }
        if let Some(resources) = settings.resources {
            config.resources = ResourceDensity::from_id(&resources).ok_or_else(|| {
                ApiError(GameError::InvalidInput {
                    message: format!("unknown resource density {resources:?}"),
                })
            })?;
        }
        if let Some(startpos) = settings.startpos {
            config.startpos = StartPosMode::from_u8(startpos).ok_or_else(|| {
                ApiError(GameError::InvalidInput {
                    message: format!("startpos={startpos} is outside 0..=4"),
                })
            })?;
        }
        config.huts = settings.huts.unwrap_or(config.huts);
        config.temperature = settings.temperature.unwrap_or(config.temperature);
        config.wetness = settings.wetness.unwrap_or(config.wetness);
        config.rivers = settings.rivers.unwrap_or(config.rivers);
    }

    // Generation is pure CPU; keep it off the request executor
    let host = session.user_id;
    let game_id = Uuid::new_v4();
    let mut game = tokio::task::spawn_blocking(move || Game::new(game_id, Some(host), config))
        .await
        .map_err(|e| {
            ApiError(GameError::Internal {
                message: e.to_string(),
            })
        })??;

    let assigned_nation = {
        let player = game.join(
            session.user_id,
            &session.username,
            body.selected_nation.as_deref(),
        )?;
        game.player(player).map(|p| p.nation.clone())
    };

    state.store.save_game(&game).await?;
    tracing::info!(game = %game.id, name = %game.name(), "game created");
    state.registry.insert(game).await;

    Ok(Json(json!({
        "success": true,
        "gameId": game_id,
        "assignedNation": assigned_nation,
    })))
}

async fn get_game(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let handle = state.registry.get(id).await.ok_or_else(game_not_found)?;
    let session = state.sessions.authenticate(&headers);
    let game = handle.game.lock().await;

    let me = session
        .as_ref()
        .and_then(|s| game.player_by_user(s.user_id));
    let is_host = match (&session, game.host_user) {
        (Some(s), Some(host)) => s.user_id == host,
        _ => false,
    };

    let players: Vec<PlayerInfo> = game
        .players()
        .iter()
        .map(|p| PlayerInfo {
            id: p.id,
            name: p.name.clone(),
            nation: p.nation.clone(),
            civilization: p.civilization.clone(),
            color: p.color.clone(),
            government: p.government.id(),
            gold: p.gold,
            has_ended_turn: p.has_ended_turn,
            is_connected: p.is_connected,
        })
        .collect();

    Ok(Json(json!({
        "id": game.id,
        "name": game.name(),
        "status": game.status.id(),
        "currentPlayer": me.map(|p| p.id),
        "currentTurn": game.turn_version(),
        "players": players,
        "isMyTurn": game.status == GameStatus::Playing
            && me.map(|p| !p.has_ended_turn).unwrap_or(false),
        "isHost": is_host,
        "canObserve": true,
        "year": game.year(),
        "maxPlayers": game.max_players(),
        "mapSize": format!("{}", game.map().dims()),
    })))
}

async fn join_game(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<JoinRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let session = require_session(&state, &headers)?;
    let handle = state.registry.get(id).await.ok_or_else(game_not_found)?;

    let nation = body.selected_nation.or(body.civilization);
    let (player_id, assigned_nation, snapshot) = {
        let mut game = handle.game.lock().await;
        let player_id = game.join(session.user_id, &session.username, nation.as_deref())?;
        let assigned = game.player(player_id).map(|p| p.nation.clone());
        (player_id, assigned, game.clone())
    };

    state.store.save_game(&snapshot).await?;
    tracing::info!(game = %id, player = player_id, "player joined");

    Ok(Json(json!({
        "success": true,
        "playerId": player_id,
        "assignedNation": assigned_nation,
    })))
}

async fn observe_game(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let session = require_session(&state, &headers)?;
    let handle = state.registry.get(id).await.ok_or_else(game_not_found)?;
    handle.game.lock().await.observe(session.user_id);
    Ok(Json(json!({"success": true})))
}

async fn delete_game(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let session = require_session(&state, &headers)?;
    let handle = state.registry.get(id).await.ok_or_else(game_not_found)?;

    {
        let game = handle.game.lock().await;
        if game.host_user != Some(session.user_id) {
            return Err(ApiError(GameError::NotHost));
        }
    }

    state.registry.remove(id).await;
    state.store.delete_game(id).await?;
    tracing::info!(game = %id, "game deleted");
    Ok(Json(json!({"success": true})))
}

/// The caller's standing in a game: a seated player, or an observer who
/// sees everything
enum Viewer {
    Player(PlayerId),
    Observer,
}

fn viewer_for(game: &Game, session: &Session) -> ApiResult<Viewer> {
    if let Some(player) = game.player_by_user(session.user_id) {
        return Ok(Viewer::Player(player.id));
    }
    if game.is_observer(session.user_id) || game.host_user == Some(session.user_id) {
        return Ok(Viewer::Observer);
    }
    Err(ApiError(GameError::NotAuthenticated))
}

async fn get_map(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let session = require_session(&state, &headers)?;
    let handle = state.registry.get(id).await.ok_or_else(game_not_found)?;
    let game = handle.game.lock().await;

    let tiles = match viewer_for(&game, &session)? {
        Viewer::Player(player) => {
            game.visibility()
                .player_map_view(player, game.map(), game.units(), game.cities())
        }
        Viewer::Observer => full_map_view(&game),
    };

    Ok(Json(json!({
        "width": game.map().dims().width,
        "height": game.map().dims().height,
        "startingPositions": game.map().starting_positions(),
        "tiles": tiles,
    })))
}

fn full_map_view(game: &Game) -> Vec<common::game::visibility::TileView> {
    game.map()
        .iter_tiles()
        .map(|(loc, tile)| common::game::visibility::TileView {
            x: loc.x,
            y: loc.y,
            terrain: tile.terrain,
            elevation: tile.elevation,
            river_mask: tile.river_mask,
            continent_id: tile.continent_id,
            resource: tile.resource,
            improvements: tile.improvements.iter().copied().collect(),
            visible: true,
            city_id: tile.city_id,
            unit_ids: tile.unit_ids.clone(),
        })
        .collect()
}

async fn get_units(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<UnitInfo>>> {
    let session = require_session(&state, &headers)?;
    let handle = state.registry.get(id).await.ok_or_else(game_not_found)?;
    let game = handle.game.lock().await;
    let viewer = viewer_for(&game, &session)?;

    let units = game
        .units()
        .units()
        .filter(|u| match &viewer {
            Viewer::Observer => true,
            Viewer::Player(p) => u.owner == *p || game.visibility().is_visible(*p, u.loc),
        })
        .map(|u| UnitInfo {
            id: u.id.value(),
            player_id: u.owner,
            unit_type: u.type_id.clone(),
            x: u.loc.x,
            y: u.loc.y,
            health: u.health,
            movement_left: u.movement_left,
            veteran_level: u.veteran_level,
            stance: u.stance.id(),
        })
        .collect();

    Ok(Json(units))
}

async fn get_cities(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<CityInfo>>> {
    let session = require_session(&state, &headers)?;
    let handle = state.registry.get(id).await.ok_or_else(game_not_found)?;
    let game = handle.game.lock().await;
    let viewer = viewer_for(&game, &session)?;

    let cities = game
        .cities()
        .cities()
        .filter(|c| match &viewer {
            Viewer::Observer => true,
            Viewer::Player(p) => c.owner == *p || game.visibility().is_explored(*p, c.loc),
        })
        .map(|c| CityInfo {
            id: c.id.value(),
            player_id: c.owner,
            name: c.name.clone(),
            x: c.loc.x,
            y: c.loc.y,
            population: c.population,
            food_stock: c.food_stock,
            production_stock: c.production_stock,
            current_production: c.current_production.clone(),
            buildings: c.buildings.iter().cloned().collect(),
            food_per_turn: c.yields.food,
            production_per_turn: c.yields.production,
            science_per_turn: c.yields.science,
            gold_per_turn: c.yields.gold,
            culture_per_turn: c.yields.culture,
            is_capital: c.is_capital,
        })
        .collect();

    Ok(Json(cities))
}

fn progress_frame(event: &common::game::turn::ProgressEvent) -> Event {
    Event::default()
        .event("progress")
        .data(serde_json::to_string(event).unwrap_or_else(|_| "{}".to_owned()))
}

fn final_frame(result: &TurnResult) -> Event {
    Event::default().data(serde_json::to_string(result).unwrap_or_else(|_| "{}".to_owned()))
}

async fn resolve_turn(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<ResolveRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let session = require_session(&state, &headers)?;
    let handle = state.registry.get(id).await.ok_or_else(game_not_found)?;

    // Subscribe before submitting so the stream cannot miss frames
    let mut events = handle.subscribe();
    let (tx, rx) = mpsc::unbounded_channel::<Event>();

    let submission = TurnSubmission {
        turn_version: body.turn_version,
        actions: body.player_actions,
        idempotency_key: body.idempotency_key,
    };

    let (outcome, current_version, turn_time_limit) = {
        let mut game = handle.game.lock().await;
        let player = game
            .player_by_user(session.user_id)
            .map(|p| p.id)
            .ok_or(ApiError(GameError::NotAuthenticated))?;
        (
            game.submit_turn(player, submission),
            game.turn_version(),
            game.turn_time_limit(),
        )
    };

    match outcome {
        Err(err) => {
            // Terminal error frame, e.g. StaleTurn; no side effects occurred
            let _ = tx.send(final_frame(&TurnResult {
                success: false,
                turn: current_version,
                results: vec![],
                error: Some(err.code().to_owned()),
            }));
        }
        Ok(SubmitOutcome::Cached(result)) => {
            let _ = tx.send(final_frame(&result));
        }
        Ok(SubmitOutcome::Accepted { ready }) => {
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(ResolveFrame::Progress(event)) => {
                            if tx.send(progress_frame(&event)).is_err() {
                                break;
                            }
                        }
                        Ok(ResolveFrame::Final(result)) => {
                            let _ = tx.send(final_frame(&result));
                            break;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            });

            if ready {
                tokio::spawn(registry::run_resolution(
                    handle.clone(),
                    state.store.clone(),
                ));
            } else {
                registry::arm_turn_timeout(
                    handle.clone(),
                    state.store.clone(),
                    current_version,
                    turn_time_limit,
                );
            }
        }
    }

    let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// -------------------------------------------------------------- nations

async fn list_nations(
    Query(query): Query<NationsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let name = query.ruleset.unwrap_or_else(|| "classic".to_owned());
    let ruleset = Ruleset::load(&name)?;
    Ok(Json(json!({
        "nations": ruleset.nations(),
        "metadata": {
            "ruleset": ruleset.name(),
            "count": ruleset.nations().len(),
        },
    })))
}

async fn list_rulesets() -> Json<serde_json::Value> {
    Json(json!({"rulesets": Ruleset::available()}))
}

async fn get_nation(Path(id): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    let ruleset = Ruleset::load("classic")?;
    let nation = ruleset.nation(&id)?;
    Ok(Json(serde_json::to_value(nation).unwrap_or_default()))
}

async fn get_nation_leaders(Path(id): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    let ruleset = Ruleset::load("classic")?;
    let nation = ruleset.nation(&id)?;
    Ok(Json(json!({"leaders": nation.leaders})))
}

#[cfg(test)]
mod test {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        AppState {
            registry: Arc::new(GameRegistry::new()),
            sessions: Arc::new(SessionStore::new()),
            store: Store::connect("sqlite::memory:").await.unwrap(),
        }
    }

    async fn send(
        router: &Router,
        method: &str,
        uri: &str,
        session: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(session) = session {
            request = request.header("x-session-id", session);
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    async fn login(router: &Router, username: &str) -> String {
        let (status, body) = send(
            router,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"username": username})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["sessionId"].as_str().unwrap().to_owned()
    }

    #[tokio::test]
    async fn test_health() {
        let router = router(test_state().await);
        let (status, body) = send(&router, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_auth_required() {
        let router = router(test_state().await);
        let (status, body) = send(
            &router,
            "POST",
            "/api/games",
            None,
            Some(json!({"name": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "NotAuthenticated");
    }

    #[tokio::test]
    async fn test_nations_endpoints() {
        let router = router(test_state().await);

        let (status, body) = send(&router, "GET", "/api/nations?ruleset=classic", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["nations"].as_array().unwrap().len() >= 8);
        assert_eq!(body["metadata"]["ruleset"], "classic");

        let (status, _) = send(&router, "GET", "/api/nations?ruleset=martian", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&router, "GET", "/api/nations/romans/leaders", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body["leaders"].as_array().unwrap().is_empty());

        let (status, body) = send(&router, "GET", "/api/nations/rulesets", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rulesets"][0], "classic");
    }

    /// Create a two-player game and join both users; returns the game id and
    /// both session tokens
    async fn started_game(router: &Router) -> (String, String, String) {
        let alice = login(router, "alice").await;
        let bob = login(router, "bob").await;

        let (status, body) = send(
            router,
            "POST",
            "/api/games",
            Some(&alice),
            Some(json!({
                "name": "api-game",
                "maxPlayers": 2,
                "mapWidth": 20,
                "mapHeight": 20,
                "seed": "api-seed",
                "terrainSettings": {"generator": "fractal", "landmass": "normal"},
                "selectedNation": "romans",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["success"], true);
        assert_eq!(body["assignedNation"], "romans");
        let game_id = body["gameId"].as_str().unwrap().to_owned();

        let (status, body) = send(
            router,
            "POST",
            &format!("/api/games/{game_id}/join"),
            Some(&bob),
            Some(json!({"selectedNation": "random"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["playerId"], 1);

        (game_id, alice, bob)
    }

    #[tokio::test]
    async fn test_game_lifecycle() {
        let router = router(test_state().await);
        let (game_id, alice, bob) = started_game(&router).await;

        // Listed, full, playing
        let (status, body) = send(&router, "GET", "/api/games", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        let games = body.as_array().unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0]["status"], "playing");
        assert_eq!(games[0]["canJoin"], false);
        assert_eq!(games[0]["currentPlayers"], 2);
        assert_eq!(games[0]["mapSize"], "20x20");

        // Snapshot
        let (status, body) = send(
            &router,
            "GET",
            &format!("/api/games/{game_id}"),
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["currentTurn"], 1);
        assert_eq!(body["isHost"], true);
        assert_eq!(body["isMyTurn"], true);
        assert_eq!(body["players"].as_array().unwrap().len(), 2);
        assert_eq!(body["year"], -4000);

        // A third user can neither join nor see the map
        let carol = login(&router, "carol").await;
        let (status, body) = send(
            &router,
            "POST",
            &format!("/api/games/{game_id}/join"),
            Some(&carol),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "GameNotJoinable");

        let (status, _) = send(
            &router,
            "GET",
            &format!("/api/games/{game_id}/map"),
            Some(&carol),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // After observing, carol sees the whole board
        let (status, _) = send(
            &router,
            "POST",
            &format!("/api/games/{game_id}/observe"),
            Some(&carol),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(
            &router,
            "GET",
            &format!("/api/games/{game_id}/map"),
            Some(&carol),
            None,
        )
        .await;
        assert_eq!(body["tiles"].as_array().unwrap().len(), 400);

        // Players see only their fog-limited view
        let (_, body) = send(
            &router,
            "GET",
            &format!("/api/games/{game_id}/map"),
            Some(&bob),
            None,
        )
        .await;
        let visible = body["tiles"].as_array().unwrap().len();
        assert!(visible > 0 && visible < 400);

        // Only the host deletes
        let (status, body) = send(
            &router,
            "DELETE",
            &format!("/api/games/{game_id}"),
            Some(&bob),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "NotHost");

        let (status, _) = send(
            &router,
            "DELETE",
            &format!("/api/games/{game_id}"),
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &router,
            "GET",
            &format!("/api/games/{game_id}"),
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_turn_resolution_over_sse() {
        let router = router(test_state().await);
        let (game_id, alice, bob) = started_game(&router).await;
        let uri = format!("/api/games/{game_id}/turns/resolve");

        // Bob submits first; his stream stays open awaiting the others, so
        // it is dropped unread
        let bob_request = Request::builder()
            .method("POST")
            .uri(&uri)
            .header("x-session-id", &bob)
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "turnVersion": 1,
                    "playerActions": [],
                    "idempotencyKey": "bob-1",
                })
                .to_string(),
            ))
            .unwrap();
        let bob_response = router.clone().oneshot(bob_request).await.unwrap();
        assert_eq!(bob_response.status(), StatusCode::OK);
        drop(bob_response);

        // Alice completes the turn; her stream carries progress frames and
        // the terminal result
        let alice_body = json!({
            "turnVersion": 1,
            "playerActions": [{"type": "end_turn"}],
            "idempotencyKey": "alice-1",
        });
        let request = Request::builder()
            .method("POST")
            .uri(&uri)
            .header("x-session-id", &alice)
            .header("content-type", "application/json")
            .body(Body::from(alice_body.to_string()))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let sse = String::from_utf8(
            response
                .into_body()
                .collect()
                .await
                .unwrap()
                .to_bytes()
                .to_vec(),
        )
        .unwrap();

        assert!(sse.contains("event: progress"), "{sse}");
        assert!(sse.contains(r#""success":true"#), "{sse}");
        assert!(sse.contains(r#""turn":2"#), "{sse}");

        // The turn advanced exactly once
        let (_, body) = send(
            &router,
            "GET",
            &format!("/api/games/{game_id}"),
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(body["currentTurn"], 2);

        // Replaying the identical submission returns the cached result and
        // does not advance the turn again
        let request = Request::builder()
            .method("POST")
            .uri(&uri)
            .header("x-session-id", &alice)
            .header("content-type", "application/json")
            .body(Body::from(alice_body.to_string()))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let replay = String::from_utf8(
            response
                .into_body()
                .collect()
                .await
                .unwrap()
                .to_bytes()
                .to_vec(),
        )
        .unwrap();
        assert!(replay.contains(r#""turn":2"#), "{replay}");

        let (_, body) = send(
            &router,
            "GET",
            &format!("/api/games/{game_id}"),
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(body["currentTurn"], 2);

        // A stale submission is rejected in the terminal frame
        let request = Request::builder()
            .method("POST")
            .uri(&uri)
            .header("x-session-id", &alice)
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "turnVersion": 1,
                    "playerActions": [],
                    "idempotencyKey": "alice-stale",
                })
                .to_string(),
            ))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let stale = String::from_utf8(
            response
                .into_body()
                .collect()
                .await
                .unwrap()
                .to_bytes()
                .to_vec(),
        )
        .unwrap();
        assert!(stale.contains("StaleTurn"), "{stale}");
    }
}

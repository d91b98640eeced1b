//!
//! Abstract game engine.
//!
//! One [`Game`] is a single hosted match: a generated map plus the managers
//! for units, cities, research, visibility, and turn progression, composed
//! by value. All rule enforcement happens here; transport and persistence
//! live in the server crate.

pub mod action;
pub mod city;
pub mod combat;
pub mod error;
pub mod map;
pub mod player;
pub mod research;
pub mod turn;
pub mod unit;
pub mod visibility;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    conf,
    rng::GameRng,
    ruleset::Ruleset,
    util::{Dims, Location, Wrap},
};

use self::{
    action::PlayerAction,
    city::CityManager,
    map::{
        gen::{self, GenParams, Generator, Landmass, ResourceDensity, StartPosMode},
        MapState,
    },
    player::Player,
    research::ResearchManager,
    turn::{
        ActionResult, CancelToken, ProgressEvent, SubmitOutcome, TurnPhase, TurnResult, TurnState,
        TurnSubmission,
    },
    unit::UnitManager,
    visibility::VisibilityManager,
};

pub use self::error::{GameError, GameResult};

/// Stable per-game player number; also the order actions replay in
pub type PlayerId = u32;

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    #[default]
    Lobby,
    Playing,
    Finished,
}

impl GameStatus {
    pub fn id(self) -> &'static str {
        match self {
            GameStatus::Lobby => "lobby",
            GameStatus::Playing => "playing",
            GameStatus::Finished => "finished",
        }
    }

    pub fn from_id(id: &str) -> Option<GameStatus> {
        match id {
            "lobby" => Some(GameStatus::Lobby),
            "playing" => Some(GameStatus::Playing),
            "finished" => Some(GameStatus::Finished),
            _ => None,
        }
    }
}

/// Everything needed to create a game
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GameConfig {
    pub name: String,
    pub ruleset: String,
    pub max_players: u32,
    pub map_width: u16,
    pub map_height: u16,
    pub generator: Generator,
    pub landmass: Landmass,
    pub huts: u8,
    pub temperature: u8,
    pub wetness: u8,
    pub rivers: u8,
    pub resources: ResourceDensity,
    pub startpos: StartPosMode,
    pub seed: String,
    pub turn_time_limit: u32,
}

impl GameConfig {
    pub fn new(name: &str, seed: &str, max_players: u32, width: u16, height: u16) -> Self {
        Self {
            name: name.to_owned(),
            ruleset: crate::ruleset::DEFAULT_RULESET.to_owned(),
            max_players,
            map_width: width,
            map_height: height,
            generator: Generator::Fractal,
            landmass: Landmass::Normal,
            huts: 15,
            temperature: 50,
            wetness: 50,
            rivers: 50,
            resources: ResourceDensity::Normal,
            startpos: StartPosMode::Default,
            seed: seed.to_owned(),
            turn_time_limit: conf::DEFAULT_TURN_TIME_LIMIT,
        }
    }

    fn gen_params(&self) -> GenParams {
        GenParams {
            generator: self.generator,
            landmass: self.landmass,
            huts: self.huts,
            temperature: self.temperature,
            wetness: self.wetness,
            rivers: self.rivers,
            resources: self.resources,
            startpos: self.startpos,
            seed: self.seed.clone(),
            players: (0..self.max_players).collect(),
            wrap: Wrap::NEITHER,
        }
    }
}

/// One hosted game instance. Exclusively owns its world; the server
/// serializes access so at most one mutating call runs at a time.
#[derive(Clone)]
pub struct Game {
    pub id: Uuid,
    pub host_user: Option<Uuid>,
    pub status: GameStatus,

    config: GameConfig,
    ruleset: Arc<Ruleset>,
    map: MapState,
    players: Vec<Player>,
    observers: Vec<Uuid>,
    units: UnitManager,
    cities: CityManager,
    research: ResearchManager,
    visibility: VisibilityManager,
    turn_state: TurnState,
}

impl Game {
    /// Create a game and generate its world. Generation runs to completion
    /// here; a game never reaches players with a half-built map.
    pub fn new(id: Uuid, host_user: Option<Uuid>, config: GameConfig) -> GameResult<Self> {
        let ruleset = Ruleset::load(&config.ruleset)?;
        if config.max_players == 0 {
            return Err(GameError::InvalidInput {
                message: "maxPlayers must be at least 1".to_owned(),
            });
        }

        let dims = Dims::new(config.map_width, config.map_height);
        let map = gen::generate(dims, &config.gen_params())?;

        Ok(Self {
            id,
            host_user,
            status: GameStatus::Lobby,
            config,
            ruleset,
            map,
            players: Vec::new(),
            observers: Vec::new(),
            units: UnitManager::new(),
            cities: CityManager::new(),
            research: ResearchManager::new(),
            visibility: VisibilityManager::new(),
            turn_state: TurnState::new(),
        })
    }

    pub fn ruleset(&self) -> &Arc<Ruleset> {
        &self.ruleset
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn max_players(&self) -> u32 {
        self.config.max_players
    }

    pub fn turn_time_limit(&self) -> u32 {
        self.config.turn_time_limit
    }

    pub fn seed(&self) -> &str {
        &self.config.seed
    }

    pub fn map(&self) -> &MapState {
        &self.map
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_by_user(&self, user: Uuid) -> Option<&Player> {
        self.players.iter().find(|p| p.user_id == Some(user))
    }

    pub fn units(&self) -> &UnitManager {
        &self.units
    }

    pub fn cities(&self) -> &CityManager {
        &self.cities
    }

    pub fn research(&self) -> &ResearchManager {
        &self.research
    }

    pub fn visibility(&self) -> &VisibilityManager {
        &self.visibility
    }

    pub fn turn_version(&self) -> u32 {
        self.turn_state.turn_version
    }

    pub fn turn_phase(&self) -> TurnPhase {
        self.turn_state.phase
    }

    pub fn year(&self) -> i32 {
        conf::year_of_turn(self.turn_state.turn_version)
    }

    pub fn is_observer(&self, user: Uuid) -> bool {
        self.observers.contains(&user)
    }

    pub fn can_join(&self) -> bool {
        self.status == GameStatus::Lobby && (self.players.len() as u32) < self.config.max_players
    }

    /// The nations nobody has claimed yet
    pub fn free_nations(&self) -> Vec<&crate::ruleset::Nation> {
        self.ruleset
            .nations()
            .iter()
            .filter(|n| !self.players.iter().any(|p| p.nation == n.id))
            .collect()
    }

    /// Join as a player. `nation` of `None` or `"random"` lets the server
    /// pick a free one; a named nation must be free. A user who already
    /// joined gets their existing seat back.
    pub fn join(
        &mut self,
        user: Uuid,
        username: &str,
        nation: Option<&str>,
    ) -> GameResult<PlayerId> {
        if let Some(existing) = self.player_by_user(user) {
            return Ok(existing.id);
        }
        if self.status != GameStatus::Lobby {
            return Err(GameError::GameNotJoinable);
        }
        if self.players.len() as u32 >= self.config.max_players {
            return Err(GameError::GameFull);
        }

        let nation = match nation {
            None | Some("random") => self
                .free_nations()
                .first()
                .copied()
                .cloned()
                .ok_or(GameError::GameFull)?,
            Some(wanted) => {
                let nation = self.ruleset.nation(wanted)?.clone();
                if self.players.iter().any(|p| p.nation == nation.id) {
                    return Err(GameError::NationTaken { nation: nation.id });
                }
                nation
            }
        };

        let id = self.players.len() as PlayerId;
        self.players
            .push(Player::new(id, Some(user), username.to_owned(), &nation));
        self.research.ensure_player(id);
        self.visibility.ensure_player(id, self.map.dims());

        if self.players.len() as u32 == self.config.max_players {
            self.start_playing()?;
        }

        Ok(id)
    }

    pub fn observe(&mut self, user: Uuid) {
        if !self.observers.contains(&user) {
            self.observers.push(user);
        }
    }

    /// Transition lobby -> playing: give every player their starting units
    /// at the map's starting positions and open their eyes
    fn start_playing(&mut self) -> GameResult<()> {
        self.status = GameStatus::Playing;

        for player in 0..self.players.len() as PlayerId {
            let start = self
                .map
                .starting_position(player)
                .ok_or(GameError::Internal {
                    message: format!("player {player} has no starting position"),
                })?;

            self.units
                .create(&mut self.map, &self.ruleset, player, "settlers", start, 1)?;
            self.units
                .create(&mut self.map, &self.ruleset, player, "warriors", start, 1)?;
        }

        for player in 0..self.players.len() as PlayerId {
            self.visibility.update_player_visibility(
                player,
                &self.map,
                &self.units,
                &self.cities,
                &self.ruleset,
            );
        }

        Ok(())
    }

    /// Accept a player's turn submission.
    ///
    /// Replayed idempotency keys return the stored result before any other
    /// check; a mismatched turn version is a stale submission.
    pub fn submit_turn(
        &mut self,
        player: PlayerId,
        submission: TurnSubmission,
    ) -> GameResult<SubmitOutcome> {
        if self.status != GameStatus::Playing {
            return Err(GameError::GameNotActive);
        }
        if self.player(player).is_none() {
            return Err(GameError::UnknownId {
                kind: "player",
                id: player.to_string(),
            });
        }

        if let Some((_, result)) = self.turn_state.seen_keys.get(&submission.idempotency_key) {
            return Ok(SubmitOutcome::Cached(result.clone()));
        }

        if submission.turn_version != self.turn_state.turn_version {
            return Err(GameError::StaleTurn {
                submitted: submission.turn_version,
                current: self.turn_state.turn_version,
            });
        }

        self.turn_state.submissions.insert(player, submission);
        self.players
            .iter_mut()
            .find(|p| p.id == player)
            .unwrap()
            .has_ended_turn = true;

        Ok(SubmitOutcome::Accepted {
            ready: self.all_awaited_players_ended(),
        })
    }

    /// AI players and disconnected players are never awaited
    fn all_awaited_players_ended(&self) -> bool {
        self.players
            .iter()
            .filter(|p| p.is_connected && !p.is_ai)
            .all(|p| p.has_ended_turn)
            && !self.turn_state.submissions.is_empty()
    }

    /// Turn-timeout path: everyone who hasn't submitted is treated as having
    /// ended their turn with no actions
    pub fn force_end_turns(&mut self) {
        for player in &mut self.players {
            player.has_ended_turn = true;
        }
    }

    /// Resolve the current turn in place.
    ///
    /// The server runs this on a snapshot and commits the snapshot only on
    /// success, which is what makes the rollback semantics trivial: a failed
    /// or cancelled resolution is simply dropped.
    pub fn resolve_turn(
        &mut self,
        emit: &mut dyn FnMut(ProgressEvent),
        cancel: &CancelToken,
    ) -> TurnResult {
        let version = self.turn_state.turn_version;
        self.turn_state.phase = TurnPhase::Resolving;

        let fail = |error: &str, results: Vec<ActionResult>| TurnResult {
            success: false,
            turn: version,
            results,
            error: Some(error.to_owned()),
        };

        emit(progress_event(
            "start",
            format!("Resolving turn {version}"),
            0.0,
            None,
            None,
        ));

        // Stage 1: replay actions in stable player order, submission order
        // within each player. Failures are recorded and skipped.
        let mut results: Vec<ActionResult> = Vec::new();
        let mut combat_rng = GameRng::turn_stream(&self.config.seed, version, "combat");

        let submissions = self.turn_state.submissions.clone();
        let total_actions: usize = submissions.values().map(|s| s.actions.len()).sum();
        let mut replayed = 0usize;

        for (player, submission) in &submissions {
            for action in &submission.actions {
                let action_type = action.action_type().to_owned();
                let outcome = self.apply_action(*player, action, &mut combat_rng);
                replayed += 1;

                let progress = 0.05 + 0.4 * replayed as f64 / total_actions.max(1) as f64;
                match outcome {
                    Ok(message) => {
                        emit(progress_event(
                            "actions",
                            message.clone(),
                            progress,
                            Some(action_type.clone()),
                            None,
                        ));
                        results.push(ActionResult {
                            player_id: *player,
                            action_type,
                            success: true,
                            error: None,
                            message: Some(message),
                        });
                    }
                    Err(err) => {
                        emit(progress_event(
                            "actions",
                            err.to_string(),
                            progress,
                            Some(action_type.clone()),
                            Some(err.code().to_owned()),
                        ));
                        results.push(ActionResult {
                            player_id: *player,
                            action_type,
                            success: false,
                            error: Some(err.code().to_owned()),
                            message: Some(err.to_string()),
                        });
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            return fail("Cancelled", results);
        }

        // Stage 2: cities grow and produce; their yields feed treasuries and
        // research
        emit(progress_event(
            "cities",
            "Advancing cities".to_owned(),
            0.5,
            None,
            None,
        ));

        let governments: BTreeMap<PlayerId, player::Government> = self
            .players
            .iter()
            .map(|p| (p.id, p.government))
            .collect();
        if let Err(err) = self.cities.process_all_cities_turn(
            &mut self.map,
            &self.ruleset,
            &mut self.units,
            &governments,
            version + 1,
        ) {
            return fail(err.code(), results);
        }

        for player in &mut self.players {
            let (science, gold, culture) = self
                .cities
                .player_cities(player.id)
                .fold((0u32, 0u32, 0u32), |acc, c| {
                    (
                        acc.0 + c.yields.science,
                        acc.1 + c.yields.gold,
                        acc.2 + c.yields.culture,
                    )
                });
            player.gold += i64::from(gold);
            player.culture += i64::from(culture);
            player.science += i64::from(science);
            if let Err(err) = self
                .research
                .add_research_points(&self.ruleset, player.id, science)
            {
                return fail(err.code(), results);
            }
        }

        if cancel.is_cancelled() {
            return fail("Cancelled", results);
        }

        // Stage 3: movement refresh and healing
        emit(progress_event(
            "units",
            "Refreshing units".to_owned(),
            0.7,
            None,
            None,
        ));
        for player in 0..self.players.len() as PlayerId {
            if let Err(err) = self.units.reset_movement(&self.map, &self.ruleset, player) {
                return fail(err.code(), results);
            }
        }

        if cancel.is_cancelled() {
            return fail("Cancelled", results);
        }

        // Stage 4: fresh eyes for everyone
        emit(progress_event(
            "visibility",
            "Updating visibility".to_owned(),
            0.85,
            None,
            None,
        ));
        for player in 0..self.players.len() as PlayerId {
            self.visibility.update_player_visibility(
                player,
                &self.map,
                &self.units,
                &self.cities,
                &self.ruleset,
            );
        }

        // Stage 5: advance the turn
        self.turn_state.turn_version += 1;
        for player in &mut self.players {
            player.has_ended_turn = false;
        }

        let result = TurnResult {
            success: true,
            turn: self.turn_state.turn_version,
            results,
            error: None,
        };

        for submission in submissions.values() {
            self.turn_state
                .seen_keys
                .insert(submission.idempotency_key.clone(), (version, result.clone()));
        }
        self.turn_state.submissions.clear();
        self.turn_state.prune_keys();
        self.turn_state.phase = TurnPhase::Collecting;

        self.check_victory();

        emit(progress_event(
            "complete",
            format!("Turn {} begins", self.turn_state.turn_version),
            1.0,
            None,
            None,
        ));

        result
    }

    /// A game with at least two seats ends when only one civilization still
    /// holds anything on the map
    fn check_victory(&mut self) {
        if self.players.len() < 2 {
            return;
        }
        let alive = self
            .players
            .iter()
            .filter(|p| {
                self.units.player_units(p.id).next().is_some()
                    || self.cities.player_cities(p.id).next().is_some()
            })
            .count();
        if alive <= 1 {
            self.status = GameStatus::Finished;
            self.turn_state.phase = TurnPhase::Done;
        }
    }

    fn apply_action(
        &mut self,
        player: PlayerId,
        action: &PlayerAction,
        combat_rng: &mut GameRng,
    ) -> GameResult<String> {
        match action {
            PlayerAction::UnitMove { unit_id, to_x, to_y } => {
                let dest = self.loc_from(*to_x, *to_y)?;
                let id = unit::UnitId::new(*unit_id);
                self.units
                    .move_unit(&mut self.map, &self.ruleset, player, id, dest)?;
                Ok(format!("Moved unit {unit_id} to {dest}"))
            }

            PlayerAction::UnitAttack {
                attacker_unit_id,
                defender_unit_id,
            } => {
                let attacker = unit::UnitId::new(*attacker_unit_id);
                let defender = unit::UnitId::new(*defender_unit_id);
                let wall_bonus = self
                    .units
                    .unit(defender)
                    .map(|d| self.cities.garrison_defense_pct(&self.ruleset, d.loc))
                    .unwrap_or(0);
                let outcome = self.units.attack(
                    &mut self.map,
                    &self.ruleset,
                    player,
                    attacker,
                    defender,
                    wall_bonus,
                    combat_rng,
                )?;
                Ok(format!(
                    "Attack dealt {} damage, took {}{}",
                    outcome.defender_damage,
                    outcome.attacker_damage,
                    if outcome.defender_destroyed {
                        "; defender destroyed"
                    } else if outcome.attacker_destroyed {
                        "; attacker destroyed"
                    } else {
                        ""
                    }
                ))
            }

            PlayerAction::FoundCity { name, x, y } => {
                let loc = self.loc_from(*x, *y)?;
                let founder = self
                    .units
                    .player_units(player)
                    .find(|u| {
                        u.loc == loc
                            && self
                                .ruleset
                                .unit_type(&u.type_id)
                                .map(|t| t.can_found_city)
                                .unwrap_or(false)
                    })
                    .map(|u| u.id)
                    .ok_or(GameError::InvalidFounderPosition { loc })?;

                let government = self
                    .player(player)
                    .map(|p| p.government)
                    .unwrap_or_default();
                self.cities.found_city(
                    &mut self.map,
                    &self.ruleset,
                    player,
                    name,
                    loc,
                    self.turn_state.turn_version,
                    government,
                )?;
                self.units.destroy(&mut self.map, founder)?;
                Ok(format!("Founded {name} at {loc}"))
            }

            PlayerAction::ResearchSelection { tech_id } => {
                self.research
                    .set_current_research(&self.ruleset, player, tech_id)?;
                Ok(format!("Research set to {tech_id}"))
            }

            PlayerAction::SetProduction { city_id, id, kind } => {
                self.cities.set_production(
                    &self.ruleset,
                    player,
                    city::CityId::new(*city_id),
                    id,
                    *kind,
                )?;
                Ok(format!("Production set to {id}"))
            }

            PlayerAction::Fortify { unit_id } => {
                self.units
                    .set_stance(player, unit::UnitId::new(*unit_id), unit::Stance::Fortified)?;
                Ok(format!("Unit {unit_id} fortifying"))
            }

            PlayerAction::EndTurn => Ok("Turn ended".to_owned()),
        }
    }

    fn loc_from(&self, x: i32, y: i32) -> GameResult<Location> {
        let dims = self.map.dims();
        if x < 0 || y < 0 || x >= i32::from(dims.width) || y >= i32::from(dims.height) {
            return Err(GameError::OutOfBounds {
                loc: Location::new(x.clamp(0, 0xffff) as u16, y.clamp(0, 0xffff) as u16),
                dims,
            });
        }
        Ok(Location::new(x as u16, y as u16))
    }

    /// Restore a game from persistence; the loaders clamp and re-index
    pub fn from_parts(
        id: Uuid,
        host_user: Option<Uuid>,
        status: GameStatus,
        config: GameConfig,
        ruleset: Arc<Ruleset>,
        map: MapState,
        players: Vec<Player>,
        units: UnitManager,
        cities: CityManager,
        research: ResearchManager,
        turn_state: TurnState,
    ) -> Self {
        let mut game = Self {
            id,
            host_user,
            status,
            config,
            ruleset,
            map,
            players,
            observers: Vec::new(),
            units,
            cities,
            research,
            visibility: VisibilityManager::new(),
            turn_state,
        };
        // Visibility is derived state: recompute rather than persist
        for player in 0..game.players.len() as PlayerId {
            game.visibility.ensure_player(player, game.map.dims());
            game.visibility.update_player_visibility(
                player,
                &game.map,
                &game.units,
                &game.cities,
                &game.ruleset,
            );
        }
        game
    }

    /// Mutable access for rehydration and tests inside the crate
    pub(crate) fn parts_mut(
        &mut self,
    ) -> (
        &mut MapState,
        &mut UnitManager,
        &mut CityManager,
        &mut ResearchManager,
        &mut Vec<Player>,
    ) {
        (
            &mut self.map,
            &mut self.units,
            &mut self.cities,
            &mut self.research,
            &mut self.players,
        )
    }
}

fn progress_event(
    stage: &str,
    message: String,
    progress: f64,
    action_type: Option<String>,
    error: Option<String>,
) -> ProgressEvent {
    ProgressEvent {
        stage: stage.to_owned(),
        message,
        progress,
        action_type,
        error,
    }
}

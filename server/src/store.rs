//! Durable persistence.
//!
//! SQLite through sqlx. The store is the single source of truth: the
//! in-memory registry is a cache rehydrated by `load_game`. Saves run in one
//! transaction per game so a crash never leaves a half-written turn.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use uuid::Uuid;

use common::{
    game::{
        city::{City, CityId, CityManager, CityYields, Production},
        map::{
            gen::Generator, Improvement, LocationGrid, MapState, Resource, StartingPosition,
            Terrain, Tile,
        },
        player::{Government, Player},
        research::{PlayerResearch, ResearchManager},
        turn::TurnState,
        unit::{Stance, Unit, UnitId, UnitManager},
        Game, GameConfig, GameError, GameResult, GameStatus, PlayerId,
    },
    ruleset::Ruleset,
    util::{Dims, Location, Wrap},
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS games (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    host_id TEXT,
    status TEXT NOT NULL,
    max_players INTEGER NOT NULL,
    map_width INTEGER NOT NULL,
    map_height INTEGER NOT NULL,
    ruleset TEXT NOT NULL,
    current_turn INTEGER NOT NULL,
    turn_time_limit INTEGER NOT NULL,
    seed TEXT NOT NULL,
    generator TEXT NOT NULL,
    shore_level INTEGER NOT NULL,
    terrain_settings_json TEXT NOT NULL,
    starting_positions_json TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE TABLE IF NOT EXISTS players (
    game_id TEXT NOT NULL,
    player_number INTEGER NOT NULL,
    user_id TEXT,
    name TEXT NOT NULL,
    nation TEXT NOT NULL,
    civilization TEXT NOT NULL,
    color TEXT NOT NULL,
    government TEXT NOT NULL,
    gold INTEGER NOT NULL,
    science INTEGER NOT NULL,
    culture INTEGER NOT NULL,
    has_ended_turn INTEGER NOT NULL,
    is_connected INTEGER NOT NULL,
    is_ai INTEGER NOT NULL,
    PRIMARY KEY (game_id, player_number)
);
CREATE TABLE IF NOT EXISTS cities (
    id INTEGER NOT NULL,
    game_id TEXT NOT NULL,
    player_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    x INTEGER NOT NULL,
    y INTEGER NOT NULL,
    population INTEGER NOT NULL,
    food INTEGER NOT NULL,
    food_per_turn INTEGER NOT NULL,
    production INTEGER NOT NULL,
    production_per_turn INTEGER NOT NULL,
    current_production TEXT,
    buildings_json TEXT NOT NULL,
    worked_tiles_json TEXT NOT NULL,
    is_capital INTEGER NOT NULL,
    founded_turn INTEGER NOT NULL,
    PRIMARY KEY (game_id, id)
);
CREATE TABLE IF NOT EXISTS units (
    id INTEGER NOT NULL,
    game_id TEXT NOT NULL,
    player_id INTEGER NOT NULL,
    unit_type TEXT NOT NULL,
    x INTEGER NOT NULL,
    y INTEGER NOT NULL,
    health INTEGER NOT NULL,
    movement_points TEXT NOT NULL,
    max_movement_points TEXT NOT NULL,
    veteran_level INTEGER NOT NULL,
    is_fortified INTEGER NOT NULL,
    stance TEXT NOT NULL,
    home_city INTEGER,
    created_turn INTEGER NOT NULL,
    PRIMARY KEY (game_id, id)
);
CREATE TABLE IF NOT EXISTS research (
    game_id TEXT NOT NULL,
    player_id INTEGER NOT NULL,
    current_tech TEXT,
    bulbs_accumulated INTEGER NOT NULL,
    PRIMARY KEY (game_id, player_id)
);
CREATE TABLE IF NOT EXISTS player_techs (
    game_id TEXT NOT NULL,
    player_id INTEGER NOT NULL,
    tech_id TEXT NOT NULL,
    completed_turn INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (game_id, player_id, tech_id)
);
CREATE TABLE IF NOT EXISTS game_turns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id TEXT NOT NULL,
    turn_number INTEGER NOT NULL,
    completed_at TEXT NOT NULL DEFAULT (datetime('now')),
    actions_log TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS map_tiles (
    game_id TEXT NOT NULL,
    x INTEGER NOT NULL,
    y INTEGER NOT NULL,
    terrain TEXT NOT NULL,
    elevation INTEGER NOT NULL,
    temperature INTEGER NOT NULL,
    wetness INTEGER NOT NULL,
    resource TEXT,
    river_mask INTEGER NOT NULL,
    continent_id INTEGER NOT NULL,
    improvements_json TEXT NOT NULL,
    owner INTEGER,
    PRIMARY KEY (game_id, x, y)
);
"#;

fn persistence(err: sqlx::Error) -> GameError {
    GameError::PersistenceFailed {
        message: err.to_string(),
    }
}

fn encoding(err: serde_json::Error) -> GameError {
    GameError::PersistenceFailed {
        message: err.to_string(),
    }
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database at `url`, e.g. `sqlite:meridian.db` or
    /// `sqlite::memory:`
    pub async fn connect(url: &str) -> GameResult<Store> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(persistence)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(persistence)?;

        let store = Store { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> GameResult<()> {
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(persistence)?;
        }
        Ok(())
    }

    pub async fn upsert_user(&self, id: Uuid, username: &str) -> GameResult<()> {
        sqlx::query(
            "INSERT INTO users (id, username) VALUES (?, ?)
             ON CONFLICT(username) DO NOTHING",
        )
        .bind(id.to_string())
        .bind(username)
        .execute(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(())
    }

    pub async fn user_id_by_name(&self, username: &str) -> GameResult<Option<Uuid>> {
        let row = sqlx::query("SELECT id FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(persistence)?;
        Ok(row.and_then(|r| Uuid::parse_str(&r.get::<String, _>("id")).ok()))
    }

    pub async fn game_created_at(&self, game_id: Uuid) -> GameResult<Option<String>> {
        let row = sqlx::query("SELECT created_at FROM games WHERE id = ?")
            .bind(game_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(persistence)?;
        Ok(row.map(|r| r.get::<String, _>("created_at")))
    }

    /// Persist a full game snapshot atomically
    pub async fn save_game(&self, game: &Game) -> GameResult<()> {
        let mut tx = self.pool.begin().await.map_err(persistence)?;
        let game_id = game.id.to_string();

        let settings_json = serde_json::to_string(game.config()).map_err(encoding)?;
        let starts_json =
            serde_json::to_string(game.map().starting_positions()).map_err(encoding)?;

        sqlx::query(
            "INSERT INTO games (id, name, host_id, status, max_players, map_width, map_height,
                                ruleset, current_turn, turn_time_limit, seed, generator,
                                shore_level, terrain_settings_json, starting_positions_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                current_turn = excluded.current_turn,
                turn_time_limit = excluded.turn_time_limit",
        )
        .bind(&game_id)
        .bind(game.name())
        .bind(game.host_user.map(|u| u.to_string()))
        .bind(game.status.id())
        .bind(i64::from(game.max_players()))
        .bind(i64::from(game.map().dims().width))
        .bind(i64::from(game.map().dims().height))
        .bind(game.ruleset().name())
        .bind(i64::from(game.turn_version()))
        .bind(i64::from(game.turn_time_limit()))
        .bind(game.seed())
        .bind(game.map().generator().id())
        .bind(i64::from(game.map().shore_level()))
        .bind(settings_json)
        .bind(starts_json)
        .execute(&mut *tx)
        .await
        .map_err(persistence)?;

        // Children are rewritten wholesale; the transaction keeps it atomic
        for table in ["players", "cities", "units", "research", "player_techs", "map_tiles"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE game_id = ?"))
                .bind(&game_id)
                .execute(&mut *tx)
                .await
                .map_err(persistence)?;
        }

        for player in game.players() {
            sqlx::query(
                "INSERT INTO players (game_id, player_number, user_id, name, nation,
                                      civilization, color, government, gold, science, culture,
                                      has_ended_turn, is_connected, is_ai)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&game_id)
            .bind(i64::from(player.id))
            .bind(player.user_id.map(|u| u.to_string()))
            .bind(&player.name)
            .bind(&player.nation)
            .bind(&player.civilization)
            .bind(&player.color)
            .bind(player.government.id())
            .bind(player.gold)
            .bind(player.science)
            .bind(player.culture)
            .bind(i64::from(player.has_ended_turn))
            .bind(i64::from(player.is_connected))
            .bind(i64::from(player.is_ai))
            .execute(&mut *tx)
            .await
            .map_err(persistence)?;

            if let Some(research) = game.research().player(player.id) {
                sqlx::query(
                    "INSERT INTO research (game_id, player_id, current_tech, bulbs_accumulated)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(&game_id)
                .bind(i64::from(player.id))
                .bind(research.current_tech.as_deref())
                .bind(i64::from(research.bulbs_accumulated))
                .execute(&mut *tx)
                .await
                .map_err(persistence)?;

                for tech in &research.researched {
                    sqlx::query(
                        "INSERT INTO player_techs (game_id, player_id, tech_id) VALUES (?, ?, ?)",
                    )
                    .bind(&game_id)
                    .bind(i64::from(player.id))
                    .bind(tech)
                    .execute(&mut *tx)
                    .await
                    .map_err(persistence)?;
                }
            }
        }

        for city in game.cities().cities() {
            sqlx::query(
                "INSERT INTO cities (id, game_id, player_id, name, x, y, population, food,
                                     food_per_turn, production, production_per_turn,
                                     current_production, buildings_json, worked_tiles_json,
                                     is_capital, founded_turn)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(city.id.value() as i64)
            .bind(&game_id)
            .bind(i64::from(city.owner))
            .bind(&city.name)
            .bind(i64::from(city.loc.x))
            .bind(i64::from(city.loc.y))
            .bind(i64::from(city.population))
            .bind(i64::from(city.food_stock))
            .bind(i64::from(city.yields.food))
            .bind(i64::from(city.production_stock))
            .bind(i64::from(city.yields.production))
            .bind(
                city.current_production
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
                    .map_err(encoding)?,
            )
            .bind(serde_json::to_string(&city.buildings).map_err(encoding)?)
            .bind(serde_json::to_string(&city.worked_tiles).map_err(encoding)?)
            .bind(i64::from(city.is_capital))
            .bind(i64::from(city.founded_turn))
            .execute(&mut *tx)
            .await
            .map_err(persistence)?;
        }

        for unit in game.units().units() {
            let max_movement = game
                .ruleset()
                .unit_type(&unit.type_id)
                .map(|t| t.max_movement)
                .unwrap_or(0);
            sqlx::query(
                "INSERT INTO units (id, game_id, player_id, unit_type, x, y, health,
                                    movement_points, max_movement_points, veteran_level,
                                    is_fortified, stance, home_city, created_turn)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(unit.id.value() as i64)
            .bind(&game_id)
            .bind(i64::from(unit.owner))
            .bind(&unit.type_id)
            .bind(i64::from(unit.loc.x))
            .bind(i64::from(unit.loc.y))
            .bind(i64::from(unit.health))
            // Movement travels as a decimal string for forward compatibility
            .bind(unit.movement_left.to_string())
            .bind(max_movement.to_string())
            .bind(i64::from(unit.veteran_level))
            .bind(i64::from(unit.stance.is_fortified()))
            .bind(unit.stance.id())
            .bind(unit.home_city.map(|c| c.value() as i64))
            .bind(i64::from(unit.created_turn))
            .execute(&mut *tx)
            .await
            .map_err(persistence)?;
        }

        for (loc, tile) in game.map().iter_tiles() {
            sqlx::query(
                "INSERT INTO map_tiles (game_id, x, y, terrain, elevation, temperature, wetness,
                                        resource, river_mask, continent_id, improvements_json,
                                        owner)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&game_id)
            .bind(i64::from(loc.x))
            .bind(i64::from(loc.y))
            .bind(tile.terrain.id())
            .bind(i64::from(tile.elevation))
            .bind(i64::from(tile.temperature))
            .bind(i64::from(tile.wetness))
            .bind(tile.resource.map(|r| r.id()))
            .bind(i64::from(tile.river_mask))
            .bind(i64::from(tile.continent_id))
            .bind(serde_json::to_string(&tile.improvements).map_err(encoding)?)
            .bind(tile.owner.map(i64::from))
            .execute(&mut *tx)
            .await
            .map_err(persistence)?;
        }

        tx.commit().await.map_err(persistence)?;
        Ok(())
    }

    /// Append one completed turn to the game's action log
    pub async fn append_turn_log(
        &self,
        game_id: Uuid,
        turn_number: u32,
        actions_log: &str,
    ) -> GameResult<()> {
        sqlx::query(
            "INSERT INTO game_turns (game_id, turn_number, actions_log) VALUES (?, ?, ?)",
        )
        .bind(game_id.to_string())
        .bind(i64::from(turn_number))
        .bind(actions_log)
        .execute(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(())
    }

    pub async fn delete_game(&self, game_id: Uuid) -> GameResult<()> {
        let mut tx = self.pool.begin().await.map_err(persistence)?;
        let id = game_id.to_string();
        for table in [
            "games",
            "players",
            "cities",
            "units",
            "research",
            "player_techs",
            "game_turns",
            "map_tiles",
        ] {
            let column = if table == "games" { "id" } else { "game_id" };
            sqlx::query(&format!("DELETE FROM {table} WHERE {column} = ?"))
                .bind(&id)
                .execute(&mut *tx)
                .await
                .map_err(persistence)?;
        }
        tx.commit().await.map_err(persistence)?;
        Ok(())
    }

    pub async fn list_game_ids(&self) -> GameResult<Vec<Uuid>> {
        let rows = sqlx::query("SELECT id FROM games ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(persistence)?;
        Ok(rows
            .into_iter()
            .filter_map(|r| Uuid::parse_str(&r.get::<String, _>("id")).ok())
            .collect())
    }

    /// Rehydrate a game. Movement points are parsed from their decimal
    /// string and clamped into the unit type's budget.
    pub async fn load_game(&self, game_id: Uuid) -> GameResult<Option<Game>> {
        let id = game_id.to_string();
        let Some(row) = sqlx::query("SELECT * FROM games WHERE id = ?")
            .bind(&id)
            .fetch_optional(&self.pool)
            .await
            .map_err(persistence)?
        else {
            return Ok(None);
        };

        let ruleset: Arc<Ruleset> = Ruleset::load(&row.get::<String, _>("ruleset"))?;
        let dims = Dims::new(
            row.get::<i64, _>("map_width") as u16,
            row.get::<i64, _>("map_height") as u16,
        );
        let status = GameStatus::from_id(&row.get::<String, _>("status"))
            .ok_or(GameError::PersistenceFailed {
                message: "bad status".to_owned(),
            })?;
        let generator = Generator::from_id(&row.get::<String, _>("generator"))
            .unwrap_or_default();
        let shore_level = row.get::<i64, _>("shore_level") as u8;
        let seed = row.get::<String, _>("seed");
        let starting_positions: Vec<StartingPosition> =
            serde_json::from_str(&row.get::<String, _>("starting_positions_json"))
                .map_err(encoding)?;
        let host_user = row
            .get::<Option<String>, _>("host_id")
            .and_then(|h| Uuid::parse_str(&h).ok());

        // Tiles
        let tile_rows = sqlx::query("SELECT * FROM map_tiles WHERE game_id = ?")
            .bind(&id)
            .fetch_all(&self.pool)
            .await
            .map_err(persistence)?;
        let mut tile_map: BTreeMap<Location, Tile> = BTreeMap::new();
        for row in tile_rows {
            let loc = Location::new(row.get::<i64, _>("x") as u16, row.get::<i64, _>("y") as u16);
            let terrain = Terrain::from_id(&row.get::<String, _>("terrain")).ok_or(
                GameError::PersistenceFailed {
                    message: format!("bad terrain at {loc}"),
                },
            )?;
            let mut tile = Tile::new(terrain);
            tile.elevation = row.get::<i64, _>("elevation") as u8;
            tile.temperature = row.get::<i64, _>("temperature") as u8;
            tile.wetness = row.get::<i64, _>("wetness") as u8;
            tile.river_mask = (row.get::<i64, _>("river_mask") as u8).min(15);
            tile.continent_id = row.get::<i64, _>("continent_id") as u16;
            tile.resource = row
                .get::<Option<String>, _>("resource")
                .and_then(|r| Resource::from_id(&r));
            tile.owner = row.get::<Option<i64>, _>("owner").map(|o| o as PlayerId);
            let improvements: Vec<Improvement> =
                serde_json::from_str(&row.get::<String, _>("improvements_json"))
                    .map_err(encoding)?;
            tile.improvements = improvements.into_iter().collect();
            tile_map.insert(loc, tile);
        }
        let grid = LocationGrid::new(dims, |loc| {
            tile_map.remove(&loc).unwrap_or_else(|| Tile::new(Terrain::Ocean))
        });
        let mut map = MapState::new(
            grid,
            Wrap::NEITHER,
            shore_level,
            generator,
            seed.clone(),
            starting_positions,
        );

        // Players
        let player_rows =
            sqlx::query("SELECT * FROM players WHERE game_id = ? ORDER BY player_number")
                .bind(&id)
                .fetch_all(&self.pool)
                .await
                .map_err(persistence)?;
        let mut players = Vec::new();
        for row in player_rows {
            players.push(Player {
                id: row.get::<i64, _>("player_number") as PlayerId,
                user_id: row
                    .get::<Option<String>, _>("user_id")
                    .and_then(|u| Uuid::parse_str(&u).ok()),
                name: row.get("name"),
                nation: row.get("nation"),
                civilization: row.get("civilization"),
                color: row.get("color"),
                government: Government::from_id(&row.get::<String, _>("government"))
                    .unwrap_or_default(),
                gold: row.get("gold"),
                science: row.get("science"),
                culture: row.get("culture"),
                has_ended_turn: row.get::<i64, _>("has_ended_turn") != 0,
                is_connected: row.get::<i64, _>("is_connected") != 0,
                is_ai: row.get::<i64, _>("is_ai") != 0,
            });
        }

        // Units, with the movement clamp
        let unit_rows = sqlx::query("SELECT * FROM units WHERE game_id = ? ORDER BY id")
            .bind(&id)
            .fetch_all(&self.pool)
            .await
            .map_err(persistence)?;
        let mut loaded_units = Vec::new();
        for row in unit_rows {
            let type_id: String = row.get("unit_type");
            let movement_left = row
                .get::<String, _>("movement_points")
                .parse::<f64>()
                .unwrap_or(0.0)
                .max(0.0)
                .round() as u16;
            loaded_units.push(Unit {
                id: UnitId::new(row.get::<i64, _>("id") as u64),
                owner: row.get::<i64, _>("player_id") as PlayerId,
                type_id,
                loc: Location::new(row.get::<i64, _>("x") as u16, row.get::<i64, _>("y") as u16),
                health: (row.get::<i64, _>("health").clamp(0, 100)) as u8,
                movement_left,
                veteran_level: row.get::<i64, _>("veteran_level") as u8,
                stance: Stance::from_id(&row.get::<String, _>("stance")).unwrap_or_default(),
                home_city: row
                    .get::<Option<i64>, _>("home_city")
                    .map(|c| CityId::new(c as u64)),
                created_turn: row.get::<i64, _>("created_turn") as u32,
            });
        }
        let mut units = UnitManager::new();
        units.load_units(&mut map, &ruleset, loaded_units)?;

        // Cities
        let city_rows = sqlx::query("SELECT * FROM cities WHERE game_id = ? ORDER BY id")
            .bind(&id)
            .fetch_all(&self.pool)
            .await
            .map_err(persistence)?;
        let mut loaded_cities = Vec::new();
        for row in city_rows {
            let current_production: Option<Production> = row
                .get::<Option<String>, _>("current_production")
                .map(|s| serde_json::from_str(&s))
                .transpose()
                .map_err(encoding)?;
            let buildings: std::collections::BTreeSet<String> =
                serde_json::from_str(&row.get::<String, _>("buildings_json")).map_err(encoding)?;
            let worked_tiles: std::collections::BTreeSet<Location> =
                serde_json::from_str(&row.get::<String, _>("worked_tiles_json"))
                    .map_err(encoding)?;
            loaded_cities.push(City {
                id: CityId::new(row.get::<i64, _>("id") as u64),
                owner: row.get::<i64, _>("player_id") as PlayerId,
                name: row.get("name"),
                loc: Location::new(row.get::<i64, _>("x") as u16, row.get::<i64, _>("y") as u16),
                population: row.get::<i64, _>("population") as u32,
                food_stock: row.get::<i64, _>("food") as u32,
                production_stock: row.get::<i64, _>("production") as u32,
                current_production,
                buildings,
                worked_tiles,
                yields: CityYields {
                    food: row.get::<i64, _>("food_per_turn") as u32,
                    production: row.get::<i64, _>("production_per_turn") as u32,
                    ..CityYields::default()
                },
                founded_turn: row.get::<i64, _>("founded_turn") as u32,
                is_capital: row.get::<i64, _>("is_capital") != 0,
            });
        }
        let mut cities = CityManager::new();
        cities.load_cities(&mut map, loaded_cities)?;

        // Research
        let mut research = ResearchManager::new();
        for player in &players {
            research.ensure_player(player.id);
        }
        let research_rows = sqlx::query("SELECT * FROM research WHERE game_id = ?")
            .bind(&id)
            .fetch_all(&self.pool)
            .await
            .map_err(persistence)?;
        let tech_rows = sqlx::query("SELECT * FROM player_techs WHERE game_id = ?")
            .bind(&id)
            .fetch_all(&self.pool)
            .await
            .map_err(persistence)?;
        for row in research_rows {
            let player = row.get::<i64, _>("player_id") as PlayerId;
            let researched = tech_rows
                .iter()
                .filter(|t| t.get::<i64, _>("player_id") as PlayerId == player)
                .map(|t| t.get::<String, _>("tech_id"))
                .collect();
            research.load_player(
                player,
                PlayerResearch {
                    current_tech: row.get("current_tech"),
                    bulbs_accumulated: row.get::<i64, _>("bulbs_accumulated") as u32,
                    researched,
                },
            );
        }

        let mut turn_state = TurnState::new();
        turn_state.turn_version = row.get::<i64, _>("current_turn") as u32;

        let config: GameConfig =
            serde_json::from_str(&row.get::<String, _>("terrain_settings_json"))
                .map_err(encoding)?;

        let game = Game::from_parts(
            game_id,
            host_user,
            status,
            config,
            ruleset,
            map,
            players,
            units,
            cities,
            research,
            turn_state,
        );

        Ok(Some(game))
    }
}

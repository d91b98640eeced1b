//! End-to-end engine scenarios: lobby to resolution, founding, combat,
//! idempotent turn submission.

use uuid::Uuid;

use super::{
    action::PlayerAction,
    turn::{CancelToken, ProgressEvent, SubmitOutcome, TurnResult, TurnSubmission},
    Game, GameConfig, GameStatus,
};

fn two_player_game(seed: &str) -> (Game, Uuid, Uuid) {
    let config = GameConfig::new("test-game", seed, 2, 24, 24);
    let mut game = Game::new(Uuid::new_v4(), None, config).unwrap();

    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let p0 = game.join(alice, "alice", Some("romans")).unwrap();
    let p1 = game.join(bob, "bob", Some("random")).unwrap();
    assert_eq!((p0, p1), (0, 1));
    assert_eq!(game.status, GameStatus::Playing);

    (game, alice, bob)
}

fn submit(
    game: &mut Game,
    player: super::PlayerId,
    key: &str,
    actions: Vec<PlayerAction>,
) -> SubmitOutcome {
    let version = game.turn_version();
    game.submit_turn(
        player,
        TurnSubmission {
            turn_version: version,
            actions,
            idempotency_key: key.to_owned(),
        },
    )
    .unwrap()
}

fn resolve(game: &mut Game) -> (TurnResult, Vec<ProgressEvent>) {
    let mut events = Vec::new();
    let result = game.resolve_turn(&mut |e| events.push(e), &CancelToken::new());
    (result, events)
}

#[test]
fn test_lobby_fills_then_plays() {
    let (game, alice, _) = two_player_game("lobby");

    // Both players start with a settler and a warrior at their position
    for player in 0..2 {
        let start = game.map().starting_position(player).unwrap();
        let types: Vec<&str> = game
            .units()
            .player_units(player)
            .map(|u| u.type_id.as_str())
            .collect();
        assert_eq!(types.len(), 2);
        assert!(types.contains(&"settlers"));
        assert!(types.contains(&"warriors"));
        for unit in game.units().player_units(player) {
            assert_eq!(unit.loc, start);
        }

        // And they can see their immediate surroundings, nothing more than
        // their discs
        assert!(game.visibility().is_visible(player, start));
        assert!(game.visibility().explored_count(player) > 0);
    }

    // A full game takes no more players
    let mut full = game.clone();
    let err = full.join(Uuid::new_v4(), "carol", Some("romans")).unwrap_err();
    assert_eq!(err.code(), "GameNotJoinable");

    // Rejoining returns the same seat
    let mut again = game.clone();
    assert_eq!(again.join(alice, "alice", None).unwrap(), 0);
}

#[test]
fn test_nation_taken_in_lobby() {
    let config = GameConfig::new("lobby-nations", "nations", 3, 24, 24);
    let mut game = Game::new(Uuid::new_v4(), None, config).unwrap();

    game.join(Uuid::new_v4(), "alice", Some("romans")).unwrap();
    let err = game
        .join(Uuid::new_v4(), "bob", Some("romans"))
        .unwrap_err();
    assert_eq!(err.code(), "NationTaken");

    let err = game
        .join(Uuid::new_v4(), "bob", Some("atlanteans"))
        .unwrap_err();
    assert_eq!(err.code(), "UnknownId");
}

#[test]
fn test_turn_resolution_and_idempotence() {
    let (mut game, _, _) = two_player_game("idempotence");
    assert_eq!(game.turn_version(), 1);

    let outcome = submit(&mut game, 0, "k0", vec![PlayerAction::EndTurn]);
    assert_eq!(outcome, SubmitOutcome::Accepted { ready: false });

    let outcome = submit(&mut game, 1, "k1", vec![]);
    assert_eq!(outcome, SubmitOutcome::Accepted { ready: true });

    let (result, events) = resolve(&mut game);
    assert!(result.success);
    assert_eq!(result.turn, 2);
    assert_eq!(game.turn_version(), 2);

    // The stream ran in stage order and finished at full progress
    assert_eq!(events.first().unwrap().stage, "start");
    assert_eq!(events.last().unwrap().stage, "complete");
    assert!((events.last().unwrap().progress - 1.0).abs() < f64::EPSILON);
    assert!(events.windows(2).all(|w| w[0].progress <= w[1].progress));

    // Replaying a key returns the stored result and the turn does not move
    let replay = game
        .submit_turn(
            0,
            TurnSubmission {
                turn_version: 1,
                actions: vec![PlayerAction::EndTurn],
                idempotency_key: "k0".to_owned(),
            },
        )
        .unwrap();
    assert_eq!(replay, SubmitOutcome::Cached(result));
    assert_eq!(game.turn_version(), 2);

    // A fresh key against the old version is stale, with no side effects
    let err = game
        .submit_turn(
            0,
            TurnSubmission {
                turn_version: 1,
                actions: vec![],
                idempotency_key: "k2".to_owned(),
            },
        )
        .unwrap_err();
    assert_eq!(err.code(), "StaleTurn");
    assert_eq!(game.turn_version(), 2);
}

#[test]
fn test_found_city_flow_and_min_distance() {
    let (mut game, _, _) = two_player_game("founding");
    let start = game.map().starting_position(0).unwrap();

    submit(
        &mut game,
        0,
        "k0",
        vec![PlayerAction::FoundCity {
            name: "Alpha".to_owned(),
            x: i32::from(start.x),
            y: i32::from(start.y),
        }],
    );
    submit(&mut game, 1, "k1", vec![]);
    let (result, _) = resolve(&mut game);

    assert!(result.success);
    assert!(result.results.iter().all(|r| r.success));
    assert_eq!(game.cities().player_cities(0).count(), 1);
    let city = game.cities().player_cities(0).next().unwrap();
    assert_eq!(city.name, "Alpha");
    assert_eq!(city.loc, start);

    // The founding settler was consumed
    assert!(game
        .units()
        .player_units(0)
        .all(|u| u.type_id != "settlers"));

    // A second settler right next door cannot found: too close
    let neighbor = {
        let map = game.map();
        map.neighbors(start)
            .into_iter()
            .find(|loc| map.tile(*loc).unwrap().terrain.is_land())
            .unwrap()
    };
    {
        let ruleset = game.ruleset().clone();
        let (map, units, _, _, _) = game.parts_mut();
        units
            .create(map, &ruleset, 0, "settlers", neighbor, 2)
            .unwrap();
    }

    submit(
        &mut game,
        0,
        "k2",
        vec![PlayerAction::FoundCity {
            name: "Beta".to_owned(),
            x: i32::from(neighbor.x),
            y: i32::from(neighbor.y),
        }],
    );
    submit(&mut game, 1, "k3", vec![]);
    let (result, _) = resolve(&mut game);

    // The turn itself succeeds; the bad action is recorded, not fatal
    assert!(result.success);
    let founding = result
        .results
        .iter()
        .find(|r| r.action_type == "found_city")
        .unwrap();
    assert!(!founding.success);
    assert_eq!(founding.error.as_deref(), Some("CityTooClose"));
    assert_eq!(game.cities().player_cities(0).count(), 1);
}

#[test]
fn test_combat_through_actions() {
    let (mut game, _, _) = two_player_game("combat-flow");

    // Stage a duel on neutral ground
    let (attacker, defender) = {
        let ruleset = game.ruleset().clone();
        let (map, units, _, _, _) = game.parts_mut();
        let spot = map
            .iter_locs()
            .find(|loc| {
                map.tile(*loc).unwrap().terrain.is_land()
                    && map.tile(*loc).unwrap().unit_ids.is_empty()
                    && map
                        .neighbor(*loc, crate::util::Direction::East)
                        .map(|e| {
                            map.tile(e).unwrap().terrain.is_land()
                                && map.tile(e).unwrap().unit_ids.is_empty()
                        })
                        .unwrap_or(false)
            })
            .unwrap();
        let east = map.neighbor(spot, crate::util::Direction::East).unwrap();
        let a = units.create(map, &ruleset, 0, "warriors", spot, 1).unwrap();
        let d = units.create(map, &ruleset, 1, "warriors", east, 1).unwrap();
        (a, d)
    };

    submit(
        &mut game,
        0,
        "k0",
        vec![PlayerAction::UnitAttack {
            attacker_unit_id: attacker.value(),
            defender_unit_id: defender.value(),
        }],
    );
    submit(&mut game, 1, "k1", vec![]);
    let (result, _) = resolve(&mut game);

    assert!(result.success);
    let attack = result
        .results
        .iter()
        .find(|r| r.action_type == "unit_attack")
        .unwrap();
    assert!(attack.success);

    // Whoever survived bears scars; movement was refreshed at turn start so
    // we check health only
    for id in [attacker, defender] {
        if let Some(unit) = game.units().unit(id) {
            assert!(unit.health < 100);
        }
    }
}

#[test]
fn test_resolution_is_deterministic() {
    let run = || {
        let (mut game, _, _) = two_player_game("deterministic");
        let start = game.map().starting_position(0).unwrap();
        submit(
            &mut game,
            0,
            "k0",
            vec![PlayerAction::FoundCity {
                name: "Echo".to_owned(),
                x: i32::from(start.x),
                y: i32::from(start.y),
            }],
        );
        submit(&mut game, 1, "k1", vec![]);
        let (result, _) = resolve(&mut game);
        (result, game)
    };

    let (result_a, game_a) = run();
    let (result_b, game_b) = run();

    assert_eq!(result_a, result_b);
    for loc in game_a.map().iter_locs() {
        assert_eq!(game_a.map().tile(loc), game_b.map().tile(loc));
    }
}

#[test]
fn test_cancelled_resolution_reports_failure() {
    let (mut game, _, _) = two_player_game("cancel");
    submit(&mut game, 0, "k0", vec![]);
    submit(&mut game, 1, "k1", vec![]);

    let token = CancelToken::new();
    token.cancel();
    let result = game.resolve_turn(&mut |_| {}, &token);

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Cancelled"));
    // The server discards the snapshot on failure; even in place, the turn
    // number must not have advanced
    assert_eq!(result.turn, 1);
}

#[test]
fn test_research_selection_and_progress() {
    let (mut game, _, _) = two_player_game("research");
    let start = game.map().starting_position(0).unwrap();

    // Found a city so science flows, and pick a tech
    submit(
        &mut game,
        0,
        "k0",
        vec![
            PlayerAction::FoundCity {
                name: "Academy".to_owned(),
                x: i32::from(start.x),
                y: i32::from(start.y),
            },
            PlayerAction::ResearchSelection {
                tech_id: "alphabet".to_owned(),
            },
        ],
    );
    submit(&mut game, 1, "k1", vec![]);
    let (result, _) = resolve(&mut game);
    assert!(result.success);

    let state = game.research().player(0).unwrap();
    assert_eq!(state.current_tech.as_deref(), Some("alphabet"));

    // Enough turns of bulbs eventually complete it
    for turn in 0..20 {
        submit(&mut game, 0, &format!("a{turn}"), vec![]);
        submit(&mut game, 1, &format!("b{turn}"), vec![]);
        let (result, _) = resolve(&mut game);
        assert!(result.success);
        if game.research().has_tech(0, "alphabet") {
            return;
        }
    }
    panic!("alphabet never completed");
}

#[test]
fn test_turn_timeout_path() {
    let (mut game, _, _) = two_player_game("timeout");

    submit(&mut game, 0, "k0", vec![]);
    // Player 1 never submits; the timeout forces their hand
    game.force_end_turns();
    let (result, _) = resolve(&mut game);

    assert!(result.success);
    assert_eq!(game.turn_version(), 2);
}

// End-to-end engine behaviour driven synchronously through the public API.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use uuid::Uuid;

use bomberdino_server::engine::config::EngineSettings;
use bomberdino_server::engine::error::GameError;
use bomberdino_server::engine::events::{GameEvent, MemorySink};
use bomberdino_server::engine::explosion;
use bomberdino_server::engine::geometry::{Direction, GridPos};
use bomberdino_server::engine::map::GameMap;
use bomberdino_server::engine::occupancy::TileRegistry;
use bomberdino_server::engine::player::PlayerStatus;
use bomberdino_server::engine::powerup::{PowerUp, PowerUpType};
use bomberdino_server::engine::session::{GameSession, GameStatus};
use bomberdino_server::engine::tile::TileType;
use bomberdino_server::engine::PlayerId;

const FUSE: Duration = Duration::from_millis(3000);

fn arena(
    settings: EngineSettings,
    players: &[&str],
) -> (Arc<GameSession>, Arc<MemorySink>, Vec<PlayerId>) {
    let sink = Arc::new(MemorySink::new());
    let map = Arc::new(GameMap::open(12, 12));
    let session = Arc::new(GameSession::new(Uuid::new_v4(), None, map, settings, sink.clone()));
    let ids = players
        .iter()
        .map(|name| session.add_player(None, name).unwrap().id)
        .collect();
    (session, sink, ids)
}

fn walk(session: &GameSession, player: PlayerId, dir: Direction, steps: usize, now: Instant) {
    for _ in 0..steps {
        session.move_player(player, dir, now).unwrap();
    }
}

fn power_up(pos: GridPos, t: PowerUpType, now: Instant) -> PowerUp {
    PowerUp {
        id: Uuid::new_v4(),
        position: pos,
        power_up_type: t,
        value: 1,
        spawned_at: now,
        duration: Duration::from_secs(30),
        effect_duration: t.is_temporary().then_some(Duration::from_secs(10)),
    }
}

#[test]
fn bomb_on_own_cell_hits_rays_and_kills_unshielded_player() {
    let (s, sink, ids) = arena(EngineSettings::default(), &["alpha", "bravo"]);
    let (a, b) = (ids[0], ids[1]);
    let now = Instant::now();
    s.start(now).unwrap();

    assert_eq!(s.player(a).unwrap().position, GridPos::new(1, 1));
    assert_eq!(s.player(b).unwrap().position, GridPos::new(10, 1));

    s.place_bomb(a, GridPos::new(1, 1), now).unwrap();
    s.move_player(a, Direction::Right, now).unwrap();
    s.move_player(a, Direction::Down, now).unwrap();
    walk(&s, b, Direction::Left, 7, now);
    assert_eq!(s.player(b).unwrap().position, GridPos::new(3, 1));

    let tick = s.update(now + FUSE);
    assert_eq!(tick.detonations.len(), 1);
    let report = &tick.detonations[0];

    let tiles: HashSet<GridPos> = report.affected_tiles.iter().copied().collect();
    let expected: HashSet<GridPos> = [(1, 1), (2, 1), (3, 1), (1, 2), (1, 3)]
        .into_iter()
        .map(GridPos::from)
        .collect();
    assert_eq!(tiles, expected);
    assert_eq!(report.affected_tiles[0], GridPos::new(1, 1));
    assert!(s.bombs().is_empty());
    assert!(!s.map().tile(GridPos::new(1, 1)).unwrap().has_bomb);

    let bravo = s.player(b).unwrap();
    assert_eq!(bravo.deaths, 1);
    assert_eq!(bravo.status, PlayerStatus::Dead);
    assert_eq!(s.player(a).unwrap().deaths, 0);
    assert_eq!(s.player(a).unwrap().kills, 1);

    let events = sink.take();
    assert!(events.iter().any(|e| matches!(
        e,
        GameEvent::BombExploded { affected_players, .. } if affected_players == &vec![b]
    )));
    assert!(events.contains(&GameEvent::PlayerKilled {
        killer_id: Some(a),
        victim_id: b,
    }));
}

#[test]
fn shield_absorbs_one_blast() {
    let (s, _, ids) = arena(EngineSettings::default(), &["alpha", "bravo"]);
    let (a, b) = (ids[0], ids[1]);
    let now = Instant::now();
    s.start(now).unwrap();
    s.add_power_up(power_up(GridPos::new(9, 1), PowerUpType::TemporaryShield, now))
        .unwrap();

    let out = s.move_player(b, Direction::Left, now).unwrap();
    assert_eq!(
        out.collected.map(|e| e.power_up_type),
        Some(PowerUpType::TemporaryShield)
    );
    walk(&s, b, Direction::Left, 6, now);

    s.place_bomb(a, GridPos::new(1, 1), now).unwrap();
    s.move_player(a, Direction::Right, now).unwrap();
    s.move_player(a, Direction::Down, now).unwrap();

    let later = now + FUSE;
    let tick = s.update(later);
    assert_eq!(tick.detonations[0].affected_players, vec![b]);
    assert!(tick.detonations[0].killed.is_empty());

    let bravo = s.player(b).unwrap();
    assert_eq!(bravo.deaths, 0);
    assert_eq!(bravo.status, PlayerStatus::Alive);
    assert!(!bravo.has_shield(later));
    assert!(bravo.active_effects.is_empty());
}

#[test]
fn expired_power_up_rejected_while_standing_on_it() {
    let (s, _, ids) = arena(EngineSettings::default(), &["alpha", "bravo"]);
    let a = ids[0];
    let now = Instant::now();
    s.start(now).unwrap();
    let pu = power_up(GridPos::new(2, 1), PowerUpType::BombCountUp, now);
    s.add_power_up(pu.clone()).unwrap();

    let late = now + Duration::from_secs(30);
    let out = s.move_player(a, Direction::Right, late).unwrap();
    assert!(out.collected.is_none());
    assert_eq!(s.player(a).unwrap().position, pu.position);

    let err = s.collect_power_up(a, pu.id, late).unwrap_err();
    assert_eq!(err, GameError::PowerUpExpired(pu.id));
    assert_eq!(err.code(), "POWERUP_NOT_FOUND");
    assert_eq!(s.player(a).unwrap().bomb_count, 1);
}

#[test]
fn propagation_is_independent_per_direction() {
    use TileType::*;
    // 9x9, bomb at (4, 4) with range 3
    let mut types = vec![Empty; 81];
    for y in 0..9 {
        for x in 0..9 {
            if x == 0 || y == 0 || x == 8 || y == 8 {
                types[y * 9 + x] = SolidWall;
            }
        }
    }
    types[3 * 9 + 4] = DestructibleWall; // north, adjacent
    types[4 * 9 + 6] = SolidWall; // east, two away
    types[4 * 9 + 2] = DestructibleWall; // west, two away
    let map = GameMap::from_types(9, 9, types, vec![]);

    let blast = explosion::propagate(&map, GridPos::new(4, 4), 3);
    let tiles: HashSet<GridPos> = blast.tiles.iter().copied().collect();
    let expected: HashSet<GridPos> = [(4, 4), (4, 3), (4, 5), (4, 6), (4, 7), (3, 4), (2, 4), (5, 4)]
        .into_iter()
        .map(GridPos::from)
        .collect();
    assert_eq!(tiles, expected);
    assert!(!tiles.contains(&GridPos::new(4, 2)));
    assert!(!tiles.contains(&GridPos::new(6, 4)));
    assert!(!tiles.contains(&GridPos::new(1, 4)));

    let destroyed: HashSet<GridPos> = blast.destroyed_walls.iter().copied().collect();
    assert_eq!(
        destroyed,
        [GridPos::new(4, 3), GridPos::new(2, 4)].into_iter().collect()
    );
    assert_eq!(map.tile_type(GridPos::new(4, 3)), Some(Empty));
    assert_eq!(map.tile_type(GridPos::new(6, 4)), Some(SolidWall));

    // the opened wall no longer blocks the next blast
    let again = explosion::propagate(&map, GridPos::new(4, 4), 3);
    assert!(again.tiles.contains(&GridPos::new(4, 1)));
    assert!(again.destroyed_walls.is_empty());
}

#[test]
fn concurrent_moves_never_share_a_cell() {
    let (s, _, ids) = arena(EngineSettings::default(), &["alpha", "bravo"]);
    let now = Instant::now();
    s.start(now).unwrap();

    let handles: Vec<_> = [(ids[0], Direction::Right), (ids[1], Direction::Left)]
        .into_iter()
        .map(|(pid, dir)| {
            let s = s.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    let _ = s.move_player(pid, dir, now);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let pa = s.player(ids[0]).unwrap().position;
    let pb = s.player(ids[1]).unwrap().position;
    assert_ne!(pa, pb);
    assert_eq!(pa.y, 1);
    assert_eq!(pb.x - pa.x, 1);

    let occupied = s
        .map()
        .rows()
        .iter()
        .flatten()
        .filter(|t| t.occupied)
        .count();
    assert_eq!(occupied, 2);
}

#[test]
fn tile_registry_grants_one_claim_per_cell() {
    let registry = Arc::new(TileRegistry::new());
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    registry.insert(first, Arc::new(GameMap::open(12, 12)));
    registry.insert(second, Arc::new(GameMap::open(12, 12)));
    let cell = GridPos::new(5, 5);

    let winners: usize = (0..8)
        .map(|_| {
            let registry = registry.clone();
            thread::spawn(move || registry.try_occupy(&first, cell, false))
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap() as usize)
        .sum();
    assert_eq!(winners, 1);

    // same coordinates in another session are untouched
    assert!(registry.try_occupy(&second, cell, false));
    registry.release(&first, cell);
    assert!(registry.try_occupy(&first, cell, false));
}

#[test]
fn finishes_when_one_contender_left_and_stays_finished() {
    let settings = EngineSettings {
        player_lives: 1,
        ..EngineSettings::default()
    };
    let (s, sink, ids) = arena(settings, &["alpha", "bravo", "charlie"]);
    let (a, b, c) = (ids[0], ids[1], ids[2]);
    let now = Instant::now();
    s.start(now).unwrap();

    s.place_bomb(a, GridPos::new(1, 1), now).unwrap();
    s.move_player(a, Direction::Right, now).unwrap();
    s.move_player(a, Direction::Down, now).unwrap();
    walk(&s, b, Direction::Left, 7, now);

    let t = now + FUSE;
    let tick = s.update(t);
    assert_eq!(tick.detonations[0].killed, vec![b]);
    assert_eq!(s.player(b).unwrap().status, PlayerStatus::Spectating);
    assert_eq!(s.status(), GameStatus::InProgress);
    assert!(s.winner().is_none());

    s.disconnect_player(c, t).unwrap();
    assert_eq!(s.status(), GameStatus::Finished);
    assert_eq!(s.winner().map(|p| p.id), Some(a));
    assert_eq!(s.snapshot(t).winner_id, Some(a));

    assert!(s.start(t).is_err());
    assert!(s.resume(t).is_err());
    assert!(s.pause(t).is_err());
    assert!(!s.update(t + Duration::from_secs(5)).finished);
    assert_eq!(s.status(), GameStatus::Finished);

    let finished = sink
        .take()
        .into_iter()
        .filter(|e| matches!(e, GameEvent::SessionStateChanged { status: GameStatus::Finished, .. }))
        .count();
    assert_eq!(finished, 1);
}

//! # World Integration Tests
//!
//! End-to-end checks through the `World` facade: eviction fidelity, saves,
//! concurrent generation, agents and background work.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use llamaquest_pathfinding::{AgentProfile, NoPathReason, PathOutcome, PathRequest, StepOutcome, MAX_SIGHT_RADIUS};
use llamaquest_procedural::{
    Biome, BiomeRule, BiomeTable, ChunkCoord, LocalPos, TileMutation, TilePos, WorldSeed, CHUNK_AREA,
};
use llamaquest_world::{ChunkPoll, SaveFile, World, WorldConfig, WorldError};

fn inline_world(seed: u64) -> World {
    World::new(WorldConfig {
        worker_threads: 0,
        ..WorldConfig::with_seed(seed)
    })
    .expect("valid config")
}

fn threaded_world(seed: u64) -> World {
    World::new(WorldConfig {
        worker_threads: 2,
        worker_queue: 16,
        ..WorldConfig::with_seed(seed)
    })
    .expect("valid config")
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("llamaquest_{name}_{}.lqsv", std::process::id()))
}

/// Clears a row of open village tiles from `(x0, y)` to `(x1, y)`.
fn lay_road(world: &World, x0: i64, x1: i64, y: i64) {
    for x in x0..=x1 {
        world.set_tile(x, y, TileMutation::SetBiome(Biome::Village)).expect("in range");
        world.set_tile(x, y, TileMutation::SetOccupied(false)).expect("in range");
    }
}

/// Test: seed 42, mutate (3,3) to water, evict, reload.
#[test]
fn test_evict_reload_keeps_mutation_and_base_terrain() {
    let world = inline_world(42);
    let origin = ChunkCoord::new(0, 0);
    let before = world.get_chunk_for_render(origin).expect("in range");

    world.set_tile(3, 3, TileMutation::SetBiome(Biome::Water)).expect("in range");
    assert!(world.evict(origin).expect("not pinned"));
    assert!(!world.store().is_ready(origin));

    let after = world.get_chunk_for_render(origin).expect("in range");
    let mutated = LocalPos::new(3, 3);
    assert_eq!(after.tile(mutated).biome, Biome::Water);
    assert!(after.tile(mutated).modified);
    assert_eq!(after.tile(LocalPos::new(0, 0)), before.tile(LocalPos::new(0, 0)));

    for (index, (old, new)) in before.tiles().iter().zip(after.tiles()).enumerate() {
        if index != mutated.index() {
            assert_eq!(old, new, "tile {index} changed");
        }
    }
    assert_eq!(after.resources(), before.resources());

    let stats = world.stats();
    assert_eq!(stats.generated, 2);
    assert_eq!(stats.evicted, 1);
    assert_eq!(stats.replayed_edits, 1);
}

/// Test: Edits replay in write order.
#[test]
fn test_replay_order_last_write_wins() {
    let world = inline_world(9);
    world.set_tile(-20, 7, TileMutation::SetBiome(Biome::Swamp)).expect("in range");
    world.set_tile(-20, 7, TileMutation::SetCost(4.0)).expect("in range");
    world.set_tile(-20, 7, TileMutation::SetBiome(Biome::Desert)).expect("in range");
    let expected = world.get_tile(-20, 7).expect("in range");

    world.evict(TilePos::new(-20, 7).chunk()).expect("not pinned");
    assert_eq!(world.get_tile(-20, 7).expect("in range"), expected);
    assert_eq!(expected.biome, Biome::Desert);
    assert_eq!(expected.cost, Biome::Desert.base_cost());
}

/// Test: A save restores every edit in a fresh world.
#[test]
fn test_save_and_load_round_trip() {
    let world = inline_world(42);
    world.set_tile(3, 3, TileMutation::SetBiome(Biome::Water)).expect("in range");
    world.set_tile(-100, 250, TileMutation::SetOccupied(true)).expect("in range");
    world.set_tile(5000, -5000, TileMutation::SetCost(7.5)).expect("in range");

    let path = temp_path("round_trip");
    world.save(&path).expect("write save");

    let loaded = World::load(WorldConfig::with_seed(42), &path).expect("read save");
    for (x, y) in [(3, 3), (-100, 250), (5000, -5000), (0, 0)] {
        assert_eq!(
            loaded.get_tile(x, y).expect("in range"),
            world.get_tile(x, y).expect("in range"),
            "tile ({x}, {y})"
        );
    }
    assert_eq!(loaded.snapshot().edit_count(), 3);

    assert!(matches!(
        World::load(WorldConfig::with_seed(43), &path),
        Err(WorldError::SeedMismatch { found: 42, expected: 43 })
    ));
    let _ = std::fs::remove_file(&path);
}

/// Test: A save from another generator version is refused.
#[test]
fn test_load_refuses_other_generator_version() {
    let world = inline_world(5);
    world.set_tile(1, 1, TileMutation::SetBiome(Biome::Forest)).expect("in range");
    let mut bytes = world.snapshot().encode();

    // Bump the generator version and re-seal the checksum.
    let body_len = bytes.len() - 4;
    let version = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    bytes[8..12].copy_from_slice(&(version + 1).to_le_bytes());
    let crc = crc32fast::hash(&bytes[..body_len]);
    bytes[body_len..].copy_from_slice(&crc.to_le_bytes());

    assert!(matches!(
        SaveFile::decode(&bytes),
        Err(WorldError::IncompatibleSave { found, expected }) if found == version + 1 && expected == version
    ));

    let path = temp_path("old_version");
    std::fs::write(&path, &bytes).expect("write");
    assert!(matches!(
        World::load(WorldConfig::with_seed(5), &path),
        Err(WorldError::IncompatibleSave { .. })
    ));
    let _ = std::fs::remove_file(&path);
}

/// Test: Unedited worlds save nothing but the header.
#[test]
fn test_untouched_world_saves_no_chunks() {
    let world = inline_world(11);
    world.get_chunk_for_render(ChunkCoord::new(4, 4)).expect("in range");
    let save = world.snapshot();
    assert!(save.chunks.is_empty());
    assert_eq!(save.seed, WorldSeed::new(11));
}

/// Test: Eight threads asking for one chunk produce one generation.
#[test]
fn test_concurrent_requests_generate_once() {
    let world = Arc::new(threaded_world(3));
    let coord = ChunkCoord::new(10, 10);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let world = Arc::clone(&world);
            thread::spawn(move || world.get_chunk_for_render(coord).expect("in range").fingerprint())
        })
        .collect();
    let prints: Vec<u64> = handles.into_iter().map(|h| h.join().expect("no panic")).collect();

    assert!(prints.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(world.stats().generated, 1);
}

/// Test: Polling schedules background generation and eventually succeeds.
#[test]
fn test_poll_chunk_becomes_ready() {
    let world = threaded_world(21);
    let coord = ChunkCoord::new(-7, 12);
    let deadline = Instant::now() + Duration::from_secs(10);

    loop {
        match world.poll_chunk(coord).expect("in range") {
            ChunkPoll::Ready(chunk) => {
                assert_eq!(chunk.coord(), coord);
                break;
            }
            ChunkPoll::Pending => {
                assert!(Instant::now() < deadline, "chunk never became ready");
                thread::sleep(Duration::from_millis(1));
            }
        }
    }
    assert_eq!(world.stats().generated, 1);
}

/// Test: The cache stays within capacity while the focus moves.
#[test]
fn test_focus_respects_capacity() {
    let world = World::new(WorldConfig {
        worker_threads: 0,
        cache_capacity: 9,
        ..WorldConfig::with_seed(2)
    })
    .expect("valid config");

    // A 5x5 square does not fit; the radius is clamped to 1.
    assert_eq!(world.set_focus(TilePos::new(0, 0), 2).expect("in range"), 9);
    assert!(world.store().ready_count() <= 9);
    assert!(world.store().is_ready(ChunkCoord::new(0, 0)));
    assert!(world.store().is_ready(ChunkCoord::new(1, -1)));

    assert!(matches!(
        world.set_focus(TilePos::new(i32::MAX, 0), 1),
        Err(WorldError::OutOfRangeCoordinate { .. })
    ));
}

/// Test: A huge focus radius is clamped instead of exhausting memory.
#[test]
fn test_focus_huge_radius_is_clamped() {
    let world = World::new(WorldConfig {
        worker_threads: 0,
        cache_capacity: 4,
        ..WorldConfig::with_seed(2)
    })
    .expect("valid config");

    assert_eq!(world.set_focus(TilePos::new(0, 0), 100_000).expect("in range"), 1);
    assert_eq!(world.set_focus(TilePos::new(40, 40), u32::MAX).expect("in range"), 1);
    assert!(world.store().ready_count() <= 4);
    // The centre is touched last, so it survives.
    assert!(world.store().is_ready(TilePos::new(40, 40).chunk()));
}

/// Test: Searches without an explicit budget use the configured one.
#[test]
fn test_default_budget_from_config() {
    let tight = World::new(WorldConfig {
        worker_threads: 0,
        default_budget: 3,
        ..WorldConfig::with_seed(17)
    })
    .expect("valid config");
    lay_road(&tight, 0, 6, 0);
    let profile = AgentProfile::default();

    assert_eq!(
        tight.find_path_default(TilePos::new(0, 0), TilePos::new(6, 0), &profile).expect("in range"),
        PathOutcome::NoPath(NoPathReason::BudgetExhausted)
    );
    let id = tight.spawn_agent(TilePos::new(0, 0), profile.clone()).expect("spawn");
    assert_eq!(
        tight.plan_agent(id, TilePos::new(6, 0), None).expect("plan"),
        PathOutcome::NoPath(NoPathReason::BudgetExhausted)
    );
    assert!(!tight.agent(id).expect("agent").has_active_plan());

    // An explicit budget overrides the configured one.
    assert!(tight.plan_agent(id, TilePos::new(6, 0), Some(10_000)).expect("plan").is_found());

    let roomy = inline_world(17);
    lay_road(&roomy, 0, 6, 0);
    let outcome = roomy.find_path_default(TilePos::new(0, 0), TilePos::new(6, 0), &profile).expect("in range");
    assert_eq!(outcome.path().map(|p| p.cost()), Some(6.0));
}

/// Test: A table that classifies nothing yields plains and one warning.
#[test]
fn test_generation_fallback_reaches_caller() {
    let world = World::new(WorldConfig {
        worker_threads: 0,
        biomes: BiomeTable {
            rules: vec![BiomeRule {
                biome: Biome::Mountains,
                elevation_above: Some(2.0),
                elevation_below: None,
                moisture_above: None,
                moisture_below: None,
            }],
            blend_margin: 0.0,
        },
        ..WorldConfig::with_seed(5)
    })
    .expect("valid config");

    let coord = ChunkCoord::new(2, -1);
    let chunk = world.get_chunk_for_render(coord).expect("in range");
    assert!(chunk.is_fallback());
    assert!(chunk.tiles().iter().all(|t| t.biome == Biome::Village));

    let warnings = world.drain_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].coord, coord);
    assert_eq!(warnings[0].unclassified, CHUNK_AREA);
    assert!(world.drain_warnings().is_empty());

    // Cache hits do not warn again.
    world.get_chunk_for_render(coord).expect("in range");
    assert!(world.drain_warnings().is_empty());
}

/// Test: A mutation on the route flags the plan stale and releases the pin.
#[test]
fn test_agent_replans_after_mutation() {
    let world = inline_world(17);
    lay_road(&world, 0, 10, 0);
    lay_road(&world, 4, 6, 1);

    let id = world.spawn_agent(TilePos::new(0, 0), AgentProfile::default()).expect("spawn");
    let outcome = world.plan_agent(id, TilePos::new(10, 0), Some(10_000)).expect("plan");
    let path = outcome.path().expect("road is open");
    assert_eq!(path.cost(), 10.0);

    // The agent's chunk is pinned while its plan is active.
    let home = ChunkCoord::new(0, 0);
    assert!(world.store().is_pinned(home));
    assert!(matches!(world.evict(home), Err(WorldError::ChunkPinned(c)) if c == home));

    assert_eq!(world.step_agent(id).expect("agent"), StepOutcome::Moved(TilePos::new(1, 0)));

    world.set_tile(5, 0, TileMutation::SetOccupied(true)).expect("in range");
    let agent = world.agent(id).expect("agent");
    assert!(agent.is_stale());
    assert!(!world.store().is_pinned(home));
    assert_eq!(world.step_agent(id).expect("agent"), StepOutcome::Replan);
    assert_eq!(world.agent(id).expect("agent").position(), TilePos::new(1, 0));

    let outcome = world.plan_agent(id, TilePos::new(10, 0), Some(10_000)).expect("plan");
    let detour = outcome.path().expect("detour is open");
    assert!(!detour.tiles().contains(&TilePos::new(5, 0)));
    assert!(world.store().is_pinned(home));
}

/// Test: Walking to the goal arrives and releases the pin.
#[test]
fn test_agent_walks_to_goal() {
    let world = inline_world(17);
    lay_road(&world, 0, 6, 0);

    let id = world.spawn_agent(TilePos::new(0, 0), AgentProfile::default()).expect("spawn");
    assert!(world.plan_agent(id, TilePos::new(6, 0), Some(10_000)).expect("plan").is_found());

    let mut steps = 0;
    loop {
        steps += 1;
        match world.step_agent(id).expect("agent") {
            StepOutcome::Moved(_) => {}
            StepOutcome::Arrived(pos) => {
                assert_eq!(pos, TilePos::new(6, 0));
                break;
            }
            other => panic!("unexpected step outcome {other:?}"),
        }
    }
    assert_eq!(steps, 6);
    assert!(!world.store().is_pinned(ChunkCoord::new(0, 0)));
    assert_eq!(world.step_agent(id).expect("agent"), StepOutcome::Idle);

    let agent = world.remove_agent(id).expect("agent");
    assert_eq!(agent.position(), TilePos::new(6, 0));
    assert_eq!(world.agent_count(), 0);
}

/// Test: A background search delivers its outcome.
#[test]
fn test_submit_path_delivers() {
    let world = threaded_world(17);
    lay_road(&world, 0, 8, 0);

    let request = PathRequest::new(TilePos::new(0, 0), TilePos::new(8, 0), AgentProfile::default(), 10_000);
    let mut ticket = world.submit_path(request).expect("queued");
    let deadline = Instant::now() + Duration::from_secs(10);
    while ticket.try_outcome().is_none() {
        assert!(Instant::now() < deadline, "search never finished");
        thread::sleep(Duration::from_millis(1));
    }
    let outcome = ticket.wait().expect("finished");
    assert_eq!(outcome.path().map(|p| p.cost()), Some(8.0));
}

/// Test: A cancelled background search never reports an outcome.
#[test]
fn test_submit_path_cancel() {
    let world = threaded_world(23);
    let request = PathRequest::new(
        TilePos::new(0, 0),
        TilePos::new(200_000, 150_000),
        AgentProfile::default(),
        50_000_000,
    );
    let ticket = world.submit_path(request).expect("queued");
    ticket.cancel();
    assert!(ticket.is_cancelled());
    assert!(ticket.wait().is_none());
}

/// Test: A wall of occupied tiles hides everything behind it.
#[test]
fn test_visible_tiles_through_world() {
    let world = inline_world(31);
    for y in -6..=6 {
        lay_road(&world, -6, 6, y);
    }
    for y in -6..=6 {
        world.set_tile(2, y, TileMutation::SetOccupied(true)).expect("in range");
    }

    let visible = world.visible_tiles(TilePos::new(0, 0), 5).expect("in range");
    assert!(visible.contains(&TilePos::new(0, 0)));
    assert!(visible.contains(&TilePos::new(2, 0)));
    assert!(visible.contains(&TilePos::new(-5, 0)));
    assert!(visible.iter().all(|pos| pos.x <= 2));
}

/// Test: An enormous sight radius is clamped, not wrapped to nothing.
#[test]
fn test_visible_tiles_huge_radius() {
    let world = inline_world(31);
    let origin = TilePos::new(0, 0);

    let huge = world.visible_tiles(origin, u32::MAX).expect("in range");
    assert!(huge.len() > 1);
    assert!(huge.contains(&TilePos::new(1, 0)));
    let limit = i64::from(MAX_SIGHT_RADIUS) * i64::from(MAX_SIGHT_RADIUS);
    assert!(huge
        .iter()
        .all(|p| i64::from(p.x) * i64::from(p.x) + i64::from(p.y) * i64::from(p.y) <= limit));
    assert_eq!(huge, world.visible_tiles(origin, MAX_SIGHT_RADIUS).expect("in range"));
}

/// Test: Searches reject endpoints outside the world before generating.
#[test]
fn test_find_path_out_of_range() {
    let world = inline_world(1);
    let result = world.find_path(
        TilePos::new(0, 0),
        TilePos::new(i32::MIN, 0),
        &AgentProfile::default(),
        100,
    );
    assert!(matches!(result, Err(WorldError::OutOfRangeCoordinate { .. })));
    assert_eq!(world.stats().generated, 0);
}

/// Test: A resumable search finishes with the same result as a blocking one.
#[test]
fn test_resumable_search_matches_blocking() {
    let world = inline_world(64);
    let request = PathRequest::new(TilePos::new(-10, -10), TilePos::new(25, 18), AgentProfile::default(), 100_000);
    let blocking = world.search(&request).expect("in range");

    let mut search = world.begin_path(request).expect("in range");
    let mut ticks = 0;
    let resumed = loop {
        ticks += 1;
        match world.advance_path(&mut search, 16) {
            llamaquest_pathfinding::SearchStatus::Done(outcome) => break outcome,
            llamaquest_pathfinding::SearchStatus::InProgress => {}
            llamaquest_pathfinding::SearchStatus::Cancelled => panic!("never cancelled"),
        }
    };
    assert_eq!(resumed, blocking);
    assert!(ticks >= 1);
}

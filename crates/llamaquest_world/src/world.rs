//! # World Facade
//!
//! The one object the game loop holds. It owns the chunk store, the worker
//! pool and the agent table, and is the only way to read or change tiles.
//!
//! Everything takes `&self`; share a `World` behind an `Arc` to query it
//! from render or AI threads.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use llamaquest_pathfinding::{
    find_path, visible_tiles, Agent, AgentId, AgentProfile, CancelToken, NavTile, PathOutcome,
    PathRequest, PathSearch, SearchStatus, StepOutcome,
};
use llamaquest_procedural::{
    Biome, Chunk, ChunkCoord, ChunkGenerator, GenerationWarning, Tile, TileMutation, TilePos,
    WorldSeed, WORLDGEN_VERSION,
};

use crate::config::WorldConfig;
use crate::error::{ConfigError, WorldError, WorldResult};
use crate::persistence::SaveFile;
use crate::store::{ChunkPoll, ChunkStore, StoreStats};
use crate::workers::WorkerPool;

/// What the game loop sees of one tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileInfo {
    /// Terrain category.
    pub biome: Biome,
    /// Movement cost before occupancy; `f32::INFINITY` when impassable.
    pub cost: f32,
    /// A blocking structure or resource stands here.
    pub occupancy: bool,
    /// Changed since generation.
    pub modified: bool,
}

impl TileInfo {
    /// Cost an agent actually pays to enter.
    #[must_use]
    pub fn effective_cost(&self) -> f32 {
        if self.occupancy {
            f32::INFINITY
        } else {
            self.cost
        }
    }
}

impl From<&Tile> for TileInfo {
    fn from(tile: &Tile) -> Self {
        Self {
            biome: tile.biome,
            cost: tile.cost,
            occupancy: tile.occupied,
            modified: tile.modified,
        }
    }
}

/// Handle to a path search running on the worker pool.
///
/// Dropping the ticket does not stop the search; call `cancel` first.
pub struct PathTicket {
    receiver: Receiver<PathOutcome>,
    cancel: CancelToken,
    outcome: Option<PathOutcome>,
}

impl PathTicket {
    /// The outcome once the search has finished, without blocking.
    pub fn try_outcome(&mut self) -> Option<&PathOutcome> {
        if self.outcome.is_none() {
            self.outcome = self.receiver.try_recv().ok();
        }
        self.outcome.as_ref()
    }

    /// Blocks until the search finishes.
    ///
    /// Returns `None` if it was cancelled.
    pub fn wait(mut self) -> Option<PathOutcome> {
        self.outcome.take().or_else(|| self.receiver.recv().ok())
    }

    /// Abandons the search. No outcome will arrive after it notices.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether `cancel` was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// An agent plus the chunk pin its plan holds.
struct AgentSlot {
    agent: Agent,
    pinned: Option<ChunkCoord>,
}

impl AgentSlot {
    /// Keeps exactly one pin on the agent's chunk while its plan is active.
    fn sync_pin(&mut self, store: &ChunkStore) {
        let wanted = self
            .agent
            .has_active_plan()
            .then(|| self.agent.position().chunk());
        if wanted == self.pinned {
            return;
        }
        if let Some(old) = self.pinned.take() {
            store.unpin(old);
        }
        if let Some(new) = wanted {
            store.pin(new);
            self.pinned = Some(new);
        }
    }

    fn release(&mut self, store: &ChunkStore) {
        if let Some(old) = self.pinned.take() {
            store.unpin(old);
        }
    }
}

/// The authoritative world.
pub struct World {
    config: WorldConfig,
    store: Arc<ChunkStore>,
    workers: WorkerPool,
    scheduled: Arc<Mutex<HashSet<ChunkCoord>>>,
    agents: Mutex<HashMap<AgentId, AgentSlot>>,
    next_agent: AtomicU64,
}

impl World {
    /// Opens an empty world.
    ///
    /// # Errors
    ///
    /// `Config` for an invalid configuration, `Io` if worker threads cannot
    /// be spawned.
    pub fn new(config: WorldConfig) -> WorldResult<Self> {
        config.validate()?;
        let generator = ChunkGenerator::new(config.world_seed(), config.generator_params());
        let store = Arc::new(ChunkStore::new(generator, config.cache_capacity));
        let workers = WorkerPool::new(config.worker_threads, config.worker_queue)?;

        info!(
            seed = config.seed,
            cache_capacity = config.cache_capacity,
            worker_threads = config.worker_threads,
            "world opened"
        );
        Ok(Self {
            config,
            store,
            workers,
            scheduled: Arc::new(Mutex::new(HashSet::new())),
            agents: Mutex::new(HashMap::new()),
            next_agent: AtomicU64::new(1),
        })
    }

    /// Opens a world from a decoded save.
    ///
    /// # Errors
    ///
    /// `SeedMismatch` if the save belongs to another seed,
    /// `IncompatibleSave` for another generator version, plus `new`'s errors.
    pub fn from_save(config: WorldConfig, save: SaveFile) -> WorldResult<Self> {
        if save.version != WORLDGEN_VERSION {
            warn!(found = save.version, expected = WORLDGEN_VERSION, "save refused");
            return Err(WorldError::IncompatibleSave {
                found: save.version,
                expected: WORLDGEN_VERSION,
            });
        }
        if save.seed.value() != config.seed {
            warn!(found = save.seed.value(), expected = config.seed, "save refused");
            return Err(WorldError::SeedMismatch {
                found: save.seed.value(),
                expected: config.seed,
            });
        }

        let world = Self::new(config)?;
        let edits = save.edit_count();
        world.store.install_diffs(save.chunks);
        info!(edits, "save applied");
        Ok(world)
    }

    /// Reads a save file and opens the world it describes.
    ///
    /// # Errors
    ///
    /// As `SaveFile::read_from` and `from_save`.
    pub fn load(config: WorldConfig, path: impl AsRef<Path>) -> WorldResult<Self> {
        let save = SaveFile::read_from(path)?;
        Self::from_save(config, save)
    }

    /// Every edit made so far, ready to encode.
    #[must_use]
    pub fn snapshot(&self) -> SaveFile {
        SaveFile::new(self.seed(), self.store.diffs())
    }

    /// Writes a save file.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> WorldResult<()> {
        self.snapshot().write_to(path)
    }

    /// The world seed.
    #[must_use]
    pub const fn seed(&self) -> WorldSeed {
        self.config.world_seed()
    }

    /// Configuration the world was opened with.
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// The underlying chunk store.
    #[must_use]
    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    fn tile_pos(world_x: i64, world_y: i64) -> WorldResult<TilePos> {
        TilePos::checked(world_x, world_y).ok_or(WorldError::OutOfRangeCoordinate {
            x: world_x,
            y: world_y,
        })
    }

    /// Reads one tile, generating its chunk if needed.
    ///
    /// # Errors
    ///
    /// `OutOfRangeCoordinate` outside the world.
    pub fn get_tile(&self, world_x: i64, world_y: i64) -> WorldResult<TileInfo> {
        let pos = Self::tile_pos(world_x, world_y)?;
        Ok(TileInfo::from(&self.store.get_tile(pos)?))
    }

    /// Mutates one tile and returns its new state.
    ///
    /// Agents whose remaining plan crosses the tile and can no longer enter
    /// it have their plan flagged stale.
    ///
    /// # Errors
    ///
    /// `OutOfRangeCoordinate` outside the world, `InvalidMutation` for a
    /// cost below the minimum.
    pub fn set_tile(&self, world_x: i64, world_y: i64, mutation: TileMutation) -> WorldResult<TileInfo> {
        let pos = Self::tile_pos(world_x, world_y)?;
        let tile = self.store.set_tile(pos, mutation)?;

        let nav = NavTile::from(&tile);
        let mut agents = self.agents.lock();
        for slot in agents.values_mut() {
            let agent = &mut slot.agent;
            if agent.has_active_plan()
                && agent.remaining().contains(&pos)
                && agent.profile().step_cost(&nav).is_none()
            {
                agent.invalidate();
                debug!(agent = %agent.id(), x = pos.x, y = pos.y, "plan invalidated by mutation");
                slot.sync_pin(&self.store);
            }
        }
        Ok(TileInfo::from(&tile))
    }

    /// Read-only chunk for the renderer, generating it if needed.
    ///
    /// # Errors
    ///
    /// `OutOfRangeCoordinate` outside the world.
    pub fn get_chunk_for_render(&self, coord: ChunkCoord) -> WorldResult<Arc<Chunk>> {
        ChunkStore::check_coord(coord)?;
        self.store.get_or_generate(coord)
    }

    /// The chunk if ready; otherwise schedules it on the worker pool and
    /// returns `Pending`. Never blocks on generation.
    ///
    /// # Errors
    ///
    /// `OutOfRangeCoordinate` outside the world.
    pub fn poll_chunk(&self, coord: ChunkCoord) -> WorldResult<ChunkPoll> {
        ChunkStore::check_coord(coord)?;
        if let ChunkPoll::Ready(chunk) = self.store.poll(coord) {
            return Ok(ChunkPoll::Ready(chunk));
        }
        if !self.scheduled.lock().insert(coord) {
            return Ok(ChunkPoll::Pending);
        }

        let store = Arc::clone(&self.store);
        let scheduled = Arc::clone(&self.scheduled);
        let accepted = self.workers.try_submit(Box::new(move || {
            if let Err(e) = store.get_or_generate(coord) {
                warn!(chunk_x = coord.x, chunk_y = coord.y, error = %e, "background generation failed");
            }
            scheduled.lock().remove(&coord);
        }));
        if !accepted {
            self.scheduled.lock().remove(&coord);
            debug!(chunk_x = coord.x, chunk_y = coord.y, "generation deferred; worker queue full");
        }
        // Inline pools have already finished the job.
        Ok(self.store.poll(coord))
    }

    fn check_request(request: &PathRequest) -> WorldResult<()> {
        ChunkStore::check_tile(request.start)?;
        ChunkStore::check_tile(request.goal)?;
        request
            .profile
            .validate()
            .map_err(|e| WorldError::Config(ConfigError::Params(e)))
    }

    /// Runs a 4-connected search to completion on the calling thread.
    ///
    /// # Errors
    ///
    /// `OutOfRangeCoordinate` for an endpoint outside the world, `Config` for
    /// an invalid profile. A missing path is an `Ok` outcome.
    pub fn find_path(
        &self,
        start: TilePos,
        goal: TilePos,
        profile: &AgentProfile,
        budget: usize,
    ) -> WorldResult<PathOutcome> {
        self.search(&PathRequest::new(start, goal, profile.clone(), budget))
    }

    /// `find_path` with the configured `default_budget`.
    ///
    /// # Errors
    ///
    /// As `find_path`.
    pub fn find_path_default(&self, start: TilePos, goal: TilePos, profile: &AgentProfile) -> WorldResult<PathOutcome> {
        self.find_path(start, goal, profile, self.config.default_budget)
    }

    /// Runs any request to completion on the calling thread.
    ///
    /// # Errors
    ///
    /// As `find_path`.
    pub fn search(&self, request: &PathRequest) -> WorldResult<PathOutcome> {
        Self::check_request(request)?;
        Ok(find_path(&self.store.view(), request))
    }

    /// Starts a search to be advanced a few expansions per tick with
    /// `advance_path`.
    ///
    /// # Errors
    ///
    /// As `find_path`.
    pub fn begin_path(&self, request: PathRequest) -> WorldResult<PathSearch> {
        Self::check_request(&request)?;
        Ok(PathSearch::new(request))
    }

    /// Advances a search by at most `quota` expansions.
    pub fn advance_path(&self, search: &mut PathSearch, quota: usize) -> SearchStatus {
        search.step(&self.store.view(), quota)
    }

    /// Runs a search on the worker pool.
    ///
    /// # Errors
    ///
    /// As `find_path`, plus `Busy` when the worker queue is full.
    pub fn submit_path(&self, request: PathRequest) -> WorldResult<PathTicket> {
        Self::check_request(&request)?;
        let cancel = CancelToken::new();
        let (sender, receiver) = bounded(1);

        let store = Arc::clone(&self.store);
        let token = cancel.clone();
        let accepted = self.workers.try_submit(Box::new(move || {
            let mut search = PathSearch::with_cancel(request, token);
            if let SearchStatus::Done(outcome) = search.run(&store.view()) {
                let _ = sender.send(outcome);
            }
        }));
        if !accepted {
            return Err(WorldError::Busy);
        }

        Ok(PathTicket {
            receiver,
            cancel,
            outcome: None,
        })
    }

    /// Field of view from `origin`.
    ///
    /// Radii above `MAX_SIGHT_RADIUS` are clamped, which also bounds the
    /// chunks a single call may generate.
    ///
    /// # Errors
    ///
    /// `OutOfRangeCoordinate` outside the world.
    pub fn visible_tiles(&self, origin: TilePos, radius: u32) -> WorldResult<Vec<TilePos>> {
        ChunkStore::check_tile(origin)?;
        Ok(visible_tiles(&self.store.view(), origin, radius))
    }

    /// Drops a chunk from memory; its edits survive in the diff store.
    ///
    /// # Errors
    ///
    /// `ChunkGenerating` or `ChunkPinned` when eviction is not allowed.
    pub fn evict(&self, coord: ChunkCoord) -> WorldResult<bool> {
        self.store.evict(coord)
    }

    /// Largest focus radius whose square of chunks fits in the cache.
    fn focus_radius_limit(&self) -> u32 {
        let capacity = self.store.capacity();
        let mut radius = 0u32;
        let mut side = 3usize;
        while side * side <= capacity && radius < ChunkStore::CHUNK_LIMIT as u32 {
            radius += 1;
            side += 2;
        }
        radius
    }

    /// Generates or touches every chunk within `radius` chunks of `center`,
    /// nearest last so LRU keeps them longest. Returns the chunks touched.
    ///
    /// The radius is clamped so the focus square fits in the cache.
    ///
    /// # Errors
    ///
    /// `OutOfRangeCoordinate` if `center` is outside the world.
    pub fn set_focus(&self, center: TilePos, radius: u32) -> WorldResult<usize> {
        ChunkStore::check_tile(center)?;
        let origin = center.chunk();
        let limit = self.focus_radius_limit();
        if radius > limit {
            debug!(radius, limit, capacity = self.store.capacity(), "focus radius clamped to cache");
        }
        let r = radius.min(limit) as i32;

        let mut coords: Vec<ChunkCoord> = (-r..=r)
            .flat_map(|dy| (-r..=r).map(move |dx| (dx, dy)))
            .filter_map(|(dx, dy)| {
                let coord = ChunkCoord::new(origin.x.checked_add(dx)?, origin.y.checked_add(dy)?);
                ChunkStore::check_coord(coord).ok().map(|()| coord)
            })
            .collect();
        coords.sort_by_key(|coord| std::cmp::Reverse(coord.chebyshev(origin)));
        for coord in &coords {
            self.store.get_or_generate(*coord)?;
        }
        Ok(coords.len())
    }

    /// Store counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Takes warnings raised by chunks that fell back to plains.
    pub fn drain_warnings(&self) -> Vec<GenerationWarning> {
        self.store.drain_warnings()
    }

    /// Places a new idle agent.
    ///
    /// # Errors
    ///
    /// `OutOfRangeCoordinate` outside the world, `Config` for an invalid
    /// profile.
    pub fn spawn_agent(&self, position: TilePos, profile: AgentProfile) -> WorldResult<AgentId> {
        ChunkStore::check_tile(position)?;
        profile
            .validate()
            .map_err(|e| WorldError::Config(ConfigError::Params(e)))?;

        let id = AgentId(self.next_agent.fetch_add(1, Ordering::Relaxed));
        self.agents.lock().insert(
            id,
            AgentSlot {
                agent: Agent::new(id, position, profile),
                pinned: None,
            },
        );
        debug!(agent = %id, x = position.x, y = position.y, "agent spawned");
        Ok(id)
    }

    /// Copy of an agent's current state.
    #[must_use]
    pub fn agent(&self, id: AgentId) -> Option<Agent> {
        self.agents.lock().get(&id).map(|slot| slot.agent.clone())
    }

    /// Number of live agents.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.lock().len()
    }

    /// Searches from the agent's tile to `goal` and adopts the path if one
    /// is found. `None` uses the configured `default_budget`.
    ///
    /// # Errors
    ///
    /// `UnknownAgent`, or `OutOfRangeCoordinate` for a goal outside the world.
    pub fn plan_agent(&self, id: AgentId, goal: TilePos, budget: Option<usize>) -> WorldResult<PathOutcome> {
        let budget = budget.unwrap_or(self.config.default_budget);
        let request = {
            let agents = self.agents.lock();
            let slot = agents.get(&id).ok_or(WorldError::UnknownAgent(id))?;
            PathRequest::new(slot.agent.position(), goal, slot.agent.profile().clone(), budget)
        };
        // Searched without the agent lock so other agents keep stepping.
        let outcome = self.search(&request)?;

        let mut agents = self.agents.lock();
        let slot = agents.get_mut(&id).ok_or(WorldError::UnknownAgent(id))?;
        match outcome.path() {
            Some(path) => {
                if !slot.agent.set_plan(path.clone()) {
                    debug!(agent = %id, "plan not adopted");
                }
            }
            None => slot.agent.clear_plan(),
        }
        slot.sync_pin(&self.store);
        Ok(outcome)
    }

    /// Moves an agent one tile along its plan.
    ///
    /// # Errors
    ///
    /// `UnknownAgent`.
    pub fn step_agent(&self, id: AgentId) -> WorldResult<StepOutcome> {
        let mut agents = self.agents.lock();
        let slot = agents.get_mut(&id).ok_or(WorldError::UnknownAgent(id))?;
        let outcome = slot.agent.step(&*self.store);
        slot.sync_pin(&self.store);
        if outcome == StepOutcome::Replan {
            debug!(agent = %id, "agent needs a new plan");
        }
        Ok(outcome)
    }

    /// Removes an agent and releases its pin.
    ///
    /// # Errors
    ///
    /// `UnknownAgent`.
    pub fn remove_agent(&self, id: AgentId) -> WorldResult<Agent> {
        let mut slot = self
            .agents
            .lock()
            .remove(&id)
            .ok_or(WorldError::UnknownAgent(id))?;
        slot.release(&self.store);
        Ok(slot.agent)
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("seed", &self.config.seed)
            .field("ready_chunks", &self.store.ready_count())
            .field("workers", &self.workers.threads())
            .field("agents", &self.agent_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> World {
        let config = WorldConfig {
            worker_threads: 0,
            ..WorldConfig::with_seed(7)
        };
        World::new(config).expect("valid config")
    }

    #[test]
    fn test_out_of_range_rejected() {
        let world = world();
        assert!(matches!(
            world.get_tile(1 << 40, 0),
            Err(WorldError::OutOfRangeCoordinate { x, y: 0 }) if x == 1 << 40
        ));
        assert!(matches!(
            world.set_tile(0, -(1 << 30), TileMutation::SetOccupied(true)),
            Err(WorldError::OutOfRangeCoordinate { .. })
        ));
        assert_eq!(world.stats().generated, 0);
    }

    #[test]
    fn test_tile_info_reflects_mutation() {
        let world = world();
        let info = world.set_tile(5, -3, TileMutation::SetBiome(Biome::Desert)).expect("in range");
        assert_eq!(info.biome, Biome::Desert);
        assert_eq!(info.cost, Biome::Desert.base_cost());
        assert!(info.modified);
        assert_eq!(world.get_tile(5, -3).expect("in range"), info);

        let info = world.set_tile(5, -3, TileMutation::SetOccupied(true)).expect("in range");
        assert!(info.occupancy);
        assert_eq!(info.effective_cost(), f32::INFINITY);
    }

    #[test]
    fn test_invalid_config_refused() {
        let config = WorldConfig {
            cache_capacity: 0,
            ..WorldConfig::default()
        };
        assert!(matches!(World::new(config), Err(WorldError::Config(_))));
    }

    #[test]
    fn test_inline_poll_is_ready_at_once() {
        let world = world();
        let coord = ChunkCoord::new(3, -2);
        assert!(matches!(world.poll_chunk(coord), Ok(ChunkPoll::Ready(_))));
    }

    #[test]
    fn test_unknown_agent() {
        let world = world();
        assert!(matches!(world.step_agent(AgentId(99)), Err(WorldError::UnknownAgent(AgentId(99)))));
        assert!(matches!(world.remove_agent(AgentId(99)), Err(WorldError::UnknownAgent(_))));
    }

    #[test]
    fn test_from_save_checks_seed_and_version() {
        let save = SaveFile::new(WorldSeed::new(8), Vec::new());
        assert!(matches!(
            World::from_save(WorldConfig::with_seed(7), save),
            Err(WorldError::SeedMismatch { found: 8, expected: 7 })
        ));

        let mut save = SaveFile::new(WorldSeed::new(7), Vec::new());
        save.version = WORLDGEN_VERSION + 1;
        assert!(matches!(
            World::from_save(WorldConfig::with_seed(7), save),
            Err(WorldError::IncompatibleSave { .. })
        ));
    }
}

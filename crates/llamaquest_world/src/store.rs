//! # Chunk Store
//!
//! Lazily generated, bounded cache of chunks keyed by coordinate.
//!
//! ## Slots
//!
//! Each coordinate is either absent, `Generating` (one caller is building
//! it, everyone else waits on the same in-flight marker) or `Ready`.
//! Generation runs outside the slot lock, so different chunks generate in
//! parallel.
//!
//! ## Reads and writes
//!
//! A ready chunk lives behind `RwLock<Arc<Chunk>>`. Readers clone the `Arc`
//! and never wait on anything but a pointer copy. Writers to one chunk are
//! serialized by that chunk's edit log lock and swap in a new snapshot
//! (copy-on-write when a reader still holds the old one).
//!
//! ## Diff logs
//!
//! Every mutation is appended to its chunk's pending log. Eviction flushes
//! the pending log into the diff store before the chunk leaves memory; the
//! next generation of that coordinate replays the stored log in write
//! order on top of freshly generated base terrain.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use llamaquest_pathfinding::{NavTerrain, NavTile};
use llamaquest_procedural::{
    Chunk, ChunkCoord, ChunkGenerator, GenerationWarning, LocalPos, Tile, TileMutation, TilePos,
    CHUNK_SIZE, WORLD_COORD_LIMIT,
};

use crate::error::{WorldError, WorldResult};

/// One recorded mutation inside a chunk.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileEdit {
    /// Tile inside the chunk.
    pub local: LocalPos,
    /// What was done to it.
    pub mutation: TileMutation,
}

/// Ordered edit log of one chunk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkDiff {
    /// Chunk the edits belong to.
    pub coord: ChunkCoord,
    /// Edits in the order they were made.
    pub edits: Vec<TileEdit>,
}

/// Counters for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Chunks generated (including regenerations after eviction).
    pub generated: u64,
    /// Chunks evicted.
    pub evicted: u64,
    /// Edits replayed onto regenerated chunks.
    pub replayed_edits: u64,
    /// Callers that waited on another caller's generation.
    pub dedup_waits: u64,
}

#[derive(Default)]
struct Counters {
    generated: AtomicU64,
    evicted: AtomicU64,
    replayed_edits: AtomicU64,
    dedup_waits: AtomicU64,
}

/// In-flight generation marker.
struct InFlight {
    done: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl InFlight {
    fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    fn signal(&self) {
        let _guard = self.mutex.lock();
        self.done.store(true, Ordering::Release);
        self.condvar.notify_all();
    }

    fn wait(&self) {
        if self.done.load(Ordering::Acquire) {
            return;
        }
        let mut guard = self.mutex.lock();
        while !self.done.load(Ordering::Acquire) {
            self.condvar.wait(&mut guard);
        }
    }
}

struct EditLog {
    pending: Vec<TileEdit>,
    evicted: bool,
}

/// A ready chunk plus its write-side state.
struct ChunkEntry {
    chunk: RwLock<Arc<Chunk>>,
    log: Mutex<EditLog>,
    last_touch: AtomicU64,
}

impl ChunkEntry {
    fn snapshot(&self) -> Arc<Chunk> {
        Arc::clone(&self.chunk.read())
    }
}

enum Slot {
    Generating(Arc<InFlight>),
    Ready(Arc<ChunkEntry>),
}

enum Claim {
    Ready(Arc<ChunkEntry>),
    Wait(Arc<InFlight>),
    Build(Arc<InFlight>),
}

/// Clears a `Generating` slot if generation unwinds.
struct FlightGuard<'a> {
    store: &'a ChunkStore,
    coord: ChunkCoord,
    flight: Arc<InFlight>,
    armed: bool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut slots = self.store.slots.lock();
            if matches!(slots.get(&self.coord), Some(Slot::Generating(_))) {
                slots.remove(&self.coord);
            }
            drop(slots);
            self.flight.signal();
        }
    }
}

/// Non-blocking view of a chunk's state.
#[derive(Clone, Debug)]
pub enum ChunkPoll {
    /// Ready to read.
    Ready(Arc<Chunk>),
    /// Not ready yet.
    Pending,
}

/// The authoritative chunk cache.
pub struct ChunkStore {
    generator: ChunkGenerator,
    capacity: usize,
    slots: Mutex<HashMap<ChunkCoord, Slot>>,
    diffs: Mutex<HashMap<ChunkCoord, Vec<TileEdit>>>,
    pins: Mutex<HashMap<ChunkCoord, usize>>,
    warnings: Mutex<Vec<GenerationWarning>>,
    clock: AtomicU64,
    counters: Counters,
}

impl ChunkStore {
    /// Largest chunk coordinate magnitude whose tiles are all in the world.
    pub const CHUNK_LIMIT: i32 = (WORLD_COORD_LIMIT / CHUNK_SIZE as i64) as i32;

    /// Creates an empty store holding at most `capacity` unpinned chunks.
    #[must_use]
    pub fn new(generator: ChunkGenerator, capacity: usize) -> Self {
        Self {
            generator,
            capacity: capacity.max(1),
            slots: Mutex::new(HashMap::new()),
            diffs: Mutex::new(HashMap::new()),
            pins: Mutex::new(HashMap::new()),
            warnings: Mutex::new(Vec::new()),
            clock: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    /// The generator in use.
    #[must_use]
    pub const fn generator(&self) -> &ChunkGenerator {
        &self.generator
    }

    /// Maximum number of unpinned ready chunks.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn check_coord(coord: ChunkCoord) -> WorldResult<()> {
        let range = -Self::CHUNK_LIMIT..Self::CHUNK_LIMIT;
        if range.contains(&coord.x) && range.contains(&coord.y) {
            Ok(())
        } else {
            Err(WorldError::OutOfRangeCoordinate {
                x: i64::from(coord.x) * CHUNK_SIZE as i64,
                y: i64::from(coord.y) * CHUNK_SIZE as i64,
            })
        }
    }

    pub(crate) fn check_tile(pos: TilePos) -> WorldResult<()> {
        if pos.in_world() {
            Ok(())
        } else {
            Err(WorldError::OutOfRangeCoordinate {
                x: i64::from(pos.x),
                y: i64::from(pos.y),
            })
        }
    }

    fn touch(&self, entry: &ChunkEntry) {
        let now = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        entry.last_touch.store(now, Ordering::Relaxed);
    }

    fn claim(&self, coord: ChunkCoord) -> Claim {
        let mut slots = self.slots.lock();
        match slots.get(&coord) {
            Some(Slot::Ready(entry)) => {
                self.touch(entry);
                trace!(chunk_x = coord.x, chunk_y = coord.y, "chunk cache hit");
                Claim::Ready(Arc::clone(entry))
            }
            Some(Slot::Generating(flight)) => Claim::Wait(Arc::clone(flight)),
            None => {
                let flight = Arc::new(InFlight::new());
                slots.insert(coord, Slot::Generating(Arc::clone(&flight)));
                Claim::Build(flight)
            }
        }
    }

    /// Generates base terrain and replays the stored diff log.
    fn build(&self, coord: ChunkCoord) -> ChunkEntry {
        let generated = self.generator.generate(coord);
        let mut chunk = generated.chunk;
        if let Some(warning) = generated.warning {
            self.warnings.lock().push(warning);
        }

        let edits = self.diffs.lock().get(&coord).cloned().unwrap_or_default();
        for edit in &edits {
            chunk.apply(edit.local, edit.mutation);
        }

        self.counters.generated.fetch_add(1, Ordering::Relaxed);
        self.counters
            .replayed_edits
            .fetch_add(edits.len() as u64, Ordering::Relaxed);
        debug!(
            chunk_x = coord.x,
            chunk_y = coord.y,
            replayed = edits.len(),
            "chunk generated"
        );

        ChunkEntry {
            chunk: RwLock::new(Arc::new(chunk)),
            log: Mutex::new(EditLog {
                pending: Vec::new(),
                evicted: false,
            }),
            last_touch: AtomicU64::new(0),
        }
    }

    fn entry(&self, coord: ChunkCoord) -> WorldResult<Arc<ChunkEntry>> {
        Self::check_coord(coord)?;
        loop {
            match self.claim(coord) {
                Claim::Ready(entry) => return Ok(entry),
                Claim::Wait(flight) => {
                    self.counters.dedup_waits.fetch_add(1, Ordering::Relaxed);
                    flight.wait();
                    // The chunk may have been evicted again meanwhile; re-claim.
                }
                Claim::Build(flight) => {
                    let mut guard = FlightGuard {
                        store: self,
                        coord,
                        flight,
                        armed: true,
                    };
                    let entry = Arc::new(self.build(coord));
                    self.touch(&entry);
                    self.slots.lock().insert(coord, Slot::Ready(Arc::clone(&entry)));
                    guard.armed = false;
                    guard.flight.signal();
                    self.enforce_capacity(coord);
                    return Ok(entry);
                }
            }
        }
    }

    /// Returns the ready chunk, generating it or waiting for an in-flight
    /// generation as needed.
    ///
    /// # Errors
    ///
    /// `OutOfRangeCoordinate` if the chunk lies outside the world.
    pub fn get_or_generate(&self, coord: ChunkCoord) -> WorldResult<Arc<Chunk>> {
        Ok(self.entry(coord)?.snapshot())
    }

    /// The chunk if ready, without generating or waiting.
    #[must_use]
    pub fn poll(&self, coord: ChunkCoord) -> ChunkPoll {
        match self.slots.lock().get(&coord) {
            Some(Slot::Ready(entry)) => {
                self.touch(entry);
                ChunkPoll::Ready(entry.snapshot())
            }
            Some(Slot::Generating(_)) | None => ChunkPoll::Pending,
        }
    }

    /// Whether a chunk is ready in memory.
    #[must_use]
    pub fn is_ready(&self, coord: ChunkCoord) -> bool {
        matches!(self.slots.lock().get(&coord), Some(Slot::Ready(_)))
    }

    /// Ready chunks currently in memory.
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    /// Reads one tile.
    ///
    /// # Errors
    ///
    /// `OutOfRangeCoordinate` outside the world.
    pub fn get_tile(&self, pos: TilePos) -> WorldResult<Tile> {
        Self::check_tile(pos)?;
        let chunk = self.get_or_generate(pos.chunk())?;
        Ok(*chunk.tile(pos.local()))
    }

    /// Mutates one tile and records the edit. Returns the new tile.
    ///
    /// # Errors
    ///
    /// `OutOfRangeCoordinate` outside the world, `InvalidMutation` for a
    /// mutation that would break the cost invariant.
    pub fn set_tile(&self, pos: TilePos, mutation: TileMutation) -> WorldResult<Tile> {
        Self::check_tile(pos)?;
        let mutation = mutation
            .validate()
            .map_err(|e| WorldError::InvalidMutation(e.to_string()))?;
        let (coord, local) = (pos.chunk(), pos.local());

        loop {
            let entry = self.entry(coord)?;
            let mut log = entry.log.lock();
            if log.evicted {
                // Lost a race with eviction; the next entry replays our peers' edits.
                continue;
            }

            let tile = {
                let mut snapshot = entry.chunk.write();
                let chunk = Arc::make_mut(&mut *snapshot);
                chunk.apply(local, mutation);
                *chunk.tile(local)
            };
            log.pending.push(TileEdit { local, mutation });
            trace!(x = pos.x, y = pos.y, ?mutation, "tile mutated");
            return Ok(tile);
        }
    }

    fn flush(&self, coord: ChunkCoord, log: &mut EditLog) {
        if log.pending.is_empty() {
            return;
        }
        self.diffs
            .lock()
            .entry(coord)
            .or_default()
            .append(&mut log.pending);
    }

    /// Removes a chunk from memory after flushing its edits.
    ///
    /// Returns `false` if the chunk was not in memory.
    ///
    /// # Errors
    ///
    /// `ChunkGenerating` while it is being generated, `ChunkPinned` while an
    /// agent with an active plan stands in it.
    pub fn evict(&self, coord: ChunkCoord) -> WorldResult<bool> {
        let mut slots = self.slots.lock();
        match slots.get(&coord) {
            None => return Ok(false),
            Some(Slot::Generating(_)) => return Err(WorldError::ChunkGenerating(coord)),
            Some(Slot::Ready(_)) => {}
        }
        if self.is_pinned(coord) {
            return Err(WorldError::ChunkPinned(coord));
        }
        if let Some(Slot::Ready(entry)) = slots.remove(&coord) {
            self.retire(coord, &entry);
        }
        Ok(true)
    }

    fn retire(&self, coord: ChunkCoord, entry: &ChunkEntry) {
        let mut log = entry.log.lock();
        self.flush(coord, &mut log);
        log.evicted = true;
        self.counters.evicted.fetch_add(1, Ordering::Relaxed);
        debug!(chunk_x = coord.x, chunk_y = coord.y, "chunk evicted");
    }

    /// Evicts least recently touched unpinned chunks until within capacity.
    fn enforce_capacity(&self, keep: ChunkCoord) {
        let mut slots = self.slots.lock();
        loop {
            let ready = slots
                .values()
                .filter(|slot| matches!(slot, Slot::Ready(_)))
                .count();
            if ready <= self.capacity {
                return;
            }

            let victim = slots
                .iter()
                .filter_map(|(coord, slot)| match slot {
                    Slot::Ready(entry) if *coord != keep && !self.is_pinned(*coord) => {
                        Some((entry.last_touch.load(Ordering::Relaxed), *coord))
                    }
                    _ => None,
                })
                .min()
                .map(|(_, coord)| coord);

            let Some(victim) = victim else {
                debug!(ready, capacity = self.capacity, "cache over capacity; all chunks pinned");
                return;
            };
            if let Some(Slot::Ready(entry)) = slots.remove(&victim) {
                self.retire(victim, &entry);
            }
        }
    }

    /// Protects a chunk from eviction. Pins nest.
    pub fn pin(&self, coord: ChunkCoord) {
        *self.pins.lock().entry(coord).or_insert(0) += 1;
    }

    /// Releases one pin.
    pub fn unpin(&self, coord: ChunkCoord) {
        let mut pins = self.pins.lock();
        if let Some(count) = pins.get_mut(&coord) {
            *count -= 1;
            if *count == 0 {
                pins.remove(&coord);
            }
        }
    }

    /// Whether any pin is held on a chunk.
    #[must_use]
    pub fn is_pinned(&self, coord: ChunkCoord) -> bool {
        self.pins.lock().contains_key(&coord)
    }

    /// Flushes every in-memory edit and returns the full diff store, sorted
    /// by coordinate. Chunks without edits are omitted.
    #[must_use]
    pub fn diffs(&self) -> Vec<ChunkDiff> {
        let entries: Vec<(ChunkCoord, Arc<ChunkEntry>)> = self
            .slots
            .lock()
            .iter()
            .filter_map(|(coord, slot)| match slot {
                Slot::Ready(entry) => Some((*coord, Arc::clone(entry))),
                Slot::Generating(_) => None,
            })
            .collect();
        for (coord, entry) in entries {
            let mut log = entry.log.lock();
            if !log.evicted {
                self.flush(coord, &mut log);
            }
        }

        let mut out: Vec<ChunkDiff> = self
            .diffs
            .lock()
            .iter()
            .filter(|(_, edits)| !edits.is_empty())
            .map(|(coord, edits)| ChunkDiff {
                coord: *coord,
                edits: edits.clone(),
            })
            .collect();
        out.sort_by_key(|diff| diff.coord);
        out
    }

    /// Installs diff logs, e.g. from a save, ahead of generation.
    ///
    /// Edits are appended after any already stored for the same chunk.
    /// Chunks already in memory are not touched; load into a fresh store.
    pub fn install_diffs(&self, diffs: Vec<ChunkDiff>) {
        let mut store = self.diffs.lock();
        for diff in diffs {
            store.entry(diff.coord).or_default().extend(diff.edits);
        }
    }

    /// Takes queued generation warnings.
    pub fn drain_warnings(&self) -> Vec<GenerationWarning> {
        std::mem::take(&mut *self.warnings.lock())
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            generated: self.counters.generated.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
            replayed_edits: self.counters.replayed_edits.load(Ordering::Relaxed),
            dedup_waits: self.counters.dedup_waits.load(Ordering::Relaxed),
        }
    }

    /// A per-search view that remembers the chunks it has read.
    #[must_use]
    pub fn view(&self) -> TerrainView<'_> {
        TerrainView {
            store: self,
            chunks: RefCell::new(HashMap::new()),
        }
    }
}

impl NavTerrain for ChunkStore {
    fn nav_tile(&self, pos: TilePos) -> Option<NavTile> {
        self.get_tile(pos).ok().map(|tile| NavTile::from(&tile))
    }
}

/// Snapshot-caching terrain view for one search.
///
/// Holds every chunk it has touched for its lifetime, so a search sees a
/// consistent world and locks the store once per chunk instead of once per
/// tile. Chunks it needs are generated on demand.
pub struct TerrainView<'a> {
    store: &'a ChunkStore,
    chunks: RefCell<HashMap<ChunkCoord, Arc<Chunk>>>,
}

impl NavTerrain for TerrainView<'_> {
    fn nav_tile(&self, pos: TilePos) -> Option<NavTile> {
        if !pos.in_world() {
            return None;
        }
        let coord = pos.chunk();
        let cached = self.chunks.borrow().get(&coord).cloned();
        let chunk = match cached {
            Some(chunk) => chunk,
            None => {
                let chunk = self.store.get_or_generate(coord).ok()?;
                self.chunks.borrow_mut().insert(coord, Arc::clone(&chunk));
                chunk
            }
        };
        Some(NavTile::from(chunk.tile(pos.local())))
    }
}

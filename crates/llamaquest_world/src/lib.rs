//! # LlamaQuest World
//!
//! The authoritative tile world: a lazily generated, bounded chunk cache
//! with per-chunk edit logs, save files, background workers and the agent
//! table, all behind the `World` facade.
//!
//! ## Design Principles
//!
//! 1. **One owner**: a `World` is an explicit value; there is no global world
//! 2. **Never lose an edit**: eviction flushes edits, regeneration replays them
//! 3. **Readers never wait**: a ready chunk is an `Arc` snapshot
//! 4. **Refuse, don't guess**: saves from another generator version are rejected
//!
//! ## Example
//!
//! ```rust
//! use llamaquest_procedural::{Biome, ChunkCoord, TileMutation};
//! use llamaquest_world::{World, WorldConfig};
//!
//! let world = World::new(WorldConfig { worker_threads: 0, ..WorldConfig::with_seed(42) }).unwrap();
//! world.set_tile(3, 3, TileMutation::SetBiome(Biome::Water)).unwrap();
//! world.evict(ChunkCoord::new(0, 0)).unwrap();
//! assert_eq!(world.get_tile(3, 3).unwrap().biome, Biome::Water);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod persistence;
pub mod store;
pub mod workers;
pub mod world;

pub use config::WorldConfig;
pub use error::{ConfigError, WorldError, WorldResult};
pub use persistence::{SaveFile, SAVE_FORMAT_VERSION};
pub use store::{ChunkDiff, ChunkPoll, ChunkStore, StoreStats, TerrainView, TileEdit};
pub use workers::{Job, WorkerPool};
pub use world::{PathTicket, TileInfo, World};

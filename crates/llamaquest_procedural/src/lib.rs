//! # LlamaQuest Procedural Generation
//!
//! Deterministic terrain generation for an unbounded, lazily built world.
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: Same seed always produces the same world
//! 2. **Chunked**: World is generated in fixed-size 16x16 tile chunks
//! 3. **Seamless**: Noise is sampled in world coordinates, never chunk-local
//! 4. **Order independent**: A chunk depends on (seed, coordinate) only
//!
//! ## Core Components
//!
//! - `NoiseField`: multi-octave simplex elevation and moisture
//! - `BiomeClassifier`: threshold table with seeded edge blending
//! - `ChunkGenerator`: produces tile chunks from the fields
//! - `ResourcePlacer`: spaced, biome-aware resource nodes
//!
//! ## Example
//!
//! ```rust
//! use llamaquest_procedural::{ChunkCoord, ChunkGenerator, WorldSeed};
//!
//! let generator = ChunkGenerator::with_seed(WorldSeed::new(42));
//! let first = generator.generate(ChunkCoord::new(0, 0)).chunk;
//! let again = generator.generate(ChunkCoord::new(0, 0)).chunk;
//! assert_eq!(first.fingerprint(), again.fingerprint());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod biome;
pub mod chunk;
pub mod error;
pub mod noise;
pub mod resources;

pub use biome::{classify, Biome, BiomeClassifier, BiomeRule, BiomeTable, MIN_TILE_COST};
pub use chunk::{
    Chunk, ChunkCoord, ChunkGenerator, GeneratedChunk, GenerationWarning, GeneratorParams, LocalPos,
    Tile, TileMutation, TilePos, CHUNK_AREA, CHUNK_SIZE,
};
pub use error::InvalidParams;
pub use noise::{hash_unit, NoiseField, NoiseParams, NoisePurpose, SimplexNoise, WorldSeed, WORLD_COORD_LIMIT};
pub use resources::{PlacementRule, PlacementRules, ResourceKind, ResourceNode, ResourcePlacer};

/// Version of the generation algorithm.
///
/// Bumped whenever noise, classification or placement output changes for an
/// existing seed. Saves only store diffs against regenerated terrain, so a
/// save written under another version cannot be replayed faithfully.
pub const WORLDGEN_VERSION: u32 = 1;

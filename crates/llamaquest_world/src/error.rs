//! # World Error Types
//!
//! All errors that can occur at the world facade.
//!
//! A missing path is not an error (see `PathOutcome`), and neither is a
//! cancelled search or a chunk that fell back to plains.

use std::io;

use llamaquest_pathfinding::AgentId;
use llamaquest_procedural::{ChunkCoord, InvalidParams};
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Read(#[from] io::Error),

    /// The TOML did not parse into a `WorldConfig`.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A generator table is unusable.
    #[error(transparent)]
    Params(#[from] InvalidParams),

    /// A world-level setting is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Errors that can occur in world operations.
#[derive(Error, Debug)]
pub enum WorldError {
    /// Coordinate outside `[-WORLD_COORD_LIMIT, WORLD_COORD_LIMIT)`.
    #[error("coordinate ({x}, {y}) is outside the world")]
    OutOfRangeCoordinate {
        /// Requested x.
        x: i64,
        /// Requested y.
        y: i64,
    },

    /// A tile mutation would break a tile invariant.
    #[error("invalid mutation: {0}")]
    InvalidMutation(String),

    /// Eviction requested while the chunk is still being generated.
    #[error("chunk ({}, {}) is being generated", .0.x, .0.y)]
    ChunkGenerating(ChunkCoord),

    /// Eviction requested for a chunk an agent is walking through.
    #[error("chunk ({}, {}) is pinned by an active agent plan", .0.x, .0.y)]
    ChunkPinned(ChunkCoord),

    /// Save written by another generator or format version.
    #[error("incompatible save version {found}, expected {expected}")]
    IncompatibleSave {
        /// Version recorded in the file.
        found: u32,
        /// Version this build understands.
        expected: u32,
    },

    /// Save failed its integrity checks.
    #[error("corrupt save: {0}")]
    CorruptSave(String),

    /// A save was applied to a world with a different seed.
    #[error("save seed {found} does not match world seed {expected}")]
    SeedMismatch {
        /// Seed recorded in the save.
        found: u64,
        /// Seed of the world.
        expected: u64,
    },

    /// The worker queue is full; retry on a later tick.
    #[error("worker queue is full")]
    Busy,

    /// No agent with this id.
    #[error("unknown agent: {0}")]
    UnknownAgent(AgentId),

    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for world operations.
pub type WorldResult<T> = Result<T, WorldError>;

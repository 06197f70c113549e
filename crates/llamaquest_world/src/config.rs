//! # World Configuration
//!
//! Loaded once at startup from TOML. Every table is optional; missing
//! entries take their defaults.
//!
//! ```toml
//! seed = 42
//! cache_capacity = 256
//! worker_threads = 2
//!
//! [noise]
//! octaves = 5
//!
//! [[biomes.rules]]
//! biome = "water"
//! elevation_below = -0.25
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use llamaquest_procedural::{BiomeTable, GeneratorParams, NoiseParams, PlacementRules, WorldSeed};

use crate::error::ConfigError;

/// Everything needed to open a world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// World seed.
    pub seed: u64,
    /// Ready chunks kept in memory before LRU eviction.
    pub cache_capacity: usize,
    /// Background worker threads (0 runs background jobs inline).
    pub worker_threads: usize,
    /// Jobs that may wait for a worker before submissions are refused.
    pub worker_queue: usize,
    /// Expansion budget used when a caller does not pass one.
    pub default_budget: usize,
    /// Fractal noise parameters.
    pub noise: NoiseParams,
    /// Biome threshold table.
    pub biomes: BiomeTable,
    /// Resource placement table.
    pub resources: PlacementRules,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            cache_capacity: 256,
            worker_threads: 2,
            worker_queue: 64,
            default_budget: 4096,
            noise: NoiseParams::default(),
            biomes: BiomeTable::default(),
            resources: PlacementRules::default(),
        }
    }
}

impl WorldConfig {
    /// Default configuration with a given seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML and the validation
    /// error for out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// As `from_toml_str`, plus `ConfigError::Read` if the file cannot be read.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks every setting.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "cache_capacity",
                reason: "must hold at least one chunk".to_string(),
            });
        }
        if self.worker_threads > 0 && self.worker_queue == 0 {
            return Err(ConfigError::Invalid {
                field: "worker_queue",
                reason: "must be positive when workers are enabled".to_string(),
            });
        }
        self.noise.validate()?;
        self.biomes.validate()?;
        self.resources.validate()?;
        Ok(())
    }

    /// The seed as a `WorldSeed`.
    #[must_use]
    pub const fn world_seed(&self) -> WorldSeed {
        WorldSeed::new(self.seed)
    }

    /// Generator tables.
    #[must_use]
    pub fn generator_params(&self) -> GeneratorParams {
        GeneratorParams {
            noise: self.noise.clone(),
            biomes: self.biomes.clone(),
            resources: self.resources.clone(),
        }
    }
}

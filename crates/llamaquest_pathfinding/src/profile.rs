//! Agent movement profiles.

use serde::{Deserialize, Serialize};

use llamaquest_procedural::{Biome, InvalidParams};

use crate::terrain::NavTile;

/// How one kind of agent experiences terrain.
///
/// ```
/// use llamaquest_pathfinding::AgentProfile;
/// use llamaquest_procedural::Biome;
///
/// let llama = AgentProfile::default()
///     .blocking(Biome::Swamp)
///     .with_multiplier(Biome::Mountains, 0.5);
/// assert!(!llama.can_enter(Biome::Swamp));
/// assert_eq!(llama.min_multiplier(), 0.5);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    /// Biomes this agent will never enter.
    pub blocked: Vec<Biome>,
    /// Cost multiplier per biome, indexed by `Biome::index`.
    pub multipliers: [f32; Biome::COUNT],
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            blocked: Vec::new(),
            multipliers: [1.0; Biome::COUNT],
        }
    }
}

impl AgentProfile {
    /// Adds a biome the agent cannot enter.
    #[must_use]
    pub fn blocking(mut self, biome: Biome) -> Self {
        if !self.blocked.contains(&biome) {
            self.blocked.push(biome);
        }
        self
    }

    /// Sets the multiplier for a biome.
    #[must_use]
    pub fn with_multiplier(mut self, biome: Biome, multiplier: f32) -> Self {
        self.multipliers[biome.index()] = multiplier;
        self
    }

    /// Whether the agent may enter tiles of this biome.
    #[inline]
    #[must_use]
    pub fn can_enter(&self, biome: Biome) -> bool {
        !self.blocked.contains(&biome)
    }

    /// Cost of stepping onto `tile`, or `None` if this agent cannot.
    #[inline]
    #[must_use]
    pub fn step_cost(&self, tile: &NavTile) -> Option<f32> {
        if !tile.is_passable() || !self.can_enter(tile.biome) {
            return None;
        }
        Some(tile.cost * self.multipliers[tile.biome.index()])
    }

    /// Smallest multiplier over enterable biomes (1.0 if none are).
    #[must_use]
    pub fn min_multiplier(&self) -> f32 {
        Biome::ALL
            .into_iter()
            .filter(|b| self.can_enter(*b))
            .map(|b| self.multipliers[b.index()])
            .reduce(f32::min)
            .unwrap_or(1.0)
    }

    /// Rejects non-positive or non-finite multipliers.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParams` naming the first bad biome.
    pub fn validate(&self) -> Result<(), InvalidParams> {
        for biome in Biome::ALL {
            let m = self.multipliers[biome.index()];
            if !(m.is_finite() && m > 0.0) {
                return Err(InvalidParams::new(
                    "profile",
                    format!("{biome:?} multiplier must be positive and finite, got {m}"),
                ));
            }
        }
        Ok(())
    }
}

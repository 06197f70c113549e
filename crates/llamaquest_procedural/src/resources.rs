//! # Resource Placement
//!
//! Scatters resource nodes over a freshly generated chunk.
//!
//! Candidates are drawn from a ChaCha stream seeded by `(world seed, chunk
//! coordinate)` and rejected when they land on water or inside the minimum
//! spacing radius of an accepted node. The stream consumes the same number
//! of values per attempt whatever the outcome, so the result depends on
//! nothing but the seed, the coordinate and the chunk's own tiles.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::biome::Biome;
use crate::chunk::{Chunk, LocalPos, TilePos, CHUNK_SIZE};
use crate::error::InvalidParams;
use crate::noise::WorldSeed;

/// Things that can be harvested or visited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A tree; blocks movement.
    Tree,
    /// Berry bush; walkable.
    Berries,
    /// Boulder; blocks movement.
    Stone,
    /// Exposed ore vein; blocks movement.
    Ore,
    /// Cactus; blocks movement.
    Cactus,
    /// Reed bed; walkable.
    Reeds,
    /// Village hut; blocks movement.
    Hut,
    /// Village well; blocks movement.
    Well,
}

impl ResourceKind {
    /// Whether the node makes its tile impassable.
    #[must_use]
    pub const fn blocks_movement(self) -> bool {
        !matches!(self, Self::Berries | Self::Reeds)
    }
}

/// A placed resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceNode {
    /// What was placed.
    pub kind: ResourceKind,
    /// World tile it occupies.
    pub pos: TilePos,
}

/// Placement parameters for one biome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlacementRule {
    /// Candidate points drawn per chunk.
    pub attempts: u32,
    /// Minimum distance (tiles) between accepted nodes.
    pub min_spacing: f32,
    /// Kinds drawn uniformly; repeat an entry to weight it.
    pub kinds: Vec<ResourceKind>,
}

impl PlacementRule {
    fn new(attempts: u32, min_spacing: f32, kinds: &[ResourceKind]) -> Self {
        Self {
            attempts,
            min_spacing,
            kinds: kinds.to_vec(),
        }
    }
}

/// Per-biome placement table, keyed by the chunk's dominant biome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementRules {
    /// Forest chunks.
    pub forest: PlacementRule,
    /// Desert chunks.
    pub desert: PlacementRule,
    /// Mountain chunks.
    pub mountains: PlacementRule,
    /// Swamp chunks.
    pub swamp: PlacementRule,
    /// Village-eligible plains.
    pub village: PlacementRule,
    /// Mostly-water chunks (nodes still only land on dry tiles).
    pub water: PlacementRule,
}

impl Default for PlacementRules {
    fn default() -> Self {
        use ResourceKind::{Berries, Cactus, Hut, Ore, Reeds, Stone, Tree, Well};
        Self {
            forest: PlacementRule::new(24, 2.5, &[Tree, Tree, Tree, Berries]),
            desert: PlacementRule::new(6, 4.0, &[Cactus, Cactus, Stone]),
            mountains: PlacementRule::new(10, 3.0, &[Stone, Stone, Ore]),
            swamp: PlacementRule::new(10, 3.0, &[Reeds, Reeds, Tree]),
            village: PlacementRule::new(8, 4.5, &[Hut, Hut, Well, Berries]),
            water: PlacementRule::new(2, 5.0, &[Reeds]),
        }
    }
}

impl PlacementRules {
    /// Rule for a biome.
    #[must_use]
    pub const fn rule(&self, biome: Biome) -> &PlacementRule {
        match biome {
            Biome::Forest => &self.forest,
            Biome::Desert => &self.desert,
            Biome::Mountains => &self.mountains,
            Biome::Swamp => &self.swamp,
            Biome::Village => &self.village,
            Biome::Water => &self.water,
        }
    }

    /// Checks every rule.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParams` for a non-positive spacing, an attempt count
    /// above one per tile, or attempts with nothing to place.
    pub fn validate(&self) -> Result<(), InvalidParams> {
        for biome in Biome::ALL {
            let rule = self.rule(biome);
            if !(rule.min_spacing.is_finite() && rule.min_spacing > 0.0) {
                return Err(InvalidParams::new(
                    "resources",
                    format!("{biome:?} min_spacing must be positive, got {}", rule.min_spacing),
                ));
            }
            if rule.attempts as usize > CHUNK_SIZE * CHUNK_SIZE {
                return Err(InvalidParams::new(
                    "resources",
                    format!("{biome:?} attempts {} exceed tiles per chunk", rule.attempts),
                ));
            }
            if rule.attempts > 0 && rule.kinds.is_empty() {
                return Err(InvalidParams::new(
                    "resources",
                    format!("{biome:?} has attempts but no kinds"),
                ));
            }
        }
        Ok(())
    }
}

/// Seeded spacing-rejection sampler.
#[derive(Clone, Debug)]
pub struct ResourcePlacer {
    seed: WorldSeed,
    rules: PlacementRules,
}

impl ResourcePlacer {
    const PLACEMENT_SALT: u64 = 0x5245_534f;

    /// Creates a placer.
    #[must_use]
    pub const fn new(seed: WorldSeed, rules: PlacementRules) -> Self {
        Self { seed, rules }
    }

    /// The rules in use.
    #[must_use]
    pub const fn rules(&self) -> &PlacementRules {
        &self.rules
    }

    /// Chooses resource nodes for a chunk.
    ///
    /// Called once, at generation time, on the chunk's base terrain.
    #[must_use]
    pub fn place(&self, chunk: &Chunk) -> Vec<ResourceNode> {
        let rule = self.rules.rule(chunk.dominant_biome());
        if rule.attempts == 0 || rule.kinds.is_empty() {
            return Vec::new();
        }

        let coord = chunk.coord();
        let key = (u64::from(coord.x as u32) << 32) | u64::from(coord.y as u32);
        let mut rng = ChaCha8Rng::seed_from_u64(
            self.seed.derive(Self::PLACEMENT_SALT).derive(key).value(),
        );

        let spacing_sq = rule.min_spacing * rule.min_spacing;
        let mut accepted: Vec<(LocalPos, ResourceKind)> = Vec::new();

        for _ in 0..rule.attempts {
            let local = LocalPos::new(
                rng.gen_range(0..CHUNK_SIZE as u8),
                rng.gen_range(0..CHUNK_SIZE as u8),
            );
            let kind = rule.kinds[rng.gen_range(0..rule.kinds.len())];

            if chunk.tile(local).biome == Biome::Water {
                continue;
            }
            let too_close = accepted
                .iter()
                .any(|(other, _)| local.distance_sq(*other) < spacing_sq);
            if !too_close {
                accepted.push((local, kind));
            }
        }

        accepted
            .into_iter()
            .map(|(local, kind)| ResourceNode {
                kind,
                pos: coord.tile_at(local),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkCoord, ChunkGenerator, GeneratorParams};

    fn generator(seed: u64) -> ChunkGenerator {
        ChunkGenerator::new(WorldSeed::new(seed), GeneratorParams::default())
    }

    #[test]
    fn test_spacing_respected() {
        let gen = generator(42);
        for cx in -6..6 {
            for cy in -6..6 {
                let chunk = gen.generate(ChunkCoord::new(cx, cy)).chunk;
                let spacing = gen.placer().rules().rule(chunk.dominant_biome()).min_spacing;
                let nodes = chunk.resources();
                for (i, a) in nodes.iter().enumerate() {
                    for b in &nodes[i + 1..] {
                        let dx = (a.pos.x - b.pos.x) as f32;
                        let dy = (a.pos.y - b.pos.y) as f32;
                        assert!(
                            dx * dx + dy * dy >= spacing * spacing,
                            "{a:?} and {b:?} closer than {spacing}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_placement_independent_of_visit_order() {
        let coords: Vec<_> = (0..8).map(|i| ChunkCoord::new(i - 3, 2 * i)).collect();

        let gen_a = generator(7);
        let forward: Vec<_> = coords.iter().map(|c| gen_a.generate(*c).chunk.resources().to_vec()).collect();

        let gen_b = generator(7);
        let mut backward: Vec<_> = coords.iter().rev().map(|c| gen_b.generate(*c).chunk.resources().to_vec()).collect();
        backward.reverse();

        assert_eq!(forward, backward);
    }

    #[test]
    fn test_nodes_never_on_water_and_inside_chunk() {
        let gen = generator(1234);
        for cx in -4..4 {
            let coord = ChunkCoord::new(cx, 3);
            let chunk = gen.generate(coord).chunk;
            for node in chunk.resources() {
                assert_eq!(node.pos.chunk(), coord);
                assert_ne!(chunk.tile(node.pos.local()).biome, Biome::Water);
            }
        }
    }

    #[test]
    fn test_validate_rejects_zero_spacing() {
        let mut rules = PlacementRules::default();
        rules.desert.min_spacing = 0.0;
        assert!(rules.validate().is_err());
        assert!(PlacementRules::default().validate().is_ok());
    }
}

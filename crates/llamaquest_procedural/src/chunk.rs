//! # Chunk System
//!
//! The world is an unbounded grid of tiles, organized into fixed-size square
//! chunks for:
//! - Lazy generation (only touched chunks ever exist)
//! - Cache-friendly storage (one contiguous tile array per chunk)
//! - Independent regeneration (a chunk needs nothing but seed + coordinate)
//!
//! ## Coordinates
//!
//! `TilePos` is a world tile coordinate. `ChunkCoord` names a chunk.
//! `LocalPos` is a tile offset inside a chunk. Conversion uses euclidean
//! division, so negative coordinates map onto chunks the same way positive
//! ones do.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::biome::{Biome, BiomeClassifier, BiomeTable, MIN_TILE_COST};
use crate::error::InvalidParams;
use crate::noise::{NoiseField, NoiseParams, NoisePurpose, WorldSeed, WORLD_COORD_LIMIT};
use crate::resources::{PlacementRules, ResourceNode, ResourcePlacer};

/// Chunk width/height in tiles.
pub const CHUNK_SIZE: usize = 16;

/// Tiles per chunk.
pub const CHUNK_AREA: usize = CHUNK_SIZE * CHUNK_SIZE;

/// World tile coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TilePos {
    /// X coordinate (in tiles).
    pub x: i32,
    /// Y coordinate (in tiles).
    pub y: i32,
}

impl TilePos {
    /// Creates a new tile position.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Validates a wide coordinate pair against the world limit.
    ///
    /// Returns `None` for anything outside `[-WORLD_COORD_LIMIT, WORLD_COORD_LIMIT)`.
    #[must_use]
    pub fn checked(x: i64, y: i64) -> Option<Self> {
        let range = -WORLD_COORD_LIMIT..WORLD_COORD_LIMIT;
        if range.contains(&x) && range.contains(&y) {
            Some(Self::new(x as i32, y as i32))
        } else {
            None
        }
    }

    /// Whether this position is inside the generator's supported range.
    #[must_use]
    pub fn in_world(self) -> bool {
        Self::checked(i64::from(self.x), i64::from(self.y)).is_some()
    }

    /// Chunk containing this tile.
    #[inline]
    #[must_use]
    pub const fn chunk(self) -> ChunkCoord {
        ChunkCoord::new(
            self.x.div_euclid(CHUNK_SIZE as i32),
            self.y.div_euclid(CHUNK_SIZE as i32),
        )
    }

    /// Offset of this tile inside its chunk.
    #[inline]
    #[must_use]
    pub const fn local(self) -> LocalPos {
        LocalPos::new(
            self.x.rem_euclid(CHUNK_SIZE as i32) as u8,
            self.y.rem_euclid(CHUNK_SIZE as i32) as u8,
        )
    }

    /// Position shifted by `(dx, dy)`; `None` on `i32` overflow.
    #[inline]
    #[must_use]
    pub fn offset(self, dx: i32, dy: i32) -> Option<Self> {
        Some(Self::new(self.x.checked_add(dx)?, self.y.checked_add(dy)?))
    }
}

/// Tile offset inside a chunk, both components in `0..CHUNK_SIZE`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalPos {
    /// Local X (0-15).
    pub x: u8,
    /// Local Y (0-15).
    pub y: u8,
}

impl LocalPos {
    /// Creates a local position. Components are wrapped into range.
    #[inline]
    #[must_use]
    pub const fn new(x: u8, y: u8) -> Self {
        Self {
            x: x % CHUNK_SIZE as u8,
            y: y % CHUNK_SIZE as u8,
        }
    }

    /// Index into the chunk's row-major tile array.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.y as usize * CHUNK_SIZE + self.x as usize
    }

    /// Inverse of `index`.
    #[inline]
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        Self::new((index % CHUNK_SIZE) as u8, (index / CHUNK_SIZE) as u8)
    }

    /// Squared euclidean distance to another local position.
    #[inline]
    #[must_use]
    pub fn distance_sq(self, other: Self) -> f32 {
        let dx = f32::from(self.x) - f32::from(other.x);
        let dy = f32::from(self.y) - f32::from(other.y);
        dx * dx + dy * dy
    }
}

/// Chunk coordinate (identifies a chunk in the world grid).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    /// X coordinate (in chunks, not tiles).
    pub x: i32,
    /// Y coordinate (in chunks, not tiles).
    pub y: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// World tile at the chunk's origin (lowest x and y).
    #[inline]
    #[must_use]
    pub const fn origin(self) -> TilePos {
        TilePos::new(self.x * CHUNK_SIZE as i32, self.y * CHUNK_SIZE as i32)
    }

    /// World tile for a local offset.
    #[inline]
    #[must_use]
    pub const fn tile_at(self, local: LocalPos) -> TilePos {
        let origin = self.origin();
        TilePos::new(origin.x + local.x as i32, origin.y + local.y as i32)
    }

    /// Chebyshev distance in chunks.
    #[inline]
    #[must_use]
    pub const fn chebyshev(self, other: Self) -> i32 {
        let dx = (self.x - other.x).abs();
        let dy = (self.y - other.y).abs();
        if dx > dy { dx } else { dy }
    }
}

/// A single tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tile {
    /// Sampled elevation in [-1, 1].
    pub elevation: f32,
    /// Sampled moisture in [-1, 1].
    pub moisture: f32,
    /// Terrain category.
    pub biome: Biome,
    /// Movement cost; `f32::INFINITY` when impassable.
    pub cost: f32,
    /// A blocking resource or structure stands here.
    pub occupied: bool,
    /// Altered after generation.
    pub modified: bool,
}

impl Tile {
    /// Unmodified tile of the given biome.
    #[must_use]
    pub const fn base(elevation: f32, moisture: f32, biome: Biome) -> Self {
        Self {
            elevation,
            moisture,
            biome,
            cost: biome.base_cost(),
            occupied: false,
            modified: false,
        }
    }

    /// Cost seen by movement: infinite if occupied.
    #[inline]
    #[must_use]
    pub fn effective_cost(&self) -> f32 {
        if self.occupied {
            f32::INFINITY
        } else {
            self.cost
        }
    }

    /// Whether anything can walk onto this tile.
    #[inline]
    #[must_use]
    pub fn is_passable(&self) -> bool {
        self.effective_cost().is_finite()
    }

    /// Applies a gameplay mutation and flags the tile as modified.
    pub fn apply(&mut self, mutation: TileMutation) {
        match mutation {
            TileMutation::SetBiome(biome) => {
                self.biome = biome;
                self.cost = biome.base_cost();
            }
            TileMutation::SetCost(cost) => self.cost = cost,
            TileMutation::SetOccupied(occupied) => self.occupied = occupied,
        }
        self.modified = true;
    }
}

/// Post-generation change to one tile.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum TileMutation {
    /// Terraform to a biome; cost resets to the biome's base cost.
    SetBiome(Biome),
    /// Override movement cost (`f32::INFINITY` makes the tile impassable).
    SetCost(f32),
    /// Place or clear a blocking structure.
    SetOccupied(bool),
}

impl TileMutation {
    /// Rejects mutations that would break the cost invariant.
    ///
    /// # Errors
    ///
    /// `SetCost` must be `f32::INFINITY` or a finite value of at least
    /// `MIN_TILE_COST`.
    pub fn validate(self) -> Result<Self, InvalidParams> {
        if let Self::SetCost(cost) = self {
            let ok = cost == f32::INFINITY || (cost.is_finite() && cost >= MIN_TILE_COST);
            if !ok {
                return Err(InvalidParams::new(
                    "mutation",
                    format!("tile cost {cost} is below the minimum {MIN_TILE_COST}"),
                ));
            }
        }
        Ok(self)
    }
}

/// A ready chunk of world data.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    coord: ChunkCoord,
    /// Row-major tile array, `CHUNK_AREA` long.
    tiles: Box<[Tile]>,
    resources: Vec<ResourceNode>,
    fallback: bool,
}

impl Chunk {
    /// Chunk position in the world.
    #[inline]
    #[must_use]
    pub const fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Tile at a local offset.
    #[inline]
    #[must_use]
    pub fn tile(&self, local: LocalPos) -> &Tile {
        &self.tiles[local.index()]
    }

    /// All tiles in row-major order.
    #[inline]
    #[must_use]
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Resource nodes in placement order.
    #[inline]
    #[must_use]
    pub fn resources(&self) -> &[ResourceNode] {
        &self.resources
    }

    /// True when the classifier failed and the chunk holds plains fallback tiles.
    #[inline]
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        self.fallback
    }

    /// Applies a mutation to one tile.
    pub fn apply(&mut self, local: LocalPos, mutation: TileMutation) {
        self.tiles[local.index()].apply(mutation);
    }

    /// Number of tiles altered after generation.
    #[must_use]
    pub fn modified_count(&self) -> usize {
        self.tiles.iter().filter(|t| t.modified).count()
    }

    /// Most common biome; ties go to the lower discriminant.
    #[must_use]
    pub fn dominant_biome(&self) -> Biome {
        let mut counts = [0usize; Biome::COUNT];
        for tile in self.tiles.iter() {
            counts[tile.biome.index()] += 1;
        }
        let mut best = Biome::ALL[0];
        for biome in Biome::ALL {
            if counts[biome.index()] > counts[best.index()] {
                best = biome;
            }
        }
        best
    }

    /// Bit-exact FNV-1a digest of every tile field.
    ///
    /// Two chunks have equal fingerprints only if their tile arrays are
    /// bit-identical (float fields are hashed via `to_bits`).
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        let mut feed = |word: u32| {
            for byte in word.to_le_bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(PRIME);
            }
        };
        for tile in self.tiles.iter() {
            feed(tile.elevation.to_bits());
            feed(tile.moisture.to_bits());
            feed(u32::from(tile.biome as u8));
            feed(tile.cost.to_bits());
            feed(u32::from(tile.occupied) | (u32::from(tile.modified) << 1));
        }
        hash
    }
}

/// Raised when classification failed for a chunk.
///
/// The chunk is still complete: every tile was replaced by plains.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationWarning {
    /// Affected chunk.
    pub coord: ChunkCoord,
    /// Tiles the classifier could not place.
    pub unclassified: usize,
}

/// Output of one generation pass.
#[derive(Clone, Debug)]
pub struct GeneratedChunk {
    /// The finished chunk.
    pub chunk: Chunk,
    /// Present when the chunk fell back to plains.
    pub warning: Option<GenerationWarning>,
}

/// All tunables of the generator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorParams {
    /// Fractal noise parameters.
    pub noise: NoiseParams,
    /// Threshold table.
    pub biomes: BiomeTable,
    /// Resource placement table.
    pub resources: PlacementRules,
}

impl GeneratorParams {
    /// Validates every table.
    ///
    /// # Errors
    ///
    /// Returns the first `InvalidParams` found.
    pub fn validate(&self) -> Result<(), InvalidParams> {
        self.noise.validate()?;
        self.biomes.validate()?;
        self.resources.validate()
    }
}

/// Chunk generator using procedural noise.
#[derive(Clone)]
pub struct ChunkGenerator {
    field: NoiseField,
    classifier: BiomeClassifier,
    placer: ResourcePlacer,
}

impl ChunkGenerator {
    /// Creates a new chunk generator.
    #[must_use]
    pub fn new(seed: WorldSeed, params: GeneratorParams) -> Self {
        Self {
            field: NoiseField::new(seed, params.noise),
            classifier: BiomeClassifier::new(seed, params.biomes),
            placer: ResourcePlacer::new(seed, params.resources),
        }
    }

    /// Generator with default tables.
    #[must_use]
    pub fn with_seed(seed: WorldSeed) -> Self {
        Self::new(seed, GeneratorParams::default())
    }

    /// The world seed.
    #[must_use]
    pub const fn seed(&self) -> WorldSeed {
        self.field.seed()
    }

    /// The noise field.
    #[must_use]
    pub const fn field(&self) -> &NoiseField {
        &self.field
    }

    /// The biome classifier.
    #[must_use]
    pub const fn classifier(&self) -> &BiomeClassifier {
        &self.classifier
    }

    /// The resource placer.
    #[must_use]
    pub const fn placer(&self) -> &ResourcePlacer {
        &self.placer
    }

    /// Samples the base (pre-placement) tile at a world position.
    ///
    /// Returns `None` for the biome when the table has no matching rule.
    #[must_use]
    pub fn sample_tile(&self, pos: TilePos) -> (f32, f32, Option<Biome>) {
        let elevation = self.field.sample(NoisePurpose::Elevation, pos.x, pos.y);
        let moisture = self.field.sample(NoisePurpose::Moisture, pos.x, pos.y);
        let biome = self.classifier.classify_blended(pos.x, pos.y, elevation, moisture);
        (elevation as f32, moisture as f32, biome)
    }

    /// Generates a chunk at the given coordinates.
    ///
    /// Pass 1 samples terrain per tile in world space, pass 2 places
    /// resources on the result. A classifier miss on any tile turns the whole
    /// chunk into plains before placement runs.
    #[must_use]
    pub fn generate(&self, coord: ChunkCoord) -> GeneratedChunk {
        let mut tiles = Vec::with_capacity(CHUNK_AREA);
        let mut unclassified = 0usize;

        for index in 0..CHUNK_AREA {
            let pos = coord.tile_at(LocalPos::from_index(index));
            let (elevation, moisture, biome) = self.sample_tile(pos);
            let biome = biome.unwrap_or_else(|| {
                unclassified += 1;
                Biome::Village
            });
            tiles.push(Tile::base(elevation, moisture, biome));
        }

        let warning = if unclassified > 0 {
            warn!(
                chunk_x = coord.x,
                chunk_y = coord.y,
                unclassified,
                "biome table left tiles unclassified; chunk falls back to plains"
            );
            for tile in &mut tiles {
                *tile = Tile::base(tile.elevation, tile.moisture, Biome::Village);
            }
            Some(GenerationWarning { coord, unclassified })
        } else {
            None
        };

        let mut chunk = Chunk {
            coord,
            tiles: tiles.into_boxed_slice(),
            resources: Vec::new(),
            fallback: warning.is_some(),
        };

        let resources = self.placer.place(&chunk);
        for node in &resources {
            if node.kind.blocks_movement() {
                chunk.tiles[node.pos.local().index()].occupied = true;
            }
        }
        chunk.resources = resources;

        GeneratedChunk { chunk, warning }
    }
}

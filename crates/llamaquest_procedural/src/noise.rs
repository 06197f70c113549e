//! # Seeded Noise Field
//!
//! Deterministic, continuous scalar fields over integer world coordinates.
//!
//! ## Determinism Guarantee
//!
//! Given the same `WorldSeed`, purpose and `NoiseParams`, every sample is
//! **exactly** the same on any platform, any time. There is no hidden state:
//! a sample is a pure function of `(seed, purpose, x, y)`.
//!
//! ## Seamless Chunks
//!
//! Fields are always sampled in *world* coordinates. A chunk never feeds its
//! local offsets into the noise, so the tile on either side of a chunk border
//! reads the same continuous surface.

use serde::{Deserialize, Serialize};

use crate::error::InvalidParams;

/// Largest absolute world coordinate (in tiles) the generator accepts.
///
/// Keeps the simplex lattice index inside `i32` even at the highest octave.
pub const WORLD_COORD_LIMIT: i64 = 1 << 28;

/// World seed for deterministic generation.
///
/// All procedural generation derives from this seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldSeed(u64);

impl WorldSeed {
    /// Creates a new world seed.
    #[inline]
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Returns the raw seed value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Derives a sub-seed for a specific purpose (e.g., moisture, octave 3).
    ///
    /// Uses a hash function to create independent streams from one seed.
    #[inline]
    #[must_use]
    pub const fn derive(self, purpose: u64) -> Self {
        let mut hash = self.0;
        hash ^= purpose;
        hash = hash.wrapping_mul(0x517c_c1b7_2722_0a95);
        hash ^= hash >> 32;
        Self(hash)
    }
}

impl Default for WorldSeed {
    fn default() -> Self {
        Self(0xDEAD_BEEF_CAFE_BABE)
    }
}

/// Which field a sample belongs to.
///
/// The purpose salt is mixed into every octave's seed, so elevation and
/// moisture are independent even though they share the world seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NoisePurpose {
    /// Terrain height.
    Elevation,
    /// Ground wetness.
    Moisture,
}

impl NoisePurpose {
    /// Salt mixed into the seed for this purpose.
    #[inline]
    #[must_use]
    pub const fn salt(self) -> u64 {
        match self {
            Self::Elevation => 0x454c_4556,
            Self::Moisture => 0x4d4f_4953,
        }
    }
}

/// Fractal noise parameters.
///
/// Tunable; the defaults give continents a few hundred tiles across.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseParams {
    /// Number of octaves summed (typically 4-6).
    pub octaves: u32,
    /// Amplitude decay per octave.
    pub persistence: f64,
    /// Frequency growth per octave.
    pub lacunarity: f64,
    /// Base frequency of the elevation field (cycles per tile).
    pub elevation_scale: f64,
    /// Base frequency of the moisture field (cycles per tile).
    pub moisture_scale: f64,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            octaves: 5,
            persistence: 0.5,
            lacunarity: 2.0,
            elevation_scale: 0.012,
            moisture_scale: 0.02,
        }
    }
}

impl NoiseParams {
    /// Base frequency for a purpose.
    #[inline]
    #[must_use]
    pub fn scale(&self, purpose: NoisePurpose) -> f64 {
        match purpose {
            NoisePurpose::Elevation => self.elevation_scale,
            NoisePurpose::Moisture => self.moisture_scale,
        }
    }

    /// Checks the parameters produce a bounded, non-degenerate field.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParams` if octaves is outside 1..=12, persistence is
    /// outside (0, 1], lacunarity is below 1 or a scale is not positive.
    pub fn validate(&self) -> Result<(), InvalidParams> {
        if !(1..=12).contains(&self.octaves) {
            return Err(InvalidParams::new("noise", format!("octaves {} outside 1..=12", self.octaves)));
        }
        if !(self.persistence > 0.0 && self.persistence <= 1.0) {
            return Err(InvalidParams::new("noise", format!("persistence {} outside (0, 1]", self.persistence)));
        }
        if !(self.lacunarity.is_finite() && self.lacunarity >= 1.0) {
            return Err(InvalidParams::new("noise", format!("lacunarity {} below 1", self.lacunarity)));
        }
        for (name, scale) in [("elevation_scale", self.elevation_scale), ("moisture_scale", self.moisture_scale)] {
            if !(scale.is_finite() && scale > 0.0 && scale < 1.0) {
                return Err(InvalidParams::new("noise", format!("{name} {scale} outside (0, 1)")));
            }
        }
        Ok(())
    }
}

/// Pre-computed permutation table for noise.
///
/// This is computed once from the seed and reused.
#[derive(Clone)]
struct PermutationTable {
    /// 512-entry permutation table (256 entries, doubled for overflow handling).
    perm: [u8; 512],
}

impl PermutationTable {
    /// 12 gradient vectors for 2D simplex.
    const GRADIENTS: [[i8; 2]; 12] = [
        [1, 0], [1, 1], [0, 1], [-1, 1],
        [-1, 0], [-1, -1], [0, -1], [1, -1],
        [1, 0], [0, 1], [-1, 0], [0, -1],
    ];

    /// Creates a new permutation table from a seed.
    fn new(seed: WorldSeed) -> Self {
        let mut perm = [0u8; 512];
        for (i, slot) in perm.iter_mut().take(256).enumerate() {
            *slot = i as u8;
        }

        // Fisher-Yates shuffle driven by xorshift64 (zero is a fixed point)
        let mut rng_state = match seed.value() {
            0 => 0x9E37_79B9_7F4A_7C15,
            value => value,
        };
        for i in (1..256).rev() {
            rng_state ^= rng_state << 13;
            rng_state ^= rng_state >> 7;
            rng_state ^= rng_state << 17;

            let j = (rng_state as usize) % (i + 1);
            perm.swap(i, j);
        }

        perm.copy_within(0..256, 256);
        Self { perm }
    }

    #[inline]
    fn get(&self, index: usize) -> u8 {
        self.perm[index & 511]
    }

    #[inline]
    fn gradient(hash: u8) -> [i8; 2] {
        Self::GRADIENTS[(hash % 12) as usize]
    }
}

/// 2D Simplex noise generator.
///
/// Produces smooth, continuous noise values in the range [-1, 1].
#[derive(Clone)]
pub struct SimplexNoise {
    perm_table: PermutationTable,
}

impl SimplexNoise {
    /// Skewing factor for 2D simplex grid: (sqrt(3) - 1) / 2.
    const F2: f64 = 0.366_025_403_784_439;
    /// Unskewing factor for 2D simplex grid: (3 - sqrt(3)) / 6.
    const G2: f64 = 0.211_324_865_405_187;

    /// Creates a new simplex noise generator from a seed.
    #[must_use]
    pub fn new(seed: WorldSeed) -> Self {
        Self {
            perm_table: PermutationTable::new(seed),
        }
    }

    /// Samples 2D simplex noise at the given coordinates.
    ///
    /// Returns a value clamped to [-1, 1].
    #[must_use]
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let skew = (x + y) * Self::F2;
        let i = fast_floor(x + skew);
        let j = fast_floor(y + skew);

        let unskew = f64::from(i.wrapping_add(j)) * Self::G2;
        let x0 = x - (f64::from(i) - unskew);
        let y0 = y - (f64::from(j) - unskew);

        // Upper or lower triangle of the skewed cell
        let (i1, j1) = if x0 > y0 { (1, 0) } else { (0, 1) };

        let x1 = x0 - i1 as f64 + Self::G2;
        let y1 = y0 - j1 as f64 + Self::G2;
        let x2 = x0 - 1.0 + 2.0 * Self::G2;
        let y2 = y0 - 1.0 + 2.0 * Self::G2;

        let ii = (i & 255) as usize;
        let jj = (j & 255) as usize;

        let table = &self.perm_table;
        let gi0 = table.get(ii + table.get(jj) as usize);
        let gi1 = table.get(ii + i1 + table.get(jj + j1) as usize);
        let gi2 = table.get(ii + 1 + table.get(jj + 1) as usize);

        let n0 = Self::contribution(x0, y0, gi0);
        let n1 = Self::contribution(x1, y1, gi1);
        let n2 = Self::contribution(x2, y2, gi2);

        // 70.0 normalizes the sum to roughly [-1, 1]
        (70.0 * (n0 + n1 + n2)).clamp(-1.0, 1.0)
    }

    #[inline]
    fn contribution(x: f64, y: f64, gradient_index: u8) -> f64 {
        let t = 0.5 - x * x - y * y;
        if t < 0.0 {
            0.0
        } else {
            let grad = PermutationTable::gradient(gradient_index);
            let t2 = t * t;
            t2 * t2 * (x * f64::from(grad[0]) + y * f64::from(grad[1]))
        }
    }
}

/// Fast floor function.
#[inline]
fn fast_floor(x: f64) -> i32 {
    let xi = x as i32;
    if x < f64::from(xi) { xi - 1 } else { xi }
}

/// Multi-octave noise over integer world coordinates.
///
/// Each `(purpose, octave)` pair gets its own permutation table derived from
/// the world seed, so the whole field is a pure function of its inputs.
///
/// # Example
///
/// ```rust
/// use llamaquest_procedural::noise::{NoiseField, NoiseParams, NoisePurpose, WorldSeed};
///
/// let field = NoiseField::new(WorldSeed::new(42), NoiseParams::default());
/// let value = field.sample(NoisePurpose::Elevation, 100, -37);
/// assert!((-1.0..=1.0).contains(&value));
/// ```
#[derive(Clone)]
pub struct NoiseField {
    seed: WorldSeed,
    params: NoiseParams,
    elevation: Vec<SimplexNoise>,
    moisture: Vec<SimplexNoise>,
}

impl NoiseField {
    /// Builds the per-octave generators for both purposes.
    #[must_use]
    pub fn new(seed: WorldSeed, params: NoiseParams) -> Self {
        let build = |purpose: NoisePurpose| {
            (0..params.octaves)
                .map(|octave| {
                    SimplexNoise::new(seed.derive(purpose.salt()).derive(u64::from(octave) + 1))
                })
                .collect::<Vec<_>>()
        };
        Self {
            seed,
            elevation: build(NoisePurpose::Elevation),
            moisture: build(NoisePurpose::Moisture),
            params,
        }
    }

    /// The seed this field was built from.
    #[inline]
    #[must_use]
    pub const fn seed(&self) -> WorldSeed {
        self.seed
    }

    /// The parameters this field was built with.
    #[inline]
    #[must_use]
    pub const fn params(&self) -> &NoiseParams {
        &self.params
    }

    /// Samples a field at a world tile coordinate.
    ///
    /// # Returns
    ///
    /// A value in [-1, 1].
    #[must_use]
    pub fn sample(&self, purpose: NoisePurpose, x: i32, y: i32) -> f64 {
        let octaves = match purpose {
            NoisePurpose::Elevation => &self.elevation,
            NoisePurpose::Moisture => &self.moisture,
        };
        let base = self.params.scale(purpose);

        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = base;
        let mut max_amplitude = 0.0;

        for noise in octaves {
            total += noise.sample(f64::from(x) * frequency, f64::from(y) * frequency) * amplitude;
            max_amplitude += amplitude;
            amplitude *= self.params.persistence;
            frequency *= self.params.lacunarity;
        }

        if max_amplitude > 0.0 {
            (total / max_amplitude).clamp(-1.0, 1.0)
        } else {
            0.0
        }
    }
}

/// One-shot sample with default parameters.
///
/// Builds the permutation tables on every call; hot paths should keep a
/// `NoiseField` around instead.
#[must_use]
pub fn sample(seed: WorldSeed, purpose: NoisePurpose, x: i32, y: i32) -> f64 {
    NoiseField::new(seed, NoiseParams::default()).sample(purpose, x, y)
}

/// Uniform value in [0, 1) hashed from `(seed, salt, x, y)`.
///
/// Used wherever per-tile randomness must not depend on visit order.
#[must_use]
pub fn hash_unit(seed: WorldSeed, salt: u64, x: i32, y: i32) -> f64 {
    let mut h = seed.derive(salt).value();
    h ^= u64::from(x as u32).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    h = splitmix(h);
    h ^= u64::from(y as u32).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    h = splitmix(h);
    // Top 53 bits -> [0, 1)
    (h >> 11) as f64 / (1u64 << 53) as f64
}

#[inline]
fn splitmix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

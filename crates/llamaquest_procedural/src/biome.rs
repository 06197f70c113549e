//! # Biome Classification
//!
//! Maps sampled field values to a terrain category.
//!
//! Classification is an ordered threshold table: the first rule whose
//! conditions hold wins. The table is configuration, not code, so tuning the
//! look of the world never touches the generator.
//!
//! ## Edge Blending
//!
//! Near a threshold, the field values are nudged by a small seeded jitter
//! before lookup. Tiles close to a border may land on either side of it,
//! which breaks up hard straight edges. The jitter is hashed from
//! `(seed, x, y)` only, so generation order never matters.

use serde::{Deserialize, Serialize};

use crate::error::InvalidParams;
use crate::noise::{hash_unit, WorldSeed};

/// Smallest movement cost any passable tile may carry.
///
/// Pathfinding scales its heuristic by this value, so nothing cheaper may
/// ever enter the grid.
pub const MIN_TILE_COST: f32 = 1.0;

/// Biome types in the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Biome {
    /// Woodland.
    Forest = 0,
    /// Arid sand.
    Desert = 1,
    /// High, rough ground.
    Mountains = 2,
    /// Wet lowland.
    Swamp = 3,
    /// Open plains where settlements may appear.
    Village = 4,
    /// Open water, impassable on foot.
    Water = 5,
}

impl Biome {
    /// Number of biome variants.
    pub const COUNT: usize = 6;

    /// Every biome in discriminant order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Forest,
        Self::Desert,
        Self::Mountains,
        Self::Swamp,
        Self::Village,
        Self::Water,
    ];

    /// Movement cost of an untouched tile of this biome.
    ///
    /// Water is impassable and reports `f32::INFINITY`.
    #[must_use]
    pub const fn base_cost(self) -> f32 {
        match self {
            Self::Village => MIN_TILE_COST,
            Self::Desert => 1.5,
            Self::Forest => 2.0,
            Self::Swamp => 3.0,
            Self::Mountains => 5.0,
            Self::Water => f32::INFINITY,
        }
    }

    /// Index into per-biome tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Converts from u8.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Forest),
            1 => Some(Self::Desert),
            2 => Some(Self::Mountains),
            3 => Some(Self::Swamp),
            4 => Some(Self::Village),
            5 => Some(Self::Water),
            _ => None,
        }
    }

    /// Whether this biome stops line of sight.
    #[must_use]
    pub const fn blocks_sight(self) -> bool {
        matches!(self, Self::Mountains)
    }
}

/// One row of the threshold table.
///
/// Every present bound must hold (strictly) for the rule to match. A rule
/// with no bounds is a catch-all.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BiomeRule {
    /// Biome produced when the rule matches.
    pub biome: Biome,
    /// Elevation must be greater than this.
    #[serde(default)]
    pub elevation_above: Option<f64>,
    /// Elevation must be less than this.
    #[serde(default)]
    pub elevation_below: Option<f64>,
    /// Moisture must be greater than this.
    #[serde(default)]
    pub moisture_above: Option<f64>,
    /// Moisture must be less than this.
    #[serde(default)]
    pub moisture_below: Option<f64>,
}

impl BiomeRule {
    const fn catch_all(biome: Biome) -> Self {
        Self {
            biome,
            elevation_above: None,
            elevation_below: None,
            moisture_above: None,
            moisture_below: None,
        }
    }

    /// Returns true if both values satisfy every bound of this rule.
    ///
    /// NaN never satisfies a bound, and never satisfies a catch-all either.
    #[must_use]
    pub fn matches(&self, elevation: f64, moisture: f64) -> bool {
        if elevation.is_nan() || moisture.is_nan() {
            return false;
        }
        self.elevation_above.map_or(true, |t| elevation > t)
            && self.elevation_below.map_or(true, |t| elevation < t)
            && self.moisture_above.map_or(true, |t| moisture > t)
            && self.moisture_below.map_or(true, |t| moisture < t)
    }
}

/// Default threshold table.
///
/// water < sea level, mountains above the tree line, then wet-to-dry
/// lowland biomes, and village-eligible plains as the fallback.
pub const DEFAULT_RULES: [BiomeRule; 6] = [
    BiomeRule {
        elevation_below: Some(-0.25),
        ..BiomeRule::catch_all(Biome::Water)
    },
    BiomeRule {
        elevation_above: Some(0.55),
        ..BiomeRule::catch_all(Biome::Mountains)
    },
    BiomeRule {
        moisture_above: Some(0.45),
        elevation_below: Some(0.05),
        ..BiomeRule::catch_all(Biome::Swamp)
    },
    BiomeRule {
        moisture_above: Some(0.1),
        ..BiomeRule::catch_all(Biome::Forest)
    },
    BiomeRule {
        moisture_below: Some(-0.3),
        ..BiomeRule::catch_all(Biome::Desert)
    },
    BiomeRule::catch_all(Biome::Village),
];

fn first_match(rules: &[BiomeRule], elevation: f64, moisture: f64) -> Option<Biome> {
    rules
        .iter()
        .find(|rule| rule.matches(elevation, moisture))
        .map(|rule| rule.biome)
}

/// Classifies with the default table.
///
/// Falls back to `Biome::Village` if nothing matches (only possible for NaN).
#[must_use]
pub fn classify(elevation: f64, moisture: f64) -> Biome {
    first_match(&DEFAULT_RULES, elevation, moisture).unwrap_or(Biome::Village)
}

/// Ordered threshold table plus the blending margin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiomeTable {
    /// Rules, evaluated top to bottom.
    pub rules: Vec<BiomeRule>,
    /// Maximum jitter applied to field values before lookup.
    pub blend_margin: f64,
}

impl Default for BiomeTable {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES.to_vec(),
            blend_margin: 0.03,
        }
    }
}

impl BiomeTable {
    /// Looks up the first matching rule.
    ///
    /// Returns `None` when no rule matches. A table without a catch-all row
    /// can do that for ordinary inputs.
    #[must_use]
    pub fn classify(&self, elevation: f64, moisture: f64) -> Option<Biome> {
        first_match(&self.rules, elevation, moisture)
    }

    /// Checks that the table can classify anything at all.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParams` for an empty table, non-finite thresholds or a
    /// blend margin outside `[0, 0.5)`.
    pub fn validate(&self) -> Result<(), InvalidParams> {
        if self.rules.is_empty() {
            return Err(InvalidParams::new("biomes", "rule table is empty"));
        }
        if !(0.0..0.5).contains(&self.blend_margin) {
            return Err(InvalidParams::new(
                "biomes",
                format!("blend_margin {} outside [0, 0.5)", self.blend_margin),
            ));
        }
        for (row, rule) in self.rules.iter().enumerate() {
            let bounds = [
                rule.elevation_above,
                rule.elevation_below,
                rule.moisture_above,
                rule.moisture_below,
            ];
            if bounds.iter().flatten().any(|t| !t.is_finite()) {
                return Err(InvalidParams::new(
                    "biomes",
                    format!("rule {row} ({:?}) has a non-finite threshold", rule.biome),
                ));
            }
        }
        Ok(())
    }
}

/// Biome classifier bound to a world seed.
///
/// # Example
///
/// ```rust
/// use llamaquest_procedural::{Biome, BiomeClassifier, BiomeTable, WorldSeed};
///
/// let classifier = BiomeClassifier::new(WorldSeed::new(42), BiomeTable::default());
/// assert_eq!(classifier.classify(-0.9, 0.0), Some(Biome::Water));
/// ```
#[derive(Clone, Debug)]
pub struct BiomeClassifier {
    seed: WorldSeed,
    table: BiomeTable,
}

impl BiomeClassifier {
    /// Salt for the elevation jitter.
    const ELEVATION_BLEND_SALT: u64 = 0xB1E0_0001;
    /// Salt for the moisture jitter.
    const MOISTURE_BLEND_SALT: u64 = 0xB1E0_0002;

    /// Creates a classifier.
    #[must_use]
    pub const fn new(seed: WorldSeed, table: BiomeTable) -> Self {
        Self { seed, table }
    }

    /// The table in use.
    #[must_use]
    pub const fn table(&self) -> &BiomeTable {
        &self.table
    }

    /// Pure table lookup, no blending.
    #[must_use]
    pub fn classify(&self, elevation: f64, moisture: f64) -> Option<Biome> {
        self.table.classify(elevation, moisture)
    }

    /// Lookup with seeded edge blending at world tile `(x, y)`.
    ///
    /// Values further than `blend_margin` from every threshold classify
    /// exactly as `classify` would.
    #[must_use]
    pub fn classify_blended(&self, x: i32, y: i32, elevation: f64, moisture: f64) -> Option<Biome> {
        let margin = self.table.blend_margin;
        if margin <= 0.0 {
            return self.classify(elevation, moisture);
        }
        let je = hash_unit(self.seed, Self::ELEVATION_BLEND_SALT, x, y).mul_add(2.0, -1.0);
        let jm = hash_unit(self.seed, Self::MOISTURE_BLEND_SALT, x, y).mul_add(2.0, -1.0);
        self.classify(je.mul_add(margin, elevation), jm.mul_add(margin, moisture))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_thresholds() {
        assert_eq!(classify(-0.6, 0.0), Biome::Water);
        assert_eq!(classify(0.8, 0.9), Biome::Mountains);
        assert_eq!(classify(0.0, 0.6), Biome::Swamp);
        assert_eq!(classify(0.3, 0.6), Biome::Forest);
        assert_eq!(classify(0.0, 0.2), Biome::Forest);
        assert_eq!(classify(0.0, -0.5), Biome::Desert);
        assert_eq!(classify(0.0, 0.0), Biome::Village);
    }

    #[test]
    fn test_classifier_matches_free_function_without_blending() {
        let classifier = BiomeClassifier::new(WorldSeed::new(1), BiomeTable::default());
        for e in -10..=10 {
            for m in -10..=10 {
                let (e, m) = (f64::from(e) / 10.0, f64::from(m) / 10.0);
                assert_eq!(classifier.classify(e, m), Some(classify(e, m)));
            }
        }
    }

    #[test]
    fn test_blending_only_near_thresholds() {
        let classifier = BiomeClassifier::new(WorldSeed::new(9), BiomeTable::default());
        // Far from every threshold: blending never changes the answer
        for x in 0..200 {
            assert_eq!(classifier.classify_blended(x, -x, -0.9, 0.0), Some(Biome::Water));
            assert_eq!(classifier.classify_blended(x, -x, 0.0, -0.05), Some(Biome::Village));
        }
    }

    #[test]
    fn test_blending_mixes_at_boundary() {
        let classifier = BiomeClassifier::new(WorldSeed::new(9), BiomeTable::default());
        let mut water = 0;
        let mut land = 0;
        for x in 0..400 {
            match classifier.classify_blended(x, 3, -0.25, 0.0) {
                Some(Biome::Water) => water += 1,
                Some(_) => land += 1,
                None => unreachable!("default table always matches"),
            }
        }
        assert!(water > 50 && land > 50, "water={water} land={land}");
    }

    #[test]
    fn test_blending_is_order_independent() {
        let classifier = BiomeClassifier::new(WorldSeed::new(77), BiomeTable::default());
        let forward: Vec<_> = (0..64).map(|x| classifier.classify_blended(x, 5, 0.1, 0.1)).collect();
        let mut backward: Vec<_> = (0..64).rev().map(|x| classifier.classify_blended(x, 5, 0.1, 0.1)).collect();
        backward.reverse();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_table_without_catch_all_can_miss() {
        let table = BiomeTable {
            rules: vec![DEFAULT_RULES[0]],
            blend_margin: 0.0,
        };
        assert!(table.validate().is_ok());
        assert_eq!(table.classify(0.5, 0.0), None);
        assert_eq!(table.classify(-0.5, 0.0), Some(Biome::Water));
    }

    #[test]
    fn test_validate_rejects_bad_tables() {
        let empty = BiomeTable {
            rules: Vec::new(),
            blend_margin: 0.0,
        };
        assert!(empty.validate().is_err());

        let wide = BiomeTable {
            blend_margin: 0.7,
            ..BiomeTable::default()
        };
        assert!(wide.validate().is_err());
    }

    #[test]
    fn test_costs() {
        assert!(Biome::Water.base_cost().is_infinite());
        for biome in Biome::ALL {
            assert!(biome.base_cost() >= MIN_TILE_COST);
            assert_eq!(Biome::from_u8(biome as u8), Some(biome));
        }
        assert_eq!(Biome::from_u8(42), None);
    }
}

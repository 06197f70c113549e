//! # Terrain Capability
//!
//! The search reads terrain through `NavTerrain` and nothing else. A
//! provider backed by a lazily generated world is free to generate chunks
//! inside `nav_tile`; the search never learns the difference and never holds
//! a reference back into the provider's storage.

use std::sync::Arc;

use llamaquest_procedural::{Biome, Tile, TilePos};

/// What a search needs to know about one tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NavTile {
    /// Terrain category.
    pub biome: Biome,
    /// Effective movement cost; `f32::INFINITY` when impassable.
    pub cost: f32,
    /// A blocking structure stands here.
    pub occupied: bool,
}

impl NavTile {
    /// Untouched tile of a biome.
    #[must_use]
    pub const fn open(biome: Biome) -> Self {
        Self {
            biome,
            cost: biome.base_cost(),
            occupied: false,
        }
    }

    /// Whether the tile can be entered at all.
    #[inline]
    #[must_use]
    pub fn is_passable(&self) -> bool {
        self.cost.is_finite()
    }

    /// Whether the tile stops a line of sight (it is still seen itself).
    #[inline]
    #[must_use]
    pub const fn blocks_sight(&self) -> bool {
        self.occupied || self.biome.blocks_sight()
    }
}

impl From<&Tile> for NavTile {
    fn from(tile: &Tile) -> Self {
        Self {
            biome: tile.biome,
            cost: tile.effective_cost(),
            occupied: tile.occupied,
        }
    }
}

/// Read access to the tile graph.
pub trait NavTerrain {
    /// Tile at a world position, or `None` outside the world.
    fn nav_tile(&self, pos: TilePos) -> Option<NavTile>;
}

impl<T: NavTerrain + ?Sized> NavTerrain for &T {
    fn nav_tile(&self, pos: TilePos) -> Option<NavTile> {
        (**self).nav_tile(pos)
    }
}

impl<T: NavTerrain + ?Sized> NavTerrain for Arc<T> {
    fn nav_tile(&self, pos: TilePos) -> Option<NavTile> {
        (**self).nav_tile(pos)
    }
}

/// Fixed rectangular terrain.
///
/// Everything outside the rectangle reads as `None`. Used for synthetic
/// grids in tests and benchmarks, and by hosts that plan on small arenas.
#[derive(Clone, Debug)]
pub struct GridTerrain {
    width: i32,
    height: i32,
    tiles: Vec<NavTile>,
}

impl GridTerrain {
    /// A `width` x `height` grid filled with one biome, origin at (0, 0).
    #[must_use]
    pub fn new(width: u32, height: u32, fill: Biome) -> Self {
        let width = width as i32;
        let height = height as i32;
        Self {
            width,
            height,
            tiles: vec![NavTile::open(fill); (width.max(0) * height.max(0)) as usize],
        }
    }

    /// Grid width in tiles.
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.width
    }

    /// Grid height in tiles.
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.height
    }

    fn index(&self, pos: TilePos) -> Option<usize> {
        let inside = (0..self.width).contains(&pos.x) && (0..self.height).contains(&pos.y);
        inside.then(|| (pos.y * self.width + pos.x) as usize)
    }

    /// Replaces a tile; ignored outside the grid.
    pub fn set(&mut self, pos: TilePos, tile: NavTile) {
        if let Some(index) = self.index(pos) {
            self.tiles[index] = tile;
        }
    }

    /// Sets a tile to the base state of a biome.
    pub fn set_biome(&mut self, pos: TilePos, biome: Biome) {
        self.set(pos, NavTile::open(biome));
    }

    /// Overrides a tile's cost, keeping its biome.
    ///
    /// Finite costs below `MIN_TILE_COST` break the heuristic's admissibility.
    pub fn set_cost(&mut self, pos: TilePos, cost: f32) {
        if let Some(index) = self.index(pos) {
            self.tiles[index].cost = cost;
        }
    }

    /// Marks a tile as blocked by a structure.
    pub fn set_occupied(&mut self, pos: TilePos) {
        if let Some(index) = self.index(pos) {
            let tile = &mut self.tiles[index];
            tile.occupied = true;
            tile.cost = f32::INFINITY;
        }
    }
}

impl NavTerrain for GridTerrain {
    fn nav_tile(&self, pos: TilePos) -> Option<NavTile> {
        self.index(pos).map(|index| self.tiles[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_bounds() {
        let grid = GridTerrain::new(4, 3, Biome::Village);
        assert!(grid.nav_tile(TilePos::new(0, 0)).is_some());
        assert!(grid.nav_tile(TilePos::new(3, 2)).is_some());
        assert!(grid.nav_tile(TilePos::new(4, 0)).is_none());
        assert!(grid.nav_tile(TilePos::new(0, -1)).is_none());
    }

    #[test]
    fn test_occupied_is_impassable_and_blocks_sight() {
        let mut grid = GridTerrain::new(2, 2, Biome::Village);
        grid.set_occupied(TilePos::new(1, 1));
        let tile = grid.nav_tile(TilePos::new(1, 1)).expect("inside");
        assert!(!tile.is_passable());
        assert!(tile.blocks_sight());
        assert!(!NavTile::open(Biome::Forest).blocks_sight());
        assert!(NavTile::open(Biome::Mountains).blocks_sight());
    }
}

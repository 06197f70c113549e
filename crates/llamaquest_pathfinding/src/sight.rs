//! Field of view.
//!
//! Rays are cast from the origin to every tile on the perimeter of the
//! bounding square and walked with Bresenham's line. A ray stops after the
//! first tile that blocks sight; that tile is still visible. Only tiles
//! within `radius` (euclidean) are reported.

use std::collections::BTreeSet;

use llamaquest_procedural::TilePos;

use crate::terrain::NavTerrain;

/// Largest sight radius honoured; larger requests are clamped to it.
pub const MAX_SIGHT_RADIUS: u32 = 128;

/// Tiles visible from `origin`, sorted by (x, y).
///
/// The origin is always visible when it exists. Tiles outside the world
/// end a ray. `radius` is clamped to `MAX_SIGHT_RADIUS`.
pub fn visible_tiles<T: NavTerrain + ?Sized>(terrain: &T, origin: TilePos, radius: u32) -> Vec<TilePos> {
    let mut seen = BTreeSet::new();
    if terrain.nav_tile(origin).is_none() {
        return Vec::new();
    }
    seen.insert(origin);

    let r = i32::try_from(radius.min(MAX_SIGHT_RADIUS)).unwrap_or(0);
    let radius_sq = i64::from(r) * i64::from(r);
    for (tx, ty) in perimeter(r) {
        cast(terrain, origin, tx, ty, radius_sq, &mut seen);
    }

    seen.into_iter().collect()
}

/// Offsets on the border of the `(2r+1)` square, clockwise from the top-left.
fn perimeter(r: i32) -> impl Iterator<Item = (i32, i32)> {
    let top = (-r..r).map(move |x| (x, -r));
    let right = (-r..r).map(move |y| (r, y));
    let bottom = (-r..r).map(move |x| (-x, r));
    let left = (-r..r).map(move |y| (-r, -y));
    top.chain(right).chain(bottom).chain(left)
}

fn cast<T: NavTerrain + ?Sized>(
    terrain: &T,
    origin: TilePos,
    tx: i32,
    ty: i32,
    radius_sq: i64,
    seen: &mut BTreeSet<TilePos>,
) {
    let (dx, dy) = (tx.abs(), -ty.abs());
    let (sx, sy) = (tx.signum(), ty.signum());
    let (mut x, mut y) = (0i32, 0i32);
    let mut err = dx + dy;

    while (x, y) != (tx, ty) {
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }

        if i64::from(x) * i64::from(x) + i64::from(y) * i64::from(y) > radius_sq {
            return;
        }
        let Some(pos) = origin.offset(x, y) else { return };
        let Some(tile) = terrain.nav_tile(pos) else { return };
        seen.insert(pos);
        if tile.blocks_sight() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::GridTerrain;
    use llamaquest_procedural::Biome;

    #[test]
    fn test_open_field_is_a_disc() {
        let grid = GridTerrain::new(21, 21, Biome::Village);
        let origin = TilePos::new(10, 10);
        let visible = visible_tiles(&grid, origin, 4);

        assert!(visible.contains(&origin));
        assert!(visible.contains(&TilePos::new(14, 10)));
        assert!(visible.contains(&TilePos::new(10, 6)));
        assert!(!visible.contains(&TilePos::new(14, 14)));
        for pos in &visible {
            let (dx, dy) = (pos.x - origin.x, pos.y - origin.y);
            assert!(dx * dx + dy * dy <= 16);
        }
    }

    #[test]
    fn test_mountain_blocks_but_is_seen() {
        let mut grid = GridTerrain::new(11, 11, Biome::Village);
        grid.set_biome(TilePos::new(7, 5), Biome::Mountains);
        let visible = visible_tiles(&grid, TilePos::new(5, 5), 5);

        assert!(visible.contains(&TilePos::new(7, 5)));
        assert!(!visible.contains(&TilePos::new(8, 5)));
        assert!(!visible.contains(&TilePos::new(10, 5)));
    }

    #[test]
    fn test_water_does_not_block_sight() {
        let mut grid = GridTerrain::new(11, 11, Biome::Village);
        grid.set_biome(TilePos::new(7, 5), Biome::Water);
        let visible = visible_tiles(&grid, TilePos::new(5, 5), 5);
        assert!(visible.contains(&TilePos::new(10, 5)));
    }

    #[test]
    fn test_huge_radius_is_clamped() {
        let grid = GridTerrain::new(21, 21, Biome::Village);
        let origin = TilePos::new(10, 10);
        let visible = visible_tiles(&grid, origin, u32::MAX);

        assert_eq!(visible, visible_tiles(&grid, origin, MAX_SIGHT_RADIUS));
        assert!(visible.contains(&TilePos::new(0, 0)));
        assert!(visible.contains(&TilePos::new(20, 20)));
        assert!(visible.contains(&TilePos::new(0, 10)));
    }

    #[test]
    fn test_zero_radius_sees_only_origin() {
        let grid = GridTerrain::new(3, 3, Biome::Forest);
        assert_eq!(visible_tiles(&grid, TilePos::new(1, 1), 0), vec![TilePos::new(1, 1)]);
        assert!(visible_tiles(&grid, TilePos::new(-1, 1), 3).is_empty());
    }
}

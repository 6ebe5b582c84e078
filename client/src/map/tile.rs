//! Tile coordinate system and toroidal slot addressing
//! World space is split into square tiles of `tile_size` units; each tile is
//! stored on disk as a `.line` and a `.poly` file named after its coordinates.

use std::path::{Path, PathBuf};

/// File suffix for line (road) data
pub const LINE_SUFFIX: &str = "line";
/// File suffix for area polygon data
pub const POLYGON_SUFFIX: &str = "poly";

/// Unique identifier for a map tile
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct TileId {
    pub x: i32,
    pub y: i32,
}

impl TileId {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Base file name shared by the line and polygon files
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.x, self.y)
    }

    pub fn line_path(&self, tile_dir: &Path) -> PathBuf {
        tile_dir.join(format!("{}.{}", self.file_stem(), LINE_SUFFIX))
    }

    pub fn polygon_path(&self, tile_dir: &Path) -> PathBuf {
        tile_dir.join(format!("{}.{}", self.file_stem(), POLYGON_SUFFIX))
    }

    /// Index of the grid slot this tile occupies.
    /// Coordinates wrap modulo the grid size, so a slot keeps its identity
    /// while the window slides over it.
    pub fn slot_index(&self, grid_width: usize, grid_height: usize) -> usize {
        let s = self.x.rem_euclid(grid_width as i32) as usize;
        let t = self.y.rem_euclid(grid_height as i32) as usize;
        s + t * grid_width
    }
}

/// World tile in the top-left corner of a `grid_width` x `grid_height`
/// window centered on `(x, y)`
pub fn origin_tile(
    x: f64,
    y: f64,
    tile_size: f64,
    grid_width: usize,
    grid_height: usize,
) -> TileId {
    let half_w = 0.5 * tile_size * grid_width as f64;
    let half_h = 0.5 * tile_size * grid_height as f64;

    TileId {
        x: ((x - half_w) / tile_size).floor() as i32,
        y: ((y - half_h) / tile_size).floor() as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        let tile = TileId::new(1960, -13993);
        let dir = Path::new("/data/tiles");
        assert_eq!(tile.file_stem(), "1960_-13993");
        assert_eq!(tile.line_path(dir), Path::new("/data/tiles/1960_-13993.line"));
        assert_eq!(tile.polygon_path(dir), Path::new("/data/tiles/1960_-13993.poly"));
    }

    #[test]
    fn test_slot_index_wraps() {
        assert_eq!(TileId::new(0, 0).slot_index(8, 8), 0);
        assert_eq!(TileId::new(9, 0).slot_index(8, 8), 1);
        assert_eq!(TileId::new(-1, 0).slot_index(8, 8), 7); // Wrap negative
        assert_eq!(TileId::new(3, -1).slot_index(8, 8), 3 + 7 * 8);
        assert_eq!(TileId::new(5, 2).slot_index(4, 3), 1 + 2 * 4);
    }

    #[test]
    fn test_origin_tile() {
        // Window of 8x8 tiles of size 500 centered on (2250, 2250)
        assert_eq!(origin_tile(2250.0, 2250.0, 500.0, 8, 8), TileId::new(0, 0));
        assert_eq!(origin_tile(2750.0, 2250.0, 500.0, 8, 8), TileId::new(1, 0));
        // Floors towards negative infinity left of the origin
        assert_eq!(origin_tile(1750.0, 2250.0, 500.0, 8, 8), TileId::new(-1, 0));
    }

    #[test]
    fn test_window_covers_every_slot_once() {
        let origin = origin_tile(-12345.0, 6789.0, 500.0, 8, 8);
        let mut seen = vec![false; 64];
        for j in 0..8 {
            for i in 0..8 {
                let tile = TileId::new(origin.x + i, origin.y + j);
                let slot = tile.slot_index(8, 8);
                assert!(!seen[slot]);
                seen[slot] = true;
            }
        }
        assert!(seen.iter().all(|s| *s));
    }
}

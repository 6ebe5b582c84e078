use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use glmap::error::TileError;
use glmap::map::cache::{SlotState, TileCache};
use glmap::map::decoder::{self, TileScratch};
use glmap::map::lines::triangulate_lines;
use glmap::map::polygons::build_polygon_layers;
use glmap::map::tile::TileId;
use glmap::map::MapConfig;

/// Decode one map tile and print what it contains
#[derive(Parser)]
#[command(name = "tile_info")]
#[command(version, about)]
struct Cli {
    /// Tile column
    #[arg(allow_negative_numbers = true)]
    x: i32,

    /// Tile row
    #[arg(allow_negative_numbers = true)]
    y: i32,

    /// Directory holding the tile files (default: $GLMAP_TILE_DIR or ./tiles)
    #[arg(long)]
    tile_dir: Option<PathBuf>,

    /// Load the whole window centered on the tile through the cache
    #[arg(long)]
    grid: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = MapConfig::from_env();
    if let Some(dir) = cli.tile_dir {
        config.tile_dir = dir;
    }

    let tile = TileId::new(cli.x, cli.y);
    if cli.grid {
        print_grid(&config, tile);
        Ok(())
    } else {
        print_tile(&config, tile)
    }
}

fn print_tile(config: &MapConfig, tile: TileId) -> Result<()> {
    let mut scratch = TileScratch::default();

    let path = tile.line_path(&config.tile_dir);
    match decoder::decode_lines(&path, &mut scratch) {
        Ok(header) => {
            let mut vertices = Vec::new();
            let mut colors = Vec::new();
            triangulate_lines(&path, &scratch.lines, &scratch.points, &mut vertices, &mut colors)
                .with_context(|| format!("Failed to triangulate {}", path.display()))?;
            let bridges = scratch.lines.iter().filter(|l| l.bridge).count();
            let tunnels = scratch.lines.iter().filter(|l| l.tunnel).count();
            println!(
                "{}: {} lines ({} bridges, {} tunnels), {} points -> {} strip vertices",
                path.display(),
                header.record_count,
                bridges,
                tunnels,
                header.point_count,
                vertices.len()
            );
        }
        Err(TileError::NotFound { .. }) => println!("{}: missing", path.display()),
        Err(e) => return Err(e).context("Failed to decode line file"),
    }

    let path = tile.polygon_path(&config.tile_dir);
    match decoder::decode_polygons(&path, &mut scratch) {
        Ok(header) => {
            let mut vertices = Vec::new();
            let mut layers = Vec::new();
            build_polygon_layers(
                &path,
                &scratch.polygons,
                &scratch.points,
                &mut vertices,
                &mut layers,
            )
            .with_context(|| format!("Failed to build layers for {}", path.display()))?;
            println!(
                "{}: {} polygons, {} points -> {} vertices in {} layers",
                path.display(),
                header.record_count,
                header.point_count,
                vertices.len(),
                layers.len()
            );
            for layer in &layers {
                println!(
                    "  #{:02x}{:02x}{:02x}{:02x}: {} polygons, vertices {:?}",
                    layer.color[0],
                    layer.color[1],
                    layer.color[2],
                    layer.color[3],
                    layer.polygon_count,
                    layer.vertex_range()
                );
            }
        }
        Err(TileError::NotFound { .. }) => println!("{}: missing", path.display()),
        Err(e) => return Err(e).context("Failed to decode polygon file"),
    }

    Ok(())
}

fn print_grid(config: &MapConfig, tile: TileId) {
    let mut cache = TileCache::new(
        config.tile_dir.clone(),
        config.grid_width,
        config.grid_height,
        config.tile_size,
        0,
    );

    let x = (tile.x as f64 + 0.5) * config.tile_size;
    let y = (tile.y as f64 + 0.5) * config.tile_size;
    cache.set_viewport(x, y, 1.0);
    cache.load_pending_now();

    let (width, height) = cache.grid_size();
    println!("{}x{} window around {:?}", width, height, tile);

    let mut failed = 0;
    let mut empty = 0;
    for (index, slot) in cache.slots().iter().enumerate() {
        let Some(id) = slot.tile() else { continue };
        let geometry = slot.geometry();
        match slot.state() {
            SlotState::Ready if geometry.is_empty() => empty += 1,
            SlotState::Ready => println!(
                "  slot {:2} {:>6},{:<6} {:6} line vertices {:6} polygon vertices {:3} layers",
                index,
                id.x,
                id.y,
                geometry.line_vertices.len(),
                geometry.polygon_vertices.len(),
                geometry.layers.len()
            ),
            _ => failed += 1,
        }
    }
    println!("{} empty, {} failed", empty, failed);
}

//! Map system with tile streaming, triangulation and rendering

pub mod cache;
pub mod camera;
pub mod decoder;
pub mod lines;
pub mod loader;
pub mod polygons;
pub mod renderer;
pub mod tile;
pub mod vertex;

#[cfg(test)]
mod fixtures;

use std::path::PathBuf;

use cache::TileCache;
use camera::{MapCamera, ViewUniforms};
use renderer::TileRenderer;

/// Environment variable overriding [`MapConfig::tile_dir`]
pub const TILE_DIR_ENV: &str = "GLMAP_TILE_DIR";
/// Environment variable overriding [`MapConfig::workers`]
pub const WORKERS_ENV: &str = "GLMAP_WORKERS";

/// Map system settings
#[derive(Clone, Debug, PartialEq)]
pub struct MapConfig {
    /// Directory holding the `.line` and `.poly` tile files
    pub tile_dir: PathBuf,
    pub grid_width: usize,
    pub grid_height: usize,
    /// Tile edge length in world units
    pub tile_size: f64,
    /// Loader threads; zero loads only through [`TileCache::load_pending_now`]
    pub workers: usize,
}

impl Default for MapConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(4);

        Self {
            tile_dir: PathBuf::from("tiles"),
            grid_width: 8,
            grid_height: 8,
            tile_size: 500.0,
            workers,
        }
    }
}

impl MapConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = var(TILE_DIR_ENV).filter(|d| !d.is_empty()) {
            self.tile_dir = PathBuf::from(dir);
        }
        if let Some(value) = var(WORKERS_ENV) {
            match value.trim().parse::<usize>() {
                Ok(0) => log::warn!(
                    "Ignoring {}=0, at least one loader thread is needed",
                    WORKERS_ENV
                ),
                Ok(workers) => self.workers = workers,
                Err(_) => log::warn!("Ignoring {}={:?}, not a number", WORKERS_ENV, value),
            }
        }
        self
    }
}

/// Integrated map system
pub struct MapSystem {
    pub camera: MapCamera,
    tile_cache: TileCache,
    tile_renderer: TileRenderer,
}

impl MapSystem {
    /// Create a new map system
    pub fn new(config: &MapConfig, viewport_width: u32, viewport_height: u32) -> Self {
        let defaults = MapCamera::default();
        let camera = MapCamera::new(
            defaults.center.0,
            defaults.center.1,
            defaults.zoom,
            viewport_width,
            viewport_height,
        );

        let tile_cache = TileCache::new(
            config.tile_dir.clone(),
            config.grid_width,
            config.grid_height,
            config.tile_size,
            config.workers,
        );
        let (w, h) = tile_cache.grid_size();
        let tile_renderer = TileRenderer::new(w * h);

        let mut system = Self {
            camera,
            tile_cache,
            tile_renderer,
        };
        system.move_window();
        system
    }

    fn move_window(&mut self) {
        let (x, y) = self.camera.center;
        self.tile_cache.set_viewport(x, y, self.camera.zoom);
    }

    /// Update the map system (call each frame). Returns whether the frame
    /// needs to be redrawn.
    pub fn update(&mut self, device: &wgpu::Device) -> bool {
        self.tile_cache.poll();
        self.tile_renderer.upload(device, &self.tile_cache);
        self.tile_cache.take_redraw_request()
    }

    /// Draw all polygon layers of one color, inside the caller's stencil pass
    pub fn draw_polygons(&self, render_pass: &mut wgpu::RenderPass<'_>, color: [u8; 4]) {
        self.tile_renderer.draw_polygons(render_pass, color);
    }

    /// Draw the line strips of all visible tiles
    pub fn draw_lines(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        self.tile_renderer.draw_lines(render_pass);
    }

    pub fn color_batches(&self) -> Vec<[u8; 4]> {
        self.tile_renderer.color_batches()
    }

    pub fn view_uniforms(&self) -> ViewUniforms {
        self.camera.view_uniforms()
    }

    /// Handle viewport resize
    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.set_viewport(width, height);
    }

    /// Pan the map by pixel delta
    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.camera.pan(dx, dy);
        self.move_window();
    }

    /// Zoom centered, by a scale factor
    pub fn zoom(&mut self, factor: f32) {
        self.camera.zoom_by(factor);
        self.move_window();
    }

    /// Set center position in world units
    pub fn set_center(&mut self, x: f64, y: f64) {
        self.camera.center = (x, y);
        self.move_window();
    }

    pub fn center(&self) -> (f64, f64) {
        self.camera.center
    }

    pub fn tile_cache(&self) -> &TileCache {
        &self.tile_cache
    }

    pub fn tile_cache_mut(&mut self) -> &mut TileCache {
        &mut self.tile_cache
    }

    pub fn renderer(&self) -> &TileRenderer {
        &self.tile_renderer
    }

    /// Get cache statistics
    pub fn cache_stats(&self) -> cache::CacheStats {
        self.tile_cache.stats()
    }

    /// Get pending tile count
    pub fn pending_tiles(&self) -> usize {
        self.tile_cache.loading_count()
    }
}

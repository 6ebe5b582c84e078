//! Sliding-window tile cache
//!
//! A fixed pool of `grid_width * grid_height` slots covers the window around
//! the camera. World tile `(x, y)` always lives in slot
//! `(x mod W, y mod H)`, so panning only re-targets the slots that scrolled
//! out of view while every other slot keeps its geometry.

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, warn};

use super::loader::{
    CancelToken, TileGeometry, TileLoadResult, TileLoader, TileRequest, TileWorkspace,
};
use super::tile::{origin_tile, TileId};
use crate::error::TileError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Loading,
    Ready,
}

/// One cell of the window
pub struct TileSlot {
    tile: Option<TileId>,
    desired: Option<TileId>,
    state: SlotState,
    generation: u64,
    published_generation: u64,
    geometry: Arc<TileGeometry>,
    workspace: Option<TileWorkspace>,
    cancel: CancelToken,
}

impl TileSlot {
    fn new() -> Self {
        Self {
            tile: None,
            desired: None,
            state: SlotState::Empty,
            generation: 0,
            published_generation: 0,
            geometry: Arc::new(TileGeometry::default()),
            workspace: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Tile assigned to this slot (being loaded or loaded)
    pub fn tile(&self) -> Option<TileId> {
        self.tile
    }

    /// Tile the current viewport wants in this slot
    pub fn desired(&self) -> Option<TileId> {
        self.desired
    }

    /// Last published geometry. Swapped as a whole on publish, never edited.
    pub fn geometry(&self) -> &Arc<TileGeometry> {
        &self.geometry
    }

    /// Generation of the load that produced [`TileSlot::geometry`]
    pub fn published_generation(&self) -> u64 {
        self.published_generation
    }

    /// Swap in new geometry, reclaiming the old buffers when nobody else
    /// holds them
    fn publish(&mut self, geometry: TileGeometry) -> Option<TileGeometry> {
        let old = std::mem::replace(&mut self.geometry, Arc::new(geometry));
        Arc::try_unwrap(old).ok()
    }

    fn store_workspace(&mut self, workspace: TileWorkspace) {
        self.workspace = Some(workspace);
    }
}

/// Fixed grid of tile slots with background loading
pub struct TileCache {
    slots: Vec<TileSlot>,
    grid_width: usize,
    grid_height: usize,
    tile_size: f64,
    zoom: f32,
    loader: TileLoader,
    moved: bool,
}

impl TileCache {
    /// Create a new tile cache
    /// - tile_dir: directory holding `{x}_{y}.line` / `{x}_{y}.poly` files
    /// - tile_size: tile edge length in world units (e.g., 500)
    pub fn new(
        tile_dir: impl Into<PathBuf>,
        grid_width: usize,
        grid_height: usize,
        tile_size: f64,
        workers: usize,
    ) -> Self {
        let grid_width = grid_width.max(1);
        let grid_height = grid_height.max(1);

        Self {
            slots: (0..grid_width * grid_height).map(|_| TileSlot::new()).collect(),
            grid_width,
            grid_height,
            tile_size,
            zoom: 1.0,
            loader: TileLoader::new(tile_dir, workers),
            moved: false,
        }
    }

    pub fn grid_size(&self) -> (usize, usize) {
        (self.grid_width, self.grid_height)
    }

    pub fn tile_size(&self) -> f64 {
        self.tile_size
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn loader(&self) -> &TileLoader {
        &self.loader
    }

    pub fn slots(&self) -> &[TileSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&TileSlot> {
        self.slots.get(index)
    }

    /// Slots the consumer may draw this frame
    pub fn ready_slots(&self) -> impl Iterator<Item = (usize, &TileSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.state == SlotState::Ready)
    }

    /// Number of loads in flight
    pub fn loading_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state == SlotState::Loading)
            .count()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            slot_count: self.slots.len(),
            ready: 0,
            loading: 0,
            empty: 0,
            memory_used: 0,
        };
        for slot in &self.slots {
            match slot.state {
                SlotState::Ready => stats.ready += 1,
                SlotState::Loading => stats.loading += 1,
                SlotState::Empty => stats.empty += 1,
            }
            stats.memory_used += slot.geometry.memory_size();
        }
        stats
    }

    /// Re-target the window to be centered on `(x, y)`.
    ///
    /// Only decides what to load; the loads themselves run on the loader.
    /// Returns the number of loads dispatched.
    pub fn set_viewport(&mut self, x: f64, y: f64, zoom: f32) -> usize {
        self.zoom = zoom;
        self.moved = true;

        let origin = origin_tile(x, y, self.tile_size, self.grid_width, self.grid_height);
        let mut dispatched = 0;

        for j in 0..self.grid_height as i32 {
            for i in 0..self.grid_width as i32 {
                let tile = TileId::new(origin.x + i, origin.y + j);
                let index = tile.slot_index(self.grid_width, self.grid_height);
                let slot = &mut self.slots[index];
                slot.desired = Some(tile);

                if slot.state == SlotState::Loading {
                    // Let the load finish; it is validated on completion
                    slot.cancel.set(slot.tile != Some(tile));
                    continue;
                }

                if slot.tile != Some(tile) {
                    self.dispatch(index, tile);
                    dispatched += 1;
                }
            }
        }

        if dispatched > 0 {
            debug!("Viewport moved, {} tiles to load", dispatched);
        }
        dispatched
    }

    fn dispatch(&mut self, index: usize, tile: TileId) {
        let slot = &mut self.slots[index];
        slot.generation += 1;
        slot.tile = Some(tile);
        slot.state = SlotState::Loading;
        slot.cancel = CancelToken::new();

        let request = TileRequest {
            slot: index,
            tile,
            generation: slot.generation,
            workspace: slot.workspace.take().unwrap_or_default(),
            cancel: slot.cancel.clone(),
        };

        if let Err(request) = self.loader.request(request) {
            log::error!("Tile loader is gone, cannot load {:?}", tile);
            let slot = &mut self.slots[index];
            slot.store_workspace(request.workspace);
            slot.tile = None;
            slot.state = SlotState::Empty;
        }
    }

    /// Apply completed loads. Returns how many tiles were published.
    pub fn poll(&mut self) -> usize {
        let mut published = 0;
        while let Some(result) = self.loader.poll() {
            if self.complete(result) {
                published += 1;
            }
        }
        published
    }

    /// Run queued loads on this thread, then apply them
    pub fn load_pending_now(&mut self) -> usize {
        let mut published = 0;
        while self.loader.run_pending() > 0 {
            published += self.poll();
        }
        published
    }

    /// Whether anything visible changed since the last call
    pub fn take_redraw_request(&mut self) -> bool {
        let loaded = self.loader.take_redraw();
        std::mem::take(&mut self.moved) || loaded
    }

    fn complete(&mut self, result: TileLoadResult) -> bool {
        let Some(slot) = self.slots.get_mut(result.slot) else {
            warn!("Load result for unknown slot {}", result.slot);
            return false;
        };

        if result.generation != slot.generation {
            debug!(
                "Dropping superseded load of {:?} (generation {} != {})",
                result.tile, result.generation, slot.generation
            );
            return false;
        }

        let desired = slot.desired;
        let stale = desired != Some(result.tile)
            || matches!(result.outcome, Err(TileError::Stale { .. }));

        if stale {
            debug!("Discarding stale load of {:?}, slot wants {:?}", result.tile, desired);
            slot.store_workspace(result.workspace);
            slot.state = SlotState::Empty;
            match desired {
                Some(tile) => self.dispatch(result.slot, tile),
                None => slot.tile = None,
            }
            return false;
        }

        let TileWorkspace { scratch, geometry } = result.workspace;
        match result.outcome {
            Ok(()) => {
                debug!(
                    "Loaded tile {:?}: {} line vertices, {} polygon vertices in {} layers ({:?})",
                    result.tile,
                    geometry.line_vertices.len(),
                    geometry.polygon_vertices.len(),
                    geometry.layers.len(),
                    result.elapsed
                );
                let reclaimed = slot.publish(geometry);
                slot.store_workspace(TileWorkspace {
                    scratch,
                    geometry: reclaimed.unwrap_or_default(),
                });
                slot.published_generation = result.generation;
                slot.state = SlotState::Ready;
                true
            }
            Err(e) => {
                warn!("Failed to load tile {:?}: {}", result.tile, e);
                let reclaimed = slot.publish(TileGeometry::default());
                let geometry = roomier(reclaimed, geometry);
                slot.store_workspace(TileWorkspace { scratch, geometry });
                slot.published_generation = result.generation;
                slot.state = SlotState::Empty;
                false
            }
        }
    }
}

/// Of two buffer sets, keep the one that can hold more without reallocating
fn roomier(reclaimed: Option<TileGeometry>, current: TileGeometry) -> TileGeometry {
    match reclaimed {
        Some(old) if old.capacity_size() > current.capacity_size() => old,
        _ => current,
    }
}

/// Cache statistics for debugging/UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub slot_count: usize,
    pub ready: usize,
    pub loading: usize,
    pub empty: usize,
    /// Vertex bytes held by published geometry
    pub memory_used: usize,
}

impl CacheStats {
    pub fn ready_percent(&self) -> f32 {
        if self.slot_count == 0 {
            0.0
        } else {
            (self.ready as f32 / self.slot_count as f32) * 100.0
        }
    }
}

//! Background tile loader: a small worker pool that decodes tile files and
//! builds their geometry off the render thread

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use log::debug;
use web_time::Instant;

use super::decoder::{self, TileScratch};
use super::lines::triangulate_lines;
use super::polygons::{build_polygon_layers, PolygonLayer};
use super::tile::TileId;
use super::vertex::{LineColor, LineVertex, PolygonVertex};
use crate::error::{TileError, TileResult};

/// Finished geometry of one tile, ready for upload
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TileGeometry {
    pub line_vertices: Vec<LineVertex>,
    pub line_colors: Vec<LineColor>,
    pub polygon_vertices: Vec<PolygonVertex>,
    pub layers: Vec<PolygonLayer>,
}

impl TileGeometry {
    pub fn clear(&mut self) {
        self.line_vertices.clear();
        self.line_colors.clear();
        self.polygon_vertices.clear();
        self.layers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.line_vertices.is_empty() && self.polygon_vertices.is_empty()
    }

    /// Bytes the vertex buffers can hold without reallocating
    pub fn capacity_size(&self) -> usize {
        self.line_vertices.capacity() * std::mem::size_of::<LineVertex>()
            + self.line_colors.capacity() * std::mem::size_of::<LineColor>()
            + self.polygon_vertices.capacity() * std::mem::size_of::<PolygonVertex>()
    }

    /// Approximate heap size of the vertex data
    pub fn memory_size(&self) -> usize {
        self.line_vertices.len() * std::mem::size_of::<LineVertex>()
            + self.line_colors.len() * std::mem::size_of::<LineColor>()
            + self.polygon_vertices.len() * std::mem::size_of::<PolygonVertex>()
    }
}

/// Buffers a load works in. Owned by a slot, moved into its request and
/// returned with the result, so two loads never share them.
#[derive(Debug, Default)]
pub struct TileWorkspace {
    pub scratch: TileScratch,
    pub geometry: TileGeometry,
}

/// Best-effort cancellation flag shared between a slot and its in-flight load
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, cancelled: bool) {
        self.0.store(cancelled, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Tile loading request
#[derive(Debug)]
pub struct TileRequest {
    pub slot: usize,
    pub tile: TileId,
    pub generation: u64,
    pub workspace: TileWorkspace,
    pub cancel: CancelToken,
}

/// Result of a tile load operation
#[derive(Debug)]
pub struct TileLoadResult {
    pub slot: usize,
    pub tile: TileId,
    pub generation: u64,
    pub workspace: TileWorkspace,
    pub outcome: TileResult<()>,
    pub elapsed: Duration,
}

/// Decode both files of `tile` and build its geometry into `workspace`.
/// A missing file leaves its half of the tile empty.
pub fn load_tile(
    tile_dir: &Path,
    tile: TileId,
    workspace: &mut TileWorkspace,
    cancel: &CancelToken,
) -> TileResult<()> {
    let TileWorkspace { scratch, geometry } = workspace;
    geometry.clear();

    if cancel.is_cancelled() {
        return Err(TileError::Stale { tile });
    }

    let path = tile.line_path(tile_dir);
    match decoder::decode_lines(&path, scratch) {
        Ok(_) => {
            triangulate_lines(
                &path,
                &scratch.lines,
                &scratch.points,
                &mut geometry.line_vertices,
                &mut geometry.line_colors,
            )?;
        }
        Err(e) if e.is_not_found() => debug!("No line data for tile {:?}", tile),
        Err(e) => return Err(e),
    }

    if cancel.is_cancelled() {
        return Err(TileError::Stale { tile });
    }

    let path = tile.polygon_path(tile_dir);
    match decoder::decode_polygons(&path, scratch) {
        Ok(_) => {
            build_polygon_layers(
                &path,
                &scratch.polygons,
                &scratch.points,
                &mut geometry.polygon_vertices,
                &mut geometry.layers,
            )?;
        }
        Err(e) if e.is_not_found() => debug!("No polygon data for tile {:?}", tile),
        Err(e) => return Err(e),
    }

    Ok(())
}

fn execute(tile_dir: &Path, mut request: TileRequest) -> TileLoadResult {
    let started = Instant::now();
    let outcome = load_tile(
        tile_dir,
        request.tile,
        &mut request.workspace,
        &request.cancel,
    );

    TileLoadResult {
        slot: request.slot,
        tile: request.tile,
        generation: request.generation,
        workspace: request.workspace,
        outcome,
        elapsed: started.elapsed(),
    }
}

/// Tile loader with a pool of decode threads
pub struct TileLoader {
    tile_dir: PathBuf,
    request_tx: Option<Sender<TileRequest>>,
    request_rx: Receiver<TileRequest>,
    result_tx: Sender<TileLoadResult>,
    result_rx: Receiver<TileLoadResult>,
    redraw: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl TileLoader {
    /// Create a loader reading from `tile_dir` with `workers` threads.
    /// With zero workers requests only run through [`TileLoader::run_pending`].
    pub fn new(tile_dir: impl Into<PathBuf>, workers: usize) -> Self {
        let tile_dir = tile_dir.into();
        let (request_tx, request_rx) = crossbeam_channel::unbounded::<TileRequest>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<TileLoadResult>();
        let redraw = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let request_rx = request_rx.clone();
            let result_tx = result_tx.clone();
            let tile_dir = tile_dir.clone();
            let redraw = redraw.clone();

            let spawned = std::thread::Builder::new()
                .name(format!("tile-loader-{i}"))
                .spawn(move || Self::worker_thread(tile_dir, request_rx, result_tx, redraw));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => log::error!("Failed to spawn tile loader thread: {}", e),
            }
        }

        Self {
            tile_dir,
            request_tx: Some(request_tx),
            request_rx,
            result_tx,
            result_rx,
            redraw,
            workers: handles,
        }
    }

    pub fn tile_dir(&self) -> &Path {
        &self.tile_dir
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue a tile load. Hands the request back if the queue is closed.
    pub fn request(&self, request: TileRequest) -> Result<(), TileRequest> {
        match &self.request_tx {
            Some(tx) => tx.send(request).map_err(|e| e.into_inner()),
            None => Err(request),
        }
    }

    /// Poll for completed tile loads
    pub fn poll(&self) -> Option<TileLoadResult> {
        match self.result_rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Run queued requests on the calling thread, returning how many ran.
    /// Results are delivered through [`TileLoader::poll`] as usual.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        while let Ok(request) = self.request_rx.try_recv() {
            let result = execute(&self.tile_dir, request);
            // Cannot fail, `self` holds the receiver
            let _ = self.result_tx.send(result);
            count += 1;
        }
        if count > 0 {
            self.redraw.store(true, Ordering::Release);
        }
        count
    }

    /// Whether a load finished since the last call
    pub fn take_redraw(&self) -> bool {
        self.redraw.swap(false, Ordering::AcqRel)
    }

    fn worker_thread(
        tile_dir: PathBuf,
        request_rx: Receiver<TileRequest>,
        result_tx: Sender<TileLoadResult>,
        redraw: Arc<AtomicBool>,
    ) {
        while let Ok(request) = request_rx.recv() {
            let result = execute(&tile_dir, request);
            if result_tx.send(result).is_err() {
                break; // Receiver dropped, exit thread
            }
            redraw.store(true, Ordering::Release);
        }
        debug!("Tile loader thread exiting");
    }
}

impl Drop for TileLoader {
    fn drop(&mut self) {
        // Closing the queue lets the workers drain and exit
        self.request_tx = None;
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

//! wgpu buffers for the tiles of the cache window
//!
//! Pipelines and shaders belong to the caller. Lines are drawn as one
//! `TriangleStrip` per tile with `LineVertex::desc()` and `LineColor::desc()`
//! in vertex slots 0 and 1; polygon layers are drawn as indexed
//! `TriangleList`s with `PolygonVertex::desc()` in slot 0, once per color.

use std::ops::Range;

use wgpu::util::DeviceExt;

use super::cache::{SlotState, TileCache};
use super::loader::TileGeometry;
use super::tile::TileId;

/// Index range of one color layer inside a tile's index buffer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GpuLayer {
    pub color: [u8; 4],
    pub indices: Range<u32>,
}

/// Buffers of one uploaded tile
pub struct GpuTile {
    pub tile: Option<TileId>,
    pub generation: u64,
    line_vertices: Option<wgpu::Buffer>,
    line_colors: Option<wgpu::Buffer>,
    line_vertex_count: u32,
    polygon_vertices: Option<wgpu::Buffer>,
    polygon_indices: Option<wgpu::Buffer>,
    layers: Vec<GpuLayer>,
}

impl GpuTile {
    fn new(
        device: &wgpu::Device,
        tile: Option<TileId>,
        generation: u64,
        geometry: &TileGeometry,
    ) -> Self {
        let mut indices = Vec::new();
        let layers = layer_indices(geometry, &mut indices);

        Self {
            tile,
            generation,
            line_vertices: create_buffer(
                device,
                "Line Vertex Buffer",
                bytemuck::cast_slice(&geometry.line_vertices),
                wgpu::BufferUsages::VERTEX,
            ),
            line_colors: create_buffer(
                device,
                "Line Color Buffer",
                bytemuck::cast_slice(&geometry.line_colors),
                wgpu::BufferUsages::VERTEX,
            ),
            line_vertex_count: geometry.line_vertices.len() as u32,
            polygon_vertices: create_buffer(
                device,
                "Polygon Vertex Buffer",
                bytemuck::cast_slice(&geometry.polygon_vertices),
                wgpu::BufferUsages::VERTEX,
            ),
            polygon_indices: create_buffer(
                device,
                "Polygon Index Buffer",
                bytemuck::cast_slice(&indices),
                wgpu::BufferUsages::INDEX,
            ),
            layers,
        }
    }

    pub fn layers(&self) -> &[GpuLayer] {
        &self.layers
    }

    pub fn line_vertex_count(&self) -> u32 {
        self.line_vertex_count
    }
}

fn create_buffer(
    device: &wgpu::Device,
    label: &str,
    contents: &[u8],
    usage: wgpu::BufferUsages,
) -> Option<wgpu::Buffer> {
    if contents.is_empty() {
        return None;
    }
    Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents,
        usage,
    }))
}

/// Append triangle-list indices equivalent to a triangle fan over
/// `start..start + count`
pub fn fan_triangle_indices(start: u32, count: u32, out: &mut Vec<u32>) {
    for i in 1..count.saturating_sub(1) {
        out.extend_from_slice(&[start, start + i, start + i + 1]);
    }
}

/// Fan indices for every layer of `geometry`, one range per layer.
///
/// Each layer is a single fan from its first vertex. All polygons of a layer
/// start with the same pivot, so the triangles bridging two polygons are
/// degenerate.
pub fn layer_indices(geometry: &TileGeometry, out: &mut Vec<u32>) -> Vec<GpuLayer> {
    geometry
        .layers
        .iter()
        .map(|layer| {
            let first = out.len() as u32;
            fan_triangle_indices(layer.start_vertex, layer.vertex_count, out);
            GpuLayer {
                color: layer.color,
                indices: first..out.len() as u32,
            }
        })
        .collect()
}

/// Distinct colors in first-seen order
fn collect_colors<'a>(layers: impl Iterator<Item = &'a GpuLayer>) -> Vec<[u8; 4]> {
    let mut colors: Vec<[u8; 4]> = Vec::new();
    for layer in layers {
        if !colors.contains(&layer.color) {
            colors.push(layer.color);
        }
    }
    colors
}

/// Tile renderer
pub struct TileRenderer {
    tiles: Vec<Option<GpuTile>>,
    visible: Vec<bool>,
}

impl TileRenderer {
    pub fn new(slot_count: usize) -> Self {
        Self {
            tiles: (0..slot_count).map(|_| None).collect(),
            visible: vec![false; slot_count],
        }
    }

    /// Upload geometry published since the last call and refresh visibility.
    /// Returns the number of tiles uploaded.
    pub fn upload(&mut self, device: &wgpu::Device, cache: &TileCache) -> usize {
        let slots = cache.slots();
        if self.tiles.len() != slots.len() {
            *self = Self::new(slots.len());
        }

        let mut uploaded = 0;
        for (index, slot) in slots.iter().enumerate() {
            let ready = slot.state() == SlotState::Ready;
            self.visible[index] = ready;
            if !ready {
                continue;
            }

            let current = self.tiles[index]
                .as_ref()
                .map(|gpu| gpu.generation == slot.published_generation())
                .unwrap_or(false);
            if current {
                continue;
            }

            self.tiles[index] = Some(GpuTile::new(
                device,
                slot.tile(),
                slot.published_generation(),
                slot.geometry(),
            ));
            uploaded += 1;
        }

        if uploaded > 0 {
            log::debug!("Uploaded {} tiles", uploaded);
        }
        uploaded
    }

    /// Tiles drawn this frame
    pub fn visible_tiles(&self) -> impl Iterator<Item = &GpuTile> {
        self.tiles
            .iter()
            .zip(&self.visible)
            .filter(|(_, visible)| **visible)
            .filter_map(|(tile, _)| tile.as_ref())
    }

    /// Distinct polygon colors across visible tiles, in first-seen order.
    /// Each color is one stencil fill pass.
    pub fn color_batches(&self) -> Vec<[u8; 4]> {
        collect_colors(self.visible_tiles().flat_map(|tile| tile.layers.iter()))
    }

    /// Draw every visible polygon layer of `color`
    pub fn draw_polygons(&self, pass: &mut wgpu::RenderPass<'_>, color: [u8; 4]) {
        for tile in self.visible_tiles() {
            let (Some(vertices), Some(indices)) = (&tile.polygon_vertices, &tile.polygon_indices)
            else {
                continue;
            };
            let Some(layer) = tile.layers.iter().find(|l| l.color == color) else {
                continue;
            };
            if layer.indices.is_empty() {
                continue;
            }

            pass.set_vertex_buffer(0, vertices.slice(..));
            pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(layer.indices.clone(), 0, 0..1);
        }
    }

    /// Draw the line strips of every visible tile.
    ///
    /// Roads are drawn by calling this twice with different pipelines. First
    /// the outline: color from `LineColor::outline`, full width, lifted 0.1
    /// above the elevation. Then the fill on top: color from
    /// `LineColor::fill`, 0.7 of the width, lifted 1.0. The strip edge
    /// coordinate in `tex_coords` lets the fragment shader round the caps.
    pub fn draw_lines(&self, pass: &mut wgpu::RenderPass<'_>) {
        for tile in self.visible_tiles() {
            let (Some(vertices), Some(colors)) = (&tile.line_vertices, &tile.line_colors) else {
                continue;
            };

            pass.set_vertex_buffer(0, vertices.slice(..));
            pass.set_vertex_buffer(1, colors.slice(..));
            pass.draw(0..tile.line_vertex_count, 0..1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::polygons::PolygonLayer;

    fn layer(color: [u8; 4], start_vertex: u32, vertex_count: u32) -> PolygonLayer {
        PolygonLayer {
            color,
            start_vertex,
            vertex_count,
            polygon_count: 1,
            polygons: Vec::new(),
        }
    }

    #[test]
    fn test_fan_triangle_indices() {
        let mut out = Vec::new();
        fan_triangle_indices(10, 5, &mut out);
        assert_eq!(out, vec![10, 11, 12, 10, 12, 13, 10, 13, 14]);

        // Fewer than three vertices make no triangle
        out.clear();
        fan_triangle_indices(0, 2, &mut out);
        fan_triangle_indices(0, 0, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_layer_indices() {
        let red = [255, 0, 0, 255];
        let blue = [0, 0, 255, 255];
        let geometry = TileGeometry {
            layers: vec![layer(red, 0, 11), layer(blue, 11, 5)],
            ..Default::default()
        };

        let mut indices = Vec::new();
        let layers = layer_indices(&geometry, &mut indices);

        assert_eq!(layers[0], GpuLayer { color: red, indices: 0..27 });
        assert_eq!(layers[1], GpuLayer { color: blue, indices: 27..36 });
        assert_eq!(&indices[27..30], &[11, 12, 13]);
        assert!(indices.iter().all(|i| *i < 16));
    }

    #[test]
    fn test_color_batches_are_distinct_and_ordered() {
        let (a, b, c) = ([1, 2, 3, 255], [9, 9, 9, 255], [1, 2, 3, 128]);
        let tile_one = [
            GpuLayer { color: b, indices: 0..3 },
            GpuLayer { color: a, indices: 3..6 },
        ];
        let tile_two = [
            GpuLayer { color: a, indices: 0..3 },
            GpuLayer { color: c, indices: 3..9 },
        ];

        let colors = collect_colors(tile_one.iter().chain(tile_two.iter()));
        // Alpha is part of the color
        assert_eq!(colors, vec![b, a, c]);
    }

    #[test]
    fn test_new_renderer_draws_nothing() {
        let renderer = TileRenderer::new(64);
        assert_eq!(renderer.visible_tiles().count(), 0);
        assert!(renderer.color_batches().is_empty());
    }
}

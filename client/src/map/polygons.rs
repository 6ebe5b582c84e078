//! Polygon layers: area rings grouped by fill color into fan-able runs

use std::path::Path;

use super::decoder::PolygonRecord;
use super::vertex::PolygonVertex;
use crate::error::{TileError, TileResult};

/// One polygon inside a layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PolygonSpan {
    /// Index of the ring's first vertex, right after its pivot
    pub offset: u32,
    /// Ring vertices plus the closing vertex
    pub count: u32,
}

/// A contiguous run of polygon vertices sharing one exact color
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolygonLayer {
    pub color: [u8; 4],
    pub start_vertex: u32,
    pub vertex_count: u32,
    pub polygon_count: u32,
    pub polygons: Vec<PolygonSpan>,
}

impl PolygonLayer {
    fn new(color: [u8; 4]) -> Self {
        Self {
            color,
            start_vertex: 0,
            vertex_count: 0,
            polygon_count: 0,
            polygons: Vec::new(),
        }
    }

    pub fn vertex_range(&self) -> std::ops::Range<u32> {
        self.start_vertex..self.start_vertex + self.vertex_count
    }
}

/// Vertices a polygon contributes: pivot, ring, closing vertex
fn contributed_vertices(record: &PolygonRecord) -> u32 {
    record.vertex_count + 2
}

/// Build color layers from `records`, appending vertices to `vertices` and
/// replacing the contents of `layers`.
///
/// Layers are ordered by first appearance of their color. Every polygon in a
/// layer is written as pivot, ring, first ring point again. The pivot is the
/// first point of the file, shared by the whole layer, so each layer can be
/// drawn as one fan through the stencil buffer. Returns the vertex count.
pub fn build_polygon_layers(
    path: &Path,
    records: &[PolygonRecord],
    points: &[f32],
    vertices: &mut Vec<PolygonVertex>,
    layers: &mut Vec<PolygonLayer>,
) -> TileResult<usize> {
    layers.clear();
    let base = vertices.len();
    if records.is_empty() {
        return Ok(0);
    }

    let needed: usize = records.iter().map(|r| 2 * r.vertex_count as usize).sum();
    if points.len() < needed {
        return Err(TileError::corrupt(
            path,
            format!(
                "polygons need {} points, point array has {}",
                needed / 2,
                points.len() / 2
            ),
        ));
    }

    // Size every layer before any vertex offset can be assigned
    for record in records {
        match layers.iter_mut().find(|l| l.color == record.color) {
            Some(layer) => {
                layer.vertex_count += contributed_vertices(record);
                layer.polygon_count += 1;
            }
            None => {
                let mut layer = PolygonLayer::new(record.color);
                layer.vertex_count = contributed_vertices(record);
                layer.polygon_count = 1;
                layers.push(layer);
            }
        }
    }

    let mut start = base as u32;
    for layer in layers.iter_mut() {
        layer.start_vertex = start;
        layer.polygons.reserve(layer.polygon_count as usize);
        start += layer.vertex_count;
    }

    let total = (start as usize) - base;
    vertices.reserve(total);

    let pivot = PolygonVertex {
        position: [points[0], points[1]],
    };

    for layer in layers.iter_mut() {
        let mut src = 0;

        for record in records {
            let ring = &points[src..src + 2 * record.vertex_count as usize];
            src += ring.len();

            if record.color != layer.color {
                continue;
            }

            vertices.push(pivot);
            layer.polygons.push(PolygonSpan {
                offset: vertices.len() as u32,
                count: record.vertex_count + 1,
            });

            vertices.extend(ring.chunks_exact(2).map(|xy| PolygonVertex {
                position: [xy[0], xy[1]],
            }));
            vertices.push(PolygonVertex {
                position: [ring[0], ring[1]],
            });
        }

        debug_assert_eq!(
            vertices.len() as u32,
            layer.start_vertex + layer.vertex_count
        );
    }

    Ok(total)
}

//! Tile file encoders for tests

use std::path::Path;

use super::decoder::{LineRecord, PolygonRecord};
use super::tile::TileId;

#[derive(Clone, Debug)]
pub struct TestLine {
    pub record: LineRecord,
    pub points: Vec<[f32; 2]>,
}

impl TestLine {
    pub fn new(points: &[[f32; 2]], width: f32) -> Self {
        Self {
            record: LineRecord {
                point_count: points.len() as u32,
                width,
                elevation: 0.0,
                outline: [40, 40, 40, 255],
                fill: [255, 255, 255, 255],
                bridge: false,
                tunnel: false,
            },
            points: points.to_vec(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TestPolygon {
    pub record: PolygonRecord,
    pub points: Vec<[f32; 2]>,
}

impl TestPolygon {
    pub fn new(color: [u8; 4], points: &[[f32; 2]]) -> Self {
        Self {
            record: PolygonRecord {
                vertex_count: points.len() as u32,
                color,
            },
            points: points.to_vec(),
        }
    }
}

fn push_header(bytes: &mut Vec<u8>, records: usize, points: usize) {
    bytes.extend_from_slice(&(records as u32).to_ne_bytes());
    bytes.extend_from_slice(&(points as u32).to_ne_bytes());
}

fn push_points<'a>(bytes: &mut Vec<u8>, points: impl Iterator<Item = &'a [f32; 2]>) {
    for [x, y] in points {
        bytes.extend_from_slice(&x.to_ne_bytes());
        bytes.extend_from_slice(&y.to_ne_bytes());
    }
}

pub fn encode_lines(lines: &[TestLine]) -> Vec<u8> {
    let point_count = lines.iter().map(|l| l.points.len()).sum();
    let mut bytes = Vec::new();
    push_header(&mut bytes, lines.len(), point_count);

    for line in lines {
        let r = &line.record;
        bytes.extend_from_slice(&(r.point_count as i32).to_ne_bytes());
        bytes.extend_from_slice(&r.width.to_ne_bytes());
        bytes.extend_from_slice(&r.elevation.to_ne_bytes());
        bytes.extend_from_slice(&u32::from_le_bytes(r.outline).to_ne_bytes());
        bytes.extend_from_slice(&u32::from_le_bytes(r.fill).to_ne_bytes());
        bytes.extend_from_slice(&(r.bridge as i32).to_ne_bytes());
        bytes.extend_from_slice(&(r.tunnel as i32).to_ne_bytes());
    }

    push_points(&mut bytes, lines.iter().flat_map(|l| l.points.iter()));
    bytes
}

pub fn encode_polygons(polygons: &[TestPolygon]) -> Vec<u8> {
    let point_count = polygons.iter().map(|p| p.points.len()).sum();
    let mut bytes = Vec::new();
    push_header(&mut bytes, polygons.len(), point_count);

    for polygon in polygons {
        bytes.extend_from_slice(&(polygon.record.vertex_count as i32).to_ne_bytes());
        bytes.extend_from_slice(&polygon.record.color);
    }

    push_points(&mut bytes, polygons.iter().flat_map(|p| p.points.iter()));
    bytes
}

/// Flatten points the way the decoder stores them
pub fn flatten(points: &[[f32; 2]]) -> Vec<f32> {
    points.iter().flat_map(|p| p.iter().copied()).collect()
}

/// Write both files of a tile into `dir`
pub fn write_tile(dir: &Path, tile: TileId, lines: &[TestLine], polygons: &[TestPolygon]) {
    std::fs::write(tile.line_path(dir), encode_lines(lines)).unwrap();
    std::fs::write(tile.polygon_path(dir), encode_polygons(polygons)).unwrap();
}

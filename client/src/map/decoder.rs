//! Binary tile file decoder
//!
//! Every tile is stored as two files with the same layout:
//!
//! ```text
//! header   record_count: u32, point_count: u32        (8 bytes)
//! records  record_count fixed-size records            (28 bytes per line, 8 per polygon)
//! points   point_count (x, y) f32 pairs
//! ```
//!
//! All values are native-endian. Records do not index into the point array;
//! each one consumes its points in file order.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::{TileError, TileResult};

pub const HEADER_SIZE: usize = 8;
pub const LINE_RECORD_SIZE: usize = 28;
pub const POLYGON_RECORD_SIZE: usize = 8;
const POINT_SIZE: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileHeader {
    pub record_count: u32,
    pub point_count: u32,
}

/// A road or path, followed in the point array by `point_count` points
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineRecord {
    pub point_count: u32,
    pub width: f32,
    pub elevation: f32,
    pub outline: [u8; 4],
    pub fill: [u8; 4],
    pub bridge: bool,
    pub tunnel: bool,
}

/// A closed area ring, followed in the point array by `vertex_count` points
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PolygonRecord {
    pub vertex_count: u32,
    pub color: [u8; 4],
}

/// Decode buffers owned by one tile slot and lent to each of its loads.
/// They are cleared, never shrunk, so capacity tracks the largest tile seen.
#[derive(Debug, Default)]
pub struct TileScratch {
    pub points: Vec<f32>,
    pub lines: Vec<LineRecord>,
    pub polygons: Vec<PolygonRecord>,
}

/// Read-only memory map of one tile file
pub struct TileFile {
    path: PathBuf,
    map: Mmap,
}

impl TileFile {
    pub fn open(path: &Path) -> TileResult<Self> {
        let file = File::open(path).map_err(|e| TileError::io(path, e))?;
        let len = file.metadata().map_err(|e| TileError::io(path, e))?.len();
        if len < HEADER_SIZE as u64 {
            return Err(TileError::corrupt(
                path,
                format!("{len} bytes is shorter than the header"),
            ));
        }

        // SAFETY: tile files are written once by the exporter and only read here
        let map = unsafe { Mmap::map(&file) }.map_err(|e| TileError::io(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            map,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> TileHeader {
        TileHeader {
            record_count: self.read_u32(0),
            point_count: self.read_u32(4),
        }
    }

    fn read_u32(&self, offset: usize) -> u32 {
        bytemuck::pod_read_unaligned(&self.map[offset..offset + 4])
    }

    fn read_i32(&self, offset: usize) -> i32 {
        bytemuck::pod_read_unaligned(&self.map[offset..offset + 4])
    }

    fn read_f32(&self, offset: usize) -> f32 {
        bytemuck::pod_read_unaligned(&self.map[offset..offset + 4])
    }

    fn read_rgba(&self, offset: usize) -> [u8; 4] {
        bytemuck::pod_read_unaligned(&self.map[offset..offset + 4])
    }

    /// The file must hold exactly the header, the records and the points
    fn check_layout(&self, header: &TileHeader, record_size: usize) -> TileResult<()> {
        let expected = HEADER_SIZE as u64
            + header.record_count as u64 * record_size as u64
            + header.point_count as u64 * POINT_SIZE as u64;

        if self.map.len() as u64 != expected {
            return Err(TileError::corrupt(
                &self.path,
                format!(
                    "{} records and {} points need {expected} bytes, file has {}",
                    header.record_count,
                    header.point_count,
                    self.map.len()
                ),
            ));
        }
        Ok(())
    }

    fn read_points(
        &self,
        header: &TileHeader,
        record_size: usize,
        out: &mut Vec<f32>,
    ) -> TileResult<()> {
        let start = HEADER_SIZE + header.record_count as usize * record_size;
        let end = start + header.point_count as usize * POINT_SIZE;

        out.clear();
        out.extend(
            self.map[start..end]
                .chunks_exact(4)
                .map(bytemuck::pod_read_unaligned::<f32>),
        );

        if let Some(pos) = out.iter().position(|v| !v.is_finite()) {
            return Err(TileError::corrupt(
                &self.path,
                format!("point {} is not finite", pos / 2),
            ));
        }
        Ok(())
    }
}

/// Packed colors store channel `k` in bits `8k..8k+8`
fn unpack_color(packed: i32) -> [u8; 4] {
    (packed as u32).to_le_bytes()
}

/// Decode a `.line` file into `scratch.lines` and `scratch.points`
pub fn decode_lines(path: &Path, scratch: &mut TileScratch) -> TileResult<TileHeader> {
    scratch.lines.clear();
    scratch.points.clear();

    let file = TileFile::open(path)?;
    let header = file.header();
    file.check_layout(&header, LINE_RECORD_SIZE)?;

    let mut consumed = 0_u64;
    for i in 0..header.record_count as usize {
        let offset = HEADER_SIZE + i * LINE_RECORD_SIZE;

        let length = file.read_i32(offset);
        if length < 2 {
            return Err(TileError::corrupt(
                path,
                format!("line {i} has {length} points"),
            ));
        }

        let record = LineRecord {
            point_count: length as u32,
            width: file.read_f32(offset + 4),
            elevation: file.read_f32(offset + 8),
            outline: unpack_color(file.read_i32(offset + 12)),
            fill: unpack_color(file.read_i32(offset + 16)),
            bridge: file.read_i32(offset + 20) != 0,
            tunnel: file.read_i32(offset + 24) != 0,
        };
        if !record.width.is_finite() || !record.elevation.is_finite() {
            return Err(TileError::corrupt(
                path,
                format!("line {i} has a non-finite width or elevation"),
            ));
        }

        consumed += record.point_count as u64;
        scratch.lines.push(record);
    }

    if consumed != header.point_count as u64 {
        return Err(TileError::corrupt(
            path,
            format!(
                "lines consume {consumed} points, header declares {}",
                header.point_count
            ),
        ));
    }

    file.read_points(&header, LINE_RECORD_SIZE, &mut scratch.points)?;
    Ok(header)
}

/// Decode a `.poly` file into `scratch.polygons` and `scratch.points`
pub fn decode_polygons(path: &Path, scratch: &mut TileScratch) -> TileResult<TileHeader> {
    scratch.polygons.clear();
    scratch.points.clear();

    let file = TileFile::open(path)?;
    let header = file.header();
    if header.record_count == 0 {
        return Ok(header);
    }
    file.check_layout(&header, POLYGON_RECORD_SIZE)?;

    let mut consumed = 0_u64;
    for i in 0..header.record_count as usize {
        let offset = HEADER_SIZE + i * POLYGON_RECORD_SIZE;

        let count = file.read_i32(offset);
        if count < 3 {
            return Err(TileError::corrupt(
                path,
                format!("polygon {i} has {count} vertices"),
            ));
        }

        consumed += count as u64;
        scratch.polygons.push(PolygonRecord {
            vertex_count: count as u32,
            color: file.read_rgba(offset + 4),
        });
    }

    if consumed != header.point_count as u64 {
        return Err(TileError::corrupt(
            path,
            format!(
                "polygons consume {consumed} points, header declares {}",
                header.point_count
            ),
        ));
    }

    file.read_points(&header, POLYGON_RECORD_SIZE, &mut scratch.points)?;
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::fixtures::{self, TestLine, TestPolygon};

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_decode_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut bridge = TestLine::new(&[[0.0, 0.0], [1.0, 0.0], [2.0, 1.0]], 1.5);
        bridge.record.bridge = true;
        bridge.record.elevation = 2.0;
        bridge.record.fill = [10, 20, 30, 40];
        bridge.record.outline = [50, 60, 70, 80];
        let plain = TestLine::new(&[[5.0, 5.0], [6.0, 6.0]], 0.5);
        let bytes = fixtures::encode_lines(&[bridge.clone(), plain.clone()]);
        let path = write(dir.path(), "0_0.line", &bytes);

        let mut scratch = TileScratch::default();
        let header = decode_lines(&path, &mut scratch).unwrap();

        assert_eq!(header, TileHeader { record_count: 2, point_count: 5 });
        assert_eq!(scratch.lines, vec![bridge.record, plain.record]);
        assert_eq!(
            scratch.points,
            vec![0.0, 0.0, 1.0, 0.0, 2.0, 1.0, 5.0, 5.0, 6.0, 6.0]
        );
    }

    #[test]
    fn test_decode_polygons() {
        let dir = tempfile::TempDir::new().unwrap();
        let polygons = [
            TestPolygon::new([1, 2, 3, 4], &[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]),
            TestPolygon::new([9, 9, 9, 255], &[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0]]),
        ];
        let path = write(dir.path(), "0_0.poly", &fixtures::encode_polygons(&polygons));

        let mut scratch = TileScratch::default();
        let header = decode_polygons(&path, &mut scratch).unwrap();

        assert_eq!(header.point_count, 7);
        assert_eq!(
            scratch.polygons,
            vec![
                PolygonRecord { vertex_count: 3, color: [1, 2, 3, 4] },
                PolygonRecord { vertex_count: 4, color: [9, 9, 9, 255] },
            ]
        );
        assert_eq!(scratch.points.len(), 14);
    }

    #[test]
    fn test_empty_polygon_file_short_circuits() {
        let dir = tempfile::TempDir::new().unwrap();
        // Header only, with a stale point count the exporter left behind
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0_u32.to_ne_bytes());
        bytes.extend_from_slice(&12_u32.to_ne_bytes());
        let path = write(dir.path(), "0_0.poly", &bytes);

        let mut scratch = TileScratch::default();
        scratch.points.extend_from_slice(&[1.0, 2.0]);
        let header = decode_polygons(&path, &mut scratch).unwrap();

        assert_eq!(header.record_count, 0);
        assert!(scratch.polygons.is_empty());
        assert!(scratch.points.is_empty());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut scratch = TileScratch::default();
        let err = decode_lines(&dir.path().join("7_7.line"), &mut scratch).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let dir = tempfile::TempDir::new().unwrap();
        let line = TestLine::new(&[[0.0, 0.0], [1.0, 0.0]], 1.0);
        let mut bytes = fixtures::encode_lines(&[line]);
        bytes.truncate(bytes.len() - 4);
        let path = write(dir.path(), "0_0.line", &bytes);

        let mut scratch = TileScratch::default();
        let err = decode_lines(&path, &mut scratch).unwrap_err();
        assert!(matches!(err, TileError::Corrupt { .. }), "{err}");

        let path = write(dir.path(), "1_0.line", &[0, 0, 0]);
        let err = decode_lines(&path, &mut scratch).unwrap_err();
        assert!(matches!(err, TileError::Corrupt { .. }), "{err}");
    }

    #[test]
    fn test_point_count_mismatch_is_corrupt() {
        let dir = tempfile::TempDir::new().unwrap();
        let line = TestLine::new(&[[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]], 1.0);
        let mut bytes = fixtures::encode_lines(&[line]);
        // Claim two points in the record while three are stored
        bytes[HEADER_SIZE..HEADER_SIZE + 4].copy_from_slice(&2_i32.to_ne_bytes());
        let path = write(dir.path(), "0_0.line", &bytes);

        let mut scratch = TileScratch::default();
        let err = decode_lines(&path, &mut scratch).unwrap_err();
        assert!(matches!(err, TileError::Corrupt { .. }), "{err}");
    }

    #[test]
    fn test_short_records_are_corrupt() {
        let dir = tempfile::TempDir::new().unwrap();
        let line = TestLine::new(&[[0.0, 0.0], [1.0, 0.0]], 1.0);
        let mut bytes = fixtures::encode_lines(&[line]);
        bytes[HEADER_SIZE..HEADER_SIZE + 4].copy_from_slice(&1_i32.to_ne_bytes());
        let path = write(dir.path(), "0_0.line", &bytes);

        let mut scratch = TileScratch::default();
        assert!(matches!(
            decode_lines(&path, &mut scratch),
            Err(TileError::Corrupt { .. })
        ));

        let polygon = TestPolygon::new([0, 0, 0, 255], &[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]);
        let mut bytes = fixtures::encode_polygons(&[polygon]);
        bytes[HEADER_SIZE..HEADER_SIZE + 4].copy_from_slice(&(-3_i32).to_ne_bytes());
        let path = write(dir.path(), "0_0.poly", &bytes);
        assert!(matches!(
            decode_polygons(&path, &mut scratch),
            Err(TileError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_non_finite_point_is_corrupt() {
        let dir = tempfile::TempDir::new().unwrap();
        let line = TestLine::new(&[[0.0, 0.0], [f32::NAN, 0.0]], 1.0);
        let path = write(dir.path(), "0_0.line", &fixtures::encode_lines(&[line]));

        let mut scratch = TileScratch::default();
        let err = decode_lines(&path, &mut scratch).unwrap_err();
        assert!(err.to_string().contains("point 1"), "{err}");
    }

    #[test]
    fn test_packed_colors_unpack_low_byte_first() {
        assert_eq!(unpack_color(0x4433_2211), [0x11, 0x22, 0x33, 0x44]);
        assert_eq!(unpack_color(-1), [255, 255, 255, 255]);
    }
}

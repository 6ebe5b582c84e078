//! Line triangulation: turns polylines into one triangle strip per tile
//!
//! Each line becomes a strip section bounded by repeated (degenerate)
//! vertices, so all lines of a tile can be drawn with a single
//! `TriangleStrip` call over the whole vertex run.

use std::path::Path;

use super::decoder::LineRecord;
use super::vertex::{LineColor, LineVertex};
use crate::error::{TileError, TileResult};

/// Fraction of the width by which plain line ends are pulled in, so crossing
/// roads do not overdraw each other's caps
pub const SHRINK: f32 = 0.2;

/// Below this cross product a joint is treated as straight
pub const STRAIGHT_JOINT_EPSILON: f32 = 0.01;

/// Outline drawn around every bridge, whatever the stored outline color
pub const BRIDGE_OUTLINE: [u8; 4] = [144, 144, 144, 255];

/// Vertices emitted for a line of `point_count` points
pub fn line_vertex_count(point_count: usize, bridge_or_tunnel: bool) -> usize {
    let caps = if bridge_or_tunnel { 6 } else { 10 };
    caps + 2 * point_count.saturating_sub(2)
}

/// Upper bound on the vertices of a whole line file
pub fn max_vertex_count(line_count: usize, point_count: usize) -> usize {
    2 * point_count + 6 * line_count
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Vec2 {
    x: f32,
    y: f32,
}

impl Vec2 {
    fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Unit vector from `self` towards `to`
    fn unit_to(self, to: Vec2) -> Vec2 {
        let dx = to.x - self.x;
        let dy = to.y - self.y;
        let a = (dx * dx + dy * dy).sqrt();
        Vec2::new(dx / a, dy / a)
    }

    fn scale(self, s: f32) -> Vec2 {
        Vec2::new(self.x * s, self.y * s)
    }

    fn add(self, o: Vec2) -> Vec2 {
        Vec2::new(self.x + o.x, self.y + o.y)
    }

    fn sub(self, o: Vec2) -> Vec2 {
        Vec2::new(self.x - o.x, self.y - o.y)
    }
}

/// Appends vertices and their colors in lockstep
struct StripWriter<'a> {
    vertices: &'a mut Vec<LineVertex>,
    colors: &'a mut Vec<LineColor>,
    color: LineColor,
    z: f32,
}

impl StripWriter<'_> {
    fn push(&mut self, p: Vec2, side: f32, edge: f32) {
        self.vertices.push(LineVertex {
            position: [p.x, p.y, self.z],
            tex_coords: [side, edge],
        });
        self.colors.push(self.color);
    }
}

/// Triangulate all `lines` into `vertices`/`colors`, appending to both.
///
/// `points` is the flat `(x, y)` array the records consume in order.
/// Consecutive duplicate points are dropped first; a line left with fewer
/// than two distinct points produces nothing. Returns the number of vertices
/// written.
pub fn triangulate_lines(
    path: &Path,
    lines: &[LineRecord],
    points: &[f32],
    vertices: &mut Vec<LineVertex>,
    colors: &mut Vec<LineColor>,
) -> TileResult<usize> {
    let start_len = vertices.len();
    vertices.reserve(max_vertex_count(lines.len(), points.len() / 2));
    colors.reserve(max_vertex_count(lines.len(), points.len() / 2));

    let mut joints: Vec<Vec2> = Vec::new();
    let mut n = 0;

    for (i, line) in lines.iter().enumerate() {
        let end = n + 2 * line.point_count as usize;
        let Some(coords) = points.get(n..end) else {
            return Err(TileError::corrupt(
                path,
                format!("line {i} runs past the end of the point array"),
            ));
        };
        n = end;

        joints.clear();
        for xy in coords.chunks_exact(2) {
            let p = Vec2::new(xy[0], xy[1]);
            if joints.last() != Some(&p) {
                joints.push(p);
            }
        }
        if joints.len() < 2 {
            log::debug!("Skipping degenerate line {i} in {}", path.display());
            continue;
        }

        let first = vertices.len();
        let mut strip = StripWriter {
            vertices: &mut *vertices,
            colors: &mut *colors,
            color: line_color(line),
            z: line.elevation,
        };
        emit_line(&mut strip, &joints, line.width, line.bridge || line.tunnel);

        if !vertices[first..].iter().all(LineVertex::is_finite) {
            return Err(TileError::corrupt(
                path,
                format!("line {i} produced non-finite geometry"),
            ));
        }
    }

    Ok(vertices.len() - start_len)
}

fn line_color(line: &LineRecord) -> LineColor {
    LineColor {
        fill: line.fill,
        outline: if line.bridge { BRIDGE_OUTLINE } else { line.outline },
    }
}

fn emit_line(strip: &mut StripWriter<'_>, joints: &[Vec2], width: f32, square_caps: bool) {
    let last = joints.len() - 1;

    // Start cap
    let p = joints[0];
    let v = p.unit_to(joints[1]);
    let u = Vec2::new(-v.y, v.x).scale(width);

    if square_caps {
        // Bridges and tunnels end flush with their first point
        strip.push(p.add(u), -1.0, 0.0);
        strip.push(p.add(u), -1.0, 0.0);
        strip.push(p.sub(u), 1.0, 0.0);
    } else {
        let s = v.scale(width * SHRINK);
        let r = v.scale(width * (1.0 - SHRINK));

        strip.push(p.add(u).sub(r), -1.0, 1.0);
        strip.push(p.add(u).sub(r), -1.0, 1.0);
        strip.push(p.sub(u).sub(r), 1.0, 1.0);
        strip.push(p.add(u).add(s), -1.0, 0.0);
        strip.push(p.sub(u).add(s), 1.0, 0.0);
    }

    // Interior joints
    for j in 1..last {
        let p = joints[j];
        let v = p.unit_to(joints[j - 1]);
        let w = p.unit_to(joints[j + 1]);

        // The bisector scaled by 1/cross gives the miter offset
        let sum = v.add(w);
        let a = -w.y * sum.x + w.x * sum.y;
        let u = if a.abs() < STRAIGHT_JOINT_EPSILON {
            Vec2::new(-w.y, w.x)
        } else {
            sum.scale(1.0 / a)
        };
        let u = u.scale(width);

        strip.push(p.add(u), -1.0, 0.0);
        strip.push(p.sub(u), 1.0, 0.0);
    }

    // End cap, `v` points back along the last segment
    let p = joints[last];
    let v = p.unit_to(joints[last - 1]);
    let u = Vec2::new(v.y, -v.x).scale(width);

    if square_caps {
        strip.push(p.add(u), -1.0, 0.0);
        strip.push(p.sub(u), 1.0, 0.0);
        strip.push(p.sub(u), 1.0, 0.0);
    } else {
        let s = v.scale(width * SHRINK);
        let r = v.scale(width * (1.0 - SHRINK));

        strip.push(p.add(u).add(s), -1.0, 0.0);
        strip.push(p.sub(u).add(s), 1.0, 0.0);
        strip.push(p.add(u).sub(r), -1.0, -1.0);
        strip.push(p.sub(u).sub(r), 1.0, -1.0);
        strip.push(p.sub(u).sub(r), 1.0, -1.0);
    }
}

//! GPU-ready vertex records produced by the tile loader

use bytemuck::{Pod, Zeroable};

/// Line strip vertex. `tex_coords` holds `[side, edge]`: side is -1 for the
/// left edge and +1 for the right edge of the strip, edge is +1/-1 on the
/// rounded start/end caps and 0 along the body.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
}

impl LineVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x2,
    ];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<LineVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
    }
}

/// Per-vertex line colors, fill in the low four bytes, outline in the high four
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct LineColor {
    pub fill: [u8; 4],
    pub outline: [u8; 4],
}

impl LineColor {
    const ATTRIBS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        2 => Unorm8x4,
        3 => Unorm8x4,
    ];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<LineColor>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct PolygonVertex {
    pub position: [f32; 2],
}

impl PolygonVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![
        0 => Float32x2,
    ];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<PolygonVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strides_match_buffer_contract() {
        assert_eq!(LineVertex::desc().array_stride, 20);
        assert_eq!(LineColor::desc().array_stride, 8);
        assert_eq!(PolygonVertex::desc().array_stride, 8);
    }

    #[test]
    fn test_color_byte_layout() {
        let color = LineColor {
            fill: [1, 2, 3, 4],
            outline: [5, 6, 7, 8],
        };
        assert_eq!(bytemuck::bytes_of(&color), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }
}

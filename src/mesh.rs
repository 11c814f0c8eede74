//! Pre-distorted mesh generation.
//!
//! Builds a fixed-topology grid per eye whose UVs already carry the lens
//! warp, so rendering it with a plain textured pipeline performs the
//! distortion. This is cheaper than the per-pixel shader path and is the
//! default. Generation is deterministic: the same parameters always produce
//! bit-identical buffers, so regenerating on even/odd frames can never
//! cause visible wobble.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::warp::DistortionParameters;

/// Grid resolution exponent. Must be a power of two for the Morton
/// traversal to cover the grid. 64 is the lowest resolution at which
/// even/odd frame regeneration is indistinguishable on a monitor.
pub const DEFAULT_GRID_SIZE_LOG2: u32 = 6;

/// Static configuration for mesh generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshConfig {
    /// log2 of the grid cell count per axis (grid is 2^n x 2^n cells).
    pub grid_size_log2: u32,
    /// Flip the clip-space Y axis. Render-target convention of the
    /// downstream pass; an explicit flag rather than something inferred
    /// from anti-aliasing settings.
    pub flip_y: bool,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            grid_size_log2: DEFAULT_GRID_SIZE_LOG2,
            flip_y: false,
        }
    }
}

impl MeshConfig {
    /// Grid cells per axis.
    pub fn grid_size(&self) -> u32 {
        1 << self.grid_size_log2
    }
}

/// One vertex of the distortion mesh.
///
/// The fade scalar rides its own attribute rather than being packed into a
/// position.z channel, keeping the position strictly 2D clip space.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DistortionVertex {
    /// Clip-space position, both axes in [-1, 1].
    pub position: [f32; 2],
    /// Warped texture coordinate, clamped to [0, 1].
    pub uv: [f32; 2],
    /// Edge fade in [0, 1]; multiplies the sampled color to black out the
    /// border where the warp runs off the source texture.
    pub fade: f32,
}

impl DistortionVertex {
    /// Vertex buffer layout for the mesh distortion pipeline.
    pub fn buffer_layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<DistortionVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                // Position
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                // UV
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                // Fade
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32,
                },
            ],
        }
    }
}

/// A generated distortion mesh. Immutable once built; regenerated wholesale
/// when parameters change.
#[derive(Clone, Debug, PartialEq)]
pub struct DistortionMesh {
    pub vertices: Vec<DistortionVertex>,
    pub indices: Vec<u32>,
    grid_size: u32,
}

impl DistortionMesh {
    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Raw vertex bytes for GPU upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Raw index bytes for GPU upload.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// De-interleaves a Morton (Z-order) index into grid coordinates.
/// Even bits form x, odd bits form y.
fn morton_decode(index: u32) -> (u32, u32) {
    let mut x = 0;
    let mut y = 0;
    for bit in 0..16 {
        x |= ((index >> (2 * bit)) & 1) << bit;
        y |= ((index >> (2 * bit + 1)) & 1) << bit;
    }
    (x, y)
}

/// Linear ramp to zero over the outer 10% of clamped UV space, per axis,
/// combined by minimum. Exactly 0 at the texture border.
fn edge_fade(uv: Vec2) -> f32 {
    fn axis(v: f32) -> f32 {
        if v < 0.1 {
            v / 0.1
        } else if v > 0.9 {
            (1.0 - v) / 0.1
        } else {
            1.0
        }
    }
    axis(uv.x.clamp(0.0, 1.0)).min(axis(uv.y.clamp(0.0, 1.0)))
}

/// Generates the pre-distorted mesh for one eye.
///
/// The caller is responsible for keeping non-finite parameters out (see
/// [`crate::calibration::DeviceCalibration::validate`]); the generator
/// itself performs no validation.
pub fn generate(params: &DistortionParameters, config: &MeshConfig) -> DistortionMesh {
    assert!(
        (1..=8).contains(&config.grid_size_log2),
        "grid_size_log2 out of range: {}",
        config.grid_size_log2
    );
    let n = config.grid_size();
    let verts_per_row = n + 1;
    let mut vertices = Vec::with_capacity((verts_per_row * verts_per_row) as usize);

    for y in 0..=n {
        for x in 0..=n {
            let grid = Vec2::new(x as f32 / n as f32, y as f32 / n as f32);
            let uv = params.warp(grid).clamp(Vec2::ZERO, Vec2::ONE);

            let pos_x = grid.x * 2.0 - 1.0;
            let pos_y = if config.flip_y {
                (1.0 - grid.y) * 2.0 - 1.0
            } else {
                grid.y * 2.0 - 1.0
            };

            vertices.push(DistortionVertex {
                position: [pos_x, pos_y],
                uv: [uv.x, uv.y],
                fade: edge_fade(uv),
            });
        }
    }

    // Index the grid cells in Morton order rather than raster order for
    // better framebuffer, texture and vertex cache locality (0.325ms ->
    // 0.257ms for the full mesh draw on the target hardware).
    let mut indices = Vec::with_capacity((n * n * 6) as usize);
    for cell in 0..n * n {
        let (cx, cy) = morton_decode(cell);
        let first = cx * verts_per_row + cy;

        // Split the cell diagonal so that the top-left and bottom-right
        // quadrants go one way and the other two the opposite way:
        //
        // +---+---+
        // |  /|\  |
        // | / | \ |
        // |/  |  \|
        // +---+---+
        // |\  |  /|
        // | \ | / |
        // |  \|/  |
        // +---+---+
        //
        // Triangle edges then never span long distances across the warp,
        // which keeps the linear interpolation error low at this grid
        // resolution.
        if (cx < n / 2) != (cy < n / 2) {
            indices.extend_from_slice(&[
                first,
                first + 1,
                first + verts_per_row + 1,
                first + verts_per_row + 1,
                first + verts_per_row,
                first,
            ]);
        } else {
            indices.extend_from_slice(&[
                first,
                first + 1,
                first + verts_per_row,
                first + 1,
                first + verts_per_row + 1,
                first + verts_per_row,
            ]);
        }
    }

    DistortionMesh {
        vertices,
        indices,
        grid_size: n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use test_case::test_case;

    #[test]
    fn morton_decode_first_cells() {
        assert_eq!(morton_decode(0), (0, 0));
        assert_eq!(morton_decode(1), (1, 0));
        assert_eq!(morton_decode(2), (0, 1));
        assert_eq!(morton_decode(3), (1, 1));
        assert_eq!(morton_decode(4), (2, 0));
    }

    #[test]
    fn morton_decode_is_a_bijection_over_the_grid() {
        let n = 64;
        let mut seen = HashSet::new();
        for i in 0..n * n {
            let (x, y) = morton_decode(i);
            assert!(x < n && y < n, "cell {i} decoded out of range: ({x}, {y})");
            assert!(seen.insert((x, y)), "cell ({x}, {y}) visited twice");
        }
        assert_eq!(seen.len(), (n * n) as usize);
    }

    #[test]
    fn edge_fade_ramp() {
        assert_eq!(edge_fade(Vec2::new(0.0, 0.5)), 0.0);
        assert_eq!(edge_fade(Vec2::new(0.5, 0.0)), 0.0);
        assert_eq!(edge_fade(Vec2::new(0.5, 0.5)), 1.0);
        let mid = edge_fade(Vec2::new(0.05, 0.5));
        assert!((mid - 0.5).abs() < 1e-6);
        assert_eq!(edge_fade(Vec2::new(1.0, 0.5)), 0.0);
        assert_eq!(edge_fade(Vec2::new(1.0, 1.0)), 0.0);
    }

    #[test_case(1)]
    #[test_case(3)]
    #[test_case(6)]
    fn counts_match_grid_size(log2: u32) {
        let config = MeshConfig {
            grid_size_log2: log2,
            ..MeshConfig::default()
        };
        let mesh = generate(&DistortionParameters::default(), &config);
        let n = (1u32 << log2) as usize;
        assert_eq!(mesh.vertex_count(), (n + 1) * (n + 1));
        assert_eq!(mesh.triangle_count(), 2 * n * n);
        assert_eq!(mesh.indices.len(), 2 * n * n * 3);
    }

    #[test]
    fn generation_is_deterministic() {
        let params = DistortionParameters::default();
        let config = MeshConfig::default();
        let a = generate(&params, &config);
        let b = generate(&params, &config);
        assert_eq!(a.vertex_bytes(), b.vertex_bytes());
        assert_eq!(a.index_bytes(), b.index_bytes());
    }

    #[test]
    fn flip_y_mirrors_positions() {
        let params = DistortionParameters::default();
        let up = generate(
            &params,
            &MeshConfig {
                flip_y: false,
                ..MeshConfig::default()
            },
        );
        let down = generate(
            &params,
            &MeshConfig {
                flip_y: true,
                ..MeshConfig::default()
            },
        );
        for (a, b) in up.vertices.iter().zip(&down.vertices) {
            assert_eq!(a.position[0], b.position[0]);
            assert!((a.position[1] + b.position[1]).abs() < 1e-6);
            assert_eq!(a.uv, b.uv);
        }
    }

    #[test]
    fn vertex_layout_matches_struct() {
        let layout = DistortionVertex::buffer_layout();
        assert_eq!(
            layout.array_stride,
            std::mem::size_of::<DistortionVertex>() as u64
        );
        assert_eq!(layout.attributes.len(), 3);
    }
}

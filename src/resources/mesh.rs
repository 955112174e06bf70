//! Mesh data structures and generation
//!
//! Triangle winding is counter-clockwise seen from outside.

use crate::backend::types::{MeshDescriptor, PrimitiveTopology, Vertex};
use crate::bounds::BoundingRegion;
use glam::{Vec2, Vec3, Vec4};

/// A mesh with vertex and index data
#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub topology: PrimitiveTopology,
    pub name: String,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            topology: PrimitiveTopology::TriangleList,
            name: name.to_string(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn triangle_count(&self) -> usize {
        match self.topology {
            PrimitiveTopology::TriangleList => self.indices.len() / 3,
            _ => 0,
        }
    }

    /// Get vertex data as bytes
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Get index data as bytes
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Borrow the mesh for upload
    pub fn descriptor(&self) -> MeshDescriptor<'_> {
        MeshDescriptor {
            label: &self.name,
            vertices: &self.vertices,
            indices: &self.indices,
            topology: self.topology,
        }
    }

    /// Mesh-space extent of all vertex positions
    pub fn extent(&self) -> BoundingRegion {
        self.vertices
            .iter()
            .fold(BoundingRegion::EMPTY, |region, v| region.include(v.position))
    }

    /// Create a unit cube centered at origin
    pub fn cube() -> Self {
        let mut mesh = Mesh::new("cube");

        let faces = [
            (Vec3::Z, Vec3::X),
            (-Vec3::Z, -Vec3::X),
            (Vec3::X, -Vec3::Z),
            (-Vec3::X, Vec3::Z),
            (Vec3::Y, Vec3::X),
            (-Vec3::Y, Vec3::X),
        ];

        for (normal, tangent) in faces {
            let bitangent = normal.cross(tangent);
            let base = mesh.vertices.len() as u32;
            let quad = [
                (-0.5, -0.5, Vec2::new(0.0, 1.0)),
                (0.5, -0.5, Vec2::new(1.0, 1.0)),
                (0.5, 0.5, Vec2::new(1.0, 0.0)),
                (-0.5, 0.5, Vec2::new(0.0, 0.0)),
            ];
            for (u, v, uv) in quad {
                mesh.vertices.push(Vertex {
                    position: normal * 0.5 + tangent * u + bitangent * v,
                    normal,
                    uv,
                    tangent: tangent.extend(1.0),
                });
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        mesh
    }

    /// Create a UV sphere of diameter 1
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let mut mesh = Mesh::new("sphere");

        let segment_angle = 2.0 * std::f32::consts::PI / segments as f32;
        let ring_angle = std::f32::consts::PI / rings as f32;

        for ring in 0..=rings {
            let phi = ring as f32 * ring_angle;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for segment in 0..=segments {
                let theta = segment as f32 * segment_angle;
                let x = ring_radius * theta.cos();
                let z = ring_radius * theta.sin();

                mesh.vertices.push(Vertex {
                    position: Vec3::new(x, y, z) * 0.5,
                    normal: Vec3::new(x, y, z).normalize_or_zero(),
                    uv: Vec2::new(
                        segment as f32 / segments as f32,
                        ring as f32 / rings as f32,
                    ),
                    tangent: Vec4::new(-theta.sin(), 0.0, theta.cos(), 1.0),
                });
            }
        }

        for ring in 0..rings {
            for segment in 0..segments {
                let current = ring * (segments + 1) + segment;
                let next = current + segments + 1;

                mesh.indices.extend_from_slice(&[
                    current,
                    current + 1,
                    next,
                    current + 1,
                    next + 1,
                    next,
                ]);
            }
        }

        mesh
    }

    /// Create a plane on the XZ axis facing +Y
    pub fn plane(width: f32, depth: f32, subdivisions: u32) -> Self {
        let mut mesh = Mesh::new("plane");

        let half_width = width / 2.0;
        let half_depth = depth / 2.0;
        let step_x = width / subdivisions as f32;
        let step_z = depth / subdivisions as f32;

        for z in 0..=subdivisions {
            for x in 0..=subdivisions {
                mesh.vertices.push(Vertex {
                    position: Vec3::new(
                        -half_width + x as f32 * step_x,
                        0.0,
                        -half_depth + z as f32 * step_z,
                    ),
                    normal: Vec3::Y,
                    uv: Vec2::new(
                        x as f32 / subdivisions as f32,
                        z as f32 / subdivisions as f32,
                    ),
                    tangent: Vec4::new(1.0, 0.0, 0.0, 1.0),
                });
            }
        }

        mesh.indices = grid_indices(subdivisions + 1);
        mesh
    }

    /// Line list from segment endpoints
    pub fn line_list(name: &str, segments: &[(Vec3, Vec3)]) -> Self {
        let mut mesh = Mesh::new(name);
        mesh.topology = PrimitiveTopology::LineList;
        for (a, b) in segments {
            for position in [*a, *b] {
                mesh.indices.push(mesh.vertices.len() as u32);
                mesh.vertices.push(Vertex {
                    position,
                    normal: Vec3::Y,
                    uv: Vec2::ZERO,
                    tangent: Vec4::new(1.0, 0.0, 0.0, 1.0),
                });
            }
        }
        mesh
    }
}

/// Triangle indices for a `resolution` x `resolution` vertex grid laid out
/// row by row along +X, rows advancing along +Z. Faces point +Y.
pub fn grid_indices(resolution: u32) -> Vec<u32> {
    let cells = resolution.saturating_sub(1);
    let mut indices = Vec::with_capacity((cells * cells * 6) as usize);
    for z in 0..cells {
        for x in 0..cells {
            let current = z * resolution + x;
            let next = current + resolution;
            indices.extend_from_slice(&[current, next, current + 1, current + 1, next, next + 1]);
        }
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_outward(mesh: &Mesh) {
        for tri in mesh.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| mesh.vertices[tri[i] as usize].position);
            let normal = (b - a).cross(c - a);
            if normal.length_squared() < 1e-10 {
                continue;
            }
            let centroid = (a + b + c) / 3.0;
            assert!(normal.dot(centroid) > 0.0, "inward triangle {tri:?}");
        }
    }

    #[test]
    fn test_cube_winding_and_extent() {
        let cube = Mesh::cube();
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.triangle_count(), 12);
        assert_outward(&cube);
        let extent = cube.extent();
        assert_eq!(extent.min, Vec3::splat(-0.5));
        assert_eq!(extent.max, Vec3::splat(0.5));
    }

    #[test]
    fn test_sphere_winding() {
        assert_outward(&Mesh::sphere(16, 12));
    }

    #[test]
    fn test_plane_faces_up() {
        let plane = Mesh::plane(2.0, 2.0, 2);
        for tri in plane.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| plane.vertices[tri[i] as usize].position);
            assert!((b - a).cross(c - a).y > 0.0);
        }
    }

    #[test]
    fn test_line_list() {
        let lines = Mesh::line_list("axes", &[(Vec3::ZERO, Vec3::X), (Vec3::ZERO, Vec3::Y)]);
        assert_eq!(lines.topology, PrimitiveTopology::LineList);
        assert_eq!(lines.index_count(), 4);
        assert_eq!(lines.triangle_count(), 0);
    }
}

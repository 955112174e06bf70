//! Heightmap terrain chunks and seam stitching

use std::path::Path;
use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};
use image::DynamicImage;

use crate::backend::types::Vertex;
use crate::bounds::BoundingRegion;
use crate::resources::{grid_indices, Mesh};
use crate::scene::ChunkCoords;

/// Square height grid covering one chunk
///
/// Vertices are laid out row by row along +X, rows advancing along +Z. The
/// last row and column sit on the neighbouring chunk's first row and column.
#[derive(Debug, Clone)]
pub struct TerrainChunk {
    pub coords: ChunkCoords,
    pub size: f32,
    pub resolution: u32,
    heights: Vec<f32>,
    normals: Vec<Vec3>,
    tangents: Vec<Vec3>,
    mesh: Arc<Mesh>,
}

/// Already-loaded cardinal neighbours of a chunk
#[derive(Debug, Default, Clone, Copy)]
pub struct TerrainNeighbors<'a> {
    /// `z + 1`
    pub north: Option<&'a TerrainChunk>,
    /// `z - 1`
    pub south: Option<&'a TerrainChunk>,
    /// `x + 1`
    pub east: Option<&'a TerrainChunk>,
    /// `x - 1`
    pub west: Option<&'a TerrainChunk>,
}

impl TerrainChunk {
    /// Sample `height(world_x, world_z)` on a `resolution` x `resolution` grid
    pub fn from_fn<F>(coords: ChunkCoords, size: f32, resolution: u32, height: F) -> Self
    where
        F: Fn(f32, f32) -> f32,
    {
        let resolution = resolution.max(2);
        let origin = coords.origin(size);
        let step = size / (resolution - 1) as f32;
        let mut heights = Vec::with_capacity((resolution * resolution) as usize);
        for z in 0..resolution {
            for x in 0..resolution {
                heights.push(height(origin.x + x as f32 * step, origin.y + z as f32 * step));
            }
        }
        Self::from_heights(coords, size, resolution, heights)
    }

    /// Grayscale heightmap resampled to `resolution`, white mapping to `height_scale`
    pub fn from_heightmap_image(
        coords: ChunkCoords,
        size: f32,
        resolution: u32,
        image: &DynamicImage,
        height_scale: f32,
    ) -> Self {
        let luma = image.to_luma8();
        let resolution = resolution.max(2);
        let (w, h) = luma.dimensions();
        let mut heights = Vec::with_capacity((resolution * resolution) as usize);
        for z in 0..resolution {
            for x in 0..resolution {
                let px = (x * (w.max(1) - 1)) / (resolution - 1);
                let py = (z * (h.max(1) - 1)) / (resolution - 1);
                heights.push(luma.get_pixel(px, py).0[0] as f32 / 255.0 * height_scale);
            }
        }
        Self::from_heights(coords, size, resolution, heights)
    }

    pub fn from_heightmap_file<P: AsRef<Path>>(
        coords: ChunkCoords,
        size: f32,
        resolution: u32,
        path: P,
        height_scale: f32,
    ) -> Result<Self, image::ImageError> {
        let image = image::open(path)?;
        Ok(Self::from_heightmap_image(coords, size, resolution, &image, height_scale))
    }

    fn from_heights(coords: ChunkCoords, size: f32, resolution: u32, heights: Vec<f32>) -> Self {
        let mut chunk = Self {
            coords,
            size,
            resolution,
            heights,
            normals: Vec::new(),
            tangents: Vec::new(),
            mesh: Arc::new(Mesh::new("terrain")),
        };
        chunk.compute_normals();
        chunk.rebuild_mesh();
        chunk
    }

    fn index(&self, x: u32, z: u32) -> usize {
        (z * self.resolution + x) as usize
    }

    fn step(&self) -> f32 {
        self.size / (self.resolution - 1) as f32
    }

    /// Central differences, one-sided on the border
    fn compute_normals(&mut self) {
        let res = self.resolution;
        let step = self.step();
        let count = (res * res) as usize;
        self.normals = vec![Vec3::Y; count];
        self.tangents = vec![Vec3::X; count];

        for z in 0..res {
            for x in 0..res {
                let (x0, x1) = (x.saturating_sub(1), (x + 1).min(res - 1));
                let (z0, z1) = (z.saturating_sub(1), (z + 1).min(res - 1));
                let dx = (self.heights[self.index(x1, z)] - self.heights[self.index(x0, z)])
                    / ((x1 - x0) as f32 * step);
                let dz = (self.heights[self.index(x, z1)] - self.heights[self.index(x, z0)])
                    / ((z1 - z0) as f32 * step);

                let i = self.index(x, z);
                self.normals[i] = Vec3::new(-dx, 1.0, -dz).normalize();
                self.tangents[i] = Vec3::new(1.0, dx, 0.0).normalize();
            }
        }
    }

    pub fn height(&self, x: u32, z: u32) -> f32 {
        self.heights[self.index(x, z)]
    }

    pub fn normal(&self, x: u32, z: u32) -> Vec3 {
        self.normals[self.index(x, z)]
    }

    /// Bilinear height at a world position, `None` outside the chunk
    pub fn height_at(&self, world_x: f32, world_z: f32) -> Option<f32> {
        let origin = self.coords.origin(self.size);
        let gx = (world_x - origin.x) / self.step();
        let gz = (world_z - origin.y) / self.step();
        let max = (self.resolution - 1) as f32;
        if !(0.0..=max).contains(&gx) || !(0.0..=max).contains(&gz) {
            return None;
        }
        let (x0, z0) = (gx.floor().min(max - 1.0) as u32, gz.floor().min(max - 1.0) as u32);
        let (tx, tz) = (gx - x0 as f32, gz - z0 as f32);
        let top = self.height(x0, z0) * (1.0 - tx) + self.height(x0 + 1, z0) * tx;
        let bottom = self.height(x0, z0 + 1) * (1.0 - tx) + self.height(x0 + 1, z0 + 1) * tx;
        Some(top * (1.0 - tz) + bottom * tz)
    }

    pub fn region(&self) -> BoundingRegion {
        let origin = self.coords.origin(self.size);
        let (lo, hi) = self
            .heights
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), h| (lo.min(*h), hi.max(*h)));
        BoundingRegion::new(
            Vec3::new(origin.x, lo, origin.y),
            Vec3::new(origin.x + self.size, hi, origin.y + self.size),
        )
    }

    /// World-space mesh, rebuilt whenever heights change
    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    fn rebuild_mesh(&mut self) {
        let origin = self.coords.origin(self.size);
        let step = self.step();
        let res = self.resolution;
        let mut mesh = Mesh::new(&format!("terrain({}, {})", self.coords.x, self.coords.z));
        mesh.vertices.reserve((res * res) as usize);
        for z in 0..res {
            for x in 0..res {
                let i = self.index(x, z);
                mesh.vertices.push(Vertex {
                    position: Vec3::new(
                        origin.x + x as f32 * step,
                        self.heights[i],
                        origin.y + z as f32 * step,
                    ),
                    normal: self.normals[i],
                    uv: Vec2::new(x as f32, z as f32) / (res - 1) as f32,
                    tangent: Vec4::from((self.tangents[i], 1.0)),
                });
            }
        }
        mesh.indices = grid_indices(res);
        self.mesh = Arc::new(mesh);
    }

    /// Copy `(heights, normals, tangents)` at `src` of `from` onto `dst` of self
    fn copy_vertex(&mut self, dst: (u32, u32), from: &TerrainChunk, src: (u32, u32)) {
        let d = self.index(dst.0, dst.1);
        let s = from.index(src.0, src.1);
        self.heights[d] = from.heights[s];
        self.normals[d] = from.normals[s];
        self.tangents[d] = from.tangents[s];
    }
}

/// Overwrite border vertices with the matching border of each loaded
/// neighbour. Returns the number of edges stitched.
///
/// Neighbours with a different resolution are skipped. Neighbours are left
/// untouched.
pub fn stitch_terrain_edges(chunk: &mut TerrainChunk, neighbors: &TerrainNeighbors) -> usize {
    let last = chunk.resolution - 1;
    let mut stitched = 0;

    let edges: [(Option<&TerrainChunk>, fn(u32, u32) -> ((u32, u32), (u32, u32))); 4] = [
        (neighbors.north, |i, last| ((i, last), (i, 0))),
        (neighbors.south, |i, last| ((i, 0), (i, last))),
        (neighbors.east, |i, last| ((last, i), (0, i))),
        (neighbors.west, |i, last| ((0, i), (last, i))),
    ];

    for (neighbor, map) in edges {
        let Some(neighbor) = neighbor else {
            continue;
        };
        if neighbor.resolution != chunk.resolution {
            log::warn!(
                "Terrain ({}, {}) not stitched to ({}, {}): resolution {} != {}",
                chunk.coords.x,
                chunk.coords.z,
                neighbor.coords.x,
                neighbor.coords.z,
                chunk.resolution,
                neighbor.resolution
            );
            continue;
        }
        for i in 0..=last {
            let (dst, src) = map(i, last);
            chunk.copy_vertex(dst, neighbor, src);
        }
        stitched += 1;
    }

    if stitched > 0 {
        chunk.rebuild_mesh();
    }
    stitched
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hills(x: f32, z: f32) -> f32 {
        (x * 0.3).sin() * 2.0 + (z * 0.2).cos()
    }

    #[test]
    fn test_flat_terrain_normals_point_up() {
        let chunk = TerrainChunk::from_fn(ChunkCoords::new(0, 0), 16.0, 9, |_, _| 3.0);
        assert_eq!(chunk.normal(4, 4), Vec3::Y);
        assert_eq!(chunk.height_at(5.0, 5.0), Some(3.0));
        assert_eq!(chunk.height_at(-1.0, 5.0), None);
        assert_eq!(chunk.mesh().triangle_count(), 8 * 8 * 2);
    }

    #[test]
    fn test_height_at_interpolates() {
        let chunk = TerrainChunk::from_fn(ChunkCoords::new(1, 0), 8.0, 9, |x, _| x);
        let h = chunk.height_at(10.5, 3.0).unwrap();
        assert!((h - 10.5).abs() < 1e-4);
    }

    #[test]
    fn test_stitch_copies_neighbor_border() {
        let mut center = TerrainChunk::from_fn(ChunkCoords::new(0, 0), 16.0, 5, |_, _| 0.0);
        let north = TerrainChunk::from_fn(ChunkCoords::new(0, 1), 16.0, 5, hills);
        let east = TerrainChunk::from_fn(ChunkCoords::new(1, 0), 16.0, 5, hills);
        let before = Arc::clone(center.mesh());

        let stitched = stitch_terrain_edges(
            &mut center,
            &TerrainNeighbors {
                north: Some(&north),
                east: Some(&east),
                ..Default::default()
            },
        );
        assert_eq!(stitched, 2);
        for i in 0..5 {
            assert_eq!(center.height(i, 4), north.height(i, 0));
            assert_eq!(center.normal(i, 4), north.normal(i, 0));
            assert_eq!(center.height(4, i), east.height(0, i));
        }
        assert_eq!(center.height(0, 0), 0.0);
        assert!(!Arc::ptr_eq(&before, center.mesh()));
    }

    #[test]
    fn test_stitch_skips_mismatched_resolution() {
        let mut center = TerrainChunk::from_fn(ChunkCoords::new(0, 0), 16.0, 5, |_, _| 0.0);
        let west = TerrainChunk::from_fn(ChunkCoords::new(-1, 0), 16.0, 9, hills);
        let neighbors = TerrainNeighbors {
            west: Some(&west),
            ..Default::default()
        };
        assert_eq!(stitch_terrain_edges(&mut center, &neighbors), 0);
    }

    #[test]
    fn test_heightmap_image() {
        let img = DynamicImage::ImageLuma8(image::GrayImage::from_fn(4, 4, |x, _| {
            image::Luma([(x * 85) as u8])
        }));
        let chunk = TerrainChunk::from_heightmap_image(ChunkCoords::new(0, 0), 8.0, 4, &img, 10.0);
        assert_eq!(chunk.height(0, 0), 0.0);
        assert_eq!(chunk.height(3, 2), 10.0);
    }
}

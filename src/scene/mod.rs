//! Scene management
//!
//! The world is split into square [`Chunk`]s on the XZ plane, stored by a
//! spatial hash of their coordinates. Traversals walk chunks nearest-first and
//! delegate ordering inside a chunk to the chunk's sorted permutations.

mod camera;
mod camera_controller;
mod chunk;
mod light;
mod model;
mod terrain;
mod transform;

pub use camera::*;
pub use camera_controller::*;
pub use chunk::*;
pub use light::*;
pub use model::*;
pub use terrain::*;
pub use transform::*;

use std::collections::HashMap;

use glam::Vec3;
use thiserror::Error;

use crate::backend::traits::{BackendResult, GraphicsBackend};
use crate::bounds::Ray;
use crate::resources::GpuCache;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("chunk {incoming:?} hashes to {key:#010x}, already used by chunk {existing:?}")]
    ChunkHashCollision {
        key: ChunkKey,
        existing: ChunkCoords,
        incoming: ChunkCoords,
    },
    #[error("chunk {0:?} is already loaded")]
    ChunkAlreadyLoaded(ChunkCoords),
}

pub type SceneResult<T> = Result<T, SceneError>;

/// Result of one [`Scene::stream_chunks`] call
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    pub loaded: usize,
    pub evicted: usize,
    pub rejected: usize,
}

#[derive(Debug)]
pub struct Scene {
    chunks: HashMap<ChunkKey, Chunk>,
    pub camera: Camera,
    pub controller: FreeFlyController,
    pub shadow_camera: ShadowCamera,
    pub directional_light: DirectionalLight,
    chunk_size: f32,
    /// Chebyshev radius, in chunks, kept loaded around the streaming center
    view_distance: u32,
}

impl Scene {
    pub fn new(chunk_size: f32, view_distance: u32) -> Self {
        let camera = Camera::default();
        let mut controller = FreeFlyController::new();
        controller.sync_with_camera(&camera);
        Self {
            chunks: HashMap::new(),
            camera,
            controller,
            shadow_camera: ShadowCamera::default(),
            directional_light: DirectionalLight::default(),
            chunk_size,
            view_distance,
        }
    }

    pub fn chunk_size(&self) -> f32 {
        self.chunk_size
    }

    pub fn view_distance(&self) -> u32 {
        self.view_distance
    }

    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
        self.camera.update();
        self.controller.sync_with_camera(&self.camera);
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn model_count(&self) -> usize {
        self.chunks.values().map(Chunk::model_count).sum()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    /// Loaded chunk at `coords`; a colliding chunk with other coordinates is not returned
    pub fn chunk(&self, coords: ChunkCoords) -> Option<&Chunk> {
        self.chunks
            .get(&chunk_key(coords))
            .filter(|chunk| chunk.coords() == coords)
    }

    pub fn chunk_mut(&mut self, coords: ChunkCoords) -> Option<&mut Chunk> {
        self.chunks
            .get_mut(&chunk_key(coords))
            .filter(|chunk| chunk.coords() == coords)
    }

    /// Chunk containing a world position
    pub fn chunk_at(&self, position: Vec3) -> Option<&Chunk> {
        self.chunk(ChunkCoords::from_position(position, self.chunk_size))
    }

    /// Add a chunk, stitching its terrain to already-loaded neighbours.
    ///
    /// A hash collision is logged and the incoming chunk discarded.
    pub fn insert_chunk(&mut self, mut chunk: Chunk) -> SceneResult<ChunkKey> {
        let coords = chunk.coords();
        let key = chunk.key();
        if let Some(existing) = self.chunks.get(&key) {
            if existing.coords() == coords {
                return Err(SceneError::ChunkAlreadyLoaded(coords));
            }
            let error = SceneError::ChunkHashCollision {
                key,
                existing: existing.coords(),
                incoming: coords,
            };
            log::error!("{}", error);
            return Err(error);
        }

        if let Some(terrain) = chunk.terrain.as_mut() {
            let scene: &Scene = self;
            let neighbor = move |dx: i32, dz: i32| {
                scene
                    .chunk(coords.offset(dx, dz))
                    .and_then(|c| c.terrain.as_ref())
            };
            let neighbors = TerrainNeighbors {
                north: neighbor(0, 1),
                south: neighbor(0, -1),
                east: neighbor(1, 0),
                west: neighbor(-1, 0),
            };
            let stitched = stitch_terrain_edges(terrain, &neighbors);
            if stitched > 0 {
                log::trace!("Stitched {} terrain edges of chunk {:?}", stitched, coords);
            }
        }

        self.chunks.insert(key, chunk);
        Ok(key)
    }

    pub fn remove_chunk(&mut self, coords: ChunkCoords) -> Option<Chunk> {
        let key = chunk_key(coords);
        match self.chunks.get(&key) {
            Some(chunk) if chunk.coords() == coords => self.chunks.remove(&key),
            _ => None,
        }
    }

    fn chunk_or_insert(&mut self, coords: ChunkCoords) -> SceneResult<&mut Chunk> {
        if self.chunk(coords).is_none() {
            self.insert_chunk(Chunk::new(coords, self.chunk_size))?;
        }
        self.chunk_mut(coords)
            .ok_or(SceneError::ChunkAlreadyLoaded(coords))
    }

    /// Place a model in the chunk containing its bounds center
    pub fn add_model(&mut self, model: Model) -> SceneResult<ModelHandle> {
        let coords = ChunkCoords::from_position(model.aabb().center(), self.chunk_size);
        let handle = model_handle(model);
        self.chunk_or_insert(coords)?.add_model(handle.clone());
        Ok(handle)
    }

    pub fn remove_model(&mut self, handle: &ModelHandle) -> bool {
        self.chunks
            .values_mut()
            .any(|chunk| chunk.remove_model(handle))
    }

    pub fn add_light(&mut self, light: PointLight) -> SceneResult<LightHandle> {
        let coords = ChunkCoords::from_position(light.position, self.chunk_size);
        let handle = light_handle(Light::Point(light));
        self.chunk_or_insert(coords)?.add_light(handle.clone());
        Ok(handle)
    }

    pub fn add_line_model(&mut self, line_model: LineModel) -> SceneResult<()> {
        let coords = ChunkCoords::from_position(line_model.center(), self.chunk_size);
        self.chunk_or_insert(coords)?.add_line_model(line_model);
        Ok(())
    }

    /// Load missing chunks around `center` nearest-first and evict those out of range
    pub fn stream_chunks<G>(&mut self, center: Vec3, mut generator: G) -> StreamStats
    where
        G: FnMut(ChunkCoords, f32) -> Chunk,
    {
        let origin = ChunkCoords::from_position(center, self.chunk_size);
        let radius = self.view_distance as i32;
        let mut stats = StreamStats::default();

        let out_of_range: Vec<ChunkCoords> = self
            .chunks
            .values()
            .map(Chunk::coords)
            .filter(|c| chebyshev(*c, origin) > radius)
            .collect();
        for coords in out_of_range {
            self.remove_chunk(coords);
            stats.evicted += 1;
        }

        let mut wanted = Vec::new();
        for dz in -radius..=radius {
            for dx in -radius..=radius {
                let coords = origin.offset(dx, dz);
                if self.chunk(coords).is_none() {
                    wanted.push(coords);
                }
            }
        }
        wanted.sort_by_key(|c| {
            let dx = (c.x - origin.x) as i64;
            let dz = (c.z - origin.z) as i64;
            (dx * dx + dz * dz, *c)
        });

        for coords in wanted {
            match self.insert_chunk(generator(coords, self.chunk_size)) {
                Ok(_) => stats.loaded += 1,
                Err(_) => stats.rejected += 1,
            }
        }

        if stats.loaded + stats.evicted > 0 {
            log::debug!(
                "Streamed chunks around {:?}: {} loaded, {} evicted, {} rejected",
                origin,
                stats.loaded,
                stats.evicted,
                stats.rejected
            );
        }
        stats
    }

    /// Per-frame update: camera, dynamic bounds, shadow fit and sorting
    pub fn update(&mut self, dt: f32, input: &CameraInput) {
        self.controller.update(&mut self.camera, input, dt);
        self.camera.update();

        for chunk in self.chunks.values_mut() {
            chunk.refresh_dynamic();
        }
        self.shadow_camera
            .fit_view(self.directional_light.direction, &self.camera.frustum);
        self.sort(self.camera.position);
    }

    /// Sort every chunk's model permutations by distance to `position`
    pub fn sort(&mut self, position: Vec3) {
        for chunk in self.chunks.values_mut() {
            chunk.sort_models(position);
        }
    }

    /// Chunks ordered by distance from the camera, nearest first
    fn chunks_by_distance(&self) -> Vec<&Chunk> {
        let position = self.camera.position;
        let mut chunks: Vec<&Chunk> = self.chunks.values().collect();
        chunks.sort_by(|a, b| {
            a.region()
                .distance_squared(position)
                .total_cmp(&b.region().distance_squared(position))
                .then(a.coords().cmp(&b.coords()))
        });
        chunks
    }

    /// Visit models across chunks; see [`Chunk::traverse_models`]
    pub fn traverse_models<V, P>(
        &self,
        mut visitor: V,
        mut predicate: P,
        order: Order,
        category: Category,
    ) -> usize
    where
        V: FnMut(&ModelHandle),
        P: FnMut(&Model) -> bool,
    {
        let mut chunks = self.chunks_by_distance();
        if order == Order::BackToFront {
            chunks.reverse();
        }
        chunks
            .into_iter()
            .map(|chunk| chunk.traverse_models(&mut visitor, &mut predicate, order, category))
            .sum()
    }

    pub fn traverse_lights<V, P>(&self, mut visitor: V, mut predicate: P) -> usize
    where
        V: FnMut(&LightHandle),
        P: FnMut(&Light) -> bool,
    {
        self.chunks_by_distance()
            .into_iter()
            .map(|chunk| chunk.traverse_lights(&mut visitor, &mut predicate))
            .sum()
    }

    pub fn traverse_line_models<V: FnMut(&LineModel)>(&self, mut visitor: V) {
        for chunk in self.chunks_by_distance() {
            chunk.line_models().iter().for_each(&mut visitor);
        }
    }

    pub fn is_in_frustum(&self, light: &PointLight) -> bool {
        self.camera
            .frustum
            .collides_sphere(light.position, light.radius)
    }

    /// Snapshot of point lights whose volume touches the view frustum
    pub fn visible_lights(&self) -> Vec<PointLight> {
        let mut lights = Vec::new();
        self.traverse_lights(
            |light| {
                if let Some(point) = light.read().as_point() {
                    lights.push(point.clone());
                }
            },
            |light| light.as_point().is_some_and(|p| self.is_in_frustum(p)),
        );
        lights
    }

    /// Closest visible model hit by `ray`, with the hit distance
    pub fn pick(&self, ray: &Ray) -> Option<(ModelHandle, f32)> {
        let mut best: Option<(ModelHandle, f32)> = None;
        self.traverse_models(
            |handle| {
                let Some(hit) = handle.read().ray_collides(ray) else {
                    return;
                };
                let distance = hit.distance();
                if best.as_ref().map_or(true, |(_, d)| distance < *d) {
                    best = Some((handle.clone(), distance));
                }
            },
            |model| model.visible,
            Order::Irrelevant,
            Category::Irrelevant,
        );
        best
    }

    /// Make sure every loaded chunk has its GPU resources
    pub fn upload<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        cache: &mut GpuCache,
    ) -> BackendResult<()> {
        for chunk in self.chunks.values() {
            chunk.upload(backend, cache)?;
        }
        Ok(())
    }
}

fn chebyshev(a: ChunkCoords, b: ChunkCoords) -> i32 {
    (a.x.wrapping_sub(b.x))
        .wrapping_abs()
        .max(a.z.wrapping_sub(b.z).wrapping_abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Material, Mesh};
    use std::sync::Arc;

    fn cube_at(position: Vec3) -> Model {
        Model::new(
            "cube",
            Arc::new(Mesh::cube()),
            Arc::new(Material::default()),
            Transform::from_position(position),
        )
    }

    #[test]
    fn test_models_land_in_their_chunk() {
        let mut scene = Scene::new(32.0, 1);
        scene.add_model(cube_at(Vec3::new(5.0, 0.0, 5.0))).unwrap();
        scene.add_model(cube_at(Vec3::new(40.0, 0.0, -5.0))).unwrap();

        assert_eq!(scene.chunk_count(), 2);
        assert_eq!(scene.model_count(), 2);
        assert!(scene.chunk(ChunkCoords::new(0, 0)).is_some());
        assert!(scene.chunk(ChunkCoords::new(1, -1)).is_some());
    }

    #[test]
    fn test_colliding_chunk_is_rejected() {
        let mut scene = Scene::new(32.0, 1);
        let a = ChunkCoords::new(0, 1);
        let b = ChunkCoords::new(-32_917_205, 0);
        scene.insert_chunk(Chunk::new(a, 32.0)).unwrap();

        let err = scene.insert_chunk(Chunk::new(b, 32.0)).unwrap_err();
        assert!(matches!(err, SceneError::ChunkHashCollision { existing, incoming, .. } if existing == a && incoming == b));
        assert_eq!(scene.chunk_count(), 1);
        assert!(scene.chunk(b).is_none());
        assert_eq!(
            scene.insert_chunk(Chunk::new(a, 32.0)),
            Err(SceneError::ChunkAlreadyLoaded(a))
        );
    }

    #[test]
    fn test_stream_loads_and_evicts() {
        let mut scene = Scene::new(16.0, 1);
        let stats = scene.stream_chunks(Vec3::ZERO, Chunk::new);
        assert_eq!(stats.loaded, 9);

        let stats = scene.stream_chunks(Vec3::new(16.0 * 5.0, 0.0, 0.0), Chunk::new);
        assert_eq!(stats.evicted, 9);
        assert_eq!(stats.loaded, 9);
        assert!(scene.chunk(ChunkCoords::new(5, 0)).is_some());
    }

    #[test]
    fn test_pick_returns_closest() {
        let mut scene = Scene::new(32.0, 1);
        scene.add_model(cube_at(Vec3::new(0.0, 0.0, -10.0))).unwrap();
        let near = scene.add_model(cube_at(Vec3::new(0.0, 0.0, -4.0))).unwrap();

        let (hit, distance) = scene.pick(&Ray::new(Vec3::ZERO, -Vec3::Z)).unwrap();
        assert!(Arc::ptr_eq(&hit, &near));
        assert!((distance - 3.5).abs() < 1e-4);
        assert!(scene.pick(&Ray::new(Vec3::ZERO, Vec3::Y)).is_none());
    }

    #[test]
    fn test_visible_lights_culls_behind_camera() {
        let mut scene = Scene::new(32.0, 1);
        scene.set_camera(Camera::new(Vec3::ZERO, -Vec3::Z));
        scene
            .add_light(PointLight::new(Vec3::new(0.0, 0.0, -10.0), Vec3::ONE, 1.0, 2.0))
            .unwrap();
        scene
            .add_light(PointLight::new(Vec3::new(0.0, 0.0, 40.0), Vec3::ONE, 1.0, 2.0))
            .unwrap();

        let visible = scene.visible_lights();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].position.z, -10.0);
    }
}

//! World chunks: the unit of streaming, sorting and spatial indexing

use std::cmp::Ordering;

use glam::{Vec2, Vec3};

use crate::backend::traits::{BackendResult, GraphicsBackend};
use crate::bounds::BoundingRegion;
use crate::resources::GpuCache;
use crate::scene::light::LightHandle;
use crate::scene::model::{LineModel, Model, ModelHandle, ModelRef};
use crate::scene::terrain::TerrainChunk;
use crate::spatial::{Octree, RangeQuery};

/// Vertical half-extent of a chunk's region
pub const CHUNK_HEIGHT: f32 = 512.0;

/// Octree over model world boxes: 16 objects per cell, 6 levels
pub type ModelOctree = Octree<BoundingRegion, ModelRef, 16, 6>;

/// Integer chunk grid position on the XZ plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoords {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoords {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing a world position
    pub fn from_position(position: Vec3, chunk_size: f32) -> Self {
        Self::new(
            (position.x / chunk_size).floor() as i32,
            (position.z / chunk_size).floor() as i32,
        )
    }

    /// World `(x, z)` of the chunk's minimum corner
    pub fn origin(&self, chunk_size: f32) -> Vec2 {
        Vec2::new(self.x as f32, self.z as f32) * chunk_size
    }

    pub fn region(&self, chunk_size: f32) -> BoundingRegion {
        let origin = self.origin(chunk_size);
        BoundingRegion::new(
            Vec3::new(origin.x, -CHUNK_HEIGHT, origin.y),
            Vec3::new(origin.x + chunk_size, CHUNK_HEIGHT, origin.y + chunk_size),
        )
    }

    pub fn offset(&self, dx: i32, dz: i32) -> Self {
        Self::new(self.x.wrapping_add(dx), self.z.wrapping_add(dz))
    }
}

/// Spatial hash of chunk coordinates; distinct coordinates may collide
pub type ChunkKey = u32;

pub fn chunk_key(coords: ChunkCoords) -> ChunkKey {
    (coords.x.wrapping_mul(73_856_093) ^ coords.z.wrapping_mul(19_349_663)) as u32
}

/// Traversal ordering by squared camera distance, as of the last sort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Irrelevant,
    FrontToBack,
    BackToFront,
}

/// Which model list a traversal visits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Opaque,
    Blend,
    Irrelevant,
}

#[derive(Debug)]
pub struct Chunk {
    coords: ChunkCoords,
    key: ChunkKey,
    region: BoundingRegion,
    pub terrain: Option<TerrainChunk>,
    models: Vec<ModelHandle>,
    blend_models: Vec<ModelHandle>,
    /// Permutations into `models` / `blend_models`; sorting only touches these
    models_order: Vec<usize>,
    blend_models_order: Vec<usize>,
    distances: Vec<f32>,
    blend_distances: Vec<f32>,
    line_models: Vec<LineModel>,
    lights: Vec<LightHandle>,
    octree: ModelOctree,
    /// Inserts since the last octree propagation
    pending: usize,
}

impl Chunk {
    pub fn new(coords: ChunkCoords, chunk_size: f32) -> Self {
        let region = coords.region(chunk_size);
        Self {
            coords,
            key: chunk_key(coords),
            region,
            terrain: None,
            models: Vec::new(),
            blend_models: Vec::new(),
            models_order: Vec::new(),
            blend_models_order: Vec::new(),
            distances: Vec::new(),
            blend_distances: Vec::new(),
            line_models: Vec::new(),
            lights: Vec::new(),
            octree: ModelOctree::new(region),
            pending: 0,
        }
    }

    pub fn with_terrain(mut self, terrain: TerrainChunk) -> Self {
        self.terrain = Some(terrain);
        self
    }

    pub fn coords(&self) -> ChunkCoords {
        self.coords
    }

    pub fn key(&self) -> ChunkKey {
        self.key
    }

    pub fn region(&self) -> &BoundingRegion {
        &self.region
    }

    pub fn models(&self) -> &[ModelHandle] {
        &self.models
    }

    pub fn blend_models(&self) -> &[ModelHandle] {
        &self.blend_models
    }

    pub fn models_order(&self) -> &[usize] {
        &self.models_order
    }

    pub fn blend_models_order(&self) -> &[usize] {
        &self.blend_models_order
    }

    pub fn model_count(&self) -> usize {
        self.models.len() + self.blend_models.len()
    }

    pub fn line_models(&self) -> &[LineModel] {
        &self.line_models
    }

    pub fn lights(&self) -> &[LightHandle] {
        &self.lights
    }

    pub fn octree(&self) -> &ModelOctree {
        &self.octree
    }

    /// Append a model to the opaque or blend list by its material.
    ///
    /// The octree entry stays unplaced until the next [`Chunk::refresh_dynamic`].
    pub fn add_model(&mut self, handle: ModelHandle) {
        let (is_blend, extent) = {
            let model = handle.read();
            (model.is_blend(), model.aabb().extent)
        };
        if is_blend {
            self.blend_models_order.push(self.blend_models.len());
            self.blend_distances.push(0.0);
            self.blend_models.push(handle.clone());
        } else {
            self.models_order.push(self.models.len());
            self.distances.push(0.0);
            self.models.push(handle.clone());
        }
        self.octree.insert(extent, ModelRef(handle));
        self.pending += 1;
    }

    /// Models inserted but not yet pushed down the octree
    pub fn pending_inserts(&self) -> usize {
        self.pending
    }

    /// Remove a model by identity; returns false when it is not in this chunk
    pub fn remove_model(&mut self, handle: &ModelHandle) -> bool {
        let removed = remove_indexed(
            &mut self.models,
            &mut self.models_order,
            &mut self.distances,
            handle,
        ) || remove_indexed(
            &mut self.blend_models,
            &mut self.blend_models_order,
            &mut self.blend_distances,
            handle,
        );
        if removed {
            self.octree.remove(&ModelRef(handle.clone()));
        }
        removed
    }

    pub fn add_line_model(&mut self, line_model: LineModel) {
        self.line_models.push(line_model);
    }

    pub fn add_light(&mut self, light: LightHandle) {
        self.lights.push(light);
    }

    /// Recompute camera distances and sort both permutations.
    ///
    /// Opaque ascending, blend descending. The model vectors keep their order.
    pub fn sort_models(&mut self, camera_position: Vec3) {
        for (distance, model) in self.distances.iter_mut().zip(&self.models) {
            *distance = model.read().distance_squared(camera_position);
        }
        for (distance, model) in self.blend_distances.iter_mut().zip(&self.blend_models) {
            *distance = model.read().distance_squared(camera_position);
        }

        let distances = &self.distances;
        self.models_order
            .sort_by(|a, b| distances[*a].total_cmp(&distances[*b]));
        let blend_distances = &self.blend_distances;
        self.blend_models_order
            .sort_by(|a, b| blend_distances[*b].total_cmp(&blend_distances[*a]));
    }

    /// Visit models passing `predicate`; returns the number visited.
    ///
    /// Orderings use the distances of the last [`Chunk::sort_models`]. With
    /// `Category::Irrelevant` and an ordering both lists are merged by distance.
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
        let mut visited = 0;
        let mut visit = |handle: &ModelHandle| {
            if predicate(&handle.read()) {
                visitor(handle);
                visited += 1;
            }
        };

        // Both sequences ascending by distance.
        let opaque = self.models_order.iter().map(|i| (self.distances[*i], &self.models[*i]));
        let blend = self
            .blend_models_order
            .iter()
            .rev()
            .map(|i| (self.blend_distances[*i], &self.blend_models[*i]));

        match (order, category) {
            (Order::Irrelevant, Category::Opaque) => self.models.iter().for_each(&mut visit),
            (Order::Irrelevant, Category::Blend) => self.blend_models.iter().for_each(&mut visit),
            (Order::Irrelevant, Category::Irrelevant) => self
                .models
                .iter()
                .chain(&self.blend_models)
                .for_each(&mut visit),
            (Order::FrontToBack, Category::Opaque) => opaque.for_each(|(_, m)| visit(m)),
            (Order::BackToFront, Category::Opaque) => opaque.rev().for_each(|(_, m)| visit(m)),
            (Order::FrontToBack, Category::Blend) => blend.for_each(|(_, m)| visit(m)),
            (Order::BackToFront, Category::Blend) => blend.rev().for_each(|(_, m)| visit(m)),
            (order, Category::Irrelevant) => {
                let mut merged: Vec<(f32, &ModelHandle)> = merge_ascending(opaque, blend);
                if order == Order::BackToFront {
                    merged.reverse();
                }
                merged.into_iter().for_each(|(_, m)| visit(m));
            }
        }
        visited
    }

    pub fn traverse_lights<V, P>(&self, mut visitor: V, mut predicate: P) -> usize
    where
        V: FnMut(&LightHandle),
        P: FnMut(&crate::scene::Light) -> bool,
    {
        let mut visited = 0;
        for light in &self.lights {
            if predicate(&light.read()) {
                visitor(light);
                visited += 1;
            }
        }
        visited
    }

    /// Visit models whose world box intersects `query`, through the octree
    pub fn query_models<Q, V>(&self, query: &Q, mut visitor: V)
    where
        Q: RangeQuery<BoundingRegion> + ?Sized,
        V: FnMut(&ModelHandle),
    {
        self.octree.traverse_range(query, |_, model| visitor(&model.0));
    }

    /// Recompute bounds of dynamic models and re-index them together with any
    /// pending inserts in one propagation; returns how many models moved
    pub fn refresh_dynamic(&mut self) -> usize {
        let mut moved = Vec::new();
        for handle in self.models.iter().chain(&self.blend_models) {
            let mut model = handle.write();
            if model.dynamic {
                model.update_bounds();
                moved.push((model.aabb().extent, handle.clone()));
            }
        }
        if moved.is_empty() && self.pending == 0 {
            return 0;
        }
        let count = moved.len();
        for (extent, handle) in moved {
            let model_ref = ModelRef(handle);
            self.octree.remove(&model_ref);
            self.octree.insert(extent, model_ref);
        }
        self.octree.propagate();
        self.pending = 0;
        count
    }

    /// Upload every mesh and material this chunk draws
    pub fn upload<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        cache: &mut GpuCache,
    ) -> BackendResult<()> {
        for handle in self.models.iter().chain(&self.blend_models) {
            let model = handle.read();
            cache.mesh(backend, &model.mesh)?;
            cache.material(backend, &model.material)?;
        }
        for line_model in &self.line_models {
            cache.mesh(backend, &line_model.mesh)?;
        }
        if let Some(terrain) = &self.terrain {
            cache.mesh(backend, terrain.mesh())?;
        }
        Ok(())
    }
}

fn remove_indexed(
    models: &mut Vec<ModelHandle>,
    order: &mut Vec<usize>,
    distances: &mut Vec<f32>,
    handle: &ModelHandle,
) -> bool {
    let Some(index) = models.iter().position(|m| std::sync::Arc::ptr_eq(m, handle)) else {
        return false;
    };
    models.remove(index);
    distances.remove(index);
    order.retain(|i| *i != index);
    for i in order.iter_mut() {
        if *i > index {
            *i -= 1;
        }
    }
    true
}

fn merge_ascending<'a, A, B>(a: A, b: B) -> Vec<(f32, &'a ModelHandle)>
where
    A: Iterator<Item = (f32, &'a ModelHandle)>,
    B: Iterator<Item = (f32, &'a ModelHandle)>,
{
    let mut a = a.peekable();
    let mut b = b.peekable();
    let mut merged = Vec::new();
    loop {
        let take_a = match (a.peek(), b.peek()) {
            (Some(x), Some(y)) => x.0.total_cmp(&y.0) != Ordering::Greater,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_a { a.next() } else { b.next() };
        merged.extend(next);
    }
    merged
}

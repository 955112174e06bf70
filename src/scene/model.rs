//! Renderable models and debug line sets

use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};
use parking_lot::RwLock;

use crate::backend::types::CullMode;
use crate::bounds::{ray_collides_extent, ray_collides_obb, Aabb, BoundingRegion, Obb, Ray, RayHit};
use crate::resources::{Material, Mesh};
use crate::scene::Transform;

/// Face culling used when rendering a model into the shadow map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowCullFace {
    Front,
    #[default]
    Back,
    None,
}

impl From<ShadowCullFace> for CullMode {
    fn from(face: ShadowCullFace) -> Self {
        match face {
            ShadowCullFace::Front => CullMode::Front,
            ShadowCullFace::Back => CullMode::Back,
            ShadowCullFace::None => CullMode::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub transform: Transform,
    pub mesh: Arc<Mesh>,
    pub material: Arc<Material>,
    /// Bounds are recomputed every frame instead of once
    pub dynamic: bool,
    pub shadow_cull: ShadowCullFace,
    pub casts_shadow: bool,
    pub visible: bool,
    extent: BoundingRegion,
    aabb: Aabb,
    obb: Obb,
}

impl Model {
    pub fn new(name: &str, mesh: Arc<Mesh>, material: Arc<Material>, transform: Transform) -> Self {
        let extent = mesh.extent();
        let matrix = transform.matrix();
        Self {
            name: name.to_string(),
            transform,
            mesh,
            material,
            dynamic: false,
            shadow_cull: ShadowCullFace::default(),
            casts_shadow: true,
            visible: true,
            extent,
            aabb: Aabb::compute(&matrix, &extent),
            obb: Obb::compute(&matrix, &extent),
        }
    }

    pub fn with_dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = dynamic;
        self
    }

    pub fn with_shadow_cull(mut self, face: ShadowCullFace) -> Self {
        self.shadow_cull = face;
        self
    }

    pub fn matrix(&self) -> Mat4 {
        self.transform.matrix()
    }

    /// Mesh-space extent
    pub fn extent(&self) -> &BoundingRegion {
        &self.extent
    }

    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    pub fn obb(&self) -> &Obb {
        &self.obb
    }

    pub fn is_blend(&self) -> bool {
        self.material.is_blend()
    }

    /// Recompute both bounding volumes from the current transform
    pub fn update_bounds(&mut self) {
        let matrix = self.transform.matrix();
        self.aabb = Aabb::compute(&matrix, &self.extent);
        self.obb = Obb::compute(&matrix, &self.extent);
    }

    /// Squared distance from `point` to the world-space box center
    pub fn distance_squared(&self, point: Vec3) -> f32 {
        self.aabb.center().distance_squared(point)
    }

    pub fn ray_collides(&self, ray: &Ray) -> Option<RayHit> {
        ray_collides_extent(ray, &self.aabb.extent)?;
        ray_collides_obb(ray, &self.transform.matrix(), &self.extent)
    }
}

/// Shared, mutable model
pub type ModelHandle = Arc<RwLock<Model>>;

pub fn model_handle(model: Model) -> ModelHandle {
    Arc::new(RwLock::new(model))
}

/// Identity-compared model handle, usable as octree payload
#[derive(Debug, Clone)]
pub struct ModelRef(pub ModelHandle);

impl PartialEq for ModelRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ModelRef {}

/// Debug line list drawn by the forward stage
#[derive(Debug, Clone)]
pub struct LineModel {
    pub name: String,
    pub segments: Vec<(Vec3, Vec3)>,
    pub color: Vec4,
    pub mesh: Arc<Mesh>,
}

impl LineModel {
    pub fn new(name: &str, segments: Vec<(Vec3, Vec3)>, color: Vec4) -> Self {
        let mesh = Arc::new(Mesh::line_list(name, &segments));
        Self {
            name: name.to_string(),
            segments,
            color,
            mesh,
        }
    }

    /// Wireframe of a box, 12 edges
    pub fn wire_box(name: &str, region: &BoundingRegion, color: Vec4) -> Self {
        const EDGES: [(usize, usize); 12] = [
            (0, 1),
            (2, 3),
            (4, 5),
            (6, 7),
            (0, 2),
            (1, 3),
            (4, 6),
            (5, 7),
            (0, 4),
            (1, 5),
            (2, 6),
            (3, 7),
        ];
        let segments = EDGES
            .iter()
            .map(|(a, b)| (region.corner(*a), region.corner(*b)))
            .collect();
        Self::new(name, segments, color)
    }

    pub fn center(&self) -> Vec3 {
        let points: Vec<Vec3> = self.segments.iter().flat_map(|(a, b)| [*a, *b]).collect();
        BoundingRegion::from_points(&points).center()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn crate_model(position: Vec3) -> Model {
        Model::new(
            "crate",
            Arc::new(Mesh::cube()),
            Arc::new(Material::default()),
            Transform::from_position(position),
        )
    }

    #[test]
    fn test_bounds_follow_transform() {
        let mut model = crate_model(Vec3::ZERO);
        model.transform.position = Vec3::new(10.0, 0.0, 0.0);
        model.transform.rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_4);
        model.update_bounds();

        let extent = model.aabb().extent;
        assert!((extent.center() - Vec3::new(10.0, 0.0, 0.0)).length() < 1e-5);
        assert!((extent.size().x - 2f32.sqrt()).abs() < 1e-5);
        assert!((model.obb().center() - Vec3::new(10.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_ray_hits_front_face() {
        let model = crate_model(Vec3::new(0.0, 0.0, -5.0));
        let hit = model.ray_collides(&Ray::new(Vec3::ZERO, -Vec3::Z)).unwrap();
        assert!((hit.distance() - 4.5).abs() < 1e-4);
        assert!(model.ray_collides(&Ray::new(Vec3::ZERO, Vec3::Z)).is_none());
    }

    #[test]
    fn test_model_ref_identity() {
        let a = model_handle(crate_model(Vec3::ZERO));
        let b = model_handle(crate_model(Vec3::ZERO));
        assert_eq!(ModelRef(a.clone()), ModelRef(a.clone()));
        assert_ne!(ModelRef(a), ModelRef(b));
    }

    #[test]
    fn test_wire_box_edges() {
        let lines = LineModel::wire_box("box", &BoundingRegion::new(Vec3::ZERO, Vec3::ONE), Vec4::ONE);
        assert_eq!(lines.segments.len(), 12);
        for (a, b) in &lines.segments {
            assert!((a.distance(*b) - 1.0).abs() < 1e-6);
        }
        assert_eq!(lines.center(), Vec3::splat(0.5));
    }
}

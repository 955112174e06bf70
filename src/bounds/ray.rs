//! Rays and slab intersection

use super::BoundingRegion;
use glam::{Mat4, Vec3};

/// Direction components below this are treated as parallel to the slab
pub const RAY_EPSILON: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Build a ray; the direction is normalized
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Parametric entry and exit distances along a ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub near: f32,
    pub far: f32,
}

impl RayHit {
    /// Distance to the first surface in front of the origin
    pub fn distance(&self) -> f32 {
        self.near.max(0.0)
    }
}

/// Slab test against an axis-aligned extent.
///
/// Accepts when `far >= near` and `far >= 0`. `near` is negative when the
/// origin is inside the extent.
pub fn ray_collides_extent(ray: &Ray, extent: &BoundingRegion) -> Option<RayHit> {
    let mut t_near = f32::NEG_INFINITY;
    let mut t_far = f32::INFINITY;

    for axis in 0..3 {
        let origin = ray.origin[axis];
        let direction = ray.direction[axis];
        let (min, max) = (extent.min[axis], extent.max[axis]);

        if direction.abs() < RAY_EPSILON {
            if origin < min || origin > max {
                return None;
            }
            continue;
        }

        let mut t1 = (min - origin) / direction;
        let mut t2 = (max - origin) / direction;
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }

        t_near = t_near.max(t1);
        t_far = t_far.min(t2);
        if t_near > t_far || t_far < 0.0 {
            return None;
        }
    }

    // A zero direction never entered a slab.
    if t_near == f32::NEG_INFINITY {
        return None;
    }

    Some(RayHit {
        near: t_near,
        far: t_far,
    })
}

/// Ray against a model's oriented box, distances in world units.
///
/// The ray is moved into model space, tested against the mesh extent, and the
/// hit distances are scaled back by the model's uniform scale.
pub fn ray_collides_obb(ray: &Ray, model: &Mat4, mesh_extent: &BoundingRegion) -> Option<RayHit> {
    let scale = model.x_axis.truncate().length();
    if scale <= f32::EPSILON {
        return None;
    }

    let inverse = model.inverse();
    let local = Ray::new(
        inverse.transform_point3(ray.origin),
        inverse.transform_vector3(ray.direction),
    );

    ray_collides_extent(&local, mesh_extent).map(|hit| RayHit {
        near: hit.near * scale,
        far: hit.far * scale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn unit_box() -> BoundingRegion {
        BoundingRegion::new(Vec3::ZERO, Vec3::ONE)
    }

    #[test]
    fn test_origin_on_face_hits_at_zero() {
        let ray = Ray::new(Vec3::new(0.0, 0.5, 0.5), Vec3::X);
        let hit = ray_collides_extent(&ray, &unit_box()).unwrap();
        assert!(hit.near.abs() < 1e-6);
        assert!((hit.far - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_parallel_outside_slab_never_hits() {
        // Parallel to X but above the Y slab; X and Z would otherwise overlap.
        let ray = Ray::new(Vec3::new(-5.0, 2.0, 0.5), Vec3::X);
        assert!(ray_collides_extent(&ray, &unit_box()).is_none());

        let ray = Ray::new(Vec3::new(0.5, 0.5, -3.0), Vec3::Y);
        assert!(ray_collides_extent(&ray, &unit_box()).is_none());
    }

    #[test]
    fn test_box_behind_ray_misses() {
        let ray = Ray::new(Vec3::new(3.0, 0.5, 0.5), Vec3::X);
        assert!(ray_collides_extent(&ray, &unit_box()).is_none());
    }

    #[test]
    fn test_origin_inside_box() {
        let ray = Ray::new(Vec3::splat(0.5), Vec3::new(1.0, 1.0, 0.0));
        let hit = ray_collides_extent(&ray, &unit_box()).unwrap();
        assert!(hit.near < 0.0);
        assert!(hit.far > 0.0);
        assert_eq!(hit.distance(), 0.0);
    }

    #[test]
    fn test_obb_distance_in_world_units() {
        let mesh = BoundingRegion::new(Vec3::splat(-0.5), Vec3::splat(0.5));
        let model = Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            Quat::from_rotation_y(0.3),
            Vec3::new(0.0, 0.0, -10.0),
        );
        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);
        let hit = ray_collides_obb(&ray, &model, &mesh).unwrap();

        // The box is 2 units wide around z = -10, rotated about Y.
        let half_depth = 1.0 / 0.3f32.cos();
        assert!((hit.near - (10.0 - half_depth)).abs() < 1e-3);
        assert!((hit.far - (10.0 + half_depth)).abs() < 1e-3);
    }
}

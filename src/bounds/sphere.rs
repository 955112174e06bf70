//! Bounding sphere

use super::BoundingRegion;
use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Smallest sphere around a region
    pub fn enclosing(region: &BoundingRegion) -> Self {
        Self::new(region.center(), region.half_size().length())
    }

    pub fn region(&self) -> BoundingRegion {
        BoundingRegion::from_center(self.center, Vec3::splat(self.radius))
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.center.distance_squared(point) <= self.radius * self.radius
    }

    pub fn intersects_region(&self, region: &BoundingRegion) -> bool {
        region.distance_squared(self.center) <= self.radius * self.radius
    }

    pub fn intersects_sphere(&self, other: &Sphere) -> bool {
        let reach = self.radius + other.radius;
        self.center.distance_squared(other.center) <= reach * reach
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_region_overlap() {
        let region = BoundingRegion::new(Vec3::ZERO, Vec3::ONE);
        assert!(Sphere::new(Vec3::new(2.0, 0.5, 0.5), 1.0).intersects_region(&region));
        assert!(!Sphere::new(Vec3::new(2.0, 2.0, 2.0), 1.0).intersects_region(&region));
        assert!(Sphere::new(Vec3::splat(0.5), 0.1).intersects_region(&region));
    }

    #[test]
    fn test_enclosing_contains_corners() {
        let region = BoundingRegion::new(Vec3::new(-1.0, 0.0, 2.0), Vec3::new(3.0, 1.0, 5.0));
        let sphere = Sphere::enclosing(&region);
        for i in 0..8 {
            assert!(sphere.contains_point(region.corner(i) * 0.9999 + region.center() * 0.0001));
        }
    }
}

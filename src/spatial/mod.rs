//! Spatial indexing
//!
//! [`Octree`] is generic over the stored primitive and a user payload. Range
//! queries work with any shape implementing [`RangeQuery`] for that primitive.

mod octree;

pub use octree::*;

use crate::bounds::{BoundingRegion, FrustumBox, Sphere};
use glam::Vec3;

/// Something that can be stored in an octree cell
pub trait Primitive {
    /// True when the primitive fits entirely inside `region`
    fn is_inside(&self, region: &BoundingRegion) -> bool;

    /// Representative point used to pick the best-fit octant
    fn anchor(&self) -> Vec3;
}

/// A query shape usable with [`Octree::traverse_range`]
pub trait RangeQuery<P> {
    fn intersects_region(&self, region: &BoundingRegion) -> bool;
    fn intersects(&self, primitive: &P) -> bool;
}

impl Primitive for Vec3 {
    fn is_inside(&self, region: &BoundingRegion) -> bool {
        region.contains_point(*self)
    }

    fn anchor(&self) -> Vec3 {
        *self
    }
}

impl Primitive for BoundingRegion {
    fn is_inside(&self, region: &BoundingRegion) -> bool {
        region.contains_region(self)
    }

    fn anchor(&self) -> Vec3 {
        self.center()
    }
}

impl Primitive for Sphere {
    fn is_inside(&self, region: &BoundingRegion) -> bool {
        region.contains_region(&self.region())
    }

    fn anchor(&self) -> Vec3 {
        self.center
    }
}

impl RangeQuery<Vec3> for BoundingRegion {
    fn intersects_region(&self, region: &BoundingRegion) -> bool {
        BoundingRegion::intersects(self, region)
    }

    fn intersects(&self, primitive: &Vec3) -> bool {
        self.contains_point(*primitive)
    }
}

impl RangeQuery<BoundingRegion> for BoundingRegion {
    fn intersects_region(&self, region: &BoundingRegion) -> bool {
        BoundingRegion::intersects(self, region)
    }

    fn intersects(&self, primitive: &BoundingRegion) -> bool {
        BoundingRegion::intersects(self, primitive)
    }
}

impl RangeQuery<Sphere> for BoundingRegion {
    fn intersects_region(&self, region: &BoundingRegion) -> bool {
        BoundingRegion::intersects(self, region)
    }

    fn intersects(&self, primitive: &Sphere) -> bool {
        primitive.intersects_region(self)
    }
}

impl RangeQuery<Vec3> for Sphere {
    fn intersects_region(&self, region: &BoundingRegion) -> bool {
        Sphere::intersects_region(self, region)
    }

    fn intersects(&self, primitive: &Vec3) -> bool {
        self.contains_point(*primitive)
    }
}

impl RangeQuery<BoundingRegion> for Sphere {
    fn intersects_region(&self, region: &BoundingRegion) -> bool {
        Sphere::intersects_region(self, region)
    }

    fn intersects(&self, primitive: &BoundingRegion) -> bool {
        Sphere::intersects_region(self, primitive)
    }
}

impl RangeQuery<Sphere> for Sphere {
    fn intersects_region(&self, region: &BoundingRegion) -> bool {
        Sphere::intersects_region(self, region)
    }

    fn intersects(&self, primitive: &Sphere) -> bool {
        self.intersects_sphere(primitive)
    }
}

impl RangeQuery<Vec3> for FrustumBox {
    fn intersects_region(&self, region: &BoundingRegion) -> bool {
        self.collides(region)
    }

    fn intersects(&self, primitive: &Vec3) -> bool {
        self.contains_point(*primitive)
    }
}

impl RangeQuery<BoundingRegion> for FrustumBox {
    fn intersects_region(&self, region: &BoundingRegion) -> bool {
        self.collides(region)
    }

    fn intersects(&self, primitive: &BoundingRegion) -> bool {
        self.collides(primitive)
    }
}

impl RangeQuery<Sphere> for FrustumBox {
    fn intersects_region(&self, region: &BoundingRegion) -> bool {
        self.collides(region)
    }

    fn intersects(&self, primitive: &Sphere) -> bool {
        self.collides_sphere(primitive.center, primitive.radius)
    }
}

//! World-space axis-aligned bounding box

use super::{BoundingRegion, Corners};
use glam::{Mat4, Vec3};

/// Axis-aligned box around a transformed mesh extent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub extent: BoundingRegion,
    pub corners: [Vec3; 8],
}

impl Aabb {
    /// Transform the 8 mesh-space corners and reduce them to a world extent.
    pub fn compute(model: &Mat4, mesh_extent: &BoundingRegion) -> Self {
        let transformed = mesh_extent.corners().map(|c| model.transform_point3(c));
        let extent = BoundingRegion::from_points(&transformed);
        Self {
            extent,
            corners: extent.corners(),
        }
    }

    pub fn center(&self) -> Vec3 {
        self.extent.center()
    }
}

impl Corners for Aabb {
    fn corners(&self) -> [Vec3; 8] {
        self.corners
    }
}

//! Oriented bounding box

use super::{BoundingRegion, Corners};
use glam::{Mat4, Vec3};

const UNIT_CUBE: [Vec3; 8] = [
    Vec3::new(-0.5, -0.5, -0.5),
    Vec3::new(0.5, -0.5, -0.5),
    Vec3::new(-0.5, 0.5, -0.5),
    Vec3::new(0.5, 0.5, -0.5),
    Vec3::new(-0.5, -0.5, 0.5),
    Vec3::new(0.5, -0.5, 0.5),
    Vec3::new(-0.5, 0.5, 0.5),
    Vec3::new(0.5, 0.5, 0.5),
];

/// Box that follows the model's rotation
///
/// `transform` maps the centered unit cube onto the box: model matrix, then the
/// offset to the mesh extent center, then the extent size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obb {
    pub transform: Mat4,
    pub corners: [Vec3; 8],
}

impl Obb {
    pub fn compute(model: &Mat4, mesh_extent: &BoundingRegion) -> Self {
        let offset = Mat4::from_translation(mesh_extent.center());
        let scale = Mat4::from_scale(mesh_extent.size());
        let transform = *model * offset * scale;
        Self {
            transform,
            corners: UNIT_CUBE.map(|c| transform.transform_point3(c)),
        }
    }

    pub fn center(&self) -> Vec3 {
        self.transform.transform_point3(Vec3::ZERO)
    }
}

impl Corners for Obb {
    fn corners(&self) -> [Vec3; 8] {
        self.corners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn test_obb_keeps_box_size_under_rotation() {
        let mesh = BoundingRegion::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        let model = Mat4::from_rotation_translation(
            Quat::from_rotation_y(0.7),
            Vec3::new(3.0, 0.0, -1.0),
        );
        let obb = Obb::compute(&model, &mesh);

        // Edge between corners differing only in the x bit keeps the mesh length.
        let edge = obb.corners[1] - obb.corners[0];
        assert!((edge.length() - 2.0).abs() < 1e-5);
        assert!((obb.center() - model.transform_point3(Vec3::new(1.0, 0.5, 0.5))).length() < 1e-5);
    }
}

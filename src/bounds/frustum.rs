//! View frustum as 8 corners and 6 inward planes

use super::{BoundingRegion, Corners, Sphere};
use crate::scene::{Camera, Projection};
use glam::{Mat4, Vec3, Vec4};

/// Number of depth slices the frustum is split into
pub const FRUSTUM_SPLITS: usize = 3;

/// Blend between logarithmic (1.0) and uniform (0.0) split placement
pub const SPLIT_LAMBDA: f32 = 0.5;

/// Corner layout: 0..4 is the near plane and 4..8 the far plane, each
/// ordered bottom-left, bottom-right, top-right, top-left.
const FACES: [[usize; 3]; 6] = [
    [0, 1, 2], // near
    [4, 7, 6], // far
    [0, 3, 7], // left
    [1, 5, 6], // right
    [0, 4, 5], // bottom
    [3, 2, 6], // top
];

#[derive(Debug, Clone, PartialEq)]
pub struct FrustumBox {
    pub corners: [Vec3; 8],
    /// Face normals pointing into the frustum
    pub normals: [Vec3; 6],
    /// `normals[i].dot(p) - distances[i]` is negative outside face `i`
    distances: [f32; 6],
    /// Axis-aligned extent used as a fast reject
    pub extent: BoundingRegion,
    origin: Vec3,
    forward: Vec3,
    near: f32,
    far: f32,
    splits: [f32; FRUSTUM_SPLITS + 1],
}

impl Default for FrustumBox {
    /// Unit box looking down -Z, near plane at z = 1
    fn default() -> Self {
        Self::from_corners([
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(-1.0, 1.0, 1.0),
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(1.0, 1.0, -1.0),
            Vec3::new(-1.0, 1.0, -1.0),
        ])
    }
}

impl FrustumBox {
    /// Build from explicit corners in frustum order.
    ///
    /// The view axis runs from the near face center to the far face center.
    pub fn from_corners(corners: [Vec3; 8]) -> Self {
        let near_center = corners[..4].iter().copied().sum::<Vec3>() * 0.25;
        let far_center = corners[4..].iter().copied().sum::<Vec3>() * 0.25;
        let depth = near_center.distance(far_center);
        let forward = (far_center - near_center).normalize_or_zero();

        let mut frustum = Self {
            corners,
            normals: [Vec3::ZERO; 6],
            distances: [0.0; 6],
            extent: BoundingRegion::EMPTY,
            origin: near_center,
            forward,
            near: 0.0,
            far: depth,
            splits: [0.0; FRUSTUM_SPLITS + 1],
        };
        frustum.rebuild();
        frustum
    }

    /// Unproject the clip-space cube (depth in `[0, 1]`) through `view_proj`
    pub fn from_matrix(view_proj: &Mat4) -> Self {
        let inverse = view_proj.inverse();
        let ndc = [
            (-1.0, -1.0),
            (1.0, -1.0),
            (1.0, 1.0),
            (-1.0, 1.0),
        ];
        let corners = std::array::from_fn(|i| {
            let (x, y) = ndc[i % 4];
            let z = if i < 4 { 0.0 } else { 1.0 };
            let p = inverse * Vec4::new(x, y, z, 1.0);
            p.truncate() / p.w
        });
        Self::from_corners(corners)
    }

    /// Recompute corners, planes, extent and splits from a camera.
    pub fn update(&mut self, camera: &Camera) {
        let forward = camera.forward();
        let right = camera.right();
        let up = right.cross(forward).normalize();
        let position = camera.position;

        let (near, far) = (camera.projection.near(), camera.projection.far());
        let plane = |distance: f32, left: f32, rgt: f32, bottom: f32, top: f32| {
            let center = position + forward * distance;
            [
                center + right * left + up * bottom,
                center + right * rgt + up * bottom,
                center + right * rgt + up * top,
                center + right * left + up * top,
            ]
        };

        let (near_face, far_face) = match camera.projection {
            Projection::Perspective { fov_y, aspect, .. } => {
                let tan = (fov_y * 0.5).tan();
                let (nh, fh) = (near * tan, far * tan);
                let (nw, fw) = (nh * aspect, fh * aspect);
                (plane(near, -nw, nw, -nh, nh), plane(far, -fw, fw, -fh, fh))
            }
            Projection::Orthographic {
                left,
                right: r,
                bottom,
                top,
                ..
            } => (
                plane(near, left, r, bottom, top),
                plane(far, left, r, bottom, top),
            ),
        };

        self.corners[..4].copy_from_slice(&near_face);
        self.corners[4..].copy_from_slice(&far_face);
        self.origin = position;
        self.forward = forward;
        self.near = near;
        self.far = far;
        self.rebuild();
    }

    fn rebuild(&mut self) {
        let centroid = self.corners.iter().copied().sum::<Vec3>() / 8.0;

        for (i, [a, b, c]) in FACES.iter().enumerate() {
            let p = self.corners[*a];
            let mut normal = (self.corners[*b] - p)
                .cross(self.corners[*c] - p)
                .normalize_or_zero();
            if normal.dot(centroid - p) < 0.0 {
                normal = -normal;
            }
            self.normals[i] = normal;
            self.distances[i] = normal.dot(p);
        }

        self.extent = BoundingRegion::from_points(&self.corners);
        self.compute_splits();
    }

    /// Practical split scheme: blend of logarithmic and uniform distances
    fn compute_splits(&mut self) {
        let near = self.near.max(1e-3);
        let far = self.far.max(near);
        for (i, split) in self.splits.iter_mut().enumerate() {
            let t = i as f32 / FRUSTUM_SPLITS as f32;
            let log = near * (far / near).powf(t);
            let uniform = near + (far - near) * t;
            *split = SPLIT_LAMBDA * log + (1.0 - SPLIT_LAMBDA) * uniform;
        }
        self.splits[0] = self.near;
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    /// Distance of split boundary `i` along the view axis, `0..=FRUSTUM_SPLITS`
    pub fn split_distance(&self, i: usize) -> f32 {
        self.splits[i.min(FRUSTUM_SPLITS)]
    }

    /// Point on the view axis halfway through split `i`
    pub fn split_center(&self, i: usize) -> Vec3 {
        let mid = (self.split_distance(i) + self.split_distance(i + 1)) * 0.5;
        self.origin + self.forward * mid
    }

    /// Corners of the sub-frustum between two view distances
    pub fn slice_corners(&self, from: f32, to: f32) -> [Vec3; 8] {
        let depth = (self.far - self.near).max(f32::EPSILON);
        let t0 = ((from - self.near) / depth).clamp(0.0, 1.0);
        let t1 = ((to - self.near) / depth).clamp(0.0, 1.0);
        std::array::from_fn(|i| {
            let edge = i % 4;
            let t = if i < 4 { t0 } else { t1 };
            self.corners[edge].lerp(self.corners[edge + 4], t)
        })
    }

    pub fn split_corners(&self, i: usize) -> [Vec3; 8] {
        self.slice_corners(self.split_distance(i), self.split_distance(i + 1))
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.normals
            .iter()
            .zip(self.distances)
            .all(|(n, d)| n.dot(point) - d >= 0.0)
    }

    /// Conservative box test.
    ///
    /// Rejects on the extent first, then when all 8 box vertices are outside one
    /// of the 6 faces. Boxes straddling frustum edges may be reported as
    /// colliding; a box touching the frustum is never rejected.
    pub fn collides<B: Corners + ?Sized>(&self, volume: &B) -> bool {
        let corners = volume.corners();
        if !self.extent.intersects(&BoundingRegion::from_points(&corners)) {
            return false;
        }

        for (normal, distance) in self.normals.iter().zip(self.distances) {
            if corners.iter().all(|c| normal.dot(*c) - distance < 0.0) {
                return false;
            }
        }
        true
    }

    pub fn collides_sphere(&self, center: Vec3, radius: f32) -> bool {
        let sphere = Sphere::new(center, radius);
        if !self.extent.intersects(&sphere.region()) {
            return false;
        }
        self.normals
            .iter()
            .zip(self.distances)
            .all(|(n, d)| n.dot(center) - d >= -radius)
    }
}

impl Corners for FrustumBox {
    fn corners(&self) -> [Vec3; 8] {
        self.corners
    }
}

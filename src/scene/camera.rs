//! Cameras: the view camera and the directional light's shadow camera

use glam::{Mat4, Vec3};

use crate::bounds::{BoundingRegion, FrustumBox, FRUSTUM_SPLITS};

/// Camera projection type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4, // 45 degrees
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 300.0,
        }
    }
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Projection::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    pub fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Self {
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        Projection::Orthographic {
            left: -half_w,
            right: half_w,
            bottom: -half_h,
            top: half_h,
            near,
            far,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        match self {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(*fov_y, *aspect, *near, *far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh(*left, *right, *bottom, *top, *near, *far),
        }
    }

    pub fn near(&self) -> f32 {
        match self {
            Projection::Perspective { near, .. } => *near,
            Projection::Orthographic { near, .. } => *near,
        }
    }

    pub fn far(&self) -> f32 {
        match self {
            Projection::Perspective { far, .. } => *far,
            Projection::Orthographic { far, .. } => *far,
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective { aspect: a, .. } = self {
            *a = aspect;
        }
    }
}

/// Camera for viewing the scene
///
/// `frustum` is only refreshed by [`Camera::update`].
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
    pub frustum: FrustumBox,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO)
    }
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        let mut camera = Self {
            position,
            target,
            up: Vec3::Y,
            projection: Projection::default(),
            frustum: FrustumBox::default(),
        };
        camera.update();
        camera
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
    }

    /// Recompute the view frustum
    pub fn update(&mut self) {
        let mut frustum = std::mem::take(&mut self.frustum);
        frustum.update(self);
        self.frustum = frustum;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize()
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(self.up).normalize()
    }

    /// Up vector orthogonal to forward and right
    pub fn true_up(&self) -> Vec3 {
        self.right().cross(self.forward())
    }

    /// Update aspect ratio for perspective projection
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        self.projection.set_aspect(width / height.max(1.0));
        self.update();
    }
}

/// Orthographic camera fitted around the nearest splits of the view frustum
#[derive(Debug, Clone)]
pub struct ShadowCamera {
    pub camera: Camera,
    /// Light view-projection
    pub light_matrix: Mat4,
    /// Distance the near plane is pulled toward the light to keep casters
    pub caster_margin: f32,
    /// Splits covered by [`ShadowCamera::fit_view`], counted from the near plane.
    /// Geometry past the last one neither casts nor receives shadow.
    pub splits: usize,
}

impl Default for ShadowCamera {
    fn default() -> Self {
        Self {
            camera: Camera::new(Vec3::Y, Vec3::ZERO),
            light_matrix: Mat4::IDENTITY,
            caster_margin: 50.0,
            splits: FRUSTUM_SPLITS,
        }
    }
}

impl ShadowCamera {
    pub fn frustum(&self) -> &FrustumBox {
        &self.camera.frustum
    }

    /// Tight-fit the light camera around `split` of `frustum`.
    pub fn fit(&mut self, light_direction: Vec3, frustum: &FrustumBox, split: usize) {
        self.fit_corners(light_direction, frustum.split_corners(split));
    }

    /// Fit around the first [`ShadowCamera::splits`] splits of `frustum`
    pub fn fit_view(&mut self, light_direction: Vec3, frustum: &FrustumBox) {
        let last = self.splits.clamp(1, FRUSTUM_SPLITS);
        let corners = frustum.slice_corners(frustum.split_distance(0), frustum.split_distance(last));
        self.fit_corners(light_direction, corners);
    }

    fn fit_corners(&mut self, light_direction: Vec3, corners: [Vec3; 8]) {
        let direction = light_direction.normalize_or_zero();
        if direction == Vec3::ZERO {
            return;
        }
        let center = corners.iter().copied().sum::<Vec3>() / corners.len() as f32;

        let up = if direction.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
        let eye = center - direction;
        let view = Mat4::look_at_rh(eye, center, up);

        let bounds = BoundingRegion::from_points(&corners.map(|c| view.transform_point3(c)));

        // View space looks down -Z: nearest points have the largest z.
        let near = -bounds.max.z - self.caster_margin;
        let far = -bounds.min.z;

        self.camera.position = eye;
        self.camera.target = center;
        self.camera.up = up;
        self.camera.projection = Projection::Orthographic {
            left: bounds.min.x,
            right: bounds.max.x,
            bottom: bounds.min.y,
            top: bounds.max.y,
            near,
            far,
        };
        self.camera.update();
        self.light_matrix = self.camera.view_projection_matrix();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_axes_are_orthonormal() {
        let camera = Camera::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 0.0, -4.0));
        let (f, r, u) = (camera.forward(), camera.right(), camera.true_up());
        assert!(f.dot(r).abs() < 1e-5);
        assert!(f.dot(u).abs() < 1e-5);
        assert!((u.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_aspect_change_refreshes_frustum() {
        let mut camera = Camera::new(Vec3::ZERO, -Vec3::Z);
        let before = camera.frustum.corners[5];
        camera.set_aspect(4.0, 1.0);
        assert!(camera.frustum.corners[5].x > before.x);
    }

    #[test]
    fn test_shadow_camera_contains_split() {
        let mut camera = Camera::new(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, 5.0, -10.0));
        camera.projection = Projection::perspective(60.0, 1.0, 0.5, 80.0);
        camera.update();

        let mut shadow = ShadowCamera::default();
        let direction = Vec3::new(-0.3, -1.0, -0.2);
        shadow.fit(direction, &camera.frustum, 0);

        for corner in camera.frustum.split_corners(0) {
            let clip = shadow.light_matrix.project_point3(corner);
            assert!(clip.x.abs() <= 1.0 + 1e-3, "{clip:?}");
            assert!(clip.y.abs() <= 1.0 + 1e-3, "{clip:?}");
            assert!((-1e-3..=1.0 + 1e-3).contains(&clip.z), "{clip:?}");
        }
        assert!(shadow.camera.forward().dot(direction.normalize()) > 0.999);
    }

    #[test]
    fn test_shadow_view_fit_covers_far_geometry() {
        let mut camera = Camera::new(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, 5.0, -10.0));
        camera.projection = Projection::perspective(60.0, 1.0, 0.1, 100.0);
        camera.update();
        let direction = Vec3::new(-0.3, -1.0, -0.2);
        let far_point = camera.frustum.split_center(FRUSTUM_SPLITS - 1);

        let mut first_only = ShadowCamera::default();
        first_only.fit(direction, &camera.frustum, 0);
        let clip = first_only.light_matrix.project_point3(far_point);
        assert!(clip.x.abs() > 1.0 || clip.y.abs() > 1.0 || !(0.0..=1.0).contains(&clip.z));

        let mut whole = ShadowCamera::default();
        whole.fit_view(direction, &camera.frustum);
        for corner in camera.frustum.corners {
            let clip = whole.light_matrix.project_point3(corner);
            assert!(clip.x.abs() <= 1.0 + 1e-3, "{clip:?}");
            assert!(clip.y.abs() <= 1.0 + 1e-3, "{clip:?}");
            assert!((-1e-3..=1.0 + 1e-3).contains(&clip.z), "{clip:?}");
        }
        assert!(whole.frustum().collides_sphere(far_point, 0.5));
    }
}

//! Light types for the scene

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use parking_lot::RwLock;

use crate::bounds::{BoundingRegion, Sphere};

/// Omni light bounded by a sphere of `radius`
#[derive(Debug, Clone, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
        }
    }
}

impl PointLight {
    pub fn new(position: Vec3, color: Vec3, intensity: f32, radius: f32) -> Self {
        Self {
            position,
            color,
            intensity,
            radius,
        }
    }

    /// Bounding sphere of the lit volume
    pub fn volume(&self) -> Sphere {
        Sphere::new(self.position, self.radius)
    }

    pub fn to_gpu_data(&self) -> GpuLightData {
        GpuLightData {
            position: self.position.extend(self.radius),
            color_intensity: self.color.extend(self.intensity),
            direction_type: Vec4::new(0.0, 0.0, 0.0, 0.0), // type 0 = point
        }
    }
}

/// Light at infinity (like the sun)
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub ambient: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.5, -1.0, -0.5).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
            ambient: 0.1,
        }
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize(),
            color,
            intensity,
            ..Default::default()
        }
    }

    pub fn to_gpu_data(&self) -> GpuLightData {
        GpuLightData {
            position: Vec4::new(0.0, 0.0, 0.0, f32::INFINITY),
            color_intensity: self.color.extend(self.intensity),
            direction_type: self.direction.extend(1.0), // type 1 = directional
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Light {
    Directional(DirectionalLight),
    Point(PointLight),
}

impl Light {
    /// World region the light can affect; `None` for unbounded lights
    pub fn region(&self) -> Option<BoundingRegion> {
        match self {
            Light::Directional(_) => None,
            Light::Point(point) => Some(point.volume().region()),
        }
    }

    pub fn as_point(&self) -> Option<&PointLight> {
        match self {
            Light::Point(point) => Some(point),
            Light::Directional(_) => None,
        }
    }

    pub fn to_gpu_data(&self) -> GpuLightData {
        match self {
            Light::Directional(light) => light.to_gpu_data(),
            Light::Point(light) => light.to_gpu_data(),
        }
    }
}

/// Shared, mutable light
pub type LightHandle = Arc<RwLock<Light>>;

pub fn light_handle(light: Light) -> LightHandle {
    Arc::new(RwLock::new(light))
}

/// GPU-friendly light data structure
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuLightData {
    /// xyz = position, w = radius
    pub position: Vec4,
    /// xyz = color, w = intensity
    pub color_intensity: Vec4,
    /// xyz = direction, w = light type (0=point, 1=directional)
    pub direction_type: Vec4,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_light_region() {
        let light = Light::Point(PointLight::new(Vec3::new(1.0, 0.0, 0.0), Vec3::ONE, 1.0, 2.0));
        let region = light.region().unwrap();
        assert_eq!(region.min, Vec3::new(-1.0, -2.0, -2.0));
        assert_eq!(region.max, Vec3::new(3.0, 2.0, 2.0));
        assert!(Light::Directional(DirectionalLight::default()).region().is_none());
    }

    #[test]
    fn test_gpu_data_layout() {
        assert_eq!(std::mem::size_of::<GpuLightData>(), 48);
        let data = PointLight::new(Vec3::ONE, Vec3::X, 3.0, 7.0).to_gpu_data();
        assert_eq!(data.position.w, 7.0);
        assert_eq!(data.color_intensity.w, 3.0);
    }
}

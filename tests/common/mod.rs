//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use glam::Vec3;

use deferred_engine::backend::{RenderTargetHandle, SoftwareBackend};
use deferred_engine::pipeline::{
    buffers, ContextConfig, DeferredPipeline, FrameStats, RenderContext, RenderSettings,
};
use deferred_engine::resources::{Material, Mesh};
use deferred_engine::scene::{Camera, CameraInput, Model, PointLight, Scene, Transform};

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;

/// Backend, scene and pipeline wired together at test size
pub struct Harness {
    pub backend: SoftwareBackend,
    pub scene: Scene,
    pub context: RenderContext,
    pub pipeline: DeferredPipeline,
}

impl Harness {
    pub fn new(scene: Scene, settings: RenderSettings) -> Self {
        let mut backend = SoftwareBackend::new(WIDTH, HEIGHT);
        let context = RenderContext::new(
            &mut backend,
            &ContextConfig {
                shadow_map_size: 64,
                light_volume_segments: 16,
            },
        )
        .expect("render context");
        let pipeline = DeferredPipeline::new(&context, settings).expect("pipeline");
        Self {
            backend,
            scene,
            context,
            pipeline,
        }
    }

    pub fn render(&mut self) -> FrameStats {
        self.pipeline
            .render_frame(&mut self.backend, &self.scene, &mut self.context)
            .expect("frame")
    }

    pub fn target(&self, name: &str) -> RenderTargetHandle {
        self.context.target(name).expect("registered buffer")
    }

    pub fn lbuffer(&self) -> RenderTargetHandle {
        self.target(buffers::LBUFFER)
    }
}

pub fn cube(name: &str, position: Vec3, scale: f32, material: Arc<Material>) -> Model {
    Model::new(
        name,
        Arc::new(Mesh::cube()),
        material,
        Transform::from_position_scale(position, scale),
    )
}

/// Camera at the origin looking down -Z at a box whose front face sits at
/// z = -8, with one point light between them touching the face.
pub fn wall_scene() -> Scene {
    wall_scene_lit_by(PointLight::new(
        Vec3::new(0.0, 0.0, -6.0),
        Vec3::new(1.0, 0.5, 0.25),
        2.0,
        3.0,
    ))
}

/// The wall scene with `light` as its only point light
pub fn wall_scene_lit_by(light: PointLight) -> Scene {
    let mut scene = Scene::new(32.0, 1);
    let mut camera = Camera::new(Vec3::ZERO, -Vec3::Z);
    camera.set_aspect(WIDTH as f32, HEIGHT as f32);
    scene.set_camera(camera);

    scene
        .add_model(cube(
            "wall",
            Vec3::new(0.0, 0.0, -10.0),
            4.0,
            Arc::new(Material::new("wall")),
        ))
        .expect("wall");
    scene.add_light(light).expect("light");

    // Fits the shadow camera and sorts the chunks.
    scene.update(0.0, &CameraInput::default());
    scene
}

//! Procedural levels for the sandbox
//!
//! Each level populates an empty [`Scene`]: terrain chunks, models, lights
//! and an initial camera.

use std::sync::Arc;

use glam::{Quat, Vec3, Vec4};

use crate::error::{EngineError, EngineResult};
use crate::resources::{Material, Mesh};
use crate::scene::*;

/// Grid resolution of generated terrain chunks
const TERRAIN_RESOLUTION: u32 = 33;

/// A named scene setup
pub trait Level: Send + Sync {
    /// Name used on the command line
    fn name(&self) -> &str;

    /// Populate `scene`
    fn setup(&self, scene: &mut Scene) -> SceneResult<()>;

    /// Generate the chunk at `coords` when streaming brings it into range
    fn chunk(&self, coords: ChunkCoords, chunk_size: f32) -> Chunk {
        Chunk::new(coords, chunk_size)
    }
}

/// Rolling terrain with boxes, spheres, a glass block and four lights
pub struct SandboxLevel;

/// Flat floor lit by a grid of colored point lights
pub struct LightsLevel;

/// Nothing but the camera
pub struct EmptyLevel;

pub fn levels() -> Vec<Box<dyn Level>> {
    vec![Box::new(SandboxLevel), Box::new(LightsLevel), Box::new(EmptyLevel)]
}

pub fn level_names() -> Vec<String> {
    levels().iter().map(|level| level.name().to_string()).collect()
}

/// Set up the level called `name` in `scene`
pub fn load_level(name: &str, scene: &mut Scene) -> EngineResult<Box<dyn Level>> {
    let level = levels()
        .into_iter()
        .find(|level| level.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| EngineError::UnknownLevel(name.to_string()))?;
    level.setup(scene)?;
    log::info!(
        "Loaded level '{}': {} chunks, {} models",
        level.name(),
        scene.chunk_count(),
        scene.model_count()
    );
    Ok(level)
}

fn hills(x: f32, z: f32) -> f32 {
    (x * 0.05).sin() * (z * 0.05).cos() * 2.0
}

fn terrain_chunk<F>(coords: ChunkCoords, chunk_size: f32, height: F) -> Chunk
where
    F: Fn(f32, f32) -> f32,
{
    Chunk::new(coords, chunk_size).with_terrain(TerrainChunk::from_fn(
        coords,
        chunk_size,
        TERRAIN_RESOLUTION,
        height,
    ))
}

impl Level for SandboxLevel {
    fn name(&self) -> &str {
        "sandbox"
    }

    fn chunk(&self, coords: ChunkCoords, chunk_size: f32) -> Chunk {
        terrain_chunk(coords, chunk_size, hills)
    }

    fn setup(&self, scene: &mut Scene) -> SceneResult<()> {
        scene.stream_chunks(Vec3::ZERO, |coords, size| self.chunk(coords, size));

        let cube = Arc::new(Mesh::cube());
        let sphere = Arc::new(Mesh::sphere(24, 16));
        let stone = Arc::new(Material::new("stone").with_albedo(Vec3::new(0.6, 0.58, 0.55)));
        let metal = Arc::new(
            Material::new("metal")
                .with_albedo(Vec3::new(0.9, 0.8, 0.5))
                .with_metallic(1.0)
                .with_roughness(0.3),
        );
        let glass = Arc::new(
            Material::new("glass")
                .with_albedo(Vec3::new(0.6, 0.8, 1.0))
                .with_transparency(0.6),
        );

        for i in 0..5 {
            for j in 0..5 {
                let x = (i as f32 - 2.0) * 6.0;
                let z = (j as f32 - 2.0) * 6.0 - 10.0;
                let position = Vec3::new(x, hills(x, z) + 0.75, z);
                let transform = Transform::from_position_scale(position, 1.5)
                    .with_rotation(Quat::from_rotation_y((i * 5 + j) as f32 * 0.4));
                scene.add_model(Model::new(
                    &format!("box_{i}_{j}"),
                    cube.clone(),
                    stone.clone(),
                    transform,
                ))?;
            }
        }

        for (i, x) in [-8.0f32, 0.0, 8.0].into_iter().enumerate() {
            let z = -4.0;
            let position = Vec3::new(x, hills(x, z) + 2.0, z);
            scene.add_model(
                Model::new(
                    &format!("sphere_{i}"),
                    sphere.clone(),
                    metal.clone(),
                    Transform::from_position_scale(position, 2.0),
                )
                .with_dynamic(true),
            )?;
        }

        let glass_position = Vec3::new(3.0, hills(3.0, -7.0) + 1.5, -7.0);
        let glass_block = scene.add_model(Model::new(
            "glass_block",
            cube,
            glass,
            Transform::from_position_scale(glass_position, 3.0),
        ))?;
        let outline = *glass_block.read().extent();
        scene.add_line_model(LineModel::wire_box(
            "glass_outline",
            &outline,
            Vec4::new(1.0, 1.0, 0.0, 1.0),
        ))?;

        let colors = [
            Vec3::new(1.0, 0.3, 0.2),
            Vec3::new(0.2, 1.0, 0.3),
            Vec3::new(0.3, 0.4, 1.0),
            Vec3::new(1.0, 0.9, 0.6),
        ];
        for (i, color) in colors.into_iter().enumerate() {
            let angle = i as f32 * std::f32::consts::FRAC_PI_2;
            let x = angle.cos() * 9.0;
            let z = angle.sin() * 9.0 - 10.0;
            scene.add_light(PointLight::new(
                Vec3::new(x, hills(x, z) + 3.0, z),
                color,
                4.0,
                10.0,
            ))?;
        }

        scene.set_camera(Camera::new(Vec3::new(0.0, 8.0, 14.0), Vec3::new(0.0, 0.0, -10.0)));
        Ok(())
    }
}

impl Level for LightsLevel {
    fn name(&self) -> &str {
        "lights"
    }

    fn chunk(&self, coords: ChunkCoords, chunk_size: f32) -> Chunk {
        terrain_chunk(coords, chunk_size, |_, _| 0.0)
    }

    fn setup(&self, scene: &mut Scene) -> SceneResult<()> {
        scene.stream_chunks(Vec3::ZERO, |coords, size| self.chunk(coords, size));

        let pillar = Arc::new(Mesh::cube());
        let white = Arc::new(Material::new("white"));
        for i in 0..4 {
            let x = (i as f32 - 1.5) * 8.0;
            scene.add_model(
                Model::new(
                    &format!("pillar_{i}"),
                    pillar.clone(),
                    white.clone(),
                    Transform::from_position_scale(Vec3::new(x, 2.0, -12.0), 4.0),
                )
                .with_shadow_cull(ShadowCullFace::Front),
            )?;
        }

        for i in 0..5 {
            for j in 0..5 {
                let hue = (i * 5 + j) as f32 / 25.0 * std::f32::consts::TAU;
                let color = Vec3::new(
                    0.5 + 0.5 * hue.cos(),
                    0.5 + 0.5 * (hue + 2.094).cos(),
                    0.5 + 0.5 * (hue + 4.189).cos(),
                );
                let position = Vec3::new((i as f32 - 2.0) * 5.0, 1.0, (j as f32 - 2.0) * 5.0 - 10.0);
                scene.add_light(PointLight::new(position, color, 2.0, 6.0))?;
            }
        }

        scene.directional_light.intensity = 0.2;
        scene.set_camera(Camera::new(Vec3::new(0.0, 12.0, 10.0), Vec3::new(0.0, 0.0, -10.0)));
        Ok(())
    }
}

impl Level for EmptyLevel {
    fn name(&self) -> &str {
        "empty"
    }

    fn setup(&self, scene: &mut Scene) -> SceneResult<()> {
        scene.set_camera(Camera::default());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_level() {
        let mut scene = Scene::new(32.0, 1);
        let result = load_level("nowhere", &mut scene);
        assert!(matches!(result, Err(EngineError::UnknownLevel(name)) if name == "nowhere"));
    }

    #[test]
    fn test_sandbox_populates_scene() {
        let mut scene = Scene::new(32.0, 1);
        let level = load_level("Sandbox", &mut scene).unwrap();
        assert_eq!(level.name(), "sandbox");
        assert!(scene.chunk_count() >= 9);
        // 25 boxes, 3 spheres, the glass block
        assert_eq!(scene.model_count(), 29);
        assert!(scene.chunks().any(|chunk| chunk.terrain.is_some()));
    }

    #[test]
    fn test_level_names() {
        assert_eq!(level_names(), vec!["sandbox", "lights", "empty"]);
    }
}

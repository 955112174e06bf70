//! Main engine orchestrator

use std::path::Path;

use crate::backend::traits::*;
use crate::error::{EngineError, EngineResult};
use crate::level::{load_level, Level};
use crate::pipeline::{ContextConfig, DeferredPipeline, FrameStats, RenderContext, RenderSettings};
use crate::scene::{CameraInput, Scene};

/// Configuration for initializing the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Window title
    pub title: String,
    /// Initial screen width
    pub width: u32,
    /// Initial screen height
    pub height: u32,
    pub fullscreen: bool,
    /// Level to load at startup
    pub level: String,
    /// Side of a square chunk in world units
    pub chunk_size: f32,
    /// Chunks kept loaded around the camera
    pub view_distance: u32,
    pub shadow_map_size: u32,
    pub settings: RenderSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "Deferred Engine".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
            level: "sandbox".to_string(),
            chunk_size: 32.0,
            view_distance: 2,
            shadow_map_size: 1024,
            settings: RenderSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a `WIDTHxHEIGHT` screen size
    pub fn parse_screen_size(value: &str) -> EngineResult<(u32, u32)> {
        let invalid = || EngineError::InvalidScreenSize(value.to_string());
        let (w, h) = value
            .split_once(['x', 'X'])
            .ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok((width, height))
    }
}

/// Owns the backend, the world and the frame pipeline
pub struct Engine<B: GraphicsBackend> {
    backend: B,
    scene: Scene,
    level: Box<dyn Level>,
    context: RenderContext,
    pipeline: DeferredPipeline,
    config: EngineConfig,
}

impl<B: GraphicsBackend> Engine<B> {
    pub fn new(mut backend: B, config: EngineConfig) -> EngineResult<Self> {
        log::info!(
            "Initializing '{}' on {} at {}x{}{}",
            config.title,
            backend.name(),
            config.width,
            config.height,
            if config.fullscreen { " (fullscreen)" } else { "" }
        );

        if backend.screen_size() != (config.width, config.height) {
            backend.resize(config.width, config.height)?;
        }

        let mut scene = Scene::new(config.chunk_size, config.view_distance);
        let level = load_level(&config.level, &mut scene)?;
        scene.camera.set_aspect(config.width as f32, config.height as f32);
        scene.camera.update();

        let mut context = RenderContext::new(
            &mut backend,
            &ContextConfig {
                shadow_map_size: config.shadow_map_size,
                ..Default::default()
            },
        )?;
        scene.upload(&mut backend, &mut context.gpu_cache)?;
        let pipeline = DeferredPipeline::new(&context, config.settings.clone())?;

        Ok(Self {
            backend,
            scene,
            level,
            context,
            pipeline,
            config,
        })
    }

    /// Advance the camera, stream chunks around it and refresh the scene
    pub fn update(&mut self, dt: f32, input: &CameraInput) {
        self.scene.update(dt, input);
        let level = &self.level;
        let center = self.scene.camera.position;
        let stats = self
            .scene
            .stream_chunks(center, |coords, size| level.chunk(coords, size));
        if stats.rejected > 0 {
            log::warn!("{} chunks rejected while streaming", stats.rejected);
        }
    }

    pub fn render_frame(&mut self) -> EngineResult<FrameStats> {
        let stats = self
            .pipeline
            .render_frame(&mut self.backend, &self.scene, &mut self.context)?;
        Ok(stats)
    }

    pub fn resize(&mut self, width: u32, height: u32) -> EngineResult<()> {
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidScreenSize(format!("{}x{}", width, height)));
        }
        self.backend.resize(width, height)?;
        self.context.resize(&mut self.backend, width, height)?;
        self.scene.camera.set_aspect(width as f32, height as f32);
        self.scene.camera.update();
        self.config.width = width;
        self.config.height = height;
        log::debug!("Resized to {}x{}", width, height);
        Ok(())
    }

    /// Final screen image
    pub fn screenshot(&self) -> EngineResult<image::RgbaImage> {
        let (width, height) = self.backend.screen_size();
        let pixels = self.backend.read_color(None, 0)?;
        image::RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
            EngineError::Backend(BackendError::ReadbackFailed(format!(
                "screen readback does not match {}x{}",
                width, height
            )))
        })
    }

    pub fn save_screenshot<P: AsRef<Path>>(&self, path: P) -> EngineResult<()> {
        self.screenshot()?.save(path.as_ref())?;
        log::info!("Saved frame to {}", path.as_ref().display());
        Ok(())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    pub fn pipeline(&self) -> &DeferredPipeline {
        &self.pipeline
    }

    pub fn settings_mut(&mut self) -> &mut RenderSettings {
        &mut self.pipeline.settings
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn level_name(&self) -> &str {
        self.level.name()
    }
}

impl<B: GraphicsBackend> Drop for Engine<B> {
    fn drop(&mut self) {
        self.context.release(&mut self.backend);
    }
}

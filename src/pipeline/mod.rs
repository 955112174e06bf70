//! Deferred rendering pipeline
//!
//! Stages run in a fixed order, each consuming the named buffers written
//! before it:
//! 1. Geometry - opaque models front-to-back into the G-buffer, terrain last
//! 2. Shadow map - depth (or variance) from the light camera
//! 3. SSAO - hemisphere occlusion, optionally blurred
//! 4. SSR - reflections traced against the previous frame
//! 5. Lighting - directional full-screen pass and stencil light volumes
//! 6. Bloom - three bright-pass levels recombined
//! 7. Forward - blended models back-to-front, then debug lines
//! 8. Post-processing - composite to the screen
//!
//! Every toggle in [`RenderSettings`] degrades the frame instead of failing it.

mod context;
mod forward;
mod geometry;
mod light_volume;
mod lighting;
pub mod postprocess;
mod shadow;
mod ssao;
mod ssr;

pub use context::*;
pub use forward::ForwardRenderer;
pub use geometry::GeometryRenderer;
pub use light_volume::{LightVolumePass, LightVolumeStage};
pub use lighting::LightingRenderer;
pub use postprocess::{BloomRenderer, PostProcessingRenderer};
pub use shadow::ShadowMapRenderer;
pub use ssao::{hemisphere_kernel, SsaoRenderer};
pub use ssr::SsrRenderer;

use glam::{Mat4, Vec3, Vec4};

use crate::backend::traits::GraphicsBackend;
use crate::backend::types::{DrawUniforms, ShaderProgram};
use crate::render_graph::*;
use crate::resources::GpuCache;
use crate::scene::{Category, Model, ModelHandle, Order, Scene};

/// Frames between GPU cache garbage collections
const GC_INTERVAL: u64 = 120;

/// Stage toggles and tuning
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    /// Point lights through stencil volumes
    pub lighting_enabled: bool,
    pub dirlight_enabled: bool,
    pub shadow_enabled: bool,
    /// Variance shadow map instead of plain depth
    pub shadow_variance: bool,
    pub ssao_enabled: bool,
    pub ssao_blur: bool,
    pub ssao_samples: u32,
    pub ssao_radius: f32,
    pub ssao_bias: f32,
    pub ssr_enabled: bool,
    pub ssr_blur: bool,
    pub ssr_max_distance: f32,
    pub ssr_steps: u32,
    pub bloom_enabled: bool,
    pub bloom_threshold: f32,
    pub forward_enabled: bool,
    pub post: PostProcessSettings,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            lighting_enabled: true,
            dirlight_enabled: true,
            shadow_enabled: true,
            shadow_variance: false,
            ssao_enabled: true,
            ssao_blur: true,
            ssao_samples: 16,
            ssao_radius: 0.5,
            ssao_bias: 0.025,
            ssr_enabled: false,
            ssr_blur: true,
            ssr_max_distance: 50.0,
            ssr_steps: 32,
            bloom_enabled: true,
            bloom_threshold: 1.0,
            forward_enabled: true,
            post: PostProcessSettings::default(),
        }
    }
}

/// Composite-stage parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PostProcessSettings {
    pub exposure: f32,
    pub gamma: f32,
    pub vibrance: f32,
    pub saturation: f32,
    pub vignette: f32,
    pub chromatic_aberration: f32,
    pub fog_density: f32,
    pub fog_color: Vec3,
    pub fxaa: bool,
    pub bloom_strength: f32,
}

impl Default for PostProcessSettings {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            gamma: 2.2,
            vibrance: 0.0,
            saturation: 1.0,
            vignette: 0.0,
            chromatic_aberration: 0.0,
            fog_density: 0.0,
            fog_color: Vec3::splat(0.7),
            fxaa: true,
            bloom_strength: 0.04,
        }
    }
}

impl PostProcessSettings {
    /// Color-grading parameters packed as a uniform matrix
    pub fn uniform_block(&self) -> Mat4 {
        Mat4::from_cols(
            Vec4::new(self.vibrance, self.saturation, self.vignette, self.chromatic_aberration),
            self.fog_color.extend(self.fog_density),
            Vec4::new(self.exposure, self.gamma, self.bloom_strength, self.fxaa as u32 as f32),
            Vec4::ZERO,
        )
    }
}

/// What one frame did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    /// Names of the stages that ran, in order
    pub stages: Vec<String>,
    pub models_drawn: usize,
    pub terrain_chunks_drawn: usize,
    pub shadow_casters: usize,
    pub lights_drawn: usize,
    pub transparent_drawn: usize,
    pub line_models_drawn: usize,
}

impl FrameStats {
    pub fn ran(&self, stage: &str) -> bool {
        self.stages.iter().any(|s| s == stage)
    }
}

/// Handles of the models passing `predicate`, in traversal order
pub(crate) fn collect_models<P>(
    scene: &Scene,
    order: Order,
    category: Category,
    predicate: P,
) -> Vec<ModelHandle>
where
    P: FnMut(&Model) -> bool,
{
    let mut models = Vec::new();
    scene.traverse_models(|m| models.push(m.clone()), predicate, order, category);
    models
}

/// Draw one model, binding its material textures when `with_material` is set
pub(crate) fn draw_model(
    backend: &mut dyn GraphicsBackend,
    cache: &mut GpuCache,
    model: &Model,
    program: ShaderProgram,
    view_proj: Mat4,
    with_material: bool,
) -> RenderResult<()> {
    let mesh = cache.mesh(backend, &model.mesh)?;
    let mut uniforms = DrawUniforms::mesh(model.matrix(), view_proj, Vec4::ONE);
    if with_material {
        let textures = cache.material(backend, &model.material)?;
        textures.bind(backend)?;
        uniforms.color = model.material.color();
        uniforms.params = model.material.params();
    }
    backend.draw_mesh(mesh, program, &uniforms)?;
    Ok(())
}

/// The deferred frame: all stages, their compiled graph and the settings
#[derive(Debug)]
pub struct DeferredPipeline {
    graph: FrameGraph,
    compiled: CompiledGraph,
    executor: FrameExecutor,
    pub settings: RenderSettings,
    frame_index: u64,
}

impl DeferredPipeline {
    /// Build every stage against `context` and validate their ordering
    pub fn new(context: &RenderContext, settings: RenderSettings) -> RenderResult<Self> {
        let graph = FrameGraphBuilder::new()
            .stage(GeometryRenderer::new(context)?)
            .stage(ShadowMapRenderer::new(context)?)
            .stage(SsaoRenderer::new(context, &settings)?)
            .stage(SsrRenderer::new(context)?)
            .stage(LightingRenderer::new(context)?)
            .stage(BloomRenderer::new(context)?)
            .stage(ForwardRenderer::new(context)?)
            .stage(PostProcessingRenderer::new(context)?)
            .build();
        let compiled = graph.compile()?;
        log::info!("Deferred pipeline ready: {} stages", graph.len());

        Ok(Self {
            graph,
            compiled,
            executor: FrameExecutor::new(),
            settings,
            frame_index: 0,
        })
    }

    pub fn graph(&self) -> &FrameGraph {
        &self.graph
    }

    pub fn compiled(&self) -> &CompiledGraph {
        &self.compiled
    }

    pub fn stage<S: RenderStage + 'static>(&self) -> Option<&S> {
        self.graph.find::<S>()
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Record one frame into `backend`
    pub fn render_frame(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        scene: &Scene,
        context: &mut RenderContext,
    ) -> RenderResult<FrameStats> {
        backend.begin_frame()?;

        let mut stats = FrameStats {
            frame: self.frame_index,
            ..Default::default()
        };
        {
            let mut frame = FrameContext {
                backend: &mut *backend,
                scene,
                context: &mut *context,
                settings: &self.settings,
                stats: &mut stats,
            };
            self.executor
                .execute(&mut self.graph, &self.compiled, &mut frame)?;
        }

        backend.end_frame()?;
        self.frame_index += 1;
        if self.frame_index % GC_INTERVAL == 0 {
            context.gpu_cache.collect_garbage(backend);
        }

        log::debug!(
            "Frame {}: {} stages, {} models, {} lights, {} transparent",
            stats.frame,
            stats.stages.len(),
            stats.models_drawn,
            stats.lights_drawn,
            stats.transparent_drawn
        );
        Ok(stats)
    }
}

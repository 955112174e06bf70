//! Screen-space reflections
//!
//! Rays are marched against the G-buffer depth and a back-face depth buffer
//! that gives surfaces their thickness. Reflected color comes from the
//! previous frame's lit image; on the first frame the albedo stands in.

use std::any::Any;

use glam::Vec4;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::{buffers, collect_models, draw_model, gbuffer, RenderContext, RenderSettings};
use crate::render_graph::*;
use crate::scene::{Category, Order};

pub struct SsrRenderer {
    gbuffer: RenderTargetHandle,
    backface: RenderTargetHandle,
    ssr: RenderTargetHandle,
    ssr_blur: RenderTargetHandle,
    previous: RenderTargetHandle,
}

impl SsrRenderer {
    pub fn new(context: &RenderContext) -> RenderResult<Self> {
        Ok(Self {
            gbuffer: context.target(buffers::GBUFFER)?,
            backface: context.target(buffers::BACKFACE_DEPTH)?,
            ssr: context.target(buffers::SSR)?,
            ssr_blur: context.target(buffers::SSR_BLUR)?,
            previous: context.target(buffers::PREVIOUS_FRAME)?,
        })
    }

    fn backface_depth(&self, frame: &mut FrameContext) -> RenderResult<()> {
        let camera = &frame.scene.camera;
        let view_proj = camera.view_projection_matrix();

        frame.backend.bind_render_target(Some(self.backface))?;
        frame.backend.set_render_state(&RenderState::default().with_cull_mode(CullMode::Front));
        frame.backend.clear(
            ClearFlags::ALL,
            &ClearValues {
                color: Vec4::ONE,
                ..Default::default()
            },
        )?;
        frame.backend.unbind_textures();

        let models = collect_models(frame.scene, Order::Irrelevant, Category::Opaque, |model| {
            model.visible && camera.frustum.collides(model.aabb())
        });
        for handle in &models {
            draw_model(
                &mut *frame.backend,
                &mut frame.context.gpu_cache,
                &handle.read(),
                ShaderProgram::BackfaceDepth,
                view_proj,
                false,
            )?;
        }
        Ok(())
    }

    fn blur_pass(
        backend: &mut dyn GraphicsBackend,
        source: RenderTargetHandle,
        destination: RenderTargetHandle,
        depth: TextureSource,
        normal: TextureSource,
        program: ShaderProgram,
    ) -> RenderResult<()> {
        let sampler = SamplerDescriptor::default();
        backend.bind_render_target(Some(destination))?;
        backend.clear(ClearFlags::COLOR, &ClearValues { color: Vec4::ZERO, ..Default::default() })?;
        backend.unbind_textures();
        backend.bind_texture(0, TextureSource::Attachment { target: source, index: 0 }, &sampler)?;
        backend.bind_texture(1, depth, &sampler)?;
        backend.bind_texture(2, normal, &sampler)?;
        backend.draw_fullscreen(program, &DrawUniforms::fullscreen(Vec4::ONE, Vec4::ZERO))?;
        Ok(())
    }
}

impl RenderStage for SsrRenderer {
    fn name(&self) -> &str {
        "SSR"
    }

    fn declare(&self, ctx: &mut StageSetupContext) {
        ctx.read(buffers::GBUFFER, ResourceUsage::TextureRead);
        ctx.read(buffers::GBUFFER, ResourceUsage::DepthStencilRead);
        ctx.read_previous(buffers::PREVIOUS_FRAME);
        ctx.write(buffers::BACKFACE_DEPTH, ResourceUsage::RenderTarget);
        ctx.write(buffers::BACKFACE_DEPTH, ResourceUsage::DepthStencilWrite);
        ctx.write(buffers::SSR, ResourceUsage::RenderTarget);
        ctx.write(buffers::SSR_BLUR, ResourceUsage::RenderTarget);
    }

    fn is_enabled(&self, settings: &RenderSettings) -> bool {
        settings.ssr_enabled
    }

    fn execute(&mut self, frame: &mut FrameContext) -> RenderResult<()> {
        self.backface_depth(frame)?;

        let settings = frame.settings;
        let camera = &frame.scene.camera;
        let source = if frame.context.previous_frame_valid {
            TextureSource::Attachment { target: self.previous, index: 0 }
        } else {
            log::trace!("SSR: no previous frame yet, reflecting albedo");
            TextureSource::Attachment { target: self.gbuffer, index: gbuffer::ALBEDO }
        };
        let depth = TextureSource::Depth(self.gbuffer);
        let normal = TextureSource::Attachment { target: self.gbuffer, index: gbuffer::NORMAL };
        let sampler = SamplerDescriptor::default();
        let backend = &mut *frame.backend;

        backend.bind_render_target(Some(self.ssr))?;
        backend.set_render_state(&RenderState::fullscreen());
        backend.clear(ClearFlags::COLOR, &ClearValues { color: Vec4::ZERO, ..Default::default() })?;
        backend.unbind_textures();
        backend.bind_texture(0, source, &sampler)?;
        backend.bind_texture(1, TextureSource::Attachment { target: self.backface, index: 0 }, &sampler)?;
        backend.bind_texture(2, depth, &sampler)?;
        backend.bind_texture(3, normal, &sampler)?;
        backend.draw_fullscreen(
            ShaderProgram::SsrTrace,
            &DrawUniforms {
                model: camera.view_matrix(),
                view_proj: camera.projection_matrix(),
                color: Vec4::ONE,
                params: Vec4::new(0.0, settings.ssr_max_distance, settings.ssr_steps as f32, 0.0),
            },
        )?;

        if settings.ssr_blur {
            Self::blur_pass(backend, self.ssr, self.ssr_blur, depth, normal, ShaderProgram::SsrBlurHorizontal)?;
            Self::blur_pass(backend, self.ssr_blur, self.ssr, depth, normal, ShaderProgram::SsrBlurVertical)?;
        }

        backend.unbind_textures();
        backend.set_render_state(&RenderState::default());
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

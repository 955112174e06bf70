//! Final composite to the screen
//!
//! Tone mapping, gamma and color grading over the lit image plus bloom. The
//! lit image is then kept as the previous frame for reflections.

mod bloom;

pub use bloom::{BloomRenderer, BLOOM_WEIGHTS};

use std::any::Any;

use glam::Vec4;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::{buffers, RenderContext};
use crate::render_graph::*;

pub struct PostProcessingRenderer {
    lbuffer: RenderTargetHandle,
    bloom: RenderTargetHandle,
    previous: RenderTargetHandle,
}

impl PostProcessingRenderer {
    pub fn new(context: &RenderContext) -> RenderResult<Self> {
        Ok(Self {
            lbuffer: context.target(buffers::LBUFFER)?,
            bloom: context.target(buffers::BLOOM)?,
            previous: context.target(buffers::PREVIOUS_FRAME)?,
        })
    }
}

impl RenderStage for PostProcessingRenderer {
    fn name(&self) -> &str {
        "Post Processing"
    }

    fn declare(&self, ctx: &mut StageSetupContext) {
        ctx.read(buffers::LBUFFER, ResourceUsage::TextureRead);
        ctx.read(buffers::LBUFFER, ResourceUsage::DepthStencilRead);
        ctx.read_optional(buffers::BLOOM, ResourceUsage::TextureRead);
        ctx.write(buffers::PREVIOUS_FRAME, ResourceUsage::RenderTarget);
    }

    fn execute(&mut self, frame: &mut FrameContext) -> RenderResult<()> {
        let settings = frame.settings;
        let post = &settings.post;
        let sampler = SamplerDescriptor::default();
        let backend = &mut *frame.backend;

        backend.bind_render_target(None)?;
        backend.set_render_state(&RenderState::fullscreen());
        backend.clear(ClearFlags::ALL, &ClearValues::default())?;
        backend.unbind_textures();
        backend.bind_texture(0, TextureSource::Attachment { target: self.lbuffer, index: 0 }, &sampler)?;
        if settings.bloom_enabled {
            backend.bind_texture(1, TextureSource::Attachment { target: self.bloom, index: 0 }, &sampler)?;
        }
        backend.bind_texture(2, TextureSource::Depth(self.lbuffer), &SamplerDescriptor::nearest())?;

        let bloom_strength = if settings.bloom_enabled {
            post.bloom_strength
        } else {
            0.0
        };
        backend.draw_fullscreen(
            ShaderProgram::PostProcess,
            &DrawUniforms {
                model: post.uniform_block(),
                view_proj: frame.scene.camera.projection_matrix().inverse(),
                color: Vec4::ONE,
                params: Vec4::new(
                    bloom_strength,
                    post.exposure,
                    post.gamma,
                    if post.fxaa { 1.0 } else { 0.0 },
                ),
            },
        )?;
        backend.unbind_textures();

        backend.blit_color(self.lbuffer, 0, Some(self.previous), 0)?;
        frame.context.previous_frame_valid = true;

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

//! Bloom: bright-pass the lit image at three scales and recombine

use std::any::Any;

use glam::Vec4;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::{buffers, RenderContext, RenderSettings};
use crate::render_graph::*;

/// Contribution of each level to the combined buffer, finest first
pub const BLOOM_WEIGHTS: [f32; 3] = [0.5, 0.3, 0.2];

pub struct BloomRenderer {
    lbuffer: RenderTargetHandle,
    levels: [RenderTargetHandle; 3],
    bloom: RenderTargetHandle,
}

impl BloomRenderer {
    pub fn new(context: &RenderContext) -> RenderResult<Self> {
        let [l0, l1, l2] = buffers::BLOOM_LEVELS;
        Ok(Self {
            lbuffer: context.target(buffers::LBUFFER)?,
            levels: [context.target(l0)?, context.target(l1)?, context.target(l2)?],
            bloom: context.target(buffers::BLOOM)?,
        })
    }
}

impl RenderStage for BloomRenderer {
    fn name(&self) -> &str {
        "Bloom"
    }

    fn declare(&self, ctx: &mut StageSetupContext) {
        ctx.read(buffers::LBUFFER, ResourceUsage::TextureRead);
        for level in buffers::BLOOM_LEVELS {
            ctx.write(level, ResourceUsage::RenderTarget);
        }
        ctx.write(buffers::BLOOM, ResourceUsage::RenderTarget);
    }

    fn is_enabled(&self, settings: &RenderSettings) -> bool {
        settings.bloom_enabled
    }

    fn execute(&mut self, frame: &mut FrameContext) -> RenderResult<()> {
        let threshold = frame.settings.bloom_threshold;
        let sampler = SamplerDescriptor::default();
        let transparent = ClearValues {
            color: Vec4::ZERO,
            ..Default::default()
        };
        let backend = &mut *frame.backend;

        backend.set_render_state(&RenderState::fullscreen());
        for (i, level) in self.levels.iter().enumerate() {
            backend.bind_render_target(Some(*level))?;
            backend.clear(ClearFlags::COLOR, &transparent)?;
            backend.unbind_textures();
            backend.bind_texture(
                0,
                TextureSource::Attachment { target: self.lbuffer, index: 0 },
                &sampler,
            )?;
            backend.draw_fullscreen(
                ShaderProgram::BloomBrightPass,
                &DrawUniforms::fullscreen(
                    Vec4::ONE,
                    Vec4::new((1u32 << i) as f32, threshold, 1.0, 0.0),
                ),
            )?;
        }

        backend.bind_render_target(Some(self.bloom))?;
        backend.clear(ClearFlags::COLOR, &transparent)?;
        backend.set_render_state(&RenderState::fullscreen().with_blend(BlendState::weighted_additive()));
        for (level, weight) in self.levels.iter().zip(BLOOM_WEIGHTS) {
            backend.unbind_textures();
            backend.bind_texture(0, TextureSource::Attachment { target: *level, index: 0 }, &sampler)?;
            backend.draw_fullscreen(
                ShaderProgram::BloomCombine,
                &DrawUniforms::fullscreen(Vec4::new(1.0, 1.0, 1.0, weight), Vec4::ZERO),
            )?;
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

//! Shadow map from the directional light camera

use std::any::Any;

use glam::Vec4;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::{buffers, collect_models, draw_model, RenderContext, RenderSettings};
use crate::render_graph::*;
use crate::scene::{Category, Order};

pub struct ShadowMapRenderer {
    shadowmap: RenderTargetHandle,
}

impl ShadowMapRenderer {
    pub fn new(context: &RenderContext) -> RenderResult<Self> {
        Ok(Self {
            shadowmap: context.target(buffers::SHADOWMAP)?,
        })
    }
}

impl RenderStage for ShadowMapRenderer {
    fn name(&self) -> &str {
        "Shadow Map"
    }

    fn declare(&self, ctx: &mut StageSetupContext) {
        ctx.write(buffers::SHADOWMAP, ResourceUsage::RenderTarget);
        ctx.write(buffers::SHADOWMAP, ResourceUsage::DepthStencilWrite);
    }

    fn is_enabled(&self, settings: &RenderSettings) -> bool {
        settings.shadow_enabled
    }

    fn execute(&mut self, frame: &mut FrameContext) -> RenderResult<()> {
        let shadow_camera = &frame.scene.shadow_camera;
        let light_matrix = shadow_camera.light_matrix;
        let frustum = shadow_camera.frustum();
        let program = if frame.settings.shadow_variance {
            ShaderProgram::ShadowVariance
        } else {
            ShaderProgram::ShadowDepth
        };

        frame.backend.bind_render_target(Some(self.shadowmap))?;
        frame.backend.set_render_state(&RenderState::default());
        frame.backend.clear(
            ClearFlags::ALL,
            &ClearValues {
                color: Vec4::ONE,
                ..Default::default()
            },
        )?;
        frame.backend.unbind_textures();

        let casters = collect_models(frame.scene, Order::Irrelevant, Category::Opaque, |model| {
            model.visible && model.casts_shadow && frustum.collides(model.aabb())
        });
        for handle in &casters {
            let model = handle.read();
            frame
                .backend
                .set_render_state(&RenderState::default().with_cull_mode(model.shadow_cull.into()));
            draw_model(
                &mut *frame.backend,
                &mut frame.context.gpu_cache,
                &model,
                program,
                light_matrix,
                false,
            )?;
        }

        frame.backend.set_render_state(&RenderState::default());
        frame.context.light_matrix = light_matrix;
        frame.stats.shadow_casters += casters.len();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

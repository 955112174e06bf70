//! Forward pass over the lit image: blended models, then debug lines

use std::any::Any;
use std::sync::Arc;

use glam::{Mat4, Vec4};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::{buffers, collect_models, draw_model, RenderContext, RenderSettings};
use crate::render_graph::*;
use crate::resources::Mesh;
use crate::scene::{Category, Order};

pub struct ForwardRenderer {
    lbuffer: RenderTargetHandle,
}

impl ForwardRenderer {
    pub fn new(context: &RenderContext) -> RenderResult<Self> {
        Ok(Self {
            lbuffer: context.target(buffers::LBUFFER)?,
        })
    }

    /// Depth tested against the opaque scene but never written
    pub fn blend_state() -> RenderState {
        RenderState {
            depth: DepthState {
                test: Some(CompareFunction::Less),
                write: false,
            },
            blend: Some(BlendState::alpha_blending()),
            ..Default::default()
        }
    }
}

impl RenderStage for ForwardRenderer {
    fn name(&self) -> &str {
        "Forward"
    }

    fn declare(&self, ctx: &mut StageSetupContext) {
        ctx.read(buffers::LBUFFER, ResourceUsage::DepthStencilRead);
        ctx.write(buffers::LBUFFER, ResourceUsage::RenderTarget);
    }

    fn is_enabled(&self, settings: &RenderSettings) -> bool {
        settings.forward_enabled
    }

    fn execute(&mut self, frame: &mut FrameContext) -> RenderResult<()> {
        let camera = &frame.scene.camera;
        let view_proj = camera.view_projection_matrix();

        frame.backend.bind_render_target(Some(self.lbuffer))?;
        frame.backend.set_render_state(&Self::blend_state());

        let blended = collect_models(frame.scene, Order::BackToFront, Category::Blend, |model| {
            model.visible && camera.frustum.collides(model.aabb())
        });
        for handle in &blended {
            frame.backend.unbind_textures();
            draw_model(
                &mut *frame.backend,
                &mut frame.context.gpu_cache,
                &handle.read(),
                ShaderProgram::Forward,
                view_proj,
                true,
            )?;
        }
        frame.stats.transparent_drawn += blended.len();

        let mut lines: Vec<(Arc<Mesh>, Vec4)> = Vec::new();
        frame
            .scene
            .traverse_line_models(|line| lines.push((line.mesh.clone(), line.color)));

        frame.backend.unbind_textures();
        frame
            .backend
            .set_render_state(&RenderState::default().with_cull_mode(CullMode::None));
        for (mesh, color) in &lines {
            let handle = frame.context.gpu_cache.mesh(&mut *frame.backend, mesh)?;
            frame.backend.draw_mesh(
                handle,
                ShaderProgram::Lines,
                &DrawUniforms::mesh(Mat4::IDENTITY, view_proj, *color),
            )?;
        }
        frame.stats.line_models_drawn += lines.len();

        frame.backend.set_render_state(&RenderState::default());
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

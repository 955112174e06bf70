//! G-buffer fill
//!
//! Writes albedo, encoded normals and material parameters plus depth:
//! - attachment 0: albedo
//! - attachment 1: normal
//! - attachment 2: metallic, roughness, parallax scale

use std::any::Any;

use glam::{Mat4, Vec4};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::{buffers, collect_models, draw_model, RenderContext};
use crate::render_graph::*;
use crate::scene::{Category, Order};

pub struct GeometryRenderer {
    gbuffer: RenderTargetHandle,
}

impl GeometryRenderer {
    pub fn new(context: &RenderContext) -> RenderResult<Self> {
        Ok(Self {
            gbuffer: context.target(buffers::GBUFFER)?,
        })
    }
}

impl RenderStage for GeometryRenderer {
    fn name(&self) -> &str {
        "Geometry"
    }

    fn declare(&self, ctx: &mut StageSetupContext) {
        ctx.write(buffers::GBUFFER, ResourceUsage::RenderTarget);
        ctx.write(buffers::GBUFFER, ResourceUsage::DepthStencilWrite);
    }

    fn execute(&mut self, frame: &mut FrameContext) -> RenderResult<()> {
        let camera = &frame.scene.camera;
        let view_proj = camera.view_projection_matrix();

        frame.backend.bind_render_target(Some(self.gbuffer))?;
        frame.backend.set_render_state(&RenderState::default());
        frame.backend.clear(
            ClearFlags::ALL,
            &ClearValues {
                color: Vec4::ZERO,
                ..Default::default()
            },
        )?;

        // Nearest first so later fragments fail the depth test early.
        let models = collect_models(frame.scene, Order::FrontToBack, Category::Opaque, |model| {
            model.visible && camera.frustum.collides(model.aabb())
        });
        for handle in &models {
            let model = handle.read();
            draw_model(
                &mut *frame.backend,
                &mut frame.context.gpu_cache,
                &model,
                ShaderProgram::Geometry,
                view_proj,
                true,
            )?;
        }
        frame.stats.models_drawn += models.len();

        // Terrain is mostly occluded, so it goes last.
        frame.backend.unbind_textures();
        for chunk in frame.scene.chunks() {
            let Some(terrain) = &chunk.terrain else {
                continue;
            };
            if !camera.frustum.collides(&terrain.region()) {
                continue;
            }
            let mesh = frame.context.gpu_cache.mesh(&mut *frame.backend, terrain.mesh())?;
            frame.backend.draw_mesh(
                mesh,
                ShaderProgram::Terrain,
                &DrawUniforms::mesh(Mat4::IDENTITY, view_proj, Vec4::ONE),
            )?;
            frame.stats.terrain_chunks_drawn += 1;
        }

        frame.backend.unbind_textures();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

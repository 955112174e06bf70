//! Deferred lighting into the L-buffer
//!
//! The G-buffer depth and stencil are copied first, so light volumes are
//! tested against the scene. The directional light is one full-screen pass;
//! every point light touching the view frustum gets a stencil light volume.

use std::any::Any;

use glam::{Mat4, Quat, Vec3, Vec4};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::{buffers, gbuffer, LightVolumePass, RenderContext, SsaoRenderer};
use crate::render_graph::*;
use crate::scene::PointLight;

/// The volume sphere is a polygon inscribed in the true sphere; grow it to cover
const LIGHT_VOLUME_SCALE: f32 = 1.05;

pub struct LightingRenderer {
    gbuffer: RenderTargetHandle,
    lbuffer: RenderTargetHandle,
    shadowmap: RenderTargetHandle,
    ssao: RenderTargetHandle,
    ssao_blur: RenderTargetHandle,
    ssr: RenderTargetHandle,
    light_volume: MeshHandle,
}

impl LightingRenderer {
    pub fn new(context: &RenderContext) -> RenderResult<Self> {
        Ok(Self {
            gbuffer: context.target(buffers::GBUFFER)?,
            lbuffer: context.target(buffers::LBUFFER)?,
            shadowmap: context.target(buffers::SHADOWMAP)?,
            ssao: context.target(buffers::SSAO)?,
            ssao_blur: context.target(buffers::SSAO_BLUR)?,
            ssr: context.target(buffers::SSR)?,
            light_volume: context.light_volume(),
        })
    }

    /// Model matrix scaling the unit-diameter sphere around `light`
    pub fn volume_matrix(light: &PointLight) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(light.radius * 2.0 * LIGHT_VOLUME_SCALE),
            Quat::IDENTITY,
            light.position,
        )
    }

    fn gbuffer_attachment(&self, index: u32) -> TextureSource {
        TextureSource::Attachment {
            target: self.gbuffer,
            index,
        }
    }

    fn directional(&self, frame: &mut FrameContext) -> RenderResult<()> {
        let settings = frame.settings;
        let scene = frame.scene;
        let light = &scene.directional_light;
        let sampler = SamplerDescriptor::nearest();
        let backend = &mut *frame.backend;

        backend.set_render_state(&RenderState::fullscreen().with_blend(BlendState::additive()));
        backend.unbind_textures();
        backend.bind_texture(0, self.gbuffer_attachment(gbuffer::ALBEDO), &sampler)?;
        // Each optional input is skipped entirely when its stage is off.
        if settings.ssao_enabled {
            let ssao = if SsaoRenderer::output(settings) == buffers::SSAO_BLUR {
                self.ssao_blur
            } else {
                self.ssao
            };
            backend.bind_texture(1, TextureSource::Attachment { target: ssao, index: 0 }, &sampler)?;
        }
        if settings.shadow_enabled {
            backend.bind_texture(2, TextureSource::Attachment { target: self.shadowmap, index: 0 }, &sampler)?;
        }
        if settings.ssr_enabled {
            backend.bind_texture(3, TextureSource::Attachment { target: self.ssr, index: 0 }, &sampler)?;
        }
        backend.bind_texture(4, self.gbuffer_attachment(gbuffer::NORMAL), &sampler)?;
        backend.bind_texture(5, self.gbuffer_attachment(gbuffer::MATERIAL), &sampler)?;
        backend.bind_texture(6, TextureSource::Depth(self.gbuffer), &sampler)?;

        let flags = |enabled: bool| if enabled { 1.0 } else { 0.0 };
        backend.draw_fullscreen(
            ShaderProgram::DirectionalLight,
            &DrawUniforms {
                model: frame.context.light_matrix,
                view_proj: scene.camera.view_projection_matrix().inverse(),
                color: (light.color * light.intensity).extend(light.ambient),
                params: Vec4::new(
                    flags(settings.ssao_enabled),
                    flags(settings.shadow_enabled),
                    flags(settings.ssr_enabled),
                    flags(settings.shadow_variance),
                ),
            },
        )?;
        backend.unbind_textures();
        Ok(())
    }

    fn point_light(&self, frame: &mut FrameContext, light: &PointLight) -> RenderResult<()> {
        let view_proj = frame.scene.camera.view_projection_matrix();
        let uniforms = DrawUniforms::mesh(
            Self::volume_matrix(light),
            view_proj,
            (light.color * light.intensity).extend(1.0),
        )
        .with_params(light.position.extend(light.radius));
        let textures = [
            (0, self.gbuffer_attachment(gbuffer::ALBEDO)),
            (1, self.gbuffer_attachment(gbuffer::NORMAL)),
            (2, self.gbuffer_attachment(gbuffer::MATERIAL)),
            (3, TextureSource::Depth(self.gbuffer)),
        ];

        let mut pass = LightVolumePass::new(&mut *frame.backend);
        pass.mark(self.light_volume, &uniforms)?;
        pass.shade(self.light_volume, &uniforms, &textures)?;
        Ok(())
    }
}

impl RenderStage for LightingRenderer {
    fn name(&self) -> &str {
        "Lighting"
    }

    fn declare(&self, ctx: &mut StageSetupContext) {
        ctx.read(buffers::GBUFFER, ResourceUsage::TextureRead);
        ctx.read(buffers::GBUFFER, ResourceUsage::DepthStencilRead);
        ctx.read_optional(buffers::SHADOWMAP, ResourceUsage::TextureRead);
        ctx.read_optional(buffers::SSAO, ResourceUsage::TextureRead);
        ctx.read_optional(buffers::SSAO_BLUR, ResourceUsage::TextureRead);
        ctx.read_optional(buffers::SSR, ResourceUsage::TextureRead);
        ctx.write(buffers::LBUFFER, ResourceUsage::RenderTarget);
        ctx.write(buffers::LBUFFER, ResourceUsage::DepthStencilWrite);
    }

    fn execute(&mut self, frame: &mut FrameContext) -> RenderResult<()> {
        frame.backend.blit_depth_stencil(self.gbuffer, self.lbuffer)?;
        frame.backend.bind_render_target(Some(self.lbuffer))?;
        frame.backend.set_render_state(&RenderState::default());
        frame.backend.clear(ClearFlags::COLOR, &ClearValues::default())?;

        if frame.settings.dirlight_enabled {
            self.directional(frame)?;
        }

        if frame.settings.lighting_enabled {
            let lights = frame.scene.visible_lights();
            for light in &lights {
                self.point_light(frame, light)?;
            }
            frame.stats.lights_drawn += lights.len();
        }

        frame.backend.unbind_textures();
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_covers_radius() {
        let light = PointLight::new(Vec3::new(1.0, 2.0, 3.0), Vec3::ONE, 1.0, 4.0);
        let matrix = LightingRenderer::volume_matrix(&light);
        // Unit-diameter sphere surface point.
        let surface = matrix.transform_point3(Vec3::new(0.5, 0.0, 0.0));
        assert!(surface.distance(light.position) >= light.radius);
        assert_eq!(matrix.transform_point3(Vec3::ZERO), light.position);
    }
}

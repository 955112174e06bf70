//! Screen-space ambient occlusion

use std::any::Any;
use std::f32::consts::TAU;

use glam::{Vec3, Vec4};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::pipeline::{buffers, gbuffer, RenderContext, RenderSettings};
use crate::render_graph::*;

/// Van der Corput radical inverse in base 2
fn radical_inverse(i: u32) -> f32 {
    i.reverse_bits() as f32 * (1.0 / 4_294_967_296.0)
}

/// Tangent-space hemisphere samples from the Hammersley sequence.
///
/// Samples point into +Z and their length grows quadratically from 0.1 to 1,
/// concentrating occluders near the shaded point.
pub fn hemisphere_kernel(count: u32) -> Vec<Vec3> {
    (0..count)
        .map(|i| {
            let cos_theta = (i as f32 + 0.5) / count as f32;
            let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
            let phi = TAU * radical_inverse(i);
            let direction = Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta);

            let t = i as f32 / count as f32;
            direction * (0.1 + 0.9 * t * t)
        })
        .collect()
}

pub struct SsaoRenderer {
    gbuffer: RenderTargetHandle,
    ssao: RenderTargetHandle,
    ssao_blur: RenderTargetHandle,
    kernel: Vec<Vec3>,
}

impl SsaoRenderer {
    pub fn new(context: &RenderContext, settings: &RenderSettings) -> RenderResult<Self> {
        Ok(Self {
            gbuffer: context.target(buffers::GBUFFER)?,
            ssao: context.target(buffers::SSAO)?,
            ssao_blur: context.target(buffers::SSAO_BLUR)?,
            kernel: hemisphere_kernel(settings.ssao_samples),
        })
    }

    pub fn kernel(&self) -> &[Vec3] {
        &self.kernel
    }

    /// Buffer holding the final occlusion term for `settings`
    pub fn output(settings: &RenderSettings) -> &'static str {
        if settings.ssao_blur {
            buffers::SSAO_BLUR
        } else {
            buffers::SSAO
        }
    }
}

impl RenderStage for SsaoRenderer {
    fn name(&self) -> &str {
        "SSAO"
    }

    fn declare(&self, ctx: &mut StageSetupContext) {
        ctx.read(buffers::GBUFFER, ResourceUsage::TextureRead);
        ctx.read(buffers::GBUFFER, ResourceUsage::DepthStencilRead);
        ctx.write(buffers::SSAO, ResourceUsage::RenderTarget);
        ctx.write(buffers::SSAO_BLUR, ResourceUsage::RenderTarget);
    }

    fn is_enabled(&self, settings: &RenderSettings) -> bool {
        settings.ssao_enabled
    }

    fn execute(&mut self, frame: &mut FrameContext) -> RenderResult<()> {
        let settings = frame.settings;
        if self.kernel.len() != settings.ssao_samples as usize {
            self.kernel = hemisphere_kernel(settings.ssao_samples);
            log::debug!("SSAO kernel rebuilt with {} samples", self.kernel.len());
        }

        let camera = &frame.scene.camera;
        let projection = camera.projection_matrix();
        let sampler = SamplerDescriptor::nearest();
        let backend = &mut *frame.backend;

        backend.bind_render_target(Some(self.ssao))?;
        backend.set_render_state(&RenderState::fullscreen());
        backend.clear(ClearFlags::COLOR, &ClearValues { color: Vec4::ONE, ..Default::default() })?;
        backend.unbind_textures();
        backend.bind_texture(0, TextureSource::Depth(self.gbuffer), &sampler)?;
        backend.bind_texture(
            1,
            TextureSource::Attachment { target: self.gbuffer, index: gbuffer::NORMAL },
            &sampler,
        )?;
        backend.draw_fullscreen(
            ShaderProgram::SsaoGenerate,
            &DrawUniforms {
                model: projection,
                view_proj: projection.inverse(),
                color: Vec4::ONE,
                params: Vec4::new(
                    settings.ssao_radius,
                    settings.ssao_bias,
                    self.kernel.len() as f32,
                    0.0,
                ),
            },
        )?;

        if settings.ssao_blur {
            backend.bind_render_target(Some(self.ssao_blur))?;
            backend.clear(ClearFlags::COLOR, &ClearValues { color: Vec4::ONE, ..Default::default() })?;
            backend.unbind_textures();
            backend.bind_texture(
                0,
                TextureSource::Attachment { target: self.ssao, index: 0 },
                &SamplerDescriptor::default(),
            )?;
            backend.draw_fullscreen(
                ShaderProgram::SsaoBlur,
                &DrawUniforms::fullscreen(Vec4::ONE, Vec4::ZERO),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_lies_in_hemisphere() {
        let kernel = hemisphere_kernel(16);
        assert_eq!(kernel.len(), 16);
        for sample in &kernel {
            assert!(sample.z > 0.0);
            assert!(sample.length() <= 1.0 + 1e-5);
        }
        let lengths: Vec<f32> = kernel.iter().map(|s| s.length()).collect();
        assert!(lengths.windows(2).all(|w| w[0] <= w[1] + 1e-6));
        assert!((lengths[0] - 0.1).abs() < 1e-5);
    }

    #[test]
    fn test_radical_inverse() {
        assert_eq!(radical_inverse(0), 0.0);
        assert_eq!(radical_inverse(1), 0.5);
        assert_eq!(radical_inverse(2), 0.25);
        assert_eq!(radical_inverse(3), 0.75);
    }
}

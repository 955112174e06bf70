//! Stencil light-volume state machine
//!
//! Each point light is drawn twice with its bounding sphere:
//! 1. Stencil mark: no color, depth test without writes, no culling. Back
//!    faces failing the depth test increment the stencil, front faces failing
//!    it decrement. Pixels whose geometry lies inside the volume end nonzero.
//! 2. Shade: stencil `NotEqual 0`, no depth test, additive blending, front
//!    faces culled so the volume still rasterizes with the camera inside it.
//!
//! Dropping the pass restores `RenderState::default()` whatever stage it
//! reached, including when no light was drawn at all.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::{RenderError, RenderResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightVolumeStage {
    Idle,
    StencilMark,
    Shade,
}

impl LightVolumeStage {
    pub fn label(&self) -> &'static str {
        match self {
            LightVolumeStage::Idle => "idle",
            LightVolumeStage::StencilMark => "stencil mark",
            LightVolumeStage::Shade => "shade",
        }
    }
}

pub struct LightVolumePass<'a, B: GraphicsBackend + ?Sized> {
    backend: &'a mut B,
    stage: LightVolumeStage,
}

impl<'a, B: GraphicsBackend + ?Sized> LightVolumePass<'a, B> {
    pub fn new(backend: &'a mut B) -> Self {
        Self {
            backend,
            stage: LightVolumeStage::Idle,
        }
    }

    pub fn stage(&self) -> LightVolumeStage {
        self.stage
    }

    pub fn mark_state() -> RenderState {
        RenderState {
            depth: DepthState {
                test: Some(CompareFunction::Less),
                write: false,
            },
            stencil: Some(StencilState::separate(
                StencilFaceState::on_depth_fail(StencilOperation::DecrementWrap),
                StencilFaceState::on_depth_fail(StencilOperation::IncrementWrap),
            )),
            blend: None,
            cull_mode: CullMode::None,
            front_face: FrontFace::Ccw,
            color_writes: ColorWrites::empty(),
        }
    }

    pub fn shade_state() -> RenderState {
        RenderState {
            depth: DepthState {
                test: None,
                write: false,
            },
            stencil: Some(StencilState::both(StencilFaceState::test(
                CompareFunction::NotEqual,
            ))),
            blend: Some(BlendState::additive()),
            cull_mode: CullMode::Front,
            front_face: FrontFace::Ccw,
            color_writes: ColorWrites::ALL,
        }
    }

    /// Clear the stencil and mark the pixels inside `volume`
    pub fn mark(&mut self, volume: MeshHandle, uniforms: &DrawUniforms) -> RenderResult<()> {
        if self.stage == LightVolumeStage::StencilMark {
            return Err(self.invalid(LightVolumeStage::StencilMark));
        }
        self.stage = LightVolumeStage::StencilMark;
        self.backend.clear(ClearFlags::STENCIL, &ClearValues::default())?;
        self.backend.set_render_state(&Self::mark_state());
        self.backend
            .draw_mesh(volume, ShaderProgram::StencilMark, uniforms)?;
        Ok(())
    }

    /// Shade the marked pixels; `textures` are bound before drawing
    pub fn shade(
        &mut self,
        volume: MeshHandle,
        uniforms: &DrawUniforms,
        textures: &[(u32, TextureSource)],
    ) -> RenderResult<()> {
        if self.stage != LightVolumeStage::StencilMark {
            return Err(self.invalid(LightVolumeStage::Shade));
        }
        self.stage = LightVolumeStage::Shade;
        self.backend.set_render_state(&Self::shade_state());
        let sampler = SamplerDescriptor::nearest();
        for (unit, source) in textures {
            self.backend.bind_texture(*unit, *source, &sampler)?;
        }
        self.backend
            .draw_mesh(volume, ShaderProgram::PointLight, uniforms)?;
        Ok(())
    }

    fn invalid(&self, to: LightVolumeStage) -> RenderError {
        RenderError::InvalidTransition {
            from: self.stage.label(),
            to: to.label(),
        }
    }
}

impl<'a, B: GraphicsBackend + ?Sized> Drop for LightVolumePass<'a, B> {
    fn drop(&mut self) {
        self.backend.set_render_state(&RenderState::default());
        self.backend.unbind_textures();
        self.stage = LightVolumeStage::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareBackend;
    use crate::resources::Mesh;
    use glam::{Mat4, Vec3, Vec4};

    #[test]
    fn test_shade_requires_mark() {
        let mut backend = SoftwareBackend::new(8, 8);
        let sphere = backend.create_mesh(&Mesh::sphere(8, 6).descriptor()).unwrap();
        {
            let mut pass = LightVolumePass::new(&mut backend);
            let err = pass.shade(sphere, &DrawUniforms::default(), &[]).unwrap_err();
            assert!(matches!(err, RenderError::InvalidTransition { from: "idle", to: "shade" }));
        }
        assert_eq!(backend.render_state(), RenderState::default());
    }

    #[test]
    fn test_state_restored_after_shading() {
        let mut backend = SoftwareBackend::new(16, 16);
        let sphere = backend.create_mesh(&Mesh::sphere(8, 6).descriptor()).unwrap();
        let view_proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0)
            * Mat4::look_at_rh(Vec3::ZERO, -Vec3::Z, Vec3::Y);
        let uniforms = DrawUniforms::mesh(
            Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0)) * Mat4::from_scale(Vec3::splat(4.0)),
            view_proj,
            Vec4::ONE,
        );

        {
            let mut pass = LightVolumePass::new(&mut backend);
            pass.mark(sphere, &uniforms).unwrap();
            assert_eq!(pass.stage(), LightVolumeStage::StencilMark);
            pass.shade(sphere, &uniforms, &[]).unwrap();
            assert_eq!(pass.stage(), LightVolumeStage::Shade);
        }
        assert_eq!(backend.render_state(), RenderState::default());

        let log = backend.draw_log();
        assert_eq!(log[0].program, ShaderProgram::StencilMark);
        assert!(log[0].state.color_writes.is_empty());
        assert_eq!(log[1].program, ShaderProgram::PointLight);
        assert_eq!(log[1].state.cull_mode, CullMode::Front);
    }
}

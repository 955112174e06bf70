//! Core backend abstraction traits
//!
//! The pipeline talks to the GPU only through [`GraphicsBackend`]: create
//! resources, apply fixed-function state, bind, draw. Commands execute in
//! submission order.

use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create render target: {0}")]
    RenderTargetCreationFailed(String),
    #[error("Failed to create mesh: {0}")]
    MeshCreationFailed(String),
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
    #[error("Failed to blit: {0}")]
    BlitFailed(String),
    #[error("Failed to read back: {0}")]
    ReadbackFailed(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a sampled texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to an uploaded mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub(crate) u64);

/// Handle to an off-screen render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetHandle(pub(crate) u64);

/// What a texture unit samples from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSource {
    Texture(TextureHandle),
    /// Color attachment `index` of a render target
    Attachment {
        target: RenderTargetHandle,
        index: u32,
    },
    /// Depth of a render target's depth-stencil attachment
    Depth(RenderTargetHandle),
}

/// Abstract graphics device
///
/// `None` as a render target means the screen.
pub trait GraphicsBackend {
    fn name(&self) -> &str;

    /// Screen (default framebuffer) size
    fn screen_size(&self) -> (u32, u32);

    fn resize(&mut self, width: u32, height: u32) -> BackendResult<()>;

    fn begin_frame(&mut self) -> BackendResult<()>;

    fn end_frame(&mut self) -> BackendResult<()>;

    /// Create a sampled texture, optionally with initial RGBA8 data
    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> BackendResult<TextureHandle>;

    fn destroy_texture(&mut self, texture: TextureHandle);

    fn create_render_target(
        &mut self,
        desc: &RenderTargetDescriptor,
    ) -> BackendResult<RenderTargetHandle>;

    fn resize_render_target(
        &mut self,
        target: RenderTargetHandle,
        width: u32,
        height: u32,
    ) -> BackendResult<()>;

    fn destroy_render_target(&mut self, target: RenderTargetHandle);

    fn create_mesh(&mut self, desc: &MeshDescriptor) -> BackendResult<MeshHandle>;

    fn destroy_mesh(&mut self, mesh: MeshHandle);

    fn bind_render_target(&mut self, target: Option<RenderTargetHandle>) -> BackendResult<()>;

    /// Clear the bound target
    fn clear(&mut self, flags: ClearFlags, values: &ClearValues) -> BackendResult<()>;

    fn set_render_state(&mut self, state: &RenderState);

    fn render_state(&self) -> RenderState;

    fn bind_texture(
        &mut self,
        unit: u32,
        source: TextureSource,
        sampler: &SamplerDescriptor,
    ) -> BackendResult<()>;

    fn unbind_textures(&mut self);

    /// Copy depth and stencil between two targets of equal size
    fn blit_depth_stencil(
        &mut self,
        src: RenderTargetHandle,
        dst: RenderTargetHandle,
    ) -> BackendResult<()>;

    /// Copy a color attachment, resampling when sizes differ
    fn blit_color(
        &mut self,
        src: RenderTargetHandle,
        src_index: u32,
        dst: Option<RenderTargetHandle>,
        dst_index: u32,
    ) -> BackendResult<()>;

    fn draw_mesh(
        &mut self,
        mesh: MeshHandle,
        program: ShaderProgram,
        uniforms: &DrawUniforms,
    ) -> BackendResult<()>;

    fn draw_fullscreen(&mut self, program: ShaderProgram, uniforms: &DrawUniforms)
        -> BackendResult<()>;

    /// Read a color attachment back as tightly packed RGBA8
    fn read_color(&self, target: Option<RenderTargetHandle>, index: u32) -> BackendResult<Vec<u8>>;
}

//! Common types shared between backends

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    R8Unorm,
    R32Float,
    Rg32Float,
    Depth24PlusStencil8,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth24PlusStencil8)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R8Unorm => 1,
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Depth24PlusStencil8
            | TextureFormat::R32Float => 4,
            TextureFormat::Rgba16Float | TextureFormat::Rg32Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }

    /// Number of meaningful channels
    pub fn channels(&self) -> usize {
        match self {
            TextureFormat::R8Unorm | TextureFormat::R32Float => 1,
            TextureFormat::Rg32Float => 2,
            TextureFormat::Depth24PlusStencil8 => 2,
            _ => 4,
        }
    }

    /// True when stored values are clamped to `[0, 1]`
    pub fn is_normalized(&self) -> bool {
        matches!(
            self,
            TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb | TextureFormat::R8Unorm
        )
    }
}

/// Sampled texture descriptor
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
        }
    }
}

/// Off-screen framebuffer: color attachments plus an optional depth-stencil
#[derive(Debug, Clone)]
pub struct RenderTargetDescriptor {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub color_formats: Vec<TextureFormat>,
    pub depth_stencil: bool,
}

/// Mesh upload descriptor
#[derive(Debug, Clone, Copy)]
pub struct MeshDescriptor<'a> {
    pub label: &'a str,
    pub vertices: &'a [Vertex],
    pub indices: &'a [u32],
    pub topology: PrimitiveTopology,
}

/// Standard vertex with position, normal, UV, and tangent
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub tangent: Vec4,
}

/// Per-draw uniform block
///
/// `color` and `params` carry the program-specific values: albedo and
/// material parameters for geometry, light color and attenuation for lights,
/// weights and settings for full-screen passes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DrawUniforms {
    pub model: Mat4,
    pub view_proj: Mat4,
    pub color: Vec4,
    pub params: Vec4,
}

impl Default for DrawUniforms {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
            view_proj: Mat4::IDENTITY,
            color: Vec4::ONE,
            params: Vec4::ZERO,
        }
    }
}

impl DrawUniforms {
    pub fn mesh(model: Mat4, view_proj: Mat4, color: Vec4) -> Self {
        Self {
            model,
            view_proj,
            color,
            params: Vec4::ZERO,
        }
    }

    pub fn fullscreen(color: Vec4, params: Vec4) -> Self {
        Self {
            color,
            params,
            ..Default::default()
        }
    }

    pub fn with_params(mut self, params: Vec4) -> Self {
        self.params = params;
        self
    }
}

/// Shader programs the pipeline issues draws with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderProgram {
    /// G-buffer fill for models
    Geometry,
    /// G-buffer fill for terrain chunks
    Terrain,
    /// Depth-only light-space render
    ShadowDepth,
    /// Light-space depth moments for variance shadows
    ShadowVariance,
    SsaoGenerate,
    SsaoBlur,
    /// Depth of back faces, used by the reflection trace
    BackfaceDepth,
    SsrTrace,
    SsrBlurHorizontal,
    SsrBlurVertical,
    DirectionalLight,
    /// Null fragment program for stencil marking
    StencilMark,
    PointLight,
    BloomBrightPass,
    BloomBlur,
    BloomCombine,
    /// Blended geometry drawn after lighting
    Forward,
    Lines,
    PostProcess,
    Copy,
}

impl ShaderProgram {
    pub fn is_fullscreen(&self) -> bool {
        matches!(
            self,
            ShaderProgram::SsaoGenerate
                | ShaderProgram::SsaoBlur
                | ShaderProgram::SsrTrace
                | ShaderProgram::SsrBlurHorizontal
                | ShaderProgram::SsrBlurVertical
                | ShaderProgram::DirectionalLight
                | ShaderProgram::BloomBrightPass
                | ShaderProgram::BloomBlur
                | ShaderProgram::BloomCombine
                | ShaderProgram::PostProcess
                | ShaderProgram::Copy
        )
    }
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    TriangleList,
}

/// Front face winding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    Ccw,
    Cw,
}

/// Cull mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Compare function for depth/stencil
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

impl CompareFunction {
    pub fn passes<T: PartialOrd>(&self, value: T, reference: T) -> bool {
        match self {
            CompareFunction::Never => false,
            CompareFunction::Less => value < reference,
            CompareFunction::Equal => value == reference,
            CompareFunction::LessEqual => value <= reference,
            CompareFunction::Greater => value > reference,
            CompareFunction::NotEqual => value != reference,
            CompareFunction::GreaterEqual => value >= reference,
            CompareFunction::Always => true,
        }
    }
}

/// Stencil buffer update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilOperation {
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    IncrementWrap,
    DecrementWrap,
    Invert,
}

impl StencilOperation {
    pub fn apply(&self, value: u8, reference: u8) -> u8 {
        match self {
            StencilOperation::Keep => value,
            StencilOperation::Zero => 0,
            StencilOperation::Replace => reference,
            StencilOperation::IncrementClamp => value.saturating_add(1),
            StencilOperation::DecrementClamp => value.saturating_sub(1),
            StencilOperation::IncrementWrap => value.wrapping_add(1),
            StencilOperation::DecrementWrap => value.wrapping_sub(1),
            StencilOperation::Invert => !value,
        }
    }
}

/// Stencil behavior for one face orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilFaceState {
    pub compare: CompareFunction,
    pub fail_op: StencilOperation,
    pub depth_fail_op: StencilOperation,
    pub pass_op: StencilOperation,
}

impl StencilFaceState {
    pub const IGNORE: Self = Self {
        compare: CompareFunction::Always,
        fail_op: StencilOperation::Keep,
        depth_fail_op: StencilOperation::Keep,
        pass_op: StencilOperation::Keep,
    };

    /// Test against the reference without touching the buffer
    pub fn test(compare: CompareFunction) -> Self {
        Self {
            compare,
            ..Self::IGNORE
        }
    }

    /// Always pass; apply `op` where the depth test fails
    pub fn on_depth_fail(op: StencilOperation) -> Self {
        Self {
            depth_fail_op: op,
            ..Self::IGNORE
        }
    }
}

/// Stencil test configuration with separate front and back face ops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilState {
    pub front: StencilFaceState,
    pub back: StencilFaceState,
    pub reference: u8,
    pub read_mask: u8,
    pub write_mask: u8,
}

impl StencilState {
    pub fn separate(front: StencilFaceState, back: StencilFaceState) -> Self {
        Self {
            front,
            back,
            reference: 0,
            read_mask: 0xFF,
            write_mask: 0xFF,
        }
    }

    pub fn both(face: StencilFaceState) -> Self {
        Self::separate(face, face)
    }
}

/// Depth test and write state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    /// `None` disables the depth test
    pub test: Option<CompareFunction>,
    pub write: bool,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test: Some(CompareFunction::Less),
            write: true,
        }
    }
}

/// Blend factor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    Src,
    OneMinusSrc,
    SrcAlpha,
    OneMinusSrcAlpha,
    Dst,
    OneMinusDst,
    DstAlpha,
    OneMinusDstAlpha,
}

/// Blend operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOperation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Blend component state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendComponent {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub operation: BlendOperation,
}

impl Default for BlendComponent {
    fn default() -> Self {
        Self {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::Zero,
            operation: BlendOperation::Add,
        }
    }
}

/// Blend state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendState {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

impl BlendState {
    pub fn alpha_blending() -> Self {
        Self {
            color: BlendComponent {
                src_factor: BlendFactor::SrcAlpha,
                dst_factor: BlendFactor::OneMinusSrcAlpha,
                operation: BlendOperation::Add,
            },
            alpha: BlendComponent {
                src_factor: BlendFactor::One,
                dst_factor: BlendFactor::OneMinusSrcAlpha,
                operation: BlendOperation::Add,
            },
        }
    }

    pub fn additive() -> Self {
        Self {
            color: BlendComponent {
                src_factor: BlendFactor::One,
                dst_factor: BlendFactor::One,
                operation: BlendOperation::Add,
            },
            alpha: BlendComponent::default(),
        }
    }

    /// Additive with the source scaled by its alpha
    pub fn weighted_additive() -> Self {
        Self {
            color: BlendComponent {
                src_factor: BlendFactor::SrcAlpha,
                dst_factor: BlendFactor::One,
                operation: BlendOperation::Add,
            },
            alpha: BlendComponent::default(),
        }
    }
}

bitflags! {
    /// Color channel write mask
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ColorWrites: u32 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

bitflags! {
    /// Buffers touched by a clear
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClearFlags: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
        const ALL = Self::COLOR.bits() | Self::DEPTH.bits() | Self::STENCIL.bits();
    }
}

/// Values written by a clear
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValues {
    pub color: Vec4,
    pub depth: f32,
    pub stencil: u8,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            depth: 1.0,
            stencil: 0,
        }
    }
}

/// Complete fixed-function state for a draw
///
/// `RenderState::default()` is the baseline every pipeline stage restores
/// before returning: depth test `Less` with writes, no stencil, no blending,
/// back faces culled, counter-clockwise front faces, all channels written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderState {
    pub depth: DepthState,
    pub stencil: Option<StencilState>,
    pub blend: Option<BlendState>,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub color_writes: ColorWrites,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            depth: DepthState::default(),
            stencil: None,
            blend: None,
            cull_mode: CullMode::Back,
            front_face: FrontFace::Ccw,
            color_writes: ColorWrites::ALL,
        }
    }
}

impl RenderState {
    /// Full-screen pass: no depth, no culling
    pub fn fullscreen() -> Self {
        Self {
            depth: DepthState {
                test: None,
                write: false,
            },
            cull_mode: CullMode::None,
            ..Default::default()
        }
    }

    pub fn with_blend(mut self, blend: BlendState) -> Self {
        self.blend = Some(blend);
        self
    }

    pub fn with_cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }
}

/// Filter mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Address mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

impl AddressMode {
    /// Map a texel coordinate into `0..size`
    pub fn wrap(&self, coord: i64, size: u32) -> u32 {
        let size = size.max(1) as i64;
        let wrapped = match self {
            AddressMode::ClampToEdge => coord.clamp(0, size - 1),
            AddressMode::Repeat => coord.rem_euclid(size),
            AddressMode::MirrorRepeat => {
                let period = coord.rem_euclid(size * 2);
                if period < size {
                    period
                } else {
                    size * 2 - 1 - period
                }
            }
        };
        wrapped as u32
    }
}

/// Sampler descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerDescriptor {
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
        }
    }
}

impl SamplerDescriptor {
    pub fn nearest() -> Self {
        Self {
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stencil_ops_wrap() {
        assert_eq!(StencilOperation::IncrementWrap.apply(255, 0), 0);
        assert_eq!(StencilOperation::DecrementWrap.apply(0, 0), 255);
        assert_eq!(StencilOperation::IncrementClamp.apply(255, 0), 255);
        assert_eq!(StencilOperation::Replace.apply(3, 7), 7);
    }

    #[test]
    fn test_address_modes() {
        assert_eq!(AddressMode::ClampToEdge.wrap(-3, 4), 0);
        assert_eq!(AddressMode::Repeat.wrap(-1, 4), 3);
        assert_eq!(AddressMode::MirrorRepeat.wrap(4, 4), 3);
        assert_eq!(AddressMode::MirrorRepeat.wrap(9, 4), 1);
    }
}

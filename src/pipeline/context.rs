//! Named buffer modules shared by the pipeline stages
//!
//! [`RenderContext`] is built once at startup and passed to every stage
//! constructor. Stages resolve the buffers they need by name at construction,
//! so a missing buffer surfaces before the first frame.

use std::collections::HashMap;

use glam::Mat4;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::{RenderError, RenderResult, TextureSize};
use crate::resources::{GpuCache, Mesh};

/// Buffer module names
pub mod buffers {
    pub const GBUFFER: &str = "gbuffer";
    pub const LBUFFER: &str = "lbuffer";
    pub const SHADOWMAP: &str = "shadowmap";
    pub const SSAO: &str = "SSAObuffer";
    pub const SSAO_BLUR: &str = "SSAOblurbuffer";
    pub const SSR: &str = "SSRbuffer";
    pub const SSR_BLUR: &str = "SSRblurbuffer";
    pub const BACKFACE_DEPTH: &str = "backfaceDepthBuffer";
    pub const PREVIOUS_FRAME: &str = "previousFrameBuffer";
    pub const BLOOM_LEVELS: [&str; 3] = ["bloom0", "bloom1", "bloom2"];
    pub const BLOOM: &str = "bloom";
}

/// G-buffer color attachment indices
pub mod gbuffer {
    pub const ALBEDO: u32 = 0;
    pub const NORMAL: u32 = 1;
    /// metallic, roughness, parallax
    pub const MATERIAL: u32 = 2;
}

/// A named off-screen render target
#[derive(Debug, Clone)]
pub struct BufferModule {
    pub name: String,
    pub target: RenderTargetHandle,
    pub size: TextureSize,
    pub color_formats: Vec<TextureFormat>,
    pub depth_stencil: bool,
    width: u32,
    height: u32,
}

impl BufferModule {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn attachment(&self, index: u32) -> TextureSource {
        TextureSource::Attachment {
            target: self.target,
            index,
        }
    }

    pub fn depth(&self) -> TextureSource {
        TextureSource::Depth(self.target)
    }
}

/// Size of the off-screen buffers not tied to the screen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextConfig {
    pub shadow_map_size: u32,
    /// Segments of the light-volume sphere; rings use three quarters of it
    pub light_volume_segments: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            shadow_map_size: 1024,
            light_volume_segments: 16,
        }
    }
}

#[derive(Debug)]
pub struct RenderContext {
    buffers: HashMap<String, BufferModule>,
    screen_width: u32,
    screen_height: u32,
    light_volume: MeshHandle,
    pub gpu_cache: GpuCache,
    /// Light view-projection published by the shadow stage
    pub light_matrix: Mat4,
    /// Set once a full frame has been copied into the previous-frame buffer
    pub previous_frame_valid: bool,
}

impl RenderContext {
    /// Context with no buffer modules registered
    pub fn empty<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        config: &ContextConfig,
    ) -> RenderResult<Self> {
        let (screen_width, screen_height) = backend.screen_size();
        let segments = config.light_volume_segments.max(4);
        let sphere = Mesh::sphere(segments, (segments * 3 / 4).max(3));
        let light_volume = backend.create_mesh(&sphere.descriptor())?;

        Ok(Self {
            buffers: HashMap::new(),
            screen_width,
            screen_height,
            light_volume,
            gpu_cache: GpuCache::new(),
            light_matrix: Mat4::IDENTITY,
            previous_frame_valid: false,
        })
    }

    /// Context with every buffer module the deferred pipeline reads
    pub fn new<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        config: &ContextConfig,
    ) -> RenderResult<Self> {
        use buffers::*;
        use TextureFormat::*;

        let mut context = Self::empty(backend, config)?;
        let full = TextureSize::default();
        let shadow = TextureSize::Absolute {
            width: config.shadow_map_size,
            height: config.shadow_map_size,
        };

        context.register(backend, GBUFFER, full, &[Rgba8Unorm, Rgba16Float, Rgba8Unorm], true)?;
        context.register(backend, LBUFFER, full, &[Rgba16Float], true)?;
        context.register(backend, SHADOWMAP, shadow, &[Rg32Float], true)?;
        context.register(backend, SSAO, full, &[R8Unorm], false)?;
        context.register(backend, SSAO_BLUR, full, &[R8Unorm], false)?;
        context.register(backend, BACKFACE_DEPTH, full, &[R32Float], true)?;
        context.register(backend, SSR, full, &[Rgba16Float], false)?;
        context.register(backend, SSR_BLUR, full, &[Rgba16Float], false)?;
        context.register(backend, PREVIOUS_FRAME, full, &[Rgba16Float], false)?;
        for (level, name) in BLOOM_LEVELS.iter().enumerate() {
            let scale = 1.0 / (2u32 << level) as f32;
            context.register(backend, name, TextureSize::scaled(scale), &[Rgba16Float], false)?;
        }
        context.register(backend, BLOOM, TextureSize::scaled(0.5), &[Rgba16Float], false)?;

        log::info!(
            "Render context: {} buffer modules at {}x{}",
            context.buffers.len(),
            context.screen_width,
            context.screen_height
        );
        Ok(context)
    }

    /// Create and register a buffer module
    pub fn register<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        name: &str,
        size: TextureSize,
        color_formats: &[TextureFormat],
        depth_stencil: bool,
    ) -> RenderResult<&BufferModule> {
        if self.buffers.contains_key(name) {
            return Err(RenderError::DuplicateBuffer(name.to_string()));
        }
        let (width, height) = size.resolve(self.screen_width, self.screen_height);
        let target = backend.create_render_target(&RenderTargetDescriptor {
            label: name.to_string(),
            width,
            height,
            color_formats: color_formats.to_vec(),
            depth_stencil,
        })?;
        log::debug!("Registered buffer module '{}' ({}x{})", name, width, height);

        let module = BufferModule {
            name: name.to_string(),
            target,
            size,
            color_formats: color_formats.to_vec(),
            depth_stencil,
            width,
            height,
        };
        Ok(self.buffers.entry(name.to_string()).or_insert(module))
    }

    /// Look up a buffer module; a miss is a configuration error
    pub fn buffer(&self, name: &str) -> RenderResult<&BufferModule> {
        self.buffers.get(name).ok_or_else(|| {
            log::error!("Buffer module '{}' is not registered", name);
            RenderError::MissingBuffer(name.to_string())
        })
    }

    pub fn target(&self, name: &str) -> RenderResult<RenderTargetHandle> {
        self.buffer(name).map(|b| b.target)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.buffers.contains_key(name)
    }

    pub fn buffer_names(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }

    /// Unit-diameter sphere drawn for point light volumes
    pub fn light_volume(&self) -> MeshHandle {
        self.light_volume
    }

    pub fn screen_size(&self) -> (u32, u32) {
        (self.screen_width, self.screen_height)
    }

    /// Resize every screen-relative buffer; previous-frame contents become invalid
    pub fn resize<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        self.screen_width = width;
        self.screen_height = height;
        for module in self.buffers.values_mut() {
            let (w, h) = module.size.resolve(width, height);
            if (w, h) != (module.width, module.height) {
                backend.resize_render_target(module.target, w, h)?;
                module.width = w;
                module.height = h;
            }
        }
        self.previous_frame_valid = false;
        Ok(())
    }

    /// Free every GPU object the context owns
    pub fn release<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        for (_, module) in self.buffers.drain() {
            backend.destroy_render_target(module.target);
        }
        self.gpu_cache.release_all(backend);
        backend.destroy_mesh(self.light_volume);
        self.previous_frame_valid = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareBackend;

    #[test]
    fn test_default_buffers_registered() {
        let mut backend = SoftwareBackend::new(64, 32);
        let context = RenderContext::new(&mut backend, &ContextConfig::default()).unwrap();

        for name in [
            buffers::GBUFFER,
            buffers::LBUFFER,
            buffers::SHADOWMAP,
            buffers::SSAO,
            buffers::SSR,
            buffers::BACKFACE_DEPTH,
            buffers::PREVIOUS_FRAME,
            buffers::BLOOM,
        ] {
            assert!(context.contains(name), "{name}");
        }
        assert_eq!(context.buffer("bloom0").unwrap().dimensions(), (32, 16));
        assert_eq!(context.buffer("bloom2").unwrap().dimensions(), (8, 4));
        assert_eq!(context.buffer(buffers::SHADOWMAP).unwrap().dimensions(), (1024, 1024));
    }

    #[test]
    fn test_missing_buffer_is_an_error() {
        let mut backend = SoftwareBackend::new(8, 8);
        let context = RenderContext::empty(&mut backend, &ContextConfig::default()).unwrap();
        assert!(matches!(
            context.buffer(buffers::GBUFFER),
            Err(RenderError::MissingBuffer(name)) if name == "gbuffer"
        ));
    }

    #[test]
    fn test_resize_follows_relative_sizes() {
        let mut backend = SoftwareBackend::new(64, 32);
        let mut context = RenderContext::new(&mut backend, &ContextConfig::default()).unwrap();
        context.previous_frame_valid = true;

        backend.resize(128, 64).unwrap();
        context.resize(&mut backend, 128, 64).unwrap();
        assert_eq!(context.buffer(buffers::GBUFFER).unwrap().dimensions(), (128, 64));
        assert_eq!(context.buffer(buffers::SHADOWMAP).unwrap().dimensions(), (1024, 1024));
        assert!(!context.previous_frame_valid);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut backend = SoftwareBackend::new(8, 8);
        let mut context = RenderContext::empty(&mut backend, &ContextConfig::default()).unwrap();
        context
            .register(&mut backend, "custom", TextureSize::default(), &[TextureFormat::R8Unorm], false)
            .unwrap();
        assert!(matches!(
            context.register(&mut backend, "custom", TextureSize::default(), &[], false),
            Err(RenderError::DuplicateBuffer(_))
        ));
    }
}

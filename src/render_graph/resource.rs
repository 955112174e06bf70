//! Named buffers as seen by the frame graph

/// How a stage touches a named buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceUsage {
    /// Sampled as a texture
    TextureRead,
    /// Depth or stencil consumed by tests or a blit
    DepthStencilRead,
    /// Written as a color attachment
    RenderTarget,
    DepthStencilWrite,
}

impl ResourceUsage {
    pub fn is_write(&self) -> bool {
        matches!(self, ResourceUsage::RenderTarget | ResourceUsage::DepthStencilWrite)
    }
}

/// When the data being read must have been produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadKind {
    /// Written earlier in the same frame
    Required,
    /// Used when some earlier stage writes it, ignored otherwise
    Optional,
    /// Last frame's contents; no producer is needed this frame
    PreviousFrame,
}

/// One declared access of a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAccess {
    pub buffer: String,
    pub usage: ResourceUsage,
    pub kind: ReadKind,
}

impl ResourceAccess {
    pub fn is_write(&self) -> bool {
        self.usage.is_write()
    }
}

/// Describes buffer dimensions that can be relative to screen size
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextureSize {
    /// Absolute size in pixels
    Absolute { width: u32, height: u32 },
    /// Relative to screen size (1.0 = full screen)
    Relative { width_scale: f32, height_scale: f32 },
}

impl Default for TextureSize {
    fn default() -> Self {
        TextureSize::Relative {
            width_scale: 1.0,
            height_scale: 1.0,
        }
    }
}

impl TextureSize {
    pub fn scaled(scale: f32) -> Self {
        TextureSize::Relative {
            width_scale: scale,
            height_scale: scale,
        }
    }

    /// Pixel size for a screen, never below 1x1
    pub fn resolve(&self, screen_width: u32, screen_height: u32) -> (u32, u32) {
        let (width, height) = match self {
            TextureSize::Absolute { width, height } => (*width, *height),
            TextureSize::Relative {
                width_scale,
                height_scale,
            } => (
                ((screen_width as f32) * width_scale) as u32,
                ((screen_height as f32) * height_scale) as u32,
            ),
        };
        (width.max(1), height.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_size_resolve() {
        assert_eq!(TextureSize::default().resolve(640, 480), (640, 480));
        assert_eq!(TextureSize::scaled(0.125).resolve(640, 480), (80, 60));
        assert_eq!(TextureSize::scaled(0.125).resolve(4, 4), (1, 1));
        assert_eq!(
            TextureSize::Absolute { width: 1024, height: 1024 }.resolve(640, 480),
            (1024, 1024)
        );
    }
}

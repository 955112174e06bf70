//! Render stage definitions for the frame graph

use std::any::Any;

use crate::backend::traits::GraphicsBackend;
use crate::pipeline::{FrameStats, RenderContext, RenderSettings};
use crate::render_graph::graph::RenderResult;
use crate::render_graph::resource::*;
use crate::scene::Scene;

/// Unique identifier for a stage, its submission index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(pub(crate) u32);

/// Collects the buffer accesses a stage declares
#[derive(Debug, Default)]
pub struct StageSetupContext {
    pub(crate) reads: Vec<ResourceAccess>,
    pub(crate) writes: Vec<ResourceAccess>,
}

impl StageSetupContext {
    /// Declare a buffer that must be written earlier this frame
    pub fn read(&mut self, buffer: &str, usage: ResourceUsage) {
        self.push_read(buffer, usage, ReadKind::Required);
    }

    /// Declare a buffer used only when an earlier stage produced it
    pub fn read_optional(&mut self, buffer: &str, usage: ResourceUsage) {
        self.push_read(buffer, usage, ReadKind::Optional);
    }

    /// Declare a read of last frame's contents
    pub fn read_previous(&mut self, buffer: &str) {
        self.push_read(buffer, ResourceUsage::TextureRead, ReadKind::PreviousFrame);
    }

    pub fn write(&mut self, buffer: &str, usage: ResourceUsage) {
        self.writes.push(ResourceAccess {
            buffer: buffer.to_string(),
            usage,
            kind: ReadKind::Required,
        });
    }

    fn push_read(&mut self, buffer: &str, usage: ResourceUsage, kind: ReadKind) {
        self.reads.push(ResourceAccess {
            buffer: buffer.to_string(),
            usage,
            kind,
        });
    }
}

/// Everything a stage may touch while recording one frame
pub struct FrameContext<'a> {
    pub backend: &'a mut dyn GraphicsBackend,
    pub scene: &'a Scene,
    pub context: &'a mut RenderContext,
    pub settings: &'a RenderSettings,
    pub stats: &'a mut FrameStats,
}

/// One step of the frame
///
/// A stage acquires the fixed-function state it needs and leaves
/// `RenderState::default()` bound when `execute` returns.
pub trait RenderStage: Send {
    /// Get the stage name for debugging
    fn name(&self) -> &str;

    /// Declare buffer reads and writes
    fn declare(&self, ctx: &mut StageSetupContext);

    /// Disabled stages are skipped without logging
    fn is_enabled(&self, _settings: &RenderSettings) -> bool {
        true
    }

    fn execute(&mut self, frame: &mut FrameContext) -> RenderResult<()>;

    /// Allow downcasting
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Metadata about a stage in the graph
#[derive(Debug, Clone)]
pub struct StageNode {
    pub id: StageId,
    pub name: String,
    pub reads: Vec<ResourceAccess>,
    pub writes: Vec<ResourceAccess>,
}

impl StageNode {
    pub fn reads_buffer(&self, buffer: &str) -> bool {
        self.reads.iter().any(|a| a.buffer == buffer)
    }

    pub fn writes_buffer(&self, buffer: &str) -> bool {
        self.writes.iter().any(|a| a.buffer == buffer)
    }
}

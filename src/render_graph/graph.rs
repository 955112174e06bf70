//! Frame graph definition and compilation

use std::collections::HashMap;

use thiserror::Error;

use crate::backend::traits::BackendError;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("stage '{stage}' reads '{buffer}' but no earlier stage writes it")]
    UnsatisfiedDependency { stage: String, buffer: String },
    #[error("buffer module '{0}' is not registered")]
    MissingBuffer(String),
    #[error("buffer module '{0}' is already registered")]
    DuplicateBuffer(String),
    #[error("light volume pass cannot go from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Ordered list of stages with their declared accesses
#[derive(Default)]
pub struct FrameGraph {
    stages: Vec<Box<dyn RenderStage>>,
    nodes: Vec<StageNode>,
}

impl FrameGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage; stages run in the order they are added
    pub fn add_stage<S: RenderStage + 'static>(&mut self, stage: S) -> StageId {
        let id = StageId(self.stages.len() as u32);
        let mut setup = StageSetupContext::default();
        stage.declare(&mut setup);

        self.nodes.push(StageNode {
            id,
            name: stage.name().to_string(),
            reads: setup.reads,
            writes: setup.writes,
        });
        self.stages.push(Box::new(stage));
        id
    }

    /// Check every required read has an earlier producer and plan buffer lifetimes.
    pub fn compile(&self) -> RenderResult<CompiledGraph> {
        let mut producers: HashMap<&str, StageId> = HashMap::new();
        let mut dependencies = Vec::new();

        for node in &self.nodes {
            for read in &node.reads {
                match (producers.get(read.buffer.as_str()), read.kind) {
                    (Some(producer), ReadKind::Required | ReadKind::Optional) => {
                        if *producer != node.id {
                            dependencies.push((node.id, *producer));
                        }
                    }
                    (None, ReadKind::Required) => {
                        return Err(RenderError::UnsatisfiedDependency {
                            stage: node.name.clone(),
                            buffer: read.buffer.clone(),
                        });
                    }
                    _ => {}
                }
            }
            for write in &node.writes {
                producers.insert(write.buffer.as_str(), node.id);
            }
        }

        let mut lifetimes: HashMap<String, ResourceLifetime> = HashMap::new();
        for (step, node) in self.nodes.iter().enumerate() {
            for access in node.reads.iter().chain(node.writes.iter()) {
                let lifetime = lifetimes
                    .entry(access.buffer.clone())
                    .or_insert(ResourceLifetime {
                        first_use: step,
                        last_use: step,
                    });
                lifetime.last_use = step;
            }
        }

        dependencies.sort_unstable();
        dependencies.dedup();

        Ok(CompiledGraph {
            order: self.nodes.iter().map(|n| n.id).collect(),
            dependencies,
            lifetimes,
        })
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Get stage nodes (metadata)
    pub fn nodes(&self) -> &[StageNode] {
        &self.nodes
    }

    pub fn node(&self, id: StageId) -> Option<&StageNode> {
        self.nodes.get(id.0 as usize)
    }

    pub fn stage_mut(&mut self, id: StageId) -> Option<&mut (dyn RenderStage + 'static)> {
        self.stages.get_mut(id.0 as usize).map(|s| s.as_mut())
    }

    /// First stage of concrete type `S`
    pub fn find<S: RenderStage + 'static>(&self) -> Option<&S> {
        self.stages.iter().find_map(|s| s.as_any().downcast_ref::<S>())
    }

    pub fn find_mut<S: RenderStage + 'static>(&mut self) -> Option<&mut S> {
        self.stages
            .iter_mut()
            .find_map(|s| s.as_any_mut().downcast_mut::<S>())
    }
}

/// Builder for creating frame graphs with a fluent API
#[derive(Default)]
pub struct FrameGraphBuilder {
    graph: FrameGraph,
}

impl FrameGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage<S: RenderStage + 'static>(mut self, stage: S) -> Self {
        self.graph.add_stage(stage);
        self
    }

    pub fn build(self) -> FrameGraph {
        self.graph
    }
}

/// Buffer lifetime in terms of stage execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLifetime {
    pub first_use: usize,
    pub last_use: usize,
}

/// Validated frame graph with execution order and buffer lifetimes
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    pub order: Vec<StageId>,
    /// `(reader, producer)` pairs
    pub dependencies: Vec<(StageId, StageId)>,
    pub lifetimes: HashMap<String, ResourceLifetime>,
}

impl CompiledGraph {
    /// Check if a buffer is in use at a given execution step
    pub fn is_buffer_alive(&self, buffer: &str, step: usize) -> bool {
        self.lifetimes
            .get(buffer)
            .is_some_and(|l| step >= l.first_use && step <= l.last_use)
    }

    pub fn depends_on(&self, reader: StageId, producer: StageId) -> bool {
        self.dependencies.contains(&(reader, producer))
    }
}

impl std::fmt::Debug for FrameGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameGraph").field("nodes", &self.nodes).finish()
    }
}

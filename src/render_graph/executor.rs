//! Frame graph executor

use crate::backend::types::RenderState;
use crate::render_graph::graph::*;
use crate::render_graph::pass::*;

/// Runs the stages of a compiled graph in order, once per frame
#[derive(Debug, Default)]
pub struct FrameExecutor {
    /// Stages whose state leak was already reported
    leaks_reported: Vec<StageId>,
}

impl FrameExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute every enabled stage.
    ///
    /// A stage that returns with a non-default render state is reported once
    /// and the default state is restored before the next stage runs.
    pub fn execute(
        &mut self,
        graph: &mut FrameGraph,
        compiled: &CompiledGraph,
        frame: &mut FrameContext,
    ) -> RenderResult<()> {
        for &id in &compiled.order {
            let Some(stage) = graph.stage_mut(id) else {
                continue;
            };
            if !stage.is_enabled(frame.settings) {
                continue;
            }

            log::trace!("Executing stage '{}'", stage.name());
            stage.execute(frame)?;
            frame.stats.stages.push(stage.name().to_string());

            if frame.backend.render_state() != RenderState::default() {
                if !self.leaks_reported.contains(&id) {
                    log::error!("Stage '{}' did not restore the default render state", stage.name());
                    self.leaks_reported.push(id);
                }
                frame.backend.set_render_state(&RenderState::default());
            }
        }
        Ok(())
    }
}

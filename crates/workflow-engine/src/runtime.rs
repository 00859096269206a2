use crate::bridge::UserInputBridge;
use crate::clock::Clock;
use crate::loader::DefinitionLoader;
use crate::provider::PromptProvider;
use common::config::EngineConfig;
use common::types::{ExecutionContext, WorkflowDefinition};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Bundles the serializable execution state (§3 `ExecutionContext`) together
/// with the four injected collaborators, a cancellation handle, engine
/// configuration, and the definition currently being traversed. This is the
/// single object an `Engine` and its executors thread through a run; nothing
/// here is process-wide or global.
#[derive(Clone)]
pub struct RunningContext {
    pub data: ExecutionContext,
    pub definition: Arc<WorkflowDefinition>,
    pub prompt_provider: Arc<dyn PromptProvider>,
    pub loader: Arc<dyn DefinitionLoader>,
    pub bridge: Arc<dyn UserInputBridge>,
    pub clock: Arc<dyn Clock>,
    pub cancellation: CancellationToken,
    pub config: Arc<EngineConfig>,
}

impl RunningContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        data: ExecutionContext,
        definition: Arc<WorkflowDefinition>,
        prompt_provider: Arc<dyn PromptProvider>,
        loader: Arc<dyn DefinitionLoader>,
        bridge: Arc<dyn UserInputBridge>,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            data,
            definition,
            prompt_provider,
            loader,
            bridge,
            clock,
            cancellation: CancellationToken::new(),
            config,
        }
    }

    /// A child `RunningContext` sharing collaborators and config but running
    /// a different (or the same) definition under a propagated cancellation
    /// token — used by the SubWorkflow executor.
    pub fn child_for(&self, data: ExecutionContext, definition: Arc<WorkflowDefinition>) -> Self {
        Self {
            data,
            definition,
            prompt_provider: self.prompt_provider.clone(),
            loader: self.loader.clone(),
            bridge: self.bridge.clone(),
            clock: self.clock.clone(),
            cancellation: self.cancellation.child_token(),
            config: self.config.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// A child cancellation token for a sub-workflow instance: cancelling
    /// the parent propagates, but cancelling the child does not reach back up.
    pub fn child_cancellation(&self) -> CancellationToken {
        self.cancellation.child_token()
    }
}

use crate::bridge::UserInputBridge;
use crate::clock::Clock;
use crate::executors::{ExecutorRegistry, GraphRunner, NodeExecutor};
use crate::loader::{DefinitionLoader, LoaderError};
use crate::provider::PromptProvider;
use crate::runtime::RunningContext;
use common::config::EngineConfig;
use common::types::{
    ExecutionContext, ExecutionResult, ExecutionState, JsonValue, Node, NodeError, NodeErrorCode, NodeKind,
    NodeOutput, NodeStatus, WorkflowDefinition,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Applied when a node carries no explicit `timeoutMs` and is not a
/// sub-workflow node (sub-workflows default to `EngineConfig::
/// default_subworkflow_timeout_ms`, 5 minutes, per §4.9).
const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(30);

struct InstanceHandle {
    cancellation: CancellationToken,
    join: AsyncMutex<Option<JoinHandle<ExecutionResult>>>,
}

type Instances = Mutex<HashMap<String, Arc<InstanceHandle>>>;

/// State machine driver: `CREATED → RUNNING → (AWAITING_INPUT ↔ RUNNING)* →
/// (SUCCEEDED | FAILED | CANCELLED)` (§4.3). Holds the injected collaborators
/// and a registry of running instances; the CLI and any other front-end talk
/// to this through [`WorkflowEngine::start_instance`] et al. (§6).
pub struct WorkflowEngine {
    registry: ExecutorRegistry,
    prompt_provider: Arc<dyn PromptProvider>,
    loader: Arc<dyn DefinitionLoader>,
    bridge: Arc<dyn UserInputBridge>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
    instances: Instances,
    results: Mutex<HashMap<String, ExecutionResult>>,
}

struct EngineFacadeHandle(Weak<WorkflowEngine>);

#[async_trait::async_trait]
impl GraphRunner for EngineFacadeHandle {
    async fn run_subgraph(
        &self,
        entry_node_id: &str,
        allowed_nodes: &[String],
        ctx: &mut RunningContext,
    ) -> Result<NodeOutput, NodeOutput> {
        let engine = self
            .0
            .upgrade()
            .expect("workflow engine dropped while a loop body was still executing");
        engine.run_sequence(ctx, entry_node_id, Some(allowed_nodes)).await
    }

    async fn run_to_terminal(&self, ctx: RunningContext) -> ExecutionResult {
        let engine = self
            .0
            .upgrade()
            .expect("workflow engine dropped while a sub-workflow was still executing");
        engine.run_to_terminal_impl(ctx).await
    }
}

impl WorkflowEngine {
    pub fn new(
        prompt_provider: Arc<dyn PromptProvider>,
        loader: Arc<dyn DefinitionLoader>,
        bridge: Arc<dyn UserInputBridge>,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let facade: Arc<dyn GraphRunner> = Arc::new(EngineFacadeHandle(weak.clone()));
            WorkflowEngine {
                registry: ExecutorRegistry::new(facade),
                prompt_provider,
                loader,
                bridge,
                clock,
                config,
                instances: Mutex::new(HashMap::new()),
                results: Mutex::new(HashMap::new()),
            }
        })
    }

    /// `startInstance(workflowId, initialVariables, projectFolder) →
    /// instanceId` (§6).
    pub async fn start_instance(
        self: &Arc<Self>,
        workflow_id: &str,
        version: &str,
        initial_variables: HashMap<String, JsonValue>,
        project_folder: PathBuf,
    ) -> Result<String, LoaderError> {
        let definition = self.loader.load_workflow(workflow_id, version).await?;
        let instance_id = Uuid::new_v4().to_string();

        let mut data = ExecutionContext::new(
            instance_id.clone(),
            definition.id.clone(),
            project_folder,
            self.clock.now(),
        );
        data.variables = initial_variables;

        let running_ctx = RunningContext::new(
            data,
            Arc::new(definition),
            self.prompt_provider.clone(),
            self.loader.clone(),
            self.bridge.clone(),
            self.clock.clone(),
            self.config.clone(),
        );
        let cancellation = running_ctx.cancellation.clone();

        let engine = self.clone();
        let join = tokio::spawn(async move { engine.run_to_terminal_impl(running_ctx).await });

        self.instances.lock().unwrap().insert(
            instance_id.clone(),
            Arc::new(InstanceHandle {
                cancellation,
                join: AsyncMutex::new(Some(join)),
            }),
        );

        Ok(instance_id)
    }

    /// Runs a workflow definition already in hand, synchronously, without
    /// registering it in the instance table. Used by the CLI's `run`
    /// subcommand, which has no need for `cancelInstance`/`awaitInstance`
    /// against a separately tracked id.
    pub async fn run_definition(
        self: &Arc<Self>,
        definition: WorkflowDefinition,
        initial_variables: HashMap<String, JsonValue>,
        project_folder: PathBuf,
    ) -> ExecutionResult {
        let instance_id = Uuid::new_v4().to_string();
        let mut data = ExecutionContext::new(
            instance_id,
            definition.id.clone(),
            project_folder,
            self.clock.now(),
        );
        data.variables = initial_variables;
        let running_ctx = RunningContext::new(
            data,
            Arc::new(definition),
            self.prompt_provider.clone(),
            self.loader.clone(),
            self.bridge.clone(),
            self.clock.clone(),
            self.config.clone(),
        );
        let engine = Arc::clone(self);
        engine.run_to_terminal_impl(running_ctx).await
    }

    /// `cancelInstance(instanceId) → bool` (§6).
    pub fn cancel_instance(&self, instance_id: &str) -> bool {
        match self.instances.lock().unwrap().get(instance_id) {
            Some(handle) => {
                handle.cancellation.cancel();
                true
            }
            None => false,
        }
    }

    /// `awaitInstance(instanceId) → {status, finalVariables, outputs}` (§6).
    /// The first caller to await a given instance pays for the join; later
    /// callers get the cached result.
    pub async fn await_instance(&self, instance_id: &str) -> Option<ExecutionResult> {
        if let Some(cached) = self.results.lock().unwrap().get(instance_id).cloned() {
            return Some(cached);
        }

        let handle = self.instances.lock().unwrap().get(instance_id).cloned()?;
        let mut guard = handle.join.lock().await;
        let join = guard.take()?;
        drop(guard);

        let result = join.await.ok()?;
        self.results.lock().unwrap().insert(instance_id.to_string(), result.clone());
        Some(result)
    }

    async fn run_to_terminal_impl(self: Arc<Self>, mut ctx: RunningContext) -> ExecutionResult {
        let entry = match ctx.definition.entry_node_id() {
            Some(id) => id.to_string(),
            None => {
                return ExecutionResult {
                    instance_id: ctx.data.instance_id.clone(),
                    state: ExecutionState::Failed,
                    final_variables: ctx.data.variables.clone(),
                    outputs: ctx.data.previous_outputs.clone(),
                    error: Some("workflow definition has no unique entry node".to_string()),
                }
            }
        };

        match self.run_sequence(&mut ctx, &entry, None).await {
            Ok(_) => ExecutionResult {
                instance_id: ctx.data.instance_id.clone(),
                state: ExecutionState::Succeeded,
                final_variables: ctx.data.variables.clone(),
                outputs: ctx.data.previous_outputs.clone(),
                error: None,
            },
            Err(failed_output) => {
                let cancelled = failed_output
                    .error
                    .as_ref()
                    .map(|e| e.code == NodeErrorCode::ErrCancelled)
                    .unwrap_or(false);
                ExecutionResult {
                    instance_id: ctx.data.instance_id.clone(),
                    state: if cancelled { ExecutionState::Cancelled } else { ExecutionState::Failed },
                    final_variables: ctx.data.variables.clone(),
                    outputs: ctx.data.previous_outputs.clone(),
                    error: failed_output.error.map(|e| e.to_string()),
                }
            }
        }
    }

    /// Core traversal (§4.3 steps 2-7), scoped to `allowed` when present (a
    /// loop body); unscoped, it runs to the end of the graph.
    async fn run_sequence(
        &self,
        ctx: &mut RunningContext,
        start_node_id: &str,
        allowed: Option<&[String]>,
    ) -> Result<NodeOutput, NodeOutput> {
        let mut current_id = start_node_id.to_string();
        let mut last_output: Option<NodeOutput> = None;

        loop {
            if let Some(allowed) = allowed {
                if !allowed.iter().any(|n| n == &current_id) {
                    break;
                }
            }

            if ctx.is_cancelled() {
                return Err(NodeError::new(NodeErrorCode::ErrCancelled, "instance cancelled before node dispatch")
                    .into_failed_output(&current_id, &current_id, ctx.clock.now()));
            }

            let node = match ctx.definition.node(&current_id) {
                Some(n) => n.clone(),
                None => {
                    return Err(NodeError::new(
                        NodeErrorCode::ErrDefinition,
                        format!("edge refers to unknown node '{current_id}'"),
                    )
                    .into_failed_output(&current_id, &current_id, ctx.clock.now()))
                }
            };

            let output = self.dispatch_with_retry(&node, ctx).await;

            for (k, v) in &output.variables {
                ctx.data.variables.insert(k.clone(), v.clone());
            }
            ctx.data.previous_outputs.insert(node.id.clone(), output.clone());
            if !ctx.data.completed_nodes.iter().any(|n| n == &node.id) {
                ctx.data.completed_nodes.push(node.id.clone());
            }
            ctx.data.current_node_id = Some(node.id.clone());

            if output.status == NodeStatus::Failed {
                return Err(output);
            }

            let next = match select_next(&ctx.definition, &node, &output) {
                Ok(next) => next,
                Err(msg) => return Err(NodeError::new(NodeErrorCode::ErrDefinition, msg).into_failed_output(&node.id, &node.name, ctx.clock.now())),
            };
            last_output = Some(output);
            match next {
                Some(next_id) => current_id = next_id,
                None => break,
            }
        }

        last_output.ok_or_else(|| {
            NodeError::new(NodeErrorCode::ErrDefinition, "subgraph had no eligible entry node")
                .into_failed_output(start_node_id, start_node_id, ctx.clock.now())
        })
    }

    /// Retry and timeout wrapper (§4.3.1): attempts are `1 + maxRetries`,
    /// the per-attempt timer resets on every retry, and cancellation is
    /// checked before dispatch and before each backoff sleep.
    async fn dispatch_with_retry(&self, node: &Node, ctx: &mut RunningContext) -> NodeOutput {
        let retry_config = node.retry_config.clone();
        let max_attempts = retry_config.as_ref().map(|r| r.max_attempts()).unwrap_or(1);

        let executor: Arc<dyn NodeExecutor> = match self.registry.get(node.kind.tag()) {
            Some(e) => e,
            None => {
                return NodeOutput::failed(
                    &node.id,
                    &node.name,
                    ctx.clock.now(),
                    NodeError::new(NodeErrorCode::ErrDefinition, format!("no executor for node kind '{}'", node.kind.tag())),
                )
            }
        };

        let mut last = None;
        for attempt in 1..=max_attempts {
            if ctx.is_cancelled() {
                return NodeOutput::failed(
                    &node.id,
                    &node.name,
                    ctx.clock.now(),
                    NodeError::new(NodeErrorCode::ErrCancelled, "instance cancelled before dispatch"),
                );
            }

            if attempt > 1 {
                if let Some(rc) = &retry_config {
                    tokio::select! {
                        _ = tokio::time::sleep(rc.delay_for_attempt(attempt)) => {}
                        _ = ctx.cancellation.cancelled() => {
                            return NodeOutput::failed(
                                &node.id,
                                &node.name,
                                ctx.clock.now(),
                                NodeError::new(NodeErrorCode::ErrCancelled, "instance cancelled during retry backoff"),
                            );
                        }
                    }
                }
            }

            let default_timeout = if matches!(node.kind, NodeKind::SubWorkflow(_)) {
                Duration::from_millis(ctx.config.default_subworkflow_timeout_ms)
            } else {
                DEFAULT_NODE_TIMEOUT
            };
            let timeout_duration = node.timeout_ms.map(Duration::from_millis).unwrap_or(default_timeout);
            let output = match tokio::time::timeout(timeout_duration, executor.execute(node, ctx)).await {
                Ok(output) => output,
                Err(_) => NodeOutput::failed(
                    &node.id,
                    &node.name,
                    ctx.clock.now(),
                    NodeError::new(NodeErrorCode::ErrTimeout, "node execution exceeded its per-attempt timeout"),
                ),
            };

            if output.status != NodeStatus::Failed {
                return output;
            }

            let retryable = output.error.as_ref().map(|e| e.code.retryable()).unwrap_or(false);
            last = Some(output);
            if !retryable || attempt == max_attempts {
                break;
            }
        }

        last.expect("retry loop always executes at least once")
    }
}

/// Next-node selection (§4.3.2): a conditional node branches on its boolean
/// result; everything else follows its single outgoing edge. A non-conditional
/// node with more than one outgoing edge and no way to distinguish between
/// them is a definition error (spec.md line 100), not a silent terminal.
fn select_next(definition: &WorkflowDefinition, node: &Node, output: &NodeOutput) -> Result<Option<String>, String> {
    let edges = definition.outgoing_edges(&node.id);
    if matches!(node.kind, NodeKind::Conditional(_)) {
        let result = output
            .variables
            .get("conditionResult")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let label = if result { "true" } else { "false" };
        return Ok(edges
            .iter()
            .find(|e| e.label.as_deref() == Some(label))
            .map(|e| e.to_node_id.clone()));
    }
    match edges.len() {
        0 => Ok(None),
        1 => Ok(Some(edges[0].to_node_id.clone())),
        n => Err(format!(
            "node '{}' has {n} outgoing edges but is not a conditional node; ambiguous fan-out with no way to distinguish the next edge",
            node.id
        )),
    }
}

trait NodeErrorExt {
    fn into_failed_output(self, node_id: &str, node_name: &str, now: chrono::DateTime<chrono::Utc>) -> NodeOutput;
}

impl NodeErrorExt for NodeError {
    fn into_failed_output(self, node_id: &str, node_name: &str, now: chrono::DateTime<chrono::Utc>) -> NodeOutput {
        NodeOutput::failed(node_id, node_name, now, self)
    }
}

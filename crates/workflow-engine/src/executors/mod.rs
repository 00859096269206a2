pub mod agent;
pub mod code;
pub mod conditional;
pub mod file;
pub mod http;
pub mod loop_exec;
pub mod subworkflow;
pub mod user_input;

use crate::runtime::RunningContext;
use async_trait::async_trait;
use common::types::{Node, NodeOutput};
use std::collections::HashMap;
use std::sync::Arc;

/// A single node executor. Per §7's propagation rule, an executor never
/// throws across the engine boundary — failure is communicated as a
/// `NodeOutput` with `status = failed`, never an `Err`.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(&self, node: &Node, ctx: &mut RunningContext) -> NodeOutput;
}

/// Narrow facade (§9 design notes) that loop and sub-workflow executors hold
/// instead of depending on the engine directly, inverting what would
/// otherwise be a cyclic dependency between engine and executors.
#[async_trait]
pub trait GraphRunner: Send + Sync {
    /// Runs the subgraph reachable from `entry_node_id`, restricted to
    /// `allowed_nodes`, to completion (no more outgoing edges inside the
    /// set, or failure). Reads the definition from `ctx.definition`. Used by
    /// the Loop executor for a loop body.
    async fn run_subgraph(
        &self,
        entry_node_id: &str,
        allowed_nodes: &[String],
        ctx: &mut RunningContext,
    ) -> Result<NodeOutput, NodeOutput>;

    /// Runs `ctx.definition` to a terminal state from its entry node. Used by
    /// the SubWorkflow executor against a freshly built child context.
    async fn run_to_terminal(&self, ctx: RunningContext) -> common::types::ExecutionResult;
}

/// Dispatch table keyed by node kind tag (§4.3 step 3). Built once at engine
/// construction and shared across all instances.
#[derive(Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<&'static str, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    pub fn new(graph_runner: Arc<dyn GraphRunner>) -> Self {
        let mut executors: HashMap<&'static str, Arc<dyn NodeExecutor>> = HashMap::new();
        executors.insert("agent", Arc::new(agent::AgentExecutor));
        executors.insert("user-input", Arc::new(user_input::UserInputExecutor));
        executors.insert("conditional", Arc::new(conditional::ConditionalExecutor));
        executors.insert(
            "loop",
            Arc::new(loop_exec::LoopExecutor::new(graph_runner.clone())),
        );
        executors.insert("file", Arc::new(file::FileExecutor));
        executors.insert("http", Arc::new(http::HttpExecutor));
        executors.insert("code", Arc::new(code::CodeExecutor));
        executors.insert(
            "subworkflow",
            Arc::new(subworkflow::SubWorkflowExecutor::new(graph_runner)),
        );
        Self { executors }
    }

    pub fn get(&self, kind_tag: &str) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(kind_tag).cloned()
    }
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlatformError>;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Workflow has no nodes")]
    EmptyWorkflow,

    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("Edge references unknown source node: {0}")]
    InvalidEdgeSource(String),

    #[error("Edge references unknown target node: {0}")]
    InvalidEdgeTarget(String),

    #[error("Workflow has no unambiguous entry node")]
    NoEntryNode,

    #[error("Cycle detected at node: {0}")]
    CycleDetected(String),
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Execution timed out after {0}ms")]
    Timeout(u64),

    #[error("Node execution failed: {0}, reason: {1}")]
    NodeExecutionFailed(String, String),

    #[error("Workflow validation failed: {0}")]
    ValidationFailed(String),

    #[error("Instance was cancelled")]
    Cancelled,
}

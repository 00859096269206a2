use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type JsonValue = serde_json::Value;

// ---------------------------------------------------------------------
// Workflow definition
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl WorkflowDefinition {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// The unique node with no incoming edges. A definition with zero or
    /// more than one candidate entry node is a definition error, caught by
    /// the validator.
    pub fn entry_node_id(&self) -> Option<&str> {
        let targets: std::collections::HashSet<&str> =
            self.edges.iter().map(|e| e.to_node_id.as_str()).collect();
        let mut candidates = self
            .nodes
            .iter()
            .filter(|n| !targets.contains(n.id.as_str()))
            .map(|n| n.id.as_str());
        let first = candidates.next()?;
        if candidates.next().is_some() {
            None
        } else {
            Some(first)
        }
    }

    pub fn outgoing_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.from_node_id == node_id).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub position: Position,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry_config: Option<RetryConfig>,
    #[serde(default)]
    pub context_config: ContextConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NodeKind {
    Agent(AgentConfig),
    UserInput(UserInputConfig),
    Conditional(ConditionalConfig),
    Loop(LoopConfig),
    File(FileConfig),
    Http(HttpConfig),
    Code(CodeConfig),
    #[serde(rename = "subworkflow")]
    SubWorkflow(SubWorkflowConfig),
}

impl NodeKind {
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Agent(_) => "agent",
            NodeKind::UserInput(_) => "user-input",
            NodeKind::Conditional(_) => "conditional",
            NodeKind::Loop(_) => "loop",
            NodeKind::File(_) => "file",
            NodeKind::Http(_) => "http",
            NodeKind::Code(_) => "code",
            NodeKind::SubWorkflow(_) => "subworkflow",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from_node_id: String,
    pub to_node_id: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    #[default]
    Simple,
    Advanced,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default)]
    pub mode: ContextMode,
    #[serde(default)]
    pub inputs: Option<Vec<FieldMapping>>,
    #[serde(default)]
    pub outputs: Option<Vec<OutputMapping>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputMapping {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub transform: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    #[serde(default = "RetryConfig::default_backoff")]
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    fn default_backoff() -> f64 {
        2.0
    }

    /// Delay before attempt `n` (1-indexed). Attempt 1 never sleeps.
    pub fn delay_for_attempt(&self, n: u32) -> std::time::Duration {
        if n <= 1 {
            return std::time::Duration::from_millis(0);
        }
        let ms = self.retry_delay_ms as f64 * self.backoff_multiplier.powi(n as i32 - 2);
        std::time::Duration::from_millis(ms as u64)
    }

    pub fn max_attempts(&self) -> u32 {
        1 + self.max_retries
    }
}

// ---------------------------------------------------------------------
// Node kind configs
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent: String,
    pub prompt: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub provider: JsonValue,
    #[serde(default)]
    pub gate: bool,
    #[serde(default)]
    pub gate_condition: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Text,
    Textarea,
    Number,
    Select,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationRules {
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInputConfig {
    pub prompt: String,
    pub input_type: InputType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub validation: Option<ValidationRules>,
    #[serde(default)]
    pub options: Option<Vec<SelectOption>>,
    #[serde(default)]
    pub default_value: Option<JsonValue>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConditionType {
    Jsonpath,
    Javascript,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalConfig {
    pub condition: String,
    pub condition_type: ConditionType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LoopType {
    ForEach,
    While,
    Count,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    pub loop_type: LoopType,
    pub iterator_variable: String,
    #[serde(default)]
    pub index_variable: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub while_condition: Option<String>,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
    /// Node ids making up the loop body, in execution order.
    #[serde(default)]
    pub loop_nodes: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    Read,
    Write,
    Copy,
    Move,
    Delete,
    Exists,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub operation: FileOperation,
    #[serde(default)]
    pub source_path: Option<String>,
    #[serde(default)]
    pub target_path: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default = "FileConfig::default_encoding")]
    pub encoding: String,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub require_project_folder: bool,
}

impl FileConfig {
    fn default_encoding() -> String {
        "utf-8".to_string()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AuthConfig {
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
    ApiKey { header_name: String, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<JsonValue>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CodeLanguage {
    Javascript,
    Python,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "SandboxConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub allowed_modules: Vec<String>,
    #[serde(default = "SandboxConfig::default_cpu_timeout_ms")]
    pub cpu_timeout_ms: u64,
    #[serde(default = "SandboxConfig::default_memory_limit_mb")]
    pub memory_limit_mb: u64,
}

impl SandboxConfig {
    fn default_enabled() -> bool {
        true
    }
    fn default_cpu_timeout_ms() -> u64 {
        5_000
    }
    fn default_memory_limit_mb() -> u64 {
        128
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            allowed_modules: Vec::new(),
            cpu_timeout_ms: Self::default_cpu_timeout_ms(),
            memory_limit_mb: Self::default_memory_limit_mb(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeConfig {
    pub language: CodeLanguage,
    pub code: String,
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubWorkflowConfig {
    pub sub_workflow_id: String,
    #[serde(default)]
    pub sub_workflow_version: Option<String>,
    #[serde(default)]
    pub context_config: ContextConfig,
}

// ---------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionState {
    Created,
    Running,
    AwaitingInput,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopFrame {
    pub loop_node_id: String,
    pub iterator_variable: String,
    pub index_variable: Option<String>,
    pub current_index: i64,
    /// -1 for `while` loops, where the total item count is unknown.
    pub total_items: i64,
    pub collection_data: Option<Vec<JsonValue>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub instance_id: String,
    pub workflow_id: String,
    pub project_folder: std::path::PathBuf,
    pub variables: HashMap<String, JsonValue>,
    pub previous_outputs: HashMap<String, NodeOutput>,
    pub current_node_id: Option<String>,
    pub completed_nodes: Vec<String>,
    pub loop_stack: Vec<LoopFrame>,
    pub started_at: DateTime<Utc>,
    pub user_id: Option<String>,
    pub series_id: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
}

impl ExecutionContext {
    pub fn new(
        instance_id: String,
        workflow_id: String,
        project_folder: std::path::PathBuf,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            instance_id,
            workflow_id,
            project_folder,
            variables: HashMap::new(),
            previous_outputs: HashMap::new(),
            current_node_id: None,
            completed_nodes: Vec::new(),
            loop_stack: Vec::new(),
            started_at: now,
            user_id: None,
            series_id: None,
            deadline: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeErrorCode {
    ErrDefinition,
    ErrValidation,
    ErrTimeout,
    ErrCancelled,
    ErrUnsafeCode,
    ErrEval,
    ErrIo,
    ErrHttp,
    ErrProvider,
    ErrGate,
    ErrInputExhausted,
    ErrNotFound,
    ErrMissingPrompt,
}

impl NodeErrorCode {
    /// Whether the engine's retry wrapper (§4.3.1) should attempt another try.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            NodeErrorCode::ErrTimeout
                | NodeErrorCode::ErrIo
                | NodeErrorCode::ErrHttp
                | NodeErrorCode::ErrProvider
        )
    }
}

impl std::fmt::Display for NodeErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeErrorCode::ErrDefinition => "ERR_DEFINITION",
            NodeErrorCode::ErrValidation => "ERR_VALIDATION",
            NodeErrorCode::ErrTimeout => "ERR_TIMEOUT",
            NodeErrorCode::ErrCancelled => "ERR_CANCELLED",
            NodeErrorCode::ErrUnsafeCode => "ERR_UNSAFE_CODE",
            NodeErrorCode::ErrEval => "ERR_EVAL",
            NodeErrorCode::ErrIo => "ERR_IO",
            NodeErrorCode::ErrHttp => "ERR_HTTP",
            NodeErrorCode::ErrProvider => "ERR_PROVIDER",
            NodeErrorCode::ErrGate => "ERR_GATE",
            NodeErrorCode::ErrInputExhausted => "ERR_INPUT_EXHAUSTED",
            NodeErrorCode::ErrNotFound => "ERR_NOT_FOUND",
            NodeErrorCode::ErrMissingPrompt => "ERR_MISSING_PROMPT",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeError {
    pub code: NodeErrorCode,
    pub message: String,
}

impl NodeError {
    pub fn new(code: NodeErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeOutput {
    pub node_id: String,
    pub node_name: String,
    pub timestamp: DateTime<Utc>,
    pub status: NodeStatus,
    pub output: JsonValue,
    pub variables: HashMap<String, JsonValue>,
    #[serde(default)]
    pub error: Option<NodeError>,
    #[serde(default)]
    pub error_stack: Option<String>,
    #[serde(default)]
    pub metadata: JsonValue,
}

impl NodeOutput {
    pub fn success(
        node_id: impl Into<String>,
        node_name: impl Into<String>,
        now: DateTime<Utc>,
        output: JsonValue,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            node_name: node_name.into(),
            timestamp: now,
            status: NodeStatus::Success,
            output,
            variables: HashMap::new(),
            error: None,
            error_stack: None,
            metadata: JsonValue::Null,
        }
    }

    pub fn failed(
        node_id: impl Into<String>,
        node_name: impl Into<String>,
        now: DateTime<Utc>,
        error: NodeError,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            node_name: node_name.into(),
            timestamp: now,
            status: NodeStatus::Failed,
            output: JsonValue::Null,
            variables: HashMap::new(),
            error: Some(error),
            error_stack: None,
            metadata: JsonValue::Null,
        }
    }

    pub fn with_variables(mut self, variables: HashMap<String, JsonValue>) -> Self {
        self.variables = variables;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub instance_id: String,
    pub state: ExecutionState,
    pub final_variables: HashMap<String, JsonValue>,
    pub outputs: HashMap<String, NodeOutput>,
    pub error: Option<String>,
}

/// Parses the simple `major.minor.patch` subset used by workflow versions;
/// no pre-release/build-metadata handling, since workflow versions are
/// author-assigned integers in practice.
pub fn parse_semver(v: &str) -> (u64, u64, u64) {
    let mut parts = v.split('.').map(|p| p.parse::<u64>().unwrap_or(0));
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

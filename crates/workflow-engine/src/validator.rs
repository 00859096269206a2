use crate::parser::WorkflowParser;
use common::types::{LoopType, Node, NodeKind, WorkflowDefinition};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub enum ValidationError {
    EmptyWorkflow,
    DuplicateNodeId(String),
    DanglingEdge { node_id: String, edge_end: &'static str },
    NoEntryNode,
    CycleDetected,
    ConditionalMissingBranch { node_id: String, label: &'static str },
    AmbiguousFanOut { node_id: String, edge_count: usize },
    MissingRequiredField { node_id: String, field: &'static str },
    LoopBodyNodeUnknown { node_id: String, body_node_id: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyWorkflow => write!(f, "workflow has no nodes"),
            ValidationError::DuplicateNodeId(id) => write!(f, "duplicate node id: {id}"),
            ValidationError::DanglingEdge { node_id, edge_end } => {
                write!(f, "edge {edge_end} references unknown node '{node_id}'")
            }
            ValidationError::NoEntryNode => write!(f, "workflow has no unambiguous entry node"),
            ValidationError::CycleDetected => write!(f, "workflow graph contains a cycle"),
            ValidationError::ConditionalMissingBranch { node_id, label } => {
                write!(f, "conditional node '{node_id}' has no '{label}' edge")
            }
            ValidationError::AmbiguousFanOut { node_id, edge_count } => {
                write!(f, "node '{node_id}' has {edge_count} outgoing edges but is not a conditional node; ambiguous fan-out is a definition error")
            }
            ValidationError::MissingRequiredField { node_id, field } => {
                write!(f, "node '{node_id}' is missing required field '{field}'")
            }
            ValidationError::LoopBodyNodeUnknown { node_id, body_node_id } => {
                write!(f, "loop node '{node_id}' lists unknown body node '{body_node_id}'")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Structural validation (§4.12): duplicate ids, dangling edges, cycles, a
/// unique entry node, conditional branch completeness, and per-kind
/// required-field checks caught at definition-load time rather than only
/// surfacing as a runtime `ERR_*` from the executor.
pub struct WorkflowValidator {
    parser: WorkflowParser,
}

impl WorkflowValidator {
    pub fn new() -> Self {
        Self { parser: WorkflowParser::new() }
    }

    pub fn validate(&self, workflow: &WorkflowDefinition) -> Result<ValidationResult, ValidationError> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if workflow.nodes.is_empty() {
            return Err(ValidationError::EmptyWorkflow);
        }

        let mut seen = HashSet::new();
        for node in &workflow.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(ValidationError::DuplicateNodeId(node.id.clone()));
            }
        }

        let node_map: HashMap<&str, &Node> = workflow.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        for edge in &workflow.edges {
            if !node_map.contains_key(edge.from_node_id.as_str()) {
                return Err(ValidationError::DanglingEdge { node_id: edge.from_node_id.clone(), edge_end: "source" });
            }
            if !node_map.contains_key(edge.to_node_id.as_str()) {
                return Err(ValidationError::DanglingEdge { node_id: edge.to_node_id.clone(), edge_end: "target" });
            }
        }

        if workflow.entry_node_id().is_none() {
            return Err(ValidationError::NoEntryNode);
        }

        if self.parser.detect_cycles(workflow).is_err() {
            return Err(ValidationError::CycleDetected);
        }

        for node in &workflow.nodes {
            let edges = workflow.outgoing_edges(&node.id);
            if let NodeKind::Conditional(_) = &node.kind {
                for label in ["true", "false"] {
                    if !edges.iter().any(|e| e.label.as_deref() == Some(label)) {
                        return Err(ValidationError::ConditionalMissingBranch { node_id: node.id.clone(), label });
                    }
                }
            } else if edges.len() > 1 {
                return Err(ValidationError::AmbiguousFanOut { node_id: node.id.clone(), edge_count: edges.len() });
            }

            if let Err(e) = self.validate_required_fields(node) {
                errors.push(e.to_string());
            }

            if let NodeKind::Loop(cfg) = &node.kind {
                for body_id in &cfg.loop_nodes {
                    if !node_map.contains_key(body_id.as_str()) {
                        errors.push(
                            ValidationError::LoopBodyNodeUnknown {
                                node_id: node.id.clone(),
                                body_node_id: body_id.clone(),
                            }
                            .to_string(),
                        );
                    }
                }
            }

            if !self.has_connections(&node.id, workflow) && workflow.entry_node_id() != Some(node.id.as_str()) {
                warnings.push(format!("node '{}' is isolated (no connections)", node.id));
            }
        }

        Ok(ValidationResult { valid: errors.is_empty(), errors, warnings })
    }

    /// Per-kind required-field checks the type system doesn't already
    /// guarantee (e.g. an agent node's `prompt` is `Option<String>` at parse
    /// time so a definition can omit it, but running it would immediately
    /// fail with `ERR_MISSING_PROMPT` — better to catch it here).
    fn validate_required_fields(&self, node: &Node) -> Result<(), ValidationError> {
        match &node.kind {
            NodeKind::Agent(cfg) => {
                if cfg.prompt.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    return Err(ValidationError::MissingRequiredField { node_id: node.id.clone(), field: "prompt" });
                }
            }
            NodeKind::Loop(cfg) => {
                if cfg.loop_nodes.is_empty() {
                    return Err(ValidationError::MissingRequiredField { node_id: node.id.clone(), field: "loopNodes" });
                }
                match cfg.loop_type {
                    LoopType::ForEach if cfg.collection.is_none() => {
                        return Err(ValidationError::MissingRequiredField { node_id: node.id.clone(), field: "collection" })
                    }
                    LoopType::While if cfg.while_condition.is_none() => {
                        return Err(ValidationError::MissingRequiredField { node_id: node.id.clone(), field: "whileCondition" })
                    }
                    LoopType::Count if cfg.count.is_none() => {
                        return Err(ValidationError::MissingRequiredField { node_id: node.id.clone(), field: "count" })
                    }
                    _ => {}
                }
            }
            NodeKind::Code(cfg) => {
                if cfg.code.trim().is_empty() {
                    return Err(ValidationError::MissingRequiredField { node_id: node.id.clone(), field: "code" });
                }
            }
            NodeKind::Http(cfg) => {
                if cfg.url.trim().is_empty() {
                    return Err(ValidationError::MissingRequiredField { node_id: node.id.clone(), field: "url" });
                }
            }
            NodeKind::SubWorkflow(cfg) => {
                if cfg.sub_workflow_id.trim().is_empty() {
                    return Err(ValidationError::MissingRequiredField { node_id: node.id.clone(), field: "subWorkflowId" });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn has_connections(&self, node_id: &str, workflow: &WorkflowDefinition) -> bool {
        workflow.edges.iter().any(|e| e.from_node_id == node_id || e.to_node_id == node_id)
    }
}

impl Default for WorkflowValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::{AgentConfig, ConditionType, ConditionalConfig, Edge, NodeKind, Position};

    fn agent_node(id: &str, prompt: Option<&str>) -> Node {
        Node {
            id: id.to_string(),
            name: id.to_string(),
            position: Position::default(),
            kind: NodeKind::Agent(AgentConfig {
                agent: "assistant".to_string(),
                prompt: prompt.map(str::to_string),
                system_prompt: None,
                provider: serde_json::Value::Null,
                gate: false,
                gate_condition: None,
            }),
            timeout_ms: None,
            retry_config: None,
            context_config: Default::default(),
        }
    }

    fn workflow(nodes: Vec<Node>, edges: Vec<Edge>) -> WorkflowDefinition {
        WorkflowDefinition { id: "wf".to_string(), version: "1.0.0".to_string(), name: "t".to_string(), description: None, nodes, edges }
    }

    #[test]
    fn accepts_a_simple_valid_workflow() {
        let validator = WorkflowValidator::new();
        let wf = workflow(
            vec![agent_node("a", Some("hi")), agent_node("b", Some("hi"))],
            vec![Edge { from_node_id: "a".to_string(), to_node_id: "b".to_string(), label: None }],
        );
        let result = validator.validate(&wf).unwrap();
        assert!(result.valid);
    }

    #[test]
    fn rejects_missing_prompt() {
        let validator = WorkflowValidator::new();
        let wf = workflow(vec![agent_node("a", None)], vec![]);
        let result = validator.validate(&wf).unwrap();
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("prompt")));
    }

    #[test]
    fn rejects_conditional_missing_false_branch() {
        let validator = WorkflowValidator::new();
        let cond = Node {
            id: "c".to_string(),
            name: "c".to_string(),
            position: Position::default(),
            kind: NodeKind::Conditional(ConditionalConfig {
                condition: "$.x > 0".to_string(),
                condition_type: ConditionType::Jsonpath,
            }),
            timeout_ms: None,
            retry_config: None,
            context_config: Default::default(),
        };
        let wf = workflow(
            vec![cond, agent_node("a", Some("hi"))],
            vec![Edge { from_node_id: "c".to_string(), to_node_id: "a".to_string(), label: Some("true".to_string()) }],
        );
        assert!(matches!(validator.validate(&wf), Err(ValidationError::ConditionalMissingBranch { .. })));
    }

    #[test]
    fn rejects_ambiguous_fan_out_on_a_non_conditional_node() {
        let validator = WorkflowValidator::new();
        let wf = workflow(
            vec![agent_node("a", Some("hi")), agent_node("b", Some("hi")), agent_node("c", Some("hi"))],
            vec![
                Edge { from_node_id: "a".to_string(), to_node_id: "b".to_string(), label: None },
                Edge { from_node_id: "a".to_string(), to_node_id: "c".to_string(), label: None },
            ],
        );
        assert!(matches!(validator.validate(&wf), Err(ValidationError::AmbiguousFanOut { .. })));
    }

    #[test]
    fn rejects_a_cycle() {
        let validator = WorkflowValidator::new();
        let wf = workflow(
            vec![agent_node("a", Some("hi")), agent_node("b", Some("hi"))],
            vec![
                Edge { from_node_id: "a".to_string(), to_node_id: "b".to_string(), label: None },
                Edge { from_node_id: "b".to_string(), to_node_id: "a".to_string(), label: None },
            ],
        );
        assert!(matches!(validator.validate(&wf), Err(ValidationError::CycleDetected)));
    }
}

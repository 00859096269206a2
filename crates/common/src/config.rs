use serde::{Deserialize, Serialize};

/// Engine-wide defaults named throughout the design but never collected in
/// one place. Each field falls back to the value the design calls out as
/// default, and can be overridden by environment variable for deployments
/// that need tighter limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub max_loop_nesting: usize,
    pub max_while_iterations: u32,
    pub default_subworkflow_timeout_ms: u64,
    pub max_input_rejections: u32,
    pub user_input_poll_quantum_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_loop_nesting: env_usize("WORKFLOW_MAX_LOOP_NESTING", 16),
            max_while_iterations: env_u32("WORKFLOW_MAX_WHILE_ITERATIONS", 1000),
            default_subworkflow_timeout_ms: env_u64("WORKFLOW_SUBWORKFLOW_TIMEOUT_MS", 5 * 60 * 1000),
            max_input_rejections: env_u32("WORKFLOW_MAX_INPUT_REJECTIONS", 10),
            user_input_poll_quantum_ms: env_u64("WORKFLOW_INPUT_POLL_QUANTUM_MS", 50),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

use crate::executors::NodeExecutor;
use crate::runtime::RunningContext;
use crate::sandbox::script;
use async_trait::async_trait;
use common::types::{CodeLanguage, Node, NodeError, NodeErrorCode, NodeOutput, NodeKind};
use serde_json::json;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Patterns denied even before parsing (§4.2): these never appear in the
/// bounded interpreter's own grammar, but Python code runs as a real
/// subprocess, so the check matters there.
const DENYLIST: &[&str] = &[
    "eval(",
    "Function(",
    "child_process",
    "process.exit",
    "import os",
    "subprocess",
    "__import__",
    "exec(",
];

pub struct CodeExecutor;

#[async_trait]
impl NodeExecutor for CodeExecutor {
    async fn execute(&self, node: &Node, ctx: &mut RunningContext) -> NodeOutput {
        let cfg = match &node.kind {
            NodeKind::Code(c) => c,
            _ => {
                return NodeOutput::failed(
                    &node.id,
                    &node.name,
                    ctx.clock.now(),
                    NodeError::new(NodeErrorCode::ErrDefinition, "code executor received a non-code node"),
                )
            }
        };

        let now = ctx.clock.now();

        if cfg.sandbox.enabled {
            if let Some(pattern) = DENYLIST.iter().find(|p| cfg.code.contains(*p)) {
                return NodeOutput::failed(
                    &node.id,
                    &node.name,
                    now,
                    NodeError::new(NodeErrorCode::ErrUnsafeCode, format!("forbidden pattern detected: {pattern}")),
                );
            }
        } else {
            tracing::warn!(node_id = %node.id, "code node running with sandbox disabled; denylist and capability gates skipped");
        }

        let timeout = Duration::from_millis(cfg.sandbox.cpu_timeout_ms);

        match cfg.language {
            // memoryLimitMb isn't enforced here: the interpreter never
            // allocates native heap, only JsonValue trees bounded indirectly
            // by max_steps, so there is no address space to rlimit.
            CodeLanguage::Javascript => {
                let mut variables = ctx.data.variables.clone();
                variables.insert("context".to_string(), serde_json::to_value(&ctx.data.variables).unwrap_or(serde_json::Value::Null));
                let max_steps = 1_000_000u64;
                match script::run(&cfg.code, variables, max_steps, timeout) {
                    Ok(out) => NodeOutput::success(
                        &node.id,
                        &node.name,
                        now,
                        json!({
                            "stdout": out.stdout,
                            "stderr": out.stderr,
                            "returnValue": out.return_value,
                        }),
                    ),
                    Err(script::ScriptError::DeadlineExceeded) => {
                        NodeOutput::failed(&node.id, &node.name, now, NodeError::new(NodeErrorCode::ErrTimeout, "code node exceeded its CPU deadline"))
                    }
                    Err(e) => NodeOutput::failed(&node.id, &node.name, now, NodeError::new(NodeErrorCode::ErrEval, e.to_string())),
                }
            }
            CodeLanguage::Python => {
                let memory_limit_mb = cfg.sandbox.enabled.then_some(cfg.sandbox.memory_limit_mb);
                run_python(&cfg.code, &ctx.data.variables, timeout, memory_limit_mb, &node.id, &node.name, now).await
            }
        }
    }
}

async fn run_python(
    code: &str,
    variables: &std::collections::HashMap<String, common::types::JsonValue>,
    timeout: Duration,
    memory_limit_mb: Option<u64>,
    node_id: &str,
    node_name: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> NodeOutput {
    let context_json = serde_json::to_string(variables).unwrap_or_else(|_| "{}".to_string());
    let wrapper = format!(
        "import json, sys\ncontext = json.loads(sys.argv[1])\n__result__ = None\n{code}\nprint('\\u0000RETURN\\u0000' + json.dumps(__result__) if '__result__' in dir() else '', end='')\n"
    );

    let mut command = Command::new("python3");
    command
        .arg("-c")
        .arg(&wrapper)
        .arg(&context_json)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    if let Some(mb) = memory_limit_mb {
        apply_memory_limit(&mut command, mb);
    }
    #[cfg(not(unix))]
    let _ = memory_limit_mb;

    let mut child = match command.spawn() {
        Ok(c) => c,
        Err(e) => {
            return NodeOutput::failed(
                node_id,
                node_name,
                now,
                NodeError::new(NodeErrorCode::ErrIo, format!("failed to spawn python3: {e}")),
            )
        }
    };

    let pid = child.id();
    let wait = tokio::time::timeout(timeout, child.wait_with_output()).await;

    match wait {
        Ok(Ok(output)) => {
            let stdout_raw = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            let (stdout, return_value) = match stdout_raw.split_once('\u{0}') {
                Some((before, marker)) => {
                    let marker = marker.trim_start_matches("RETURN\u{0}");
                    let rv = serde_json::from_str(marker).unwrap_or(common::types::JsonValue::Null);
                    (before.to_string(), rv)
                }
                None => (stdout_raw, common::types::JsonValue::Null),
            };

            if output.status.success() {
                NodeOutput::success(
                    node_id,
                    node_name,
                    now,
                    json!({"stdout": stdout, "stderr": stderr, "returnValue": return_value}),
                )
            } else {
                NodeOutput::failed(node_id, node_name, now, NodeError::new(NodeErrorCode::ErrEval, stderr))
            }
        }
        Ok(Err(e)) => NodeOutput::failed(node_id, node_name, now, NodeError::new(NodeErrorCode::ErrIo, e.to_string())),
        Err(_) => {
            if let Some(pid) = pid {
                terminate_process(pid).await;
            }
            NodeOutput::failed(node_id, node_name, now, NodeError::new(NodeErrorCode::ErrTimeout, "python code node exceeded its timeout"))
        }
    }
}

/// Caps the child's address space via `RLIMIT_AS` (§4.2's sandbox memory
/// cap) before it execs python3. Runs in the child between fork and exec, so
/// a bad limit here can only fail the child's own spawn, never the engine.
#[cfg(unix)]
fn apply_memory_limit(command: &mut Command, memory_limit_mb: u64) {
    use nix::sys::resource::{setrlimit, Resource};

    let bytes = memory_limit_mb.saturating_mul(1024 * 1024);
    unsafe {
        command.pre_exec(move || {
            setrlimit(Resource::RLIMIT_AS, bytes, bytes)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        });
    }
}

/// Escalating termination (§5 Cancellation): a polite signal first, then a
/// forceful one one second later if the process has not exited.
async fn terminate_process(pid: u32) {
    tracing::debug!(pid, "terminating python code process");

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let nix_pid = Pid::from_raw(pid as i32);
        if kill(nix_pid, Signal::SIGTERM).is_err() {
            return;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        let _ = kill(nix_pid, Signal::SIGKILL);
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/F"])
            .output()
            .await;
    }
}

use crate::context::substitute;
use crate::executors::NodeExecutor;
use crate::runtime::RunningContext;
use async_trait::async_trait;
use common::types::{FileOperation, Node, NodeError, NodeErrorCode, NodeOutput, NodeKind};
use serde_json::json;
use std::path::{Path, PathBuf};

pub struct FileExecutor;

#[async_trait]
impl NodeExecutor for FileExecutor {
    async fn execute(&self, node: &Node, ctx: &mut RunningContext) -> NodeOutput {
        let cfg = match &node.kind {
            NodeKind::File(c) => c,
            _ => {
                return NodeOutput::failed(
                    &node.id,
                    &node.name,
                    ctx.clock.now(),
                    NodeError::new(NodeErrorCode::ErrDefinition, "file executor received a non-file node"),
                )
            }
        };

        let now = ctx.clock.now();
        let source_path = cfg.source_path.as_ref().map(|p| substitute(p, &ctx.data));
        let target_path = cfg.target_path.as_ref().map(|p| substitute(p, &ctx.data));
        let content = cfg.content.as_ref().map(|c| substitute(c, &ctx.data));

        let resolve = |raw: &str| -> Result<PathBuf, String> {
            let candidate = resolve_absolute(&ctx.data.project_folder, raw);
            if cfg.require_project_folder && !is_contained(&ctx.data.project_folder, &candidate) {
                return Err(format!("resolved path '{}' is outside project folder", candidate.display()));
            }
            Ok(candidate)
        };

        match cfg.operation {
            FileOperation::Read => {
                let Some(raw) = &source_path else {
                    return fail(node, now, NodeErrorCode::ErrDefinition, "read requires sourcePath");
                };
                let path = match resolve(raw) {
                    Ok(p) => p,
                    Err(msg) => return fail(node, now, NodeErrorCode::ErrValidation, &msg),
                };
                match tokio::fs::read_to_string(&path).await {
                    Ok(file_content) => NodeOutput::success(
                        &node.id,
                        &node.name,
                        now,
                        json!({"success": true, "operation": "read", "fileContent": file_content}),
                    ),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        fail(node, now, NodeErrorCode::ErrNotFound, &format!("file not found: {}", path.display()))
                    }
                    Err(e) => fail(node, now, NodeErrorCode::ErrIo, &e.to_string()),
                }
            }
            FileOperation::Write => {
                let Some(raw) = &target_path else {
                    return fail(node, now, NodeErrorCode::ErrDefinition, "write requires targetPath");
                };
                let mut path = match resolve(raw) {
                    Ok(p) => p,
                    Err(msg) => return fail(node, now, NodeErrorCode::ErrValidation, &msg),
                };
                if !cfg.overwrite {
                    path = unique_path(&path).await;
                }
                if let Some(parent) = path.parent() {
                    if let Err(e) = tokio::fs::create_dir_all(parent).await {
                        return fail(node, now, NodeErrorCode::ErrIo, &e.to_string());
                    }
                }
                let body = content.clone().unwrap_or_default();
                match tokio::fs::write(&path, &body).await {
                    Ok(()) => NodeOutput::success(
                        &node.id,
                        &node.name,
                        now,
                        json!({
                            "success": true,
                            "operation": "write",
                            "targetPath": path.to_string_lossy(),
                            "bytesWritten": body.len(),
                        }),
                    ),
                    Err(e) => fail(node, now, NodeErrorCode::ErrIo, &e.to_string()),
                }
            }
            FileOperation::Copy | FileOperation::Move => {
                let (Some(src_raw), Some(dst_raw)) = (&source_path, &target_path) else {
                    return fail(node, now, NodeErrorCode::ErrDefinition, "copy/move require sourcePath and targetPath");
                };
                let src = match resolve(src_raw) {
                    Ok(p) => p,
                    Err(msg) => return fail(node, now, NodeErrorCode::ErrValidation, &msg),
                };
                let dst = match resolve(dst_raw) {
                    Ok(p) => p,
                    Err(msg) => return fail(node, now, NodeErrorCode::ErrValidation, &msg),
                };
                if let Some(parent) = dst.parent() {
                    if let Err(e) = tokio::fs::create_dir_all(parent).await {
                        return fail(node, now, NodeErrorCode::ErrIo, &e.to_string());
                    }
                }
                let op_name = if matches!(cfg.operation, FileOperation::Copy) { "copy" } else { "move" };
                let result = if matches!(cfg.operation, FileOperation::Copy) {
                    tokio::fs::copy(&src, &dst).await.map(|_| ())
                } else {
                    tokio::fs::rename(&src, &dst).await
                };
                match result {
                    Ok(()) => NodeOutput::success(
                        &node.id,
                        &node.name,
                        now,
                        json!({
                            "success": true,
                            "operation": op_name,
                            "sourcePath": src.to_string_lossy(),
                            "targetPath": dst.to_string_lossy(),
                        }),
                    ),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        fail(node, now, NodeErrorCode::ErrNotFound, &format!("source not found: {}", src.display()))
                    }
                    Err(e) => fail(node, now, NodeErrorCode::ErrIo, &e.to_string()),
                }
            }
            FileOperation::Delete => {
                let Some(raw) = target_path.as_ref().or(source_path.as_ref()) else {
                    return fail(node, now, NodeErrorCode::ErrDefinition, "delete requires targetPath or sourcePath");
                };
                let path = match resolve(raw) {
                    Ok(p) => p,
                    Err(msg) => return fail(node, now, NodeErrorCode::ErrValidation, &msg),
                };
                let existed = tokio::fs::metadata(&path).await.is_ok();
                if existed {
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        return fail(node, now, NodeErrorCode::ErrIo, &e.to_string());
                    }
                }
                NodeOutput::success(
                    &node.id,
                    &node.name,
                    now,
                    json!({"success": true, "operation": "delete", "existed": existed}),
                )
            }
            FileOperation::Exists => {
                let Some(raw) = source_path.as_ref().or(target_path.as_ref()) else {
                    return fail(node, now, NodeErrorCode::ErrDefinition, "exists requires sourcePath or targetPath");
                };
                let path = match resolve(raw) {
                    Ok(p) => p,
                    Err(msg) => return fail(node, now, NodeErrorCode::ErrValidation, &msg),
                };
                match tokio::fs::metadata(&path).await {
                    Ok(meta) => NodeOutput::success(
                        &node.id,
                        &node.name,
                        now,
                        json!({
                            "exists": true,
                            "isFile": meta.is_file(),
                            "isDirectory": meta.is_dir(),
                            "size": meta.len(),
                        }),
                    ),
                    Err(_) => NodeOutput::success(
                        &node.id,
                        &node.name,
                        now,
                        json!({"exists": false, "isFile": false, "isDirectory": false, "size": 0}),
                    ),
                }
            }
        }
    }
}

fn fail(node: &Node, now: chrono::DateTime<chrono::Utc>, code: NodeErrorCode, message: &str) -> NodeOutput {
    NodeOutput::failed(&node.id, &node.name, now, NodeError::new(code, message))
}

/// Resolves a possibly-relative path against the project folder, without
/// touching the filesystem.
fn resolve_absolute(project_folder: &Path, raw: &str) -> PathBuf {
    let p = Path::new(raw);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        project_folder.join(p)
    }
}

/// Path-relative containment check (§4.8/§8 invariant 4): rejects any
/// resolved path with a leading `..` component or an absolute escape, by
/// lexically normalizing both sides rather than touching the filesystem
/// (the target may not exist yet, e.g. for `write`).
fn is_contained(project_folder: &Path, candidate: &Path) -> bool {
    let base = normalize(project_folder);
    let target = normalize(candidate);
    target.starts_with(&base)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

async fn unique_path(path: &Path) -> PathBuf {
    if tokio::fs::metadata(path).await.is_err() {
        return path.to_path_buf();
    }
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().to_string());
    let parent = path.parent().unwrap_or(Path::new(""));
    let mut n = 1;
    loop {
        let candidate_name = match &ext {
            Some(ext) => format!("{stem}-{n}.{ext}"),
            None => format!("{stem}-{n}"),
        };
        let candidate = parent.join(candidate_name);
        if tokio::fs::metadata(&candidate).await.is_err() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containment_rejects_parent_traversal() {
        let base = Path::new("/proj");
        let candidate = resolve_absolute(base, "../etc/passwd");
        assert!(!is_contained(base, &candidate));
    }

    #[test]
    fn containment_accepts_nested_path() {
        let base = Path::new("/proj");
        let candidate = resolve_absolute(base, "data/out.txt");
        assert!(is_contained(base, &candidate));
    }

    #[test]
    fn containment_rejects_absolute_escape() {
        let base = Path::new("/proj");
        let candidate = resolve_absolute(base, "/etc/passwd");
        assert!(!is_contained(base, &candidate));
    }
}

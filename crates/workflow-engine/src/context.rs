use crate::sandbox::expr;
use common::types::{ExecutionContext, JsonValue};
use regex::Regex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("condition evaluation failed: {0}")]
    Eval(String),
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").unwrap())
}

fn jsonpath_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$(\.[A-Za-z0-9_]+|\[\d+\])+").unwrap())
}

/// Canonical structured-text rendering for values substituted into templates:
/// scalars print bare, objects/arrays pretty-print indented so a template
/// author sees the same thing a debugger would.
fn render(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => "null".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Builds the object `evaluateCondition`/gate checks run against: `ctx`'s own
/// fields overlaid with the live variable map, so `$.foo` resolves a variable
/// directly without an explicit `variables.` prefix.
pub fn merged_root(ctx: &ExecutionContext, variables: &HashMap<String, JsonValue>) -> JsonValue {
    let mut root = serde_json::to_value(ctx).unwrap_or(JsonValue::Null);
    if let JsonValue::Object(map) = &mut root {
        for (k, v) in variables {
            map.insert(k.clone(), v.clone());
        }
    }
    root
}

/// Replaces every `{{name}}` with the string form of `ctx.variables[name]`,
/// falling back to a top-level field of `ctx` itself. Unresolvable
/// placeholders are left untouched.
pub fn substitute(template: &str, ctx: &ExecutionContext) -> String {
    let root = merged_root(ctx, &ctx.variables);
    placeholder_re()
        .replace_all(template, |caps: &regex::Captures| {
            let name = &caps[1];
            match lookup_dotted(&root, name) {
                Some(v) => render(&v),
                None => {
                    tracing::warn!(placeholder = name, "unresolved template placeholder left untouched");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

fn lookup_dotted(root: &JsonValue, path: &str) -> Option<JsonValue> {
    let mut cur = root;
    for part in path.split('.') {
        cur = cur.as_object()?.get(part)?;
    }
    Some(cur.clone())
}

/// `$.a.b[0].c` syntax: dot and bracket indexing. Never throws on a missing
/// path — returns `Null`.
pub fn evaluate_json_path(expr: &str, root: &JsonValue) -> JsonValue {
    let trimmed = expr.trim();
    let rest = match trimmed.strip_prefix('$') {
        Some(r) => r,
        None => return JsonValue::Null,
    };
    let mut cur = root.clone();
    let mut chars = rest.chars().peekable();
    loop {
        match chars.peek() {
            None => break,
            Some('.') => {
                chars.next();
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '.' || c == '[' {
                        break;
                    }
                    name.push(c);
                    chars.next();
                }
                cur = match cur.as_object().and_then(|o| o.get(&name)) {
                    Some(v) => v.clone(),
                    None => return JsonValue::Null,
                };
            }
            Some('[') => {
                chars.next();
                let mut idx = String::new();
                while let Some(&c) = chars.peek() {
                    if c == ']' {
                        break;
                    }
                    idx.push(c);
                    chars.next();
                }
                chars.next();
                let i: usize = match idx.parse() {
                    Ok(i) => i,
                    Err(_) => return JsonValue::Null,
                };
                cur = match cur.as_array().and_then(|a| a.get(i)) {
                    Some(v) => v.clone(),
                    None => return JsonValue::Null,
                };
            }
            Some(_) => break,
        }
    }
    cur
}

/// Accepts JSONPath-decorated comparisons (e.g. `$.score >= 70`) by
/// substituting each `$.…` with its resolved value as a JSON literal, then
/// evaluating the resulting comparison through the hand-written expression
/// parser (§4.1). Never falls back to `false` silently on error: the caller
/// decides whether that is `ERR_EVAL` or `ERR_GATE`.
pub fn evaluate_condition(expr: &str, root: &JsonValue) -> Result<bool, ContextError> {
    let substituted = jsonpath_re().replace_all(expr, |caps: &regex::Captures| {
        let value = evaluate_json_path(&caps[0], root);
        serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string())
    });
    let empty: HashMap<String, JsonValue> = HashMap::new();
    let result = expr::eval(&substituted, &empty).map_err(|e| ContextError::Eval(e.to_string()))?;
    Ok(expr::truthy(&result))
}

/// `{{name}}` → variable lookup, `$.path` → JSONPath, anything else → literal
/// string.
pub fn evaluate_mapping(source: &str, ctx: &ExecutionContext) -> JsonValue {
    let root = merged_root(ctx, &ctx.variables);
    evaluate_mapping_on_root(source, &root)
}

/// Same contract as [`evaluate_mapping`] but against an arbitrary root
/// object, for executors (agent output extraction, sub-workflow input
/// mapping) that need to resolve against data that isn't the live
/// `ExecutionContext` itself — e.g. a just-produced node output.
pub fn evaluate_mapping_on_root(source: &str, root: &JsonValue) -> JsonValue {
    let trimmed = source.trim();
    if trimmed.starts_with("{{") && trimmed.ends_with("}}") {
        let name = trimmed[2..trimmed.len() - 2].trim();
        return lookup_dotted(root, name).unwrap_or(JsonValue::Null);
    }
    if trimmed.starts_with('$') {
        return evaluate_json_path(trimmed, root);
    }
    json!(source)
}

/// Applies a declared output-mapping transform expression to `value`,
/// exposing it under the identifier `value`. Transforms are plain
/// expressions evaluated through the same bounded parser as conditions.
pub fn apply_transform(transform: &str, value: &JsonValue) -> Result<JsonValue, ContextError> {
    let mut scope = HashMap::new();
    scope.insert("value".to_string(), value.clone());
    expr::eval(transform, &scope).map_err(|e| ContextError::Eval(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn base_ctx() -> ExecutionContext {
        let mut ctx = ExecutionContext::new(
            "inst-1".to_string(),
            "wf-1".to_string(),
            PathBuf::from("/proj"),
            Utc::now(),
        );
        ctx.variables.insert("name".to_string(), json!("Ada"));
        ctx.variables.insert("score".to_string(), json!(85));
        ctx
    }

    #[test]
    fn substitute_replaces_known_variable() {
        let ctx = base_ctx();
        assert_eq!(substitute("Hello {{name}}", &ctx), "Hello Ada");
    }

    #[test]
    fn substitute_leaves_unknown_placeholder() {
        let ctx = base_ctx();
        assert_eq!(substitute("Hello {{missing}}", &ctx), "Hello {{missing}}");
    }

    #[test]
    fn substitute_is_identity_without_placeholders() {
        let ctx = base_ctx();
        assert_eq!(substitute("no placeholders here", &ctx), "no placeholders here");
    }

    #[test]
    fn jsonpath_resolves_nested_array_index() {
        let root = json!({"a": {"b": [{"c": 7}]}});
        assert_eq!(evaluate_json_path("$.a.b[0].c", &root), json!(7));
    }

    #[test]
    fn jsonpath_missing_path_is_null() {
        let root = json!({"a": 1});
        assert_eq!(evaluate_json_path("$.x.y", &root), JsonValue::Null);
    }

    #[test]
    fn evaluate_condition_gate_pass_and_fail() {
        let root = json!({"score": 85});
        assert!(evaluate_condition("$.score >= 70", &root).unwrap());
        let root = json!({"score": 40});
        assert!(!evaluate_condition("$.score >= 70", &root).unwrap());
    }
}

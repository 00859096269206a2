use crate::sandbox::expr::{self, VariableResolver};
use common::types::JsonValue;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script syntax error: {0}")]
    Syntax(String),
    #[error("script evaluation error: {0}")]
    Eval(String),
    #[error("script exceeded its step budget")]
    FuelExhausted,
    #[error("script exceeded its CPU deadline")]
    DeadlineExceeded,
}

#[derive(Debug, Clone)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
    pub return_value: JsonValue,
}

#[derive(Debug, Clone)]
enum Stmt {
    Let(String, String),
    Assign(String, String),
    If(String, Vec<Stmt>, Vec<Stmt>),
    While(String, Vec<Stmt>),
    Return(String),
    Log(String),
    Expr(String),
}

/// Minimal statement-level parser over a JavaScript-like subset: variable
/// declarations, assignment, `if`/`else`, bounded `while`, `return`, and
/// `console.log`. Expression text is not tokenized here — it is handed whole
/// to [`expr::eval`], which owns the operator/literal grammar.
struct StmtParser<'a> {
    src: &'a [char],
    pos: usize,
}

impl<'a> StmtParser<'a> {
    fn new(src: &'a [char]) -> Self {
        Self { src, pos: 0 }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn starts_with_kw(&self, kw: &str) -> bool {
        let kw_chars: Vec<char> = kw.chars().collect();
        if self.pos + kw_chars.len() > self.src.len() {
            return false;
        }
        if self.src[self.pos..self.pos + kw_chars.len()] != kw_chars[..] {
            return false;
        }
        let next = self.src.get(self.pos + kw_chars.len()).copied();
        !matches!(next, Some(c) if c.is_alphanumeric() || c == '_')
    }

    fn consume_kw(&mut self, kw: &str) {
        self.pos += kw.chars().count();
    }

    fn read_ident(&mut self) -> Result<String, ScriptError> {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.src.len() && (self.src[self.pos].is_alphanumeric() || self.src[self.pos] == '_') {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(ScriptError::Syntax("expected identifier".to_string()));
        }
        Ok(self.src[start..self.pos].iter().collect())
    }

    fn expect_char(&mut self, c: char) -> Result<(), ScriptError> {
        self.skip_ws();
        if self.peek_char() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(ScriptError::Syntax(format!("expected '{c}'")))
        }
    }

    /// Reads text up to (not including) the next occurrence of any char in
    /// `stops` at bracket depth zero, respecting quoted strings.
    fn read_balanced(&mut self, stops: &[char]) -> String {
        self.skip_ws();
        let start = self.pos;
        let mut depth: i32 = 0;
        let mut in_str: Option<char> = None;
        while self.pos < self.src.len() {
            let c = self.src[self.pos];
            if let Some(q) = in_str {
                if c == '\\' {
                    self.pos += 1;
                } else if c == q {
                    in_str = None;
                }
                self.pos += 1;
                continue;
            }
            match c {
                '"' | '\'' => {
                    in_str = Some(c);
                    self.pos += 1;
                }
                '(' | '[' | '{' => {
                    depth += 1;
                    self.pos += 1;
                }
                ')' | ']' | '}' => {
                    if depth == 0 && stops.contains(&c) {
                        break;
                    }
                    depth -= 1;
                    self.pos += 1;
                }
                c if depth == 0 && stops.contains(&c) => break,
                _ => self.pos += 1,
            }
        }
        self.src[start..self.pos].iter().collect::<String>().trim().to_string()
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect_char('{')?;
        let mut stmts = Vec::new();
        loop {
            self.skip_ws();
            if self.peek_char() == Some('}') {
                self.pos += 1;
                break;
            }
            if self.pos >= self.src.len() {
                return Err(ScriptError::Syntax("unterminated block".to_string()));
            }
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_program(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let mut stmts = Vec::new();
        loop {
            self.skip_ws();
            if self.pos >= self.src.len() {
                break;
            }
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ScriptError> {
        self.skip_ws();
        if self.starts_with_kw("let") || self.starts_with_kw("const") {
            let kw_len = if self.starts_with_kw("let") { "let" } else { "const" };
            self.consume_kw(kw_len);
            let name = self.read_ident()?;
            self.expect_char('=')?;
            let rhs = self.read_balanced(&[';']);
            self.skip_semicolon();
            return Ok(Stmt::Let(name, rhs));
        }
        if self.starts_with_kw("if") {
            self.consume_kw("if");
            self.expect_char('(')?;
            let cond = self.read_balanced(&[')']);
            self.expect_char(')')?;
            self.skip_ws();
            let then_body = self.parse_block()?;
            self.skip_ws();
            let else_body = if self.starts_with_kw("else") {
                self.consume_kw("else");
                self.skip_ws();
                if self.starts_with_kw("if") {
                    vec![self.parse_stmt()?]
                } else {
                    self.parse_block()?
                }
            } else {
                Vec::new()
            };
            return Ok(Stmt::If(cond, then_body, else_body));
        }
        if self.starts_with_kw("while") {
            self.consume_kw("while");
            self.expect_char('(')?;
            let cond = self.read_balanced(&[')']);
            self.expect_char(')')?;
            self.skip_ws();
            let body = self.parse_block()?;
            return Ok(Stmt::While(cond, body));
        }
        if self.starts_with_kw("return") {
            self.consume_kw("return");
            let expr_text = self.read_balanced(&[';']);
            self.skip_semicolon();
            return Ok(Stmt::Return(expr_text));
        }
        if self.starts_with_kw("console") {
            let save = self.pos;
            self.consume_kw("console");
            self.skip_ws();
            if self.peek_char() == Some('.') {
                self.pos += 1;
                let method = self.read_ident()?;
                if method == "log" || method == "error" {
                    self.expect_char('(')?;
                    let arg = self.read_balanced(&[')']);
                    self.expect_char(')')?;
                    self.skip_semicolon();
                    return Ok(Stmt::Log(arg));
                }
            }
            self.pos = save;
        }

        // Try `ident = expr;` assignment; fall back to a bare expression statement.
        let save = self.pos;
        if let Ok(name) = self.read_ident() {
            self.skip_ws();
            if self.peek_char() == Some('=') && self.src.get(self.pos + 1) != Some(&'=') {
                self.pos += 1;
                let rhs = self.read_balanced(&[';']);
                self.skip_semicolon();
                return Ok(Stmt::Assign(name, rhs));
            }
        }
        self.pos = save;
        let expr_text = self.read_balanced(&[';']);
        self.skip_semicolon();
        Ok(Stmt::Expr(expr_text))
    }

    fn skip_semicolon(&mut self) {
        self.skip_ws();
        if self.peek_char() == Some(';') {
            self.pos += 1;
        }
    }
}

struct Scope<'a> {
    vars: &'a HashMap<String, JsonValue>,
}

impl<'a> VariableResolver for Scope<'a> {
    fn resolve(&self, name: &str) -> Option<JsonValue> {
        self.vars.get(name).cloned()
    }
}

struct Interpreter {
    vars: HashMap<String, JsonValue>,
    stdout: String,
    stderr: String,
    steps_remaining: u64,
    deadline: Instant,
}

enum Flow {
    Normal,
    Return(JsonValue),
}

impl Interpreter {
    fn tick(&mut self) -> Result<(), ScriptError> {
        if Instant::now() > self.deadline {
            return Err(ScriptError::DeadlineExceeded);
        }
        if self.steps_remaining == 0 {
            return Err(ScriptError::FuelExhausted);
        }
        self.steps_remaining -= 1;
        Ok(())
    }

    fn eval(&self, text: &str) -> Result<JsonValue, ScriptError> {
        let scope = Scope { vars: &self.vars };
        expr::eval(text, &scope).map_err(|e| ScriptError::Eval(e.to_string()))
    }

    fn run_block(&mut self, stmts: &[Stmt]) -> Result<Flow, ScriptError> {
        for stmt in stmts {
            self.tick()?;
            match self.run_stmt(stmt)? {
                Flow::Normal => {}
                ret @ Flow::Return(_) => return Ok(ret),
            }
        }
        Ok(Flow::Normal)
    }

    fn run_stmt(&mut self, stmt: &Stmt) -> Result<Flow, ScriptError> {
        match stmt {
            Stmt::Let(name, rhs) | Stmt::Assign(name, rhs) => {
                let value = self.eval(rhs)?;
                self.vars.insert(name.clone(), value);
                Ok(Flow::Normal)
            }
            Stmt::If(cond, then_body, else_body) => {
                if expr::truthy(&self.eval(cond)?) {
                    self.run_block(then_body)
                } else {
                    self.run_block(else_body)
                }
            }
            Stmt::While(cond, body) => {
                while expr::truthy(&self.eval(cond)?) {
                    self.tick()?;
                    match self.run_block(body)? {
                        Flow::Normal => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(expr_text) => Ok(Flow::Return(self.eval(expr_text)?)),
            Stmt::Log(expr_text) => {
                let value = self.eval(expr_text)?;
                self.stdout.push_str(&display(&value));
                self.stdout.push('\n');
                Ok(Flow::Normal)
            }
            Stmt::Expr(expr_text) => {
                if !expr_text.trim().is_empty() {
                    self.eval(expr_text)?;
                }
                Ok(Flow::Normal)
            }
        }
    }
}

fn display(v: &JsonValue) -> String {
    match v {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Runs `code` against `variables` under a fixed step budget and CPU
/// deadline (§4.2): no access to the host filesystem, network, process, or
/// environment is reachable from this grammar at all, so the capability
/// gates named in the design are enforced by construction rather than by
/// runtime checks.
pub fn run(code: &str, variables: HashMap<String, JsonValue>, max_steps: u64, cpu_timeout: Duration) -> Result<ScriptOutput, ScriptError> {
    let chars: Vec<char> = code.chars().collect();
    let program = StmtParser::new(&chars).parse_program()?;

    let mut interp = Interpreter {
        vars: variables,
        stdout: String::new(),
        stderr: String::new(),
        steps_remaining: max_steps,
        deadline: Instant::now() + cpu_timeout,
    };

    let flow = interp.run_block(&program)?;
    let return_value = match flow {
        Flow::Return(v) => v,
        Flow::Normal => JsonValue::Null,
    };

    Ok(ScriptOutput {
        stdout: interp.stdout,
        stderr: interp.stderr,
        return_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn simple_return() {
        let out = run("return 1 + 2;", HashMap::new(), 1000, Duration::from_secs(1)).unwrap();
        assert_eq!(out.return_value, json!(3));
    }

    #[test]
    fn while_loop_accumulates() {
        let code = "let total = 0; let i = 0; while (i < 5) { total = total + i; i = i + 1; } return total;";
        let out = run(code, HashMap::new(), 10_000, Duration::from_secs(1)).unwrap();
        assert_eq!(out.return_value, json!(10));
    }

    #[test]
    fn console_log_captures_stdout() {
        let out = run("console.log(\"hello\");", HashMap::new(), 1000, Duration::from_secs(1)).unwrap();
        assert_eq!(out.stdout, "hello\n");
    }

    #[test]
    fn if_else_branches() {
        let code = "let x = 1; if (x > 0) { return \"pos\"; } else { return \"neg\"; }";
        let out = run(code, HashMap::new(), 1000, Duration::from_secs(1)).unwrap();
        assert_eq!(out.return_value, json!("pos"));
    }

    #[test]
    fn reads_injected_variable() {
        let mut vars = HashMap::new();
        vars.insert("context".to_string(), json!({"score": 85}));
        let out = run("return context;", vars, 1000, Duration::from_secs(1)).unwrap();
        assert_eq!(out.return_value, json!({"score": 85}));
    }

    #[test]
    fn fuel_exhaustion_is_bounded() {
        let code = "let i = 0; while (i < 1000000) { i = i + 1; }";
        let result = run(code, HashMap::new(), 100, Duration::from_secs(5));
        assert!(matches!(result, Err(ScriptError::FuelExhausted)));
    }
}

//! The block script language understood by the reference backend.
//!
//! One statement per line; `#` starts a comment line.
//!
//! ```text
//! # move, then report where we ended up
//! motion_movesteps STEPS=10
//! set pos = motion_xposition
//! looks_say MESSAGE=$pos
//! looks_sayforsecs MESSAGE="hello there" SECS=0.5
//! ```
//!
//! A linked unit wraps bodies in `@script {...}` / `@end` sections whose
//! header is a JSON object naming the script and its target.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::runtime::ids::{ScriptId, TargetId};
use crate::runtime::value::{cast, BlockArgs, Value};

static STATEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:set\s+([A-Za-z_]\w*)\s*=\s*)?([A-Za-z_]\w*)(.*)$").expect("statement regex")
});

static ARGUMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s+([A-Za-z_]\w*)=("(?:[^"\\]|\\.)*"|\S+)"#).expect("argument regex")
});

const SECTION_START: &str = "@script ";
const SECTION_END: &str = "@end";

/// Script syntax error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    fn new(
        line: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Argument value: a literal or a variable reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Var(String),
}

/// One block invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// 1-based line within the body.
    pub line: usize,
    /// Variable receiving the block's value, if any.
    pub assign: Option<String>,
    pub opcode: String,
    pub args: Vec<(String, Operand)>,
}

impl Statement {
    /// Resolve arguments against `lookup`. Returns the first unknown variable on failure.
    pub fn bind_args(
        &self,
        lookup: impl Fn(&str) -> Option<Value>,
    ) -> Result<BlockArgs, String> {
        let mut args = BlockArgs::new();
        for (name, operand) in &self.args {
            let value = match operand {
                Operand::Literal(value) => value.clone(),
                Operand::Var(var) => lookup(var).ok_or_else(|| var.clone())?,
            };
            args.insert(name, value);
        }
        Ok(args)
    }
}

/// Header of one section in a linked unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionHeader {
    pub script: ScriptId,
    pub target: TargetId,
}

/// A parsed script body with its identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptDef {
    pub id: ScriptId,
    pub target: TargetId,
    pub body: Vec<Statement>,
}

/// Parse one script body.
pub fn parse_body(code: &str) -> Result<Vec<Statement>, ParseError> {
    let mut statements = Vec::new();
    for (index, raw) in code.lines().enumerate() {
        let line = index + 1;
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        statements.push(parse_statement(line, text)?);
    }
    Ok(statements)
}

fn parse_statement(
    line: usize,
    text: &str,
) -> Result<Statement, ParseError> {
    let caps = STATEMENT
        .captures(text)
        .ok_or_else(|| ParseError::new(line, format!("expected an opcode, found `{text}`")))?;
    let assign = caps.get(1).map(|m| m.as_str().to_string());
    let opcode = caps
        .get(2)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    if opcode == "set" && assign.is_none() {
        return Err(ParseError::new(line, "expected `set <name> = <opcode> ...`"));
    }

    let mut rest = caps.get(3).map(|m| m.as_str()).unwrap_or("").trim_end();
    let mut args = Vec::new();
    while !rest.is_empty() {
        let arg = ARGUMENT
            .captures(rest)
            .ok_or_else(|| ParseError::new(line, format!("unexpected `{}`", rest.trim())))?;
        let name = arg.get(1).map(|m| m.as_str()).unwrap_or_default();
        let raw = arg.get(2).map(|m| m.as_str()).unwrap_or_default();
        args.push((name.to_string(), parse_operand(line, raw)?));
        rest = &rest[arg.get(0).map(|m| m.end()).unwrap_or(rest.len())..];
    }

    Ok(Statement {
        line,
        assign,
        opcode,
        args,
    })
}

fn parse_operand(
    line: usize,
    raw: &str,
) -> Result<Operand, ParseError> {
    if raw.starts_with('"') {
        let text: String = serde_json::from_str(raw)
            .map_err(|e| ParseError::new(line, format!("bad string literal {raw}: {e}")))?;
        return Ok(Operand::Literal(Value::String(text)));
    }
    if let Some(var) = raw.strip_prefix('$') {
        if var.is_empty() {
            return Err(ParseError::new(line, "empty variable name"));
        }
        return Ok(Operand::Var(var.to_string()));
    }
    Ok(Operand::Literal(match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match raw.parse::<f64>() {
            Ok(n) if n.is_finite() => cast::number_value(n),
            _ => Value::String(raw.to_string()),
        },
    }))
}

/// Write script bodies into one linked source text.
pub fn render_unit<'a>(sections: impl IntoIterator<Item = (SectionHeader, &'a str)>) -> String {
    let mut out = String::new();
    for (header, code) in sections {
        out.push_str(SECTION_START);
        // Ids are plain strings, so serialising the header cannot fail.
        out.push_str(&serde_json::to_string(&header).unwrap_or_default());
        out.push('\n');
        for line in code.lines() {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(SECTION_END);
        out.push('\n');
    }
    out
}

/// Parse a linked source text back into scripts.
pub fn parse_unit(source: &str) -> Result<Vec<ScriptDef>, ParseError> {
    let mut scripts = Vec::new();
    let mut current: Option<(SectionHeader, usize, String)> = None;

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        match current.as_mut() {
            None => {
                let text = raw.trim();
                if text.is_empty() {
                    continue;
                }
                let header = text
                    .strip_prefix(SECTION_START)
                    .ok_or_else(|| ParseError::new(line, "expected `@script` section"))?;
                let header: SectionHeader = serde_json::from_str(header)
                    .map_err(|e| ParseError::new(line, format!("bad section header: {e}")))?;
                current = Some((header, line, String::new()));
            }
            Some((_, _, body)) => {
                if raw.trim() == SECTION_END {
                    if let Some((header, start, body)) = current.take() {
                        let statements = parse_body(&body).map_err(|e| ParseError::new(start + e.line, e.message))?;
                        scripts.push(ScriptDef {
                            id: header.script,
                            target: header.target,
                            body: statements,
                        });
                    }
                } else {
                    body.push_str(raw);
                    body.push('\n');
                }
            }
        }
    }

    if let Some((_, start, _)) = current {
        return Err(ParseError::new(start, "unterminated `@script` section"));
    }
    Ok(scripts)
}

//! Path Expressions
//!
//! The default [`ExpressionCompiler`]. It understands dotted property paths
//! with integer index segments (`items[0].price`, `$scope.total`) and a few
//! literals (`null`, `true`, `false`, numbers, quoted strings). Paths are
//! assignable; literals are not.
//!
//! Reads never fail: a missing segment evaluates to `Null`. Writes create
//! missing intermediate objects and grow arrays as needed, and fail only when
//! they would have to write through a primitive.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::{Expr, ExpressionCompiler};
use crate::error::{DddiError, Result};
use crate::value::{Object, Value};

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => write!(f, ".{key}"),
            Segment::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// Compiles path and literal expressions, caching results by text.
#[derive(Default)]
pub struct PathCompiler {
    cache: RefCell<HashMap<String, Expr>>,
}

impl PathCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    fn compile_uncached(text: &str) -> Result<Expr> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(DddiError::invalid_expression(text, "empty expression"));
        }

        if let Some(literal) = parse_literal(trimmed) {
            return Ok(Expr::read_only(trimmed, move |_| literal.clone()));
        }

        let segments: Rc<[Segment]> = parse_path(trimmed)
            .map_err(|reason| DddiError::invalid_expression(text, reason))?
            .into();

        let get_segments = Rc::clone(&segments);
        let path = trimmed.to_string();
        Ok(Expr::assignable(
            trimmed,
            move |context| read_path(context, &get_segments),
            move |context, value| write_path(&path, context, &segments, value),
        ))
    }
}

impl ExpressionCompiler for PathCompiler {
    fn compile(&self, text: &str) -> Result<Expr> {
        if let Some(expr) = self.cache.borrow().get(text) {
            return Ok(expr.clone());
        }
        let expr = Self::compile_uncached(text)?;
        self.cache.borrow_mut().insert(text.to_string(), expr.clone());
        Ok(expr)
    }
}

fn parse_literal(text: &str) -> Option<Value> {
    match text {
        "null" | "undefined" => return Some(Value::Null),
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        _ => {}
    }

    let first = text.chars().next()?;
    if first.is_ascii_digit() || first == '-' || first == '.' {
        return text.parse::<f64>().ok().map(Value::Number);
    }

    for quote in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            let inner = &text[1..text.len() - 1];
            if !inner.contains(quote) {
                return Some(Value::String(inner.to_string()));
            }
        }
    }

    None
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn parse_path(text: &str) -> std::result::Result<Vec<Segment>, String> {
    let chars: Vec<char> = text.chars().collect();
    let mut segments = Vec::new();
    let mut i = 0;
    let mut expect_ident = true;

    while i < chars.len() {
        let c = chars[i];
        if expect_ident {
            if !is_ident_start(c) {
                return Err(format!("unexpected '{c}' at offset {i}"));
            }
            let start = i;
            while i < chars.len() && is_ident_continue(chars[i]) {
                i += 1;
            }
            segments.push(Segment::Key(chars[start..i].iter().collect()));
            expect_ident = false;
        } else if c == '.' {
            i += 1;
            expect_ident = true;
        } else if c == '[' {
            i += 1;
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            if start == i || i >= chars.len() || chars[i] != ']' {
                return Err(format!("expected integer index at offset {start}"));
            }
            let index: String = chars[start..i].iter().collect();
            let index = index
                .parse::<usize>()
                .map_err(|e| format!("bad index '{index}': {e}"))?;
            segments.push(Segment::Index(index));
            i += 1;
        } else {
            return Err(format!("unexpected '{c}' at offset {i}"));
        }
    }

    if expect_ident {
        return Err("expression ends with '.'".to_string());
    }
    Ok(segments)
}

fn child(value: &Value, segment: &Segment) -> Value {
    match (value, segment) {
        (Value::Array(array), Segment::Key(key)) if key == "length" => Value::from(array.len()),
        (Value::Array(array), Segment::Index(index)) => array.get(*index),
        (Value::Object(object), Segment::Key(key)) => object.get(key),
        (Value::Object(object), Segment::Index(index)) => object.get(&index.to_string()),
        _ => Value::Null,
    }
}

fn read_path(context: &Value, segments: &[Segment]) -> Value {
    segments
        .iter()
        .fold(context.clone(), |current, segment| child(&current, segment))
}

fn put(path: &str, container: &Value, segment: &Segment, value: Value) -> Result<()> {
    match (container, segment) {
        (Value::Object(object), Segment::Key(key)) => object.insert(key.clone(), value),
        (Value::Object(object), Segment::Index(index)) => object.insert(index.to_string(), value),
        (Value::Array(array), Segment::Index(index)) => array
            .set(*index, value)
            .map_err(|err| DddiError::assign_failed(path, err.to_string()))?,
        (other, segment) => {
            return Err(DddiError::assign_failed(
                path,
                format!("cannot set '{segment}' on {}", other.type_name()),
            ))
        }
    }
    Ok(())
}

fn write_path(path: &str, context: &Value, segments: &[Segment], value: Value) -> Result<()> {
    let Some((last, parents)) = segments.split_last() else {
        return Err(DddiError::assign_failed(path, "empty path"));
    };

    let mut current = context.clone();
    for segment in parents {
        let mut next = child(&current, segment);
        if next.is_null() {
            next = Value::Object(Object::new());
            put(path, &current, segment, next.clone())?;
        }
        current = next;
    }

    put(path, &current, last, value)
}

//! Variable paths: `@input.items[0].name`, `@foo?.bar`
//!
//! Lookups are lenient. A missing key anywhere along the path resolves to
//! `None` (undefined); only [`require_var`] turns that into an error.
use brick_core::{ExpressionError, TemplateContext};
use serde_json::Value;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Split a variable path into segments. `?.` is treated like `.`; quoted
/// bracket keys are taken verbatim (`@a["b.c"]` is one key).
pub fn parse_path(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut key = String::new();
    let mut chars = path.trim().chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => flush_key(&mut key, &mut segments),
            '?' if chars.peek() == Some(&'.') => {
                chars.next();
                flush_key(&mut key, &mut segments);
            }
            '[' => {
                flush_key(&mut key, &mut segments);
                segments.push(bracket_segment(&mut chars));
            }
            c => key.push(c),
        }
    }
    flush_key(&mut key, &mut segments);

    segments
}

fn flush_key(key: &mut String, segments: &mut Vec<Segment>) {
    if !key.is_empty() {
        segments.push(Segment::Key(std::mem::take(key)));
    }
}

/// Read a bracket segment up to and including its closing `]`
fn bracket_segment(chars: &mut Peekable<Chars<'_>>) -> Segment {
    while chars.next_if(|c| c.is_whitespace()).is_some() {}

    if let Some(quote) = chars.next_if(|c| *c == '"' || *c == '\'') {
        let mut key = String::new();
        while let Some(c) = chars.next() {
            match c {
                '\\' => key.extend(chars.next()),
                c if c == quote => break,
                c => key.push(c),
            }
        }
        for c in chars.by_ref() {
            if c == ']' {
                break;
            }
        }
        return Segment::Key(key);
    }

    let mut inner = String::new();
    for c in chars.by_ref() {
        if c == ']' {
            break;
        }
        inner.push(c);
    }
    let inner = inner.trim();
    match inner.parse::<usize>() {
        Ok(index) => Segment::Index(index),
        Err(_) => Segment::Key(inner.to_string()),
    }
}

/// Walk `segments` into `value`
pub fn get_in<'v>(value: &'v Value, segments: &[Segment]) -> Option<&'v Value> {
    segments.iter().try_fold(value, |current, segment| match (current, segment) {
        (Value::Object(map), Segment::Key(key)) => map.get(key),
        (Value::Object(map), Segment::Index(index)) => map.get(&index.to_string()),
        (Value::Array(items), Segment::Index(index)) => items.get(*index),
        (Value::Array(items), Segment::Key(key)) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Resolve a `var` expression. `None` means undefined.
pub fn lookup(ctx: &TemplateContext, path: &str) -> Option<Value> {
    let segments = parse_path(path);
    let (Segment::Key(name), rest) = segments.split_first()? else {
        return None;
    };
    let root = ctx.get(name)?;
    get_in(root, rest).cloned()
}

/// Strict variant for callers that need the value to exist
pub fn require_var(ctx: &TemplateContext, path: &str) -> Result<Value, ExpressionError> {
    lookup(ctx, path).ok_or_else(|| ExpressionError::MissingVariable(path.trim().to_string()))
}

/// Context variable a path reads from, ex: `@input` for `@input.msg`
pub fn root_variable(path: &str) -> Option<String> {
    match parse_path(path).into_iter().next()? {
        Segment::Key(name) => Some(name),
        Segment::Index(_) => None,
    }
}

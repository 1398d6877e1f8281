//! Normalization of the argument encodings models actually produce.
//!
//! Runs before any parsing the target sees. Every repair that changes the
//! shape of the arguments is logged at `warn`.

use serde_json::{Map, Value};

/// Keys models wrap the real argument object in.
const WRAPPER_KEYS: [&str; 5] = ["arguments", "args", "input", "params", "parameters"];

/// Repairs nest at most this deep (`{"input": {"args": "..."}}`).
const MAX_UNWRAP: usize = 4;

/// A JSON parse failure with the position serde_json reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseFailure {
    pub fn from_json(err: &serde_json::Error) -> Self {
        let text = err.to_string();
        // serde_json appends " at line L column C"; the position is kept separately.
        let message = text
            .rsplit_once(" at line ")
            .map_or(text.as_str(), |(head, _)| head)
            .to_string();
        Self {
            message,
            line: err.line(),
            column: err.column(),
        }
    }
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (line {}, column {})", self.message, self.line, self.column)
    }
}

/// Why the arguments could not be turned into an object.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgumentError {
    #[error("arguments are not valid JSON: {0}")]
    Syntax(ParseFailure),
    #[error("arguments must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Turn whatever the model sent as `arguments` into an argument object.
pub fn normalize_arguments(raw: Value) -> Result<Map<String, Value>, ArgumentError> {
    normalize_arguments_with(raw, &|_, _| true)
}

/// As [`normalize_arguments`], but a self-keyed fragment is only unwrapped
/// when `accept(key, inner)` holds. `code = "red"` is a fragment and also a
/// valid script, so the caller decides which reading wins.
pub fn normalize_arguments_with(
    raw: Value,
    accept: &dyn Fn(&str, &str) -> bool,
) -> Result<Map<String, Value>, ArgumentError> {
    normalize_at(raw, 0, accept)
}

fn normalize_at(
    raw: Value,
    depth: usize,
    accept: &dyn Fn(&str, &str) -> bool,
) -> Result<Map<String, Value>, ArgumentError> {
    let object = match raw {
        Value::Null => return Ok(Map::new()),
        Value::Object(object) => object,
        Value::String(text) => parse_text(&text)?,
        other => return Err(ArgumentError::NotAnObject(json_type(&other))),
    };

    if depth < MAX_UNWRAP {
        if let Some(inner) = wrapped_object(&object) {
            log::warn!("unwrapped arguments from a single wrapper key");
            return normalize_at(inner, depth + 1, accept);
        }
    }
    Ok(unwrap_self_keyed(object, accept))
}

/// Arguments sent as a string: JSON first, then `key="value"` fragments.
fn parse_text(text: &str) -> Result<Map<String, Value>, ArgumentError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(object)) => {
            log::debug!("parsed arguments given as a JSON string");
            Ok(object)
        }
        Ok(other) => Err(ArgumentError::NotAnObject(json_type(&other))),
        Err(err) => match parse_fragment(trimmed) {
            Some(object) => {
                log::warn!("parsed arguments given as key=value fragments");
                Ok(object)
            }
            None => Err(ArgumentError::Syntax(ParseFailure::from_json(&err))),
        },
    }
}

/// `{"arguments": {...}}` and friends. Only a lone wrapper key is unwrapped,
/// and only when it holds an object or a string that parses to one.
fn wrapped_object(object: &Map<String, Value>) -> Option<Value> {
    if object.len() != 1 {
        return None;
    }
    let (key, value) = object.iter().next()?;
    if !WRAPPER_KEYS.contains(&key.as_str()) {
        return None;
    }
    match value {
        Value::Object(_) => Some(value.clone()),
        Value::String(text) => match serde_json::from_str::<Value>(text.trim()) {
            Ok(inner @ Value::Object(_)) => Some(inner),
            _ => None,
        },
        _ => None,
    }
}

/// `{"code": "code=\"...\""}` becomes `{"code": "..."}`. Only a quoted
/// fragment value counts, so a script like `code = 5` passes through.
fn unwrap_self_keyed(object: Map<String, Value>, accept: &dyn Fn(&str, &str) -> bool) -> Map<String, Value> {
    object
        .into_iter()
        .map(|(key, value)| {
            let repaired = match &value {
                Value::String(text) => parse_fragment(text.trim()).and_then(|mut fragment| {
                    if fragment.len() == 1 {
                        fragment
                            .remove(&key)
                            .filter(|inner| inner.as_str().is_some_and(|inner| accept(&key, inner)))
                    } else {
                        None
                    }
                }),
                _ => None,
            };
            match repaired {
                Some(inner) => {
                    log::warn!("unwrapped '{key}' from a {key}=... fragment");
                    (key, inner)
                }
                None => (key, value),
            }
        })
        .collect()
}

/// Parse `key="value", other=3, flag=true`. Quoted values are strings with
/// the usual escapes; bare values are read as JSON when they parse and as
/// text otherwise. Returns `None` unless the whole input is fragments.
pub fn parse_fragment(text: &str) -> Option<Map<String, Value>> {
    let mut chars = text.chars().peekable();
    let mut object = Map::new();

    loop {
        skip_ws(&mut chars);
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                key.push(c);
                chars.next();
            } else {
                break;
            }
        }
        if key.is_empty() || key.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        skip_ws(&mut chars);
        if chars.next() != Some('=') {
            return None;
        }
        skip_ws(&mut chars);

        let value = match chars.peek() {
            Some(&quote @ ('"' | '\'')) => {
                chars.next();
                Value::String(quoted(&mut chars, quote)?)
            }
            Some(_) => bare(&mut chars)?,
            None => return None,
        };
        object.insert(key, value);

        skip_ws(&mut chars);
        match chars.next() {
            None => return Some(object),
            Some(',') => {}
            Some(_) => return None,
        }
    }
}

fn skip_ws(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

fn quoted(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, quote: char) -> Option<String> {
    let mut out = String::new();
    loop {
        match chars.next()? {
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                other => out.push(other),
            },
            c if c == quote => return Some(out),
            c => out.push(c),
        }
    }
}

/// A bare value runs to the next comma outside brackets and quotes. Text
/// that is not JSON must be a single word.
fn bare(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<Value> {
    let mut raw = String::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    while let Some(&c) = chars.peek() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else {
            match c {
                '"' => in_string = true,
                '[' | '{' => depth += 1,
                ']' | '}' => depth = depth.checked_sub(1)?,
                ',' if depth == 0 => break,
                _ => {}
            }
        }
        raw.push(c);
        chars.next();
    }
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(_) if raw.contains(char::is_whitespace) => None,
        Err(_) => Some(Value::String(raw.to_string())),
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

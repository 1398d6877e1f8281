use std::cmp::Ordering;

use super::error::RuntimeError;
use super::value::Value;
use super::{Host, Limits};
use crate::model::Color;

type BuiltinImpl = fn(&mut dyn Host, &[Value]) -> Result<Value, RuntimeError>;

/// Built-in function: single source of truth for name, arity and behavior.
/// Adding a builtin means adding ONE entry here; the resolver, the
/// interpreter and the language reference all read from this table.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinFn {
    pub name: &'static str,
    pub params: &'static str,
    pub min_args: usize,
    /// `None` for variadic functions.
    pub max_args: Option<usize>,
    pub category: &'static str,
    pub description: &'static str,
    pub func: BuiltinImpl,
}

impl BuiltinFn {
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.is_none_or(|max| count <= max)
    }

    /// `expected 1 to 3 arguments` style description for errors.
    pub fn arity_text(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => plural(max, "argument"),
            Some(max) => format!("{} to {max} arguments", self.min_args),
            None => format!("at least {}", plural(self.min_args, "argument")),
        }
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// All built-in functions available to scripts.
pub static BUILTINS: &[BuiltinFn] = &[
    // ── Primitives ──────────────────────────────────────────────
    BuiltinFn {
        name: "len", params: "x", min_args: 1, max_args: Some(1),
        category: "primitive", description: "Length of a list, map or string", func: len,
    },
    BuiltinFn {
        name: "range", params: "start?, stop, step?", min_args: 1, max_args: Some(3),
        category: "primitive", description: "List of ints from start (default 0) up to but excluding stop", func: range,
    },
    BuiltinFn {
        name: "str", params: "x", min_args: 1, max_args: Some(1),
        category: "primitive", description: "Text form of any value", func: to_str,
    },
    BuiltinFn {
        name: "int", params: "x", min_args: 1, max_args: Some(1),
        category: "primitive", description: "Convert a number, bool or numeric string to int (truncates)", func: to_int,
    },
    BuiltinFn {
        name: "float", params: "x", min_args: 1, max_args: Some(1),
        category: "primitive", description: "Convert a number, bool or numeric string to float", func: to_float,
    },
    BuiltinFn {
        name: "abs", params: "x", min_args: 1, max_args: Some(1),
        category: "primitive", description: "Absolute value", func: abs,
    },
    BuiltinFn {
        name: "min", params: "a, b, ... | list", min_args: 1, max_args: None,
        category: "primitive", description: "Smallest of the arguments, or of one list", func: min,
    },
    BuiltinFn {
        name: "max", params: "a, b, ... | list", min_args: 1, max_args: None,
        category: "primitive", description: "Largest of the arguments, or of one list", func: max,
    },
    BuiltinFn {
        name: "round", params: "x, digits?", min_args: 1, max_args: Some(2),
        category: "primitive", description: "Round to nearest (halves away from zero); int without digits, float with", func: round,
    },
    BuiltinFn {
        name: "floor", params: "x", min_args: 1, max_args: Some(1),
        category: "primitive", description: "Round down to an int", func: floor,
    },
    BuiltinFn {
        name: "ceil", params: "x", min_args: 1, max_args: Some(1),
        category: "primitive", description: "Round up to an int", func: ceil,
    },
    BuiltinFn {
        name: "sqrt", params: "x", min_args: 1, max_args: Some(1),
        category: "primitive", description: "Square root", func: sqrt,
    },
    BuiltinFn {
        name: "sin", params: "x", min_args: 1, max_args: Some(1),
        category: "primitive", description: "Sine (radians)", func: sin,
    },
    BuiltinFn {
        name: "cos", params: "x", min_args: 1, max_args: Some(1),
        category: "primitive", description: "Cosine (radians)", func: cos,
    },
    BuiltinFn {
        name: "keys", params: "map", min_args: 1, max_args: Some(1),
        category: "primitive", description: "Keys of a map, in insertion order", func: keys,
    },
    BuiltinFn {
        name: "values", params: "map", min_args: 1, max_args: Some(1),
        category: "primitive", description: "Values of a map, in insertion order", func: values,
    },
    BuiltinFn {
        name: "push", params: "list, value", min_args: 2, max_args: Some(2),
        category: "primitive", description: "Append a value to a list (also list.push(v))", func: push,
    },
    BuiltinFn {
        name: "append", params: "list, value", min_args: 2, max_args: Some(2),
        category: "primitive", description: "Same as push", func: push,
    },
    BuiltinFn {
        name: "pop", params: "list, index?", min_args: 1, max_args: Some(2),
        category: "primitive", description: "Remove and return the last (or indexed) element", func: pop,
    },
    BuiltinFn {
        name: "contains", params: "collection, value", min_args: 2, max_args: Some(2),
        category: "primitive", description: "List element, map key or substring test", func: contains,
    },
    BuiltinFn {
        name: "sorted", params: "list", min_args: 1, max_args: Some(1),
        category: "primitive", description: "New list sorted ascending (numbers or strings)", func: sorted,
    },
    BuiltinFn {
        name: "sum", params: "list", min_args: 1, max_args: Some(1),
        category: "primitive", description: "Sum of a list of numbers", func: sum,
    },
    BuiltinFn {
        name: "format", params: "template, values...", min_args: 1, max_args: None,
        category: "primitive", description: "Replace each {} in template with the next value", func: format,
    },
    // ── Utilities ───────────────────────────────────────────────
    BuiltinFn {
        name: "random_color", params: "", min_args: 0, max_args: Some(0),
        category: "utility", description: "A random fully saturated color [r, g, b]", func: random_color,
    },
    BuiltinFn {
        name: "random_float", params: "min?, max?", min_args: 0, max_args: Some(2),
        category: "utility", description: "Uniform float in [min, max), default [0, 1)", func: random_float,
    },
    BuiltinFn {
        name: "random_int", params: "min, max", min_args: 2, max_args: Some(2),
        category: "utility", description: "Uniform int in [min, max], both inclusive", func: random_int,
    },
    BuiltinFn {
        name: "hsv_to_rgb", params: "h, s, v", min_args: 3, max_args: Some(3),
        category: "utility", description: "Hue in degrees, saturation and value 0-1, to [r, g, b]", func: hsv_to_rgb,
    },
    BuiltinFn {
        name: "rgb_to_hsv", params: "color", min_args: 1, max_args: Some(1),
        category: "utility", description: "[r, g, b] or color name to [h, s, v]", func: rgb_to_hsv,
    },
    BuiltinFn {
        name: "color", params: "name", min_args: 1, max_args: Some(1),
        category: "utility", description: "Named color or #rrggbb to [r, g, b]", func: color,
    },
    BuiltinFn {
        name: "lerp", params: "a, b, t", min_args: 3, max_args: Some(3),
        category: "utility", description: "a + (b - a) * t", func: lerp,
    },
    BuiltinFn {
        name: "lerp_color", params: "a, b, t", min_args: 3, max_args: Some(3),
        category: "utility", description: "Blend two colors, t clamped to 0-1", func: lerp_color,
    },
    BuiltinFn {
        name: "clamp", params: "x, lo, hi", min_args: 3, max_args: Some(3),
        category: "utility", description: "Limit x to [lo, hi]", func: clamp,
    },
    BuiltinFn {
        name: "log", params: "values...", min_args: 0, max_args: None,
        category: "utility", description: "Write the values to the run's log; returns null", func: log,
    },
    BuiltinFn {
        name: "print", params: "values...", min_args: 0, max_args: None,
        category: "utility", description: "Same as log", func: log,
    },
    // ── Time helpers ────────────────────────────────────────────
    BuiltinFn {
        name: "nearest_beat", params: "t", min_args: 1, max_args: Some(1),
        category: "time", description: "Beat time closest to t (earlier one on a tie); null without beats", func: nearest_beat,
    },
    BuiltinFn {
        name: "beats_between", params: "start, end", min_args: 2, max_args: Some(2),
        category: "time", description: "Beat times b with start <= b < end", func: beats_between,
    },
];

/// Builtins callable with method syntax: `xs.push(v)` is `push(xs, v)`.
pub static METHODS: &[&str] = &["push", "append", "pop", "keys", "values", "contains"];

pub fn lookup(name: &str) -> Option<&'static BuiltinFn> {
    BUILTINS.iter().find(|b| b.name == name)
}

pub fn is_method(name: &str) -> bool {
    METHODS.contains(&name)
}

// ── Argument helpers ────────────────────────────────────────────

fn number(func: &str, value: &Value) -> Result<f64, RuntimeError> {
    value.as_f64().ok_or_else(|| {
        RuntimeError::type_mismatch(format!(
            "{func}() expects a number, got {}",
            value.type_name()
        ))
    })
}

fn integer(func: &str, value: &Value) -> Result<i64, RuntimeError> {
    match value {
        Value::Int(n) => Ok(*n),
        other => Err(RuntimeError::type_mismatch(format!(
            "{func}() expects an int, got {}",
            other.type_name()
        ))),
    }
}

fn list_arg<'a>(func: &str, value: &'a Value) -> Result<&'a super::value::ListObj, RuntimeError> {
    match value {
        Value::List(list) => Ok(list),
        other => Err(RuntimeError::type_mismatch(format!(
            "{func}() expects a list, got {}",
            other.type_name()
        ))),
    }
}

fn map_arg<'a>(func: &str, value: &'a Value) -> Result<&'a super::value::MapObj, RuntimeError> {
    match value {
        Value::Map(map) => Ok(map),
        other => Err(RuntimeError::type_mismatch(format!(
            "{func}() expects a map, got {}",
            other.type_name()
        ))),
    }
}

/// `[r, g, b]` with int channels, or a color name / hex string.
pub fn color_arg(func: &str, value: &Value) -> Result<Color, RuntimeError> {
    match value {
        Value::Str(name) => Color::from_name(name).ok_or_else(|| {
            RuntimeError::invalid_value(format!("{func}(): unknown color name \"{name}\""))
        }),
        Value::List(list) => {
            let channels = list
                .items()
                .iter()
                .map(|c| match c {
                    Value::Int(n) => Ok(*n),
                    other => Err(RuntimeError::type_mismatch(format!(
                        "{func}(): color channels must be ints, got {}",
                        other.type_name()
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Color::from_channels(&channels)
                .map_err(|reason| RuntimeError::invalid_value(format!("{func}(): {reason}")))
        }
        other => Err(RuntimeError::type_mismatch(format!(
            "{func}() expects a color [r, g, b] or a color name, got {}",
            other.type_name()
        ))),
    }
}

pub fn color_value(c: Color) -> Value {
    Value::list(vec![
        Value::Int(i64::from(c.r)),
        Value::Int(i64::from(c.g)),
        Value::Int(i64::from(c.b)),
    ])
}

const I64_BOUND: f64 = 9_223_372_036_854_775_807.0;

pub fn float_to_int(func: &str, f: f64) -> Result<i64, RuntimeError> {
    if !f.is_finite() || f.abs() >= I64_BOUND {
        return Err(RuntimeError::invalid_value(format!(
            "{func}(): {} cannot be converted to an int",
            super::value::format_float(f)
        )));
    }
    Ok(f as i64)
}

fn arity(name: &str) -> RuntimeError {
    let expected = lookup(name).map_or_else(String::new, |b| format!(": expected {}", b.arity_text()));
    RuntimeError::type_mismatch(format!("wrong number of arguments to {name}(){expected}"))
}

// ── Primitives ──────────────────────────────────────────────────

fn len(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [x] = args else { return Err(arity("len")) };
    let n = match x {
        Value::Str(s) => s.chars().count(),
        Value::List(l) => l.len(),
        Value::Map(m) => m.len(),
        other => {
            return Err(RuntimeError::type_mismatch(format!(
                "len() expects a list, map or string, got {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
}

fn range(host: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let (start, stop, step) = match args {
        [stop] => (0, integer("range", stop)?, 1),
        [start, stop] => (integer("range", start)?, integer("range", stop)?, 1),
        [start, stop, step] => (
            integer("range", start)?,
            integer("range", stop)?,
            integer("range", step)?,
        ),
        _ => return Err(arity("range")),
    };
    int_range(host.limits(), start, stop, step)
}

/// `start, start + step, ...` up to but excluding `stop`; also backs `a..b`.
pub fn int_range(limits: &Limits, start: i64, stop: i64, step: i64) -> Result<Value, RuntimeError> {
    if step == 0 {
        return Err(RuntimeError::invalid_value("range() step must not be zero"));
    }
    let count = if (step > 0 && start < stop) || (step < 0 && start > stop) {
        let span = (i128::from(stop) - i128::from(start)).unsigned_abs();
        let step_abs = i128::from(step).unsigned_abs();
        span.div_ceil(step_abs)
    } else {
        0
    };
    if count > limits.max_collection_len as u128 {
        return Err(limits.collection_error());
    }
    let items = (0..count)
        .map(|i| {
            let v = i128::from(start) + i128::try_from(i).unwrap_or(0) * i128::from(step);
            Value::Int(i64::try_from(v).unwrap_or(stop))
        })
        .collect();
    Ok(Value::list(items))
}

fn to_str(host: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [x] = args else { return Err(arity("str")) };
    let text = x.display_within(host.limits().max_string_len)?;
    Ok(Value::string(text))
}

fn to_int(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [x] = args else { return Err(arity("int")) };
    match x {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(f) => float_to_int("int", *f).map(Value::Int),
        Value::Str(s) => {
            let trimmed = s.trim();
            if let Ok(n) = trimmed.parse::<i64>() {
                return Ok(Value::Int(n));
            }
            trimmed
                .parse::<f64>()
                .map_err(|_| RuntimeError::invalid_value(format!("int(): \"{s}\" is not a number")))
                .and_then(|f| float_to_int("int", f))
                .map(Value::Int)
        }
        other => Err(RuntimeError::type_mismatch(format!(
            "int() cannot convert {}",
            other.type_name()
        ))),
    }
}

fn to_float(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [x] = args else { return Err(arity("float")) };
    match x {
        Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| RuntimeError::invalid_value(format!("float(): \"{s}\" is not a number"))),
        other => number("float", other).map(Value::Float),
    }
}

fn abs(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [x] = args else { return Err(arity("abs")) };
    match x {
        Value::Int(n) => n
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| RuntimeError::invalid_value("abs(): integer overflow")),
        other => number("abs", other).map(|f| Value::Float(f.abs())),
    }
}

/// Either `f(a, b, ...)` or `f(list)`.
fn extremum(func: &str, args: &[Value], want: Ordering) -> Result<Value, RuntimeError> {
    let candidates: Vec<Value> = match args {
        [Value::List(list)] => list.items().clone(),
        [single] => {
            return Err(RuntimeError::type_mismatch(format!(
                "{func}() of one value expects a list, got {}",
                single.type_name()
            )))
        }
        many => many.to_vec(),
    };
    let mut iter = candidates.into_iter();
    let Some(mut best) = iter.next() else {
        return Err(RuntimeError::invalid_value(format!("{func}() of an empty list")));
    };
    for candidate in iter {
        if candidate.compare(&best)? == want {
            best = candidate;
        }
    }
    Ok(best)
}

fn min(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    extremum("min", args, Ordering::Less)
}

fn max(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    extremum("max", args, Ordering::Greater)
}

fn round(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    match args {
        [Value::Int(n)] => Ok(Value::Int(*n)),
        [x] => float_to_int("round", number("round", x)?.round()).map(Value::Int),
        [x, digits] => {
            let x = number("round", x)?;
            let digits = integer("round", digits)?.clamp(-15, 15);
            let scale = 10f64.powi(i32::try_from(digits).unwrap_or(0));
            Ok(Value::Float((x * scale).round() / scale))
        }
        _ => Err(arity("round")),
    }
}

fn floor(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    match args {
        [Value::Int(n)] => Ok(Value::Int(*n)),
        [x] => float_to_int("floor", number("floor", x)?.floor()).map(Value::Int),
        _ => Err(arity("floor")),
    }
}

fn ceil(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    match args {
        [Value::Int(n)] => Ok(Value::Int(*n)),
        [x] => float_to_int("ceil", number("ceil", x)?.ceil()).map(Value::Int),
        _ => Err(arity("ceil")),
    }
}

fn sqrt(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [x] = args else { return Err(arity("sqrt")) };
    let x = number("sqrt", x)?;
    if x < 0.0 {
        return Err(RuntimeError::invalid_value(format!(
            "sqrt() of a negative number ({})",
            super::value::format_float(x)
        )));
    }
    Ok(Value::Float(x.sqrt()))
}

fn sin(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [x] = args else { return Err(arity("sin")) };
    Ok(Value::Float(number("sin", x)?.sin()))
}

fn cos(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [x] = args else { return Err(arity("cos")) };
    Ok(Value::Float(number("cos", x)?.cos()))
}

fn keys(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [m] = args else { return Err(arity("keys")) };
    let map = map_arg("keys", m)?;
    let keys = map.entries().keys().map(|k| Value::string(k.as_str())).collect();
    Ok(Value::list(keys))
}

fn values(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [m] = args else { return Err(arity("values")) };
    let map = map_arg("values", m)?;
    let values = map.entries().values().cloned().collect();
    Ok(Value::list(values))
}

fn push(host: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [l, v] = args else { return Err(arity("push")) };
    let list = list_arg("push", l)?;
    let max = host.limits().max_collection_len;
    let mut items = list.items_mut()?;
    if items.len() >= max {
        return Err(host.limits().collection_error());
    }
    items.push(v.clone());
    Ok(Value::Null)
}

fn pop(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let (l, index) = match args {
        [l] => (l, None),
        [l, i] => (l, Some(integer("pop", i)?)),
        _ => return Err(arity("pop")),
    };
    let list = list_arg("pop", l)?;
    let mut items = list.items_mut()?;
    if items.is_empty() {
        return Err(RuntimeError::invalid_value("pop() from an empty list"));
    }
    let len = items.len();
    let raw = index.unwrap_or(-1);
    let resolved = if raw < 0 { i64::try_from(len).unwrap_or(i64::MAX) + raw } else { raw };
    match usize::try_from(resolved).ok().filter(|i| *i < len) {
        Some(i) => Ok(items.remove(i)),
        None => Err(RuntimeError::invalid_value(format!(
            "pop() index {raw} is out of range for length {len}"
        ))),
    }
}

pub fn contains_value(collection: &Value, needle: &Value) -> Result<bool, RuntimeError> {
    match (collection, needle) {
        (Value::List(list), _) => Ok(list.items().iter().any(|v| v.equals(needle))),
        (Value::Map(map), Value::Str(key)) => Ok(map.entries().contains_key(key.as_ref())),
        (Value::Map(_), _) => Ok(false),
        (Value::Str(s), Value::Str(sub)) => Ok(s.contains(sub.as_ref())),
        (Value::Str(_), other) => Err(RuntimeError::type_mismatch(format!(
            "substring test needs a string, got {}",
            other.type_name()
        ))),
        (other, _) => Err(RuntimeError::type_mismatch(format!(
            "cannot search in {}",
            other.type_name()
        ))),
    }
}

fn contains(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [c, v] = args else { return Err(arity("contains")) };
    contains_value(c, v).map(Value::Bool)
}

fn sorted(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [l] = args else { return Err(arity("sorted")) };
    let mut items = list_arg("sorted", l)?.items().clone();
    let mut failure = None;
    items.sort_by(|a, b| {
        a.compare(b).unwrap_or_else(|e| {
            failure.get_or_insert(e);
            Ordering::Equal
        })
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(Value::list(items)),
    }
}

fn sum(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [l] = args else { return Err(arity("sum")) };
    let mut total = Value::Int(0);
    for item in list_arg("sum", l)?.items().iter() {
        total = match (&total, item) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(*b)
                .map(Value::Int)
                .ok_or_else(|| RuntimeError::invalid_value("sum(): integer overflow"))?,
            (acc, item) => Value::Float(number("sum", acc)? + number("sum", item)?),
        };
    }
    Ok(total)
}

fn format(host: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let Some((template, values)) = args.split_first() else {
        return Err(arity("format"));
    };
    let Value::Str(template) = template else {
        return Err(RuntimeError::type_mismatch(format!(
            "format() expects a template string, got {}",
            template.type_name()
        )));
    };
    let mut out = String::new();
    let mut next = values.iter();
    let mut used = 0usize;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('{', Some('{')) | ('}', Some('}')) => {
                chars.next();
                out.push(c);
            }
            ('{', Some('}')) => {
                chars.next();
                used += 1;
                match next.next() {
                    Some(v) => out.push_str(&v.display_within(host.limits().max_string_len)?),
                    None => {
                        return Err(RuntimeError::invalid_value(format!(
                            "format(): the template has more {{}} placeholders than the {} value(s) given",
                            values.len()
                        )))
                    }
                }
            }
            _ => out.push(c),
        }
        host.limits().check_string(out.len())?;
    }
    if used < values.len() {
        return Err(RuntimeError::invalid_value(format!(
            "format(): {} value(s) given for {used} placeholder(s)",
            values.len()
        )));
    }
    Ok(Value::string(out))
}

// ── Utilities ───────────────────────────────────────────────────

fn random_color(host: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    if !args.is_empty() {
        return Err(arity("random_color"));
    }
    let hue = host.random() * 360.0;
    Ok(color_value(Color::from_hsv(hue, 1.0, 1.0)))
}

fn random_float(host: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let (lo, hi) = match args {
        [] => (0.0, 1.0),
        [hi] => (0.0, number("random_float", hi)?),
        [lo, hi] => (number("random_float", lo)?, number("random_float", hi)?),
        _ => return Err(arity("random_float")),
    };
    if !(lo.is_finite() && hi.is_finite()) || lo > hi {
        return Err(RuntimeError::invalid_value(format!(
            "random_float(): min ({lo}) must not exceed max ({hi})"
        )));
    }
    Ok(Value::Float(lo + (hi - lo) * host.random()))
}

fn random_int(host: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [lo, hi] = args else { return Err(arity("random_int")) };
    let (lo, hi) = (integer("random_int", lo)?, integer("random_int", hi)?);
    if lo > hi {
        return Err(RuntimeError::invalid_value(format!(
            "random_int(): min ({lo}) must not exceed max ({hi})"
        )));
    }
    let span = i128::from(hi) - i128::from(lo) + 1;
    let offset = ((host.random() * span as f64) as i128).clamp(0, span - 1);
    Ok(Value::Int(i64::try_from(i128::from(lo) + offset).unwrap_or(hi)))
}

fn hsv_to_rgb(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [h, s, v] = args else { return Err(arity("hsv_to_rgb")) };
    let (h, s, v) = (number("hsv_to_rgb", h)?, number("hsv_to_rgb", s)?, number("hsv_to_rgb", v)?);
    if !(h.is_finite() && s.is_finite() && v.is_finite()) {
        return Err(RuntimeError::invalid_value("hsv_to_rgb(): components must be finite"));
    }
    Ok(color_value(Color::from_hsv(h, s, v)))
}

fn rgb_to_hsv(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [c] = args else { return Err(arity("rgb_to_hsv")) };
    let (h, s, v) = color_arg("rgb_to_hsv", c)?.to_hsv();
    Ok(Value::list(vec![Value::Float(h), Value::Float(s), Value::Float(v)]))
}

fn color(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [name] = args else { return Err(arity("color")) };
    let Value::Str(_) = name else {
        return Err(RuntimeError::type_mismatch(format!(
            "color() expects a name, got {}",
            name.type_name()
        )));
    };
    color_arg("color", name).map(color_value)
}

fn lerp(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [a, b, t] = args else { return Err(arity("lerp")) };
    let (a, b, t) = (number("lerp", a)?, number("lerp", b)?, number("lerp", t)?);
    Ok(Value::Float(a + (b - a) * t))
}

fn lerp_color(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [a, b, t] = args else { return Err(arity("lerp_color")) };
    let t = number("lerp_color", t)?;
    if t.is_nan() {
        return Err(RuntimeError::invalid_value("lerp_color(): t is nan"));
    }
    let (a, b) = (color_arg("lerp_color", a)?, color_arg("lerp_color", b)?);
    Ok(color_value(a.lerp(b, t)))
}

fn clamp(_: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [x, lo, hi] = args else { return Err(arity("clamp")) };
    if let (Value::Int(x), Value::Int(lo), Value::Int(hi)) = (x, lo, hi) {
        if lo > hi {
            return Err(RuntimeError::invalid_value(format!("clamp(): lo ({lo}) exceeds hi ({hi})")));
        }
        return Ok(Value::Int((*x).clamp(*lo, *hi)));
    }
    let (x, lo, hi) = (number("clamp", x)?, number("clamp", lo)?, number("clamp", hi)?);
    if lo.is_nan() || hi.is_nan() || lo > hi {
        return Err(RuntimeError::invalid_value(format!("clamp(): lo ({lo}) exceeds hi ({hi})")));
    }
    Ok(Value::Float(x.clamp(lo, hi)))
}

fn log(host: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let max_len = host.limits().max_string_len;
    let line = args
        .iter()
        .map(|v| v.display_within(max_len))
        .collect::<Result<Vec<_>, _>>()?
        .join(" ");
    host.limits().check_string(line.len())?;
    host.log(line);
    Ok(Value::Null)
}

// ── Time helpers ────────────────────────────────────────────────

fn nearest_beat(host: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [t] = args else { return Err(arity("nearest_beat")) };
    let t = number("nearest_beat", t)?;
    if !t.is_finite() {
        return Err(RuntimeError::invalid_value("nearest_beat(): t must be finite"));
    }
    let nearest = host
        .beat_times()
        .iter()
        .copied()
        .min_by(|a, b| (a - t).abs().total_cmp(&(b - t).abs()).then(a.total_cmp(b)));
    Ok(nearest.map_or(Value::Null, Value::Float))
}

fn beats_between(host: &mut dyn Host, args: &[Value]) -> Result<Value, RuntimeError> {
    let [start, end] = args else { return Err(arity("beats_between")) };
    let (start, end) = (number("beats_between", start)?, number("beats_between", end)?);
    let beats = host
        .beat_times()
        .iter()
        .copied()
        .filter(|b| *b >= start && *b < end)
        .map(Value::Float)
        .collect();
    Ok(Value::list(beats))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::script::guards::GuardTable;

    struct TestHost {
        beats: Vec<f64>,
        logs: Vec<String>,
        limits: Limits,
        guards: GuardTable,
        next_random: f64,
    }

    impl TestHost {
        fn new() -> Self {
            Self {
                beats: vec![0.5, 1.0, 1.5, 2.0],
                logs: Vec::new(),
                limits: Limits::default(),
                guards: GuardTable::standard(),
                next_random: 0.5,
            }
        }
    }

    impl Host for TestHost {
        fn constant(&self, _: &str) -> Option<Value> {
            None
        }
        fn call_capability(
            &mut self,
            name: &str,
            _: Vec<Value>,
            _: Vec<(String, Value)>,
        ) -> Result<Value, RuntimeError> {
            Err(RuntimeError::undefined(name))
        }
        fn random(&mut self) -> f64 {
            self.next_random
        }
        fn beat_times(&self) -> &[f64] {
            &self.beats
        }
        fn log(&mut self, line: String) {
            self.logs.push(line);
        }
        fn limits(&self) -> &Limits {
            &self.limits
        }
        fn guards(&self) -> &GuardTable {
            &self.guards
        }
        fn cancelled(&self) -> bool {
            false
        }
    }

    fn call(name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        let mut host = TestHost::new();
        (lookup(name).unwrap().func)(&mut host, args)
    }

    fn ints(v: &Value) -> Vec<i64> {
        match v {
            Value::List(l) => l
                .items()
                .iter()
                .map(|x| match x {
                    Value::Int(n) => *n,
                    _ => panic!("not an int: {x}"),
                })
                .collect(),
            other => panic!("not a list: {other}"),
        }
    }

    #[test]
    fn builtin_names_are_unique() {
        let mut names: Vec<_> = BUILTINS.iter().map(|b| b.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), BUILTINS.len());
        assert!(METHODS.iter().all(|m| lookup(m).is_some()));
    }

    #[test]
    fn range_forms() {
        assert_eq!(ints(&call("range", &[Value::Int(3)]).unwrap()), vec![0, 1, 2]);
        assert_eq!(ints(&call("range", &[Value::Int(5), Value::Int(0), Value::Int(-2)]).unwrap()), vec![5, 3, 1]);
        assert!(ints(&call("range", &[Value::Int(3), Value::Int(1)]).unwrap()).is_empty());
        let err = call("range", &[Value::Int(0), Value::Int(3), Value::Int(0)]).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn huge_range_is_refused() {
        let err = call("range", &[Value::Int(i64::MAX)]).unwrap_err();
        assert!(err.message.contains("maximum length"));
    }

    #[test]
    fn rounding_returns_ints() {
        assert!(matches!(call("round", &[Value::Float(2.5)]).unwrap(), Value::Int(3)));
        assert!(matches!(call("floor", &[Value::Float(-0.5)]).unwrap(), Value::Int(-1)));
        assert!(matches!(call("round", &[Value::Float(1.234), Value::Int(2)]).unwrap(), Value::Float(f) if (f - 1.23).abs() < 1e-9));
        assert!(call("int", &[Value::Float(f64::NAN)]).is_err());
    }

    #[test]
    fn min_max_take_a_list_or_arguments() {
        let list = Value::list(vec![Value::Int(3), Value::Float(1.5), Value::Int(2)]);
        assert!(call("min", &[list]).unwrap().equals(&Value::Float(1.5)));
        assert!(call("max", &[Value::Int(1), Value::Int(7)]).unwrap().equals(&Value::Int(7)));
        assert!(call("min", &[Value::list(Vec::new())]).is_err());
        assert!(call("max", &[Value::Int(1), Value::string("a")]).is_err());
    }

    #[test]
    fn format_fills_placeholders_in_order() {
        let out = call("format", &[Value::string("{} at {}s {{ok}}"), Value::string("red"), Value::Float(1.5)]).unwrap();
        assert!(out.equals(&Value::string("red at 1.5s {ok}")));
        assert!(call("format", &[Value::string("{}")]).is_err());
        assert!(call("format", &[Value::string("x"), Value::Int(1)]).is_err());
    }

    #[test]
    fn pop_and_push_respect_read_only_lists() {
        let frozen = Value::frozen_list(vec![Value::Int(1)]);
        assert!(call("push", &[frozen.clone(), Value::Int(2)]).is_err());
        assert!(call("pop", &[frozen]).is_err());
        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        assert!(call("pop", &[list.clone(), Value::Int(0)]).unwrap().equals(&Value::Int(1)));
        assert_eq!(ints(&list), vec![2]);
    }

    #[test]
    fn colors_by_name_and_hsv() {
        assert_eq!(ints(&call("color", &[Value::string("red")]).unwrap()), vec![255, 0, 0]);
        assert_eq!(ints(&call("hsv_to_rgb", &[Value::Int(120), Value::Int(1), Value::Int(1)]).unwrap()), vec![0, 255, 0]);
        let err = call("color", &[Value::string("blurple")]).unwrap_err();
        assert_eq!(err.message, "color(): unknown color name \"blurple\"");
        let mid = call(
            "lerp_color",
            &[Value::string("black"), Value::string("white"), Value::Float(0.5)],
        )
        .unwrap();
        assert_eq!(ints(&mid), vec![128, 128, 128]);
    }

    #[test]
    fn random_int_is_inclusive_and_checked() {
        let mut host = TestHost::new();
        host.next_random = 0.999_999;
        let v = random_int(&mut host, &[Value::Int(1), Value::Int(3)]).unwrap();
        assert!(v.equals(&Value::Int(3)));
        host.next_random = 0.0;
        let v = random_int(&mut host, &[Value::Int(1), Value::Int(3)]).unwrap();
        assert!(v.equals(&Value::Int(1)));
        assert!(random_int(&mut host, &[Value::Int(3), Value::Int(1)]).is_err());
    }

    #[test]
    fn nearest_beat_prefers_the_earlier_on_ties() {
        assert!(call("nearest_beat", &[Value::Float(1.25)]).unwrap().equals(&Value::Float(1.0)));
        assert!(call("nearest_beat", &[Value::Float(9.0)]).unwrap().equals(&Value::Float(2.0)));
        let mut host = TestHost::new();
        host.beats.clear();
        assert!(matches!(nearest_beat(&mut host, &[Value::Int(1)]).unwrap(), Value::Null));
    }

    #[test]
    fn beats_between_is_half_open() {
        let beats = call("beats_between", &[Value::Float(1.0), Value::Float(2.0)]).unwrap();
        assert!(beats.equals(&Value::list(vec![Value::Float(1.0), Value::Float(1.5)])));
    }

    #[test]
    fn log_joins_values_and_returns_null() {
        let mut host = TestHost::new();
        let out = log(&mut host, &[Value::string("beat"), Value::Int(3)]).unwrap();
        assert!(matches!(out, Value::Null));
        assert_eq!(host.logs, vec!["beat 3".to_string()]);
    }
}

//! Runtime values. Lists and maps are shared, mutable and single-threaded;
//! a run's values never leave its thread except as JSON.

use std::cell::{Ref, RefCell, RefMut};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Number;

use super::error::RuntimeError;

/// Containers nested deeper than this (or containing themselves) cannot be
/// compared, printed in full or converted to JSON.
const MAX_DEPTH: usize = 64;

/// `Display` output is cut off with `...` past this many bytes.
const MAX_REPR_LEN: usize = 10_000;

/// Values one JSON conversion may visit. Shared sublists count every time
/// they appear, so `[xs, xs]` doubled in a loop hits this quickly.
const MAX_JSON_NODES: usize = 1_000_000;

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<ListObj>),
    Map(Rc<MapObj>),
}

#[derive(Debug, Default)]
pub struct ListObj {
    items: RefCell<Vec<Value>>,
    frozen: bool,
}

#[derive(Debug, Default)]
pub struct MapObj {
    entries: RefCell<IndexMap<String, Value>>,
    frozen: bool,
}

impl ListObj {
    pub fn items(&self) -> Ref<'_, Vec<Value>> {
        self.items.borrow()
    }

    pub fn items_mut(&self) -> Result<RefMut<'_, Vec<Value>>, RuntimeError> {
        if self.frozen {
            return Err(RuntimeError::invalid_value("cannot modify a read-only list"));
        }
        self.items
            .try_borrow_mut()
            .map_err(|_| RuntimeError::fault("list modified while it is being read"))
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

impl MapObj {
    pub fn entries(&self) -> Ref<'_, IndexMap<String, Value>> {
        self.entries.borrow()
    }

    pub fn entries_mut(&self) -> Result<RefMut<'_, IndexMap<String, Value>>, RuntimeError> {
        if self.frozen {
            return Err(RuntimeError::invalid_value("cannot modify a read-only map"));
        }
        self.entries
            .try_borrow_mut()
            .map_err(|_| RuntimeError::fault("map modified while it is being read"))
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Nested containers are freed with an explicit stack instead of recursion,
// so `xs = [xs]` in a long loop cannot overflow the thread's stack on drop.
impl Drop for ListObj {
    fn drop(&mut self) {
        drop_iteratively(std::mem::take(self.items.get_mut()));
    }
}

impl Drop for MapObj {
    fn drop(&mut self) {
        drop_iteratively(std::mem::take(self.entries.get_mut()).into_values().collect());
    }
}

fn drop_iteratively(mut pending: Vec<Value>) {
    while let Some(value) = pending.pop() {
        match value {
            Value::List(list) => {
                if let Ok(mut list) = Rc::try_unwrap(list) {
                    pending.append(list.items.get_mut());
                }
            }
            Value::Map(map) => {
                if let Ok(mut map) = Rc::try_unwrap(map) {
                    pending.extend(std::mem::take(map.entries.get_mut()).into_values());
                }
            }
            _ => {}
        }
    }
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(ListObj {
            items: RefCell::new(items),
            frozen: false,
        }))
    }

    pub fn map(entries: IndexMap<String, Value>) -> Self {
        Value::Map(Rc::new(MapObj {
            entries: RefCell::new(entries),
            frozen: false,
        }))
    }

    pub fn frozen_list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(ListObj {
            items: RefCell::new(items),
            frozen: true,
        }))
    }

    pub fn frozen_map(entries: IndexMap<String, Value>) -> Self {
        Value::Map(Rc::new(MapObj {
            entries: RefCell::new(entries),
            frozen: true,
        }))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    /// Numeric value of an int or float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Structural equality; `1 == 1.0`.
    pub fn equals(&self, other: &Value) -> bool {
        self.equals_at(other, 0, &mut HashSet::new())
    }

    /// `seen` holds container pairs already being compared. Meeting a pair
    /// again assumes it equal: any real difference is still found on the
    /// first visit, and shared or self-containing values compare in time
    /// linear in their distinct containers.
    fn equals_at(&self, other: &Value, depth: usize, seen: &mut HashSet<(*const (), *const ())>) -> bool {
        if depth > MAX_DEPTH {
            return false;
        }
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) || !seen.insert((Rc::as_ptr(a).cast(), Rc::as_ptr(b).cast())) {
                    return true;
                }
                let (a, b) = (a.items(), b.items());
                a.len() == b.len()
                    && a
                        .iter()
                        .zip(b.iter())
                        .all(|(x, y)| x.equals_at(y, depth + 1, seen))
            }
            (Value::Map(a), Value::Map(b)) => {
                if Rc::ptr_eq(a, b) || !seen.insert((Rc::as_ptr(a).cast(), Rc::as_ptr(b).cast())) {
                    return true;
                }
                let (a, b) = (a.entries(), b.entries());
                a.len() == b.len()
                    && a
                        .iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.equals_at(w, depth + 1, seen)))
            }
            _ => false,
        }
    }

    /// Ordering for `<`, `min`, `sorted`: numbers with numbers, strings with
    /// strings.
    pub fn compare(&self, other: &Value) -> Result<Ordering, RuntimeError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(|| {
                    RuntimeError::invalid_value("cannot order nan")
                }),
                _ => Err(RuntimeError::type_mismatch(format!(
                    "cannot compare {} with {}",
                    self.type_name(),
                    other.type_name()
                ))),
            },
        }
    }

    pub fn from_json(json: &serde_json::Value, frozen: bool) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::string(s.as_str()),
            serde_json::Value::Array(items) => {
                let items = items.iter().map(|v| Value::from_json(v, frozen)).collect();
                if frozen {
                    Value::frozen_list(items)
                } else {
                    Value::list(items)
                }
            }
            serde_json::Value::Object(obj) => {
                let entries = obj
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v, frozen)))
                    .collect();
                if frozen {
                    Value::frozen_map(entries)
                } else {
                    Value::map(entries)
                }
            }
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, RuntimeError> {
        let mut budget = MAX_JSON_NODES;
        self.to_json_at(0, &mut budget)
    }

    fn to_json_at(&self, depth: usize, budget: &mut usize) -> Result<serde_json::Value, RuntimeError> {
        if depth > MAX_DEPTH {
            return Err(RuntimeError::invalid_value(
                "value is nested too deeply (or contains itself) to convert",
            ));
        }
        *budget = budget.checked_sub(1).ok_or_else(|| {
            RuntimeError::invalid_value(format!(
                "value has more than {MAX_JSON_NODES} elements counting repeats and is too large to convert"
            ))
        })?;
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| RuntimeError::invalid_value(format!("{} is not a finite number", format_float(*f))))?,
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::List(l) => serde_json::Value::Array(
                l.items()
                    .iter()
                    .map(|v| v.to_json_at(depth + 1, budget))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(m) => serde_json::Value::Object(
                m.entries()
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json_at(depth + 1, budget)?)))
                    .collect::<Result<_, RuntimeError>>()?,
            ),
        })
    }

    /// Text form used by `str()`, `log()` and `format()`: strings bare,
    /// everything else as it would be written in a script. Fails once the
    /// text passes `max_len` bytes.
    pub fn display_within(&self, max_len: usize) -> Result<String, RuntimeError> {
        match self {
            Value::Str(s) if s.len() > max_len => Err(too_long(max_len)),
            Value::Str(s) => Ok(s.to_string()),
            other => {
                let mut repr = Repr::new(max_len);
                match repr.value(other) {
                    Ok(()) => Ok(repr.out),
                    Err(Overflow) => Err(too_long(max_len)),
                }
            }
        }
    }
}

fn too_long(max_len: usize) -> RuntimeError {
    RuntimeError::invalid_value(format!("string would exceed the maximum length of {max_len}"))
}

/// The text passed its length limit.
struct Overflow;

/// Script-literal writer. A container already on the current path prints as
/// `[...]` or `{...}`; output stops once it passes `max_len` bytes.
struct Repr {
    out: String,
    max_len: usize,
    path: Vec<*const ()>,
}

impl Repr {
    fn new(max_len: usize) -> Self {
        Self {
            out: String::new(),
            max_len,
            path: Vec::new(),
        }
    }

    fn push(&mut self, text: &str) -> Result<(), Overflow> {
        self.out.push_str(text);
        if self.out.len() > self.max_len {
            Err(Overflow)
        } else {
            Ok(())
        }
    }

    fn value(&mut self, value: &Value) -> Result<(), Overflow> {
        match value {
            Value::Null => self.push("null"),
            Value::Bool(b) => self.push(if *b { "true" } else { "false" }),
            Value::Int(n) => self.push(&n.to_string()),
            Value::Float(f) => self.push(&format_float(*f)),
            Value::Str(s) => self.push(&format!("{:?}", s.as_ref())),
            Value::List(l) => {
                let id = Rc::as_ptr(l).cast::<()>();
                if self.path.contains(&id) {
                    return self.push("[...]");
                }
                if self.path.len() >= MAX_DEPTH {
                    return self.push("...");
                }
                self.path.push(id);
                self.push("[")?;
                for (i, item) in l.items().iter().enumerate() {
                    if i > 0 {
                        self.push(", ")?;
                    }
                    self.value(item)?;
                }
                self.path.pop();
                self.push("]")
            }
            Value::Map(m) => {
                let id = Rc::as_ptr(m).cast::<()>();
                if self.path.contains(&id) {
                    return self.push("{...}");
                }
                if self.path.len() >= MAX_DEPTH {
                    return self.push("...");
                }
                self.path.push(id);
                self.push("{")?;
                for (i, (k, v)) in m.entries().iter().enumerate() {
                    if i > 0 {
                        self.push(", ")?;
                    }
                    self.push(&format!("{k:?}: "))?;
                    self.value(v)?;
                }
                self.path.pop();
                self.push("}")
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut repr = Repr::new(MAX_REPR_LEN);
        if repr.value(self).is_ok() {
            return f.write_str(&repr.out);
        }
        let mut end = MAX_REPR_LEN;
        while !repr.out.is_char_boundary(end) {
            end -= 1;
        }
        repr.out.truncate(end);
        write!(f, "{}...", repr.out)
    }
}

/// `2.0`, `0.25`, `inf`, `nan`.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_matches_script_literals() {
        let v = Value::list(vec![Value::Int(1), Value::Float(2.0), Value::string("a"), Value::Null]);
        assert_eq!(v.to_string(), "[1, 2.0, \"a\", null]");
        assert_eq!(Value::string("a").display_within(10).unwrap(), "a");
        assert_eq!(format_float(0.25), "0.25");
    }

    #[test]
    fn ints_and_floats_compare_numerically() {
        assert!(Value::Int(1).equals(&Value::Float(1.0)));
        assert!(!Value::Int(1).equals(&Value::string("1")));
        let a = Value::list(vec![Value::Int(1)]);
        let b = Value::list(vec![Value::Float(1.0)]);
        assert!(a.equals(&b));
    }

    #[test]
    fn json_keeps_key_order_and_integers() {
        let json = json!({ "b": 1, "a": [1.5, "x"] });
        let v = Value::from_json(&json, false);
        assert!(matches!(&v, Value::Map(m) if m.entries().keys().next().map(String::as_str) == Some("b")));
        assert_eq!(v.to_json().unwrap(), json);
    }

    #[test]
    fn non_finite_floats_do_not_convert() {
        let err = Value::Float(f64::INFINITY).to_json().unwrap_err();
        assert_eq!(err.message, "inf is not a finite number");
    }

    #[test]
    fn frozen_containers_refuse_writes() {
        let v = Value::from_json(&json!([1, 2]), true);
        let Value::List(l) = v else { unreachable!() };
        assert!(l.items_mut().is_err());
        assert!(l.is_frozen());
    }

    #[test]
    fn self_containing_list_does_not_overflow() {
        let v = Value::list(Vec::new());
        if let Value::List(l) = &v {
            l.items_mut().unwrap().push(v.clone());
        }
        assert!(v.to_json().is_err());
        assert_eq!(v.to_string(), "[[...]]");
    }

    fn twice_self_containing() -> Value {
        let v = Value::list(Vec::new());
        if let Value::List(l) = &v {
            l.items_mut().unwrap().push(v.clone());
            l.items_mut().unwrap().push(v.clone());
        }
        v
    }

    #[test]
    fn repeated_self_reference_prints_once_per_path() {
        let v = twice_self_containing();
        assert_eq!(v.display_within(100).unwrap(), "[[...], [...]]");
        assert!(v.to_json().is_err());
        let w = twice_self_containing();
        assert!(v.equals(&w));
    }

    #[test]
    fn shared_sublists_stop_at_the_length_limit() {
        // 2^40 leaves if expanded.
        let mut v = Value::list(vec![Value::Int(1)]);
        for _ in 0..40 {
            v = Value::list(vec![v.clone(), v]);
        }
        let err = v.display_within(1_000).unwrap_err();
        assert_eq!(err.message, "string would exceed the maximum length of 1000");
        assert!(v.to_string().ends_with("..."));
        assert!(v.to_json().unwrap_err().message.contains("too large to convert"));

        let mut w = Value::list(vec![Value::Int(1)]);
        for _ in 0..40 {
            w = Value::list(vec![w.clone(), w]);
        }
        assert!(v.equals(&w));
    }

    #[test]
    fn very_deep_lists_drop_without_recursion() {
        let mut v = Value::list(Vec::new());
        for _ in 0..1_000_000 {
            v = Value::list(vec![v]);
        }
        drop(v);
    }
}

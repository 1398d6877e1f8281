//! Guard hooks. Every subscript read/write, attribute read/write and loop
//! iteration in a script goes through one of these; the compiled program
//! lists which ones it needs and the sandbox refuses to run it without them.

use std::fmt;

use indexmap::IndexMap;

use super::error::RuntimeError;
use super::value::Value;
use super::Limits;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GuardKind {
    GetItem,
    SetItem,
    GetAttr,
    SetAttr,
    Iter,
}

impl GuardKind {
    pub const ALL: [GuardKind; 5] = [
        GuardKind::GetItem,
        GuardKind::SetItem,
        GuardKind::GetAttr,
        GuardKind::SetAttr,
        GuardKind::Iter,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GuardKind::GetItem => "GetItem",
            GuardKind::SetItem => "SetItem",
            GuardKind::GetAttr => "GetAttr",
            GuardKind::SetAttr => "SetAttr",
            GuardKind::Iter => "Iter",
        }
    }
}

impl fmt::Display for GuardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type GetItemGuard = fn(&Value, &Value) -> Result<Value, RuntimeError>;
pub type SetItemGuard = fn(&Value, &Value, Value, &Limits) -> Result<(), RuntimeError>;
pub type GetAttrGuard = fn(&Value, &str) -> Result<Value, RuntimeError>;
pub type SetAttrGuard = fn(&Value, &str, Value, &Limits) -> Result<(), RuntimeError>;
pub type IterGuard = fn(&Value) -> Result<Vec<Value>, RuntimeError>;

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("guard {0} is not installed")]
    Missing(GuardKind),
    #[error("guard {guard} failed its self-check: {reason}")]
    Misbehaved { guard: GuardKind, reason: String },
}

/// The guard hooks a run's namespace supplies.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardTable {
    pub get_item: Option<GetItemGuard>,
    pub set_item: Option<SetItemGuard>,
    pub get_attr: Option<GetAttrGuard>,
    pub set_attr: Option<SetAttrGuard>,
    pub iter: Option<IterGuard>,
}

impl GuardTable {
    pub fn standard() -> Self {
        Self {
            get_item: Some(get_item),
            set_item: Some(set_item),
            get_attr: Some(get_attr),
            set_attr: Some(set_attr),
            iter: Some(iterate),
        }
    }

    pub fn has(&self, kind: GuardKind) -> bool {
        match kind {
            GuardKind::GetItem => self.get_item.is_some(),
            GuardKind::SetItem => self.set_item.is_some(),
            GuardKind::GetAttr => self.get_attr.is_some(),
            GuardKind::SetAttr => self.set_attr.is_some(),
            GuardKind::Iter => self.iter.is_some(),
        }
    }

    /// The first of `required` that is not installed.
    pub fn ensure<'a>(&self, required: impl IntoIterator<Item = &'a GuardKind>) -> Result<(), GuardError> {
        match required.into_iter().find(|k| !self.has(**k)) {
            Some(kind) => Err(GuardError::Missing(*kind)),
            None => Ok(()),
        }
    }

    /// Exercise every guard once against known inputs.
    pub fn self_check(&self) -> Result<(), GuardError> {
        self.ensure(GuardKind::ALL.iter())?;
        let limits = Limits::default();
        let fail = |guard: GuardKind, reason: &str| GuardError::Misbehaved {
            guard,
            reason: reason.to_string(),
        };
        let sample = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let mut entries = IndexMap::new();
        entries.insert("a".to_string(), Value::Int(1));
        let record = Value::map(entries);

        if let Some(get) = self.get_item {
            let ok = get(&sample, &Value::Int(-1)).is_ok_and(|v| v.equals(&Value::Int(2)))
                && get(&sample, &Value::Int(2)).is_err()
                && get(&Value::Int(3), &Value::Int(0)).is_err();
            if !ok {
                return Err(fail(GuardKind::GetItem, "list indexing is not bounds-checked"));
            }
        }
        if let (Some(set), Some(get)) = (self.set_item, self.get_item) {
            let frozen = Value::frozen_list(vec![Value::Int(1)]);
            let ok = set(&sample, &Value::Int(0), Value::Int(9), &limits).is_ok()
                && get(&sample, &Value::Int(0)).is_ok_and(|v| v.equals(&Value::Int(9)))
                && set(&sample, &Value::Int(5), Value::Null, &limits).is_err()
                && set(&frozen, &Value::Int(0), Value::Null, &limits).is_err();
            if !ok {
                return Err(fail(GuardKind::SetItem, "element writes are not checked"));
            }
        }
        if let Some(get) = self.get_attr {
            let ok = get(&record, "a").is_ok_and(|v| v.equals(&Value::Int(1)))
                && get(&record, "_a").is_err()
                && get(&sample, "a").is_err();
            if !ok {
                return Err(fail(GuardKind::GetAttr, "private or missing fields are readable"));
            }
        }
        if let Some(set) = self.set_attr {
            let ok = set(&record, "b", Value::Int(2), &limits).is_ok()
                && set(&record, "_b", Value::Int(2), &limits).is_err()
                && set(&sample, "b", Value::Null, &limits).is_err();
            if !ok {
                return Err(fail(GuardKind::SetAttr, "private fields are writable"));
            }
        }
        if let Some(iter) = self.iter {
            let ok = iter(&sample).is_ok_and(|items| items.len() == 2) && iter(&Value::Int(3)).is_err();
            if !ok {
                return Err(fail(GuardKind::Iter, "iteration accepts non-collections"));
            }
        }
        Ok(())
    }
}

fn list_index(raw: i64, len: usize) -> Result<usize, RuntimeError> {
    let resolved = if raw < 0 {
        i64::try_from(len).ok().map(|l| l + raw)
    } else {
        Some(raw)
    };
    resolved
        .and_then(|i| usize::try_from(i).ok())
        .filter(|i| *i < len)
        .ok_or_else(|| {
            RuntimeError::invalid_value(format!("index {raw} is out of range for length {len}"))
        })
}

fn check_private(name: &str) -> Result<(), RuntimeError> {
    if name.starts_with('_') {
        Err(RuntimeError::undefined(format!(
            "field '{name}' is private and cannot be accessed"
        )))
    } else {
        Ok(())
    }
}

fn get_item(container: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match (container, index) {
        (Value::List(list), Value::Int(i)) => {
            let items = list.items();
            let at = list_index(*i, items.len())?;
            Ok(items.get(at).cloned().unwrap_or(Value::Null))
        }
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            let at = list_index(*i, chars.len())?;
            Ok(chars.get(at).map_or(Value::Null, |c| Value::string(c.to_string())))
        }
        (Value::Map(map), Value::Str(key)) => map
            .entries()
            .get(key.as_ref())
            .cloned()
            .ok_or_else(|| RuntimeError::invalid_value(format!("key \"{key}\" not found in map"))),
        (Value::List(_) | Value::Str(_), other) => Err(RuntimeError::type_mismatch(format!(
            "{} indices must be int, got {}",
            container.type_name(),
            other.type_name()
        ))),
        (Value::Map(_), other) => Err(RuntimeError::type_mismatch(format!(
            "map keys must be strings, got {}",
            other.type_name()
        ))),
        (other, _) => Err(RuntimeError::type_mismatch(format!(
            "{} cannot be indexed",
            other.type_name()
        ))),
    }
}

fn set_item(container: &Value, index: &Value, value: Value, limits: &Limits) -> Result<(), RuntimeError> {
    match (container, index) {
        (Value::List(list), Value::Int(i)) => {
            let mut items = list.items_mut()?;
            let at = list_index(*i, items.len())?;
            if let Some(slot) = items.get_mut(at) {
                *slot = value;
            }
            Ok(())
        }
        (Value::Map(map), Value::Str(key)) => {
            let mut entries = map.entries_mut()?;
            if !entries.contains_key(key.as_ref()) && entries.len() >= limits.max_collection_len {
                return Err(limits.collection_error());
            }
            entries.insert(key.to_string(), value);
            Ok(())
        }
        (Value::Str(_), _) => Err(RuntimeError::type_mismatch(
            "strings cannot be modified; build a new one with +",
        )),
        (Value::List(_), other) => Err(RuntimeError::type_mismatch(format!(
            "list indices must be int, got {}",
            other.type_name()
        ))),
        (Value::Map(_), other) => Err(RuntimeError::type_mismatch(format!(
            "map keys must be strings, got {}",
            other.type_name()
        ))),
        (other, _) => Err(RuntimeError::type_mismatch(format!(
            "{} does not support element assignment",
            other.type_name()
        ))),
    }
}

fn get_attr(object: &Value, name: &str) -> Result<Value, RuntimeError> {
    check_private(name)?;
    match object {
        Value::Map(map) => map
            .entries()
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::invalid_value(format!("map has no field '{name}'"))),
        other => Err(RuntimeError::type_mismatch(format!(
            "{} has no field '{name}'",
            other.type_name()
        ))),
    }
}

fn set_attr(object: &Value, name: &str, value: Value, limits: &Limits) -> Result<(), RuntimeError> {
    check_private(name)?;
    match object {
        Value::Map(_) => set_item(object, &Value::string(name), value, limits),
        other => Err(RuntimeError::type_mismatch(format!(
            "cannot set field '{name}' on {}",
            other.type_name()
        ))),
    }
}

/// Loops run over a snapshot, so the body may modify the collection.
fn iterate(value: &Value) -> Result<Vec<Value>, RuntimeError> {
    match value {
        Value::List(list) => Ok(list.items().clone()),
        Value::Map(map) => Ok(map.entries().keys().map(|k| Value::string(k.as_str())).collect()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::string(c.to_string())).collect()),
        other => Err(RuntimeError::type_mismatch(format!(
            "cannot iterate over {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_passes_self_check() {
        GuardTable::standard().self_check().unwrap();
    }

    #[test]
    fn missing_guard_is_reported_by_name() {
        let mut table = GuardTable::standard();
        table.iter = None;
        let err = table.self_check().unwrap_err();
        assert_eq!(err.to_string(), "guard Iter is not installed");
        assert!(table.ensure([GuardKind::GetItem].iter()).is_ok());
    }

    #[test]
    fn misbehaving_guard_is_caught() {
        fn permissive(_: &Value, _: &Value) -> Result<Value, RuntimeError> {
            Ok(Value::Int(2))
        }
        let mut table = GuardTable::standard();
        table.get_item = Some(permissive);
        assert!(matches!(
            table.self_check(),
            Err(GuardError::Misbehaved { guard: GuardKind::GetItem, .. })
        ));
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert!(get_item(&list, &Value::Int(-1)).unwrap().equals(&Value::Int(3)));
        let err = get_item(&list, &Value::Int(3)).unwrap_err();
        assert_eq!(err.message, "index 3 is out of range for length 3");
        assert!(get_item(&list, &Value::Float(1.0)).is_err());
    }

    #[test]
    fn private_fields_are_unreachable() {
        let map = Value::map(IndexMap::new());
        let err = get_attr(&map, "__class__").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::UndefinedReference);
    }
}

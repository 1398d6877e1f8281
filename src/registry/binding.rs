//! Turns a loose argument object (from a tool call or a script call) into a
//! typed params struct, producing agent-readable faults on the way.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CapabilityFault;

/// JSON type a parameter accepts, read from its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Integer,
    Number,
    String,
    Boolean,
    Array,
    Object,
    Any,
}

impl ParamKind {
    fn from_schema(schema: &Value) -> Self {
        let type_name = match schema.get("type") {
            Some(Value::String(t)) => Some(t.as_str()),
            Some(Value::Array(types)) => types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null"),
            _ => None,
        };
        match type_name {
            Some("integer") => Self::Integer,
            Some("number") => Self::Number,
            Some("string") => Self::String,
            Some("boolean") => Self::Boolean,
            Some("array") => Self::Array,
            Some("object") => Self::Object,
            _ => Self::Any,
        }
    }

    fn article_name(self) -> &'static str {
        match self {
            Self::Integer => "an integer",
            Self::Number => "a number",
            Self::String => "a string",
            Self::Boolean => "a boolean",
            Self::Array => "a list",
            Self::Object => "an object",
            Self::Any => "a value",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Ordered parameter list of one capability.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Signature {
    pub params: Vec<ParamSpec>,
}

impl Signature {
    /// Read parameters from a generated object schema. Property order is the
    /// params struct's field order.
    pub fn from_schema(schema: &Value) -> Self {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let params = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, prop)| ParamSpec {
                        name: name.clone(),
                        kind: ParamKind::from_schema(prop),
                        required: required.contains(&name.as_str()),
                        description: prop
                            .get("description")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { params }
    }

    pub fn min_arity(&self) -> usize {
        self.params.iter().rposition(|p| p.required).map_or(0, |i| i + 1)
    }

    pub fn max_arity(&self) -> usize {
        self.params.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }

    /// `name(a, b, c?)` form used in help text and error messages.
    pub fn display(&self, name: &str) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                if p.required {
                    p.name.clone()
                } else {
                    format!("{}?", p.name)
                }
            })
            .collect();
        format!("{name}({})", params.join(", "))
    }

    /// Name positional script arguments by parameter order.
    pub fn positional(&self, args: Vec<Value>) -> Result<Map<String, Value>, CapabilityFault> {
        if args.len() > self.params.len() {
            return Err(CapabilityFault::InvalidArgument {
                name: "arguments".into(),
                reason: format!(
                    "expected at most {} value(s), got {}",
                    self.params.len(),
                    args.len()
                ),
            });
        }
        Ok(self
            .params
            .iter()
            .zip(args)
            .map(|(spec, value)| (spec.name.clone(), value))
            .collect())
    }

    /// Check names, presence and JSON types, then deserialize into `P`.
    pub fn bind<P: DeserializeOwned>(&self, args: &Map<String, Value>) -> Result<P, CapabilityFault> {
        if let Some(unknown) = args.keys().find(|k| !self.params.iter().any(|p| &p.name == *k)) {
            let expected = if self.params.is_empty() {
                "(no arguments)".to_string()
            } else {
                self.names().join(", ")
            };
            return Err(CapabilityFault::UnknownArgument {
                name: unknown.clone(),
                expected,
            });
        }

        let mut checked = Map::new();
        for spec in &self.params {
            match args.get(&spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        return Err(CapabilityFault::MissingArgument {
                            name: spec.name.clone(),
                        });
                    }
                }
                Some(value) => {
                    checked.insert(spec.name.clone(), check_kind(spec, value)?);
                }
            }
        }

        serde_json::from_value(Value::Object(checked)).map_err(|e| CapabilityFault::InvalidArgument {
            name: "arguments".into(),
            reason: e.to_string(),
        })
    }
}

fn check_kind(spec: &ParamSpec, value: &Value) -> Result<Value, CapabilityFault> {
    let ok = match (spec.kind, value) {
        (ParamKind::Integer, Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                true
            } else {
                // 2.0 from a float-only encoder is still an index
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => {
                        return Ok(Value::from(f as i64));
                    }
                    _ => false,
                }
            }
        }
        (ParamKind::Number, Value::Number(_))
        | (ParamKind::String, Value::String(_))
        | (ParamKind::Boolean, Value::Bool(_))
        | (ParamKind::Array, Value::Array(_))
        | (ParamKind::Object, Value::Object(_))
        | (ParamKind::Any, _) => true,
        _ => false,
    };
    if ok {
        Ok(value.clone())
    } else {
        Err(CapabilityFault::InvalidArgument {
            name: spec.name.clone(),
            reason: format!("must be {}, got {}", spec.kind.article_name(), describe(value)),
        })
    }
}

/// Short description of a JSON value for error messages.
pub fn describe(value: &Value) -> String {
    let text = value.to_string();
    let shown = if text.chars().count() > 40 {
        let cut: String = text.chars().take(40).collect();
        format!("{cut}...")
    } else {
        text
    };
    let kind = match value {
        Value::Null => return "null".into(),
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    };
    format!("{kind} {shown}")
}

use serde::Serialize;
use serde_json::{Map, Value};
use ts_rs::TS;

use crate::error::{CapabilityError, ErrorKind};
use crate::sandbox::result::ScriptResult;

/// Structured form of a failure, next to the flat `error` string.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ErrorDetails {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

/// What every tool call returns: `{success: true, ...fields}` or
/// `{success: false, error: "Kind: message", errorDetails, ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ToolResponse {
    pub fn ok(fields: Map<String, Value>) -> Self {
        Self {
            success: true,
            error: None,
            error_details: None,
            fields,
        }
    }

    /// Wrap a capability's descriptor. Objects are spread into the
    /// response; anything else lands under `result`.
    pub fn from_output(output: Value) -> Self {
        match output {
            Value::Object(fields) => Self::ok(fields),
            other => {
                let mut fields = Map::new();
                fields.insert("result".to_string(), other);
                Self::ok(fields)
            }
        }
    }

    pub fn fail(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            error: Some(format!("{kind}: {message}")),
            error_details: Some(ErrorDetails {
                kind,
                message,
                capability: None,
                line: None,
                column: None,
            }),
            fields: Map::new(),
        }
    }

    pub fn capability_error(err: &CapabilityError) -> Self {
        let mut response = Self::fail(ErrorKind::CapabilityError, err.to_string());
        if let Some(details) = response.error_details.as_mut() {
            details.capability = Some(err.capability.clone());
        }
        response
    }

    /// A script run. Diagnostics (logs, mutation count, bindings) are kept on
    /// failures too, since mutations made before a fault persist.
    pub fn from_script(result: ScriptResult) -> Self {
        let kind = result.error_kind;
        let message = result.error_message.clone();
        let capability = result.capability.clone();
        let location = result.location;

        let mut fields = match serde_json::to_value(result) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) | Err(_) => Map::new(),
        };
        for key in ["success", "errorKind", "errorMessage", "capability", "location"] {
            fields.remove(key);
        }

        let mut response = match kind {
            None => Self::ok(Map::new()),
            Some(kind) => {
                let mut response = Self::fail(kind, message.unwrap_or_default());
                if let Some(details) = response.error_details.as_mut() {
                    details.capability = capability;
                    details.line = location.map(|l| l.line);
                    details.column = location.map(|l| l.column);
                }
                response
            }
        };
        response.fields = fields;
        response
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_details.as_ref().map(|d| d.kind)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({
                "success": false,
                "error": format!("{}: could not serialize the response: {e}", ErrorKind::RuntimeFault),
            })
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::error::CapabilityFault;
    use crate::sandbox::result::SourceLocation;
    use serde_json::json;

    #[test]
    fn success_spreads_the_descriptor() {
        let response = ToolResponse::from_output(json!({"timelineIndex": 0, "removedCount": 4}));
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"success":true,"timelineIndex":0,"removedCount":4}"#
        );
        let response = ToolResponse::from_output(json!([1, 2]));
        assert_eq!(response.to_json()["result"], json!([1, 2]));
    }

    #[test]
    fn capability_failure_is_flat_and_detailed() {
        let err = CapabilityError::new(
            "clear_timeline",
            CapabilityFault::MissingArgument {
                name: "timelineIndex".into(),
            },
        );
        let json = ToolResponse::capability_error(&err).to_json();
        assert_eq!(
            json,
            json!({
                "success": false,
                "error": "CapabilityError: timelineIndex is required",
                "errorDetails": {
                    "kind": "CapabilityError",
                    "message": "timelineIndex is required",
                    "capability": "clear_timeline"
                }
            })
        );
    }

    #[test]
    fn failed_script_keeps_diagnostics() {
        let result = ScriptResult::failed(ErrorKind::CapabilityError, "line 3:1: create_segment: timelineIndex 9 is out of range [0, 4)")
            .at(Some(SourceLocation { line: 3, column: 1 }))
            .with_capability(Some("create_segment".into()))
            .with_activity(vec!["hi".into()], 5);
        let json = ToolResponse::from_script(result).to_json();
        assert_eq!(json["success"], false);
        assert_eq!(
            json["error"],
            "CapabilityError: line 3:1: create_segment: timelineIndex 9 is out of range [0, 4)"
        );
        assert_eq!(json["errorDetails"]["line"], 3);
        assert_eq!(json["errorDetails"]["capability"], "create_segment");
        assert_eq!(json["mutationCount"], 5);
        assert_eq!(json["logs"], json!(["hi"]));
        assert!(json.get("errorKind").is_none());
    }

    #[test]
    fn successful_script_has_no_error_keys() {
        let mut bindings = Map::new();
        bindings.insert("n".into(), json!(3));
        let json = ToolResponse::from_script(ScriptResult::succeeded(bindings)).to_json();
        assert_eq!(json["success"], true);
        assert_eq!(json["returnedBindings"]["n"], 3);
        assert!(json.get("error").is_none());
        assert!(json.get("errorDetails").is_none());
    }
}

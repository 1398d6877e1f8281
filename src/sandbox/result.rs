use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ts_rs::TS;

use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

/// Outcome of one script run, serialized straight into the tool response.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ScriptResult {
    pub success: bool,
    /// Top-level variables at the end of a successful run. Diagnostic only.
    #[ts(type = "Record<string, unknown>")]
    pub returned_bindings: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// The tool that refused a call, for `CapabilityError`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    pub logs: Vec<String>,
    /// Successful calls to mutating tools, including those before a failure.
    pub mutation_count: usize,
    pub duration_ms: u64,
}

impl ScriptResult {
    pub fn succeeded(bindings: Map<String, Value>) -> Self {
        Self {
            success: true,
            returned_bindings: bindings,
            error_kind: None,
            error_message: None,
            capability: None,
            location: None,
            logs: Vec::new(),
            mutation_count: 0,
            duration_ms: 0,
        }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            returned_bindings: Map::new(),
            error_kind: Some(kind),
            error_message: Some(message.into()),
            capability: None,
            location: None,
            logs: Vec::new(),
            mutation_count: 0,
            duration_ms: 0,
        }
    }

    pub fn at(mut self, location: Option<SourceLocation>) -> Self {
        self.location = location;
        self
    }

    pub fn with_capability(mut self, capability: Option<String>) -> Self {
        self.capability = capability;
        self
    }

    pub fn with_activity(mut self, logs: Vec<String>, mutation_count: usize) -> Self {
        self.logs = logs;
        self.mutation_count = mutation_count;
        self
    }

    /// `Kind: message` as shown in a failed tool response.
    pub fn error_text(&self) -> Option<String> {
        let kind = self.error_kind?;
        Some(format!(
            "{kind}: {}",
            self.error_message.as_deref().unwrap_or_default()
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn failure_serializes_kind_and_skips_empty_fields() {
        let result = ScriptResult::failed(ErrorKind::TimeoutError, "script exceeded the 5s time limit");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["errorKind"], "TimeoutError");
        assert!(json.get("location").is_none());
        assert_eq!(json["mutationCount"], 0);
        assert_eq!(
            result.error_text().unwrap(),
            "TimeoutError: script exceeded the 5s time limit"
        );
    }

    #[test]
    fn success_has_no_error_text() {
        let result = ScriptResult::succeeded(Map::new());
        assert!(result.error_text().is_none());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], true);
        assert!(json.get("errorKind").is_none());
    }
}

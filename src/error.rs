use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Failure taxonomy shared by the dispatcher envelope and script results.
/// The variant names are part of the wire format agents read back, so they
/// serialize exactly as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ErrorKind {
    /// Tool-call arguments could not be parsed into an object.
    MalformedArguments,
    /// The requested tool name is not registered.
    UnknownTool,
    /// The script was rejected before it ran.
    CompilationError,
    /// The run exceeded its wall-clock or operation budget.
    TimeoutError,
    /// A capability's own validation failed.
    CapabilityError,
    UndefinedReference,
    TypeMismatch,
    InvalidValue,
    /// Anything else raised during execution.
    RuntimeFault,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MalformedArguments => "MalformedArguments",
            ErrorKind::UnknownTool => "UnknownTool",
            ErrorKind::CompilationError => "CompilationError",
            ErrorKind::TimeoutError => "TimeoutError",
            ErrorKind::CapabilityError => "CapabilityError",
            ErrorKind::UndefinedReference => "UndefinedReference",
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::InvalidValue => "InvalidValue",
            ErrorKind::RuntimeFault => "RuntimeFault",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a capability refused to run. Messages are written for the agent: they
/// name the offending argument and the accepted range.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CapabilityFault {
    #[error("{name} is required")]
    MissingArgument { name: String },
    #[error("unknown argument '{name}'; expected one of: {expected}")]
    UnknownArgument { name: String, expected: String },
    #[error("{name} {reason}")]
    InvalidArgument { name: String, reason: String },
    #[error("{name} {value} is out of range [0, {bound})")]
    IndexOutOfRange {
        name: &'static str,
        value: i64,
        bound: usize,
    },
    #[error(
        "invalid time range: endTime ({end}) must be greater than startTime ({start}), both finite and >= 0"
    )]
    InvalidTimeRange { start: f64, end: f64 },
    #[error("invalid color: {reason}")]
    InvalidColor { reason: String },
    #[error("{what} is not available")]
    Unavailable { what: String },
    #[error("the run was cancelled after its deadline; no change was made")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(String),
}

/// A [`CapabilityFault`] tagged with the capability that raised it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{fault}")]
pub struct CapabilityError {
    pub capability: String,
    pub fault: CapabilityFault,
}

impl CapabilityError {
    pub fn new(capability: impl Into<String>, fault: CapabilityFault) -> Self {
        Self {
            capability: capability.into(),
            fault,
        }
    }
}

/// Text of a panic payload caught with `catch_unwind`.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_as_bare_name() {
        let json = serde_json::to_value(ErrorKind::CapabilityError).ok();
        assert_eq!(json, Some(serde_json::json!("CapabilityError")));
        assert_eq!(ErrorKind::TimeoutError.to_string(), "TimeoutError");
    }

    #[test]
    fn fault_messages_name_the_argument() {
        let missing = CapabilityFault::MissingArgument {
            name: "timelineIndex".into(),
        };
        assert_eq!(missing.to_string(), "timelineIndex is required");

        let range = CapabilityFault::IndexOutOfRange {
            name: "timelineIndex",
            value: 9,
            bound: 4,
        };
        assert_eq!(range.to_string(), "timelineIndex 9 is out of range [0, 4)");

        let err = CapabilityError::new("clear_timeline", missing);
        assert_eq!(err.to_string(), "timelineIndex is required");
        assert_eq!(err.capability, "clear_timeline");
    }
}

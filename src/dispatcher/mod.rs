//! Single entry point for agent tool calls.
//!
//! Agent output goes in, a [`ToolResponse`] comes out. `run_script` goes to
//! the sandbox; every other name is looked up in the registry. Nothing a
//! target does, panics included, escapes past [`Dispatcher::call`].

pub mod envelope;
pub mod extract;
pub mod repair;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};

use crate::error::{panic_message, CapabilityError, CapabilityFault, ErrorKind};
use crate::registry::{CallContext, Registry};
use crate::sandbox::{Sandbox, SandboxError};
use crate::settings::SandboxConfig;
use crate::state::AppState;

pub use envelope::{ErrorDetails, ToolResponse};
pub use extract::RawCall;

/// Tool name of the script entry point.
pub const RUN_SCRIPT: &str = "run_script";

/// A tool call with its arguments normalized into an object.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    state: Arc<AppState>,
    sandbox: Sandbox,
}

impl Dispatcher {
    /// Build with the sandbox limits from the state's settings.
    pub fn new(registry: Arc<Registry>, state: Arc<AppState>) -> Result<Self, SandboxError> {
        let config = state.settings_snapshot().sandbox;
        Self::with_config(registry, state, config)
    }

    pub fn with_config(
        registry: Arc<Registry>,
        state: Arc<AppState>,
        config: SandboxConfig,
    ) -> Result<Self, SandboxError> {
        let sandbox = Sandbox::new(Arc::clone(&registry), config)?;
        Ok(Self {
            registry,
            state,
            sandbox,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Every name a call may target, `run_script` last.
    pub fn tool_names(&self) -> Vec<&'static str> {
        self.registry.names().chain([RUN_SCRIPT]).collect()
    }

    pub fn is_known(&self, name: &str) -> bool {
        name == RUN_SCRIPT || self.registry.contains(name)
    }

    /// Dispatch raw agent output: structured JSON or free text.
    pub fn dispatch_text(&self, text: &str) -> ToolResponse {
        match extract::extract_call(text) {
            Ok(raw) => self.dispatch_raw(raw),
            Err(e) => {
                log::warn!("rejected agent output: {e}");
                ToolResponse::fail(ErrorKind::MalformedArguments, e.to_string())
            }
        }
    }

    /// Dispatch a named call whose arguments may still need repair.
    pub fn dispatch_raw(&self, raw: RawCall) -> ToolResponse {
        let name = raw.name.trim();
        if !self.is_known(name) {
            log::warn!("unknown tool '{name}' requested");
            return ToolResponse::fail(
                ErrorKind::UnknownTool,
                format!(
                    "unknown tool '{name}'; valid tools: {}",
                    self.tool_names().join(", ")
                ),
            );
        }
        // `code = "red"` reads both as a fragment and as a script; unwrap it
        // only when the inner text is itself a script that compiles.
        let accept = |key: &str, inner: &str| name != RUN_SCRIPT || key != "code" || self.sandbox.compiles(inner);
        match repair::normalize_arguments_with(raw.arguments, &accept) {
            Ok(arguments) => self.call(&ToolCall::new(name, arguments)),
            Err(e) => {
                log::warn!("malformed arguments for '{name}': {e}");
                ToolResponse::fail(ErrorKind::MalformedArguments, e.to_string())
            }
        }
    }

    /// Run one normalized call against its target.
    pub fn call(&self, call: &ToolCall) -> ToolResponse {
        let started = Instant::now();
        let response = panic::catch_unwind(AssertUnwindSafe(|| self.route(call))).unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            log::error!("tool '{}' panicked: {message}", call.name);
            ToolResponse::fail(
                ErrorKind::RuntimeFault,
                format!("internal error in '{}': {message}", call.name),
            )
        });
        match &response.error {
            None => log::info!("{} succeeded in {}ms", call.name, started.elapsed().as_millis()),
            Some(error) => log::info!("{} failed in {}ms: {error}", call.name, started.elapsed().as_millis()),
        }
        response
    }

    fn route(&self, call: &ToolCall) -> ToolResponse {
        if call.name == RUN_SCRIPT {
            return match script_code(&call.arguments) {
                Ok(code) => ToolResponse::from_script(self.sandbox.run(&self.state, code)),
                Err(fault) => ToolResponse::capability_error(&CapabilityError::new(RUN_SCRIPT, fault)),
            };
        }
        let Some(capability) = self.registry.get(&call.name) else {
            return ToolResponse::fail(ErrorKind::UnknownTool, format!("unknown tool '{}'", call.name));
        };
        match capability.invoke(&CallContext::new(&self.state), &call.arguments) {
            Ok(output) => ToolResponse::from_output(output),
            Err(err) => ToolResponse::capability_error(&err),
        }
    }
}

fn script_code(arguments: &Map<String, Value>) -> Result<&str, CapabilityFault> {
    if let Some(extra) = arguments.keys().find(|k| k.as_str() != "code") {
        return Err(CapabilityFault::UnknownArgument {
            name: extra.clone(),
            expected: "code".into(),
        });
    }
    match arguments.get("code") {
        Some(Value::String(code)) => Ok(code),
        Some(other) => Err(CapabilityFault::InvalidArgument {
            name: "code".into(),
            reason: format!("must be a string, got {}", repair::json_type(other)),
        }),
        None => Err(CapabilityFault::MissingArgument { name: "code".into() }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::Project;
    use crate::registry::{CapabilityCategory, CapabilityInfo, Wrapper};
    use crate::settings::AppSettings;
    use serde_json::json;

    fn dispatcher(balls: usize) -> Dispatcher {
        let state = Arc::new(AppState::new(Project::with_balls(balls), AppSettings::default()));
        Dispatcher::new(Arc::new(Registry::standard()), state).unwrap()
    }

    fn call(d: &Dispatcher, name: &str, args: Value) -> Value {
        d.call(&ToolCall::new(name, args.as_object().unwrap().clone())).to_json()
    }

    #[test]
    fn missing_timeline_index_has_the_exact_envelope() {
        let d = dispatcher(2);
        let response = d.dispatch_text(r#"{"name": "clear_timeline", "arguments": {}}"#);
        let text = serde_json::to_string(&response).unwrap();
        assert!(
            text.starts_with(r#"{"success":false,"error":"CapabilityError: timelineIndex is required","#),
            "{text}"
        );
        assert_eq!(response.error_kind(), Some(ErrorKind::CapabilityError));
    }

    #[test]
    fn create_covers_its_range_without_overlap() {
        let d = dispatcher(1);
        call(&d, "create_segment", json!({"timelineIndex": 0, "startTime": 0.0, "endTime": 4.0, "color": [0, 0, 255]}));
        let out = call(&d, "create_segment", json!({"timelineIndex": 0, "startTime": 1.0, "endTime": 2.0, "color": "red"}));
        assert_eq!(out["success"], true);
        assert_eq!(out["split"], 1);

        let list = call(&d, "list_segments", json!({"timelineIndex": 0}));
        let spans: Vec<(f64, f64)> = list["segments"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| (s["startTime"].as_f64().unwrap(), s["endTime"].as_f64().unwrap()))
            .collect();
        assert_eq!(spans, vec![(0.0, 1.0), (1.0, 2.0), (2.0, 4.0)]);
        assert_eq!(list["segments"][1]["color"], json!([255, 0, 0]));
    }

    #[test]
    fn clearing_twice_reports_true_prior_counts() {
        let d = dispatcher(2);
        for i in 0..3 {
            call(&d, "create_segment", json!({"timelineIndex": 1, "startTime": i, "endTime": i + 1, "color": [1, 2, 3]}));
        }
        let first = call(&d, "clear_timeline", json!({"timelineIndex": 1}));
        assert_eq!(first["removedCount"], 3);
        let second = call(&d, "clear_timeline", json!({"timelineIndex": 1}));
        assert_eq!(second["success"], true);
        assert_eq!(second["removedCount"], 0);
    }

    #[test]
    fn unparsable_arguments_never_reach_the_target() {
        let d = dispatcher(1);
        let text = json!({
            "name": "create_segment",
            "arguments": "{\"timelineIndex\": 0, \"startTime\": 0, \"endTime\": 1, \"color\": [1,2,3]"
        })
        .to_string();
        let response = d.dispatch_text(&text);
        assert_eq!(response.error_kind(), Some(ErrorKind::MalformedArguments));
        assert!(response.error.unwrap().contains("line 1, column"));
        assert_eq!(d.state().with_project(Project::segment_count), 0);
    }

    #[test]
    fn unknown_tool_lists_every_valid_name() {
        let d = dispatcher(1);
        let response = d.dispatch_text(r#"{"name": "send_email", "arguments": {}}"#);
        assert_eq!(response.error_kind(), Some(ErrorKind::UnknownTool));
        let error = response.error.unwrap();
        assert!(error.starts_with("UnknownTool: unknown tool 'send_email'; valid tools: create_segment"));
        assert!(error.ends_with("get_beats_in_range, run_script"));
    }

    #[test]
    fn run_script_through_free_text() {
        let d = dispatcher(2);
        let text = "Here you go:\n```json\n{\"name\": \"run_script\", \"arguments\": {\"code\": \"for i in 0..3: create_segment(0, i, i+1, [255,0,0])\"}}\n```";
        let out = d.dispatch_text(text).to_json();
        assert_eq!(out["success"], true, "{out}");
        assert_eq!(out["mutationCount"], 3);
        assert_eq!(d.state().with_project(Project::segment_count), 3);
    }

    #[test]
    fn run_script_with_self_keyed_code() {
        let d = dispatcher(1);
        let out = d
            .dispatch_raw(RawCall {
                name: RUN_SCRIPT.into(),
                arguments: json!({"code": "code=\"n = NUM_BALLS * 2\""}),
            })
            .to_json();
        assert_eq!(out["returnedBindings"]["n"], 2);
    }

    #[test]
    fn one_line_string_assignment_is_not_unwrapped() {
        let d = dispatcher(1);
        let out = d
            .dispatch_raw(RawCall {
                name: RUN_SCRIPT.into(),
                arguments: json!({"code": "code = \"red\""}),
            })
            .to_json();
        assert_eq!(out["success"], true, "{out}");
        assert_eq!(out["returnedBindings"]["code"], "red");
    }

    #[test]
    fn run_script_argument_errors() {
        let d = dispatcher(1);
        let out = call(&d, RUN_SCRIPT, json!({}));
        assert_eq!(out["error"], "CapabilityError: code is required");
        assert_eq!(out["errorDetails"]["capability"], RUN_SCRIPT);
        let out = call(&d, RUN_SCRIPT, json!({"code": 5}));
        assert_eq!(out["error"], "CapabilityError: code must be a string, got a number");
    }

    #[test]
    fn script_compile_error_keeps_the_location() {
        let d = dispatcher(1);
        let out = call(&d, RUN_SCRIPT, json!({"code": "x = 1\nsend_email(\"a\")"}));
        assert_eq!(out["error"], "CompilationError: line 2:1: undefined function 'send_email'");
        assert_eq!(out["errorDetails"]["line"], 2);
        assert_eq!(out["errorDetails"]["column"], 1);
    }

    fn explode(_: &CallContext<'_>, _: crate::registry::params::NoParams) -> Result<Value, CapabilityFault> {
        panic!("wrapper bug")
    }

    #[test]
    fn panicking_target_becomes_a_runtime_fault() {
        let mut registry = Registry::standard();
        registry.register(Wrapper::boxed(
            CapabilityInfo {
                name: "explode",
                description: "Always panics.",
                category: CapabilityCategory::Query,
                mutates: false,
            },
            explode,
        ));
        let state = Arc::new(AppState::new(Project::with_balls(1), AppSettings::default()));
        let d = Dispatcher::new(Arc::new(registry), state).unwrap();
        let response = d.call(&ToolCall::new("explode", Map::new()));
        assert_eq!(response.error_kind(), Some(ErrorKind::RuntimeFault));
        assert_eq!(
            response.error.as_deref(),
            Some("RuntimeFault: internal error in 'explode': wrapper bug")
        );
    }
}

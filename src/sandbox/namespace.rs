//! The script's view of the outside world: tools from the registry, the
//! captured context, logging and randomness.

use std::sync::atomic::{AtomicUsize, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Map;

use crate::error::CapabilityFault;
use crate::registry::{CallContext, Registry};
use crate::rng::ScriptRng;
use crate::script::error::RuntimeError;
use crate::script::guards::GuardTable;
use crate::script::value::Value;
use crate::script::{Host, Limits};

use super::context::ExecutionContext;

/// What a run has done so far. Shared with the waiting side so a timed-out
/// run still reports its logs and mutations.
#[derive(Debug, Default)]
pub struct RunJournal {
    logs: Mutex<Vec<String>>,
    dropped_logs: AtomicUsize,
    mutations: AtomicUsize,
}

impl RunJournal {
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Captured lines, with a notice when some were dropped.
    pub fn logs(&self) -> Vec<String> {
        let mut logs = self.logs.lock().clone();
        let dropped = self.dropped_logs.load(Ordering::SeqCst);
        if dropped > 0 {
            logs.push(format!("... {dropped} more log line(s) dropped"));
        }
        logs
    }

    fn push_log(&self, line: String, max_lines: usize) {
        let mut logs = self.logs.lock();
        if logs.len() < max_lines {
            logs.push(line);
        } else {
            self.dropped_logs.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub struct Namespace<'a> {
    registry: &'a Registry,
    ctx: CallContext<'a>,
    journal: &'a RunJournal,
    constants: IndexMap<String, Value>,
    beat_times: Vec<f64>,
    rng: ScriptRng,
    limits: Limits,
    guards: GuardTable,
    max_log_lines: usize,
}

impl<'a> Namespace<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: &'a Registry,
        ctx: CallContext<'a>,
        journal: &'a RunJournal,
        context: &ExecutionContext,
        rng: ScriptRng,
        limits: Limits,
        guards: GuardTable,
        max_log_lines: usize,
    ) -> Self {
        Self {
            registry,
            ctx,
            journal,
            constants: context.bindings(),
            beat_times: context.beat_times.clone(),
            rng,
            limits,
            guards,
            max_log_lines,
        }
    }

    fn argument_object(
        &self,
        name: &str,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> Result<Map<String, serde_json::Value>, RuntimeError> {
        let Some(capability) = self.registry.get(name) else {
            return Err(RuntimeError::undefined(format!("unknown tool '{name}'")));
        };
        let fail = |fault: CapabilityFault| RuntimeError::capability(name, fault.to_string());

        let positional = positional
            .iter()
            .map(Value::to_json)
            .collect::<Result<Vec<_>, _>>()?;
        let mut args = capability.signature().positional(positional).map_err(fail)?;
        for (key, value) in named {
            if args.contains_key(&key) {
                return Err(fail(CapabilityFault::InvalidArgument {
                    name: key,
                    reason: "was given both by position and by name".into(),
                }));
            }
            args.insert(key, value.to_json()?);
        }
        Ok(args)
    }
}

impl Host for Namespace<'_> {
    fn constant(&self, name: &str) -> Option<Value> {
        self.constants.get(name).cloned()
    }

    fn call_capability(
        &mut self,
        name: &str,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> Result<Value, RuntimeError> {
        let args = self.argument_object(name, positional, named)?;
        let Some(capability) = self.registry.get(name) else {
            return Err(RuntimeError::undefined(format!("unknown tool '{name}'")));
        };
        match capability.invoke(&self.ctx, &args) {
            Ok(output) => {
                if capability.info().mutates {
                    self.journal.mutations.fetch_add(1, Ordering::SeqCst);
                }
                Ok(Value::from_json(&output, false))
            }
            Err(err) if err.fault == CapabilityFault::Cancelled => {
                Err(RuntimeError::timeout(err.to_string()))
            }
            Err(err) => Err(RuntimeError::capability(err.capability, err.fault.to_string())),
        }
    }

    fn random(&mut self) -> f64 {
        self.rng.next_f64()
    }

    fn beat_times(&self) -> &[f64] {
        &self.beat_times
    }

    fn log(&mut self, line: String) {
        log::info!(target: "script", "{line}");
        self.journal.push_log(line, self.max_log_lines);
    }

    fn limits(&self) -> &Limits {
        &self.limits
    }

    fn guards(&self) -> &GuardTable {
        &self.guards
    }

    fn cancelled(&self) -> bool {
        self.ctx.is_cancelled()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::Project;
    use crate::settings::AppSettings;
    use crate::state::{AppState, CancelToken};

    fn with_namespace<R>(state: &AppState, cancel: &CancelToken, f: impl FnOnce(&mut Namespace<'_>, &RunJournal) -> R) -> R {
        let registry = Registry::standard();
        let journal = RunJournal::default();
        let context = ExecutionContext::capture(state);
        let mut ns = Namespace::new(
            &registry,
            CallContext::with_cancel(state, cancel),
            &journal,
            &context,
            ScriptRng::new(1),
            Limits::default(),
            GuardTable::standard(),
            2,
        );
        f(&mut ns, &journal)
    }

    fn red() -> Value {
        Value::list(vec![Value::Int(255), Value::Int(0), Value::Int(0)])
    }

    #[test]
    fn positional_call_mutates_and_is_counted() {
        let state = AppState::new(Project::with_balls(2), AppSettings::default());
        let cancel = CancelToken::new();
        let out = with_namespace(&state, &cancel, |ns, journal| {
            let out = ns
                .call_capability(
                    "create_segment",
                    vec![Value::Int(1), Value::Float(0.0), Value::Float(2.0), red()],
                    Vec::new(),
                )
                .unwrap();
            assert_eq!(journal.mutations(), 1);
            out.to_json().unwrap()
        });
        assert_eq!(out["timelineIndex"], 1);
        assert_eq!(state.with_project(Project::segment_count), 1);
    }

    #[test]
    fn capability_fault_names_the_tool() {
        let state = AppState::new(Project::with_balls(2), AppSettings::default());
        let cancel = CancelToken::new();
        let err = with_namespace(&state, &cancel, |ns, _| {
            ns.call_capability("clear_timeline", Vec::new(), Vec::new()).unwrap_err()
        });
        assert_eq!(err.kind, ErrorKind::CapabilityError);
        assert_eq!(err.capability.as_deref(), Some("clear_timeline"));
        assert_eq!(err.message, "timelineIndex is required");
    }

    #[test]
    fn duplicate_positional_and_named_argument_is_rejected() {
        let state = AppState::new(Project::with_balls(2), AppSettings::default());
        let cancel = CancelToken::new();
        let err = with_namespace(&state, &cancel, |ns, _| {
            ns.call_capability(
                "clear_timeline",
                vec![Value::Int(0)],
                vec![("timelineIndex".into(), Value::Int(1))],
            )
            .unwrap_err()
        });
        assert_eq!(err.message, "timelineIndex was given both by position and by name");
    }

    #[test]
    fn cancelled_run_cannot_mutate() {
        let state = AppState::new(Project::with_balls(2), AppSettings::default());
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = with_namespace(&state, &cancel, |ns, journal| {
            assert!(ns.cancelled());
            let err = ns
                .call_capability(
                    "create_segment",
                    vec![Value::Int(0), Value::Int(0), Value::Int(1), red()],
                    Vec::new(),
                )
                .unwrap_err();
            assert_eq!(journal.mutations(), 0);
            err
        });
        assert_eq!(err.kind, ErrorKind::TimeoutError);
        assert_eq!(state.with_project(Project::segment_count), 0);
    }

    #[test]
    fn logs_are_capped_with_a_notice() {
        let state = AppState::new(Project::with_balls(1), AppSettings::default());
        let cancel = CancelToken::new();
        let logs = with_namespace(&state, &cancel, |ns, journal| {
            for i in 0..5 {
                ns.log(format!("line {i}"));
            }
            journal.logs()
        });
        assert_eq!(logs, vec!["line 0", "line 1", "... 3 more log line(s) dropped"]);
    }
}

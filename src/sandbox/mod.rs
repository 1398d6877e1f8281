pub mod context;
pub mod namespace;
pub mod result;

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Map;

use crate::error::{panic_message, ErrorKind};
use crate::registry::{CallContext, Registry};
use crate::rng::ScriptRng;
use crate::script::error::{format_errors, offset_to_line_col, RuntimeError};
use crate::script::guards::{GuardError, GuardTable};
use crate::script::{compile_source, interp, Environment, Limits, Program};
use crate::settings::{SandboxConfig, SettingsError};
use crate::state::{AppState, CancelToken};

use context::{ExecutionContext, BINDING_NAMES};
use namespace::{Namespace, RunJournal};
use result::{ScriptResult, SourceLocation};

/// Stack for the threads that compile and run scripts. The parser caps
/// nesting, so this is ample.
const RUN_STACK_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("sandbox guards are misconfigured: {0}")]
    Guards(#[from] GuardError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Compiles and runs untrusted scripts against the registry's capabilities
/// with a deadline, an operation budget and classified failures.
pub struct Sandbox {
    registry: Arc<Registry>,
    guards: GuardTable,
    config: SandboxConfig,
    env: Arc<Environment>,
}

impl Sandbox {
    pub fn new(registry: Arc<Registry>, config: SandboxConfig) -> Result<Self, SandboxError> {
        Self::with_guards(registry, config, GuardTable::standard())
    }

    /// Build with an explicit guard table. Every guard is exercised once here,
    /// so a broken table is a construction error rather than a run failure.
    pub fn with_guards(
        registry: Arc<Registry>,
        config: SandboxConfig,
        guards: GuardTable,
    ) -> Result<Self, SandboxError> {
        guards.self_check()?;
        config.validate()?;
        let env = Arc::new(Environment::new(registry.names(), BINDING_NAMES));
        Ok(Self {
            registry,
            guards,
            config,
            env,
        })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Whether `code` would pass compilation. Nothing runs; the check uses a
    /// thread with the run thread's stack, like a real run.
    pub fn compiles(&self, code: &str) -> bool {
        std::thread::scope(|scope| {
            std::thread::Builder::new()
                .name("script-check".into())
                .stack_size(RUN_STACK_BYTES)
                .spawn_scoped(scope, || compile_source(code, &self.env).is_ok())
                .ok()
                .and_then(|handle| handle.join().ok())
                .unwrap_or(false)
        })
    }

    /// Compile and run `code`. Always returns a result; nothing a script
    /// does escapes as a panic or an `Err`.
    pub fn run(&self, state: &Arc<AppState>, code: &str) -> ScriptResult {
        let started = Instant::now();
        let mut result = self.execute(state, code);
        result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match result.error_text() {
            Some(error) => log::info!("script failed after {}ms: {error}", result.duration_ms),
            None => log::info!(
                "script finished in {}ms with {} mutation(s)",
                result.duration_ms,
                result.mutation_count
            ),
        }
        result
    }

    /// Compilation happens on the run thread too: its stack is sized for the
    /// deepest tree the parser accepts, and the deadline covers it.
    fn execute(&self, state: &Arc<AppState>, code: &str) -> ScriptResult {
        let context = ExecutionContext::capture(state);
        let cancel = CancelToken::new();
        let journal = Arc::new(RunJournal::default());
        let (tx, rx) = mpsc::channel();

        let spawned = {
            let registry = Arc::clone(&self.registry);
            let env = Arc::clone(&self.env);
            let source = code.to_owned();
            let state = Arc::clone(state);
            let cancel = cancel.clone();
            let journal = Arc::clone(&journal);
            let guards = self.guards;
            let limits = Limits::from_config(&self.config);
            let rng = ScriptRng::seeded(self.config.random_seed);
            let max_log_lines = self.config.max_log_lines;
            std::thread::Builder::new()
                .name("script-run".into())
                .stack_size(RUN_STACK_BYTES)
                .spawn(move || {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        let program = match compile(&env, &source) {
                            Ok(program) => program,
                            Err(rejected) => return Outcome::Rejected(rejected),
                        };
                        if let Err(e) = guards.ensure(program.required_guards.iter()) {
                            return Outcome::Rejected(ScriptResult::failed(ErrorKind::RuntimeFault, e.to_string()));
                        }
                        let mut namespace = Namespace::new(
                            &registry,
                            CallContext::with_cancel(&state, &cancel),
                            &journal,
                            &context,
                            rng,
                            limits,
                            guards,
                            max_log_lines,
                        );
                        Outcome::Finished(interp::run(&program, &mut namespace).map(|globals| {
                            globals
                                .into_iter()
                                .filter(|(name, _)| !name.starts_with('_'))
                                .map(|(name, value)| {
                                    let json = value
                                        .to_json()
                                        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
                                    (name, json)
                                })
                                .collect::<Map<String, serde_json::Value>>()
                        }))
                    }));
                    // The receiver is gone if the run already timed out.
                    let _ = tx.send(outcome);
                })
        };
        if let Err(e) = spawned {
            return ScriptResult::failed(ErrorKind::RuntimeFault, format!("could not start the script thread: {e}"));
        }

        let timeout = Duration::from_secs_f64(self.config.max_execution_seconds);
        let result = match rx.recv_timeout(timeout) {
            Ok(Ok(Outcome::Rejected(result))) => return result,
            Ok(Ok(Outcome::Finished(Ok(bindings)))) => ScriptResult::succeeded(bindings),
            Ok(Ok(Outcome::Finished(Err(err)))) => runtime_failure(&err, code),
            Ok(Err(payload)) => {
                let message = panic_message(payload.as_ref());
                log::error!("script thread panicked: {message}");
                ScriptResult::failed(ErrorKind::RuntimeFault, format!("internal error: {message}"))
            }
            Err(RecvTimeoutError::Timeout) => {
                // Raised under the project lock, so no mutation can land
                // after this point.
                state.with_project_mut(|_| cancel.cancel());
                log::warn!(
                    "script exceeded {}s; cancelled and detached its thread",
                    self.config.max_execution_seconds
                );
                ScriptResult::failed(
                    ErrorKind::TimeoutError,
                    format!(
                        "script exceeded the {}s time limit and was stopped",
                        self.config.max_execution_seconds
                    ),
                )
            }
            Err(RecvTimeoutError::Disconnected) => {
                ScriptResult::failed(ErrorKind::RuntimeFault, "script thread exited without a result")
            }
        };
        result.with_activity(journal.logs(), journal.mutations())
    }
}

/// What the run thread sends back.
enum Outcome {
    /// Refused before running: nothing was executed.
    Rejected(ScriptResult),
    Finished(Result<Map<String, serde_json::Value>, RuntimeError>),
}

fn compile(env: &Environment, code: &str) -> Result<Program, ScriptResult> {
    compile_source(code, env).map_err(|errors| {
        let location = errors.first().map(|e| {
            let (line, column) = offset_to_line_col(code, e.span.start);
            SourceLocation { line, column }
        });
        ScriptResult::failed(ErrorKind::CompilationError, format_errors(&errors, code)).at(location)
    })
}

fn runtime_failure(err: &RuntimeError, code: &str) -> ScriptResult {
    let location = err.span.map(|span| {
        let (line, column) = offset_to_line_col(code, span.start);
        SourceLocation { line, column }
    });
    let detail = match &err.capability {
        Some(capability) => format!("{capability}: {}", err.message),
        None => err.message.clone(),
    };
    let message = match location {
        Some(loc) => format!("line {}:{}: {detail}", loc.line, loc.column),
        None => detail,
    };
    ScriptResult::failed(err.kind, message)
        .at(location)
        .with_capability(err.capability.clone())
}

#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod ast;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod error;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod lexer;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod parser;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod value;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod guards;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod builtins;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod resolve;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod interp;

use error::{CompileError, RuntimeError};
use guards::GuardTable;
use value::Value;

pub use resolve::{Environment, Program};

use crate::settings::SandboxConfig;

/// Compile a script into a checked `Program` ready for the interpreter.
///
/// This is the primary public entry point for the script pipeline:
/// source → lex → parse → resolve → `Program`
pub fn compile_source(source: &str, env: &Environment) -> Result<Program, Vec<CompileError>> {
    let tokens = lexer::lex(source)?;
    let ast = parser::parse(tokens)?;
    resolve::resolve(ast, env)
}

/// Size and step limits the interpreter enforces on one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_operations: Option<u64>,
    pub max_call_depth: usize,
    pub max_collection_len: usize,
    pub max_string_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self::from_config(&SandboxConfig::default())
    }
}

impl Limits {
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            max_operations: config.max_operations,
            max_call_depth: config.max_call_depth,
            max_collection_len: config.max_collection_len,
            max_string_len: config.max_string_len,
        }
    }

    pub fn collection_error(&self) -> RuntimeError {
        RuntimeError::invalid_value(format!(
            "collection would exceed the maximum length of {}",
            self.max_collection_len
        ))
    }

    pub fn check_collection(&self, len: usize) -> Result<(), RuntimeError> {
        if len > self.max_collection_len {
            Err(self.collection_error())
        } else {
            Ok(())
        }
    }

    pub fn check_string(&self, len: usize) -> Result<(), RuntimeError> {
        if len > self.max_string_len {
            Err(RuntimeError::invalid_value(format!(
                "string would exceed the maximum length of {}",
                self.max_string_len
            )))
        } else {
            Ok(())
        }
    }
}

/// Everything a running script can reach outside its own values.
pub trait Host {
    /// A read-only context binding such as `BEAT_TIMES`.
    fn constant(&self, name: &str) -> Option<Value>;

    fn call_capability(
        &mut self,
        name: &str,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> Result<Value, RuntimeError>;

    /// Uniform in `[0, 1)`.
    fn random(&mut self) -> f64;

    fn beat_times(&self) -> &[f64];

    fn log(&mut self, line: String);

    fn limits(&self) -> &Limits;

    fn guards(&self) -> &GuardTable;

    /// Polled every step; `true` stops the run with a timeout.
    fn cancelled(&self) -> bool;
}

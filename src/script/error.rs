use std::fmt;

use super::ast::Span;
use crate::error::ErrorKind;

/// A compilation error with source location.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub message: String,
    pub span: Span,
    pub stage: Stage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lexer,
    Parser,
    Resolve,
}

impl CompileError {
    pub fn lexer(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            stage: Stage::Lexer,
        }
    }

    pub fn parser(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            stage: Stage::Parser,
        }
    }

    pub fn resolve(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            stage: Stage::Resolve,
        }
    }

    /// `line L:C: message`
    pub fn format_with_source(&self, source: &str) -> String {
        let (line, col) = offset_to_line_col(source, self.span.start);
        format!("line {line}:{col}: {}", self.message)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CompileError {}

/// Join every error into one message, one per line, in source order.
pub fn format_errors(errors: &[CompileError], source: &str) -> String {
    errors
        .iter()
        .map(|e| e.format_with_source(source))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// A fault raised while a script runs, already classified.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Option<Span>,
    /// Set for `CapabilityError`: the tool that refused the call.
    pub capability: Option<String>,
}

impl RuntimeError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            capability: None,
        }
    }

    pub fn undefined(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UndefinedReference, message)
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch, message)
    }

    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidValue, message)
    }

    pub fn fault(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RuntimeFault, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TimeoutError, message)
    }

    pub fn capability(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            capability: Some(name.into()),
            ..Self::new(ErrorKind::CapabilityError, message)
        }
    }

    /// Attach a location unless a more precise one is already set.
    pub fn at(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RuntimeError {}

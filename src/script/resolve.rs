//! Static checks run after parsing: every name must resolve, private and
//! read-only names are untouchable, and call shapes must fit their target.
//! Also records which guard hooks the program will need at run time.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::ast::*;
use super::builtins::{self, METHODS};
use super::error::CompileError;
use super::guards::GuardKind;

/// Names the host provides besides the builtins: capabilities (callable)
/// and read-only context bindings.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    capabilities: HashSet<String>,
    constants: HashSet<String>,
}

impl Environment {
    pub fn new<C, K>(capabilities: C, constants: K) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        K: IntoIterator,
        K::Item: Into<String>,
    {
        Self {
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            constants: constants.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_capability(&self, name: &str) -> bool {
        self.capabilities.contains(name)
    }

    pub fn is_constant(&self, name: &str) -> bool {
        self.constants.contains(name)
    }
}

/// A checked script, ready to run.
#[derive(Debug, Clone)]
pub struct Program {
    pub script: Script,
    pub required_guards: BTreeSet<GuardKind>,
}

pub fn resolve(script: Script, env: &Environment) -> Result<Program, Vec<CompileError>> {
    let mut resolver = Resolver::new(env);
    resolver.check_script(&script);
    if resolver.errors.is_empty() {
        Ok(Program {
            script,
            required_guards: resolver.guards,
        })
    } else {
        let mut errors = resolver.errors;
        errors.sort_by_key(|e| e.span.start);
        Err(errors)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameKind {
    Variable,
    Constant,
    Function,
    Builtin,
    Capability,
    Unknown,
}

struct Resolver<'a> {
    env: &'a Environment,
    /// User function name → parameter count.
    functions: HashMap<String, usize>,
    globals: HashSet<String>,
    /// Set while checking a function body.
    locals: Option<HashSet<String>>,
    loop_depth: usize,
    guards: BTreeSet<GuardKind>,
    errors: Vec<CompileError>,
}

impl<'a> Resolver<'a> {
    fn new(env: &'a Environment) -> Self {
        Self {
            env,
            functions: HashMap::new(),
            globals: HashSet::new(),
            locals: None,
            loop_depth: 0,
            guards: BTreeSet::new(),
            errors: Vec::new(),
        }
    }

    fn error(&mut self, message: impl Into<String>, span: Span) {
        self.errors.push(CompileError::resolve(message, span));
    }

    fn check_script(&mut self, script: &Script) {
        // Functions are hoisted: every one is callable from anywhere.
        for f in &script.functions {
            self.check_private(&f.name, f.span);
            if let Some(what) = self.reserved_kind(&f.name) {
                self.error(format!("cannot define a function named '{}': it is {what}", f.name), f.span);
            } else if self.functions.insert(f.name.clone(), f.params.len()).is_some() {
                self.error(format!("function '{}' is defined more than once", f.name), f.span);
            }
        }

        collect_assigned(&script.body, &mut self.globals);

        for f in &script.functions {
            self.check_function(f);
        }
        self.check_block(&script.body);
    }

    fn check_function(&mut self, f: &FnDef) {
        let mut locals = HashSet::new();
        let mut seen = HashSet::new();
        for param in &f.params {
            self.check_binding(param, f.span);
            if !seen.insert(param.as_str()) {
                self.error(format!("parameter '{param}' appears more than once in '{}'", f.name), f.span);
            }
            locals.insert(param.clone());
        }
        collect_assigned(&f.body, &mut locals);

        let outer_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.locals = Some(locals);
        self.check_block(&f.body);
        self.locals = None;
        self.loop_depth = outer_loops;
    }

    // ── Names ─────────────────────────────────────────────────────

    fn classify(&self, name: &str) -> NameKind {
        if self.locals.as_ref().is_some_and(|l| l.contains(name)) || self.globals.contains(name) {
            NameKind::Variable
        } else if self.env.is_constant(name) {
            NameKind::Constant
        } else if self.functions.contains_key(name) {
            NameKind::Function
        } else if builtins::lookup(name).is_some() {
            NameKind::Builtin
        } else if self.env.is_capability(name) {
            NameKind::Capability
        } else {
            NameKind::Unknown
        }
    }

    /// What a name already is, if it cannot be (re)bound by a script.
    fn reserved_kind(&self, name: &str) -> Option<&'static str> {
        if self.env.is_constant(name) {
            Some("a read-only binding")
        } else if self.env.is_capability(name) {
            Some("a tool")
        } else if builtins::lookup(name).is_some() {
            Some("a built-in function")
        } else {
            None
        }
    }

    fn check_private(&mut self, name: &str, span: Span) {
        if name.starts_with('_') {
            self.error(
                format!("names beginning with '_' are not allowed: '{name}'"),
                span,
            );
        }
    }

    /// A name on the left of `=`, a loop variable or a parameter.
    fn check_binding(&mut self, name: &str, span: Span) {
        self.check_private(name, span);
        if let Some(what) = self.reserved_kind(name) {
            self.error(format!("cannot assign to '{name}': it is {what}"), span);
        } else if self.functions.contains_key(name) {
            self.error(format!("cannot assign to '{name}': it is a function"), span);
        }
    }

    fn check_read(&mut self, name: &str, span: Span) {
        self.check_private(name, span);
        match self.classify(name) {
            NameKind::Variable | NameKind::Constant => {}
            NameKind::Function | NameKind::Builtin | NameKind::Capability => self.error(
                format!("'{name}' is a function; call it as {name}(...)"),
                span,
            ),
            NameKind::Unknown => self.error(format!("undefined name '{name}'"), span),
        }
    }

    // ── Statements ────────────────────────────────────────────────

    fn check_block(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.check_stmt(stmt);
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Assign { target, op, value, span } => {
                self.check_target(target, op.is_some(), *span);
                self.check_expr(value);
            }
            Stmt::If { cond, then_body, else_body, .. } => {
                self.check_expr(cond);
                self.check_block(then_body);
                self.check_block(else_body);
            }
            Stmt::While { cond, body, .. } => {
                self.check_expr(cond);
                self.check_loop_body(body);
            }
            Stmt::For { var, iter, body, span } => {
                self.check_binding(var, *span);
                self.check_expr(iter);
                self.guards.insert(GuardKind::Iter);
                self.check_loop_body(body);
            }
            Stmt::Return { value, span } => {
                if self.locals.is_none() {
                    self.error("'return' outside of a function", *span);
                }
                if let Some(value) = value {
                    self.check_expr(value);
                }
            }
            Stmt::Break(span) | Stmt::Continue(span) => {
                if self.loop_depth == 0 {
                    let word = if matches!(stmt, Stmt::Break(_)) { "break" } else { "continue" };
                    self.error(format!("'{word}' outside of a loop"), *span);
                }
            }
            Stmt::Pass(_) => {}
            Stmt::Expr(expr) => self.check_expr(expr),
        }
    }

    fn check_loop_body(&mut self, body: &[Stmt]) {
        self.loop_depth += 1;
        self.check_block(body);
        self.loop_depth -= 1;
    }

    fn check_target(&mut self, target: &Target, compound: bool, span: Span) {
        match target {
            Target::Name(name, name_span) => {
                self.check_binding(name, *name_span);
                if compound && self.classify(name) != NameKind::Variable {
                    self.error(format!("undefined name '{name}'"), *name_span);
                }
            }
            Target::Index { object, index } => {
                self.check_expr(object);
                self.check_expr(index);
                self.guards.insert(GuardKind::SetItem);
                if compound {
                    self.guards.insert(GuardKind::GetItem);
                }
            }
            Target::Field { object, field } => {
                self.check_expr(object);
                self.check_private(field, span);
                self.guards.insert(GuardKind::SetAttr);
                if compound {
                    self.guards.insert(GuardKind::GetAttr);
                }
            }
        }
    }

    // ── Expressions ───────────────────────────────────────────────

    fn check_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Null | ExprKind::Bool(_) | ExprKind::Int(_) | ExprKind::Float(_) | ExprKind::Str(_) => {}
            ExprKind::List(items) => {
                for item in items {
                    self.check_expr(item);
                }
            }
            ExprKind::Map(entries) => {
                for (_, value) in entries {
                    self.check_expr(value);
                }
            }
            ExprKind::Name(name) => self.check_read(name, expr.span),
            ExprKind::Unary(_, operand) => self.check_expr(operand),
            ExprKind::Binary(_, lhs, rhs) | ExprKind::Logical(_, lhs, rhs) | ExprKind::Range(lhs, rhs) => {
                self.check_expr(lhs);
                self.check_expr(rhs);
            }
            ExprKind::Index(object, index) => {
                self.check_expr(object);
                self.check_expr(index);
                self.guards.insert(GuardKind::GetItem);
            }
            ExprKind::Field(object, field) => {
                self.check_expr(object);
                self.check_private(field, expr.span);
                self.guards.insert(GuardKind::GetAttr);
            }
            ExprKind::Call { callee, args, named } => {
                self.check_call(callee, args.len(), named, expr.span);
                for arg in args {
                    self.check_expr(arg);
                }
                for (_, value) in named {
                    self.check_expr(value);
                }
            }
            ExprKind::Method { receiver, method, args } => {
                self.check_expr(receiver);
                self.check_method(method, args.len(), expr.span);
                for arg in args {
                    self.check_expr(arg);
                }
            }
        }
    }

    fn check_call(&mut self, callee: &str, arg_count: usize, named: &[(String, Expr)], span: Span) {
        self.check_private(callee, span);
        let kind = self.classify(callee);
        if !named.is_empty() && matches!(kind, NameKind::Function | NameKind::Builtin) {
            self.error(
                format!("named arguments are only accepted by tools; pass the arguments to '{callee}' by position"),
                span,
            );
        }
        for (name, _) in named {
            self.check_private(name, span);
        }
        match kind {
            NameKind::Function => {
                let expected = self.functions.get(callee).copied().unwrap_or(0);
                if arg_count != expected {
                    self.error(
                        format!("{callee}() takes {expected} argument(s) but {arg_count} were given"),
                        span,
                    );
                }
            }
            NameKind::Builtin => {
                if let Some(builtin) = builtins::lookup(callee) {
                    if !builtin.accepts(arg_count) {
                        self.error(
                            format!(
                                "{callee}({}) expects {}, got {arg_count}",
                                builtin.params,
                                builtin.arity_text()
                            ),
                            span,
                        );
                    }
                }
            }
            // Tools check their own arguments and report a CapabilityError.
            NameKind::Capability => {}
            NameKind::Variable | NameKind::Constant => {
                self.error(format!("'{callee}' is not a function"), span);
            }
            NameKind::Unknown => self.error(format!("undefined function '{callee}'"), span),
        }
    }

    fn check_method(&mut self, method: &str, arg_count: usize, span: Span) {
        self.check_private(method, span);
        let Some(builtin) = builtins::lookup(method).filter(|_| METHODS.contains(&method)) else {
            self.error(
                format!("unknown method '{method}'; available methods: {}", METHODS.join(", ")),
                span,
            );
            return;
        };
        if !builtin.accepts(arg_count + 1) {
            let shown = builtin.params.split_once(", ").map_or("", |(_, rest)| rest);
            self.error(
                format!("x.{method}({shown}) was given {arg_count} argument(s)"),
                span,
            );
        }
    }
}

/// Every name bound by assignment or a `for` loop anywhere in `stmts`.
fn collect_assigned(stmts: &[Stmt], names: &mut HashSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign { target: Target::Name(name, _), .. } => {
                names.insert(name.clone());
            }
            Stmt::If { then_body, else_body, .. } => {
                collect_assigned(then_body, names);
                collect_assigned(else_body, names);
            }
            Stmt::While { body, .. } => collect_assigned(body, names),
            Stmt::For { var, body, .. } => {
                names.insert(var.clone());
                collect_assigned(body, names);
            }
            _ => {}
        }
    }
}

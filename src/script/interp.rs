//! Tree-walking interpreter over a resolved `Program`.

use std::collections::HashMap;

use indexmap::IndexMap;

use super::ast::*;
use super::builtins;
use super::error::RuntimeError;
use super::resolve::Program;
use super::value::Value;
use super::Host;

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Run a program to completion. Returns the top-level variables.
pub fn run(program: &Program, host: &mut dyn Host) -> Result<IndexMap<String, Value>, RuntimeError> {
    host.guards()
        .ensure(program.required_guards.iter())
        .map_err(|e| RuntimeError::fault(e.to_string()))?;
    let mut interp = Interpreter::new(program, host);
    interp.exec_block(&program.script.body)?;
    Ok(interp.globals)
}

struct Interpreter<'p, 'h> {
    host: &'h mut dyn Host,
    functions: HashMap<&'p str, &'p FnDef>,
    globals: IndexMap<String, Value>,
    frames: Vec<HashMap<String, Value>>,
    ops: u64,
}

impl<'p, 'h> Interpreter<'p, 'h> {
    fn new(program: &'p Program, host: &'h mut dyn Host) -> Self {
        Self {
            host,
            functions: program
                .script
                .functions
                .iter()
                .map(|f| (f.name.as_str(), f))
                .collect(),
            globals: IndexMap::new(),
            frames: Vec::new(),
            ops: 0,
        }
    }

    /// One unit of work: a statement, a loop iteration or a call.
    fn tick(&mut self) -> Result<(), RuntimeError> {
        self.ops += 1;
        if let Some(max) = self.host.limits().max_operations {
            if self.ops > max {
                return Err(RuntimeError::timeout(format!(
                    "script exceeded its budget of {max} operations"
                )));
            }
        }
        if self.host.cancelled() {
            return Err(RuntimeError::timeout("script exceeded its time limit and was stopped"));
        }
        Ok(())
    }

    // ── Variables ─────────────────────────────────────────────────

    fn lookup(&self, name: &str) -> Result<Value, RuntimeError> {
        if let Some(v) = self.frames.last().and_then(|f| f.get(name)) {
            return Ok(v.clone());
        }
        if let Some(v) = self.globals.get(name) {
            return Ok(v.clone());
        }
        self.host
            .constant(name)
            .ok_or_else(|| RuntimeError::undefined(format!("'{name}' is used before it is assigned")))
    }

    fn assign(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.insert(name.to_string(), value);
            }
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    // ── Statements ────────────────────────────────────────────────

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow, RuntimeError> {
        for stmt in stmts {
            match self.exec_stmt(stmt).map_err(|e| e.at(stmt.span()))? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        self.tick()?;
        match stmt {
            Stmt::Assign { target, op, value, .. } => {
                let value = self.eval(value)?;
                self.exec_assign(target, *op, value)?;
                Ok(Flow::Normal)
            }
            Stmt::If { cond, then_body, else_body, .. } => {
                if self.eval(cond)?.truthy() {
                    self.exec_block(then_body)
                } else {
                    self.exec_block(else_body)
                }
            }
            Stmt::While { cond, body, .. } => {
                while self.eval(cond)?.truthy() {
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    self.tick()?;
                }
                Ok(Flow::Normal)
            }
            Stmt::For { var, iter, body, .. } => {
                let iterable = self.eval(iter)?;
                let iterate = self
                    .host
                    .guards()
                    .iter
                    .ok_or_else(|| RuntimeError::fault("iteration is not available"))?;
                for item in iterate(&iterable)? {
                    self.tick()?;
                    self.assign(var, item);
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break(_) => Ok(Flow::Break),
            Stmt::Continue(_) => Ok(Flow::Continue),
            Stmt::Pass(_) => Ok(Flow::Normal),
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
        }
    }

    fn exec_assign(&mut self, target: &Target, op: Option<BinOp>, value: Value) -> Result<(), RuntimeError> {
        let guards = *self.host.guards();
        match target {
            Target::Name(name, _) => {
                let value = match op {
                    Some(op) => {
                        let current = self.lookup(name)?;
                        self.binary(op, &current, &value)?
                    }
                    None => value,
                };
                self.assign(name, value);
            }
            Target::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                let set = guards
                    .set_item
                    .ok_or_else(|| RuntimeError::fault("element assignment is not available"))?;
                let value = match op {
                    Some(op) => {
                        let get = guards
                            .get_item
                            .ok_or_else(|| RuntimeError::fault("indexing is not available"))?;
                        self.binary(op, &get(&object, &index)?, &value)?
                    }
                    None => value,
                };
                set(&object, &index, value, self.host.limits())?;
            }
            Target::Field { object, field } => {
                let object = self.eval(object)?;
                let set = guards
                    .set_attr
                    .ok_or_else(|| RuntimeError::fault("field assignment is not available"))?;
                let value = match op {
                    Some(op) => {
                        let get = guards
                            .get_attr
                            .ok_or_else(|| RuntimeError::fault("field access is not available"))?;
                        self.binary(op, &get(&object, field)?, &value)?
                    }
                    None => value,
                };
                set(&object, field, value, self.host.limits())?;
            }
        }
        Ok(())
    }

    // ── Expressions ───────────────────────────────────────────────

    fn eval(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        self.eval_kind(expr).map_err(|e| e.at(expr.span))
    }

    fn eval_kind(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match &expr.kind {
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Int(n) => Ok(Value::Int(*n)),
            ExprKind::Float(f) => Ok(Value::Float(*f)),
            ExprKind::Str(s) => Ok(Value::string(s.as_str())),
            ExprKind::List(items) => {
                self.host.limits().check_collection(items.len())?;
                let values = items.iter().map(|e| self.eval(e)).collect::<Result<_, _>>()?;
                Ok(Value::list(values))
            }
            ExprKind::Map(entries) => {
                self.host.limits().check_collection(entries.len())?;
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let value = self.eval(value)?;
                    map.insert(key.clone(), value);
                }
                Ok(Value::map(map))
            }
            ExprKind::Name(name) => self.lookup(name),
            ExprKind::Unary(op, operand) => {
                let v = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!v.truthy())),
                    UnaryOp::Neg => match v {
                        Value::Int(n) => n
                            .checked_neg()
                            .map(Value::Int)
                            .ok_or_else(|| RuntimeError::invalid_value("integer overflow in negation")),
                        Value::Float(f) => Ok(Value::Float(-f)),
                        other => Err(RuntimeError::type_mismatch(format!(
                            "cannot negate {}",
                            other.type_name()
                        ))),
                    },
                }
            }
            ExprKind::Binary(op, lhs, rhs) => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                self.binary(*op, &l, &r)
            }
            ExprKind::Logical(op, lhs, rhs) => {
                let l = self.eval(lhs)?;
                match (op, l.truthy()) {
                    (LogicOp::And, false) | (LogicOp::Or, true) => Ok(l),
                    _ => self.eval(rhs),
                }
            }
            ExprKind::Range(start, stop) => {
                let start = self.eval(start)?;
                let stop = self.eval(stop)?;
                match (&start, &stop) {
                    (Value::Int(a), Value::Int(b)) => builtins::int_range(self.host.limits(), *a, *b, 1),
                    _ => Err(RuntimeError::type_mismatch(format!(
                        "range bounds must be ints, got {} and {}",
                        start.type_name(),
                        stop.type_name()
                    ))),
                }
            }
            ExprKind::Index(object, index) => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                let get = self
                    .host
                    .guards()
                    .get_item
                    .ok_or_else(|| RuntimeError::fault("indexing is not available"))?;
                get(&object, &index)
            }
            ExprKind::Field(object, field) => {
                let object = self.eval(object)?;
                let get = self
                    .host
                    .guards()
                    .get_attr
                    .ok_or_else(|| RuntimeError::fault("field access is not available"))?;
                get(&object, field)
            }
            ExprKind::Call { callee, args, named } => {
                let args = args.iter().map(|a| self.eval(a)).collect::<Result<Vec<_>, _>>()?;
                let named = named
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.eval(v)?)))
                    .collect::<Result<Vec<_>, RuntimeError>>()?;
                self.call(callee, args, named)
            }
            ExprKind::Method { receiver, method, args } => {
                let mut values = Vec::with_capacity(args.len() + 1);
                values.push(self.eval(receiver)?);
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                let builtin = builtins::lookup(method)
                    .filter(|_| builtins::is_method(method))
                    .ok_or_else(|| RuntimeError::undefined(format!("unknown method '{method}'")))?;
                (builtin.func)(&mut *self.host, &values)
            }
        }
    }

    fn call(&mut self, callee: &str, args: Vec<Value>, named: Vec<(String, Value)>) -> Result<Value, RuntimeError> {
        self.tick()?;
        if let Some(f) = self.functions.get(callee).copied() {
            return self.call_function(f, args);
        }
        if let Some(builtin) = builtins::lookup(callee) {
            return (builtin.func)(&mut *self.host, &args);
        }
        self.host.call_capability(callee, args, named)
    }

    fn call_function(&mut self, f: &FnDef, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let max_depth = self.host.limits().max_call_depth;
        if self.frames.len() >= max_depth {
            return Err(RuntimeError::fault(format!(
                "maximum call depth of {max_depth} exceeded in '{}'",
                f.name
            )));
        }
        if args.len() != f.params.len() {
            return Err(RuntimeError::type_mismatch(format!(
                "{}() takes {} argument(s) but {} were given",
                f.name,
                f.params.len(),
                args.len()
            )));
        }
        let frame = f.params.iter().cloned().zip(args).collect();
        self.frames.push(frame);
        let result = self.exec_block(&f.body);
        self.frames.pop();
        match result? {
            Flow::Return(v) => Ok(v),
            Flow::Normal | Flow::Break | Flow::Continue => Ok(Value::Null),
        }
    }

    // ── Operators ─────────────────────────────────────────────────

    fn binary(&self, op: BinOp, l: &Value, r: &Value) -> Result<Value, RuntimeError> {
        let limits = self.host.limits();
        match op {
            BinOp::Eq => return Ok(Value::Bool(l.equals(r))),
            BinOp::Ne => return Ok(Value::Bool(!l.equals(r))),
            BinOp::Lt => return Ok(Value::Bool(l.compare(r)?.is_lt())),
            BinOp::Le => return Ok(Value::Bool(l.compare(r)?.is_le())),
            BinOp::Gt => return Ok(Value::Bool(l.compare(r)?.is_gt())),
            BinOp::Ge => return Ok(Value::Bool(l.compare(r)?.is_ge())),
            BinOp::In => return builtins::contains_value(r, l).map(Value::Bool),
            _ => {}
        }

        match (op, l, r) {
            (BinOp::Add, Value::Str(a), Value::Str(b)) => {
                limits.check_string(a.len() + b.len())?;
                Ok(Value::string(format!("{a}{b}")))
            }
            (BinOp::Add, Value::List(a), Value::List(b)) => {
                let mut items = a.items().clone();
                items.extend(b.items().iter().cloned());
                limits.check_collection(items.len())?;
                Ok(Value::list(items))
            }
            (BinOp::Mul, Value::Str(s), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::Str(s)) => {
                let times = usize::try_from(*n).unwrap_or(0);
                limits.check_string(s.len().saturating_mul(times))?;
                Ok(Value::string(s.repeat(times)))
            }
            (BinOp::Mul, Value::List(l), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::List(l)) => {
                let times = usize::try_from(*n).unwrap_or(0);
                let items = l.items();
                limits.check_collection(items.len().saturating_mul(times))?;
                let mut out = Vec::with_capacity(items.len() * times);
                for _ in 0..times {
                    out.extend(items.iter().cloned());
                }
                Ok(Value::list(out))
            }
            (_, Value::Int(a), Value::Int(b)) => int_arith(op, *a, *b),
            _ => match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => float_arith(op, a, b),
                _ => Err(RuntimeError::type_mismatch(format!(
                    "unsupported operand types for {}: {} and {}",
                    op.symbol(),
                    l.type_name(),
                    r.type_name()
                ))),
            },
        }
    }
}

fn overflow(op: BinOp) -> RuntimeError {
    RuntimeError::invalid_value(format!("integer overflow in {}", op.symbol()))
}

fn int_arith(op: BinOp, a: i64, b: i64) -> Result<Value, RuntimeError> {
    let checked = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => return float_arith(op, a as f64, b as f64),
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(RuntimeError::invalid_value("division by zero"));
            }
            a.checked_div(b).map(|q| if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q })
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(RuntimeError::invalid_value("modulo by zero"));
            }
            a.checked_rem(b).map(|r| if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
        }
        BinOp::Pow => {
            if b < 0 {
                return float_arith(op, a as f64, b as f64);
            }
            u32::try_from(b).ok().and_then(|e| a.checked_pow(e))
        }
        _ => None,
    };
    checked.map(Value::Int).ok_or_else(|| overflow(op))
}

fn float_arith(op: BinOp, a: f64, b: f64) -> Result<Value, RuntimeError> {
    let v = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(RuntimeError::invalid_value("division by zero"));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(RuntimeError::invalid_value("division by zero"));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(RuntimeError::invalid_value("modulo by zero"));
            }
            a - b * (a / b).floor()
        }
        BinOp::Pow => a.powf(b),
        _ => {
            return Err(RuntimeError::fault(format!(
                "operator {} is not arithmetic",
                op.symbol()
            )))
        }
    };
    Ok(Value::Float(v))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::script::guards::GuardTable;
    use crate::script::{compile_source, Environment, Limits};

    struct TestHost {
        limits: Limits,
        guards: GuardTable,
        calls: Vec<(String, Vec<Value>, Vec<(String, Value)>)>,
        logs: Vec<String>,
    }

    impl TestHost {
        fn new() -> Self {
            Self {
                limits: Limits::default(),
                guards: GuardTable::standard(),
                calls: Vec::new(),
                logs: Vec::new(),
            }
        }
    }

    impl Host for TestHost {
        fn constant(&self, name: &str) -> Option<Value> {
            match name {
                "NUM_BALLS" => Some(Value::Int(3)),
                "BEAT_TIMES" => Some(Value::frozen_list(vec![Value::Float(0.5), Value::Float(1.0)])),
                _ => None,
            }
        }

        fn call_capability(
            &mut self,
            name: &str,
            positional: Vec<Value>,
            named: Vec<(String, Value)>,
        ) -> Result<Value, RuntimeError> {
            if positional.first().is_some_and(|v| v.equals(&Value::Int(99))) {
                return Err(RuntimeError::capability(name, "timelineIndex 99 is out of range [0, 3)"));
            }
            self.calls.push((name.to_string(), positional, named));
            Ok(Value::Bool(true))
        }

        fn random(&mut self) -> f64 {
            0.25
        }

        fn beat_times(&self) -> &[f64] {
            &[0.5, 1.0]
        }

        fn log(&mut self, line: String) {
            self.logs.push(line);
        }

        fn limits(&self) -> &Limits {
            &self.limits
        }

        fn guards(&self) -> &GuardTable {
            &self.guards
        }

        fn cancelled(&self) -> bool {
            false
        }
    }

    fn env() -> Environment {
        Environment::new(["create_segment", "clear_timeline"], ["NUM_BALLS", "BEAT_TIMES"])
    }

    fn run_with(src: &str, host: &mut TestHost) -> Result<IndexMap<String, Value>, RuntimeError> {
        let program = compile_source(src, &env()).unwrap();
        run(&program, host)
    }

    fn run_src(src: &str) -> Result<IndexMap<String, Value>, RuntimeError> {
        run_with(src, &mut TestHost::new())
    }

    fn global(src: &str, name: &str) -> Value {
        run_src(src).unwrap().get(name).cloned().unwrap()
    }

    #[test]
    fn loop_calls_capability_each_iteration() {
        let mut host = TestHost::new();
        run_with("for i in 0..3: create_segment(0, i, i+1, [255,0,0])", &mut host).unwrap();
        assert_eq!(host.calls.len(), 3);
        let (name, args, _) = &host.calls[2];
        assert_eq!(name, "create_segment");
        assert!(args[1].equals(&Value::Int(2)));
        assert!(args[2].equals(&Value::Int(3)));
    }

    #[test]
    fn capability_failure_stops_the_run_after_earlier_calls() {
        let mut host = TestHost::new();
        let src = "for i in range(5): create_segment(0, i, i + 1, [0, 0, 255])\ncreate_segment(99, 0, 1, [0, 0, 0])\nafter = 1";
        let err = run_with(src, &mut host).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CapabilityError);
        assert_eq!(err.capability.as_deref(), Some("create_segment"));
        assert_eq!(host.calls.len(), 5);
        assert!(err.span.is_some());
    }

    #[test]
    fn named_arguments_reach_the_capability() {
        let mut host = TestHost::new();
        run_with("clear_timeline(timelineIndex=1)", &mut host).unwrap();
        let (_, positional, named) = &host.calls[0];
        assert!(positional.is_empty());
        assert_eq!(named[0].0, "timelineIndex");
    }

    #[test]
    fn arithmetic_follows_script_rules() {
        assert!(global("x = 7 / 2", "x").equals(&Value::Float(3.5)));
        assert!(global("x = -7 // 2", "x").equals(&Value::Int(-4)));
        assert!(global("x = -7 % 3", "x").equals(&Value::Int(2)));
        assert!(global("x = 2 ** 10", "x").equals(&Value::Int(1024)));
        assert!(global("x = -2 ** 2", "x").equals(&Value::Int(-4)));
        assert!(global("x = \"a\" + \"b\"", "x").equals(&Value::string("ab")));
        assert!(global("x = [1] + [2]", "x").equals(&Value::list(vec![Value::Int(1), Value::Int(2)])));
    }

    #[test]
    fn runtime_faults_are_classified() {
        assert_eq!(run_src("x = 1 / 0").unwrap_err().kind, ErrorKind::InvalidValue);
        assert_eq!(run_src("x = 1 + \"a\"").unwrap_err().kind, ErrorKind::TypeMismatch);
        assert_eq!(run_src("x = [1][5]").unwrap_err().kind, ErrorKind::InvalidValue);
        assert_eq!(run_src("x = 9223372036854775807 + 1").unwrap_err().kind, ErrorKind::InvalidValue);
        assert_eq!(run_src("if false: y = 1\nx = y").unwrap_err().kind, ErrorKind::UndefinedReference);
    }

    #[test]
    fn context_bindings_are_read_only_values() {
        let err = run_src("BEAT_TIMES.push(3)").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidValue);
        assert!(global("n = NUM_BALLS * 2", "n").equals(&Value::Int(6)));
    }

    #[test]
    fn functions_recurse_with_their_own_locals() {
        let src = "def fact(n):\n    if n <= 1:\n        return 1\n    return n * fact(n - 1)\nx = fact(10)";
        assert!(global(src, "x").equals(&Value::Int(3_628_800)));
        let bindings = run_src(src).unwrap();
        assert!(!bindings.contains_key("n"));
    }

    #[test]
    fn runaway_recursion_is_a_fault() {
        let mut host = TestHost::new();
        host.limits.max_call_depth = 16;
        let err = run_with("def f(n): return f(n + 1)\nf(0)", &mut host).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RuntimeFault);
        assert!(err.message.contains("maximum call depth"));
    }

    #[test]
    fn operation_budget_reports_timeout() {
        let mut host = TestHost::new();
        host.limits.max_operations = Some(1_000);
        let err = run_with("while true: pass", &mut host).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TimeoutError);
    }

    #[test]
    fn break_continue_and_else_if() {
        let src = "total = 0\nfor i in range(10):\n    if i == 2:\n        continue\n    elif i > 4:\n        break\n    total += i";
        assert!(global(src, "total").equals(&Value::Int(8)));
    }

    #[test]
    fn maps_support_fields_and_subscripts() {
        let src = "m = {a: 1, \"b\": 2}\nm.c = 3\nm[\"a\"] += 10\nks = keys(m)\nhas = \"c\" in m";
        let out = run_src(src).unwrap();
        assert!(out["ks"].equals(&Value::list(vec![Value::string("a"), Value::string("b"), Value::string("c")])));
        assert!(out["has"].equals(&Value::Bool(true)));
        let m = out["m"].to_json().unwrap();
        assert_eq!(m, serde_json::json!({ "a": 11, "b": 2, "c": 3 }));
    }

    #[test]
    fn missing_guard_is_refused_before_running() {
        let mut host = TestHost::new();
        host.guards.iter = None;
        let err = run_with("for x in [1]: create_segment(0, 0, 1, [1, 1, 1])", &mut host).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RuntimeFault);
        assert!(host.calls.is_empty());
    }

    #[test]
    fn logical_operators_short_circuit() {
        let mut host = TestHost::new();
        run_with("ok = false and create_segment(0, 0, 1, [1, 1, 1])", &mut host).unwrap();
        assert!(host.calls.is_empty());
    }
}

//! Symbolic execution engine.
//!
//! Interprets a straight-line program left to right, maintaining the
//! store σ and the path constraint C. Execution stops at the first
//! statement that is not ready (a backend API call whose arguments
//! still contain symbolic values) and the fixed-point driver takes
//! over from there with the solver.
//!
//! Built-in operations evaluate symbolically (they fold when their
//! inputs are concrete and rebuild residuals otherwise); every other
//! call name is a backend API and executes through the function
//! factory, but only once all of its arguments are concrete.

use crate::error::Error;
use crate::factory::FunctionFactory;
use crate::sigma::Sigma;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use testgen_core::{AssignTarget, BinOp, Expr, Program, Stmt, SymVarGen};
use tracing::{debug, warn};

/// Names the engine interprets itself. Everything else is a backend
/// API dispatched through the function factory.
static BUILTINS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        // Arithmetic
        "Add", "Sub", "Mul", "Div",
        // Comparison
        "Eq", "Lt", "Gt", "Le", "Ge", "Neq", "=", "==", "!=", "<>", "<", ">", "<=", ">=",
        // Logical
        "And", "Or", "Not", "Implies", "and", "or", "not", "&&", "||", "!",
        // Input
        "input",
        // Set operations
        "in", "not_in", "member", "not_member", "contains", "not_contains", "union",
        "intersection", "intersect", "difference", "diff", "minus", "subset", "is_subset",
        "add_to_set", "remove_from_set", "is_empty_set",
        // Map operations
        "[]", "dom", "get", "put", "lookup", "select", "store", "update", "contains_key",
        "has_key",
        // List/sequence operations
        "concat", "append_list", "length", "at", "nth", "prefix", "suffix", "contains_seq",
        // Prime notation (postconditions)
        "'",
    ])
});

/// Whether `name` is interpreted by the engine rather than dispatched
/// to the backend.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(name)
}

/// Every non-builtin name is treated as a backend API.
pub fn is_api(name: &str) -> bool {
    !is_builtin(name)
}

/// Result of one executed backend API statement.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ApiOutcome {
    pub name: String,
    /// HTTP-style status when the call returned a `Num`.
    pub status: Option<i64>,
    /// Failure reason when the call could not run or threw.
    pub error: Option<String>,
}

/// Where a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// Every statement executed.
    Completed,
    /// Execution stopped before the statement at this index.
    NotReady(usize),
}

/// The symbolic engine. One instance lives for a whole pipeline
/// invocation so symbolic variable ids stay unique across passes; all
/// per-pass state (σ, C, base names, logs) resets on every `execute`.
pub struct SymbolicEngine<'f> {
    pub sigma: Sigma,
    /// Accumulated path constraint, implicitly conjoined.
    pub path: Vec<Expr>,
    /// Input variables bound this pass, in program order, with the id
    /// of the symbolic unknown standing in for each.
    pub inputs: Vec<(String, u32)>,
    /// One entry per executed backend API statement.
    pub api_log: Vec<ApiOutcome>,
    base_names: HashMap<String, String>,
    symvars: SymVarGen,
    factory: Option<&'f dyn FunctionFactory>,
    halt: Halt,
}

impl<'f> SymbolicEngine<'f> {
    pub fn new(factory: Option<&'f dyn FunctionFactory>) -> Self {
        SymbolicEngine {
            sigma: Sigma::new(),
            path: Vec::new(),
            inputs: Vec::new(),
            api_log: Vec::new(),
            base_names: HashMap::new(),
            symvars: SymVarGen::new(),
            factory,
            halt: Halt::Completed,
        }
    }

    /// Runs one pass over `program`, stopping at the first non-ready
    /// statement. σ and C always start empty; the symbolic id counter
    /// carries over so ids are never reused.
    pub fn execute(&mut self, program: &Program) -> Result<Halt, Error> {
        self.sigma.clear();
        self.path.clear();
        self.inputs.clear();
        self.api_log.clear();
        self.base_names.clear();
        self.halt = Halt::Completed;

        for (index, stmt) in program.stmts.iter().enumerate() {
            if !self.is_ready_stmt(stmt) {
                debug!("Statement {} not ready, interrupting pass: {}", index, stmt);
                self.halt = Halt::NotReady(index);
                break;
            }
            self.execute_stmt(stmt)?;
        }
        Ok(self.halt)
    }

    pub fn halt(&self) -> Halt {
        self.halt
    }

    /// Resolves a variable through σ, falling back to the base-name map
    /// so `email` finds the binding of the latest `email<i>`.
    pub fn resolve_var(&self, name: &str) -> Option<&Expr> {
        if let Some(value) = self.sigma.get(name) {
            return Some(value);
        }
        let suffixed = self.base_names.get(name)?;
        self.sigma.get(suffixed)
    }

    /// The conjunction of C: `true` when empty, the single element
    /// as-is, otherwise a right-associated `And` chain.
    pub fn compute_path_constraint(&self) -> Expr {
        let mut iter = self.path.iter().rev();
        let Some(last) = iter.next() else {
            return Expr::Bool(true);
        };
        let mut acc = last.clone();
        for c in iter {
            acc = Expr::binary(BinOp::And, c.clone(), acc);
        }
        acc
    }

    /// UNSAT candidacy without consulting the solver: C contains a
    /// concretely false element (`false` or the legacy `0`).
    pub fn has_concretely_false(&self) -> bool {
        self.path.iter().any(|c| c.as_bool() == Some(false))
    }

    pub(crate) fn fresh_sym_var(&mut self) -> Expr {
        self.symvars.fresh()
    }

    // ------------------------------------------------------------------
    // Readiness
    // ------------------------------------------------------------------

    fn is_ready_stmt(&self, stmt: &Stmt) -> bool {
        match stmt {
            Stmt::Assign { target, value } => {
                if let Expr::Call { name, args } = value {
                    if is_api(name) {
                        // API calls wait until every argument is concrete.
                        return args.iter().all(|a| !self.is_symbolic(a));
                    }
                }
                let target_ready = match target {
                    AssignTarget::Var(_) => true,
                    AssignTarget::Index { key, .. } => self.is_ready_expr(key),
                };
                target_ready && self.is_ready_expr(value)
            }
            Stmt::Assume(_) | Stmt::Assert(_) | Stmt::Input(_) | Stmt::Decl { .. } => true,
        }
    }

    fn is_ready_expr(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Num(_) | Expr::Str(_) | Expr::Bool(_) => true,
            Expr::SymVar(_) => false,
            Expr::Var(name) => match self.resolve_var(name) {
                Some(value) => !value.contains_sym_var(),
                None => false,
            },
            Expr::Set(elems) | Expr::Tuple(elems) => elems.iter().all(|e| self.is_ready_expr(e)),
            Expr::Map(entries) => entries.iter().all(|(_, v)| self.is_ready_expr(v)),
            Expr::Call { name, args } => {
                if name == "input" && args.is_empty() {
                    return true;
                }
                if is_api(name) {
                    args.iter().all(|a| !self.is_symbolic(a))
                } else {
                    // Built-ins evaluate symbolically, so they never
                    // block execution.
                    true
                }
            }
            Expr::Binary { lhs, rhs, .. } => self.is_ready_expr(lhs) && self.is_ready_expr(rhs),
            Expr::Unary { operand, .. } => self.is_ready_expr(operand),
        }
    }

    /// A symbolic value is reachable from `expr` once variables are
    /// resolved through σ. Unbound variables count as symbolic.
    pub(crate) fn is_symbolic(&self, expr: &Expr) -> bool {
        match expr {
            Expr::SymVar(_) => true,
            Expr::Num(_) | Expr::Str(_) | Expr::Bool(_) => false,
            Expr::Var(name) => match self.resolve_var(name) {
                Some(value) => !value.is_concrete(),
                None => true,
            },
            Expr::Set(elems) | Expr::Tuple(elems) => elems.iter().any(|e| self.is_symbolic(e)),
            Expr::Map(entries) => entries.iter().any(|(_, v)| self.is_symbolic(v)),
            Expr::Call { args, .. } => args.iter().any(|a| self.is_symbolic(a)),
            Expr::Binary { lhs, rhs, .. } => self.is_symbolic(lhs) || self.is_symbolic(rhs),
            Expr::Unary { operand, .. } => self.is_symbolic(operand),
        }
    }

    // ------------------------------------------------------------------
    // Statement execution
    // ------------------------------------------------------------------

    fn execute_stmt(&mut self, stmt: &Stmt) -> Result<(), Error> {
        match stmt {
            Stmt::Assign { target, value } => self.execute_assign(target, value),
            Stmt::Assume(cond) | Stmt::Assert(cond) => {
                let evaluated = self.eval(cond);
                debug!("Adding path constraint: {}", evaluated);
                self.path.push(evaluated);
                Ok(())
            }
            Stmt::Input(name) => {
                self.bind_input(name.clone());
                Ok(())
            }
            Stmt::Decl { name, .. } => {
                let sym = self.fresh_sym_var();
                self.sigma.bind(name.clone(), sym);
                Ok(())
            }
        }
    }

    fn execute_assign(&mut self, target: &AssignTarget, value: &Expr) -> Result<(), Error> {
        match target {
            AssignTarget::Var(name) => {
                if let Expr::Call { name: f, args } = value {
                    if f == "input" && args.is_empty() {
                        self.bind_input(name.clone());
                        return Ok(());
                    }
                    if is_api(f) {
                        return self.execute_api_assign(name, f, args);
                    }
                }
                let evaluated = self.eval(value);
                self.record_base_name(name);
                self.sigma.bind(name.clone(), evaluated);
                Ok(())
            }
            AssignTarget::Index { base, key } => {
                let Expr::Var(base_name) = base else {
                    return Err(Error::MalformedAst(format!(
                        "indexed assignment base must be a variable, got {}",
                        base
                    )));
                };
                let key = self.eval(key);
                let new_value = self.eval(value);
                let current = self
                    .resolve_var(base_name)
                    .cloned()
                    .unwrap_or_else(|| Expr::var(base_name.clone()));
                let updated = self.eval_put(current, key, new_value);
                self.record_base_name(base_name);
                self.sigma.bind(base_name.clone(), updated);
                Ok(())
            }
        }
    }

    /// Executes a ready backend API statement through the factory and
    /// binds the result. Failures are confined to this statement: they
    /// are logged and execution continues.
    fn execute_api_assign(&mut self, target: &str, api: &str, args: &[Expr]) -> Result<(), Error> {
        let concrete_args: Vec<Expr> = args.iter().map(|a| self.eval(a)).collect();

        let Some(factory) = self.factory else {
            debug!("No function factory configured, skipping {}", api);
            self.api_log.push(ApiOutcome {
                name: api.to_string(),
                status: None,
                error: Some("no function factory configured".to_string()),
            });
            return Ok(());
        };

        let Some(mut call) = factory.get_function(api, &concrete_args) else {
            warn!("Function not provided by factory: {}", api);
            self.api_log.push(ApiOutcome {
                name: api.to_string(),
                status: None,
                error: Some("function not provided by factory".to_string()),
            });
            return Ok(());
        };

        match call.execute() {
            Ok(result) => {
                let status = match &result {
                    Expr::Num(code) => Some(*code),
                    _ => None,
                };
                debug!("API {} executed, status {:?}", api, status);
                self.api_log.push(ApiOutcome {
                    name: api.to_string(),
                    status,
                    error: None,
                });
                self.record_base_name(target);
                self.sigma.bind(target.to_string(), result);
            }
            Err(err) => {
                warn!("API {} failed: {}", api, err);
                self.api_log.push(ApiOutcome {
                    name: api.to_string(),
                    status: None,
                    error: Some(err.to_string()),
                });
            }
        }
        Ok(())
    }

    fn bind_input(&mut self, name: String) {
        let sym = self.fresh_sym_var();
        let Expr::SymVar(id) = sym else { unreachable!() };
        debug!("Input variable {} bound to symbolic unknown X{}", name, id);
        self.record_base_name(&name);
        self.inputs.push((name.clone(), id));
        self.sigma.bind(name, Expr::SymVar(id));
    }

    /// Suffixed names (`email7`) register their base (`email`) so
    /// spec-level expressions written against the base resolve to the
    /// latest suffixed binding.
    fn record_base_name(&mut self, name: &str) {
        let base = base_name(name);
        if base != name {
            self.base_names
                .insert(base.to_string(), name.to_string());
        }
    }
}

/// Strips a trailing digit suffix: `email7` → `email`.
pub fn base_name(name: &str) -> &str {
    name.trim_end_matches(|c: char| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::factory::FnFactory;
    use std::cell::RefCell;
    use std::rc::Rc;
    use testgen_core::Program;

    #[test]
    fn test_api_classification() {
        assert!(is_builtin("Add"));
        assert!(is_builtin("[]"));
        assert!(is_builtin("input"));
        assert!(is_api("login"));
        assert!(is_api("get_U"));
        assert!(is_api("reset"));
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("email7"), "email");
        assert_eq!(base_name("pw10"), "pw");
        assert_eq!(base_name("token"), "token");
    }

    #[test]
    fn test_stops_at_api_with_symbolic_args() {
        let program = Program::new(vec![
            Stmt::input_assign("email0"),
            Stmt::assign("_", Expr::call("login", vec![Expr::var("email0")])),
            Stmt::Assume(Expr::Bool(true)),
        ]);
        let mut engine = SymbolicEngine::new(None);
        let halt = engine.execute(&program).unwrap();
        assert_eq!(halt, Halt::NotReady(1));
        // The assume past the interruption point never runs.
        assert!(engine.path.is_empty());
        assert_eq!(engine.inputs.len(), 1);
    }

    #[test]
    fn test_api_with_concrete_args_executes_and_binds() {
        let factory = FnFactory::new().register("login", |_| Ok(Expr::Num(200)));
        let program = Program::new(vec![
            Stmt::assign("email0", Expr::str("a@b.c")),
            Stmt::assign("_", Expr::call("login", vec![Expr::var("email0")])),
        ]);
        let mut engine = SymbolicEngine::new(Some(&factory));
        let halt = engine.execute(&program).unwrap();
        assert_eq!(halt, Halt::Completed);
        assert_eq!(engine.sigma.get("_"), Some(&Expr::Num(200)));
        assert_eq!(engine.api_log.len(), 1);
        assert_eq!(engine.api_log[0].status, Some(200));
    }

    #[test]
    fn test_api_failure_is_confined_to_its_statement() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&calls);
        let factory = FnFactory::new()
            .register("boom", |_| Err(ApiError::new("connection refused")))
            .with_fallback(move |name, _| {
                log.borrow_mut().push(name.to_string());
                Ok(Expr::Num(200))
            });
        let program = Program::new(vec![
            Stmt::assign("_", Expr::call("boom", Vec::new())),
            Stmt::assign("_", Expr::call("ping", Vec::new())),
        ]);
        let mut engine = SymbolicEngine::new(Some(&factory));
        let halt = engine.execute(&program).unwrap();
        assert_eq!(halt, Halt::Completed);
        assert_eq!(engine.api_log.len(), 2);
        assert_eq!(
            engine.api_log[0].error.as_deref(),
            Some("connection refused")
        );
        assert!(engine.api_log[1].error.is_none());
        assert_eq!(calls.borrow().as_slice(), &["ping".to_string()]);
    }

    #[test]
    fn test_assume_accumulates_path_constraint() {
        let program = Program::new(vec![
            Stmt::input_assign("x0"),
            Stmt::Assume(Expr::binary(BinOp::Gt, Expr::var("x0"), Expr::Num(0))),
            Stmt::Assert(Expr::binary(BinOp::Lt, Expr::var("x0"), Expr::Num(10))),
        ]);
        let mut engine = SymbolicEngine::new(None);
        engine.execute(&program).unwrap();
        assert_eq!(engine.path.len(), 2);
        let pc = engine.compute_path_constraint();
        assert_eq!(pc.to_string(), "(And (> X0 0) (< X0 10))");
    }

    #[test]
    fn test_path_constraint_of_empty_c_is_true() {
        let engine = SymbolicEngine::new(None);
        assert_eq!(engine.compute_path_constraint(), Expr::Bool(true));
    }

    #[test]
    fn test_concretely_false_short_circuit() {
        let program = Program::new(vec![Stmt::Assume(Expr::binary(
            BinOp::Eq,
            Expr::str("a"),
            Expr::str("b"),
        ))]);
        let mut engine = SymbolicEngine::new(None);
        engine.execute(&program).unwrap();
        assert!(engine.has_concretely_false());
    }

    #[test]
    fn test_symvar_ids_survive_pass_resets() {
        let program = Program::new(vec![Stmt::input_assign("x0")]);
        let mut engine = SymbolicEngine::new(None);
        engine.execute(&program).unwrap();
        let first = engine.inputs[0].1;
        engine.execute(&program).unwrap();
        let second = engine.inputs[0].1;
        assert_ne!(first, second);
    }

    #[test]
    fn test_base_name_resolution_in_later_blocks() {
        let program = Program::new(vec![
            Stmt::assign("email1", Expr::str("a@b.c")),
            Stmt::assign("copy", Expr::var("email")),
        ]);
        let mut engine = SymbolicEngine::new(None);
        engine.execute(&program).unwrap();
        assert_eq!(engine.sigma.get("copy"), Some(&Expr::str("a@b.c")));
    }

    #[test]
    fn test_indexed_assignment_updates_map_binding() {
        let program = Program::new(vec![
            Stmt::assign("t", Expr::Map(vec![("a".to_string(), Expr::Num(1))])),
            Stmt::assign_index(Expr::var("t"), Expr::str("b"), Expr::Num(2)),
        ]);
        let mut engine = SymbolicEngine::new(None);
        engine.execute(&program).unwrap();
        assert_eq!(
            engine.sigma.get("t"),
            Some(&Expr::Map(vec![
                ("a".to_string(), Expr::Num(1)),
                ("b".to_string(), Expr::Num(2)),
            ]))
        );
    }
}

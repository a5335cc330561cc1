//! Globals rewriter.
//!
//! Turns the logical ATC into a Test-API ATC: every read of a spec
//! global goes through a hoisted `tmp := get_G()` call and every write
//! ends in `_ := set_G(…)`, so the backend's test endpoints become the
//! single source of truth for global state. A `_ := reset()` call is
//! prefixed so each generated test starts from clean backend state.
//!
//! Globals are detected from their init shape: a name assigned an empty
//! map literal. The init assignments themselves are dropped from the
//! rewritten program.

use crate::error::Error;
use std::collections::{HashMap, HashSet};
use testgen_core::{AssignTarget, Expr, Program, Stmt};
use tracing::debug;

/// Rewrites `program` so no statement mentions a global directly.
/// Idempotent up to temp counter names: a program without empty-map
/// inits has no globals and passes through unchanged.
pub fn rewrite_globals(program: &Program) -> Result<Program, Error> {
    let mut rewriter = RewriteGlobals::detect(program);
    rewriter.run(program)?;
    Ok(Program::new(rewriter.out))
}

struct RewriteGlobals {
    globals: HashSet<String>,
    counters: HashMap<String, u32>,
    out: Vec<Stmt>,
}

impl RewriteGlobals {
    fn detect(program: &Program) -> Self {
        let mut globals = HashSet::new();
        for stmt in &program.stmts {
            if let Some(name) = init_assign_target(stmt) {
                globals.insert(name.to_string());
            }
        }
        debug!("Detected {} globals", globals.len());
        RewriteGlobals {
            globals,
            counters: HashMap::new(),
            out: Vec::new(),
        }
    }

    fn run(&mut self, program: &Program) -> Result<(), Error> {
        if !self.globals.is_empty() {
            self.out
                .push(Stmt::assign("_", Expr::call("reset", Vec::new())));
        }

        for stmt in &program.stmts {
            if init_assign_target(stmt).is_some() {
                continue;
            }
            self.rewrite_stmt(stmt)?;
        }
        Ok(())
    }

    fn fresh_temp(&mut self, global: &str) -> String {
        let counter = self.counters.entry(global.to_string()).or_insert(0);
        let name = format!("tmp_{}_{}", global, counter);
        *counter += 1;
        name
    }

    /// Hoists `tmp := get_G()` and returns the temp name.
    fn hoist_get(&mut self, global: &str, hoisted: &mut Vec<Stmt>) -> String {
        let tmp = self.fresh_temp(global);
        hoisted.push(Stmt::assign(
            tmp.clone(),
            Expr::call(format!("get_{}", global), Vec::new()),
        ));
        tmp
    }

    fn rewrite_stmt(&mut self, stmt: &Stmt) -> Result<(), Error> {
        match stmt {
            Stmt::Assign { target, value } => self.rewrite_assign(target, value),
            Stmt::Assume(cond) => {
                let mut hoisted = Vec::new();
                let cond = self.rewrite_expr(cond, &mut hoisted);
                self.out.extend(hoisted);
                self.out.push(Stmt::Assume(cond));
                Ok(())
            }
            Stmt::Assert(cond) => {
                let mut hoisted = Vec::new();
                let cond = self.rewrite_expr(cond, &mut hoisted);
                self.out.extend(hoisted);
                self.out.push(Stmt::Assert(cond));
                Ok(())
            }
            Stmt::Input(_) | Stmt::Decl { .. } => {
                self.out.push(stmt.clone());
                Ok(())
            }
        }
    }

    fn rewrite_assign(&mut self, target: &AssignTarget, value: &Expr) -> Result<(), Error> {
        match target {
            // G := e  becomes  _ := set_G(e')
            AssignTarget::Var(name) if self.globals.contains(name) => {
                let mut hoisted = Vec::new();
                let value = self.rewrite_expr(value, &mut hoisted);
                self.out.extend(hoisted);
                self.out.push(Stmt::assign(
                    "_",
                    Expr::call(format!("set_{}", name), vec![value]),
                ));
                Ok(())
            }
            // G[k] := v  becomes  tmp := get_G(); tmp[k'] := v'; _ := set_G(tmp)
            AssignTarget::Index { base, key } => {
                if let Expr::Var(name) = base {
                    if self.globals.contains(name) {
                        let global = name.clone();
                        let mut hoisted = Vec::new();
                        let key = self.rewrite_expr(key, &mut hoisted);
                        let value = self.rewrite_expr(value, &mut hoisted);
                        self.out.extend(hoisted);
                        let tmp = self.fresh_temp(&global);
                        self.out.push(Stmt::assign(
                            tmp.clone(),
                            Expr::call(format!("get_{}", global), Vec::new()),
                        ));
                        self.out
                            .push(Stmt::assign_index(Expr::var(tmp.clone()), key, value));
                        self.out.push(Stmt::assign(
                            "_",
                            Expr::call(format!("set_{}", global), vec![Expr::var(tmp)]),
                        ));
                        return Ok(());
                    }
                }
                let mut hoisted = Vec::new();
                let base = self.rewrite_expr(base, &mut hoisted);
                let key = self.rewrite_expr(key, &mut hoisted);
                let value = self.rewrite_expr(value, &mut hoisted);
                self.out.extend(hoisted);
                self.out.push(Stmt::assign_index(base, key, value));
                Ok(())
            }
            AssignTarget::Var(name) => {
                let mut hoisted = Vec::new();
                let value = self.rewrite_expr(value, &mut hoisted);
                self.out.extend(hoisted);
                self.out.push(Stmt::assign(name.clone(), value));
                Ok(())
            }
        }
    }

    /// Rewrites an expression, pushing any required `get_G` hoists onto
    /// `hoisted`. Hoisted statements always precede the statement that
    /// uses the temp.
    fn rewrite_expr(&mut self, expr: &Expr, hoisted: &mut Vec<Stmt>) -> Expr {
        match expr {
            Expr::Var(name) if self.globals.contains(name) => {
                let tmp = self.hoist_get(name, hoisted);
                Expr::Var(tmp)
            }
            Expr::Num(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Var(_) | Expr::SymVar(_) => {
                expr.clone()
            }
            Expr::Call { name, args } if name == "[]" && args.len() == 2 => {
                if let Expr::Var(base) = &args[0] {
                    if self.globals.contains(base) {
                        let tmp = self.hoist_get(base, hoisted);
                        let key = self.rewrite_expr(&args[1], hoisted);
                        return Expr::call("[]", vec![Expr::var(tmp), key]);
                    }
                }
                let base = self.rewrite_expr(&args[0], hoisted);
                let key = self.rewrite_expr(&args[1], hoisted);
                Expr::call("[]", vec![base, key])
            }
            Expr::Call { name, args } if name == "dom" && args.len() == 1 => {
                if let Expr::Var(base) = &args[0] {
                    if self.globals.contains(base) {
                        let tmp = self.hoist_get(base, hoisted);
                        return Expr::call("dom", vec![Expr::var(tmp)]);
                    }
                }
                let arg = self.rewrite_expr(&args[0], hoisted);
                Expr::call("dom", vec![arg])
            }
            Expr::Call { name, args } => {
                let args = args
                    .iter()
                    .map(|a| self.rewrite_expr(a, hoisted))
                    .collect();
                Expr::call(name.clone(), args)
            }
            Expr::Set(elems) => Expr::Set(
                elems
                    .iter()
                    .map(|e| self.rewrite_expr(e, hoisted))
                    .collect(),
            ),
            Expr::Tuple(elems) => Expr::Tuple(
                elems
                    .iter()
                    .map(|e| self.rewrite_expr(e, hoisted))
                    .collect(),
            ),
            Expr::Map(entries) => Expr::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), self.rewrite_expr(v, hoisted)))
                    .collect(),
            ),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.rewrite_expr(lhs, hoisted);
                let rhs = self.rewrite_expr(rhs, hoisted);
                Expr::binary(*op, lhs, rhs)
            }
            Expr::Unary { op, operand } => {
                let operand = self.rewrite_expr(operand, hoisted);
                Expr::unary(*op, operand)
            }
        }
    }
}

/// Returns the target name when `stmt` is an init assignment, i.e. an
/// empty map literal assigned to a plain variable.
fn init_assign_target(stmt: &Stmt) -> Option<&str> {
    match stmt {
        Stmt::Assign {
            target: AssignTarget::Var(name),
            value: Expr::Map(entries),
        } if entries.is_empty() => Some(name),
        _ => None,
    }
}

/// True if any expression in `stmt` still references a name from
/// `globals` as a direct variable.
pub fn mentions_global(stmt: &Stmt, globals: &HashSet<String>) -> bool {
    fn expr_mentions(expr: &Expr, globals: &HashSet<String>) -> bool {
        match expr {
            Expr::Var(name) => globals.contains(name),
            Expr::Num(_) | Expr::Str(_) | Expr::Bool(_) | Expr::SymVar(_) => false,
            Expr::Set(elems) | Expr::Tuple(elems) => {
                elems.iter().any(|e| expr_mentions(e, globals))
            }
            Expr::Map(entries) => entries.iter().any(|(_, v)| expr_mentions(v, globals)),
            Expr::Call { args, .. } => args.iter().any(|a| expr_mentions(a, globals)),
            Expr::Binary { lhs, rhs, .. } => {
                expr_mentions(lhs, globals) || expr_mentions(rhs, globals)
            }
            Expr::Unary { operand, .. } => expr_mentions(operand, globals),
        }
    }

    match stmt {
        Stmt::Assign { target, value } => {
            let target_mentions = match target {
                AssignTarget::Var(name) => globals.contains(name),
                AssignTarget::Index { base, key } => {
                    expr_mentions(base, globals) || expr_mentions(key, globals)
                }
            };
            target_mentions || expr_mentions(value, globals)
        }
        Stmt::Assume(cond) | Stmt::Assert(cond) => expr_mentions(cond, globals),
        Stmt::Input(name) => globals.contains(name),
        Stmt::Decl { name, .. } => globals.contains(name),
    }
}

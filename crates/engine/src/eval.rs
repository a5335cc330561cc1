//! Built-in operation semantics for the symbolic engine.
//!
//! Evaluation is structural: literals pass through, variables resolve
//! through σ (falling back to the base-name map), containers evaluate
//! their components, and built-in applications fold to a value when
//! every needed operand is concrete. Whenever something symbolic
//! remains, evaluation rebuilds a residual with the evaluated children
//! so the SMT encoder sees the most concrete form available.

use crate::see::SymbolicEngine;
use testgen_core::{BinOp, Expr, UnOp};

impl SymbolicEngine<'_> {
    /// Symbolically evaluates `expr` against the current σ.
    pub(crate) fn eval(&mut self, expr: &Expr) -> Expr {
        match expr {
            Expr::Num(_) | Expr::Str(_) | Expr::Bool(_) | Expr::SymVar(_) => expr.clone(),
            Expr::Var(name) => match self.resolve_var(name) {
                Some(value) => value.clone(),
                // Unbound: leave the reference in place, treated as free.
                None => expr.clone(),
            },
            Expr::Set(elems) => Expr::Set(elems.iter().map(|e| self.eval(e)).collect()),
            Expr::Tuple(elems) => Expr::Tuple(elems.iter().map(|e| self.eval(e)).collect()),
            // Map literal keys are names; a key whose name is bound to a
            // concrete literal in σ addresses that literal's entry.
            Expr::Map(entries) => Expr::Map(
                entries
                    .iter()
                    .map(|(k, v)| {
                        let key = match self.resolve_var(k) {
                            Some(Expr::Str(s)) => s.clone(),
                            Some(Expr::Num(n)) => n.to_string(),
                            _ => k.clone(),
                        };
                        (key, self.eval(v))
                    })
                    .collect(),
            ),
            Expr::Call { name, args } => self.eval_call(name, args),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs);
                let rhs = self.eval(rhs);
                fold_binary(*op, lhs, rhs)
            }
            Expr::Unary { op, operand } => {
                let operand = self.eval(operand);
                fold_unary(*op, operand)
            }
        }
    }

    fn eval_call(&mut self, name: &str, args: &[Expr]) -> Expr {
        // input() yields a fresh symbolic unknown.
        if name == "input" && args.is_empty() {
            return self.fresh_sym_var();
        }

        // Prime is identity once it reaches evaluation; the builder has
        // already rewritten postconditions.
        if name == "'" && args.len() == 1 {
            return self.eval(&args[0]);
        }

        let args: Vec<Expr> = args.iter().map(|a| self.eval(a)).collect();

        match (name, args.len()) {
            ("[]" | "lookup" | "get" | "select", 2) => {
                map_lookup(name, &args[0], &args[1])
            }
            ("dom", 1) => {
                if let Expr::Map(entries) = &args[0] {
                    Expr::Set(entries.iter().map(|(k, _)| Expr::str(k.clone())).collect())
                } else {
                    Expr::call("dom", args)
                }
            }
            ("put" | "store" | "update", 3) => {
                let mut args = args;
                let value = args.pop().expect("arity checked");
                let key = args.pop().expect("arity checked");
                let map = args.pop().expect("arity checked");
                self.eval_put(map, key, value)
            }
            ("in" | "member" | "contains", 2) => {
                fold_binary(BinOp::In, args[0].clone(), args[1].clone())
            }
            ("not_in" | "not_member" | "not_contains", 2) => {
                fold_binary(BinOp::NotIn, args[0].clone(), args[1].clone())
            }
            ("contains_key" | "has_key", 2) => {
                if let (Expr::Map(entries), Some(key)) = (&args[0], key_name(&args[1])) {
                    Expr::Bool(entries.iter().any(|(k, _)| *k == key))
                } else {
                    Expr::call(name, args)
                }
            }
            ("union", 2) => eval_union(name, args),
            ("intersection" | "intersect", 2) => {
                if let (Expr::Set(a), Expr::Set(b)) = (&args[0], &args[1]) {
                    if args.iter().all(Expr::is_concrete) {
                        let merged = a
                            .iter()
                            .filter(|e| b.iter().any(|o| exprs_match(e, o)))
                            .cloned()
                            .collect();
                        return Expr::Set(merged);
                    }
                }
                Expr::call(name, args)
            }
            ("difference" | "diff" | "minus" | "\\", 2) => {
                if let (Expr::Set(a), Expr::Set(b)) = (&args[0], &args[1]) {
                    if args.iter().all(Expr::is_concrete) {
                        let kept = a
                            .iter()
                            .filter(|e| !b.iter().any(|o| exprs_match(e, o)))
                            .cloned()
                            .collect();
                        return Expr::Set(kept);
                    }
                }
                Expr::call(name, args)
            }
            ("subset" | "is_subset", 2) => {
                if let (Expr::Set(a), Expr::Set(b)) = (&args[0], &args[1]) {
                    if args.iter().all(Expr::is_concrete) {
                        return Expr::Bool(a.iter().all(|e| b.iter().any(|o| exprs_match(e, o))));
                    }
                }
                Expr::call(name, args)
            }
            ("length", 1) => {
                match &args[0] {
                    Expr::Set(elems) | Expr::Tuple(elems) => return Expr::Num(elems.len() as i64),
                    Expr::Map(entries) => return Expr::Num(entries.len() as i64),
                    Expr::Str(s) => return Expr::Num(s.chars().count() as i64),
                    _ => {}
                }
                Expr::call(name, args)
            }
            ("at" | "nth", 2) => {
                if let (Expr::Tuple(elems), Expr::Num(i)) = (&args[0], &args[1]) {
                    if *i >= 0 && (*i as usize) < elems.len() {
                        return elems[*i as usize].clone();
                    }
                }
                Expr::call(name, args)
            }
            ("Add" | "Sub" | "Mul" | "Div", 2) => fold_arith(name, args),
            ("Eq" | "=" | "==", 2) => fold_binary(BinOp::Eq, args[0].clone(), args[1].clone()),
            ("Neq" | "!=" | "<>", 2) => fold_binary(BinOp::Neq, args[0].clone(), args[1].clone()),
            ("Lt" | "<", 2) => fold_binary(BinOp::Lt, args[0].clone(), args[1].clone()),
            ("Le" | "<=", 2) => fold_binary(BinOp::Le, args[0].clone(), args[1].clone()),
            ("Gt" | ">", 2) => fold_binary(BinOp::Gt, args[0].clone(), args[1].clone()),
            ("Ge" | ">=", 2) => fold_binary(BinOp::Ge, args[0].clone(), args[1].clone()),
            ("And" | "and" | "&&", 2) => fold_binary(BinOp::And, args[0].clone(), args[1].clone()),
            ("Or" | "or" | "||", 2) => fold_binary(BinOp::Or, args[0].clone(), args[1].clone()),
            ("Implies", 2) => fold_binary(BinOp::Implies, args[0].clone(), args[1].clone()),
            ("Not" | "not" | "!", 1) => fold_unary(UnOp::Not, args[0].clone()),
            // Recognized or uninterpreted application: rebuild with the
            // evaluated children.
            _ => Expr::call(name, args),
        }
    }

    /// Functional map update. Reuses an existing key on match, appends
    /// otherwise; symbolic pieces leave a `put` residual.
    pub(crate) fn eval_put(&mut self, map: Expr, key: Expr, value: Expr) -> Expr {
        let key_as_name = match &key {
            Expr::SymVar(id) => Some(format!("_symkey_{}", id)),
            other => key_name(other),
        };
        match (map, key_as_name) {
            (Expr::Map(mut entries), Some(name)) => {
                if let Some(entry) = entries.iter_mut().find(|(k, _)| *k == name) {
                    entry.1 = value;
                } else {
                    entries.push((name, value));
                }
                Expr::Map(entries)
            }
            (map, _) => Expr::call("put", vec![map, key, value]),
        }
    }
}

/// Key coercion for map operations: names, strings with the same
/// spelling, and numbers by value all address the same entry.
fn key_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Var(name) => Some(name.clone()),
        Expr::Str(s) => Some(s.clone()),
        Expr::Num(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Concrete map lookup; missing keys and symbolic operands produce a
/// `[]` residual for the encoder.
fn map_lookup(name: &str, map: &Expr, key: &Expr) -> Expr {
    if let (Expr::Map(entries), Some(wanted)) = (map, key_name(key)) {
        if !key.contains_sym_var() {
            for (entry_key, value) in entries {
                if *entry_key == wanted {
                    return value.clone();
                }
            }
        }
    }
    Expr::call(name, vec![map.clone(), key.clone()])
}

/// Structural identity with the Var ↔ Str spelling coercion used for
/// set membership.
fn exprs_match(a: &Expr, b: &Expr) -> bool {
    if a == b {
        return true;
    }
    matches!(
        (a, b),
        (Expr::Var(x), Expr::Str(s)) | (Expr::Str(s), Expr::Var(x)) if x == s
    )
}

fn membership(elem: &Expr, collection: &Expr) -> Option<bool> {
    match collection {
        Expr::Set(elems) if elem.is_concrete() && collection.is_concrete() => {
            Some(elems.iter().any(|e| exprs_match(e, elem)))
        }
        Expr::Map(entries) if collection.is_concrete() && elem.is_concrete() => {
            let key = key_name(elem)?;
            Some(entries.iter().any(|(k, _)| *k == key))
        }
        _ => None,
    }
}

/// Constant-folds a binary operator, rebuilding a residual when either
/// side stays symbolic.
pub(crate) fn fold_binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    match op {
        BinOp::Eq if lhs.is_concrete() && rhs.is_concrete() => Expr::Bool(lhs == rhs),
        BinOp::Neq if lhs.is_concrete() && rhs.is_concrete() => Expr::Bool(lhs != rhs),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            if let (Expr::Num(a), Expr::Num(b)) = (&lhs, &rhs) {
                let result = match op {
                    BinOp::Lt => a < b,
                    BinOp::Le => a <= b,
                    BinOp::Gt => a > b,
                    BinOp::Ge => a >= b,
                    _ => unreachable!(),
                };
                return Expr::Bool(result);
            }
            Expr::binary(op, lhs, rhs)
        }
        BinOp::And | BinOp::Or | BinOp::Implies => {
            if let (Some(a), Some(b)) = (lhs.as_bool(), rhs.as_bool()) {
                let result = match op {
                    BinOp::And => a && b,
                    BinOp::Or => a || b,
                    BinOp::Implies => !a || b,
                    _ => unreachable!(),
                };
                return Expr::Bool(result);
            }
            Expr::binary(op, lhs, rhs)
        }
        BinOp::In => match membership(&lhs, &rhs) {
            Some(found) => Expr::Bool(found),
            None => Expr::binary(BinOp::In, lhs, rhs),
        },
        BinOp::NotIn => match membership(&lhs, &rhs) {
            Some(found) => Expr::Bool(!found),
            None => Expr::binary(BinOp::NotIn, lhs, rhs),
        },
        _ => Expr::binary(op, lhs, rhs),
    }
}

pub(crate) fn fold_unary(op: UnOp, operand: Expr) -> Expr {
    match op {
        UnOp::Not => match operand.as_bool() {
            Some(b) => Expr::Bool(!b),
            None => Expr::unary(UnOp::Not, operand),
        },
    }
}

fn fold_arith(name: &str, args: Vec<Expr>) -> Expr {
    if let (Expr::Num(a), Expr::Num(b)) = (&args[0], &args[1]) {
        let folded = match name {
            "Add" => Some(a + b),
            "Sub" => Some(a - b),
            "Mul" => Some(a * b),
            "Div" if *b != 0 => Some(a / b),
            _ => None,
        };
        if let Some(n) = folded {
            return Expr::Num(n);
        }
    }
    Expr::call(name, args)
}

/// Merges two concrete collections; map union lets the right side win
/// on key collisions, mirroring functional update.
fn eval_union(name: &str, args: Vec<Expr>) -> Expr {
    if args.iter().all(Expr::is_concrete) {
        if let (Expr::Set(a), Expr::Set(b)) = (&args[0], &args[1]) {
            let mut merged = a.clone();
            for e in b {
                if !merged.iter().any(|o| exprs_match(o, e)) {
                    merged.push(e.clone());
                }
            }
            return Expr::Set(merged);
        }
        if let (Expr::Map(a), Expr::Map(b)) = (&args[0], &args[1]) {
            let mut merged = a.clone();
            for (key, value) in b {
                if let Some(entry) = merged.iter_mut().find(|(k, _)| k == key) {
                    entry.1 = value.clone();
                } else {
                    merged.push((key.clone(), value.clone()));
                }
            }
            return Expr::Map(merged);
        }
    }
    Expr::call(name, args)
}

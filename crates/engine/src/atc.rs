//! Abstract test-case builder.
//!
//! Lowers a spec plus an operation sequence into a straight-line IR
//! program: global inits first, then per block the solver inputs, the
//! pre-state snapshots for primed variables, `assume(pre)`, the API
//! call, and `assert(post)` with primed references flattened away.
//!
//! Each block gets its own namespace by suffixing every free variable
//! with the block position (`email` in block 0 becomes `email0`). The
//! snapshot pattern (`T_old := T`) is what makes relational
//! postconditions like `T' = T ∪ {e ↦ t}` expressible in a flat
//! program: the primed reference becomes the current name and the
//! unprimed one becomes the `_old` copy.

use crate::error::Error;
use std::collections::BTreeSet;
use testgen_core::{ApiBlock, Expr, Program, ScopeId, Spec, Stmt, SymbolTable, TypeEnv, ValueType};

/// Compiles `spec` and a sequence of block names into an abstract test
/// case. Fails only for structural reasons: an unknown block name or a
/// spec call that is not a function application.
pub fn gen_atc(spec: &Spec, sequence: &[String]) -> Result<Program, Error> {
    let mut blocks = Vec::with_capacity(sequence.len());
    for name in sequence {
        match spec.block(name) {
            Some(block) => blocks.push(block),
            None => return Err(Error::BlockNotFound(name.clone())),
        }
    }

    let mut symtab = SymbolTable::new();
    let mut types = TypeEnv::new();
    let mut stmts = Vec::new();

    // Global inits come first; empty-map inits are preserved verbatim
    // because the globals rewriter detects globals from that shape.
    for init in &spec.inits {
        symtab.insert(ScopeId::ROOT, init.name.clone());
        types.insert(ScopeId::ROOT, init.name.clone(), value_type_of(&init.value));
        stmts.push(Stmt::assign(init.name.clone(), init.value.clone()));
    }

    for (position, block) in blocks.iter().enumerate() {
        lower_block(block, position, &mut symtab, &mut types, &mut stmts)?;
    }

    Ok(Program::new(stmts))
}

fn lower_block(
    block: &ApiBlock,
    position: usize,
    symtab: &mut SymbolTable,
    types: &mut TypeEnv,
    stmts: &mut Vec<Stmt>,
) -> Result<(), Error> {
    let suffix = position.to_string();
    // The symbol table and type env stay in lockstep so one ScopeId
    // addresses both.
    let scope = symtab.push_scope(ScopeId::ROOT);
    types.push_scope(ScopeId::ROOT);

    if !matches!(&block.call, Expr::Call { .. }) {
        return Err(Error::MalformedAst(format!(
            "call of block '{}' must be a function application",
            block.name
        )));
    }

    // Free-variable discovery over pre, call and post, in that order.
    // A name already visible from the block scope (a global or an init)
    // is an existing binding, not an input.
    let mut free = Vec::new();
    let mut walk_order = Vec::new();
    if let Some(pre) = &block.pre {
        walk_order.push(pre);
    }
    walk_order.push(&block.call);
    if let Some(post) = &block.response.post {
        walk_order.push(post);
    }
    for expr in walk_order {
        collect_free_vars(expr, symtab, scope, &mut free);
    }

    for name in &free {
        let suffixed = format!("{}{}", name, suffix);
        symtab.insert(scope, suffixed.clone());
        types.insert(scope, suffixed.clone(), ValueType::Str);
        stmts.push(Stmt::input_assign(suffixed));
    }

    let free_set: BTreeSet<&str> = free.iter().map(String::as_str).collect();
    let pre = block
        .pre
        .as_ref()
        .map(|e| rename_free(e, &free_set, &suffix));
    let call = rename_free(&block.call, &free_set, &suffix);
    let post = block
        .response
        .post
        .as_ref()
        .map(|e| rename_free(e, &free_set, &suffix));

    // Snapshot every variable the postcondition primes, in sorted order
    // so re-runs produce identical programs.
    let mut primed = BTreeSet::new();
    if let Some(post) = &post {
        collect_primed(post, &mut primed);
    }
    for name in &primed {
        stmts.push(Stmt::assign(format!("{}_old", name), Expr::var(name.clone())));
    }

    if let Some(pre) = pre {
        stmts.push(Stmt::Assume(pre));
    }

    stmts.push(Stmt::assign("_", call));

    if let Some(post) = post {
        stmts.push(Stmt::Assert(strip_primes(&post, &primed, false)));
    }

    Ok(())
}

fn value_type_of(value: &Expr) -> ValueType {
    match value {
        Expr::Num(_) => ValueType::Num,
        Expr::Str(_) => ValueType::Str,
        Expr::Bool(_) => ValueType::Bool,
        Expr::Set(_) => ValueType::Set,
        Expr::Map(_) => ValueType::Map,
        Expr::Tuple(_) => ValueType::Tuple,
        _ => ValueType::Unknown,
    }
}

/// Collects variable names not visible from `scope`, preserving first
/// occurrence order and collapsing duplicates. Map literal keys are
/// names and participate like variable references.
fn collect_free_vars(
    expr: &Expr,
    symtab: &SymbolTable,
    scope: ScopeId,
    out: &mut Vec<String>,
) {
    match expr {
        Expr::Var(name) => {
            if !symtab.contains(scope, name) && !out.iter().any(|n| n == name) {
                out.push(name.clone());
            }
        }
        Expr::Num(_) | Expr::Str(_) | Expr::Bool(_) | Expr::SymVar(_) => {}
        Expr::Set(elems) | Expr::Tuple(elems) => {
            for e in elems {
                collect_free_vars(e, symtab, scope, out);
            }
        }
        Expr::Map(entries) => {
            for (key, value) in entries {
                if !symtab.contains(scope, key) && !out.iter().any(|n| n == key) {
                    out.push(key.clone());
                }
                collect_free_vars(value, symtab, scope, out);
            }
        }
        Expr::Call { args, .. } => {
            for a in args {
                collect_free_vars(a, symtab, scope, out);
            }
        }
        Expr::Binary { lhs, rhs, .. } => {
            collect_free_vars(lhs, symtab, scope, out);
            collect_free_vars(rhs, symtab, scope, out);
        }
        Expr::Unary { operand, .. } => collect_free_vars(operand, symtab, scope, out),
    }
}

/// Rewrites every occurrence of a free name to its suffixed form.
fn rename_free(expr: &Expr, free: &BTreeSet<&str>, suffix: &str) -> Expr {
    match expr {
        Expr::Var(name) => {
            if free.contains(name.as_str()) {
                Expr::Var(format!("{}{}", name, suffix))
            } else {
                expr.clone()
            }
        }
        Expr::Num(_) | Expr::Str(_) | Expr::Bool(_) | Expr::SymVar(_) => expr.clone(),
        Expr::Set(elems) => Expr::Set(elems.iter().map(|e| rename_free(e, free, suffix)).collect()),
        Expr::Tuple(elems) => {
            Expr::Tuple(elems.iter().map(|e| rename_free(e, free, suffix)).collect())
        }
        Expr::Map(entries) => Expr::Map(
            entries
                .iter()
                .map(|(k, v)| {
                    let key = if free.contains(k.as_str()) {
                        format!("{}{}", k, suffix)
                    } else {
                        k.clone()
                    };
                    (key, rename_free(v, free, suffix))
                })
                .collect(),
        ),
        Expr::Call { name, args } => Expr::call(
            name.clone(),
            args.iter().map(|a| rename_free(a, free, suffix)).collect(),
        ),
        Expr::Binary { op, lhs, rhs } => Expr::binary(
            *op,
            rename_free(lhs, free, suffix),
            rename_free(rhs, free, suffix),
        ),
        Expr::Unary { op, operand } => Expr::unary(*op, rename_free(operand, free, suffix)),
    }
}

/// Collects every variable primed with `'(x)` in a postcondition.
fn collect_primed(expr: &Expr, out: &mut BTreeSet<String>) {
    match expr {
        Expr::Call { name, args } if name == "'" => {
            if let Some(Expr::Var(v)) = args.first() {
                out.insert(v.clone());
            }
        }
        Expr::Call { args, .. } => {
            for a in args {
                collect_primed(a, out);
            }
        }
        Expr::Set(elems) | Expr::Tuple(elems) => {
            for e in elems {
                collect_primed(e, out);
            }
        }
        Expr::Map(entries) => {
            for (_, v) in entries {
                collect_primed(v, out);
            }
        }
        Expr::Binary { lhs, rhs, .. } => {
            collect_primed(lhs, out);
            collect_primed(rhs, out);
        }
        Expr::Unary { operand, .. } => collect_primed(operand, out),
        _ => {}
    }
}

/// Rewrites a postcondition so primed references become the plain
/// current-state name and unprimed references to primed variables
/// become their `_old` snapshot.
fn strip_primes(expr: &Expr, primed: &BTreeSet<String>, under_prime: bool) -> Expr {
    match expr {
        Expr::Var(name) => {
            if !under_prime && primed.contains(name) {
                Expr::Var(format!("{}_old", name))
            } else {
                expr.clone()
            }
        }
        Expr::Num(_) | Expr::Str(_) | Expr::Bool(_) | Expr::SymVar(_) => expr.clone(),
        Expr::Call { name, args } if name == "'" && args.len() == 1 => {
            strip_primes(&args[0], primed, true)
        }
        Expr::Call { name, args } => Expr::call(
            name.clone(),
            args.iter()
                .map(|a| strip_primes(a, primed, under_prime))
                .collect(),
        ),
        Expr::Set(elems) => Expr::Set(
            elems
                .iter()
                .map(|e| strip_primes(e, primed, under_prime))
                .collect(),
        ),
        Expr::Tuple(elems) => Expr::Tuple(
            elems
                .iter()
                .map(|e| strip_primes(e, primed, under_prime))
                .collect(),
        ),
        Expr::Map(entries) => Expr::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), strip_primes(v, primed, under_prime)))
                .collect(),
        ),
        Expr::Binary { op, lhs, rhs } => Expr::binary(
            *op,
            strip_primes(lhs, primed, under_prime),
            strip_primes(rhs, primed, under_prime),
        ),
        Expr::Unary { op, operand } => Expr::unary(*op, strip_primes(operand, primed, under_prime)),
    }
}

//! SMT-LIB encoding of path constraints.
//!
//! Every program variable is a solver string. Each declared global map
//! `G` becomes a pair of arrays, `Dom_G : Array String Bool` for domain
//! membership and `Val_G : Array String String` for values, left
//! unconstrained initially so the solver is free to pick pre-states.
//! Concrete map literals that survive evaluation encode as `store`
//! chains over constant arrays, which is what ties a later block's
//! inputs to the values an earlier block actually wrote.
//!
//! Symbols are handed out in first-use order (`v1, v2, …`); input
//! variables get dedicated symbols whose reverse mapping carries an
//! `in_` tag so the driver can reconstruct concrete input lists from a
//! model in declaration order.
//!
//! Uninterpreted spec predicates (`authenticated`, `cart_contains`, …)
//! are collected while encoding and declared in the prelude: names in
//! boolean position as `(String …) Bool`, names in value position as
//! `(String …) String`.
//!
//! Encoding rule for equality over a map access: always the combined
//! domain-plus-value form `(and (select Dom k) (= (select Val k) v))`.

use crate::error::Error;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use testgen_core::{BinOp, Expr, UnOp};

/// Array pair backing one declared map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapArrays {
    pub domain: String,
    pub value: String,
}

/// Accumulates declarations and named constraints, then renders a
/// self-contained SMT-LIB query.
#[derive(Debug, Default)]
pub struct SmtEncoder {
    symbol_counter: u32,
    variable_symbols: HashMap<String, String>,
    symbol_to_var: HashMap<String, String>,
    symbol_order: Vec<String>,
    /// Symbolic unknowns that stand in for inputs, by id.
    input_sym_vars: HashMap<u32, String>,
    /// Symbols for non-input symbolic unknowns, by id.
    sym_var_symbols: HashMap<u32, String>,
    maps: BTreeMap<String, MapArrays>,
    /// Input variable names in registration (program) order.
    inputs: Vec<String>,
    constraints: Vec<String>,
    bool_funs: BTreeMap<String, usize>,
    str_funs: BTreeMap<String, usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Ctx {
    Bool,
    Str,
}

impl SmtEncoder {
    pub fn new() -> Self {
        SmtEncoder::default()
    }

    /// Declares the array pair for global map `name`.
    pub fn declare_map(&mut self, name: &str) -> &MapArrays {
        self.maps
            .entry(name.to_string())
            .or_insert_with(|| MapArrays {
                domain: format!("Dom_{}", name),
                value: format!("Val_{}", name),
            })
    }

    pub fn is_map(&self, name: &str) -> bool {
        self.maps.contains_key(name)
    }

    /// Registers an input variable and the symbolic unknown standing in
    /// for it. The symbol's reverse mapping is tagged `in_<name>` so
    /// the driver can identify and order input values in a model.
    pub fn register_input(&mut self, name: &str, sym_var: u32) {
        if self.inputs.iter().any(|n| n == name) {
            return;
        }
        self.symbol_counter += 1;
        let symbol = format!("__in_{}_{}", name, self.symbol_counter);
        self.symbol_to_var
            .insert(symbol.clone(), format!("in_{}", name));
        self.variable_symbols.insert(name.to_string(), symbol.clone());
        self.symbol_order.push(symbol.clone());
        self.input_sym_vars.insert(sym_var, symbol);
        self.inputs.push(name.to_string());
    }

    /// Renders `constraint` and appends it under the next `cN` name.
    pub fn add_constraint(&mut self, constraint: &Expr) -> Result<(), Error> {
        let rendered = self.encode(constraint, Ctx::Bool)?;
        self.constraints.push(rendered);
        Ok(())
    }

    /// Inverse symbol table: symbol name to program variable or tag.
    pub fn symbol_to_var(&self) -> &HashMap<String, String> {
        &self.symbol_to_var
    }

    /// `(symbol, plain input name)` pairs in declaration order.
    pub fn input_symbols(&self) -> Vec<(String, String)> {
        self.symbol_order
            .iter()
            .filter_map(|symbol| {
                let tag = self.symbol_to_var.get(symbol)?;
                let name = tag.strip_prefix("in_")?;
                Some((symbol.clone(), name.to_string()))
            })
            .collect()
    }

    fn symbol_for(&mut self, var: &str) -> String {
        if let Some(symbol) = self.variable_symbols.get(var) {
            return symbol.clone();
        }
        self.symbol_counter += 1;
        let symbol = format!("v{}", self.symbol_counter);
        self.variable_symbols.insert(var.to_string(), symbol.clone());
        self.symbol_to_var.insert(symbol.clone(), var.to_string());
        self.symbol_order.push(symbol.clone());
        symbol
    }

    fn symbol_for_sym_var(&mut self, id: u32) -> String {
        if let Some(symbol) = self.input_sym_vars.get(&id) {
            return symbol.clone();
        }
        if let Some(symbol) = self.sym_var_symbols.get(&id) {
            return symbol.clone();
        }
        self.symbol_counter += 1;
        let symbol = format!("v{}", self.symbol_counter);
        self.symbol_to_var.insert(symbol.clone(), format!("X{}", id));
        self.symbol_order.push(symbol.clone());
        self.sym_var_symbols.insert(id, symbol.clone());
        symbol
    }

    // ------------------------------------------------------------------
    // Expression encoding
    // ------------------------------------------------------------------

    fn encode(&mut self, expr: &Expr, ctx: Ctx) -> Result<String, Error> {
        match expr {
            Expr::Bool(b) => Ok(b.to_string()),
            // Legacy boolean encoding in boolean positions only.
            Expr::Num(n) if ctx == Ctx::Bool && (*n == 0 || *n == 1) => {
                Ok(if *n == 1 { "true" } else { "false" }.to_string())
            }
            Expr::Num(n) => Ok(format!("\"{}\"", n)),
            Expr::Str(s) => Ok(format!("\"{}\"", escape_string(s))),
            Expr::Var(name) => self.encode_var(name, ctx),
            Expr::SymVar(id) => {
                let symbol = self.symbol_for_sym_var(*id);
                Ok(match ctx {
                    Ctx::Str => symbol,
                    Ctx::Bool => format!("(= {} \"true\")", symbol),
                })
            }
            Expr::Binary { op, lhs, rhs } => self.encode_binary(*op, lhs, rhs),
            Expr::Unary {
                op: UnOp::Not,
                operand,
            } => Ok(format!("(not {})", self.encode(operand, Ctx::Bool)?)),
            Expr::Call { name, args } => self.encode_call(name, args, ctx),
            // Aggregates have no first-class solver sort; their printed
            // form is at least deterministic.
            Expr::Set(_) | Expr::Tuple(_) | Expr::Map(_) => {
                Ok(format!("\"{}\"", escape_string(&expr.to_string())))
            }
        }
    }

    fn encode_var(&mut self, name: &str, ctx: Ctx) -> Result<String, Error> {
        if name == "true" || name == "false" {
            return Ok(name.to_string());
        }
        if name.starts_with("Val_") || name.starts_with("Dom_") {
            return Ok(sanitize_ident(name));
        }
        if let Some(arrays) = self.arrays_for(name) {
            return Ok(sanitize_ident(&arrays.value));
        }
        let symbol = self.symbol_for(name);
        Ok(match ctx {
            Ctx::Str => symbol,
            Ctx::Bool => format!("(= {} \"true\")", symbol),
        })
    }

    fn encode_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<String, Error> {
        match op {
            BinOp::And | BinOp::Or | BinOp::Implies => {
                let connective = match op {
                    BinOp::And => "and",
                    BinOp::Or => "or",
                    _ => "=>",
                };
                Ok(format!(
                    "({} {} {})",
                    connective,
                    self.encode(lhs, Ctx::Bool)?,
                    self.encode(rhs, Ctx::Bool)?
                ))
            }
            BinOp::Eq => self.encode_equality(lhs, rhs),
            BinOp::Neq => Ok(format!("(not {})", self.encode_equality(lhs, rhs)?)),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let cmp = match op {
                    BinOp::Lt => "<",
                    BinOp::Le => "<=",
                    BinOp::Gt => ">",
                    _ => ">=",
                };
                Ok(format!(
                    "({} {} {})",
                    cmp,
                    self.encode_int(lhs)?,
                    self.encode_int(rhs)?
                ))
            }
            BinOp::In => self.encode_membership(lhs, rhs),
            BinOp::NotIn => Ok(format!("(not {})", self.encode_membership(lhs, rhs)?)),
        }
    }

    /// Numeric comparison operand: literal numbers stay numeric,
    /// everything else converts from its string symbol.
    fn encode_int(&mut self, expr: &Expr) -> Result<String, Error> {
        match expr {
            Expr::Num(n) => Ok(n.to_string()),
            other => Ok(format!("(str.to_int {})", self.encode(other, Ctx::Str)?)),
        }
    }

    /// Equality, with the combined domain-plus-value rule whenever one
    /// side is an access into a known map.
    fn encode_equality(&mut self, lhs: &Expr, rhs: &Expr) -> Result<String, Error> {
        if let Some(rendered) = self.try_map_access_equality(lhs, rhs)? {
            return Ok(rendered);
        }
        if let Some(rendered) = self.try_map_access_equality(rhs, lhs)? {
            return Ok(rendered);
        }
        Ok(format!(
            "(= {} {})",
            self.encode(lhs, Ctx::Str)?,
            self.encode(rhs, Ctx::Str)?
        ))
    }

    fn try_map_access_equality(
        &mut self,
        access: &Expr,
        value: &Expr,
    ) -> Result<Option<String>, Error> {
        let Expr::Call { name, args } = access else {
            return Ok(None);
        };
        if !matches!(name.as_str(), "[]" | "lookup" | "get" | "select") || args.len() != 2 {
            return Ok(None);
        }
        let Some((domain, map_value)) = self.encode_arrays(&args[0])? else {
            return Ok(None);
        };
        let key = self.encode(&args[1], Ctx::Str)?;
        Ok(Some(format!(
            "(and (select {} {}) (= (select {} {}) {}))",
            domain,
            key,
            map_value,
            key,
            self.encode(value, Ctx::Str)?
        )))
    }

    fn encode_membership(&mut self, elem: &Expr, collection: &Expr) -> Result<String, Error> {
        let elem_rendered = self.encode(elem, Ctx::Str)?;

        // in(k, dom(M)) and in(k, M) both mean domain membership.
        let target = match collection {
            Expr::Call { name, args } if name == "dom" && args.len() == 1 => &args[0],
            other => other,
        };

        if let Some((domain, _)) = self.encode_arrays(target)? {
            return Ok(format!("(select {} {})", domain, elem_rendered));
        }

        if let Expr::Set(elems) = target {
            if elems.is_empty() {
                return Ok("false".to_string());
            }
            let mut parts = Vec::with_capacity(elems.len());
            for e in elems {
                parts.push(format!("(= {} {})", elem_rendered, self.encode(e, Ctx::Str)?));
            }
            if parts.len() == 1 {
                return Ok(parts.pop().expect("one element"));
            }
            return Ok(format!("(or {})", parts.join(" ")));
        }

        // Last resort: the uninterpreted membership predicate from the
        // prelude.
        let rendered = self.encode(target, Ctx::Str)?;
        Ok(format!("(in {} {})", elem_rendered, rendered))
    }

    fn encode_call(&mut self, name: &str, args: &[Expr], ctx: Ctx) -> Result<String, Error> {
        match (name, args.len()) {
            ("'", 1) => self.encode(&args[0], ctx),
            ("[]" | "lookup" | "get" | "select", 2) => {
                if let Some((_, value)) = self.encode_arrays(&args[0])? {
                    let key = self.encode(&args[1], Ctx::Str)?;
                    return Ok(format!("(select {} {})", value, key));
                }
                let base = self.encode(&args[0], Ctx::Str)?;
                let key = self.encode(&args[1], Ctx::Str)?;
                Ok(format!("(select {} {})", base, key))
            }
            ("dom", 1) => {
                if let Some((domain, _)) = self.encode_arrays(&args[0])? {
                    return Ok(domain);
                }
                let base = self.encode(&args[0], Ctx::Str)?;
                Ok(format!("(dom {})", base))
            }
            ("in" | "member" | "contains", 2) => self.encode_membership(&args[0], &args[1]),
            ("not_in" | "not_member" | "not_contains", 2) => Ok(format!(
                "(not {})",
                self.encode_membership(&args[0], &args[1])?
            )),
            ("Eq" | "=" | "==", 2) => self.encode_equality(&args[0], &args[1]),
            ("Neq" | "!=" | "<>", 2) => {
                Ok(format!("(not {})", self.encode_equality(&args[0], &args[1])?))
            }
            ("And" | "and" | "&&", 2) => Ok(format!(
                "(and {} {})",
                self.encode(&args[0], Ctx::Bool)?,
                self.encode(&args[1], Ctx::Bool)?
            )),
            ("Or" | "or" | "||", 2) => Ok(format!(
                "(or {} {})",
                self.encode(&args[0], Ctx::Bool)?,
                self.encode(&args[1], Ctx::Bool)?
            )),
            ("Not" | "not" | "!", 1) => {
                Ok(format!("(not {})", self.encode(&args[0], Ctx::Bool)?))
            }
            ("Implies", 2) => Ok(format!(
                "(=> {} {})",
                self.encode(&args[0], Ctx::Bool)?,
                self.encode(&args[1], Ctx::Bool)?
            )),
            ("Lt" | "<", 2) => Ok(format!(
                "(< {} {})",
                self.encode_int(&args[0])?,
                self.encode_int(&args[1])?
            )),
            ("Le" | "<=", 2) => Ok(format!(
                "(<= {} {})",
                self.encode_int(&args[0])?,
                self.encode_int(&args[1])?
            )),
            ("Gt" | ">", 2) => Ok(format!(
                "(> {} {})",
                self.encode_int(&args[0])?,
                self.encode_int(&args[1])?
            )),
            ("Ge" | ">=", 2) => Ok(format!(
                "(>= {} {})",
                self.encode_int(&args[0])?,
                self.encode_int(&args[1])?
            )),
            ("input", 0) => {
                self.symbol_counter += 1;
                let symbol = format!("__fresh_input_{}", self.symbol_counter);
                self.symbol_to_var.insert(symbol.clone(), "input".to_string());
                self.symbol_order.push(symbol.clone());
                Ok(symbol)
            }
            // Uninterpreted application; declared in the prelude with a
            // signature matching the position it was used in.
            _ => {
                let mut rendered = Vec::with_capacity(args.len());
                for a in args {
                    rendered.push(self.encode(a, Ctx::Str)?);
                }
                match ctx {
                    Ctx::Bool => {
                        self.bool_funs.insert(name.to_string(), args.len());
                    }
                    Ctx::Str => {
                        self.str_funs.insert(name.to_string(), args.len());
                    }
                }
                if rendered.is_empty() {
                    Ok(format!("({})", sanitize_ident(name)))
                } else {
                    Ok(format!("({} {})", sanitize_ident(name), rendered.join(" ")))
                }
            }
        }
    }

    /// Resolves an expression to a `(domain, value)` array pair when it
    /// denotes a map the solver can reason about: a declared global, an
    /// `_old` snapshot or a rewriter temp of one, or a concrete map
    /// literal rendered as store chains.
    fn encode_arrays(&mut self, expr: &Expr) -> Result<Option<(String, String)>, Error> {
        match expr {
            Expr::Var(name) => Ok(self
                .arrays_for(name)
                .map(|a| (sanitize_ident(&a.domain), sanitize_ident(&a.value)))),
            Expr::Map(entries) => {
                let mut domain = "((as const (Array String Bool)) false)".to_string();
                let mut value = "((as const (Array String String)) \"\")".to_string();
                for (key, entry_value) in entries {
                    let key = format!("\"{}\"", escape_string(key));
                    let rendered = self.encode(entry_value, Ctx::Str)?;
                    domain = format!("(store {} {} true)", domain, key);
                    value = format!("(store {} {} {})", value, key, rendered);
                }
                Ok(Some((domain, value)))
            }
            Expr::Call { name, args } if name == "'" && args.len() == 1 => {
                self.encode_arrays(&args[0])
            }
            _ => Ok(None),
        }
    }

    /// Array pair for a variable that names a map: the global itself,
    /// `G_old`, or a `tmp_G_<n>` temp introduced by the globals
    /// rewriter.
    fn arrays_for(&mut self, name: &str) -> Option<MapArrays> {
        if let Some(arrays) = self.maps.get(name) {
            return Some(arrays.clone());
        }
        if let Some(base) = name.strip_suffix("_old") {
            if self.maps.contains_key(base) {
                return Some(self.declare_map(name).clone());
            }
        }
        if let Some(rest) = name.strip_prefix("tmp_") {
            if let Some((base, counter)) = rest.rsplit_once('_') {
                if counter.chars().all(|c| c.is_ascii_digit()) && self.maps.contains_key(base) {
                    return self.maps.get(base).cloned();
                }
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // Query rendering
    // ------------------------------------------------------------------

    /// Renders the whole query. With `include_footer`, `(check-sat)`
    /// and `(get-model)` close the file.
    pub fn generate(&self, include_footer: bool) -> Result<String, Error> {
        let mut smt = String::new();

        writeln!(smt, "(set-logic ALL)")?;
        writeln!(smt, "(set-option :produce-models true)")?;
        writeln!(smt)?;

        writeln!(smt, ";; helper / uninterpreted declarations")?;
        writeln!(smt, "(declare-fun in (String (Array String Bool)) Bool)")?;
        writeln!(smt, "(declare-fun add_to_set (String String) Bool)")?;
        writeln!(smt, "(declare-fun not_empty (String) Bool)")?;
        for (name, arity) in &self.bool_funs {
            writeln!(
                smt,
                "(declare-fun {} ({}) Bool)",
                sanitize_ident(name),
                vec!["String"; *arity].join(" ")
            )?;
        }
        for (name, arity) in &self.str_funs {
            writeln!(
                smt,
                "(declare-fun {} ({}) String)",
                sanitize_ident(name),
                vec!["String"; *arity].join(" ")
            )?;
        }
        writeln!(smt)?;

        writeln!(smt, ";; Variable declarations (String type)")?;
        for symbol in &self.symbol_order {
            writeln!(smt, "(declare-fun {} () String)", symbol)?;
        }
        if !self.symbol_order.is_empty() {
            writeln!(smt)?;
        }

        writeln!(smt, ";; Map declarations (Array String String/Bool)")?;
        for (name, arrays) in &self.maps {
            writeln!(smt, "; Map: {}", name)?;
            writeln!(smt, "(declare-const {} (Array String Bool))", arrays.domain)?;
            writeln!(smt, "(declare-const {} (Array String String))", arrays.value)?;
            writeln!(smt)?;
        }
        writeln!(smt, ";; Domain arrays left unconstrained initially")?;
        writeln!(smt)?;

        if !self.inputs.is_empty() {
            writeln!(smt, ";; Input variable constraints (non-empty)")?;
            for name in &self.inputs {
                if let Some(symbol) = self.variable_symbols.get(name) {
                    writeln!(
                        smt,
                        "(assert (> (str.len {}) 0))  ; {} must be non-empty",
                        symbol, name
                    )?;
                }
            }
            writeln!(smt)?;
        }

        for (index, constraint) in self.constraints.iter().enumerate() {
            writeln!(smt, "(assert (! {} :named c{}))", constraint, index + 1)?;
        }

        if include_footer {
            writeln!(smt)?;
            writeln!(smt, "(check-sat)")?;
            writeln!(smt, "(get-model)")?;
        }

        Ok(smt)
    }
}

/// Quotes identifiers that would not survive as bare SMT symbols.
fn sanitize_ident(name: &str) -> String {
    let bare = name
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if bare {
        name.to_string()
    } else {
        let escaped = name.replace('|', "\\|");
        format!("|{}|", escaped)
    }
}

fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

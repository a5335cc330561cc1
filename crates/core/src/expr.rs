//! Expression IR
//!
//! Expressions are a tagged enum with exclusive ownership of children:
//! no interning, no shared subtrees. `Clone` is the deep clone the rest
//! of the pipeline relies on, and `Display` is the canonical, total
//! pretty-printer (a cloned expression always prints identically to its
//! source).
//!
//! Booleans are normalized at construction time: `Expr::Bool` is the
//! canonical truth value. Legacy programs may still carry `Num(0)` /
//! `Num(1)` in boolean positions, so readers of boolean *contexts* go
//! through [`Expr::as_bool`], which accepts both.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
//                                 OPERATORS
// ============================================================================

/// Binary operators that survive symbolic evaluation as residuals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Implies,
    In,
    NotIn,
}

impl BinOp {
    /// Printed name, matching the canonical program dump format.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Eq => "=",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "And",
            BinOp::Or => "Or",
            BinOp::Implies => "Implies",
            BinOp::In => "In",
            BinOp::NotIn => "NotIn",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    Not,
}

impl UnOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnOp::Not => "Not",
        }
    }
}

// ============================================================================
//                                EXPRESSIONS
// ============================================================================

/// The fundamental value type of the IR.
///
/// Map keys are plain names: a symbolic key materializes as a
/// `_symkey_<n>` name when stored, so every entry stays printable and
/// comparable by identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Integer literal.
    Num(i64),
    /// String literal.
    Str(String),
    /// Boolean literal (canonical truth value).
    Bool(bool),
    /// Program variable reference.
    Var(String),
    /// Symbolic unknown with a globally unique id.
    SymVar(u32),
    /// Unordered multiset; element order is kept only for printing.
    Set(Vec<Expr>),
    /// Finite ordered map from key names to values.
    Map(Vec<(String, Expr)>),
    /// Fixed-arity tuple.
    Tuple(Vec<Expr>),
    /// Built-in or uninterpreted application; the name carries no meaning
    /// here, interpretation happens in the engine and the SMT encoder.
    Call { name: String, args: Vec<Expr> },
    /// Binary operator residual.
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Unary operator residual.
    Unary { op: UnOp, operand: Box<Expr> },
}

impl Expr {
    /// Variable reference.
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    /// String literal.
    pub fn str(value: impl Into<String>) -> Self {
        Expr::Str(value.into())
    }

    /// Function application.
    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    /// Binary operator node.
    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Unary operator node.
    pub fn unary(op: UnOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// Primed (post-state) reference to `name`, written `'(name)` in
    /// postconditions.
    pub fn primed(name: impl Into<String>) -> Self {
        Expr::call("'", vec![Expr::var(name)])
    }

    /// Empty map literal; assigning this to a name at program start marks
    /// the name as a global.
    pub fn empty_map() -> Self {
        Expr::Map(Vec::new())
    }

    /// True for `Num`, `Str` and `Bool`.
    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Num(_) | Expr::Str(_) | Expr::Bool(_))
    }

    /// Structurally concrete: a literal, or a `Set`/`Map`/`Tuple` whose
    /// components are all concrete. Variables and symbolic residuals are
    /// never concrete; binding state lives in the engine's store.
    pub fn is_concrete(&self) -> bool {
        match self {
            Expr::Num(_) | Expr::Str(_) | Expr::Bool(_) => true,
            Expr::Set(elems) | Expr::Tuple(elems) => elems.iter().all(Expr::is_concrete),
            Expr::Map(entries) => entries.iter().all(|(_, v)| v.is_concrete()),
            _ => false,
        }
    }

    /// Whether any `SymVar` is reachable in this tree.
    pub fn contains_sym_var(&self) -> bool {
        match self {
            Expr::SymVar(_) => true,
            Expr::Num(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Var(_) => false,
            Expr::Set(elems) | Expr::Tuple(elems) => elems.iter().any(Expr::contains_sym_var),
            Expr::Map(entries) => entries.iter().any(|(_, v)| v.contains_sym_var()),
            Expr::Call { args, .. } => args.iter().any(Expr::contains_sym_var),
            Expr::Binary { lhs, rhs, .. } => lhs.contains_sym_var() || rhs.contains_sym_var(),
            Expr::Unary { operand, .. } => operand.contains_sym_var(),
        }
    }

    /// Reads this expression in a boolean context. Accepts the canonical
    /// `Bool` as well as the legacy `Num(0)`/`Num(1)` encoding.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Expr::Bool(b) => Some(*b),
            Expr::Num(0) => Some(false),
            Expr::Num(1) => Some(true),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(n) => write!(f, "{}", n),
            Expr::Str(s) => write!(f, "\"{}\"", s),
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Var(name) => write!(f, "{}", name),
            Expr::SymVar(id) => write!(f, "X{}", id),
            Expr::Set(elems) => {
                write!(f, "{{")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "}}")
            }
            Expr::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} -> {}", k, v)?;
                }
                write!(f, "}}")
            }
            Expr::Tuple(elems) => {
                write!(f, "(")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
            Expr::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            Expr::Binary { op, lhs, rhs } => {
                write!(f, "({} {} {})", op.symbol(), lhs, rhs)
            }
            Expr::Unary { op, operand } => write!(f, "({} {})", op.symbol(), operand),
        }
    }
}

// ============================================================================
//                          SYMBOLIC VARIABLE IDS
// ============================================================================

/// Allocator for symbolic variable ids.
///
/// One allocator is threaded through a pipeline invocation; ids increase
/// monotonically and are never reused, even across symbolic-execution
/// passes of the fixed-point driver.
#[derive(Debug, Default)]
pub struct SymVarGen {
    next: u32,
}

impl SymVarGen {
    pub fn new() -> Self {
        SymVarGen::default()
    }

    /// Returns a fresh `Expr::SymVar` with a never-before-seen id.
    pub fn fresh(&mut self) -> Expr {
        let id = self.next;
        self.next += 1;
        Expr::SymVar(id)
    }

    /// Number of ids handed out so far.
    pub fn allocated(&self) -> u32 {
        self.next
    }
}

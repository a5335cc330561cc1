//! Statement IR and straight-line programs.

use crate::expr::Expr;
use crate::types::ValueType;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
//                                STATEMENTS
// ============================================================================

/// Left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssignTarget {
    /// Plain variable target: `x := e`.
    Var(String),
    /// Indexed map target: `base[key] := e`.
    Index { base: Expr, key: Expr },
}

impl fmt::Display for AssignTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignTarget::Var(name) => write!(f, "{}", name),
            AssignTarget::Index { base, key } => write!(f, "{}[{}]", base, key),
        }
    }
}

/// A single straight-line statement. There is no control flow: programs
/// execute top to bottom and stop at the first statement the symbolic
/// engine deems not ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Assign { target: AssignTarget, value: Expr },
    Assume(Expr),
    Assert(Expr),
    /// Declares a free variable the solver must choose a value for.
    Input(String),
    /// Introduces a name bound to a fresh symbolic unknown.
    Decl { name: String, ty: ValueType },
}

impl Stmt {
    /// `target := value` with a plain variable target.
    pub fn assign(name: impl Into<String>, value: Expr) -> Self {
        Stmt::Assign {
            target: AssignTarget::Var(name.into()),
            value,
        }
    }

    /// `base[key] := value`.
    pub fn assign_index(base: Expr, key: Expr, value: Expr) -> Self {
        Stmt::Assign {
            target: AssignTarget::Index { base, key },
            value,
        }
    }

    /// `name := input()`, the assignment form an abstract test case uses
    /// for solver-chosen inputs.
    pub fn input_assign(name: impl Into<String>) -> Self {
        Stmt::assign(name, Expr::call("input", Vec::new()))
    }

    /// Whether this statement still waits for a concrete input value:
    /// either the dedicated `Input` form or an `x := input()` assignment.
    pub fn is_input(&self) -> bool {
        match self {
            Stmt::Input(_) => true,
            Stmt::Assign {
                target: AssignTarget::Var(_),
                value: Expr::Call { name, args },
            } => name == "input" && args.is_empty(),
            _ => false,
        }
    }

    /// The variable an input statement binds, if this is one.
    pub fn input_var(&self) -> Option<&str> {
        match self {
            Stmt::Input(name) => Some(name),
            Stmt::Assign {
                target: AssignTarget::Var(name),
                value: Expr::Call { name: f, args },
            } if f == "input" && args.is_empty() => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Assign { target, value } => write!(f, "{} := {}", target, value),
            Stmt::Assume(cond) => write!(f, "assume({})", cond),
            Stmt::Assert(cond) => write!(f, "assert({})", cond),
            Stmt::Input(name) => write!(f, "input({})", name),
            Stmt::Decl { name, ty } => write!(f, "decl {} : {}", name, ty),
        }
    }
}

// ============================================================================
//                                 PROGRAMS
// ============================================================================

/// An ordered, straight-line sequence of statements.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

impl Program {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Program { stmts }
    }

    /// An abstract test case still contains input statements; a concrete
    /// one has had every input replaced by a literal.
    pub fn is_abstract(&self) -> bool {
        self.stmts.iter().any(Stmt::is_input)
    }

    /// Names of the remaining input variables, in program order.
    pub fn input_vars(&self) -> Vec<&str> {
        self.stmts.iter().filter_map(Stmt::input_var).collect()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.stmts {
            writeln!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_detection() {
        let s = Stmt::input_assign("email0");
        assert!(s.is_input());
        assert_eq!(s.input_var(), Some("email0"));

        let s = Stmt::Input("pw1".to_string());
        assert!(s.is_input());
        assert_eq!(s.input_var(), Some("pw1"));

        let s = Stmt::assign("x", Expr::call("input", vec![Expr::Num(1)]));
        assert!(!s.is_input());
    }

    #[test]
    fn test_program_display() {
        let p = Program::new(vec![
            Stmt::assign("U", Expr::empty_map()),
            Stmt::input_assign("email0"),
            Stmt::Assume(Expr::Bool(true)),
            Stmt::assign_index(Expr::var("tmp_U_0"), Expr::var("email0"), Expr::var("pw0")),
        ]);
        let text = p.to_string();
        assert_eq!(
            text,
            "U := {}\nemail0 := input()\nassume(true)\ntmp_U_0[email0] := pw0\n"
        );
        assert!(p.is_abstract());
        assert_eq!(p.input_vars(), vec!["email0"]);
    }
}

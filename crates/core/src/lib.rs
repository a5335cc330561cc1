//! Core IR for API test synthesis
//!
//! Provides the straight-line intermediate representation shared by the
//! whole pipeline: expressions, statements, programs, nested name/type
//! scopes, and the declarative service specification they are compiled
//! from. The engine crate lowers specs into programs over this IR,
//! interprets them symbolically, and encodes them for an SMT solver.

pub mod expr;
pub mod spec;
pub mod stmt;
pub mod symtab;
pub mod types;

pub use expr::{BinOp, Expr, SymVarGen, UnOp};
pub use spec::{ApiBlock, Init, Response, Spec};
pub use stmt::{AssignTarget, Program, Stmt};
pub use symtab::{ScopeId, SymbolTable, TypeEnv};
pub use types::ValueType;

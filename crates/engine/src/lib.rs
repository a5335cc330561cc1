//! Abstract-to-concrete API test-case pipeline.
//!
//! The pipeline takes a declarative service spec plus a test string (a
//! sequence of operation names) and derives a fully concrete program
//! that drives a real backend through that sequence:
//!
//! 1. [`atc::gen_atc`] lowers the spec and sequence into an abstract
//!    test case over the straight-line IR.
//! 2. [`rewrite::rewrite_globals`] redirects global state through
//!    backend test APIs (`reset`, `get_G`, `set_G`).
//! 3. [`see::SymbolicEngine`] interprets the program, accumulating the
//!    path constraint and executing backend calls once their arguments
//!    are concrete.
//! 4. [`smt::SmtEncoder`] and [`solver::Solver`] turn the path
//!    constraint into an SMT-LIB query and a model.
//! 5. [`driver::gen_ctc`] closes the loop until the program is
//!    concrete, infeasible, or stalls.
//!
//! [`driver::generate_concrete_test_case`] is the front door; it never
//! fails, reporting all outcomes through [`driver::TestReport`].

pub mod atc;
pub mod driver;
pub mod error;
pub mod eval;
pub mod factory;
pub mod rewrite;
pub mod see;
pub mod sigma;
pub mod smt;
pub mod solver;

pub use atc::gen_atc;
pub use driver::{
    generate_concrete_test_case, gen_ctc, is_sequence_truly_unsat, CtcOutcome, DeferredIdRule,
    DriverConfig, PlaceholderState, RealismFn, TestReport,
};
pub use error::{ApiError, Error};
pub use factory::{ApiFunction, FnFactory, FunctionFactory};
pub use rewrite::rewrite_globals;
pub use see::{ApiOutcome, Halt, SymbolicEngine};
pub use sigma::Sigma;
pub use smt::SmtEncoder;
pub use solver::{Solver, SolverRun, Verdict};

//! Concrete test-case driver.
//!
//! `gen_ctc` runs the bounded fixed-point: rewrite the abstract program
//! with the current input list, execute it symbolically, hand the path
//! constraint to the solver, read the model back, and build the next
//! input list from the `in_`-tagged symbols in declaration order. The
//! loop ends when the program is fully concrete, the path is proven
//! infeasible, or no progress is being made.
//!
//! Some inputs cannot be chosen by the solver at all: backend-generated
//! identifiers that only exist after an earlier API has run. Those are
//! covered by deferred-identity rules: the driver plants a placeholder
//! value, then a resolution pass swaps in the real id once σ holds a
//! non-empty view of the owning global (newest rewriter temp first).
//! A placeholder that never resolves becomes a named fallback literal
//! in the final program.

use crate::atc::gen_atc;
use crate::error::Error;
use crate::factory::FunctionFactory;
use crate::rewrite::rewrite_globals;
use crate::see::{base_name, ApiOutcome, SymbolicEngine};
use crate::sigma::Sigma;
use crate::smt::SmtEncoder;
use crate::solver::{parse_model, Solver, Verdict};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use testgen_core::{AssignTarget, Expr, Program, Spec, Stmt};
use tracing::{debug, info, warn};

/// Optional value-realism hook: maps a variable name and the solver's
/// short value to a domain-plausible one. Applied between model
/// parsing and binding; the engine itself never consults name tables.
pub type RealismFn = Box<dyn Fn(&str, &str) -> String>;

// ============================================================================
//                          DEFERRED IDENTITIES
// ============================================================================

/// Ties an input base name to the global whose entries carry the ids
/// the backend generates for it (`restaurantId` → `R`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredIdRule {
    pub base: String,
    pub global: String,
}

/// Lifecycle of one planted placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceholderState {
    /// No id available yet; keep the placeholder for a later pass.
    Pending,
    /// A real backend id was found in σ.
    Resolved(String),
    /// The run ended without an id; the named fallback goes into the
    /// final program.
    Fallback(String),
}

impl DeferredIdRule {
    pub fn new(base: impl Into<String>, global: impl Into<String>) -> Self {
        DeferredIdRule {
            base: base.into(),
            global: global.into(),
        }
    }

    /// Placeholder literal planted until the id exists, e.g.
    /// `__NEEDS_RESTAURANT_ID__`.
    pub fn placeholder(&self) -> String {
        format!("__NEEDS_{}__", camel_to_snake(&self.base).to_uppercase())
    }

    /// Fallback literal for ids that never materialized, e.g.
    /// `no_restaurant_available`.
    pub fn fallback(&self) -> String {
        let snake = camel_to_snake(&self.base);
        let stem = snake.strip_suffix("_id").unwrap_or(&snake);
        format!("no_{}_available", stem)
    }

    /// Looks for the id in σ: the first key of the newest non-empty
    /// map bound to a rewriter temp of this rule's global.
    pub fn resolve(&self, sigma: &Sigma) -> PlaceholderState {
        match sigma.latest_map_key(&self.global) {
            Some(id) => PlaceholderState::Resolved(id),
            None => PlaceholderState::Pending,
        }
    }
}

fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if !out.is_empty() {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

// ============================================================================
//                              CONFIGURATION
// ============================================================================

/// Driver limits and hooks, builder style.
pub struct DriverConfig {
    /// Upper bound on fixed-point iterations.
    pub max_iterations: u32,
    pub solver: Solver,
    pub deferred_ids: Vec<DeferredIdRule>,
    pub realism: Option<RealismFn>,
}

impl DriverConfig {
    pub fn new() -> Self {
        DriverConfig {
            max_iterations: 50,
            solver: Solver::default(),
            deferred_ids: Vec::new(),
            realism: None,
        }
    }

    pub fn with_max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_solver(mut self, solver: Solver) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_deferred_id(mut self, rule: DeferredIdRule) -> Self {
        self.deferred_ids.push(rule);
        self
    }

    pub fn with_realism(mut self, hook: RealismFn) -> Self {
        self.realism = Some(hook);
        self
    }

    fn apply_realism(&self, var: &str, value: &str) -> String {
        match &self.realism {
            Some(hook) => hook(var, value),
            None => value.to_string(),
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig::new()
    }
}

// ============================================================================
//                                 REPORT
// ============================================================================

/// Result record of one generation run. The pipeline entry point never
/// fails; structural and solver problems surface here.
#[derive(Debug, Clone, Serialize, Default)]
pub struct TestReport {
    pub program: Program,
    pub satisfiable: bool,
    /// The fixed point made no progress and returned its latest
    /// achievable program.
    pub stalled: bool,
    /// Input variable name to final literal value.
    pub concrete_values: BTreeMap<String, String>,
    pub smt_content: String,
    pub solver_output: String,
    pub error_message: Option<String>,
    pub warnings: Vec<String>,
    pub api_log: Vec<ApiOutcome>,
}

/// Outcome of the fixed-point loop.
#[derive(Debug, Clone, PartialEq)]
pub enum CtcOutcome {
    /// Natural fixpoint: fully concrete, or no further refinement is
    /// possible.
    Finished(Program),
    /// The path is proven infeasible.
    Unsat,
    /// No progress between iterations, or the iteration cap was hit;
    /// carries the latest achievable program.
    Stalled(Program),
}

// ============================================================================
//                            DEPENDENCY PRE-CHECK
// ============================================================================

/// Static feasibility check over the declared `produces`/`requires`
/// lists: a sequence that needs a state no earlier operation produces
/// is infeasible before any solving.
pub fn is_sequence_truly_unsat(spec: &Spec, sequence: &[String]) -> bool {
    let mut available: HashSet<&str> = HashSet::new();
    for op in sequence {
        let Some(block) = spec.block(op) else {
            continue;
        };
        for required in &block.requires {
            if !available.contains(required.as_str()) {
                info!(
                    "Operation '{}' requires state '{}' but no prior operation produces it; sequence is truly unsat",
                    op, required
                );
                return true;
            }
        }
        for produced in &block.produces {
            available.insert(produced);
        }
    }
    false
}

// ============================================================================
//                               REWRITE ATC
// ============================================================================

/// Replaces input statements with literal assignments, consuming
/// `values` front to back. With an empty list this is a deep clone.
/// Digit-only values (with an optional sign) materialize as numbers.
pub fn rewrite_atc(program: &Program, values: &mut VecDeque<String>) -> Program {
    let mut stmts = Vec::with_capacity(program.stmts.len());
    for stmt in &program.stmts {
        match stmt.input_var() {
            Some(name) if !values.is_empty() => {
                let value = values.pop_front().expect("checked non-empty");
                stmts.push(Stmt::assign(name, materialize(&value)));
            }
            _ => stmts.push(stmt.clone()),
        }
    }
    Program::new(stmts)
}

fn materialize(value: &str) -> Expr {
    let numeric = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || c == '-');
    if numeric {
        if let Ok(n) = value.parse::<i64>() {
            return Expr::Num(n);
        }
    }
    Expr::str(value)
}

/// Whether any input assignment still carries a deferred-identity
/// placeholder literal.
pub fn has_placeholders(program: &Program) -> bool {
    program.stmts.iter().any(|stmt| {
        matches!(
            stmt,
            Stmt::Assign {
                target: AssignTarget::Var(_),
                value: Expr::Str(s),
            } if s.starts_with("__NEEDS_")
        )
    })
}

/// Swaps resolved ids (and, on the final pass, fallbacks) into
/// placeholder assignments.
fn resolve_placeholders(
    program: &mut Program,
    sigma: &Sigma,
    rules: &[DeferredIdRule],
    final_pass: bool,
) {
    for stmt in &mut program.stmts {
        let Stmt::Assign {
            target: AssignTarget::Var(name),
            value,
        } = stmt
        else {
            continue;
        };
        let Expr::Str(current) = &*value else { continue };
        let Some(rule) = rules.iter().find(|r| r.placeholder() == *current) else {
            continue;
        };
        match rule.resolve(sigma) {
            PlaceholderState::Resolved(id) => {
                info!("Deferred id for {} resolved from sigma: {}", name, id);
                *value = Expr::str(id);
            }
            PlaceholderState::Pending if final_pass => {
                let fallback = rule.fallback();
                warn!("Deferred id for {} never resolved, using {}", name, fallback);
                *value = Expr::str(fallback);
            }
            _ => {}
        }
    }
}

// ============================================================================
//                              PIPELINE ENTRY
// ============================================================================

/// Runs the whole pipeline for one operation sequence and reports the
/// result. Never returns an error: structural failures, solver
/// unavailability and infeasibility all land in the report.
pub fn generate_concrete_test_case(
    spec: &Spec,
    sequence: &[String],
    config: &DriverConfig,
    factory: Option<&dyn FunctionFactory>,
) -> TestReport {
    let mut report = TestReport::default();

    let atc = match gen_atc(spec, sequence) {
        Ok(program) => program,
        Err(e) => {
            report.error_message = Some(e.to_string());
            return report;
        }
    };
    let test_api = match rewrite_globals(&atc) {
        Ok(program) => program,
        Err(e) => {
            report.program = atc;
            report.error_message = Some(e.to_string());
            return report;
        }
    };

    // Static dependency pre-check: some sequences are infeasible
    // without consulting the solver at all.
    if is_sequence_truly_unsat(spec, sequence) {
        report.program = test_api;
        report.error_message = Some(
            "sequence requires state that no earlier operation produces".to_string(),
        );
        return report;
    }

    let original_inputs: Vec<String> = test_api
        .input_vars()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut engine = SymbolicEngine::new(factory);
    let outcome = match gen_ctc(
        spec,
        config,
        &mut engine,
        &test_api,
        Vec::new(),
        sequence,
        &original_inputs,
        &mut report,
    ) {
        Ok(outcome) => outcome,
        Err(e) => {
            report.program = test_api;
            report.error_message = Some(e.to_string());
            return report;
        }
    };

    let mut final_program = match outcome {
        CtcOutcome::Unsat => {
            report.program = test_api;
            report.satisfiable = false;
            report.error_message = Some("test string is infeasible (solver says unsat)".to_string());
            return report;
        }
        CtcOutcome::Stalled(program) => {
            report.stalled = true;
            report
                .warnings
                .push("fixed point made no progress; returning latest program".to_string());
            program
        }
        CtcOutcome::Finished(program) => program,
    };

    // Final symbolic pass over the final program: unresolved
    // placeholders become fallbacks, and the resulting SMT/model pair
    // is what the report carries.
    if let Err(e) = run_final_pass(
        spec,
        config,
        &mut engine,
        &mut final_program,
        &original_inputs,
        &mut report,
    ) {
        report.error_message = Some(e.to_string());
    }
    report.program = final_program;
    report.api_log = engine.api_log.clone();
    report
}

fn run_final_pass(
    spec: &Spec,
    config: &DriverConfig,
    engine: &mut SymbolicEngine<'_>,
    program: &mut Program,
    original_inputs: &[String],
    report: &mut TestReport,
) -> Result<(), Error> {
    engine.execute(program)?;
    resolve_placeholders(program, &engine.sigma, &config.deferred_ids, true);

    let mut encoder = SmtEncoder::new();
    for global in spec.globals() {
        encoder.declare_map(global);
    }
    for (var, id) in engine.inputs.clone() {
        encoder.register_input(&var, id);
    }
    for constraint in engine.path.clone() {
        encoder.add_constraint(&constraint)?;
    }
    let smt = encoder.generate(true)?;
    report.smt_content = smt.clone();

    let run = config.solver.solve(&smt)?;
    report.solver_output = run.raw.clone();
    match run.verdict {
        Verdict::Sat => {
            report.satisfiable = true;
            collect_concrete_values(program, original_inputs, report);
        }
        Verdict::Unsat => {
            report.satisfiable = false;
            report.error_message = Some("final constraints are unsatisfiable".to_string());
        }
        Verdict::Unknown => {
            report.satisfiable = false;
            report.error_message = Some(format!("unexpected solver output: {}", run.raw.trim()));
        }
    }
    Ok(())
}

/// Reads the final literal of every original input variable out of the
/// concrete program.
fn collect_concrete_values(program: &Program, inputs: &[String], report: &mut TestReport) {
    for stmt in &program.stmts {
        let Stmt::Assign {
            target: AssignTarget::Var(name),
            value,
        } = stmt
        else {
            continue;
        };
        if !inputs.iter().any(|i| i == name) {
            continue;
        }
        let rendered = match value {
            Expr::Str(s) => s.clone(),
            Expr::Num(n) => n.to_string(),
            _ => continue,
        };
        report.concrete_values.insert(name.clone(), rendered);
    }
}

// ============================================================================
//                             FIXED-POINT LOOP
// ============================================================================

/// The fixed-point loop. `initial_values` seeds the first rewrite;
/// progress is measured by the next input list differing from the
/// current one, and the iteration cap guards against oscillation.
#[allow(clippy::too_many_arguments)]
pub fn gen_ctc(
    spec: &Spec,
    config: &DriverConfig,
    engine: &mut SymbolicEngine<'_>,
    program: &Program,
    initial_values: Vec<String>,
    sequence: &[String],
    original_inputs: &[String],
    report: &mut TestReport,
) -> Result<CtcOutcome, Error> {
    let mut current = program.clone();
    let mut values = initial_values;

    for iteration in 0..config.max_iterations {
        debug!("gen_ctc iteration {}, {} input value(s)", iteration, values.len());

        let mut queue: VecDeque<String> = values.iter().cloned().collect();
        let mut rewritten = rewrite_atc(&current, &mut queue);
        if !queue.is_empty() {
            warn!("Discarding {} leftover input value(s)", queue.len());
        }

        engine.execute(&rewritten)?;
        resolve_placeholders(&mut rewritten, &engine.sigma, &config.deferred_ids, false);

        // A concretely false element of C means this path cannot be
        // satisfied as-is. The dependency pre-check decides whether it
        // is hopeless; otherwise the solver gets the final word.
        if engine.has_concretely_false() && is_sequence_truly_unsat(spec, sequence) {
            return Ok(CtcOutcome::Unsat);
        }

        if !rewritten.is_abstract() && !has_placeholders(&rewritten) {
            debug!("Program fully concrete after iteration {}", iteration);
            return Ok(CtcOutcome::Finished(rewritten));
        }

        let mut encoder = SmtEncoder::new();
        for global in spec.globals() {
            encoder.declare_map(global);
        }
        for (var, id) in engine.inputs.clone() {
            encoder.register_input(&var, id);
        }
        for constraint in engine.path.clone() {
            encoder.add_constraint(&constraint)?;
        }
        let smt = encoder.generate(true)?;
        report.smt_content = smt.clone();

        let run = config.solver.solve(&smt)?;
        report.solver_output = run.raw.clone();
        if run.verdict == Verdict::Unsat {
            return Ok(CtcOutcome::Unsat);
        }

        let model = parse_model(&run.raw);
        if model.is_empty() {
            debug!("Solver returned no model; no further refinement possible");
            return Ok(CtcOutcome::Finished(rewritten));
        }

        // Bind model values back into σ so deferred-id scans and the
        // report see them under their program variable names.
        for (symbol, value) in &model {
            let tag = encoder
                .symbol_to_var()
                .get(symbol)
                .cloned()
                .unwrap_or_else(|| symbol.clone());
            let plain = tag.strip_prefix("in_").unwrap_or(&tag).to_string();
            let adjusted = config.apply_realism(&plain, value);
            engine.sigma.bind(plain, materialize(&adjusted));
        }

        let next = next_input_values(
            config,
            engine,
            &encoder,
            &model,
            &rewritten,
            original_inputs,
        );
        debug!("Constructed next input list with {} value(s)", next.len());

        if next.is_empty() {
            return Ok(CtcOutcome::Finished(rewritten));
        }
        // An identical value list still counts as progress when this
        // iteration materialized inputs (the same values now aim at
        // later blocks). Only unchanged values over an unchanged
        // program is a true stall.
        if next == values && rewritten == current {
            warn!("No progress in input values");
            return Ok(CtcOutcome::Stalled(rewritten));
        }

        current = rewritten;
        values = next;
    }

    warn!(
        "Reached iteration cap ({}), returning current program",
        config.max_iterations
    );
    Ok(CtcOutcome::Stalled(current))
}

/// Builds the next input list: `in_`-tagged symbols in declaration
/// order, with deferred-identity rules overriding the solver's choice
/// and concrete values already fixed for a base name being reused.
fn next_input_values(
    config: &DriverConfig,
    engine: &SymbolicEngine<'_>,
    encoder: &SmtEncoder,
    model: &BTreeMap<String, String>,
    rewritten: &Program,
    original_inputs: &[String],
) -> Vec<String> {
    // Values already materialized for earlier blocks, by base name.
    let mut by_base: HashMap<String, String> = HashMap::new();
    for stmt in &rewritten.stmts {
        let Stmt::Assign {
            target: AssignTarget::Var(name),
            value,
        } = stmt
        else {
            continue;
        };
        if !original_inputs.iter().any(|i| i == name) {
            continue;
        }
        let rendered = match value {
            Expr::Str(s) if !s.starts_with("__NEEDS_") => s.clone(),
            Expr::Num(n) => n.to_string(),
            _ => continue,
        };
        by_base.entry(base_name(name).to_string()).or_insert(rendered);
    }

    let mut next = Vec::new();
    for (symbol, var) in encoder.input_symbols() {
        let base = base_name(&var);

        if let Some(rule) = config.deferred_ids.iter().find(|r| r.base == base) {
            let value = match rule.resolve(&engine.sigma) {
                PlaceholderState::Resolved(id) => id,
                _ => rule.placeholder(),
            };
            next.push(value);
            continue;
        }

        if let Some(existing) = by_base.get(base) {
            next.push(existing.clone());
            continue;
        }

        if let Some(value) = model.get(&symbol) {
            let adjusted = config.apply_realism(&var, value);
            by_base.insert(base.to_string(), adjusted.clone());
            next.push(adjusted);
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use testgen_core::{ApiBlock, Init, Response};

    #[test]
    fn test_camel_to_snake_and_placeholder_names() {
        let rule = DeferredIdRule::new("restaurantId", "R");
        assert_eq!(rule.placeholder(), "__NEEDS_RESTAURANT_ID__");
        assert_eq!(rule.fallback(), "no_restaurant_available");

        let rule = DeferredIdRule::new("bookCode", "B");
        assert_eq!(rule.placeholder(), "__NEEDS_BOOK_CODE__");
        assert_eq!(rule.fallback(), "no_book_code_available");
    }

    #[test]
    fn test_placeholder_state_machine() {
        let rule = DeferredIdRule::new("orderId", "O");
        let mut sigma = Sigma::new();
        assert_eq!(rule.resolve(&sigma), PlaceholderState::Pending);
        sigma.bind(
            "tmp_O_0",
            Expr::Map(vec![("ord-9".to_string(), Expr::Num(1))]),
        );
        assert_eq!(
            rule.resolve(&sigma),
            PlaceholderState::Resolved("ord-9".to_string())
        );
    }

    #[test]
    fn test_rewrite_atc_consumes_front_to_back() {
        let program = Program::new(vec![
            Stmt::input_assign("email0"),
            Stmt::Assume(Expr::Bool(true)),
            Stmt::input_assign("qty0"),
        ]);
        let mut values: VecDeque<String> = vec!["a@b.c".to_string(), "2".to_string()]
            .into_iter()
            .collect();
        let rewritten = rewrite_atc(&program, &mut values);
        assert!(values.is_empty());
        assert_eq!(rewritten.stmts[0], Stmt::assign("email0", Expr::str("a@b.c")));
        // Digit-only strings materialize as numbers.
        assert_eq!(rewritten.stmts[2], Stmt::assign("qty0", Expr::Num(2)));
        assert!(!rewritten.is_abstract());
    }

    #[test]
    fn test_rewrite_atc_with_empty_list_is_identity() {
        let program = Program::new(vec![
            Stmt::input_assign("x0"),
            Stmt::Assert(Expr::Bool(true)),
        ]);
        let mut values = VecDeque::new();
        assert_eq!(rewrite_atc(&program, &mut values), program);
    }

    #[test]
    fn test_insufficient_values_leave_inputs_in_place() {
        let program = Program::new(vec![
            Stmt::input_assign("a0"),
            Stmt::input_assign("b0"),
        ]);
        let mut values: VecDeque<String> = vec!["x".to_string()].into_iter().collect();
        let rewritten = rewrite_atc(&program, &mut values);
        assert!(!rewritten.stmts[0].is_input());
        assert!(rewritten.stmts[1].is_input());
    }

    #[test]
    fn test_placeholder_detection_and_resolution() {
        let rules = vec![DeferredIdRule::new("restaurantId", "R")];
        let mut program = Program::new(vec![Stmt::assign(
            "restaurantId1",
            Expr::str("__NEEDS_RESTAURANT_ID__"),
        )]);
        assert!(has_placeholders(&program));

        let mut sigma = Sigma::new();
        resolve_placeholders(&mut program, &sigma, &rules, false);
        assert!(has_placeholders(&program), "pending placeholder must survive");

        sigma.bind(
            "tmp_R_1",
            Expr::Map(vec![("r-42".to_string(), Expr::str("Diner"))]),
        );
        resolve_placeholders(&mut program, &sigma, &rules, false);
        assert_eq!(
            program.stmts[0],
            Stmt::assign("restaurantId1", Expr::str("r-42"))
        );
        assert!(!has_placeholders(&program));
    }

    #[test]
    fn test_unresolved_placeholder_falls_back_on_final_pass() {
        let rules = vec![DeferredIdRule::new("orderId", "O")];
        let mut program = Program::new(vec![Stmt::assign(
            "orderId2",
            Expr::str("__NEEDS_ORDER_ID__"),
        )]);
        resolve_placeholders(&mut program, &Sigma::new(), &rules, true);
        assert_eq!(
            program.stmts[0],
            Stmt::assign("orderId2", Expr::str("no_order_available"))
        );
    }

    fn spec_with_dependencies() -> Spec {
        let block = |name: &str, produces: Vec<&str>, requires: Vec<&str>| ApiBlock {
            name: name.to_string(),
            pre: None,
            call: Expr::call(name, Vec::new()),
            response: Response {
                code: 200,
                post: None,
            },
            produces: produces.into_iter().map(str::to_string).collect(),
            requires: requires.into_iter().map(str::to_string).collect(),
        };
        Spec {
            name: "shop".to_string(),
            inits: vec![Init {
                name: "U".to_string(),
                value: Expr::empty_map(),
            }],
            blocks: vec![
                block("register", vec!["U"], vec![]),
                block("login", vec!["T"], vec!["U"]),
                block("order", vec!["O"], vec!["T", "C"]),
            ],
        }
    }

    #[test]
    fn test_dependency_pre_check() {
        let spec = spec_with_dependencies();
        let seq = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert!(is_sequence_truly_unsat(&spec, &seq(&["login"])));
        assert!(!is_sequence_truly_unsat(&spec, &seq(&["register", "login"])));
        // Order requires C which nothing produces.
        assert!(is_sequence_truly_unsat(
            &spec,
            &seq(&["register", "login", "order"])
        ));
        assert!(!is_sequence_truly_unsat(&spec, &seq(&[])));
    }

    #[test]
    fn test_truly_unsat_sequence_never_reaches_the_solver() {
        let spec = spec_with_dependencies();
        // A solver binary that cannot exist: reaching it would turn the
        // report into a SolverUnavailable error instead.
        let config = DriverConfig::new().with_solver(Solver::new("/nonexistent/solver"));
        let report =
            generate_concrete_test_case(&spec, &["login".to_string()], &config, None);
        assert!(!report.satisfiable);
        assert!(report
            .error_message
            .as_deref()
            .unwrap()
            .contains("no earlier operation produces"));
        assert!(report.solver_output.is_empty());
    }

    #[test]
    fn test_reexecution_yields_identical_smt() {
        use testgen_core::BinOp;

        fn pass_smt(engine: &mut SymbolicEngine<'_>, program: &Program) -> String {
            engine.execute(program).unwrap();
            let mut encoder = SmtEncoder::new();
            encoder.declare_map("U");
            for (var, id) in engine.inputs.clone() {
                encoder.register_input(&var, id);
            }
            for constraint in engine.path.clone() {
                encoder.add_constraint(&constraint).unwrap();
            }
            encoder.generate(true).unwrap()
        }

        let program = Program::new(vec![
            Stmt::input_assign("email0"),
            Stmt::Assume(Expr::binary(
                BinOp::NotIn,
                Expr::var("email0"),
                Expr::call("dom", vec![Expr::var("tmp_U_0")]),
            )),
        ]);
        let mut engine = SymbolicEngine::new(None);
        let first = pass_smt(&mut engine, &program);
        // Symbolic ids advance between passes, but encoder symbols are
        // allocated fresh per pass, so the query text is stable.
        let second = pass_smt(&mut engine, &program);
        assert_eq!(first, second);
    }

    #[test]
    fn test_report_serializes_to_json() {
        let report = TestReport::default();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"satisfiable\":false"));
        assert!(json.contains("\"concrete_values\""));
    }

    #[test]
    fn test_unknown_block_surfaces_in_report() {
        let spec = spec_with_dependencies();
        let config = DriverConfig::new().with_solver(Solver::new("/nonexistent/solver"));
        let report =
            generate_concrete_test_case(&spec, &["checkout".to_string()], &config, None);
        assert!(!report.satisfiable);
        assert_eq!(
            report.error_message.as_deref(),
            Some("block not found: checkout")
        );
    }
}

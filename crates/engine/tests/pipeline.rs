//! End-to-end pipeline scenarios against an in-process fake backend
//! and a scripted stand-in for the SMT solver.
//!
//! The fake solver is a tiny shell script: it answers `unsat` whenever
//! the query asserts a literal `false` (the engine already folded the
//! path to a contradiction), and otherwise answers `sat` with the
//! model `"A"` for every input symbol it finds in the query. That is
//! enough to drive the fixed point exactly the way a real solver
//! would for these specs.

#![cfg(unix)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::rc::Rc;

use testgen_core::{ApiBlock, BinOp, Expr, Init, Response, Spec};
use testgen_engine::{
    generate_concrete_test_case, ApiError, DeferredIdRule, DriverConfig, FnFactory, Solver,
};

fn fake_solver(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("fake-solver");
    let mut f = fs::File::create(&path).unwrap();
    writeln!(f, "#!/bin/sh").unwrap();
    writeln!(f, "file=\"$2\"").unwrap();
    writeln!(
        f,
        "if grep -q '(assert (! false' \"$file\"; then echo unsat; exit 0; fi"
    )
    .unwrap();
    writeln!(f, "echo sat").unwrap();
    writeln!(f, "echo '('").unwrap();
    writeln!(
        f,
        "grep -o '__in_[A-Za-z0-9_]*' \"$file\" | sort -u | while read sym; do"
    )
    .unwrap();
    writeln!(
        f,
        "  printf '(define-fun %s () String \"A\")\\n' \"$sym\""
    )
    .unwrap();
    writeln!(f, "done").unwrap();
    writeln!(f, "echo ')'").unwrap();
    drop(f);
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

type State = Rc<RefCell<HashMap<String, Vec<(String, Expr)>>>>;

fn expr_text(e: &Expr) -> String {
    match e {
        Expr::Str(s) => s.clone(),
        Expr::Num(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Backend fake for the auth spec: `register` populates U, `login`
/// checks it and populates T, and the rewriter's test APIs read and
/// reset the shared state.
fn auth_backend() -> (State, FnFactory) {
    let state: State = Rc::new(RefCell::new(HashMap::new()));

    let s = Rc::clone(&state);
    let factory = FnFactory::new()
        .register("reset", move |_| {
            s.borrow_mut().clear();
            Ok(Expr::Num(200))
        })
        .register("register", {
            let s = Rc::clone(&state);
            move |args| {
                let email = expr_text(&args[0]);
                let pw = args[1].clone();
                s.borrow_mut()
                    .entry("U".to_string())
                    .or_default()
                    .push((email, pw));
                Ok(Expr::Num(201))
            }
        })
        .register("login", {
            let s = Rc::clone(&state);
            move |args| {
                let email = expr_text(&args[0]);
                let pw = args[1].clone();
                let ok = s
                    .borrow()
                    .get("U")
                    .is_some_and(|u| u.iter().any(|(k, v)| *k == email && *v == pw));
                if ok {
                    s.borrow_mut()
                        .entry("T".to_string())
                        .or_default()
                        .push((email, Expr::str("tok-1")));
                    Ok(Expr::Num(200))
                } else {
                    Ok(Expr::Num(401))
                }
            }
        })
        .with_fallback({
            let s = Rc::clone(&state);
            move |name, args| {
                if let Some(global) = name.strip_prefix("get_") {
                    let entries = s.borrow().get(global).cloned().unwrap_or_default();
                    return Ok(Expr::Map(entries));
                }
                if let Some(global) = name.strip_prefix("set_") {
                    if let Some(Expr::Map(entries)) = args.first() {
                        s.borrow_mut().insert(global.to_string(), entries.clone());
                    }
                    return Ok(Expr::Num(200));
                }
                Err(ApiError::new(format!("unknown operation: {}", name)))
            }
        });

    (state, factory)
}

fn auth_spec() -> Spec {
    Spec {
        name: "auth".to_string(),
        inits: vec![
            Init {
                name: "U".to_string(),
                value: Expr::empty_map(),
            },
            Init {
                name: "T".to_string(),
                value: Expr::empty_map(),
            },
        ],
        blocks: vec![
            ApiBlock {
                name: "register".to_string(),
                pre: Some(Expr::binary(
                    BinOp::NotIn,
                    Expr::var("email"),
                    Expr::call("dom", vec![Expr::var("U")]),
                )),
                call: Expr::call("register", vec![Expr::var("email"), Expr::var("pw")]),
                response: Response {
                    code: 201,
                    post: Some(Expr::binary(
                        BinOp::Eq,
                        Expr::primed("U"),
                        Expr::call(
                            "union",
                            vec![
                                Expr::var("U"),
                                Expr::Map(vec![("email".to_string(), Expr::var("pw"))]),
                            ],
                        ),
                    )),
                },
                produces: vec!["U".to_string()],
                requires: vec![],
            },
            ApiBlock {
                name: "login".to_string(),
                pre: Some(Expr::binary(
                    BinOp::Eq,
                    Expr::call("[]", vec![Expr::var("U"), Expr::var("email")]),
                    Expr::var("pw"),
                )),
                call: Expr::call("login", vec![Expr::var("email"), Expr::var("pw")]),
                response: Response {
                    code: 200,
                    post: None,
                },
                produces: vec!["T".to_string()],
                requires: vec!["U".to_string()],
            },
        ],
    }
}

#[test]
fn test_register_then_login_is_satisfiable_with_shared_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let config = DriverConfig::new().with_solver(Solver::new(fake_solver(&dir).to_str().unwrap()));
    let (_state, factory) = auth_backend();

    let report = generate_concrete_test_case(
        &auth_spec(),
        &["register".to_string(), "login".to_string()],
        &config,
        Some(&factory),
    );

    assert!(report.error_message.is_none(), "{:?}", report.error_message);
    assert!(report.satisfiable);
    assert!(!report.program.is_abstract());

    // Both blocks exercise the same credentials.
    assert_eq!(
        report.concrete_values["email0"],
        report.concrete_values["email1"]
    );
    assert_eq!(report.concrete_values["pw0"], report.concrete_values["pw1"]);

    // The backend was actually driven through the sequence.
    let register = report.api_log.iter().find(|o| o.name == "register").unwrap();
    assert_eq!(register.status, Some(201));
    let login = report.api_log.iter().find(|o| o.name == "login").unwrap();
    assert_eq!(login.status, Some(200));

    assert!(report.smt_content.starts_with("(set-logic ALL)"));
}

#[test]
fn test_login_without_register_is_truly_unsat_before_solving() {
    // A nonexistent solver proves the pre-check short-circuits.
    let config = DriverConfig::new().with_solver(Solver::new("/nonexistent/solver"));
    let (_state, factory) = auth_backend();

    let report = generate_concrete_test_case(
        &auth_spec(),
        &["login".to_string()],
        &config,
        Some(&factory),
    );

    assert!(!report.satisfiable);
    assert!(report
        .error_message
        .as_deref()
        .unwrap()
        .contains("no earlier operation produces"));
    assert!(report.solver_output.is_empty());
}

#[test]
fn test_double_register_of_same_user_is_unsatisfiable() {
    let dir = tempfile::tempdir().unwrap();
    let config = DriverConfig::new().with_solver(Solver::new(fake_solver(&dir).to_str().unwrap()));
    let (_state, factory) = auth_backend();

    let report = generate_concrete_test_case(
        &auth_spec(),
        &["register".to_string(), "register".to_string()],
        &config,
        Some(&factory),
    );

    // The first register adds the email to U; the second block's
    // precondition (email ∉ dom(U)) then folds to false.
    assert!(!report.satisfiable);
    assert!(report
        .error_message
        .as_deref()
        .unwrap()
        .contains("unsatisfiable"));
}

fn restaurant_spec() -> Spec {
    Spec {
        name: "restaurant".to_string(),
        inits: vec![Init {
            name: "R".to_string(),
            value: Expr::empty_map(),
        }],
        blocks: vec![
            ApiBlock {
                name: "createRestaurant".to_string(),
                pre: None,
                call: Expr::call("createRestaurant", vec![Expr::var("restaurantName")]),
                response: Response {
                    code: 201,
                    post: None,
                },
                produces: vec!["R".to_string()],
                requires: vec![],
            },
            ApiBlock {
                name: "viewMenu".to_string(),
                pre: Some(Expr::binary(
                    BinOp::In,
                    Expr::var("restaurantId"),
                    Expr::call("dom", vec![Expr::var("R")]),
                )),
                call: Expr::call("viewMenu", vec![Expr::var("restaurantId")]),
                response: Response {
                    code: 200,
                    post: None,
                },
                produces: vec![],
                requires: vec!["R".to_string()],
            },
        ],
    }
}

fn restaurant_backend() -> (State, FnFactory) {
    let state: State = Rc::new(RefCell::new(HashMap::new()));

    let factory = FnFactory::new()
        .register("reset", {
            let s = Rc::clone(&state);
            move |_| {
                s.borrow_mut().clear();
                Ok(Expr::Num(200))
            }
        })
        .register("createRestaurant", {
            let s = Rc::clone(&state);
            move |args| {
                s.borrow_mut()
                    .entry("R".to_string())
                    .or_default()
                    .push(("r-1".to_string(), args[0].clone()));
                Ok(Expr::Num(201))
            }
        })
        .register("viewMenu", {
            let s = Rc::clone(&state);
            move |args| {
                let id = expr_text(&args[0]);
                let known = s
                    .borrow()
                    .get("R")
                    .is_some_and(|r| r.iter().any(|(k, _)| *k == id));
                Ok(Expr::Num(if known { 200 } else { 404 }))
            }
        })
        .with_fallback({
            let s = Rc::clone(&state);
            move |name, args| {
                if let Some(global) = name.strip_prefix("get_") {
                    let entries = s.borrow().get(global).cloned().unwrap_or_default();
                    return Ok(Expr::Map(entries));
                }
                if let Some(global) = name.strip_prefix("set_") {
                    if let Some(Expr::Map(entries)) = args.first() {
                        s.borrow_mut().insert(global.to_string(), entries.clone());
                    }
                    return Ok(Expr::Num(200));
                }
                Err(ApiError::new(format!("unknown operation: {}", name)))
            }
        });

    (state, factory)
}

#[test]
fn test_deferred_restaurant_id_resolves_to_backend_id() {
    let dir = tempfile::tempdir().unwrap();
    let config = DriverConfig::new()
        .with_solver(Solver::new(fake_solver(&dir).to_str().unwrap()))
        .with_deferred_id(DeferredIdRule::new("restaurantId", "R"));
    let (_state, factory) = restaurant_backend();

    let report = generate_concrete_test_case(
        &restaurant_spec(),
        &["createRestaurant".to_string(), "viewMenu".to_string()],
        &config,
        Some(&factory),
    );

    assert!(report.satisfiable, "{:?}", report.error_message);
    // The id in the final program is the one the backend generated,
    // not a solver-chosen string.
    assert_eq!(report.concrete_values["restaurantId1"], "r-1");
    let view = report.api_log.iter().find(|o| o.name == "viewMenu").unwrap();
    assert_eq!(view.status, Some(200));
}

#[test]
fn test_unresolvable_deferred_id_becomes_named_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let config = DriverConfig::new()
        .with_solver(Solver::new(fake_solver(&dir).to_str().unwrap()))
        .with_deferred_id(DeferredIdRule::new("restaurantId", "R"));

    // No factory: APIs are skipped, so the backend never produces an
    // id and the placeholder ends as the named fallback.
    let report = generate_concrete_test_case(
        &restaurant_spec(),
        &["createRestaurant".to_string(), "viewMenu".to_string()],
        &config,
        None,
    );

    assert!(report.satisfiable, "{:?}", report.error_message);
    assert_eq!(
        report.concrete_values["restaurantId1"],
        "no_restaurant_available"
    );
}

#[test]
fn test_iteration_cap_returns_latest_program_with_stall_warning() {
    let dir = tempfile::tempdir().unwrap();
    let config = DriverConfig::new()
        .with_solver(Solver::new(fake_solver(&dir).to_str().unwrap()))
        .with_max_iterations(1);
    let (_state, factory) = auth_backend();

    let report = generate_concrete_test_case(
        &auth_spec(),
        &["register".to_string(), "login".to_string()],
        &config,
        Some(&factory),
    );

    assert!(report.stalled);
    assert!(report.warnings.iter().any(|w| w.contains("no progress")));
    // The recorded query is the capped iteration's: its inputs are
    // still symbolic and constrained non-empty.
    assert!(report.smt_content.contains("(str.len"));
}

#[test]
fn test_empty_test_string_is_trivially_satisfiable() {
    let dir = tempfile::tempdir().unwrap();
    let config = DriverConfig::new().with_solver(Solver::new(fake_solver(&dir).to_str().unwrap()));
    let (_state, factory) = auth_backend();

    let report = generate_concrete_test_case(&auth_spec(), &[], &config, Some(&factory));

    assert!(report.satisfiable);
    assert!(report.concrete_values.is_empty());
    // Only the reset prefix remains after inits are rewritten away.
    assert_eq!(report.program.to_string(), "_ := reset()\n");
}

#[test]
fn test_realism_hook_shapes_final_values() {
    let dir = tempfile::tempdir().unwrap();
    let config = DriverConfig::new()
        .with_solver(Solver::new(fake_solver(&dir).to_str().unwrap()))
        .with_realism(Box::new(|var, value| {
            if var.starts_with("email") {
                format!("{}@example.com", value.to_lowercase())
            } else {
                value.to_string()
            }
        }));
    let (_state, factory) = auth_backend();

    let report = generate_concrete_test_case(
        &auth_spec(),
        &["register".to_string(), "login".to_string()],
        &config,
        Some(&factory),
    );

    assert!(report.satisfiable, "{:?}", report.error_message);
    assert_eq!(report.concrete_values["email0"], "a@example.com");
    assert_eq!(report.concrete_values["email1"], "a@example.com");
}

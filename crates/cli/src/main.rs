//! testgen CLI
//!
//! Command-line runner for the test-case synthesis pipeline: load a
//! spec document (JSON), name an operation sequence, get back a
//! concrete program and its report. Backend function factories are
//! application-specific and plug in through the library API, so runs
//! from this binary derive inputs and constraints without driving a
//! live backend.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use testgen_core::Spec;
use testgen_engine::{
    generate_concrete_test_case, is_sequence_truly_unsat, DeferredIdRule, DriverConfig, Solver,
};

#[derive(ClapParser)]
#[command(name = "testgen")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Synthesize executable API test cases from a service spec", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a concrete test case for an operation sequence
    Generate {
        /// Spec document (JSON)
        #[arg(long)]
        spec: PathBuf,

        /// Operation names to exercise, in order
        #[arg(required = true)]
        operations: Vec<String>,

        /// Settings file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Solver binary (overrides the settings file)
        #[arg(long)]
        solver: Option<String>,

        /// Fixed-point iteration cap (overrides the settings file)
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Keep a copy of each solver query at this path
        #[arg(long)]
        keep_smt: Option<PathBuf>,

        /// Print the full report as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Check an operation sequence's state dependencies without solving
    Check {
        /// Spec document (JSON)
        #[arg(long)]
        spec: PathBuf,

        /// Operation names to check, in order
        #[arg(required = true)]
        operations: Vec<String>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Optional settings file, merged under CLI flags.
#[derive(Debug, Default, serde::Deserialize)]
struct Settings {
    solver: Option<String>,
    max_iterations: Option<u32>,
    #[serde(default)]
    deferred_ids: Vec<DeferredIdEntry>,
}

#[derive(Debug, serde::Deserialize)]
struct DeferredIdEntry {
    base: String,
    global: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("TESTGEN_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            spec,
            operations,
            config,
            solver,
            max_iterations,
            keep_smt,
            json,
        } => run_generate(
            &spec,
            &operations,
            config.as_deref(),
            solver,
            max_iterations,
            keep_smt,
            json,
        ),
        Commands::Check { spec, operations } => run_check(&spec, &operations),
        Commands::Completions { shell } => run_completions(shell),
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "testgen", &mut io::stdout());
}

fn load_spec(path: &Path) -> Spec {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error reading {}: {}", path.display(), e);
            process::exit(1);
        }
    };
    match serde_json::from_str(&content) {
        Ok(spec) => spec,
        Err(e) => {
            eprintln!("Error parsing {}: {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn load_settings(path: Option<&Path>) -> Settings {
    let Some(path) = path else {
        return Settings::default();
    };
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error reading settings {}: {}", path.display(), e);
            process::exit(1);
        }
    };
    match toml::from_str(&content) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error parsing settings {}: {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn run_generate(
    spec_path: &Path,
    operations: &[String],
    config_path: Option<&Path>,
    solver_flag: Option<String>,
    max_iterations_flag: Option<u32>,
    keep_smt: Option<PathBuf>,
    json: bool,
) {
    let spec = load_spec(spec_path);
    let settings = load_settings(config_path);

    let solver_binary = solver_flag
        .or(settings.solver)
        .unwrap_or_else(|| "z3".to_string());
    let mut solver = Solver::new(solver_binary);
    if let Some(path) = keep_smt {
        solver = solver.keep_query_at(path);
    }
    if let Err(e) = solver.probe() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    let mut config = DriverConfig::new().with_solver(solver);
    if let Some(cap) = max_iterations_flag.or(settings.max_iterations) {
        config = config.with_max_iterations(cap);
    }
    for entry in settings.deferred_ids {
        config = config.with_deferred_id(DeferredIdRule::new(entry.base, entry.global));
    }

    let report = generate_concrete_test_case(&spec, operations, &config, None);

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error serializing report: {}", e);
                process::exit(1);
            }
        }
    } else {
        println!("=== Program ===");
        print!("{}", report.program);
        if !report.concrete_values.is_empty() {
            println!("\n=== Concrete values ===");
            for (name, value) in &report.concrete_values {
                println!("{} = {}", name, value);
            }
        }
        for warning in &report.warnings {
            eprintln!("Warning: {}", warning);
        }
        match (&report.error_message, report.satisfiable) {
            (Some(message), _) => println!("\nsatisfiable: false ({})", message),
            (None, satisfiable) => println!("\nsatisfiable: {}", satisfiable),
        }
    }

    if !report.satisfiable {
        process::exit(1);
    }
}

fn run_check(spec_path: &Path, operations: &[String]) {
    let spec = load_spec(spec_path);

    for op in operations {
        if spec.block(op).is_none() {
            eprintln!("Error: unknown operation '{}'", op);
            process::exit(1);
        }
    }

    if is_sequence_truly_unsat(&spec, operations) {
        println!("sequence is infeasible: a required state is never produced");
        process::exit(1);
    }
    println!(
        "sequence dependencies satisfied ({} operation(s))",
        operations.len()
    );
}

//! External SMT solver invocation.
//!
//! The query is written as a self-contained `.smt2` file into a scratch
//! directory and handed to the solver binary (`z3 -smt2 <file>` by
//! default). Solver verdicts are data, not errors: only a failure to
//! spawn the process or read its output is an [`Error::SolverUnavailable`].

use crate::error::Error;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::{LazyLock, Mutex};
use tracing::{debug, warn};

/// What the solver said.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Sat,
    Unsat,
    /// Neither `sat` nor `unsat` appeared in the reply; the raw text is
    /// surfaced to the caller.
    Unknown,
}

/// One completed solver invocation.
#[derive(Debug, Clone)]
pub struct SolverRun {
    pub verdict: Verdict,
    /// Combined stdout and stderr, verbatim.
    pub raw: String,
}

/// Availability probe results per binary, checked once per process.
static PROBED: LazyLock<Mutex<HashMap<String, Result<(), String>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Handle to the external solver.
#[derive(Debug, Clone)]
pub struct Solver {
    binary: String,
    keep_query: Option<PathBuf>,
}

impl Solver {
    pub fn new(binary: impl Into<String>) -> Self {
        Solver {
            binary: binary.into(),
            keep_query: None,
        }
    }

    /// Also writes each query to `path` for inspection.
    pub fn keep_query_at(mut self, path: impl Into<PathBuf>) -> Self {
        self.keep_query = Some(path.into());
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Checks once per process that the solver binary can be spawned.
    pub fn probe(&self) -> Result<(), Error> {
        let mut probed = PROBED.lock().expect("probe cache poisoned");
        let entry = probed.entry(self.binary.clone()).or_insert_with(|| {
            match Command::new(&self.binary).arg("-version").output() {
                Ok(output) => {
                    let banner = String::from_utf8_lossy(&output.stdout);
                    debug!("Solver {} available: {}", self.binary, banner.trim());
                    Ok(())
                }
                Err(e) => Err(format!("failed to run {}: {}", self.binary, e)),
            }
        });
        entry
            .clone()
            .map_err(Error::SolverUnavailable)
    }

    /// Writes `smt` to a scratch file, runs the solver on it, and
    /// classifies the reply.
    pub fn solve(&self, smt: &str) -> Result<SolverRun, Error> {
        let dir = tempfile::Builder::new()
            .prefix("testgen-smt")
            .tempdir()
            .map_err(|e| Error::SolverUnavailable(format!("cannot create scratch dir: {}", e)))?;
        let query_path = dir.path().join("query.smt2");
        fs::write(&query_path, smt)
            .map_err(|e| Error::SolverUnavailable(format!("cannot write query: {}", e)))?;

        if let Some(keep) = &self.keep_query {
            if let Err(e) = fs::write(keep, smt) {
                warn!("Could not keep query copy at {}: {}", keep.display(), e);
            }
        }

        let output = Command::new(&self.binary)
            .arg("-smt2")
            .arg(&query_path)
            .output()
            .map_err(|e| {
                Error::SolverUnavailable(format!("failed to run {}: {}", self.binary, e))
            })?;

        if !output.status.success() {
            // The solver exits nonzero for unsat-with-errors style
            // replies too; classification below decides what it means.
            warn!(
                "Solver {} exited with code {:?}",
                self.binary,
                output.status.code()
            );
        }

        let mut raw = String::from_utf8_lossy(&output.stdout).into_owned();
        raw.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(SolverRun {
            verdict: classify(&raw),
            raw,
        })
    }
}

impl Default for Solver {
    fn default() -> Self {
        Solver::new("z3")
    }
}

/// `unsat` anywhere wins; otherwise a standalone `sat` means
/// satisfiable; anything else is unknown.
pub fn classify(raw: &str) -> Verdict {
    if raw.contains("unsat") {
        Verdict::Unsat
    } else if raw.contains("sat") {
        Verdict::Sat
    } else {
        Verdict::Unknown
    }
}

static MODEL_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\(define-fun\s+([A-Za-z0-9_]+)\s+\(\)\s+String\s+"([^"]*)"\)"#)
        .expect("model regex compiles")
});

/// Extracts `symbol -> value` pairs from a `(get-model)` reply. Only
/// string-typed definitions matter; array models are ignored.
pub fn parse_model(raw: &str) -> BTreeMap<String, String> {
    let mut model = BTreeMap::new();
    for caps in MODEL_ENTRY.captures_iter(raw) {
        model.insert(caps[1].to_string(), caps[2].to_string());
    }
    model
}

//! Declarative service specification.
//!
//! A spec is the already-parsed description of a web service: global
//! state variables with their initial values, and one block per API
//! operation with its precondition, call shape and expected response.
//! Parsing the surface syntax is a collaborator's job; specs enter the
//! pipeline as structured data (typically JSON via serde).

use crate::expr::Expr;
use serde::{Deserialize, Serialize};

/// Initial assignment for a spec-level variable. An empty-map initial
/// value marks the variable as a *global* whose reads and writes get
/// redirected to backend test APIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Init {
    pub name: String,
    pub value: Expr,
}

/// Expected HTTP response of a block, with an optional postcondition
/// over the primed (post-state) globals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub code: u16,
    #[serde(default)]
    pub post: Option<Expr>,
}

/// One API operation block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiBlock {
    /// Name used in test strings.
    pub name: String,
    /// Optional boolean precondition.
    #[serde(default)]
    pub pre: Option<Expr>,
    /// The call shape; must be an `Expr::Call`.
    pub call: Expr,
    pub response: Response,
    /// State globals this operation populates on success. Feeds the
    /// dependency pre-check.
    #[serde(default)]
    pub produces: Vec<String>,
    /// State globals that must be non-empty before this operation can
    /// succeed.
    #[serde(default)]
    pub requires: Vec<String>,
}

/// A full service specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spec {
    /// Application name, used for reporting only.
    pub name: String,
    #[serde(default)]
    pub inits: Vec<Init>,
    pub blocks: Vec<ApiBlock>,
}

impl Spec {
    /// Looks up a block by its test-string name.
    pub fn block(&self, name: &str) -> Option<&ApiBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }

    /// Names of the declared globals: every init whose value is an empty
    /// map literal.
    pub fn globals(&self) -> Vec<&str> {
        self.inits
            .iter()
            .filter(|init| matches!(&init.value, Expr::Map(entries) if entries.is_empty()))
            .map(|init| init.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinOp;

    fn sample_spec() -> Spec {
        Spec {
            name: "auth".to_string(),
            inits: vec![
                Init {
                    name: "U".to_string(),
                    value: Expr::empty_map(),
                },
                Init {
                    name: "attempts".to_string(),
                    value: Expr::Num(0),
                },
            ],
            blocks: vec![ApiBlock {
                name: "login".to_string(),
                pre: Some(Expr::binary(
                    BinOp::Eq,
                    Expr::call("[]", vec![Expr::var("U"), Expr::var("email")]),
                    Expr::var("password"),
                )),
                call: Expr::call("login", vec![Expr::var("email"), Expr::var("password")]),
                response: Response {
                    code: 200,
                    post: None,
                },
                produces: vec!["T".to_string()],
                requires: vec!["U".to_string()],
            }],
        }
    }

    #[test]
    fn test_globals_are_empty_map_inits() {
        let spec = sample_spec();
        assert_eq!(spec.globals(), vec!["U"]);
    }

    #[test]
    fn test_block_lookup() {
        let spec = sample_spec();
        assert!(spec.block("login").is_some());
        assert!(spec.block("register").is_none());
    }

    #[test]
    fn test_spec_round_trips_through_json() {
        let spec = sample_spec();
        let json = serde_json::to_string(&spec).unwrap();
        let back: Spec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}

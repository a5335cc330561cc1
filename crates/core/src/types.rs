//! Value types for declarations and type environments.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse value type of a program variable.
///
/// The IR is stringly typed at the solver boundary (every program
/// variable is a solver string); these tags exist for declarations and
/// for the type environment the builder threads alongside its name
/// scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Str,
    Num,
    Bool,
    Set,
    Map,
    Tuple,
    /// Not yet inferred; treated as a free string by the encoder.
    Unknown,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Str => "string",
            ValueType::Num => "num",
            ValueType::Bool => "bool",
            ValueType::Set => "set",
            ValueType::Map => "map",
            ValueType::Tuple => "tuple",
            ValueType::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

//! Nested name and type scopes.
//!
//! Scopes form a tree: the table owns every scope in an arena, scopes
//! point at their parent by id, and lookup walks the parent chain. The
//! back-reference is non-owning lookup only, so the structure stays
//! acyclic from an ownership point of view.

use crate::types::ValueType;
use std::collections::{HashMap, HashSet};

/// Index of a scope inside its owning table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

impl ScopeId {
    /// The root scope every table starts with.
    pub const ROOT: ScopeId = ScopeId(0);

    pub fn as_usize(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Scope {
    parent: Option<ScopeId>,
    names: HashSet<String>,
}

/// Tree of name scopes with parent-chain lookup.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl SymbolTable {
    /// Creates a table containing only the root scope.
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope {
                parent: None,
                names: HashSet::new(),
            }],
        }
    }

    /// Adds a child scope under `parent` and returns its id.
    pub fn push_scope(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            parent: Some(parent),
            names: HashSet::new(),
        });
        id
    }

    /// Declares `name` in `scope`.
    pub fn insert(&mut self, scope: ScopeId, name: impl Into<String>) {
        self.scopes[scope.0].names.insert(name.into());
    }

    /// True if `name` is declared in `scope` itself.
    pub fn contains_local(&self, scope: ScopeId, name: &str) -> bool {
        self.scopes[scope.0].names.contains(name)
    }

    /// True if `name` is visible from `scope`, walking parents up to the
    /// root.
    pub fn contains(&self, scope: ScopeId, name: &str) -> bool {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            let s = &self.scopes[id.0];
            if s.names.contains(name) {
                return true;
            }
            cursor = s.parent;
        }
        false
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

/// Type environment mirroring the scope tree of a [`SymbolTable`].
#[derive(Debug, Clone)]
pub struct TypeEnv {
    scopes: Vec<TypeScope>,
}

#[derive(Debug, Clone)]
struct TypeScope {
    parent: Option<ScopeId>,
    bindings: HashMap<String, ValueType>,
}

impl TypeEnv {
    pub fn new() -> Self {
        TypeEnv {
            scopes: vec![TypeScope {
                parent: None,
                bindings: HashMap::new(),
            }],
        }
    }

    /// Adds a child scope under `parent`; callers keep this in lockstep
    /// with the symbol table so the same `ScopeId` addresses both.
    pub fn push_scope(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(TypeScope {
            parent: Some(parent),
            bindings: HashMap::new(),
        });
        id
    }

    pub fn insert(&mut self, scope: ScopeId, name: impl Into<String>, ty: ValueType) {
        self.scopes[scope.0].bindings.insert(name.into(), ty);
    }

    /// Looks up the type of `name` from `scope`, walking parents.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<ValueType> {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            let s = &self.scopes[id.0];
            if let Some(ty) = s.bindings.get(name) {
                return Some(*ty);
            }
            cursor = s.parent;
        }
        None
    }
}

impl Default for TypeEnv {
    fn default() -> Self {
        TypeEnv::new()
    }
}

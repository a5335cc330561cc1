//! Symbolic store.
//!
//! σ maps program variable names to owned expressions. Binding order is
//! preserved so the driver can scan for the most recently introduced
//! temp of a global when resolving deferred identities.

use testgen_core::Expr;
use std::collections::HashMap;

/// Insertion-ordered variable store.
#[derive(Debug, Default, Clone)]
pub struct Sigma {
    bindings: HashMap<String, Expr>,
    order: Vec<String>,
}

impl Sigma {
    pub fn new() -> Self {
        Sigma::default()
    }

    /// Binds `name` to `value`, replacing any previous binding. The
    /// first-bind position in the ordering is kept on rebinds.
    pub fn bind(&mut self, name: impl Into<String>, value: Expr) {
        let name = name.into();
        if !self.bindings.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.bindings.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Bindings in first-bind order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Expr)> {
        self.order
            .iter()
            .map(|name| (name.as_str(), &self.bindings[name]))
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
        self.order.clear();
    }

    /// First key of the newest non-empty map bound under
    /// `tmp_<global>_<n>`, highest `n` first. This is how deferred
    /// identities find the id a preceding API created: the globals
    /// rewriter numbers its temps upward, so the largest counter is the
    /// most recent view of the backend state.
    pub fn latest_map_key(&self, global: &str) -> Option<String> {
        let prefix = format!("tmp_{}_", global);
        let mut best: Option<(u32, String)> = None;
        for (name, value) in self.iter() {
            let Some(counter) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.parse::<u32>().ok())
            else {
                continue;
            };
            let Expr::Map(entries) = value else { continue };
            let Some((first_key, _)) = entries.first() else {
                continue;
            };
            match &best {
                Some((n, _)) if *n >= counter => {}
                _ => best = Some((counter, first_key.clone())),
            }
        }
        best.map(|(_, key)| key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebind_keeps_order() {
        let mut sigma = Sigma::new();
        sigma.bind("a", Expr::Num(1));
        sigma.bind("b", Expr::Num(2));
        sigma.bind("a", Expr::Num(3));
        let names: Vec<&str> = sigma.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(sigma.get("a"), Some(&Expr::Num(3)));
    }

    #[test]
    fn test_latest_map_key_prefers_highest_counter() {
        let mut sigma = Sigma::new();
        sigma.bind("tmp_R_0", Expr::empty_map());
        sigma.bind(
            "tmp_R_1",
            Expr::Map(vec![("r-17".to_string(), Expr::str("Bistro"))]),
        );
        sigma.bind(
            "tmp_R_2",
            Expr::Map(vec![("r-42".to_string(), Expr::str("Diner"))]),
        );
        sigma.bind("tmp_M_0", Expr::Map(vec![("m-1".to_string(), Expr::Num(1))]));

        assert_eq!(sigma.latest_map_key("R"), Some("r-42".to_string()));
        assert_eq!(sigma.latest_map_key("M"), Some("m-1".to_string()));
        assert_eq!(sigma.latest_map_key("O"), None);
    }

    #[test]
    fn test_empty_maps_do_not_resolve() {
        let mut sigma = Sigma::new();
        sigma.bind("tmp_R_0", Expr::empty_map());
        assert_eq!(sigma.latest_map_key("R"), None);
    }
}

//! Function factory seam.
//!
//! The engine never talks HTTP itself. When a backend API statement
//! becomes ready, the engine asks the factory for a callable prepared
//! with the already-evaluated concrete arguments and executes it. The
//! test-API operations the globals rewriter introduces (`reset`,
//! `get_G`, `set_G`) are dispatched through the same seam.
//!
//! Per-application factories live outside this crate; [`FnFactory`]
//! is a closure-backed adapter that is enough for tests and for
//! in-process fakes.

use crate::error::ApiError;
use std::collections::HashMap;
use testgen_core::Expr;

/// A single prepared backend call.
pub trait ApiFunction {
    /// Performs the call and returns its result, typically a `Num`
    /// status code or a `Str` body. Errors are confined to the calling
    /// statement by the engine.
    fn execute(&mut self) -> Result<Expr, ApiError>;
}

/// Maps API names plus concrete arguments to prepared callables.
pub trait FunctionFactory {
    /// Returns a callable for `name`, or `None` when this factory does
    /// not implement the operation.
    fn get_function(&self, name: &str, args: &[Expr]) -> Option<Box<dyn ApiFunction + '_>>;

    /// Whether `name` is implemented by this factory.
    fn has_function(&self, name: &str) -> bool;
}

type Handler = Box<dyn Fn(&[Expr]) -> Result<Expr, ApiError>>;
type FallbackHandler = Box<dyn Fn(&str, &[Expr]) -> Result<Expr, ApiError>>;

/// Closure-backed factory.
#[derive(Default)]
pub struct FnFactory {
    handlers: HashMap<String, Handler>,
    fallback: Option<FallbackHandler>,
}

impl FnFactory {
    pub fn new() -> Self {
        FnFactory::default()
    }

    /// Registers a handler for one API name.
    pub fn register(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(&[Expr]) -> Result<Expr, ApiError> + 'static,
    ) -> Self {
        self.handlers.insert(name.into(), Box::new(handler));
        self
    }

    /// Registers a catch-all handler consulted for names without a
    /// dedicated handler. Handy for the generated `get_*`/`set_*`
    /// family of a stateful fake.
    pub fn with_fallback(
        mut self,
        handler: impl Fn(&str, &[Expr]) -> Result<Expr, ApiError> + 'static,
    ) -> Self {
        self.fallback = Some(Box::new(handler));
        self
    }
}

struct PreparedCall<'a> {
    name: String,
    args: Vec<Expr>,
    handler: PreparedHandler<'a>,
}

#[derive(Clone, Copy)]
enum PreparedHandler<'a> {
    Named(&'a Handler),
    Fallback(&'a FallbackHandler),
}

impl ApiFunction for PreparedCall<'_> {
    fn execute(&mut self) -> Result<Expr, ApiError> {
        match self.handler {
            PreparedHandler::Named(h) => h(&self.args),
            PreparedHandler::Fallback(h) => h(&self.name, &self.args),
        }
    }
}

impl FunctionFactory for FnFactory {
    fn get_function(&self, name: &str, args: &[Expr]) -> Option<Box<dyn ApiFunction + '_>> {
        if let Some(handler) = self.handlers.get(name) {
            return Some(Box::new(PreparedCall {
                name: name.to_string(),
                args: args.to_vec(),
                handler: PreparedHandler::Named(handler),
            }));
        }
        match self.fallback.as_ref() {
            Some(handler) => Some(Box::new(PreparedCall {
                name: name.to_string(),
                args: args.to_vec(),
                handler: PreparedHandler::Fallback(handler),
            })),
            None => None,
        }
    }

    fn has_function(&self, name: &str) -> bool {
        self.handlers.contains_key(name) || self.fallback.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_handler_receives_prepared_args() {
        let factory = FnFactory::new().register("login", |args| {
            assert_eq!(args.len(), 2);
            Ok(Expr::Num(200))
        });
        let mut call = factory
            .get_function("login", &[Expr::str("a"), Expr::str("b")])
            .unwrap();
        assert_eq!(call.execute().unwrap(), Expr::Num(200));
        assert!(factory.has_function("login"));
        assert!(!factory.has_function("logout"));
    }

    #[test]
    fn test_fallback_sees_the_name() {
        let factory = FnFactory::new().with_fallback(|name, _args| {
            if name.starts_with("get_") {
                Ok(Expr::empty_map())
            } else {
                Err(ApiError::new(format!("no such operation: {}", name)))
            }
        });
        let mut ok = factory.get_function("get_U", &[]).unwrap();
        assert_eq!(ok.execute().unwrap(), Expr::empty_map());
        let mut err = factory.get_function("set", &[]).unwrap();
        assert!(err.execute().is_err());
    }
}

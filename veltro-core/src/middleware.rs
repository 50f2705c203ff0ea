//! Handler/middleware composition (C3).
//!
//! Generalized from `ando-plugin`'s fixed-phase pipeline
//! (`Phase::{Rewrite,Access,BeforeProxy,HeaderFilter,BodyFilter,Log}`) to
//! free-form `(Handler) -> Handler` wrapping: there is no phase enum here,
//! just an ordered stack of transformers composed at registration time.

use std::sync::Arc;

use crate::context::Context;
use crate::error::CoreError;

/// `(Context) -> Result<(), CoreError>`, boxed so it can be stored,
/// cloned cheaply (via `Arc`) and composed across route registrations.
pub type Handler = Arc<dyn for<'r> Fn(&mut Context<'r>) -> Result<(), CoreError> + Send + Sync>;

/// `(Handler) -> Handler`.
pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

pub fn handler<F>(f: F) -> Handler
where
    F: for<'r> Fn(&mut Context<'r>) -> Result<(), CoreError> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wraps `inner` with `mws` in reverse order, so the first middleware in
/// the slice ends up outermost.
pub fn compose(inner: Handler, mws: &[Middleware]) -> Handler {
    let mut wrapped = inner;
    for mw in mws.iter().rev() {
        wrapped = mw(wrapped);
    }
    wrapped
}

/// Global middleware registry plus one registered route's final handler.
///
/// Returned by `Application::add_route` (in `veltro-runtime`, or by any
/// dispatcher built on this crate) so callers can fluently attach
/// route-scoped middleware after the fact.
pub struct ChainLink {
    pub(crate) method: Arc<str>,
    pub(crate) pattern: Arc<str>,
    pub(crate) handler: Handler,
}

impl ChainLink {
    pub fn new(method: impl Into<Arc<str>>, pattern: impl Into<Arc<str>>, handler: Handler) -> Self {
        Self {
            method: method.into(),
            pattern: pattern.into(),
            handler,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn handler(&self) -> Handler {
        Arc::clone(&self.handler)
    }

    /// Wraps the current final handler with `mws` (reverse order, first
    /// argument outermost) and returns the new composed handler. Callers
    /// are responsible for re-registering it with the router — this type
    /// doesn't hold a router reference, matching the spec's description
    /// of `ChainLink` as "a registration token", not a router handle.
    pub fn use_middleware(mut self, mws: &[Middleware]) -> Self {
        self.handler = compose(self.handler, mws);
        self
    }
}

/// An ordered, append-only list of global middlewares. `use_mw` appends;
/// `wrap` composes a handler with the whole list in reverse registration
/// order, so the first-registered middleware runs outermost.
#[derive(Default, Clone)]
pub struct MiddlewareStack {
    mws: Vec<Middleware>,
}

impl MiddlewareStack {
    pub fn new() -> Self {
        Self { mws: Vec::new() }
    }

    pub fn use_mw(&mut self, mw: Middleware) {
        self.mws.push(mw);
    }

    pub fn wrap(&self, inner: Handler) -> Handler {
        compose(inner, &self.mws)
    }
}

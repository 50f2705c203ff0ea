pub mod context;
pub mod error;
pub mod http;
pub mod middleware;
pub mod response;
pub mod route;
pub mod router;

pub use context::{Context, ContextPool, ContextState, P_INLINE, Q_INLINE};
pub use error::CoreError;
pub use http::{Request, ResponseWriter};
pub use middleware::{handler, middleware, ChainLink, Handler, Middleware, MiddlewareStack};
pub use route::{Pattern, Route, Segment};
pub use router::{ParamSink, Router, SwapRouter};

//! The application dispatcher (C4): owns the router, the context pool,
//! the global middleware stack, an error handler, and — once bound — the
//! HTTP server.
//!
//! Grounded on `ando-proxy::proxy::ProxyWorker::handle_request` for the
//! "resolve route, fall through to a pre-built response on miss, otherwise
//! invoke application logic" control flow, and on `ando-server::main`'s
//! config-load-then-bind-then-wait wiring for process shape (the wiring
//! itself lives in `veltro-server`, not here).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use parking_lot::RwLock;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, warn};

use veltro_core::context::ContextPool;
use veltro_core::error::CoreError;
use veltro_core::http::Request as _;
use veltro_core::middleware::{Handler, MiddlewareStack};
use veltro_core::response;
use veltro_core::route::Pattern;
use veltro_core::router::{ParamSink, Router, SwapRouter};
use veltro_core::Context;

use crate::hyper_adapter::{HyperRequestRef, HyperResponseWriter, OwnedRequest};

/// Either router concurrency variant `veltro-core` provides. Both expose
/// the same `add`/`lookup` shape; the dispatcher doesn't care which one a
/// given application picked.
pub enum RouterHandle {
    Locked(Arc<Router>),
    Lockfree(Arc<SwapRouter>),
}

impl RouterHandle {
    fn add(&self, method: &str, pattern: &Pattern, handler: Handler) {
        match self {
            RouterHandle::Locked(r) => r.add(method, pattern, handler),
            RouterHandle::Lockfree(r) => r.add(method, pattern, handler),
        }
    }

    fn lookup(&self, method: &[u8], path: &[u8], sink: &mut dyn ParamSink) -> Option<Handler> {
        match self {
            RouterHandle::Locked(r) => r.lookup(method, path, sink),
            RouterHandle::Lockfree(r) => r.lookup(method, path, sink),
        }
    }
}

/// `(Context, &CoreError)`, invoked whenever a handler returns an error.
/// The default maps the fixed taxonomy to canonical JSON bodies via
/// `veltro_core::response::write_error`.
pub type ErrorHandler = Arc<dyn Fn(&mut Context, &CoreError) + Send + Sync>;

fn default_error_handler() -> ErrorHandler {
    Arc::new(|ctx, err| response::write_error(ctx, err))
}

struct ServerHandle {
    shutdown_tx: watch::Sender<bool>,
    accept_task: tokio::task::JoinHandle<()>,
    in_flight: Arc<AtomicUsize>,
}

pub struct Application {
    router: RouterHandle,
    pool: Arc<ContextPool>,
    global: MiddlewareStack,
    error_handler: ErrorHandler,
    server: RwLock<Option<ServerHandle>>,
}

impl Application {
    pub fn new(router: RouterHandle) -> Self {
        Self {
            router,
            pool: Arc::new(ContextPool::new()),
            global: MiddlewareStack::new(),
            error_handler: default_error_handler(),
            server: RwLock::new(None),
        }
    }

    pub fn with_pool_warmup(self, n: usize) -> Self {
        self.pool.warmup(n);
        self
    }

    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = handler;
        self
    }

    /// Appends a global middleware. Must be called before any routes that
    /// should observe it are registered — `use(mw)` composes at
    /// registration time, not at dispatch time.
    pub fn use_mw(&mut self, mw: veltro_core::middleware::Middleware) {
        self.global.use_mw(mw);
    }

    /// Wraps `handler` with the current global middleware list (reverse
    /// registration order) and registers it. Returns a `ChainLink` the
    /// caller can further wrap with route-scoped middleware and hand back
    /// to [`Application::register`] to re-register with overwrite
    /// semantics.
    pub fn route(
        &self,
        method: &str,
        pattern: &str,
        handler: Handler,
    ) -> Result<veltro_core::middleware::ChainLink, CoreError> {
        let wrapped = self.global.wrap(handler);
        let link = veltro_core::middleware::ChainLink::new(method, pattern, wrapped);
        self.register(&link)?;
        Ok(link)
    }

    pub fn register(&self, link: &veltro_core::middleware::ChainLink) -> Result<(), CoreError> {
        let pattern =
            Pattern::parse(link.pattern()).map_err(|e| CoreError::BadRequest(e.to_string()))?;
        self.router.add(link.method(), &pattern, link.handler());
        Ok(())
    }

    fn process(&self, owned: &OwnedRequest) -> HyperResponseWriter {
        let mut state = self.pool.acquire();
        let req = HyperRequestRef(owned);
        let mut writer = HyperResponseWriter::default();
        {
            let mut ctx = Context::bind(&mut state, &req, &mut writer);
            if let Some(err) = &owned.read_error {
                response::write_error(&mut ctx, err);
            } else {
                let found = self.router.lookup(
                    req.method_bytes(),
                    req.path_bytes(),
                    &mut ctx as &mut dyn ParamSink,
                );
                match found {
                    Some(handler) => {
                        if let Err(err) = handler(&mut ctx) {
                            (self.error_handler)(&mut ctx, &err);
                        }
                    }
                    None => response::write_error(&mut ctx, &CoreError::NotFound),
                }
            }
        }
        self.pool.release(state);
        writer
    }

    async fn handle(
        self: Arc<Self>,
        req: hyper::Request<hyper::body::Incoming>,
    ) -> Result<hyper::Response<Full<Bytes>>, std::convert::Infallible> {
        let owned = match OwnedRequest::from_hyper(req).await {
            Ok(o) => o,
            Err(_) => OwnedRequest::empty_with_error(CoreError::BadRequest(
                "failed to read request body".into(),
            )),
        };
        let writer = self.process(&owned);
        Ok(writer.into_hyper_response())
    }

    /// Binds a `hyper` server to `addr` and starts accepting connections
    /// on a background task. Stores the handle behind a write lock so
    /// `shutdown` can take it back out. Returns the address actually bound
    /// (useful when `addr`'s port is 0).
    pub async fn serve(self: Arc<Self>, addr: SocketAddr) -> Result<SocketAddr, CoreError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let in_flight = Arc::new(AtomicUsize::new(0));

        let app = Arc::clone(&self);
        let in_flight_loop = Arc::clone(&in_flight);
        let accept_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    accepted = listener.accept() => {
                        let (stream, _peer) = match accepted {
                            Ok(pair) => pair,
                            Err(e) => {
                                warn!(error = %e, "accept error");
                                continue;
                            }
                        };
                        let app = Arc::clone(&app);
                        let in_flight = Arc::clone(&in_flight_loop);
                        in_flight.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| Arc::clone(&app).handle(req));
                            if let Err(e) = auto::Builder::new(TokioExecutor::new())
                                .serve_connection(io, service)
                                .await
                            {
                                debug!(error = %e, "connection closed with error");
                            }
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                }
            }
        });

        *self.server.write() = Some(ServerHandle {
            shutdown_tx,
            accept_task,
            in_flight,
        });
        Ok(local_addr)
    }

    /// Stops accepting new connections and waits for in-flight requests to
    /// finish, up to `deadline`. Returns success immediately if no server
    /// is bound.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), CoreError> {
        let handle = self.server.write().take();
        let Some(handle) = handle else {
            return Ok(());
        };

        let _ = handle.shutdown_tx.send(true);
        let drained = tokio::time::timeout(deadline, async {
            while handle.in_flight.load(Ordering::SeqCst) > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        handle.accept_task.abort();
        if drained.is_err() {
            warn!("graceful shutdown deadline elapsed with requests still in flight");
        }
        Ok(())
    }
}

//! Pooled per-request state (C1).
//!
//! A `ContextState` is the lifetime-free, pool-resident half of a request
//! context: inline parameter storage, overflow maps, scratch data and
//! response flags, none of which borrow from a request buffer. A
//! `Context<'r>` is the short-lived wrapper that combines a borrowed
//! `ContextState` with a borrowed request/response pair for the duration
//! of exactly one request; it cannot outlive `'r` because the borrow
//! checker enforces it, not a runtime check.
//!
//! This sidesteps the unchecked aliasing the spec's design notes describe
//! in the source system: path-parameter *values* are stored as
//! `(start, end)` byte-range offsets into the request's path bytes and
//! materialized with a slice index on demand; parameter *names* are
//! `Arc<str>` clones from the route tree, registered once at startup.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_queue::SegQueue;

use crate::http::{Request, ResponseWriter};

pub const P_INLINE: usize = 8;
pub const Q_INLINE: usize = 16;

#[derive(Clone)]
struct PathParamSlot {
    name: Arc<str>,
    start: u32,
    end: u32,
}

impl Default for PathParamSlot {
    fn default() -> Self {
        Self {
            name: Arc::from(""),
            start: 0,
            end: 0,
        }
    }
}

#[derive(Clone, Copy, Default)]
struct QueryParamSlot {
    key_start: u32,
    key_end: u32,
    val_start: u32,
    val_end: u32,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Lifecycle {
    Fresh,
    Bound,
    Released,
}

/// The pool-resident half of a request context. Owns no borrows.
pub struct ContextState {
    path_params: [PathParamSlot; P_INLINE],
    path_params_len: usize,
    path_overflow: Option<HashMap<Arc<str>, String>>,

    query_params: [QueryParamSlot; Q_INLINE],
    query_params_len: usize,
    query_overflow: Option<HashMap<String, String>>,
    query_parsed: bool,

    scratch: Option<HashMap<String, Box<dyn Any + Send + Sync>>>,

    status: u16,
    written: bool,
    content_type_set: bool,

    trace_id: Option<Arc<str>>,
    lifecycle: Lifecycle,
}

impl ContextState {
    fn fresh() -> Self {
        Self {
            path_params: std::array::from_fn(|_| PathParamSlot::default()),
            path_params_len: 0,
            path_overflow: None,
            query_params: [QueryParamSlot::default(); Q_INLINE],
            query_params_len: 0,
            query_overflow: None,
            query_parsed: false,
            scratch: None,
            status: 0,
            written: false,
            content_type_set: false,
            trace_id: None,
            lifecycle: Lifecycle::Fresh,
        }
    }

    /// Clears only the slots that were actually used (tracked by the
    /// length counters). Unused slots are left with stale data on
    /// purpose — touching them costs cycles for no observable benefit
    /// since nothing ever reads past the length counter.
    fn reset(&mut self) {
        for i in 0..self.path_params_len {
            self.path_params[i] = PathParamSlot::default();
        }
        self.path_params_len = 0;
        self.path_overflow = None;

        for i in 0..self.query_params_len {
            self.query_params[i] = QueryParamSlot::default();
        }
        self.query_params_len = 0;
        self.query_overflow = None;
        self.query_parsed = false;

        self.scratch = None;
        self.status = 0;
        self.written = false;
        self.content_type_set = false;
        self.trace_id = None;
        self.lifecycle = Lifecycle::Released;
    }

    /// Called by the router when copying a captured path parameter into
    /// the context. `start`/`end` index into the request's path bytes.
    /// Returns `true` if the value landed in the inline buffer.
    pub(crate) fn push_path_param(
        &mut self,
        name: Arc<str>,
        start: u32,
        end: u32,
        path: &[u8],
    ) -> bool {
        if self.path_params_len < P_INLINE {
            self.path_params[self.path_params_len] = PathParamSlot { name, start, end };
            self.path_params_len += 1;
            true
        } else {
            let value = String::from_utf8_lossy(&path[start as usize..end as usize]).into_owned();
            self.path_overflow
                .get_or_insert_with(HashMap::new)
                .insert(name, value);
            false
        }
    }

    /// Undo the most recent `push_path_param`, used by the router to
    /// back out a parameter capture when a deeper match fails (the
    /// parameter step permits backtracking; the wildcard step does not).
    pub(crate) fn undo_path_param(&mut self, name: &str, was_inline: bool) {
        if was_inline {
            if self.path_params_len > 0 {
                self.path_params_len -= 1;
                self.path_params[self.path_params_len] = PathParamSlot::default();
            }
        } else if let Some(map) = self.path_overflow.as_mut() {
            map.remove(name);
        }
    }
}

/// A short-lived view combining a pooled `ContextState` with the
/// borrowed request/response pair for one in-flight request.
pub struct Context<'r> {
    state: &'r mut ContextState,
    request: &'r dyn Request<'r>,
    response: &'r mut dyn ResponseWriter,
}

impl<'r> Context<'r> {
    /// Combine a pooled, lifetime-free `ContextState` with a borrowed
    /// request/response pair for the duration of exactly one request.
    /// Called by the dispatcher after `ContextPool::acquire`.
    pub fn bind(
        state: &'r mut ContextState,
        request: &'r dyn Request<'r>,
        response: &'r mut dyn ResponseWriter,
    ) -> Self {
        state.lifecycle = Lifecycle::Bound;
        Self {
            state,
            request,
            response,
        }
    }

    #[inline]
    pub fn method_bytes(&self) -> &'r [u8] {
        self.request.method_bytes()
    }

    #[inline]
    pub fn path_bytes(&self) -> &'r [u8] {
        self.request.path_bytes()
    }

    #[inline]
    pub fn query_bytes(&self) -> &'r [u8] {
        self.request.query_bytes()
    }

    pub fn header(&self, name: &str) -> Option<&'r [u8]> {
        self.request.header_get(name)
    }

    pub fn body_bytes(&self) -> &'r [u8] {
        self.request.body_bytes()
    }

    pub(crate) fn push_path_param(&mut self, name: Arc<str>, start: u32, end: u32) -> bool {
        let path = self.request.path_bytes();
        self.state.push_path_param(name, start, end, path)
    }

    /// Look up a path parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        let path = self.request.path_bytes();
        for i in 0..self.state.path_params_len {
            let slot = &self.state.path_params[i];
            if &*slot.name == name {
                return std::str::from_utf8(&path[slot.start as usize..slot.end as usize]).ok();
            }
        }
        self.state
            .path_overflow
            .as_ref()
            .and_then(|m| m.get(name))
            .map(|s| s.as_str())
    }

    fn ensure_query_parsed(&mut self) {
        if self.state.query_parsed {
            return;
        }
        self.state.query_parsed = true;
        let query = self.request.query_bytes();
        if query.is_empty() {
            return;
        }
        for pair in query.split(|&b| b == b'&') {
            if pair.is_empty() {
                continue;
            }
            let (key_range, val_range) = match pair.iter().position(|&b| b == b'=') {
                Some(eq) => {
                    let base = pair.as_ptr() as usize - query.as_ptr() as usize;
                    (
                        (base as u32, (base + eq) as u32),
                        ((base + eq + 1) as u32, (base + pair.len()) as u32),
                    )
                }
                None => {
                    let base = pair.as_ptr() as usize - query.as_ptr() as usize;
                    ((base as u32, (base + pair.len()) as u32), (0u32, 0u32))
                }
            };
            if self.state.query_params_len < Q_INLINE {
                let idx = self.state.query_params_len;
                self.state.query_params[idx] = QueryParamSlot {
                    key_start: key_range.0,
                    key_end: key_range.1,
                    val_start: val_range.0,
                    val_end: val_range.1,
                };
                self.state.query_params_len += 1;
            } else {
                let key =
                    String::from_utf8_lossy(&query[key_range.0 as usize..key_range.1 as usize])
                        .into_owned();
                let val =
                    String::from_utf8_lossy(&query[val_range.0 as usize..val_range.1 as usize])
                        .into_owned();
                self.state
                    .query_overflow
                    .get_or_insert_with(HashMap::new)
                    .insert(key, val);
            }
        }
    }

    /// Look up a query parameter by name. Parses the query string lazily
    /// on first call.
    pub fn query(&mut self, name: &str) -> Option<&str> {
        self.ensure_query_parsed();
        let query = self.request.query_bytes();
        for i in 0..self.state.query_params_len {
            let slot = &self.state.query_params[i];
            let key =
                std::str::from_utf8(&query[slot.key_start as usize..slot.key_end as usize]).ok();
            if key == Some(name) {
                return std::str::from_utf8(
                    &query[slot.val_start as usize..slot.val_end as usize],
                )
                .ok();
            }
        }
        self.state
            .query_overflow
            .as_ref()
            .and_then(|m| m.get(name))
            .map(|s| s.as_str())
    }

    pub fn status(&self) -> u16 {
        self.state.status
    }

    pub fn is_written(&self) -> bool {
        self.state.written
    }

    /// Write the response status. A no-op on the underlying sink (beyond
    /// recording it) once `written` is already set — the spec forbids
    /// re-issuing a status after the first body write.
    pub fn set_status(&mut self, code: u16) {
        if self.state.written {
            return;
        }
        self.state.status = code;
        self.response.write_status(code);
    }

    pub fn set_header(&mut self, name: &[u8], value: &[u8]) {
        self.response.set_header(name, value);
    }

    pub fn set_content_type(&mut self, value: &[u8]) {
        if !self.state.content_type_set {
            self.response.set_header(b"content-type", value);
            self.state.content_type_set = true;
        }
    }

    /// Write body bytes and mark the context as written. May be called
    /// more than once to stream a body in chunks.
    pub fn write_body(&mut self, bytes: &[u8]) {
        self.response.write_body(bytes);
        self.state.written = true;
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.state.trace_id.as_deref()
    }

    pub fn set_trace_id(&mut self, id: Arc<str>) {
        self.state.trace_id = Some(id);
    }

    pub fn scratch_set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.state
            .scratch
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), Box::new(value));
    }

    pub fn scratch_get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.state
            .scratch
            .as_ref()
            .and_then(|m| m.get(key))
            .and_then(|v| v.downcast_ref::<T>())
    }
}

impl<'r> crate::router::ParamSink for Context<'r> {
    fn capture(&mut self, name: Arc<str>, start: u32, end: u32) -> bool {
        self.push_path_param(name, start, end)
    }

    fn undo(&mut self, name: &str, was_inline: bool) {
        self.state.undo_path_param(name, was_inline);
    }
}

/// A lock-free pool of reusable `ContextState` instances, shared across
/// every request-serving thread.
pub struct ContextPool {
    free: SegQueue<Box<ContextState>>,
}

impl ContextPool {
    pub fn new() -> Self {
        Self {
            free: SegQueue::new(),
        }
    }

    /// Pre-populate the pool with `n` instances so the steady-state
    /// acquire path never allocates.
    pub fn warmup(&self, n: usize) {
        for _ in 0..n {
            self.free.push(Box::new(ContextState::fresh()));
        }
    }

    /// Allocation-free on the steady path; allocates a fresh instance
    /// only when the pool is empty.
    pub fn acquire(&self) -> Box<ContextState> {
        self.free
            .pop()
            .unwrap_or_else(|| Box::new(ContextState::fresh()))
    }

    /// Idempotent: resetting and returning an already-released state is
    /// harmless (it just resets already-zeroed counters again).
    pub fn release(&self, mut state: Box<ContextState>) {
        state.reset();
        self.free.push(state);
    }

    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new()
    }
}

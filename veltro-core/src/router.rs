//! Hybrid static-table + radix-tree router (C2).
//!
//! Grounded on the teacher's `arc_swap::ArcSwap<CompiledRouter>`
//! publish-on-swap discipline (`ando-core::router`) for the lock-free
//! concurrency variant, and on the spec's reader–writer-lock note (§9)
//! for the simpler variant. The node shape — `indices` byte-array,
//! per-node `priority`, split static/param/wildcard children — is
//! hand-built rather than delegated to `matchit`, which is sealed and
//! does not expose the bit-exact node layout the spec calls for.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::middleware::Handler;
use crate::route::{Pattern, Segment};

const STACK_KEY_CAP: usize = 128;
const MAX_SEGMENTS: usize = 32;

/// Sink the router writes captured parameters into during a tree walk.
/// Implemented by `Context` so the router never allocates a `Vec` to
/// hand results back — captures land directly in the context's inline
/// buffer (or its overflow map once the buffer is full).
pub trait ParamSink {
    /// Returns `true` if the value landed in the inline buffer, `false`
    /// if it overflowed to the heap map (needed so a failed parameter
    /// match can be undone precisely).
    fn capture(&mut self, name: Arc<str>, start: u32, end: u32) -> bool;
    fn undo(&mut self, name: &str, was_inline: bool);
}

#[derive(Clone)]
enum NodeKind {
    Static,
    Param(Arc<str>),
    Wildcard(Arc<str>),
}

struct Node {
    /// Literal text for `Static` nodes; unused for `Param`/`Wildcard`
    /// (their name lives in `kind`).
    segment: Box<str>,
    kind: NodeKind,
    static_children: Vec<Node>,
    /// First byte of each entry in `static_children`, same order.
    indices: Vec<u8>,
    param_child: Option<Box<Node>>,
    wildcard_child: Option<Box<Node>>,
    priority: AtomicU32,
    handler: Option<Handler>,
}

impl Clone for Node {
    fn clone(&self) -> Self {
        Self {
            segment: self.segment.clone(),
            kind: self.kind.clone(),
            static_children: self.static_children.clone(),
            indices: self.indices.clone(),
            param_child: self.param_child.clone(),
            wildcard_child: self.wildcard_child.clone(),
            priority: AtomicU32::new(self.priority.load(Ordering::Relaxed)),
            handler: self.handler.clone(),
        }
    }
}

impl Node {
    fn root() -> Self {
        Self {
            segment: "".into(),
            kind: NodeKind::Static,
            static_children: Vec::new(),
            indices: Vec::new(),
            param_child: None,
            wildcard_child: None,
            priority: AtomicU32::new(0),
            handler: None,
        }
    }

    fn static_child(lit: Box<str>) -> Self {
        Self {
            segment: lit,
            ..Self::root()
        }
    }

    fn param_node(name: Arc<str>) -> Self {
        Self {
            kind: NodeKind::Param(name),
            ..Self::root()
        }
    }

    fn wildcard_node(name: Arc<str>, handler: Handler) -> Self {
        Self {
            kind: NodeKind::Wildcard(name),
            handler: Some(handler),
            ..Self::root()
        }
    }

    fn insert(&mut self, segments: &[Segment], handler: Handler) {
        match segments.split_first() {
            None => self.handler = Some(handler),
            Some((Segment::Static(lit), rest)) => {
                let pos = self
                    .static_children
                    .iter()
                    .position(|c| c.segment.as_ref() == lit.as_ref());
                let idx = match pos {
                    Some(i) => i,
                    None => {
                        let first_byte = lit.as_bytes()[0];
                        self.static_children.push(Node::static_child(lit.clone()));
                        self.indices.push(first_byte);
                        self.static_children.len() - 1
                    }
                };
                self.static_children[idx].insert(rest, handler);
            }
            Some((Segment::Param(name), rest)) => {
                if self.param_child.is_none() {
                    self.param_child = Some(Box::new(Node::param_node(Arc::clone(name))));
                }
                self.param_child.as_mut().unwrap().insert(rest, handler);
            }
            Some((Segment::Wildcard(name), _rest)) => {
                self.wildcard_child = Some(Box::new(Node::wildcard_node(Arc::clone(name), handler)));
            }
        }
    }

    /// Re-sorts static children by descending access priority. Called
    /// from the (exclusive) write path rather than per-lookup: the spec
    /// permits disabling the per-access bubble-up under either
    /// concurrency variant, since §8's correctness guarantees don't
    /// depend on it.
    fn rebalance(&mut self) {
        let mut order: Vec<usize> = (0..self.static_children.len()).collect();
        order.sort_by(|&a, &b| {
            let pa = self.static_children[a].priority.load(Ordering::Relaxed);
            let pb = self.static_children[b].priority.load(Ordering::Relaxed);
            pb.cmp(&pa)
        });
        let children = std::mem::take(&mut self.static_children);
        let indices = std::mem::take(&mut self.indices);
        let mut slots: Vec<Option<Node>> = children.into_iter().map(Some).collect();
        let mut new_children = Vec::with_capacity(slots.len());
        let mut new_indices = Vec::with_capacity(indices.len());
        for i in order {
            new_children.push(slots[i].take().unwrap());
            new_indices.push(indices[i]);
        }
        for child in &mut new_children {
            child.rebalance();
        }
        if let Some(c) = self.param_child.as_mut() {
            c.rebalance();
        }
        self.static_children = new_children;
        self.indices = new_indices;
    }

    fn walk(&self, segs: &[&[u8]], path: &[u8], sink: &mut dyn ParamSink) -> Option<Handler> {
        let Some((&seg, rest)) = segs.split_first() else {
            if self.handler.is_some() {
                return self.handler.clone();
            }
            if let Some(wchild) = &self.wildcard_child {
                if let NodeKind::Wildcard(name) = &wchild.kind {
                    let end = path.len() as u32;
                    sink.capture(Arc::clone(name), end, end);
                    return wchild.handler.clone();
                }
            }
            return None;
        };

        if let Some(&first_byte) = seg.first() {
            for i in 0..self.static_children.len() {
                if self.indices[i] == first_byte && self.static_children[i].segment.as_bytes() == seg
                {
                    if let Some(h) = self.static_children[i].walk(rest, path, sink) {
                        self.static_children[i].priority.fetch_add(1, Ordering::Relaxed);
                        return Some(h);
                    }
                }
            }
        }

        if let Some(pchild) = &self.param_child {
            if let NodeKind::Param(name) = &pchild.kind {
                let start = offset_of(path, seg);
                let end = start + seg.len() as u32;
                let was_inline = sink.capture(Arc::clone(name), start, end);
                if let Some(h) = pchild.walk(rest, path, sink) {
                    pchild.priority.fetch_add(1, Ordering::Relaxed);
                    return Some(h);
                }
                sink.undo(name, was_inline);
            }
        }

        if let Some(wchild) = &self.wildcard_child {
            if let NodeKind::Wildcard(name) = &wchild.kind {
                let start = offset_of(path, seg);
                let end = path.len() as u32;
                sink.capture(Arc::clone(name), start, end);
                return wchild.handler.clone();
            }
        }

        None
    }
}

#[inline]
fn offset_of(base: &[u8], sub: &[u8]) -> u32 {
    (sub.as_ptr() as usize - base.as_ptr() as usize) as u32
}

fn tokenize<'p>(path: &'p [u8]) -> ([&'p [u8]; MAX_SEGMENTS], usize) {
    let mut segs: [&[u8]; MAX_SEGMENTS] = [&[]; MAX_SEGMENTS];
    let mut n = 0;
    for seg in path.split(|&b| b == b'/').filter(|s| !s.is_empty()) {
        if n == MAX_SEGMENTS {
            break;
        }
        segs[n] = seg;
        n += 1;
    }
    (segs, n)
}

/// The raw router data: exact-match static table plus one radix tree
/// per HTTP method. Not thread-safe on its own — `Router` and
/// `SwapRouter` below provide the two interchangeable concurrency
/// disciplines over it.
#[derive(Clone)]
struct RouterTree {
    static_table: HashMap<Box<[u8]>, Handler>,
    trees: HashMap<Arc<str>, Node>,
}

impl RouterTree {
    fn new() -> Self {
        Self {
            static_table: HashMap::new(),
            trees: HashMap::new(),
        }
    }

    fn add(&mut self, method: &str, pattern: &Pattern, handler: Handler) {
        if pattern.is_static() {
            let mut key = Vec::with_capacity(method.len() + 1 + pattern.raw().len());
            key.extend_from_slice(method.as_bytes());
            key.push(b':');
            key.extend_from_slice(pattern.raw().as_bytes());
            self.static_table.insert(key.into_boxed_slice(), handler.clone());
        }
        // Static patterns still get a tree entry: the static table is an
        // exact-match fast path over the raw request bytes, but only
        // `walk` normalizes double slashes and a trailing slash, so the
        // tree is the fallback that makes that normalization reachable.
        let tree = self
            .trees
            .entry(Arc::from(method))
            .or_insert_with(Node::root);
        tree.insert(pattern.segments(), handler);
        tree.rebalance();
    }

    fn lookup(&self, method: &[u8], path: &[u8], sink: &mut dyn ParamSink) -> Option<Handler> {
        let mut stack_key = [0u8; STACK_KEY_CAP];
        let total = method.len() + 1 + path.len();
        if total <= STACK_KEY_CAP {
            stack_key[..method.len()].copy_from_slice(method);
            stack_key[method.len()] = b':';
            stack_key[method.len() + 1..total].copy_from_slice(path);
            if let Some(h) = self.static_table.get(&stack_key[..total]) {
                return Some(Arc::clone(h));
            }
        }

        let method_str = std::str::from_utf8(method).ok()?;
        let tree = self.trees.get(method_str)?;
        let (segs, n) = tokenize(path);
        tree.walk(&segs[..n], path, sink)
    }
}

/// Reader–writer lock concurrency variant: one lock, many concurrent
/// lookups, exclusive writes.
pub struct Router {
    inner: RwLock<RouterTree>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RouterTree::new()),
        }
    }

    pub fn add(&self, method: &str, pattern: &Pattern, handler: Handler) {
        debug!(method, pattern = pattern.raw(), "registering route");
        self.inner.write().add(method, pattern, handler);
    }

    #[inline]
    pub fn lookup(&self, method: &[u8], path: &[u8], sink: &mut dyn ParamSink) -> Option<Handler> {
        self.inner.read().lookup(method, path, sink)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Publish-on-swap concurrency variant: writers clone-mutate-publish an
/// immutable snapshot; readers load the current `Arc` and never block.
pub struct SwapRouter {
    inner: arc_swap::ArcSwap<RouterTree>,
    write_lock: Mutex<()>,
    frozen: std::sync::atomic::AtomicBool,
}

impl SwapRouter {
    pub fn new() -> Self {
        Self {
            inner: arc_swap::ArcSwap::new(Arc::new(RouterTree::new())),
            write_lock: Mutex::new(()),
            frozen: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Disables further writes. `add` after `freeze` is a programming
    /// error (it panics), letting the lock-free read path assume
    /// immutability for its whole remaining lifetime.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    pub fn add(&self, method: &str, pattern: &Pattern, handler: Handler) {
        assert!(
            !self.is_frozen(),
            "cannot add a route to a frozen SwapRouter"
        );
        let _guard = self.write_lock.lock();
        let current = self.inner.load();
        let mut next: RouterTree = (**current).clone();
        next.add(method, pattern, handler);
        debug!(method, pattern = pattern.raw(), "publishing router snapshot");
        self.inner.store(Arc::new(next));
    }

    #[inline]
    pub fn lookup(&self, method: &[u8], path: &[u8], sink: &mut dyn ParamSink) -> Option<Handler> {
        let snapshot = self.inner.load();
        snapshot.lookup(method, path, sink)
    }
}

impl Default for SwapRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::handler;

    struct RecordingSink {
        captured: Vec<(String, u32, u32)>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self { captured: Vec::new() }
        }
    }

    impl ParamSink for RecordingSink {
        fn capture(&mut self, name: Arc<str>, start: u32, end: u32) -> bool {
            self.captured.push((name.to_string(), start, end));
            true
        }
        fn undo(&mut self, name: &str, _was_inline: bool) {
            self.captured.retain(|(n, _, _)| n != name);
        }
    }

    fn noop_handler() -> Handler {
        handler(|_ctx| Ok(()))
    }

    fn value<'a>(path: &'a [u8], start: u32, end: u32) -> &'a str {
        std::str::from_utf8(&path[start as usize..end as usize]).unwrap()
    }

    #[test]
    fn static_route_matches_via_fast_path() {
        let router = Router::new();
        router.add("GET", &Pattern::parse("/ping").unwrap(), noop_handler());
        let mut sink = RecordingSink::new();
        let found = router.lookup(b"GET", b"/ping", &mut sink);
        assert!(found.is_some());
        assert!(sink.captured.is_empty());
    }

    #[test]
    fn dynamic_route_captures_multiple_params() {
        let router = Router::new();
        router.add(
            "GET",
            &Pattern::parse("/users/:id/posts/:postId").unwrap(),
            noop_handler(),
        );
        let path = b"/users/42/posts/99";
        let mut sink = RecordingSink::new();
        let found = router.lookup(b"GET", path, &mut sink);
        assert!(found.is_some());
        assert_eq!(sink.captured.len(), 2);
        assert_eq!(value(path, sink.captured[0].1, sink.captured[0].2), "42");
        assert_eq!(value(path, sink.captured[1].1, sink.captured[1].2), "99");
    }

    #[test]
    fn static_segment_wins_over_param_segment() {
        let router = Router::new();
        router.add("GET", &Pattern::parse("/users/new").unwrap(), noop_handler());
        router.add("GET", &Pattern::parse("/users/:id").unwrap(), noop_handler());

        let mut sink = RecordingSink::new();
        router.lookup(b"GET", b"/users/new", &mut sink);
        assert!(sink.captured.is_empty());

        let mut sink = RecordingSink::new();
        let path = b"/users/42";
        router.lookup(b"GET", path, &mut sink);
        assert_eq!(sink.captured.len(), 1);
        assert_eq!(value(path, sink.captured[0].1, sink.captured[0].2), "42");
    }

    #[test]
    fn wildcard_captures_remaining_path() {
        let router = Router::new();
        router.add("GET", &Pattern::parse("/files/*filepath").unwrap(), noop_handler());
        let path = b"/files/a/b/c.txt";
        let mut sink = RecordingSink::new();
        let found = router.lookup(b"GET", path, &mut sink);
        assert!(found.is_some());
        assert_eq!(value(path, sink.captured[0].1, sink.captured[0].2), "a/b/c.txt");
    }

    #[test]
    fn wildcard_with_empty_remainder_still_matches() {
        let router = Router::new();
        router.add("GET", &Pattern::parse("/files/*p").unwrap(), noop_handler());
        let path = b"/files/";
        let mut sink = RecordingSink::new();
        let found = router.lookup(b"GET", path, &mut sink);
        assert!(found.is_some());
        assert_eq!(value(path, sink.captured[0].1, sink.captured[0].2), "");
    }

    #[test]
    fn missing_route_is_not_found() {
        let router = Router::new();
        router.add("GET", &Pattern::parse("/ping").unwrap(), noop_handler());
        let mut sink = RecordingSink::new();
        assert!(router.lookup(b"GET", b"/unknown", &mut sink).is_none());
    }

    #[test]
    fn swap_router_readers_see_updates_published_after_add() {
        let router = SwapRouter::new();
        router.add("GET", &Pattern::parse("/ping").unwrap(), noop_handler());
        let mut sink = RecordingSink::new();
        assert!(router.lookup(b"GET", b"/ping", &mut sink).is_some());
    }

    #[test]
    #[should_panic]
    fn swap_router_rejects_writes_after_freeze() {
        let router = SwapRouter::new();
        router.freeze();
        router.add("GET", &Pattern::parse("/ping").unwrap(), noop_handler());
    }

    #[test]
    fn overwriting_same_method_and_pattern_replaces_silently() {
        let router = Router::new();
        router.add("GET", &Pattern::parse("/ping").unwrap(), noop_handler());
        router.add("GET", &Pattern::parse("/ping").unwrap(), noop_handler());
        let mut sink = RecordingSink::new();
        assert!(router.lookup(b"GET", b"/ping", &mut sink).is_some());
    }
}

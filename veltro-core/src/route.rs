//! Route pattern grammar and segment classification.
//!
//! ```text
//! pattern   := '/' | ('/' segment)+ ('/' wildcard)?
//! segment   := literal | ':' name
//! wildcard  := '*' name
//! name      := identifier (letters, digits, underscore)
//! literal   := any byte sequence not containing '/'
//! ```
//! Double slashes are squashed to one when tokenizing; a trailing slash
//! is stripped (so `/users/` and `/users` register the same route).

use std::sync::Arc;

use crate::error::CoreError;
use crate::middleware::Handler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Static(Box<str>),
    Param(Arc<str>),
    /// Terminal wildcard; always the last segment of a pattern.
    Wildcard(Arc<str>),
}

/// A parsed, normalized route pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: Arc<str>,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Parse and normalize a raw pattern string.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let normalized = normalize(raw);
        let mut segments = Vec::new();
        let mut seen_wildcard = false;

        for part in normalized.split('/').filter(|s| !s.is_empty()) {
            if seen_wildcard {
                return Err(CoreError::BadRequest(
                    "wildcard segment must be last".into(),
                ));
            }
            if let Some(name) = part.strip_prefix(':') {
                validate_name(name)?;
                segments.push(Segment::Param(Arc::from(name)));
            } else if let Some(name) = part.strip_prefix('*') {
                validate_name(name)?;
                segments.push(Segment::Wildcard(Arc::from(name)));
                seen_wildcard = true;
            } else {
                segments.push(Segment::Static(part.into()));
            }
        }

        Ok(Self {
            raw: Arc::from(normalized.as_str()),
            segments,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// A pattern with no `:param` or `*wildcard` segments is eligible for
    /// the router's exact-match static table.
    pub fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Static(_)))
    }
}

fn validate_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty()
        || !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
    {
        return Err(CoreError::BadRequest(format!(
            "invalid parameter name: {name:?}"
        )));
    }
    Ok(())
}

/// Collapses repeated `/` and strips a trailing slash (root path `/` is
/// left as-is).
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for ch in path.chars() {
        if ch == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(ch);
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// A registered `(method, pattern, handler)` triple, conceptually
/// equivalent to the spec's "Route entry".
#[derive(Clone)]
pub struct Route {
    pub method: Arc<str>,
    pub pattern: Pattern,
    pub handler: Handler,
}

impl Route {
    pub fn new(method: impl Into<Arc<str>>, pattern: Pattern, handler: Handler) -> Self {
        Self {
            method: method.into(),
            pattern,
            handler,
        }
    }
}

//! Response helpers (C5).
//!
//! Grounded on `ando-proxy::proxy::{RESP_404, RESP_401_INVALID, RESP_502,
//! build_response, status_text}` — the teacher's pattern of pre-built,
//! byte-exact responses and allocation-minimal status writing. The JSON
//! encode path reuses the same idea with a pooled buffer instead of a
//! one-off `Vec`.

use std::sync::OnceLock;

use crossbeam_queue::SegQueue;
use serde::Serialize;

use crate::context::Context;
use crate::error::CoreError;

const CONTENT_TYPE_JSON: &[u8] = b"application/json";
const CONTENT_TYPE_TEXT: &[u8] = b"text/plain; charset=utf-8";
const CONTENT_TYPE_HTML: &[u8] = b"text/html; charset=utf-8";

struct BufferPool {
    free: SegQueue<Vec<u8>>,
    capacity_hint: usize,
}

impl BufferPool {
    fn new(capacity_hint: usize) -> Self {
        Self {
            free: SegQueue::new(),
            capacity_hint,
        }
    }

    fn acquire(&self) -> Vec<u8> {
        self.free
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.capacity_hint))
    }

    fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        self.free.push(buf);
    }
}

fn medium_pool() -> &'static BufferPool {
    static POOL: OnceLock<BufferPool> = OnceLock::new();
    POOL.get_or_init(|| BufferPool::new(8 * 1024))
}

fn large_pool() -> &'static BufferPool {
    static POOL: OnceLock<BufferPool> = OnceLock::new();
    POOL.get_or_init(|| BufferPool::new(64 * 1024))
}

fn json_with_pool<T: Serialize>(
    ctx: &mut Context,
    status: u16,
    value: &T,
    pool: &'static BufferPool,
) -> Result<(), CoreError> {
    let mut buf = pool.acquire();
    let result = serde_json::to_writer(&mut buf, value);
    if let Err(e) = result {
        pool.release(buf);
        return Err(CoreError::Internal(e.to_string()));
    }
    ctx.set_content_type(CONTENT_TYPE_JSON);
    ctx.set_status(status);
    ctx.write_body(&buf);
    pool.release(buf);
    Ok(())
}

/// Encode `value` to JSON using an ≈8 KiB pooled buffer.
pub fn json<T: Serialize>(ctx: &mut Context, status: u16, value: &T) -> Result<(), CoreError> {
    json_with_pool(ctx, status, value, medium_pool())
}

/// Same as `json`, but draws from an ≈64 KiB buffer pool for larger
/// payloads that would otherwise force the medium pool to grow.
pub fn json_large<T: Serialize>(
    ctx: &mut Context,
    status: u16,
    value: &T,
) -> Result<(), CoreError> {
    json_with_pool(ctx, status, value, large_pool())
}

/// Write pre-encoded JSON bytes verbatim, skipping serialization.
pub fn json_bytes(ctx: &mut Context, status: u16, bytes: &[u8]) {
    ctx.set_content_type(CONTENT_TYPE_JSON);
    ctx.set_status(status);
    ctx.write_body(bytes);
}

pub fn text(ctx: &mut Context, status: u16, s: &str) {
    ctx.set_content_type(CONTENT_TYPE_TEXT);
    ctx.set_status(status);
    ctx.write_body(s.as_bytes());
}

pub fn html(ctx: &mut Context, status: u16, s: &str) {
    ctx.set_content_type(CONTENT_TYPE_HTML);
    ctx.set_status(status);
    ctx.write_body(s.as_bytes());
}

/// 204 No Content: status and headers only, no body.
pub fn no_content(ctx: &mut Context) {
    ctx.set_status(204);
    ctx.write_body(b"");
}

macro_rules! pre_encoded_shortcut {
    ($fn_name:ident, $status:expr, $body:expr) => {
        /// Allocation-free: ships a fixed status and fixed body bytes.
        pub fn $fn_name(ctx: &mut Context) {
            json_bytes(ctx, $status, $body);
        }
    };
}

pre_encoded_shortcut!(json_ok, 200, br#"{"ok":true}"#);
pre_encoded_shortcut!(json_created, 201, br#"{"created":true}"#);
pre_encoded_shortcut!(json_bad_request, 400, br#"{"error":"Bad Request"}"#);
pre_encoded_shortcut!(json_unauthorized, 401, br#"{"error":"Unauthorized"}"#);
pre_encoded_shortcut!(json_forbidden, 403, br#"{"error":"Forbidden"}"#);
pre_encoded_shortcut!(json_not_found, 404, br#"{"error":"Not Found"}"#);
pre_encoded_shortcut!(
    json_method_not_allowed,
    405,
    br#"{"error":"Method Not Allowed"}"#
);
pre_encoded_shortcut!(
    json_payload_too_large,
    413,
    br#"{"error":"Payload Too Large"}"#
);
pre_encoded_shortcut!(
    json_too_many_requests,
    429,
    br#"{"error":"Too Many Requests"}"#
);
pre_encoded_shortcut!(
    json_internal_server_error,
    500,
    br#"{"error":"Internal Server Error"}"#
);
pre_encoded_shortcut!(
    json_service_unavailable,
    503,
    br#"{"error":"Service Unavailable"}"#
);

/// Maps a `CoreError` to its canonical pre-encoded body and status —
/// the default `ErrorHandler` in `veltro-runtime` delegates here.
pub fn write_error(ctx: &mut Context, err: &CoreError) {
    json_bytes(ctx, err.status_code(), err.to_json_body());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextPool;
    use crate::http::{Request, ResponseWriter};
    use serde::Serialize;

    struct FakeRequest;
    impl<'r> Request<'r> for FakeRequest {
        fn method_bytes(&self) -> &'r [u8] {
            b"GET"
        }
        fn path_bytes(&self) -> &'r [u8] {
            b"/"
        }
        fn query_bytes(&self) -> &'r [u8] {
            b""
        }
        fn header_get(&self, _name: &str) -> Option<&'r [u8]> {
            None
        }
        fn body_bytes(&self) -> &'r [u8] {
            b""
        }
    }

    #[derive(Default)]
    struct RecordingResponse {
        status: u16,
        headers: Vec<(Vec<u8>, Vec<u8>)>,
        body: Vec<u8>,
    }

    impl ResponseWriter for RecordingResponse {
        fn set_header(&mut self, name: &[u8], value: &[u8]) {
            self.headers.push((name.to_vec(), value.to_vec()));
        }
        fn write_status(&mut self, code: u16) {
            self.status = code;
        }
        fn write_body(&mut self, bytes: &[u8]) {
            self.body.extend_from_slice(bytes);
        }
    }

    #[derive(Serialize)]
    struct Payload {
        id: &'static str,
    }

    #[test]
    fn json_round_trips_through_pooled_buffer() {
        let pool = ContextPool::new();
        let mut state = pool.acquire();
        let req = FakeRequest;
        let mut resp = RecordingResponse::default();
        let mut ctx = Context::bind(&mut state, &req, &mut resp);
        json(&mut ctx, 200, &Payload { id: "42" }).unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, br#"{"id":"42"}"#);
        assert!(resp
            .headers
            .iter()
            .any(|(n, v)| n == b"content-type" && v == CONTENT_TYPE_JSON));
    }

    #[test]
    fn text_yields_exact_body() {
        let pool = ContextPool::new();
        let mut state = pool.acquire();
        let req = FakeRequest;
        let mut resp = RecordingResponse::default();
        let mut ctx = Context::bind(&mut state, &req, &mut resp);
        text(&mut ctx, 200, "hello");
        assert_eq!(resp.body, b"hello");
    }

    #[test]
    fn json_bytes_is_written_verbatim() {
        let pool = ContextPool::new();
        let mut state = pool.acquire();
        let req = FakeRequest;
        let mut resp = RecordingResponse::default();
        let mut ctx = Context::bind(&mut state, &req, &mut resp);
        json_bytes(&mut ctx, 200, br#"{"x":1}"#);
        assert_eq!(resp.body, br#"{"x":1}"#);
        assert_eq!(resp.status, 200);
    }

    #[test]
    fn no_content_has_empty_body_and_204() {
        let pool = ContextPool::new();
        let mut state = pool.acquire();
        let req = FakeRequest;
        let mut resp = RecordingResponse::default();
        let mut ctx = Context::bind(&mut state, &req, &mut resp);
        no_content(&mut ctx);
        assert_eq!(resp.status, 204);
        assert!(resp.body.is_empty());
    }

    #[test]
    fn write_error_matches_precomputed_table() {
        let pool = ContextPool::new();
        let mut state = pool.acquire();
        let req = FakeRequest;
        let mut resp = RecordingResponse::default();
        let mut ctx = Context::bind(&mut state, &req, &mut resp);
        write_error(&mut ctx, &CoreError::NotFound);
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body, br#"{"error":"Not Found"}"#);
    }
}

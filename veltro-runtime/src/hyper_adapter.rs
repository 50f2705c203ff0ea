//! The `hyper` binding. `veltro-runtime` is the sole owner of the `hyper`
//! dependency (mirroring `r2e-http` being "sole owner of axum" for its
//! framework), so `veltro_core::http::{Request, ResponseWriter}` stay
//! server-agnostic and testable with an in-memory adapter.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderName, HeaderValue};

use veltro_core::error::CoreError;
use veltro_core::http::{Request, ResponseWriter};

/// A fully-buffered request: method, path, query and body read up front so
/// the `Request<'r>` impl can hand out borrowed slices without fighting
/// hyper's streaming body type.
pub struct OwnedRequest {
    method: Vec<u8>,
    path: Vec<u8>,
    query: Vec<u8>,
    headers: http::HeaderMap,
    body: Bytes,
    /// Set when the body could not be buffered; the dispatcher writes
    /// this error instead of routing the (otherwise empty) request.
    pub read_error: Option<CoreError>,
}

impl OwnedRequest {
    pub async fn from_hyper(req: hyper::Request<Incoming>) -> Result<Self, hyper::Error> {
        let (parts, body) = req.into_parts();
        let body = body.collect().await?.to_bytes();

        let path = parts.uri.path().as_bytes().to_vec();
        let query = parts
            .uri
            .query()
            .map(|q| q.as_bytes().to_vec())
            .unwrap_or_default();

        Ok(Self {
            method: parts.method.as_str().as_bytes().to_vec(),
            path,
            query,
            headers: parts.headers,
            body,
            read_error: None,
        })
    }

    /// An empty request carrying a pre-set error, used when buffering the
    /// real request body failed.
    pub fn empty_with_error(err: CoreError) -> Self {
        Self {
            method: Vec::new(),
            path: Vec::new(),
            query: Vec::new(),
            headers: http::HeaderMap::new(),
            body: Bytes::new(),
            read_error: Some(err),
        }
    }
}

/// Borrows from an `OwnedRequest` for the lifetime of one dispatch call.
pub struct HyperRequestRef<'r>(pub &'r OwnedRequest);

impl<'r> Request<'r> for HyperRequestRef<'r> {
    fn method_bytes(&self) -> &'r [u8] {
        &self.0.method
    }

    fn path_bytes(&self) -> &'r [u8] {
        &self.0.path
    }

    fn query_bytes(&self) -> &'r [u8] {
        &self.0.query
    }

    fn header_get(&self, name: &str) -> Option<&'r [u8]> {
        self.0.headers.get(name).map(|v| v.as_bytes())
    }

    fn body_bytes(&self) -> &'r [u8] {
        &self.0.body
    }
}

/// Accumulates status/headers/body until the dispatcher converts it into a
/// real `hyper::Response`.
#[derive(Default)]
pub struct HyperResponseWriter {
    status: u16,
    headers: Vec<(Vec<u8>, Vec<u8>)>,
    body: Vec<u8>,
}

impl ResponseWriter for HyperResponseWriter {
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

impl HyperResponseWriter {
    pub fn into_hyper_response(self) -> hyper::Response<Full<Bytes>> {
        let mut builder = hyper::Response::builder().status(if self.status == 0 { 200 } else { self.status });
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in self.headers {
                if let (Ok(name), Ok(value)) = (
                    HeaderName::from_bytes(&name),
                    HeaderValue::from_bytes(&value),
                ) {
                    headers.append(name, value);
                }
            }
        }
        builder
            .body(Full::new(Bytes::from(self.body)))
            .unwrap_or_else(|_| hyper::Response::new(Full::new(Bytes::new())))
    }
}
